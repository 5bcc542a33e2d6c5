use crate::decimal::{Money, Rate};

/// loan-to-value and health-factor arithmetic shared by aggregation and evaluation
pub struct LtvCalculator;

impl LtvCalculator {
    /// debt ÷ collateral; `None` when there is no collateral exposure
    pub fn calculate_ltv(debt: Money, collateral: Money) -> Option<Rate> {
        debt.ratio_to(collateral)
    }

    /// collateral ÷ debt; `None` when there is no debt
    pub fn health_factor(collateral: Money, debt: Money) -> Option<Rate> {
        collateral.ratio_to(debt)
    }

    /// current value of liability
    pub fn calculate_cvl(outstanding_principal: Money, unpaid_interest: Money) -> Money {
        outstanding_principal + unpaid_interest
    }

    /// borrowing room left under a ceiling equal to eligible collateral
    pub fn headroom(collateral: Money, debt: Money) -> Money {
        collateral.saturating_sub(debt)
    }
}
