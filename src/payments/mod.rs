pub mod waterfall;

use crate::decimal::Money;
use crate::errors::{require_positive, LendingError, Result};
use crate::types::LoanId;

pub use waterfall::{PaymentProcessor, PaymentResult};

/// balances owed on a loan at the moment a payment arrives
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentContext {
    pub loan_id: LoanId,
    pub unpaid_interest: Money,
    pub outstanding_principal: Money,
}

impl PaymentContext {
    pub fn total_outstanding(&self) -> Money {
        self.unpaid_interest + self.outstanding_principal
    }

    /// payment must be positive and cannot exceed principal plus accrued interest
    pub fn validate_payment(&self, amount: Money) -> Result<()> {
        require_positive(amount, "repayment amount")?;

        let outstanding = self.total_outstanding();
        if amount > outstanding {
            return Err(LendingError::OverpaymentNotAllowed {
                requested: amount,
                outstanding,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_payment_context_validation() {
        let context = PaymentContext {
            loan_id: Uuid::new_v4(),
            unpaid_interest: Money::from_major(500),
            outstanding_principal: Money::from_major(10_000),
        };

        assert!(matches!(
            context.validate_payment(Money::ZERO),
            Err(LendingError::InvalidInput { .. })
        ));
        assert!(context.validate_payment(Money::from_major(200)).is_ok());
        assert!(context.validate_payment(context.total_outstanding()).is_ok());

        let err = context
            .validate_payment(context.total_outstanding() + Money::CENT)
            .unwrap_err();
        assert!(matches!(err, LendingError::OverpaymentNotAllowed { .. }));
    }
}
