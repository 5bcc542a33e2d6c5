use serde::{Deserialize, Serialize};

use crate::collateral::{LtvCalculator, RiskClassifier};
use crate::config::EngineConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{require_positive, Result};
use crate::position::Position;
use crate::types::{RejectionReason, RiskTier};

/// outcome of assessing a loan request against a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanEvaluation {
    pub approved: bool,
    pub requested_amount: Money,
    /// `None` when there is no eligible collateral
    pub projected_ltv: Option<Rate>,
    pub health_factor: Rate,
    pub total_eligible_collateral: Money,
    pub outstanding_debt: Money,
    pub max_additional_borrow: Money,
    pub rejection_reason: Option<RejectionReason>,
    pub risk_tier: Option<RiskTier>,
}

/// approval rules, applied in order; first failing rule wins
pub struct LoanEvaluator<'a> {
    config: &'a EngineConfig,
}

impl<'a> LoanEvaluator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, position: &Position, requested_amount: Money) -> Result<LoanEvaluation> {
        require_positive(requested_amount, "requested amount")?;

        let collateral = position.total_eligible_collateral;
        let outstanding_debt = position.outstanding_debt();
        let projected_debt = outstanding_debt + requested_amount;

        let projected_ltv = LtvCalculator::calculate_ltv(projected_debt, collateral);
        let health_factor = LtvCalculator::health_factor(collateral, projected_debt).unwrap_or(Rate::ZERO);
        let terms = &self.config.lending_terms;

        let rejection_reason = match projected_ltv {
            None => Some(RejectionReason::NoEligibleCollateral),
            // boundary inclusive: exactly max_ltv is accepted
            Some(ltv) if ltv > terms.max_ltv => Some(RejectionReason::ExceedsMaximumLtv),
            Some(_) if health_factor < terms.min_health_factor => {
                Some(RejectionReason::InsufficientHealthFactor)
            }
            Some(_) => None,
        };

        Ok(LoanEvaluation {
            approved: rejection_reason.is_none(),
            requested_amount,
            projected_ltv,
            health_factor,
            total_eligible_collateral: collateral,
            outstanding_debt,
            max_additional_borrow: LtvCalculator::headroom(collateral, outstanding_debt),
            rejection_reason,
            risk_tier: RiskClassifier::new(self.config.risk_tiers).classify_opt(projected_ltv),
        })
    }
}
