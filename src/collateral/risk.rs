use crate::config::RiskTierBreakpoints;
use crate::decimal::Rate;
use crate::types::RiskTier;

/// buckets an ltv into a reporting tier; never used to gate decisions
pub struct RiskClassifier {
    breakpoints: RiskTierBreakpoints,
}

impl RiskClassifier {
    pub fn new(breakpoints: RiskTierBreakpoints) -> Self {
        Self { breakpoints }
    }

    pub fn classify(&self, ltv: Rate) -> RiskTier {
        if ltv <= self.breakpoints.low_max {
            RiskTier::Low
        } else if ltv <= self.breakpoints.medium_max {
            RiskTier::Medium
        } else {
            RiskTier::High
        }
    }

    /// `None` ltv means no collateral exposure, which has no tier
    pub fn classify_opt(&self, ltv: Option<Rate>) -> Option<RiskTier> {
        ltv.map(|ltv| self.classify(ltv))
    }
}
