use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::decimal::Rate;
use crate::errors::{LendingError, Result};
use crate::interest::DayCountConvention;
use crate::types::{AssetType, RiskTier};

/// engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub asset_terms: BTreeMap<AssetType, AssetTerms>,
    pub lending_terms: LendingTerms,
    pub risk_tiers: RiskTierBreakpoints,
    pub day_count_convention: DayCountConvention,
    /// lock active assets once position ltv exceeds this; disabled when `None`
    pub asset_lock_ltv: Option<Rate>,
}

/// valuation terms for one asset type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetTerms {
    pub ltv_cap: Rate,
    pub risk_tier: RiskTier,
}

/// loan approval and pricing terms
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LendingTerms {
    /// annual simple rate fixed at origination
    pub default_interest_rate: Rate,
    /// annual yield credited on deposited value
    pub yield_rate: Rate,
    /// projected ltv above this is rejected
    pub max_ltv: Rate,
    /// projected health factor below this is rejected
    pub min_health_factor: Rate,
    /// positions below this health factor may be liquidated
    pub liquidation_health_factor: Rate,
}

/// ltv breakpoints for the risk tier classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskTierBreakpoints {
    /// ltv at or below this is low risk
    pub low_max: Rate,
    /// ltv at or below this (and above `low_max`) is medium risk
    pub medium_max: Rate,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut asset_terms = BTreeMap::new();
        asset_terms.insert(
            AssetType::Property,
            AssetTerms { ltv_cap: Rate::from_percentage(70), risk_tier: RiskTier::Low },
        );
        asset_terms.insert(
            AssetType::Car,
            AssetTerms { ltv_cap: Rate::from_percentage(60), risk_tier: RiskTier::Medium },
        );
        asset_terms.insert(
            AssetType::Crypto,
            AssetTerms { ltv_cap: Rate::from_percentage(50), risk_tier: RiskTier::High },
        );

        Self {
            asset_terms,
            lending_terms: LendingTerms {
                default_interest_rate: Rate::from_percentage(5),
                yield_rate: Rate::from_percentage(5),
                max_ltv: Rate::ONE,
                min_health_factor: Rate::ONE,
                liquidation_health_factor: Rate::ONE,
            },
            risk_tiers: RiskTierBreakpoints {
                low_max: Rate::from_percentage(50),
                medium_max: Rate::from_percentage(80),
            },
            day_count_convention: DayCountConvention::Actual365,
            asset_lock_ltv: None,
        }
    }
}

impl EngineConfig {
    /// tighter caps, higher pricing and asset locking above 80% ltv
    pub fn conservative() -> Self {
        let mut config = Self::default();
        for (asset_type, cap) in [
            (AssetType::Property, dec!(0.60)),
            (AssetType::Car, dec!(0.45)),
            (AssetType::Crypto, dec!(0.35)),
        ] {
            if let Some(terms) = config.asset_terms.get_mut(&asset_type) {
                terms.ltv_cap = Rate::from_decimal(cap);
            }
        }
        config.lending_terms.default_interest_rate = Rate::from_percentage(8);
        config.lending_terms.max_ltv = Rate::from_percentage(90);
        config.asset_lock_ltv = Some(Rate::from_percentage(80));
        config
    }

    /// parse and validate a json configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// terms for an asset type, if it is accepted
    pub fn terms_for(&self, asset_type: AssetType) -> Option<&AssetTerms> {
        self.asset_terms.get(&asset_type)
    }

    pub fn validate(&self) -> Result<()> {
        if self.asset_terms.is_empty() {
            return Err(invalid("at least one asset type must be configured"));
        }

        for (asset_type, terms) in &self.asset_terms {
            let cap = terms.ltv_cap;
            if cap <= Rate::ZERO || cap > Rate::ONE {
                return Err(invalid(format!(
                    "ltv cap for {} must be in (0, 1], got {}",
                    asset_type,
                    cap.as_decimal()
                )));
            }
        }

        let terms = &self.lending_terms;
        if terms.default_interest_rate < Rate::ZERO || terms.yield_rate < Rate::ZERO {
            return Err(invalid("rates cannot be negative"));
        }
        if terms.max_ltv <= Rate::ZERO
            || terms.min_health_factor <= Rate::ZERO
            || terms.liquidation_health_factor <= Rate::ZERO
        {
            return Err(invalid("ltv and health factor thresholds must be positive"));
        }

        if self.risk_tiers.low_max <= Rate::ZERO || self.risk_tiers.low_max >= self.risk_tiers.medium_max {
            return Err(invalid("risk tier breakpoints must satisfy 0 < low_max < medium_max"));
        }

        if let Some(lock) = self.asset_lock_ltv {
            if lock <= Rate::ZERO {
                return Err(invalid("asset lock ltv must be positive"));
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> LendingError {
    LendingError::InvalidConfiguration {
        message: message.into(),
    }
}
