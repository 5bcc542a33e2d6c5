use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{require_positive, LendingError, Result};
use crate::types::{AssetType, RiskTier};

/// result of appraising a stated asset value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valuation {
    pub asset_type: AssetType,
    pub stated_value: Money,
    pub ltv_ratio: Rate,
    /// eligible collateral: stated value discounted by the type's ltv cap
    pub appraised_value: Money,
    pub risk_tier: RiskTier,
}

/// pure valuation over the configured ltv table
pub struct ValuationEngine<'a> {
    config: &'a EngineConfig,
}

impl<'a> ValuationEngine<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// appraise a raw asset type name, e.g. from a request body
    pub fn appraise_named(&self, asset_type: &str, stated_value: Money) -> Result<Valuation> {
        self.appraise(asset_type.parse()?, stated_value)
    }

    pub fn appraise(&self, asset_type: AssetType, stated_value: Money) -> Result<Valuation> {
        require_positive(stated_value, "stated_value")?;

        let terms = self
            .config
            .terms_for(asset_type)
            .ok_or_else(|| LendingError::UnsupportedAssetType {
                asset_type: asset_type.to_string(),
            })?;

        Ok(Valuation {
            asset_type,
            stated_value,
            ltv_ratio: terms.ltv_cap,
            appraised_value: stated_value.scale(terms.ltv_cap),
            risk_tier: terms.risk_tier,
        })
    }
}
