use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collateral::{LtvCalculator, RiskClassifier};
use crate::config::EngineConfig;
use crate::decimal::{Money, Rate};
use crate::interest::AccrualEngine;
use crate::state::{Asset, Loan};
use crate::types::{RiskTier, UserId};

/// per-user aggregate, always recomputed from assets and loans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub user_id: UserId,
    /// sum of stated values of every asset
    pub total_deposited: Money,
    /// sum of appraised values of non-rejected assets
    pub total_eligible_collateral: Money,
    /// outstanding principal across active loans
    pub total_borrowed: Money,
    /// unpaid accrued interest across active loans
    pub total_interest: Money,
    pub available_credit: Money,
    pub yield_earned: Money,
    /// `None` when there is no debt
    pub health_factor: Option<Rate>,
    /// `None` when there is no eligible collateral
    pub ltv: Option<Rate>,
    pub risk_tier: Option<RiskTier>,
    pub as_of: DateTime<Utc>,
}

impl Position {
    pub fn outstanding_debt(&self) -> Money {
        LtvCalculator::calculate_cvl(self.total_borrowed, self.total_interest)
    }
}

/// builds positions from already-loaded records
pub struct PositionAggregator<'a> {
    config: &'a EngineConfig,
    accrual: AccrualEngine,
}

impl<'a> PositionAggregator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            config,
            accrual: AccrualEngine::new(config.day_count_convention),
        }
    }

    pub fn aggregate(
        &self,
        user_id: UserId,
        assets: &[Asset],
        loans: &[Loan],
        as_of: DateTime<Utc>,
    ) -> Position {
        let total_deposited: Money = assets.iter().map(|a| a.stated_value).sum();
        let total_eligible_collateral: Money = assets.iter().map(Asset::eligible_value).sum();

        let active: Vec<&Loan> = loans.iter().filter(|l| l.is_active()).collect();
        let total_borrowed: Money = active.iter().map(|l| l.outstanding_principal()).sum();
        let total_interest: Money = active
            .iter()
            .map(|l| self.accrual.accrued_interest(l, as_of).total_unpaid())
            .sum();

        let debt = LtvCalculator::calculate_cvl(total_borrowed, total_interest);
        let ltv = LtvCalculator::calculate_ltv(debt, total_eligible_collateral);
        let classifier = RiskClassifier::new(self.config.risk_tiers);

        Position {
            user_id,
            total_deposited,
            total_eligible_collateral,
            total_borrowed,
            total_interest,
            available_credit: LtvCalculator::headroom(total_eligible_collateral, debt),
            yield_earned: total_deposited.scale(self.config.lending_terms.yield_rate) - total_interest,
            health_factor: LtvCalculator::health_factor(total_eligible_collateral, debt),
            ltv,
            risk_tier: classifier.classify_opt(ltv),
            as_of,
        }
    }

    /// whether an external liquidation process may act on this position
    pub fn is_liquidatable(&self, position: &Position) -> bool {
        match position.health_factor {
            Some(hf) => hf < self.config.lending_terms.liquidation_health_factor,
            None => false,
        }
    }
}
