use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collateral::Valuation;
use crate::decimal::{Money, Rate};
use crate::errors::{LendingError, Result};
use crate::interest::InterestCalculation;
use crate::types::{
    AssetId, AssetStatus, AssetType, LoanId, LoanStatus, PaymentApplication, RejectionReason,
    RiskTier, UserId,
};

/// pledged asset record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub description: Option<String>,
    pub stated_value: Money,
    pub appraised_value: Money,
    pub ltv_ratio: Rate,
    pub risk_tier: RiskTier,
    pub status: AssetStatus,
    pub created_at: DateTime<Utc>,
    /// optimistic concurrency token, bumped on every committed update
    pub version: u64,
}

impl Asset {
    /// build a new asset from a completed valuation; a zero appraisal is recorded as rejected
    pub fn from_valuation(
        user_id: UserId,
        valuation: &Valuation,
        description: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let status = if valuation.appraised_value.is_positive() {
            AssetStatus::Active
        } else {
            AssetStatus::Rejected
        };

        Self {
            id: Uuid::new_v4(),
            user_id,
            asset_type: valuation.asset_type,
            description,
            stated_value: valuation.stated_value,
            appraised_value: valuation.appraised_value,
            ltv_ratio: valuation.ltv_ratio,
            risk_tier: valuation.risk_tier,
            status,
            created_at,
            version: 0,
        }
    }

    /// eligible collateral contributed by this asset
    pub fn eligible_value(&self) -> Money {
        if self.status.is_eligible() {
            self.appraised_value
        } else {
            Money::ZERO
        }
    }
}

/// loan record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub user_id: UserId,
    /// original principal
    pub amount: Money,
    /// cumulative principal repaid
    pub amount_repaid: Money,
    /// cumulative interest repaid
    pub interest_paid: Money,
    /// unpaid interest as of `interest_accrued_through`
    pub accrued_interest: Money,
    pub interest_rate: Rate,
    pub status: LoanStatus,
    pub ltv_at_origination: Option<Rate>,
    pub health_factor_snapshot: Option<Rate>,
    pub collateral_value_locked: Money,
    pub rejection_reason: Option<RejectionReason>,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub repaid_at: Option<DateTime<Utc>>,
    pub liquidated_at: Option<DateTime<Utc>>,
    /// end of the last whole accrual day settled into `accrued_interest`
    pub interest_accrued_through: Option<DateTime<Utc>>,
    pub version: u64,
}

impl Loan {
    /// new pending loan
    pub fn pending(
        user_id: UserId,
        amount: Money,
        interest_rate: Rate,
        collateral_value_locked: Money,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            amount_repaid: Money::ZERO,
            interest_paid: Money::ZERO,
            accrued_interest: Money::ZERO,
            interest_rate,
            status: LoanStatus::Pending,
            ltv_at_origination: None,
            health_factor_snapshot: None,
            collateral_value_locked,
            rejection_reason: None,
            created_at,
            activated_at: None,
            repaid_at: None,
            liquidated_at: None,
            interest_accrued_through: None,
            version: 0,
        }
    }

    /// approved loan, activated immediately
    pub fn approved(
        user_id: UserId,
        amount: Money,
        interest_rate: Rate,
        ltv_at_origination: Rate,
        health_factor: Rate,
        collateral_value_locked: Money,
        now: DateTime<Utc>,
    ) -> Self {
        let mut loan = Self::pending(user_id, amount, interest_rate, collateral_value_locked, now);
        loan.ltv_at_origination = Some(ltv_at_origination);
        loan.health_factor_snapshot = Some(health_factor);
        loan.status = LoanStatus::Active;
        loan.activated_at = Some(now);
        loan
    }

    /// rejected loan, kept for the audit trail
    pub fn rejected(
        user_id: UserId,
        amount: Money,
        interest_rate: Rate,
        reason: RejectionReason,
        projected_ltv: Option<Rate>,
        health_factor: Rate,
        collateral_value_locked: Money,
        now: DateTime<Utc>,
    ) -> Self {
        let mut loan = Self::pending(user_id, amount, interest_rate, collateral_value_locked, now);
        loan.ltv_at_origination = projected_ltv;
        loan.health_factor_snapshot = Some(health_factor);
        loan.rejection_reason = Some(reason);
        loan.status = LoanStatus::Rejected;
        loan
    }

    pub fn outstanding_principal(&self) -> Money {
        self.amount.saturating_sub(self.amount_repaid)
    }

    /// start of the current accrual window
    pub fn interest_checkpoint(&self) -> Option<DateTime<Utc>> {
        self.activated_at
            .map(|activated| self.interest_accrued_through.unwrap_or(activated))
    }

    /// when accrual stopped for a closed loan
    pub fn terminal_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            LoanStatus::Repaid => self.repaid_at,
            LoanStatus::Liquidated => self.liquidated_at,
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    /// move to `next`, stamping the matching timestamp
    pub fn transition(&mut self, next: LoanStatus, timestamp: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(LendingError::LoanNotActive { status: self.status });
        }

        match next {
            LoanStatus::Active => self.activated_at = Some(timestamp),
            LoanStatus::Repaid => self.repaid_at = Some(timestamp),
            LoanStatus::Liquidated => self.liquidated_at = Some(timestamp),
            LoanStatus::Pending | LoanStatus::Rejected => {}
        }
        self.status = next;
        Ok(())
    }

    /// fold the interest owed so far into the carried balance.
    ///
    /// The checkpoint only moves by whole days, so a partial day keeps
    /// accruing into the next window.
    pub fn settle_interest(&mut self, interest: &InterestCalculation) {
        self.accrued_interest = interest.total_unpaid();
        if interest.accrued_through.is_some() {
            self.interest_accrued_through = interest.accrued_through;
        }
    }

    /// record a split repayment against the interest owed at `timestamp`
    pub fn record_payment(
        &mut self,
        application: PaymentApplication,
        interest: &InterestCalculation,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.settle_interest(interest);
        self.interest_paid += application.to_interest;
        self.amount_repaid += application.to_principal;
        self.accrued_interest = self.accrued_interest.saturating_sub(application.to_interest);

        if self.outstanding_principal().is_zero() && self.accrued_interest.is_zero() {
            self.transition(LoanStatus::Repaid, timestamp)?;
        }
        Ok(())
    }
}
