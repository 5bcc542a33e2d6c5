use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::collateral::{Valuation, ValuationEngine};
use crate::config::EngineConfig;
use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::events::{Event, EventStore};
use crate::interest::AccrualEngine;
use crate::lending::{LoanEvaluation, LoanEvaluator};
use crate::position::{Position, PositionAggregator};
use crate::repository::{
    AssetRepository, InMemoryAssetRepository, InMemoryLoanRepository, LoanRepository,
};
use crate::state::{Asset, Loan};
use crate::types::{AssetStatus, LoanId, UserId};

/// one mutex per user; mutating operations for a user run one at a time
#[derive(Debug, Default)]
pub(crate) struct UserLocks {
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub(crate) fn lock(&self, user_id: UserId) -> UserLock<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = locks.entry(user_id).or_default().clone();
        UserLock {
            registry: self,
            user_id,
            handle,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// a user's mutex handle; the map entry is dropped with the last handle
pub(crate) struct UserLock<'a> {
    registry: &'a UserLocks,
    user_id: UserId,
    handle: Arc<Mutex<()>>,
}

impl UserLock<'_> {
    pub(crate) fn acquire(&self) -> MutexGuard<'_, ()> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for UserLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.registry.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // new handles are only cloned under the map lock, so a count of two
        // (map + this handle) means nobody else is waiting
        let idle = locks
            .get(&self.user_id)
            .is_some_and(|stored| Arc::ptr_eq(stored, &self.handle) && Arc::strong_count(stored) == 2);
        if idle {
            locks.remove(&self.user_id);
        }
    }
}

/// collateralized lending engine.
///
/// Holds no balances of its own: every answer is re-derived from the
/// repositories at call time. Reads (`preview_asset`, `evaluate_loan`,
/// `position`) run unsynchronized; writes are serialized per user.
pub struct LendingEngine {
    pub(crate) config: EngineConfig,
    pub(crate) assets: Arc<dyn AssetRepository>,
    pub(crate) loans: Arc<dyn LoanRepository>,
    pub(crate) user_locks: UserLocks,
    pub(crate) events: Mutex<EventStore>,
}

impl LendingEngine {
    pub fn new(
        config: EngineConfig,
        assets: Arc<dyn AssetRepository>,
        loans: Arc<dyn LoanRepository>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            assets,
            loans,
            user_locks: UserLocks::default(),
            events: Mutex::new(EventStore::new()),
        })
    }

    /// engine backed by fresh in-memory repositories
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Self::new(
            config,
            Arc::new(InMemoryAssetRepository::new()),
            Arc::new(InMemoryLoanRepository::new()),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// valuation dry-run; nothing is stored
    pub fn preview_asset(&self, asset_type: &str, stated_value: Money) -> Result<Valuation> {
        ValuationEngine::new(&self.config).appraise_named(asset_type, stated_value)
    }

    /// appraise and persist a deposit
    pub fn create_asset(
        &self,
        user_id: UserId,
        asset_type: &str,
        stated_value: Money,
        description: Option<String>,
        time_provider: &SafeTimeProvider,
    ) -> Result<Asset> {
        let valuation = self.preview_asset(asset_type, stated_value)?;

        let lock = self.user_locks.lock(user_id);
        let _guard = lock.acquire();
        let now = time_provider.now();

        let asset = self
            .assets
            .insert_asset(Asset::from_valuation(user_id, &valuation, description, now))?;

        if asset.status == AssetStatus::Rejected {
            warn!(%user_id, asset_id = %asset.id, stated_value = %stated_value, "asset appraised to zero collateral");
            self.emit(Event::AssetRejected {
                asset_id: asset.id,
                user_id,
                stated_value,
                timestamp: now,
            });
        } else {
            info!(
                %user_id,
                asset_id = %asset.id,
                asset_type = %asset.asset_type,
                appraised_value = %asset.appraised_value,
                "asset deposited"
            );
            self.emit(Event::AssetDeposited {
                asset_id: asset.id,
                user_id,
                asset_type: asset.asset_type,
                stated_value,
                appraised_value: asset.appraised_value,
                timestamp: now,
            });
            self.refresh_asset_locks(user_id, now);
        }

        // lock policy may have changed the stored status
        Ok(self.assets.get_asset(asset.id)?.unwrap_or(asset))
    }

    pub fn list_assets(&self, user_id: UserId) -> Result<Vec<Asset>> {
        self.assets.list_assets(user_id)
    }

    /// the user's loans with interest brought up to date
    pub fn list_loans(&self, user_id: UserId, time_provider: &SafeTimeProvider) -> Result<Vec<Loan>> {
        let now = time_provider.now();
        Ok(self
            .loans
            .list_loans(user_id)?
            .into_iter()
            .map(|loan| self.with_current_interest(loan, now))
            .collect())
    }

    /// a loan owned by `user_id`, with interest brought up to date
    pub fn get_loan(
        &self,
        user_id: UserId,
        loan_id: LoanId,
        time_provider: &SafeTimeProvider,
    ) -> Result<Loan> {
        let loan = self.stored_loan(user_id, loan_id)?;
        Ok(self.with_current_interest(loan, time_provider.now()))
    }

    /// `accrued_interest` of an active loan reports the amount owed at `now`
    fn with_current_interest(&self, mut loan: Loan, now: DateTime<Utc>) -> Loan {
        if loan.is_active() {
            let interest = AccrualEngine::new(self.config.day_count_convention).accrued_interest(&loan, now);
            loan.settle_interest(&interest);
        }
        loan
    }

    /// the persisted record, owner-checked; mutations start from this
    pub(crate) fn stored_loan(&self, user_id: UserId, loan_id: LoanId) -> Result<Loan> {
        let loan = self
            .loans
            .get_loan(loan_id)?
            .ok_or(LendingError::LoanNotFound { id: loan_id })?;

        if loan.user_id != user_id {
            return Err(LendingError::NotLoanOwner { loan_id, user_id });
        }
        Ok(loan)
    }

    /// current position for a user
    pub fn position(&self, user_id: UserId, time_provider: &SafeTimeProvider) -> Result<Position> {
        self.position_at(user_id, time_provider.now())
    }

    /// current position using the system clock
    pub fn position_now(&self, user_id: UserId) -> Result<Position> {
        self.position_at(user_id, Utc::now())
    }

    pub(crate) fn position_at(&self, user_id: UserId, as_of: DateTime<Utc>) -> Result<Position> {
        let assets = self.assets.list_assets(user_id)?;
        let loans = self.loans.list_loans(user_id)?;
        Ok(PositionAggregator::new(&self.config).aggregate(user_id, &assets, &loans, as_of))
    }

    /// whether the user's position has fallen below the liquidation health factor
    pub fn is_liquidatable(&self, user_id: UserId, time_provider: &SafeTimeProvider) -> Result<bool> {
        let position = self.position(user_id, time_provider)?;
        Ok(PositionAggregator::new(&self.config).is_liquidatable(&position))
    }

    /// loan preview; nothing is stored
    pub fn evaluate_loan(
        &self,
        user_id: UserId,
        amount: Money,
        time_provider: &SafeTimeProvider,
    ) -> Result<LoanEvaluation> {
        self.evaluate_at(user_id, amount, time_provider.now())
    }

    pub(crate) fn evaluate_at(
        &self,
        user_id: UserId,
        amount: Money,
        as_of: DateTime<Utc>,
    ) -> Result<LoanEvaluation> {
        let position = self.position_at(user_id, as_of)?;
        let evaluation = LoanEvaluator::new(&self.config).evaluate(&position, amount)?;
        debug!(
            %user_id,
            amount = %amount,
            approved = evaluation.approved,
            max_additional_borrow = %evaluation.max_additional_borrow,
            "loan evaluated"
        );
        Ok(evaluation)
    }

    /// drain collected audit events
    pub fn take_events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).take_events()
    }

    pub(crate) fn emit(&self, event: Event) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).emit(event);
    }

    /// run the asset lock policy after a committed change; a failure here
    /// must not undo the change, so it is only logged
    pub(crate) fn refresh_asset_locks(&self, user_id: UserId, now: DateTime<Utc>) {
        if let Err(error) = self.apply_asset_lock_policy(user_id, now) {
            warn!(%user_id, %error, "asset lock policy not applied");
        }
    }

    /// lock active assets above the configured ltv, release them at or below it.
    /// Caller must hold the user's lock.
    fn apply_asset_lock_policy(&self, user_id: UserId, now: DateTime<Utc>) -> Result<()> {
        let threshold = match self.config.asset_lock_ltv {
            Some(threshold) => threshold,
            None => return Ok(()),
        };

        let position = self.position_at(user_id, now)?;
        let over = position.ltv.map_or(false, |ltv| ltv > threshold);
        let (from, to) = if over {
            (AssetStatus::Active, AssetStatus::Locked)
        } else {
            (AssetStatus::Locked, AssetStatus::Active)
        };

        for mut asset in self.assets.list_assets(user_id)? {
            if asset.status != from {
                continue;
            }
            asset.status = to;
            let asset = self.assets.update_asset(asset)?;
            info!(%user_id, asset_id = %asset.id, status = ?to, "asset status changed");
            self.emit(Event::AssetStatusChanged {
                asset_id: asset.id,
                old_status: from,
                new_status: to,
                position_ltv: position.ltv,
                timestamp: now,
            });
        }
        Ok(())
    }
}
