//! Storage boundary. The engine only talks to these traits; the in-memory
//! implementations back tests, demos and single-process deployments.

use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

use crate::errors::{LendingError, Result};
use crate::state::{Asset, Loan};
use crate::types::{AssetId, LoanId, UserId};

/// persistence for pledged assets
pub trait AssetRepository: Send + Sync {
    fn insert_asset(&self, asset: Asset) -> Result<Asset>;
    fn get_asset(&self, id: AssetId) -> Result<Option<Asset>>;
    fn list_assets(&self, user_id: UserId) -> Result<Vec<Asset>>;
    /// commit `asset` if its version matches the stored one; returns the bumped record
    fn update_asset(&self, asset: Asset) -> Result<Asset>;
}

/// persistence for loans
pub trait LoanRepository: Send + Sync {
    fn insert_loan(&self, loan: Loan) -> Result<Loan>;
    fn get_loan(&self, id: LoanId) -> Result<Option<Loan>>;
    fn list_loans(&self, user_id: UserId) -> Result<Vec<Loan>>;
    /// commit `loan` if its version matches the stored one; returns the bumped record
    fn update_loan(&self, loan: Loan) -> Result<Loan>;
}

/// a record with identity, an owner and an optimistic-lock version
pub trait Versioned: Clone {
    fn record_id(&self) -> Uuid;
    fn owner(&self) -> UserId;
    fn version(&self) -> u64;
    fn set_version(&mut self, version: u64);
}

impl Versioned for Asset {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn owner(&self) -> UserId {
        self.user_id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

impl Versioned for Loan {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn owner(&self) -> UserId {
        self.user_id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

/// insertion-ordered in-memory table
#[derive(Debug)]
pub struct InMemoryStore<T> {
    records: RwLock<Vec<T>>,
}

pub type InMemoryAssetRepository = InMemoryStore<Asset>;
pub type InMemoryLoanRepository = InMemoryStore<Loan>;

impl<T: Versioned> InMemoryStore<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, record: T) -> Result<T> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.iter().any(|r| r.record_id() == record.record_id()) {
            return Err(LendingError::ConcurrencyConflict {
                message: format!("record {} already exists", record.record_id()),
            });
        }
        records.push(record.clone());
        Ok(record)
    }

    fn get(&self, id: Uuid) -> Option<T> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.iter().find(|r| r.record_id() == id).cloned()
    }

    fn list(&self, user_id: UserId) -> Vec<T> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.iter().filter(|r| r.owner() == user_id).cloned().collect()
    }

    fn update(&self, mut record: T, not_found: LendingError) -> Result<T> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let stored = match records.iter_mut().find(|r| r.record_id() == record.record_id()) {
            Some(stored) => stored,
            None => return Err(not_found),
        };

        if stored.version() != record.version() {
            return Err(LendingError::ConcurrencyConflict {
                message: format!(
                    "record {} changed: expected version {}, found {}",
                    record.record_id(),
                    record.version(),
                    stored.version()
                ),
            });
        }

        record.set_version(record.version() + 1);
        *stored = record.clone();
        Ok(record)
    }
}

impl<T: Versioned> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetRepository for InMemoryStore<Asset> {
    fn insert_asset(&self, asset: Asset) -> Result<Asset> {
        self.insert(asset)
    }

    fn get_asset(&self, id: AssetId) -> Result<Option<Asset>> {
        Ok(self.get(id))
    }

    fn list_assets(&self, user_id: UserId) -> Result<Vec<Asset>> {
        Ok(self.list(user_id))
    }

    fn update_asset(&self, asset: Asset) -> Result<Asset> {
        let id = asset.id;
        self.update(asset, LendingError::AssetNotFound { id })
    }
}

impl LoanRepository for InMemoryStore<Loan> {
    fn insert_loan(&self, loan: Loan) -> Result<Loan> {
        self.insert(loan)
    }

    fn get_loan(&self, id: LoanId) -> Result<Option<Loan>> {
        Ok(self.get(id))
    }

    fn list_loans(&self, user_id: UserId) -> Result<Vec<Loan>> {
        Ok(self.list(user_id))
    }

    fn update_loan(&self, loan: Loan) -> Result<Loan> {
        let id = loan.id;
        self.update(loan, LendingError::LoanNotFound { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::{Money, Rate};
    use crate::types::LoanStatus;
    use chrono::{TimeZone, Utc};

    fn loan(user_id: UserId) -> Loan {
        Loan::approved(
            user_id,
            Money::from_major(1_000),
            Rate::from_percentage(5),
            Rate::from_percentage(50),
            Rate::from_percentage(200),
            Money::from_major(2_000),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_list_is_scoped_to_user() {
        let repo = InMemoryLoanRepository::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        repo.insert_loan(loan(alice)).unwrap();
        repo.insert_loan(loan(alice)).unwrap();
        repo.insert_loan(loan(bob)).unwrap();

        assert_eq!(repo.list_loans(alice).unwrap().len(), 2);
        assert_eq!(repo.list_loans(bob).unwrap().len(), 1);
        assert_eq!(repo.len(), 3);
    }

    #[test]
    fn test_update_bumps_version() {
        let repo = InMemoryLoanRepository::new();
        let stored = repo.insert_loan(loan(Uuid::new_v4())).unwrap();

        let mut changed = stored.clone();
        changed.amount_repaid = Money::from_major(100);
        let updated = repo.update_loan(changed).unwrap();

        assert_eq!(updated.version, 1);
        assert_eq!(repo.get_loan(stored.id).unwrap().unwrap().amount_repaid, Money::from_major(100));
    }

    #[test]
    fn test_stale_update_conflicts() {
        let repo = InMemoryLoanRepository::new();
        let stored = repo.insert_loan(loan(Uuid::new_v4())).unwrap();

        let first = stored.clone();
        let mut second = stored.clone();
        repo.update_loan(first).unwrap();

        second.status = LoanStatus::Liquidated;
        let err = repo.update_loan(second).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(repo.get_loan(stored.id).unwrap().unwrap().status, LoanStatus::Active);
    }

    #[test]
    fn test_update_unknown_record() {
        let repo = InMemoryLoanRepository::new();
        let err = repo.update_loan(loan(Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, LendingError::LoanNotFound { .. }));
    }
}
