use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::decimal::{Money, Rate};
use crate::engine::LendingEngine;
use crate::errors::{LendingError, Result};
use crate::events::Event;
use crate::interest::AccrualEngine;
use crate::lending::LoanEvaluation;
use crate::payments::{PaymentContext, PaymentProcessor, PaymentResult};
use crate::state::Loan;
use crate::types::{LoanId, LoanStatus, RejectionReason, UserId};

/// one item of a batch repayment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepaymentRequest {
    pub loan_id: LoanId,
    pub amount: Money,
}

impl LendingEngine {
    /// evaluate and record a loan request.
    ///
    /// A denied request is not an error: it is persisted with status
    /// `rejected` and its reason, and returned like any other loan.
    pub fn request_loan(
        &self,
        user_id: UserId,
        amount: Money,
        time_provider: &SafeTimeProvider,
    ) -> Result<Loan> {
        let lock = self.user_locks.lock(user_id);
        let _guard = lock.acquire();
        let now = time_provider.now();

        let evaluation = self.evaluate_at(user_id, amount, now)?;
        self.originate(user_id, evaluation, now)
    }

    /// commit a previously previewed request; fails if the position moved since the preview
    pub fn commit_loan(
        &self,
        user_id: UserId,
        preview: &LoanEvaluation,
        time_provider: &SafeTimeProvider,
    ) -> Result<Loan> {
        let lock = self.user_locks.lock(user_id);
        let _guard = lock.acquire();
        let now = time_provider.now();

        let evaluation = self.evaluate_at(user_id, preview.requested_amount, now)?;
        if &evaluation != preview {
            warn!(
                %user_id,
                amount = %preview.requested_amount,
                preview_approved = preview.approved,
                approved = evaluation.approved,
                "loan preview is stale"
            );
            return Err(LendingError::ConcurrencyConflict {
                message: "position changed since the loan was previewed".to_string(),
            });
        }

        self.originate(user_id, evaluation, now)
    }

    /// persist the outcome of an evaluation; caller holds the user's lock
    fn originate(&self, user_id: UserId, evaluation: LoanEvaluation, now: DateTime<Utc>) -> Result<Loan> {
        let rate = self.config.lending_terms.default_interest_rate;
        let amount = evaluation.requested_amount;
        let collateral = evaluation.total_eligible_collateral;

        let loan = match (evaluation.rejection_reason, evaluation.projected_ltv) {
            (None, Some(projected_ltv)) => Loan::approved(
                user_id,
                amount,
                rate,
                projected_ltv,
                evaluation.health_factor,
                collateral,
                now,
            ),
            (reason, projected_ltv) => Loan::rejected(
                user_id,
                amount,
                rate,
                reason.unwrap_or(RejectionReason::NoEligibleCollateral),
                projected_ltv,
                evaluation.health_factor,
                collateral,
                now,
            ),
        };

        let loan = self.loans.insert_loan(loan)?;

        match loan.rejection_reason {
            None => {
                info!(
                    %user_id,
                    loan_id = %loan.id,
                    amount = %amount,
                    projected_ltv = %evaluation.projected_ltv.unwrap_or(Rate::ZERO).as_decimal(),
                    "loan originated"
                );
                self.emit(Event::LoanOriginated {
                    loan_id: loan.id,
                    user_id,
                    amount,
                    projected_ltv: loan.ltv_at_origination.unwrap_or(Rate::ZERO),
                    health_factor: evaluation.health_factor,
                    timestamp: now,
                });
                self.refresh_asset_locks(user_id, now);
            }
            Some(reason) => {
                info!(%user_id, loan_id = %loan.id, amount = %amount, %reason, "loan rejected");
                self.emit(Event::LoanRejected {
                    loan_id: loan.id,
                    user_id,
                    amount,
                    reason,
                    timestamp: now,
                });
            }
        }

        Ok(loan)
    }

    /// apply a repayment to an active loan: accrued interest first, then principal
    pub fn repay(
        &self,
        user_id: UserId,
        loan_id: LoanId,
        amount: Money,
        time_provider: &SafeTimeProvider,
    ) -> Result<Loan> {
        let lock = self.user_locks.lock(user_id);
        let _guard = lock.acquire();
        let now = time_provider.now();

        let mut loan = self.stored_loan(user_id, loan_id)?;
        let result = self.apply_repayment(&mut loan, amount, now)?;
        let loan = self.loans.update_loan(loan)?;

        self.record_repayment(&loan, amount, &result, now);
        self.refresh_asset_locks(user_id, now);
        Ok(loan)
    }

    /// repay several loans at once.
    ///
    /// Every item is validated against the running state of the batch before
    /// anything is written; one bad item aborts the whole batch. If a write
    /// fails part way, loans already written are restored.
    pub fn repay_batch(
        &self,
        user_id: UserId,
        requests: &[RepaymentRequest],
        time_provider: &SafeTimeProvider,
    ) -> Result<Vec<Loan>> {
        let lock = self.user_locks.lock(user_id);
        let _guard = lock.acquire();
        let now = time_provider.now();

        let mut originals: HashMap<LoanId, Loan> = HashMap::new();
        let mut staged: HashMap<LoanId, Loan> = HashMap::new();
        let mut order: Vec<LoanId> = Vec::new();
        let mut applied: Vec<(LoanId, Money, PaymentResult)> = Vec::with_capacity(requests.len());

        for request in requests {
            if !staged.contains_key(&request.loan_id) {
                let loan = self.stored_loan(user_id, request.loan_id)?;
                originals.insert(request.loan_id, loan.clone());
                staged.insert(request.loan_id, loan);
                order.push(request.loan_id);
            }
            let loan = staged
                .get_mut(&request.loan_id)
                .ok_or(LendingError::LoanNotFound { id: request.loan_id })?;
            let result = self.apply_repayment(loan, request.amount, now)?;
            applied.push((request.loan_id, request.amount, result));
        }

        let mut committed: HashMap<LoanId, Loan> = HashMap::with_capacity(order.len());
        for loan_id in &order {
            let Some(loan) = staged.remove(loan_id) else {
                continue;
            };
            match self.loans.update_loan(loan) {
                Ok(loan) => {
                    committed.insert(*loan_id, loan);
                }
                Err(error) => {
                    warn!(%user_id, %loan_id, %error, "batch repayment failed, restoring written loans");
                    self.restore_loans(&originals, &committed);
                    return Err(error);
                }
            }
        }

        for (loan_id, amount, result) in &applied {
            if let Some(loan) = committed.get(loan_id) {
                self.record_repayment(loan, *amount, result, now);
            }
        }
        self.refresh_asset_locks(user_id, now);

        Ok(order.iter().filter_map(|id| committed.remove(id)).collect())
    }

    /// close an active loan through an external liquidation process
    pub fn liquidate(
        &self,
        user_id: UserId,
        loan_id: LoanId,
        time_provider: &SafeTimeProvider,
    ) -> Result<Loan> {
        let lock = self.user_locks.lock(user_id);
        let _guard = lock.acquire();
        let now = time_provider.now();

        let mut loan = self.stored_loan(user_id, loan_id)?;
        if !loan.is_active() {
            return Err(LendingError::LoanNotActive { status: loan.status });
        }

        // freeze interest at the liquidation instant
        let interest = self.accrual().accrued_interest(&loan, now);
        let unpaid = interest.total_unpaid();
        loan.settle_interest(&interest);
        loan.transition(LoanStatus::Liquidated, now)?;
        let loan = self.loans.update_loan(loan)?;

        warn!(
            %user_id,
            loan_id = %loan.id,
            outstanding_principal = %loan.outstanding_principal(),
            unpaid_interest = %unpaid,
            "loan liquidated"
        );
        self.emit(Event::LoanLiquidated {
            loan_id: loan.id,
            outstanding_principal: loan.outstanding_principal(),
            unpaid_interest: unpaid,
            timestamp: now,
        });
        Ok(loan)
    }

    fn accrual(&self) -> AccrualEngine {
        AccrualEngine::new(self.config.day_count_convention)
    }

    /// run the waterfall against `loan` in memory
    fn apply_repayment(&self, loan: &mut Loan, amount: Money, now: DateTime<Utc>) -> Result<PaymentResult> {
        if !loan.is_active() {
            return Err(LendingError::LoanNotActive { status: loan.status });
        }

        let interest = self.accrual().accrued_interest(loan, now);
        let context = PaymentContext {
            loan_id: loan.id,
            unpaid_interest: interest.total_unpaid(),
            outstanding_principal: loan.outstanding_principal(),
        };

        let result = PaymentProcessor::new().process(amount, &context)?;
        loan.record_payment(result.application, &interest, now)?;
        Ok(result)
    }

    /// write back the pre-batch state of loans a failed batch already committed
    fn restore_loans(&self, originals: &HashMap<LoanId, Loan>, committed: &HashMap<LoanId, Loan>) {
        for (loan_id, written) in committed {
            let Some(original) = originals.get(loan_id) else {
                continue;
            };
            let mut restored = original.clone();
            restored.version = written.version;
            if let Err(error) = self.loans.update_loan(restored) {
                warn!(%loan_id, %error, "could not restore loan after failed batch");
            }
        }
    }

    fn record_repayment(&self, loan: &Loan, amount: Money, result: &PaymentResult, now: DateTime<Utc>) {
        info!(
            user_id = %loan.user_id,
            loan_id = %loan.id,
            amount = %amount,
            to_interest = %result.application.to_interest,
            to_principal = %result.application.to_principal,
            "repayment applied"
        );
        self.emit(Event::RepaymentReceived {
            loan_id: loan.id,
            amount,
            applied_to_interest: result.application.to_interest,
            applied_to_principal: result.application.to_principal,
            remaining_balance: result.remaining_balance(),
            timestamp: now,
        });

        if result.is_settled() {
            info!(loan_id = %loan.id, interest_paid = %loan.interest_paid, "loan repaid");
            self.emit(Event::LoanRepaid {
                loan_id: loan.id,
                total_interest_paid: loan.interest_paid,
                timestamp: now,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::repository::{
        AssetRepository, InMemoryAssetRepository, InMemoryLoanRepository, LoanRepository,
    };
    use crate::state::Asset;
    use crate::types::{AssetId, AssetStatus};
    use chrono::{Duration, TimeZone};
    use hourglass_rs::TimeSource;
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    /// loan store that refuses to update one chosen loan
    #[derive(Default)]
    struct FailingLoans {
        inner: InMemoryLoanRepository,
        fail_on: Mutex<Option<LoanId>>,
    }

    impl LoanRepository for FailingLoans {
        fn insert_loan(&self, loan: Loan) -> Result<Loan> {
            self.inner.insert_loan(loan)
        }

        fn get_loan(&self, id: LoanId) -> Result<Option<Loan>> {
            self.inner.get_loan(id)
        }

        fn list_loans(&self, user_id: UserId) -> Result<Vec<Loan>> {
            self.inner.list_loans(user_id)
        }

        fn update_loan(&self, loan: Loan) -> Result<Loan> {
            if *self.fail_on.lock().unwrap() == Some(loan.id) {
                return Err(LendingError::ConcurrencyConflict {
                    message: "storage unavailable".to_string(),
                });
            }
            self.inner.update_loan(loan)
        }
    }

    /// asset store whose updates always fail
    #[derive(Default)]
    struct ReadOnlyAssets {
        inner: InMemoryAssetRepository,
    }

    impl AssetRepository for ReadOnlyAssets {
        fn insert_asset(&self, asset: Asset) -> Result<Asset> {
            self.inner.insert_asset(asset)
        }

        fn get_asset(&self, id: AssetId) -> Result<Option<Asset>> {
            self.inner.get_asset(id)
        }

        fn list_assets(&self, user_id: UserId) -> Result<Vec<Asset>> {
            self.inner.list_assets(user_id)
        }

        fn update_asset(&self, _asset: Asset) -> Result<Asset> {
            Err(LendingError::ConcurrencyConflict {
                message: "storage unavailable".to_string(),
            })
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn test_time() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(start()))
    }

    /// engine with one user holding 70_000 of eligible collateral
    fn funded_engine(time: &SafeTimeProvider) -> (LendingEngine, UserId) {
        let engine = LendingEngine::in_memory(EngineConfig::default()).unwrap();
        let user = Uuid::new_v4();
        engine
            .create_asset(user, "property", Money::from_major(100_000), None, time)
            .unwrap();
        engine.take_events();
        (engine, user)
    }

    #[test]
    fn test_request_within_collateral_is_approved() {
        let time = test_time();
        let (engine, user) = funded_engine(&time);

        let loan = engine.request_loan(user, Money::from_major(50_000), &time).unwrap();

        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.activated_at, Some(start()));
        assert_eq!(loan.interest_rate.as_decimal(), dec!(0.05));
        assert_eq!(loan.ltv_at_origination.unwrap().round_dp(3).as_decimal(), dec!(0.714));
        assert_eq!(loan.health_factor_snapshot, Some(Rate::from_decimal(dec!(1.4))));
        assert_eq!(loan.collateral_value_locked, Money::from_major(70_000));

        let position = engine.position(user, &time).unwrap();
        assert_eq!(position.total_borrowed, Money::from_major(50_000));
        assert_eq!(position.available_credit, Money::from_major(20_000));
        assert!(matches!(engine.take_events().as_slice(), [Event::LoanOriginated { .. }]));
    }

    #[test]
    fn test_rejection_is_recorded_not_raised() {
        let time = test_time();
        let (engine, user) = funded_engine(&time);

        let loan = engine.request_loan(user, Money::from_major(75_000), &time).unwrap();

        assert_eq!(loan.status, LoanStatus::Rejected);
        assert_eq!(loan.rejection_reason, Some(RejectionReason::ExceedsMaximumLtv));
        assert!(loan.activated_at.is_none());
        assert_eq!(engine.list_loans(user, &time).unwrap().len(), 1);

        let position = engine.position(user, &time).unwrap();
        assert_eq!(position.total_borrowed, Money::ZERO);
        assert!(matches!(engine.take_events().as_slice(), [Event::LoanRejected { .. }]));
    }

    #[test]
    fn test_request_without_collateral() {
        let time = test_time();
        let engine = LendingEngine::in_memory(EngineConfig::default()).unwrap();

        let loan = engine.request_loan(Uuid::new_v4(), Money::from_major(1_000), &time).unwrap();
        assert_eq!(loan.status, LoanStatus::Rejected);
        assert_eq!(loan.rejection_reason, Some(RejectionReason::NoEligibleCollateral));
        assert_eq!(loan.ltv_at_origination, None);
    }

    #[test]
    fn test_request_invalid_amount_is_error() {
        let time = test_time();
        let (engine, user) = funded_engine(&time);

        assert!(matches!(
            engine.request_loan(user, Money::ZERO, &time),
            Err(LendingError::InvalidInput { .. })
        ));
        assert!(engine.list_loans(user, &time).unwrap().is_empty());
    }

    #[test]
    fn test_full_year_repayment_settles_loan() {
        let time = test_time();
        let control = time.test_control().unwrap();
        let engine = LendingEngine::in_memory(EngineConfig::default()).unwrap();
        let user = Uuid::new_v4();
        engine.create_asset(user, "property", Money::from_major(20_000), None, &time).unwrap();

        let loan = engine.request_loan(user, Money::from_major(10_000), &time).unwrap();
        control.advance(Duration::days(365));

        let position = engine.position(user, &time).unwrap();
        assert_eq!(position.total_interest, Money::from_str_exact("500.00").unwrap());

        let repaid = engine
            .repay(user, loan.id, Money::from_str_exact("10500.00").unwrap(), &time)
            .unwrap();

        assert_eq!(repaid.status, LoanStatus::Repaid);
        assert_eq!(repaid.amount_repaid, Money::from_major(10_000));
        assert_eq!(repaid.interest_paid, Money::from_major(500));
        assert_eq!(repaid.repaid_at, Some(time.now()));

        // no further accrual once repaid
        control.advance(Duration::days(100));
        let position = engine.position(user, &time).unwrap();
        assert_eq!(position.total_borrowed, Money::ZERO);
        assert_eq!(position.total_interest, Money::ZERO);
        assert_eq!(position.health_factor, None);
    }

    #[test]
    fn test_partial_repayments_are_monotonic() {
        let time = test_time();
        let control = time.test_control().unwrap();
        let (engine, user) = funded_engine(&time);
        let loan = engine.request_loan(user, Money::from_major(10_000), &time).unwrap();

        let mut last_repaid = Money::ZERO;
        for _ in 0..4 {
            control.advance(Duration::days(73));
            let updated = engine.repay(user, loan.id, Money::from_major(2_000), &time).unwrap();
            assert!(updated.amount_repaid >= last_repaid);
            assert!(updated.amount_repaid <= updated.amount);
            assert_eq!(updated.status, LoanStatus::Active);
            last_repaid = updated.amount_repaid;
        }

        // first window: 10_000 * 5% * 73/365 = 100 of interest
        let events = engine.take_events();
        let first = events
            .iter()
            .find_map(|e| match e {
                Event::RepaymentReceived { applied_to_interest, .. } => Some(*applied_to_interest),
                _ => None,
            })
            .unwrap();
        assert_eq!(first, Money::from_major(100));

        let loan = engine.get_loan(user, loan.id, &time).unwrap();
        let position = engine.position(user, &time).unwrap();
        let payoff = position.outstanding_debt();
        assert_eq!(payoff, loan.outstanding_principal());

        let settled = engine.repay(user, loan.id, payoff, &time).unwrap();
        assert_eq!(settled.status, LoanStatus::Repaid);
        assert!(settled.outstanding_principal().is_zero());
        assert!(settled.accrued_interest.is_zero());
    }

    #[test]
    fn test_interest_only_payment_resets_window() {
        let time = test_time();
        let control = time.test_control().unwrap();
        let (engine, user) = funded_engine(&time);
        let loan = engine.request_loan(user, Money::from_major(10_000), &time).unwrap();

        control.advance(Duration::days(73));
        let updated = engine.repay(user, loan.id, Money::from_major(60), &time).unwrap();
        assert_eq!(updated.amount_repaid, Money::ZERO);
        assert_eq!(updated.accrued_interest, Money::from_major(40));

        control.advance(Duration::days(73));
        let position = engine.position(user, &time).unwrap();
        assert_eq!(position.total_interest, Money::from_major(140));
    }

    #[test]
    fn test_overpayment_rejected() {
        let time = test_time();
        let control = time.test_control().unwrap();
        let (engine, user) = funded_engine(&time);
        let loan = engine.request_loan(user, Money::from_major(10_000), &time).unwrap();
        control.advance(Duration::days(365));

        let err = engine
            .repay(user, loan.id, Money::from_str_exact("10500.01").unwrap(), &time)
            .unwrap_err();
        assert!(matches!(err, LendingError::OverpaymentNotAllowed { .. }));

        let unchanged = engine.get_loan(user, loan.id, &time).unwrap();
        assert_eq!(unchanged.amount_repaid, Money::ZERO);
        assert_eq!(unchanged.version, loan.version);
    }

    #[test]
    fn test_repay_guards() {
        let time = test_time();
        let (engine, user) = funded_engine(&time);
        let rejected = engine.request_loan(user, Money::from_major(90_000), &time).unwrap();
        let active = engine.request_loan(user, Money::from_major(1_000), &time).unwrap();

        assert!(matches!(
            engine.repay(user, rejected.id, Money::from_major(10), &time),
            Err(LendingError::LoanNotActive { status: LoanStatus::Rejected })
        ));
        assert!(matches!(
            engine.repay(user, active.id, Money::ZERO, &time),
            Err(LendingError::InvalidInput { .. })
        ));
        assert!(matches!(
            engine.repay(Uuid::new_v4(), active.id, Money::from_major(10), &time),
            Err(LendingError::NotLoanOwner { .. })
        ));
        assert!(matches!(
            engine.repay(user, Uuid::new_v4(), Money::from_major(10), &time),
            Err(LendingError::LoanNotFound { .. })
        ));
    }

    #[test]
    fn test_commit_matches_preview() {
        let time = test_time();
        let (engine, user) = funded_engine(&time);

        let preview = engine.evaluate_loan(user, Money::from_major(30_000), &time).unwrap();
        let again = engine.evaluate_loan(user, Money::from_major(30_000), &time).unwrap();
        assert_eq!(preview, again);
        assert!(engine.list_loans(user, &time).unwrap().is_empty());

        let loan = engine.commit_loan(user, &preview, &time).unwrap();
        assert_eq!(loan.status, LoanStatus::Active);
    }

    #[test]
    fn test_stale_preview_conflicts() {
        let time = test_time();
        let (engine, user) = funded_engine(&time);

        let preview = engine.evaluate_loan(user, Money::from_major(40_000), &time).unwrap();
        assert!(preview.approved);

        engine.request_loan(user, Money::from_major(40_000), &time).unwrap();

        let err = engine.commit_loan(user, &preview, &time).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(engine.list_loans(user, &time).unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_requests_cannot_overdraw() {
        let time = test_time();
        let (engine, user) = funded_engine(&time);
        let max = engine
            .evaluate_loan(user, Money::CENT, &time)
            .unwrap()
            .max_additional_borrow;
        assert_eq!(max, Money::from_major(70_000));

        let results: Vec<Loan> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let engine = &engine;
                    scope.spawn(move || {
                        let time = SafeTimeProvider::new(TimeSource::Test(start()));
                        engine.request_loan(user, max, &time).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let approved = results.iter().filter(|l| l.status == LoanStatus::Active).count();
        let rejected = results.iter().filter(|l| l.status == LoanStatus::Rejected).count();
        assert_eq!(approved, 1);
        assert_eq!(rejected, 1);

        let position = engine.position(user, &time).unwrap();
        assert_eq!(position.total_borrowed, max);
        assert_eq!(position.available_credit, Money::ZERO);
    }

    #[test]
    fn test_batch_repayment() {
        let time = test_time();
        let (engine, user) = funded_engine(&time);
        let a = engine.request_loan(user, Money::from_major(1_000), &time).unwrap();
        let b = engine.request_loan(user, Money::from_major(2_000), &time).unwrap();

        let loans = engine
            .repay_batch(
                user,
                &[
                    RepaymentRequest { loan_id: a.id, amount: Money::from_major(1_000) },
                    RepaymentRequest { loan_id: b.id, amount: Money::from_major(500) },
                    RepaymentRequest { loan_id: b.id, amount: Money::from_major(500) },
                ],
                &time,
            )
            .unwrap();

        assert_eq!(loans.len(), 2);
        assert_eq!(loans[0].status, LoanStatus::Repaid);
        assert_eq!(loans[1].amount_repaid, Money::from_major(1_000));
        assert_eq!(loans[1].status, LoanStatus::Active);
    }

    #[test]
    fn test_batch_aborts_before_writing() {
        let time = test_time();
        let (engine, user) = funded_engine(&time);
        let a = engine.request_loan(user, Money::from_major(1_000), &time).unwrap();
        let b = engine.request_loan(user, Money::from_major(2_000), &time).unwrap();

        let err = engine
            .repay_batch(
                user,
                &[
                    RepaymentRequest { loan_id: a.id, amount: Money::from_major(1_000) },
                    RepaymentRequest { loan_id: b.id, amount: Money::from_major(2_001) },
                ],
                &time,
            )
            .unwrap_err();
        assert!(matches!(err, LendingError::OverpaymentNotAllowed { .. }));

        assert_eq!(engine.get_loan(user, a.id, &time).unwrap().status, LoanStatus::Active);
        assert_eq!(engine.get_loan(user, a.id, &time).unwrap().amount_repaid, Money::ZERO);
    }

    #[test]
    fn test_liquidation_freezes_interest() {
        let time = test_time();
        let control = time.test_control().unwrap();
        let (engine, user) = funded_engine(&time);
        let loan = engine.request_loan(user, Money::from_major(10_000), &time).unwrap();

        control.advance(Duration::days(73));
        let liquidated = engine.liquidate(user, loan.id, &time).unwrap();
        assert_eq!(liquidated.status, LoanStatus::Liquidated);
        assert_eq!(liquidated.liquidated_at, Some(time.now()));
        assert_eq!(liquidated.accrued_interest, Money::from_major(100));

        control.advance(Duration::days(365));
        let frozen = engine.accrual().accrued_interest(&liquidated, time.now());
        assert_eq!(frozen.total_unpaid(), Money::from_major(100));

        assert!(matches!(
            engine.repay(user, loan.id, Money::from_major(10), &time),
            Err(LendingError::LoanNotActive { status: LoanStatus::Liquidated })
        ));
        assert!(matches!(
            engine.liquidate(user, loan.id, &time),
            Err(LendingError::LoanNotActive { .. })
        ));
    }

    #[test]
    fn test_asset_lock_policy() {
        let time = test_time();
        let mut config = EngineConfig::default();
        config.asset_lock_ltv = Some(Rate::from_percentage(80));
        let engine = LendingEngine::in_memory(config).unwrap();
        let user = Uuid::new_v4();
        engine.create_asset(user, "property", Money::from_major(100_000), None, &time).unwrap();

        let small = engine.request_loan(user, Money::from_major(20_000), &time).unwrap();
        assert!(engine.list_assets(user).unwrap().iter().all(|a| a.status == AssetStatus::Active));

        engine.request_loan(user, Money::from_major(40_000), &time).unwrap();
        let assets = engine.list_assets(user).unwrap();
        assert!(assets.iter().all(|a| a.status == AssetStatus::Locked));

        // locked collateral still counts toward the position
        let position = engine.position(user, &time).unwrap();
        assert_eq!(position.total_eligible_collateral, Money::from_major(70_000));

        engine.repay(user, small.id, Money::from_major(20_000), &time).unwrap();
        assert!(engine.list_assets(user).unwrap().iter().all(|a| a.status == AssetStatus::Active));

        let changes = engine
            .take_events()
            .into_iter()
            .filter(|e| matches!(e, Event::AssetStatusChanged { .. }))
            .count();
        assert_eq!(changes, 2);
    }

    #[test]
    fn test_frequent_small_repayments_still_accrue() {
        let time = test_time();
        let control = time.test_control().unwrap();
        let (engine, user) = funded_engine(&time);
        let loan = engine.request_loan(user, Money::from_major(10_000), &time).unwrap();

        // a cent every 23 hours for a year: no window is a whole day on its own
        for _ in 0..381 {
            control.advance(Duration::hours(23));
            engine.repay(user, loan.id, Money::CENT, &time).unwrap();
        }
        assert_eq!(engine.accrual().calculate_days(start(), time.now()), 365);

        let loan = engine.get_loan(user, loan.id, &time).unwrap();
        assert_eq!(loan.amount_repaid, Money::CENT);
        assert_eq!(loan.interest_paid, Money::from_str_exact("3.80").unwrap());

        // 365 daily windows of 1.37 against 500.00 uninterrupted
        let charged = loan.interest_paid + loan.accrued_interest;
        assert!(charged >= Money::from_str_exact("499.90").unwrap(), "charged {charged}");
        assert!(charged <= Money::from_str_exact("500.10").unwrap(), "charged {charged}");
    }

    #[test]
    fn test_loan_reads_report_current_interest() {
        let time = test_time();
        let control = time.test_control().unwrap();
        let (engine, user) = funded_engine(&time);
        let loan = engine.request_loan(user, Money::from_major(10_000), &time).unwrap();
        assert_eq!(loan.accrued_interest, Money::ZERO);

        control.advance(Duration::days(365));
        let listed = engine.list_loans(user, &time).unwrap();
        assert_eq!(listed[0].accrued_interest, Money::from_major(500));
        assert_eq!(engine.get_loan(user, loan.id, &time).unwrap().accrued_interest, Money::from_major(500));

        // the stored record is untouched by reads
        let stored = engine.loans.get_loan(loan.id).unwrap().unwrap();
        assert_eq!(stored.accrued_interest, Money::ZERO);
        assert_eq!(stored.version, loan.version);

        let repaid = engine
            .repay(user, loan.id, Money::from_str_exact("10500.00").unwrap(), &time)
            .unwrap();
        assert_eq!(repaid.status, LoanStatus::Repaid);
        assert_eq!(repaid.interest_paid, Money::from_major(500));
    }

    #[test]
    fn test_lock_policy_failure_keeps_committed_change() {
        let time = test_time();
        let mut config = EngineConfig::default();
        config.asset_lock_ltv = Some(Rate::from_percentage(50));
        let engine = LendingEngine::new(
            config,
            Arc::new(ReadOnlyAssets::default()),
            Arc::new(InMemoryLoanRepository::new()),
        )
        .unwrap();
        let user = Uuid::new_v4();
        engine.create_asset(user, "property", Money::from_major(100_000), None, &time).unwrap();

        // 60% ltv wants to lock the asset, which the store refuses
        let loan = engine.request_loan(user, Money::from_major(42_000), &time).unwrap();
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(engine.list_assets(user).unwrap()[0].status, AssetStatus::Active);

        let repaid = engine.repay(user, loan.id, Money::from_major(1_000), &time).unwrap();
        assert_eq!(repaid.amount_repaid, Money::from_major(1_000));
        assert_eq!(engine.get_loan(user, loan.id, &time).unwrap().amount_repaid, Money::from_major(1_000));
    }

    #[test]
    fn test_batch_write_failure_restores_loans() {
        let time = test_time();
        let loans = Arc::new(FailingLoans::default());
        let engine = LendingEngine::new(
            EngineConfig::default(),
            Arc::new(InMemoryAssetRepository::new()),
            loans.clone(),
        )
        .unwrap();
        let user = Uuid::new_v4();
        engine.create_asset(user, "property", Money::from_major(100_000), None, &time).unwrap();
        let a = engine.request_loan(user, Money::from_major(1_000), &time).unwrap();
        let b = engine.request_loan(user, Money::from_major(2_000), &time).unwrap();
        engine.take_events();

        *loans.fail_on.lock().unwrap() = Some(b.id);
        let err = engine
            .repay_batch(
                user,
                &[
                    RepaymentRequest { loan_id: a.id, amount: Money::from_major(1_000) },
                    RepaymentRequest { loan_id: b.id, amount: Money::from_major(500) },
                ],
                &time,
            )
            .unwrap_err();
        assert!(err.is_retryable());

        let a = engine.get_loan(user, a.id, &time).unwrap();
        assert_eq!(a.status, LoanStatus::Active);
        assert_eq!(a.amount_repaid, Money::ZERO);
        assert!(engine.take_events().is_empty());
        assert_eq!(engine.position(user, &time).unwrap().total_borrowed, Money::from_major(3_000));
    }
}
