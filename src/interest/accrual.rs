use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::state::Loan;
use crate::types::LoanStatus;

/// day count convention for interest calculations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayCountConvention {
    /// actual days / 365
    Actual365,
    /// actual days / 360
    Actual360,
}

impl DayCountConvention {
    pub fn year_basis(&self) -> u32 {
        match self {
            DayCountConvention::Actual365 => 365,
            DayCountConvention::Actual360 => 360,
        }
    }
}

/// interest owed on a loan as of a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct InterestCalculation {
    /// unpaid interest carried from the last checkpoint
    pub carried: Money,
    /// interest accrued since the last checkpoint
    pub accrued_since_checkpoint: Money,
    pub days: u32,
    pub principal_base: Money,
    /// end of the last whole day counted; the partial day after it is still owed
    pub accrued_through: Option<DateTime<Utc>>,
    pub as_of: DateTime<Utc>,
}

impl InterestCalculation {
    pub fn total_unpaid(&self) -> Money {
        self.carried + self.accrued_since_checkpoint
    }
}

/// computes simple interest on read; nothing is stored incrementally
pub struct AccrualEngine {
    pub convention: DayCountConvention,
}

impl AccrualEngine {
    pub fn new(convention: DayCountConvention) -> Self {
        Self { convention }
    }

    /// whole days elapsed, never negative
    pub fn calculate_days(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
        (end - start).num_days().max(0) as u32
    }

    /// principal × rate × days / basis
    pub fn calculate_simple_interest(&self, principal: Money, annual_rate: Rate, days: u32) -> Money {
        let interest = principal.as_decimal() * annual_rate.as_decimal() * Decimal::from(days)
            / Decimal::from(self.convention.year_basis());
        Money::from_decimal(interest)
    }

    /// unpaid interest on `loan` as of `as_of`.
    ///
    /// Active loans accrue on their outstanding principal from the last
    /// checkpoint (activation, then each repayment). Repaid and liquidated
    /// loans are frozen at their terminal timestamp. Pending and rejected
    /// loans, or loans never activated, owe nothing.
    pub fn accrued_interest(&self, loan: &Loan, as_of: DateTime<Utc>) -> InterestCalculation {
        let zero = InterestCalculation {
            carried: Money::ZERO,
            accrued_since_checkpoint: Money::ZERO,
            days: 0,
            principal_base: Money::ZERO,
            accrued_through: None,
            as_of,
        };

        let checkpoint = match loan.interest_checkpoint() {
            Some(checkpoint) => checkpoint,
            None => return zero,
        };

        let end = match loan.status {
            LoanStatus::Pending | LoanStatus::Rejected => return zero,
            LoanStatus::Active => as_of,
            LoanStatus::Repaid | LoanStatus::Liquidated => {
                let terminal = loan.terminal_at().unwrap_or(as_of);
                terminal.min(as_of)
            }
        };

        let principal = loan.outstanding_principal();
        let days = self.calculate_days(checkpoint, end);

        InterestCalculation {
            carried: loan.accrued_interest,
            accrued_since_checkpoint: self.calculate_simple_interest(principal, loan.interest_rate, days),
            days,
            principal_base: principal,
            accrued_through: Some(checkpoint + Duration::days(i64::from(days))),
            as_of,
        }
    }
}

impl Default for AccrualEngine {
    fn default() -> Self {
        Self::new(DayCountConvention::Actual365)
    }
}
