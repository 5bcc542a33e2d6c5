use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::types::{AssetId, AssetStatus, AssetType, LoanId, RejectionReason, UserId};

/// audit events emitted by mutating operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // asset events
    AssetDeposited {
        asset_id: AssetId,
        user_id: UserId,
        asset_type: AssetType,
        stated_value: Money,
        appraised_value: Money,
        timestamp: DateTime<Utc>,
    },
    AssetRejected {
        asset_id: AssetId,
        user_id: UserId,
        stated_value: Money,
        timestamp: DateTime<Utc>,
    },
    AssetStatusChanged {
        asset_id: AssetId,
        old_status: AssetStatus,
        new_status: AssetStatus,
        position_ltv: Option<Rate>,
        timestamp: DateTime<Utc>,
    },

    // loan events
    LoanOriginated {
        loan_id: LoanId,
        user_id: UserId,
        amount: Money,
        projected_ltv: Rate,
        health_factor: Rate,
        timestamp: DateTime<Utc>,
    },
    LoanRejected {
        loan_id: LoanId,
        user_id: UserId,
        amount: Money,
        reason: RejectionReason,
        timestamp: DateTime<Utc>,
    },
    RepaymentReceived {
        loan_id: LoanId,
        amount: Money,
        applied_to_interest: Money,
        applied_to_principal: Money,
        remaining_balance: Money,
        timestamp: DateTime<Utc>,
    },
    LoanRepaid {
        loan_id: LoanId,
        total_interest_paid: Money,
        timestamp: DateTime<Utc>,
    },
    LoanLiquidated {
        loan_id: LoanId,
        outstanding_principal: Money,
        unpaid_interest: Money,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}
