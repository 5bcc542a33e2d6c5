use thiserror::Error;
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::LoanStatus;

#[derive(Error, Debug)]
pub enum LendingError {
    #[error("invalid input: {message}")]
    InvalidInput {
        message: String,
    },

    #[error("unsupported asset type: {asset_type}")]
    UnsupportedAssetType {
        asset_type: String,
    },

    #[error("asset not found: {id}")]
    AssetNotFound {
        id: Uuid,
    },

    #[error("loan not found: {id}")]
    LoanNotFound {
        id: Uuid,
    },

    #[error("loan {loan_id} does not belong to user {user_id}")]
    NotLoanOwner {
        loan_id: Uuid,
        user_id: Uuid,
    },

    #[error("loan not active: current status is {status:?}")]
    LoanNotActive {
        status: LoanStatus,
    },

    #[error("overpayment not allowed: outstanding {outstanding}, requested {requested}")]
    OverpaymentNotAllowed {
        requested: Money,
        outstanding: Money,
    },

    #[error("concurrency conflict: {message}")]
    ConcurrencyConflict {
        message: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LendingError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        LendingError::InvalidInput {
            message: message.into(),
        }
    }

    /// whether the caller should retry the whole evaluate+commit sequence
    pub fn is_retryable(&self) -> bool {
        matches!(self, LendingError::ConcurrencyConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, LendingError>;

/// reject zero and negative amounts
pub(crate) fn require_positive(amount: Money, field: &str) -> Result<()> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(LendingError::invalid_input(format!(
            "{} must be positive, got {}",
            field, amount
        )))
    }
}
