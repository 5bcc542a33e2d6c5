use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::LendingError;

/// unique identifier for a user; supplied by the calling layer
pub type UserId = Uuid;

/// unique identifier for a pledged asset
pub type AssetId = Uuid;

/// unique identifier for a loan
pub type LoanId = Uuid;

/// kinds of collateral accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Property,
    Crypto,
    Car,
}

impl AssetType {
    pub const ALL: [AssetType; 3] = [AssetType::Property, AssetType::Crypto, AssetType::Car];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Property => "property",
            AssetType::Crypto => "crypto",
            AssetType::Car => "car",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = LendingError;

    /// case-insensitive, surrounding whitespace ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        AssetType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or(LendingError::UnsupportedAssetType { asset_type: normalized })
    }
}

/// asset status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    /// counted as collateral, free to be pledged
    Active,
    /// counted as collateral, pledged beyond the lock threshold
    Locked,
    /// appraisal produced no eligible collateral
    Rejected,
}

impl AssetStatus {
    /// whether the asset contributes to eligible collateral
    pub fn is_eligible(&self) -> bool {
        !matches!(self, AssetStatus::Rejected)
    }
}

/// loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// recorded but not yet activated
    Pending,
    /// disbursed and accruing
    Active,
    /// principal and interest fully settled
    Repaid,
    /// evaluated and denied
    Rejected,
    /// closed by an external liquidation process
    Liquidated,
}

impl LoanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Repaid | LoanStatus::Rejected | LoanStatus::Liquidated)
    }

    /// allowed transitions of the loan state machine
    pub fn can_transition_to(&self, next: LoanStatus) -> bool {
        matches!(
            (self, next),
            (LoanStatus::Pending, LoanStatus::Active)
                | (LoanStatus::Pending, LoanStatus::Rejected)
                | (LoanStatus::Active, LoanStatus::Repaid)
                | (LoanStatus::Active, LoanStatus::Liquidated)
        )
    }
}

/// qualitative risk bucket for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

/// why a loan request was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    NoEligibleCollateral,
    ExceedsMaximumLtv,
    InsufficientHealthFactor,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectionReason::NoEligibleCollateral => "no eligible collateral",
            RejectionReason::ExceedsMaximumLtv => "exceeds maximum loan-to-value",
            RejectionReason::InsufficientHealthFactor => "insufficient health factor",
        };
        f.write_str(text)
    }
}

/// split of a repayment between interest and principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PaymentApplication {
    pub to_interest: Money,
    pub to_principal: Money,
}

impl PaymentApplication {
    pub fn total_applied(&self) -> Money {
        self.to_interest + self.to_principal
    }
}
