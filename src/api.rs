//! Request and response views for the service boundary. Amounts arrive as
//! decimal strings and are rounded to cents when parsed.

use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};

use crate::collateral::Valuation;
use crate::decimal::{Money, Rate};
use crate::engine::LendingEngine;
use crate::errors::Result;
use crate::lending::{LoanEvaluation, RepaymentRequest};
use crate::position::Position;
use crate::state::{Asset, Loan};
use crate::types::{AssetType, LoanId, RiskTier, UserId};

/// body of `POST /assets/preview` and `POST /assets`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRequest {
    #[serde(rename = "type")]
    pub asset_type: String,
    pub stated_value: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// body of `POST /loans/evaluate` and `POST /loans`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub amount: Money,
}

/// body of `POST /loans/{id}/repay`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepayRequest {
    pub amount: Money,
}

/// response of `POST /assets/preview`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPreview {
    pub asset_type: AssetType,
    pub stated_value: Money,
    pub ltv_ratio: Rate,
    pub appraised_value: Money,
    pub risk_tier: RiskTier,
}

impl From<Valuation> for AssetPreview {
    fn from(valuation: Valuation) -> Self {
        AssetPreview {
            asset_type: valuation.asset_type,
            stated_value: valuation.stated_value,
            ltv_ratio: valuation.ltv_ratio,
            appraised_value: valuation.appraised_value,
            risk_tier: valuation.risk_tier,
        }
    }
}

/// convert to pretty-printed json string
pub fn to_json_pretty<T: Serialize>(view: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(view)?)
}

/// parse a request body
pub fn from_json<'de, T: Deserialize<'de>>(body: &'de str) -> Result<T> {
    Ok(serde_json::from_str(body)?)
}

/// endpoint handlers for one authenticated user.
///
/// Routing and authentication live outside the crate; the caller resolves
/// the user and hands it in.
pub struct LendingApi<'a> {
    engine: &'a LendingEngine,
    time_provider: &'a SafeTimeProvider,
}

impl<'a> LendingApi<'a> {
    pub fn new(engine: &'a LendingEngine, time_provider: &'a SafeTimeProvider) -> Self {
        Self { engine, time_provider }
    }

    /// `POST /assets/preview`
    pub fn preview_asset(&self, request: &AssetRequest) -> Result<AssetPreview> {
        Ok(self.engine.preview_asset(&request.asset_type, request.stated_value)?.into())
    }

    /// `POST /assets`
    pub fn create_asset(&self, user_id: UserId, request: AssetRequest) -> Result<Asset> {
        self.engine.create_asset(
            user_id,
            &request.asset_type,
            request.stated_value,
            request.description,
            self.time_provider,
        )
    }

    /// `GET /assets`
    pub fn list_assets(&self, user_id: UserId) -> Result<Vec<Asset>> {
        self.engine.list_assets(user_id)
    }

    /// `POST /loans/evaluate`
    pub fn evaluate_loan(&self, user_id: UserId, request: LoanRequest) -> Result<LoanEvaluation> {
        self.engine.evaluate_loan(user_id, request.amount, self.time_provider)
    }

    /// `POST /loans`; a rejected loan is a normal response
    pub fn request_loan(&self, user_id: UserId, request: LoanRequest) -> Result<Loan> {
        self.engine.request_loan(user_id, request.amount, self.time_provider)
    }

    /// `GET /loans`
    pub fn list_loans(&self, user_id: UserId) -> Result<Vec<Loan>> {
        self.engine.list_loans(user_id, self.time_provider)
    }

    /// `POST /loans/{id}/repay`
    pub fn repay(&self, user_id: UserId, loan_id: LoanId, request: RepayRequest) -> Result<Loan> {
        self.engine.repay(user_id, loan_id, request.amount, self.time_provider)
    }

    /// `POST /loans/repay/batch`
    pub fn repay_batch(&self, user_id: UserId, requests: &[RepaymentRequest]) -> Result<Vec<Loan>> {
        self.engine.repay_batch(user_id, requests, self.time_provider)
    }

    /// `GET /position`
    pub fn position(&self, user_id: UserId) -> Result<Position> {
        self.engine.position(user_id, self.time_provider)
    }
}
