pub mod api;
pub mod collateral;
pub mod config;
pub mod decimal;
pub mod engine;
pub mod errors;
pub mod events;
pub mod interest;
pub mod lending;
pub mod payments;
pub mod position;
pub mod repository;
pub mod state;
pub mod types;

// re-export key types
pub use api::{AssetPreview, AssetRequest, LendingApi, LoanRequest, RepayRequest};
pub use collateral::{LtvCalculator, RiskClassifier, Valuation, ValuationEngine};
pub use config::{AssetTerms, EngineConfig, LendingTerms, RiskTierBreakpoints};
pub use decimal::{Money, Rate};
pub use engine::LendingEngine;
pub use errors::{LendingError, Result};
pub use events::{Event, EventStore};
pub use interest::{AccrualEngine, DayCountConvention, InterestCalculation};
pub use lending::{LoanEvaluation, LoanEvaluator, RepaymentRequest};
pub use payments::{PaymentContext, PaymentProcessor, PaymentResult};
pub use position::{Position, PositionAggregator};
pub use repository::{
    AssetRepository, InMemoryAssetRepository, InMemoryLoanRepository, LoanRepository,
};
pub use state::{Asset, Loan};
pub use types::{
    AssetId, AssetStatus, AssetType, LoanId, LoanStatus, PaymentApplication, RejectionReason,
    RiskTier, UserId,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
