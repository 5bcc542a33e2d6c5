pub mod ltv;
pub mod risk;
pub mod valuation;

pub use ltv::LtvCalculator;
pub use risk::RiskClassifier;
pub use valuation::{Valuation, ValuationEngine};
