pub mod evaluator;
pub mod lifecycle;

pub use evaluator::{LoanEvaluation, LoanEvaluator};
pub use lifecycle::RepaymentRequest;
