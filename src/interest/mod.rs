pub mod accrual;

pub use accrual::{AccrualEngine, DayCountConvention, InterestCalculation};
