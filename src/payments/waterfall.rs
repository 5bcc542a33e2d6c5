use crate::decimal::Money;
use crate::errors::Result;
use crate::types::PaymentApplication;

use super::PaymentContext;

/// splits repayments: accrued interest first, then principal
#[derive(Debug, Default)]
pub struct PaymentProcessor;

/// outcome of running a payment through the waterfall
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentResult {
    pub application: PaymentApplication,
    pub remaining_interest: Money,
    pub remaining_principal: Money,
}

impl PaymentResult {
    pub fn remaining_balance(&self) -> Money {
        self.remaining_interest + self.remaining_principal
    }

    pub fn is_settled(&self) -> bool {
        self.remaining_balance().is_zero()
    }
}

impl PaymentProcessor {
    pub fn new() -> Self {
        Self
    }

    /// validate and split `amount`; the context is left untouched
    pub fn process(&self, amount: Money, context: &PaymentContext) -> Result<PaymentResult> {
        context.validate_payment(amount)?;

        let to_interest = amount.min(context.unpaid_interest);
        let to_principal = (amount - to_interest).min(context.outstanding_principal);

        Ok(PaymentResult {
            application: PaymentApplication {
                to_interest,
                to_principal,
            },
            remaining_interest: context.unpaid_interest - to_interest,
            remaining_principal: context.outstanding_principal - to_principal,
        })
    }
}
