//! Payment service inputs.

use chrono::NaiveDate;
use common::CustomerId;

use crate::money::Money;

use super::PaymentMethod;

/// Input for recording a payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub customer_id: CustomerId,
    pub amount: Money,
    pub method: PaymentMethod,
    /// Defaults to today when absent.
    pub payment_date: Option<NaiveDate>,
    pub reference: String,
    pub notes: String,
}

impl NewPayment {
    pub fn new(customer_id: CustomerId, amount: Money, method: PaymentMethod) -> Self {
        Self {
            customer_id,
            amount,
            method,
            payment_date: None,
            reference: String::new(),
            notes: String::new(),
        }
    }

    pub fn on(mut self, payment_date: NaiveDate) -> Self {
        self.payment_date = Some(payment_date);
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}
