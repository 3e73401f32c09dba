//! Invoice service inputs.

use chrono::NaiveDate;
use common::CustomerId;

use crate::money::{Money, TaxRate};

/// Input for creating a draft invoice.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub customer_id: CustomerId,
    pub due_date: NaiveDate,
    pub tax_rate: TaxRate,
    pub notes: String,
}

impl NewInvoice {
    /// A new invoice at the standard PPN rate with no notes.
    pub fn new(customer_id: CustomerId, due_date: NaiveDate) -> Self {
        Self {
            customer_id,
            due_date,
            tax_rate: TaxRate::default(),
            notes: String::new(),
        }
    }

    pub fn with_tax_rate(mut self, tax_rate: TaxRate) -> Self {
        self.tax_rate = tax_rate;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// Input for adding a line to a draft invoice.
#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl NewLineItem {
    pub fn new(description: impl Into<String>, quantity: u32, unit_price: Money) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
        }
    }
}
