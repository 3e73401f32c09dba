//! Invoice line items.

use common::{InvoiceId, LineItemId};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::Money;

/// A billed line on an invoice.
///
/// `amount` always equals `quantity * unit_price`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LineItemRecord", into = "LineItemRecord")]
pub struct LineItem {
    id: LineItemId,
    invoice_id: InvoiceId,
    description: String,
    quantity: u32,
    unit_price: Money,
    amount: Money,
}

/// Field-for-field form of a [`LineItem`], as read from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemRecord {
    pub id: LineItemId,
    pub invoice_id: InvoiceId,
    pub description: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub amount: Money,
}

impl LineItem {
    /// Creates a line item, computing its amount.
    pub fn new(
        invoice_id: InvoiceId,
        description: &str,
        quantity: u32,
        unit_price: Money,
    ) -> Result<Self, ValidationError> {
        let description = description.trim();
        Self::validate_inputs(description, quantity, unit_price)?;
        let amount = unit_price
            .checked_multiply(quantity)
            .ok_or(ValidationError::AmountOverflow)?;

        Ok(Self {
            id: LineItemId::new(),
            invoice_id,
            description: description.to_string(),
            quantity,
            unit_price,
            amount,
        })
    }

    fn validate_inputs(
        description: &str,
        quantity: u32,
        unit_price: Money,
    ) -> Result<(), ValidationError> {
        if description.trim().is_empty() {
            return Err(ValidationError::BlankDescription);
        }
        if quantity == 0 {
            return Err(ValidationError::InvalidQuantity);
        }
        if unit_price.is_negative() {
            return Err(ValidationError::NegativeUnitPrice);
        }
        Ok(())
    }

    pub fn id(&self) -> LineItemId {
        self.id
    }

    pub fn invoice_id(&self) -> InvoiceId {
        self.invoice_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn amount(&self) -> Money {
        self.amount
    }
}

impl TryFrom<LineItemRecord> for LineItem {
    type Error = ValidationError;

    fn try_from(record: LineItemRecord) -> Result<Self, Self::Error> {
        Self::validate_inputs(&record.description, record.quantity, record.unit_price)?;
        if record.unit_price.checked_multiply(record.quantity) != Some(record.amount) {
            return Err(ValidationError::InconsistentLineAmount);
        }
        Ok(Self {
            id: record.id,
            invoice_id: record.invoice_id,
            description: record.description,
            quantity: record.quantity,
            unit_price: record.unit_price,
            amount: record.amount,
        })
    }
}

impl From<LineItem> for LineItemRecord {
    fn from(item: LineItem) -> Self {
        Self {
            id: item.id,
            invoice_id: item.invoice_id,
            description: item.description,
            quantity: item.quantity,
            unit_price: item.unit_price,
            amount: item.amount,
        }
    }
}
