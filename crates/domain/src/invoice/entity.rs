//! The invoice entity and its derived operations.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use common::{CustomerId, InvoiceId};
use serde::{Deserialize, Serialize};

use crate::error::{TransitionError, ValidationError};
use crate::money::{Money, TaxRate};

use super::{InvoiceStatus, LineItem};

/// A sales invoice issued to a customer.
///
/// Invariants, checked on every construction:
/// - `total_amount == subtotal + tax_amount`
/// - `tax_amount == round(subtotal * tax_rate / 100)`
/// - `0 <= paid_amount <= total_amount`
/// - `due_date >= invoice_date`
///
/// Operations never mutate in place; they return the replacement invoice,
/// which the caller persists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "InvoiceRecord", into = "InvoiceRecord")]
pub struct Invoice {
    id: InvoiceId,
    invoice_number: String,
    customer_id: CustomerId,
    invoice_date: NaiveDate,
    due_date: NaiveDate,
    status: InvoiceStatus,
    subtotal: Money,
    tax_rate: TaxRate,
    tax_amount: Money,
    total_amount: Money,
    paid_amount: Money,
    notes: String,
    created_at: DateTime<Utc>,
}

/// Field-for-field form of an [`Invoice`], as read from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub id: InvoiceId,
    pub invoice_number: String,
    pub customer_id: CustomerId,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub subtotal: Money,
    pub tax_rate: TaxRate,
    pub tax_amount: Money,
    pub total_amount: Money,
    pub paid_amount: Money,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    /// Formats an invoice number: `INV/<year>/<5-digit sequence>`.
    pub fn generate_number(date: NaiveDate, sequence: u32) -> String {
        format!("INV/{}/{:05}", date.year(), sequence)
    }

    /// Creates a new draft invoice with zero totals.
    pub fn draft(
        invoice_number: String,
        customer_id: CustomerId,
        invoice_date: NaiveDate,
        due_date: NaiveDate,
        tax_rate: TaxRate,
        notes: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        Self::try_from(InvoiceRecord {
            id: InvoiceId::new(),
            invoice_number,
            customer_id,
            invoice_date,
            due_date,
            status: InvoiceStatus::Draft,
            subtotal: Money::zero(),
            tax_rate,
            tax_amount: Money::zero(),
            total_amount: Money::zero(),
            paid_amount: Money::zero(),
            notes: notes.trim().to_string(),
            created_at,
        })
    }

    fn validate(record: &InvoiceRecord) -> Result<(), ValidationError> {
        if record.invoice_number.trim().is_empty() {
            return Err(ValidationError::BlankDocumentNumber);
        }
        if record.due_date < record.invoice_date {
            return Err(ValidationError::DueBeforeInvoiceDate);
        }
        if record.tax_rate.percent().is_sign_negative() && !record.tax_rate.percent().is_zero() {
            return Err(ValidationError::NegativeTaxRate);
        }
        if record.subtotal.is_negative() {
            return Err(ValidationError::InconsistentTotals);
        }
        let expected_tax = record
            .tax_rate
            .tax_on(record.subtotal)
            .ok_or(ValidationError::AmountOverflow)?;
        if record.tax_amount != expected_tax
            || record.subtotal.checked_add(record.tax_amount) != Some(record.total_amount)
        {
            return Err(ValidationError::InconsistentTotals);
        }
        Self::validate_paid(record.paid_amount, record.total_amount)
    }

    fn validate_paid(paid: Money, total: Money) -> Result<(), ValidationError> {
        if paid.is_negative() {
            return Err(ValidationError::NegativePaidAmount);
        }
        if paid > total {
            return Err(ValidationError::PaidExceedsTotal { paid, total });
        }
        Ok(())
    }

    pub fn id(&self) -> InvoiceId {
        self.id
    }

    pub fn invoice_number(&self) -> &str {
        &self.invoice_number
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn invoice_date(&self) -> NaiveDate {
        self.invoice_date
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn tax_rate(&self) -> TaxRate {
        self.tax_rate
    }

    pub fn tax_amount(&self) -> Money {
        self.tax_amount
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn paid_amount(&self) -> Money {
        self.paid_amount
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Remaining amount owed, floored at zero.
    pub fn balance_due(&self) -> Money {
        self.total_amount.saturating_sub_floor(self.paid_amount)
    }

    /// Returns true if `today` is past the due date and the invoice is still open.
    ///
    /// This is a date predicate only; it does not change the stored status.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        today > self.due_date
            && !matches!(self.status, InvoiceStatus::Paid | InvoiceStatus::Cancelled)
    }

    /// Returns true if the invoice can receive an allocation.
    pub fn can_be_paid(&self) -> bool {
        self.status.is_active() && self.balance_due().is_positive()
    }

    /// Whole days between the due date and `as_of`; zero or negative when not yet due.
    pub fn days_past_due(&self, as_of: NaiveDate) -> i64 {
        (as_of - self.due_date).num_days()
    }

    /// Rebuilds subtotal, tax and total from the complete set of line items.
    pub fn recalculate_totals(&self, items: &[LineItem]) -> Result<Invoice, ValidationError> {
        let subtotal = items
            .iter()
            .try_fold(Money::zero(), |acc, item| acc.checked_add(item.amount()))
            .ok_or(ValidationError::AmountOverflow)?;
        let tax_amount = self
            .tax_rate
            .tax_on(subtotal)
            .ok_or(ValidationError::AmountOverflow)?;
        let total_amount = subtotal
            .checked_add(tax_amount)
            .ok_or(ValidationError::AmountOverflow)?;
        Self::validate_paid(self.paid_amount, total_amount)?;

        Ok(Invoice {
            subtotal,
            tax_amount,
            total_amount,
            ..self.clone()
        })
    }

    /// Moves to `next` if the transition table allows it.
    pub fn transition_to(&self, next: InvoiceStatus) -> Result<Invoice, TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        Ok(Invoice {
            status: next,
            ..self.clone()
        })
    }

    /// Records a new paid amount and derives the status from it.
    ///
    /// PAID once the total is covered, PARTIAL_PAID while something but not
    /// everything is paid, otherwise the status is left as is. This bypasses
    /// the transition table: payment-driven status follows the balance.
    pub fn update_status_after_payment(
        &self,
        new_paid_amount: Money,
    ) -> Result<Invoice, ValidationError> {
        Self::validate_paid(new_paid_amount, self.total_amount)?;
        let status = if new_paid_amount >= self.total_amount {
            InvoiceStatus::Paid
        } else if new_paid_amount.is_positive() {
            InvoiceStatus::PartialPaid
        } else {
            self.status
        };
        Ok(Invoice {
            paid_amount: new_paid_amount,
            status,
            ..self.clone()
        })
    }

    /// Returns a copy carrying `status` as persisted by storage.
    pub fn with_status(&self, status: InvoiceStatus) -> Invoice {
        Invoice {
            status,
            ..self.clone()
        }
    }
}

impl TryFrom<InvoiceRecord> for Invoice {
    type Error = ValidationError;

    fn try_from(record: InvoiceRecord) -> Result<Self, Self::Error> {
        Self::validate(&record)?;
        Ok(Self {
            id: record.id,
            invoice_number: record.invoice_number,
            customer_id: record.customer_id,
            invoice_date: record.invoice_date,
            due_date: record.due_date,
            status: record.status,
            subtotal: record.subtotal,
            tax_rate: record.tax_rate,
            tax_amount: record.tax_amount,
            total_amount: record.total_amount,
            paid_amount: record.paid_amount,
            notes: record.notes,
            created_at: record.created_at,
        })
    }
}

impl From<Invoice> for InvoiceRecord {
    fn from(invoice: Invoice) -> Self {
        Self {
            id: invoice.id,
            invoice_number: invoice.invoice_number,
            customer_id: invoice.customer_id,
            invoice_date: invoice.invoice_date,
            due_date: invoice.due_date,
            status: invoice.status,
            subtotal: invoice.subtotal,
            tax_rate: invoice.tax_rate,
            tax_amount: invoice.tax_amount,
            total_amount: invoice.total_amount,
            paid_amount: invoice.paid_amount,
            notes: invoice.notes,
            created_at: invoice.created_at,
        }
    }
}
