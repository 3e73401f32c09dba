use chrono::{DateTime, Datelike, NaiveDate, Utc};
use common::{AllocationId, CustomerId, InvoiceId, PaymentId};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::Money;

use super::PaymentMethod;

/// Money received from a customer. Immutable once recorded; it is applied
/// to invoices through [`PaymentAllocation`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PaymentRecord", into = "PaymentRecord")]
pub struct Payment {
    id: PaymentId,
    payment_number: String,
    customer_id: CustomerId,
    payment_date: NaiveDate,
    amount: Money,
    method: PaymentMethod,
    reference: String,
    notes: String,
    created_at: DateTime<Utc>,
}

/// Field-for-field form of a [`Payment`], as read from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub payment_number: String,
    pub customer_id: CustomerId,
    pub payment_date: NaiveDate,
    pub amount: Money,
    pub method: PaymentMethod,
    pub reference: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Formats a payment number: `PAY/<year>/<5-digit sequence>`.
    pub fn generate_number(date: NaiveDate, sequence: u32) -> String {
        format!("PAY/{}/{:05}", date.year(), sequence)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        payment_number: String,
        customer_id: CustomerId,
        payment_date: NaiveDate,
        amount: Money,
        method: PaymentMethod,
        reference: &str,
        notes: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        Self::try_from(PaymentRecord {
            id: PaymentId::new(),
            payment_number,
            customer_id,
            payment_date,
            amount,
            method,
            reference: reference.trim().to_string(),
            notes: notes.trim().to_string(),
            created_at,
        })
    }

    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn payment_number(&self) -> &str {
        &self.payment_number
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn payment_date(&self) -> NaiveDate {
        self.payment_date
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl TryFrom<PaymentRecord> for Payment {
    type Error = ValidationError;

    fn try_from(record: PaymentRecord) -> Result<Self, Self::Error> {
        if record.payment_number.trim().is_empty() {
            return Err(ValidationError::BlankDocumentNumber);
        }
        if !record.amount.is_positive() {
            return Err(ValidationError::NonPositivePayment);
        }
        Ok(Self {
            id: record.id,
            payment_number: record.payment_number,
            customer_id: record.customer_id,
            payment_date: record.payment_date,
            amount: record.amount,
            method: record.method,
            reference: record.reference,
            notes: record.notes,
            created_at: record.created_at,
        })
    }
}

impl From<Payment> for PaymentRecord {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            payment_number: payment.payment_number,
            customer_id: payment.customer_id,
            payment_date: payment.payment_date,
            amount: payment.amount,
            method: payment.method,
            reference: payment.reference,
            notes: payment.notes,
            created_at: payment.created_at,
        }
    }
}

/// The part of a payment applied to one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AllocationRecord", into = "AllocationRecord")]
pub struct PaymentAllocation {
    id: AllocationId,
    payment_id: PaymentId,
    invoice_id: InvoiceId,
    amount: Money,
    allocated_at: DateTime<Utc>,
}

/// Field-for-field form of a [`PaymentAllocation`], as read from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub id: AllocationId,
    pub payment_id: PaymentId,
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub allocated_at: DateTime<Utc>,
}

impl PaymentAllocation {
    pub fn new(
        payment_id: PaymentId,
        invoice_id: InvoiceId,
        amount: Money,
        allocated_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        Self::try_from(AllocationRecord {
            id: AllocationId::new(),
            payment_id,
            invoice_id,
            amount,
            allocated_at,
        })
    }

    pub fn id(&self) -> AllocationId {
        self.id
    }

    pub fn payment_id(&self) -> PaymentId {
        self.payment_id
    }

    pub fn invoice_id(&self) -> InvoiceId {
        self.invoice_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn allocated_at(&self) -> DateTime<Utc> {
        self.allocated_at
    }
}

impl TryFrom<AllocationRecord> for PaymentAllocation {
    type Error = ValidationError;

    fn try_from(record: AllocationRecord) -> Result<Self, Self::Error> {
        if !record.amount.is_positive() {
            return Err(ValidationError::NonPositiveAllocation);
        }
        Ok(Self {
            id: record.id,
            payment_id: record.payment_id,
            invoice_id: record.invoice_id,
            amount: record.amount,
            allocated_at: record.allocated_at,
        })
    }
}

impl From<PaymentAllocation> for AllocationRecord {
    fn from(allocation: PaymentAllocation) -> Self {
        Self {
            id: allocation.id,
            payment_id: allocation.payment_id,
            invoice_id: allocation.invoice_id,
            amount: allocation.amount,
            allocated_at: allocation.allocated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(amount: i64) -> Result<Payment, ValidationError> {
        Payment::new(
            "PAY/2025/00001".into(),
            CustomerId::new(),
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            Money::new(amount),
            PaymentMethod::BankTransfer,
            " TRX-001 ",
            "",
            Utc::now(),
        )
    }

    #[test]
    fn test_generate_number() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 4).unwrap();
        assert_eq!(Payment::generate_number(date, 12), "PAY/2025/00012");
    }

    #[test]
    fn test_payment_amount_must_be_positive() {
        assert_eq!(payment(0), Err(ValidationError::NonPositivePayment));
        assert_eq!(payment(-10), Err(ValidationError::NonPositivePayment));
        let ok = payment(100_000).unwrap();
        assert_eq!(ok.reference(), "TRX-001");
    }

    #[test]
    fn test_allocation_amount_must_be_positive() {
        let result = PaymentAllocation::new(PaymentId::new(), InvoiceId::new(), Money::zero(), Utc::now());
        assert_eq!(result, Err(ValidationError::NonPositiveAllocation));
    }

    #[test]
    fn test_payment_json_uses_method_name() {
        let json = serde_json::to_value(payment(5_000).unwrap()).unwrap();
        assert_eq!(json["method"], "BANK_TRANSFER");
        assert_eq!(json["amount"], 5_000);
    }
}
