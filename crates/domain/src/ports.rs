//! Storage ports consumed by the services.
//!
//! Adapters live in the `store` crate. Every port is object-safe and
//! thread-safe so that services can be shared across request handlers.

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{CustomerId, InvoiceId, LineItemId, PaymentId};
use thiserror::Error;

use crate::customer::Customer;
use crate::error::ValidationError;
use crate::invoice::{Invoice, InvoiceStatus, LineItem};
use crate::money::Money;
use crate::payment::{Payment, PaymentAllocation};

/// Errors raised by storage adapters.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The record to update does not exist.
    #[error("{entity} tidak ditemukan: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A unique key is already taken.
    #[error("{entity} dengan kunci {key} sudah ada")]
    Duplicate { entity: &'static str, key: String },

    /// Writing the allocation would push a payment or invoice past its amount.
    #[error("Alokasi ditolak: {0}")]
    AllocationOverflow(String),

    /// The stored row is no longer in the state the write requires, e.g. an
    /// invoice cancelled by another writer after the caller checked it.
    #[error("Perubahan ditolak: {0}")]
    StateConflict(String),

    /// A persisted record failed entity validation when loaded.
    #[error("Data tersimpan tidak valid: {0}")]
    Invalid(#[from] ValidationError),

    /// A persisted value could not be decoded.
    #[error("Data tersimpan rusak: {0}")]
    Corrupt(String),

    /// The backing database failed.
    #[error("Database error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StorageError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StorageError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StorageError::Backend(Box::new(err))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn create_customer(&self, customer: Customer) -> StorageResult<Customer>;

    async fn find_customer(&self, id: CustomerId) -> StorageResult<Option<Customer>>;

    async fn find_customer_by_code(&self, code: &str) -> StorageResult<Option<Customer>>;

    /// All customers ordered by name.
    async fn list_customers(&self) -> StorageResult<Vec<Customer>>;

    async fn update_customer(&self, customer: &Customer) -> StorageResult<()>;

    /// Returns false if the customer did not exist.
    async fn delete_customer(&self, id: CustomerId) -> StorageResult<bool>;

    async fn customer_code_exists(&self, code: &str) -> StorageResult<bool>;

    async fn next_customer_sequence(&self) -> StorageResult<u32>;
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn create_invoice(&self, invoice: Invoice) -> StorageResult<Invoice>;

    async fn find_invoice(&self, id: InvoiceId) -> StorageResult<Option<Invoice>>;

    async fn find_invoice_by_number(&self, number: &str) -> StorageResult<Option<Invoice>>;

    /// A customer's invoices, newest invoice date first.
    async fn find_invoices_by_customer(&self, customer_id: CustomerId)
    -> StorageResult<Vec<Invoice>>;

    /// All invoices, newest invoice date first.
    async fn list_invoices(&self) -> StorageResult<Vec<Invoice>>;

    /// Invoices in `status`, earliest due date first.
    async fn find_invoices_by_status(&self, status: InvoiceStatus) -> StorageResult<Vec<Invoice>>;

    /// SENT or PARTIAL_PAID invoices due before `today`, earliest due date first.
    ///
    /// Invoices already marked OVERDUE are not returned.
    async fn find_overdue_invoices(&self, today: NaiveDate) -> StorageResult<Vec<Invoice>>;

    /// A customer's SENT, PARTIAL_PAID and OVERDUE invoices, earliest due date first.
    async fn find_unpaid_by_customer(&self, customer_id: CustomerId)
    -> StorageResult<Vec<Invoice>>;

    /// Moves the invoice from `expected` to `status`.
    ///
    /// Fails with [`StorageError::StateConflict`] if the stored status is no
    /// longer `expected`.
    async fn update_invoice_status(
        &self,
        id: InvoiceId,
        expected: InvoiceStatus,
        status: InvoiceStatus,
    ) -> StorageResult<()>;

    async fn delete_invoice(&self, id: InvoiceId) -> StorageResult<bool>;

    async fn next_invoice_sequence(&self) -> StorageResult<u32>;

    /// Sum of balance due over the customer's active invoices.
    async fn customer_balance(&self, customer_id: CustomerId) -> StorageResult<Money>;
}

/// Line items are only written together with the totals of their invoice.
///
/// Both writes happen as one unit: the invoice row is locked, must still be
/// DRAFT (otherwise [`StorageError::StateConflict`]), and its subtotal, tax
/// and total are recomputed over the resulting item set before the unit
/// commits.
#[async_trait]
pub trait LineItemStore: Send + Sync {
    /// Appends `item` to its invoice and returns the invoice with new totals.
    async fn insert_line_item(&self, item: LineItem) -> StorageResult<Invoice>;

    /// Deletes `item_id` from `invoice_id` and returns the invoice with new
    /// totals, or `None` if the invoice has no such item.
    async fn remove_line_item(
        &self,
        invoice_id: InvoiceId,
        item_id: LineItemId,
    ) -> StorageResult<Option<Invoice>>;

    async fn find_line_item(&self, id: LineItemId) -> StorageResult<Option<LineItem>>;

    /// Line items of an invoice in insertion order.
    async fn find_line_items(&self, invoice_id: InvoiceId) -> StorageResult<Vec<LineItem>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create_payment(&self, payment: Payment) -> StorageResult<Payment>;

    async fn find_payment(&self, id: PaymentId) -> StorageResult<Option<Payment>>;

    /// A customer's payments, newest payment date first.
    async fn find_payments_by_customer(&self, customer_id: CustomerId)
    -> StorageResult<Vec<Payment>>;

    /// All payments, newest payment date first.
    async fn list_payments(&self) -> StorageResult<Vec<Payment>>;

    async fn next_payment_sequence(&self) -> StorageResult<u32>;
}

#[async_trait]
pub trait AllocationStore: Send + Sync {
    /// Persists an allocation and the paid amount it gives its invoice.
    ///
    /// One unit: with the payment and invoice rows locked, the adapter
    /// re-checks that the invoice can still be paid
    /// ([`StorageError::StateConflict`] otherwise) and that both allocation
    /// sums stay within their amounts ([`StorageError::AllocationOverflow`]
    /// otherwise). It then inserts the row, recomputes the invoice's paid
    /// amount from all its allocations and stores the status
    /// [`Invoice::update_status_after_payment`] derives from it. Nothing is
    /// written if any step fails.
    async fn record_allocation(
        &self,
        allocation: PaymentAllocation,
    ) -> StorageResult<(PaymentAllocation, Invoice)>;

    async fn find_allocations_by_payment(
        &self,
        payment_id: PaymentId,
    ) -> StorageResult<Vec<PaymentAllocation>>;

    async fn find_allocations_by_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> StorageResult<Vec<PaymentAllocation>>;

    async fn allocated_amount_for_payment(&self, payment_id: PaymentId) -> StorageResult<Money>;

    async fn invoice_paid_amount_from_allocations(
        &self,
        invoice_id: InvoiceId,
    ) -> StorageResult<Money>;
}

/// Every port the services need, implemented by a single adapter.
pub trait Store:
    CustomerStore + InvoiceStore + LineItemStore + PaymentStore + AllocationStore + Clone + 'static
{
}

impl<T> Store for T where
    T: CustomerStore
        + InvoiceStore
        + LineItemStore
        + PaymentStore
        + AllocationStore
        + Clone
        + 'static
{
}
