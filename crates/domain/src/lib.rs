//! Domain layer of the receivables ledger.
//!
//! This crate holds:
//! - entities (customers, invoices, line items, payments, allocations) and
//!   the `Money`/`TaxRate` value objects
//! - the invoice status state machine
//! - the storage ports that adapters implement
//! - the customer, invoice, payment and report services

pub mod customer;
pub mod error;
pub mod gate;
pub mod invoice;
pub mod money;
pub mod payment;
pub mod ports;
pub mod report;

pub use customer::{Customer, CustomerDetails, CustomerRecord, CustomerService};
pub use error::{ErrorKind, Outcome, ServiceError, ServiceResult, TransitionError, ValidationError};
pub use gate::WriteGate;
pub use invoice::{
    Invoice, InvoiceRecord, InvoiceService, InvoiceStatus, LineItem, LineItemRecord, NewInvoice,
    NewLineItem,
};
pub use money::{Money, TaxRate};
pub use payment::{
    AllocationRecord, NewPayment, Payment, PaymentAllocation, PaymentMethod, PaymentRecord,
    PaymentService,
};
pub use ports::{
    AllocationStore, CustomerStore, InvoiceStore, LineItemStore, PaymentStore, StorageError,
    StorageResult, Store,
};
pub use report::{
    AgingBucket, AgingBucketTotal, AgingReport, CustomerStatement, ReceivableSummary,
    ReportService,
};
