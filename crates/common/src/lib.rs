//! Shared types for the receivables ledger.

pub mod clock;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use types::{AllocationId, CustomerId, InvoiceId, LineItemId, PaymentId};
