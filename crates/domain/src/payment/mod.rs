//! Payments and the allocation engine that applies them to invoices.

mod commands;
mod entity;
mod method;
mod service;

pub use commands::NewPayment;
pub use entity::{AllocationRecord, Payment, PaymentAllocation, PaymentRecord};
pub use method::PaymentMethod;
pub use service::PaymentService;
