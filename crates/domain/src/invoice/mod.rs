//! Invoices, their line items and the invoice lifecycle.

mod commands;
mod entity;
mod line_item;
mod service;
mod status;

pub use commands::{NewInvoice, NewLineItem};
pub use entity::{Invoice, InvoiceRecord};
pub use line_item::{LineItem, LineItemRecord};
pub use service::InvoiceService;
pub use status::InvoiceStatus;
