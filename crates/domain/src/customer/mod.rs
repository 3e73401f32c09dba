//! Customers and their maintenance.

mod commands;
mod entity;
mod service;

pub use commands::CustomerDetails;
pub use entity::{Customer, CustomerRecord};
pub use service::CustomerService;
