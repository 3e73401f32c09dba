//! Customer service inputs.

use crate::error::ValidationError;
use crate::money::Money;

/// Name, contact details and credit limit of a customer.
#[derive(Debug, Clone, Default)]
pub struct CustomerDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub credit_limit: Money,
}

impl CustomerDetails {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = phone.into();
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_credit_limit(mut self, credit_limit: Money) -> Self {
        self.credit_limit = credit_limit;
        self
    }

    /// Checks the rules a customer's details must satisfy.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::BlankCustomerName);
        }
        if self.credit_limit.is_negative() {
            return Err(ValidationError::NegativeCreditLimit);
        }
        Ok(())
    }
}
