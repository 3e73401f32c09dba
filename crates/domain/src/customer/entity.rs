use chrono::{DateTime, Utc};
use common::CustomerId;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::Money;

use super::CustomerDetails;

/// A customer that invoices are issued to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CustomerRecord", into = "CustomerRecord")]
pub struct Customer {
    id: CustomerId,
    code: String,
    name: String,
    email: String,
    phone: String,
    address: String,
    credit_limit: Money,
    created_at: DateTime<Utc>,
}

/// Field-for-field form of a [`Customer`], as read from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub id: CustomerId,
    pub code: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub credit_limit: Money,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// Formats a customer code: `CUST` followed by a 5-digit sequence.
    pub fn generate_code(sequence: u32) -> String {
        format!("CUST{sequence:05}")
    }

    /// Creates a customer with trimmed contact details.
    pub fn new(
        code: String,
        details: CustomerDetails,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        Self::try_from(CustomerRecord {
            id: CustomerId::new(),
            code,
            name: details.name.trim().to_string(),
            email: details.email.trim().to_string(),
            phone: details.phone.trim().to_string(),
            address: details.address.trim().to_string(),
            credit_limit: details.credit_limit,
            created_at,
        })
    }

    /// Returns a copy with name, contact details and credit limit replaced.
    pub fn with_details(&self, details: CustomerDetails) -> Result<Self, ValidationError> {
        Self::try_from(CustomerRecord {
            name: details.name.trim().to_string(),
            email: details.email.trim().to_string(),
            phone: details.phone.trim().to_string(),
            address: details.address.trim().to_string(),
            credit_limit: details.credit_limit,
            ..CustomerRecord::from(self.clone())
        })
    }

    pub fn id(&self) -> CustomerId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn phone(&self) -> &str {
        &self.phone
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn credit_limit(&self) -> Money {
        self.credit_limit
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// `[CODE] Name`, as shown in pick lists.
    pub fn display_name(&self) -> String {
        format!("[{}] {}", self.code, self.name)
    }

    /// Returns true if taking on `amount` more keeps the customer within the limit.
    pub fn has_available_credit(&self, amount: Money, current_balance: Money) -> bool {
        current_balance
            .checked_add(amount)
            .is_some_and(|exposure| exposure <= self.credit_limit)
    }
}

impl TryFrom<CustomerRecord> for Customer {
    type Error = ValidationError;

    fn try_from(record: CustomerRecord) -> Result<Self, Self::Error> {
        if record.code.trim().is_empty() {
            return Err(ValidationError::BlankCustomerCode);
        }
        if record.name.trim().is_empty() {
            return Err(ValidationError::BlankCustomerName);
        }
        if record.credit_limit.is_negative() {
            return Err(ValidationError::NegativeCreditLimit);
        }
        Ok(Self {
            id: record.id,
            code: record.code,
            name: record.name,
            email: record.email,
            phone: record.phone,
            address: record.address,
            credit_limit: record.credit_limit,
            created_at: record.created_at,
        })
    }
}

impl From<Customer> for CustomerRecord {
    fn from(customer: Customer) -> Self {
        Self {
            id: customer.id,
            code: customer.code,
            name: customer.name,
            email: customer.email,
            phone: customer.phone,
            address: customer.address,
            credit_limit: customer.credit_limit,
            created_at: customer.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(name: &str, limit: i64) -> CustomerDetails {
        CustomerDetails::new(name).with_credit_limit(Money::new(limit))
    }

    #[test]
    fn test_generate_code() {
        assert_eq!(Customer::generate_code(1), "CUST00001");
        assert_eq!(Customer::generate_code(42), "CUST00042");
    }

    #[test]
    fn test_new_trims_fields() {
        let customer = Customer::new(
            "CUST00001".into(),
            CustomerDetails::new("  PT Maju Jaya ").with_email(" admin@majujaya.co.id "),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(customer.name(), "PT Maju Jaya");
        assert_eq!(customer.email(), "admin@majujaya.co.id");
        assert_eq!(customer.display_name(), "[CUST00001] PT Maju Jaya");
    }

    #[test]
    fn test_rejects_invalid_customer() {
        assert_eq!(
            Customer::new("CUST00001".into(), details("  ", 0), Utc::now()),
            Err(ValidationError::BlankCustomerName)
        );
        assert_eq!(
            Customer::new("CUST00001".into(), details("CV Sentosa", -1), Utc::now()),
            Err(ValidationError::NegativeCreditLimit)
        );
        assert_eq!(
            Customer::new(String::new(), details("CV Sentosa", 0), Utc::now()),
            Err(ValidationError::BlankCustomerCode)
        );
    }

    #[test]
    fn test_with_details_keeps_identity() {
        let customer =
            Customer::new("CUST00007".into(), details("CV Lama", 0), Utc::now()).unwrap();
        let updated = customer.with_details(details("CV Baru", 5_000_000)).unwrap();
        assert_eq!(updated.id(), customer.id());
        assert_eq!(updated.code(), "CUST00007");
        assert_eq!(updated.name(), "CV Baru");
        assert_eq!(updated.credit_limit(), Money::new(5_000_000));
    }

    #[test]
    fn test_has_available_credit() {
        let customer =
            Customer::new("CUST00001".into(), details("PT A", 1_000), Utc::now()).unwrap();
        assert!(customer.has_available_credit(Money::new(400), Money::new(600)));
        assert!(!customer.has_available_credit(Money::new(401), Money::new(600)));
    }

    #[test]
    fn test_available_credit_on_overflowing_exposure() {
        let customer =
            Customer::new("CUST00001".into(), details("PT A", i64::MAX), Utc::now()).unwrap();
        assert!(!customer.has_available_credit(Money::new(1), Money::new(i64::MAX)));
        assert!(customer.has_available_credit(Money::new(0), Money::new(i64::MAX)));
    }
}
