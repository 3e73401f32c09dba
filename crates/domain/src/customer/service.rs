//! Customer maintenance service.

use std::sync::Arc;

use common::{Clock, CustomerId};
use tracing::info;

use crate::error::{Outcome, ServiceError, ServiceResult};
use crate::gate::WriteGate;
use crate::money::Money;
use crate::ports::Store;

use super::{Customer, CustomerDetails};

/// Service for creating, updating and deleting customers.
#[derive(Clone)]
pub struct CustomerService<S: Store> {
    store: S,
    clock: Arc<dyn Clock>,
    gate: WriteGate,
}

impl<S: Store> CustomerService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, gate: WriteGate) -> Self {
        Self { store, clock, gate }
    }

    /// Creates a customer with the next generated code.
    #[tracing::instrument(skip(self))]
    pub async fn create_customer(&self, details: CustomerDetails) -> ServiceResult<Customer> {
        details.validate()?;

        let _guard = self.gate.acquire().await;

        let code = Customer::generate_code(self.store.next_customer_sequence().await?);
        if self.store.customer_code_exists(&code).await? {
            return Err(ServiceError::conflict("Customer code sudah ada"));
        }

        let customer = Customer::new(code, details, self.clock.now())?;
        let created = self.store.create_customer(customer).await?;

        info!(customer = %created.code(), "customer created");

        Ok(Outcome::new(created, "Customer berhasil dibuat"))
    }

    /// Replaces name, contact details and credit limit.
    #[tracing::instrument(skip(self))]
    pub async fn update_customer(
        &self,
        customer_id: CustomerId,
        details: CustomerDetails,
    ) -> ServiceResult<Customer> {
        let _guard = self.gate.acquire().await;

        let existing = self.load_customer(customer_id).await?;
        let updated = existing.with_details(details)?;
        self.store.update_customer(&updated).await?;

        info!(customer = %updated.code(), "customer updated");

        Ok(Outcome::new(updated, "Customer berhasil diupdate"))
    }

    /// Deletes a customer that owns no invoices.
    #[tracing::instrument(skip(self))]
    pub async fn delete_customer(&self, customer_id: CustomerId) -> ServiceResult<()> {
        let _guard = self.gate.acquire().await;

        let customer = self.load_customer(customer_id).await?;

        // any invoice blocks deletion, whatever its status
        if !self
            .store
            .find_invoices_by_customer(customer_id)
            .await?
            .is_empty()
        {
            return Err(ServiceError::conflict(
                "Customer memiliki invoice, tidak dapat dihapus",
            ));
        }

        if !self.store.delete_customer(customer_id).await? {
            return Err(ServiceError::not_found("Customer tidak ditemukan"));
        }

        info!(customer = %customer.code(), "customer deleted");

        Ok(Outcome::new((), "Customer berhasil dihapus"))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_customer(&self, customer_id: CustomerId) -> Result<Customer, ServiceError> {
        self.load_customer(customer_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_customer_by_code(&self, code: &str) -> Result<Customer, ServiceError> {
        self.store
            .find_customer_by_code(code)
            .await?
            .ok_or_else(|| ServiceError::not_found("Customer tidak ditemukan"))
    }

    /// All customers ordered by name.
    pub async fn list_customers(&self) -> Result<Vec<Customer>, ServiceError> {
        Ok(self.store.list_customers().await?)
    }

    /// Outstanding balance over the customer's open invoices.
    pub async fn customer_balance(&self, customer_id: CustomerId) -> Result<Money, ServiceError> {
        self.load_customer(customer_id).await?;
        Ok(self.store.customer_balance(customer_id).await?)
    }

    async fn load_customer(&self, customer_id: CustomerId) -> Result<Customer, ServiceError> {
        self.store
            .find_customer(customer_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Customer tidak ditemukan"))
    }
}
