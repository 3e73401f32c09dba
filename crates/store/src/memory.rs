use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{CustomerId, InvoiceId, LineItemId, PaymentId};
use domain::{
    AllocationStore, Customer, CustomerStore, Invoice, InvoiceStatus, InvoiceStore, LineItem,
    LineItemStore, Money, Payment, PaymentAllocation, PaymentStore, StorageError, StorageResult,
};
use tokio::sync::RwLock;

/// In-memory store for tests and local runs.
///
/// All tables live behind one lock, so every call sees a consistent
/// snapshot and each multi-row write (an allocation with its invoice, a
/// line item with its invoice totals) is checked and applied as one unit.
/// Writes compute every new row before touching the tables, so a failed
/// check leaves nothing behind.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

#[derive(Default)]
struct Tables {
    customers: HashMap<CustomerId, Customer>,
    invoices: HashMap<InvoiceId, Invoice>,
    // insertion order is the line order
    line_items: Vec<LineItem>,
    payments: HashMap<PaymentId, Payment>,
    allocations: Vec<PaymentAllocation>,
    customer_seq: u32,
    invoice_seq: u32,
    payment_seq: u32,
}

impl Tables {
    fn allocated_to_payment(&self, payment_id: PaymentId) -> StorageResult<Money> {
        Ok(Money::try_sum(
            self.allocations
                .iter()
                .filter(|a| a.payment_id() == payment_id)
                .map(|a| a.amount()),
        )?)
    }

    fn allocated_to_invoice(&self, invoice_id: InvoiceId) -> StorageResult<Money> {
        Ok(Money::try_sum(
            self.allocations
                .iter()
                .filter(|a| a.invoice_id() == invoice_id)
                .map(|a| a.amount()),
        )?)
    }

    fn items_of(&self, invoice_id: InvoiceId) -> Vec<LineItem> {
        self.line_items
            .iter()
            .filter(|item| item.invoice_id() == invoice_id)
            .cloned()
            .collect()
    }

    /// The DRAFT invoice with totals rebuilt over `items`.
    fn retotal(&self, invoice_id: InvoiceId, items: &[LineItem]) -> StorageResult<Invoice> {
        let invoice = self
            .invoices
            .get(&invoice_id)
            .ok_or_else(|| StorageError::not_found("invoice", invoice_id))?;
        if !invoice.status().can_modify_items() {
            return Err(StorageError::StateConflict(format!(
                "invoice {invoice_id} is {}",
                invoice.status()
            )));
        }
        Ok(invoice.recalculate_totals(items)?)
    }

    fn invoices_where(&self, predicate: impl Fn(&Invoice) -> bool) -> Vec<Invoice> {
        self.invoices
            .values()
            .filter(|i| predicate(i))
            .cloned()
            .collect()
    }
}

fn next(counter: &mut u32) -> StorageResult<u32> {
    *counter = counter
        .checked_add(1)
        .ok_or_else(|| StorageError::Corrupt("sequence exhausted".to_string()))?;
    Ok(*counter)
}

/// Newest invoice date first.
fn sort_newest_first(invoices: &mut [Invoice]) {
    invoices.sort_by(|a, b| {
        b.invoice_date()
            .cmp(&a.invoice_date())
            .then_with(|| b.invoice_number().cmp(a.invoice_number()))
    });
}

/// Earliest due date first.
fn sort_by_due_date(invoices: &mut [Invoice]) {
    invoices.sort_by(|a, b| {
        a.due_date()
            .cmp(&b.due_date())
            .then_with(|| a.invoice_number().cmp(b.invoice_number()))
    });
}

fn sort_payments_newest_first(payments: &mut [Payment]) {
    payments.sort_by(|a, b| {
        b.payment_date()
            .cmp(&a.payment_date())
            .then_with(|| b.payment_number().cmp(a.payment_number()))
    });
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of allocation rows stored.
    pub async fn allocation_count(&self) -> usize {
        self.tables.read().await.allocations.len()
    }
}

#[async_trait]
impl CustomerStore for InMemoryStore {
    async fn create_customer(&self, customer: Customer) -> StorageResult<Customer> {
        let mut tables = self.tables.write().await;
        if tables.customers.values().any(|c| c.code() == customer.code()) {
            return Err(StorageError::Duplicate {
                entity: "customer",
                key: customer.code().to_string(),
            });
        }
        tables.customers.insert(customer.id(), customer.clone());
        Ok(customer)
    }

    async fn find_customer(&self, id: CustomerId) -> StorageResult<Option<Customer>> {
        Ok(self.tables.read().await.customers.get(&id).cloned())
    }

    async fn find_customer_by_code(&self, code: &str) -> StorageResult<Option<Customer>> {
        let tables = self.tables.read().await;
        Ok(tables.customers.values().find(|c| c.code() == code).cloned())
    }

    async fn list_customers(&self) -> StorageResult<Vec<Customer>> {
        let tables = self.tables.read().await;
        let mut customers: Vec<_> = tables.customers.values().cloned().collect();
        customers.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.code().cmp(b.code())));
        Ok(customers)
    }

    async fn update_customer(&self, customer: &Customer) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        match tables.customers.get_mut(&customer.id()) {
            Some(existing) => {
                *existing = customer.clone();
                Ok(())
            }
            None => Err(StorageError::not_found("customer", customer.id())),
        }
    }

    async fn delete_customer(&self, id: CustomerId) -> StorageResult<bool> {
        Ok(self.tables.write().await.customers.remove(&id).is_some())
    }

    async fn customer_code_exists(&self, code: &str) -> StorageResult<bool> {
        let tables = self.tables.read().await;
        Ok(tables.customers.values().any(|c| c.code() == code))
    }

    async fn next_customer_sequence(&self) -> StorageResult<u32> {
        next(&mut self.tables.write().await.customer_seq)
    }
}

#[async_trait]
impl InvoiceStore for InMemoryStore {
    async fn create_invoice(&self, invoice: Invoice) -> StorageResult<Invoice> {
        let mut tables = self.tables.write().await;
        if !tables.customers.contains_key(&invoice.customer_id()) {
            return Err(StorageError::not_found("customer", invoice.customer_id()));
        }
        if tables
            .invoices
            .values()
            .any(|i| i.invoice_number() == invoice.invoice_number())
        {
            return Err(StorageError::Duplicate {
                entity: "invoice",
                key: invoice.invoice_number().to_string(),
            });
        }
        tables.invoices.insert(invoice.id(), invoice.clone());
        Ok(invoice)
    }

    async fn find_invoice(&self, id: InvoiceId) -> StorageResult<Option<Invoice>> {
        Ok(self.tables.read().await.invoices.get(&id).cloned())
    }

    async fn find_invoice_by_number(&self, number: &str) -> StorageResult<Option<Invoice>> {
        let tables = self.tables.read().await;
        Ok(tables
            .invoices
            .values()
            .find(|i| i.invoice_number() == number)
            .cloned())
    }

    async fn find_invoices_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> StorageResult<Vec<Invoice>> {
        let mut invoices = self
            .tables
            .read()
            .await
            .invoices_where(|i| i.customer_id() == customer_id);
        sort_newest_first(&mut invoices);
        Ok(invoices)
    }

    async fn list_invoices(&self) -> StorageResult<Vec<Invoice>> {
        let mut invoices = self.tables.read().await.invoices_where(|_| true);
        sort_newest_first(&mut invoices);
        Ok(invoices)
    }

    async fn find_invoices_by_status(&self, status: InvoiceStatus) -> StorageResult<Vec<Invoice>> {
        let mut invoices = self
            .tables
            .read()
            .await
            .invoices_where(|i| i.status() == status);
        sort_by_due_date(&mut invoices);
        Ok(invoices)
    }

    async fn find_overdue_invoices(&self, today: NaiveDate) -> StorageResult<Vec<Invoice>> {
        let mut invoices = self.tables.read().await.invoices_where(|i| {
            i.due_date() < today
                && matches!(i.status(), InvoiceStatus::Sent | InvoiceStatus::PartialPaid)
        });
        sort_by_due_date(&mut invoices);
        Ok(invoices)
    }

    async fn find_unpaid_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> StorageResult<Vec<Invoice>> {
        let mut invoices = self
            .tables
            .read()
            .await
            .invoices_where(|i| i.customer_id() == customer_id && i.status().is_active());
        sort_by_due_date(&mut invoices);
        Ok(invoices)
    }

    async fn update_invoice_status(
        &self,
        id: InvoiceId,
        expected: InvoiceStatus,
        status: InvoiceStatus,
    ) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let invoice = tables
            .invoices
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found("invoice", id))?;
        if invoice.status() != expected {
            return Err(StorageError::StateConflict(format!(
                "invoice {id} is {}, expected {expected}",
                invoice.status()
            )));
        }
        *invoice = invoice.with_status(status);
        Ok(())
    }

    async fn delete_invoice(&self, id: InvoiceId) -> StorageResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.invoices.remove(&id).is_none() {
            return Ok(false);
        }
        tables.line_items.retain(|item| item.invoice_id() != id);
        tables.allocations.retain(|a| a.invoice_id() != id);
        Ok(true)
    }

    async fn next_invoice_sequence(&self) -> StorageResult<u32> {
        next(&mut self.tables.write().await.invoice_seq)
    }

    async fn customer_balance(&self, customer_id: CustomerId) -> StorageResult<Money> {
        let tables = self.tables.read().await;
        Ok(Money::try_sum(
            tables
                .invoices
                .values()
                .filter(|i| i.customer_id() == customer_id && i.status().is_active())
                .map(|i| i.balance_due()),
        )?)
    }
}

#[async_trait]
impl LineItemStore for InMemoryStore {
    async fn insert_line_item(&self, item: LineItem) -> StorageResult<Invoice> {
        let mut tables = self.tables.write().await;
        let mut items = tables.items_of(item.invoice_id());
        items.push(item.clone());
        let updated = tables.retotal(item.invoice_id(), &items)?;

        tables.line_items.push(item);
        tables.invoices.insert(updated.id(), updated.clone());
        Ok(updated)
    }

    async fn remove_line_item(
        &self,
        invoice_id: InvoiceId,
        item_id: LineItemId,
    ) -> StorageResult<Option<Invoice>> {
        let mut tables = self.tables.write().await;
        let Some(position) = tables
            .line_items
            .iter()
            .position(|item| item.id() == item_id && item.invoice_id() == invoice_id)
        else {
            return Ok(None);
        };
        let mut items = tables.items_of(invoice_id);
        items.retain(|item| item.id() != item_id);
        let updated = tables.retotal(invoice_id, &items)?;

        tables.line_items.remove(position);
        tables.invoices.insert(invoice_id, updated.clone());
        Ok(Some(updated))
    }

    async fn find_line_item(&self, id: LineItemId) -> StorageResult<Option<LineItem>> {
        let tables = self.tables.read().await;
        Ok(tables.line_items.iter().find(|item| item.id() == id).cloned())
    }

    async fn find_line_items(&self, invoice_id: InvoiceId) -> StorageResult<Vec<LineItem>> {
        Ok(self.tables.read().await.items_of(invoice_id))
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn create_payment(&self, payment: Payment) -> StorageResult<Payment> {
        let mut tables = self.tables.write().await;
        if !tables.customers.contains_key(&payment.customer_id()) {
            return Err(StorageError::not_found("customer", payment.customer_id()));
        }
        if tables
            .payments
            .values()
            .any(|p| p.payment_number() == payment.payment_number())
        {
            return Err(StorageError::Duplicate {
                entity: "payment",
                key: payment.payment_number().to_string(),
            });
        }
        tables.payments.insert(payment.id(), payment.clone());
        Ok(payment)
    }

    async fn find_payment(&self, id: PaymentId) -> StorageResult<Option<Payment>> {
        Ok(self.tables.read().await.payments.get(&id).cloned())
    }

    async fn find_payments_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> StorageResult<Vec<Payment>> {
        let tables = self.tables.read().await;
        let mut payments: Vec<_> = tables
            .payments
            .values()
            .filter(|p| p.customer_id() == customer_id)
            .cloned()
            .collect();
        sort_payments_newest_first(&mut payments);
        Ok(payments)
    }

    async fn list_payments(&self) -> StorageResult<Vec<Payment>> {
        let tables = self.tables.read().await;
        let mut payments: Vec<_> = tables.payments.values().cloned().collect();
        sort_payments_newest_first(&mut payments);
        Ok(payments)
    }

    async fn next_payment_sequence(&self) -> StorageResult<u32> {
        next(&mut self.tables.write().await.payment_seq)
    }
}

#[async_trait]
impl AllocationStore for InMemoryStore {
    async fn record_allocation(
        &self,
        allocation: PaymentAllocation,
    ) -> StorageResult<(PaymentAllocation, Invoice)> {
        let mut tables = self.tables.write().await;

        let payment_amount = tables
            .payments
            .get(&allocation.payment_id())
            .map(|p| p.amount())
            .ok_or_else(|| StorageError::not_found("payment", allocation.payment_id()))?;
        let invoice = tables
            .invoices
            .get(&allocation.invoice_id())
            .cloned()
            .ok_or_else(|| StorageError::not_found("invoice", allocation.invoice_id()))?;
        if !invoice.can_be_paid() {
            return Err(StorageError::StateConflict(format!(
                "invoice {} cannot be paid in status {}",
                invoice.id(),
                invoice.status()
            )));
        }

        let payment_after = Money::try_sum([
            tables.allocated_to_payment(allocation.payment_id())?,
            allocation.amount(),
        ])?;
        if payment_after > payment_amount {
            return Err(StorageError::AllocationOverflow(format!(
                "payment {} would be allocated {payment_after} of {payment_amount}",
                allocation.payment_id()
            )));
        }

        let invoice_after = Money::try_sum([
            tables.allocated_to_invoice(invoice.id())?,
            allocation.amount(),
        ])?;
        if invoice_after > invoice.total_amount() {
            return Err(StorageError::AllocationOverflow(format!(
                "invoice {} would receive {invoice_after} of {}",
                invoice.id(),
                invoice.total_amount()
            )));
        }
        let updated = invoice.update_status_after_payment(invoice_after)?;

        tables.allocations.push(allocation.clone());
        tables.invoices.insert(updated.id(), updated.clone());
        Ok((allocation, updated))
    }

    async fn find_allocations_by_payment(
        &self,
        payment_id: PaymentId,
    ) -> StorageResult<Vec<PaymentAllocation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .allocations
            .iter()
            .filter(|a| a.payment_id() == payment_id)
            .cloned()
            .collect())
    }

    async fn find_allocations_by_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> StorageResult<Vec<PaymentAllocation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .allocations
            .iter()
            .filter(|a| a.invoice_id() == invoice_id)
            .cloned()
            .collect())
    }

    async fn allocated_amount_for_payment(&self, payment_id: PaymentId) -> StorageResult<Money> {
        self.tables.read().await.allocated_to_payment(payment_id)
    }

    async fn invoice_paid_amount_from_allocations(
        &self,
        invoice_id: InvoiceId,
    ) -> StorageResult<Money> {
        self.tables.read().await.allocated_to_invoice(invoice_id)
    }
}
