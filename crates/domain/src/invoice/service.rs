//! Invoice lifecycle service.

use std::sync::Arc;

use common::{Clock, CustomerId, InvoiceId, LineItemId};
use tracing::{info, warn};

use crate::error::{Outcome, ServiceError, ServiceResult};
use crate::gate::WriteGate;
use crate::payment::PaymentAllocation;
use crate::ports::Store;

use super::{Invoice, InvoiceStatus, LineItem, NewInvoice, NewLineItem};

/// Service owning the invoice lifecycle: drafting, line items, sending,
/// cancelling and the payment-driven status updates.
#[derive(Clone)]
pub struct InvoiceService<S: Store> {
    store: S,
    clock: Arc<dyn Clock>,
    gate: WriteGate,
}

impl<S: Store> InvoiceService<S> {
    /// Creates a new invoice service.
    ///
    /// `gate` must be the same gate the payment and customer services use.
    pub fn new(store: S, clock: Arc<dyn Clock>, gate: WriteGate) -> Self {
        Self { store, clock, gate }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates a DRAFT invoice dated today with zero totals.
    #[tracing::instrument(skip(self))]
    pub async fn create_invoice(&self, cmd: NewInvoice) -> ServiceResult<Invoice> {
        let _guard = self.gate.acquire().await;

        if self.store.find_customer(cmd.customer_id).await?.is_none() {
            return Err(ServiceError::not_found("Customer tidak ditemukan"));
        }

        let today = self.clock.today();
        if cmd.due_date < today {
            return Err(ServiceError::validation("Due date tidak boleh di masa lalu"));
        }

        let sequence = self.store.next_invoice_sequence().await?;
        let invoice = Invoice::draft(
            Invoice::generate_number(today, sequence),
            cmd.customer_id,
            today,
            cmd.due_date,
            cmd.tax_rate,
            &cmd.notes,
            self.clock.now(),
        )?;
        let created = self.store.create_invoice(invoice).await?;

        metrics::counter!("invoices_created_total").increment(1);
        info!(invoice = %created.invoice_number(), "invoice created");

        Ok(Outcome::new(created, "Invoice berhasil dibuat"))
    }

    /// Adds a line item to a DRAFT invoice and recomputes its totals.
    #[tracing::instrument(skip(self))]
    pub async fn add_line_item(
        &self,
        invoice_id: InvoiceId,
        cmd: NewLineItem,
    ) -> ServiceResult<LineItem> {
        let _guard = self.gate.acquire().await;

        let invoice = self.load_invoice(invoice_id).await?;
        Self::ensure_editable(&invoice)?;

        let item = LineItem::new(invoice_id, &cmd.description, cmd.quantity, cmd.unit_price)?;
        let mut items = self.store.find_line_items(invoice_id).await?;
        items.push(item.clone());
        // reject overflowing totals before anything is written
        invoice.recalculate_totals(&items)?;

        let updated = self.store.insert_line_item(item.clone()).await?;

        info!(
            invoice = %updated.invoice_number(),
            total = %updated.total_amount(),
            "line item added"
        );

        Ok(Outcome::new(item, "Item berhasil ditambahkan"))
    }

    /// Removes a line item from a DRAFT invoice and recomputes its totals.
    #[tracing::instrument(skip(self))]
    pub async fn remove_line_item(
        &self,
        invoice_id: InvoiceId,
        line_item_id: LineItemId,
    ) -> ServiceResult<Invoice> {
        let _guard = self.gate.acquire().await;

        let invoice = self.load_invoice(invoice_id).await?;
        Self::ensure_editable(&invoice)?;

        let remaining: Vec<LineItem> = self
            .store
            .find_line_items(invoice_id)
            .await?
            .into_iter()
            .filter(|item| item.id() != line_item_id)
            .collect();

        // the item must belong to this invoice
        match self.store.find_line_item(line_item_id).await? {
            Some(item) if item.invoice_id() == invoice_id => {}
            _ => return Err(ServiceError::not_found("Item tidak ditemukan")),
        }

        invoice.recalculate_totals(&remaining)?;
        let updated = self
            .store
            .remove_line_item(invoice_id, line_item_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Item tidak ditemukan"))?;

        info!(invoice = %updated.invoice_number(), "line item removed");

        Ok(Outcome::new(updated, "Item berhasil dihapus"))
    }

    /// Issues a DRAFT invoice to the customer.
    #[tracing::instrument(skip(self))]
    pub async fn send_invoice(&self, invoice_id: InvoiceId) -> ServiceResult<Invoice> {
        let _guard = self.gate.acquire().await;

        let invoice = self.load_invoice(invoice_id).await?;
        if !invoice.status().can_transition_to(InvoiceStatus::Sent) {
            return Err(ServiceError::conflict(format!(
                "Invoice tidak dapat dikirim dari status {}",
                invoice.status().display_label()
            )));
        }

        if self.store.find_line_items(invoice_id).await?.is_empty() {
            return Err(ServiceError::conflict("Invoice harus memiliki minimal 1 item"));
        }

        let sent = invoice.transition_to(InvoiceStatus::Sent)?;
        self.store
            .update_invoice_status(invoice_id, invoice.status(), sent.status())
            .await?;

        metrics::counter!("invoices_sent_total").increment(1);
        info!(invoice = %sent.invoice_number(), total = %sent.total_amount(), "invoice sent");

        Ok(Outcome::new(sent, "Invoice berhasil dikirim"))
    }

    /// Cancels an invoice that has received no payment.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_invoice(&self, invoice_id: InvoiceId) -> ServiceResult<Invoice> {
        let _guard = self.gate.acquire().await;

        let invoice = self.load_invoice(invoice_id).await?;

        // Checked before the transition so that a part-paid invoice reports
        // the payment rather than its status.
        if invoice.paid_amount().is_positive() {
            return Err(ServiceError::conflict(
                "Invoice sudah ada pembayaran, tidak dapat dibatalkan",
            ));
        }

        if !invoice.status().can_transition_to(InvoiceStatus::Cancelled) {
            return Err(ServiceError::conflict(format!(
                "Invoice tidak dapat dibatalkan dari status {}",
                invoice.status().display_label()
            )));
        }

        let cancelled = invoice.transition_to(InvoiceStatus::Cancelled)?;
        self.store
            .update_invoice_status(invoice_id, invoice.status(), cancelled.status())
            .await?;

        info!(invoice = %cancelled.invoice_number(), "invoice cancelled");

        Ok(Outcome::new(cancelled, "Invoice berhasil dibatalkan"))
    }

    /// Moves a past-due invoice to OVERDUE.
    ///
    /// Nothing calls this automatically; it is meant for a scheduled job.
    #[tracing::instrument(skip(self))]
    pub async fn mark_overdue(&self, invoice_id: InvoiceId) -> ServiceResult<Invoice> {
        let _guard = self.gate.acquire().await;

        let invoice = self.load_invoice(invoice_id).await?;
        if !invoice.is_overdue(self.clock.today()) {
            return Err(ServiceError::validation("Invoice belum jatuh tempo"));
        }

        let overdue = invoice.transition_to(InvoiceStatus::Overdue)?;
        self.store
            .update_invoice_status(invoice_id, invoice.status(), overdue.status())
            .await?;

        warn!(
            invoice = %overdue.invoice_number(),
            due_date = %overdue.due_date(),
            "invoice marked overdue"
        );

        Ok(Outcome::new(overdue, "Invoice ditandai jatuh tempo"))
    }

    /// Records `allocation` together with the paid amount and status it
    /// gives its invoice.
    ///
    /// The store re-reads the invoice, sums its allocations and applies
    /// [`Invoice::update_status_after_payment`] in the same unit as the
    /// insert. Callers must already hold the write gate.
    pub(crate) async fn update_invoice_paid_amount(
        &self,
        allocation: PaymentAllocation,
    ) -> Result<(PaymentAllocation, Invoice), ServiceError> {
        Ok(self.store.record_allocation(allocation).await?)
    }

    // Queries

    #[tracing::instrument(skip(self))]
    pub async fn get_invoice(&self, invoice_id: InvoiceId) -> Result<Invoice, ServiceError> {
        self.load_invoice(invoice_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_invoice_by_number(&self, number: &str) -> Result<Invoice, ServiceError> {
        self.store
            .find_invoice_by_number(number)
            .await?
            .ok_or_else(|| ServiceError::not_found("Invoice tidak ditemukan"))
    }

    /// Line items of an invoice in insertion order.
    pub async fn get_line_items(&self, invoice_id: InvoiceId) -> Result<Vec<LineItem>, ServiceError> {
        Ok(self.store.find_line_items(invoice_id).await?)
    }

    pub async fn list_invoices(&self) -> Result<Vec<Invoice>, ServiceError> {
        Ok(self.store.list_invoices().await?)
    }

    pub async fn list_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Invoice>, ServiceError> {
        Ok(self.store.find_invoices_by_customer(customer_id).await?)
    }

    pub async fn list_by_status(&self, status: InvoiceStatus) -> Result<Vec<Invoice>, ServiceError> {
        Ok(self.store.find_invoices_by_status(status).await?)
    }

    /// SENT and PARTIAL_PAID invoices whose due date has passed.
    pub async fn list_overdue(&self) -> Result<Vec<Invoice>, ServiceError> {
        Ok(self.store.find_overdue_invoices(self.clock.today()).await?)
    }

    /// Open invoices of a customer, earliest due date first.
    pub async fn list_unpaid_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Invoice>, ServiceError> {
        Ok(self.store.find_unpaid_by_customer(customer_id).await?)
    }

    async fn load_invoice(&self, invoice_id: InvoiceId) -> Result<Invoice, ServiceError> {
        self.store
            .find_invoice(invoice_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Invoice tidak ditemukan"))
    }

    fn ensure_editable(invoice: &Invoice) -> Result<(), ServiceError> {
        if !invoice.status().can_modify_items() {
            return Err(ServiceError::conflict(
                "Invoice sudah dikirim, tidak dapat diedit",
            ));
        }
        Ok(())
    }
}
