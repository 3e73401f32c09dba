//! Payment recording and allocation engine.

use std::sync::Arc;

use common::{Clock, CustomerId, InvoiceId, PaymentId};
use tracing::{info, warn};

use crate::error::{ErrorKind, Outcome, ServiceError, ServiceResult};
use crate::gate::WriteGate;
use crate::invoice::InvoiceService;
use crate::money::Money;
use crate::ports::Store;

use super::{NewPayment, Payment, PaymentAllocation};

/// Service recording payments and allocating them to invoices.
///
/// An invoice's paid amount is never adjusted incrementally: after every
/// allocation it is recomputed from the invoice's allocation rows and
/// handed to [`InvoiceService`] to derive the new status.
#[derive(Clone)]
pub struct PaymentService<S: Store> {
    store: S,
    clock: Arc<dyn Clock>,
    gate: WriteGate,
    invoices: InvoiceService<S>,
}

impl<S: Store> PaymentService<S> {
    /// Creates a new payment service.
    ///
    /// `invoices` must share `gate`; allocation calls into it while holding
    /// the gate.
    pub fn new(
        store: S,
        clock: Arc<dyn Clock>,
        gate: WriteGate,
        invoices: InvoiceService<S>,
    ) -> Self {
        Self {
            store,
            clock,
            gate,
            invoices,
        }
    }

    /// Records a payment received from a customer.
    #[tracing::instrument(skip(self))]
    pub async fn create_payment(&self, cmd: NewPayment) -> ServiceResult<Payment> {
        let _guard = self.gate.acquire().await;

        if self.store.find_customer(cmd.customer_id).await?.is_none() {
            return Err(ServiceError::not_found("Customer tidak ditemukan"));
        }
        if !cmd.amount.is_positive() {
            return Err(ServiceError::validation("Jumlah pembayaran harus lebih dari 0"));
        }

        let today = self.clock.today();
        let sequence = self.store.next_payment_sequence().await?;
        let payment = Payment::new(
            Payment::generate_number(today, sequence),
            cmd.customer_id,
            cmd.payment_date.unwrap_or(today),
            cmd.amount,
            cmd.method,
            &cmd.reference,
            &cmd.notes,
            self.clock.now(),
        )?;
        let created = self.store.create_payment(payment).await?;

        metrics::counter!("payments_created_total").increment(1);
        info!(
            payment = %created.payment_number(),
            amount = %created.amount(),
            method = %created.method(),
            "payment recorded"
        );

        Ok(Outcome::new(created, "Pembayaran berhasil dibuat"))
    }

    /// Applies `amount` of a payment to one invoice.
    #[tracing::instrument(skip(self))]
    pub async fn allocate_payment(
        &self,
        payment_id: PaymentId,
        invoice_id: InvoiceId,
        amount: Money,
    ) -> ServiceResult<PaymentAllocation> {
        let _guard = self.gate.acquire().await;
        let allocation = self.allocate_locked(payment_id, invoice_id, amount).await?;
        Ok(Outcome::new(allocation, "Alokasi berhasil"))
    }

    /// Spreads the unallocated part of a payment over the customer's open
    /// invoices, earliest due date first.
    ///
    /// Stops at the first allocation that fails; allocations made before it
    /// stand.
    #[tracing::instrument(skip(self))]
    pub async fn auto_allocate_payment(
        &self,
        payment_id: PaymentId,
    ) -> ServiceResult<Vec<PaymentAllocation>> {
        let _guard = self.gate.acquire().await;

        let payment = self.load_payment(payment_id).await?;
        let mut remaining = self.unallocated(&payment).await?;
        if !remaining.is_positive() {
            return Err(ServiceError::validation(
                "Pembayaran sudah dialokasikan seluruhnya",
            ));
        }

        let invoices = self
            .store
            .find_unpaid_by_customer(payment.customer_id())
            .await?;

        let mut allocations = Vec::new();
        for invoice in invoices {
            if !remaining.is_positive() {
                break;
            }
            let amount = remaining.min(invoice.balance_due());
            if !amount.is_positive() {
                continue;
            }

            match self.allocate_locked(payment_id, invoice.id(), amount).await {
                Ok(allocation) => {
                    remaining -= allocation.amount();
                    allocations.push(allocation);
                }
                Err(e) if e.kind() == ErrorKind::Internal => return Err(e),
                Err(e) => {
                    warn!(
                        invoice = %invoice.invoice_number(),
                        error = %e,
                        "auto-allocation stopped"
                    );
                    break;
                }
            }
        }

        if allocations.is_empty() {
            return Err(ServiceError::validation("Tidak ada invoice yang dapat dialokasi"));
        }

        metrics::counter!("auto_allocations_total").increment(1);
        info!(
            payment = %payment.payment_number(),
            invoices = allocations.len(),
            remaining = %remaining,
            "payment auto-allocated"
        );

        let message = format!("Auto-alokasi berhasil ke {} invoice", allocations.len());
        Ok(Outcome::new(allocations, message))
    }

    /// Part of the payment not yet applied to any invoice.
    #[tracing::instrument(skip(self))]
    pub async fn get_unallocated_amount(&self, payment_id: PaymentId) -> Result<Money, ServiceError> {
        let payment = self.load_payment(payment_id).await?;
        self.unallocated(&payment).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_payment(&self, payment_id: PaymentId) -> Result<Payment, ServiceError> {
        self.load_payment(payment_id).await
    }

    pub async fn list_payments(&self) -> Result<Vec<Payment>, ServiceError> {
        Ok(self.store.list_payments().await?)
    }

    pub async fn list_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Payment>, ServiceError> {
        Ok(self.store.find_payments_by_customer(customer_id).await?)
    }

    /// Allocations made from a payment.
    pub async fn get_allocations(
        &self,
        payment_id: PaymentId,
    ) -> Result<Vec<PaymentAllocation>, ServiceError> {
        Ok(self.store.find_allocations_by_payment(payment_id).await?)
    }

    /// Allocations received by an invoice.
    pub async fn get_invoice_allocations(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Vec<PaymentAllocation>, ServiceError> {
        Ok(self.store.find_allocations_by_invoice(invoice_id).await?)
    }

    /// Single-allocation path. The caller holds the write gate.
    async fn allocate_locked(
        &self,
        payment_id: PaymentId,
        invoice_id: InvoiceId,
        amount: Money,
    ) -> Result<PaymentAllocation, ServiceError> {
        let payment = self.load_payment(payment_id).await?;
        let invoice = self
            .store
            .find_invoice(invoice_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Invoice tidak ditemukan"))?;

        if payment.customer_id() != invoice.customer_id() {
            return Err(ServiceError::validation(
                "Pembayaran dan invoice harus dari customer yang sama",
            ));
        }

        if !invoice.can_be_paid() {
            return Err(ServiceError::conflict(format!(
                "Invoice tidak dapat menerima pembayaran (status: {})",
                invoice.status().display_label()
            )));
        }

        let allocation = PaymentAllocation::new(payment_id, invoice_id, amount, self.clock.now())?;

        let unallocated = self.unallocated(&payment).await?;
        if amount > unallocated {
            return Err(ServiceError::validation(format!(
                "Jumlah melebihi sisa pembayaran (tersedia: {unallocated})"
            )));
        }

        let balance_due = invoice.balance_due();
        if amount > balance_due {
            return Err(ServiceError::validation(format!(
                "Jumlah melebihi sisa tagihan invoice (tersedia: {balance_due})"
            )));
        }

        let (created, updated) = self.invoices.update_invoice_paid_amount(allocation).await?;

        metrics::counter!("allocations_total").increment(1);
        metrics::histogram!("allocation_amount").record(amount.amount() as f64);
        info!(
            payment = %payment.payment_number(),
            invoice = %updated.invoice_number(),
            amount = %amount,
            status = %updated.status(),
            "payment allocated"
        );

        Ok(created)
    }

    async fn unallocated(&self, payment: &Payment) -> Result<Money, ServiceError> {
        let allocated = self
            .store
            .allocated_amount_for_payment(payment.id())
            .await?;
        Ok(payment.amount().saturating_sub_floor(allocated))
    }

    async fn load_payment(&self, payment_id: PaymentId) -> Result<Payment, ServiceError> {
        self.store
            .find_payment(payment_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Pembayaran tidak ditemukan"))
    }
}
