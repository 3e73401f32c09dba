//! Service behavior when the storage adapter refuses or fails a write.
//!
//! `FaultyStore` wraps the in-memory store and fails allocations aimed at
//! chosen invoices before anything reaches the tables.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{CustomerId, FixedClock, InvoiceId, LineItemId, PaymentId};
use domain::{
    AllocationStore, Customer, CustomerDetails, CustomerService, CustomerStore, ErrorKind,
    Invoice, InvoiceService, InvoiceStatus, InvoiceStore, LineItem, LineItemStore, Money,
    NewInvoice, NewLineItem, NewPayment, Payment, PaymentAllocation, PaymentMethod,
    PaymentService, PaymentStore, ReportService, StorageError, StorageResult, TaxRate, WriteGate,
};
use store::InMemoryStore;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    /// The adapter's guard refuses the allocation.
    Reject,
    /// The backend breaks mid-write.
    Break,
}

#[derive(Clone, Default)]
struct FaultyStore {
    inner: InMemoryStore,
    faults: Arc<Mutex<HashMap<InvoiceId, Fault>>>,
}

impl FaultyStore {
    fn fail_allocations_to(&self, invoice_id: InvoiceId, fault: Fault) {
        self.faults.lock().unwrap().insert(invoice_id, fault);
    }

    fn fault_for(&self, invoice_id: InvoiceId) -> Option<Fault> {
        self.faults.lock().unwrap().get(&invoice_id).copied()
    }
}

#[async_trait]
impl CustomerStore for FaultyStore {
    async fn create_customer(&self, customer: Customer) -> StorageResult<Customer> {
        self.inner.create_customer(customer).await
    }

    async fn find_customer(&self, id: CustomerId) -> StorageResult<Option<Customer>> {
        self.inner.find_customer(id).await
    }

    async fn find_customer_by_code(&self, code: &str) -> StorageResult<Option<Customer>> {
        self.inner.find_customer_by_code(code).await
    }

    async fn list_customers(&self) -> StorageResult<Vec<Customer>> {
        self.inner.list_customers().await
    }

    async fn update_customer(&self, customer: &Customer) -> StorageResult<()> {
        self.inner.update_customer(customer).await
    }

    async fn delete_customer(&self, id: CustomerId) -> StorageResult<bool> {
        self.inner.delete_customer(id).await
    }

    async fn customer_code_exists(&self, code: &str) -> StorageResult<bool> {
        self.inner.customer_code_exists(code).await
    }

    async fn next_customer_sequence(&self) -> StorageResult<u32> {
        self.inner.next_customer_sequence().await
    }
}

#[async_trait]
impl InvoiceStore for FaultyStore {
    async fn create_invoice(&self, invoice: Invoice) -> StorageResult<Invoice> {
        self.inner.create_invoice(invoice).await
    }

    async fn find_invoice(&self, id: InvoiceId) -> StorageResult<Option<Invoice>> {
        self.inner.find_invoice(id).await
    }

    async fn find_invoice_by_number(&self, number: &str) -> StorageResult<Option<Invoice>> {
        self.inner.find_invoice_by_number(number).await
    }

    async fn find_invoices_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> StorageResult<Vec<Invoice>> {
        self.inner.find_invoices_by_customer(customer_id).await
    }

    async fn list_invoices(&self) -> StorageResult<Vec<Invoice>> {
        self.inner.list_invoices().await
    }

    async fn find_invoices_by_status(&self, status: InvoiceStatus) -> StorageResult<Vec<Invoice>> {
        self.inner.find_invoices_by_status(status).await
    }

    async fn find_overdue_invoices(&self, today: NaiveDate) -> StorageResult<Vec<Invoice>> {
        self.inner.find_overdue_invoices(today).await
    }

    async fn find_unpaid_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> StorageResult<Vec<Invoice>> {
        self.inner.find_unpaid_by_customer(customer_id).await
    }

    async fn update_invoice_status(
        &self,
        id: InvoiceId,
        expected: InvoiceStatus,
        status: InvoiceStatus,
    ) -> StorageResult<()> {
        self.inner.update_invoice_status(id, expected, status).await
    }

    async fn delete_invoice(&self, id: InvoiceId) -> StorageResult<bool> {
        self.inner.delete_invoice(id).await
    }

    async fn next_invoice_sequence(&self) -> StorageResult<u32> {
        self.inner.next_invoice_sequence().await
    }

    async fn customer_balance(&self, customer_id: CustomerId) -> StorageResult<Money> {
        self.inner.customer_balance(customer_id).await
    }
}

#[async_trait]
impl LineItemStore for FaultyStore {
    async fn insert_line_item(&self, item: LineItem) -> StorageResult<Invoice> {
        self.inner.insert_line_item(item).await
    }

    async fn remove_line_item(
        &self,
        invoice_id: InvoiceId,
        item_id: LineItemId,
    ) -> StorageResult<Option<Invoice>> {
        self.inner.remove_line_item(invoice_id, item_id).await
    }

    async fn find_line_item(&self, id: LineItemId) -> StorageResult<Option<LineItem>> {
        self.inner.find_line_item(id).await
    }

    async fn find_line_items(&self, invoice_id: InvoiceId) -> StorageResult<Vec<LineItem>> {
        self.inner.find_line_items(invoice_id).await
    }
}

#[async_trait]
impl PaymentStore for FaultyStore {
    async fn create_payment(&self, payment: Payment) -> StorageResult<Payment> {
        self.inner.create_payment(payment).await
    }

    async fn find_payment(&self, id: PaymentId) -> StorageResult<Option<Payment>> {
        self.inner.find_payment(id).await
    }

    async fn find_payments_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> StorageResult<Vec<Payment>> {
        self.inner.find_payments_by_customer(customer_id).await
    }

    async fn list_payments(&self) -> StorageResult<Vec<Payment>> {
        self.inner.list_payments().await
    }

    async fn next_payment_sequence(&self) -> StorageResult<u32> {
        self.inner.next_payment_sequence().await
    }
}

#[async_trait]
impl AllocationStore for FaultyStore {
    async fn record_allocation(
        &self,
        allocation: PaymentAllocation,
    ) -> StorageResult<(PaymentAllocation, Invoice)> {
        match self.fault_for(allocation.invoice_id()) {
            Some(Fault::Reject) => Err(StorageError::AllocationOverflow(
                "invoice balance exceeded".into(),
            )),
            Some(Fault::Break) => Err(StorageError::Corrupt("paid_amount unreadable".into())),
            None => self.inner.record_allocation(allocation).await,
        }
    }

    async fn find_allocations_by_payment(
        &self,
        payment_id: PaymentId,
    ) -> StorageResult<Vec<PaymentAllocation>> {
        self.inner.find_allocations_by_payment(payment_id).await
    }

    async fn find_allocations_by_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> StorageResult<Vec<PaymentAllocation>> {
        self.inner.find_allocations_by_invoice(invoice_id).await
    }

    async fn allocated_amount_for_payment(&self, payment_id: PaymentId) -> StorageResult<Money> {
        self.inner.allocated_amount_for_payment(payment_id).await
    }

    async fn invoice_paid_amount_from_allocations(
        &self,
        invoice_id: InvoiceId,
    ) -> StorageResult<Money> {
        self.inner.invoice_paid_amount_from_allocations(invoice_id).await
    }
}

struct Ledger {
    store: FaultyStore,
    customers: CustomerService<FaultyStore>,
    invoices: InvoiceService<FaultyStore>,
    payments: PaymentService<FaultyStore>,
    reports: ReportService<FaultyStore>,
}

impl Ledger {
    fn new() -> Self {
        let clock = Arc::new(FixedClock::new(date(2025, 1, 10)));
        let store = FaultyStore::default();
        let gate = WriteGate::new();
        let invoices = InvoiceService::new(store.clone(), clock.clone(), gate.clone());
        Self {
            customers: CustomerService::new(store.clone(), clock.clone(), gate.clone()),
            payments: PaymentService::new(store.clone(), clock.clone(), gate, invoices.clone()),
            reports: ReportService::new(store.clone(), clock),
            invoices,
            store,
        }
    }

    async fn customer(&self) -> Customer {
        self.customers
            .create_customer(CustomerDetails::new("PT Sinar Abadi"))
            .await
            .unwrap()
            .data
    }

    async fn sent_invoice(&self, customer_id: CustomerId, amount: i64, due: NaiveDate) -> Invoice {
        let draft = self
            .invoices
            .create_invoice(NewInvoice::new(customer_id, due).with_tax_rate(TaxRate::from_percent(0)))
            .await
            .unwrap()
            .data;
        self.invoices
            .add_line_item(draft.id(), NewLineItem::new("Jasa", 1, Money::new(amount)))
            .await
            .unwrap();
        self.invoices.send_invoice(draft.id()).await.unwrap().data
    }

    async fn payment(&self, customer_id: CustomerId, amount: i64) -> Payment {
        self.payments
            .create_payment(NewPayment::new(
                customer_id,
                Money::new(amount),
                PaymentMethod::BankTransfer,
            ))
            .await
            .unwrap()
            .data
    }

    async fn invoice(&self, id: InvoiceId) -> Invoice {
        self.invoices.get_invoice(id).await.unwrap()
    }
}

mod allocation {
    use super::*;

    #[tokio::test]
    async fn failed_write_leaves_payment_and_invoice_untouched() {
        let ledger = Ledger::new();
        let customer = ledger.customer().await;
        let invoice = ledger
            .sent_invoice(customer.id(), 100_000, date(2025, 2, 1))
            .await;
        let payment = ledger.payment(customer.id(), 60_000).await;
        ledger.store.fail_allocations_to(invoice.id(), Fault::Break);

        let err = ledger
            .payments
            .allocate_payment(payment.id(), invoice.id(), Money::new(60_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);

        assert!(
            ledger
                .payments
                .get_allocations(payment.id())
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            ledger.payments.get_unallocated_amount(payment.id()).await.unwrap(),
            Money::new(60_000)
        );
        let stored = ledger.invoice(invoice.id()).await;
        assert_eq!(stored.paid_amount(), Money::zero());
        assert_eq!(stored.status(), InvoiceStatus::Sent);
    }

    #[tokio::test]
    async fn rejected_write_is_a_conflict() {
        let ledger = Ledger::new();
        let customer = ledger.customer().await;
        let invoice = ledger
            .sent_invoice(customer.id(), 100_000, date(2025, 2, 1))
            .await;
        let payment = ledger.payment(customer.id(), 60_000).await;
        ledger.store.fail_allocations_to(invoice.id(), Fault::Reject);

        let err = ledger
            .payments
            .allocate_payment(payment.id(), invoice.id(), Money::new(60_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(ledger.store.inner.allocation_count().await, 0);
    }
}

mod auto_allocation {
    use super::*;

    /// Three invoices of 100_000 due in order, and a payment covering all.
    async fn three_invoices(ledger: &Ledger) -> (Payment, [Invoice; 3]) {
        let customer = ledger.customer().await;
        let first = ledger
            .sent_invoice(customer.id(), 100_000, date(2025, 2, 1))
            .await;
        let second = ledger
            .sent_invoice(customer.id(), 100_000, date(2025, 2, 15))
            .await;
        let third = ledger
            .sent_invoice(customer.id(), 100_000, date(2025, 3, 1))
            .await;
        let payment = ledger.payment(customer.id(), 300_000).await;
        (payment, [first, second, third])
    }

    #[tokio::test]
    async fn stops_at_first_rejected_invoice() {
        let ledger = Ledger::new();
        let (payment, [first, second, third]) = three_invoices(&ledger).await;
        ledger.store.fail_allocations_to(second.id(), Fault::Reject);

        let outcome = ledger
            .payments
            .auto_allocate_payment(payment.id())
            .await
            .unwrap();
        assert_eq!(outcome.data.len(), 1);
        assert_eq!(outcome.data[0].invoice_id(), first.id());
        assert_eq!(outcome.data[0].amount(), Money::new(100_000));
        assert_eq!(outcome.message, "Auto-alokasi berhasil ke 1 invoice");

        let first = ledger.invoice(first.id()).await;
        assert_eq!(first.status(), InvoiceStatus::Paid);
        assert_eq!(first.paid_amount(), Money::new(100_000));

        // the loop does not skip past the rejection
        for later in [second.id(), third.id()] {
            let later = ledger.invoice(later).await;
            assert_eq!(later.status(), InvoiceStatus::Sent);
            assert_eq!(later.paid_amount(), Money::zero());
        }
        assert_eq!(
            ledger.payments.get_unallocated_amount(payment.id()).await.unwrap(),
            Money::new(200_000)
        );
    }

    #[tokio::test]
    async fn rejection_on_first_invoice_allocates_nothing() {
        let ledger = Ledger::new();
        let (payment, [first, _, _]) = three_invoices(&ledger).await;
        ledger.store.fail_allocations_to(first.id(), Fault::Reject);

        let err = ledger
            .payments
            .auto_allocate_payment(payment.id())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "Tidak ada invoice yang dapat dialokasi");
        assert_eq!(ledger.store.inner.allocation_count().await, 0);
        assert_eq!(
            ledger.payments.get_unallocated_amount(payment.id()).await.unwrap(),
            Money::new(300_000)
        );
    }

    #[tokio::test]
    async fn storage_failure_surfaces_and_keeps_earlier_allocations() {
        let ledger = Ledger::new();
        let (payment, [first, second, third]) = three_invoices(&ledger).await;
        ledger.store.fail_allocations_to(second.id(), Fault::Break);

        let err = ledger
            .payments
            .auto_allocate_payment(payment.id())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);

        let allocations = ledger.payments.get_allocations(payment.id()).await.unwrap();
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].invoice_id(), first.id());
        assert_eq!(ledger.invoice(first.id()).await.status(), InvoiceStatus::Paid);
        assert_eq!(ledger.invoice(third.id()).await.paid_amount(), Money::zero());
    }
}

mod reports {
    use super::*;

    #[tokio::test]
    async fn collected_total_beyond_money_range_is_an_error() {
        let ledger = Ledger::new();
        let customer = ledger.customer().await;
        ledger.payment(customer.id(), i64::MAX / 2 + 1).await;
        ledger.payment(customer.id(), i64::MAX / 2 + 1).await;

        let err = ledger
            .reports
            .receivable_summary(date(2025, 1, 10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
