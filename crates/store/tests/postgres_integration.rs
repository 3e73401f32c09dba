//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use domain::{
    AllocationStore, Customer, CustomerDetails, CustomerStore, Invoice, InvoiceStatus,
    InvoiceStore, LineItem, LineItemStore, Money, Payment, PaymentAllocation, PaymentMethod,
    PaymentStore, StorageError, TaxRate,
};
use sqlx::PgPool;
use store::PostgresStore;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_ledger_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE payment_allocations, invoice_line_items, payments, invoices, customers, sequences",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query("DROP TRIGGER IF EXISTS fail_invoice_update ON invoices")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn create_customer(store: &PostgresStore, name: &str) -> Customer {
    let seq = store.next_customer_sequence().await.unwrap();
    let customer = Customer::new(
        Customer::generate_code(seq),
        CustomerDetails::new(name).with_credit_limit(Money::new(10_000_000)),
        Utc::now(),
    )
    .unwrap();
    store.create_customer(customer).await.unwrap()
}

async fn create_draft(store: &PostgresStore, customer: &Customer, due: NaiveDate) -> Invoice {
    let seq = store.next_invoice_sequence().await.unwrap();
    let draft = Invoice::draft(
        Invoice::generate_number(date(2025, 1, 1), seq),
        customer.id(),
        date(2025, 1, 1),
        due,
        TaxRate::default(),
        "termin 30 hari",
        Utc::now(),
    )
    .unwrap();
    store.create_invoice(draft).await.unwrap()
}

/// Creates a SENT invoice holding one line of `qty` x `price` at 11% tax.
async fn create_sent_invoice(
    store: &PostgresStore,
    customer: &Customer,
    qty: u32,
    price: i64,
    due: NaiveDate,
) -> Invoice {
    let draft = create_draft(store, customer, due).await;
    let item = LineItem::new(draft.id(), "Jasa konsultasi", qty, Money::new(price)).unwrap();
    store.insert_line_item(item).await.unwrap();
    store
        .update_invoice_status(draft.id(), InvoiceStatus::Draft, InvoiceStatus::Sent)
        .await
        .unwrap();
    store.find_invoice(draft.id()).await.unwrap().unwrap()
}

/// Makes every later UPDATE of an invoice row fail inside its transaction.
async fn fail_invoice_updates(store: &PostgresStore) {
    sqlx::raw_sql(
        r#"
        CREATE OR REPLACE FUNCTION fail_invoice_update() RETURNS trigger AS $$
        BEGIN
            RAISE EXCEPTION 'disk full';
        END;
        $$ LANGUAGE plpgsql;

        CREATE TRIGGER fail_invoice_update BEFORE UPDATE ON invoices
            FOR EACH ROW EXECUTE FUNCTION fail_invoice_update();
        "#,
    )
    .execute(store.pool())
    .await
    .unwrap();
}

async fn create_payment(store: &PostgresStore, customer: &Customer, amount: i64) -> Payment {
    let seq = store.next_payment_sequence().await.unwrap();
    let payment = Payment::new(
        Payment::generate_number(date(2025, 1, 1), seq),
        customer.id(),
        date(2025, 2, 1),
        Money::new(amount),
        PaymentMethod::BankTransfer,
        "TRX-1",
        "",
        Utc::now(),
    )
    .unwrap();
    store.create_payment(payment).await.unwrap()
}

#[tokio::test]
async fn test_customer_round_trip() {
    let store = get_test_store().await;
    let customer = create_customer(&store, "PT Maju Jaya").await;

    let loaded = store.find_customer(customer.id()).await.unwrap().unwrap();
    assert_eq!(loaded.code(), customer.code());
    assert_eq!(loaded.name(), "PT Maju Jaya");
    assert_eq!(loaded.credit_limit(), Money::new(10_000_000));

    let by_code = store.find_customer_by_code(customer.code()).await.unwrap();
    assert_eq!(by_code.map(|c| c.id()), Some(customer.id()));
}

#[tokio::test]
async fn test_duplicate_customer_code_is_reported() {
    let store = get_test_store().await;
    let customer = create_customer(&store, "PT A").await;
    let clash = Customer::new(
        customer.code().to_string(),
        CustomerDetails::new("PT B"),
        Utc::now(),
    )
    .unwrap();

    let result = store.create_customer(clash).await;
    assert!(matches!(result, Err(StorageError::Duplicate { .. })));
}

#[tokio::test]
async fn test_sequences_never_repeat() {
    let store = get_test_store().await;
    let first = store.next_invoice_sequence().await.unwrap();
    let second = store.next_invoice_sequence().await.unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, 2);
    assert_eq!(store.next_payment_sequence().await.unwrap(), 1);
}

#[tokio::test]
async fn test_invoice_round_trip_keeps_totals() {
    let store = get_test_store().await;
    let customer = create_customer(&store, "PT A").await;
    let invoice = create_sent_invoice(&store, &customer, 2, 50_000, date(2025, 2, 1)).await;

    let loaded = store.find_invoice(invoice.id()).await.unwrap().unwrap();
    // timestamps lose sub-microsecond precision, so compare fields
    assert_eq!(loaded.invoice_number(), invoice.invoice_number());
    assert_eq!(loaded.status(), InvoiceStatus::Sent);
    assert_eq!(loaded.tax_rate(), TaxRate::default());
    assert_eq!(loaded.tax_amount(), Money::new(11_000));
    assert_eq!(loaded.total_amount(), Money::new(111_000));

    let items = store.find_line_items(invoice.id()).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].amount(), Money::new(100_000));
}

#[tokio::test]
async fn test_unpaid_and_overdue_queries() {
    let store = get_test_store().await;
    let customer = create_customer(&store, "PT A").await;
    let later = create_sent_invoice(&store, &customer, 1, 1_000, date(2025, 3, 1)).await;
    let earlier = create_sent_invoice(&store, &customer, 1, 1_000, date(2025, 2, 1)).await;
    store
        .update_invoice_status(later.id(), InvoiceStatus::Sent, InvoiceStatus::Overdue)
        .await
        .unwrap();

    let unpaid = store.find_unpaid_by_customer(customer.id()).await.unwrap();
    let ids: Vec<_> = unpaid.iter().map(|i| i.id()).collect();
    assert_eq!(ids, [earlier.id(), later.id()]);

    // OVERDUE rows are not returned by the overdue query
    let overdue = store.find_overdue_invoices(date(2025, 6, 1)).await.unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].id(), earlier.id());

    assert_eq!(
        store.customer_balance(customer.id()).await.unwrap(),
        Money::new(2_220)
    );
}

#[tokio::test]
async fn test_allocation_guard() {
    let store = get_test_store().await;
    let customer = create_customer(&store, "PT A").await;
    let invoice = create_sent_invoice(&store, &customer, 1, 100_000, date(2025, 3, 1)).await;
    let payment = create_payment(&store, &customer, 60_000).await;

    let first =
        PaymentAllocation::new(payment.id(), invoice.id(), Money::new(50_000), Utc::now()).unwrap();
    store.record_allocation(first).await.unwrap();

    let too_much =
        PaymentAllocation::new(payment.id(), invoice.id(), Money::new(10_001), Utc::now()).unwrap();
    let result = store.record_allocation(too_much).await;
    assert!(matches!(result, Err(StorageError::AllocationOverflow(_))));

    assert_eq!(
        store.allocated_amount_for_payment(payment.id()).await.unwrap(),
        Money::new(50_000)
    );
    assert_eq!(
        store
            .invoice_paid_amount_from_allocations(invoice.id())
            .await
            .unwrap(),
        Money::new(50_000)
    );
}

#[tokio::test]
async fn test_allocation_writes_paid_amount_and_status() {
    let store = get_test_store().await;
    let customer = create_customer(&store, "PT A").await;
    let invoice = create_sent_invoice(&store, &customer, 1, 100_000, date(2025, 3, 1)).await;
    let payment = create_payment(&store, &customer, 200_000).await;

    let partial =
        PaymentAllocation::new(payment.id(), invoice.id(), Money::new(11_000), Utc::now()).unwrap();
    let (_, updated) = store.record_allocation(partial).await.unwrap();
    assert_eq!(updated.status(), InvoiceStatus::PartialPaid);

    let rest =
        PaymentAllocation::new(payment.id(), invoice.id(), Money::new(100_000), Utc::now()).unwrap();
    let (_, updated) = store.record_allocation(rest).await.unwrap();
    assert_eq!(updated.status(), InvoiceStatus::Paid);

    let loaded = store.find_invoice(invoice.id()).await.unwrap().unwrap();
    assert_eq!(loaded.status(), InvoiceStatus::Paid);
    assert_eq!(loaded.paid_amount(), Money::new(111_000));
    assert_eq!(loaded.balance_due(), Money::zero());
}

#[tokio::test]
async fn test_failed_invoice_update_rolls_back_allocation() {
    let store = get_test_store().await;
    let customer = create_customer(&store, "PT A").await;
    let invoice = create_sent_invoice(&store, &customer, 1, 100_000, date(2025, 3, 1)).await;
    let payment = create_payment(&store, &customer, 60_000).await;
    fail_invoice_updates(&store).await;

    let allocation =
        PaymentAllocation::new(payment.id(), invoice.id(), Money::new(60_000), Utc::now()).unwrap();
    let result = store.record_allocation(allocation).await;
    assert!(matches!(result, Err(StorageError::Backend(_))));

    assert!(
        store
            .find_allocations_by_payment(payment.id())
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        store.allocated_amount_for_payment(payment.id()).await.unwrap(),
        Money::zero()
    );
    let loaded = store.find_invoice(invoice.id()).await.unwrap().unwrap();
    assert_eq!(loaded.paid_amount(), Money::zero());
    assert_eq!(loaded.status(), InvoiceStatus::Sent);
}

#[tokio::test]
async fn test_allocation_to_cancelled_invoice_is_rejected() {
    let store = get_test_store().await;
    let customer = create_customer(&store, "PT A").await;
    let invoice = create_sent_invoice(&store, &customer, 1, 100_000, date(2025, 3, 1)).await;
    let payment = create_payment(&store, &customer, 60_000).await;
    store
        .update_invoice_status(invoice.id(), InvoiceStatus::Sent, InvoiceStatus::Cancelled)
        .await
        .unwrap();

    let allocation =
        PaymentAllocation::new(payment.id(), invoice.id(), Money::new(10_000), Utc::now()).unwrap();
    let result = store.record_allocation(allocation).await;
    assert!(matches!(result, Err(StorageError::StateConflict(_))));

    let loaded = store.find_invoice(invoice.id()).await.unwrap().unwrap();
    assert_eq!(loaded.status(), InvoiceStatus::Cancelled);
    assert_eq!(loaded.paid_amount(), Money::zero());
}

#[tokio::test]
async fn test_status_update_checks_current_status() {
    let store = get_test_store().await;
    let customer = create_customer(&store, "PT A").await;
    let invoice = create_sent_invoice(&store, &customer, 1, 1_000, date(2025, 3, 1)).await;

    let stale = store
        .update_invoice_status(invoice.id(), InvoiceStatus::Draft, InvoiceStatus::Cancelled)
        .await;
    assert!(matches!(stale, Err(StorageError::StateConflict(_))));

    let missing = store
        .update_invoice_status(
            common::InvoiceId::new(),
            InvoiceStatus::Draft,
            InvoiceStatus::Sent,
        )
        .await;
    assert!(matches!(missing, Err(StorageError::NotFound { .. })));
}

#[tokio::test]
async fn test_line_items_and_totals_commit_together() {
    let store = get_test_store().await;
    let customer = create_customer(&store, "PT A").await;
    let draft = create_draft(&store, &customer, date(2025, 3, 1)).await;

    let first = LineItem::new(draft.id(), "Jasa", 2, Money::new(50_000)).unwrap();
    let second = LineItem::new(draft.id(), "Barang", 1, Money::new(30_000)).unwrap();
    store.insert_line_item(first.clone()).await.unwrap();
    let updated = store.insert_line_item(second).await.unwrap();
    assert_eq!(updated.subtotal(), Money::new(130_000));
    assert_eq!(updated.total_amount(), Money::new(144_300));

    let updated = store
        .remove_line_item(draft.id(), first.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.subtotal(), Money::new(30_000));

    let loaded = store.find_invoice(draft.id()).await.unwrap().unwrap();
    assert_eq!(loaded.subtotal(), Money::new(30_000));
    assert_eq!(loaded.total_amount(), Money::new(33_300));
    assert!(
        store
            .remove_line_item(draft.id(), first.id())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_failed_totals_update_rolls_back_line_item() {
    let store = get_test_store().await;
    let customer = create_customer(&store, "PT A").await;
    let draft = create_draft(&store, &customer, date(2025, 3, 1)).await;
    fail_invoice_updates(&store).await;

    let item = LineItem::new(draft.id(), "Jasa", 1, Money::new(50_000)).unwrap();
    let result = store.insert_line_item(item.clone()).await;
    assert!(matches!(result, Err(StorageError::Backend(_))));

    assert!(store.find_line_item(item.id()).await.unwrap().is_none());
    let loaded = store.find_invoice(draft.id()).await.unwrap().unwrap();
    assert_eq!(loaded.total_amount(), Money::zero());
}

#[tokio::test]
async fn test_line_items_of_sent_invoice_are_rejected() {
    let store = get_test_store().await;
    let customer = create_customer(&store, "PT A").await;
    let invoice = create_sent_invoice(&store, &customer, 1, 1_000, date(2025, 3, 1)).await;

    let extra = LineItem::new(invoice.id(), "Tambahan", 1, Money::new(500)).unwrap();
    let result = store.insert_line_item(extra.clone()).await;
    assert!(matches!(result, Err(StorageError::StateConflict(_))));
    assert!(store.find_line_item(extra.id()).await.unwrap().is_none());
    assert_eq!(store.find_line_items(invoice.id()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_invoice_cascades_line_items() {
    let store = get_test_store().await;
    let customer = create_customer(&store, "PT A").await;
    let invoice = create_sent_invoice(&store, &customer, 1, 1_000, date(2025, 3, 1)).await;

    assert!(store.delete_invoice(invoice.id()).await.unwrap());
    assert!(store.find_line_items(invoice.id()).await.unwrap().is_empty());
    assert!(store.find_invoices_by_customer(customer.id()).await.unwrap().is_empty());
}
