use async_trait::async_trait;
use chrono::NaiveDate;
use common::{AllocationId, CustomerId, InvoiceId, LineItemId, PaymentId};
use domain::{
    AllocationRecord, AllocationStore, Customer, CustomerRecord, CustomerStore, Invoice,
    InvoiceRecord, InvoiceStatus, InvoiceStore, LineItem, LineItemRecord, LineItemStore, Money,
    Payment, PaymentAllocation, PaymentMethod, PaymentRecord, PaymentStore, StorageError,
    StorageResult, TaxRate,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

const CUSTOMER_COLUMNS: &str =
    "id, code, name, email, phone, address, credit_limit, created_at";
const INVOICE_COLUMNS: &str = "id, invoice_number, customer_id, invoice_date, due_date, status, \
     subtotal, tax_rate, tax_amount, total_amount, paid_amount, notes, created_at";
const LINE_ITEM_COLUMNS: &str = "id, invoice_id, description, quantity, unit_price, amount";
const PAYMENT_COLUMNS: &str = "id, payment_number, customer_id, payment_date, amount, method, \
     reference, notes, created_at";
const ALLOCATION_COLUMNS: &str = "id, payment_id, invoice_id, amount, allocated_at";

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

fn backend(e: sqlx::Error) -> StorageError {
    StorageError::backend(e)
}

/// Maps a unique-key violation to [`StorageError::Duplicate`].
fn insert_error(entity: &'static str, key: &str) -> impl FnOnce(sqlx::Error) -> StorageError {
    let key = key.to_string();
    move |e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            StorageError::Duplicate { entity, key }
        }
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            StorageError::NotFound {
                entity: "referenced row",
                id: db_err.constraint().unwrap_or_default().to_string(),
            }
        }
        other => backend(other),
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> StorageResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name).map_err(backend)
}

fn money(row: &PgRow, name: &str) -> StorageResult<Money> {
    column::<i64>(row, name).map(Money::new)
}

fn sequence_value(value: i64) -> StorageResult<u32> {
    u32::try_from(value).map_err(|_| StorageError::Corrupt(format!("sequence out of range: {value}")))
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    async fn next_sequence(&self, name: &str) -> StorageResult<u32> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sequences (name, value) VALUES ($1, 1)
            ON CONFLICT (name) DO UPDATE SET value = sequences.value + 1
            RETURNING value
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        sequence_value(value)
    }

    async fn fetch_invoices(&self, sql: &str, bind: Option<Uuid>) -> StorageResult<Vec<Invoice>> {
        let mut query = sqlx::query(sql);
        if let Some(id) = bind {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(backend)?;
        rows.iter().map(Self::row_to_invoice).collect()
    }

    /// Loads an invoice and holds its row lock until `tx` ends.
    async fn lock_invoice(
        tx: &mut Transaction<'_, Postgres>,
        id: InvoiceId,
    ) -> StorageResult<Option<Invoice>> {
        let row = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(backend)?;

        row.as_ref().map(Self::row_to_invoice).transpose()
    }

    /// Rebuilds a locked DRAFT invoice's totals over its line items as seen by `tx`.
    ///
    /// Fails with [`StorageError::StateConflict`] unless the invoice is DRAFT,
    /// which rolls back whatever `tx` already changed.
    async fn retotal_draft(
        tx: &mut Transaction<'_, Postgres>,
        invoice: &Invoice,
    ) -> StorageResult<Invoice> {
        if !invoice.status().can_modify_items() {
            return Err(StorageError::StateConflict(format!(
                "invoice {} is {}",
                invoice.id(),
                invoice.status()
            )));
        }

        let rows = sqlx::query(&format!(
            "SELECT {LINE_ITEM_COLUMNS} FROM invoice_line_items WHERE invoice_id = $1 \
             ORDER BY position ASC"
        ))
        .bind(invoice.id().as_uuid())
        .fetch_all(&mut **tx)
        .await
        .map_err(backend)?;
        let items = rows
            .iter()
            .map(Self::row_to_line_item)
            .collect::<StorageResult<Vec<_>>>()?;
        let updated = invoice.recalculate_totals(&items)?;

        sqlx::query(
            "UPDATE invoices SET subtotal = $2, tax_amount = $3, total_amount = $4 WHERE id = $1",
        )
        .bind(updated.id().as_uuid())
        .bind(updated.subtotal().amount())
        .bind(updated.tax_amount().amount())
        .bind(updated.total_amount().amount())
        .execute(&mut **tx)
        .await
        .map_err(backend)?;

        Ok(updated)
    }

    fn row_to_customer(row: &PgRow) -> StorageResult<Customer> {
        Ok(Customer::try_from(CustomerRecord {
            id: CustomerId::from_uuid(column(row, "id")?),
            code: column(row, "code")?,
            name: column(row, "name")?,
            email: column(row, "email")?,
            phone: column(row, "phone")?,
            address: column(row, "address")?,
            credit_limit: money(row, "credit_limit")?,
            created_at: column(row, "created_at")?,
        })?)
    }

    fn row_to_invoice(row: &PgRow) -> StorageResult<Invoice> {
        let status: String = column(row, "status")?;
        let status = InvoiceStatus::parse(&status)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown invoice status: {status}")))?;

        Ok(Invoice::try_from(InvoiceRecord {
            id: InvoiceId::from_uuid(column(row, "id")?),
            invoice_number: column(row, "invoice_number")?,
            customer_id: CustomerId::from_uuid(column(row, "customer_id")?),
            invoice_date: column(row, "invoice_date")?,
            due_date: column(row, "due_date")?,
            status,
            subtotal: money(row, "subtotal")?,
            tax_rate: TaxRate::new(column(row, "tax_rate")?)?,
            tax_amount: money(row, "tax_amount")?,
            total_amount: money(row, "total_amount")?,
            paid_amount: money(row, "paid_amount")?,
            notes: column(row, "notes")?,
            created_at: column(row, "created_at")?,
        })?)
    }

    fn row_to_line_item(row: &PgRow) -> StorageResult<LineItem> {
        let quantity: i64 = column(row, "quantity")?;
        let quantity = u32::try_from(quantity)
            .map_err(|_| StorageError::Corrupt(format!("quantity out of range: {quantity}")))?;

        Ok(LineItem::try_from(LineItemRecord {
            id: LineItemId::from_uuid(column(row, "id")?),
            invoice_id: InvoiceId::from_uuid(column(row, "invoice_id")?),
            description: column(row, "description")?,
            quantity,
            unit_price: money(row, "unit_price")?,
            amount: money(row, "amount")?,
        })?)
    }

    fn row_to_payment(row: &PgRow) -> StorageResult<Payment> {
        let method: String = column(row, "method")?;

        Ok(Payment::try_from(PaymentRecord {
            id: PaymentId::from_uuid(column(row, "id")?),
            payment_number: column(row, "payment_number")?,
            customer_id: CustomerId::from_uuid(column(row, "customer_id")?),
            payment_date: column(row, "payment_date")?,
            amount: money(row, "amount")?,
            method: PaymentMethod::parse(&method),
            reference: column(row, "reference")?,
            notes: column(row, "notes")?,
            created_at: column(row, "created_at")?,
        })?)
    }

    fn row_to_allocation(row: &PgRow) -> StorageResult<PaymentAllocation> {
        Ok(PaymentAllocation::try_from(AllocationRecord {
            id: AllocationId::from_uuid(column(row, "id")?),
            payment_id: PaymentId::from_uuid(column(row, "payment_id")?),
            invoice_id: InvoiceId::from_uuid(column(row, "invoice_id")?),
            amount: money(row, "amount")?,
            allocated_at: column(row, "allocated_at")?,
        })?)
    }
}

#[async_trait]
impl CustomerStore for PostgresStore {
    async fn create_customer(&self, customer: Customer) -> StorageResult<Customer> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, code, name, email, phone, address, credit_limit, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(customer.id().as_uuid())
        .bind(customer.code())
        .bind(customer.name())
        .bind(customer.email())
        .bind(customer.phone())
        .bind(customer.address())
        .bind(customer.credit_limit().amount())
        .bind(customer.created_at())
        .execute(&self.pool)
        .await
        .map_err(insert_error("customer", customer.code()))?;

        Ok(customer)
    }

    async fn find_customer(&self, id: CustomerId) -> StorageResult<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(Self::row_to_customer).transpose()
    }

    async fn find_customer_by_code(&self, code: &str) -> StorageResult<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(Self::row_to_customer).transpose()
    }

    async fn list_customers(&self) -> StorageResult<Vec<Customer>> {
        let rows = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY name ASC, code ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(Self::row_to_customer).collect()
    }

    async fn update_customer(&self, customer: &Customer) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE customers
            SET name = $2, email = $3, phone = $4, address = $5, credit_limit = $6
            WHERE id = $1
            "#,
        )
        .bind(customer.id().as_uuid())
        .bind(customer.name())
        .bind(customer.email())
        .bind(customer.phone())
        .bind(customer.address())
        .bind(customer.credit_limit().amount())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("customer", customer.id()));
        }
        Ok(())
    }

    async fn delete_customer(&self, id: CustomerId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn customer_code_exists(&self, code: &str) -> StorageResult<bool> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM customers WHERE code = $1)")
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)
    }

    async fn next_customer_sequence(&self) -> StorageResult<u32> {
        self.next_sequence("customer").await
    }
}

#[async_trait]
impl InvoiceStore for PostgresStore {
    async fn create_invoice(&self, invoice: Invoice) -> StorageResult<Invoice> {
        sqlx::query(
            r#"
            INSERT INTO invoices (id, invoice_number, customer_id, invoice_date, due_date, status,
                                  subtotal, tax_rate, tax_amount, total_amount, paid_amount, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(invoice.id().as_uuid())
        .bind(invoice.invoice_number())
        .bind(invoice.customer_id().as_uuid())
        .bind(invoice.invoice_date())
        .bind(invoice.due_date())
        .bind(invoice.status().as_str())
        .bind(invoice.subtotal().amount())
        .bind(invoice.tax_rate().percent())
        .bind(invoice.tax_amount().amount())
        .bind(invoice.total_amount().amount())
        .bind(invoice.paid_amount().amount())
        .bind(invoice.notes())
        .bind(invoice.created_at())
        .execute(&self.pool)
        .await
        .map_err(insert_error("invoice", invoice.invoice_number()))?;

        Ok(invoice)
    }

    async fn find_invoice(&self, id: InvoiceId) -> StorageResult<Option<Invoice>> {
        let row = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(Self::row_to_invoice).transpose()
    }

    async fn find_invoice_by_number(&self, number: &str) -> StorageResult<Option<Invoice>> {
        let row = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_number = $1"
        ))
        .bind(number)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(Self::row_to_invoice).transpose()
    }

    async fn find_invoices_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> StorageResult<Vec<Invoice>> {
        self.fetch_invoices(
            &format!(
                "SELECT {INVOICE_COLUMNS} FROM invoices WHERE customer_id = $1 \
                 ORDER BY invoice_date DESC, invoice_number DESC"
            ),
            Some(customer_id.as_uuid()),
        )
        .await
    }

    async fn list_invoices(&self) -> StorageResult<Vec<Invoice>> {
        self.fetch_invoices(
            &format!(
                "SELECT {INVOICE_COLUMNS} FROM invoices ORDER BY invoice_date DESC, invoice_number DESC"
            ),
            None,
        )
        .await
    }

    async fn find_invoices_by_status(&self, status: InvoiceStatus) -> StorageResult<Vec<Invoice>> {
        let rows = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE status = $1 \
             ORDER BY due_date ASC, invoice_number ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(Self::row_to_invoice).collect()
    }

    async fn find_overdue_invoices(&self, today: NaiveDate) -> StorageResult<Vec<Invoice>> {
        let rows = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices \
             WHERE due_date < $1 AND status IN ('SENT', 'PARTIAL_PAID') \
             ORDER BY due_date ASC, invoice_number ASC"
        ))
        .bind(today)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(Self::row_to_invoice).collect()
    }

    async fn find_unpaid_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> StorageResult<Vec<Invoice>> {
        self.fetch_invoices(
            &format!(
                "SELECT {INVOICE_COLUMNS} FROM invoices \
                 WHERE customer_id = $1 AND status IN ('SENT', 'PARTIAL_PAID', 'OVERDUE') \
                 ORDER BY due_date ASC, invoice_number ASC"
            ),
            Some(customer_id.as_uuid()),
        )
        .await
    }

    async fn update_invoice_status(
        &self,
        id: InvoiceId,
        expected: InvoiceStatus,
        status: InvoiceStatus,
    ) -> StorageResult<()> {
        let result = sqlx::query("UPDATE invoices SET status = $3 WHERE id = $1 AND status = $2")
            .bind(id.as_uuid())
            .bind(expected.as_str())
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let current: Option<String> = sqlx::query_scalar("SELECT status FROM invoices WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        match current {
            Some(current) => Err(StorageError::StateConflict(format!(
                "invoice {id} is {current}, expected {expected}"
            ))),
            None => Err(StorageError::not_found("invoice", id)),
        }
    }

    async fn delete_invoice(&self, id: InvoiceId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn next_invoice_sequence(&self) -> StorageResult<u32> {
        self.next_sequence("invoice").await
    }

    async fn customer_balance(&self, customer_id: CustomerId) -> StorageResult<Money> {
        let balance: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(GREATEST(total_amount - paid_amount, 0)), 0)::BIGINT
            FROM invoices
            WHERE customer_id = $1 AND status IN ('SENT', 'PARTIAL_PAID', 'OVERDUE')
            "#,
        )
        .bind(customer_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        Ok(Money::new(balance))
    }
}

#[async_trait]
impl LineItemStore for PostgresStore {
    async fn insert_line_item(&self, item: LineItem) -> StorageResult<Invoice> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let invoice = Self::lock_invoice(&mut tx, item.invoice_id())
            .await?
            .ok_or_else(|| StorageError::not_found("invoice", item.invoice_id()))?;

        sqlx::query(
            r#"
            INSERT INTO invoice_line_items (id, invoice_id, description, quantity, unit_price, amount)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(item.id().as_uuid())
        .bind(item.invoice_id().as_uuid())
        .bind(item.description())
        .bind(i64::from(item.quantity()))
        .bind(item.unit_price().amount())
        .bind(item.amount().amount())
        .execute(&mut *tx)
        .await
        .map_err(insert_error("line item", &item.id().to_string()))?;

        let updated = Self::retotal_draft(&mut tx, &invoice).await?;

        tx.commit().await.map_err(backend)?;
        Ok(updated)
    }

    async fn remove_line_item(
        &self,
        invoice_id: InvoiceId,
        item_id: LineItemId,
    ) -> StorageResult<Option<Invoice>> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let Some(invoice) = Self::lock_invoice(&mut tx, invoice_id).await? else {
            return Ok(None);
        };

        let deleted = sqlx::query("DELETE FROM invoice_line_items WHERE id = $1 AND invoice_id = $2")
            .bind(item_id.as_uuid())
            .bind(invoice_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        if deleted.rows_affected() == 0 {
            return Ok(None);
        }

        let updated = Self::retotal_draft(&mut tx, &invoice).await?;

        tx.commit().await.map_err(backend)?;
        Ok(Some(updated))
    }

    async fn find_line_item(&self, id: LineItemId) -> StorageResult<Option<LineItem>> {
        let row = sqlx::query(&format!(
            "SELECT {LINE_ITEM_COLUMNS} FROM invoice_line_items WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(Self::row_to_line_item).transpose()
    }

    async fn find_line_items(&self, invoice_id: InvoiceId) -> StorageResult<Vec<LineItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {LINE_ITEM_COLUMNS} FROM invoice_line_items WHERE invoice_id = $1 \
             ORDER BY position ASC"
        ))
        .bind(invoice_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(Self::row_to_line_item).collect()
    }
}

#[async_trait]
impl PaymentStore for PostgresStore {
    async fn create_payment(&self, payment: Payment) -> StorageResult<Payment> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, payment_number, customer_id, payment_date, amount, method,
                                  reference, notes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(payment.id().as_uuid())
        .bind(payment.payment_number())
        .bind(payment.customer_id().as_uuid())
        .bind(payment.payment_date())
        .bind(payment.amount().amount())
        .bind(payment.method().as_str())
        .bind(payment.reference())
        .bind(payment.notes())
        .bind(payment.created_at())
        .execute(&self.pool)
        .await
        .map_err(insert_error("payment", payment.payment_number()))?;

        Ok(payment)
    }

    async fn find_payment(&self, id: PaymentId) -> StorageResult<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(Self::row_to_payment).transpose()
    }

    async fn find_payments_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> StorageResult<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE customer_id = $1 \
             ORDER BY payment_date DESC, payment_number DESC"
        ))
        .bind(customer_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(Self::row_to_payment).collect()
    }

    async fn list_payments(&self) -> StorageResult<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments ORDER BY payment_date DESC, payment_number DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(Self::row_to_payment).collect()
    }

    async fn next_payment_sequence(&self) -> StorageResult<u32> {
        self.next_sequence("payment").await
    }
}

#[async_trait]
impl AllocationStore for PostgresStore {
    async fn record_allocation(
        &self,
        allocation: PaymentAllocation,
    ) -> StorageResult<(PaymentAllocation, Invoice)> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Lock both parent rows so concurrent allocations serialise here.
        let payment_amount: Option<i64> =
            sqlx::query_scalar("SELECT amount FROM payments WHERE id = $1 FOR UPDATE")
                .bind(allocation.payment_id().as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?;
        let payment_amount = payment_amount
            .map(Money::new)
            .ok_or_else(|| StorageError::not_found("payment", allocation.payment_id()))?;

        let invoice = Self::lock_invoice(&mut tx, allocation.invoice_id())
            .await?
            .ok_or_else(|| StorageError::not_found("invoice", allocation.invoice_id()))?;
        if !invoice.can_be_paid() {
            return Err(StorageError::StateConflict(format!(
                "invoice {} cannot be paid in status {}",
                invoice.id(),
                invoice.status()
            )));
        }

        let sums = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(amount) FILTER (WHERE payment_id = $1), 0)::BIGINT AS payment_allocated,
                COALESCE(SUM(amount) FILTER (WHERE invoice_id = $2), 0)::BIGINT AS invoice_allocated
            FROM payment_allocations
            WHERE payment_id = $1 OR invoice_id = $2
            "#,
        )
        .bind(allocation.payment_id().as_uuid())
        .bind(allocation.invoice_id().as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;

        let payment_after = Money::try_sum([money(&sums, "payment_allocated")?, allocation.amount()])?;
        if payment_after > payment_amount {
            return Err(StorageError::AllocationOverflow(format!(
                "payment {} would be allocated {payment_after} of {payment_amount}",
                allocation.payment_id()
            )));
        }

        let invoice_after = Money::try_sum([money(&sums, "invoice_allocated")?, allocation.amount()])?;
        if invoice_after > invoice.total_amount() {
            return Err(StorageError::AllocationOverflow(format!(
                "invoice {} would receive {invoice_after} of {}",
                allocation.invoice_id(),
                invoice.total_amount()
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO payment_allocations (id, payment_id, invoice_id, amount, allocated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(allocation.id().as_uuid())
        .bind(allocation.payment_id().as_uuid())
        .bind(allocation.invoice_id().as_uuid())
        .bind(allocation.amount().amount())
        .bind(allocation.allocated_at())
        .execute(&mut *tx)
        .await
        .map_err(insert_error("allocation", &allocation.id().to_string()))?;

        let paid: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM payment_allocations WHERE invoice_id = $1",
        )
        .bind(invoice.id().as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;
        let updated = invoice.update_status_after_payment(Money::new(paid))?;

        sqlx::query("UPDATE invoices SET paid_amount = $2, status = $3 WHERE id = $1")
            .bind(updated.id().as_uuid())
            .bind(updated.paid_amount().amount())
            .bind(updated.status().as_str())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok((allocation, updated))
    }

    async fn find_allocations_by_payment(
        &self,
        payment_id: PaymentId,
    ) -> StorageResult<Vec<PaymentAllocation>> {
        let rows = sqlx::query(&format!(
            "SELECT {ALLOCATION_COLUMNS} FROM payment_allocations WHERE payment_id = $1 \
             ORDER BY allocated_at ASC"
        ))
        .bind(payment_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(Self::row_to_allocation).collect()
    }

    async fn find_allocations_by_invoice(
        &self,
        invoice_id: InvoiceId,
    ) -> StorageResult<Vec<PaymentAllocation>> {
        let rows = sqlx::query(&format!(
            "SELECT {ALLOCATION_COLUMNS} FROM payment_allocations WHERE invoice_id = $1 \
             ORDER BY allocated_at ASC"
        ))
        .bind(invoice_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(Self::row_to_allocation).collect()
    }

    async fn allocated_amount_for_payment(&self, payment_id: PaymentId) -> StorageResult<Money> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM payment_allocations WHERE payment_id = $1",
        )
        .bind(payment_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        Ok(Money::new(total))
    }

    async fn invoice_paid_amount_from_allocations(
        &self,
        invoice_id: InvoiceId,
    ) -> StorageResult<Money> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT FROM payment_allocations WHERE invoice_id = $1",
        )
        .bind(invoice_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        Ok(Money::new(total))
    }
}
