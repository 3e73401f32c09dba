//! Receivable reporting: aging, summary and customer statements.
//!
//! Reports are read-only aggregations over the stores. The bucketing and
//! summing are plain functions over entity slices so they can be tested
//! without a store.

use std::sync::Arc;

use chrono::{Months, NaiveDate};
use common::{Clock, CustomerId};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::customer::Customer;
use crate::error::{ServiceError, ValidationError};
use crate::invoice::{Invoice, InvoiceStatus};
use crate::money::Money;
use crate::payment::Payment;
use crate::ports::Store;

/// Days-past-due range used to group outstanding balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AgingBucket {
    #[serde(rename = "Current")]
    Current,
    #[serde(rename = "1-30 Days")]
    Days1To30,
    #[serde(rename = "31-60 Days")]
    Days31To60,
    #[serde(rename = "61-90 Days")]
    Days61To90,
    #[serde(rename = ">90 Days")]
    Over90Days,
}

impl AgingBucket {
    /// Every bucket, youngest first.
    pub const ALL: [AgingBucket; 5] = [
        AgingBucket::Current,
        AgingBucket::Days1To30,
        AgingBucket::Days31To60,
        AgingBucket::Days61To90,
        AgingBucket::Over90Days,
    ];

    /// Picks the bucket for a days-past-due count; zero or less is current.
    pub fn for_days_past_due(days: i64) -> AgingBucket {
        match days {
            i64::MIN..=0 => AgingBucket::Current,
            1..=30 => AgingBucket::Days1To30,
            31..=60 => AgingBucket::Days31To60,
            61..=90 => AgingBucket::Days61To90,
            _ => AgingBucket::Over90Days,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgingBucket::Current => "Current",
            AgingBucket::Days1To30 => "1-30 Days",
            AgingBucket::Days31To60 => "31-60 Days",
            AgingBucket::Days61To90 => "61-90 Days",
            AgingBucket::Over90Days => ">90 Days",
        }
    }
}

/// Count and outstanding balance of the invoices in one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgingBucketTotal {
    pub bucket: AgingBucket,
    pub invoice_count: usize,
    pub total_amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgingReport {
    pub as_of_date: NaiveDate,
    /// Always five entries, in [`AgingBucket::ALL`] order.
    pub buckets: Vec<AgingBucketTotal>,
    pub total_receivable: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivableSummary {
    pub total_customers: usize,
    /// Number of SENT, PARTIAL_PAID and OVERDUE invoices.
    pub total_invoices: usize,
    pub total_receivable: Money,
    pub total_overdue: Money,
    pub total_collected: Money,
    /// Collected over invoiced, in percent with two decimals.
    #[serde(with = "rust_decimal::serde::float")]
    pub collection_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerStatement {
    pub customer: Customer,
    pub invoices: Vec<Invoice>,
    pub payments: Vec<Payment>,
    pub total_invoiced: Money,
    pub total_paid: Money,
    /// Current outstanding balance, not limited to the period.
    pub balance: Money,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Groups active invoices into aging buckets as of `as_of`.
pub fn build_aging_report(
    invoices: &[Invoice],
    as_of: NaiveDate,
) -> Result<AgingReport, ValidationError> {
    let mut buckets: Vec<AgingBucketTotal> = AgingBucket::ALL
        .into_iter()
        .map(|bucket| AgingBucketTotal {
            bucket,
            invoice_count: 0,
            total_amount: Money::zero(),
        })
        .collect();

    let mut total_receivable = Money::zero();
    for invoice in invoices.iter().filter(|i| i.status().is_active()) {
        let bucket = AgingBucket::for_days_past_due(invoice.days_past_due(as_of));
        if let Some(line) = buckets.iter_mut().find(|line| line.bucket == bucket) {
            line.invoice_count += 1;
            line.total_amount = line
                .total_amount
                .checked_add(invoice.balance_due())
                .ok_or(ValidationError::AmountOverflow)?;
        }
        total_receivable = total_receivable
            .checked_add(invoice.balance_due())
            .ok_or(ValidationError::AmountOverflow)?;
    }

    Ok(AgingReport {
        as_of_date: as_of,
        buckets,
        total_receivable,
    })
}

/// Summarises the whole ledger as of `as_of`.
pub fn build_receivable_summary(
    customer_count: usize,
    invoices: &[Invoice],
    payments: &[Payment],
    as_of: NaiveDate,
) -> Result<ReceivableSummary, ValidationError> {
    let active: Vec<&Invoice> = invoices.iter().filter(|i| i.status().is_active()).collect();

    let total_receivable = Money::try_sum(active.iter().map(|i| i.balance_due()))?;
    let total_overdue = Money::try_sum(
        invoices
            .iter()
            .filter(|i| i.is_overdue(as_of))
            .map(|i| i.balance_due()),
    )?;
    let total_invoiced = Money::try_sum(
        invoices
            .iter()
            .filter(|i| i.status() != InvoiceStatus::Cancelled)
            .map(|i| i.total_amount()),
    )?;
    let total_collected = Money::try_sum(payments.iter().map(|p| p.amount()))?;

    Ok(ReceivableSummary {
        total_customers: customer_count,
        total_invoices: active.len(),
        total_receivable,
        total_overdue,
        total_collected,
        collection_rate: collection_rate(total_collected, total_invoiced),
    })
}

fn collection_rate(collected: Money, invoiced: Money) -> Decimal {
    if !invoiced.is_positive() {
        return Decimal::ZERO;
    }
    (Decimal::from(collected.amount()) * Decimal::ONE_HUNDRED / Decimal::from(invoiced.amount()))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Read-only reporting over the ledger.
#[derive(Clone)]
pub struct ReportService<S: Store> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: Store> ReportService<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Today according to the service clock.
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    #[tracing::instrument(skip(self))]
    pub async fn aging_report(&self, as_of: NaiveDate) -> Result<AgingReport, ServiceError> {
        let invoices = self.store.list_invoices().await?;
        Ok(build_aging_report(&invoices, as_of)?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn receivable_summary(
        &self,
        as_of: NaiveDate,
    ) -> Result<ReceivableSummary, ServiceError> {
        let customers = self.store.list_customers().await?;
        let invoices = self.store.list_invoices().await?;
        let payments = self.store.list_payments().await?;
        Ok(build_receivable_summary(
            customers.len(),
            &invoices,
            &payments,
            as_of,
        )?)
    }

    /// A customer's invoices and payments dated within `[start, end]`.
    ///
    /// `end` defaults to today and `start` to three months before `end`.
    #[tracing::instrument(skip(self))]
    pub async fn customer_statement(
        &self,
        customer_id: CustomerId,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<CustomerStatement, ServiceError> {
        let end_date = end.unwrap_or_else(|| self.clock.today());
        let start_date = match start {
            Some(start) => start,
            None => end_date
                .checked_sub_months(Months::new(3))
                .unwrap_or(NaiveDate::MIN),
        };
        if start_date > end_date {
            return Err(ServiceError::validation(
                "Tanggal awal tidak boleh setelah tanggal akhir",
            ));
        }

        let customer = self
            .store
            .find_customer(customer_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Customer tidak ditemukan"))?;

        let in_period = |date: NaiveDate| date >= start_date && date <= end_date;
        let invoices: Vec<Invoice> = self
            .store
            .find_invoices_by_customer(customer_id)
            .await?
            .into_iter()
            .filter(|i| in_period(i.invoice_date()))
            .collect();
        let payments: Vec<Payment> = self
            .store
            .find_payments_by_customer(customer_id)
            .await?
            .into_iter()
            .filter(|p| in_period(p.payment_date()))
            .collect();

        Ok(CustomerStatement {
            total_invoiced: Money::try_sum(invoices.iter().map(|i| i.total_amount()))?,
            total_paid: Money::try_sum(payments.iter().map(|p| p.amount()))?,
            balance: self.store.customer_balance(customer_id).await?,
            customer,
            invoices,
            payments,
            start_date,
            end_date,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::LineItem;
    use crate::money::TaxRate;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// A SENT invoice for `subtotal` with no tax, due on `due`.
    fn sent_invoice(subtotal: i64, due: NaiveDate) -> Invoice {
        let draft = Invoice::draft(
            "INV/2025/00001".into(),
            CustomerId::new(),
            date(2025, 1, 1),
            due,
            TaxRate::from_percent(0),
            "",
            Utc::now(),
        )
        .unwrap();
        let item = LineItem::new(draft.id(), "Jasa", 1, Money::new(subtotal)).unwrap();
        draft
            .recalculate_totals(&[item])
            .unwrap()
            .transition_to(InvoiceStatus::Sent)
            .unwrap()
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(AgingBucket::for_days_past_due(-5), AgingBucket::Current);
        assert_eq!(AgingBucket::for_days_past_due(0), AgingBucket::Current);
        assert_eq!(AgingBucket::for_days_past_due(1), AgingBucket::Days1To30);
        assert_eq!(AgingBucket::for_days_past_due(30), AgingBucket::Days1To30);
        assert_eq!(AgingBucket::for_days_past_due(31), AgingBucket::Days31To60);
        assert_eq!(AgingBucket::for_days_past_due(60), AgingBucket::Days31To60);
        assert_eq!(AgingBucket::for_days_past_due(61), AgingBucket::Days61To90);
        assert_eq!(AgingBucket::for_days_past_due(90), AgingBucket::Days61To90);
        assert_eq!(AgingBucket::for_days_past_due(91), AgingBucket::Over90Days);
    }

    #[test]
    fn test_aging_report_groups_active_invoices() {
        let as_of = date(2025, 6, 30);
        let current = sent_invoice(1_000, date(2025, 7, 15));
        let late = sent_invoice(2_000, date(2025, 6, 10));
        let very_late = sent_invoice(4_000, date(2025, 1, 31))
            .update_status_after_payment(Money::new(1_500))
            .unwrap();
        let cancelled = sent_invoice(9_000, date(2025, 5, 1))
            .transition_to(InvoiceStatus::Cancelled)
            .unwrap();

        let report = build_aging_report(&[current, late, very_late, cancelled], as_of).unwrap();

        let labels: Vec<&str> = report.buckets.iter().map(|b| b.bucket.label()).collect();
        assert_eq!(
            labels,
            ["Current", "1-30 Days", "31-60 Days", "61-90 Days", ">90 Days"]
        );
        assert_eq!(report.buckets[0].invoice_count, 1);
        assert_eq!(report.buckets[0].total_amount, Money::new(1_000));
        assert_eq!(report.buckets[1].total_amount, Money::new(2_000));
        assert_eq!(report.buckets[2].invoice_count, 0);
        assert_eq!(report.buckets[4].total_amount, Money::new(2_500));
        assert_eq!(report.total_receivable, Money::new(5_500));
    }

    #[test]
    fn test_empty_ledger_lists_all_buckets() {
        let report = build_aging_report(&[], date(2025, 1, 1)).unwrap();
        assert_eq!(report.buckets.len(), 5);
        assert_eq!(report.total_receivable, Money::zero());
    }

    #[test]
    fn test_collection_rate() {
        assert_eq!(collection_rate(Money::new(50), Money::zero()), Decimal::ZERO);
        assert_eq!(collection_rate(Money::new(1), Money::new(3)), dec!(33.33));
        assert_eq!(collection_rate(Money::new(2), Money::new(3)), dec!(66.67));
    }

    #[test]
    fn test_receivable_summary() {
        let as_of = date(2025, 6, 30);
        let open = sent_invoice(1_000, date(2025, 7, 15));
        let overdue = sent_invoice(3_000, date(2025, 6, 1));
        let cancelled = sent_invoice(5_000, date(2025, 6, 1))
            .transition_to(InvoiceStatus::Cancelled)
            .unwrap();

        let summary =
            build_receivable_summary(2, &[open, overdue, cancelled], &[], as_of).unwrap();
        assert_eq!(summary.total_customers, 2);
        assert_eq!(summary.total_invoices, 2);
        assert_eq!(summary.total_receivable, Money::new(4_000));
        assert_eq!(summary.total_overdue, Money::new(3_000));
        assert_eq!(summary.total_collected, Money::zero());
        assert_eq!(summary.collection_rate, Decimal::ZERO);
    }

    #[test]
    fn test_totals_beyond_money_range_are_rejected() {
        let as_of = date(2025, 6, 30);
        let huge = || sent_invoice(i64::MAX / 2 + 1, date(2025, 7, 15));

        assert_eq!(
            build_aging_report(&[huge(), huge()], as_of),
            Err(ValidationError::AmountOverflow)
        );
        assert_eq!(
            build_receivable_summary(1, &[huge(), huge()], &[], as_of),
            Err(ValidationError::AmountOverflow)
        );
    }

    #[test]
    fn test_bucket_serializes_as_label() {
        let json = serde_json::to_string(&AgingBucket::Over90Days).unwrap();
        assert_eq!(json, "\">90 Days\"");
    }
}
