//! Reporting endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use common::CustomerId;
use domain::{AgingReport, Money, ReceivableSummary, Store};
use serde::{Deserialize, Serialize};

use super::customers::CustomerResponse;
use super::invoices::InvoiceResponse;
use super::payments::PaymentResponse;
use super::{ApiResult, parse_id, parse_optional_date};
use crate::AppState;
use crate::error::ApiResponse;

#[derive(Debug, Default, Deserialize)]
pub struct AsOfQuery {
    pub as_of: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Serialize)]
pub struct StatementResponse {
    pub customer: CustomerResponse,
    pub invoices: Vec<InvoiceResponse>,
    pub payments: Vec<PaymentResponse>,
    pub total_invoiced: Money,
    pub total_paid: Money,
    pub balance: Money,
    pub start_date: String,
    pub end_date: String,
}

/// GET /api/reports/aging?as_of=yyyy-MM-dd
#[tracing::instrument(skip(state, query))]
pub async fn aging<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    query: Result<Query<AsOfQuery>, QueryRejection>,
) -> ApiResult<AgingReport> {
    let Query(query) = query?;
    let as_of = parse_optional_date(query.as_of.as_deref())?
        .unwrap_or_else(|| state.reports.today());
    let report = state.reports.aging_report(as_of).await?;
    Ok(Json(ApiResponse::data(report)))
}

/// GET /api/reports/summary?as_of=yyyy-MM-dd
#[tracing::instrument(skip(state, query))]
pub async fn summary<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    query: Result<Query<AsOfQuery>, QueryRejection>,
) -> ApiResult<ReceivableSummary> {
    let Query(query) = query?;
    let as_of = parse_optional_date(query.as_of.as_deref())?
        .unwrap_or_else(|| state.reports.today());
    let summary = state.reports.receivable_summary(as_of).await?;
    Ok(Json(ApiResponse::data(summary)))
}

/// GET /api/reports/statement/{customer_id}?start=&end=
#[tracing::instrument(skip(state, query))]
pub async fn statement<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(customer_id): Path<String>,
    query: Result<Query<PeriodQuery>, QueryRejection>,
) -> ApiResult<StatementResponse> {
    let customer_id: CustomerId = parse_id(&customer_id, "customer")?;
    let Query(query) = query?;
    let start = parse_optional_date(query.start.as_deref())?;
    let end = parse_optional_date(query.end.as_deref())?;

    let statement = state
        .reports
        .customer_statement(customer_id, start, end)
        .await?;

    let mut payments = Vec::with_capacity(statement.payments.len());
    for payment in &statement.payments {
        let allocations = state.payments.get_allocations(payment.id()).await?;
        payments.push(PaymentResponse::new(payment, &allocations));
    }

    let customer_name = Some(statement.customer.name().to_string());
    let invoices = statement
        .invoices
        .iter()
        .map(|invoice| InvoiceResponse::new(invoice, customer_name.clone(), &[]))
        .collect();

    Ok(Json(ApiResponse::data(StatementResponse {
        customer: CustomerResponse::new(&statement.customer, statement.balance),
        invoices,
        payments,
        total_invoiced: statement.total_invoiced,
        total_paid: statement.total_paid,
        balance: statement.balance,
        start_date: statement.start_date.to_string(),
        end_date: statement.end_date.to_string(),
    })))
}
