//! Invoice endpoints: drafting, line items, sending and cancelling.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{CustomerId, InvoiceId, LineItemId};
use domain::{
    ErrorKind, Invoice, InvoiceStatus, LineItem, Money, NewInvoice, NewLineItem, Store, TaxRate,
};
use serde::{Deserialize, Serialize};

use super::payments::AllocationResponse;
use super::{ApiResult, parse_date, parse_id};
use crate::AppState;
use crate::error::{ApiError, ApiResponse};

fn default_tax_rate() -> f64 {
    11.0
}

fn default_quantity() -> i64 {
    1
}

#[derive(Deserialize)]
pub struct InvoiceRequest {
    pub customer_id: String,
    /// `yyyy-MM-dd`
    pub due_date: String,
    #[serde(default = "default_tax_rate")]
    pub tax_rate: f64,
    #[serde(default)]
    pub notes: String,
}

#[derive(Deserialize)]
pub struct LineItemRequest {
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    pub unit_price: Money,
}

/// Filters for GET /api/invoices. At most one applies; `overdue` wins,
/// then `customer_id`, then `status`.
#[derive(Debug, Default, Deserialize)]
pub struct InvoiceFilter {
    pub status: Option<String>,
    pub customer_id: Option<String>,
    #[serde(default)]
    pub overdue: bool,
}

#[derive(Serialize)]
pub struct LineItemResponse {
    pub id: String,
    pub description: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub amount: Money,
}

impl From<&LineItem> for LineItemResponse {
    fn from(item: &LineItem) -> Self {
        Self {
            id: item.id().to_string(),
            description: item.description().to_string(),
            quantity: item.quantity(),
            unit_price: item.unit_price(),
            amount: item.amount(),
        }
    }
}

#[derive(Serialize)]
pub struct InvoiceResponse {
    pub id: String,
    pub invoice_number: String,
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub invoice_date: String,
    pub due_date: String,
    pub status: InvoiceStatus,
    pub status_display: &'static str,
    pub subtotal: Money,
    pub tax_rate: TaxRate,
    pub tax_amount: Money,
    pub total_amount: Money,
    pub paid_amount: Money,
    pub balance_due: Money,
    pub notes: String,
    pub items: Vec<LineItemResponse>,
    pub created_at: String,
}

impl InvoiceResponse {
    pub fn new(invoice: &Invoice, customer_name: Option<String>, items: &[LineItem]) -> Self {
        Self {
            id: invoice.id().to_string(),
            invoice_number: invoice.invoice_number().to_string(),
            customer_id: invoice.customer_id().to_string(),
            customer_name,
            invoice_date: invoice.invoice_date().to_string(),
            due_date: invoice.due_date().to_string(),
            status: invoice.status(),
            status_display: invoice.status().display_label(),
            subtotal: invoice.subtotal(),
            tax_rate: invoice.tax_rate(),
            tax_amount: invoice.tax_amount(),
            total_amount: invoice.total_amount(),
            paid_amount: invoice.paid_amount(),
            balance_due: invoice.balance_due(),
            notes: invoice.notes().to_string(),
            items: items.iter().map(LineItemResponse::from).collect(),
            created_at: invoice.created_at().to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct RemovedItemResponse {
    pub deleted: String,
    pub invoice: InvoiceResponse,
}

/// Builds the full response for one invoice, including its customer name and items.
async fn describe<S: Store>(
    state: &AppState<S>,
    invoice: &Invoice,
) -> Result<InvoiceResponse, ApiError> {
    let customer_name = match state.customers.get_customer(invoice.customer_id()).await {
        Ok(customer) => Some(customer.name().to_string()),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };
    let items = state.invoices.get_line_items(invoice.id()).await?;
    Ok(InvoiceResponse::new(invoice, customer_name, &items))
}

/// GET /api/invoices
#[tracing::instrument(skip(state, filter))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    filter: Result<Query<InvoiceFilter>, QueryRejection>,
) -> ApiResult<Vec<InvoiceResponse>> {
    let Query(filter) = filter?;

    let invoices = if filter.overdue {
        state.invoices.list_overdue().await?
    } else if let Some(customer_id) = filter.customer_id.as_deref() {
        let customer_id: CustomerId = parse_id(customer_id, "customer")?;
        state.invoices.list_by_customer(customer_id).await?
    } else if let Some(status) = filter.status.as_deref() {
        let status = InvoiceStatus::parse(status)
            .ok_or_else(|| ApiError::BadRequest(format!("Status tidak valid: {status}")))?;
        state.invoices.list_by_status(status).await?
    } else {
        state.invoices.list_invoices().await?
    };

    let mut responses = Vec::with_capacity(invoices.len());
    for invoice in &invoices {
        responses.push(describe(&state, invoice).await?);
    }
    Ok(Json(ApiResponse::data(responses)))
}

/// POST /api/invoices
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<InvoiceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<InvoiceResponse>>), ApiError> {
    let Json(req) = payload?;
    let customer_id: CustomerId = parse_id(&req.customer_id, "customer")?;
    let due_date = parse_date(&req.due_date)?;
    let tax_rate =
        TaxRate::from_f64(req.tax_rate).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let cmd = NewInvoice::new(customer_id, due_date)
        .with_tax_rate(tax_rate)
        .with_notes(req.notes);
    let outcome = state.invoices.create_invoice(cmd).await?;

    let body = ApiResponse::from_outcome(outcome, |invoice| {
        InvoiceResponse::new(&invoice, None, &[])
    });
    Ok((StatusCode::CREATED, Json(body)))
}

/// GET /api/invoices/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> ApiResult<InvoiceResponse> {
    let invoice_id: InvoiceId = parse_id(&id, "invoice")?;
    let invoice = state.invoices.get_invoice(invoice_id).await?;
    Ok(Json(ApiResponse::data(describe(&state, &invoice).await?)))
}

/// GET /api/invoices/number/{number}
///
/// Invoice numbers contain slashes, so the number is matched as a wildcard.
#[tracing::instrument(skip(state))]
pub async fn get_by_number<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(number): Path<String>,
) -> ApiResult<InvoiceResponse> {
    let invoice = state.invoices.get_invoice_by_number(&number).await?;
    Ok(Json(ApiResponse::data(describe(&state, &invoice).await?)))
}

/// POST /api/invoices/{id}/items
#[tracing::instrument(skip(state, payload))]
pub async fn add_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<LineItemRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<LineItemResponse>>), ApiError> {
    let invoice_id: InvoiceId = parse_id(&id, "invoice")?;
    let Json(req) = payload?;
    let quantity = u32::try_from(req.quantity)
        .map_err(|_| ApiError::BadRequest("Quantity harus lebih dari 0".to_string()))?;

    let outcome = state
        .invoices
        .add_line_item(
            invoice_id,
            NewLineItem::new(req.description, quantity, req.unit_price),
        )
        .await?;

    let body = ApiResponse::from_outcome(outcome, |item| LineItemResponse::from(&item));
    Ok((StatusCode::CREATED, Json(body)))
}

/// DELETE /api/invoices/{id}/items/{item_id}
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, item_id)): Path<(String, String)>,
) -> ApiResult<RemovedItemResponse> {
    let invoice_id: InvoiceId = parse_id(&id, "invoice")?;
    let line_item_id: LineItemId = parse_id(&item_id, "item")?;

    let outcome = state
        .invoices
        .remove_line_item(invoice_id, line_item_id)
        .await?;
    let invoice = describe(&state, &outcome.data).await?;

    Ok(Json(ApiResponse::ok(
        RemovedItemResponse {
            deleted: line_item_id.to_string(),
            invoice,
        },
        outcome.message,
    )))
}

/// POST /api/invoices/{id}/send
#[tracing::instrument(skip(state))]
pub async fn send<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> ApiResult<InvoiceResponse> {
    let invoice_id: InvoiceId = parse_id(&id, "invoice")?;
    let outcome = state.invoices.send_invoice(invoice_id).await?;
    let invoice = describe(&state, &outcome.data).await?;
    Ok(Json(ApiResponse::ok(invoice, outcome.message)))
}

/// POST /api/invoices/{id}/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> ApiResult<InvoiceResponse> {
    let invoice_id: InvoiceId = parse_id(&id, "invoice")?;
    let outcome = state.invoices.cancel_invoice(invoice_id).await?;
    let invoice = describe(&state, &outcome.data).await?;
    Ok(Json(ApiResponse::ok(invoice, outcome.message)))
}

/// POST /api/invoices/{id}/overdue
#[tracing::instrument(skip(state))]
pub async fn mark_overdue<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> ApiResult<InvoiceResponse> {
    let invoice_id: InvoiceId = parse_id(&id, "invoice")?;
    let outcome = state.invoices.mark_overdue(invoice_id).await?;
    let invoice = describe(&state, &outcome.data).await?;
    Ok(Json(ApiResponse::ok(invoice, outcome.message)))
}

/// GET /api/invoices/{id}/allocations
#[tracing::instrument(skip(state))]
pub async fn allocations<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<AllocationResponse>> {
    let invoice_id: InvoiceId = parse_id(&id, "invoice")?;
    state.invoices.get_invoice(invoice_id).await?;
    let allocations = state.payments.get_invoice_allocations(invoice_id).await?;
    Ok(Json(ApiResponse::data(
        allocations.iter().map(AllocationResponse::from).collect(),
    )))
}
