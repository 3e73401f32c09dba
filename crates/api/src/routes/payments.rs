//! Payment endpoints and allocation triggers.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CustomerId, InvoiceId, PaymentId};
use domain::{Money, NewPayment, Payment, PaymentAllocation, PaymentMethod, Store};
use serde::{Deserialize, Serialize};

use super::{ApiResult, parse_id, parse_optional_date};
use crate::AppState;
use crate::error::{ApiError, ApiResponse};

#[derive(Deserialize)]
pub struct PaymentRequest {
    pub customer_id: String,
    pub amount: Money,
    /// CASH, BANK_TRANSFER, CREDIT_CARD, CHECK or OTHER; anything else is OTHER.
    #[serde(default)]
    pub payment_method: Option<String>,
    /// `yyyy-MM-dd`, defaults to today.
    #[serde(default)]
    pub payment_date: Option<String>,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Deserialize)]
pub struct AllocationRequest {
    pub invoice_id: String,
    pub amount: Money,
}

#[derive(Serialize)]
pub struct AllocationResponse {
    pub id: String,
    pub payment_id: String,
    pub invoice_id: String,
    pub amount: Money,
    pub allocated_at: String,
}

impl From<&PaymentAllocation> for AllocationResponse {
    fn from(allocation: &PaymentAllocation) -> Self {
        Self {
            id: allocation.id().to_string(),
            payment_id: allocation.payment_id().to_string(),
            invoice_id: allocation.invoice_id().to_string(),
            amount: allocation.amount(),
            allocated_at: allocation.allocated_at().to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub payment_number: String,
    pub customer_id: String,
    pub payment_date: String,
    pub amount: Money,
    pub allocated_amount: Money,
    pub unallocated_amount: Money,
    pub payment_method: PaymentMethod,
    pub payment_method_display: &'static str,
    pub reference: String,
    pub notes: String,
    pub allocations: Vec<AllocationResponse>,
    pub created_at: String,
}

impl PaymentResponse {
    pub fn new(payment: &Payment, allocations: &[PaymentAllocation]) -> Self {
        // allocations never exceed the payment they draw from
        let allocated =
            Money::checked_sum(allocations.iter().map(|a| a.amount())).unwrap_or(payment.amount());
        Self {
            id: payment.id().to_string(),
            payment_number: payment.payment_number().to_string(),
            customer_id: payment.customer_id().to_string(),
            payment_date: payment.payment_date().to_string(),
            amount: payment.amount(),
            allocated_amount: allocated,
            unallocated_amount: payment.amount().saturating_sub_floor(allocated),
            payment_method: payment.method(),
            payment_method_display: payment.method().display_label(),
            reference: payment.reference().to_string(),
            notes: payment.notes().to_string(),
            allocations: allocations.iter().map(AllocationResponse::from).collect(),
            created_at: payment.created_at().to_rfc3339(),
        }
    }
}

async fn describe<S: Store>(
    state: &AppState<S>,
    payment: &Payment,
) -> Result<PaymentResponse, ApiError> {
    let allocations = state.payments.get_allocations(payment.id()).await?;
    Ok(PaymentResponse::new(payment, &allocations))
}

/// GET /api/payments
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> ApiResult<Vec<PaymentResponse>> {
    let payments = state.payments.list_payments().await?;
    let mut responses = Vec::with_capacity(payments.len());
    for payment in &payments {
        responses.push(describe(&state, payment).await?);
    }
    Ok(Json(ApiResponse::data(responses)))
}

/// POST /api/payments
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentResponse>>), ApiError> {
    let Json(req) = payload?;
    let customer_id: CustomerId = parse_id(&req.customer_id, "customer")?;
    let method = req
        .payment_method
        .as_deref()
        .map(PaymentMethod::parse)
        .unwrap_or_default();

    let mut cmd = NewPayment::new(customer_id, req.amount, method)
        .with_reference(req.reference)
        .with_notes(req.notes);
    if let Some(date) = parse_optional_date(req.payment_date.as_deref())? {
        cmd = cmd.on(date);
    }

    let outcome = state.payments.create_payment(cmd).await?;
    let body = ApiResponse::from_outcome(outcome, |payment| PaymentResponse::new(&payment, &[]));
    Ok((StatusCode::CREATED, Json(body)))
}

/// GET /api/payments/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> ApiResult<PaymentResponse> {
    let payment_id: PaymentId = parse_id(&id, "pembayaran")?;
    let payment = state.payments.get_payment(payment_id).await?;
    Ok(Json(ApiResponse::data(describe(&state, &payment).await?)))
}

/// POST /api/payments/{id}/allocate
#[tracing::instrument(skip(state, payload))]
pub async fn allocate<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<AllocationRequest>, JsonRejection>,
) -> ApiResult<AllocationResponse> {
    let payment_id: PaymentId = parse_id(&id, "pembayaran")?;
    let Json(req) = payload?;
    let invoice_id: InvoiceId = parse_id(&req.invoice_id, "invoice")?;

    let outcome = state
        .payments
        .allocate_payment(payment_id, invoice_id, req.amount)
        .await?;
    Ok(Json(ApiResponse::from_outcome(outcome, |allocation| {
        AllocationResponse::from(&allocation)
    })))
}

/// POST /api/payments/{id}/auto-allocate
#[tracing::instrument(skip(state))]
pub async fn auto_allocate<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<AllocationResponse>> {
    let payment_id: PaymentId = parse_id(&id, "pembayaran")?;
    let outcome = state.payments.auto_allocate_payment(payment_id).await?;
    Ok(Json(ApiResponse::from_outcome(outcome, |allocations| {
        allocations.iter().map(AllocationResponse::from).collect()
    })))
}
