//! Customer endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::CustomerId;
use domain::{Customer, CustomerDetails, Money, Store};
use serde::{Deserialize, Serialize};

use super::{ApiResult, parse_id};
use crate::AppState;
use crate::error::{ApiError, ApiResponse};

#[derive(Deserialize)]
pub struct CustomerRequest {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub credit_limit: Money,
}

impl From<CustomerRequest> for CustomerDetails {
    fn from(req: CustomerRequest) -> Self {
        CustomerDetails::new(req.name)
            .with_email(req.email)
            .with_phone(req.phone)
            .with_address(req.address)
            .with_credit_limit(req.credit_limit)
    }
}

#[derive(Serialize)]
pub struct CustomerResponse {
    pub id: String,
    pub code: String,
    pub name: String,
    pub display_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub credit_limit: Money,
    pub balance: Money,
    pub created_at: String,
}

impl CustomerResponse {
    pub fn new(customer: &Customer, balance: Money) -> Self {
        Self {
            id: customer.id().to_string(),
            code: customer.code().to_string(),
            name: customer.name().to_string(),
            display_name: customer.display_name(),
            email: customer.email().to_string(),
            phone: customer.phone().to_string(),
            address: customer.address().to_string(),
            credit_limit: customer.credit_limit(),
            balance,
            created_at: customer.created_at().to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct DeletedResponse {
    pub deleted: String,
}

/// GET /api/customers
#[tracing::instrument(skip(state))]
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> ApiResult<Vec<CustomerResponse>> {
    let customers = state.customers.list_customers().await?;

    let mut responses = Vec::with_capacity(customers.len());
    for customer in &customers {
        let balance = state.customers.customer_balance(customer.id()).await?;
        responses.push(CustomerResponse::new(customer, balance));
    }

    Ok(Json(ApiResponse::data(responses)))
}

/// POST /api/customers
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<CustomerRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CustomerResponse>>), ApiError> {
    let Json(req) = payload?;
    let outcome = state.customers.create_customer(req.into()).await?;
    let body = ApiResponse::from_outcome(outcome, |c| CustomerResponse::new(&c, Money::zero()));
    Ok((StatusCode::CREATED, Json(body)))
}

/// GET /api/customers/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> ApiResult<CustomerResponse> {
    let customer_id: CustomerId = parse_id(&id, "customer")?;
    let customer = state.customers.get_customer(customer_id).await?;
    let balance = state.customers.customer_balance(customer_id).await?;
    Ok(Json(ApiResponse::data(CustomerResponse::new(&customer, balance))))
}

/// PUT /api/customers/{id}
#[tracing::instrument(skip(state, payload))]
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    payload: Result<Json<CustomerRequest>, JsonRejection>,
) -> ApiResult<CustomerResponse> {
    let customer_id: CustomerId = parse_id(&id, "customer")?;
    let Json(req) = payload?;

    let outcome = state
        .customers
        .update_customer(customer_id, req.into())
        .await?;
    let balance = state.customers.customer_balance(customer_id).await?;

    Ok(Json(ApiResponse::from_outcome(outcome, |c| {
        CustomerResponse::new(&c, balance)
    })))
}

/// DELETE /api/customers/{id}
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> ApiResult<DeletedResponse> {
    let customer_id: CustomerId = parse_id(&id, "customer")?;
    let outcome = state.customers.delete_customer(customer_id).await?;
    Ok(Json(ApiResponse::from_outcome(outcome, |()| DeletedResponse {
        deleted: customer_id.to_string(),
    })))
}
