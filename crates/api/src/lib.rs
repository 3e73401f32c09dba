//! HTTP API server for the receivables ledger.
//!
//! Provides REST endpoints for customers, invoices, payments and reports,
//! with structured logging (tracing) and Prometheus metrics. Every body is
//! wrapped in the [`error::ApiResponse`] envelope.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use common::{Clock, SystemClock};
use domain::{CustomerService, InvoiceService, PaymentService, ReportService, Store, WriteGate};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
///
/// All services share one store, one clock and one write gate.
pub struct AppState<S: Store> {
    pub customers: CustomerService<S>,
    pub invoices: InvoiceService<S>,
    pub payments: PaymentService<S>,
    pub reports: ReportService<S>,
}

impl<S: Store> AppState<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        let gate = WriteGate::new();
        let invoices = InvoiceService::new(store.clone(), clock.clone(), gate.clone());
        Self {
            customers: CustomerService::new(store.clone(), clock.clone(), gate.clone()),
            payments: PaymentService::new(store.clone(), clock.clone(), gate, invoices.clone()),
            reports: ReportService::new(store, clock),
            invoices,
        }
    }
}

/// Creates the application state over `store` with the system clock.
pub fn create_default_state<S: Store>(store: S) -> Arc<AppState<S>> {
    Arc::new(AppState::new(store, Arc::new(SystemClock)))
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    use routes::{customers, invoices, payments, reports};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    let api = Router::new()
        .route("/customers", get(customers::list::<S>).post(customers::create::<S>))
        .route(
            "/customers/{id}",
            get(customers::get::<S>)
                .put(customers::update::<S>)
                .delete(customers::delete::<S>),
        )
        .route("/invoices", get(invoices::list::<S>).post(invoices::create::<S>))
        .route("/invoices/number/{*number}", get(invoices::get_by_number::<S>))
        .route("/invoices/{id}", get(invoices::get::<S>))
        .route("/invoices/{id}/items", post(invoices::add_item::<S>))
        .route(
            "/invoices/{id}/items/{item_id}",
            axum::routing::delete(invoices::remove_item::<S>),
        )
        .route("/invoices/{id}/send", post(invoices::send::<S>))
        .route("/invoices/{id}/cancel", post(invoices::cancel::<S>))
        .route("/invoices/{id}/overdue", post(invoices::mark_overdue::<S>))
        .route("/invoices/{id}/allocations", get(invoices::allocations::<S>))
        .route("/payments", get(payments::list::<S>).post(payments::create::<S>))
        .route("/payments/{id}", get(payments::get::<S>))
        .route("/payments/{id}/allocate", post(payments::allocate::<S>))
        .route("/payments/{id}/auto-allocate", post(payments::auto_allocate::<S>))
        .route("/reports/aging", get(reports::aging::<S>))
        .route("/reports/summary", get(reports::summary::<S>))
        .route("/reports/statement/{customer_id}", get(reports::statement::<S>))
        .with_state(state);

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api", api)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
