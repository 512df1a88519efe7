//! HTTP API server for the commerce core.
//!
//! Exposes checkout, order management and payment settlement as REST
//! endpoints, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::OrderService;
use payments::{PaymentGateway, PaymentService};
use store::CommerceStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S, G> {
    pub orders: OrderService<S>,
    pub payments: PaymentService<S, OrderService<S>, G>,
    pub store: S,
}

impl<S, G> AppState<S, G>
where
    S: CommerceStore,
    G: PaymentGateway + 'static,
{
    /// Wires both workflows onto a single store.
    pub fn new(store: S, gateway: G) -> Self {
        let orders = OrderService::new(store.clone());
        let payments = PaymentService::new(store.clone(), orders.clone(), gateway);
        Self {
            orders,
            payments,
            store,
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, G>(state: Arc<AppState<S, G>>, metrics_handle: PrometheusHandle) -> Router
where
    S: CommerceStore,
    G: PaymentGateway + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    let api = Router::new()
        .route("/orders/checkout", post(routes::orders::checkout::<S, G>))
        .route("/orders", get(routes::orders::list::<S, G>))
        .route("/orders/{id}", get(routes::orders::get::<S, G>))
        .route(
            "/orders/{id}/status",
            patch(routes::orders::update_status::<S, G>),
        )
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S, G>))
        .route(
            "/orders/{id}/payment",
            get(routes::payments::get_for_order::<S, G>),
        )
        .route(
            "/payments",
            post(routes::payments::create::<S, G>).get(routes::payments::list::<S, G>),
        )
        .route(
            "/payments/callback",
            post(routes::payments::callback::<S, G>),
        )
        .route("/payments/{id}", get(routes::payments::get::<S, G>))
        .route("/admin/orders", get(routes::admin::list_orders::<S, G>))
        .route("/admin/payments", get(routes::admin::list_payments::<S, G>))
        .route(
            "/admin/payments/reconcile",
            post(routes::admin::reconcile::<S, G>),
        );

    Router::new()
        .route("/health", get(routes::health::check))
        .nest("/api/v1", api)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
