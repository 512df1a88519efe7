//! Admin-only listings and maintenance endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use common::Page;
use payments::PaymentGateway;
use serde::Serialize;
use store::CommerceStore;

use super::ListQuery;
use super::orders::OrderResponse;
use super::payments::{PaymentResponse, payment_filter};
use crate::AppState;
use crate::error::ApiError;
use crate::identity::AdminUser;

#[derive(Serialize)]
pub struct ReconcileResponse {
    pub repaired: usize,
}

/// GET /api/v1/admin/orders: every order, newest first.
#[tracing::instrument(skip(state, _admin))]
pub async fn list_orders<S: CommerceStore, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    _admin: AdminUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<OrderResponse>>, ApiError> {
    let page = state
        .orders
        .get_all_orders(query.status()?, query.page_request())
        .await?;
    Ok(Json(page.map(OrderResponse::from)))
}

/// GET /api/v1/admin/payments: every payment, newest first.
#[tracing::instrument(skip(state, _admin))]
pub async fn list_payments<S: CommerceStore, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    _admin: AdminUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<PaymentResponse>>, ApiError> {
    let page = state
        .payments
        .get_all_payments(payment_filter(&query)?, query.page_request())
        .await?;
    Ok(Json(page.map(PaymentResponse::from)))
}

/// POST /api/v1/admin/payments/reconcile: mark paid every pending order
/// that already has a successful payment.
#[tracing::instrument(skip(state), fields(admin_id = %admin.user_id))]
pub async fn reconcile<S: CommerceStore, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    AdminUser(admin): AdminUser,
) -> Result<Json<ReconcileResponse>, ApiError> {
    let repaired = state.payments.reconcile_paid_orders().await?;
    Ok(Json(ReconcileResponse { repaired }))
}
