//! Payment creation, lookup and gateway callback endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, Page, PaymentId, UserId};
use domain::{Payment, PaymentMethod, PaymentStatus, TransactionId};
use payments::PaymentGateway;
use serde::{Deserialize, Serialize};
use store::{CommerceStore, PaymentFilter};

use super::{ListQuery, parse_id};
use crate::AppState;
use crate::error::ApiError;
use crate::identity::CurrentUser;

// -- Request types --

#[derive(Deserialize)]
pub struct CreatePaymentRequest {
    pub order_id: String,
    pub method: String,
}

#[derive(Deserialize)]
pub struct CallbackRequest {
    pub transaction_id: String,
    pub status: String,
    pub reason: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: TransactionId,
    pub paid_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            order_id: payment.order_id,
            user_id: payment.user_id,
            amount_cents: payment.amount.cents(),
            method: payment.method,
            status: payment.status,
            transaction_id: payment.transaction_id,
            paid_at: payment.paid_at,
            failure_reason: payment.failure_reason,
            created_at: payment.created_at,
            updated_at: payment.updated_at,
        }
    }
}

/// Builds the payment filter from the list query string.
pub(crate) fn payment_filter(query: &ListQuery) -> Result<PaymentFilter, ApiError> {
    let mut filter = PaymentFilter::new();
    if let Some(status) = query.status()? {
        filter = filter.status(status);
    }
    if let Some(order_id) = query.order_id.as_deref().filter(|id| !id.is_empty()) {
        filter = filter.order_id(parse_id(order_id)?);
    }
    Ok(filter)
}

// -- Handlers --

/// POST /api/v1/payments: create a payment and start settling it.
#[tracing::instrument(skip(state, req), fields(user_id = %actor.user_id))]
pub async fn create<S: CommerceStore, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    CurrentUser(actor): CurrentUser,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let order_id: OrderId = parse_id(&req.order_id)?;
    let payment = state
        .payments
        .create_payment(&actor, order_id, &req.method)
        .await?;
    Ok((StatusCode::CREATED, Json(payment.into())))
}

/// GET /api/v1/payments: the caller's payments, newest first.
#[tracing::instrument(skip(state), fields(user_id = %actor.user_id))]
pub async fn list<S: CommerceStore, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    CurrentUser(actor): CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<PaymentResponse>>, ApiError> {
    let page = state
        .payments
        .get_my_payments(actor.user_id, payment_filter(&query)?, query.page_request())
        .await?;
    Ok(Json(page.map(PaymentResponse::from)))
}

/// GET /api/v1/payments/{id}: a single payment visible to the caller.
#[tracing::instrument(skip(state))]
pub async fn get<S: CommerceStore, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment = state.payments.get_payment(&actor, parse_id(&id)?).await?;
    Ok(Json(payment.into()))
}

/// GET /api/v1/orders/{id}/payment: the most recent payment for an order.
#[tracing::instrument(skip(state))]
pub async fn get_for_order<S: CommerceStore, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment = state
        .payments
        .get_payment_by_order_id(&actor, parse_id(&id)?)
        .await?;
    Ok(Json(payment.into()))
}

/// POST /api/v1/payments/callback: the gateway reports a settlement result.
#[tracing::instrument(skip(state, req), fields(transaction_id = %req.transaction_id))]
pub async fn callback<S: CommerceStore, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    Json(req): Json<CallbackRequest>,
) -> Result<Json<PaymentResponse>, ApiError> {
    if req.transaction_id.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "transaction_id is required".to_string(),
        ));
    }

    let payment = state
        .payments
        .process_payment_callback(&TransactionId::new(req.transaction_id), &req.status, req.reason)
        .await?;
    Ok(Json(payment.into()))
}
