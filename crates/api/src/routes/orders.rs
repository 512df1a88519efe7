//! Order checkout and lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, Page, ProductId, UserId};
use domain::{NewOrderItem, Order, OrderItem, OrderStatus};
use payments::PaymentGateway;
use serde::{Deserialize, Serialize};
use store::CommerceStore;

use super::{ListQuery, parse_id};
use crate::AppState;
use crate::error::ApiError;
use crate::identity::CurrentUser;

// -- Request types --

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub items: Vec<CheckoutItemRequest>,
    pub shipping_address: String,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
pub struct CheckoutItemRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub items: Vec<OrderItemResponse>,
    pub total_amount_cents: i64,
    pub shipping_address: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        Self {
            product_id: item.product_id,
            product_name: item.product_name,
            quantity: item.quantity,
            unit_price_cents: item.unit_price.cents(),
            subtotal_cents: item.subtotal.cents(),
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            status: order.status,
            items: order.items.into_iter().map(Into::into).collect(),
            total_amount_cents: order.total_amount.cents(),
            shipping_address: order.shipping_address,
            notes: order.notes,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

// -- Handlers --

/// POST /api/v1/orders/checkout: reserve stock and place an order.
#[tracing::instrument(skip(state, req), fields(user_id = %actor.user_id))]
pub async fn checkout<S: CommerceStore, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    CurrentUser(actor): CurrentUser,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    if req.shipping_address.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "shipping_address is required".to_string(),
        ));
    }

    let items = req
        .items
        .iter()
        .map(|item| -> Result<NewOrderItem, ApiError> {
            Ok(NewOrderItem::new(parse_id(&item.product_id)?, item.quantity))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let order = state
        .orders
        .checkout(actor.user_id, items, req.shipping_address, req.notes)
        .await?;

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /api/v1/orders: the caller's orders, newest first.
#[tracing::instrument(skip(state), fields(user_id = %actor.user_id))]
pub async fn list<S: CommerceStore, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    CurrentUser(actor): CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<OrderResponse>>, ApiError> {
    let page = state
        .orders
        .get_my_orders(actor.user_id, query.status()?, query.page_request())
        .await?;
    Ok(Json(page.map(OrderResponse::from)))
}

/// GET /api/v1/orders/{id}: a single order visible to the caller.
#[tracing::instrument(skip(state))]
pub async fn get<S: CommerceStore, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.orders.get_order(&actor, parse_id(&id)?).await?;
    Ok(Json(order.into()))
}

/// PATCH /api/v1/orders/{id}/status: move an order along its lifecycle.
#[tracing::instrument(skip(state, req))]
pub async fn update_status<S: CommerceStore, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&id)?;
    let status: OrderStatus = req
        .status
        .parse::<OrderStatus>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let order = state
        .orders
        .update_order_status(&actor, order_id, status)
        .await?;
    Ok(Json(order.into()))
}

/// POST /api/v1/orders/{id}/cancel: cancel a pending order and restore stock.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: CommerceStore, G: PaymentGateway + 'static>(
    State(state): State<Arc<AppState<S, G>>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.orders.cancel_order(&actor, parse_id(&id)?).await?;
    Ok(Json(order.into()))
}
