use common::{OrderId, ProductId};
use domain::OrderStatus;
use store::StoreError;
use thiserror::Error;

/// Errors raised by the order workflow.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid quantity for product {product_id}: quantity must be at least 1")]
    InvalidQuantity { product_id: ProductId },

    #[error("Order amount exceeds the supported range")]
    AmountOverflow,

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Insufficient stock for product {product_id}: requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
    },

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Unauthorized access to order {0}")]
    Unauthorized(OrderId),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order cannot be cancelled in status {0}")]
    OrderNotCancellable(OrderStatus),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl OrderError {
    /// Maps a lost compare-and-set on the order status to the transition
    /// that was attempted.
    pub(crate) fn from_store_transition(err: StoreError, to: OrderStatus) -> Self {
        match err {
            StoreError::StatusConflict { actual, .. } => {
                OrderError::InvalidStatusTransition { from: actual, to }
            }
            other => other.into(),
        }
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ProductNotFound(id) => OrderError::ProductNotFound(id),
            StoreError::InsufficientStock {
                product_id,
                requested,
            } => OrderError::InsufficientStock {
                product_id,
                requested,
            },
            StoreError::OrderNotFound(id) => OrderError::OrderNotFound(id),
            other => OrderError::Store(other),
        }
    }
}

/// Result type for order workflow operations.
pub type Result<T> = std::result::Result<T, OrderError>;
