//! Payment error types.

use common::OrderId;
use domain::{OrderStatus, TransactionId};
use orders::OrderError;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The method is not BANK_TRANSFER, CREDIT_CARD or E_WALLET.
    #[error("Invalid payment method: {0}")]
    InvalidPaymentMethod(String),

    /// A callback reported a status other than SUCCESS or FAILED.
    #[error("Invalid callback status: {0}")]
    InvalidCallbackStatus(String),

    /// The order already has a payment that is not FAILED.
    #[error("Payment already exists for order {0}")]
    PaymentAlreadyExists(OrderId),

    /// The order does not exist or is not visible to the caller.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Payments can only be made for PENDING orders.
    #[error("Order {order_id} is not pending (status {status})")]
    OrderNotPending {
        order_id: OrderId,
        status: OrderStatus,
    },

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// The payment already reached SUCCESS or FAILED.
    #[error("Payment {0} has already been processed")]
    PaymentAlreadyProcessed(TransactionId),

    #[error("Unauthorized access to payment")]
    Unauthorized,

    /// The order side of a settlement failed.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for PaymentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PaymentAlreadyExists(order_id) => PaymentError::PaymentAlreadyExists(order_id),
            StoreError::PaymentNotFound(transaction_id) => {
                PaymentError::PaymentNotFound(transaction_id.to_string())
            }
            StoreError::PaymentAlreadyProcessed(transaction_id) => {
                PaymentError::PaymentAlreadyProcessed(transaction_id)
            }
            StoreError::OrderNotFound(order_id) => PaymentError::OrderNotFound(order_id),
            other => PaymentError::Store(other),
        }
    }
}

/// Convenience type alias for payment results.
pub type Result<T> = std::result::Result<T, PaymentError>;
