use common::{OrderId, ProductId};
use domain::{OrderStatus, TransactionId};
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The product does not exist in the catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// A reservation asked for more units than are available.
    #[error("Insufficient stock for product {product_id}: requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
    },

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A conditional status write found the order in a different status.
    #[error("Order {order_id} is {actual}, expected {expected}")]
    StatusConflict {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// No payment carries the transaction id.
    #[error("Payment not found: {0}")]
    PaymentNotFound(TransactionId),

    /// The order already has a payment that is not FAILED.
    #[error("A non-failed payment already exists for order {0}")]
    PaymentAlreadyExists(OrderId),

    /// The payment already reached SUCCESS or FAILED.
    #[error("Payment {0} has already been processed")]
    PaymentAlreadyProcessed(TransactionId),

    /// The transaction id collides with an existing payment.
    #[error("Duplicate transaction id: {0}")]
    DuplicateTransactionId(TransactionId),

    /// The backend could not complete the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be decoded into a domain type.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A domain value does not fit its column.
    #[error("Encode error: {0}")]
    Encode(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
