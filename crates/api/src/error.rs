//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use orders::OrderError;
use payments::PaymentError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// The caller identity headers are missing or malformed.
    Unauthenticated(String),
    /// The caller is known but lacks the required role.
    Forbidden(String),
    /// Order workflow error.
    Order(OrderError),
    /// Payment settlement error.
    Payment(PaymentError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Order(err) => (order_error_status(&err), err.to_string()),
            ApiError::Payment(err) => (payment_error_status(&err), err.to_string()),
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %message, "internal server error");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn order_error_status(err: &OrderError) -> StatusCode {
    match err {
        OrderError::EmptyCart
        | OrderError::InvalidQuantity { .. }
        | OrderError::AmountOverflow => StatusCode::BAD_REQUEST,
        OrderError::ProductNotFound(_) | OrderError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        OrderError::Unauthorized(_) => StatusCode::FORBIDDEN,
        OrderError::InsufficientStock { .. }
        | OrderError::InvalidStatusTransition { .. }
        | OrderError::OrderNotCancellable(_) => StatusCode::CONFLICT,
        OrderError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn payment_error_status(err: &PaymentError) -> StatusCode {
    match err {
        PaymentError::InvalidPaymentMethod(_) | PaymentError::InvalidCallbackStatus(_) => {
            StatusCode::BAD_REQUEST
        }
        PaymentError::OrderNotFound(_) | PaymentError::PaymentNotFound(_) => StatusCode::NOT_FOUND,
        PaymentError::Unauthorized => StatusCode::FORBIDDEN,
        PaymentError::PaymentAlreadyExists(_)
        | PaymentError::OrderNotPending { .. }
        | PaymentError::PaymentAlreadyProcessed(_) => StatusCode::CONFLICT,
        PaymentError::Order(inner) => order_error_status(inner),
        PaymentError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        ApiError::Order(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}
