//! Domain error types.

use thiserror::Error;

use crate::order::OrderStatus;

/// Errors raised by domain rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A wire/persisted string does not name a known enum value.
    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    /// The requested order status change is not an edge of the state machine.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// A subtotal or total does not fit in the cents range.
    #[error("Order amount exceeds the supported range")]
    AmountOverflow,
}
