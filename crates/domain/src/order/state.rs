//! Order status state machine.

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// PENDING ──┬──► PAID ──► SHIPPED ──► COMPLETED
///           └──► CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created by checkout, stock reserved, awaiting payment.
    #[default]
    Pending,

    /// A payment for the order succeeded.
    Paid,

    /// Handed to the carrier.
    Shipped,

    /// Delivered (terminal state).
    Completed,

    /// Cancelled before payment; stock was restored (terminal state).
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// Returns true if `target` is a legal edge out of this status.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        matches!(
            (self, target),
            (OrderStatus::Pending, OrderStatus::Paid)
                | (OrderStatus::Paid, OrderStatus::Shipped)
                | (OrderStatus::Shipped, OrderStatus::Completed)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
        )
    }

    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        self.can_transition_to(OrderStatus::Cancelled)
    }

    /// Returns the persisted name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::UnknownVariant {
                kind: "order status",
                value: s.to_string(),
            })
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
