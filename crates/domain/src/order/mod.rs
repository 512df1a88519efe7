//! Orders and their line items.

mod state;

pub use state::OrderStatus;

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::DomainError;

/// A line requested at checkout: which product and how many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl NewOrderItem {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// An item in an order.
///
/// Name and unit price are snapshots taken at checkout so later catalog
/// changes never alter historical orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
}

impl OrderItem {
    /// Creates an item, computing `subtotal = unit_price * quantity`.
    pub fn new(
        product_id: ProductId,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Result<Self, DomainError> {
        let subtotal = unit_price
            .checked_multiply(quantity)
            .ok_or(DomainError::AmountOverflow)?;
        Ok(Self {
            product_id,
            product_name: product_name.into(),
            quantity,
            unit_price,
            subtotal,
        })
    }
}

/// An order placed by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    /// Items in checkout order.
    pub items: Vec<OrderItem>,
    /// Sum of item subtotals, fixed at creation.
    pub total_amount: Money,
    pub status: OrderStatus,
    pub shipping_address: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a PENDING order. The total is derived from the items.
    pub fn new(
        user_id: UserId,
        items: Vec<OrderItem>,
        shipping_address: impl Into<String>,
        notes: Option<String>,
    ) -> Result<Self, DomainError> {
        let now = Utc::now();
        let total_amount = Money::checked_sum(items.iter().map(|item| item.subtotal))
            .ok_or(DomainError::AmountOverflow)?;
        Ok(Self {
            id: OrderId::new(),
            user_id,
            items,
            total_amount,
            status: OrderStatus::Pending,
            shipping_address: shipping_address.into(),
            notes,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Moves the order to `target` if the edge is legal; otherwise leaves it untouched.
    pub fn transition_to(&mut self, target: OrderStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(target) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order::new(
            UserId::new(),
            vec![
                OrderItem::new(ProductId::new(), "Widget", 3, Money::from_dollars(5)).unwrap(),
                OrderItem::new(ProductId::new(), "Gadget", 1, Money::from_cents(250)).unwrap(),
            ],
            "1 Main St",
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_item_subtotal_is_price_times_quantity() {
        let item = OrderItem::new(ProductId::new(), "Widget", 3, Money::from_dollars(5)).unwrap();
        assert_eq!(item.subtotal, Money::from_dollars(15));
    }

    #[test]
    fn test_overflowing_amounts_are_rejected() {
        let price = Money::from_cents(i64::MAX / 2);
        assert_eq!(
            OrderItem::new(ProductId::new(), "Gold", 3, price),
            Err(DomainError::AmountOverflow)
        );

        let item = OrderItem::new(ProductId::new(), "Gold", 1, price).unwrap();
        let result = Order::new(UserId::new(), vec![item.clone(), item.clone(), item], "addr", None);
        assert_eq!(result, Err(DomainError::AmountOverflow));
    }

    #[test]
    fn test_total_is_sum_of_subtotals() {
        let order = sample_order();
        let sum = Money::checked_sum(order.items.iter().map(|i| i.subtotal)).unwrap();
        assert_eq!(order.total_amount, sum);
        assert_eq!(order.total_amount.cents(), 1750);
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_transition_keeps_total() {
        let mut order = sample_order();
        let total = order.total_amount;

        order.transition_to(OrderStatus::Paid).unwrap();
        order.transition_to(OrderStatus::Shipped).unwrap();
        order.transition_to(OrderStatus::Completed).unwrap();

        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.total_amount, total);
    }

    #[test]
    fn test_illegal_transition_leaves_order_unchanged() {
        let mut order = sample_order();
        let before = order.clone();

        let err = order.transition_to(OrderStatus::Shipped).unwrap_err();

        assert_eq!(
            err,
            DomainError::InvalidTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::Shipped
            }
        );
        assert_eq!(order, before);
    }

    #[test]
    fn test_ownership() {
        let order = sample_order();
        assert!(order.is_owned_by(order.user_id));
        assert!(!order.is_owned_by(UserId::new()));
    }
}
