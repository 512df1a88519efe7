//! The part of the order workflow that payment settlement may use.

use async_trait::async_trait;
use common::{Actor, OrderId};
use domain::Order;
use store::{OrderRepository, TransactionalStore};

use crate::{OrderService, Result};

/// Order capabilities consumed by payment settlement.
///
/// Payments depend on this trait, never on the order service itself, so
/// the order workflow has no knowledge of payments.
#[async_trait]
pub trait OrderPayments: Send + Sync {
    /// Loads an order with the same ownership check as a direct read.
    async fn get_order_for(&self, actor: &Actor, order_id: OrderId) -> Result<Order>;

    /// Moves a PENDING order to PAID.
    async fn mark_as_paid(&self, order_id: OrderId) -> Result<Order>;
}

#[async_trait]
impl<S> OrderPayments for OrderService<S>
where
    S: TransactionalStore + OrderRepository,
{
    async fn get_order_for(&self, actor: &Actor, order_id: OrderId) -> Result<Order> {
        self.get_order(actor, order_id).await
    }

    async fn mark_as_paid(&self, order_id: OrderId) -> Result<Order> {
        OrderService::mark_as_paid(self, order_id).await
    }
}
