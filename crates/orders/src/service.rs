//! Order service providing the order workflow operations.

use common::{Actor, OrderId, Page, PageRequest, UserId};
use domain::{NewOrderItem, Order, OrderItem, OrderStatus};
use store::{OrderFilter, OrderRepository, TransactionalStore};

use crate::error::{OrderError, Result};

/// Service for managing orders.
///
/// Stock moves only inside store transactions: checkout and cancellation
/// each commit their stock changes and the order write together or not at
/// all.
#[derive(Clone)]
pub struct OrderService<S> {
    store: S,
}

impl<S> OrderService<S>
where
    S: TransactionalStore + OrderRepository,
{
    /// Creates a new order service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Places an order, reserving stock for every item.
    ///
    /// Items are reserved in request order. The first failure aborts the
    /// transaction, which releases every reservation already made.
    #[tracing::instrument(skip(self, items, shipping_address, notes), fields(item_count = items.len()))]
    pub async fn checkout(
        &self,
        user_id: UserId,
        items: Vec<NewOrderItem>,
        shipping_address: impl Into<String>,
        notes: Option<String>,
    ) -> Result<Order> {
        let result = self
            .reserve_and_create(user_id, items, shipping_address.into(), notes)
            .await;

        match &result {
            Ok(order) => {
                metrics::counter!("orders_checked_out_total").increment(1);
                tracing::info!(order_id = %order.id, total = %order.total_amount, "order checked out");
            }
            Err(e) => {
                metrics::counter!("checkout_failures_total").increment(1);
                tracing::warn!(error = %e, "checkout rejected");
            }
        }

        result
    }

    async fn reserve_and_create(
        &self,
        user_id: UserId,
        items: Vec<NewOrderItem>,
        shipping_address: String,
        notes: Option<String>,
    ) -> Result<Order> {
        if items.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        if let Some(item) = items.iter().find(|item| item.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                product_id: item.product_id,
            });
        }

        let mut tx = self.store.begin().await?;
        let mut order_items = Vec::with_capacity(items.len());

        for item in &items {
            let product = tx
                .product(item.product_id)
                .await?
                .ok_or(OrderError::ProductNotFound(item.product_id))?;

            tx.reserve(item.product_id, item.quantity).await?;

            // Dropping `tx` on overflow releases the reservations made so far.
            order_items.push(
                OrderItem::new(product.id, product.name, item.quantity, product.price)
                    .map_err(|_| OrderError::AmountOverflow)?,
            );
        }

        let order = Order::new(user_id, order_items, shipping_address, notes)
            .map_err(|_| OrderError::AmountOverflow)?;
        tx.insert_order(&order).await?;
        tx.commit().await?;

        Ok(order)
    }

    /// Loads an order visible to the caller.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, actor: &Actor, order_id: OrderId) -> Result<Order> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;

        if !actor.can_access(order.user_id) {
            return Err(OrderError::Unauthorized(order_id));
        }
        Ok(order)
    }

    /// Lists the caller's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn get_my_orders(
        &self,
        user_id: UserId,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<Page<Order>> {
        let mut filter = OrderFilter::for_user(user_id);
        filter.status = status;
        Ok(self.store.list_orders(&filter, page).await?)
    }

    /// Lists every order, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn get_all_orders(
        &self,
        status: Option<OrderStatus>,
        page: PageRequest,
    ) -> Result<Page<Order>> {
        let filter = OrderFilter {
            status,
            ..OrderFilter::new()
        };
        Ok(self.store.list_orders(&filter, page).await?)
    }

    /// Requests a status change on behalf of the caller.
    ///
    /// Customers may only cancel their own orders. A cancellation always
    /// goes through [`OrderService::cancel_order`] so stock is restored.
    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        actor: &Actor,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;

        if !actor.is_admin() && (!order.is_owned_by(actor.user_id) || status != OrderStatus::Cancelled)
        {
            return Err(OrderError::Unauthorized(order_id));
        }

        if status == OrderStatus::Cancelled {
            return self
                .cancel_order(actor, order_id)
                .await
                .map_err(|e| match e {
                    OrderError::OrderNotCancellable(from) => OrderError::InvalidStatusTransition {
                        from,
                        to: OrderStatus::Cancelled,
                    },
                    other => other,
                });
        }

        self.transition(order, status).await
    }

    /// Cancels a PENDING order and restores stock for every item.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, actor: &Actor, order_id: OrderId) -> Result<Order> {
        let mut tx = self.store.begin().await?;

        let mut order = tx
            .order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;

        if !actor.can_access(order.user_id) {
            return Err(OrderError::Unauthorized(order_id));
        }

        let from = order.status;
        if !from.can_cancel() {
            return Err(OrderError::OrderNotCancellable(from));
        }
        order
            .transition_to(OrderStatus::Cancelled)
            .map_err(|_| OrderError::OrderNotCancellable(from))?;

        for item in &order.items {
            tx.restore(item.product_id, item.quantity).await?;
        }

        tx.update_order_status(order_id, from, OrderStatus::Cancelled)
            .await
            .map_err(|e| OrderError::from_store_transition(e, OrderStatus::Cancelled))?;
        tx.commit().await?;

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(%order_id, items = order.items.len(), "order cancelled, stock restored");

        Ok(order)
    }

    /// Moves a PENDING order to PAID.
    #[tracing::instrument(skip(self))]
    pub async fn mark_as_paid(&self, order_id: OrderId) -> Result<Order> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;

        let paid = self.transition(order, OrderStatus::Paid).await?;
        tracing::info!(%order_id, "order marked as paid");
        Ok(paid)
    }

    /// Applies a non-cancelling edge as a compare-and-set on the status
    /// the order was read with.
    async fn transition(&self, order: Order, to: OrderStatus) -> Result<Order> {
        if !order.status.can_transition_to(to) {
            return Err(OrderError::InvalidStatusTransition {
                from: order.status,
                to,
            });
        }

        self.store
            .update_order_status(order.id, order.status, to)
            .await
            .map_err(|e| OrderError::from_store_transition(e, to))
    }
}
