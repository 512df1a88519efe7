use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, Page, PageRequest, PaymentId, ProductId};
use domain::{Order, OrderStatus, Payment, PaymentOutcome, PaymentStatus, Product, TransactionId};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::{
    OrderFilter, PaymentFilter, Result, StoreError,
    store::{
        OrderRepository, PaymentRepository, ProductCatalog, StockLedger, Transaction,
        TransactionalStore,
    },
};

#[derive(Debug, Clone, Default)]
struct State {
    products: Vec<Product>,
    /// Insertion order; listing walks it backwards for newest first.
    orders: Vec<Order>,
    payments: Vec<Payment>,
    fail_restore_for: HashSet<ProductId>,
}

impl State {
    fn product_mut(&mut self, id: ProductId) -> Result<&mut Product> {
        self.products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::ProductNotFound(id))
    }

    fn order_mut(&mut self, id: OrderId) -> Result<&mut Order> {
        self.orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(StoreError::OrderNotFound(id))
    }

    fn reserve(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        let product = self.product_mut(id)?;
        if !product.has_stock(quantity) {
            return Err(StoreError::InsufficientStock {
                product_id: id,
                requested: quantity,
            });
        }
        product.stock -= quantity;
        product.updated_at = Utc::now();
        Ok(())
    }

    fn restore(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        if self.fail_restore_for.contains(&id) {
            return Err(StoreError::Unavailable(format!(
                "restore rejected for product {id}"
            )));
        }
        let product = self.product_mut(id)?;
        product.stock += quantity;
        product.updated_at = Utc::now();
        Ok(())
    }

    fn update_order_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
    ) -> Result<&Order> {
        let order = self.order_mut(id)?;
        if order.status != expected {
            return Err(StoreError::StatusConflict {
                order_id: id,
                expected,
                actual: order.status,
            });
        }
        order.status = new;
        order.updated_at = Utc::now();
        Ok(order)
    }
}

/// In-memory store for tests and local runs.
///
/// A transaction holds the store's write lock for its whole lifetime and
/// works on a staged copy of the state, so transactions are serialized and
/// an uncommitted transaction leaves no trace.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every future `restore` of `product_id` fail, to exercise rollback paths.
    pub async fn fail_restore_for(&self, product_id: ProductId) {
        self.state.write().await.fail_restore_for.insert(product_id);
    }

    /// Clears injected failures.
    pub async fn clear_failures(&self) {
        self.state.write().await.fail_restore_for.clear();
    }

    /// Returns the current stock of a product, if it exists.
    pub async fn stock_of(&self, product_id: ProductId) -> Option<u32> {
        self.state
            .read()
            .await
            .products
            .iter()
            .find(|p| p.id == product_id)
            .map(|p| p.stock)
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the total number of payments stored.
    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }
}

/// Transaction over a staged copy of the in-memory state.
pub struct InMemoryTransaction {
    guard: OwnedRwLockWriteGuard<State>,
    staged: State,
}

#[async_trait]
impl StockLedger for InMemoryTransaction {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.staged.products.iter().find(|p| p.id == id).cloned())
    }

    async fn reserve(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        self.staged.reserve(id, quantity)
    }

    async fn restore(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        self.staged.restore(id, quantity)
    }
}

#[async_trait]
impl Transaction for InMemoryTransaction {
    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.staged.orders.push(order.clone());
        Ok(())
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.staged.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
    ) -> Result<()> {
        self.staged.update_order_status(id, expected, new)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTransaction { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}

#[async_trait]
impl TransactionalStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let guard = self.state.clone().write_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryTransaction { guard, staged }))
    }
}

#[async_trait]
impl ProductCatalog for InMemoryStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        self.state.write().await.products.push(product.clone());
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let state = self.state.read().await;
        Ok(state.products.iter().find(|p| p.id == id).cloned())
    }
}

fn paginate<T: Clone>(rows: Vec<&T>, page: PageRequest) -> Page<T> {
    let page = page.normalized();
    let total = rows.len() as u64;
    let items = rows
        .into_iter()
        .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
        .take(page.limit as usize)
        .cloned()
        .collect();
    Page::new(items, total, page)
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> Result<Page<Order>> {
        let state = self.state.read().await;
        let rows: Vec<_> = state.orders.iter().rev().filter(|o| filter.matches(o)).collect();
        Ok(paginate(rows, page))
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        state.update_order_status(id, expected, new).cloned()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        let mut state = self.state.write().await;

        // Same guarantees as the unique indexes in the SQL schema.
        if state
            .payments
            .iter()
            .any(|p| p.transaction_id == payment.transaction_id)
        {
            return Err(StoreError::DuplicateTransactionId(
                payment.transaction_id.clone(),
            ));
        }
        if state
            .payments
            .iter()
            .any(|p| p.order_id == payment.order_id && p.status.blocks_new_payment())
        {
            return Err(StoreError::PaymentAlreadyExists(payment.order_id));
        }

        state.payments.push(payment.clone());
        Ok(())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state.payments.iter().find(|p| p.id == id).cloned())
    }

    async fn get_payment_by_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .iter()
            .find(|p| &p.transaction_id == transaction_id)
            .cloned())
    }

    async fn latest_payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .iter()
            .rev()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn active_payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .iter()
            .find(|p| p.order_id == order_id && p.status.blocks_new_payment())
            .cloned())
    }

    async fn list_payments(
        &self,
        filter: &PaymentFilter,
        page: PageRequest,
    ) -> Result<Page<Payment>> {
        let state = self.state.read().await;
        let rows: Vec<_> = state
            .payments
            .iter()
            .rev()
            .filter(|p| filter.matches(p))
            .collect();
        Ok(paginate(rows, page))
    }

    async fn mark_processing(&self, id: PaymentId, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .payments
            .iter_mut()
            .find(|p| p.id == id)
            .is_some_and(|p| p.mark_processing(at)))
    }

    async fn resolve_payment(
        &self,
        transaction_id: &TransactionId,
        outcome: &PaymentOutcome,
        at: DateTime<Utc>,
    ) -> Result<Payment> {
        let mut state = self.state.write().await;
        let payment = state
            .payments
            .iter_mut()
            .find(|p| &p.transaction_id == transaction_id)
            .ok_or_else(|| StoreError::PaymentNotFound(transaction_id.clone()))?;

        if !payment.resolve(outcome, at) {
            return Err(StoreError::PaymentAlreadyProcessed(transaction_id.clone()));
        }
        Ok(payment.clone())
    }

    async fn find_unsettled(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .iter()
            .filter(|p| !p.is_terminal() && p.settlement_started_at() < cutoff)
            .cloned()
            .collect())
    }

    async fn find_unapplied_successes(&self) -> Result<Vec<Payment>> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Success)
            .filter(|p| {
                state
                    .orders
                    .iter()
                    .any(|o| o.id == p.order_id && o.status == OrderStatus::Pending)
            })
            .cloned()
            .collect())
    }
}
