use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, Page, PageRequest, PaymentId, ProductId};
use domain::{Order, OrderStatus, Payment, PaymentOutcome, Product, TransactionId};

use crate::{OrderFilter, PaymentFilter, Result};

/// Per-product available quantity.
///
/// Both mutations are a single atomic read-modify-write in the backend
/// (`stock = stock + delta WHERE id = ?`), never a read followed by a
/// write from application code.
#[async_trait]
pub trait StockLedger: Send {
    /// Reads a product as seen by this unit of work.
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>>;

    /// Decrements stock by `quantity`.
    ///
    /// Fails with `InsufficientStock` if fewer units are available and with
    /// `ProductNotFound` if the product does not exist.
    async fn reserve(&mut self, id: ProductId, quantity: u32) -> Result<()>;

    /// Increments stock by `quantity`. Used for compensations only.
    async fn restore(&mut self, id: ProductId, quantity: u32) -> Result<()>;
}

/// An open unit of work.
///
/// Writes become visible only on [`Transaction::commit`]. Dropping the
/// transaction without committing discards every write made through it.
#[async_trait]
pub trait Transaction: StockLedger {
    /// Inserts an order together with its items.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Reads an order, locking it against concurrent writers until commit.
    async fn order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Sets the order status if it is still `expected`.
    ///
    /// Fails with `StatusConflict` if another writer moved the order first.
    async fn update_order_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
    ) -> Result<()>;

    /// Publishes every write made through this transaction.
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// A store that can open transactions.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}

/// The slice of the catalog collaborator the core consumes.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Adds a product. Used for seeding; catalog management lives elsewhere.
    async fn insert_product(&self, product: &Product) -> Result<()>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;
}

/// Order reads and single-statement order writes.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists orders newest first.
    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> Result<Page<Order>>;

    /// Compare-and-set on the order status. Returns the updated order.
    async fn update_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
    ) -> Result<Order>;
}

/// Payment persistence.
///
/// Status changes are conditional writes so two settlement paths racing on
/// the same payment resolve it exactly once.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Inserts a PENDING payment.
    ///
    /// Fails with `PaymentAlreadyExists` if the order already has a payment
    /// that is not FAILED, and with `DuplicateTransactionId` on a transaction
    /// id collision.
    async fn insert_payment(&self, payment: &Payment) -> Result<()>;

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>>;

    async fn get_payment_by_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<Payment>>;

    /// The most recently created payment for an order.
    async fn latest_payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>>;

    /// The order's payment that is not FAILED, if any.
    async fn active_payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>>;

    /// Lists payments newest first.
    async fn list_payments(
        &self,
        filter: &PaymentFilter,
        page: PageRequest,
    ) -> Result<Page<Payment>>;

    /// PENDING -> PROCESSING. Returns false if the payment was not PENDING.
    async fn mark_processing(&self, id: PaymentId, at: DateTime<Utc>) -> Result<bool>;

    /// Resolves a non-terminal payment to the outcome's terminal status.
    ///
    /// Fails with `PaymentNotFound` for an unknown transaction id and with
    /// `PaymentAlreadyProcessed` if the payment is already terminal.
    async fn resolve_payment(
        &self,
        transaction_id: &TransactionId,
        outcome: &PaymentOutcome,
        at: DateTime<Utc>,
    ) -> Result<Payment>;

    /// PENDING or PROCESSING payments whose settlement began before `cutoff`.
    async fn find_unsettled(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>>;

    /// SUCCESS payments whose order is still PENDING.
    async fn find_unapplied_successes(&self) -> Result<Vec<Payment>>;
}

/// Every port at once, for wiring a single backend into all workflows.
pub trait CommerceStore:
    TransactionalStore + ProductCatalog + OrderRepository + PaymentRepository + Clone + 'static
{
}

impl<T> CommerceStore for T where
    T: TransactionalStore + ProductCatalog + OrderRepository + PaymentRepository + Clone + 'static
{
}
