//! Payment service: creation, settlement, callbacks and queries.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{Actor, Money, OrderId, Page, PageRequest, PaymentId, UserId};
use domain::{
    OrderStatus, Payment, PaymentMethod, PaymentOutcome, PaymentStatus, TransactionId,
};
use orders::{OrderError, OrderPayments};
use store::{PaymentFilter, PaymentRepository, StoreError};

use crate::error::{PaymentError, Result};
use crate::gateway::PaymentGateway;
use crate::transaction::generate_transaction_id;

/// Reason recorded when a FAILED callback carries none.
pub const DEFAULT_FAILURE_REASON: &str = "Payment failed";

/// Attempts at finding an unused transaction id before giving up.
const TRANSACTION_ID_ATTEMPTS: usize = 3;

struct Inner<P, O, G> {
    payments: P,
    orders: O,
    gateway: G,
}

/// Service for creating and settling payments.
///
/// Cloning is cheap; clones share the same store, order capability and
/// gateway, which lets settlement run on its own task.
pub struct PaymentService<P, O, G> {
    inner: Arc<Inner<P, O, G>>,
}

impl<P, O, G> Clone for PaymentService<P, O, G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, O, G> PaymentService<P, O, G>
where
    P: PaymentRepository + 'static,
    O: OrderPayments + 'static,
    G: PaymentGateway + 'static,
{
    /// Creates a new payment service.
    pub fn new(payments: P, orders: O, gateway: G) -> Self {
        Self {
            inner: Arc::new(Inner {
                payments,
                orders,
                gateway,
            }),
        }
    }

    /// Creates a PENDING payment for the caller's order and starts settling
    /// it in the background. Returns without waiting for settlement.
    #[tracing::instrument(skip(self))]
    pub async fn create_payment(
        &self,
        actor: &Actor,
        order_id: OrderId,
        method: &str,
    ) -> Result<Payment> {
        let method: PaymentMethod = method
            .parse()
            .map_err(|_| PaymentError::InvalidPaymentMethod(method.to_string()))?;

        if self
            .inner
            .payments
            .active_payment_for_order(order_id)
            .await?
            .is_some()
        {
            return Err(PaymentError::PaymentAlreadyExists(order_id));
        }

        let order = self
            .inner
            .orders
            .get_order_for(actor, order_id)
            .await
            .map_err(|e| match e {
                OrderError::OrderNotFound(_) | OrderError::Unauthorized(_) => {
                    PaymentError::OrderNotFound(order_id)
                }
                other => PaymentError::Order(other),
            })?;

        if order.status != OrderStatus::Pending {
            return Err(PaymentError::OrderNotPending {
                order_id,
                status: order.status,
            });
        }

        let payment = self
            .insert_new_payment(order.id, order.user_id, order.total_amount, method)
            .await?;

        metrics::counter!("payments_created_total").increment(1);
        tracing::info!(
            payment_id = %payment.id,
            transaction_id = %payment.transaction_id,
            amount = %payment.amount,
            "payment created"
        );

        self.spawn_settlement(payment.clone());
        Ok(payment)
    }

    async fn insert_new_payment(
        &self,
        order_id: OrderId,
        user_id: UserId,
        amount: Money,
        method: PaymentMethod,
    ) -> Result<Payment> {
        let mut attempt = 1;
        loop {
            let payment = Payment::new(order_id, user_id, amount, method, generate_transaction_id());
            match self.inner.payments.insert_payment(&payment).await {
                Ok(()) => return Ok(payment),
                Err(StoreError::DuplicateTransactionId(id)) if attempt < TRANSACTION_ID_ATTEMPTS => {
                    tracing::warn!(transaction_id = %id, attempt, "transaction id collision, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Runs settlement for `payment` on its own task.
    pub fn spawn_settlement(&self, payment: Payment) {
        let service = self.clone();
        tokio::spawn(async move { service.settle(payment).await });
    }

    /// Drives one payment through the gateway to a terminal status.
    ///
    /// Safe to run more than once for the same payment: only the first
    /// terminal write wins, later attempts log and stop.
    #[tracing::instrument(skip(self, payment), fields(transaction_id = %payment.transaction_id))]
    pub async fn settle(&self, payment: Payment) {
        let started = Instant::now();

        match self
            .inner
            .payments
            .mark_processing(payment.id, Utc::now())
            .await
        {
            Ok(true) => tracing::debug!("payment processing"),
            Ok(false) => tracing::debug!("payment already past PENDING, resuming"),
            Err(e) => {
                tracing::error!(error = %e, "failed to mark payment processing");
                return;
            }
        }

        let outcome = self.inner.gateway.settle(&payment).await;

        match self.apply_outcome(&payment.transaction_id, outcome).await {
            Ok(settled) => {
                metrics::histogram!("payment_settlement_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                tracing::info!(status = %settled.status, "payment settled");
            }
            Err(PaymentError::PaymentAlreadyProcessed(_)) => {
                tracing::info!("payment already resolved by callback, stopping");
            }
            Err(PaymentError::Order(e)) => {
                tracing::error!(order_id = %payment.order_id, error = %e, "payment succeeded but order was not marked paid");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to record settlement outcome");
            }
        }
    }

    /// Applies a gateway callback.
    ///
    /// `status` must be SUCCESS or FAILED. A FAILED callback without a reason
    /// records [`DEFAULT_FAILURE_REASON`]. If the order cannot be marked paid
    /// after a SUCCESS callback the error is returned, but the payment stays
    /// SUCCESS.
    #[tracing::instrument(skip(self))]
    pub async fn process_payment_callback(
        &self,
        transaction_id: &TransactionId,
        status: &str,
        reason: Option<String>,
    ) -> Result<Payment> {
        let outcome = match status.parse::<PaymentStatus>() {
            Ok(PaymentStatus::Success) => PaymentOutcome::Success,
            Ok(PaymentStatus::Failed) => PaymentOutcome::failed(
                reason
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string()),
            ),
            _ => return Err(PaymentError::InvalidCallbackStatus(status.to_string())),
        };

        let payment = self
            .inner
            .payments
            .get_payment_by_transaction(transaction_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(transaction_id.to_string()))?;

        if payment.is_terminal() {
            return Err(PaymentError::PaymentAlreadyProcessed(transaction_id.clone()));
        }

        self.apply_outcome(transaction_id, outcome).await
    }

    /// Writes the terminal status and, on success, marks the order paid.
    async fn apply_outcome(
        &self,
        transaction_id: &TransactionId,
        outcome: PaymentOutcome,
    ) -> Result<Payment> {
        let payment = self
            .inner
            .payments
            .resolve_payment(transaction_id, &outcome, Utc::now())
            .await?;

        metrics::counter!("payments_settled_total", "status" => payment.status.as_str())
            .increment(1);

        if outcome.is_success() {
            self.inner.orders.mark_as_paid(payment.order_id).await?;
            tracing::info!(order_id = %payment.order_id, "order marked as paid");
        } else {
            tracing::info!(
                reason = payment.failure_reason.as_deref().unwrap_or_default(),
                "payment failed, order stays pending"
            );
        }

        Ok(payment)
    }

    /// Loads a payment visible to the caller.
    #[tracing::instrument(skip(self))]
    pub async fn get_payment(&self, actor: &Actor, payment_id: PaymentId) -> Result<Payment> {
        let payment = self
            .inner
            .payments
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.to_string()))?;

        if !actor.can_access(payment.user_id) {
            return Err(PaymentError::Unauthorized);
        }
        Ok(payment)
    }

    /// Loads the most recent payment for an order visible to the caller.
    #[tracing::instrument(skip(self))]
    pub async fn get_payment_by_order_id(
        &self,
        actor: &Actor,
        order_id: OrderId,
    ) -> Result<Payment> {
        let payment = self
            .inner
            .payments
            .latest_payment_for_order(order_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(format!("order {order_id}")))?;

        if !actor.can_access(payment.user_id) {
            return Err(PaymentError::Unauthorized);
        }
        Ok(payment)
    }

    /// Lists the caller's payments, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn get_my_payments(
        &self,
        user_id: UserId,
        filter: PaymentFilter,
        page: PageRequest,
    ) -> Result<Page<Payment>> {
        let filter = filter.user_id(user_id);
        Ok(self.inner.payments.list_payments(&filter, page).await?)
    }

    /// Lists every payment, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn get_all_payments(
        &self,
        filter: PaymentFilter,
        page: PageRequest,
    ) -> Result<Page<Payment>> {
        Ok(self.inner.payments.list_payments(&filter, page).await?)
    }

    /// Marks paid every PENDING order that has a SUCCESS payment.
    ///
    /// Repairs orders whose settlement committed the payment but failed to
    /// update the order. Returns the number of orders repaired.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile_paid_orders(&self) -> Result<usize> {
        let unapplied = self.inner.payments.find_unapplied_successes().await?;
        let mut repaired = 0;

        for payment in unapplied {
            match self.inner.orders.mark_as_paid(payment.order_id).await {
                Ok(_) => repaired += 1,
                // Someone else moved the order in the meantime.
                Err(OrderError::InvalidStatusTransition { .. }) => {}
                Err(e) => {
                    tracing::warn!(order_id = %payment.order_id, error = %e, "reconciliation failed for order");
                }
            }
        }

        tracing::info!(repaired, "reconciliation complete");
        Ok(repaired)
    }

    /// Re-drives settlement for payments stuck in PENDING or PROCESSING for
    /// longer than `older_than`. Returns the number of payments re-driven.
    #[tracing::instrument(skip(self))]
    pub async fn recover_stalled(&self, older_than: chrono::Duration) -> Result<usize> {
        let cutoff = Utc::now() - older_than;
        let stalled = self.inner.payments.find_unsettled(cutoff).await?;
        let count = stalled.len();

        for payment in stalled {
            tracing::info!(transaction_id = %payment.transaction_id, status = %payment.status, "re-driving stalled payment");
            self.spawn_settlement(payment);
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{NewOrderItem, Order, Product};
    use orders::OrderService;
    use store::{InMemoryStore, ProductCatalog};

    use crate::gateway::InMemoryGateway;

    type TestService = PaymentService<InMemoryStore, OrderService<InMemoryStore>, InMemoryGateway>;

    async fn setup() -> (TestService, OrderService<InMemoryStore>, InMemoryGateway, Order) {
        let store = InMemoryStore::new();
        let product = Product::new("Widget", Money::from_dollars(100), 10);
        store.insert_product(&product).await.unwrap();

        let orders = OrderService::new(store.clone());
        let order = orders
            .checkout(UserId::new(), vec![NewOrderItem::new(product.id, 3)], "addr", None)
            .await
            .unwrap();

        let gateway = InMemoryGateway::new();
        gateway.hold();
        let service = PaymentService::new(store, orders.clone(), gateway.clone());
        (service, orders, gateway, order)
    }

    #[tokio::test]
    async fn test_create_payment_copies_order_total() {
        let (service, _, _, order) = setup().await;

        let payment = service
            .create_payment(&Actor::customer(order.user_id), order.id, "BANK_TRANSFER")
            .await
            .unwrap();

        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount, Money::from_dollars(300));
        assert_eq!(payment.method, PaymentMethod::BankTransfer);
        assert!(payment.transaction_id.as_str().starts_with("TXN-"));
    }

    #[tokio::test]
    async fn test_invalid_method_is_rejected_first() {
        let (service, _, _, _) = setup().await;

        let err = service
            .create_payment(&Actor::customer(UserId::new()), OrderId::new(), "CASH")
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::InvalidPaymentMethod(m) if m == "CASH"));
    }

    #[tokio::test]
    async fn test_other_users_order_reads_as_not_found() {
        let (service, _, _, order) = setup().await;

        let err = service
            .create_payment(&Actor::customer(UserId::new()), order.id, "CREDIT_CARD")
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::OrderNotFound(id) if id == order.id));
    }

    #[tokio::test]
    async fn test_second_payment_is_rejected() {
        let (service, _, _, order) = setup().await;
        let actor = Actor::customer(order.user_id);

        service
            .create_payment(&actor, order.id, "E_WALLET")
            .await
            .unwrap();
        let err = service
            .create_payment(&actor, order.id, "E_WALLET")
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::PaymentAlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_cancelled_order_is_not_payable() {
        let (service, orders, _, order) = setup().await;
        let actor = Actor::customer(order.user_id);
        orders.cancel_order(&actor, order.id).await.unwrap();

        let err = service
            .create_payment(&actor, order.id, "E_WALLET")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PaymentError::OrderNotPending {
                status: OrderStatus::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_callback_validates_status_and_reason() {
        let (service, orders, _, order) = setup().await;
        let actor = Actor::customer(order.user_id);
        let payment = service
            .create_payment(&actor, order.id, "CREDIT_CARD")
            .await
            .unwrap();

        let err = service
            .process_payment_callback(&payment.transaction_id, "PROCESSING", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidCallbackStatus(_)));

        let failed = service
            .process_payment_callback(&payment.transaction_id, "FAILED", None)
            .await
            .unwrap();
        assert_eq!(failed.status, PaymentStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some(DEFAULT_FAILURE_REASON));

        let order = orders.get_order(&actor, order.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_transaction() {
        let (service, _, _, _) = setup().await;

        let err = service
            .process_payment_callback(&TransactionId::new("TXN-0-0000"), "SUCCESS", None)
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::PaymentNotFound(_)));
    }

    #[tokio::test]
    async fn test_payment_reads_check_ownership() {
        let (service, _, _, order) = setup().await;
        let owner = Actor::customer(order.user_id);
        let payment = service
            .create_payment(&owner, order.id, "CREDIT_CARD")
            .await
            .unwrap();

        assert_eq!(service.get_payment(&owner, payment.id).await.unwrap().id, payment.id);
        assert_eq!(
            service
                .get_payment_by_order_id(&Actor::admin(UserId::new()), order.id)
                .await
                .unwrap()
                .id,
            payment.id
        );

        let err = service
            .get_payment(&Actor::customer(UserId::new()), payment.id)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Unauthorized));

        let err = service
            .get_payment_by_order_id(&owner, OrderId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::PaymentNotFound(_)));
    }
}
