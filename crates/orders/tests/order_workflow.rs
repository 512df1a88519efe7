//! Integration tests for the order workflow.
//!
//! These tests drive checkout and cancellation against the in-memory store
//! and check the stock bookkeeping that must hold across them.

use common::{Actor, Money, UserId};
use domain::{NewOrderItem, OrderStatus, Product};
use orders::{OrderError, OrderService};
use store::{InMemoryStore, OrderRepository, ProductCatalog};

async fn seed(store: &InMemoryStore, name: &str, price: Money, stock: u32) -> Product {
    let product = Product::new(name, price, stock);
    store.insert_product(&product).await.unwrap();
    product
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn reserves_and_prices_each_item() {
        let store = InMemoryStore::new();
        let widget = seed(&store, "Widget", Money::from_dollars(5), 10).await;
        let gadget = seed(&store, "Gadget", Money::from_cents(1250), 4).await;
        let service = OrderService::new(store.clone());

        let order = service
            .checkout(
                UserId::new(),
                vec![NewOrderItem::new(widget.id, 3), NewOrderItem::new(gadget.id, 2)],
                "1 Main St",
                Some("ring twice".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items[0].subtotal, Money::from_dollars(15));
        assert_eq!(order.items[1].subtotal, Money::from_cents(2500));
        assert_eq!(order.total_amount, Money::from_cents(4000));
        assert_eq!(order.notes.as_deref(), Some("ring twice"));

        assert_eq!(store.stock_of(widget.id).await, Some(7));
        assert_eq!(store.stock_of(gadget.id).await, Some(2));

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored, order);
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_nothing_behind() {
        let store = InMemoryStore::new();
        let product = seed(&store, "Widget", Money::from_dollars(5), 2).await;
        let service = OrderService::new(store.clone());

        let err = service
            .checkout(UserId::new(), vec![NewOrderItem::new(product.id, 3)], "addr", None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrderError::InsufficientStock { requested: 3, .. }
        ));
        assert_eq!(store.stock_of(product.id).await, Some(2));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn failure_on_a_later_item_releases_earlier_reservations() {
        let store = InMemoryStore::new();
        let first = seed(&store, "First", Money::from_dollars(1), 10).await;
        let second = seed(&store, "Second", Money::from_dollars(1), 10).await;
        let scarce = seed(&store, "Scarce", Money::from_dollars(1), 1).await;
        let service = OrderService::new(store.clone());

        let err = service
            .checkout(
                UserId::new(),
                vec![
                    NewOrderItem::new(first.id, 4),
                    NewOrderItem::new(second.id, 5),
                    NewOrderItem::new(scarce.id, 2),
                ],
                "addr",
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::InsufficientStock { product_id, .. } if product_id == scarce.id));
        assert_eq!(store.stock_of(first.id).await, Some(10));
        assert_eq!(store.stock_of(second.id).await, Some(10));
        assert_eq!(store.stock_of(scarce.id).await, Some(1));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn overflowing_amount_is_rejected_and_releases_stock() {
        let store = InMemoryStore::new();
        let cheap = seed(&store, "Cheap", Money::from_dollars(1), 10).await;
        let gold = seed(&store, "Gold", Money::from_cents(i64::MAX / 2), 10).await;
        let service = OrderService::new(store.clone());

        let err = service
            .checkout(
                UserId::new(),
                vec![NewOrderItem::new(cheap.id, 2), NewOrderItem::new(gold.id, 3)],
                "addr",
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::AmountOverflow));
        assert_eq!(store.stock_of(cheap.id).await, Some(10));
        assert_eq!(store.stock_of(gold.id).await, Some(10));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn overflowing_total_is_rejected() {
        let store = InMemoryStore::new();
        let gold = seed(&store, "Gold", Money::from_cents(i64::MAX / 2), 10).await;
        let silver = seed(&store, "Silver", Money::from_cents(i64::MAX / 2), 10).await;
        let service = OrderService::new(store.clone());

        let err = service
            .checkout(
                UserId::new(),
                vec![
                    NewOrderItem::new(gold.id, 1),
                    NewOrderItem::new(silver.id, 1),
                    NewOrderItem::new(gold.id, 1),
                ],
                "addr",
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::AmountOverflow));
        assert_eq!(store.stock_of(gold.id).await, Some(10));
        assert_eq!(store.stock_of(silver.id).await, Some(10));
        assert_eq!(store.order_count().await, 0);
    }
}

mod cancellation {
    use super::*;

    #[tokio::test]
    async fn cancel_restores_stock() {
        let store = InMemoryStore::new();
        let product = seed(&store, "Widget", Money::from_dollars(5), 10).await;
        let service = OrderService::new(store.clone());
        let user = UserId::new();

        let order = service
            .checkout(user, vec![NewOrderItem::new(product.id, 3)], "addr", None)
            .await
            .unwrap();
        assert_eq!(store.stock_of(product.id).await, Some(7));

        let cancelled = service
            .cancel_order(&Actor::customer(user), order.id)
            .await
            .unwrap();

        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(store.stock_of(product.id).await, Some(10));
        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn only_pending_orders_can_be_cancelled() {
        let store = InMemoryStore::new();
        let product = seed(&store, "Widget", Money::from_dollars(5), 10).await;
        let service = OrderService::new(store.clone());
        let user = UserId::new();

        let order = service
            .checkout(user, vec![NewOrderItem::new(product.id, 3)], "addr", None)
            .await
            .unwrap();
        service.mark_as_paid(order.id).await.unwrap();

        let err = service
            .cancel_order(&Actor::customer(user), order.id)
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::OrderNotCancellable(OrderStatus::Paid)));
        assert_eq!(store.stock_of(product.id).await, Some(7));
    }

    #[tokio::test]
    async fn strangers_cannot_cancel() {
        let store = InMemoryStore::new();
        let product = seed(&store, "Widget", Money::from_dollars(5), 10).await;
        let service = OrderService::new(store.clone());

        let order = service
            .checkout(UserId::new(), vec![NewOrderItem::new(product.id, 1)], "addr", None)
            .await
            .unwrap();

        let err = service
            .cancel_order(&Actor::customer(UserId::new()), order.id)
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Unauthorized(_)));
        assert_eq!(store.stock_of(product.id).await, Some(9));
    }

    #[tokio::test]
    async fn failed_restore_rolls_back_the_whole_cancellation() {
        let store = InMemoryStore::new();
        let first = seed(&store, "First", Money::from_dollars(1), 10).await;
        let second = seed(&store, "Second", Money::from_dollars(1), 10).await;
        let service = OrderService::new(store.clone());
        let user = UserId::new();

        let order = service
            .checkout(
                user,
                vec![NewOrderItem::new(first.id, 2), NewOrderItem::new(second.id, 3)],
                "addr",
                None,
            )
            .await
            .unwrap();

        store.fail_restore_for(second.id).await;

        let err = service
            .cancel_order(&Actor::customer(user), order.id)
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Store(_)));
        assert_eq!(store.stock_of(first.id).await, Some(8));
        assert_eq!(store.stock_of(second.id).await, Some(7));
        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);

        store.clear_failures().await;
        service
            .cancel_order(&Actor::customer(user), order.id)
            .await
            .unwrap();
        assert_eq!(store.stock_of(first.id).await, Some(10));
        assert_eq!(store.stock_of(second.id).await, Some(10));
    }
}

mod invariants {
    use super::*;

    #[tokio::test]
    async fn stock_is_conserved_across_checkout_and_cancel() {
        let store = InMemoryStore::new();
        let product = seed(&store, "Widget", Money::from_dollars(2), 20).await;
        let service = OrderService::new(store.clone());
        let user = UserId::new();
        let actor = Actor::customer(user);

        let mut open = Vec::new();
        for quantity in [1, 4, 2, 7, 3, 9, 5] {
            match service
                .checkout(user, vec![NewOrderItem::new(product.id, quantity)], "addr", None)
                .await
            {
                Ok(order) => open.push(order),
                Err(OrderError::InsufficientStock { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }

            // Cancel every other successful order.
            if open.len() % 2 == 0
                && let Some(order) = open.pop()
            {
                service.cancel_order(&actor, order.id).await.unwrap();
            }

            let reserved: u32 = open.iter().map(|o| o.items[0].quantity).sum();
            let stock = store.stock_of(product.id).await.unwrap();
            assert_eq!(stock + reserved, 20);
        }
    }

    #[tokio::test]
    async fn rejected_transitions_leave_order_unchanged() {
        let store = InMemoryStore::new();
        let product = seed(&store, "Widget", Money::from_dollars(2), 5).await;
        let service = OrderService::new(store.clone());
        let admin = Actor::admin(UserId::new());

        let order = service
            .checkout(UserId::new(), vec![NewOrderItem::new(product.id, 1)], "addr", None)
            .await
            .unwrap();

        for target in [OrderStatus::Pending, OrderStatus::Shipped, OrderStatus::Completed] {
            let err = service
                .update_order_status(&admin, order.id, target)
                .await
                .unwrap_err();
            assert!(matches!(err, OrderError::InvalidStatusTransition { .. }));
        }

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored, order);
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_checkouts_never_oversell() {
        let store = InMemoryStore::new();
        let product = seed(&store, "Widget", Money::from_dollars(5), 5).await;
        let service = OrderService::new(store.clone());

        let tasks = (0..12).map(|_| {
            let service = service.clone();
            let product_id = product.id;
            tokio::spawn(async move {
                service
                    .checkout(UserId::new(), vec![NewOrderItem::new(product_id, 1)], "addr", None)
                    .await
            })
        });

        let results = futures_util::future::join_all(tasks).await;
        let placed = results
            .into_iter()
            .map(|r| r.unwrap())
            .filter(|r| r.is_ok())
            .count();

        assert_eq!(placed, 5);
        assert_eq!(store.stock_of(product.id).await, Some(0));
        assert_eq!(store.order_count().await, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_cancellations_restore_once() {
        let store = InMemoryStore::new();
        let product = seed(&store, "Widget", Money::from_dollars(5), 10).await;
        let service = OrderService::new(store.clone());
        let user = UserId::new();

        let order = service
            .checkout(user, vec![NewOrderItem::new(product.id, 4)], "addr", None)
            .await
            .unwrap();

        let tasks = (0..4).map(|_| {
            let service = service.clone();
            let order_id = order.id;
            tokio::spawn(async move { service.cancel_order(&Actor::customer(user), order_id).await })
        });

        let results = futures_util::future::join_all(tasks).await;
        let cancelled = results
            .into_iter()
            .map(|r| r.unwrap())
            .filter(|r| r.is_ok())
            .count();

        assert_eq!(cancelled, 1);
        assert_eq!(store.stock_of(product.id).await, Some(10));
    }
}
