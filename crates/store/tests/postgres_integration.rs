//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{Money, PageRequest, UserId};
use domain::{Order, OrderItem, OrderStatus, Payment, PaymentMethod, PaymentOutcome, Product, TransactionId};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    OrderFilter, OrderRepository, PaymentFilter, PaymentRepository, PostgresStore,
    ProductCatalog, StockLedger, StoreError, TransactionalStore,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_commerce_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE payments, order_items, orders, products")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

async fn seed_product(store: &PostgresStore, stock: u32) -> Product {
    let product = Product::new("Keyboard", Money::from_dollars(50), stock);
    store.insert_product(&product).await.unwrap();
    product
}

async fn place_order(store: &PostgresStore, product: &Product, quantity: u32) -> Order {
    let order = Order::new(
        UserId::new(),
        vec![OrderItem::new(
            product.id,
            product.name.clone(),
            quantity,
            product.price,
        )
        .unwrap()],
        "1 Main St",
        Some("leave at door".to_string()),
    )
    .unwrap();

    let mut tx = store.begin().await.unwrap();
    tx.reserve(product.id, quantity).await.unwrap();
    tx.insert_order(&order).await.unwrap();
    tx.commit().await.unwrap();
    order
}

fn payment_for(order: &Order, txn: &str) -> Payment {
    Payment::new(
        order.id,
        order.user_id,
        order.total_amount,
        PaymentMethod::CreditCard,
        TransactionId::new(txn),
    )
}

#[tokio::test]
#[serial]
async fn order_round_trips_with_items() {
    let store = get_test_store().await;
    let product = seed_product(&store, 10).await;

    let order = place_order(&store, &product, 3).await;

    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.items, order.items);
    assert_eq!(loaded.total_amount, Money::from_dollars(150));
    assert_eq!(loaded.status, OrderStatus::Pending);
    assert_eq!(loaded.notes.as_deref(), Some("leave at door"));

    let product = store.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(product.stock, 7);
}

#[tokio::test]
#[serial]
async fn uncommitted_reservation_rolls_back() {
    let store = get_test_store().await;
    let product = seed_product(&store, 5).await;

    {
        let mut tx = store.begin().await.unwrap();
        tx.reserve(product.id, 5).await.unwrap();
    }

    let product = store.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(product.stock, 5);
}

#[tokio::test]
#[serial]
async fn reserve_reports_shortage_and_missing_product() {
    let store = get_test_store().await;
    let product = seed_product(&store, 2).await;

    let mut tx = store.begin().await.unwrap();
    let err = tx.reserve(product.id, 3).await.unwrap_err();
    assert!(matches!(err, StoreError::InsufficientStock { requested: 3, .. }));

    let err = tx
        .reserve(common::ProductId::new(), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::ProductNotFound(_)));
}

#[tokio::test]
#[serial]
async fn concurrent_reservations_never_oversell() {
    let store = get_test_store().await;
    let product = seed_product(&store, 5).await;

    let tasks = (0..10).map(|_| {
        let store = store.clone();
        let product_id = product.id;
        tokio::spawn(async move {
            let mut tx = store.begin().await.unwrap();
            match tx.reserve(product_id, 1).await {
                Ok(()) => {
                    tx.commit().await.unwrap();
                    true
                }
                Err(StoreError::InsufficientStock { .. }) => false,
                Err(e) => panic!("unexpected error: {e}"),
            }
        })
    });

    let results = futures_util::future::join_all(tasks).await;
    let succeeded = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();

    assert_eq!(succeeded, 5);
    let product = store.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(product.stock, 0);
}

#[tokio::test]
#[serial]
async fn status_update_is_conditional() {
    let store = get_test_store().await;
    let product = seed_product(&store, 5).await;
    let order = place_order(&store, &product, 1).await;

    let paid = store
        .update_order_status(order.id, OrderStatus::Pending, OrderStatus::Paid)
        .await
        .unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
    assert_eq!(paid.items.len(), 1);

    let err = store
        .update_order_status(order.id, OrderStatus::Pending, OrderStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::StatusConflict {
            actual: OrderStatus::Paid,
            ..
        }
    ));

    let err = store
        .update_order_status(common::OrderId::new(), OrderStatus::Pending, OrderStatus::Paid)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::OrderNotFound(_)));
}

#[tokio::test]
#[serial]
async fn list_orders_filters_and_paginates() {
    let store = get_test_store().await;
    let product = seed_product(&store, 100).await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(place_order(&store, &product, 1).await.id);
    }
    store
        .update_order_status(ids[0], OrderStatus::Pending, OrderStatus::Cancelled)
        .await
        .unwrap();

    let all = store
        .list_orders(&OrderFilter::new(), PageRequest::new(1, 2))
        .await
        .unwrap();
    assert_eq!(all.total, 3);
    assert_eq!(all.total_pages, 2);
    assert_eq!(all.items[0].id, ids[2]);

    let pending = store
        .list_orders(
            &OrderFilter::new().status(OrderStatus::Pending),
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(pending.total, 2);
}

#[tokio::test]
#[serial]
async fn payment_uniqueness_is_enforced_by_the_schema() {
    let store = get_test_store().await;
    let product = seed_product(&store, 5).await;
    let order = place_order(&store, &product, 1).await;

    let first = payment_for(&order, "TXN-1-0001");
    store.insert_payment(&first).await.unwrap();

    let err = store
        .insert_payment(&payment_for(&order, "TXN-1-0002"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::PaymentAlreadyExists(_)));

    store
        .resolve_payment(
            &first.transaction_id,
            &PaymentOutcome::failed("declined"),
            Utc::now(),
        )
        .await
        .unwrap();

    let err = store
        .insert_payment(&payment_for(&order, "TXN-1-0001"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateTransactionId(_)));

    store
        .insert_payment(&payment_for(&order, "TXN-1-0003"))
        .await
        .unwrap();

    let listed = store
        .list_payments(&PaymentFilter::new().order_id(order.id), PageRequest::default())
        .await
        .unwrap();
    assert_eq!(listed.total, 2);
    let latest = store.latest_payment_for_order(order.id).await.unwrap().unwrap();
    assert_eq!(latest.transaction_id.as_str(), "TXN-1-0003");
}

#[tokio::test]
#[serial]
async fn resolve_payment_exactly_once() {
    let store = get_test_store().await;
    let product = seed_product(&store, 5).await;
    let order = place_order(&store, &product, 1).await;
    let payment = payment_for(&order, "TXN-2-0001");
    store.insert_payment(&payment).await.unwrap();

    assert!(store.mark_processing(payment.id, Utc::now()).await.unwrap());

    let resolved = store
        .resolve_payment(&payment.transaction_id, &PaymentOutcome::Success, Utc::now())
        .await
        .unwrap();
    assert!(resolved.paid_at.is_some());
    assert!(resolved.processing_started_at.is_some());

    let err = store
        .resolve_payment(
            &payment.transaction_id,
            &PaymentOutcome::failed("late"),
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::PaymentAlreadyProcessed(_)));

    let err = store
        .resolve_payment(
            &TransactionId::new("TXN-missing"),
            &PaymentOutcome::Success,
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::PaymentNotFound(_)));

    let unapplied = store.find_unapplied_successes().await.unwrap();
    assert_eq!(unapplied.len(), 1);
    assert_eq!(unapplied[0].order_id, order.id);
}

#[tokio::test]
#[serial]
async fn find_unsettled_uses_cutoff() {
    let store = get_test_store().await;
    let product = seed_product(&store, 5).await;
    let order = place_order(&store, &product, 1).await;
    let payment = payment_for(&order, "TXN-3-0001");
    store.insert_payment(&payment).await.unwrap();

    let past = store
        .find_unsettled(Utc::now() - Duration::minutes(5))
        .await
        .unwrap();
    assert!(past.is_empty());

    let future = store
        .find_unsettled(Utc::now() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(future.len(), 1);
    assert_eq!(future[0].id, payment.id);
}
