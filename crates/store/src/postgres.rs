use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, Page, PageRequest, PaymentId, ProductId, UserId};
use domain::{
    Order, OrderItem, OrderStatus, Payment, PaymentOutcome, PaymentStatus, Product, TransactionId,
};
use sqlx::{PgConnection, PgPool, Postgres, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OrderFilter, PaymentFilter, Result, StoreError,
    store::{
        OrderRepository, PaymentRepository, ProductCatalog, StockLedger, Transaction,
        TransactionalStore,
    },
};

const ORDER_COLUMNS: &str = "id, user_id, total_amount_cents, status, shipping_address, notes, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, order_id, user_id, amount_cents, method, status, transaction_id, paid_at, failure_reason, processing_started_at, created_at, updated_at";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Decode(format!("{column} out of range: {value}")))
}

/// Position of an item within its order, as stored in `order_items.position`.
fn item_position(index: usize) -> Result<i32> {
    i32::try_from(index)
        .map_err(|_| StoreError::Encode(format!("order item position out of range: {index}")))
}

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e: T::Err| StoreError::Decode(e.to_string()))
}

fn row_to_product(row: PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        price: Money::from_cents(row.try_get("price_cents")?),
        stock: to_u32(row.try_get("stock")?, "stock")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_item(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        product_name: row.try_get("product_name")?,
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
    })
}

fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        items,
        total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
        status: parse_column(row, "status")?,
        shipping_address: row.try_get("shipping_address")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_payment(row: PgRow) -> Result<Payment> {
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        amount: Money::from_cents(row.try_get("amount_cents")?),
        method: parse_column(&row, "method")?,
        status: parse_column(&row, "status")?,
        transaction_id: TransactionId::new(row.try_get::<String, _>("transaction_id")?),
        paid_at: row.try_get("paid_at")?,
        failure_reason: row.try_get("failure_reason")?,
        processing_started_at: row.try_get("processing_started_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Loads the items of every listed order, keyed by order id, in checkout order.
async fn fetch_items(
    conn: &mut PgConnection,
    order_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
    let rows = sqlx::query(
        r#"
        SELECT order_id, product_id, product_name, quantity, unit_price_cents, subtotal_cents
        FROM order_items
        WHERE order_id = ANY($1)
        ORDER BY order_id, position ASC
        "#,
    )
    .bind(order_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for row in &rows {
        let order_id: Uuid = row.try_get("order_id")?;
        items.entry(order_id).or_default().push(row_to_item(row)?);
    }
    Ok(items)
}

/// Assembles orders from their rows, keeping the row order.
async fn hydrate_orders(conn: &mut PgConnection, rows: Vec<PgRow>) -> Result<Vec<Order>> {
    let ids = rows
        .iter()
        .map(|row| row.try_get::<Uuid, _>("id"))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let mut items = fetch_items(conn, &ids).await?;

    rows.iter()
        .zip(ids)
        .map(|(row, id)| row_to_order(row, items.remove(&id).unwrap_or_default()))
        .collect()
}

async fn fetch_order(conn: &mut PgConnection, id: OrderId, for_update: bool) -> Result<Option<Order>> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1{lock}");
    let row = sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => Ok(hydrate_orders(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Conditional status write shared by the pooled and transactional paths.
async fn set_order_status(
    conn: &mut PgConnection,
    id: OrderId,
    expected: OrderStatus,
    new: OrderStatus,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE orders SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2",
    )
    .bind(id.as_uuid())
    .bind(expected.as_str())
    .bind(new.as_str())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(());
    }

    let actual: Option<String> = sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

    match actual {
        Some(actual) => Err(StoreError::StatusConflict {
            order_id: id,
            expected,
            actual: actual
                .parse()
                .map_err(|e: domain::DomainError| StoreError::Decode(e.to_string()))?,
        }),
        None => Err(StoreError::OrderNotFound(id)),
    }
}

/// Transaction over a pooled connection. Rolls back on drop unless committed.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl StockLedger for PostgresTransaction {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, price_cents, stock, updated_at FROM products WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_product).transpose()
    }

    async fn reserve(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        // Check and decrement in one statement; concurrent reservations
        // serialize on the row lock.
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - $2, updated_at = NOW()
            WHERE id = $1 AND stock >= $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&mut *self.tx)
            .await?;

        if exists {
            Err(StoreError::InsufficientStock {
                product_id: id,
                requested: quantity,
            })
        } else {
            Err(StoreError::ProductNotFound(id))
        }
    }

    async fn restore(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        let result = sqlx::query(
            "UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, total_amount_cents, status, shipping_address, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.total_amount.cents())
        .bind(order.status.as_str())
        .bind(&order.shipping_address)
        .bind(&order.notes)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, position, product_id, product_name, quantity, unit_price_cents, subtotal_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(item_position(position)?)
            .bind(item.product_id.as_uuid())
            .bind(&item.product_name)
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.cents())
            .bind(item.subtotal.cents())
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>> {
        fetch_order(&mut *self.tx, id, true).await
    }

    async fn update_order_status(
        &mut self,
        id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
    ) -> Result<()> {
        set_order_status(&mut *self.tx, id, expected, new).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionalStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }
}

#[async_trait]
impl ProductCatalog for PostgresStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, stock, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(i64::from(product.stock))
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, price_cents, stock, updated_at FROM products WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_product).transpose()
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order(&mut *conn, id, false).await
    }

    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> Result<Page<Order>> {
        let page = page.normalized();
        let mut clause = String::from(" WHERE 1=1");
        let mut param_count = 0;

        // Build dynamic filter
        if filter.user_id.is_some() {
            param_count += 1;
            clause.push_str(&format!(" AND user_id = ${param_count}"));
        }
        if filter.status.is_some() {
            param_count += 1;
            clause.push_str(&format!(" AND status = ${param_count}"));
        }

        let count_sql = format!("SELECT COUNT(*) FROM orders{clause}");
        let select_sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders{clause} ORDER BY created_at DESC, id DESC LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2
        );

        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        let mut select_query = sqlx::query(&select_sql);
        if let Some(user_id) = filter.user_id {
            count_query = count_query.bind(user_id.as_uuid());
            select_query = select_query.bind(user_id.as_uuid());
        }
        if let Some(status) = filter.status {
            count_query = count_query.bind(status.as_str());
            select_query = select_query.bind(status.as_str());
        }
        select_query = select_query
            .bind(i64::from(page.limit))
            .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let mut conn = self.pool.acquire().await?;
        let total = count_query.fetch_one(&mut *conn).await?;
        let rows = select_query.fetch_all(&mut *conn).await?;
        let orders = hydrate_orders(&mut *conn, rows).await?;

        Ok(Page::new(orders, u64::try_from(total).unwrap_or(0), page))
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
    ) -> Result<Order> {
        let mut conn = self.pool.acquire().await?;
        set_order_status(&mut *conn, id, expected, new).await?;
        fetch_order(&mut *conn, id, false)
            .await?
            .ok_or(StoreError::OrderNotFound(id))
    }
}

#[async_trait]
impl PaymentRepository for PostgresStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, user_id, amount_cents, method, status, transaction_id,
                                  paid_at, failure_reason, processing_started_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.user_id.as_uuid())
        .bind(payment.amount.cents())
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(payment.transaction_id.as_str())
        .bind(payment.paid_at)
        .bind(&payment.failure_reason)
        .bind(payment.processing_started_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                match db_err.constraint() {
                    Some("payments_one_active_per_order") => {
                        return StoreError::PaymentAlreadyExists(payment.order_id);
                    }
                    Some("payments_transaction_id_key") => {
                        return StoreError::DuplicateTransactionId(payment.transaction_id.clone());
                    }
                    _ => {}
                }
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_payment).transpose()
    }

    async fn get_payment_by_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<Payment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = $1");
        let row = sqlx::query(&sql)
            .bind(transaction_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_payment).transpose()
    }

    async fn latest_payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 ORDER BY created_at DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_payment).transpose()
    }

    async fn active_payment_for_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 AND status <> 'FAILED'"
        );
        let row = sqlx::query(&sql)
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_payment).transpose()
    }

    async fn list_payments(
        &self,
        filter: &PaymentFilter,
        page: PageRequest,
    ) -> Result<Page<Payment>> {
        let page = page.normalized();
        let mut clause = String::from(" WHERE 1=1");
        let mut param_count = 0;

        if filter.user_id.is_some() {
            param_count += 1;
            clause.push_str(&format!(" AND user_id = ${param_count}"));
        }
        if filter.status.is_some() {
            param_count += 1;
            clause.push_str(&format!(" AND status = ${param_count}"));
        }
        if filter.order_id.is_some() {
            param_count += 1;
            clause.push_str(&format!(" AND order_id = ${param_count}"));
        }

        let count_sql = format!("SELECT COUNT(*) FROM payments{clause}");
        let select_sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments{clause} ORDER BY created_at DESC, id DESC LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2
        );

        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        let mut select_query = sqlx::query(&select_sql);
        if let Some(user_id) = filter.user_id {
            count_query = count_query.bind(user_id.as_uuid());
            select_query = select_query.bind(user_id.as_uuid());
        }
        if let Some(status) = filter.status {
            count_query = count_query.bind(status.as_str());
            select_query = select_query.bind(status.as_str());
        }
        if let Some(order_id) = filter.order_id {
            count_query = count_query.bind(order_id.as_uuid());
            select_query = select_query.bind(order_id.as_uuid());
        }
        select_query = select_query
            .bind(i64::from(page.limit))
            .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let total = count_query.fetch_one(&self.pool).await?;
        let rows = select_query.fetch_all(&self.pool).await?;
        let payments = rows
            .into_iter()
            .map(row_to_payment)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(payments, u64::try_from(total).unwrap_or(0), page))
    }

    async fn mark_processing(&self, id: PaymentId, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'PROCESSING', processing_started_at = $2, updated_at = $2
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(id.as_uuid())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn resolve_payment(
        &self,
        transaction_id: &TransactionId,
        outcome: &PaymentOutcome,
        at: DateTime<Utc>,
    ) -> Result<Payment> {
        let (paid_at, failure_reason) = match outcome {
            PaymentOutcome::Success => (Some(at), None),
            PaymentOutcome::Failed { reason } => (None, Some(reason.as_str())),
        };

        let sql = format!(
            r#"
            UPDATE payments
            SET status = $2, paid_at = $3, failure_reason = $4, updated_at = $5
            WHERE transaction_id = $1 AND status IN ('PENDING', 'PROCESSING')
            RETURNING {PAYMENT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(transaction_id.as_str())
            .bind(outcome.status().as_str())
            .bind(paid_at)
            .bind(failure_reason)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            return row_to_payment(row);
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM payments WHERE transaction_id = $1)")
                .bind(transaction_id.as_str())
                .fetch_one(&self.pool)
                .await?;

        if exists {
            Err(StoreError::PaymentAlreadyProcessed(transaction_id.clone()))
        } else {
            Err(StoreError::PaymentNotFound(transaction_id.clone()))
        }
    }

    async fn find_unsettled(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>> {
        let sql = format!(
            r#"
            SELECT {PAYMENT_COLUMNS} FROM payments
            WHERE status IN ('PENDING', 'PROCESSING')
              AND COALESCE(processing_started_at, created_at) < $1
            ORDER BY created_at ASC
            "#
        );
        let rows = sqlx::query(&sql).bind(cutoff).fetch_all(&self.pool).await?;

        rows.into_iter().map(row_to_payment).collect()
    }

    async fn find_unapplied_successes(&self) -> Result<Vec<Payment>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.order_id, p.user_id, p.amount_cents, p.method, p.status, p.transaction_id,
                   p.paid_at, p.failure_reason, p.processing_started_at, p.created_at, p.updated_at
            FROM payments p
            JOIN orders o ON o.id = p.order_id
            WHERE p.status = $1 AND o.status = $2
            ORDER BY p.created_at ASC
            "#,
        )
        .bind(PaymentStatus::Success.as_str())
        .bind(OrderStatus::Pending.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_payment).collect()
    }
}
