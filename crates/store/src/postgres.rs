use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    CancelledLine, Cart, CartId, LineCancellation, LineItem, LineItemId, LineStatus, Money,
    Order, OrderId, OrderPage, OrderQuery, Product, ProductId, Restock, Result, StoreError,
    UserId,
    store::{Store, coalesce_restocks, validate_cart_lines},
};

const PRODUCT_COLUMNS: &str = "id, name, brand, unit_price_cents, taxable, quantity, active";
const LINE_COLUMNS: &str = "id, cart_id, product_id, position, quantity, unit_price_cents, status";
const ORDER_COLUMNS: &str = "id, owner_id, cart_id, total_cents, created_at";

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

    /// Connects a pool of at most `max_connections` to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            brand: row.try_get("brand")?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            taxable: row.try_get("taxable")?,
            quantity: row.try_get("quantity")?,
            active: row.try_get("active")?,
        })
    }

    fn row_to_line(row: PgRow) -> Result<LineItem> {
        let id = LineItemId::from_uuid(row.try_get::<Uuid, _>("id")?);
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<LineStatus>()
            .map_err(|e| StoreError::InvalidRecord(format!("line item {id}: {e}")))?;

        Ok(LineItem {
            id,
            cart_id: CartId::from_uuid(row.try_get::<Uuid, _>("cart_id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            position: to_u32(row.try_get("position")?, "position")?,
            quantity: to_u32(row.try_get("quantity")?, "quantity")?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            status,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            owner: UserId::from_uuid(row.try_get::<Uuid, _>("owner_id")?),
            cart_id: CartId::from_uuid(row.try_get::<Uuid, _>("cart_id")?),
            total: Money::from_cents(row.try_get("total_cents")?),
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    /// Applies coalesced stock credits inside an open transaction.
    async fn apply_restocks(tx: &mut Transaction<'_, Postgres>, restocks: &[Restock]) -> Result<()> {
        for restock in coalesce_restocks(restocks) {
            let result = sqlx::query("UPDATE products SET quantity = quantity + $2 WHERE id = $1")
                .bind(restock.product_id.as_uuid())
                .bind(i64::from(restock.quantity))
                .execute(&mut **tx)
                .await?;

            if result.rows_affected() == 0 {
                return Err(StoreError::ProductNotFound(restock.product_id));
            }
        }
        Ok(())
    }
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidRecord(format!("{column} out of range: {value}")))
}

fn to_i32(value: u32, column: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| StoreError::InvalidRecord(format!("{column} out of range: {value}")))
}

/// Converts a row count to a bigint bind. Anything past `i64::MAX` selects
/// no more rows than `i64::MAX` does.
fn to_bound(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert_product(&self, product: Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, brand, unit_price_cents, taxable, quantity, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.brand)
        .bind(product.unit_price.cents())
        .bind(product.taxable)
        .bind(product.quantity)
        .bind(product.active)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return StoreError::Duplicate(format!("product {}", product.id));
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let uuids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(uuids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn increment_stock(&self, id: ProductId, quantity: u32) -> Result<()> {
        let result = sqlx::query("UPDATE products SET quantity = quantity + $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(i64::from(quantity))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound(id));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, restocks), fields(restocks = restocks.len()))]
    async fn increment_stock_many(&self, restocks: &[Restock]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::apply_restocks(&mut tx, restocks).await?;
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, cart, lines), fields(cart_id = %cart.id, lines = lines.len()))]
    async fn insert_cart(&self, cart: Cart, lines: Vec<LineItem>) -> Result<()> {
        validate_cart_lines(&cart, &lines)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO carts (id, created_at) VALUES ($1, $2)")
            .bind(cart.id.as_uuid())
            .bind(cart.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    return StoreError::Duplicate(format!("cart {}", cart.id));
                }
                StoreError::Database(e)
            })?;

        for line in &lines {
            sqlx::query(
                r#"
                INSERT INTO line_items (id, cart_id, product_id, position, quantity, unit_price_cents, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(line.id.as_uuid())
            .bind(line.cart_id.as_uuid())
            .bind(line.product_id.as_uuid())
            .bind(to_i32(line.position, "position")?)
            .bind(to_i32(line.quantity, "quantity")?)
            .bind(line.unit_price.cents())
            .bind(line.status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>> {
        let row = sqlx::query("SELECT id, created_at FROM carts WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Cart {
                id: CartId::from_uuid(row.try_get::<Uuid, _>("id")?),
                created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn get_line_item(&self, id: LineItemId) -> Result<Option<LineItem>> {
        let row = sqlx::query(&format!("SELECT {LINE_COLUMNS} FROM line_items WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_line).transpose()
    }

    async fn get_line_items(&self, cart_id: CartId) -> Result<Vec<LineItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {LINE_COLUMNS} FROM line_items WHERE cart_id = $1 ORDER BY position ASC"
        ))
        .bind(cart_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_line).collect()
    }

    async fn get_line_items_by_status(
        &self,
        cart_id: CartId,
        status: LineStatus,
    ) -> Result<Vec<LineItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {LINE_COLUMNS} FROM line_items WHERE cart_id = $1 AND status = $2 ORDER BY position ASC"
        ))
        .bind(cart_id.as_uuid())
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_line).collect()
    }

    async fn set_line_status(
        &self,
        id: LineItemId,
        expected: LineStatus,
        new: LineStatus,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE line_items SET status = $3 WHERE id = $1 AND status = $2")
            .bind(id.as_uuid())
            .bind(expected.as_str())
            .bind(new.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM line_items WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match exists {
            Some(_) => Ok(false),
            None => Err(StoreError::LineItemNotFound(id)),
        }
    }

    #[tracing::instrument(skip(self, cancellations), fields(requested = cancellations.len()))]
    async fn cancel_lines(
        &self,
        cancellations: &[LineCancellation],
    ) -> Result<Vec<CancelledLine>> {
        let mut tx = self.pool.begin().await?;
        let mut cancelled = Vec::new();

        for c in cancellations.iter().filter(|c| c.expected.can_cancel()) {
            // The conditional update is the single trigger for the credit:
            // a line that is no longer in `expected` returns no row.
            let row = sqlx::query(
                r#"
                UPDATE line_items SET status = $3
                WHERE id = $1 AND status = $2
                RETURNING product_id, quantity
                "#,
            )
            .bind(c.line_item_id.as_uuid())
            .bind(c.expected.as_str())
            .bind(LineStatus::Cancelled.as_str())
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(row) = row {
                let product_id = ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?);
                let quantity = to_u32(row.try_get("quantity")?, "quantity")?;
                cancelled.push(CancelledLine {
                    line_item_id: c.line_item_id,
                    restock: Restock::new(product_id, quantity),
                });
            }
        }

        let restocks: Vec<Restock> = cancelled.iter().map(|c| c.restock).collect();
        Self::apply_restocks(&mut tx, &restocks).await?;

        tx.commit().await?;
        tracing::debug!(cancelled = cancelled.len(), "lines cancelled and restocked");
        Ok(cancelled)
    }

    #[tracing::instrument(skip(self, order), fields(order_id = %order.id, cart_id = %order.cart_id))]
    async fn insert_order(&self, order: Order) -> Result<()> {
        if self.get_cart(order.cart_id).await?.is_none() {
            return Err(StoreError::CartNotFound(order.cart_id));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO orders (id, owner_id, cart_id, total_cents, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.owner.as_uuid())
        .bind(order.cart_id.as_uuid())
        .bind(order.total.cents())
        .bind(order.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(ref db_err))
                if db_err.constraint() == Some("unique_order_cart") =>
            {
                let existing = self.find_order_by_cart(order.cart_id).await?;
                Err(StoreError::CartAlreadyBound {
                    cart_id: order.cart_id,
                    order_id: existing.map(|o| o.id).unwrap_or(order.id),
                })
            }
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_foreign_key_violation() => {
                Err(StoreError::CartNotFound(order.cart_id))
            }
            Err(e) if is_unique_violation(&e) => {
                Err(StoreError::Duplicate(format!("order {}", order.id)))
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn find_order_by_cart(&self, cart_id: CartId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE cart_id = $1"))
            .bind(cart_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<OrderPage> {
        let mut filter = String::from(" WHERE 1=1");
        let mut param_count = 0;

        if query.owner.is_some() {
            param_count += 1;
            filter.push_str(&format!(" AND owner_id = ${param_count}"));
        }

        let count_sql = format!("SELECT COUNT(*) FROM orders{filter}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(owner) = query.owner {
            count_query = count_query.bind(owner.as_uuid());
        }
        let total_count = count_query.fetch_one(&self.pool).await?;

        let mut sql =
            format!("SELECT {ORDER_COLUMNS} FROM orders{filter} ORDER BY created_at DESC, id DESC");
        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);
        if let Some(owner) = query.owner {
            sqlx_query = sqlx_query.bind(owner.as_uuid());
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(to_bound(limit));
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(to_bound(offset));
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        let orders = rows
            .into_iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;

        Ok(OrderPage {
            orders,
            total_count: u64::try_from(total_count).unwrap_or_default(),
        })
    }

    #[tracing::instrument(skip(self))]
    async fn delete_order_and_cart(&self, id: OrderId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let cart_id: Option<Uuid> =
            sqlx::query_scalar("DELETE FROM orders WHERE id = $1 RETURNING cart_id")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;

        let Some(cart_id) = cart_id else {
            tracing::debug!("order already deleted");
            return Ok(false);
        };

        // Line items go with the cart (ON DELETE CASCADE)
        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(%cart_id, "order and cart deleted");
        Ok(true)
    }
}
