use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{IdempotencyKey, PayloadError, ProductId, SagaId, UserId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::ledger::{Ledger, LedgerTx};
use crate::{CartLine, InventoryError, OrderLine, Product, Result};

/// PostgreSQL-backed ledger.
///
/// Row locks are `SELECT ... FOR UPDATE` locks and live as long as the
/// database transaction, so they serialize transactions across processes.
#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Creates a new PostgreSQL ledger.
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

    fn row_to_order_line(row: PgRow) -> Result<OrderLine> {
        Ok(OrderLine {
            user_id: UserId::new(row.try_get("user_id")?),
            email: row.try_get("email")?,
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity: row.try_get("quantity")?,
            order_date: row.try_get::<DateTime<Utc>, _>("order_date")?,
            saga_id: row
                .try_get::<Option<Uuid>, _>("saga_id")?
                .map(SagaId::from_uuid),
        })
    }
}

#[async_trait]
impl Ledger for PostgresLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresLedgerTx { tx }))
    }

    async fn product(&self, product_id: ProductId) -> Result<Option<Product>> {
        let quantity: Option<i64> =
            sqlx::query_scalar("SELECT quantity FROM products WHERE id = $1")
                .bind(product_id.as_i64())
                .fetch_optional(&self.pool)
                .await?;

        Ok(quantity.map(|quantity| Product {
            id: product_id,
            quantity,
        }))
    }

    async fn put_product(&self, product: Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, quantity)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET quantity = EXCLUDED.quantity
            "#,
        )
        .bind(product.id.as_i64())
        .bind(product.quantity)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn cart_lines(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(
            "SELECT product_id, quantity FROM cart WHERE user_id = $1 ORDER BY product_id ASC",
        )
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(CartLine {
                    user_id,
                    product_id: ProductId::new(row.try_get("product_id")?),
                    quantity: row.try_get("quantity")?,
                })
            })
            .collect()
    }

    async fn order_lines(&self, user_id: UserId) -> Result<Vec<OrderLine>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, email, product_id, quantity, order_date, saga_id
            FROM orders
            WHERE user_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order_line).collect()
    }
}

/// Transaction handle of [`PostgresLedger`]. Dropping it without commit
/// lets sqlx roll the transaction back.
pub struct PostgresLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PostgresLedgerTx {
    async fn lock_product(&mut self, product_id: ProductId) -> Result<i64> {
        let quantity: Option<i64> =
            sqlx::query_scalar("SELECT quantity FROM products WHERE id = $1 FOR UPDATE")
                .bind(product_id.as_i64())
                .fetch_optional(&mut *self.tx)
                .await?;

        quantity.ok_or(InventoryError::ProductNotFound(product_id))
    }

    async fn adjust_stock(&mut self, product_id: ProductId, delta: i64) -> Result<()> {
        let result = sqlx::query("UPDATE products SET quantity = quantity + $2 WHERE id = $1")
            .bind(product_id.as_i64())
            .bind(delta)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| write_error(e, product_id))?;

        if result.rows_affected() == 0 {
            return Err(InventoryError::ProductNotFound(product_id));
        }
        Ok(())
    }

    async fn insert_order_line(&mut self, line: &OrderLine) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (user_id, product_id, quantity, email, order_date, saga_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(line.user_id.as_i64())
        .bind(line.product_id.as_i64())
        .bind(line.quantity)
        .bind(&line.email)
        .bind(line.order_date)
        .bind(line.saga_id.map(|id| id.as_uuid()))
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn delete_order_lines(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
        email: &str,
        saga_id: Option<SagaId>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM orders
            WHERE user_id = $1 AND product_id = $2 AND email = $3
              AND ($4::uuid IS NULL OR saga_id = $4)
            "#,
        )
        .bind(user_id.as_i64())
        .bind(product_id.as_i64())
        .bind(email)
        .bind(saga_id.map(|id| id.as_uuid()))
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }

    async fn add_cart_line(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cart (user_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = cart.quantity + EXCLUDED.quantity
            "#,
        )
        .bind(user_id.as_i64())
        .bind(product_id.as_i64())
        .bind(quantity)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| write_error(e, product_id))?;

        Ok(())
    }

    async fn delete_cart_line(&mut self, user_id: UserId, product_id: ProductId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart WHERE user_id = $1 AND product_id = $2")
            .bind(user_id.as_i64())
            .bind(product_id.as_i64())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn clear_cart(&mut self, user_id: UserId) -> Result<u64> {
        // Lock the products first so this never interleaves with a
        // transaction that already holds one of them.
        sqlx::query(
            r#"
            SELECT p.id FROM products p
            JOIN cart c ON c.product_id = p.id
            WHERE c.user_id = $1
            ORDER BY p.id ASC
            FOR UPDATE OF p
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_all(&mut *self.tx)
        .await?;

        let result = sqlx::query("DELETE FROM cart WHERE user_id = $1")
            .bind(user_id.as_i64())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn claim_request(&mut self, key: &IdempotencyKey) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO processed_requests (idempotency_key) VALUES ($1) ON CONFLICT DO NOTHING",
        )
        .bind(key.as_str())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PostgresLedgerTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}

/// Maps a failed write on a product's stock or cart line.
fn write_error(e: sqlx::Error, product_id: ProductId) -> InventoryError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_foreign_key_violation() {
            return InventoryError::ProductNotFound(product_id);
        }
        // numeric_value_out_of_range
        if db_err.code().as_deref() == Some("22003") {
            return PayloadError::QuantityOverflow(product_id).into();
        }
    }
    InventoryError::Database(e)
}
