use async_trait::async_trait;
use common::{Discount, Money, OrderId, ProductId, SagaId};
use event_channel::ReservationLine;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::model::{
    ProductStock, ReservationRecord, ReservationStatus, ReserveOutcome, first_shortfall,
    merge_lines,
};
use crate::store::LedgerStore;
use crate::{LedgerError, Result};

const PRODUCT_COLUMNS: &str =
    "product_id, name, price_cents, discount, total_quantity, available_quantity";

const RESERVATION_COLUMNS: &str =
    "saga_id, order_id, product_id, name, price_cents, discount, quantity, status, created_at";

/// PostgreSQL-backed ledger.
///
/// Stock rows are locked with `SELECT … FOR UPDATE` in product id order, so
/// concurrent reservations on a product serialize and never deadlock.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
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

    fn row_to_product(row: &PgRow) -> Result<ProductStock> {
        let product_id: String = row.try_get("product_id")?;
        Ok(ProductStock {
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            discount: to_discount(&product_id, row.try_get("discount")?)?,
            total_quantity: to_quantity(row.try_get("total_quantity")?)?,
            available_quantity: to_quantity(row.try_get("available_quantity")?)?,
            product_id: ProductId::new(product_id),
        })
    }

    fn row_to_reservation(row: &PgRow) -> Result<ReservationRecord> {
        let status: String = row.try_get("status")?;
        let product_id: String = row.try_get("product_id")?;
        Ok(ReservationRecord {
            saga_id: SagaId::new(row.try_get::<String, _>("saga_id")?),
            order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            discount: to_discount(&product_id, row.try_get("discount")?)?,
            product_id: ProductId::new(product_id),
            quantity: to_quantity(row.try_get("quantity")?)?,
            status: status.parse()?,
            created_at: row.try_get("created_at")?,
        })
    }

    /// Locks the given product rows in id order and returns them.
    async fn lock_products(
        tx: &mut Transaction<'_, Postgres>,
        product_ids: Vec<String>,
    ) -> Result<Vec<ProductStock>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = ANY($1) ORDER BY product_id FOR UPDATE"
        ))
        .bind(product_ids)
        .fetch_all(&mut **tx)
        .await?;

        rows.iter().map(Self::row_to_product).collect()
    }

    /// Locks every product the saga holds records for.
    async fn lock_saga_products(
        tx: &mut Transaction<'_, Postgres>,
        saga_id: &SagaId,
    ) -> Result<()> {
        sqlx::query(
            r#"
            SELECT product_id FROM products
            WHERE product_id IN (SELECT product_id FROM reservations WHERE saga_id = $1)
            ORDER BY product_id
            FOR UPDATE
            "#,
        )
        .bind(saga_id.as_str())
        .fetch_all(&mut **tx)
        .await?;
        Ok(())
    }

    /// Lines a saga already holds, priced as they were when reserved.
    async fn prior_lines(
        tx: &mut Transaction<'_, Postgres>,
        saga_id: &SagaId,
    ) -> Result<Option<ReserveOutcome>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE saga_id = $1 ORDER BY id"
        ))
        .bind(saga_id.as_str())
        .fetch_all(&mut **tx)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let lines = rows
            .iter()
            .map(|row| Ok(Self::row_to_reservation(row)?.line_item()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(ReserveOutcome::Reserved {
            lines,
            replayed: true,
        }))
    }

    /// Moves the saga's RESERVED records to `to` and applies `stock_update`
    /// (with `$1` = product id, `$2` = quantity) for each of them.
    async fn settle(
        &self,
        saga_id: &SagaId,
        to: ReservationStatus,
        stock_update: &str,
    ) -> Result<Vec<ReservationRecord>> {
        let mut tx = self.pool.begin().await?;
        Self::lock_saga_products(&mut tx, saga_id).await?;

        let rows = sqlx::query(&format!(
            r#"
            UPDATE reservations SET status = $2, updated_at = NOW()
            WHERE saga_id = $1 AND status = 'RESERVED'
            RETURNING {RESERVATION_COLUMNS}
            "#
        ))
        .bind(saga_id.as_str())
        .bind(to.as_str())
        .fetch_all(&mut *tx)
        .await?;

        let settled = rows
            .iter()
            .map(Self::row_to_reservation)
            .collect::<Result<Vec<_>>>()?;

        for record in &settled {
            sqlx::query(stock_update)
                .bind(record.product_id.as_str())
                .bind(i64::from(record.quantity))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(settled)
    }
}

fn to_quantity(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| LedgerError::CorruptRow(format!("quantity {value} out of range")))
}

fn to_discount(product_id: &str, value: f64) -> Result<Discount> {
    Discount::new(value)
        .map_err(|e| LedgerError::CorruptRow(format!("product {product_id}: {e}")))
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[tracing::instrument(skip_all, fields(product_id = %product.product_id))]
    async fn upsert_product(&self, product: ProductStock) -> Result<()> {
        product.validate()?;
        let mut tx = self.pool.begin().await?;

        // Lock an existing row so no reservation moves between summing the
        // holds and writing the new levels.
        sqlx::query("SELECT product_id FROM products WHERE product_id = $1 FOR UPDATE")
            .bind(product.product_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let held: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM reservations WHERE product_id = $1 AND status = 'RESERVED'",
        )
        .bind(product.product_id.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let product = product.net_of_holds(to_quantity(held)?)?;

        sqlx::query(
            r#"
            INSERT INTO products (product_id, name, price_cents, discount, total_quantity, available_quantity)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (product_id) DO UPDATE SET
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                discount = EXCLUDED.discount,
                total_quantity = EXCLUDED.total_quantity,
                available_quantity = EXCLUDED.available_quantity,
                updated_at = NOW()
            "#,
        )
        .bind(product.product_id.as_str())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.discount.fraction())
        .bind(i64::from(product.total_quantity))
        .bind(i64::from(product.available_quantity))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_product(&self, product_id: &ProductId) -> Result<Option<ProductStock>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = $1"
        ))
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn list_products(&self) -> Result<Vec<ProductStock>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY product_id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_product).collect()
    }

    async fn stock_levels(&self, product_ids: &[ProductId]) -> Result<Vec<ProductStock>> {
        let ids: Vec<String> = product_ids.iter().map(|id| id.to_string()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let found = rows
            .iter()
            .map(Self::row_to_product)
            .collect::<Result<Vec<_>>>()?;

        // Keep the caller's order.
        Ok(product_ids
            .iter()
            .filter_map(|id| found.iter().find(|p| &p.product_id == id).cloned())
            .collect())
    }

    #[tracing::instrument(skip_all, fields(saga_id = %saga_id))]
    async fn reserve(
        &self,
        saga_id: &SagaId,
        order_id: &OrderId,
        lines: &[ReservationLine],
    ) -> Result<ReserveOutcome> {
        let lines = match merge_lines(lines) {
            Ok(lines) => lines,
            Err(failure) => return Ok(ReserveOutcome::Rejected(failure)),
        };

        let mut tx = self.pool.begin().await?;

        // Lock before looking for prior records: a concurrent replay of the
        // same command waits here and then sees the committed reservation.
        let ids = lines.iter().map(|l| l.product_id.to_string()).collect();
        let stock = Self::lock_products(&mut tx, ids).await?;

        if let Some(prior) = Self::prior_lines(&mut tx, saga_id).await? {
            tx.rollback().await?;
            return Ok(prior);
        }

        if let Some(failure) =
            first_shortfall(&lines, |id| stock.iter().find(|p| &p.product_id == id))
        {
            tx.rollback().await?;
            return Ok(ReserveOutcome::Rejected(failure));
        }

        let mut reserved = Vec::with_capacity(lines.len());
        for line in &lines {
            let Some(product) = stock.iter().find(|p| p.product_id == line.product_id) else {
                continue;
            };
            let quantity = i64::from(line.quantity);

            sqlx::query(
                "UPDATE products SET available_quantity = available_quantity - $2, updated_at = NOW() WHERE product_id = $1",
            )
            .bind(line.product_id.as_str())
            .bind(quantity)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO reservations
                    (saga_id, order_id, product_id, name, price_cents, discount, quantity, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, 'RESERVED')
                "#,
            )
            .bind(saga_id.as_str())
            .bind(order_id.as_str())
            .bind(line.product_id.as_str())
            .bind(&product.name)
            .bind(product.price.cents())
            .bind(product.discount.fraction())
            .bind(quantity)
            .execute(&mut *tx)
            .await?;

            reserved.push(product.line_item(line.quantity));
        }

        tx.commit().await?;
        Ok(ReserveOutcome::Reserved {
            lines: reserved,
            replayed: false,
        })
    }

    #[tracing::instrument(skip_all, fields(saga_id = %saga_id))]
    async fn release(&self, saga_id: &SagaId) -> Result<Vec<ReservationRecord>> {
        self.settle(
            saga_id,
            ReservationStatus::Released,
            "UPDATE products SET available_quantity = available_quantity + $2, updated_at = NOW() WHERE product_id = $1",
        )
        .await
    }

    #[tracing::instrument(skip_all, fields(saga_id = %saga_id))]
    async fn confirm(&self, saga_id: &SagaId) -> Result<Vec<ReservationRecord>> {
        self.settle(
            saga_id,
            ReservationStatus::Confirmed,
            "UPDATE products SET total_quantity = total_quantity - $2, updated_at = NOW() WHERE product_id = $1",
        )
        .await
    }

    async fn reservations_for(&self, saga_id: &SagaId) -> Result<Vec<ReservationRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE saga_id = $1 ORDER BY id"
        ))
        .bind(saga_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_reservation).collect()
    }
}
