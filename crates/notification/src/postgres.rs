use std::collections::HashMap;

use async_trait::async_trait;
use common::{Discount, Money, OrderId, ProductId, UserId};
use event_channel::LineItem;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::Result;
use crate::error::MaterializerError;
use crate::order::MaterializedOrder;
use crate::repository::OrderRepository;

/// PostgreSQL-backed order repository (`orders` and `order_items` tables).
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    /// Creates a new PostgreSQL order repository.
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

    fn row_to_item(row: &PgRow) -> Result<LineItem> {
        let quantity: i64 = row.try_get("quantity")?;
        let discount: f64 = row.try_get("discount")?;
        Ok(LineItem {
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            name: row.try_get("name")?,
            quantity: u32::try_from(quantity)
                .map_err(|_| MaterializerError::CorruptRow(format!("quantity {quantity}")))?,
            price: Money::from_cents(row.try_get("price_cents")?),
            discount: Discount::new(discount)
                .map_err(|e| MaterializerError::CorruptRow(e.to_string()))?,
        })
    }

    /// Loads orders matching `filter` (a WHERE clause over `o`) with their items.
    async fn load(&self, filter: &str, bind: Option<&str>) -> Result<Vec<MaterializedOrder>> {
        let order_sql = format!(
            "SELECT o.order_id, o.user_id, o.total_price_cents, o.order_date \
             FROM orders o {filter} ORDER BY o.created_at, o.order_id"
        );
        let item_sql = format!(
            "SELECT i.order_id, i.product_id, i.name, i.quantity, i.price_cents, i.discount \
             FROM order_items i JOIN orders o ON o.order_id = i.order_id {filter} \
             ORDER BY i.order_id, i.position"
        );

        let mut order_query = sqlx::query(&order_sql);
        let mut item_query = sqlx::query(&item_sql);
        if let Some(value) = bind {
            order_query = order_query.bind(value);
            item_query = item_query.bind(value);
        }
        let order_rows = order_query.fetch_all(&self.pool).await?;
        let item_rows = item_query.fetch_all(&self.pool).await?;

        let mut items: HashMap<String, Vec<LineItem>> = HashMap::new();
        for row in &item_rows {
            let order_id: String = row.try_get("order_id")?;
            items.entry(order_id).or_default().push(Self::row_to_item(row)?);
        }

        order_rows
            .iter()
            .map(|row| {
                let order_id: String = row.try_get("order_id")?;
                Ok(MaterializedOrder {
                    items: items.remove(&order_id).unwrap_or_default(),
                    order_id: OrderId::new(order_id),
                    user_id: UserId::new(row.try_get::<String, _>("user_id")?),
                    total_price: Money::from_cents(row.try_get("total_price_cents")?),
                    order_date: row.try_get("order_date")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    #[tracing::instrument(skip_all, fields(order_id = %order.order_id))]
    async fn save(&self, order: &MaterializedOrder) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (order_id, user_id, total_price_cents, order_date)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(order.order_id.as_str())
        .bind(order.user_id.as_str())
        .bind(order.total_price.cents())
        .bind(order.order_date)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items
                    (order_id, position, product_id, name, quantity, price_cents, discount)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order.order_id.as_str())
            .bind(position as i32)
            .bind(item.product_id.as_str())
            .bind(&item.name)
            .bind(i64::from(item.quantity))
            .bind(item.price.cents())
            .bind(item.discount.fraction())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<MaterializedOrder>> {
        let mut orders = self
            .load("WHERE o.order_id = $1", Some(order_id.as_str()))
            .await?;
        Ok(orders.pop())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<MaterializedOrder>> {
        self.load("WHERE o.user_id = $1", Some(user_id.as_str())).await
    }

    async fn list_all(&self) -> Result<Vec<MaterializedOrder>> {
        self.load("", None).await
    }
}
