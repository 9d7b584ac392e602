//! Order repository and the `PostgreSQL` checkout transaction.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use corner_shop_core::{OrderId, OrderStatus, Price, ProductId, UserId};

use super::{RepositoryError, to_i32, to_u32};
use crate::models::{
    LockedProduct, NewOrder, OrderDetail, OrderLine, OrderSummary, Recipient,
};
use crate::store::CheckoutTx;

/// SQLSTATE for `lock_not_available`, raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

#[derive(sqlx::FromRow)]
struct OrderSummaryRow {
    id: OrderId,
    created_at: DateTime<Utc>,
    shipping_method: String,
    total: Price,
    status: String,
}

impl TryFrom<OrderSummaryRow> for OrderSummary {
    type Error = RepositoryError;

    fn try_from(row: OrderSummaryRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<OrderStatus>()
            .map_err(RepositoryError::DataCorruption)?;
        Ok(Self {
            id: row.id,
            created_at: row.created_at,
            shipping_method: row.shipping_method,
            total: row.total,
            status,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderDetailRow {
    #[sqlx(flatten)]
    summary: OrderSummaryRow,
    recipient_name: String,
    recipient_address: String,
    recipient_phone: String,
}

#[derive(sqlx::FromRow)]
struct OrderLineRow {
    product_id: ProductId,
    product_name: String,
    quantity: i32,
    unit_price: Price,
}

#[derive(sqlx::FromRow)]
struct LockedProductRow {
    id: ProductId,
    name: String,
    price: Price,
    stock: i32,
}

/// Repository for order history reads.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// A user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a status is unknown.
    pub async fn list_for_user(&self, user: UserId) -> Result<Vec<OrderSummary>, RepositoryError> {
        let rows: Vec<OrderSummaryRow> = sqlx::query_as(
            r"
            SELECT id, created_at, shipping_method, total, status
            FROM shop.customer_order
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            ",
        )
        .bind(user)
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(OrderSummary::try_from).collect()
    }

    /// One of the user's orders with its lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_for_user(
        &self,
        user: UserId,
        id: OrderId,
    ) -> Result<Option<OrderDetail>, RepositoryError> {
        let row: Option<OrderDetailRow> = sqlx::query_as(
            r"
            SELECT id, created_at, shipping_method, total, status,
                   recipient_name, recipient_address, recipient_phone
            FROM shop.customer_order
            WHERE id = $1 AND user_id = $2
            ",
        )
        .bind(id)
        .bind(user)
        .fetch_optional(self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lines: Vec<OrderLineRow> = sqlx::query_as(
            r"
            SELECT product_id, product_name, quantity, unit_price
            FROM shop.order_item
            WHERE order_id = $1
            ORDER BY product_id
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        let items = lines
            .into_iter()
            .map(|line| {
                Ok(OrderLine {
                    product_id: line.product_id,
                    product_name: line.product_name,
                    quantity: to_u32(line.quantity, "quantity")?,
                    unit_price: line.unit_price,
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        Ok(Some(OrderDetail {
            summary: OrderSummary::try_from(row.summary)?,
            recipient: Recipient {
                name: row.recipient_name,
                address: row.recipient_address,
                phone: row.recipient_phone,
            },
            items,
        }))
    }
}

/// A checkout running inside one `PostgreSQL` transaction.
///
/// Row locks come from `SELECT ... FOR UPDATE` and are released at commit or
/// rollback. Dropping the value without committing rolls back.
pub struct PgCheckoutTx {
    tx: Transaction<'static, Postgres>,
}

impl PgCheckoutTx {
    /// Begin a transaction whose lock waits give up after `lock_timeout`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction cannot start.
    pub async fn begin(pool: &PgPool, lock_timeout: Duration) -> Result<Self, RepositoryError> {
        let mut tx = pool.begin().await?;
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", lock_timeout.as_millis().max(1)))
            .execute(&mut *tx)
            .await?;
        Ok(Self { tx })
    }
}

fn map_lock_error(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.code().as_deref() == Some(LOCK_NOT_AVAILABLE)
    {
        return RepositoryError::LockTimeout;
    }
    RepositoryError::Database(err)
}

#[async_trait]
impl CheckoutTx for PgCheckoutTx {
    async fn lock_product(
        &mut self,
        id: ProductId,
    ) -> Result<Option<LockedProduct>, RepositoryError> {
        let row: Option<LockedProductRow> = sqlx::query_as(
            "SELECT id, name, price, stock FROM shop.product WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_lock_error)?;

        row.map(|row| {
            Ok(LockedProduct {
                id: row.id,
                name: row.name,
                price: row.price,
                stock: to_u32(row.stock, "stock")?,
            })
        })
        .transpose()
    }

    async fn set_stock(&mut self, id: ProductId, stock: u32) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE shop.product SET stock = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(to_i32(stock, "stock")?)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<OrderSummary, RepositoryError> {
        let row: OrderSummaryRow = sqlx::query_as(
            r"
            INSERT INTO shop.customer_order
                (user_id, recipient_name, recipient_address, recipient_phone,
                 shipping_method, total, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, created_at, shipping_method, total, status
            ",
        )
        .bind(order.user_id)
        .bind(&order.recipient.name)
        .bind(&order.recipient.address)
        .bind(&order.recipient.phone)
        .bind(&order.shipping_method)
        .bind(order.total)
        .bind(OrderStatus::Pending.as_str())
        .fetch_one(&mut *self.tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                r"
                INSERT INTO shop.order_item (order_id, product_id, product_name, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(row.id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(to_i32(item.quantity, "quantity")?)
            .bind(item.unit_price)
            .execute(&mut *self.tx)
            .await?;
        }

        OrderSummary::try_from(row)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }
}
