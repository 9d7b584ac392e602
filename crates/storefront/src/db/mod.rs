//! Database operations for the storefront `PostgreSQL`.
//!
//! # Schema: `shop`
//!
//! ## Tables
//!
//! - `product` - Catalog rows; `stock` is the inventory ledger
//! - `category`, `product_category` - Category tags
//! - `cart` - One row per owner (user id XOR anonymous token)
//! - `cart_item` - Unique per `(cart_id, product_id)`, positive quantity
//! - `customer_order`, `order_item` - Append-only order history
//!
//! Sessions live in `tower_sessions.session`.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p corner-shop-cli -- migrate
//! ```

pub mod carts;
pub mod orders;
pub mod products;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use corner_shop_core::{CartId, CartOwner, CategoryId, OrderId, ProductId, UserId};

pub use carts::CartRepository;
pub use orders::{OrderRepository, PgCheckoutTx};
pub use products::ProductRepository;

use crate::models::{
    Cart, CartAbsorb, CartItemView, Category, NewProduct, OrderDetail, OrderSummary, Product,
    ProductPatch,
};
use crate::store::{CartStore, CheckoutTx, OrderStore, ProductStore, Store};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate category name).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A row lock was not granted within the transaction's lock timeout.
    #[error("row lock wait timed out")]
    LockTimeout,

    /// The store refused the operation (injected fault or shut down).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Convert a non-negative count column into `u32`.
pub(crate) fn to_u32(value: i32, column: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::DataCorruption(format!("negative {column}: {value}")))
}

/// Convert a `u32` quantity into the `INTEGER` column type.
pub(crate) fn to_i32(value: u32, column: &str) -> Result<i32, RepositoryError> {
    i32::try_from(value)
        .map_err(|_| RepositoryError::Conflict(format!("{column} out of range: {value}")))
}

/// `PostgreSQL` implementation of [`Store`].
///
/// Cheap to clone; every method borrows the pool through a short-lived
/// repository.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError> {
        ProductRepository::new(&self.pool).list().await
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        ProductRepository::new(&self.pool).get(id).await
    }

    async fn count_products(&self) -> Result<u64, RepositoryError> {
        ProductRepository::new(&self.pool).count().await
    }

    async fn create_product(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        ProductRepository::new(&self.pool).create(product).await
    }

    async fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, RepositoryError> {
        ProductRepository::new(&self.pool).update(id, patch).await
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError> {
        ProductRepository::new(&self.pool).delete(id).await
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        ProductRepository::new(&self.pool).categories().await
    }

    async fn delete_category(&self, id: CategoryId) -> Result<Vec<ProductId>, RepositoryError> {
        ProductRepository::new(&self.pool).delete_category(id).await
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn find_cart(&self, owner: &CartOwner) -> Result<Option<Cart>, RepositoryError> {
        CartRepository::new(&self.pool).find(owner).await
    }

    async fn get_or_create_cart(&self, owner: &CartOwner) -> Result<Cart, RepositoryError> {
        CartRepository::new(&self.pool).get_or_create(owner).await
    }

    async fn cart_line(
        &self,
        cart: CartId,
        product: ProductId,
    ) -> Result<Option<u32>, RepositoryError> {
        CartRepository::new(&self.pool).line(cart, product).await
    }

    async fn add_to_line(
        &self,
        cart: CartId,
        product: ProductId,
        requested: u32,
        stock: u32,
    ) -> Result<u32, RepositoryError> {
        CartRepository::new(&self.pool)
            .add_to_line(cart, product, requested, stock)
            .await
    }

    async fn set_line(
        &self,
        cart: CartId,
        product: ProductId,
        quantity: u32,
    ) -> Result<bool, RepositoryError> {
        CartRepository::new(&self.pool)
            .set_line(cart, product, quantity)
            .await
    }

    async fn remove_line(&self, cart: CartId, product: ProductId) -> Result<bool, RepositoryError> {
        CartRepository::new(&self.pool)
            .remove_line(cart, product)
            .await
    }

    async fn remove_lines(
        &self,
        cart: CartId,
        products: &[ProductId],
    ) -> Result<u64, RepositoryError> {
        CartRepository::new(&self.pool)
            .remove_lines(cart, products)
            .await
    }

    async fn clear_cart(&self, cart: CartId) -> Result<u64, RepositoryError> {
        CartRepository::new(&self.pool).clear(cart).await
    }

    async fn cart_items(&self, cart: CartId) -> Result<Vec<CartItemView>, RepositoryError> {
        CartRepository::new(&self.pool).items(cart).await
    }

    async fn absorb_cart(
        &self,
        from: CartId,
        into: CartId,
    ) -> Result<CartAbsorb, RepositoryError> {
        CartRepository::new(&self.pool).absorb(from, into).await
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn begin_checkout(
        &self,
        lock_timeout: Duration,
    ) -> Result<Box<dyn CheckoutTx>, RepositoryError> {
        let tx = PgCheckoutTx::begin(&self.pool, lock_timeout).await?;
        Ok(Box::new(tx))
    }

    async fn list_orders(&self, user: UserId) -> Result<Vec<OrderSummary>, RepositoryError> {
        OrderRepository::new(&self.pool).list_for_user(user).await
    }

    async fn get_order(
        &self,
        user: UserId,
        id: OrderId,
    ) -> Result<Option<OrderDetail>, RepositoryError> {
        OrderRepository::new(&self.pool).get_for_user(user, id).await
    }
}

#[async_trait]
impl Store for PgStore {
    async fn health_check(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
