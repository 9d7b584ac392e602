//! Primary store abstraction.
//!
//! The services never talk to `PostgreSQL` directly; they hold an
//! `Arc<dyn Store>` so the same workflows run against [`crate::db::PgStore`] in
//! production and [`MemoryStore`] in development and tests.
//!
//! The primary store is the only authority on stock. Checkout goes through
//! [`CheckoutTx`], which holds exclusive per-product row locks from
//! [`CheckoutTx::lock_product`] until it is committed or dropped. Dropping an
//! uncommitted transaction rolls back every staged write.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use corner_shop_core::{CartId, CartOwner, CategoryId, OrderId, ProductId, UserId};

pub use crate::db::RepositoryError;
use crate::models::{
    Cart, CartAbsorb, CartItemView, Category, LockedProduct, NewOrder, NewProduct, OrderDetail, OrderSummary,
    Product, ProductPatch,
};
pub use memory::{FailPoint, MemoryStore};

/// Product and category persistence.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Every product with its categories, ordered by id.
    async fn list_products(&self) -> Result<Vec<Product>, RepositoryError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    async fn count_products(&self) -> Result<u64, RepositoryError>;

    async fn create_product(&self, product: &NewProduct) -> Result<Product, RepositoryError>;

    /// Returns `RepositoryError::NotFound` if the product does not exist.
    async fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, RepositoryError>;

    /// Deletes the product along with its category links and cart lines.
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    async fn delete_product(&self, id: ProductId) -> Result<(), RepositoryError>;

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError>;

    /// Deletes a category and returns the products that carried it.
    ///
    /// Returns `RepositoryError::NotFound` if the category does not exist.
    async fn delete_category(&self, id: CategoryId) -> Result<Vec<ProductId>, RepositoryError>;
}

/// Cart and cart line persistence.
///
/// Line quantities are always positive; callers never write a zero line.
#[async_trait]
pub trait CartStore: Send + Sync {
    async fn find_cart(&self, owner: &CartOwner) -> Result<Option<Cart>, RepositoryError>;

    /// Returns the owner's cart, creating it if absent. Safe under concurrent
    /// calls for the same owner: at most one cart ever exists per owner.
    async fn get_or_create_cart(&self, owner: &CartOwner) -> Result<Cart, RepositoryError>;

    async fn cart_line(
        &self,
        cart: CartId,
        product: ProductId,
    ) -> Result<Option<u32>, RepositoryError>;

    /// Atomically adds `requested` units to a line, creating it if needed, and
    /// caps the stored quantity at `stock`. Returns the stored quantity.
    ///
    /// `stock` must be positive.
    async fn add_to_line(
        &self,
        cart: CartId,
        product: ProductId,
        requested: u32,
        stock: u32,
    ) -> Result<u32, RepositoryError>;

    /// Overwrites an existing line. Returns `false` if there is no such line.
    async fn set_line(
        &self,
        cart: CartId,
        product: ProductId,
        quantity: u32,
    ) -> Result<bool, RepositoryError>;

    /// Returns `false` if there was no such line.
    async fn remove_line(&self, cart: CartId, product: ProductId) -> Result<bool, RepositoryError>;

    /// Removes the given products' lines; returns how many were removed.
    async fn remove_lines(
        &self,
        cart: CartId,
        products: &[ProductId],
    ) -> Result<u64, RepositoryError>;

    /// Removes every line; returns how many were removed.
    async fn clear_cart(&self, cart: CartId) -> Result<u64, RepositoryError>;

    /// Lines joined with live product data, ordered by product id.
    async fn cart_items(&self, cart: CartId) -> Result<Vec<CartItemView>, RepositoryError>;

    /// In one atomic step: fold every line of `from` into `into`, then delete
    /// `from` and its lines.
    ///
    /// Each target line becomes `merged_quantity(live, incoming, live stock)`,
    /// computed against the rows as they are at that moment, so a concurrent
    /// add to `into` is never overwritten. Returns `RepositoryError::NotFound`
    /// if `from` is already gone.
    async fn absorb_cart(&self, from: CartId, into: CartId)
    -> Result<CartAbsorb, RepositoryError>;
}

/// Order persistence.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Open a checkout transaction. Lock waits inside it give up after
    /// `lock_timeout`.
    async fn begin_checkout(
        &self,
        lock_timeout: Duration,
    ) -> Result<Box<dyn CheckoutTx>, RepositoryError>;

    /// The user's orders, newest first.
    async fn list_orders(&self, user: UserId) -> Result<Vec<OrderSummary>, RepositoryError>;

    /// Returns `None` if the order does not exist or belongs to someone else.
    async fn get_order(
        &self,
        user: UserId,
        id: OrderId,
    ) -> Result<Option<OrderDetail>, RepositoryError>;
}

/// An open all-or-nothing checkout.
#[async_trait]
pub trait CheckoutTx: Send {
    /// Take the exclusive row lock on a product and read it under that lock.
    async fn lock_product(
        &mut self,
        id: ProductId,
    ) -> Result<Option<LockedProduct>, RepositoryError>;

    /// Stage a new stock value for a product locked by this transaction.
    async fn set_stock(&mut self, id: ProductId, stock: u32) -> Result<(), RepositoryError>;

    /// Stage the order and its lines.
    async fn insert_order(&mut self, order: &NewOrder) -> Result<OrderSummary, RepositoryError>;

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// The complete primary store.
#[async_trait]
pub trait Store: ProductStore + CartStore + OrderStore {
    /// Cheap connectivity probe for readiness checks.
    async fn health_check(&self) -> Result<(), RepositoryError>;
}
