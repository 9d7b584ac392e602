//! Catalog cache: a score-ordered mirror of the product table.
//!
//! Entries are keyed by product id, which doubles as the sort score, and hold
//! a serialized [`Product`] snapshot. The cache is a disposable projection;
//! [`CatalogSync`] owns every write to it and can always rebuild it from the
//! primary store.
//!
//! # Backends
//!
//! - [`RedisCatalog`] - a Redis sorted set (`ZADD`/`ZRANGE`/`ZCARD`)
//! - [`MemoryCatalog`] - an in-process ordered map for development and tests

pub mod memory;
pub mod redis;
pub mod sync;

use async_trait::async_trait;
use thiserror::Error;

use corner_shop_core::{PageRequest, ProductId};

use crate::models::Product;

pub use memory::MemoryCatalog;
pub use self::redis::RedisCatalog;
pub use sync::{CatalogSync, DetailTicket, SyncError, SyncOptions};

/// Errors from the catalog cache backends.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis command or connection failure.
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// A cached snapshot could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The cache refused the operation.
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Ordered product snapshots addressable by position.
#[async_trait]
pub trait CatalogCache: Send + Sync {
    /// Entries at positions `offset..offset + limit` in id order.
    async fn range(&self, page: PageRequest) -> Result<Vec<Product>, CacheError>;

    /// Number of entries.
    async fn len(&self) -> Result<u64, CacheError>;

    /// Every entry in id order.
    async fn scan(&self) -> Result<Vec<Product>, CacheError>;

    /// Insert or replace the entry for `product.id`.
    async fn upsert(&self, product: &Product) -> Result<(), CacheError>;

    /// Remove the entry for `id`; absent entries are ignored.
    async fn remove(&self, id: ProductId) -> Result<(), CacheError>;

    /// Wipe the structure and insert `products`.
    async fn replace_all(&self, products: &[Product]) -> Result<(), CacheError>;
}
