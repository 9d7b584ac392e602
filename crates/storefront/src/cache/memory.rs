//! In-process catalog cache.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use corner_shop_core::{PageRequest, ProductId};

use super::{CacheError, CatalogCache};
use crate::models::Product;

/// [`CatalogCache`] over a `BTreeMap`, ordered by product id.
///
/// [`MemoryCatalog::set_unavailable`] makes every call fail, standing in for
/// an unreachable Redis.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    entries: Arc<RwLock<BTreeMap<ProductId, Product>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable(
                "memory catalog switched off".to_owned(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogCache for MemoryCatalog {
    async fn range(&self, page: PageRequest) -> Result<Vec<Product>, CacheError> {
        self.check()?;
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect())
    }

    async fn len(&self) -> Result<u64, CacheError> {
        self.check()?;
        Ok(self.entries.read().await.len() as u64)
    }

    async fn scan(&self) -> Result<Vec<Product>, CacheError> {
        self.check()?;
        Ok(self.entries.read().await.values().cloned().collect())
    }

    async fn upsert(&self, product: &Product) -> Result<(), CacheError> {
        self.check()?;
        self.entries
            .write()
            .await
            .insert(product.id, product.clone());
        Ok(())
    }

    async fn remove(&self, id: ProductId) -> Result<(), CacheError> {
        self.check()?;
        self.entries.write().await.remove(&id);
        Ok(())
    }

    async fn replace_all(&self, products: &[Product]) -> Result<(), CacheError> {
        self.check()?;
        let mut entries = self.entries.write().await;
        *entries = products.iter().map(|p| (p.id, p.clone())).collect();
        Ok(())
    }
}
