//! Catalog reads and administration.
//!
//! Listings come from the catalog cache. A miss (empty cache or the stale
//! flag) triggers one full rebuild through the sync worker and is then
//! retried. If the cache itself is unreachable the page is served from the
//! primary store and the catalog is marked stale.
//!
//! Admin writes commit to the primary store first and then refresh the single
//! affected entry synchronously. A refresh that keeps failing leaves the
//! committed change in place; the worker marks the catalog stale instead.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use corner_shop_core::{CategoryId, PageRequest, ProductId};

use super::ServiceError;
use crate::cache::CatalogSync;
use crate::models::{Category, NewProduct, Product, ProductPage, ProductPatch};
use crate::store::{RepositoryError, Store};

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    sync: CatalogSync,
}

impl CatalogService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, sync: CatalogSync) -> Self {
        Self { store, sync }
    }

    #[must_use]
    pub const fn sync(&self) -> &CatalogSync {
        &self.sync
    }

    /// One page of the catalog in id order.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` only if the cache and the primary
    /// store both fail.
    #[instrument(skip(self), fields(limit = page.limit(), offset = page.offset()))]
    pub async fn list(&self, page: PageRequest) -> Result<ProductPage, ServiceError> {
        match self.cached_page(page).await {
            Ok(page) => Ok(page),
            Err(err) => {
                warn!(error = %err, "Catalog cache read failed, serving from store");
                self.sync.mark_stale();
                let products = self.store.list_products().await?;
                Ok(ProductPage {
                    products: page.slice(&products).to_vec(),
                    total_count: products.len() as u64,
                })
            }
        }
    }

    async fn built_len(&self) -> Result<u64, ServiceError> {
        let cached = self.sync.cache().len().await?;
        if cached == 0 || self.sync.is_stale() {
            debug!(cached, stale = self.sync.is_stale(), "Catalog miss, rebuilding");
            return Ok(self.sync.ensure_built().await?);
        }
        Ok(cached)
    }

    async fn cached_page(&self, page: PageRequest) -> Result<ProductPage, ServiceError> {
        let total_count = self.built_len().await?;
        let products = self.sync.cache().range(page).await?;
        Ok(ProductPage {
            products,
            total_count,
        })
    }

    async fn all_products(&self) -> Result<Vec<Product>, ServiceError> {
        let cached = async {
            self.built_len().await?;
            Ok::<_, ServiceError>(self.sync.cache().scan().await?)
        }
        .await;

        match cached {
            Ok(products) => Ok(products),
            Err(err) => {
                warn!(error = %err, "Catalog cache scan failed, reading store");
                self.sync.mark_stale();
                Ok(self.store.list_products().await?)
            }
        }
    }

    /// Products tagged with every one of `categories`, paged.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` if `categories` is empty or the
    /// offset lies beyond the matches.
    #[instrument(skip(self), fields(categories = categories.len()))]
    pub async fn search_by_categories(
        &self,
        categories: &[CategoryId],
        page: PageRequest,
    ) -> Result<ProductPage, ServiceError> {
        if categories.is_empty() {
            return Err(ServiceError::Validation(
                "at least one category is required".to_string(),
            ));
        }

        let matches: Vec<Product> = self
            .all_products()
            .await?
            .into_iter()
            .filter(|p| p.has_all_categories(categories))
            .collect();

        if page.offset() as usize > matches.len() {
            return Err(ServiceError::Validation(format!(
                "offset {} exceeds result size {}",
                page.offset(),
                matches.len()
            )));
        }

        Ok(ProductPage {
            products: page.slice(&matches).to_vec(),
            total_count: matches.len() as u64,
        })
    }

    /// Product detail, read through the detail cache.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::ProductNotFound` if there is no such product.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product(&self, id: ProductId) -> Result<Product, ServiceError> {
        if let Some(product) = self.sync.details().get(&id).await {
            debug!("Cache hit for product");
            return Ok(product);
        }

        let ticket = self.sync.detail_ticket();
        let product = self
            .store
            .get_product(id)
            .await?
            .ok_or(ServiceError::ProductNotFound(id))?;

        self.sync.remember_detail(ticket, product.clone()).await;
        Ok(product)
    }

    async fn write_through(&self, ids: Vec<ProductId>) {
        if let Err(err) = self.sync.refresh_and_wait(ids).await {
            warn!(error = %err, "Catalog write-through failed; catalog left stale");
        }
    }

    /// Create a product and its cache entry.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for a blank name.
    #[instrument(skip(self, product), fields(name = %product.name))]
    pub async fn create_product(&self, product: &NewProduct) -> Result<Product, ServiceError> {
        if product.name.trim().is_empty() {
            return Err(ServiceError::Validation("name is required".to_string()));
        }
        let created = self.store.create_product(product).await?;
        self.write_through(vec![created.id]).await;
        Ok(created)
    }

    /// Apply a partial update and refresh the cache entry.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::ProductNotFound` if there is no such product.
    #[instrument(skip(self, patch), fields(product_id = %id))]
    pub async fn update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, ServiceError> {
        if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ServiceError::Validation("name must not be blank".to_string()));
        }
        let updated = self
            .store
            .update_product(id, patch)
            .await
            .map_err(|err| not_found_as(err, ServiceError::ProductNotFound(id)))?;
        self.write_through(vec![id]).await;
        Ok(updated)
    }

    /// Delete a product and its cache entry.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::ProductNotFound` if there is no such product.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete_product(&self, id: ProductId) -> Result<(), ServiceError> {
        self.store
            .delete_product(id)
            .await
            .map_err(|err| not_found_as(err, ServiceError::ProductNotFound(id)))?;
        self.write_through(vec![id]).await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Repository` on store failure.
    pub async fn categories(&self) -> Result<Vec<Category>, ServiceError> {
        Ok(self.store.list_categories().await?)
    }

    /// Delete a category and refresh every product that carried it.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::CategoryNotFound` if there is no such category.
    #[instrument(skip(self), fields(category_id = %id))]
    pub async fn delete_category(&self, id: CategoryId) -> Result<Vec<ProductId>, ServiceError> {
        let affected = self
            .store
            .delete_category(id)
            .await
            .map_err(|err| not_found_as(err, ServiceError::CategoryNotFound(id)))?;
        self.write_through(affected.clone()).await;
        Ok(affected)
    }

    /// Force a full rebuild. Returns the entry count.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Sync` if the rebuild fails.
    pub async fn rebuild(&self) -> Result<u64, ServiceError> {
        Ok(self.sync.rebuild().await?)
    }
}

fn not_found_as(err: RepositoryError, replacement: ServiceError) -> ServiceError {
    match err {
        RepositoryError::NotFound => replacement,
        other => other.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use corner_shop_core::Price;
    use rust_decimal::Decimal;

    use super::*;
    use crate::cache::{CatalogCache, MemoryCatalog, SyncOptions};
    use crate::store::{MemoryStore, ProductStore};

    struct Fixture {
        store: MemoryStore,
        cache: MemoryCatalog,
        catalog: CatalogService,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let cache = MemoryCatalog::new();
        let options = SyncOptions {
            max_retries: 1,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            ..SyncOptions::default()
        };
        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let sync = CatalogSync::spawn(Arc::clone(&shared), Arc::new(cache.clone()), options);
        Fixture {
            store,
            cache,
            catalog: CatalogService::new(shared, sync),
        }
    }

    fn new_product(name: &str, categories: &[&str]) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            price: Price::new(Decimal::new(100, 2)).unwrap(),
            stock: 3,
            description: String::new(),
            image_url: String::new(),
            categories: categories.iter().map(ToString::to_string).collect(),
        }
    }

    fn page(limit: i64, offset: i64) -> PageRequest {
        PageRequest::new(Some(limit), Some(offset)).unwrap()
    }

    #[tokio::test]
    async fn test_list_rebuilds_on_empty_cache() {
        let f = fixture();
        for i in 0..12 {
            f.store
                .create_product(&new_product(&format!("p{i}"), &[]))
                .await
                .unwrap();
        }

        let listed = f.catalog.list(page(5, 10)).await.unwrap();
        assert_eq!(listed.total_count, 12);
        assert_eq!(listed.products.len(), 2);
        assert_eq!(f.cache.len().await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_list_falls_back_when_cache_down() {
        let f = fixture();
        f.store.create_product(&new_product("a", &[])).await.unwrap();
        f.cache.set_unavailable(true);

        let listed = f.catalog.list(PageRequest::default()).await.unwrap();
        assert_eq!(listed.total_count, 1);
        assert!(f.catalog.sync().is_stale());
    }

    #[tokio::test]
    async fn test_admin_writes_go_through() {
        let f = fixture();
        let created = f
            .catalog
            .create_product(&new_product("a", &["tea"]))
            .await
            .unwrap();
        assert_eq!(f.cache.len().await.unwrap(), 1);

        let patch = ProductPatch {
            stock: Some(9),
            ..ProductPatch::default()
        };
        f.catalog.update_product(created.id, &patch).await.unwrap();
        let cached = f.cache.scan().await.unwrap();
        assert_eq!(cached[0].stock, 9);

        f.catalog.delete_product(created.id).await.unwrap();
        assert_eq!(f.cache.len().await.unwrap(), 0);
        assert!(matches!(
            f.catalog.delete_product(created.id).await,
            Err(ServiceError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_search_requires_every_category() {
        let f = fixture();
        f.catalog
            .create_product(&new_product("both", &["tea", "mugs"]))
            .await
            .unwrap();
        f.catalog
            .create_product(&new_product("tea only", &["tea"]))
            .await
            .unwrap();

        let categories = f.catalog.categories().await.unwrap();
        let ids: Vec<CategoryId> = categories.iter().map(|c| c.id).collect();

        let found = f
            .catalog
            .search_by_categories(&ids, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(found.total_count, 1);
        assert_eq!(found.products[0].name, "both");

        assert!(matches!(
            f.catalog.search_by_categories(&ids, page(10, 2)).await,
            Err(ServiceError::Validation(_))
        ));
        let at_end = f.catalog.search_by_categories(&ids, page(10, 1)).await.unwrap();
        assert!(at_end.products.is_empty());
        assert!(matches!(
            f.catalog.search_by_categories(&[], PageRequest::default()).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_category_refreshes_products() {
        let f = fixture();
        let product = f
            .catalog
            .create_product(&new_product("a", &["tea"]))
            .await
            .unwrap();
        let tea = product.categories[0].id;

        let affected = f.catalog.delete_category(tea).await.unwrap();
        assert_eq!(affected, vec![product.id]);
        assert!(f.cache.scan().await.unwrap()[0].categories.is_empty());
        assert!(matches!(
            f.catalog.delete_category(tea).await,
            Err(ServiceError::CategoryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_product_detail_invalidated_by_refresh() {
        let f = fixture();
        let product = f.catalog.create_product(&new_product("a", &[])).await.unwrap();
        assert_eq!(f.catalog.product(product.id).await.unwrap().stock, 3);

        let patch = ProductPatch {
            stock: Some(1),
            ..ProductPatch::default()
        };
        f.catalog.update_product(product.id, &patch).await.unwrap();
        assert_eq!(f.catalog.product(product.id).await.unwrap().stock, 1);

        assert!(matches!(
            f.catalog.product(ProductId::new(999)).await,
            Err(ServiceError::ProductNotFound(_))
        ));
    }
}
