//! Application state shared across handlers.

use std::sync::Arc;

use crate::cache::CatalogSync;
use crate::config::StorefrontConfig;
use crate::services::{
    CartIdentityResolver, CartMerger, CartService, CatalogService, CheckoutCoordinator,
    OrderHistory,
};
use crate::store::Store;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the configuration and the services built over one primary store.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    store: Arc<dyn Store>,
    identity: CartIdentityResolver,
    cart: CartService,
    merger: CartMerger,
    checkout: CheckoutCoordinator,
    orders: OrderHistory,
    catalog: CatalogService,
}

impl AppState {
    /// Wire the services over `store`, sharing one catalog sync worker.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `store` - Primary store backend
    /// * `sync` - Handle to the running catalog sync worker
    #[must_use]
    pub fn new(config: StorefrontConfig, store: Arc<dyn Store>, sync: CatalogSync) -> Self {
        let checkout = CheckoutCoordinator::new(
            Arc::clone(&store),
            sync.clone(),
            config.checkout_timeout,
        );

        Self {
            inner: Arc::new(AppStateInner {
                identity: CartIdentityResolver::new(Arc::clone(&store)),
                cart: CartService::new(Arc::clone(&store)),
                merger: CartMerger::new(Arc::clone(&store)),
                orders: OrderHistory::new(Arc::clone(&store)),
                catalog: CatalogService::new(Arc::clone(&store), sync),
                checkout,
                store,
                config,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the primary store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    #[must_use]
    pub fn identity(&self) -> &CartIdentityResolver {
        &self.inner.identity
    }

    #[must_use]
    pub fn cart(&self) -> &CartService {
        &self.inner.cart
    }

    #[must_use]
    pub fn merger(&self) -> &CartMerger {
        &self.inner.merger
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutCoordinator {
        &self.inner.checkout
    }

    #[must_use]
    pub fn orders(&self) -> &OrderHistory {
        &self.inner.orders
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }
}
