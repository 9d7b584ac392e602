//! Cart line operations.
//!
//! Quantities are clamped silently to the product's live stock; the caller
//! always learns the quantity actually stored. A line is never written with a
//! zero quantity, so an out-of-stock product cannot be added.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument};

use corner_shop_core::{AnonymousCartToken, ProductId, Quantity};

use super::{CartIdentityResolver, RequestIdentity, ServiceError};
use crate::models::{CartItemView, Product};
use crate::store::Store;

/// The stored state of one line after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineChange {
    #[serde(rename = "productID")]
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Result of adding to a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    pub line: LineChange,
    /// Set when this request provisioned a new anonymous cart.
    pub minted_token: Option<AnonymousCartToken>,
}

/// Cart operations for one resolved identity.
#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
    resolver: CartIdentityResolver,
}

impl CartService {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        let resolver = CartIdentityResolver::new(Arc::clone(&store));
        Self { store, resolver }
    }

    async fn in_stock_product(&self, id: ProductId) -> Result<Product, ServiceError> {
        let product = self
            .store
            .get_product(id)
            .await?
            .ok_or(ServiceError::ProductNotFound(id))?;
        if product.stock == 0 {
            return Err(ServiceError::OutOfStock(id));
        }
        Ok(product)
    }

    /// Add `quantity` units, clamped so the line never exceeds stock.
    ///
    /// The product is checked before any cart is provisioned, so a rejected
    /// add never mints a token.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::ProductNotFound` or `ServiceError::OutOfStock`.
    #[instrument(skip(self), fields(product_id = %product_id, quantity = quantity.get()))]
    pub async fn add(
        &self,
        identity: &RequestIdentity,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<AddOutcome, ServiceError> {
        let product = self.in_stock_product(product_id).await?;
        let resolved = self.resolver.resolve_or_create(identity).await?;

        let stored = self
            .store
            .add_to_line(resolved.cart.id, product_id, quantity.get(), product.stock)
            .await?;
        debug!(cart_id = %resolved.cart.id, stored, "Added to cart");

        Ok(AddOutcome {
            line: LineChange {
                product_id,
                quantity: stored,
            },
            minted_token: resolved.minted_token,
        })
    }

    /// Overwrite a line's quantity, clamped to stock.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::CartNotFound` if there is no cart yet,
    /// `ServiceError::ItemNotInCart` if the product has no line, and
    /// `ServiceError::OutOfStock` if the product's stock is zero.
    #[instrument(skip(self), fields(product_id = %product_id, quantity = quantity.get()))]
    pub async fn update(
        &self,
        identity: &RequestIdentity,
        product_id: ProductId,
        quantity: Quantity,
    ) -> Result<LineChange, ServiceError> {
        let cart = self
            .resolver
            .resolve_existing(identity)
            .await?
            .ok_or(ServiceError::CartNotFound)?;

        if self.store.cart_line(cart.id, product_id).await?.is_none() {
            return Err(ServiceError::ItemNotInCart(product_id));
        }

        let product = self.in_stock_product(product_id).await?;
        let stored = quantity.get().min(product.stock);

        if !self.store.set_line(cart.id, product_id, stored).await? {
            return Err(ServiceError::ItemNotInCart(product_id));
        }

        Ok(LineChange {
            product_id,
            quantity: stored,
        })
    }

    /// Delete one line. A missing line is an error, not a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::ItemNotInCart` if there is nothing to delete.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove(
        &self,
        identity: &RequestIdentity,
        product_id: ProductId,
    ) -> Result<ProductId, ServiceError> {
        let Some(cart) = self.resolver.resolve_existing(identity).await? else {
            return Err(ServiceError::ItemNotInCart(product_id));
        };

        if self.store.remove_line(cart.id, product_id).await? {
            Ok(product_id)
        } else {
            Err(ServiceError::ItemNotInCart(product_id))
        }
    }

    /// Delete every line. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NoAnonymousCart` for an anonymous request with no
    /// cart. A user without a cart succeeds with zero.
    #[instrument(skip(self))]
    pub async fn clear(&self, identity: &RequestIdentity) -> Result<u64, ServiceError> {
        match self.resolver.resolve_existing(identity).await? {
            Some(cart) => Ok(self.store.clear_cart(cart.id).await?),
            None if identity.user.is_some() => Ok(0),
            None => Err(ServiceError::NoAnonymousCart),
        }
    }

    /// Lines joined with live product data.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NoAnonymousCart` for an anonymous request with no
    /// cart. A user without a cart gets an empty list.
    #[instrument(skip(self))]
    pub async fn items(&self, identity: &RequestIdentity) -> Result<Vec<CartItemView>, ServiceError> {
        match self.resolver.resolve_existing(identity).await? {
            Some(cart) => Ok(self.store.cart_items(cart.id).await?),
            None if identity.user.is_some() => Ok(Vec::new()),
            None => Err(ServiceError::NoAnonymousCart),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use corner_shop_core::{Price, UserId};
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::{NewProduct, ProductPatch};
    use crate::store::{MemoryStore, ProductStore};

    async fn seeded(stock: u32) -> (MemoryStore, CartService, ProductId) {
        let store = MemoryStore::new();
        let product = store
            .create_product(&NewProduct {
                name: "Mug".to_string(),
                price: Price::new(Decimal::new(900, 2)).unwrap(),
                stock,
                description: String::new(),
                image_url: String::new(),
                categories: Vec::new(),
            })
            .await
            .unwrap();
        let service = CartService::new(Arc::new(store.clone()));
        (store, service, product.id)
    }

    fn qty(n: i64) -> Quantity {
        Quantity::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_add_clamps_and_converges() {
        let (_, service, product) = seeded(5).await;
        let user = RequestIdentity::user(UserId::new(1));

        let first = service.add(&user, product, qty(3)).await.unwrap();
        assert_eq!(first.line.quantity, 3);
        for _ in 0..3 {
            let next = service.add(&user, product, qty(3)).await.unwrap();
            assert_eq!(next.line.quantity, 5);
        }
    }

    #[tokio::test]
    async fn test_add_mints_token_once() {
        let (_, service, product) = seeded(5).await;
        let anon = RequestIdentity::anonymous(None);

        let first = service.add(&anon, product, qty(1)).await.unwrap();
        let token = first.minted_token.unwrap();

        let again = service
            .add(&RequestIdentity::anonymous(Some(token)), product, qty(1))
            .await
            .unwrap();
        assert!(again.minted_token.is_none());
        assert_eq!(again.line.quantity, 2);
    }

    #[tokio::test]
    async fn test_add_rejects_out_of_stock_and_unknown() {
        let (_, service, product) = seeded(0).await;
        let anon = RequestIdentity::anonymous(None);

        assert!(matches!(
            service.add(&anon, product, qty(1)).await,
            Err(ServiceError::OutOfStock(_))
        ));
        assert!(matches!(
            service.add(&anon, ProductId::new(99), qty(1)).await,
            Err(ServiceError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_requires_cart_and_line() {
        let (_, service, product) = seeded(5).await;
        let user = RequestIdentity::user(UserId::new(1));

        assert!(matches!(
            service.update(&user, product, qty(1)).await,
            Err(ServiceError::CartNotFound)
        ));

        service.add(&user, product, qty(1)).await.unwrap();
        assert!(matches!(
            service.update(&user, ProductId::new(42), qty(1)).await,
            Err(ServiceError::ItemNotInCart(_))
        ));
    }

    #[tokio::test]
    async fn test_update_clamps_to_current_stock() {
        let (store, service, product) = seeded(5).await;
        let user = RequestIdentity::user(UserId::new(1));
        service.add(&user, product, qty(2)).await.unwrap();

        let patch = ProductPatch {
            stock: Some(3),
            ..ProductPatch::default()
        };
        store.update_product(product, &patch).await.unwrap();

        let change = service.update(&user, product, qty(10)).await.unwrap();
        assert_eq!(change.quantity, 3);
    }

    #[tokio::test]
    async fn test_remove_missing_line_is_error() {
        let (_, service, product) = seeded(5).await;
        let user = RequestIdentity::user(UserId::new(1));

        assert!(matches!(
            service.remove(&user, product).await,
            Err(ServiceError::ItemNotInCart(_))
        ));
        service.add(&user, product, qty(1)).await.unwrap();
        assert_eq!(service.remove(&user, product).await.unwrap(), product);
        assert!(service.remove(&user, product).await.is_err());
    }

    #[tokio::test]
    async fn test_clear_and_read_without_cart() {
        let (_, service, _) = seeded(5).await;
        let user = RequestIdentity::user(UserId::new(1));
        let anon = RequestIdentity::anonymous(Some(AnonymousCartToken::generate()));

        assert_eq!(service.clear(&user).await.unwrap(), 0);
        assert!(service.items(&user).await.unwrap().is_empty());
        assert!(matches!(
            service.clear(&anon).await,
            Err(ServiceError::NoAnonymousCart)
        ));
        assert!(matches!(
            service.items(&RequestIdentity::anonymous(None)).await,
            Err(ServiceError::NoAnonymousCart)
        ));
    }

    #[tokio::test]
    async fn test_items_reflect_live_stock() {
        let (store, service, product) = seeded(5).await;
        let user = RequestIdentity::user(UserId::new(1));
        service.add(&user, product, qty(2)).await.unwrap();

        let patch = ProductPatch {
            stock: Some(4),
            ..ProductPatch::default()
        };
        store.update_product(product, &patch).await.unwrap();

        let items = service.items(&user).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].stock, 4);
        assert_eq!(items[0].quantity, 2);
    }
}
