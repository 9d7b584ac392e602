//! Anonymous-to-user cart merge.
//!
//! Runs once, explicitly, after login. Calling it again with the same token
//! finds no anonymous cart and succeeds without writing, which is what makes
//! client retries after a flaky login flow safe.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use corner_shop_core::{AnonymousCartToken, CartOwner, ProductId, UserId};

use super::ServiceError;
use crate::store::{RepositoryError, Store};

/// What a merge did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOutcome {
    /// Anonymous lines folded into the user cart.
    pub merged: usize,
    /// Anonymous lines discarded because the product is out of stock.
    pub dropped: Vec<ProductId>,
    /// Whether an anonymous cart was found and absorbed.
    pub absorbed: bool,
}

/// Folds anonymous carts into user carts.
#[derive(Clone)]
pub struct CartMerger {
    store: Arc<dyn Store>,
}

impl CartMerger {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Merge the cart behind `token` into `user`'s cart, then delete it.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NothingToMerge` if the request carries no token,
    /// or `ServiceError::Repository` on store failure.
    #[instrument(skip(self, token), fields(user_id = %user))]
    pub async fn merge(
        &self,
        user: UserId,
        token: Option<AnonymousCartToken>,
    ) -> Result<MergeOutcome, ServiceError> {
        let token = token.ok_or(ServiceError::NothingToMerge)?;

        let Some(anonymous) = self
            .store
            .find_cart(&CartOwner::Anonymous(token))
            .await?
        else {
            return Ok(MergeOutcome::default());
        };

        let target = self.store.get_or_create_cart(&CartOwner::User(user)).await?;

        let absorbed = match self.store.absorb_cart(anonymous.id, target.id).await {
            Ok(absorbed) => absorbed,
            // A concurrent merge for the same token got there first
            Err(RepositoryError::NotFound) => return Ok(MergeOutcome::default()),
            Err(err) => return Err(err.into()),
        };

        info!(
            cart_id = %target.id,
            merged = absorbed.merged.len(),
            dropped = absorbed.dropped.len(),
            "Merged anonymous cart"
        );

        Ok(MergeOutcome {
            merged: absorbed.merged.len(),
            dropped: absorbed.dropped,
            absorbed: true,
        })
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use corner_shop_core::{Price, Quantity};
    use rust_decimal::Decimal;

    use super::*;
    use crate::models::NewProduct;
    use crate::services::{CartService, RequestIdentity};
    use crate::store::{CartStore, MemoryStore, ProductStore};

    async fn mug(store: &MemoryStore, stock: u32) -> ProductId {
        store
            .create_product(&NewProduct {
                name: "Mug".to_string(),
                price: Price::new(Decimal::new(900, 2)).unwrap(),
                stock,
                description: String::new(),
                image_url: String::new(),
                categories: Vec::new(),
            })
            .await
            .unwrap()
            .id
    }

    fn qty(n: i64) -> Quantity {
        Quantity::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_merge_sums_and_is_idempotent() {
        let store = MemoryStore::new();
        let product = mug(&store, 5).await;
        let cart = CartService::new(Arc::new(store.clone()));
        let merger = CartMerger::new(Arc::new(store.clone()));
        let user = UserId::new(1);

        let anon = cart
            .add(&RequestIdentity::anonymous(None), product, qty(4))
            .await
            .unwrap();
        let token = anon.minted_token;
        cart.add(&RequestIdentity::user(user), product, qty(2))
            .await
            .unwrap();

        let first = merger.merge(user, token).await.unwrap();
        assert!(first.absorbed);
        assert_eq!(first.merged, 1);
        let second = merger.merge(user, token).await.unwrap();
        assert_eq!(second, MergeOutcome::default());

        let owner = CartOwner::User(user);
        let target = store.find_cart(&owner).await.unwrap().unwrap();
        assert_eq!(store.cart_line(target.id, product).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_merge_without_token_is_rejected() {
        let merger = CartMerger::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            merger.merge(UserId::new(1), None).await,
            Err(ServiceError::NothingToMerge)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_add_survives_merge() {
        for _ in 0..100 {
            let store = MemoryStore::new();
            let product = mug(&store, 100).await;
            let cart = CartService::new(Arc::new(store.clone()));
            let merger = CartMerger::new(Arc::new(store.clone()));
            let user = UserId::new(7);

            let token = cart
                .add(&RequestIdentity::anonymous(None), product, qty(3))
                .await
                .unwrap()
                .minted_token;
            cart.add(&RequestIdentity::user(user), product, qty(2))
                .await
                .unwrap();

            let adding = {
                let cart = cart.clone();
                tokio::spawn(async move {
                    cart.add(&RequestIdentity::user(user), product, qty(10))
                        .await
                        .unwrap();
                })
            };
            let merging = {
                let merger = merger.clone();
                tokio::spawn(async move { merger.merge(user, token).await.unwrap() })
            };
            adding.await.unwrap();
            merging.await.unwrap();

            let target = store
                .find_cart(&CartOwner::User(user))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(store.cart_line(target.id, product).await.unwrap(), Some(15));
        }
    }
}
