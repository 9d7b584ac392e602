//! Cart identity resolution.
//!
//! A request is served by exactly one cart: the user's when a session
//! principal is present, otherwise the one keyed by the anonymous token. The
//! token is never consulted for an authenticated request.

use std::sync::Arc;

use tracing::{debug, instrument};

use corner_shop_core::{AnonymousCartToken, CartOwner, UserId};

use super::ServiceError;
use crate::models::Cart;
use crate::store::Store;

/// Who is asking, as far as carts are concerned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestIdentity {
    pub user: Option<UserId>,
    pub anonymous_token: Option<AnonymousCartToken>,
}

impl RequestIdentity {
    #[must_use]
    pub const fn user(user: UserId) -> Self {
        Self {
            user: Some(user),
            anonymous_token: None,
        }
    }

    #[must_use]
    pub const fn anonymous(token: Option<AnonymousCartToken>) -> Self {
        Self {
            user: None,
            anonymous_token: token,
        }
    }

    /// The owner this request addresses, if it can name one without minting.
    #[must_use]
    pub fn owner(&self) -> Option<CartOwner> {
        match (self.user, self.anonymous_token) {
            (Some(user), _) => Some(CartOwner::User(user)),
            (None, Some(token)) => Some(CartOwner::Anonymous(token)),
            (None, None) => None,
        }
    }
}

/// A cart plus the token minted for it, which the caller must hand back to
/// the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCart {
    pub cart: Cart,
    pub minted_token: Option<AnonymousCartToken>,
}

/// Maps requests to carts.
#[derive(Clone)]
pub struct CartIdentityResolver {
    store: Arc<dyn Store>,
}

impl CartIdentityResolver {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Find or provision the request's cart.
    ///
    /// An anonymous request without a token gets a freshly minted one.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` on store failure.
    #[instrument(skip(self))]
    pub async fn resolve_or_create(
        &self,
        identity: &RequestIdentity,
    ) -> Result<ResolvedCart, ServiceError> {
        let (owner, minted_token) = match identity.owner() {
            Some(owner) => (owner, None),
            None => {
                let token = AnonymousCartToken::generate();
                debug!(token = %token, "Minted anonymous cart token");
                (CartOwner::Anonymous(token), Some(token))
            }
        };

        let cart = self.store.get_or_create_cart(&owner).await?;
        Ok(ResolvedCart { cart, minted_token })
    }

    /// Find the request's cart without creating one.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` on store failure.
    pub async fn resolve_existing(
        &self,
        identity: &RequestIdentity,
    ) -> Result<Option<Cart>, ServiceError> {
        match identity.owner() {
            Some(owner) => Ok(self.store.find_cart(&owner).await?),
            None => Ok(None),
        }
    }
}
