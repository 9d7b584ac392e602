//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `identity` - Maps a request to exactly one cart owner
//! - `cart` - Cart line mutations with stock clamping
//! - `merge` - Folds an anonymous cart into a user's cart after login
//! - `checkout` - All-or-nothing order placement under row locks
//! - `orders` - Order history reads
//! - `catalog` - Cached listings, category search, admin writes
//!
//! Every service holds its dependencies explicitly (`Arc<dyn Store>`,
//! [`CatalogSync`](crate::cache::CatalogSync)); there are no globals.

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod identity;
pub mod merge;
pub mod orders;

use std::time::Duration;

use thiserror::Error;

use corner_shop_core::{CategoryId, OrderId, ProductId};

use crate::cache::{CacheError, SyncError};
use crate::store::RepositoryError;

pub use cart::{AddOutcome, CartService, LineChange};
pub use catalog::CatalogService;
pub use checkout::{CheckoutCoordinator, CheckoutLine, CheckoutReceipt, CheckoutRequest, CleanupStatus};
pub use identity::{CartIdentityResolver, RequestIdentity, ResolvedCart};
pub use merge::{CartMerger, MergeOutcome};
pub use orders::OrderHistory;

/// Coarse classification callers switch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range input. Nothing was written.
    Validation,
    /// The addressed resource does not exist.
    NotFound,
    /// The request is well-formed but the current state forbids it.
    Conflict,
    /// Store or cache failure.
    Infrastructure,
}

/// Errors from the storefront services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("cart not found")]
    CartNotFound,

    #[error("product {0} is not in the cart")]
    ItemNotInCart(ProductId),

    #[error("no anonymous cart")]
    NoAnonymousCart,

    #[error("nothing to merge")]
    NothingToMerge,

    #[error(
        "insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("product {0} is out of stock")]
    OutOfStock(ProductId),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("category {0} not found")]
    CategoryNotFound(CategoryId),

    #[error("checkout timed out after {0:?}")]
    Timeout(Duration),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("catalog sync error: {0}")]
    Sync(#[from] SyncError),
}

impl ServiceError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::NothingToMerge => ErrorKind::Validation,
            Self::CartNotFound
            | Self::ItemNotInCart(_)
            | Self::InsufficientStock { .. }
            | Self::OutOfStock(_)
            | Self::Repository(RepositoryError::Conflict(_)) => ErrorKind::Conflict,
            Self::NoAnonymousCart
            | Self::ProductNotFound(_)
            | Self::OrderNotFound(_)
            | Self::CategoryNotFound(_)
            | Self::Repository(RepositoryError::NotFound) => ErrorKind::NotFound,
            Self::Timeout(_) | Self::Repository(_) | Self::Cache(_) | Self::Sync(_) => {
                ErrorKind::Infrastructure
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ServiceError::Validation("x".to_string()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(ServiceError::NothingToMerge.kind(), ErrorKind::Validation);
        assert_eq!(
            ServiceError::ItemNotInCart(ProductId::new(1)).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            ServiceError::InsufficientStock {
                product_id: ProductId::new(1),
                requested: 3,
                available: 2,
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(ServiceError::NoAnonymousCart.kind(), ErrorKind::NotFound);
        assert_eq!(
            ServiceError::Repository(RepositoryError::NotFound).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ServiceError::Repository(RepositoryError::Unavailable("down".to_string())).kind(),
            ErrorKind::Infrastructure
        );
        assert_eq!(
            ServiceError::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::Infrastructure
        );
    }

    #[test]
    fn test_insufficient_stock_message_names_product() {
        let err = ServiceError::InsufficientStock {
            product_id: ProductId::new(7),
            requested: 3,
            available: 2,
        };
        assert_eq!(
            err.to_string(),
            "insufficient stock for product 7: requested 3, available 2"
        );
    }
}
