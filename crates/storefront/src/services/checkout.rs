//! Order checkout.
//!
//! One checkout is one primary-store transaction:
//!
//! 1. validate the request (nothing is locked until it passes);
//! 2. lock every product row in ascending id order and re-read its stock;
//! 3. abort on the first product without enough stock;
//! 4. stage the decrement and snapshot the locked price into the order line;
//! 5. insert the order with the summed total and commit.
//!
//! Dropping the transaction at any step before commit rolls everything back.
//! The whole reservation runs under the configured timeout so a slow lock
//! holder cannot stall this checkout forever.
//!
//! After commit the catalog refresh is queued for the sync worker and the
//! ordered products are removed from the user's cart. Neither can undo the
//! order: a cleanup failure is reported alongside the order instead.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use corner_shop_core::{CartOwner, Price, ProductId, Quantity, UserId};

use super::ServiceError;
use crate::cache::CatalogSync;
use crate::error::add_breadcrumb;
use crate::models::{NewOrder, NewOrderItem, OrderSummary, Recipient};
use crate::store::{CheckoutTx, RepositoryError, Store};

/// A checkout request as submitted by the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub shipping_method: String,
    #[serde(default, alias = "orderItems")]
    pub items: Vec<CheckoutLine>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CheckoutLine {
    #[serde(rename = "productID")]
    pub product_id: ProductId,
    pub quantity: Quantity,
}

/// Outcome of the post-commit cart cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum CleanupStatus {
    /// Ordered lines were removed from the cart.
    Done { removed: u64 },
    /// The order stands but the cart still holds the ordered lines.
    Failed { reason: String },
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutReceipt {
    pub order: OrderSummary,
    pub cleanup: CleanupStatus,
}

#[derive(Debug)]
struct ValidatedCheckout {
    recipient: Recipient,
    shipping_method: String,
    /// Coalesced per product; iteration order is the lock order.
    lines: BTreeMap<ProductId, u32>,
}

fn required(field: &str, value: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn validate(request: &CheckoutRequest) -> Result<ValidatedCheckout, ServiceError> {
    let recipient = Recipient {
        name: required("name", &request.name)?,
        address: required("address", &request.address)?,
        phone: required("phone", &request.phone)?,
    };
    let shipping_method = required("shippingMethod", &request.shipping_method)?;

    if request.items.is_empty() {
        return Err(ServiceError::Validation(
            "items must not be empty".to_string(),
        ));
    }

    let mut lines: BTreeMap<ProductId, u32> = BTreeMap::new();
    for line in &request.items {
        let entry = lines.entry(line.product_id).or_insert(0);
        *entry = entry.checked_add(line.quantity.get()).ok_or_else(|| {
            ServiceError::Validation(format!(
                "quantity for product {} is too large",
                line.product_id
            ))
        })?;
    }

    Ok(ValidatedCheckout {
        recipient,
        shipping_method,
        lines,
    })
}

/// Places orders.
#[derive(Clone)]
pub struct CheckoutCoordinator {
    store: Arc<dyn Store>,
    sync: CatalogSync,
    timeout: Duration,
}

impl CheckoutCoordinator {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, sync: CatalogSync, timeout: Duration) -> Self {
        Self {
            store,
            sync,
            timeout,
        }
    }

    /// Reserve stock and record the order in one transaction.
    ///
    /// # Errors
    ///
    /// - `ServiceError::Validation` for missing fields or an empty item list
    /// - `ServiceError::ProductNotFound` for an unknown product
    /// - `ServiceError::InsufficientStock` when a product cannot cover its line
    /// - `ServiceError::Timeout` when the reservation exceeds the configured timeout
    /// - `ServiceError::Repository` on store failure
    ///
    /// Every error leaves stock and orders untouched.
    #[instrument(skip(self, request), fields(user_id = %user, lines = request.items.len()))]
    pub async fn place_order(
        &self,
        user: UserId,
        request: &CheckoutRequest,
    ) -> Result<CheckoutReceipt, ServiceError> {
        let checkout = validate(request)?;

        let (tx, order) = tokio::time::timeout(self.timeout, self.reserve(user, &checkout))
            .await
            .map_err(|_| ServiceError::Timeout(self.timeout))??;
        tx.commit().await?;

        info!(order_id = %order.id, total = %order.total, "Order placed");
        add_breadcrumb(
            "checkout",
            "Order placed",
            Some(&[("order_id", &order.id.to_string())]),
        );

        let products: Vec<ProductId> = checkout.lines.keys().copied().collect();
        self.sync.enqueue_refresh(products.clone());
        let cleanup = self.cleanup_cart(user, &products).await;

        Ok(CheckoutReceipt { order, cleanup })
    }

    async fn reserve(
        &self,
        user: UserId,
        checkout: &ValidatedCheckout,
    ) -> Result<(Box<dyn CheckoutTx>, OrderSummary), ServiceError> {
        let mut tx = self.store.begin_checkout(self.timeout).await?;
        let mut items = Vec::with_capacity(checkout.lines.len());

        for (&product_id, &requested) in &checkout.lines {
            let locked = tx
                .lock_product(product_id)
                .await
                .map_err(|err| match err {
                    // a lock wait past the deadline is a timeout too
                    RepositoryError::LockTimeout => ServiceError::Timeout(self.timeout),
                    other => other.into(),
                })?
                .ok_or(ServiceError::ProductNotFound(product_id))?;

            if requested > locked.stock {
                return Err(ServiceError::InsufficientStock {
                    product_id,
                    requested,
                    available: locked.stock,
                });
            }

            tx.set_stock(product_id, locked.stock - requested).await?;
            items.push(NewOrderItem {
                product_id,
                product_name: locked.name,
                quantity: requested,
                unit_price: locked.price,
            });
        }

        let total: Price = items
            .iter()
            .map(|item| item.unit_price.line_total(item.quantity))
            .sum();

        let order = tx
            .insert_order(&NewOrder {
                user_id: user,
                recipient: checkout.recipient.clone(),
                shipping_method: checkout.shipping_method.clone(),
                total,
                items,
            })
            .await?;

        Ok((tx, order))
    }

    async fn remove_ordered_lines(
        &self,
        user: UserId,
        products: &[ProductId],
    ) -> Result<u64, RepositoryError> {
        match self.store.find_cart(&CartOwner::User(user)).await? {
            Some(cart) => self.store.remove_lines(cart.id, products).await,
            None => Ok(0),
        }
    }

    async fn cleanup_cart(&self, user: UserId, products: &[ProductId]) -> CleanupStatus {
        match self.remove_ordered_lines(user, products).await {
            Ok(removed) => CleanupStatus::Done { removed },
            Err(err) => {
                warn!(user_id = %user, error = %err, "Order placed but cart cleanup failed");
                CleanupStatus::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }
}
