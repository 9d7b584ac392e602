//! Order history.

use std::sync::Arc;

use tracing::instrument;

use corner_shop_core::{OrderId, UserId};

use super::ServiceError;
use crate::models::{OrderDetail, OrderSummary};
use crate::store::Store;

/// Read-only access to a user's orders.
#[derive(Clone)]
pub struct OrderHistory {
    store: Arc<dyn Store>,
}

impl OrderHistory {
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` on store failure.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn list(&self, user: UserId) -> Result<Vec<OrderSummary>, ServiceError> {
        Ok(self.store.list_orders(user).await?)
    }

    /// One order with its lines. Someone else's order reads as missing.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::OrderNotFound` if the user has no such order.
    #[instrument(skip(self), fields(user_id = %user, order_id = %id))]
    pub async fn get(&self, user: UserId, id: OrderId) -> Result<OrderDetail, ServiceError> {
        self.store
            .get_order(user, id)
            .await?
            .ok_or(ServiceError::OrderNotFound(id))
    }
}
