//! Logged-in user routes: cart merge, checkout, order history.

use axum::{Json, extract::State};
use serde::Serialize;
use tracing::instrument;

use corner_shop_core::OrderId;

use super::extract::{ApiJson, ApiPath};
use crate::error::Result;
use crate::middleware::{RequireAuth, read_cart_token};
use crate::models::{OrderDetail, OrderSummary};
use crate::services::{CheckoutRequest, CleanupStatus, MergeOutcome};
use crate::state::AppState;

/// Response of `POST /user/orders`.
#[derive(Debug, Serialize)]
pub struct OrderPlaced {
    pub message: &'static str,
    pub order: OrderSummary,
    pub cleanup: CleanupStatus,
    /// Present when the order stands but the cart could not be cleaned up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderList {
    pub orders: Vec<OrderSummary>,
}

/// Fold the anonymous cart named by the cookie into the user's cart.
#[instrument(skip(state, headers), fields(user_id = %user.id))]
pub async fn merge_cart(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    headers: axum::http::HeaderMap,
) -> Result<Json<MergeOutcome>> {
    let token = read_cart_token(&headers);
    Ok(Json(state.merger().merge(user.id, token).await?))
}

/// Place an order from the submitted lines.
#[instrument(skip(state, request), fields(user_id = %user.id))]
pub async fn place_order(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(request): ApiJson<CheckoutRequest>,
) -> Result<Json<OrderPlaced>> {
    let receipt = state.checkout().place_order(user.id, &request).await?;

    let warning = match &receipt.cleanup {
        CleanupStatus::Done { .. } => None,
        CleanupStatus::Failed { reason } => Some(format!(
            "order placed but ordered items are still in the cart: {reason}"
        )),
    };

    Ok(Json(OrderPlaced {
        message: "Order placed",
        order: receipt.order,
        cleanup: receipt.cleanup,
        warning,
    }))
}

/// The caller's orders, newest first.
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<OrderList>> {
    let orders = state.orders().list(user.id).await?;
    Ok(Json(OrderList { orders }))
}

/// One of the caller's orders with its lines.
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<OrderDetail>> {
    Ok(Json(state.orders().get(user.id, id).await?))
}
