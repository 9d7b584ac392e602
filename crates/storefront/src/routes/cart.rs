//! Cart route handlers.
//!
//! Every cart route serves both shoppers: a logged-in user's cart is found
//! through the session, an anonymous one through the `anonymous_cart_id`
//! cookie. The first add without either mints the cookie.

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use corner_shop_core::{ProductId, Quantity};

use super::extract::{ApiJson, ApiPath};
use crate::error::Result;
use crate::middleware::{CartIdentity, attach_cart_cookie};
use crate::models::CartItemView;
use crate::services::LineChange;
use crate::state::AppState;

/// Body of `POST /carts/add` and `POST /carts/update`.
#[derive(Debug, Deserialize)]
pub struct LineRequest {
    #[serde(rename = "productID")]
    pub product_id: ProductId,
    pub quantity: Quantity,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub items: Vec<CartItemView>,
}

#[derive(Debug, Serialize)]
pub struct RemovedLine {
    #[serde(rename = "productID")]
    pub product_id: ProductId,
}

#[derive(Debug, Serialize)]
pub struct ClearedCart {
    pub removed: u64,
}

/// Add to cart, provisioning an anonymous cart when needed.
#[instrument(skip(state, identity, body))]
pub async fn add(
    State(state): State<AppState>,
    CartIdentity { identity, .. }: CartIdentity,
    ApiJson(body): ApiJson<LineRequest>,
) -> Result<Response> {
    let outcome = state
        .cart()
        .add(&identity, body.product_id, body.quantity)
        .await?;

    let mut response = Json(outcome.line).into_response();
    attach_cart_cookie(
        &mut response,
        outcome.minted_token,
        state.config().secure_cookies(),
    );
    Ok(response)
}

/// Overwrite a line's quantity.
#[instrument(skip(state, identity, body))]
pub async fn update(
    State(state): State<AppState>,
    CartIdentity { identity, .. }: CartIdentity,
    ApiJson(body): ApiJson<LineRequest>,
) -> Result<Json<LineChange>> {
    let line = state
        .cart()
        .update(&identity, body.product_id, body.quantity)
        .await?;
    Ok(Json(line))
}

/// Delete one line.
#[instrument(skip(state, identity))]
pub async fn remove(
    State(state): State<AppState>,
    CartIdentity { identity, .. }: CartIdentity,
    ApiPath(product_id): ApiPath<ProductId>,
) -> Result<Json<RemovedLine>> {
    let product_id = state.cart().remove(&identity, product_id).await?;
    Ok(Json(RemovedLine { product_id }))
}

/// Show the cart with live product data.
#[instrument(skip(state, identity))]
pub async fn show(
    State(state): State<AppState>,
    CartIdentity { identity, .. }: CartIdentity,
) -> Result<Json<CartResponse>> {
    let items = state.cart().items(&identity).await?;
    Ok(Json(CartResponse { items }))
}

/// Empty the cart.
#[instrument(skip(state, identity))]
pub async fn clear(
    State(state): State<AppState>,
    CartIdentity { identity, .. }: CartIdentity,
) -> Result<Json<ClearedCart>> {
    let removed = state.cart().clear(&identity).await?;
    Ok(Json(ClearedCart { removed }))
}
