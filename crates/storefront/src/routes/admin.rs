//! Catalog administration.
//!
//! Every handler takes [`RequireAdmin`]. Writes commit to the primary store
//! first; the cache entry is refreshed afterwards and a cache failure never
//! fails the request.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use corner_shop_core::{CategoryId, Price, ProductId};

use super::extract::{ApiJson, ApiPath};
use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::{Category, NewProduct, Product, ProductPatch};
use crate::state::AppState;

/// Body of `POST /admin/products`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    pub price: Price,
    pub stock: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "imageURL")]
    pub image_url: String,
    /// Category names, get-or-created.
    #[serde(default)]
    pub categories: Vec<String>,
}

impl From<CreateProductRequest> for NewProduct {
    fn from(request: CreateProductRequest) -> Self {
        Self {
            name: request.name.trim().to_string(),
            price: request.price,
            stock: request.stock,
            description: request.description,
            image_url: request.image_url,
            categories: normalize_names(request.categories),
        }
    }
}

/// Body of `PATCH /admin/products/{id}`. Absent fields are left alone.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub price: Option<Price>,
    pub stock: Option<u32>,
    pub description: Option<String>,
    #[serde(rename = "imageURL")]
    pub image_url: Option<String>,
    pub categories: Option<Vec<String>>,
}

impl From<UpdateProductRequest> for ProductPatch {
    fn from(request: UpdateProductRequest) -> Self {
        Self {
            name: request.name.map(|n| n.trim().to_string()),
            price: request.price,
            stock: request.stock,
            description: request.description,
            image_url: request.image_url,
            // an empty list keeps the current tags
            categories: request
                .categories
                .map(normalize_names)
                .filter(|names| !names.is_empty()),
        }
    }
}

/// Trim, drop blanks, dedup.
fn normalize_names(names: Vec<String>) -> Vec<String> {
    let mut names: Vec<String> = names
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();
    names.sort();
    names.dedup();
    names
}

#[derive(Debug, Serialize)]
pub struct DeletedProduct {
    #[serde(rename = "productID")]
    pub product_id: ProductId,
}

#[derive(Debug, Serialize)]
pub struct CategoryList {
    pub categories: Vec<Category>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedCategory {
    #[serde(rename = "categoryID")]
    pub category_id: CategoryId,
    /// Products that carried the tag.
    pub refreshed: Vec<ProductId>,
}

#[derive(Debug, Serialize)]
pub struct RebuildResult {
    pub count: u64,
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn create_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiJson(body): ApiJson<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>)> {
    let product = state.catalog().create_product(&body.into()).await?;
    info!(product_id = %product.id, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn update_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(body): ApiJson<UpdateProductRequest>,
) -> Result<Json<Product>> {
    Ok(Json(state.catalog().update_product(id, &body.into()).await?))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn delete_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<Json<DeletedProduct>> {
    state.catalog().delete_product(id).await?;
    info!(product_id = %id, "Product deleted");
    Ok(Json(DeletedProduct { product_id: id }))
}

#[instrument(skip(state, _admin))]
pub async fn categories(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<CategoryList>> {
    let categories = state.catalog().categories().await?;
    Ok(Json(CategoryList { categories }))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn delete_category(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(id): ApiPath<CategoryId>,
) -> Result<Json<DeletedCategory>> {
    let refreshed = state.catalog().delete_category(id).await?;
    Ok(Json(DeletedCategory {
        category_id: id,
        refreshed,
    }))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn rebuild_catalog(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Json<RebuildResult>> {
    let count = state.catalog().rebuild().await?;
    info!(count, "Catalog rebuilt on request");
    Ok(Json(RebuildResult { count }))
}
