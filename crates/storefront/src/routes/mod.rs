//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                          - Liveness
//! GET    /health/ready                    - Readiness (primary store)
//!
//! # Catalog
//! GET    /api/v1/products                 - Paged listing (?limit=&offset=)
//! GET    /api/v1/products/categories      - Products with every category in the body
//! GET    /api/v1/products/{id}            - Product detail
//!
//! # Cart (session user or anonymous cookie)
//! POST   /api/v1/carts/add                - Add, clamped to stock
//! POST   /api/v1/carts/update             - Set quantity, clamped to stock
//! DELETE /api/v1/carts/{productID}        - Remove one line
//! GET    /api/v1/carts                    - Show cart
//! DELETE /api/v1/carts                    - Empty cart
//!
//! # User (requires auth)
//! POST   /api/v1/user/carts/merge         - Merge the anonymous cart
//! POST   /api/v1/user/orders              - Place an order
//! GET    /api/v1/user/orders              - Order history
//! GET    /api/v1/user/orders/{id}         - Order detail
//!
//! # Admin (requires admin role)
//! POST   /api/v1/admin/products           - Create product
//! PATCH  /api/v1/admin/products/{id}      - Update product
//! DELETE /api/v1/admin/products/{id}      - Delete product
//! GET    /api/v1/admin/categories         - List categories
//! DELETE /api/v1/admin/categories/{id}    - Delete category
//! POST   /api/v1/admin/catalog/rebuild    - Force a catalog rebuild
//! ```

pub mod admin;
pub mod cart;
pub mod extract;
pub mod health;
pub mod orders;
pub mod products;

use axum::{
    Router,
    routing::{delete, get, patch, post},
};

use crate::state::AppState;

/// API version prefix; the cart cookie is scoped to it.
pub const API_PREFIX: &str = "/api/v1";

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/categories", get(products::by_categories))
        .route("/{id}", get(products::show))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/{product_id}", delete(cart::remove))
}

/// Create the logged-in user routes router.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/carts/merge", post(orders::merge_cart))
        .route("/orders", get(orders::list).post(orders::place_order))
        .route("/orders/{id}", get(orders::show))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/products", post(admin::create_product))
        .route(
            "/products/{id}",
            patch(admin::update_product).delete(admin::delete_product),
        )
        .route("/categories", get(admin::categories))
        .route("/categories/{id}", delete(admin::delete_category))
        .route("/catalog/rebuild", post(admin::rebuild_catalog))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    let api = Router::new()
        .nest("/products", product_routes())
        .nest("/carts", cart_routes())
        .nest("/user", user_routes())
        .nest("/admin", admin_routes());

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest(API_PREFIX, api)
}
