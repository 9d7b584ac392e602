//! Cart behavior over HTTP: anonymous cookie, clamping, merge, auth.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::StatusCode;
use serde_json::json;

use corner_shop_core::Role;
use corner_shop_integration_tests::TestApp;
use corner_shop_storefront::middleware::CART_COOKIE_NAME;

#[tokio::test]
async fn test_first_add_mints_scoped_cookie() {
    let app = TestApp::new();
    let product = app.seed_product("scarf", "15.00", 4, &[]).await;
    let mut client = app.client();

    let first = client
        .post("/api/v1/carts/add", json!({"productID": product.id, "quantity": 1}))
        .await;
    assert_eq!(first.status, StatusCode::OK);
    let cookie = first
        .set_cookies
        .iter()
        .find(|c| c.starts_with(CART_COOKIE_NAME))
        .unwrap();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/api/v1"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(!cookie.contains("Secure"));

    let second = client
        .post("/api/v1/carts/add", json!({"productID": product.id, "quantity": 1}))
        .await;
    assert!(second.set_cookies.is_empty());
    assert_eq!(second.body["quantity"], 2);

    let cart = client.get("/api/v1/carts").await;
    assert_eq!(cart.status, StatusCode::OK);
    assert_eq!(cart.body["items"][0]["name"], "scarf");
    assert_eq!(cart.body["items"][0]["stock"], 4);
}

#[tokio::test]
async fn test_add_clamps_and_converges() {
    let app = TestApp::new();
    let product = app.seed_product("hat", "9.00", 3, &[]).await;
    let mut client = app.client();

    for _ in 0..4 {
        let response = client
            .post("/api/v1/carts/add", json!({"productID": product.id, "quantity": 2}))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.body["quantity"].as_u64().unwrap() <= 3);
    }

    let cart = client.get("/api/v1/carts").await;
    assert_eq!(cart.body["items"][0]["quantity"], 3);

    let updated = client
        .post("/api/v1/carts/update", json!({"productID": product.id, "quantity": 10}))
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["quantity"], 3);
}

#[tokio::test]
async fn test_cart_errors() {
    let app = TestApp::new();
    let product = app.seed_product("sock", "2.00", 5, &[]).await;
    let sold_out = app.seed_product("rare", "99.00", 0, &[]).await;
    let mut client = app.client();

    let no_cart = client.get("/api/v1/carts").await;
    assert_eq!(no_cart.status, StatusCode::NOT_FOUND);
    assert_eq!(client.delete("/api/v1/carts").await.status, StatusCode::NOT_FOUND);

    let update = client
        .post("/api/v1/carts/update", json!({"productID": product.id, "quantity": 1}))
        .await;
    assert_eq!(update.status, StatusCode::BAD_REQUEST);

    let out_of_stock = client
        .post("/api/v1/carts/add", json!({"productID": sold_out.id, "quantity": 1}))
        .await;
    assert_eq!(out_of_stock.status, StatusCode::BAD_REQUEST);
    assert!(out_of_stock.set_cookies.is_empty());

    let unknown = client
        .post("/api/v1/carts/add", json!({"productID": 4242, "quantity": 1}))
        .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);

    let zero = client
        .post("/api/v1/carts/add", json!({"productID": product.id, "quantity": 0}))
        .await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);
    assert_eq!(zero.body["message"], "Malformed request");

    client
        .post("/api/v1/carts/add", json!({"productID": product.id, "quantity": 1}))
        .await;
    let missing_line = client.delete(&format!("/api/v1/carts/{}", sold_out.id)).await;
    assert_eq!(missing_line.status, StatusCode::BAD_REQUEST);

    let removed = client.delete(&format!("/api/v1/carts/{}", product.id)).await;
    assert_eq!(removed.status, StatusCode::OK);
    assert_eq!(removed.body["productID"], product.id.as_i32());

    let cleared = client.delete("/api/v1/carts").await;
    assert_eq!(cleared.status, StatusCode::OK);
    assert_eq!(cleared.body["removed"], 0);
}

#[tokio::test]
async fn test_logged_in_user_without_cart() {
    let app = TestApp::new();
    let mut client = app.logged_in(5, Role::Customer).await;

    let cart = client.get("/api/v1/carts").await;
    assert_eq!(cart.status, StatusCode::OK);
    assert_eq!(cart.body["items"], json!([]));
    assert_eq!(client.delete("/api/v1/carts").await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_merge_is_idempotent() {
    let app = TestApp::new();
    let shared = app.seed_product("shared", "5.00", 4, &[]).await;
    let only_anon = app.seed_product("anon", "1.00", 10, &[]).await;

    // the user already has one of `shared`
    let mut other_device = app.logged_in(7, Role::Customer).await;
    other_device
        .post("/api/v1/carts/add", json!({"productID": shared.id, "quantity": 1}))
        .await;

    let mut client = app.client();
    client
        .post("/api/v1/carts/add", json!({"productID": shared.id, "quantity": 4}))
        .await;
    client
        .post("/api/v1/carts/add", json!({"productID": only_anon.id, "quantity": 2}))
        .await;
    assert!(client.cookie(CART_COOKIE_NAME).is_some());

    client.login(7, Role::Customer).await;
    let first = client.post("/api/v1/user/carts/merge", json!({})).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["absorbed"], true);
    let after_first = client.get("/api/v1/carts").await.body;

    let second = client.post("/api/v1/user/carts/merge", json!({})).await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body["absorbed"], false);
    let after_second = client.get("/api/v1/carts").await.body;

    assert_eq!(after_first, after_second);
    let items = after_second["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    // 1 + 4 clamped to stock 4
    assert_eq!(items[0]["quantity"], 4);
    assert_eq!(items[1]["quantity"], 2);
}

#[tokio::test]
async fn test_merge_without_cookie_is_rejected() {
    let app = TestApp::new();
    let mut client = app.logged_in(8, Role::Customer).await;

    let response = client.post("/api/v1/user/carts/merge", json!({})).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let mut anonymous = app.client();
    let unauthorized = anonymous.post("/api/v1/user/carts/merge", json!({})).await;
    assert_eq!(unauthorized.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_user_ignores_cart_cookie() {
    let app = TestApp::new();
    let product = app.seed_product("tea", "4.00", 9, &[]).await;

    let mut client = app.client();
    client
        .post("/api/v1/carts/add", json!({"productID": product.id, "quantity": 3}))
        .await;

    client.login(11, Role::Customer).await;
    let cart = client.get("/api/v1/carts").await;
    assert_eq!(cart.body["items"], json!([]));

    // the anonymous cart is untouched until an explicit merge
    client.forget_cookie("shop_session");
    let anonymous_cart = client.get("/api/v1/carts").await;
    assert_eq!(anonymous_cart.body["items"][0]["quantity"], 3);
}

#[tokio::test]
async fn test_orders_are_private() {
    let app = TestApp::new();
    let product = app.seed_product("book", "20.00", 5, &[]).await;
    let mut owner = app.logged_in(21, Role::Customer).await;

    let placed = owner
        .post(
            "/api/v1/user/orders",
            json!({
                "name": "Owner", "address": "x", "phone": "y", "shippingMethod": "z",
                "items": [{"productID": product.id, "quantity": 1}],
            }),
        )
        .await;
    assert_eq!(placed.status, StatusCode::OK);
    let id = placed.body["order"]["id"].clone();

    let mut stranger = app.logged_in(22, Role::Customer).await;
    let peek = stranger.get(&format!("/api/v1/user/orders/{id}")).await;
    assert_eq!(peek.status, StatusCode::NOT_FOUND);
    let list = stranger.get("/api/v1/user/orders").await;
    assert_eq!(list.body["orders"], json!([]));

    let mine = owner.get(&format!("/api/v1/user/orders/{id}")).await;
    assert_eq!(mine.status, StatusCode::OK);
    assert_eq!(mine.body["shippingMethod"], "z");
}
