//! Checkout under concurrency: no oversell, all-or-nothing, current prices.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::StatusCode;
use serde_json::json;
use tokio::task::JoinSet;

use corner_shop_core::{ProductId, Quantity, Role, UserId};
use corner_shop_integration_tests::{TestApp, price_of};
use corner_shop_storefront::models::ProductPatch;
use corner_shop_storefront::services::{CheckoutLine, CheckoutRequest, CleanupStatus, ServiceError};
use corner_shop_storefront::store::FailPoint;

fn request(lines: &[(ProductId, i64)]) -> CheckoutRequest {
    CheckoutRequest {
        name: "Ada".to_string(),
        address: "1 Analytical Way".to_string(),
        phone: "555-0100".to_string(),
        shipping_method: "standard".to_string(),
        items: lines
            .iter()
            .map(|(product_id, quantity)| CheckoutLine {
                product_id: *product_id,
                quantity: Quantity::new(*quantity).unwrap(),
            })
            .collect(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_orders_of_three_against_stock_five() {
    let app = TestApp::new();
    let product = app.seed_product("lamp", "10.00", 5, &[]).await;

    let mut tasks = JoinSet::new();
    for user in 1..=2 {
        let checkout = app.state.checkout().clone();
        let order = request(&[(product.id, 3)]);
        tasks.spawn(async move { checkout.place_order(UserId::new(user), &order).await });
    }

    let mut placed = Vec::new();
    let mut refused = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(receipt) => placed.push(receipt),
            Err(ServiceError::InsufficientStock {
                requested,
                available,
                ..
            }) => {
                assert_eq!(requested, 3);
                assert_eq!(available, 2);
                refused += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(placed.len(), 1);
    assert_eq!(refused, 1);
    assert_eq!(placed[0].order.total, price_of("30.00"));
    assert_eq!(app.stock_of(&product).await, 2);
    assert_eq!(app.store.order_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_buyers_never_oversell() {
    let app = TestApp::new();
    let product = app.seed_product("kettle", "25.00", 7, &[]).await;

    let mut tasks = JoinSet::new();
    for user in 1..=20 {
        let checkout = app.state.checkout().clone();
        let order = request(&[(product.id, 1)]);
        tasks.spawn(async move { checkout.place_order(UserId::new(user), &order).await });
    }

    let mut sold = 0;
    while let Some(result) = tasks.join_next().await {
        if result.unwrap().is_ok() {
            sold += 1;
        }
    }

    assert_eq!(sold, 7);
    assert_eq!(app.stock_of(&product).await, 0);
    assert_eq!(app.store.order_count().await, 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_lock_orders_do_not_deadlock() {
    let app = TestApp::new();
    let a = app.seed_product("a", "1.00", 100, &[]).await;
    let b = app.seed_product("b", "1.00", 100, &[]).await;

    let mut tasks = JoinSet::new();
    for user in 1..=10 {
        let checkout = app.state.checkout().clone();
        // half list b first; locks are still taken in id order
        let order = if user % 2 == 0 {
            request(&[(a.id, 1), (b.id, 1)])
        } else {
            request(&[(b.id, 1), (a.id, 1)])
        };
        tasks.spawn(async move { checkout.place_order(UserId::new(user), &order).await });
    }

    while let Some(result) = tasks.join_next().await {
        assert!(result.unwrap().is_ok());
    }
    assert_eq!(app.stock_of(&a).await, 90);
    assert_eq!(app.stock_of(&b).await, 90);
}

#[tokio::test]
async fn test_failure_on_third_item_leaves_nothing_behind() {
    let app = TestApp::new();
    let first = app.seed_product("first", "1.00", 5, &[]).await;
    let second = app.seed_product("second", "2.00", 5, &[]).await;
    let third = app.seed_product("third", "3.00", 1, &[]).await;

    let err = app
        .state
        .checkout()
        .place_order(
            UserId::new(1),
            &request(&[(first.id, 2), (second.id, 2), (third.id, 2)]),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::InsufficientStock { product_id, .. } if product_id == third.id));
    assert_eq!(app.stock_of(&first).await, 5);
    assert_eq!(app.stock_of(&second).await, 5);
    assert_eq!(app.stock_of(&third).await, 1);
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn test_order_insert_failure_rolls_back_stock() {
    let app = TestApp::new();
    let product = app.seed_product("vase", "8.00", 4, &[]).await;
    app.store.fail_next(FailPoint::OrderInsert, 1).await;

    let result = app
        .state
        .checkout()
        .place_order(UserId::new(1), &request(&[(product.id, 2)]))
        .await;

    assert!(matches!(result, Err(ServiceError::Repository(_))));
    assert_eq!(app.stock_of(&product).await, 4);
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn test_total_uses_price_at_checkout() {
    let app = TestApp::new();
    let pen = app.seed_product("pen", "2.50", 10, &[]).await;
    let pad = app.seed_product("pad", "4.00", 10, &[]).await;

    // the shopper saw 2.50; the price changes before they check out
    app.state
        .catalog()
        .update_product(
            pen.id,
            &ProductPatch {
                price: Some(price_of("3.00")),
                ..ProductPatch::default()
            },
        )
        .await
        .unwrap();

    let receipt = app
        .state
        .checkout()
        .place_order(UserId::new(1), &request(&[(pen.id, 2), (pad.id, 3), (pen.id, 1)]))
        .await
        .unwrap();

    // 3 x 3.00 + 3 x 4.00
    assert_eq!(receipt.order.total, price_of("21.00"));
    assert_eq!(app.stock_of(&pen).await, 7);
}

#[tokio::test]
async fn test_http_checkout_reports_cleanup_failure() {
    let app = TestApp::new();
    let product = app.seed_product("plant", "12.00", 5, &[]).await;
    let mut client = app.logged_in(9, Role::Customer).await;

    let added = client
        .post(
            "/api/v1/carts/add",
            json!({"productID": product.id, "quantity": 2}),
        )
        .await;
    assert_eq!(added.status, StatusCode::OK);

    app.store.fail_next(FailPoint::CartCleanup, 1).await;
    let placed = client
        .post(
            "/api/v1/user/orders",
            json!({
                "name": "Grace",
                "address": "2 Compiler Ct",
                "phone": "555-0101",
                "shippingMethod": "express",
                "items": [{"productID": product.id, "quantity": 2}],
            }),
        )
        .await;

    assert_eq!(placed.status, StatusCode::OK);
    assert_eq!(placed.body["cleanup"]["status"], "failed");
    assert!(placed.body["warning"].is_string());
    assert_eq!(placed.body["order"]["total"], "24.00");
    assert_eq!(app.stock_of(&product).await, 3);

    // the order stands; the cart still holds the line
    let cart = client.get("/api/v1/carts").await;
    assert_eq!(cart.body["items"][0]["quantity"], 2);
}

#[tokio::test]
async fn test_http_checkout_removes_only_ordered_lines() {
    let app = TestApp::new();
    let ordered = app.seed_product("ordered", "1.00", 5, &[]).await;
    let kept = app.seed_product("kept", "1.00", 5, &[]).await;
    let mut client = app.logged_in(4, Role::Customer).await;

    for product in [&ordered, &kept] {
        client
            .post(
                "/api/v1/carts/add",
                json!({"productID": product.id, "quantity": 1}),
            )
            .await;
    }

    let placed = client
        .post(
            "/api/v1/user/orders",
            json!({
                "name": "Linus",
                "address": "3 Kernel Rd",
                "phone": "555-0102",
                "shippingMethod": "standard",
                "orderItems": [{"productID": ordered.id, "quantity": 1}],
            }),
        )
        .await;
    assert_eq!(placed.status, StatusCode::OK);
    assert_eq!(placed.body["cleanup"]["status"], "done");
    assert!(placed.body.get("warning").is_none());

    let cart = client.get("/api/v1/carts").await;
    let items = cart.body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["productID"], kept.id.as_i32());

    let orders = client.get("/api/v1/user/orders").await;
    let id = orders.body["orders"][0]["id"].clone();
    let detail = client.get(&format!("/api/v1/user/orders/{id}")).await;
    assert_eq!(detail.status, StatusCode::OK);
    assert_eq!(detail.body["items"][0]["unitPrice"], "1.00");
}

#[tokio::test]
async fn test_checkout_validation_and_auth() {
    let app = TestApp::new();
    let product = app.seed_product("cup", "3.00", 5, &[]).await;

    let mut anonymous = app.client();
    let refused = anonymous
        .post("/api/v1/user/orders", json!({"items": []}))
        .await;
    assert_eq!(refused.status, StatusCode::UNAUTHORIZED);
    assert!(refused.body["message"].is_string());

    let mut client = app.logged_in(2, Role::Customer).await;
    let missing_name = client
        .post(
            "/api/v1/user/orders",
            json!({
                "address": "x", "phone": "y", "shippingMethod": "z",
                "items": [{"productID": product.id, "quantity": 1}],
            }),
        )
        .await;
    assert_eq!(missing_name.status, StatusCode::BAD_REQUEST);

    let zero = client
        .post(
            "/api/v1/user/orders",
            json!({
                "name": "a", "address": "x", "phone": "y", "shippingMethod": "z",
                "items": [{"productID": product.id, "quantity": 0}],
            }),
        )
        .await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.stock_of(&product).await, 5);

    let missing = client.get("/api/v1/user/orders/999").await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkout_refreshes_catalog_stock() {
    let app = TestApp::new();
    let product = app.seed_product("bowl", "6.00", 5, &[]).await;
    app.sync.rebuild().await.unwrap();

    let receipt = app
        .state
        .checkout()
        .place_order(UserId::new(1), &request(&[(product.id, 4)]))
        .await
        .unwrap();
    assert!(matches!(receipt.cleanup, CleanupStatus::Done { .. }));

    app.sync.flush().await.unwrap();
    let mut client = app.client();
    let listing = client.get("/api/v1/products").await;
    assert_eq!(listing.body["products"][0]["stock"], 1);
}
