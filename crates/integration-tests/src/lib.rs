//! Integration test harness for Corner Shop.
//!
//! Runs the full storefront router in-process over the in-memory store and
//! catalog cache, so no database or Redis is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p corner-shop-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `checkout` - Oversell, atomicity and totals under concurrency
//! - `cart_flow` - Anonymous cookie, clamping and merge over HTTP
//! - `catalog` - Cache/store equality, write-through and fallback
//!
//! The harness adds one route the real binary lacks: `POST /test/login`
//! writes a `CurrentUser` into the session, standing in for the external
//! login service.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    routing::post,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;
use tower_sessions::{Session, cookie::Cookie};

use corner_shop_core::{Price, Role, UserId};
use corner_shop_storefront::{
    app::build_app,
    cache::{CatalogSync, MemoryCatalog, SyncOptions},
    config::StorefrontConfig,
    middleware::set_current_user,
    models::{CurrentUser, NewProduct, Product},
    routes,
    state::AppState,
    store::{MemoryStore, ProductStore},
};

/// Everything a test needs to poke at, around one running router.
pub struct TestApp {
    pub store: MemoryStore,
    pub cache: MemoryCatalog,
    pub sync: CatalogSync,
    pub state: AppState,
    router: Router,
}

async fn test_login(session: Session, Json(user): Json<CurrentUser>) -> StatusCode {
    set_current_user(&session, &user).await.unwrap();
    StatusCode::NO_CONTENT
}

impl TestApp {
    /// Must be called inside a tokio runtime; spawns the sync worker.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StorefrontConfig::in_memory())
    }

    #[must_use]
    pub fn with_config(config: StorefrontConfig) -> Self {
        let store = MemoryStore::new();
        let cache = MemoryCatalog::new();
        let options = SyncOptions {
            max_retries: 2,
            ..SyncOptions::default()
        };
        let sync = CatalogSync::spawn(
            Arc::new(store.clone()),
            Arc::new(cache.clone()),
            options,
        );
        let state = AppState::new(config, Arc::new(store.clone()), sync.clone());

        let routes = routes::routes().route("/test/login", post(test_login));
        let router = build_app(
            routes,
            state.clone(),
            tower_sessions::MemoryStore::default(),
        );

        Self {
            store,
            cache,
            sync,
            state,
            router,
        }
    }

    /// A shopper with an empty cookie jar.
    #[must_use]
    pub fn client(&self) -> TestClient {
        TestClient {
            router: self.router.clone(),
            cookies: BTreeMap::new(),
        }
    }

    /// A client already logged in as `user`.
    pub async fn logged_in(&self, user: i32, role: Role) -> TestClient {
        let mut client = self.client();
        client.login(user, role).await;
        client
    }

    /// Insert a product straight into the primary store.
    pub async fn seed_product(
        &self,
        name: &str,
        price: &str,
        stock: u32,
        categories: &[&str],
    ) -> Product {
        self.store
            .create_product(&NewProduct {
                name: name.to_string(),
                price: price_of(price),
                stock,
                description: String::new(),
                image_url: format!("/img/{name}.png"),
                categories: categories.iter().map(|c| (*c).to_string()).collect(),
            })
            .await
            .unwrap()
    }

    /// Live stock as the primary store sees it.
    pub async fn stock_of(&self, product: &Product) -> u32 {
        self.store
            .get_product(product.id)
            .await
            .unwrap()
            .map_or(0, |p| p.stock)
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use]
pub fn price_of(amount: &str) -> Price {
    Price::new(amount.parse::<Decimal>().unwrap()).unwrap()
}

/// A response with its body already read.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub set_cookies: Vec<String>,
    pub body: Value,
}

/// A cookie-carrying client over the in-process router.
#[derive(Clone)]
pub struct TestClient {
    router: Router,
    cookies: BTreeMap<String, String>,
}

impl TestClient {
    pub async fn login(&mut self, user: i32, role: Role) {
        let body = serde_json::json!({ "id": UserId::new(user), "role": role });
        let response = self.send(Method::POST, "/test/login", Some(body)).await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn forget_cookie(&mut self, name: &str) {
        self.cookies.remove(name);
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        self.send(Method::GET, uri, None).await
    }

    pub async fn delete(&mut self, uri: &str) -> TestResponse {
        self.send(Method::DELETE, uri, None).await
    }

    pub async fn post(&mut self, uri: &str, body: Value) -> TestResponse {
        self.send(Method::POST, uri, Some(body)).await
    }

    pub async fn send(&mut self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
        let mut request = Request::builder().method(method).uri(uri);

        if !self.cookies.is_empty() {
            let jar = self
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header(header::COOKIE, jar);
        }

        let request = match body {
            Some(json) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();

        let set_cookies: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        for raw in &set_cookies {
            let cookie = Cookie::parse(raw.clone()).unwrap();
            self.cookies
                .insert(cookie.name().to_string(), cookie.value().to_string());
        }

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse {
            status,
            set_cookies,
            body,
        }
    }
}
