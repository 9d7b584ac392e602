//! Wiring shared by the server binary, the CLI and the integration tests.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    http::{Method, header},
};
use sqlx::PgPool;
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tower_sessions::SessionStore;
use tracing::Span;

use crate::cache::{CacheError, CatalogCache, MemoryCatalog, RedisCatalog};
use crate::config::{CacheBackend, CatalogConfig, StoreBackend, StorefrontConfig};
use crate::db::{self, PgStore};
use crate::middleware::{create_session_layer, request_id_middleware};
use crate::state::AppState;
use crate::store::{MemoryStore, Store};

/// Errors raised while connecting the backends at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("catalog cache connection failed: {0}")]
    Cache(#[from] CacheError),

    #[error("{0}")]
    Config(String),
}

/// The primary store, plus the pool behind it when it is Postgres.
pub struct PrimaryStore {
    pub store: Arc<dyn Store>,
    pub pool: Option<PgPool>,
}

/// Connect the configured primary store.
///
/// # Errors
///
/// Returns `StartupError` if Postgres is selected and unreachable.
pub async fn connect_store(config: &StorefrontConfig) -> Result<PrimaryStore, StartupError> {
    match config.store {
        StoreBackend::Postgres => {
            let url = config.database_url.as_ref().ok_or_else(|| {
                StartupError::Config("postgres store selected without a database URL".to_string())
            })?;
            let pool = db::create_pool(url).await?;
            tracing::info!("Database pool created");
            Ok(PrimaryStore {
                store: Arc::new(PgStore::new(pool.clone())),
                pool: Some(pool),
            })
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Ok(PrimaryStore {
                store: Arc::new(MemoryStore::new()),
                pool: None,
            })
        }
    }
}

/// Connect the configured catalog cache.
///
/// # Errors
///
/// Returns `StartupError` if Redis is selected and unreachable.
pub async fn connect_cache(config: &CatalogConfig) -> Result<Arc<dyn CatalogCache>, StartupError> {
    match config.backend {
        CacheBackend::Redis => {
            let url = config.redis_url.as_ref().ok_or_else(|| {
                StartupError::Config("redis cache selected without a Redis URL".to_string())
            })?;
            Ok(Arc::new(RedisCatalog::connect(url, &config.key).await?))
        }
        CacheBackend::Memory => Ok(Arc::new(MemoryCatalog::new())),
    }
}

/// Allow browser clients on any origin to send the session and cart cookies.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(3600))
}

/// Attach state and the middleware stack to `routes`.
///
/// Sentry wraps everything, then the trace span, then the request id (so the
/// id lands on that span), then sessions.
pub fn build_app<S>(routes: Router<AppState>, state: AppState, session_store: S) -> Router
where
    S: SessionStore + Clone,
{
    let session_layer = create_session_layer(session_store, state.config());

    routes
        .layer(session_layer)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .layer(cors_layer())
        .with_state(state)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
