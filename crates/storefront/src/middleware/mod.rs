//! HTTP middleware stack for the storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (opens the `http_request` span)
//! 3. Request ID (records the id on that span)
//! 4. Session layer (tower-sessions)
//!
//! Authentication and cart identity are extractors rather than layers, so
//! each route states what it needs in its signature.

pub mod auth;
pub mod cart_identity;
pub mod request_id;
pub mod session;

pub use auth::{
    AuthRejection, OptionalAuth, RequireAdmin, RequireAuth, clear_current_user, set_current_user,
};
pub use cart_identity::{CART_COOKIE_NAME, CartIdentity, attach_cart_cookie, read_cart_token};
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
pub use session::create_session_layer;
