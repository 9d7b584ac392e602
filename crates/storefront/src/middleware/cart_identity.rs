//! Anonymous cart cookie and the combined cart identity extractor.
//!
//! Before login a cart is addressed by an opaque token the client holds in
//! the `anonymous_cart_id` cookie. The cookie is HTTP-only and scoped to the
//! API prefix. A token that does not parse is ignored, which makes the
//! request anonymous without a cart.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, HeaderValue, header, request::Parts},
    response::Response,
};
use tower_sessions::cookie::{Cookie, SameSite, time::Duration};

use corner_shop_core::AnonymousCartToken;

use super::auth::OptionalAuth;
use crate::models::CurrentUser;
use crate::services::RequestIdentity;

/// Cookie holding the anonymous cart token.
pub const CART_COOKIE_NAME: &str = "anonymous_cart_id";

/// Path the cookie is scoped to.
pub const CART_COOKIE_PATH: &str = "/api/v1";

const CART_COOKIE_MAX_AGE_DAYS: i64 = 30;

/// The session principal plus the anonymous token, resolved per request.
#[derive(Debug, Clone, Copy)]
pub struct CartIdentity {
    pub principal: Option<CurrentUser>,
    pub identity: RequestIdentity,
}

impl<S> FromRequestParts<S> for CartIdentity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let OptionalAuth(principal) = OptionalAuth::from_request_parts(parts, state).await?;
        let identity = RequestIdentity {
            user: principal.map(|user| user.id),
            anonymous_token: read_cart_token(&parts.headers),
        };

        Ok(Self {
            principal,
            identity,
        })
    }
}

/// The anonymous cart token from the request's cookies, if present and valid.
#[must_use]
pub fn read_cart_token(headers: &HeaderMap) -> Option<AnonymousCartToken> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == CART_COOKIE_NAME)
        .and_then(|cookie| match AnonymousCartToken::parse(cookie.value()) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed cart cookie");
                None
            }
        })
}

/// Build the `Set-Cookie` value for a freshly minted token.
#[must_use]
pub fn cart_cookie(token: AnonymousCartToken, secure: bool) -> Cookie<'static> {
    Cookie::build((CART_COOKIE_NAME, token.to_string()))
        .path(CART_COOKIE_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(Duration::days(CART_COOKIE_MAX_AGE_DAYS))
        .build()
}

/// Append the cart cookie to a response when a token was minted.
pub fn attach_cart_cookie(response: &mut Response, minted: Option<AnonymousCartToken>, secure: bool) {
    let Some(token) = minted else {
        return;
    };

    match HeaderValue::from_str(&cart_cookie(token, secure).to_string()) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => tracing::error!(error = %e, "Failed to encode cart cookie"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::response::IntoResponse;

    use super::*;

    #[test]
    fn test_read_cart_token_among_other_cookies() {
        let token = AnonymousCartToken::generate();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("shop_session=abc; {CART_COOKIE_NAME}={token}"))
                .unwrap(),
        );

        assert_eq!(read_cart_token(&headers), Some(token));
    }

    #[test]
    fn test_malformed_token_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("anonymous_cart_id=not-a-uuid"),
        );
        assert_eq!(read_cart_token(&headers), None);
        assert_eq!(read_cart_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_cart_cookie_attributes() {
        let cookie = cart_cookie(AnonymousCartToken::generate(), true);
        assert_eq!(cookie.path(), Some(CART_COOKIE_PATH));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }

    #[test]
    fn test_attach_only_when_minted() {
        let mut response = ().into_response();
        attach_cart_cookie(&mut response, None, false);
        assert!(response.headers().get(header::SET_COOKIE).is_none());

        attach_cart_cookie(&mut response, Some(AnonymousCartToken::generate()), false);
        let value = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(value.starts_with("anonymous_cart_id="));
        assert!(value.contains("HttpOnly"));
    }
}
