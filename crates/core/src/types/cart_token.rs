//! Anonymous cart tokens and cart ownership.

use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::id::UserId;

/// Errors that can occur when parsing an [`AnonymousCartToken`].
#[derive(thiserror::Error, Debug, Clone)]
pub enum CartTokenError {
    /// The token is empty.
    #[error("cart token cannot be empty")]
    Empty,
    /// The token is not a UUID.
    #[error("cart token is malformed: {0}")]
    Malformed(String),
}

/// Opaque token identifying a shopper's cart before they log in.
///
/// Minted server-side as a random UUID v4 and handed to the client in an
/// HTTP-only cookie. The token is the cart's only key, so it is never derived
/// from anything the client controls.
///
/// ## Examples
///
/// ```
/// use corner_shop_core::AnonymousCartToken;
///
/// let token = AnonymousCartToken::generate();
/// let parsed = AnonymousCartToken::parse(&token.to_string()).unwrap();
/// assert_eq!(token, parsed);
///
/// assert!(AnonymousCartToken::parse("").is_err());
/// assert!(AnonymousCartToken::parse("not-a-token").is_err());
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct AnonymousCartToken(Uuid);

impl AnonymousCartToken {
    /// Mint a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a token from its cookie value.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or not a UUID.
    pub fn parse(s: &str) -> Result<Self, CartTokenError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CartTokenError::Empty);
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| CartTokenError::Malformed(e.to_string()))
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for AnonymousCartToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl std::str::FromStr for AnonymousCartToken {
    type Err = CartTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// SQLx support (with postgres feature)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for AnonymousCartToken {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Uuid as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Uuid as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for AnonymousCartToken {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(uuid))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for AnonymousCartToken {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Uuid as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

/// The single identity a cart belongs to.
///
/// A cart is keyed by exactly one of these; there is no state in which both a
/// user and an anonymous token own the same cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum CartOwner {
    /// Cart of a logged-in user.
    User(UserId),
    /// Cart of a shopper identified only by a token.
    Anonymous(AnonymousCartToken),
}

impl CartOwner {
    /// Whether this cart belongs to an authenticated user.
    #[must_use]
    pub const fn is_user(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

impl fmt::Display for CartOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Anonymous(token) => write!(f, "anonymous:{token}"),
        }
    }
}
