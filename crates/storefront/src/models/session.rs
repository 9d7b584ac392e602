//! Session-related types.
//!
//! The login service that authenticates shoppers writes [`CurrentUser`] into
//! the session; this crate only reads it.

use serde::{Deserialize, Serialize};

use corner_shop_core::{Role, UserId};

/// Session-stored principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's database ID.
    pub id: UserId,
    /// What the user may do.
    #[serde(default)]
    pub role: Role,
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";
}
