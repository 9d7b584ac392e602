//! Core types for Corner Shop.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart_token;
pub mod id;
pub mod paging;
pub mod price;
pub mod status;
pub mod stock;

pub use cart_token::{AnonymousCartToken, CartOwner, CartTokenError};
pub use id::*;
pub use paging::{PageError, PageRequest};
pub use price::{Price, PriceError};
pub use status::*;
pub use stock::{Quantity, QuantityError, clamp_to_stock, merged_quantity};
