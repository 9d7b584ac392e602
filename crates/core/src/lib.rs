//! Corner Shop Core - Shared domain types.
//!
//! This crate provides the types shared by every Corner Shop component:
//! - `storefront` - Cart, checkout, and catalog HTTP service
//! - `cli` - Command-line tools for migrations and catalog maintenance
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database
//! access, no cache clients. Stock clamping and paging limits live here so
//! that every store backend applies them identically.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, prices, statuses, cart identities, paging and
//!   stock rules

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
