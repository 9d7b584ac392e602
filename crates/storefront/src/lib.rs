//! Corner Shop Storefront library.
//!
//! Carts, checkout and the product catalog behind one HTTP API. The binary in
//! `main.rs` is a thin shell over [`app`]; the integration tests drive the
//! same router against the in-memory backends.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod app;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
