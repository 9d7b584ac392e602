//! Domain models for the storefront.
//!
//! These are the records the services exchange with the store and cache
//! layers, and (through `serde`) the JSON shapes of the HTTP API.

pub mod cart;
pub mod catalog;
pub mod order;
pub mod session;

pub use cart::{Cart, CartAbsorb, CartItemView};
pub use catalog::{Category, NewProduct, Product, ProductPage, ProductPatch};
pub use order::{
    LockedProduct, NewOrder, NewOrderItem, OrderDetail, OrderLine, OrderSummary, Recipient,
};
pub use session::{CurrentUser, keys as session_keys};
