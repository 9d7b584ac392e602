//! Cart records.

use serde::{Deserialize, Serialize};

use corner_shop_core::{CartId, CartOwner, Price, ProductId};

/// A cart row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cart {
    pub id: CartId,
    pub owner: CartOwner,
}

/// A cart line joined with the live product row.
///
/// `stock` is read at request time so clients can cap quantity pickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItemView {
    #[serde(rename = "productID")]
    pub product_id: ProductId,
    pub name: String,
    pub price: Price,
    #[serde(rename = "imageURL")]
    pub image_url: String,
    pub quantity: u32,
    pub stock: u32,
}

/// Result of folding one cart into another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartAbsorb {
    /// Products written into the target cart.
    pub merged: Vec<ProductId>,
    /// Source lines discarded because the product is out of stock or gone.
    pub dropped: Vec<ProductId>,
}
