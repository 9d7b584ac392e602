//! Catalog records.

use serde::{Deserialize, Serialize};

use corner_shop_core::{CategoryId, Price, ProductId};

/// A category tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

/// A product as stored, and as snapshotted into the catalog cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    pub stock: u32,
    pub description: String,
    #[serde(rename = "imageURL")]
    pub image_url: String,
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl Product {
    /// Whether this product carries every category in `required`.
    #[must_use]
    pub fn has_all_categories(&self, required: &[CategoryId]) -> bool {
        required
            .iter()
            .all(|id| self.categories.iter().any(|c| c.id == *id))
    }
}

/// Fields for a new product. Category names are get-or-created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub price: Price,
    pub stock: u32,
    pub description: String,
    pub image_url: String,
    pub categories: Vec<String>,
}

/// A partial product update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub price: Option<Price>,
    pub stock: Option<u32>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// Replaces the category set when present.
    pub categories: Option<Vec<String>>,
}

/// One page of a catalog listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub products: Vec<Product>,
    /// Size of the whole listing, not of this page.
    pub total_count: u64,
}
