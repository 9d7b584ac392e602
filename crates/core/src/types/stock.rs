//! Stock clamping rules shared by every cart backend.
//!
//! Adding to a cart never fails because the shopper asked for more than is on
//! the shelf: the stored quantity is silently capped at the product's current
//! stock. These functions are the single definition of that cap.

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    /// The quantity is zero or negative.
    #[error("quantity must be at least 1 (got {0})")]
    NotPositive(i64),
    /// The quantity does not fit the stock column.
    #[error("quantity must be at most {max} (got {got})")]
    TooLarge {
        /// Largest accepted quantity.
        max: u32,
        /// Value supplied.
        got: i64,
    },
}

/// A strictly positive number of units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// Largest quantity accepted on any request (the stock column is `INTEGER`).
    pub const MAX: u32 = 2_147_483_647;

    /// Parse a quantity from a request value.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is below 1 or above [`Quantity::MAX`].
    pub fn new(value: i64) -> Result<Self, QuantityError> {
        if value < 1 {
            return Err(QuantityError::NotPositive(value));
        }
        u32::try_from(value)
            .ok()
            .filter(|v| *v <= Self::MAX)
            .map(Self)
            .ok_or(QuantityError::TooLarge {
                max: Self::MAX,
                got: value,
            })
    }

    /// The number of units.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

/// Quantity to store after asking for `requested` more units.
///
/// `existing` is the quantity already in the cart line, if any. The result is
/// `min(existing + requested, stock)`; it is zero only when `stock` is zero.
#[must_use]
pub fn clamp_to_stock(existing: Option<u32>, requested: u32, stock: u32) -> u32 {
    existing
        .unwrap_or(0)
        .saturating_add(requested)
        .min(stock)
}

/// Quantity a user cart line holds after folding in `incoming` anonymous units.
///
/// Sums and caps at `stock`, but never returns less than `existing`: a merge
/// only ever grows the user's line, even if stock has since dropped below it.
#[must_use]
pub fn merged_quantity(existing: u32, incoming: u32, stock: u32) -> u32 {
    clamp_to_stock(Some(existing), incoming, stock).max(existing)
}
