//! Offset/limit paging for catalog listings.

use serde::{Deserialize, Serialize};

/// Errors that can occur when building a [`PageRequest`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    /// `limit` was zero or negative.
    #[error("limit must be at least 1 (got {0})")]
    InvalidLimit(i64),
    /// `offset` was negative.
    #[error("offset cannot be negative (got {0})")]
    NegativeOffset(i64),
}

/// A validated window into an ordered listing.
///
/// `limit` defaults to [`PageRequest::DEFAULT_LIMIT`] and is silently capped at
/// [`PageRequest::MAX_LIMIT`]; `offset` defaults to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    limit: u32,
    offset: u32,
}

impl PageRequest {
    /// Page size when none is requested.
    pub const DEFAULT_LIMIT: u32 = 10;
    /// Largest page a client may ask for.
    pub const MAX_LIMIT: u32 = 50;

    /// Build a page from optional query values.
    ///
    /// # Errors
    ///
    /// Returns an error if `limit` is below 1 or `offset` is negative.
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Result<Self, PageError> {
        let limit = match limit {
            None => Self::DEFAULT_LIMIT,
            Some(l) if l < 1 => return Err(PageError::InvalidLimit(l)),
            Some(l) => u32::try_from(l).map_or(Self::MAX_LIMIT, |l| l.min(Self::MAX_LIMIT)),
        };
        let offset = match offset {
            None => 0,
            Some(o) if o < 0 => return Err(PageError::NegativeOffset(o)),
            Some(o) => u32::try_from(o).unwrap_or(u32::MAX),
        };
        Ok(Self { limit, offset })
    }

    /// Number of entries in the page.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of entries skipped before the page starts.
    #[must_use]
    pub const fn offset(&self) -> u32 {
        self.offset
    }

    /// Zero-based index of the last position covered by this page (inclusive).
    #[must_use]
    pub const fn last_index(&self) -> u64 {
        self.offset as u64 + self.limit as u64 - 1
    }

    /// Apply this page to an already ordered slice.
    #[must_use]
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = (self.offset as usize).min(items.len());
        let end = start.saturating_add(self.limit as usize).min(items.len());
        items.get(start..end).unwrap_or_default()
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}
