//! Offset pagination shared by every list operation.

use serde::{Deserialize, Serialize};

/// A normalized `limit`/`offset` window.
///
/// Limits default to [`Page::DEFAULT_LIMIT`] when absent or non-positive and
/// are capped at [`Page::MAX_LIMIT`]. Negative offsets are treated as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    /// Builds a page from raw, possibly out-of-range request values.
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        let limit = match limit {
            Some(l) if l > 0 => l.min(i64::from(Self::MAX_LIMIT)) as u32,
            _ => Self::DEFAULT_LIMIT,
        };
        let offset = offset
            .filter(|o| *o > 0)
            .map(|o| o.min(i64::from(u32::MAX)) as u32)
            .unwrap_or(0);
        Self { limit, offset }
    }

    /// Returns the limit as a `usize` for slicing.
    pub fn limit_usize(&self) -> usize {
        self.limit as usize
    }

    /// Returns the offset as a `usize` for slicing.
    pub fn offset_usize(&self) -> usize {
        self.offset as usize
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}
