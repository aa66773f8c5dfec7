//! Pagination metadata returned alongside list responses.

use serde::{Deserialize, Serialize};

/// Page position and totals of a seeded collection.
///
/// `total` is the server-reported record count across all pages; live creates
/// and deletes adjust it locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub page: u32,
    pub per_page: u32,
    pub pages: u32,
    pub total: u64,
}

impl PageMeta {
    pub fn new(page: u32, per_page: u32, pages: u32, total: u64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
            pages,
            total,
        }
    }

    /// Metadata for a collection that fits on a single page.
    pub fn single_page(len: usize) -> Self {
        let total = len as u64;
        Self::new(1, len.max(1) as u32, u32::from(total > 0), total)
    }

    pub fn has_next(&self) -> bool {
        self.page < self.pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub(crate) fn recompute_pages(&mut self) {
        let per_page = u64::from(self.per_page.max(1));
        self.pages = u32::try_from(self.total.div_ceil(per_page)).unwrap_or(u32::MAX);
    }

    /// Record a locally observed creation.
    pub fn increment_total(&mut self) {
        self.total = self.total.saturating_add(1);
        self.recompute_pages();
    }

    /// Record a locally observed deletion; never goes below zero.
    pub fn decrement_total(&mut self) {
        self.total = self.total.saturating_sub(1);
        self.recompute_pages();
    }
}

impl Default for PageMeta {
    fn default() -> Self {
        Self::new(1, 10, 0, 0)
    }
}
