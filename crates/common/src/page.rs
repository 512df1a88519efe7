//! Offset pagination shared by the list queries.

use serde::{Deserialize, Serialize};

/// Default page size when the caller does not ask for one.
pub const DEFAULT_LIMIT: u32 = 10;

/// Largest page size a caller may request.
pub const MAX_LIMIT: u32 = 100;

/// A requested page. Out-of-range values are clamped by [`PageRequest::normalized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Creates a page request, clamping page and limit into range.
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }.normalized()
    }

    /// Page 0 becomes 1, limit 0 becomes [`DEFAULT_LIMIT`], limits above
    /// [`MAX_LIMIT`] are capped.
    pub fn normalized(self) -> Self {
        let page = self.page.max(1);
        let limit = match self.limit {
            0 => DEFAULT_LIMIT,
            l => l.min(MAX_LIMIT),
        };
        Self { page, limit }
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// One page of results plus the totals needed to render pagination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Builds a page from the rows of `request` and the total row count.
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        let limit = u64::from(request.limit.max(1));
        let total_pages = total.div_ceil(limit);
        Self {
            items,
            total,
            page: request.page,
            limit: request.limit,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        }
    }

    /// Maps every item, keeping the pagination totals.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
        }
    }
}
