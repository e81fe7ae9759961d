//! Page parameters shared by the listing endpoints.

use serde::Serialize;

/// Page size used when a listing does not ask for one.
pub const DEFAULT_PAGE_LIMIT: usize = 10;

/// Largest page size a listing may request.
pub const MAX_PAGE_LIMIT: usize = 100;

/// Resolves optional query parameters into a 1-based page and a page size
/// clamped to `1..=MAX_PAGE_LIMIT`.
pub fn resolve(page: Option<usize>, limit: Option<usize>) -> (usize, usize) {
    (
        page.unwrap_or(1).max(1),
        limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(page: usize, limit: usize, total: u64) -> Self {
        Self {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        assert_eq!(resolve(None, None), (1, DEFAULT_PAGE_LIMIT));
        assert_eq!(resolve(Some(0), Some(1_000)), (1, MAX_PAGE_LIMIT));
        assert_eq!(resolve(Some(3), Some(0)), (3, 1));
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(Pagination::new(1, 10, 0).total_pages, 0);
        assert_eq!(Pagination::new(1, 10, 10).total_pages, 1);
        assert_eq!(Pagination::new(2, 10, 11).total_pages, 2);
    }
}
