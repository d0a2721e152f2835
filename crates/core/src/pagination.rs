//! Page/limit handling for list endpoints.

use serde::Serialize;

/// Default page size when the client sends none.
pub const DEFAULT_LIMIT: u32 = 10;
/// Largest page size a client may request.
pub const MAX_LIMIT: u32 = 100;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageError {
    #[error("page must be at least 1")]
    Page,
    #[error("limit must be between 1 and 100")]
    Limit,
}

/// A validated page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    page: u32,
    limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Page {
    /// Validate optional query parameters, filling in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PageError`] for page 0 or a limit outside `1..=100`.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Result<Self, PageError> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if page == 0 {
            return Err(PageError::Page);
        }
        if limit == 0 || limit > MAX_LIMIT {
            return Err(PageError::Limit);
        }
        Ok(Self { page, limit })
    }

    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Rows to skip.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }

    /// Metadata for a result set with `total` rows.
    #[must_use]
    pub const fn describe(&self, total: u64) -> Paginated {
        Paginated {
            page: self.page,
            limit: self.limit,
            total,
            pages: total.div_ceil(self.limit as u64),
        }
    }

    /// Slice an in-memory list to this page.
    #[must_use]
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let start = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        items
            .iter()
            .skip(start)
            .take(self.limit as usize)
            .cloned()
            .collect()
    }
}

/// Pagination block of a list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Paginated {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let page = Page::new(None, None).unwrap();
        assert_eq!((page.page(), page.limit(), page.offset()), (1, 10, 0));
    }

    #[test]
    fn bounds() {
        assert_eq!(Page::new(Some(0), None), Err(PageError::Page));
        assert_eq!(Page::new(None, Some(0)), Err(PageError::Limit));
        assert_eq!(Page::new(None, Some(101)), Err(PageError::Limit));
        assert!(Page::new(None, Some(100)).is_ok());
    }

    #[test]
    fn pages_round_up() {
        let page = Page::new(Some(3), Some(10)).unwrap();
        assert_eq!(page.offset(), 20);
        assert_eq!(page.describe(21).pages, 3);
        assert_eq!(page.describe(0).pages, 0);
    }

    #[test]
    fn slices_in_memory_lists() {
        let items: Vec<u32> = (1..=25).collect();
        let page = Page::new(Some(3), Some(10)).unwrap();
        assert_eq!(page.slice(&items), vec![21, 22, 23, 24, 25]);
        let beyond = Page::new(Some(9), Some(10)).unwrap();
        assert!(beyond.slice(&items).is_empty());
    }
}
