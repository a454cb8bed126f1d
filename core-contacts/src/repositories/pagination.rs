//! Page request and response types shared by the review queues and log listings.

use serde::{Deserialize, Serialize};

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Zero-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Page size is clamped to `1..=MAX_PAGE_SIZE`.
    ///
    /// ```
    /// use core_contacts::repositories::PageRequest;
    ///
    /// let request = PageRequest::new(2, 1000);
    /// assert_eq!(request.page_size, 500);
    /// assert_eq!(request.offset(), 1000);
    /// ```
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            page_size: 50,
        }
    }
}

/// One page of results plus the totals a review UI needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub total_pages: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        let total_pages = if request.page_size == 0 {
            0
        } else {
            total.div_ceil(u64::from(request.page_size)) as u32
        };

        Self {
            items,
            total,
            page: request.page,
            total_pages,
            page_size: request.page_size,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page + 1 < self.total_pages
    }

    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            total_pages: self.total_pages,
            page_size: self.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_clamps_size() {
        assert_eq!(PageRequest::new(0, 0).page_size, 1);
        assert_eq!(PageRequest::new(0, 20).page_size, 20);
        assert_eq!(PageRequest::new(0, 10_000).page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_offset_does_not_overflow() {
        let request = PageRequest::new(u32::MAX, MAX_PAGE_SIZE);
        assert_eq!(request.offset(), i64::from(u32::MAX) * 500);
    }

    #[test]
    fn test_page_totals() {
        let page = Page::new(vec!["a", "b"], 25, PageRequest::new(0, 10));
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next());

        let last = Page::new(vec!["z"], 25, PageRequest::new(2, 10));
        assert!(!last.has_next());
    }

    #[test]
    fn test_page_map_keeps_totals() {
        let page = Page::new(vec![1, 2], 7, PageRequest::new(1, 2)).map(|n| n * 10);
        assert_eq!(page.items, vec![10, 20]);
        assert_eq!(page.total, 7);
        assert_eq!(page.total_pages, 4);
    }
}
