//! Page requests and the page envelope returned by history queries.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 1000;

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    page: u32,
    size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Missing values take defaults; `page` is clamped to `>= 1` and `size`
    /// to `1..=MAX_PAGE_SIZE`.
    pub fn new(page: Option<u32>, size: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(DEFAULT_PAGE).max(1),
            size: size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.size)
    }
}

/// Page envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResponse<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_pages: u64,
    pub total_elements: u64,
    pub first: bool,
    pub last: bool,
    pub number_of_elements: usize,
}

impl<T> PagedResponse<T> {
    pub fn of(content: Vec<T>, request: PageRequest, total_elements: u64) -> Self {
        let total_pages = total_elements.div_ceil(u64::from(request.size));
        Self {
            number_of_elements: content.len(),
            content,
            page: request.page,
            size: request.size,
            total_pages,
            total_elements,
            first: request.page == 1,
            last: u64::from(request.page) >= total_pages,
        }
    }

    pub fn empty(request: PageRequest) -> Self {
        Self::of(Vec::new(), request, 0)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResponse<U> {
        PagedResponse {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_pages: self.total_pages,
            total_elements: self.total_elements,
            first: self.first,
            last: self.last,
            number_of_elements: self.number_of_elements,
        }
    }
}
