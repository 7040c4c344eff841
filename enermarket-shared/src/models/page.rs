use serde::{Deserialize, Serialize};

pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    #[error("page must be at least 1, got {0}")]
    InvalidPage(u32),
    #[error("page size must be between 1 and 100, got {0}")]
    InvalidPageSize(u32),
}

/// One-based page coordinates requested by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Result<Self, PageError> {
        if page < 1 {
            return Err(PageError::InvalidPage(page));
        }
        if page_size < 1 || page_size > MAX_PAGE_SIZE {
            return Err(PageError::InvalidPageSize(page_size));
        }
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }

    /// Rows to fetch: one past the page so `has_next` needs no count query.
    pub fn fetch_limit(&self) -> i64 {
        i64::from(self.page_size) + 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub page: u32,
    pub page_size: u32,
    pub has_next: bool,
    pub has_prev: bool,
    pub data: Vec<T>,
}

impl<T> Page<T> {
    /// Build a page from up to `page_size + 1` rows fetched at the request's offset.
    pub fn from_overfetch(request: &PageRequest, mut rows: Vec<T>) -> Self {
        let size = request.page_size as usize;
        let has_next = rows.len() > size;
        rows.truncate(size);

        Self {
            page: request.page,
            page_size: request.page_size,
            has_next,
            has_prev: request.page > 1,
            data: rows,
        }
    }

    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            page: self.page,
            page_size: self.page_size,
            has_next: self.has_next,
            has_prev: self.has_prev,
            data: self.data.into_iter().map(f).collect(),
        }
    }
}
