use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u64 = 100;
pub const MAX_PAGE_SIZE: u64 = 100;
/// Highest page number honoured. Larger values are treated as this page,
/// which is past the end of any realistic result set.
pub const MAX_PAGE: u64 = u32::MAX as u64;

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl PageParams {
    /// 1-based page number clamped to `1..=MAX_PAGE` and a page size clamped
    /// to `1..=MAX_PAGE_SIZE`.
    pub fn resolve(&self) -> (u64, u64) {
        let page = self.page.unwrap_or(1).clamp(1, MAX_PAGE);
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        (page, page_size)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Builds the envelope; `next`/`previous` keep every other query
    /// parameter of the current request and only swap `page`.
    pub fn new(
        results: Vec<T>,
        count: u64,
        page: u64,
        page_size: u64,
        path: &str,
        raw_query: Option<&str>,
    ) -> Self {
        let next = (page.saturating_mul(page_size) < count).then(|| page_link(path, raw_query, page + 1));
        let previous = (page > 1).then(|| page_link(path, raw_query, page - 1));
        Self { count, next, previous, results }
    }
}

fn page_link(path: &str, raw_query: Option<&str>, page: u64) -> String {
    let mut pairs: Vec<&str> = raw_query
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split('=').next() != Some("page"))
        .collect();
    let page_pair = format!("page={page}");
    pairs.push(&page_pair);
    format!("{path}?{}", pairs.join("&"))
}
