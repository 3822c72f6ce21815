// Copyright 2023 Remi Bernotavicius

use crate::error::{AppError, AppResult};
use serde::Serialize;

pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    #[cfg(test)]
    pub fn first(limit: i64) -> Self {
        Self { page: 1, limit }
    }

    /// Reads `page` and `limit` query values, falling back to the first page of
    /// `default_limit` entries.
    pub fn parse(page: Option<&str>, limit: Option<&str>, default_limit: i64) -> AppResult<Self> {
        let page = match page {
            Some(p) => p
                .parse::<i64>()
                .ok()
                .filter(|p| *p >= 1)
                .ok_or_else(|| AppError::invalid("page", "must be a positive integer"))?,
            None => 1,
        };
        let limit = match limit {
            Some(l) => l
                .parse::<i64>()
                .ok()
                .filter(|l| (1..=MAX_PAGE_SIZE).contains(l))
                .ok_or_else(|| {
                    AppError::invalid("limit", format!("must be between 1 and {MAX_PAGE_SIZE}"))
                })?,
            None => default_limit,
        };
        if page.checked_mul(limit).is_none() {
            return Err(AppError::invalid("page", "is out of range"));
        }
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    fn has_next(&self, count: i64) -> bool {
        self.page.saturating_mul(self.limit) < count
    }
}

#[derive(Serialize, Debug)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// `path?query` with the `page` parameter replaced.
fn page_link(path: &str, query: Option<&str>, page: i64) -> String {
    let mut pairs: Vec<(String, String)> = query
        .and_then(|q| serde_urlencoded::from_str(q).ok())
        .unwrap_or_default();
    pairs.retain(|(k, _)| k != "page");
    pairs.push(("page".into(), page.to_string()));
    let query = serde_urlencoded::to_string(&pairs).unwrap_or_default();
    format!("{path}?{query}")
}

impl<T> Page<T> {
    pub fn new(
        path: &str,
        query: Option<&str>,
        request: PageRequest,
        count: i64,
        results: Vec<T>,
    ) -> Self {
        Self {
            count,
            next: request
                .has_next(count)
                .then(|| page_link(path, query, request.page + 1)),
            previous: (request.page > 1).then(|| page_link(path, query, request.page - 1)),
            results,
        }
    }
}

#[test]
fn parse_defaults_and_bounds() {
    assert_eq!(
        PageRequest::parse(None, None, 6).unwrap(),
        PageRequest { page: 1, limit: 6 }
    );
    assert_eq!(PageRequest::parse(Some("3"), Some("10"), 6).unwrap().offset(), 20);
    assert!(PageRequest::parse(Some("0"), None, 6).is_err());
    assert!(PageRequest::parse(None, Some("1000"), 6).is_err());
    assert!(PageRequest::parse(Some("x"), None, 6).is_err());
}

#[test]
fn huge_pages_are_rejected() {
    let max = i64::MAX.to_string();
    assert!(matches!(
        PageRequest::parse(Some(&max), Some("100"), 6),
        Err(AppError::Validation(fields)) if fields.contains_key("page")
    ));
    assert!(PageRequest::parse(Some(&(i64::MAX / 100).to_string()), Some("100"), 6).is_ok());

    let last = PageRequest { page: i64::MAX, limit: 2 };
    assert_eq!(last.offset(), i64::MAX);
    assert!(!last.has_next(10));
}

#[test]
fn links_keep_other_parameters() {
    let page = Page::new(
        "/api/recipes/",
        Some("tags=lunch&tags=dinner&page=2"),
        PageRequest { page: 2, limit: 2 },
        5,
        vec![(), ()],
    );
    assert_eq!(
        page.next.as_deref(),
        Some("/api/recipes/?tags=lunch&tags=dinner&page=3")
    );
    assert_eq!(
        page.previous.as_deref(),
        Some("/api/recipes/?tags=lunch&tags=dinner&page=1")
    );

    let last = Page::new("/api/users/", None, PageRequest::first(10), 3, vec![(); 3]);
    assert_eq!(last.next, None);
    assert_eq!(last.previous, None);
}
