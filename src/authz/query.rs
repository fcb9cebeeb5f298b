/// Bounded list/filter/sort/paginate contract
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hard ceiling for page size; larger requests are clamped, not rejected
pub const MAX_PAGE_SIZE: i64 = 100;

/// Default page size when the caller sends nothing usable
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Maximum accepted search string length
pub const MAX_SEARCH_LEN: usize = 100;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Allowed sort keys for email lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmailSortKey {
    #[default]
    ReceivedAt,
    Size,
}

impl EmailSortKey {
    pub fn as_column(self) -> &'static str {
        match self {
            EmailSortKey::ReceivedAt => "received_at",
            EmailSortKey::Size => "size_bytes",
        }
    }
}

/// Email list filter set. Everything is optional; bounds are enforced by
/// [`EmailQuery::normalized`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub alias_id: Option<Uuid>,
    pub search: Option<String>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub is_read: Option<bool>,
    pub has_attachments: Option<bool>,
    #[serde(default)]
    pub sort: EmailSortKey,
    #[serde(default)]
    pub order: SortOrder,
}

impl EmailQuery {
    /// Clamp page/limit into their legal ranges and bound the search term.
    /// Out-of-range values are corrected rather than rejected.
    pub fn normalized(mut self) -> Self {
        self.page = Some(effective_page(self.page));
        self.limit = Some(effective_limit(self.limit));
        if let Some(s) = &self.search {
            let trimmed: String = s.chars().take(MAX_SEARCH_LEN).collect();
            self.search = if trimmed.is_empty() { None } else { Some(trimmed) };
        }
        self
    }

    pub fn effective_page(&self) -> i64 {
        effective_page(self.page)
    }

    pub fn effective_limit(&self) -> i64 {
        effective_limit(self.limit)
    }

    /// OFFSET for the normalized page
    pub fn offset(&self) -> i64 {
        (self.effective_page() - 1) * self.effective_limit()
    }
}

/// `page ≤ 0` (or absent) falls back to 1
pub fn effective_page(page: Option<i64>) -> i64 {
    match page {
        Some(p) if p >= 1 => p,
        _ => 1,
    }
}

/// `limit` is clamped into [1, 100]; `limit ≤ 0` (or absent) falls back to 20
pub fn effective_limit(limit: Option<i64>) -> i64 {
    match limit {
        Some(l) if l >= 1 => l.min(MAX_PAGE_SIZE),
        _ => DEFAULT_PAGE_SIZE,
    }
}

/// Pagination envelope returned with every list response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: i64,
    pub per_page: i64,
    pub total_pages: i64,
    pub total_count: i64,
}

impl Pagination {
    /// `total_pages = max(1, ceil(total_count / per_page))`
    pub fn new(total_count: i64, page: Option<i64>, limit: Option<i64>) -> Self {
        let per_page = effective_limit(limit);
        let current_page = effective_page(page);
        let total_pages = std::cmp::max(1, (total_count + per_page - 1) / per_page);
        Self {
            current_page,
            per_page,
            total_pages,
            total_count,
        }
    }

    /// Number of items the current page can hold given the total
    pub fn items_on_page(&self) -> i64 {
        let remaining = self.total_count - (self.current_page - 1) * self.per_page;
        remaining.clamp(0, self.per_page)
    }
}

/// A page of items plus its pagination envelope
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_clamping() {
        assert_eq!(effective_limit(None), 20);
        assert_eq!(effective_limit(Some(0)), 20);
        assert_eq!(effective_limit(Some(-5)), 20);
        assert_eq!(effective_limit(Some(1)), 1);
        assert_eq!(effective_limit(Some(100)), 100);
        assert_eq!(effective_limit(Some(200)), 100);
    }

    #[test]
    fn test_page_floor() {
        assert_eq!(effective_page(None), 1);
        assert_eq!(effective_page(Some(0)), 1);
        assert_eq!(effective_page(Some(-3)), 1);
        assert_eq!(effective_page(Some(7)), 7);
    }

    #[test]
    fn test_pagination_arithmetic() {
        let p = Pagination::new(150, Some(3), Some(200));
        assert_eq!(p.per_page, 100);
        assert_eq!(p.total_pages, 2);
        assert_eq!(p.items_on_page(), 0);

        let p = Pagination::new(0, Some(1), Some(20));
        assert_eq!(p.total_pages, 1);
        assert_eq!(p.items_on_page(), 0);

        let p = Pagination::new(45, Some(3), Some(20));
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.items_on_page(), 5);

        let p = Pagination::new(100, Some(1), Some(100));
        assert_eq!(p.total_pages, 1);
        assert_eq!(p.items_on_page(), 100);
    }

    #[test]
    fn test_search_bounding() {
        let q = EmailQuery {
            search: Some("x".repeat(500)),
            ..Default::default()
        }
        .normalized();
        assert_eq!(q.search.unwrap().len(), MAX_SEARCH_LEN);

        let q = EmailQuery {
            search: Some(String::new()),
            ..Default::default()
        }
        .normalized();
        assert!(q.search.is_none());
    }

    #[test]
    fn test_sort_key_columns() {
        assert_eq!(EmailSortKey::ReceivedAt.as_column(), "received_at");
        assert_eq!(EmailSortKey::Size.as_column(), "size_bytes");
        assert_eq!(SortOrder::Asc.as_sql(), "ASC");
    }
}
