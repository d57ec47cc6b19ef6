//! Shared pagination types for API query parameters.
//!
//! List endpoints use page-based pagination with `page` (1-based) and `page_size`.

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

use crate::config::PaginationConfig;
use crate::db::handlers::PageFilter;

/// Standard pagination parameters for list endpoints.
///
/// `page` defaults to 1 and `page_size` to the configured default. An oversized `page_size` is
/// clamped to the configured maximum; zero values are passed through and rejected by the mapper.
#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct Pagination {
    /// Page number, starting at 1
    #[param(default = 1, minimum = 1)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub page: Option<i64>,

    /// Items per page
    #[param(default = 10, minimum = 1, maximum = 100)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub page_size: Option<i64>,
}

impl Pagination {
    #[inline]
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1)
    }

    #[inline]
    pub fn page_size(&self, config: &PaginationConfig) -> i64 {
        self.page_size
            .unwrap_or(config.default_page_size as i64)
            .min(config.max_page_size as i64)
    }

    pub fn filter(&self, config: &PaginationConfig) -> PageFilter {
        PageFilter::new(self.page(), self.page_size(config))
    }
}

/// Generic paginated response wrapper for list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T: ToSchema> {
    /// The items for the current page
    pub data: Vec<T>,
    /// Total number of items in the table
    pub total_count: i64,
    pub page: i64,
    pub page_size: i64,
}

impl<T: ToSchema> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total_count: i64, filter: &PageFilter) -> Self {
        Self {
            data,
            total_count,
            page: filter.page,
            page_size: filter.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = PaginationConfig::default();
        let p = Pagination::default();
        assert_eq!(p.page(), 1);
        assert_eq!(p.page_size(&config), 10);
    }

    #[test]
    fn test_page_size_clamped_to_max() {
        let config = PaginationConfig::default();
        let p = Pagination {
            page: Some(3),
            page_size: Some(1000),
        };
        let filter = p.filter(&config);
        assert_eq!(filter.page, 3);
        assert_eq!(filter.page_size, 100);
    }

    #[test]
    fn test_zero_is_left_for_validation() {
        let config = PaginationConfig::default();
        let p = Pagination {
            page: Some(0),
            page_size: Some(0),
        };
        assert_eq!(p.page(), 0);
        assert_eq!(p.page_size(&config), 0);
    }

    #[test]
    fn test_query_strings_parse() {
        let p: Pagination = serde_json::from_value(serde_json::json!({"page": "2", "page_size": "5"})).unwrap();
        assert_eq!(p.page, Some(2));
        assert_eq!(p.page_size, Some(5));
    }
}
