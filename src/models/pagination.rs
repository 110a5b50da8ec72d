//! Pagination, sorting and page metadata shared by every list endpoint.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, postgres::PgRow};

use super::validation::Validator;
use crate::error::AppError;

/// Raw `?page=&page_size=&sort=` query parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: i64,

    #[serde(default = "default_page_size")]
    pub page_size: i64,

    pub sort: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
            sort: None,
        }
    }
}

/// Validated pagination/sort settings.
///
/// The sort key is only ever taken from the caller-supplied safelist, so it
/// is safe to interpolate into `ORDER BY`.
#[derive(Debug, Clone)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    sort: &'static str,
}

impl Filters {
    pub fn from_query(
        query: ListQuery,
        default_sort: &'static str,
        safelist: &'static [&'static str],
    ) -> Result<Self, AppError> {
        let mut v = Validator::new();
        v.check(query.page > 0, "page", "must be greater than zero");
        v.check(query.page <= 10_000_000, "page", "must be a maximum of 10 million");
        v.check(query.page_size > 0, "page_size", "must be greater than zero");
        v.check(query.page_size <= 100, "page_size", "must be a maximum of 100");

        let requested = query.sort.as_deref().unwrap_or(default_sort);
        let sort = safelist.iter().copied().find(|s| *s == requested);
        v.check(sort.is_some(), "sort", "invalid sort value");
        v.finish()?;

        Ok(Self {
            page: query.page,
            page_size: query.page_size,
            sort: sort.unwrap_or(default_sort),
        })
    }

    pub fn sort_column(&self) -> &'static str {
        self.sort.trim_start_matches('-')
    }

    pub fn sort_direction(&self) -> &'static str {
        if self.sort.starts_with('-') { "DESC" } else { "ASC" }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    /// `ORDER BY` clause body, always ending in `id ASC` for stable pages.
    pub fn order_by(&self) -> String {
        format!("{} {}, id ASC", self.sort_column(), self.sort_direction())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub current_page: i64,
    pub page_size: i64,
    pub first_page: i64,
    pub last_page: i64,
    pub total_records: i64,
}

impl Metadata {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 {
            return Self::default();
        }

        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}

/// Envelope returned by list endpoints.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub metadata: Metadata,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            metadata: self.metadata,
        }
    }
}

/// Build a page from rows selected with `count(*) OVER() AS total_records`.
pub fn collect_page<T>(rows: Vec<PgRow>, filters: &Filters) -> Result<Page<T>, sqlx::Error>
where
    T: for<'r> FromRow<'r, PgRow>,
{
    let total_records = match rows.first() {
        Some(row) => row.try_get::<i64, _>("total_records")?,
        None => 0,
    };

    let data = rows
        .iter()
        .map(|row| T::from_row(row))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page {
        data,
        metadata: Metadata::calculate(total_records, filters.page, filters.page_size),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAFELIST: &[&str] = &["id", "make", "created_at", "-id", "-make", "-created_at"];

    fn query(page: i64, page_size: i64, sort: Option<&str>) -> ListQuery {
        ListQuery {
            page,
            page_size,
            sort: sort.map(str::to_string),
        }
    }

    #[test]
    fn descending_sort_is_parsed_from_prefix() {
        let filters = Filters::from_query(query(2, 10, Some("-make")), "id", SAFELIST).unwrap();

        assert_eq!(filters.sort_column(), "make");
        assert_eq!(filters.sort_direction(), "DESC");
        assert_eq!(filters.order_by(), "make DESC, id ASC");
        assert_eq!(filters.limit(), 10);
        assert_eq!(filters.offset(), 10);
    }

    #[test]
    fn default_sort_applies_when_absent() {
        let filters = Filters::from_query(ListQuery::default(), "id", SAFELIST).unwrap();

        assert_eq!(filters.order_by(), "id ASC, id ASC");
        assert_eq!(filters.offset(), 0);
    }

    #[test]
    fn unknown_sort_key_is_rejected() {
        let err = Filters::from_query(query(1, 20, Some("password_hash")), "id", SAFELIST)
            .unwrap_err();

        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.get("sort"), Some("invalid sort value"));
    }

    #[test]
    fn out_of_range_page_values_are_rejected() {
        let err = Filters::from_query(query(0, 101, None), "id", SAFELIST).unwrap_err();

        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.get("page").is_some());
        assert!(errors.get("page_size").is_some());
    }

    #[test]
    fn metadata_rounds_last_page_up() {
        let metadata = Metadata::calculate(41, 3, 20);

        assert_eq!(metadata.first_page, 1);
        assert_eq!(metadata.last_page, 3);
        assert_eq!(metadata.current_page, 3);
        assert_eq!(metadata.total_records, 41);
    }

    #[test]
    fn metadata_is_empty_without_records() {
        assert_eq!(Metadata::calculate(0, 1, 20), Metadata::default());
    }
}
