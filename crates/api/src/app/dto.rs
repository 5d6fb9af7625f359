use axum::http::StatusCode;

use seqalign_core::{FileRecordId, PageRequest};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// Query string of `GET /align/jobs`.
///
/// `sort` may repeat (`sort=status&sort=desc`) or carry comma-separated
/// tokens (`sort=status,desc`); both flatten into one token list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobsQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort: Vec<String>,
}

impl JobsQuery {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = JobsQuery::default();
        for (key, value) in pairs {
            match key.as_str() {
                "page" => query.page = parse_count(&value),
                "size" => query.size = parse_count(&value),
                "sort" => query.sort.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string),
                ),
                _ => {}
            }
        }
        query
    }

    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.size)
    }
}

/// Non-numeric values are ignored; out-of-range ones are clamped later.
fn parse_count(raw: &str) -> Option<u32> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .map(|v| v.clamp(0, i64::from(u32::MAX)) as u32)
}

pub fn parse_file_id(raw: &str) -> Result<FileRecordId, axum::response::Response> {
    raw.parse::<FileRecordId>().map_err(|e| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_request", e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn sort_tokens_flatten_repeated_and_comma_forms() {
        let q = JobsQuery::from_pairs(pairs(&[
            ("sort", "status,asc"),
            ("sort", "createdAt"),
            ("sort", "desc"),
            ("page", "2"),
        ]));

        assert_eq!(q.sort, vec!["status", "asc", "createdAt", "desc"]);
        assert_eq!(q.page, Some(2));
        assert_eq!(q.size, None);
    }

    #[test]
    fn bad_numbers_fall_back_or_clamp() {
        let q = JobsQuery::from_pairs(pairs(&[("page", "abc"), ("size", "-5")]));
        let req = q.page_request();

        assert_eq!(req.page(), 1);
        assert_eq!(req.size(), 1);
    }

    #[test]
    fn file_ids_must_be_numeric() {
        assert_eq!(parse_file_id("12").unwrap(), FileRecordId::new(12));
        assert_eq!(parse_file_id("x1").unwrap_err().status(), StatusCode::BAD_REQUEST);
    }
}
