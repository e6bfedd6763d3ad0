//! Structured access log records

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// One parsed access log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    /// Remote host (first field of the line)
    pub host: String,
    /// RFC 1413 identity, usually `-`
    pub ident: String,
    /// Authenticated user, usually `-`
    pub auth_user: String,
    /// Request time as written in the log
    pub timestamp: DateTime<FixedOffset>,
    /// HTTP method
    pub method: String,
    /// Request path without the query string
    pub path: String,
    /// Protocol, absent for HTTP/0.9 style request lines
    pub protocol: Option<String>,
    /// Response status code
    pub status: u16,
    /// Response body size; `-` in the log maps to `None`
    pub size: Option<u64>,
}

impl AccessRecord {
    /// The section of the site this request belongs to
    pub fn site_key(&self) -> Option<&str> {
        site_key(&self.path)
    }
}

/// Extract the site key (first path segment with its leading slash).
///
/// `/api/users` yields `/api`. Returns `None` for paths that do not have a
/// non-empty first segment followed by a second `/`.
pub fn site_key(path: &str) -> Option<&str> {
    if path.len() < 2 || !path.starts_with('/') {
        return None;
    }
    let end = path[1..].find('/')? + 1;
    if end == 1 {
        return None;
    }
    Some(&path[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/api/users", Some("/api"))]
    #[case("/api/", Some("/api"))]
    #[case("/pages/create/new", Some("/pages"))]
    #[case("/a/b", Some("/a"))]
    #[case("/", None)]
    #[case("", None)]
    #[case("/index.html", None)]
    #[case("//double", None)]
    #[case("api/users", None)]
    fn test_site_key(#[case] path: &str, #[case] expected: Option<&str>) {
        assert_eq!(site_key(path), expected);
    }
}
