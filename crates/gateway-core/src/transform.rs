//! Header and path transformation.
//!
//! Header operations always apply in the order remove → set → add, with
//! case-insensitive name matching for `remove`/`add` existence checks.

use crate::models::{HeaderOps, PathRewrite};
use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};
use regex::Regex;
use std::str::FromStr;

pub fn apply_header_ops(headers: &mut HeaderMap, ops: &HeaderOps) {
    for name in &ops.remove {
        if let Ok(header_name) = HeaderName::from_str(&name.to_lowercase()) {
            headers.remove(&header_name);
        }
    }

    for (name, value) in &ops.set {
        if let (Ok(header_name), Ok(header_value)) = (
            HeaderName::from_str(&name.to_lowercase()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(header_name, header_value);
        }
    }

    for (name, value) in &ops.add {
        let Ok(header_name) = HeaderName::from_str(&name.to_lowercase()) else {
            continue;
        };
        if headers.contains_key(&header_name) {
            continue;
        }
        if let Ok(header_value) = HeaderValue::from_str(value) {
            headers.insert(header_name, header_value);
        }
    }
}

/// Rewrites `path` using `pattern.replace(replacement)` (supports
/// back-references). An invalid regex is swallowed: the original path is
/// returned unchanged.
pub fn apply_path_rewrite(path: &str, rewrite: &PathRewrite) -> String {
    match Regex::new(&rewrite.pattern) {
        Ok(re) => re.replace(path, rewrite.replacement.as_str()).into_owned(),
        Err(_) => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn remove_then_set_then_add_ordering() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-old"),
            HeaderValue::from_static("gone"),
        );
        headers.insert(
            HeaderName::from_static("x-overwrite"),
            HeaderValue::from_static("before"),
        );

        let mut set = HashMap::new();
        set.insert("x-overwrite".to_string(), "after".to_string());
        let mut add = HashMap::new();
        add.insert("x-overwrite".to_string(), "should-not-apply".to_string());
        add.insert("x-new".to_string(), "added".to_string());

        let ops = HeaderOps {
            remove: vec!["x-old".to_string()],
            set,
            add,
        };
        apply_header_ops(&mut headers, &ops);

        assert!(!headers.contains_key("x-old"));
        assert_eq!(headers.get("x-overwrite").unwrap(), "after");
        assert_eq!(headers.get("x-new").unwrap(), "added");
    }

    #[test]
    fn remove_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-trace"),
            HeaderValue::from_static("1"),
        );
        let ops = HeaderOps {
            remove: vec!["X-Trace".to_string()],
            set: HashMap::new(),
            add: HashMap::new(),
        };
        apply_header_ops(&mut headers, &ops);
        assert!(!headers.contains_key("x-trace"));
    }

    #[test]
    fn path_rewrite_supports_back_references() {
        let rewrite = PathRewrite {
            pattern: r"^/api/(\w+)$".to_string(),
            replacement: "/v2/$1".to_string(),
        };
        assert_eq!(apply_path_rewrite("/api/users", &rewrite), "/v2/users");
    }

    #[test]
    fn invalid_pattern_preserves_original_path() {
        let rewrite = PathRewrite {
            pattern: "(unterminated".to_string(),
            replacement: "/x".to_string(),
        };
        assert_eq!(apply_path_rewrite("/api/users", &rewrite), "/api/users");
    }
}
