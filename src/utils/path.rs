use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

// Controls and space; reserved characters and `%` pass through
const REQUEST_TARGET: &AsciiSet = &CONTROLS.add(b' ');

/// Make a rewritten path usable as a request target.
///
/// An empty path becomes `/`, and a bare query string (`?a=1`) is anchored at `/`.
pub fn normalize_request_path(path: String) -> String {
    if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    }
}

/// Prepend the upstream base path (e.g. `/v1` from `https://host/v1`) to a request path.
pub fn join_base_path(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.is_empty() {
        return path.to_string();
    }
    if path == "/" {
        return format!("{}/", base);
    }
    format!("{}{}", base, path)
}

/// Percent-encode bytes that cannot appear literally in a request URI.
///
/// Already-encoded sequences are left untouched, so the call is idempotent.
pub fn encode_request_target(target: &str) -> String {
    utf8_percent_encode(target, REQUEST_TARGET).to_string()
}

/// Split `path?query` into its path part, ignoring the query.
pub fn path_only(path_and_query: &str) -> &str {
    path_and_query.split_once('?').map(|(p, _)| p).unwrap_or(path_and_query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_request_path() {
        assert_eq!(normalize_request_path("".to_string()), "/");
        assert_eq!(normalize_request_path("?page=1".to_string()), "/?page=1");
        assert_eq!(normalize_request_path("/list".to_string()), "/list");
    }

    #[test]
    fn test_join_base_path() {
        assert_eq!(join_base_path("", "/list"), "/list");
        assert_eq!(join_base_path("/v1/", "/list"), "/v1/list");
        assert_eq!(join_base_path("/v1", "/"), "/v1/");
        assert_eq!(join_base_path("/v1", "/?a=1"), "/v1/?a=1");
    }

    #[test]
    fn test_encode_request_target() {
        assert_eq!(encode_request_target("/geocode?query=서울"), "/geocode?query=%EC%84%9C%EC%9A%B8");
        assert_eq!(encode_request_target("/a b"), "/a%20b");
        assert_eq!(encode_request_target("/already%20encoded"), "/already%20encoded");
        assert_eq!(encode_request_target("/a/b?x=1&y=/z#f"), "/a/b?x=1&y=/z#f");
        assert_eq!(encode_request_target("/tab\there"), "/tab%09here");
    }

    #[test]
    fn test_path_only() {
        assert_eq!(path_only("/festival/list?page=1"), "/festival/list");
        assert_eq!(path_only("/festival/list"), "/festival/list");
    }
}
