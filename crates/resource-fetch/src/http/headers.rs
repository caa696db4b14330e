//! Header lists used by revalidation and raw request reuse.

use reqwest::header::{HeaderMap, HeaderName};

/// Headers a `304 Not Modified` must not copy onto the cached response.
const HEADERS_TO_IGNORE_AFTER_REVALIDATION: &[&str] = &[
    "allow",
    "connection",
    "etag",
    "expires",
    "keep-alive",
    "last-modified",
    "proxy-authenticate",
    "proxy-connection",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "www-authenticate",
    "x-frame-options",
    "x-xss-protection",
];

/// Prefixes of headers a `304 Not Modified` must not copy.
const HEADER_PREFIXES_TO_IGNORE_AFTER_REVALIDATION: &[&str] = &["content-", "x-content-", "x-webkit-"];

/// Headers that may differ between two raw requests sharing one load.
const HEADERS_TO_IGNORE_FOR_CACHE_REUSE: &[&str] = &[
    "cache-control",
    "if-modified-since",
    "if-none-match",
    "origin",
    "pragma",
    "purpose",
    "referer",
    "user-agent",
    "x-devtools-emulate-network-conditions-client-id",
];

pub fn should_update_header_after_revalidation(name: &HeaderName) -> bool {
    let name = name.as_str();
    !HEADERS_TO_IGNORE_AFTER_REVALIDATION.contains(&name)
        && !HEADER_PREFIXES_TO_IGNORE_AFTER_REVALIDATION
            .iter()
            .any(|prefix| name.starts_with(prefix))
}

pub fn should_ignore_header_for_cache_reuse(name: &HeaderName) -> bool {
    HEADERS_TO_IGNORE_FOR_CACHE_REUSE.contains(&name.as_str())
}

/// Copy the headers of a `304` onto `cached`, skipping entity and hop-by-hop
/// headers. Each copied name replaces all existing values for that name.
pub fn merge_revalidation_headers(cached: &mut HeaderMap, validating: &HeaderMap) {
    for name in validating.keys() {
        if !should_update_header_after_revalidation(name) {
            continue;
        }
        cached.remove(name);
        for value in validating.get_all(name) {
            cached.append(name.clone(), value.clone());
        }
    }
}

/// Whether two header maps agree on every header outside the reuse ignore
/// list.
pub fn headers_match_for_reuse(old: &HeaderMap, new: &HeaderMap) -> bool {
    let differs = |a: &HeaderMap, b: &HeaderMap| {
        a.keys().any(|name| {
            !should_ignore_header_for_cache_reuse(name)
                && !a.get_all(name).iter().eq(b.get_all(name).iter())
        })
    };
    !differs(new, old) && !differs(old, new)
}

/// Tokens of a comma separated header value, trimmed and lowercased.
pub fn comma_delimited_tokens(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}
