//! `Cache-Control` / `Pragma` directive parsing.

use std::time::Duration;

/// Directives relevant to a browser-level memory cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub no_cache: bool,
    pub no_store: bool,
    pub must_revalidate: bool,
    pub max_age: Option<Duration>,
    pub stale_while_revalidate: Option<Duration>,
}

impl CacheControl {
    /// Parse the directives. When a directive with a value appears more than
    /// once, the first valid occurrence wins. `Pragma: no-cache` is treated
    /// as `Cache-Control: no-cache`.
    pub fn parse(cache_control: Option<&str>, pragma: Option<&str>) -> Self {
        let mut parsed = CacheControl::default();

        if let Some(value) = cache_control {
            for (name, argument) in directives(value) {
                match name.to_ascii_lowercase().as_str() {
                    // A no-cache with field names only concerns shared caches.
                    "no-cache" if argument.is_none() => parsed.no_cache = true,
                    "no-store" => parsed.no_store = true,
                    "must-revalidate" => parsed.must_revalidate = true,
                    "max-age" if parsed.max_age.is_none() => {
                        parsed.max_age = argument.as_deref().and_then(parse_seconds);
                    }
                    "stale-while-revalidate" if parsed.stale_while_revalidate.is_none() => {
                        parsed.stale_while_revalidate = argument.as_deref().and_then(parse_seconds);
                    }
                    _ => {}
                }
            }
        }

        if let Some(pragma) = pragma
            && pragma.to_ascii_lowercase().contains("no-cache")
        {
            parsed.no_cache = true;
        }

        parsed
    }
}

fn parse_seconds(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Split a header value into `(name, argument)` pairs. Commas inside quoted
/// arguments do not split.
fn directives(value: &str) -> Vec<(String, Option<String>)> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in value.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                push_directive(&mut out, &current);
                current.clear();
            }
            _ => current.push(c),
        }
    }
    push_directive(&mut out, &current);
    out
}

fn push_directive(out: &mut Vec<(String, Option<String>)>, raw: &str) {
    let raw = raw.trim();
    if raw.is_empty() {
        return;
    }
    match raw.split_once('=') {
        Some((name, argument)) => {
            let argument = argument.trim().trim_matches('"').to_string();
            out.push((name.trim().to_string(), Some(argument)));
        }
        None => out.push((raw.to_string(), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_directives() {
        let cc = CacheControl::parse(Some("public, max-age=3600, must-revalidate"), None);
        assert_eq!(cc.max_age, Some(Duration::from_secs(3600)));
        assert!(cc.must_revalidate);
        assert!(!cc.no_cache);
        assert!(!cc.no_store);
    }

    #[test]
    fn test_first_max_age_wins() {
        let cc = CacheControl::parse(Some("max-age=10, max-age=20"), None);
        assert_eq!(cc.max_age, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_no_cache_with_field_names_is_ignored() {
        let cc = CacheControl::parse(Some("no-cache=\"set-cookie, x-foo\", no-store"), None);
        assert!(!cc.no_cache);
        assert!(cc.no_store);
    }

    #[test]
    fn test_pragma() {
        let cc = CacheControl::parse(None, Some("No-Cache"));
        assert!(cc.no_cache);
    }

    #[test]
    fn test_stale_while_revalidate_and_garbage() {
        let cc = CacheControl::parse(Some("max-age=abc, stale-while-revalidate=30"), None);
        assert_eq!(cc.max_age, None);
        assert_eq!(cc.stale_while_revalidate, Some(Duration::from_secs(30)));
    }
}
