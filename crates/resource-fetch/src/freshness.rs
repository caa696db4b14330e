//! # Freshness
//!
//! Age and freshness-lifetime arithmetic (RFC 7234 §4.2) used to decide
//! whether a cached response may be served without revalidation. Every
//! function takes the instants it needs, so nothing here reads a clock.

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::StatusCode;

use crate::http::ResourceResponse;

/// Lifetime given to responses that are not network addressed.
pub const UNBOUNDED_LIFETIME: TimeDelta = TimeDelta::MAX;

/// Current age of `response`, received at `response_timestamp`, as of `now`.
///
/// `max(apparent_age, Age header) + resident_time`. Latency is not
/// compensated for.
pub fn current_age(
    response: &ResourceResponse,
    response_timestamp: DateTime<Utc>,
    now: DateTime<Utc>,
) -> TimeDelta {
    let apparent_age = response
        .date()
        .map(|date| (response_timestamp - date).max(TimeDelta::zero()))
        .unwrap_or_else(TimeDelta::zero);
    let corrected_received_age = match response.age() {
        Some(age) => apparent_age.max(TimeDelta::from_std(age).unwrap_or(TimeDelta::MAX)),
        None => apparent_age,
    };
    let resident_time = now - response_timestamp;
    corrected_received_age
        .checked_add(&resident_time)
        .unwrap_or(TimeDelta::MAX)
}

/// How long `response` stays fresh after its creation time.
///
/// `max-age` wins, then `Expires - Date`, then a tenth of the time since
/// `Last-Modified`, then zero. Responses for schemes other than http(s)
/// never go stale.
pub fn freshness_lifetime(
    response: &ResourceResponse,
    response_timestamp: DateTime<Utc>,
) -> TimeDelta {
    if !response.is_http() {
        return UNBOUNDED_LIFETIME;
    }

    if let Some(max_age) = response.cache_control_max_age() {
        return TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
    }

    let creation_time = response.date().unwrap_or(response_timestamp);
    if let Some(expires) = response.expires() {
        return expires - creation_time;
    }

    if let Some(last_modified) = response.last_modified() {
        return (creation_time - last_modified) / 10;
    }

    TimeDelta::zero()
}

/// Whether `response` may be served from cache at `now`.
pub fn can_use_response(
    response: &ResourceResponse,
    response_timestamp: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    let cache_control = response.cache_control();
    if cache_control.no_cache || cache_control.no_store {
        return false;
    }

    let status = response.status();
    if status == StatusCode::SEE_OTHER {
        return false;
    }

    // Temporary redirects are only cacheable with explicit freshness.
    if (status == StatusCode::FOUND || status == StatusCode::TEMPORARY_REDIRECT)
        && cache_control.max_age.is_none()
        && response.expires().is_none()
    {
        return false;
    }

    current_age(response, response_timestamp, now) <= freshness_lifetime(response, response_timestamp)
}

/// Time past expiry during which a stale response may still be served
/// while it is revalidated.
pub fn staleness_lifetime(response: &ResourceResponse) -> Option<TimeDelta> {
    response
        .cache_control_stale_while_revalidate()
        .and_then(|d| TimeDelta::from_std(d).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::header::HeaderMap;
    use url::Url;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn http_date(at: DateTime<Utc>) -> String {
        at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    fn response(url: &str, status: u16, headers: &[(&str, String)]) -> ResourceResponse {
        let mut response = ResourceResponse::new(
            Url::parse(url).unwrap(),
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
        );
        for (name, value) in headers {
            response = response.with_header(name, value);
        }
        response
    }

    #[test]
    fn test_max_age_reuse_window() {
        let date = base();
        let response = response(
            "https://example.com/a.js",
            200,
            &[
                ("Date", http_date(date)),
                ("Cache-Control", "max-age=3600".to_string()),
            ],
        );
        let received = date;
        assert!(can_use_response(&response, received, date + TimeDelta::seconds(500)));
        assert!(!can_use_response(&response, received, date + TimeDelta::seconds(3700)));
    }

    #[test]
    fn test_age_header_and_apparent_age() {
        let date = base();
        let response = response(
            "https://example.com/",
            200,
            &[("Date", http_date(date)), ("Age", "100".to_string())],
        );
        // Apparent age 30s is smaller than the Age header.
        let received = date + TimeDelta::seconds(30);
        let age = current_age(&response, received, received + TimeDelta::seconds(5));
        assert_eq!(age, TimeDelta::seconds(105));
    }

    #[test]
    fn test_lifetime_fallbacks() {
        let date = base();
        let expires = response(
            "https://example.com/",
            200,
            &[
                ("Date", http_date(date)),
                ("Expires", http_date(date + TimeDelta::seconds(600))),
            ],
        );
        assert_eq!(freshness_lifetime(&expires, date), TimeDelta::seconds(600));

        let heuristic = response(
            "https://example.com/",
            200,
            &[
                ("Date", http_date(date)),
                ("Last-Modified", http_date(date - TimeDelta::seconds(1000))),
            ],
        );
        assert_eq!(freshness_lifetime(&heuristic, date), TimeDelta::seconds(100));

        let bare = response("https://example.com/", 200, &[]);
        assert_eq!(freshness_lifetime(&bare, date), TimeDelta::zero());

        let local = response("file:///tmp/a.css", 200, &[]);
        assert_eq!(freshness_lifetime(&local, date), UNBOUNDED_LIFETIME);
    }

    #[test]
    fn test_redirect_statuses() {
        let date = base();
        let see_other = response(
            "https://example.com/",
            303,
            &[("Cache-Control", "max-age=60".to_string())],
        );
        assert!(!can_use_response(&see_other, date, date));

        let found = response("https://example.com/", 302, &[("Date", http_date(date))]);
        assert!(!can_use_response(&found, date, date));

        let found_fresh = response(
            "https://example.com/",
            302,
            &[("Cache-Control", "max-age=60".to_string())],
        );
        assert!(can_use_response(&found_fresh, date, date));
    }

    #[test]
    fn test_no_cache_never_usable() {
        let date = base();
        let response = response(
            "https://example.com/",
            200,
            &[("Cache-Control", "max-age=60, no-cache".to_string())],
        );
        assert!(!can_use_response(&response, date, date));
    }
}
