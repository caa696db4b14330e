use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{
    AGE, CACHE_CONTROL, CONTENT_TYPE, DATE, ETAG, EXPIRES, HeaderMap, HeaderName, HeaderValue,
    LAST_MODIFIED, PRAGMA, VARY,
};
use std::time::Duration;
use url::Url;

use super::cache_control::CacheControl;
use super::headers::{comma_delimited_tokens, merge_revalidation_headers};

/// Response metadata for a resource or a redirect hop.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceResponse {
    url: Url,
    status: StatusCode,
    headers: HeaderMap,
    mime_type: String,
    charset: Option<String>,
    expected_content_length: Option<u64>,
    response_time: Option<DateTime<Utc>>,
}

impl ResourceResponse {
    pub fn new(url: Url, status: StatusCode, headers: HeaderMap) -> Self {
        let (mime_type, charset) = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(parse_content_type)
            .unwrap_or_default();
        let expected_content_length = headers
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        Self {
            url,
            status,
            headers,
            mime_type,
            charset,
            expected_content_length,
            response_time: None,
        }
    }

    /// Response for in-memory data such as a decoded `data:` URL.
    pub fn synthesized(url: Url, mime_type: &str, charset: Option<&str>, length: usize) -> Self {
        let mut headers = HeaderMap::new();
        let content_type = match charset {
            Some(charset) => format!("{mime_type};charset={charset}"),
            None => mime_type.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&content_type) {
            headers.insert(CONTENT_TYPE, value);
        }
        headers.insert(reqwest::header::CONTENT_LENGTH, HeaderValue::from(length));
        Self::new(url, StatusCode::OK, headers)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header_str(&self, name: impl reqwest::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        if name == CONTENT_TYPE
            && let Ok(content_type) = value.to_str()
        {
            let (mime_type, charset) = parse_content_type(content_type);
            self.mime_type = mime_type;
            self.charset = charset;
        }
        self.headers.insert(name, value);
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (name.parse::<HeaderName>(), HeaderValue::from_str(value)) {
            self.set_header(name, value);
        }
        self
    }

    /// Lowercased MIME essence, empty when absent.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The raw `Content-Type` value before any sniffing.
    pub fn http_content_type(&self) -> String {
        self.header_str(CONTENT_TYPE)
            .map(|v| parse_content_type(v).0)
            .unwrap_or_default()
    }

    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    pub fn expected_content_length(&self) -> Option<u64> {
        self.expected_content_length
    }

    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    pub fn response_time(&self) -> Option<DateTime<Utc>> {
        self.response_time
    }

    pub fn set_response_time(&mut self, at: DateTime<Utc>) {
        self.response_time = Some(at);
    }

    pub fn cache_control(&self) -> CacheControl {
        CacheControl::parse(self.header_str(CACHE_CONTROL), self.header_str(PRAGMA))
    }

    pub fn cache_control_contains_no_cache(&self) -> bool {
        self.cache_control().no_cache
    }

    pub fn cache_control_contains_no_store(&self) -> bool {
        self.cache_control().no_store
    }

    pub fn cache_control_max_age(&self) -> Option<Duration> {
        self.cache_control().max_age
    }

    pub fn cache_control_stale_while_revalidate(&self) -> Option<Duration> {
        self.cache_control().stale_while_revalidate
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.header_str(DATE).and_then(parse_http_date)
    }

    pub fn age(&self) -> Option<Duration> {
        self.header_str(AGE)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.header_str(EXPIRES).and_then(parse_http_date)
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.header_str(LAST_MODIFIED).and_then(parse_http_date)
    }

    pub fn etag(&self) -> Option<&str> {
        self.header_str(ETAG).filter(|v| !v.is_empty())
    }

    pub fn last_modified_raw(&self) -> Option<&str> {
        self.header_str(LAST_MODIFIED).filter(|v| !v.is_empty())
    }

    pub fn has_cache_validator_fields(&self) -> bool {
        self.etag().is_some() || self.last_modified_raw().is_some()
    }

    /// Lowercased header names listed in `Vary`, or `None` when absent.
    pub fn vary(&self) -> Option<Vec<String>> {
        let values: Vec<&str> = self
            .headers
            .get_all(VARY)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(comma_delimited_tokens(&values.join(",")))
    }

    pub fn has_vary_star(&self) -> bool {
        self.vary().is_some_and(|names| names.iter().any(|n| n == "*"))
    }

    /// Apply a `304 Not Modified` to this cached response.
    pub fn merge_not_modified(&mut self, validating: &ResourceResponse) {
        merge_revalidation_headers(&mut self.headers, &validating.headers);
    }
}

/// Split a `Content-Type` into a lowercased essence and an optional charset.
fn parse_content_type(value: &str) -> (String, Option<String>) {
    let mut parts = value.split(';');
    let essence = parts.next().unwrap_or("").trim().to_ascii_lowercase();
    let charset = parts.find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    });
    (essence, charset)
}

/// Parse an HTTP-date. Unparseable values are treated as absent.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    // RFC 850 and asctime forms.
    for format in ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn response(headers: &[(&str, &str)]) -> ResourceResponse {
        let mut response = ResourceResponse::new(
            Url::parse("https://example.com/style.css").unwrap(),
            StatusCode::OK,
            HeaderMap::new(),
        );
        for (name, value) in headers {
            response = response.with_header(name, value);
        }
        response
    }

    #[test]
    fn test_content_type() {
        let response = response(&[("Content-Type", "Text/CSS; charset=\"UTF-8\"")]);
        assert_eq!(response.mime_type(), "text/css");
        assert_eq!(response.charset(), Some("UTF-8"));
    }

    #[test]
    fn test_dates() {
        let response = response(&[
            ("Date", "Sun, 06 Nov 1994 08:49:37 GMT"),
            ("Expires", "garbage"),
            ("Last-Modified", "Sunday, 06-Nov-94 08:49:37 GMT"),
        ]);
        let expected = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        assert_eq!(response.date(), Some(expected));
        assert_eq!(response.expires(), None);
        assert_eq!(response.last_modified(), Some(expected));
    }

    #[test]
    fn test_vary() {
        assert!(response(&[]).vary().is_none());
        let response = response(&[("Vary", "Accept-Encoding, *")]);
        assert!(response.has_vary_star());
    }

    #[test]
    fn test_validators() {
        assert!(!response(&[]).has_cache_validator_fields());
        assert!(response(&[("ETag", "\"v1\"")]).has_cache_validator_fields());
    }
}
