use chrono::{DateTime, Utc};

use crate::freshness;
use crate::http::{ResourceRequest, ResourceResponse};

/// One followed redirect: the request issued for the next hop and the
/// response that caused it.
#[derive(Debug, Clone, PartialEq)]
pub struct RedirectPair {
    pub request: ResourceRequest,
    pub redirect_response: ResourceResponse,
}

impl RedirectPair {
    pub fn new(request: ResourceRequest, redirect_response: ResourceResponse) -> Self {
        Self {
            request,
            redirect_response,
        }
    }

    /// Whether this hop may be replayed from cache at `now`.
    pub fn is_reusable(&self, fallback_timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let received = self
            .redirect_response
            .response_time()
            .unwrap_or(fallback_timestamp);
        freshness::can_use_response(&self.redirect_response, received, now)
            && !self.request.cache_control_contains_no_cache()
            && !self.request.cache_control_contains_no_store()
    }
}
