use resource_fetch::{
    CacheStats, FetchError, FetchStats, PreloadStats, Resource, ResourceClient, ResourceResponse,
    ResourceStatus, ResourceType,
};
use serde::Serialize;
use std::cell::Cell;
use std::time::Duration;
use tracing::{debug, info};

use crate::utils::{format_bytes, format_duration};

/// Observer attached to every request so the engine treats the resource as
/// in use until its round is reported.
pub struct LoggingClient {
    name: String,
    received: Cell<usize>,
}

impl LoggingClient {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            received: Cell::new(0),
        }
    }
}

impl ResourceClient for LoggingClient {
    fn debug_name(&self) -> &str {
        &self.name
    }

    fn response_received(&self, _resource: &Resource, response: &ResourceResponse) {
        debug!(url = %self.name, status = response.status().as_u16(), "Response");
    }

    fn data_received(&self, _resource: &Resource, data: &[u8]) {
        self.received.set(self.received.get() + data.len());
    }

    fn notify_finished(&self, resource: &Resource) {
        debug!(
            url = %self.name,
            status = ?resource.status(),
            streamed = self.received.get(),
            "Finished"
        );
    }
}

/// Which counter of `FetchStats` a single request moved.
pub fn decision(before: &FetchStats, after: &FetchStats) -> &'static str {
    if after.refused > before.refused {
        "refused"
    } else if after.static_data > before.static_data {
        "static"
    } else if after.loads > before.loads {
        "load"
    } else if after.reloads > before.reloads {
        "reload"
    } else if after.revalidations > before.revalidations {
        "revalidate"
    } else if after.uses > before.uses {
        "use"
    } else {
        "unknown"
    }
}

/// How one request was served.
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub round: usize,
    pub url: String,
    pub decision: &'static str,
    pub resource_type: Option<ResourceType>,
    pub status: Option<ResourceStatus>,
    pub http_status: Option<u16>,
    pub encoded_size: usize,
    pub redirects: usize,
    pub error: Option<String>,
}

impl FetchOutcome {
    pub fn from_resource(round: usize, decision: &'static str, resource: &Resource) -> Self {
        Self {
            round,
            url: resource.url().to_string(),
            decision,
            resource_type: Some(resource.resource_type()),
            status: Some(resource.status()),
            http_status: resource.response().map(|r| r.status().as_u16()),
            encoded_size: resource.encoded_size(),
            redirects: resource.redirect_chain().len(),
            error: resource.resource_error().map(|e| e.to_string()),
        }
    }

    pub fn refused(round: usize, url: &str, error: &FetchError) -> Self {
        Self {
            round,
            url: url.to_string(),
            decision: "refused",
            resource_type: None,
            status: None,
            http_status: None,
            encoded_size: 0,
            redirects: 0,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub outcomes: Vec<FetchOutcome>,
    pub fetch_stats: FetchStats,
    pub preload_stats: PreloadStats,
    pub cache_stats: CacheStats,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl Report {
    pub fn print_text(&self) {
        println!(
            "{:>5}  {:<10}  {:<12}  {:>4}  {:>10}  URL",
            "ROUND", "DECISION", "STATUS", "HTTP", "SIZE"
        );
        for outcome in &self.outcomes {
            let status = outcome
                .status
                .map_or_else(|| "-".to_string(), |s| format!("{s:?}"));
            let http = outcome
                .http_status
                .map_or_else(|| "-".to_string(), |s| s.to_string());
            println!(
                "{:>5}  {:<10}  {:<12}  {:>4}  {:>10}  {}",
                outcome.round,
                outcome.decision,
                status,
                http,
                format_bytes(outcome.encoded_size as u64),
                outcome.url
            );
            if let Some(error) = &outcome.error {
                println!("{:>5}  error: {error}", "");
            }
        }

        let stats = &self.fetch_stats;
        info!(
            requests = stats.requests,
            loads = stats.loads,
            reloads = stats.reloads,
            revalidations = stats.revalidations,
            uses = stats.uses,
            refused = stats.refused,
            "Fetch summary"
        );
        info!(
            "Hit ratio {:.1}%, cache holds {} in {} entries, finished in {}",
            stats.hit_ratio() * 100.0,
            format_bytes(self.cache_stats.total_size() as u64),
            self.cache_stats.entries,
            format_duration(self.elapsed)
        );
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_from_stats_delta() {
        let before = FetchStats::default();
        let mut after = before.clone();
        after.requests += 1;
        after.revalidations += 1;
        assert_eq!(decision(&before, &after), "revalidate");

        after.refused += 1;
        assert_eq!(decision(&before, &after), "refused");
        assert_eq!(decision(&before, &before), "unknown");
    }

    #[test]
    fn test_report_json() {
        let report = Report {
            outcomes: vec![FetchOutcome::refused(1, "https://ads.example.net/", &FetchError::Detached)],
            fetch_stats: FetchStats::default(),
            preload_stats: PreloadStats::default(),
            cache_stats: CacheStats::default(),
            elapsed: Duration::from_millis(5),
        };
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["outcomes"][0]["decision"], "refused");
        assert_eq!(json["fetch_stats"]["requests"], 0);
        assert!(json.get("elapsed").is_none());
    }
}
