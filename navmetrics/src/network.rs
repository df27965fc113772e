//! Network log records and the per-origin analysis derived from them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::resource::{Protocol, ResourceTiming, SecurityOrigin};

/// Kind of resource a request fetched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Document,
    Stylesheet,
    Script,
    Image,
    Font,
    Xhr,
    Fetch,
    #[default]
    Other,
}

/// One request from the navigation's network log.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkRecord {
    pub url: String,
    pub resource_type: ResourceType,
    pub protocol: Protocol,
    /// The request completed (successfully or not).
    pub finished: bool,
    /// The request failed (network error, blocked, aborted).
    pub failed: bool,
    /// Time the request finished, in seconds on the navigation clock.
    pub end_time: f64,
    /// Bytes transferred over the network, headers included.
    pub transfer_size: u64,
    /// Absent when no network fetch happened (memory cache, service worker).
    pub timing: Option<ResourceTiming>,
}

impl NetworkRecord {
    /// A finished request for `url` with the given timing.
    pub fn finished(
        url: impl Into<String>,
        resource_type: ResourceType,
        protocol: impl Into<String>,
        timing: ResourceTiming,
    ) -> Self {
        Self {
            url: url.into(),
            resource_type,
            protocol: Protocol::new(protocol),
            finished: true,
            failed: false,
            end_time: timing.request_time,
            transfer_size: 0,
            timing: Some(timing),
        }
    }

    pub fn with_end_time(mut self, end_time: f64) -> Self {
        self.end_time = end_time;
        self
    }

    pub fn with_transfer_size(mut self, bytes: u64) -> Self {
        self.transfer_size = bytes;
        self
    }

    /// Finished, not failed, and carrying timing.
    pub fn is_analyzable(&self) -> bool {
        self.finished && !self.failed && self.timing.is_some()
    }
}

/// Connection characteristics estimated from a network log.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NetworkAnalysis {
    /// Minimum round-trip time observed across all origins (ms).
    pub rtt_ms: f64,
    /// Round-trip time of each origin above `rtt_ms` (ms).
    pub additional_rtt_by_origin: HashMap<SecurityOrigin, f64>,
    /// Time each origin spent producing response headers (ms).
    pub server_response_time_by_origin: HashMap<SecurityOrigin, f64>,
    /// Observed throughput (bits per second).
    pub throughput_bps: f64,
}

impl NetworkAnalysis {
    /// Server response time for an origin, if the origin was analyzable.
    pub fn server_response_time(&self, origin: &SecurityOrigin) -> Option<f64> {
        self.server_response_time_by_origin.get(origin).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_analyzable() {
        let record = NetworkRecord::finished(
            "https://example.com/",
            ResourceType::Document,
            "h2",
            ResourceTiming::new(1.0, 100.0),
        );
        assert!(record.is_analyzable());

        let mut failed = record.clone();
        failed.failed = true;
        assert!(!failed.is_analyzable());

        let mut untimed = record;
        untimed.timing = None;
        assert!(!untimed.is_analyzable());
    }

    #[test]
    fn test_record_deserializes_with_defaults() {
        let record: NetworkRecord =
            serde_json::from_str(r#"{"url":"https://example.com/","resource_type":"document"}"#)
                .unwrap();
        assert_eq!(record.resource_type, ResourceType::Document);
        assert_eq!(record.protocol.as_str(), "http/1.1");
        assert!(!record.finished);
        assert!(record.timing.is_none());
    }

    #[test]
    fn test_server_response_time_lookup() {
        let origin = SecurityOrigin::parse("https://example.com").unwrap();
        let mut analysis = NetworkAnalysis::default();
        analysis
            .server_response_time_by_origin
            .insert(origin.clone(), 120.0);

        assert_eq!(analysis.server_response_time(&origin), Some(120.0));
        let other = SecurityOrigin::parse("https://cdn.example.com").unwrap();
        assert_eq!(analysis.server_response_time(&other), None);
    }
}
