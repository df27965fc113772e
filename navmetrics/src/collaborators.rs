//! Collaborators the estimator depends on.
//!
//! The estimator never looks at the network log directly. It asks a
//! [`MainResourceResolver`] for the primary document and a
//! [`NetworkAnalyzer`] for per-origin server response times. Both traits are
//! dyn-compatible so callers can inject their own implementations (or mocks).
//!
//! The record-based implementations here work on the already-parsed
//! [`NetworkRecord`] list carried by the context.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tracing::{debug, trace};
use url::Url;

use crate::context::NavigationContext;
use crate::error::MetricError;
use crate::network::{NetworkAnalysis, NetworkRecord, ResourceType};
use crate::resource::{MainResourceDescriptor, SecurityOrigin};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Identifies the primary document of a navigation.
pub trait MainResourceResolver: Send + Sync {
    /// Resolve the main resource for the navigation.
    ///
    /// # Errors
    ///
    /// Fails if no primary document can be identified.
    fn resolve<'a>(
        &'a self,
        context: &'a NavigationContext,
    ) -> BoxFuture<'a, Result<MainResourceDescriptor, MetricError>>;
}

/// Derives per-origin connection characteristics from a network log.
pub trait NetworkAnalyzer: Send + Sync {
    /// Analyze the recorded requests.
    ///
    /// # Errors
    ///
    /// Fails if the log cannot be analyzed.
    fn analyze<'a>(
        &'a self,
        records: &'a [NetworkRecord],
    ) -> BoxFuture<'a, Result<NetworkAnalysis, MetricError>>;
}

// =============================================================================
// Main resource
// =============================================================================

/// Finds the main document among the recorded requests.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecordMainResourceResolver;

impl MainResourceResolver for RecordMainResourceResolver {
    fn resolve<'a>(
        &'a self,
        context: &'a NavigationContext,
    ) -> BoxFuture<'a, Result<MainResourceDescriptor, MetricError>> {
        Box::pin(async move { find_main_resource(context) })
    }
}

/// Locate the first document request whose URL matches the navigation's
/// final document URL, ignoring fragments.
pub fn find_main_resource(
    context: &NavigationContext,
) -> Result<MainResourceDescriptor, MetricError> {
    let target = &context.url.main_document_url;
    let wanted = strip_fragment(target)?;

    let record = context
        .devtools_log
        .iter()
        .filter(|r| r.resource_type == ResourceType::Document)
        .find(|r| strip_fragment(&r.url).ok().as_deref() == Some(wanted.as_str()))
        .ok_or_else(|| MetricError::MainResourceNotFound {
            url: target.clone(),
        })?;

    let mut descriptor = MainResourceDescriptor::new(record.url.clone(), record.protocol.clone())?;
    descriptor.timing = record.timing.clone();

    debug!(
        url = %descriptor.url,
        origin = %descriptor.origin,
        protocol = %descriptor.protocol,
        has_timing = descriptor.timing.is_some(),
        "Resolved main resource"
    );

    Ok(descriptor)
}

fn strip_fragment(input: &str) -> Result<String, MetricError> {
    let mut url =
        Url::parse(input).map_err(|e| MetricError::InvalidUrl(format!("{}: {}", input, e)))?;
    url.set_fragment(None);
    Ok(url.into())
}

// =============================================================================
// Network analysis
// =============================================================================

/// Estimates RTT, throughput and server response times from the recorded
/// requests.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecordNetworkAnalyzer;

impl NetworkAnalyzer for RecordNetworkAnalyzer {
    fn analyze<'a>(
        &'a self,
        records: &'a [NetworkRecord],
    ) -> BoxFuture<'a, Result<NetworkAnalysis, MetricError>> {
        Box::pin(async move { analyze_records(records) })
    }
}

/// Per-origin samples gathered from analyzable requests.
#[derive(Default)]
struct OriginSamples {
    /// `receive_headers_start - send_end` for each request (ms).
    waits: Vec<f64>,
    /// Handshake duration of each request that opened a connection (ms).
    handshakes: Vec<f64>,
}

/// Analyze a network log.
///
/// Server response time per origin is the median request wait minus the
/// origin's RTT estimate, clamped at zero. An origin's RTT is its fastest
/// connection handshake; origins that only reused connections inherit the
/// global minimum.
pub fn analyze_records(records: &[NetworkRecord]) -> Result<NetworkAnalysis, MetricError> {
    let mut by_origin: HashMap<SecurityOrigin, OriginSamples> = HashMap::new();
    let mut transferred_bytes: u64 = 0;
    let mut span_start = f64::INFINITY;
    let mut span_end = f64::NEG_INFINITY;

    for record in records.iter().filter(|r| r.is_analyzable()) {
        let Some(timing) = record.timing.as_ref() else {
            continue;
        };
        let origin = match SecurityOrigin::parse(&record.url) {
            Ok(origin) => origin,
            Err(e) => {
                trace!(url = %record.url, error = %e, "Skipping record with unusable URL");
                continue;
            }
        };

        let samples = by_origin.entry(origin).or_default();
        samples
            .waits
            .push((timing.receive_headers_start - timing.send_end).max(0.0));
        if let Some(handshake) = timing.connection_ms() {
            samples.handshakes.push(handshake);
        }

        transferred_bytes = transferred_bytes.saturating_add(record.transfer_size);
        span_start = span_start.min(timing.request_time);
        span_end = span_end.max(record.end_time);
    }

    if by_origin.is_empty() {
        return Err(MetricError::NetworkAnalysisFailed(
            "no finished requests with timing".to_string(),
        ));
    }

    let rtt_by_origin: HashMap<&SecurityOrigin, f64> = by_origin
        .iter()
        .filter_map(|(origin, samples)| {
            samples
                .handshakes
                .iter()
                .copied()
                .min_by(f64::total_cmp)
                .map(|rtt| (origin, rtt))
        })
        .collect();
    let rtt_ms = rtt_by_origin
        .values()
        .copied()
        .min_by(f64::total_cmp)
        .unwrap_or(0.0);

    let mut analysis = NetworkAnalysis {
        rtt_ms,
        throughput_bps: 0.0,
        ..Default::default()
    };

    for (origin, samples) in &by_origin {
        let origin_rtt = rtt_by_origin.get(origin).copied().unwrap_or(rtt_ms);
        let Some(wait) = median(&samples.waits) else {
            continue;
        };
        analysis
            .additional_rtt_by_origin
            .insert(origin.clone(), origin_rtt - rtt_ms);
        analysis
            .server_response_time_by_origin
            .insert(origin.clone(), (wait - origin_rtt).max(0.0));
    }

    let span_secs = span_end - span_start;
    if span_secs.is_finite() && span_secs > 0.0 {
        analysis.throughput_bps = transferred_bytes as f64 * 8.0 / span_secs;
    }

    debug!(
        origins = analysis.server_response_time_by_origin.len(),
        rtt_ms = analysis.rtt_ms,
        throughput_bps = analysis.throughput_bps,
        "Network analysis complete"
    );

    Ok(analysis)
}

/// Median of the values; the mean of the two middle values for even counts.
fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
