//! Error types for metric computation.
//!
//! Every failure is terminal for the call that produced it. Collaborator
//! errors travel through the estimator unchanged via `?`, so the variant a
//! caller sees is the one the failing component raised.

use thiserror::Error;

use crate::context::GatherMode;

/// Errors that can occur while computing a navigation metric.
///
/// `Clone` is required by the memoizing cache: a failed computation is shared
/// with every caller that was waiting on the same key.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricError {
    /// The main document has no captured network timing.
    #[error("Missing timing for main resource: {url}")]
    MissingTiming { url: String },

    /// No server response time could be derived for the document's origin.
    #[error("No response time for origin: {origin}")]
    MissingResponseTime { origin: String },

    /// No primary document request could be identified for the navigation.
    #[error("Unable to identify the main resource for {url}")]
    MainResourceNotFound { url: String },

    /// The network log could not be analyzed.
    #[error("Network analysis failed: {0}")]
    NetworkAnalysisFailed(String),

    /// The metric is only defined for navigations.
    #[error("{0} gather mode is not supported for navigation metrics")]
    UnsupportedGatherMode(GatherMode),

    /// A URL could not be turned into a security origin.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Inputs could not be serialized into a cache key.
    #[error("Failed to derive cache key: {0}")]
    KeyDerivation(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
