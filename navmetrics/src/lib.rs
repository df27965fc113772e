//! navmetrics - Time to First Byte for page-load navigations
//!
//! Estimates how long a navigation waited for the first byte of its main
//! document, either as observed in the recorded network timing or as
//! simulated under a throttled network.
//!
//! # Architecture
//!
//! ```text
//! NavigationContext ──► MainResourceResolver ──► observed TTFB ──────────────┐
//!                   └─► NetworkAnalyzer ──► server response time by origin ──┴─► simulated TTFB
//! ```
//!
//! [`ComputedMetricCache`] memoizes results per navigation so composite
//! metrics can reuse TTFB without recomputing it.
//!
//! # Example
//!
//! ```ignore
//! use navmetrics::{ComputedMetricCache, EstimatorConfig, NavigationContext, TimeToFirstByte};
//!
//! let cache = ComputedMetricCache::new(&EstimatorConfig::from_env());
//! let context = NavigationContext::new("https://example.com/", records, time_origin_us);
//!
//! let ttfb = cache.request(&TimeToFirstByte::from_records(), &context).await?;
//! println!("TTFB: {:.0} ms", ttfb.timing);
//! ```

pub mod cache;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod metric;
pub mod network;
pub mod resource;
pub mod ttfb;

pub use cache::{CacheKey, CacheStats, ComputedMetricCache};
pub use collaborators::{
    BoxFuture, MainResourceResolver, NetworkAnalyzer, RecordMainResourceResolver,
    RecordNetworkAnalyzer,
};
pub use config::{EstimatorConfig, FormFactor, Settings, ThrottlingMethod, ThrottlingSettings};
pub use context::{GatherMode, InputField, NavigationContext, SimulatorOptions};
pub use error::MetricError;
pub use metric::{compute, ComputeMode, Metric, NavigationMetric};
pub use network::{NetworkAnalysis, NetworkRecord, ResourceType};
pub use resource::{
    MainResourceDescriptor, Protocol, ProtocolFamily, ResourceTiming, Scheme, SecurityOrigin,
};
pub use ttfb::TimeToFirstByte;
