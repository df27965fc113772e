//! Navigation metric abstraction and mode dispatch.
//!
//! A navigation metric can be computed two ways: *observed*, straight from
//! what the browser recorded, or *simulated*, modelling the page under the
//! configured throttling. [`NavigationMetric`] supplies both algorithms;
//! [`compute`] picks one from the run settings.
//!
//! # Dispatch
//!
//! ```text
//! gather_mode != Navigation ──► UnsupportedGatherMode
//! throttling_method == Simulate ──► compute_simulated
//! throttling_method == Devtools | Provided ──► compute_observed
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collaborators::BoxFuture;
use crate::config::ThrottlingMethod;
use crate::context::{GatherMode, InputField, NavigationContext};
use crate::error::MetricError;

/// A timing value produced by a navigation metric.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Milliseconds since the navigation time origin.
    pub timing: f64,
    /// Absolute trace timestamp in microseconds. Simulated metrics have none.
    pub timestamp: Option<f64>,
}

impl Metric {
    /// An observed metric anchored to a trace timestamp.
    pub fn observed(timing: f64, timestamp: f64) -> Self {
        Self {
            timing,
            timestamp: Some(timestamp),
        }
    }

    /// A simulated metric with no trace timestamp.
    pub fn simulated(timing: f64) -> Self {
        Self {
            timing,
            timestamp: None,
        }
    }
}

/// Which computation a run calls for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComputeMode {
    Observed,
    Simulated,
}

impl ComputeMode {
    /// Select the mode for a context.
    pub fn select(context: &NavigationContext) -> Result<Self, MetricError> {
        if context.gather_mode != GatherMode::Navigation {
            return Err(MetricError::UnsupportedGatherMode(context.gather_mode));
        }
        Ok(match context.settings.throttling_method {
            ThrottlingMethod::Simulate => ComputeMode::Simulated,
            ThrottlingMethod::Devtools | ThrottlingMethod::Provided => ComputeMode::Observed,
        })
    }
}

/// A metric with observed and simulated variants.
///
/// Composite metrics can call either variant directly to reuse a metric as
/// one component of a larger timing budget.
pub trait NavigationMetric: Send + Sync {
    /// Stable identity, part of every cache key.
    const NAME: &'static str;

    /// Context fields the computation reads.
    const DECLARED_INPUTS: &'static [InputField];

    /// Compute from recorded timing.
    fn compute_observed<'a>(
        &'a self,
        context: &'a NavigationContext,
    ) -> BoxFuture<'a, Result<Metric, MetricError>>;

    /// Compute under the configured throttling.
    fn compute_simulated<'a>(
        &'a self,
        context: &'a NavigationContext,
    ) -> BoxFuture<'a, Result<Metric, MetricError>>;
}

/// Compute a metric in the mode the context calls for.
pub async fn compute<M: NavigationMetric>(
    metric: &M,
    context: &NavigationContext,
) -> Result<Metric, MetricError> {
    let mode = ComputeMode::select(context)?;
    debug!(metric = M::NAME, mode = ?mode, "Computing metric");

    match mode {
        ComputeMode::Observed => metric.compute_observed(context).await,
        ComputeMode::Simulated => metric.compute_simulated(context).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    /// Returns a fixed value per mode.
    struct FixedMetric;

    impl NavigationMetric for FixedMetric {
        const NAME: &'static str = "fixed";
        const DECLARED_INPUTS: &'static [InputField] = &[InputField::Settings];

        fn compute_observed<'a>(
            &'a self,
            _context: &'a NavigationContext,
        ) -> BoxFuture<'a, Result<Metric, MetricError>> {
            Box::pin(async { Ok(Metric::observed(1.0, 1000.0)) })
        }

        fn compute_simulated<'a>(
            &'a self,
            _context: &'a NavigationContext,
        ) -> BoxFuture<'a, Result<Metric, MetricError>> {
            Box::pin(async { Ok(Metric::simulated(2.0)) })
        }
    }

    fn context(method: ThrottlingMethod) -> NavigationContext {
        NavigationContext::new("https://example.com/", Vec::new(), 0.0)
            .with_settings(Settings::default().with_throttling_method(method))
    }

    #[test]
    fn test_select_mode() {
        assert_eq!(
            ComputeMode::select(&context(ThrottlingMethod::Simulate)).unwrap(),
            ComputeMode::Simulated
        );
        assert_eq!(
            ComputeMode::select(&context(ThrottlingMethod::Devtools)).unwrap(),
            ComputeMode::Observed
        );
        assert_eq!(
            ComputeMode::select(&context(ThrottlingMethod::Provided)).unwrap(),
            ComputeMode::Observed
        );
    }

    #[test]
    fn test_select_rejects_non_navigation() {
        for mode in [GatherMode::Timespan, GatherMode::Snapshot] {
            let ctx = context(ThrottlingMethod::Simulate).with_gather_mode(mode);
            assert_eq!(
                ComputeMode::select(&ctx),
                Err(MetricError::UnsupportedGatherMode(mode))
            );
        }
    }

    #[tokio::test]
    async fn test_compute_dispatches() {
        let simulated = compute(&FixedMetric, &context(ThrottlingMethod::Simulate))
            .await
            .unwrap();
        assert_eq!(simulated, Metric::simulated(2.0));

        let observed = compute(&FixedMetric, &context(ThrottlingMethod::Provided))
            .await
            .unwrap();
        assert_eq!(observed.timestamp, Some(1000.0));
    }
}
