//! Time to First Byte.
//!
//! TTFB is the time from navigation start until the first byte of the main
//! document's response headers arrives.
//!
//! # Observed
//!
//! Read straight from the main resource's network timing:
//!
//! ```text
//! timestamp (µs) = (request_time × 1000 + receive_headers_start) × 1000
//! timing (ms)    = (timestamp − time_origin) / 1000
//! ```
//!
//! # Simulated
//!
//! Models a cold connection under the configured throttling:
//!
//! ```text
//! TTFB = rtt × round_trips + server_response_time
//!
//! round_trips = 2   DNS + one round trip for the request
//!             + 1   TCP handshake (not for HTTP/3)
//!             + 1   TLS handshake (https only)
//! ```
//!
//! The estimate never undercuts what was actually observed: the result is
//! `max(observed, estimated)`. Connection reuse and 0-RTT resumption are not
//! modelled.

use tracing::debug;

use crate::collaborators::{
    BoxFuture, MainResourceResolver, NetworkAnalyzer, RecordMainResourceResolver,
    RecordNetworkAnalyzer,
};
use crate::context::{InputField, NavigationContext};
use crate::error::MetricError;
use crate::metric::{Metric, NavigationMetric};
use crate::resource::{MainResourceDescriptor, ProtocolFamily, Scheme};

/// Round trips for DNS resolution plus the request itself.
pub const BASE_ROUND_TRIPS: u32 = 2;

/// Time to First Byte estimator.
pub struct TimeToFirstByte<R = RecordMainResourceResolver, A = RecordNetworkAnalyzer> {
    resolver: R,
    analyzer: A,
}

impl TimeToFirstByte {
    /// Estimator backed by the record-based collaborators.
    pub fn from_records() -> Self {
        Self::new(RecordMainResourceResolver, RecordNetworkAnalyzer)
    }
}

impl Default for TimeToFirstByte {
    fn default() -> Self {
        Self::from_records()
    }
}

impl<R, A> TimeToFirstByte<R, A>
where
    R: MainResourceResolver,
    A: NetworkAnalyzer,
{
    pub fn new(resolver: R, analyzer: A) -> Self {
        Self { resolver, analyzer }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    /// Round trips needed to receive the first byte over a cold connection.
    pub fn round_trips(family: ProtocolFamily, scheme: Scheme) -> u32 {
        let mut round_trips = BASE_ROUND_TRIPS;
        if family != ProtocolFamily::Http3 {
            round_trips += 1;
        }
        if scheme == Scheme::Https {
            round_trips += 1;
        }
        round_trips
    }

    /// Observed TTFB of an already-resolved main resource.
    pub fn observed_for(
        main_resource: &MainResourceDescriptor,
        context: &NavigationContext,
    ) -> Result<Metric, MetricError> {
        let timing = main_resource
            .timing
            .as_ref()
            .ok_or_else(|| MetricError::MissingTiming {
                url: main_resource.url.clone(),
            })?;

        let timestamp = timing.headers_start_us();
        let ttfb = (timestamp - context.time_origin()) / 1000.0;
        Ok(Metric::observed(ttfb, timestamp))
    }
}

impl<R, A> NavigationMetric for TimeToFirstByte<R, A>
where
    R: MainResourceResolver,
    A: NetworkAnalyzer,
{
    const NAME: &'static str = "time-to-first-byte";

    const DECLARED_INPUTS: &'static [InputField] = &[
        InputField::DevtoolsLog,
        InputField::GatherMode,
        InputField::Settings,
        InputField::Simulator,
        InputField::ProcessedNavigation,
        InputField::Url,
    ];

    fn compute_observed<'a>(
        &'a self,
        context: &'a NavigationContext,
    ) -> BoxFuture<'a, Result<Metric, MetricError>> {
        Box::pin(async move {
            let main_resource = self.resolver.resolve(context).await?;
            let metric = Self::observed_for(&main_resource, context)?;
            debug!(ttfb_ms = metric.timing, "Observed TTFB");
            Ok(metric)
        })
    }

    fn compute_simulated<'a>(
        &'a self,
        context: &'a NavigationContext,
    ) -> BoxFuture<'a, Result<Metric, MetricError>> {
        Box::pin(async move {
            let (main_resource, analysis) = tokio::try_join!(
                self.resolver.resolve(context),
                self.analyzer.analyze(&context.devtools_log),
            )?;

            let observed = Self::observed_for(&main_resource, context)?.timing;
            let origin = &main_resource.origin;
            let server_response_time = analysis.server_response_time(origin).ok_or_else(|| {
                MetricError::MissingResponseTime {
                    origin: origin.to_string(),
                }
            })?;

            let round_trips = Self::round_trips(main_resource.protocol.family(), origin.scheme());
            let estimated =
                context.settings.throttling.rtt_ms * f64::from(round_trips) + server_response_time;
            let ttfb = observed.max(estimated);

            debug!(
                origin = %origin,
                protocol = %main_resource.protocol,
                round_trips,
                server_response_time_ms = server_response_time,
                observed_ms = observed,
                estimated_ms = estimated,
                ttfb_ms = ttfb,
                "Simulated TTFB"
            );

            Ok(Metric::simulated(ttfb))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::{Settings, ThrottlingSettings};
    use crate::network::NetworkAnalysis;
    use crate::resource::{Protocol, ResourceTiming, SecurityOrigin};

    /// Resolver returning a fixed descriptor.
    struct FixedResolver(Result<MainResourceDescriptor, MetricError>);

    impl MainResourceResolver for FixedResolver {
        fn resolve<'a>(
            &'a self,
            _context: &'a NavigationContext,
        ) -> BoxFuture<'a, Result<MainResourceDescriptor, MetricError>> {
            Box::pin(async move { self.0.clone() })
        }
    }

    /// Analyzer returning fixed server response times.
    struct FixedAnalyzer(Result<HashMap<SecurityOrigin, f64>, MetricError>);

    impl NetworkAnalyzer for FixedAnalyzer {
        fn analyze<'a>(
            &'a self,
            _records: &'a [crate::network::NetworkRecord],
        ) -> BoxFuture<'a, Result<NetworkAnalysis, MetricError>> {
            Box::pin(async move {
                self.0.clone().map(|times| NetworkAnalysis {
                    server_response_time_by_origin: times,
                    ..Default::default()
                })
            })
        }
    }

    type Fixture = TimeToFirstByte<FixedResolver, FixedAnalyzer>;

    /// Main resource whose headers arrive `observed_ms` after a time origin
    /// of 1s.
    fn main_resource(url: &str, protocol: &str, observed_ms: f64) -> MainResourceDescriptor {
        MainResourceDescriptor::new(url, Protocol::new(protocol))
            .unwrap()
            .with_timing(ResourceTiming::new(1.0, observed_ms))
    }

    fn context(rtt_ms: f64) -> NavigationContext {
        NavigationContext::new("https://example.com/", Vec::new(), 1_000_000.0).with_settings(
            Settings::default().with_throttling(ThrottlingSettings::default().with_rtt_ms(rtt_ms)),
        )
    }

    fn fixture(main: MainResourceDescriptor, srt: Option<f64>) -> Fixture {
        let mut times = HashMap::new();
        if let Some(srt) = srt {
            times.insert(main.origin.clone(), srt);
        }
        TimeToFirstByte::new(FixedResolver(Ok(main)), FixedAnalyzer(Ok(times)))
    }

    #[test]
    fn test_round_trip_table() {
        assert_eq!(Fixture::round_trips(ProtocolFamily::Http3, Scheme::Http), 2);
        assert_eq!(Fixture::round_trips(ProtocolFamily::Http3, Scheme::Https), 3);
        assert_eq!(Fixture::round_trips(ProtocolFamily::Tcp, Scheme::Http), 3);
        assert_eq!(Fixture::round_trips(ProtocolFamily::Tcp, Scheme::Https), 4);
    }

    #[tokio::test]
    async fn test_observed_ttfb() {
        let ttfb = fixture(main_resource("https://example.com/", "h2", 250.0), None);
        let ctx = NavigationContext::new("https://example.com/", Vec::new(), 500_000.0);

        let metric = ttfb.compute_observed(&ctx).await.unwrap();
        // Headers at 1.25s on the navigation clock, origin at 0.5s
        assert_eq!(metric.timestamp, Some(1_250_000.0));
        assert_eq!(metric.timing, 750.0);
    }

    #[tokio::test]
    async fn test_observed_missing_timing() {
        let main = MainResourceDescriptor::new("https://example.com/", Protocol::new("h2")).unwrap();
        let ttfb = fixture(main, Some(100.0));

        let result = ttfb.compute_observed(&context(150.0)).await;
        assert!(matches!(result, Err(MetricError::MissingTiming { .. })));
    }

    #[tokio::test]
    async fn test_simulated_tcp_https_estimate_dominates() {
        let ttfb = fixture(main_resource("https://example.com/", "h2", 650.0), Some(200.0));

        let metric = ttfb.compute_simulated(&context(150.0)).await.unwrap();
        // 150 × 4 + 200
        assert_eq!(metric.timing, 800.0);
        assert_eq!(metric.timestamp, None);
    }

    #[tokio::test]
    async fn test_simulated_h3_https_observation_dominates() {
        let ttfb = fixture(main_resource("https://example.com/", "h3", 300.0), Some(100.0));

        let metric = ttfb.compute_simulated(&context(50.0)).await.unwrap();
        // 50 × 3 + 100 = 250 < 300 observed
        assert_eq!(metric.timing, 300.0);
        assert_eq!(metric.timestamp, None);
    }

    #[tokio::test]
    async fn test_simulated_http_round_trips() {
        let h3 = fixture(main_resource("http://example.com/", "h3", 0.0), Some(10.0));
        assert_eq!(h3.compute_simulated(&context(100.0)).await.unwrap().timing, 210.0);

        let tcp = fixture(main_resource("http://example.com/", "http/1.1", 0.0), Some(10.0));
        assert_eq!(tcp.compute_simulated(&context(100.0)).await.unwrap().timing, 310.0);
    }

    #[tokio::test]
    async fn test_simulated_missing_response_time() {
        let ttfb = fixture(main_resource("https://example.com/", "h2", 300.0), None);

        let result = ttfb.compute_simulated(&context(150.0)).await;
        assert_eq!(
            result,
            Err(MetricError::MissingResponseTime {
                origin: "https://example.com".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_simulated_other_origin_is_not_substituted() {
        let main = main_resource("https://example.com/", "h2", 300.0);
        let mut times = HashMap::new();
        times.insert(SecurityOrigin::parse("https://cdn.example.com").unwrap(), 5.0);
        let ttfb = TimeToFirstByte::new(FixedResolver(Ok(main)), FixedAnalyzer(Ok(times)));

        let result = ttfb.compute_simulated(&context(150.0)).await;
        assert!(matches!(result, Err(MetricError::MissingResponseTime { .. })));
    }

    #[tokio::test]
    async fn test_simulated_missing_timing() {
        let main = MainResourceDescriptor::new("https://example.com/", Protocol::new("h2")).unwrap();
        let ttfb = fixture(main, Some(100.0));

        let result = ttfb.compute_simulated(&context(150.0)).await;
        assert!(matches!(result, Err(MetricError::MissingTiming { .. })));
    }

    #[tokio::test]
    async fn test_collaborator_errors_propagate_unchanged() {
        let not_found = MetricError::MainResourceNotFound {
            url: "https://example.com/".to_string(),
        };
        let ttfb = TimeToFirstByte::new(
            FixedResolver(Err(not_found.clone())),
            FixedAnalyzer(Ok(HashMap::new())),
        );
        assert_eq!(ttfb.compute_observed(&context(150.0)).await, Err(not_found));

        let analysis_failed = MetricError::NetworkAnalysisFailed("corrupt log".to_string());
        let ttfb = TimeToFirstByte::new(
            FixedResolver(Ok(main_resource("https://example.com/", "h2", 300.0))),
            FixedAnalyzer(Err(analysis_failed.clone())),
        );
        assert_eq!(
            ttfb.compute_simulated(&context(150.0)).await,
            Err(analysis_failed)
        );
    }

    #[tokio::test]
    async fn test_repeated_calls_are_identical() {
        let ttfb = fixture(main_resource("https://example.com/", "h2", 123.456), Some(78.9));
        let ctx = context(150.0);

        let first = ttfb.compute_simulated(&ctx).await.unwrap();
        let second = ttfb.compute_simulated(&ctx).await.unwrap();
        assert_eq!(first.timing.to_bits(), second.timing.to_bits());

        let first = ttfb.compute_observed(&ctx).await.unwrap();
        let second = ttfb.compute_observed(&ctx).await.unwrap();
        assert_eq!(first.timing.to_bits(), second.timing.to_bits());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn family() -> impl Strategy<Value = ProtocolFamily> {
            prop_oneof![Just(ProtocolFamily::Http3), Just(ProtocolFamily::Tcp)]
        }

        fn scheme() -> impl Strategy<Value = Scheme> {
            prop_oneof![Just(Scheme::Http), Just(Scheme::Https)]
        }

        proptest! {
            #[test]
            fn test_round_trips_in_range(family in family(), scheme in scheme()) {
                let round_trips = Fixture::round_trips(family, scheme);
                prop_assert!((2..=4).contains(&round_trips));
            }

            #[test]
            fn test_observed_formula(
                request_time in 0.0..10_000.0_f64,
                headers in 0.0..60_000.0_f64,
                time_origin in 0.0..1e10_f64,
            ) {
                let main = MainResourceDescriptor::new("https://example.com/", Protocol::new("h2"))
                    .unwrap()
                    .with_timing(ResourceTiming::new(request_time, headers));
                let ctx = NavigationContext::new("https://example.com/", Vec::new(), time_origin);

                let metric = Fixture::observed_for(&main, &ctx).unwrap();
                let expected = ((request_time * 1000.0 + headers) * 1000.0 - time_origin) / 1000.0;
                prop_assert_eq!(metric.timing.to_bits(), expected.to_bits());
            }

            #[test]
            fn test_simulated_is_max_of_observed_and_estimate(
                observed in 0.0..10_000.0_f64,
                rtt in 0.0..1_000.0_f64,
                srt in 0.0..5_000.0_f64,
                h3 in any::<bool>(),
                https in any::<bool>(),
            ) {
                let url = if https { "https://example.com/" } else { "http://example.com/" };
                let protocol = if h3 { "h3" } else { "h2" };
                let main = main_resource(url, protocol, observed);
                let round_trips = Fixture::round_trips(
                    main.protocol.family(),
                    main.origin.scheme(),
                );
                let ttfb = fixture(main, Some(srt));
                let ctx = context(rtt);

                let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
                let metric = runtime.block_on(ttfb.compute_simulated(&ctx)).unwrap();

                let observed_timing = ((1.0 * 1000.0 + observed) * 1000.0 - 1_000_000.0) / 1000.0;
                let expected = observed_timing.max(rtt * f64::from(round_trips) + srt);
                prop_assert_eq!(metric.timing.to_bits(), expected.to_bits());
                prop_assert!(metric.timing >= observed_timing);
            }
        }
    }
}
