//! Run settings and estimator configuration.
//!
//! [`Settings`] travels inside every [`NavigationContext`](crate::context::NavigationContext)
//! and is part of the cache key, so it is `Serialize`. [`EstimatorConfig`]
//! configures the estimator itself (cache sizing) and is never hashed.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::MetricError;

// =============================================================================
// Throttling Presets
// =============================================================================

/// Round-trip time of the mobile "slow 4G" preset (ms).
pub const MOBILE_SLOW_4G_RTT_MS: f64 = 150.0;

/// Throughput of the mobile "slow 4G" preset (Kbps).
pub const MOBILE_SLOW_4G_THROUGHPUT_KBPS: f64 = 1.6 * 1024.0;

/// Round-trip time of the desktop "dense 4G" preset (ms).
pub const DESKTOP_DENSE_4G_RTT_MS: f64 = 40.0;

/// Throughput of the desktop "dense 4G" preset (Kbps).
pub const DESKTOP_DENSE_4G_THROUGHPUT_KBPS: f64 = 10.0 * 1024.0;

// =============================================================================
// Estimator Defaults
// =============================================================================

/// Default number of metric results kept by the computed-metric cache.
pub const DEFAULT_CACHE_CAPACITY: u64 = 1024;

/// Environment variable overriding the cache capacity.
pub const ENV_CACHE_CAPACITY: &str = "NAVMETRICS_CACHE_CAPACITY";

/// Environment variable setting a cache time-to-live in seconds.
pub const ENV_CACHE_TTL_SECS: &str = "NAVMETRICS_CACHE_TTL_SECS";

/// How network and CPU throttling was applied for the run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrottlingMethod {
    /// Page loaded unthrottled; metrics are simulated afterwards.
    #[default]
    Simulate,
    /// Throttling applied by the browser during the load.
    Devtools,
    /// Throttling applied externally (or none at all).
    Provided,
}

/// Device class the run emulates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormFactor {
    #[default]
    Mobile,
    Desktop,
}

/// Network and CPU throttling parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottlingSettings {
    /// Round-trip time used by simulation (ms).
    pub rtt_ms: f64,
    /// Throughput used by simulation (Kbps).
    pub throughput_kbps: f64,
    /// Request latency applied by browser throttling (ms).
    pub request_latency_ms: f64,
    /// Download throughput applied by browser throttling (Kbps).
    pub download_throughput_kbps: f64,
    /// Upload throughput applied by browser throttling (Kbps).
    pub upload_throughput_kbps: f64,
    /// CPU slowdown factor.
    pub cpu_slowdown_multiplier: f64,
}

impl ThrottlingSettings {
    /// Slow 4G mobile connection on a mid-tier device.
    pub fn mobile_slow_4g() -> Self {
        Self {
            rtt_ms: MOBILE_SLOW_4G_RTT_MS,
            throughput_kbps: MOBILE_SLOW_4G_THROUGHPUT_KBPS,
            // Browser throttling underestimates real-world latency, so the
            // applied values are adjusted from the simulated ones.
            request_latency_ms: MOBILE_SLOW_4G_RTT_MS * 3.75,
            download_throughput_kbps: MOBILE_SLOW_4G_THROUGHPUT_KBPS * 0.9,
            upload_throughput_kbps: 750.0 * 0.9,
            cpu_slowdown_multiplier: 4.0,
        }
    }

    /// Dense 4G connection on a desktop-class device.
    pub fn desktop_dense_4g() -> Self {
        Self {
            rtt_ms: DESKTOP_DENSE_4G_RTT_MS,
            throughput_kbps: DESKTOP_DENSE_4G_THROUGHPUT_KBPS,
            request_latency_ms: 0.0,
            download_throughput_kbps: 0.0,
            upload_throughput_kbps: 0.0,
            cpu_slowdown_multiplier: 1.0,
        }
    }

    /// Set the simulated round-trip time.
    pub fn with_rtt_ms(mut self, rtt_ms: f64) -> Self {
        self.rtt_ms = rtt_ms;
        self
    }
}

impl Default for ThrottlingSettings {
    fn default() -> Self {
        Self::mobile_slow_4g()
    }
}

/// Settings for a single run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// How throttling was applied.
    pub throttling_method: ThrottlingMethod,
    /// Throttling parameters.
    pub throttling: ThrottlingSettings,
    /// Emulated device class.
    pub form_factor: FormFactor,
}

impl Settings {
    /// Default desktop settings.
    pub fn desktop() -> Self {
        Self {
            throttling_method: ThrottlingMethod::Simulate,
            throttling: ThrottlingSettings::desktop_dense_4g(),
            form_factor: FormFactor::Desktop,
        }
    }

    /// Parse settings from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, MetricError> {
        serde_json::from_str(json).map_err(|e| MetricError::Config(e.to_string()))
    }

    /// Set the throttling method.
    pub fn with_throttling_method(mut self, method: ThrottlingMethod) -> Self {
        self.throttling_method = method;
        self
    }

    /// Set the throttling parameters.
    pub fn with_throttling(mut self, throttling: ThrottlingSettings) -> Self {
        self.throttling = throttling;
        self
    }
}

/// Configuration for the estimator's computed-metric cache.
#[derive(Clone, Debug, PartialEq)]
pub struct EstimatorConfig {
    /// Maximum number of cached metric results.
    pub cache_capacity: u64,

    /// Optional time-to-live for cached results.
    pub cache_ttl: Option<Duration>,
}

impl EstimatorConfig {
    /// Build a config from environment variables, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key/value source.
    ///
    /// A capacity of zero would turn the cache into a pass-through, so it
    /// falls back to [`DEFAULT_CACHE_CAPACITY`]. A TTL of zero means no TTL.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let cache_capacity = match parse_u64(&lookup, ENV_CACHE_CAPACITY) {
            Some(0) => {
                warn!(
                    key = ENV_CACHE_CAPACITY,
                    default = DEFAULT_CACHE_CAPACITY,
                    "Cache capacity of zero ignored, using default"
                );
                DEFAULT_CACHE_CAPACITY
            }
            Some(capacity) => capacity,
            None => DEFAULT_CACHE_CAPACITY,
        };
        let cache_ttl = parse_u64(&lookup, ENV_CACHE_TTL_SECS)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self {
            cache_capacity,
            cache_ttl,
        }
    }

    /// Set the cache capacity.
    pub fn with_cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set the cache time-to-live.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: None,
        }
    }
}

fn parse_u64<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "Ignoring unparsable config value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_mobile_simulate() {
        let settings = Settings::default();
        assert_eq!(settings.throttling_method, ThrottlingMethod::Simulate);
        assert_eq!(settings.form_factor, FormFactor::Mobile);
        assert_eq!(settings.throttling.rtt_ms, 150.0);
        assert_eq!(settings.throttling.throughput_kbps, 1638.4);
        assert_eq!(settings.throttling.cpu_slowdown_multiplier, 4.0);
    }

    #[test]
    fn test_desktop_preset() {
        let settings = Settings::desktop();
        assert_eq!(settings.form_factor, FormFactor::Desktop);
        assert_eq!(settings.throttling.rtt_ms, 40.0);
        assert_eq!(settings.throttling.throughput_kbps, 10240.0);
        assert_eq!(settings.throttling.cpu_slowdown_multiplier, 1.0);
    }

    #[test]
    fn test_settings_from_json_partial() {
        let settings =
            Settings::from_json(r#"{"throttling_method":"devtools","throttling":{"rtt_ms":50}}"#)
                .unwrap();
        assert_eq!(settings.throttling_method, ThrottlingMethod::Devtools);
        assert_eq!(settings.throttling.rtt_ms, 50.0);
        // Unspecified throttling fields come from the mobile preset
        assert_eq!(settings.throttling.throughput_kbps, 1638.4);
        assert_eq!(settings.form_factor, FormFactor::Mobile);
    }

    #[test]
    fn test_settings_from_json_invalid() {
        let result = Settings::from_json(r#"{"throttling_method":"warp"}"#);
        assert!(matches!(result, Err(MetricError::Config(_))));
    }

    #[test]
    fn test_estimator_config_builder() {
        let config = EstimatorConfig::default()
            .with_cache_capacity(16)
            .with_cache_ttl(Duration::from_secs(30));
        assert_eq!(config.cache_capacity, 16);
        assert_eq!(config.cache_ttl, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_estimator_config_default() {
        let config = EstimatorConfig::default();
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
        assert!(config.cache_ttl.is_none());
    }

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_from_lookup_reads_values() {
        let config = EstimatorConfig::from_lookup(lookup(&[
            (ENV_CACHE_CAPACITY, " 64 "),
            (ENV_CACHE_TTL_SECS, "30"),
        ]));
        assert_eq!(config.cache_capacity, 64);
        assert_eq!(config.cache_ttl, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_from_lookup_unset_uses_defaults() {
        let config = EstimatorConfig::from_lookup(lookup(&[]));
        assert_eq!(config, EstimatorConfig::default());
    }

    #[test]
    fn test_from_lookup_zero_values() {
        let config = EstimatorConfig::from_lookup(lookup(&[
            (ENV_CACHE_CAPACITY, "0"),
            (ENV_CACHE_TTL_SECS, "0"),
        ]));
        assert_eq!(config.cache_capacity, DEFAULT_CACHE_CAPACITY);
        assert!(config.cache_ttl.is_none());
    }

    #[test]
    fn test_from_lookup_garbage_values() {
        let config = EstimatorConfig::from_lookup(lookup(&[
            (ENV_CACHE_CAPACITY, "lots"),
            (ENV_CACHE_TTL_SECS, "-5"),
        ]));
        assert_eq!(config, EstimatorConfig::default());
    }

    #[test]
    fn test_from_env_reads_process_environment() {
        // Only test touching these variables
        std::env::set_var(ENV_CACHE_CAPACITY, "12");
        std::env::set_var(ENV_CACHE_TTL_SECS, "7");
        let config = EstimatorConfig::from_env();
        std::env::remove_var(ENV_CACHE_CAPACITY);
        std::env::remove_var(ENV_CACHE_TTL_SECS);

        assert_eq!(config.cache_capacity, 12);
        assert_eq!(config.cache_ttl, Some(Duration::from_secs(7)));
    }
}
