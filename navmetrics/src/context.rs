//! Per-navigation input bundle.
//!
//! A [`NavigationContext`] is built once by the caller and shared read-only
//! by every metric computed for the navigation. Each metric declares which
//! of its fields it reads ([`InputField`]); the computed-metric cache hashes
//! exactly those fields to build its key.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::MetricError;
use crate::network::NetworkRecord;

/// How the page was captured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatherMode {
    /// A full page load.
    #[default]
    Navigation,
    /// A window of user interaction without a load.
    Timespan,
    /// A single point-in-time capture of the page.
    Snapshot,
}

impl fmt::Display for GatherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatherMode::Navigation => write!(f, "navigation"),
            GatherMode::Timespan => write!(f, "timespan"),
            GatherMode::Snapshot => write!(f, "snapshot"),
        }
    }
}

/// Network simulator parameters.
///
/// Fields left unset fall back to what the network analysis observed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorOptions {
    pub rtt_ms: Option<f64>,
    pub throughput_kbps: Option<f64>,
    pub max_concurrent_requests: Option<usize>,
    pub cpu_slowdown_multiplier: Option<f64>,
}

impl SimulatorOptions {
    /// Simulator options matching the run's throttling settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            rtt_ms: Some(settings.throttling.rtt_ms),
            throughput_kbps: Some(settings.throttling.throughput_kbps),
            max_concurrent_requests: None,
            cpu_slowdown_multiplier: Some(settings.throttling.cpu_slowdown_multiplier),
        }
    }
}

/// Key timestamps of the processed navigation, in microseconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationTimestamps {
    /// Navigation start; relative timings are measured from here.
    pub time_origin: f64,
    pub first_contentful_paint: Option<f64>,
    pub load: Option<f64>,
}

/// The navigation after trace processing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessedNavigation {
    pub timestamps: NavigationTimestamps,
}

impl ProcessedNavigation {
    pub fn with_time_origin(time_origin: f64) -> Self {
        Self {
            timestamps: NavigationTimestamps {
                time_origin,
                ..Default::default()
            },
        }
    }
}

/// URLs of the navigation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationUrls {
    /// URL the navigation was started with.
    pub requested_url: String,
    /// URL of the document that finally loaded, after redirects.
    pub main_document_url: String,
}

/// Context fields a metric may declare as inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputField {
    DevtoolsLog,
    GatherMode,
    Settings,
    Simulator,
    ProcessedNavigation,
    Url,
}

impl InputField {
    pub fn name(&self) -> &'static str {
        match self {
            InputField::DevtoolsLog => "devtools_log",
            InputField::GatherMode => "gather_mode",
            InputField::Settings => "settings",
            InputField::Simulator => "simulator",
            InputField::ProcessedNavigation => "processed_navigation",
            InputField::Url => "url",
        }
    }
}

/// Everything known about one navigation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationContext {
    /// Network requests recorded during the load.
    pub devtools_log: Vec<NetworkRecord>,
    pub gather_mode: GatherMode,
    pub settings: Settings,
    pub simulator: SimulatorOptions,
    pub processed_navigation: ProcessedNavigation,
    pub url: NavigationUrls,
}

impl NavigationContext {
    /// A navigation of `url` with default settings.
    ///
    /// The requested and final document URLs are both set to `url`.
    pub fn new(url: impl Into<String>, devtools_log: Vec<NetworkRecord>, time_origin: f64) -> Self {
        let url = url.into();
        let settings = Settings::default();
        Self {
            devtools_log,
            gather_mode: GatherMode::Navigation,
            simulator: SimulatorOptions::from_settings(&settings),
            settings,
            processed_navigation: ProcessedNavigation::with_time_origin(time_origin),
            url: NavigationUrls {
                requested_url: url.clone(),
                main_document_url: url,
            },
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.simulator = SimulatorOptions::from_settings(&settings);
        self.settings = settings;
        self
    }

    pub fn with_gather_mode(mut self, gather_mode: GatherMode) -> Self {
        self.gather_mode = gather_mode;
        self
    }

    pub fn with_simulator(mut self, simulator: SimulatorOptions) -> Self {
        self.simulator = simulator;
        self
    }

    /// Record a redirect: the final document differs from the requested URL.
    pub fn with_main_document_url(mut self, url: impl Into<String>) -> Self {
        self.url.main_document_url = url.into();
        self
    }

    /// Navigation start in microseconds.
    pub fn time_origin(&self) -> f64 {
        self.processed_navigation.timestamps.time_origin
    }

    /// Serialized form of a single input field.
    ///
    /// JSON writes every non-finite float as `null`, so NaN and infinity
    /// would serialize identically. Fields holding one are rejected.
    pub fn field_bytes(&self, field: InputField) -> Result<Vec<u8>, MetricError> {
        if let Some((name, value)) = self
            .field_floats(field)
            .into_iter()
            .find(|(_, value)| !value.is_finite())
        {
            return Err(MetricError::KeyDerivation(format!(
                "{}: {} is not finite ({})",
                field.name(),
                name,
                value
            )));
        }

        let bytes = match field {
            InputField::DevtoolsLog => serde_json::to_vec(&self.devtools_log),
            InputField::GatherMode => serde_json::to_vec(&self.gather_mode),
            InputField::Settings => serde_json::to_vec(&self.settings),
            InputField::Simulator => serde_json::to_vec(&self.simulator),
            InputField::ProcessedNavigation => serde_json::to_vec(&self.processed_navigation),
            InputField::Url => serde_json::to_vec(&self.url),
        };
        bytes.map_err(|e| MetricError::KeyDerivation(format!("{}: {}", field.name(), e)))
    }

    /// Every float carried by `field`, labelled for error messages.
    fn field_floats(&self, field: InputField) -> Vec<(&'static str, f64)> {
        match field {
            InputField::DevtoolsLog => self
                .devtools_log
                .iter()
                .flat_map(|record| {
                    let mut floats = vec![("end_time", record.end_time)];
                    if let Some(timing) = &record.timing {
                        floats.extend([
                            ("request_time", timing.request_time),
                            ("send_end", timing.send_end),
                            ("receive_headers_start", timing.receive_headers_start),
                        ]);
                        floats.extend(timing.connect_start.map(|v| ("connect_start", v)));
                        floats.extend(timing.connect_end.map(|v| ("connect_end", v)));
                    }
                    floats
                })
                .collect(),
            InputField::Settings => {
                let t = &self.settings.throttling;
                vec![
                    ("rtt_ms", t.rtt_ms),
                    ("throughput_kbps", t.throughput_kbps),
                    ("request_latency_ms", t.request_latency_ms),
                    ("download_throughput_kbps", t.download_throughput_kbps),
                    ("upload_throughput_kbps", t.upload_throughput_kbps),
                    ("cpu_slowdown_multiplier", t.cpu_slowdown_multiplier),
                ]
            }
            InputField::Simulator => [
                ("rtt_ms", self.simulator.rtt_ms),
                ("throughput_kbps", self.simulator.throughput_kbps),
                ("cpu_slowdown_multiplier", self.simulator.cpu_slowdown_multiplier),
            ]
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)))
            .collect(),
            InputField::ProcessedNavigation => {
                let ts = &self.processed_navigation.timestamps;
                let mut floats = vec![("time_origin", ts.time_origin)];
                floats.extend(ts.first_contentful_paint.map(|v| ("first_contentful_paint", v)));
                floats.extend(ts.load.map(|v| ("load", v)));
                floats
            }
            InputField::GatherMode | InputField::Url => Vec::new(),
        }
    }
}
