//! Resolved metadata for network resources.
//!
//! A [`MainResourceDescriptor`] is what the estimator knows about the
//! primary document: where it came from ([`SecurityOrigin`]), how it was
//! fetched ([`Protocol`]) and, when a network round trip happened, when its
//! response headers started arriving ([`ResourceTiming`]).

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::MetricError;

/// URL scheme of a document request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// Default port for the scheme.
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheme + host + port tuple used to group requests by server.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecurityOrigin {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl SecurityOrigin {
    /// Create an origin from its parts.
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }

    /// Parse the origin of an `http` or `https` URL.
    pub fn parse(input: &str) -> Result<Self, MetricError> {
        let url =
            Url::parse(input).map_err(|e| MetricError::InvalidUrl(format!("{}: {}", input, e)))?;

        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => {
                return Err(MetricError::InvalidUrl(format!(
                    "unsupported scheme '{}' in {}",
                    other, input
                )))
            }
        };

        let host = url
            .host_str()
            .ok_or_else(|| MetricError::InvalidUrl(format!("missing host in {}", input)))?;
        let port = url.port_or_known_default().unwrap_or(scheme.default_port());

        Ok(Self::new(scheme, host, port))
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for SecurityOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == self.scheme.default_port() {
            write!(f, "{}://{}", self.scheme, self.host)
        } else {
            write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
        }
    }
}

/// Transport family a protocol runs over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolFamily {
    /// QUIC-based HTTP/3 (`h3`, `h3-29`, ...).
    Http3,
    /// Anything carried over TCP (`http/1.1`, `h2`, ...).
    Tcp,
}

/// Negotiated application protocol, as reported by the network stack.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Protocol(String);

impl Protocol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Transport family of this protocol.
    ///
    /// Every `h3` draft identifier is HTTP/3; unknown identifiers are
    /// treated as TCP-based.
    pub fn family(&self) -> ProtocolFamily {
        if self.0.to_ascii_lowercase().starts_with("h3") {
            ProtocolFamily::Http3
        } else {
            ProtocolFamily::Tcp
        }
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::new("http/1.1")
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Network timing captured for a single request.
///
/// `request_time` is in seconds on the navigation clock; every other field
/// is a millisecond offset from `request_time`. Connection fields are absent
/// when the request reused an existing connection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceTiming {
    pub request_time: f64,
    pub connect_start: Option<f64>,
    pub connect_end: Option<f64>,
    pub send_end: f64,
    pub receive_headers_start: f64,
}

impl ResourceTiming {
    pub fn new(request_time: f64, receive_headers_start: f64) -> Self {
        Self {
            request_time,
            receive_headers_start,
            ..Default::default()
        }
    }

    /// Record the TCP connection window.
    pub fn with_connection(mut self, connect_start: f64, connect_end: f64) -> Self {
        self.connect_start = Some(connect_start);
        self.connect_end = Some(connect_end);
        self
    }

    /// Record when the request finished sending.
    pub fn with_send_end(mut self, send_end: f64) -> Self {
        self.send_end = send_end;
        self
    }

    /// Absolute time the response headers started arriving, in microseconds.
    pub fn headers_start_us(&self) -> f64 {
        let timestamp_ms = self.request_time * 1000.0 + self.receive_headers_start;
        timestamp_ms * 1000.0
    }

    /// Handshake duration (ms), if this request opened a connection.
    pub fn connection_ms(&self) -> Option<f64> {
        match (self.connect_start, self.connect_end) {
            (Some(start), Some(end)) if end >= start => Some(end - start),
            _ => None,
        }
    }
}

/// The primary document of a navigation.
#[derive(Clone, Debug, PartialEq)]
pub struct MainResourceDescriptor {
    pub url: String,
    pub origin: SecurityOrigin,
    pub protocol: Protocol,
    /// Absent when the document was served without a network round trip.
    pub timing: Option<ResourceTiming>,
}

impl MainResourceDescriptor {
    /// Describe a document fetched from `url` over `protocol`.
    pub fn new(url: impl Into<String>, protocol: Protocol) -> Result<Self, MetricError> {
        let url = url.into();
        let origin = SecurityOrigin::parse(&url)?;
        Ok(Self {
            url,
            origin,
            protocol,
            timing: None,
        })
    }

    pub fn with_timing(mut self, timing: ResourceTiming) -> Self {
        self.timing = Some(timing);
        self
    }
}
