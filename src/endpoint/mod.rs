//! Endpoint descriptors and the measured outcome of one check cycle.
//!
//! An [`Endpoint`] is the immutable input handed to the prober. Every check
//! produces a fresh [`Outcome`]; the two are only joined into an
//! [`EndpointResult`] when results are handed back to the caller.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// SNI used when neither the caller nor an import file supplies one.
pub const DEFAULT_SERVER_NAME: &str = "vasya2.vaskeshu.ru";

/// Transport path used when none is supplied.
pub const DEFAULT_PATH: &str = "/";

/// One probe target plus the connection settings carried through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub server: String,
    pub server_port: u16,
    pub uuid: String,
    pub server_name: String,
    pub path: String,
    pub tag: String,
}

/// Shared credential/SNI/path settings applied to every endpoint of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defaults {
    pub uuid: String,
    pub server_name: String,
    pub path: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            uuid: String::new(),
            server_name: DEFAULT_SERVER_NAME.to_string(),
            path: DEFAULT_PATH.to_string(),
        }
    }
}

impl Endpoint {
    pub fn new(server: impl Into<String>, server_port: u16) -> Self {
        let defaults = Defaults::default();
        Self {
            server: server.into(),
            server_port,
            uuid: defaults.uuid,
            server_name: defaults.server_name,
            path: defaults.path,
            tag: String::new(),
        }
    }

    /// Build one descriptor per `(address, port)` pair, tagged `Server-1`,
    /// `Server-2`, ... in input order.
    pub fn from_pairs(pairs: &[(String, u16)], defaults: &Defaults) -> Vec<Self> {
        pairs
            .iter()
            .enumerate()
            .map(|(i, (server, port))| Self {
                server: server.clone(),
                server_port: *port,
                uuid: defaults.uuid.clone(),
                server_name: defaults.server_name.clone(),
                path: defaults.path.clone(),
                tag: format!("Server-{}", i + 1),
            })
            .collect()
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// `host:port` as used in logs, progress messages and reports.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.server_port)
    }
}

/// Terminal classification of one endpoint's check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Unknown,
    Ok,
    Unreachable,
    Timeout,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unknown => "unknown",
            Status::Ok => "ok",
            Status::Unreachable => "unreachable",
            Status::Timeout => "timeout",
            Status::Error => "error",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(Status::Unknown),
            "ok" => Ok(Status::Ok),
            "unreachable" => Ok(Status::Unreachable),
            "timeout" => Ok(Status::Timeout),
            "error" => Ok(Status::Error),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// Measured fields for one endpoint, written once per check cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Outcome {
    pub status: Status,
    pub latency_ms: f64,
    pub speed_mbps: f64,
}

impl Outcome {
    pub fn ok(latency_ms: f64, speed_mbps: f64) -> Self {
        Self {
            status: Status::Ok,
            latency_ms,
            speed_mbps,
        }
    }

    /// Connection step failed: nothing was measured.
    pub fn unreachable() -> Self {
        Self {
            status: Status::Unreachable,
            latency_ms: 0.0,
            speed_mbps: 0.0,
        }
    }

    pub fn timeout(latency_ms: f64) -> Self {
        Self {
            status: Status::Timeout,
            latency_ms,
            speed_mbps: 0.0,
        }
    }

    pub fn error(latency_ms: f64) -> Self {
        Self {
            status: Status::Error,
            latency_ms,
            speed_mbps: 0.0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

/// A descriptor joined with the outcome of its check.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointResult {
    pub endpoint: Endpoint,
    pub outcome: Outcome,
}

impl EndpointResult {
    pub fn new(endpoint: Endpoint, outcome: Outcome) -> Self {
        Self { endpoint, outcome }
    }

    pub fn status(&self) -> Status {
        self.outcome.status
    }

    pub fn speed_mbps(&self) -> f64 {
        self.outcome.speed_mbps
    }

    pub fn latency_ms(&self) -> f64 {
        self.outcome.latency_ms
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn address(&self) -> String {
        self.endpoint.address()
    }
}
