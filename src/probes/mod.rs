//! Concurrent endpoint checks: TCP latency followed by a reference download.

use crate::endpoint::{Endpoint, EndpointResult, Outcome, Status};
use futures::future::join_all;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

pub mod http;
pub mod tcp;

/// Reference resource for the throughput sample (~1 MiB).
pub const DEFAULT_TEST_URL: &str = "https://speed.cloudflare.com/__down?bytes=1048576";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a single endpoint check did not produce a speed sample.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("endpoint unreachable")]
    Unreachable,

    #[error("deadline exceeded")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ProbeError {
    pub fn status(&self) -> Status {
        match self {
            ProbeError::Unreachable => Status::Unreachable,
            ProbeError::Timeout => Status::Timeout,
            ProbeError::Protocol(_) => Status::Error,
        }
    }
}

/// Caller misuse, reported before any probing starts.
#[derive(Debug, Error, PartialEq)]
pub enum CheckError {
    #[error("no endpoints to check")]
    EmptyEndpointList,
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Deadline applied separately to the connect step and the download step.
    pub timeout: Duration,
    pub test_url: String,
    /// Certificate checks for the reference download.
    pub verify_tls: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            test_url: DEFAULT_TEST_URL.to_string(),
            verify_tls: false,
        }
    }
}

/// Receives a human-readable line before each endpoint check starts.
///
/// Called concurrently from every check task. Implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn notify(&self, message: &str) {
        self(message)
    }
}

/// Forwards progress lines into an unbounded channel; a closed receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink(pub UnboundedSender<String>);

impl ProgressSink for ChannelSink {
    fn notify(&self, message: &str) {
        let _ = self.0.send(message.to_string());
    }
}

fn notify_progress(sink: Option<&dyn ProgressSink>, message: &str) {
    if let Some(sink) = sink {
        if std::panic::catch_unwind(AssertUnwindSafe(|| sink.notify(message))).is_err() {
            debug!("Progress sink panicked, ignoring");
        }
    }
}

/// One endpoint check, producing a terminal outcome. Never fails.
#[async_trait::async_trait]
pub trait EndpointCheck: Send + Sync {
    async fn check(&self, endpoint: &Endpoint) -> Outcome;
}

/// Network-backed checker.
#[derive(Debug, Clone, Default)]
pub struct Prober {
    config: ProbeConfig,
}

impl Prober {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub async fn check_latency(&self, host: &str, port: u16) -> tcp::TcpResult {
        tcp::check_latency(host, port, self.config.timeout).await
    }

    /// Full check for one endpoint.
    ///
    /// Unreachable endpoints skip the download entirely. Reachable ones keep
    /// their latency even if the download then fails.
    pub async fn measure_throughput(&self, endpoint: &Endpoint) -> Outcome {
        let addr = endpoint.address();

        let latency = self.check_latency(&endpoint.server, endpoint.server_port).await;
        if !latency.reachable {
            warn!(server = %addr, "Endpoint unreachable");
            return Outcome::unreachable();
        }

        match http::download(&self.config.test_url, self.config.timeout, self.config.verify_tls).await {
            Ok(sample) => {
                let speed = sample.speed_mbps();
                info!(
                    server = %addr,
                    speed_mbps = speed,
                    latency_ms = latency.latency_ms,
                    bytes = sample.bytes,
                    "Endpoint ok"
                );
                Outcome::ok(latency.latency_ms, speed)
            }
            Err(e) => {
                match &e {
                    ProbeError::Timeout => warn!(server = %addr, "Throughput probe timed out"),
                    other => error!(server = %addr, error = %other, "Throughput probe failed"),
                }
                match e.status() {
                    Status::Timeout => Outcome::timeout(latency.latency_ms),
                    _ => Outcome::error(latency.latency_ms),
                }
            }
        }
    }

    pub async fn check_batch(
        &self,
        endpoints: Vec<Endpoint>,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<Vec<EndpointResult>, CheckError> {
        check_batch(Arc::new(self.clone()), endpoints, progress).await
    }
}

#[async_trait::async_trait]
impl EndpointCheck for Prober {
    async fn check(&self, endpoint: &Endpoint) -> Outcome {
        self.measure_throughput(endpoint).await
    }
}

/// Check every endpoint concurrently, one task each, and return the results in
/// input order.
///
/// Each task owns its own deadline; one slow or failing endpoint never
/// cancels its siblings. A task that dies unexpectedly is logged and left out,
/// so the result can be shorter than the input but is never reordered.
pub async fn check_batch<C>(
    checker: Arc<C>,
    endpoints: Vec<Endpoint>,
    progress: Option<Arc<dyn ProgressSink>>,
) -> Result<Vec<EndpointResult>, CheckError>
where
    C: EndpointCheck + ?Sized + 'static,
{
    if endpoints.is_empty() {
        return Err(CheckError::EmptyEndpointList);
    }

    let total = endpoints.len();
    info!(count = total, "Checking endpoints");

    let handles: Vec<_> = endpoints
        .into_iter()
        .map(|endpoint| {
            let checker = Arc::clone(&checker);
            let progress = progress.clone();
            tokio::spawn(async move {
                notify_progress(
                    progress.as_deref(),
                    &format!("Checking {}...", endpoint.address()),
                );
                let outcome = checker.check(&endpoint).await;
                EndpointResult::new(endpoint, outcome)
            })
        })
        .collect();

    let mut results = Vec::with_capacity(total);
    for joined in join_all(handles).await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => warn!(error = %e, "Check task failed, dropping it from the batch"),
        }
    }

    let ok = results.iter().filter(|r| r.is_ok()).count();
    info!(total, returned = results.len(), ok, "Batch complete");

    Ok(results)
}
