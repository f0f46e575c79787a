//! proxyprobe -- concurrent reachability, latency and throughput checks for
//! lists of proxy endpoints.
//!
//! The crate is split into the endpoint model, the concurrent prober, the
//! result pipeline (filter/rank/persist), importers for endpoint lists, and
//! a TOML configuration layer.

pub mod config;
pub mod endpoint;
pub mod import;
pub mod probes;
pub mod results;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use endpoint::{Endpoint, EndpointResult};
use probes::{ProbeConfig, Prober, ProgressSink};
use results::{SpeedBounds, Summary};

/// Everything produced by one batch.
#[derive(Debug, Clone)]
pub struct CheckReport {
    /// Input order.
    pub results: Vec<EndpointResult>,
    /// Successes fastest first, then failures in input order.
    pub ranked: Vec<EndpointResult>,
    /// `ok` results inside the speed bounds, fastest first.
    pub filtered: Vec<EndpointResult>,
    pub summary: Summary,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

/// Files written by [`CheckReport::save`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct SavedFiles {
    pub all: Option<(PathBuf, PathBuf)>,
    pub filtered: Option<(PathBuf, PathBuf)>,
}

impl CheckReport {
    pub fn new(results: Vec<EndpointResult>, bounds: SpeedBounds) -> Self {
        let ranked = results::rank_for_display(&results);
        let filtered = results::filter(&results, bounds);
        let summary = Summary::new(&results, &filtered);
        Self {
            results,
            ranked,
            filtered,
            summary,
            checked_at: chrono::Utc::now(),
        }
    }

    /// Persist the full result set and, when non-empty, the filtered set.
    pub fn save(&self, output: &config::OutputSection) -> Result<SavedFiles> {
        let mut saved = SavedFiles::default();

        if self.results.is_empty() {
            warn!("No results to save");
            return Ok(saved);
        }
        saved.all = Some(results::persist(&self.results, output.all_path())?);

        if self.filtered.is_empty() {
            warn!("No servers matched the speed filter, skipping filtered output");
        } else {
            saved.filtered = Some(results::persist(&self.filtered, output.filtered_path())?);
        }

        Ok(saved)
    }
}

/// Probe `endpoints` concurrently and rank/filter the outcome.
pub async fn run_check(
    endpoints: Vec<Endpoint>,
    probe: ProbeConfig,
    bounds: SpeedBounds,
    progress: Option<Arc<dyn ProgressSink>>,
) -> Result<CheckReport> {
    let prober = Prober::new(probe);
    info!(
        count = endpoints.len(),
        timeout = ?prober.config().timeout,
        test_url = %prober.config().test_url,
        verify_tls = prober.config().verify_tls,
        "Starting check"
    );

    let results = prober.check_batch(endpoints, progress).await?;
    let report = CheckReport::new(results, bounds);

    info!(summary = %report.summary, "Check complete");
    Ok(report)
}
