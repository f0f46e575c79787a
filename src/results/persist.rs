//! Result files: a JSON array for machines and a ranked text report for people.

use super::sort_by_speed;
use crate::endpoint::{Endpoint, EndpointResult, Outcome, Status};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

const RULE_WIDTH: usize = 80;

/// On-disk shape of one result. Field order is the file's key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub server: String,
    pub server_port: u16,
    pub uuid: String,
    pub server_name: String,
    pub path: String,
    pub speed_mbps: f64,
    pub latency_ms: f64,
    pub status: Status,
    pub tag: String,
}

impl From<&EndpointResult> for ResultRecord {
    fn from(r: &EndpointResult) -> Self {
        Self {
            server: r.endpoint.server.clone(),
            server_port: r.endpoint.server_port,
            uuid: r.endpoint.uuid.clone(),
            server_name: r.endpoint.server_name.clone(),
            path: r.endpoint.path.clone(),
            speed_mbps: r.outcome.speed_mbps,
            latency_ms: r.outcome.latency_ms,
            status: r.outcome.status,
            tag: r.endpoint.tag.clone(),
        }
    }
}

impl From<ResultRecord> for EndpointResult {
    fn from(rec: ResultRecord) -> Self {
        EndpointResult::new(
            Endpoint {
                server: rec.server,
                server_port: rec.server_port,
                uuid: rec.uuid,
                server_name: rec.server_name,
                path: rec.path,
                tag: rec.tag,
            },
            Outcome {
                status: rec.status,
                latency_ms: rec.latency_ms,
                speed_mbps: rec.speed_mbps,
            },
        )
    }
}

pub fn json_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, "json")
}

pub fn text_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, "txt")
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Pretty-printed JSON array, fastest first. Non-ASCII is written as-is.
pub fn render_json(results: &[EndpointResult]) -> Result<String> {
    let records: Vec<ResultRecord> = sort_by_speed(results).iter().map(ResultRecord::from).collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

/// Ranked text report, fastest first.
pub fn render_text(results: &[EndpointResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Server Check Results (fastest first)");
    let _ = writeln!(out, "Generated: {}", chrono::Utc::now().to_rfc3339());
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
    let _ = writeln!(out);

    for (i, r) in sort_by_speed(results).iter().enumerate() {
        let _ = writeln!(out, "#{} Rank", i + 1);
        let _ = writeln!(out, "Server: {}", r.address());
        let _ = writeln!(out, "Tag: {}", r.endpoint.tag);
        let _ = writeln!(out, "Speed: {:.2} MB/s", r.speed_mbps());
        let _ = writeln!(out, "Latency: {:.1} ms", r.latency_ms());
        let _ = writeln!(out, "Status: {}", r.status());
        let _ = writeln!(out, "UUID: {}", r.endpoint.uuid);
        let _ = writeln!(out, "SNI: {}", r.endpoint.server_name);
        let _ = writeln!(out, "Path: {}", r.endpoint.path);
        let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));
        let _ = writeln!(out);
    }

    out
}

/// Write `<prefix>.json` and `<prefix>.txt`, creating parent directories as
/// needed. Returns both paths.
pub fn persist(results: &[EndpointResult], prefix: impl AsRef<Path>) -> Result<(PathBuf, PathBuf)> {
    let prefix = prefix.as_ref();
    if let Some(parent) = prefix.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory: {}", parent.display()))?;
    }

    let json_file = json_path(prefix);
    std::fs::write(&json_file, render_json(results)?)
        .with_context(|| format!("failed to write {}", json_file.display()))?;

    let txt_file = text_path(prefix);
    std::fs::write(&txt_file, render_text(results))
        .with_context(|| format!("failed to write {}", txt_file.display()))?;

    info!(
        json = %json_file.display(),
        txt = %txt_file.display(),
        count = results.len(),
        "Results saved"
    );
    Ok((json_file, txt_file))
}

/// Read a JSON result file written by [`persist`].
pub fn load_json(path: impl AsRef<Path>) -> Result<Vec<EndpointResult>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read results file: {}", path.display()))?;
    let records: Vec<ResultRecord> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse results file: {}", path.display()))?;
    Ok(records.into_iter().map(EndpointResult::from).collect())
}
