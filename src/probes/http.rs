//! Download probe against the fixed reference resource.
//!
//! The URL never depends on the endpoint being checked: the number reported
//! as an endpoint's speed is the local path bandwidth sampled right after
//! that endpoint answered its latency check.

use super::ProbeError;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Size and wall time of one completed download.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Download {
    pub bytes: usize,
    pub elapsed: Duration,
}

impl Download {
    /// MB/s (MiB based), rounded to two decimals.
    pub fn speed_mbps(&self) -> f64 {
        speed_mbps(self.bytes, self.elapsed.as_secs_f64())
    }
}

pub fn speed_mbps(bytes: usize, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    let raw = bytes as f64 / BYTES_PER_MB / elapsed_secs;
    (raw * 100.0).round() / 100.0
}

/// GET `url` with a fresh client and read the whole body within `timeout`.
///
/// Only a `200 OK` counts as a sample. The client is built per call and keeps
/// no idle connections, so nothing outlives the check. With `verify_tls` off
/// the server certificate is not checked.
pub async fn download(url: &str, timeout: Duration, verify_tls: bool) -> Result<Download, ProbeError> {
    let client = Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(0)
        .danger_accept_invalid_certs(!verify_tls)
        .build()
        .map_err(|e| ProbeError::Protocol(format!("client error: {}", e)))?;

    let start = Instant::now();
    let request = async {
        let resp = client.get(url).send().await.map_err(classify)?;
        let status = resp.status();
        if status != StatusCode::OK {
            return Err(ProbeError::Protocol(format!("unexpected status: {}", status)));
        }
        let body = resp.bytes().await.map_err(classify)?;
        Ok(body.len())
    };

    let bytes = tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| ProbeError::Timeout)??;

    Ok(Download {
        bytes,
        elapsed: start.elapsed(),
    })
}

fn classify(err: reqwest::Error) -> ProbeError {
    if err.is_timeout() {
        ProbeError::Timeout
    } else {
        ProbeError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_one_mib_half_second() {
        assert_eq!(speed_mbps(1_048_576, 0.5), 2.0);
    }

    #[test]
    fn test_speed_rounds_to_two_decimals() {
        // 1 MiB in 3s = 0.3333...
        assert_eq!(speed_mbps(1_048_576, 3.0), 0.33);
        let d = Download {
            bytes: 3 * 1_048_576,
            elapsed: Duration::from_millis(700),
        };
        assert_eq!(d.speed_mbps(), 4.29);
    }

    #[test]
    fn test_speed_zero_elapsed() {
        assert_eq!(speed_mbps(1024, 0.0), 0.0);
    }
}
