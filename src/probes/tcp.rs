//! TCP connect probe: the latency half of an endpoint check.

use std::future::Future;
use std::io;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct TcpResult {
    pub host: String,
    pub port: u16,
    pub latency_ms: f64,
    pub reachable: bool,
}

impl TcpResult {
    fn unreachable(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            latency_ms: 0.0,
            reachable: false,
        }
    }
}

/// Open a bare TCP connection to `host:port` within `timeout` and report how
/// long the handshake took.
///
/// No data is exchanged and the socket is closed right after timing. Every
/// failure (DNS, refusal, reset, deadline) is folded into `reachable = false`
/// with a latency of 0.
pub async fn check_latency(host: &str, port: u16, timeout: Duration) -> TcpResult {
    timed_connect(host, port, timeout, TcpStream::connect((host, port))).await
}

async fn timed_connect<F>(host: &str, port: u16, timeout: Duration, connect: F) -> TcpResult
where
    F: Future<Output = io::Result<TcpStream>>,
{
    let start = Instant::now();

    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(mut stream)) => {
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
            let _ = stream.shutdown().await;
            TcpResult {
                host: host.to_string(),
                port,
                latency_ms,
                reachable: true,
            }
        }
        Ok(Err(e)) => {
            debug!(%host, %port, error = %e, "Latency check failed");
            TcpResult::unreachable(host, port)
        }
        Err(_) => {
            debug!(%host, %port, ?timeout, "Latency check timed out");
            TcpResult::unreachable(host, port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_reachable_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let res = check_latency("127.0.0.1", port, Duration::from_secs(2)).await;
        assert!(res.reachable);
        assert!(res.latency_ms >= 0.0);
        assert_eq!(res.port, port);
    }

    #[tokio::test]
    async fn test_closed_port_is_unreachable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let res = check_latency("127.0.0.1", port, Duration::from_secs(2)).await;
        assert!(!res.reachable);
        assert_eq!(res.latency_ms, 0.0);
    }

    #[tokio::test]
    async fn test_connect_deadline_is_unreachable() {
        let res = timed_connect(
            "203.0.113.5",
            443,
            Duration::from_millis(50),
            std::future::pending::<io::Result<TcpStream>>(),
        )
        .await;
        assert!(!res.reachable);
        assert_eq!(res.latency_ms, 0.0);
        assert_eq!(res.host, "203.0.113.5");
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_unreachable() {
        let res = check_latency("host.invalid", 443, Duration::from_secs(2)).await;
        assert!(!res.reachable);
        assert_eq!(res.latency_ms, 0.0);
    }
}
