// ── Liveness probe ──
//
// A short TCP connect to the controller's protocol port. Success only
// means something is listening; the connection is dropped immediately.

use std::net::IpAddr;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Network reachability check run before every handle acquisition.
pub trait LivenessProbe: Send + Sync {
    /// `true` if `address:port` accepted a connection within `timeout`.
    /// Resolves to `false` as soon as `cancel` fires.
    fn probe<'a>(
        &'a self,
        address: &'a str,
        port: u16,
        timeout: Duration,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, bool>;
}

/// `host:port` with IPv6 literals bracketed; hostnames pass through as-is.
pub fn format_address(address: &str, port: u16) -> String {
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => format!("[{address}]:{port}"),
        _ => format!("{address}:{port}"),
    }
}

/// Plain TCP connect probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

impl LivenessProbe for TcpProbe {
    fn probe<'a>(
        &'a self,
        address: &'a str,
        port: u16,
        timeout: Duration,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            let target = format_address(address, port);
            tokio::select! {
                biased;
                () = cancel.cancelled() => false,
                result = tokio::time::timeout(timeout, TcpStream::connect(target.as_str())) => {
                    match result {
                        Ok(Ok(_stream)) => true,
                        Ok(Err(e)) => {
                            trace!(peer = %target, error = %e, "probe refused");
                            false
                        }
                        Err(_) => {
                            trace!(peer = %target, "probe timed out");
                            false
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn ipv6_literals_are_bracketed() {
        assert_eq!(format_address("10.0.0.5", 8193), "10.0.0.5:8193");
        assert_eq!(format_address("::1", 8193), "[::1]:8193");
        assert_eq!(format_address("cnc-07.plant", 8193), "cnc-07.plant:8193");
    }

    #[tokio::test]
    async fn reachable_listener_probes_alive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let cancel = CancellationToken::new();

        assert!(
            TcpProbe
                .probe("127.0.0.1", port, Duration::from_secs(2), &cancel)
                .await
        );
    }

    #[tokio::test]
    async fn closed_port_probes_dead() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let cancel = CancellationToken::new();

        assert!(
            !TcpProbe
                .probe("127.0.0.1", port, Duration::from_secs(2), &cancel)
                .await
        );
    }

    #[tokio::test]
    async fn cancelled_probe_returns_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(
            !TcpProbe
                .probe("10.255.255.1", 8193, Duration::from_secs(30), &cancel)
                .await
        );
    }
}
