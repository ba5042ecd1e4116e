use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{lookup_host, TcpStream};
use tokio::time;
use tracing::debug;

use crate::error::{Error, Result};
use crate::fanout::fan_out;

/// Per-scan connect settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Per-socket connect timeout.
    pub timeout: Duration,
    /// Simultaneous connect attempts.
    pub concurrency: usize,
}

/// Finds which ports in a range have something listening.
///
/// Any error aborts the scan: without the candidate list there is nothing to
/// validate.
#[async_trait]
pub trait PortProber: Send + Sync {
    async fn probe(
        &self,
        host: &str,
        low_port: u16,
        high_port: u16,
        options: ConnectOptions,
    ) -> Result<Vec<u16>>;
}

/// Plain TCP connect prober.
///
/// - Resolves `host` once; resolution failure is a probe error.
/// - Limits concurrent socket attempts to `options.concurrency`.
/// - Bounds every connect with `options.timeout`; refused and timed-out
///   ports are simply not reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProber;

#[async_trait]
impl PortProber for TcpProber {
    async fn probe(
        &self,
        host: &str,
        low_port: u16,
        high_port: u16,
        options: ConnectOptions,
    ) -> Result<Vec<u16>> {
        let ip = resolve(host).await?;
        debug!(%ip, low_port, high_port, concurrency = options.concurrency, "probing ports");
        connect_range(ip, low_port, high_port, options, |addr| async move {
            TcpStream::connect(addr).await.is_ok()
        })
        .await
    }
}

/// Run `connect` against every port of the range, at most
/// `options.concurrency` at a time, and return the ports that accepted.
async fn connect_range<C, Fut>(
    ip: IpAddr,
    low_port: u16,
    high_port: u16,
    options: ConnectOptions,
    connect: C,
) -> Result<Vec<u16>>
where
    C: Fn(SocketAddr) -> Fut,
    Fut: Future<Output = bool> + Send + 'static,
{
    let ports: Vec<u16> = (low_port..=high_port).collect();
    let concurrency = options.concurrency.clamp(1, 5_000);
    let timeout = options.timeout;

    let open = fan_out(ports, Some(concurrency), |port| {
        let attempt = connect(SocketAddr::new(ip, port));
        async move {
            match time::timeout(timeout, attempt).await {
                Ok(true) => Ok::<_, Error>(Some(port)),
                // Closed, filtered, or timed out.
                _ => Ok(None),
            }
        }
    })
    .await?;

    Ok(open.into_iter().flatten().collect())
}

async fn resolve(host: &str) -> Result<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }
    let mut addrs = lookup_host((host, 0))
        .await
        .map_err(|e| Error::Probe(format!("cannot resolve {host}: {e}")))?;
    addrs
        .next()
        .map(|a| a.ip())
        .ok_or_else(|| Error::Probe(format!("{host} resolved to no addresses")))
}
