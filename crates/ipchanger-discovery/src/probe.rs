//! TCP connect probing for the discovery sweep

use async_trait::async_trait;
use ipchanger_core::PortProbe;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, trace};

/// Treats a completed TCP handshake as "open"
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnectProbe;

#[async_trait]
impl PortProbe for TcpConnectProbe {
    async fn is_open(&self, addr: SocketAddrV4, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => {
                trace!(addr = %addr, "Port open");
                true
            }
            Ok(Err(e)) => {
                trace!(addr = %addr, error = %e, "Port closed");
                false
            }
            Err(_) => false,
        }
    }
}

/// Probe every host on `ports` in order, at most `parallelism` hosts at once.
///
/// A host is recorded once, with the first port that accepted a connection.
/// Results are sorted by address.
pub async fn sweep<P>(
    hosts: impl IntoIterator<Item = Ipv4Addr>,
    ports: &[u16],
    parallelism: usize,
    timeout: Duration,
    probe: Arc<P>,
) -> Vec<(Ipv4Addr, u16)>
where
    P: PortProbe + ?Sized + 'static,
{
    let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
    let ports: Arc<[u16]> = Arc::from(ports);
    let mut tasks = JoinSet::new();
    let mut open = Vec::new();
    let mut probed = 0usize;

    for host in hosts {
        // Reap finished probes so the set stays near `parallelism` entries.
        while let Some(result) = tasks.try_join_next() {
            collect(result, &mut open);
        }
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let probe = Arc::clone(&probe);
        let ports = Arc::clone(&ports);
        probed += 1;

        tasks.spawn(async move {
            let _permit = permit;
            for &port in ports.iter() {
                if probe.is_open(SocketAddrV4::new(host, port), timeout).await {
                    return Some((host, port));
                }
            }
            None
        });
    }

    while let Some(result) = tasks.join_next().await {
        collect(result, &mut open);
    }
    open.sort_unstable();

    debug!("Probed {} hosts, {} answered", probed, open.len());
    open
}

fn collect(
    result: Result<Option<(Ipv4Addr, u16)>, tokio::task::JoinError>,
    open: &mut Vec<(Ipv4Addr, u16)>,
) {
    match result {
        Ok(Some(hit)) => open.push(hit),
        Ok(None) => {}
        Err(e) => debug!(error = %e, "Probe task failed"),
    }
}
