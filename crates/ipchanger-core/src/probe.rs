//! Reachability probing seam

use async_trait::async_trait;
use std::net::SocketAddrV4;
use std::time::Duration;

/// "Is `addr` accepting TCP connections" within `timeout`.
///
/// Discovery sweeps and post-change verification both go through this
/// trait so they can run against scripted networks in tests.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn is_open(&self, addr: SocketAddrV4, timeout: Duration) -> bool;
}
