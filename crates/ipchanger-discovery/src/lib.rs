//! ipchanger Discovery - finds ONVIF cameras on an IPv4 subnet
//!
//! Discovery runs in two phases:
//! - `probe`: parallel TCP connect sweep over every usable host and port
//! - `scanner`: sequential identity queries against the hosts that answered

pub mod probe;
pub mod scanner;

pub use probe::{sweep, TcpConnectProbe};
pub use scanner::{DiscoveryEvent, DiscoveryScanner, ScannerConfig};
