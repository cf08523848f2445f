//! ipchanger core - domain types shared by the ONVIF, discovery and CLI crates
//!
//! This crate provides:
//! - Device registry types for tracking discovered cameras
//! - Network facts reported by a device and the requests that mutate them
//! - Reconfiguration outcomes and the diagnostics that explain them
//! - IPv4 CIDR math used by discovery and request validation
//! - The session object holding the active range, credentials and devices
//! - A JSON sink for confirmed address changes

pub mod credentials;
pub mod device;
pub mod facts;
pub mod mapping;
pub mod network;
pub mod outcome;
pub mod probe;
pub mod request;
pub mod session;

pub use credentials::Credentials;
pub use device::{Device, DeviceIdentity, DeviceStatus};
pub use facts::NetworkFacts;
pub use mapping::{AddressMapping, MappingError, MappingLog};
pub use network::{CidrError, Ipv4Cidr};
pub use outcome::{
    DhcpReport, Diagnostics, FailureReason, Fault, ReconfigurationOutcome, ReconfigurationReport,
};
pub use probe::PortProbe;
pub use request::{ReconfigurationRequest, RequestError, MAX_PREFIX_LEN, MIN_PREFIX_LEN};
pub use session::Session;

#[cfg(any(test, feature = "mock"))]
pub use probe::MockPortProbe;
