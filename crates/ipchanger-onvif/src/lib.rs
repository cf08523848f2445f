//! ipchanger ONVIF - device-service protocol plumbing
//!
//! This crate talks to the `/onvif/device_service` endpoint of IP cameras:
//! - `transport`: authenticated HTTP POST of SOAP envelopes
//! - `envelope`: request bodies for the operations we use
//! - `parse`: permissive extraction of facts from loosely-structured replies
//! - `inspect`: read-only identity and network queries
//! - `reconfigure`: the network reconfiguration state machine

pub mod envelope;
pub mod inspect;
pub mod parse;
pub mod reconfigure;
pub mod transport;

pub use envelope::MutationShape;
pub use inspect::{Inspector, QueryTimeouts};
pub use parse::MutationVerdict;
pub use reconfigure::{EngineOptions, Reconfigurer};
pub use transport::{
    Endpoint, HttpTransport, OnvifRequest, OnvifResponse, Transport, TransportError,
    DEVICE_SERVICE_PATH,
};

#[cfg(any(test, feature = "mock"))]
pub use transport::MockTransport;
