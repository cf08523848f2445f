//! Read-only device queries
//!
//! Transport failures and non-200 answers produce empty results rather than
//! errors: "no facts" is a normal outcome for a camera that is rebooting,
//! mid-transition, or refusing our credentials.

use ipchanger_core::facts::DEFAULT_INTERFACE_TOKEN;
use ipchanger_core::{Credentials, DeviceIdentity, NetworkFacts};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::envelope::{self, Envelope};
use crate::parse;
use crate::transport::{Endpoint, OnvifRequest, OnvifResponse, Transport, TransportError};

/// Per-request timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTimeouts {
    /// Read-only queries
    pub query: Duration,
    /// Mutating requests
    pub mutation: Duration,
}

impl Default for QueryTimeouts {
    fn default() -> Self {
        Self {
            query: Duration::from_secs(10),
            mutation: Duration::from_secs(15),
        }
    }
}

/// Issues device-service requests against one port
pub struct Inspector<T: Transport + ?Sized> {
    transport: Arc<T>,
    port: u16,
    timeouts: QueryTimeouts,
}

impl<T: Transport + ?Sized> Clone for Inspector<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            port: self.port,
            timeouts: self.timeouts,
        }
    }
}

impl<T: Transport + ?Sized> Inspector<T> {
    pub fn new(transport: Arc<T>, port: u16, timeouts: QueryTimeouts) -> Self {
        Self {
            transport,
            port,
            timeouts,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn endpoint(&self, address: Ipv4Addr) -> Endpoint {
        Endpoint::new(address, self.port)
    }

    /// Send one envelope, picking the timeout from its operation kind
    pub async fn call(
        &self,
        address: Ipv4Addr,
        envelope: Envelope,
        credentials: Option<&Credentials>,
    ) -> Result<OnvifResponse, TransportError> {
        let timeout = if envelope.operation.is_mutation() {
            self.timeouts.mutation
        } else {
            self.timeouts.query
        };
        let request = OnvifRequest {
            endpoint: self.endpoint(address),
            envelope,
            credentials: credentials.cloned(),
            timeout,
        };
        self.transport.send(&request).await
    }

    /// Device identity, or `None` if the device didn't answer with one
    pub async fn identity(
        &self,
        address: Ipv4Addr,
        credentials: Option<&Credentials>,
    ) -> Option<DeviceIdentity> {
        let body = self
            .query(address, envelope::get_device_information(), credentials)
            .await?;
        if parse::has_fault_marker(&body) {
            debug!(ip = %address, "Device information query returned a fault");
            return None;
        }
        let identity = parse::device_identity(&body);
        debug!(
            ip = %address,
            manufacturer = ?identity.manufacturer,
            model = ?identity.model,
            "Device identity"
        );
        Some(identity)
    }

    /// Interface tokens. Never empty: falls back to `eth0`.
    pub async fn network_interfaces(
        &self,
        address: Ipv4Addr,
        credentials: Option<&Credentials>,
    ) -> Vec<String> {
        let tokens = self.reported_interfaces(address, credentials).await;
        if tokens.is_empty() {
            debug!(ip = %address, "No interface tokens reported, using default");
            return vec![DEFAULT_INTERFACE_TOKEN.to_string()];
        }
        tokens
    }

    /// Interface tokens exactly as reported, possibly none
    pub async fn reported_interfaces(
        &self,
        address: Ipv4Addr,
        credentials: Option<&Credentials>,
    ) -> Vec<String> {
        let tokens = match self
            .query(address, envelope::get_network_interfaces(), credentials)
            .await
        {
            Some(body) => parse::interface_tokens(&body),
            None => Vec::new(),
        };
        debug!(ip = %address, tokens = ?tokens, "Found network interfaces");
        tokens
    }

    /// Current network configuration, empty when unavailable
    pub async fn network_config(
        &self,
        address: Ipv4Addr,
        credentials: Option<&Credentials>,
    ) -> NetworkFacts {
        match self
            .query(address, envelope::get_network_interfaces(), credentials)
            .await
        {
            Some(body) => parse::network_facts(&body),
            None => NetworkFacts::default(),
        }
    }

    async fn query(
        &self,
        address: Ipv4Addr,
        envelope: Envelope,
        credentials: Option<&Credentials>,
    ) -> Option<String> {
        let operation = envelope.operation;
        match self.call(address, envelope, credentials).await {
            Ok(response) if response.is_ok() => Some(response.body),
            Ok(response) => {
                debug!(
                    ip = %address,
                    operation = ?operation,
                    status = response.status,
                    "Query rejected"
                );
                None
            }
            Err(e) => {
                warn!(ip = %address, operation = ?operation, error = %e, "Query failed");
                None
            }
        }
    }
}
