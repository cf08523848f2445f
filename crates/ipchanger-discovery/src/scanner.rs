//! Discovery scanner: port sweep followed by ONVIF identity probing

use ipchanger_core::{Credentials, Device, Ipv4Cidr, PortProbe};
use ipchanger_onvif::{Inspector, Transport};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::probe::sweep;

/// Scanner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Ports tried on every host, in order
    pub ports: Vec<u16>,
    /// Maximum hosts probed at once
    pub parallelism: usize,
    /// Per-connection timeout in milliseconds
    pub probe_timeout_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            ports: vec![80, 8080, 8081, 554, 8554],
            parallelism: 50,
            probe_timeout_ms: 1000,
        }
    }
}

/// Progress events for front-ends
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// Sweep started over `hosts` usable addresses
    ScanStarted { network: Ipv4Cidr, hosts: u64 },
    /// Host accepted a connection on `port`
    CandidateFound { address: Ipv4Addr, port: u16 },
    /// Candidate recorded as a device, with or without identity
    DeviceIdentified(Device),
    /// Scan finished
    ScanCompleted { candidates: usize, found: usize },
}

/// Finds ONVIF devices on a subnet.
///
/// Each call to [`scan`](Self::scan) re-probes everything. The scanner keeps
/// no device state; the caller installs the result into its session.
pub struct DiscoveryScanner<T: Transport + ?Sized, P: PortProbe + ?Sized> {
    config: ScannerConfig,
    inspector: Inspector<T>,
    probe: Arc<P>,
    event_tx: broadcast::Sender<DiscoveryEvent>,
}

impl<T, P> DiscoveryScanner<T, P>
where
    T: Transport + ?Sized,
    P: PortProbe + ?Sized + 'static,
{
    pub fn new(config: ScannerConfig, inspector: Inspector<T>, probe: Arc<P>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config,
            inspector,
            probe,
            event_tx,
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Subscribe to discovery events
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.event_tx.subscribe()
    }

    /// Run one scan of `network`.
    ///
    /// Hosts that never accept a connection are excluded. Every host that
    /// does becomes a device, with identity when either the unauthenticated
    /// or the authenticated query succeeds.
    pub async fn scan(
        &self,
        network: Ipv4Cidr,
        credentials: Option<&Credentials>,
    ) -> Vec<Device> {
        let hosts = network.host_count();
        info!(network = %network, hosts = hosts, "Starting discovery scan");
        let _ = self
            .event_tx
            .send(DiscoveryEvent::ScanStarted { network, hosts });

        let candidates = sweep(
            network.hosts(),
            &self.config.ports,
            self.config.parallelism,
            Duration::from_millis(self.config.probe_timeout_ms),
            Arc::clone(&self.probe),
        )
        .await;

        for &(address, port) in &candidates {
            debug!(ip = %address, port = port, "Candidate found");
            let _ = self
                .event_tx
                .send(DiscoveryEvent::CandidateFound { address, port });
        }

        let mut devices = Vec::with_capacity(candidates.len());
        for &(address, _) in &candidates {
            let device = self.identify(address, credentials).await;
            let _ = self
                .event_tx
                .send(DiscoveryEvent::DeviceIdentified(device.clone()));
            devices.push(device);
        }

        info!(
            network = %network,
            candidates = candidates.len(),
            found = devices.len(),
            "Discovery scan complete"
        );
        let _ = self.event_tx.send(DiscoveryEvent::ScanCompleted {
            candidates: candidates.len(),
            found: devices.len(),
        });
        devices
    }

    async fn identify(&self, address: Ipv4Addr, credentials: Option<&Credentials>) -> Device {
        let port = self.inspector.port();
        let mut identity = self.inspector.identity(address, None).await;
        if identity.is_none() {
            if let Some(credentials) = credentials {
                identity = self.inspector.identity(address, Some(credentials)).await;
            }
        }

        match identity {
            Some(identity) => {
                let device = Device::from_identity(address, port, identity);
                info!(ip = %address, device = %device, "Found ONVIF device");
                device
            }
            None => {
                debug!(ip = %address, "No identity, recording presence only");
                Device::new(address, port)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipchanger_core::MockPortProbe;
    use ipchanger_onvif::envelope::Operation;
    use ipchanger_onvif::{MockTransport, OnvifResponse, QueryTimeouts, TransportError};

    const IDENTITY: &str = "<r><tds:Manufacturer>Skilleye</tds:Manufacturer><tds:Model>SE-200</tds:Model></r>";

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn scanner(
        transport: MockTransport,
        probe: MockPortProbe,
    ) -> DiscoveryScanner<MockTransport, MockPortProbe> {
        let inspector = Inspector::new(Arc::new(transport), 80, QueryTimeouts::default());
        DiscoveryScanner::new(ScannerConfig::default(), inspector, Arc::new(probe))
    }

    /// Camera at 192.168.1.5 answering identity only with credentials
    fn camera_transport() -> MockTransport {
        let mut transport = MockTransport::new();
        transport.expect_send().returning(|req| {
            assert_eq!(req.operation(), Operation::GetDeviceInformation);
            if req.endpoint.address != ip("192.168.1.5") {
                return Err(TransportError::Timeout(req.endpoint));
            }
            if req.credentials.is_none() {
                return Ok(OnvifResponse::new(401, ""));
            }
            Ok(OnvifResponse::new(200, IDENTITY))
        });
        transport
    }

    #[tokio::test]
    async fn test_single_camera_in_small_subnet() {
        let mut probe = MockPortProbe::new();
        probe
            .expect_is_open()
            .returning(|addr, _| *addr.ip() == ip("192.168.1.5") && addr.port() == 80);

        let scanner = scanner(camera_transport(), probe);
        let creds = Credentials::new("admin", "secret");
        let devices = scanner
            .scan("192.168.1.0/28".parse().unwrap(), Some(&creds))
            .await;

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].address, ip("192.168.1.5"));
        assert_eq!(devices[0].manufacturer.as_deref(), Some("Skilleye"));
        assert_eq!(devices[0].model.as_deref(), Some("SE-200"));
    }

    #[tokio::test]
    async fn test_presence_without_identity_still_recorded() {
        let mut probe = MockPortProbe::new();
        probe
            .expect_is_open()
            .returning(|addr, _| *addr.ip() == ip("192.168.1.5"));

        let scanner = scanner(camera_transport(), probe);
        let devices = scanner.scan("192.168.1.0/28".parse().unwrap(), None).await;

        assert_eq!(devices.len(), 1);
        assert!(!devices[0].has_identity());
        assert_eq!(devices[0].name, "Camera-192.168.1.5");
    }

    #[tokio::test]
    async fn test_never_returns_network_or_broadcast_address() {
        let mut probe = MockPortProbe::new();
        probe.expect_is_open().returning(|_, _| true);
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .returning(|req| Err(TransportError::Timeout(req.endpoint)));

        let scanner = scanner(transport, probe);
        let network: Ipv4Cidr = "10.1.2.0/28".parse().unwrap();
        let devices = scanner.scan(network, None).await;

        assert_eq!(devices.len(), 14);
        assert!(devices.iter().all(|d| d.address != network.network()));
        assert!(devices.iter().all(|d| d.address != network.broadcast()));
        assert!(devices.iter().all(|d| network.contains(d.address)));
    }

    #[tokio::test]
    async fn test_multiple_open_ports_recorded_once() {
        let mut probe = MockPortProbe::new();
        probe
            .expect_is_open()
            .returning(|addr, _| *addr.ip() == ip("192.168.1.5"));

        let scanner = scanner(camera_transport(), probe);
        let mut events = scanner.subscribe();
        let devices = scanner.scan("192.168.1.0/28".parse().unwrap(), None).await;
        assert_eq!(devices.len(), 1);

        let mut candidates = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let DiscoveryEvent::CandidateFound { address, port } = event {
                candidates.push((address, port));
            }
        }
        assert_eq!(candidates, vec![(ip("192.168.1.5"), 80)]);
    }

    #[tokio::test]
    async fn test_rescan_is_idempotent() {
        let mut probe = MockPortProbe::new();
        probe.expect_is_open().returning(|addr, _| {
            [ip("192.168.1.3"), ip("192.168.1.5"), ip("192.168.1.9")].contains(addr.ip())
        });

        let scanner = scanner(camera_transport(), probe);
        let network: Ipv4Cidr = "192.168.1.0/28".parse().unwrap();
        let first: Vec<_> = scanner.scan(network, None).await.iter().map(|d| d.address).collect();
        let creds = Credentials::new("admin", "secret");
        let second: Vec<_> = scanner
            .scan(network, Some(&creds))
            .await
            .iter()
            .map(|d| d.address)
            .collect();

        assert_eq!(first, vec![ip("192.168.1.3"), ip("192.168.1.5"), ip("192.168.1.9")]);
        assert_eq!(first, second);
    }
}
