//! Session registry: known devices, active range and credentials

use chrono::Utc;
use std::net::Ipv4Addr;
use tracing::{debug, info};

use crate::credentials::Credentials;
use crate::device::{Device, DEFAULT_ONVIF_PORT};
use crate::mapping::AddressMapping;
use crate::network::Ipv4Cidr;

/// Explicit session context passed to every operation.
///
/// Only the foreground flow mutates it. Discovery returns its results and the
/// caller installs them with [`Session::replace_devices`]; the reconfiguration
/// engine calls [`Session::readdress`] after a verified change.
#[derive(Debug, Default)]
pub struct Session {
    devices: Vec<Device>,
    network: Option<Ipv4Cidr>,
    credentials: Option<Credentials>,
    changes: Vec<AddressMapping>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
            ..Self::default()
        }
    }

    pub fn network(&self) -> Option<Ipv4Cidr> {
        self.network
    }

    /// Switch the active range. Devices from a different range are dropped.
    pub fn set_network(&mut self, network: Ipv4Cidr) {
        if self.network != Some(network) {
            info!(network = %network, "Active network changed");
            self.devices.clear();
        }
        self.network = Some(network);
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        debug!(username = %credentials.username(), "Credentials updated");
        self.credentials = Some(credentials);
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Install the result of a completed scan
    pub fn replace_devices(&mut self, devices: Vec<Device>) {
        self.devices = devices;
    }

    pub fn device(&self, address: Ipv4Addr) -> Option<&Device> {
        self.devices.iter().find(|d| d.address == address)
    }

    /// Select a device by its 1-based position in the list
    pub fn select(&self, index: usize) -> Option<&Device> {
        index.checked_sub(1).and_then(|i| self.devices.get(i))
    }

    /// Insert or replace the device with the same address
    pub fn upsert(&mut self, device: Device) {
        match self.devices.iter_mut().find(|d| d.address == device.address) {
            Some(existing) => *existing = device,
            None => self.devices.push(device),
        }
    }

    /// Move a device to its new address after a verified change.
    ///
    /// A device not yet in the registry is added at the new address.
    pub fn readdress(&mut self, old: Ipv4Addr, new: Ipv4Addr) -> &Device {
        let port = self.device(old).map_or(DEFAULT_ONVIF_PORT, |d| d.port);
        if old != new {
            self.devices.retain(|d| d.address != new);
        }
        let index = match self.devices.iter().position(|d| d.address == old) {
            Some(index) => {
                self.devices[index].readdress(new);
                index
            }
            None => {
                self.devices.push(Device::new(new, port));
                self.devices.len() - 1
            }
        };
        self.changes.push(AddressMapping {
            old,
            new,
            changed_at: Utc::now(),
        });
        info!(old = %old, new = %new, "Device address updated in registry");
        &self.devices[index]
    }

    /// Confirmed address changes recorded this session
    pub fn changes(&self) -> &[AddressMapping] {
        &self.changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn test_set_network_clears_devices() {
        let mut session = Session::new();
        session.set_network("10.0.0.0/24".parse().unwrap());
        session.upsert(Device::new(ip("10.0.0.5"), 80));
        session.set_network("10.0.0.0/24".parse().unwrap());
        assert_eq!(session.devices().len(), 1);
        session.set_network("192.168.1.0/24".parse().unwrap());
        assert!(session.devices().is_empty());
    }

    #[test]
    fn test_select_is_one_based() {
        let mut session = Session::new();
        session.replace_devices(vec![
            Device::new(ip("10.0.0.5"), 80),
            Device::new(ip("10.0.0.6"), 80),
        ]);
        assert!(session.select(0).is_none());
        assert_eq!(session.select(2).map(|d| d.address), Some(ip("10.0.0.6")));
        assert!(session.select(3).is_none());
    }

    #[test]
    fn test_readdress_updates_existing_device() {
        let mut session = Session::new();
        session.replace_devices(vec![Device::new(ip("10.0.0.5"), 8080)]);
        let device = session.readdress(ip("10.0.0.5"), ip("10.0.0.9"));
        assert_eq!(device.address, ip("10.0.0.9"));
        assert_eq!(device.port, 8080);
        assert!(session.device(ip("10.0.0.5")).is_none());
        assert_eq!(session.devices().len(), 1);
        assert_eq!(session.changes().len(), 1);
        assert_eq!(session.changes()[0].old, ip("10.0.0.5"));
    }

    #[test]
    fn test_readdress_unknown_device_inserts() {
        let mut session = Session::new();
        session.readdress(ip("10.0.0.5"), ip("10.0.0.9"));
        assert!(session.device(ip("10.0.0.9")).is_some());
    }

    #[test]
    fn test_readdress_replaces_stale_entry_at_new_address() {
        let mut session = Session::new();
        session.replace_devices(vec![
            Device::new(ip("10.0.0.5"), 80),
            Device::new(ip("10.0.0.9"), 80),
        ]);
        session.readdress(ip("10.0.0.5"), ip("10.0.0.9"));
        assert_eq!(session.devices().len(), 1);
    }
}
