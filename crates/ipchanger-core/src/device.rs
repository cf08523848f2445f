//! Device types for tracking discovered cameras

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Default ONVIF device-service port
pub const DEFAULT_ONVIF_PORT: u16 = 80;

/// Current reachability of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    /// Device answered on its management port
    Online,
    /// Device was seen but is not currently answering
    Offline,
    /// Device status is unknown
    #[default]
    Unknown,
}

/// Identity fields returned by a device information query.
///
/// Every field is optional: devices omit fields freely and the parser never
/// treats a missing one as an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub serial_number: Option<String>,
    pub hardware_id: Option<String>,
}

/// A camera known to the session, identified by its IPv4 address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Management address (the device identity)
    pub address: Ipv4Addr,
    /// ONVIF device-service port
    pub port: u16,
    /// Display name
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub serial_number: Option<String>,
    pub hardware_id: Option<String>,
    /// Reachability flag
    pub status: DeviceStatus,
    /// When the device was first discovered
    pub first_seen: DateTime<Utc>,
    /// When the device last answered
    pub last_seen: DateTime<Utc>,
}

impl Device {
    /// Create a device with presence only (no identity)
    pub fn new(address: Ipv4Addr, port: u16) -> Self {
        let now = Utc::now();
        Self {
            address,
            port,
            name: default_name(address),
            manufacturer: None,
            model: None,
            firmware_version: None,
            serial_number: None,
            hardware_id: None,
            status: DeviceStatus::Online,
            first_seen: now,
            last_seen: now,
        }
    }

    /// Create a device from an identity query result
    pub fn from_identity(address: Ipv4Addr, port: u16, identity: DeviceIdentity) -> Self {
        let mut device = Self::new(address, port);
        device.apply_identity(identity);
        device
    }

    /// Merge identity fields, keeping existing values where the query had none
    pub fn apply_identity(&mut self, identity: DeviceIdentity) {
        let DeviceIdentity {
            manufacturer,
            model,
            firmware_version,
            serial_number,
            hardware_id,
        } = identity;
        self.manufacturer = manufacturer.or(self.manufacturer.take());
        self.model = model.or(self.model.take());
        self.firmware_version = firmware_version.or(self.firmware_version.take());
        self.serial_number = serial_number.or(self.serial_number.take());
        self.hardware_id = hardware_id.or(self.hardware_id.take());
    }

    /// Whether an identity query ever succeeded for this device
    pub fn has_identity(&self) -> bool {
        self.manufacturer.is_some() || self.model.is_some()
    }

    pub fn is_reachable(&self) -> bool {
        self.status == DeviceStatus::Online
    }

    /// Move the device to a new address after a verified change
    pub fn readdress(&mut self, address: Ipv4Addr) {
        if self.name == default_name(self.address) {
            self.name = default_name(address);
        }
        self.address = address;
        self.status = DeviceStatus::Online;
        self.touch();
    }

    /// Update the last seen timestamp
    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.address)?;
        if let Some(model) = &self.model {
            write!(
                f,
                " - {} {}",
                self.manufacturer.as_deref().unwrap_or_default(),
                model
            )?;
        }
        Ok(())
    }
}

fn default_name(address: Ipv4Addr) -> String {
    format!("Camera-{}", address)
}
