//! Network facts reported by a device

use serde::Serialize;
use std::net::Ipv4Addr;

/// Interface identifier used when a device reports none
pub const DEFAULT_INTERFACE_TOKEN: &str = "eth0";

/// Snapshot of a device's network configuration.
///
/// Only valid as of the query that produced it. Callers re-fetch before and
/// after every mutation instead of holding on to one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkFacts {
    /// IPv4 addresses reported in the configuration
    pub addresses: Vec<Ipv4Addr>,
    /// Token-like identifiers (token attributes and token elements)
    pub interface_tokens: Vec<String>,
    /// Interface names (Name elements)
    pub interface_names: Vec<String>,
    /// DHCP reported enabled on any interface
    pub dhcp_enabled: bool,
    /// Reported address prefix lengths
    pub prefix_lengths: Vec<u8>,
    /// First hardware (MAC) address, if reported
    pub hw_address: Option<String>,
    /// Raw response body
    #[serde(skip)]
    pub raw: String,
}

impl NetworkFacts {
    /// True when the query produced nothing usable
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
            && self.addresses.is_empty()
            && self.interface_tokens.is_empty()
            && self.interface_names.is_empty()
    }

    /// Whether the device reports `address` among its addresses
    pub fn reports_address(&self, address: Ipv4Addr) -> bool {
        self.addresses.contains(&address)
    }

    /// Token and name candidates in discovery order, de-duplicated
    pub fn interface_candidates(&self) -> Vec<String> {
        let mut candidates = Vec::new();
        for token in self.interface_tokens.iter().chain(&self.interface_names) {
            push_unique(&mut candidates, token);
        }
        candidates
    }
}

/// Append `value` unless it is already present
pub fn push_unique(list: &mut Vec<String>, value: &str) {
    if !value.is_empty() && !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}
