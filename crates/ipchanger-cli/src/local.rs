//! Local interface lookup for the default scan range

use ipchanger_core::Ipv4Cidr;
use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};
use std::net::Ipv4Addr;
use tracing::debug;

/// A local IPv4 interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInterface {
    pub name: String,
    pub address: Ipv4Addr,
    pub network: Ipv4Cidr,
}

/// Non-loopback, non-virtual IPv4 interfaces
pub fn local_interfaces() -> Vec<LocalInterface> {
    let interfaces = match NetworkInterface::show() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            debug!(error = %e, "Failed to list network interfaces");
            return Vec::new();
        }
    };

    interfaces
        .into_iter()
        .filter(|iface| !is_virtual(&iface.name))
        .filter_map(|iface| {
            iface.addr.iter().find_map(|addr| match addr {
                Addr::V4(v4) if !v4.ip.is_loopback() && !v4.ip.is_link_local() => {
                    let prefix = v4.netmask.map_or(24, |m| u32::from(m).count_ones() as u8);
                    let network = Ipv4Cidr::new(v4.ip, prefix).ok()?;
                    Some(LocalInterface {
                        name: iface.name.clone(),
                        address: v4.ip,
                        network,
                    })
                }
                _ => None,
            })
        })
        .collect()
}

/// Network of the first usable local interface
pub fn suggest_network() -> Option<Ipv4Cidr> {
    let first = local_interfaces().into_iter().next()?;
    debug!(
        interface = %first.name,
        address = %first.address,
        network = %first.network,
        "Suggested scan range"
    );
    Some(first.network)
}

fn is_virtual(name: &str) -> bool {
    name.starts_with("lo")
        || name.starts_with("docker")
        || name.starts_with("br-")
        || name.starts_with("veth")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_interfaces_filtered() {
        assert!(is_virtual("lo"));
        assert!(is_virtual("docker0"));
        assert!(is_virtual("br-1a2b"));
        assert!(is_virtual("veth12"));
        assert!(!is_virtual("eth0"));
        assert!(!is_virtual("enp3s0"));
    }

    #[test]
    fn test_local_interfaces_are_usable() {
        for iface in local_interfaces() {
            assert!(!iface.address.is_loopback());
            assert!(iface.network.contains(iface.address));
        }
    }
}
