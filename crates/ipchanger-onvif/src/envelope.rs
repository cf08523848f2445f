//! SOAP 1.2 request bodies for the device-service operations we use
//!
//! Every interpolated value goes through XML escaping. Addresses are typed so
//! only the interface token and hardware address can carry markup.

use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

const SOAP_ENV_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
const DEVICE_NS: &str = "http://www.onvif.org/ver10/device/wsdl";
const SCHEMA_NS: &str = "http://www.onvif.org/ver10/schema";

/// Interface MTU written by every mutation
pub const DEFAULT_MTU: u16 = 1500;

/// Body layout of a static-address `SetNetworkInterfaces` request.
///
/// Devices disagree on which optional blocks they tolerate, so the engine
/// sends `Primary` first and at most one alternate afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationShape {
    /// Info block, manual address, link-local mirror of the new address,
    /// IPv6 disabled
    Primary,
    /// Info block with the hardware address, no link-local block
    #[default]
    LinkLocalPreserved,
    /// Explicit link auto-negotiation, top-level MTU, no IPv6 block
    LinkNegotiated,
}

impl std::fmt::Display for MutationShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Primary => "primary",
            Self::LinkLocalPreserved => "link_local_preserved",
            Self::LinkNegotiated => "link_negotiated",
        };
        f.write_str(name)
    }
}

/// Which operation an envelope carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetDeviceInformation,
    GetNetworkInterfaces,
    /// Manual IPv4 address change
    SetStaticAddress(MutationShape),
    /// Minimal DHCP-off request sent before a static change
    DisableDhcp,
    /// Switch DHCP on or off without touching the address
    SetDhcpMode(bool),
}

impl Operation {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::GetDeviceInformation | Self::GetNetworkInterfaces)
    }
}

/// A ready-to-send request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub operation: Operation,
    pub body: String,
}

/// Target of a static-address change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticAddress<'a> {
    pub interface_token: &'a str,
    pub address: Ipv4Addr,
    pub prefix_len: u8,
    pub gateway: Ipv4Addr,
    /// Only used by [`MutationShape::LinkLocalPreserved`]
    pub hw_address: Option<&'a str>,
}

pub fn get_device_information() -> Envelope {
    Envelope {
        operation: Operation::GetDeviceInformation,
        body: read_only("GetDeviceInformation"),
    }
}

pub fn get_network_interfaces() -> Envelope {
    Envelope {
        operation: Operation::GetNetworkInterfaces,
        body: read_only("GetNetworkInterfaces"),
    }
}

/// Full interface replacement with a manual address, DHCP off and a gateway
pub fn set_static_address(shape: MutationShape, target: &StaticAddress<'_>) -> Envelope {
    let token = escape(target.interface_token);
    let address = target.address;
    let prefix = target.prefix_len;

    let interface = match shape {
        MutationShape::Primary => format!(
            r#"<tt:Enabled>true</tt:Enabled>
        <tt:Info>
          <tt:Name>{token}</tt:Name>
          <tt:MTU>{DEFAULT_MTU}</tt:MTU>
        </tt:Info>
        <tt:IPv4>
          <tt:Enabled>true</tt:Enabled>
          <tt:Config>
            <tt:Manual>
              <tt:Address>{address}</tt:Address>
              <tt:PrefixLength>{prefix}</tt:PrefixLength>
            </tt:Manual>
            <tt:LinkLocal>
              <tt:Address>{address}</tt:Address>
              <tt:PrefixLength>{prefix}</tt:PrefixLength>
            </tt:LinkLocal>
            <tt:DHCP>false</tt:DHCP>
          </tt:Config>
        </tt:IPv4>
        <tt:IPv6><tt:Enabled>false</tt:Enabled></tt:IPv6>"#
        ),
        MutationShape::LinkLocalPreserved => {
            let hw = target
                .hw_address
                .filter(|hw| !hw.is_empty())
                .map(|hw| format!("\n          <tt:HwAddress>{}</tt:HwAddress>", escape(hw)))
                .unwrap_or_default();
            format!(
                r#"<tt:Enabled>true</tt:Enabled>
        <tt:Info>
          <tt:Name>{token}</tt:Name>{hw}
          <tt:MTU>{DEFAULT_MTU}</tt:MTU>
        </tt:Info>
        <tt:IPv4>
          <tt:Enabled>true</tt:Enabled>
          <tt:Config>
            <tt:Manual>
              <tt:Address>{address}</tt:Address>
              <tt:PrefixLength>{prefix}</tt:PrefixLength>
            </tt:Manual>
            <tt:DHCP>false</tt:DHCP>
          </tt:Config>
        </tt:IPv4>
        <tt:IPv6><tt:Enabled>false</tt:Enabled></tt:IPv6>"#
            )
        }
        MutationShape::LinkNegotiated => format!(
            r#"<tt:Enabled>true</tt:Enabled>
        <tt:Link>
          <tt:AutoNegotiation>true</tt:AutoNegotiation>
          <tt:Speed>100</tt:Speed>
          <tt:Duplex>Full</tt:Duplex>
        </tt:Link>
        <tt:MTU>{DEFAULT_MTU}</tt:MTU>
        <tt:IPv4>
          <tt:Enabled>true</tt:Enabled>
          <tt:Config>
            <tt:Manual>
              <tt:Address>{address}</tt:Address>
              <tt:PrefixLength>{prefix}</tt:PrefixLength>
            </tt:Manual>
            <tt:DHCP>false</tt:DHCP>
          </tt:Config>
        </tt:IPv4>"#
        ),
    };

    let prefix_name = match shape {
        MutationShape::LinkNegotiated => "soap",
        _ => "s",
    };
    let operation = format!(
        r#"<tds:SetNetworkInterfaces>
      <tds:InterfaceToken>{token}</tds:InterfaceToken>
      <tds:NetworkInterface>
        {interface}
      </tds:NetworkInterface>
      <tds:IPv4Gateway>
        <tt:Address>{gateway}</tt:Address>
      </tds:IPv4Gateway>
    </tds:SetNetworkInterfaces>"#,
        gateway = target.gateway,
    );

    Envelope {
        operation: Operation::SetStaticAddress(shape),
        body: wrap(prefix_name, true, &operation),
    }
}

/// DHCP off on `interface_token`, nothing else
pub fn disable_dhcp(interface_token: &str) -> Envelope {
    let token = escape(interface_token);
    let operation = format!(
        r#"<tds:SetNetworkInterfaces>
      <tds:InterfaceToken>{token}</tds:InterfaceToken>
      <tds:NetworkInterface>
        <tt:Enabled>true</tt:Enabled>
        <tt:IPv4>
          <tt:Enabled>true</tt:Enabled>
          <tt:DHCP>false</tt:DHCP>
        </tt:IPv4>
      </tds:NetworkInterface>
    </tds:SetNetworkInterfaces>"#
    );
    Envelope {
        operation: Operation::DisableDhcp,
        body: wrap("s", true, &operation),
    }
}

/// DHCP on or off, keeping the interface enabled and IPv6 disabled
pub fn set_dhcp_mode(interface_token: &str, enable: bool) -> Envelope {
    let token = escape(interface_token);
    let operation = format!(
        r#"<tds:SetNetworkInterfaces>
      <tds:InterfaceToken>{token}</tds:InterfaceToken>
      <tds:NetworkInterface>
        <tt:Enabled>true</tt:Enabled>
        <tt:Info>
          <tt:Name>{token}</tt:Name>
          <tt:MTU>{DEFAULT_MTU}</tt:MTU>
        </tt:Info>
        <tt:IPv4>
          <tt:Enabled>true</tt:Enabled>
          <tt:Config>
            <tt:DHCP>{enable}</tt:DHCP>
          </tt:Config>
        </tt:IPv4>
        <tt:IPv6><tt:Enabled>false</tt:Enabled></tt:IPv6>
      </tds:NetworkInterface>
    </tds:SetNetworkInterfaces>"#
    );
    Envelope {
        operation: Operation::SetDhcpMode(enable),
        body: wrap("s", true, &operation),
    }
}

fn read_only(operation: &str) -> String {
    wrap("s", false, &format!("<tds:{operation}/>"))
}

fn wrap(prefix: &str, with_schema: bool, operation: &str) -> String {
    let schema = if with_schema {
        format!("\n    xmlns:tt=\"{SCHEMA_NS}\"")
    } else {
        String::new()
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<{prefix}:Envelope xmlns:{prefix}="{SOAP_ENV_NS}"
    xmlns:tds="{DEVICE_NS}"{schema}>
  <{prefix}:Header/>
  <{prefix}:Body>
    {operation}
  </{prefix}:Body>
</{prefix}:Envelope>"#
    )
}
