//! Validated reconfiguration requests

use serde::Serialize;
use std::net::Ipv4Addr;
use thiserror::Error;

use crate::network::same_subnet;

/// Smallest accepted prefix length
pub const MIN_PREFIX_LEN: u8 = 8;
/// Largest accepted prefix length
pub const MAX_PREFIX_LEN: u8 = 30;

/// Contract violations rejected before any request reaches a device
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("New address {0} is the same as the current address")]
    SameAddress(Ipv4Addr),
    #[error("Prefix length {0} outside 8-30")]
    PrefixOutOfRange(u8),
    #[error("Gateway {gateway} is not inside {address}/{prefix_len}")]
    GatewayOutsideSubnet {
        gateway: Ipv4Addr,
        address: Ipv4Addr,
        prefix_len: u8,
    },
    #[error("No active credentials in session")]
    MissingCredentials,
}

/// A request to move a device to a new static IPv4 configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconfigurationRequest {
    current: Ipv4Addr,
    new_address: Ipv4Addr,
    gateway: Ipv4Addr,
    prefix_len: u8,
    interface_token: Option<String>,
    allow_foreign_gateway: bool,
}

impl ReconfigurationRequest {
    /// Build and validate a request.
    ///
    /// A gateway outside the new subnet is only accepted when
    /// `allow_foreign_gateway` is set (the caller confirmed the override).
    pub fn new(
        current: Ipv4Addr,
        new_address: Ipv4Addr,
        gateway: Ipv4Addr,
        prefix_len: u8,
        interface_token: Option<String>,
        allow_foreign_gateway: bool,
    ) -> Result<Self, RequestError> {
        let request = Self {
            current,
            new_address,
            gateway,
            prefix_len,
            interface_token: interface_token.filter(|t| !t.trim().is_empty()),
            allow_foreign_gateway,
        };
        request.validate()?;
        Ok(request)
    }

    /// Re-check every invariant
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.new_address == self.current {
            return Err(RequestError::SameAddress(self.new_address));
        }
        if !(MIN_PREFIX_LEN..=MAX_PREFIX_LEN).contains(&self.prefix_len) {
            return Err(RequestError::PrefixOutOfRange(self.prefix_len));
        }
        if !self.allow_foreign_gateway && !self.gateway_in_subnet() {
            return Err(RequestError::GatewayOutsideSubnet {
                gateway: self.gateway,
                address: self.new_address,
                prefix_len: self.prefix_len,
            });
        }
        Ok(())
    }

    /// Whether the gateway sits inside the new address's subnet
    pub fn gateway_in_subnet(&self) -> bool {
        same_subnet(self.gateway, self.new_address, self.prefix_len)
    }

    pub fn current(&self) -> Ipv4Addr {
        self.current
    }

    pub fn new_address(&self) -> Ipv4Addr {
        self.new_address
    }

    pub fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Interface chosen by the caller, if any
    pub fn interface_token(&self) -> Option<&str> {
        self.interface_token.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn test_valid_request() {
        let req = ReconfigurationRequest::new(
            ip("10.0.0.5"),
            ip("10.0.0.9"),
            ip("10.0.0.1"),
            24,
            Some("eth0".into()),
            false,
        )
        .unwrap();
        assert_eq!(req.interface_token(), Some("eth0"));
        assert!(req.gateway_in_subnet());
    }

    #[test]
    fn test_same_address_rejected() {
        let err = ReconfigurationRequest::new(
            ip("10.0.0.5"),
            ip("10.0.0.5"),
            ip("10.0.0.1"),
            24,
            None,
            false,
        )
        .unwrap_err();
        assert_eq!(err, RequestError::SameAddress(ip("10.0.0.5")));
    }

    #[test]
    fn test_prefix_bounds() {
        for prefix in [0u8, 7, 31, 32] {
            let err = ReconfigurationRequest::new(
                ip("10.0.0.5"),
                ip("10.0.0.9"),
                ip("10.0.0.1"),
                prefix,
                None,
                true,
            )
            .unwrap_err();
            assert_eq!(err, RequestError::PrefixOutOfRange(prefix));
        }
        for prefix in [8u8, 30] {
            assert!(ReconfigurationRequest::new(
                ip("10.0.0.5"),
                ip("10.0.0.9"),
                ip("10.0.0.10"),
                prefix,
                None,
                false,
            )
            .is_ok());
        }
    }

    #[test]
    fn test_foreign_gateway_needs_override() {
        let err = ReconfigurationRequest::new(
            ip("10.0.0.5"),
            ip("10.0.0.9"),
            ip("192.168.1.1"),
            24,
            None,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, RequestError::GatewayOutsideSubnet { .. }));

        let req = ReconfigurationRequest::new(
            ip("10.0.0.5"),
            ip("10.0.0.9"),
            ip("192.168.1.1"),
            24,
            None,
            true,
        )
        .unwrap();
        assert!(!req.gateway_in_subnet());
    }

    #[test]
    fn test_blank_interface_token_is_none() {
        let req = ReconfigurationRequest::new(
            ip("10.0.0.5"),
            ip("10.0.0.9"),
            ip("10.0.0.1"),
            24,
            Some("  ".into()),
            false,
        )
        .unwrap();
        assert_eq!(req.interface_token(), None);
    }
}
