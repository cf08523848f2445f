//! Terminal results of mutating operations and the facts that explain them

use serde::Serialize;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Fault details extracted from a protocol fault response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Fault {
    /// Fault code (SOAP 1.1 faultcode, or the deepest SOAP 1.2 Code/Subcode value)
    pub code: Option<String>,
    /// Human-readable reason (faultstring or Reason/Text)
    pub reason: Option<String>,
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.code, &self.reason) {
            (Some(code), Some(reason)) => write!(f, "{}: {}", code, reason),
            (Some(code), None) => write!(f, "{}", code),
            (None, Some(reason)) => write!(f, "{}", reason),
            (None, None) => write!(f, "unspecified fault"),
        }
    }
}

/// Why an operation did not end in `Confirmed`
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    #[error("request timed out")]
    TransportTimeout,
    #[error("connection refused or host unreachable")]
    TransportUnreachable,
    #[error("transport error: {0}")]
    TransportOther(String),
    #[error("authentication failed (HTTP 401)")]
    AuthenticationFailed,
    #[error("device returned a protocol fault ({0})")]
    ProtocolFault(Fault),
    #[error("HTTP error {0}")]
    HttpStatus(u16),
    #[error("response carried neither a success nor a fault marker")]
    AmbiguousResponse,
    #[error("device did not answer at the new address within the polling window")]
    VerificationTimeout,
    #[error("device accepted the command but its configuration did not change")]
    ConfigUnchanged,
    #[error("device reports the new configuration but is not reachable there (manual reboot likely needed)")]
    ChangedWithoutReachability,
}

/// Terminal classification of a mutating operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReconfigurationOutcome {
    /// Change verified independently at the new address
    Confirmed,
    /// Device refused the request (auth, fault, or unrecognized answer)
    ProtocolRejected(FailureReason),
    /// Device vanished from the old address and never appeared at the new one
    AppliedButUnverified(FailureReason),
    /// Device could not be reached to issue or confirm the request
    Unreachable(FailureReason),
    /// Request accepted but verification ruled the change out
    Failed(FailureReason),
    /// Interrupted during a settle or polling wait
    Cancelled,
}

impl ReconfigurationOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }

    pub fn reason(&self) -> Option<&FailureReason> {
        match self {
            Self::ProtocolRejected(r)
            | Self::AppliedButUnverified(r)
            | Self::Unreachable(r)
            | Self::Failed(r) => Some(r),
            Self::Confirmed | Self::Cancelled => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::ProtocolRejected(_) => "protocol-rejected",
            Self::AppliedButUnverified(_) => "applied-but-unverified",
            Self::Unreachable(_) => "unreachable",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ReconfigurationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{}: {}", self.label(), reason),
            None => write!(f, "{}", self.label()),
        }
    }
}

/// Facts collected along the way, reported with every outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Interface identifier used for the primary request
    pub interface_token: Option<String>,
    /// Every interface candidate seen while gathering facts
    pub interface_candidates: Vec<String>,
    /// Addresses the device reported before the change
    pub addresses_before: Vec<Ipv4Addr>,
    /// Addresses the device reported at the last verification
    pub addresses_after: Vec<Ipv4Addr>,
    /// DHCP was enabled when facts were gathered
    pub dhcp_was_enabled: bool,
    /// Result of the best-effort DHCP disable, if it was attempted
    pub dhcp_disable_acknowledged: Option<bool>,
    /// HTTP status of the last mutation response
    pub last_status: Option<u16>,
    /// Fault details of the last mutation response
    pub fault: Option<Fault>,
    /// Reboot flag from the last accepted mutation response (advisory only)
    pub reboot_needed: Option<bool>,
    /// Old address's facts list the new address
    pub config_changed: Option<bool>,
    /// Last known reachability at the old address
    pub reachable_at_old: Option<bool>,
    /// Last known reachability at the new address
    pub reachable_at_new: Option<bool>,
    /// Polling attempts spent at the new address
    pub verification_attempts: u32,
    /// The alternate request shape was sent
    pub alternate_attempted: bool,
    /// Interface identifier used for the alternate request
    pub alternate_token: Option<String>,
}

/// Result of one reconfiguration call
#[derive(Debug, Clone, Serialize)]
pub struct ReconfigurationReport {
    pub old_address: Ipv4Addr,
    pub new_address: Ipv4Addr,
    pub outcome: ReconfigurationOutcome,
    pub diagnostics: Diagnostics,
}

impl ReconfigurationReport {
    pub fn is_confirmed(&self) -> bool {
        self.outcome.is_confirmed()
    }
}

/// Result of a DHCP mode change
#[derive(Debug, Clone, Serialize)]
pub struct DhcpReport {
    pub address: Ipv4Addr,
    /// Requested DHCP state
    pub enable: bool,
    pub interface_token: String,
    pub outcome: ReconfigurationOutcome,
    pub reboot_needed: Option<bool>,
    /// DHCP state reported after the change
    pub dhcp_now: Option<bool>,
    /// Addresses reported after the change
    pub addresses: Vec<Ipv4Addr>,
}
