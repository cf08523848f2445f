//! Network reconfiguration state machine
//!
//! A change runs through explicit steps:
//!
//! ```text
//! GatherFacts -> [DisableDhcp] -> SendPrimary -> Settle -> Verify
//!                                                           |-> Confirmed
//!                                                           |-> SendAlternate -> Settle -> Verify
//!                                                           `-> terminal failure
//! ```
//!
//! Every path ends in a [`ReconfigurationReport`]. Transport trouble never
//! escapes as an error; it becomes an outcome with a reason and diagnostics.

use ipchanger_core::facts::{push_unique, DEFAULT_INTERFACE_TOKEN};
use ipchanger_core::{
    Credentials, DhcpReport, Diagnostics, FailureReason, NetworkFacts, PortProbe,
    ReconfigurationOutcome, ReconfigurationReport, ReconfigurationRequest, RequestError, Session,
};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::envelope::{self, MutationShape, StaticAddress};
use crate::inspect::{Inspector, QueryTimeouts};
use crate::parse::{self, MutationVerdict};
use crate::transport::Transport;

/// Timing and policy knobs for the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Device-service port
    pub port: u16,
    pub timeouts: QueryTimeouts,
    /// Pause after the best-effort DHCP disable
    pub dhcp_settle: Duration,
    /// Pause after an accepted mutation, before verification
    pub settle: Duration,
    /// Polling attempts at the new address
    pub verify_attempts: u32,
    /// Pause between polling attempts
    pub verify_interval: Duration,
    /// Port probe timeout at the old address
    pub old_probe_timeout: Duration,
    /// Port probe timeout at the new address
    pub new_probe_timeout: Duration,
    /// Body layout of the single alternate attempt
    pub alternate_shape: MutationShape,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            port: ipchanger_core::device::DEFAULT_ONVIF_PORT,
            timeouts: QueryTimeouts::default(),
            dhcp_settle: Duration::from_secs(2),
            settle: Duration::from_secs(5),
            verify_attempts: 10,
            verify_interval: Duration::from_secs(1),
            old_probe_timeout: Duration::from_secs(3),
            new_probe_timeout: Duration::from_secs(2),
            alternate_shape: MutationShape::LinkLocalPreserved,
        }
    }
}

#[derive(Debug)]
enum Step {
    GatherFacts,
    DisableDhcp,
    SendPrimary,
    SendAlternate,
    Settle,
    Verify,
    Finished(ReconfigurationOutcome),
}

enum Poll {
    Reached,
    TimedOut,
    Cancelled,
}

/// Per-call working state. Nothing here outlives one `reconfigure` call.
struct Run<'a> {
    request: &'a ReconfigurationRequest,
    credentials: &'a Credentials,
    facts: NetworkFacts,
    candidates: Vec<String>,
    primary_token: String,
    alternate_token: String,
    /// Set when the primary request was lost in transit; the device may still
    /// have applied it
    lost_in_transit: Option<FailureReason>,
    diagnostics: Diagnostics,
}

/// Drives address changes and DHCP mode changes against one device at a time
pub struct Reconfigurer<T: Transport + ?Sized, P: PortProbe + ?Sized> {
    inspector: Inspector<T>,
    probe: Arc<P>,
    options: EngineOptions,
}

impl<T: Transport + ?Sized, P: PortProbe + ?Sized> Reconfigurer<T, P> {
    pub fn new(transport: Arc<T>, probe: Arc<P>, options: EngineOptions) -> Self {
        Self {
            inspector: Inspector::new(transport, options.port, options.timeouts),
            probe,
            options,
        }
    }

    /// Move a device to a new static address.
    ///
    /// Returns `Err` only for contract violations. The session registry is
    /// updated only when the outcome is `Confirmed`.
    pub async fn reconfigure(
        &self,
        session: &mut Session,
        request: &ReconfigurationRequest,
        cancel: &CancellationToken,
    ) -> Result<ReconfigurationReport, RequestError> {
        request.validate()?;
        let credentials = session
            .credentials()
            .cloned()
            .ok_or(RequestError::MissingCredentials)?;

        info!(
            old = %request.current(),
            new = %request.new_address(),
            gateway = %request.gateway(),
            prefix = request.prefix_len(),
            "Starting reconfiguration"
        );
        if !request.gateway_in_subnet() {
            warn!(gateway = %request.gateway(), "Gateway is outside the new subnet");
        }

        let mut run = Run {
            request,
            credentials: &credentials,
            facts: NetworkFacts::default(),
            candidates: Vec::new(),
            primary_token: String::new(),
            alternate_token: String::new(),
            lost_in_transit: None,
            diagnostics: Diagnostics::default(),
        };

        let mut step = Step::GatherFacts;
        let outcome = loop {
            debug!(ip = %request.current(), step = ?step, "Reconfiguration step");
            step = match step {
                // Nothing is sent to the device once cancelled.
                Step::DisableDhcp | Step::SendPrimary | Step::SendAlternate
                    if cancel.is_cancelled() =>
                {
                    info!(ip = %request.current(), "Cancelled before sending a change");
                    Step::Finished(ReconfigurationOutcome::Cancelled)
                }
                Step::GatherFacts => self.gather_facts(&mut run).await,
                Step::DisableDhcp => self.disable_dhcp(&mut run, cancel).await,
                Step::SendPrimary => self.send_primary(&mut run).await,
                Step::SendAlternate => self.send_alternate(&mut run).await,
                Step::Settle => {
                    if self.pause(self.options.settle, cancel).await {
                        Step::Verify
                    } else {
                        Step::Finished(ReconfigurationOutcome::Cancelled)
                    }
                }
                Step::Verify => self.verify(&mut run, cancel).await,
                Step::Finished(outcome) => break outcome,
            };
        };

        if outcome.is_confirmed() {
            session.readdress(request.current(), request.new_address());
        }

        match &outcome {
            ReconfigurationOutcome::Confirmed => info!(
                old = %request.current(),
                new = %request.new_address(),
                "Address change confirmed"
            ),
            other => warn!(
                old = %request.current(),
                new = %request.new_address(),
                outcome = %other,
                "Address change not confirmed"
            ),
        }

        Ok(ReconfigurationReport {
            old_address: request.current(),
            new_address: request.new_address(),
            outcome,
            diagnostics: run.diagnostics,
        })
    }

    async fn gather_facts(&self, run: &mut Run<'_>) -> Step {
        let old = run.request.current();
        let creds = Some(run.credentials);

        let facts = self.inspector.network_config(old, creds).await;
        if facts.is_empty() && !self.is_open(old, self.options.old_probe_timeout).await {
            run.diagnostics.reachable_at_old = Some(false);
            return Step::Finished(ReconfigurationOutcome::Unreachable(
                FailureReason::TransportUnreachable,
            ));
        }

        let listed = self.inspector.reported_interfaces(old, creds).await;
        let mut candidates = Vec::new();
        for token in listed.iter().chain(&facts.interface_candidates()) {
            push_unique(&mut candidates, token);
        }
        if candidates.is_empty() {
            candidates.push(DEFAULT_INTERFACE_TOKEN.to_string());
        }

        let primary = run
            .request
            .interface_token()
            .map(str::to_string)
            .unwrap_or_else(|| candidates[0].clone());
        let alternate = candidates
            .iter()
            .find(|c| **c != primary)
            .cloned()
            .unwrap_or_else(|| primary.clone());

        debug!(
            ip = %old,
            candidates = ?candidates,
            primary = %primary,
            alternate = %alternate,
            "Interface candidates"
        );

        let d = &mut run.diagnostics;
        d.interface_token = Some(primary.clone());
        d.interface_candidates = candidates.clone();
        d.addresses_before = facts.addresses.clone();
        d.dhcp_was_enabled = facts.dhcp_enabled;

        run.primary_token = primary;
        run.alternate_token = alternate;
        run.candidates = candidates;
        let dhcp_enabled = facts.dhcp_enabled;
        run.facts = facts;

        if dhcp_enabled {
            warn!(ip = %old, "DHCP is enabled; it will be disabled before the change");
            Step::DisableDhcp
        } else {
            Step::SendPrimary
        }
    }

    async fn disable_dhcp(&self, run: &mut Run<'_>, cancel: &CancellationToken) -> Step {
        let old = run.request.current();
        let acknowledged = match self
            .inspector
            .call(old, envelope::disable_dhcp(&run.primary_token), Some(run.credentials))
            .await
        {
            Ok(response) => parse::acknowledges_set(&response),
            Err(e) => {
                debug!(ip = %old, error = %e, "DHCP disable request failed");
                false
            }
        };
        run.diagnostics.dhcp_disable_acknowledged = Some(acknowledged);
        if !acknowledged {
            warn!(ip = %old, "DHCP disable not acknowledged, continuing");
        }

        if self.pause(self.options.dhcp_settle, cancel).await {
            Step::SendPrimary
        } else {
            Step::Finished(ReconfigurationOutcome::Cancelled)
        }
    }

    async fn send_primary(&self, run: &mut Run<'_>) -> Step {
        let old = run.request.current();
        let target = StaticAddress {
            interface_token: &run.primary_token,
            address: run.request.new_address(),
            prefix_len: run.request.prefix_len(),
            gateway: run.request.gateway(),
            hw_address: None,
        };
        info!(ip = %old, token = %run.primary_token, "Sending network configuration");

        let result = self
            .inspector
            .call(
                old,
                envelope::set_static_address(MutationShape::Primary, &target),
                Some(run.credentials),
            )
            .await;

        match result {
            Err(e) if e.may_have_applied() => {
                warn!(ip = %old, error = %e, "Request lost in transit, checking whether it applied");
                run.lost_in_transit = Some(e.failure_reason());
                Step::Settle
            }
            Err(e) => Step::Finished(ReconfigurationOutcome::Failed(e.failure_reason())),
            Ok(response) => {
                run.diagnostics.last_status = Some(response.status);
                let verdict = MutationVerdict::classify(&response);
                match verdict.failure_reason() {
                    None => {
                        self.note_accepted(run, &verdict);
                        Step::Settle
                    }
                    Some(reason) => {
                        if let MutationVerdict::Fault(fault) = verdict {
                            run.diagnostics.fault = Some(fault);
                        }
                        warn!(ip = %old, reason = %reason, "Network configuration rejected");
                        Step::Finished(ReconfigurationOutcome::ProtocolRejected(reason))
                    }
                }
            }
        }
    }

    async fn send_alternate(&self, run: &mut Run<'_>) -> Step {
        let old = run.request.current();
        let shape = self.options.alternate_shape;
        let target = StaticAddress {
            interface_token: &run.alternate_token,
            address: run.request.new_address(),
            prefix_len: run.request.prefix_len(),
            gateway: run.request.gateway(),
            hw_address: run.facts.hw_address.as_deref(),
        };
        run.diagnostics.alternate_attempted = true;
        run.diagnostics.alternate_token = Some(run.alternate_token.clone());
        info!(
            ip = %old,
            token = %run.alternate_token,
            shape = %shape,
            "Configuration unchanged, trying alternate request"
        );

        let result = self
            .inspector
            .call(
                old,
                envelope::set_static_address(shape, &target),
                Some(run.credentials),
            )
            .await;

        let unchanged = Step::Finished(ReconfigurationOutcome::Failed(
            FailureReason::ConfigUnchanged,
        ));
        match result {
            Err(e) if e.may_have_applied() => {
                warn!(ip = %old, error = %e, "Alternate request lost in transit");
                Step::Settle
            }
            Err(e) => {
                warn!(ip = %old, error = %e, "Alternate request failed");
                unchanged
            }
            Ok(response) => {
                run.diagnostics.last_status = Some(response.status);
                let verdict = MutationVerdict::classify(&response);
                if verdict.is_accepted() {
                    self.note_accepted(run, &verdict);
                    return Step::Settle;
                }
                if let MutationVerdict::Fault(fault) = verdict {
                    run.diagnostics.fault = Some(fault);
                }
                warn!(ip = %old, status = response.status, "Alternate request rejected");
                unchanged
            }
        }
    }

    fn note_accepted(&self, run: &mut Run<'_>, verdict: &MutationVerdict) {
        if let MutationVerdict::Accepted { reboot_needed } = verdict {
            run.diagnostics.reboot_needed = Some(*reboot_needed);
            if *reboot_needed {
                warn!(ip = %run.request.current(), "Device reports a reboot is needed");
            }
        }
        info!(ip = %run.request.current(), "Network configuration accepted");
    }

    async fn verify(&self, run: &mut Run<'_>, cancel: &CancellationToken) -> Step {
        let old = run.request.current();
        let new = run.request.new_address();

        let facts = self
            .inspector
            .network_config(old, Some(run.credentials))
            .await;
        let config_changed = facts.reports_address(new);
        let still_at_old = self.is_open(old, self.options.old_probe_timeout).await;

        debug!(
            ip = %old,
            config_changed = config_changed,
            still_at_old = still_at_old,
            addresses = ?facts.addresses,
            "Verification facts"
        );
        let d = &mut run.diagnostics;
        d.addresses_after = facts.addresses;
        d.config_changed = Some(config_changed);
        d.reachable_at_old = Some(still_at_old);

        if config_changed || !still_at_old {
            match self.poll_new_address(run, cancel).await {
                Poll::Reached => return Step::Finished(ReconfigurationOutcome::Confirmed),
                Poll::Cancelled => return Step::Finished(ReconfigurationOutcome::Cancelled),
                Poll::TimedOut => {}
            }
            let reason = if still_at_old {
                FailureReason::ChangedWithoutReachability
            } else {
                FailureReason::VerificationTimeout
            };
            warn!(ip = %old, new = %new, reason = %reason, "Device not reachable at new address");
            return if still_at_old {
                Step::Finished(ReconfigurationOutcome::Failed(reason))
            } else {
                Step::Finished(ReconfigurationOutcome::AppliedButUnverified(reason))
            };
        }

        // Still at the old address with the old configuration.
        if let Some(reason) = run.lost_in_transit.take() {
            return Step::Finished(ReconfigurationOutcome::Unreachable(reason));
        }
        if run.candidates.len() > 1 && !run.diagnostics.alternate_attempted {
            return Step::SendAlternate;
        }
        Step::Finished(ReconfigurationOutcome::Failed(
            FailureReason::ConfigUnchanged,
        ))
    }

    async fn poll_new_address(&self, run: &mut Run<'_>, cancel: &CancellationToken) -> Poll {
        let new = run.request.new_address();
        let attempts = self.options.verify_attempts.max(1);

        for attempt in 1..=attempts {
            run.diagnostics.verification_attempts = attempt;
            if self.is_open(new, self.options.new_probe_timeout).await
                && self
                    .inspector
                    .identity(new, Some(run.credentials))
                    .await
                    .is_some()
            {
                debug!(ip = %new, attempt = attempt, "Device answered at new address");
                run.diagnostics.reachable_at_new = Some(true);
                return Poll::Reached;
            }
            if attempt < attempts && !self.pause(self.options.verify_interval, cancel).await {
                return Poll::Cancelled;
            }
        }
        run.diagnostics.reachable_at_new = Some(false);
        Poll::TimedOut
    }

    /// Switch DHCP on or off and confirm the device reports the new mode
    pub async fn set_dhcp_mode(
        &self,
        session: &Session,
        address: Ipv4Addr,
        enable: bool,
        interface_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<DhcpReport, RequestError> {
        let credentials = session
            .credentials()
            .ok_or(RequestError::MissingCredentials)?;
        let creds = Some(credentials);

        let token = match interface_token.filter(|t| !t.trim().is_empty()) {
            Some(token) => token.to_string(),
            None => self
                .inspector
                .network_interfaces(address, creds)
                .await
                .into_iter()
                .next()
                .unwrap_or_else(|| DEFAULT_INTERFACE_TOKEN.to_string()),
        };
        info!(ip = %address, token = %token, enable = enable, "Setting DHCP mode");

        let mut report = DhcpReport {
            address,
            enable,
            interface_token: token,
            outcome: ReconfigurationOutcome::Cancelled,
            reboot_needed: None,
            dhcp_now: None,
            addresses: Vec::new(),
        };

        if cancel.is_cancelled() {
            return Ok(report);
        }
        let result = self
            .inspector
            .call(
                address,
                envelope::set_dhcp_mode(&report.interface_token, enable),
                creds,
            )
            .await;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(ip = %address, error = %e, "DHCP mode request failed");
                report.outcome = if e.may_have_applied() {
                    ReconfigurationOutcome::Unreachable(e.failure_reason())
                } else {
                    ReconfigurationOutcome::Failed(e.failure_reason())
                };
                return Ok(report);
            }
        };

        let verdict = MutationVerdict::classify(&response);
        match verdict {
            MutationVerdict::Accepted { reboot_needed } => {
                report.reboot_needed = Some(reboot_needed);
                if reboot_needed {
                    warn!(ip = %address, "Device reports a reboot is needed");
                }
            }
            rejected => {
                if let Some(reason) = rejected.failure_reason() {
                    warn!(ip = %address, reason = %reason, "DHCP mode change rejected");
                    report.outcome = ReconfigurationOutcome::ProtocolRejected(reason);
                }
                return Ok(report);
            }
        }

        if !self.pause(self.options.settle, cancel).await {
            return Ok(report);
        }

        let facts = self.inspector.network_config(address, creds).await;
        report.outcome = if facts.is_empty() {
            ReconfigurationOutcome::AppliedButUnverified(FailureReason::VerificationTimeout)
        } else if facts.dhcp_enabled == enable {
            ReconfigurationOutcome::Confirmed
        } else {
            ReconfigurationOutcome::Failed(FailureReason::ConfigUnchanged)
        };
        if !facts.is_empty() {
            report.dhcp_now = Some(facts.dhcp_enabled);
        }
        report.addresses = facts.addresses;

        info!(ip = %address, outcome = %report.outcome, "DHCP mode change finished");
        Ok(report)
    }

    async fn is_open(&self, address: Ipv4Addr, timeout: Duration) -> bool {
        self.probe
            .is_open(SocketAddrV4::new(address, self.options.port), timeout)
            .await
    }

    /// Sleep unless cancelled first. Returns false on cancellation.
    async fn pause(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
