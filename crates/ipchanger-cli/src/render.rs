//! Human-readable output for command results

use ipchanger_core::{
    Device, DeviceIdentity, DhcpReport, FailureReason, NetworkFacts, ReconfigurationOutcome,
    ReconfigurationReport,
};

pub fn print_devices(devices: &[Device]) {
    if devices.is_empty() {
        println!("No ONVIF devices found.");
        return;
    }
    println!("Discovered {} devices:", devices.len());
    for (index, device) in devices.iter().enumerate() {
        println!("  {:>3}. {}", index + 1, device);
        if let Some(firmware) = &device.firmware_version {
            println!("       Firmware: {}", firmware);
        }
        if let Some(serial) = &device.serial_number {
            println!("       Serial: {}", serial);
        }
    }
}

pub fn print_identity(identity: Option<&DeviceIdentity>) {
    let Some(identity) = identity else {
        println!("Identity:      not available");
        return;
    };
    let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    println!("Manufacturer:  {}", field(&identity.manufacturer));
    println!("Model:         {}", field(&identity.model));
    println!("Firmware:      {}", field(&identity.firmware_version));
    println!("Serial number: {}", field(&identity.serial_number));
    println!("Hardware id:   {}", field(&identity.hardware_id));
}

pub fn print_facts(facts: &NetworkFacts, interfaces: &[String], verbose: bool) {
    if facts.is_empty() {
        println!("Network:       no configuration reported");
        return;
    }
    println!("Addresses:     {}", join(&facts.addresses));
    println!("Prefixes:      {}", join(&facts.prefix_lengths));
    println!("DHCP:          {}", if facts.dhcp_enabled { "enabled" } else { "disabled" });
    println!("Interfaces:    {}", interfaces.join(", "));
    println!("Candidates:    {}", facts.interface_candidates().join(", "));
    if let Some(hw) = &facts.hw_address {
        println!("Hardware addr: {}", hw);
    }
    if verbose {
        println!("Raw response:");
        for line in facts.raw.replace("><", ">\n<").lines() {
            println!("  {}", line);
        }
    }
}

pub fn print_report(report: &ReconfigurationReport) {
    println!(
        "{} -> {}: {}",
        report.old_address, report.new_address, report.outcome
    );
    let d = &report.diagnostics;
    println!("  Interface:        {}", d.interface_token.as_deref().unwrap_or("-"));
    println!("  Candidates:       {}", d.interface_candidates.join(", "));
    println!("  Before:           {}", join(&d.addresses_before));
    println!("  After:            {}", join(&d.addresses_after));
    println!("  DHCP was enabled: {}", d.dhcp_was_enabled);
    println!("  Config changed:   {}", tri(d.config_changed));
    println!("  At old address:   {}", tri(d.reachable_at_old));
    println!("  At new address:   {}", tri(d.reachable_at_new));
    println!("  Reboot needed:    {}", tri(d.reboot_needed));
    if let Some(status) = d.last_status {
        println!("  Last HTTP status: {}", status);
    }
    if let Some(fault) = &d.fault {
        println!("  Fault:            {}", fault);
    }
    if d.alternate_attempted {
        println!(
            "  Alternate tried:  yes ({})",
            d.alternate_token.as_deref().unwrap_or("-")
        );
    }
    if let Some(advice) = advice(&report.outcome) {
        println!("{}", advice);
    }
}

pub fn print_dhcp_report(report: &DhcpReport) {
    println!(
        "{} DHCP {} on {}: {}",
        report.address,
        if report.enable { "enable" } else { "disable" },
        report.interface_token,
        report.outcome
    );
    println!("  DHCP now:      {}", tri(report.dhcp_now));
    println!("  Addresses:     {}", join(&report.addresses));
    println!("  Reboot needed: {}", tri(report.reboot_needed));
    if let Some(advice) = advice(&report.outcome) {
        println!("{}", advice);
    }
}

/// Next step for the operator, if any
pub fn advice(outcome: &ReconfigurationOutcome) -> Option<&'static str> {
    match outcome {
        ReconfigurationOutcome::Confirmed | ReconfigurationOutcome::Cancelled => None,
        ReconfigurationOutcome::ProtocolRejected(FailureReason::AuthenticationFailed) => {
            Some("Check the username and password.")
        }
        ReconfigurationOutcome::ProtocolRejected(_) => {
            Some("The camera refused the request; try its web interface instead.")
        }
        ReconfigurationOutcome::AppliedButUnverified(_) => {
            Some("The camera left its old address. Scan the network to find where it went.")
        }
        ReconfigurationOutcome::Unreachable(_) => {
            Some("Check that the camera is powered and on this network.")
        }
        ReconfigurationOutcome::Failed(FailureReason::ChangedWithoutReachability) => {
            Some("Power-cycle the camera to apply the new address.")
        }
        ReconfigurationOutcome::Failed(_) => {
            Some("This firmware did not apply the change; use the camera's web interface.")
        }
    }
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    if items.is_empty() {
        return "-".to_string();
    }
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn tri(value: Option<bool>) -> &'static str {
    match value {
        Some(true) => "yes",
        Some(false) => "no",
        None => "unknown",
    }
}
