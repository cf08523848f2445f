//! Permissive response parsing
//!
//! Devices emit the same fields under inconsistent namespace prefixes and
//! sometimes send malformed XML. Everything here matches on lowercased local
//! names, stops quietly at the first XML error, and keeps whatever it had
//! collected up to that point. A few markers also get a plain substring check
//! so they survive documents the event reader gives up on.

use ipchanger_core::facts::push_unique;
use ipchanger_core::{DeviceIdentity, FailureReason, Fault, NetworkFacts};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::net::Ipv4Addr;
use tracing::debug;

use crate::transport::OnvifResponse;

const SET_RESPONSE_MARKER: &str = "setnetworkinterfacesresponse";
const REBOOT_MARKER: &str = "rebootneeded";

/// Classification of a mutating request's response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationVerdict {
    /// Both success markers present and no fault. The reboot flag is advisory.
    Accepted { reboot_needed: bool },
    /// HTTP 401
    AuthenticationFailed,
    /// Fault marker present, whatever else the body says
    Fault(Fault),
    /// Non-200 status without a fault marker
    HttpStatus(u16),
    /// HTTP 200 with neither success nor fault markers
    Ambiguous,
}

impl MutationVerdict {
    pub fn classify(response: &OnvifResponse) -> Self {
        if response.status == 401 {
            return Self::AuthenticationFailed;
        }
        if has_fault_marker(&response.body) {
            return Self::Fault(fault_details(&response.body));
        }
        if response.status != 200 {
            return Self::HttpStatus(response.status);
        }

        let lower = response.body.to_ascii_lowercase();
        if lower.contains(SET_RESPONSE_MARKER) && lower.contains(REBOOT_MARKER) {
            return Self::Accepted {
                reboot_needed: reboot_needed(&response.body, &lower),
            };
        }
        Self::Ambiguous
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Reason for anything but `Accepted`
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::Accepted { .. } => None,
            Self::AuthenticationFailed => Some(FailureReason::AuthenticationFailed),
            Self::Fault(fault) => Some(FailureReason::ProtocolFault(fault.clone())),
            Self::HttpStatus(code) => Some(FailureReason::HttpStatus(*code)),
            Self::Ambiguous => Some(FailureReason::AmbiguousResponse),
        }
    }
}

/// Weaker check used for the best-effort DHCP disable: HTTP 200 with the
/// response element present and no fault
pub fn acknowledges_set(response: &OnvifResponse) -> bool {
    response.is_ok()
        && !has_fault_marker(&response.body)
        && response.body.to_ascii_lowercase().contains(SET_RESPONSE_MARKER)
}

/// Whether the body carries any fault indicator.
///
/// A bare "fault" substring is not enough: it also matches "default".
pub fn has_fault_marker(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    if lower.contains("faultcode") || lower.contains("faultstring") || has_fault_tag(&lower) {
        return true;
    }
    Document::scan(body).has_element("fault")
}

/// `<fault` or `:fault` ending a tag name, so `FaultTolerance` does not count
fn has_fault_tag(lower: &str) -> bool {
    [":fault", "<fault"].into_iter().any(|marker| {
        lower.match_indices(marker).any(|(at, m)| {
            lower[at + m.len()..]
                .chars()
                .next()
                .is_some_and(|c| c == '>' || c == '/' || c.is_whitespace())
        })
    })
}

/// Fault code and reason from a SOAP 1.1 or SOAP 1.2 fault
pub fn fault_details(body: &str) -> Fault {
    let doc = Document::scan(body);

    let code = doc
        .first_text(|n| n.name() == "faultcode")
        .or_else(|| {
            // Deepest Code/Subcode value wins
            doc.texts
                .iter()
                .filter(|n| n.name() == "value" && n.within("code"))
                .max_by_key(|n| n.path.len())
                .map(|n| n.text.clone())
        });
    let reason = doc
        .first_text(|n| n.name() == "faultstring")
        .or_else(|| doc.first_text(|n| n.name() == "text" && n.within("reason")));

    Fault { code, reason }
}

/// Identity fields from a GetDeviceInformation response
pub fn device_identity(body: &str) -> DeviceIdentity {
    let doc = Document::scan(body);
    let field = |name: &str| doc.first_text(|n| n.name() == name);
    DeviceIdentity {
        manufacturer: field("manufacturer"),
        model: field("model"),
        firmware_version: field("firmwareversion"),
        serial_number: field("serialnumber"),
        hardware_id: field("hardwareid"),
    }
}

/// Interface tokens from a GetNetworkInterfaces response: `token` element
/// text and `token="..."` attributes, de-duplicated in document order
pub fn interface_tokens(body: &str) -> Vec<String> {
    let doc = Document::scan(body);
    let mut tokens = Vec::new();
    for node in doc.texts.iter().filter(|n| n.name() == "token") {
        push_unique(&mut tokens, &node.text);
    }
    for attr in doc.attributes.iter().filter(|a| a.name == "token") {
        push_unique(&mut tokens, &attr.value);
    }
    tokens
}

/// Network configuration facts from a GetNetworkInterfaces response
pub fn network_facts(body: &str) -> NetworkFacts {
    let doc = Document::scan(body);
    let mut facts = NetworkFacts {
        raw: body.to_string(),
        ..Default::default()
    };

    for node in &doc.texts {
        match node.name() {
            "address" => {
                if let Ok(addr) = node.text.parse::<Ipv4Addr>() {
                    if !facts.addresses.contains(&addr) {
                        facts.addresses.push(addr);
                    }
                }
            }
            "prefixlength" => {
                if let Ok(prefix) = node.text.parse::<u8>() {
                    facts.prefix_lengths.push(prefix);
                }
            }
            "dhcp" => {
                if node.text.eq_ignore_ascii_case("true") {
                    facts.dhcp_enabled = true;
                }
            }
            "hwaddress" => {
                if facts.hw_address.is_none() {
                    facts.hw_address = Some(node.text.clone());
                }
            }
            "name" => push_unique(&mut facts.interface_names, &node.text),
            name if name.contains("token") => push_unique(&mut facts.interface_tokens, &node.text),
            _ => {}
        }
    }
    for attr in doc.attributes.iter().filter(|a| a.name == "token") {
        push_unique(&mut facts.interface_tokens, &attr.value);
    }

    let lower = body.to_ascii_lowercase();
    if lower.contains("dhcp>true") || lower.contains("dhcp=\"true\"") {
        facts.dhcp_enabled = true;
    }

    debug!(
        addresses = ?facts.addresses,
        tokens = ?facts.interface_tokens,
        names = ?facts.interface_names,
        dhcp = facts.dhcp_enabled,
        "Parsed network facts"
    );
    facts
}

fn reboot_needed(body: &str, lower: &str) -> bool {
    if lower.contains("rebootneeded>false") || lower.contains("rebootneeded=\"false\"") {
        return false;
    }
    Document::scan(body)
        .first_text(|n| n.name() == REBOOT_MARKER)
        .map_or(true, |v| !v.eq_ignore_ascii_case("false"))
}

/// Text content with the lowercased local names of its enclosing elements
#[derive(Debug)]
struct TextNode {
    path: Vec<String>,
    text: String,
}

impl TextNode {
    fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    fn within(&self, ancestor: &str) -> bool {
        self.path.iter().rev().skip(1).any(|p| p == ancestor)
    }
}

#[derive(Debug)]
struct AttrNode {
    name: String,
    value: String,
}

/// Flattened view of whatever part of the document parsed cleanly
#[derive(Debug, Default)]
struct Document {
    elements: Vec<String>,
    texts: Vec<TextNode>,
    attributes: Vec<AttrNode>,
}

impl Document {
    fn scan(body: &str) -> Self {
        let mut reader = Reader::from_str(body);
        reader.config_mut().trim_text(true);
        reader.config_mut().check_end_names = false;

        let mut doc = Self::default();
        let mut stack: Vec<String> = Vec::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = doc.open(&e);
                    stack.push(name);
                }
                Ok(Event::Empty(e)) => {
                    doc.open(&e);
                }
                Ok(Event::End(_)) => {
                    stack.pop();
                }
                Ok(Event::Text(t)) => {
                    let text = match t.unescape() {
                        Ok(text) => text.trim().to_string(),
                        Err(_) => String::from_utf8_lossy(&t).trim().to_string(),
                    };
                    if !text.is_empty() && !stack.is_empty() {
                        doc.texts.push(TextNode {
                            path: stack.clone(),
                            text,
                        });
                    }
                }
                Ok(Event::CData(c)) => {
                    let text = String::from_utf8_lossy(&c).trim().to_string();
                    if !text.is_empty() && !stack.is_empty() {
                        doc.texts.push(TextNode {
                            path: stack.clone(),
                            text,
                        });
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    debug!(
                        position = reader.error_position(),
                        error = %e,
                        "Stopped scanning malformed response"
                    );
                    break;
                }
                Ok(_) => {}
            }
        }
        doc
    }

    /// Record an element and its attributes, returning its local name
    fn open(&mut self, element: &BytesStart<'_>) -> String {
        let name = lower_local(element.local_name().as_ref());
        for attr in element.attributes().flatten() {
            let value = match attr.unescape_value() {
                Ok(value) => value.trim().to_string(),
                Err(_) => String::from_utf8_lossy(&attr.value).trim().to_string(),
            };
            self.attributes.push(AttrNode {
                name: lower_local(attr.key.local_name().as_ref()),
                value,
            });
        }
        self.elements.push(name.clone());
        name
    }

    fn has_element(&self, name: &str) -> bool {
        self.elements.iter().any(|e| e == name)
    }

    fn first_text(&self, pred: impl Fn(&TextNode) -> bool) -> Option<String> {
        self.texts.iter().find(|n| pred(n)).map(|n| n.text.clone())
    }
}

fn lower_local(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE_INFO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://www.w3.org/2003/05/soap-envelope" xmlns:tds="http://www.onvif.org/ver10/device/wsdl">
  <SOAP-ENV:Body>
    <tds:GetDeviceInformationResponse>
      <tds:Manufacturer>Skilleye</tds:Manufacturer>
      <tds:Model>SE-IPC-200</tds:Model>
      <tds:FirmwareVersion>V5.5.0 build 210315</tds:FirmwareVersion>
      <tds:SerialNumber>SN123456</tds:SerialNumber>
      <tds:HardwareId>HW-01</tds:HardwareId>
    </tds:GetDeviceInformationResponse>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#;

    const NETWORK_INTERFACES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<env:Envelope xmlns:env="http://www.w3.org/2003/05/soap-envelope" xmlns:tds="http://www.onvif.org/ver10/device/wsdl" xmlns:tt="http://www.onvif.org/ver10/schema">
  <env:Body>
    <tds:GetNetworkInterfacesResponse>
      <tds:NetworkInterfaces token="eth0">
        <tt:Enabled>true</tt:Enabled>
        <tt:Info>
          <tt:Name>eth0</tt:Name>
          <tt:HwAddress>00:12:34:56:78:9a</tt:HwAddress>
          <tt:MTU>1500</tt:MTU>
        </tt:Info>
        <tt:IPv4>
          <tt:Enabled>true</tt:Enabled>
          <tt:Config>
            <tt:Manual>
              <tt:Address>10.0.0.5</tt:Address>
              <tt:PrefixLength>24</tt:PrefixLength>
            </tt:Manual>
            <tt:DHCP>true</tt:DHCP>
          </tt:Config>
        </tt:IPv4>
      </tds:NetworkInterfaces>
    </tds:GetNetworkInterfacesResponse>
  </env:Body>
</env:Envelope>"#;

    fn response(status: u16, body: &str) -> OnvifResponse {
        OnvifResponse::new(status, body)
    }

    #[test]
    fn test_device_identity() {
        let identity = device_identity(DEVICE_INFO);
        assert_eq!(identity.manufacturer.as_deref(), Some("Skilleye"));
        assert_eq!(identity.model.as_deref(), Some("SE-IPC-200"));
        assert_eq!(identity.firmware_version.as_deref(), Some("V5.5.0 build 210315"));
        assert_eq!(identity.serial_number.as_deref(), Some("SN123456"));
        assert_eq!(identity.hardware_id.as_deref(), Some("HW-01"));
    }

    #[test]
    fn test_identity_ignores_prefix_and_case() {
        let body = "<a:envelope><b:body><MANUFACTURER>Acme</MANUFACTURER><x:model>Cam</x:model></b:body></a:envelope>";
        let identity = device_identity(body);
        assert_eq!(identity.manufacturer.as_deref(), Some("Acme"));
        assert_eq!(identity.model.as_deref(), Some("Cam"));
        assert!(identity.serial_number.is_none());
    }

    #[test]
    fn test_network_facts() {
        let facts = network_facts(NETWORK_INTERFACES);
        assert_eq!(facts.addresses, vec![Ipv4Addr::new(10, 0, 0, 5)]);
        assert_eq!(facts.interface_tokens, vec!["eth0"]);
        assert_eq!(facts.interface_names, vec!["eth0"]);
        assert!(facts.dhcp_enabled);
        assert_eq!(facts.prefix_lengths, vec![24]);
        assert_eq!(facts.hw_address.as_deref(), Some("00:12:34:56:78:9a"));
        assert!(facts.reports_address(Ipv4Addr::new(10, 0, 0, 5)));
    }

    #[test]
    fn test_interface_tokens_from_elements_and_attributes() {
        let body = r#"<r><tt:token>NetworkInterfaceToken_1</tt:token><tds:NetworkInterfaces token="eth0"/><tds:NetworkInterfaces token="NetworkInterfaceToken_1"/></r>"#;
        assert_eq!(
            interface_tokens(body),
            vec!["NetworkInterfaceToken_1", "eth0"]
        );
        assert!(interface_tokens("<r/>").is_empty());
    }

    #[test]
    fn test_malformed_document_keeps_collected_fields() {
        let body = "<r><tt:Address>10.0.0.5</tt:Address><tt:Name>eth0</tt:Name><broken <<<";
        let facts = network_facts(body);
        assert_eq!(facts.addresses, vec![Ipv4Addr::new(10, 0, 0, 5)]);
        assert_eq!(facts.interface_names, vec!["eth0"]);
    }

    #[test]
    fn test_dhcp_substring_fallback() {
        let facts = network_facts(r#"<<garbage IPv4 DHCP="true">"#);
        assert!(facts.dhcp_enabled);
        assert!(!network_facts(NETWORK_INTERFACES.replace("<tt:DHCP>true", "<tt:DHCP>false").as_str()).dhcp_enabled);
    }

    #[test]
    fn test_accepted_with_reboot_flag() {
        let body = r#"<s:Envelope><s:Body><tds:SetNetworkInterfacesResponse><tds:RebootNeeded>false</tds:RebootNeeded></tds:SetNetworkInterfacesResponse></s:Body></s:Envelope>"#;
        assert_eq!(
            MutationVerdict::classify(&response(200, body)),
            MutationVerdict::Accepted {
                reboot_needed: false
            }
        );
        let body = body.replace(">false<", ">true<");
        assert_eq!(
            MutationVerdict::classify(&response(200, &body)),
            MutationVerdict::Accepted {
                reboot_needed: true
            }
        );
    }

    #[test]
    fn test_missing_reboot_flag_is_ambiguous() {
        let body = "<s:Envelope><s:Body><tds:SetNetworkInterfacesResponse/></s:Body></s:Envelope>";
        assert_eq!(
            MutationVerdict::classify(&response(200, body)),
            MutationVerdict::Ambiguous
        );
        assert!(acknowledges_set(&response(200, body)));
    }

    #[test]
    fn test_fault_overrides_success_markers() {
        let body = r#"<s:Envelope><s:Body>
            <tds:SetNetworkInterfacesResponse><tds:RebootNeeded>true</tds:RebootNeeded></tds:SetNetworkInterfacesResponse>
            <s:Fault><s:Code><s:Value>s:Sender</s:Value><s:Subcode><s:Value>ter:InvalidArgVal</s:Value></s:Subcode></s:Code>
            <s:Reason><s:Text xml:lang="en">Invalid interface token</s:Text></s:Reason></s:Fault>
            </s:Body></s:Envelope>"#;
        let verdict = MutationVerdict::classify(&response(200, body));
        assert_eq!(
            verdict,
            MutationVerdict::Fault(Fault {
                code: Some("ter:InvalidArgVal".into()),
                reason: Some("Invalid interface token".into()),
            })
        );
        assert!(!verdict.is_accepted());
        assert!(!acknowledges_set(&response(200, body)));
    }

    #[test]
    fn test_soap11_fault_details() {
        let body = "<SOAP-ENV:Fault><faultcode>SOAP-ENV:Client</faultcode><faultstring>Not Authorized</faultstring></SOAP-ENV:Fault>";
        let fault = fault_details(body);
        assert_eq!(fault.code.as_deref(), Some("SOAP-ENV:Client"));
        assert_eq!(fault.reason.as_deref(), Some("Not Authorized"));
        assert!(matches!(
            MutationVerdict::classify(&response(500, body)),
            MutationVerdict::Fault(_)
        ));
    }

    #[test]
    fn test_default_is_not_a_fault() {
        assert!(!has_fault_marker("<tt:Default>true</tt:Default><tt:DefaultGateway/>"));
    }

    #[test]
    fn test_fault_prefixed_names_are_not_faults() {
        let body = "<tds:SetNetworkInterfacesResponse><tds:RebootNeeded>false</tds:RebootNeeded><tt:FaultTolerance>on</tt:FaultTolerance><FaultLog/></tds:SetNetworkInterfacesResponse>";
        assert!(!has_fault_marker(body));
        assert_eq!(
            MutationVerdict::classify(&response(200, body)),
            MutationVerdict::Accepted {
                reboot_needed: false
            }
        );
        assert!(has_fault_marker("<env:Fault xmlns:env=\"x\">"));
        assert!(has_fault_marker("<Fault/>"));
        assert!(has_fault_marker("</soap:Fault>"));
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            MutationVerdict::classify(&response(401, "<html>Unauthorized</html>")),
            MutationVerdict::AuthenticationFailed
        );
        assert_eq!(
            MutationVerdict::classify(&response(404, "not found")),
            MutationVerdict::HttpStatus(404)
        );
        assert_eq!(
            MutationVerdict::classify(&response(200, "<ok/>")),
            MutationVerdict::Ambiguous
        );
        assert_eq!(
            MutationVerdict::HttpStatus(404).failure_reason(),
            Some(FailureReason::HttpStatus(404))
        );
    }
}
