//! WS-Discovery probe construction and ProbeMatch parsing
//!
//! The discovery channel is shared with unrelated multicast traffic, so
//! parsing is deliberately forgiving: a datagram that does not look like a
//! ProbeMatch for our probe yields `None` and is treated as noise.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default device type probed for, per the ONVIF device discovery profile
pub const DEFAULT_PROBE_TYPES: &str = "dn:NetworkVideoTransmitter";

const SOAP_ENV_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
const WSA_NS: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";
const WSD_NS: &str = "http://schemas.xmlsoap.org/ws/2005/04/discovery";
const ONVIF_NETWORK_NS: &str = "http://www.onvif.org/ver10/network/wsdl";
const WSD_TO: &str = "urn:schemas-xmlsoap-org:ws:2005:04:discovery";
const WSD_PROBE_ACTION: &str = "http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe";

/// A device discovered through a WS-Discovery ProbeMatch response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Stable endpoint reference address, unique per device
    pub endpoint_reference: String,
    /// Service addresses (XAddrs) the device accepts SOAP requests on
    pub xaddrs: Vec<String>,
    /// Declared device types (e.g. `dn:NetworkVideoTransmitter`)
    pub types: Vec<String>,
    /// Free-form scope URIs (name, location, hardware, profile, ...)
    pub scopes: Vec<String>,
    /// Metadata version announced by the device
    pub metadata_version: u32,
}

impl DiscoveredDevice {
    /// Extract the URL-decoded value of the first scope with the given prefix.
    ///
    /// ONVIF scopes encode metadata as URIs such as
    /// `onvif://www.onvif.org/name/IPC-Front%20Door`.
    pub fn scope_value(&self, prefix: &str) -> Option<String> {
        self.scopes.iter().find_map(|scope| {
            scope
                .strip_prefix(prefix)
                .map(|raw| urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |v| v.into_owned()))
        })
    }

    /// Device name advertised in the scopes, if any
    pub fn name(&self) -> Option<String> {
        self.scope_value("onvif://www.onvif.org/name/")
    }

    /// Hardware model advertised in the scopes, if any
    pub fn hardware(&self) -> Option<String> {
        self.scope_value("onvif://www.onvif.org/hardware/")
    }

    /// Location advertised in the scopes, if any
    pub fn location(&self) -> Option<String> {
        self.scope_value("onvif://www.onvif.org/location/")
    }
}

/// Build a WS-Discovery probe envelope for the given message ID and types
pub fn build_probe(message_id: &Uuid, types: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<e:Envelope xmlns:e="{env}" xmlns:w="{wsa}" xmlns:d="{wsd}" xmlns:dn="{dn}">
 <e:Header>
  <w:MessageID>uuid:{id}</w:MessageID>
  <w:To e:mustUnderstand="true">{to}</w:To>
  <w:Action e:mustUnderstand="true">{action}</w:Action>
 </e:Header>
 <e:Body>
  <d:Probe>
   <d:Types>{types}</d:Types>
  </d:Probe>
 </e:Body>
</e:Envelope>"#,
        env = SOAP_ENV_NS,
        wsa = WSA_NS,
        wsd = WSD_NS,
        dn = ONVIF_NETWORK_NS,
        id = message_id,
        to = WSD_TO,
        action = WSD_PROBE_ACTION,
        types = types,
    )
}

/// Parse one datagram as a ProbeMatch response to the probe with `message_id`.
///
/// Returns `None` for anything that is not a well-formed match: other
/// discovery traffic, Hello/Bye announcements, responses to someone else's
/// probe, or responses without an endpoint reference address.
pub fn parse_probe_match(datagram: &[u8], message_id: &Uuid) -> Option<DiscoveredDevice> {
    let xml = std::str::from_utf8(datagram).ok()?;

    let matches = extract_element(xml, "ProbeMatch")?;

    // RelatesTo, when present, must point back at our probe.
    if let Some(relates_to) = extract_element(xml, "RelatesTo") {
        if !relates_to.contains(&message_id.to_string()) {
            return None;
        }
    }

    let endpoint_reference = extract_element(&matches, "Address")?.trim().to_string();
    if endpoint_reference.is_empty() {
        return None;
    }

    let metadata_version = extract_element(&matches, "MetadataVersion")
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0);

    Some(DiscoveredDevice {
        endpoint_reference,
        xaddrs: split_list(extract_element(&matches, "XAddrs").as_deref()),
        types: split_list(extract_element(&matches, "Types").as_deref()),
        scopes: split_list(extract_element(&matches, "Scopes").as_deref()),
        metadata_version,
    })
}

/// Split a space-separated XML list value into its items
fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Extract the text content of the first element with the given local name,
/// ignoring any namespace prefix. Nested markup inside the element is
/// returned verbatim.
pub(crate) fn extract_element(xml: &str, name: &str) -> Option<String> {
    let mut search = 0;
    while let Some(rel) = xml[search..].find('<') {
        let open = search + rel;
        let rest = &xml[open + 1..];
        search = open + 1;
        if rest.starts_with('/') || rest.starts_with('?') || rest.starts_with('!') {
            continue;
        }
        let tag_end = match rest.find(|c: char| c == '>' || c.is_whitespace()) {
            Some(i) => i,
            None => return None,
        };
        let tag_name = rest[..tag_end].trim_end_matches('/');
        let local = tag_name.rsplit(':').next().unwrap_or(tag_name);
        if local != name {
            continue;
        }
        let close = rest.find('>')?;
        if rest[..close].ends_with('/') {
            // Self-closing element: empty content
            return Some(String::new());
        }
        let content = &rest[close + 1..];
        return find_closing(content, name).map(|end| content[..end].trim().to_string());
    }
    None
}

/// Find the byte offset of the closing tag `</prefix:name>` within `content`
fn find_closing(content: &str, name: &str) -> Option<usize> {
    let mut idx = 0;
    while let Some(rel) = content[idx..].find("</") {
        let start = idx + rel;
        let rest = &content[start + 2..];
        idx = start + 2;
        let end = rest.find('>')?;
        let tag = rest[..end].trim();
        let local = tag.rsplit(':').next().unwrap_or(tag);
        if local == name {
            return Some(start);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_match(message_id: &Uuid, epr: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://www.w3.org/2003/05/soap-envelope"
  xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/08/addressing"
  xmlns:d="http://schemas.xmlsoap.org/ws/2005/04/discovery">
 <SOAP-ENV:Header>
  <wsa:MessageID>uuid:3cf9smp9-eprr</wsa:MessageID>
  <wsa:RelatesTo>uuid:{message_id}</wsa:RelatesTo>
  <wsa:Action>http://schemas.xmlsoap.org/ws/2005/04/discovery/ProbeMatches</wsa:Action>
 </SOAP-ENV:Header>
 <SOAP-ENV:Body>
  <d:ProbeMatches>
   <d:ProbeMatch>
    <wsa:EndpointReference><wsa:Address>{epr}</wsa:Address></wsa:EndpointReference>
    <d:Types>dn:NetworkVideoTransmitter tds:Device</d:Types>
    <d:Scopes>onvif://www.onvif.org/name/Front%20Door onvif://www.onvif.org/location/lobby</d:Scopes>
    <d:XAddrs>http://192.168.1.20/onvif/device_service http://[fe80::1]/onvif/device_service</d:XAddrs>
    <d:MetadataVersion>7</d:MetadataVersion>
   </d:ProbeMatch>
  </d:ProbeMatches>
 </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#,
        )
    }

    #[test]
    fn test_parse_probe_match() {
        let id = Uuid::new_v4();
        let xml = sample_match(&id, "urn:uuid:1419d68a-1dd2-11b2-a105-000000000000");
        let device = parse_probe_match(xml.as_bytes(), &id).expect("should parse");

        assert_eq!(
            device.endpoint_reference,
            "urn:uuid:1419d68a-1dd2-11b2-a105-000000000000"
        );
        assert_eq!(device.types.len(), 2);
        assert_eq!(device.xaddrs.len(), 2);
        assert_eq!(device.metadata_version, 7);
        assert_eq!(device.name().as_deref(), Some("Front Door"));
        assert_eq!(device.location().as_deref(), Some("lobby"));
        assert_eq!(device.hardware(), None);
    }

    #[test]
    fn test_foreign_relates_to_is_skipped() {
        let ours = Uuid::new_v4();
        let theirs = Uuid::new_v4();
        let xml = sample_match(&theirs, "urn:uuid:abc");
        assert!(parse_probe_match(xml.as_bytes(), &ours).is_none());
    }

    #[test]
    fn test_noise_is_skipped() {
        let id = Uuid::new_v4();
        assert!(parse_probe_match(b"not xml at all", &id).is_none());
        assert!(parse_probe_match(&[0xff, 0xfe, 0x00], &id).is_none());
        // A Hello announcement has no ProbeMatch element
        let hello = r#"<e:Envelope><e:Body><d:Hello><wsa:Address>urn:x</wsa:Address></d:Hello></e:Body></e:Envelope>"#;
        assert!(parse_probe_match(hello.as_bytes(), &id).is_none());
    }

    #[test]
    fn test_missing_endpoint_reference_is_skipped() {
        let id = Uuid::new_v4();
        let xml = r#"<e:Envelope><e:Body><d:ProbeMatches><d:ProbeMatch>
            <d:Types>dn:NetworkVideoTransmitter</d:Types>
            </d:ProbeMatch></d:ProbeMatches></e:Body></e:Envelope>"#;
        assert!(parse_probe_match(xml.as_bytes(), &id).is_none());
    }

    #[test]
    fn test_build_probe_contains_addressing_headers() {
        let id = Uuid::new_v4();
        let probe = build_probe(&id, DEFAULT_PROBE_TYPES);
        assert!(probe.contains(&format!("uuid:{id}")));
        assert!(probe.contains("urn:schemas-xmlsoap-org:ws:2005:04:discovery"));
        assert!(probe.contains("discovery/Probe"));
        assert!(probe.contains("dn:NetworkVideoTransmitter"));
    }

    #[test]
    fn test_device_round_trips_through_serde() {
        let id = Uuid::new_v4();
        let xml = sample_match(&id, "urn:uuid:serde-check");
        let device = parse_probe_match(xml.as_bytes(), &id).unwrap();

        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["endpoint_reference"], "urn:uuid:serde-check");
        assert_eq!(json["metadata_version"], 7);

        let back: DiscoveredDevice = serde_json::from_value(json).unwrap();
        assert_eq!(back, device);
    }

    #[test]
    fn test_extract_element_prefix_agnostic() {
        assert_eq!(
            extract_element("<a:Foo>bar</a:Foo>", "Foo").as_deref(),
            Some("bar")
        );
        assert_eq!(extract_element("<Foo>bar</Foo>", "Foo").as_deref(), Some("bar"));
        assert_eq!(extract_element("<Foo/>", "Foo").as_deref(), Some(""));
        assert_eq!(extract_element("<Foobar>x</Foobar>", "Foo"), None);
        assert_eq!(extract_element("<Foo>never closed", "Foo"), None);
    }
}
