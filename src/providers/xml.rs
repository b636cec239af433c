//! Small pull-parser helpers for vendor error documents

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;

use crate::error::Result;

/// Attributes of the first element whose local name is `name`.
pub fn element_attributes(xml: &str, name: &str) -> Result<Option<BTreeMap<String, String>>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == name.as_bytes() => {
                let mut attrs = BTreeMap::new();
                for attr in e.attributes().flatten() {
                    let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                    let value = attr.decode_and_unescape_value(reader.decoder())?.into_owned();
                    attrs.insert(key, value);
                }
                return Ok(Some(attrs));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Text of the first element whose local name is `name`.
pub fn element_text(xml: &str, name: &str) -> Result<Option<String>> {
    // no trimming: entity references split the text into several events
    let mut reader = Reader::from_str(xml);

    let mut inside = false;
    let mut raw = String::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) if !inside && e.local_name().as_ref() == name.as_bytes() => inside = true,
            Event::Empty(e) if !inside && e.local_name().as_ref() == name.as_bytes() => {
                return Ok(Some(String::new()))
            }
            Event::Text(t) if inside => raw.push_str(&String::from_utf8_lossy(&t)),
            Event::CData(c) if inside => raw.push_str(&String::from_utf8_lossy(&c)),
            Event::GeneralRef(r) if inside => {
                raw.push('&');
                raw.push_str(&String::from_utf8_lossy(&r));
                raw.push(';');
            }
            Event::End(e) if inside && e.local_name().as_ref() == name.as_bytes() => {
                let text = quick_xml::escape::unescape(&raw)
                    .map(|c| c.into_owned())
                    .unwrap_or(raw);
                return Ok(Some(text.trim().to_string()));
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// True when the body looks like an XML document.
pub fn looks_like_xml(body: &str) -> bool {
    body.trim_start().starts_with('<')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes() {
        let xml = r#"<?xml version="1.0"?><Error xmlns="http://www.vmware.com/vcloud/v1" minorErrorCode="BUSY_ENTITY" message="entity is busy &amp; locked" majorErrorCode="400"/>"#;
        let attrs = element_attributes(xml, "Error").unwrap().unwrap();
        assert_eq!(attrs["minorErrorCode"], "BUSY_ENTITY");
        assert_eq!(attrs["message"], "entity is busy & locked");
        assert!(element_attributes(xml, "Task").unwrap().is_none());
    }

    #[test]
    fn test_text_with_namespaces() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><soap:Fault><detail><ns1:UltraWSException xmlns:ns1="http://webservice.api.ultra.neustar.com/v01/"><errorCode>2401</errorCode><errorDescription>Account &lt;x&gt; not found</errorDescription></ns1:UltraWSException></detail></soap:Fault></soap:Body></soap:Envelope>"#;
        assert_eq!(element_text(xml, "errorCode").unwrap().as_deref(), Some("2401"));
        assert_eq!(
            element_text(xml, "errorDescription").unwrap().as_deref(),
            Some("Account <x> not found")
        );
        assert!(element_text(xml, "faultstring").unwrap().is_none());
    }
}
