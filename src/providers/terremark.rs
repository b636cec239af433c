//! Terremark vCloud: XML `<Error message=.../>` or a plain text body

use regex::Regex;
use std::sync::OnceLock;

use super::{unmapped, xml, Portable};
use crate::error::{Error, ProviderError};
use crate::http::handlers::{http_response_error, HttpErrorHandler};
use crate::http::request::{HttpCommand, HttpResponse};

fn not_found() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s).*(not found|no longer exists).*").expect("static regex"))
}

fn no_ip_addresses() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s).*No IP addresses.*").expect("static regex"))
}

fn in_use() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s).*(already in use|is in use).*").expect("static regex"))
}

/// Message from the `Error` element, or the body text itself.
fn parse_message(response: &HttpResponse) -> Option<String> {
    let body = response.payload_as_string();
    if body.trim().is_empty() {
        return None;
    }
    if xml::looks_like_xml(&body) {
        if let Ok(Some(attrs)) = xml::element_attributes(&body, "Error") {
            return attrs.get("message").cloned();
        }
    }
    Some(body.trim().to_string())
}

#[derive(Debug, Clone, Default)]
pub struct TerremarkErrorHandler;

impl HttpErrorHandler for TerremarkErrorHandler {
    fn handle_error(&self, command: &HttpCommand, response: &HttpResponse) -> Error {
        let text = parse_message(response);
        let vendor = text.as_ref().map(|m| {
            ProviderError::new("trmk-vcloud", response.status.to_string(), m.clone())
                .with_status(response.status)
        });
        let message = text
            .clone()
            .unwrap_or_else(|| http_response_error(command, response).to_string());

        let kind = match response.status {
            401 => Some(Portable::Authorization),
            403 | 404 => Some(Portable::NotFound),
            400 | 409 => Some(if not_found().is_match(&message) {
                Portable::NotFound
            } else if no_ip_addresses().is_match(&message) {
                Portable::Insufficient
            } else if in_use().is_match(&message) || response.status == 409 {
                Portable::IllegalState
            } else {
                Portable::IllegalArgument
            }),
            500 if message.contains("Status: 500 Internal Server Error") && in_use().is_match(&message) => {
                Some(Portable::IllegalState)
            }
            _ => None,
        };

        match kind {
            Some(kind) => kind.error(message, vendor),
            None => unmapped(command, response, vendor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Method;
    use crate::providers::test_support::{command, response};

    fn handle(status: u16, body: &str) -> Error {
        let cmd = command(Method::Post, "https://services.vcloudexpress.terremark.com/api/v0.8/vdc/32/action/instantiateVAppTemplate");
        TerremarkErrorHandler.handle_error(&cmd, &response(status, "x", body))
    }

    #[test]
    fn test_plain_text_bodies() {
        let err = handle(400, "Server 1234 not found");
        assert!(matches!(err, Error::ResourceNotFound { .. }));
        assert_eq!(err.to_string(), "Server 1234 not found");

        assert!(matches!(
            handle(409, "No IP addresses available in network"),
            Error::InsufficientResources { .. }
        ));
        assert!(matches!(
            handle(400, "The name web-1 is already in use"),
            Error::IllegalState { .. }
        ));
        assert!(matches!(handle(400, "bad template"), Error::IllegalArgument { .. }));
        assert!(matches!(handle(409, "conflict"), Error::IllegalState { .. }));
    }

    #[test]
    fn test_xml_body() {
        let err = handle(
            400,
            r#"<Error message="Internet service 21 not found" xmlns="urn:tmrk:vCloudExpress-1.0"/>"#,
        );
        assert!(matches!(err, Error::ResourceNotFound { .. }));
        assert_eq!(err.to_string(), "Internet service 21 not found");
    }

    #[test]
    fn test_status_table() {
        assert!(matches!(handle(401, ""), Error::AuthorizationFailed { .. }));
        assert!(matches!(handle(403, ""), Error::ResourceNotFound { .. }));
        assert!(matches!(
            handle(500, "Status: 500 Internal Server Error\nIP 10.0.0.1 is in use by a node"),
            Error::IllegalState { .. }
        ));
        assert!(matches!(handle(500, "Status: 500 Internal Server Error"), Error::Provider(_)));
        assert!(matches!(handle(503, ""), Error::HttpResponse { status: 503, .. }));
    }
}
