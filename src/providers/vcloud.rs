//! vCloud: `<Error message minorErrorCode majorErrorCode/>`

use regex::Regex;
use std::sync::OnceLock;

use super::{message_or_default, unmapped, xml, Portable};
use crate::error::{Error, ProviderError};
use crate::http::handlers::HttpErrorHandler;
use crate::http::request::{HttpCommand, HttpResponse};

fn busy() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s).*is busy.*").expect("static regex"))
}

fn does_not_exist() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s).*does not exist.*").expect("static regex"))
}

/// Parse the vCloud `Error` element out of a response body.
pub fn parse_vcloud_error(response: &HttpResponse) -> Option<ProviderError> {
    let body = response.payload_as_string();
    if !xml::looks_like_xml(&body) {
        return None;
    }
    let attrs = xml::element_attributes(&body, "Error").ok()??;
    let message = attrs.get("message").cloned().unwrap_or_default();
    let code = attrs.get("minorErrorCode").cloned().unwrap_or_default();
    let mut error = ProviderError::new("vcloud", code, message).with_status(response.status);
    if let Some(major) = attrs.get("majorErrorCode") {
        error = error.with_description(format!("majorErrorCode {}", major));
    }
    Some(error)
}

#[derive(Debug, Clone, Default)]
pub struct VCloudErrorHandler;

impl HttpErrorHandler for VCloudErrorHandler {
    fn handle_error(&self, command: &HttpCommand, response: &HttpResponse) -> Error {
        let vendor = parse_vcloud_error(response);
        let message = message_or_default(command, response, vendor.as_ref());
        let minor = vendor.as_ref().map(|v| v.code.as_str()).unwrap_or("");

        let kind = match response.status {
            401 | 403 => Some(Portable::Authorization),
            404 => Some(Portable::NotFound),
            400 if minor == "BUSY_ENTITY" || busy().is_match(&message) => Some(Portable::IllegalState),
            _ => match minor {
                "ACCESS_TO_RESOURCE_IS_FORBIDDEN" => Some(Portable::Authorization),
                "RESOURCE_NOT_FOUND" => Some(Portable::NotFound),
                "DUPLICATE_NAME" => Some(Portable::IllegalState),
                _ if vendor.is_some() && does_not_exist().is_match(&message) => Some(Portable::NotFound),
                _ => None,
            },
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

    fn error_xml(minor: &str, message: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><Error xmlns="http://www.vmware.com/vcloud/v1" minorErrorCode="{}" message="{}" majorErrorCode="400"/>"#,
            minor, message
        )
    }

    fn handle(status: u16, body: &str) -> Error {
        let cmd = command(Method::Post, "https://vcloud.example.com/api/vApp/vapp-1/power/action/powerOn");
        VCloudErrorHandler.handle_error(&cmd, &response(status, "x", body))
    }

    #[test]
    fn test_busy_entity_is_illegal_state() {
        let err = handle(400, &error_xml("BUSY_ENTITY", "The entity vapp-1 is busy completing an operation."));
        assert!(matches!(err, Error::IllegalState { .. }));
        assert_eq!(err.to_string(), "The entity vapp-1 is busy completing an operation.");
        assert_eq!(err.provider_error().unwrap().code, "BUSY_ENTITY");

        let err = handle(400, &error_xml("", "vApp is busy"));
        assert!(matches!(err, Error::IllegalState { .. }));
    }

    #[test]
    fn test_minor_code_table() {
        assert!(matches!(
            handle(400, &error_xml("ACCESS_TO_RESOURCE_IS_FORBIDDEN", "no")),
            Error::AuthorizationFailed { .. }
        ));
        assert!(matches!(
            handle(400, &error_xml("RESOURCE_NOT_FOUND", "gone")),
            Error::ResourceNotFound { .. }
        ));
        assert!(matches!(
            handle(500, &error_xml("", "vApp template vappTemplate-9 does not exist")),
            Error::ResourceNotFound { .. }
        ));
        assert!(matches!(
            handle(400, &error_xml("DUPLICATE_NAME", "name in use")),
            Error::IllegalState { .. }
        ));
    }

    #[test]
    fn test_status_table_and_unmapped() {
        assert!(matches!(handle(401, ""), Error::AuthorizationFailed { .. }));
        assert!(matches!(handle(404, ""), Error::ResourceNotFound { .. }));
        assert!(matches!(
            handle(500, &error_xml("INTERNAL_SERVER_ERROR", "boom")),
            Error::Provider(ProviderError { ref code, .. }) if code == "INTERNAL_SERVER_ERROR"
        ));
        assert!(matches!(handle(500, "oops"), Error::HttpResponse { status: 500, .. }));
    }
}
