//! UltraDNS SOAP faults
//!
//! Faults carry an `errorCode` and optionally an `errorDescription` inside
//! the `UltraWSException` detail. Most codes have a portable meaning; code 0
//! is generic and only means "not found" when the description says so.

use regex::Regex;
use std::sync::OnceLock;

use super::{xml, Portable};
use crate::error::{Error, ProviderError};
use crate::http::handlers::{HttpErrorHandler, MapHttp4xxCodesToErrors};
use crate::http::request::{HttpCommand, HttpResponse};

/// Codes meaning the target of the call is missing
const NOT_FOUND_CODES: &[i64] = &[2401, 1801, 2103, 2911, 2142, 3101, 4003, 2705];
/// Codes meaning the resource to create exists already
const ALREADY_EXISTS_CODES: &[i64] = &[1802, 2111, 2912];
/// Geolocation or source ip group overlaps an existing directional group
const DIRECTIONAL_GROUP_OVERLAP: i64 = 7021;

fn cannot_find() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Cannot find .*").expect("static regex"))
}

/// Parse the fault detail; `None` when the body is not an UltraDNS fault.
pub fn parse_fault(response: &HttpResponse) -> Option<ProviderError> {
    let body = response.payload_as_string();
    if !xml::looks_like_xml(&body) {
        return None;
    }
    let code = xml::element_text(&body, "errorCode").ok()??;
    let description = xml::element_text(&body, "errorDescription")
        .ok()
        .flatten()
        .filter(|d| !d.is_empty());

    let message = match &description {
        Some(d) => format!("Error {}: {}", code, d),
        None => format!("Error {}", code),
    };
    let mut error = ProviderError::new("ultradns-ws", code, message).with_status(response.status);
    if let Some(d) = description {
        error = error.with_description(d);
    }
    Some(error)
}

#[derive(Debug, Clone, Default)]
pub struct UltraDnsWsErrorHandler;

impl UltraDnsWsErrorHandler {
    fn refine(vendor: ProviderError) -> Error {
        let code: i64 = vendor.code.parse().unwrap_or(-1);
        let description = vendor.description.clone();

        let kind = match (code, description.as_deref()) {
            (0, Some(d)) if cannot_find().is_match(d) => Some(Portable::NotFound),
            (c, Some(_)) if NOT_FOUND_CODES.contains(&c) => Some(Portable::NotFound),
            (c, Some(_)) if ALREADY_EXISTS_CODES.contains(&c) => Some(Portable::AlreadyExists),
            (DIRECTIONAL_GROUP_OVERLAP, Some(d)) => {
                return Error::DirectionalGroupOverlap {
                    message: d.to_string(),
                    cause: Some(vendor),
                }
            }
            _ => None,
        };

        match (kind, description) {
            (Some(kind), Some(d)) => kind.error(d, Some(vendor)),
            _ => Error::Provider(vendor),
        }
    }
}

impl HttpErrorHandler for UltraDnsWsErrorHandler {
    fn handle_error(&self, command: &HttpCommand, response: &HttpResponse) -> Error {
        if matches!(response.status, 400 | 500) {
            if let Some(vendor) = parse_fault(response) {
                return Self::refine(vendor);
            }
        }
        MapHttp4xxCodesToErrors.handle_error(command, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Method;
    use crate::providers::test_support::{command, response};

    fn fault(code: &str, description: Option<&str>) -> String {
        let description = description
            .map(|d| format!("<errorDescription>{}</errorDescription>", d))
            .unwrap_or_default();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <soap:Fault>
      <faultcode>soap:Server</faultcode>
      <faultstring>Fault occurred while processing.</faultstring>
      <detail>
        <ns1:UltraWSException xmlns:ns1="http://webservice.api.ultra.neustar.com/v01/">
          <errorCode xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:type="xs:int">{}</errorCode>
          {}
        </ns1:UltraWSException>
      </detail>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#,
            code, description
        )
    }

    fn handle(body: &str) -> Error {
        let cmd = command(Method::Post, "https://ultra-api.ultradns.com:8443/UltraDNS_WS/v01");
        UltraDnsWsErrorHandler.handle_error(&cmd, &response(500, "Internal Server Error", body))
    }

    #[test]
    fn test_code_0_without_description_is_vendor_error() {
        let err = handle(&fault("0", None));
        assert_eq!(err.to_string(), "Error 0");
        match err {
            Error::Provider(vendor) => assert_eq!(vendor.code, "0"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_code_0_cannot_find_is_not_found() {
        let err = handle(&fault("0", Some("Cannot find task with guid AAAAAAAAAAAAAAAA")));
        assert!(matches!(err, Error::ResourceNotFound { .. }));
        assert_eq!(err.to_string(), "Cannot find task with guid AAAAAAAAAAAAAAAA");
        let vendor = err.provider_error().unwrap();
        assert_eq!(vendor.message, "Error 0: Cannot find task with guid AAAAAAAAAAAAAAAA");
        assert_eq!(
            vendor.description.as_deref(),
            Some("Cannot find task with guid AAAAAAAAAAAAAAAA")
        );
    }

    #[test]
    fn test_not_found_codes() {
        let err = handle(&fault("2401", Some("Account not found in the system. ID: AAAAAAAAAAAAAAAA")));
        assert!(matches!(err, Error::ResourceNotFound { .. }));
        assert_eq!(err.to_string(), "Account not found in the system. ID: AAAAAAAAAAAAAAAA");
        assert_eq!(
            err.provider_error().unwrap().message,
            "Error 2401: Account not found in the system. ID: AAAAAAAAAAAAAAAA"
        );

        for code in ["1801", "2103", "2911", "2142", "3101", "4003", "2705"] {
            assert!(matches!(
                handle(&fault(code, Some("missing"))),
                Error::ResourceNotFound { .. }
            ));
        }
    }

    #[test]
    fn test_already_exists_codes() {
        let err = handle(&fault("1802", Some("Zone already exists in the system.")));
        assert!(matches!(err, Error::ResourceAlreadyExists { .. }));
        assert_eq!(err.to_string(), "Zone already exists in the system.");
        for code in ["2111", "2912"] {
            assert!(matches!(
                handle(&fault(code, Some("exists"))),
                Error::ResourceAlreadyExists { .. }
            ));
        }
    }

    #[test]
    fn test_directional_group_overlap() {
        let err = handle(&fault("7021", Some("Geolocation/Source IP overlap(s) found")));
        assert!(matches!(err, Error::DirectionalGroupOverlap { .. }));
        assert_eq!(err.provider_error().unwrap().code, "7021");
    }

    #[test]
    fn test_non_fault_bodies_use_status_table() {
        let cmd = command(Method::Post, "https://ultra-api.ultradns.com:8443/UltraDNS_WS/v01");
        let err = UltraDnsWsErrorHandler.handle_error(&cmd, &response(401, "Unauthorized", ""));
        assert!(matches!(err, Error::AuthorizationFailed { .. }));
        let err = UltraDnsWsErrorHandler.handle_error(&cmd, &response(500, "Internal Server Error", "oops"));
        assert!(matches!(err, Error::HttpResponse { status: 500, .. }));
    }
}
