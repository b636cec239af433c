//! AWS query APIs (`<Response><Errors><Error><Code>`) and S3 (`<Error><Code>`)

use super::{message_or_default, unmapped, xml, Portable};
use crate::error::{Error, ProviderError};
use crate::http::handlers::HttpErrorHandler;
use crate::http::request::{HttpCommand, HttpResponse, Method};

/// Code and message of the first `Error` in the body.
pub fn parse_aws_error(response: &HttpResponse) -> Option<ProviderError> {
    let body = response.payload_as_string();
    if !xml::looks_like_xml(&body) {
        return None;
    }
    let code = xml::element_text(&body, "Code").ok()??;
    let message = xml::element_text(&body, "Message")
        .ok()
        .flatten()
        .unwrap_or_else(|| code.clone());
    let mut error = ProviderError::new("aws", code, message).with_status(response.status);
    if let Ok(Some(request_id)) = xml::element_text(&body, "RequestId") {
        error = error.with_description(format!("RequestId {}", request_id));
    }
    Some(error)
}

fn classify(code: &str) -> Option<Portable> {
    match code {
        "AuthFailure" | "SignatureDoesNotMatch" | "InvalidAccessKeyId" | "AccessDenied" => {
            Some(Portable::Authorization)
        }
        "NoSuchBucket" | "NoSuchKey" => Some(Portable::NotFound),
        "BucketAlreadyOwnedByYou" | "BucketAlreadyExists" => Some(Portable::AlreadyExists),
        "IncorrectState" | "BucketNotEmpty" => Some(Portable::IllegalState),
        "InsufficientInstanceCapacity" | "InstanceLimitExceeded" => Some(Portable::Insufficient),
        c if c.ends_with(".NotFound") => Some(Portable::NotFound),
        c if c.ends_with(".Duplicate") => Some(Portable::AlreadyExists),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct AwsErrorHandler;

impl HttpErrorHandler for AwsErrorHandler {
    fn handle_error(&self, command: &HttpCommand, response: &HttpResponse) -> Error {
        let vendor = parse_aws_error(response);
        let message = message_or_default(command, response, vendor.as_ref());

        if let Some(v) = &vendor {
            if v.code == "UnsupportedOperation" {
                return Error::UnsupportedOperation(message);
            }
            if let Some(kind) = classify(&v.code) {
                return kind.error(message, vendor);
            }
        }

        match response.status {
            401 | 403 => Portable::Authorization.error(message, vendor),
            404 if command.current_request().method() != Method::Delete => {
                Portable::NotFound.error(message, vendor)
            }
            409 => Portable::IllegalState.error(message, vendor),
            _ => unmapped(command, response, vendor),
        }
    }
}
