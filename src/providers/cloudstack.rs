//! CloudStack: `{ "<command>response": { "errorcode": 431, "errortext": "..." } }`

use super::{message_or_default, unmapped, Portable};
use crate::error::{Error, ProviderError};
use crate::http::handlers::HttpErrorHandler;
use crate::http::request::{HttpCommand, HttpResponse};

/// Pull `errorcode`/`errortext` out of the response envelope.
pub fn parse_cloudstack_error(response: &HttpResponse) -> Option<ProviderError> {
    let body = response.payload_as_string();
    let value: serde_json::Value = serde_json::from_str(&body).ok()?;
    let inner = value
        .as_object()?
        .values()
        .find(|v| v.get("errortext").is_some())?;
    let text = inner.get("errortext")?.as_str()?.to_string();
    let code = inner
        .get("errorcode")
        .map(|c| match c {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| response.status.to_string());
    Some(ProviderError::new("cloudstack", code, text).with_status(response.status))
}

#[derive(Debug, Clone, Default)]
pub struct CloudStackErrorHandler;

impl HttpErrorHandler for CloudStackErrorHandler {
    fn handle_error(&self, command: &HttpCommand, response: &HttpResponse) -> Error {
        let vendor = parse_cloudstack_error(response);
        let message = message_or_default(command, response, vendor.as_ref());
        let lower = message.to_lowercase();

        let kind = match response.status {
            401 => Some(Portable::Authorization),
            404 => Some(Portable::NotFound),
            409 => Some(Portable::IllegalState),
            431 if lower.contains("already exists") => Some(Portable::AlreadyExists),
            431 => Some(Portable::IllegalArgument),
            530 | 534 | 535 => Some(if lower.contains("does not exist") {
                Portable::NotFound
            } else if lower.contains("not enough") || lower.contains("insufficient") {
                Portable::Insufficient
            } else {
                Portable::IllegalState
            }),
            _ => None,
        };

        match kind {
            Some(kind) => kind.error(message, vendor),
            None => unmapped(command, response, vendor),
        }
    }
}
