//! OpenStack Nova and Swift: `{ "<fault>": { "message": ..., "code": ... } }`

use async_trait::async_trait;
use std::time::Duration;

use super::{message_or_default, unmapped, Portable};
use crate::error::{Error, ProviderError};
use crate::http::handlers::{HttpErrorHandler, HttpRetryHandler};
use crate::http::request::{HttpCommand, HttpResponse};

/// Fault name, message, code and `retryAfter` of a fault body.
pub fn parse_fault(response: &HttpResponse) -> Option<(ProviderError, Option<u64>)> {
    let body = response.payload_as_string();
    let value: serde_json::Value = serde_json::from_str(&body).ok()?;
    let (name, fault) = value
        .as_object()?
        .iter()
        .find(|(_, v)| v.get("message").is_some())?;
    let message = fault.get("message")?.as_str()?.to_string();
    let retry_after = fault.get("retryAfter").and_then(|r| match r {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    });
    let mut error = ProviderError::new("openstack", name.clone(), message).with_status(response.status);
    if let Some(details) = fault.get("details").and_then(|d| d.as_str()) {
        error = error.with_description(details);
    }
    Some((error, retry_after))
}

#[derive(Debug, Clone, Default)]
pub struct OpenStackErrorHandler;

impl HttpErrorHandler for OpenStackErrorHandler {
    fn handle_error(&self, command: &HttpCommand, response: &HttpResponse) -> Error {
        let vendor = parse_fault(response).map(|(e, _)| e);
        let message = message_or_default(command, response, vendor.as_ref());

        let kind = match response.status {
            401 | 403 => Some(Portable::Authorization),
            404 => Some(Portable::NotFound),
            409 => Some(Portable::IllegalState),
            413 => Some(Portable::Insufficient),
            _ => None,
        };

        match kind {
            Some(kind) => kind.error(message, vendor),
            None => unmapped(command, response, vendor),
        }
    }
}

/// Waits out a 413 `overLimit` fault when the server says how long to wait.
#[derive(Debug, Clone)]
pub struct RetryOnOverLimit {
    pub max_wait: Duration,
    pub max_retries: u32,
}

impl Default for RetryOnOverLimit {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(60),
            max_retries: 5,
        }
    }
}

impl RetryOnOverLimit {
    /// Seconds to wait from the `Retry-After` header or the fault body.
    pub fn retry_after(response: &HttpResponse) -> Option<Duration> {
        response
            .first_header("Retry-After")
            .and_then(|h| h.trim().parse::<u64>().ok())
            .or_else(|| parse_fault(response).and_then(|(_, r)| r))
            .map(Duration::from_secs)
    }
}

#[async_trait]
impl HttpRetryHandler for RetryOnOverLimit {
    async fn should_retry(&self, command: &mut HttpCommand, response: &HttpResponse) -> bool {
        if response.status != 413 {
            return false;
        }
        let Some(wait) = Self::retry_after(response) else {
            return false;
        };
        if wait > self.max_wait {
            tracing::warn!("Not waiting {:?} for over-limit fault on {}", wait, command);
            return false;
        }
        if command.increment_failure_count() > self.max_retries {
            return false;
        }
        tracing::debug!("Over limit, retrying {} in {:?}", command, wait);
        tokio::time::sleep(wait).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Method;
    use crate::providers::test_support::{command, response};

    fn handle(status: u16, body: &str) -> Error {
        let cmd = command(Method::Post, "https://nova.example.com/v2/tenant/servers");
        OpenStackErrorHandler.handle_error(&cmd, &response(status, "x", body))
    }

    #[test]
    fn test_over_limit() {
        let body = r#"{"overLimit": {"message": "This request was rate-limited.", "code": 413, "retryAfter": "0"}}"#;
        let err = handle(413, body);
        assert!(matches!(err, Error::InsufficientResources { .. }));
        assert_eq!(err.to_string(), "This request was rate-limited.");
        assert_eq!(err.provider_error().unwrap().code, "overLimit");
    }

    #[test]
    fn test_status_table() {
        let not_found = r#"{"itemNotFound": {"message": "Instance could not be found", "code": 404}}"#;
        let err = handle(404, not_found);
        assert!(matches!(err, Error::ResourceNotFound { .. }));
        assert_eq!(err.to_string(), "Instance could not be found");
        assert!(matches!(handle(401, ""), Error::AuthorizationFailed { .. }));
        assert!(matches!(
            handle(409, r#"{"conflictingRequest": {"message": "in use", "code": 409}}"#),
            Error::IllegalState { .. }
        ));
        assert!(matches!(
            handle(400, r#"{"badRequest": {"message": "Invalid flavorRef", "code": 400}}"#),
            Error::Provider(_)
        ));
    }

    #[tokio::test]
    async fn test_retry_after() {
        let handler = RetryOnOverLimit {
            max_wait: Duration::from_secs(1),
            max_retries: 1,
        };
        let mut cmd = command(Method::Get, "https://nova.example.com/v2/tenant/servers");
        let now = response(413, "x", "").with_header("Retry-After", "0");
        assert!(handler.should_retry(&mut cmd, &now).await);
        assert!(!handler.should_retry(&mut cmd, &now).await);

        let later = response(413, "x", r#"{"overLimit": {"message": "slow down", "retryAfter": 3600}}"#);
        let mut cmd = command(Method::Get, "https://nova.example.com/v2/tenant/servers");
        assert!(!handler.should_retry(&mut cmd, &later).await);
        assert_eq!(RetryOnOverLimit::retry_after(&later), Some(Duration::from_secs(3600)));
    }
}
