//! ElasticStack and CloudSigma: plain text errors, first line only

use regex::Regex;
use std::sync::OnceLock;

use super::Portable;
use crate::error::{Error, ProviderError};
use crate::http::handlers::{http_response_error, HttpErrorHandler};
use crate::http::request::{HttpCommand, HttpResponse};

fn not_found() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r".*(not found|Not found).*").expect("static regex"))
}

#[derive(Debug, Clone, Default)]
pub struct ElasticStackErrorHandler;

impl HttpErrorHandler for ElasticStackErrorHandler {
    fn handle_error(&self, command: &HttpCommand, response: &HttpResponse) -> Error {
        let body = response.payload_as_string();
        let first_line = body.lines().next().map(str::trim).unwrap_or("");
        let (message, vendor) = if first_line.is_empty() {
            (http_response_error(command, response).to_string(), None)
        } else {
            let vendor = ProviderError::new("elasticstack", response.status.to_string(), first_line)
                .with_status(response.status);
            (first_line.to_string(), Some(vendor))
        };

        let kind = match response.status {
            400 if not_found().is_match(&message) => Portable::NotFound,
            400 | 405 => Portable::IllegalArgument,
            401 => Portable::Authorization,
            404 => Portable::NotFound,
            409 => Portable::IllegalState,
            _ => return http_response_error(command, response),
        };
        kind.error(message, vendor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Method;
    use crate::providers::test_support::{command, response};

    fn handle(status: u16, body: &str) -> Error {
        let cmd = command(Method::Post, "https://api-lon-p.elastichosts.com/servers/create/stopped");
        ElasticStackErrorHandler.handle_error(&cmd, &response(status, "x", body))
    }

    #[test]
    fn test_first_line_message() {
        let err = handle(400, "drive 1234 Not found\nerror_point: 12\n");
        assert!(matches!(err, Error::ResourceNotFound { .. }));
        assert_eq!(err.to_string(), "drive 1234 Not found");
    }

    #[test]
    fn test_status_table() {
        assert!(matches!(handle(400, "invalid cpu value"), Error::IllegalArgument { .. }));
        assert!(matches!(handle(401, ""), Error::AuthorizationFailed { .. }));
        assert!(matches!(handle(404, ""), Error::ResourceNotFound { .. }));
        assert!(matches!(handle(405, "method not allowed"), Error::IllegalArgument { .. }));
        assert!(matches!(handle(409, "server busy"), Error::IllegalState { .. }));
        assert!(matches!(handle(500, "boom"), Error::HttpResponse { status: 500, .. }));
    }
}
