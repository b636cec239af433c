//! HTTP plumbing shared by every provider
//!
//! Requests are plain values built by the rest processor, run through a
//! filter chain, sent with `reqwest`, and their failures handed to retry and
//! error handlers chosen per provider.

pub mod client;
pub mod filters;
pub mod handlers;
pub mod request;
pub mod uri;

pub use client::{HttpClient, HttpClientConfig};
pub use filters::{AddDefaultHeaders, BasicAuthentication, BearerToken, RequestFilter, StripExpectHeader};
pub use handlers::{
    BackoffLimitedRetryHandler, DelegatingErrorHandler, DelegatingRetryHandler, HttpErrorHandler,
    HttpRetryHandler, MapHttp4xxCodesToErrors, RedirectionRetryHandler,
};
pub use request::{ContentMetadata, Headers, HttpCommand, HttpRequest, HttpResponse, Method, Payload};
pub use uri::{add_host_if_missing, uri_builder, UriBuilder};

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and drops non-printable characters
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}
