//! Error and retry handlers
//!
//! Error handlers turn a failed response into an [`Error`]; retry handlers
//! decide whether a command is sent again, rewriting it when needed and
//! sleeping for any backoff before they answer.

use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use super::request::{HttpCommand, HttpResponse, Method};
use super::sanitize_for_log;
use crate::error::Error;

/// Translates a non-successful response into an error
pub trait HttpErrorHandler: Send + Sync + Debug {
    fn handle_error(&self, command: &HttpCommand, response: &HttpResponse) -> Error;
}

/// Decides whether a command should be sent again
#[async_trait]
pub trait HttpRetryHandler: Send + Sync + Debug {
    async fn should_retry(&self, command: &mut HttpCommand, response: &HttpResponse) -> bool;
}

/// Error for a response no table gave a portable meaning.
pub fn http_response_error(command: &HttpCommand, response: &HttpResponse) -> Error {
    let body = response.payload_as_string();
    Error::HttpResponse {
        command: command.current_request().request_line(),
        status: response.status,
        message: response.message.clone(),
        body: if body.is_empty() {
            None
        } else {
            Some(sanitize_for_log(&body))
        },
    }
}

// =============================================================================
// Default status table
// =============================================================================

/// 401/403 are authorization failures, 404 a missing resource (except on
/// DELETE, where fallbacks decide), 409 an illegal state.
#[derive(Debug, Clone, Default)]
pub struct MapHttp4xxCodesToErrors;

impl HttpErrorHandler for MapHttp4xxCodesToErrors {
    fn handle_error(&self, command: &HttpCommand, response: &HttpResponse) -> Error {
        let base = http_response_error(command, response);
        let message = base.to_string();
        match response.status {
            401 | 403 => Error::authorization(message),
            404 if command.current_request().method() != Method::Delete => Error::not_found(message),
            409 => Error::illegal_state(message),
            _ => base,
        }
    }
}

// =============================================================================
// Retry handlers
// =============================================================================

/// Retries server errors with a growing delay, up to a retry limit.
#[derive(Debug, Clone)]
pub struct BackoffLimitedRetryHandler {
    pub retry_count_limit: u32,
    pub delay_start: Duration,
}

impl Default for BackoffLimitedRetryHandler {
    fn default() -> Self {
        Self {
            retry_count_limit: 5,
            delay_start: Duration::from_millis(50),
        }
    }
}

impl BackoffLimitedRetryHandler {
    pub fn new(retry_count_limit: u32, delay_start: Duration) -> Self {
        Self {
            retry_count_limit,
            delay_start,
        }
    }

    pub fn is_retryable_status(status: u16) -> bool {
        matches!(status, 500 | 502 | 503 | 504 | 429)
    }

    /// `min(delay_start * failures^2, delay_start * 10)`
    pub fn backoff_delay(&self, failure_count: u32) -> Duration {
        let factor = failure_count.saturating_mul(failure_count).min(10);
        self.delay_start.saturating_mul(factor)
    }

    /// Count a failure and, if the limit allows, sleep before answering `true`.
    pub async fn retry_after_failure(&self, command: &mut HttpCommand, reason: &str) -> bool {
        let failures = command.increment_failure_count();
        if failures > self.retry_count_limit {
            tracing::warn!(
                "Cannot retry after {}, command has exceeded retry limit {}: {}",
                reason,
                self.retry_count_limit,
                command
            );
            return false;
        }
        let delay = self.backoff_delay(failures);
        tracing::debug!(
            "Retry {}/{} after {}: delaying {:?} for {}",
            failures,
            self.retry_count_limit,
            reason,
            delay,
            command
        );
        tokio::time::sleep(delay).await;
        true
    }
}

#[async_trait]
impl HttpRetryHandler for BackoffLimitedRetryHandler {
    async fn should_retry(&self, command: &mut HttpCommand, response: &HttpResponse) -> bool {
        if !Self::is_retryable_status(response.status) {
            return false;
        }
        self.retry_after_failure(command, &format!("server error {}", response.status))
            .await
    }
}

/// Follows `Location` on 301, 302, 303, 307 and 308.
#[derive(Debug, Clone)]
pub struct RedirectionRetryHandler {
    pub max_redirects: u32,
}

impl Default for RedirectionRetryHandler {
    fn default() -> Self {
        Self { max_redirects: 5 }
    }
}

impl RedirectionRetryHandler {
    pub fn new(max_redirects: u32) -> Self {
        Self { max_redirects }
    }
}

#[async_trait]
impl HttpRetryHandler for RedirectionRetryHandler {
    async fn should_retry(&self, command: &mut HttpCommand, response: &HttpResponse) -> bool {
        if !matches!(response.status, 301 | 302 | 303 | 307 | 308) {
            return false;
        }
        let Some(location) = response.first_header("Location") else {
            return false;
        };

        let current = command.current_request().clone();
        let redirect = match current.endpoint().join(location) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Ignoring unparsable Location {}: {}", location, e);
                return false;
            }
        };
        if &redirect == current.endpoint() {
            tracing::warn!("Redirection loop detected at {}", redirect);
            return false;
        }
        if command.increment_redirect_count() > self.max_redirects {
            tracing::warn!("Cannot follow redirect, exceeded {} redirects: {}", self.max_redirects, command);
            return false;
        }

        let mut builder = current.to_builder().endpoint(redirect.clone());
        if response.status == 303 {
            builder = builder.method(Method::Get).payload(None);
        }
        if current.endpoint().host_str() != redirect.host_str() {
            builder = builder.remove_header("Host");
        }
        match builder.build() {
            Ok(request) => {
                tracing::debug!("Following redirect {} to {}", response.status, redirect);
                command.set_current_request(request);
                true
            }
            Err(_) => false,
        }
    }
}

/// Never retries; the default for client errors
#[derive(Debug, Clone, Default)]
pub struct NoRetry;

#[async_trait]
impl HttpRetryHandler for NoRetry {
    async fn should_retry(&self, _command: &mut HttpCommand, _response: &HttpResponse) -> bool {
        false
    }
}

// =============================================================================
// Delegation by status class
// =============================================================================

/// Picks a handler by status class: 3xx redirection, 4xx client, 5xx server.
#[derive(Debug, Clone)]
pub struct DelegatingErrorHandler {
    client: Arc<dyn HttpErrorHandler>,
    server: Arc<dyn HttpErrorHandler>,
    redirection: Arc<dyn HttpErrorHandler>,
}

impl Default for DelegatingErrorHandler {
    fn default() -> Self {
        let table: Arc<dyn HttpErrorHandler> = Arc::new(MapHttp4xxCodesToErrors);
        Self {
            client: table.clone(),
            server: table.clone(),
            redirection: table,
        }
    }
}

impl DelegatingErrorHandler {
    /// One handler for every status class
    pub fn uniform(handler: Arc<dyn HttpErrorHandler>) -> Self {
        Self {
            client: handler.clone(),
            server: handler.clone(),
            redirection: handler,
        }
    }

    pub fn with_client(mut self, handler: Arc<dyn HttpErrorHandler>) -> Self {
        self.client = handler;
        self
    }

    pub fn with_server(mut self, handler: Arc<dyn HttpErrorHandler>) -> Self {
        self.server = handler;
        self
    }

    pub fn with_redirection(mut self, handler: Arc<dyn HttpErrorHandler>) -> Self {
        self.redirection = handler;
        self
    }
}

impl HttpErrorHandler for DelegatingErrorHandler {
    fn handle_error(&self, command: &HttpCommand, response: &HttpResponse) -> Error {
        match response.status {
            300..=399 => self.redirection.handle_error(command, response),
            400..=499 => self.client.handle_error(command, response),
            _ => self.server.handle_error(command, response),
        }
    }
}

/// 3xx to the redirection handler, 5xx and 429 to the server handler, other
/// 4xx to the client handler.
#[derive(Debug, Clone)]
pub struct DelegatingRetryHandler {
    client: Arc<dyn HttpRetryHandler>,
    server: Arc<dyn HttpRetryHandler>,
    redirection: Arc<dyn HttpRetryHandler>,
}

impl Default for DelegatingRetryHandler {
    fn default() -> Self {
        Self {
            client: Arc::new(NoRetry),
            server: Arc::new(BackoffLimitedRetryHandler::default()),
            redirection: Arc::new(RedirectionRetryHandler::default()),
        }
    }
}

impl DelegatingRetryHandler {
    pub fn new(server: BackoffLimitedRetryHandler, redirection: RedirectionRetryHandler) -> Self {
        Self {
            client: Arc::new(NoRetry),
            server: Arc::new(server),
            redirection: Arc::new(redirection),
        }
    }

    pub fn with_client(mut self, handler: Arc<dyn HttpRetryHandler>) -> Self {
        self.client = handler;
        self
    }

    pub fn with_server(mut self, handler: Arc<dyn HttpRetryHandler>) -> Self {
        self.server = handler;
        self
    }
}

#[async_trait]
impl HttpRetryHandler for DelegatingRetryHandler {
    async fn should_retry(&self, command: &mut HttpCommand, response: &HttpResponse) -> bool {
        match response.status {
            300..=399 => self.redirection.should_retry(command, response).await,
            429 | 500..=599 => self.server.should_retry(command, response).await,
            400..=499 => self.client.should_retry(command, response).await,
            _ => false,
        }
    }
}
