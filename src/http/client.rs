//! HTTP transport over reqwest

use std::sync::Arc;
use std::time::Duration;

use super::handlers::{
    BackoffLimitedRetryHandler, DelegatingErrorHandler, DelegatingRetryHandler, HttpErrorHandler,
    HttpRetryHandler, RedirectionRetryHandler,
};
use super::request::{ContentMetadata, Headers, HttpCommand, HttpRequest, HttpResponse, Payload};
use super::sanitize_for_log;
use crate::config::{keys, Properties};
use crate::error::Result;
use crate::rest::fallbacks::Fallback;
use crate::rest::parsers::ResponseParser;
use base64::Engine;

/// Transport settings, usually read from [`Properties`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub so_timeout: Duration,
    pub connection_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay_start: Duration,
    pub max_redirects: u32,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("multicloud/", env!("CARGO_PKG_VERSION")).to_string(),
            so_timeout: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(60),
            max_retries: 5,
            retry_delay_start: Duration::from_millis(50),
            max_redirects: 5,
        }
    }
}

impl HttpClientConfig {
    /// Read the transport keys scoped to `provider`
    pub fn from_properties(provider: &str, props: &Properties) -> Result<Self> {
        let defaults = Self::default();
        let as_u32 = |key: &str, default: u32| -> Result<u32> {
            Ok(props
                .get_u64(provider, key)?
                .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
                .unwrap_or(default))
        };
        Ok(Self {
            user_agent: props
                .get_scoped(provider, keys::USER_AGENT)
                .map(str::to_string)
                .unwrap_or(defaults.user_agent),
            so_timeout: props.get_millis(provider, keys::SO_TIMEOUT, 60_000)?,
            connection_timeout: props.get_millis(provider, keys::CONNECTION_TIMEOUT, 60_000)?,
            max_retries: as_u32(keys::MAX_RETRIES, defaults.max_retries)?,
            retry_delay_start: props.get_millis(provider, keys::RETRY_DELAY_START, 50)?,
            max_redirects: as_u32(keys::MAX_REDIRECTS, defaults.max_redirects)?,
        })
    }
}

/// Sends requests and drives the retry and error handlers
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    error_handler: Arc<dyn HttpErrorHandler>,
    retry_handler: Arc<dyn HttpRetryHandler>,
    io_retry: BackoffLimitedRetryHandler,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: &HttpClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.so_timeout)
            .connect_timeout(config.connection_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        let backoff = BackoffLimitedRetryHandler::new(config.max_retries, config.retry_delay_start);
        let redirects = RedirectionRetryHandler::new(config.max_redirects);

        Ok(Self {
            client,
            error_handler: Arc::new(DelegatingErrorHandler::default()),
            retry_handler: Arc::new(DelegatingRetryHandler::new(backoff.clone(), redirects)),
            io_retry: backoff,
        })
    }

    pub fn with_error_handler(mut self, handler: Arc<dyn HttpErrorHandler>) -> Self {
        self.error_handler = handler;
        self
    }

    pub fn with_retry_handler(mut self, handler: Arc<dyn HttpRetryHandler>) -> Self {
        self.retry_handler = handler;
        self
    }

    /// Send `request`, following redirects and retrying server errors.
    pub async fn invoke(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut command = HttpCommand::new(request);
        loop {
            let filtered = command.current_request().clone().apply_filters()?;
            tracing::debug!(">> {}", filtered.request_line());

            match self.send(&filtered).await {
                Ok(response) => {
                    tracing::debug!("<< HTTP/1.1 {} {}", response.status, response.message);
                    if response.is_success() {
                        return Ok(response);
                    }
                    if self.retry_handler.should_retry(&mut command, &response).await {
                        continue;
                    }
                    let body = response.payload_as_string();
                    if !body.is_empty() {
                        tracing::error!("API error: {} - {}", response.status, sanitize_for_log(&body));
                    }
                    return Err(self.error_handler.handle_error(&command, &response));
                }
                Err(e) if e.is_retryable() => {
                    if self.io_retry.retry_after_failure(&mut command, &e.to_string()).await {
                        continue;
                    }
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Invoke and parse a successful response.
    pub async fn invoke_and_parse<T>(
        &self,
        request: HttpRequest,
        parser: &dyn ResponseParser<T>,
    ) -> Result<T> {
        let response = self.invoke(request).await?;
        parser.parse(response)
    }

    /// Like [`HttpClient::invoke_and_parse`], letting `fallback` turn
    /// selected errors into values.
    pub async fn invoke_with_fallback<T>(
        &self,
        request: HttpRequest,
        parser: &dyn ResponseParser<T>,
        fallback: &dyn Fallback<T>,
    ) -> Result<T> {
        match self.invoke_and_parse(request, parser).await {
            Ok(value) => Ok(value),
            Err(e) => fallback.create_or_propagate(e),
        }
    }

    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .client
            .request(request.method().to_reqwest(), request.endpoint().clone());

        for (name, value) in request.headers().iter() {
            builder = builder.header(name, value);
        }

        if let Some(payload) = request.payload() {
            let md = &payload.metadata;
            if let Some(v) = &md.content_type {
                builder = builder.header("Content-Type", v.as_str());
            }
            if let Some(v) = &md.content_md5 {
                builder = builder.header(
                    "Content-MD5",
                    base64::engine::general_purpose::STANDARD.encode(v),
                );
            }
            if let Some(v) = &md.content_disposition {
                builder = builder.header("Content-Disposition", v.as_str());
            }
            if let Some(v) = &md.content_encoding {
                builder = builder.header("Content-Encoding", v.as_str());
            }
            if let Some(v) = &md.content_language {
                builder = builder.header("Content-Language", v.as_str());
            }
            builder = builder.body(payload.as_bytes().to_vec());
        }

        let response = builder.send().await?;

        let status = response.status();
        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.append(name.as_str(), v);
            }
        }
        let body = response.bytes().await?;

        let payload = if body.is_empty() {
            None
        } else {
            let metadata = ContentMetadata {
                content_type: headers.get("Content-Type").map(str::to_string),
                content_length: Some(body.len() as u64),
                content_encoding: headers.get("Content-Encoding").map(str::to_string),
                content_language: headers.get("Content-Language").map(str::to_string),
                content_disposition: headers.get("Content-Disposition").map(str::to_string),
                content_md5: None,
            };
            let mut payload = Payload::from_bytes(body.to_vec());
            payload.metadata = metadata;
            Some(payload)
        };

        Ok(HttpResponse {
            status: status.as_u16(),
            message: status.canonical_reason().unwrap_or("").to_string(),
            headers,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_config_from_properties() {
        let props: Properties = [
            ("multicloud.max-retries", "2"),
            ("vcloud.so-timeout", "1500"),
            ("vcloud.user-agent", "test-agent"),
        ]
        .into_iter()
        .collect();

        let config = HttpClientConfig::from_properties("vcloud", &props).unwrap();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.so_timeout, Duration::from_millis(1500));
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_config_rejects_bad_numbers() {
        let props: Properties = [("multicloud.max-redirects", "many")].into_iter().collect();
        assert!(matches!(
            HttpClientConfig::from_properties("vcloud", &props),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_client_builds() {
        assert!(HttpClient::new(&HttpClientConfig::default()).is_ok());
    }
}
