//! Error taxonomy
//!
//! Every provider error handler translates vendor responses into one of the
//! portable variants below. When a vendor error was parsed out of the response
//! body it travels along as the `cause`, so callers can still inspect the
//! provider's own code and message.

use crate::compute::service::RunNodesError;

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A vendor error parsed from a response body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    /// Provider or api id that produced the error (e.g. `vcloud`, `ultradns-ws`)
    pub provider: String,
    /// Vendor error code, as text
    pub code: String,
    /// Full vendor message
    pub message: String,
    /// Vendor description, when the vendor separates it from the message
    pub description: Option<String>,
    /// HTTP status of the response carrying the error
    pub status: Option<u16>,
}

impl ProviderError {
    pub fn new(provider: &str, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            code: code.into(),
            message: message.into(),
            description: None,
            status: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Errors raised by the http layer, the rest processor and the portable views.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Portable taxonomy
    // =========================================================================
    #[error("{message}")]
    ResourceNotFound {
        message: String,
        #[source]
        cause: Option<ProviderError>,
    },

    #[error("{message}")]
    AuthorizationFailed {
        message: String,
        #[source]
        cause: Option<ProviderError>,
    },

    #[error("{message}")]
    IllegalState {
        message: String,
        #[source]
        cause: Option<ProviderError>,
    },

    #[error("{message}")]
    IllegalArgument {
        message: String,
        #[source]
        cause: Option<ProviderError>,
    },

    #[error("{message}")]
    InsufficientResources {
        message: String,
        #[source]
        cause: Option<ProviderError>,
    },

    #[error("{message}")]
    ResourceAlreadyExists {
        message: String,
        #[source]
        cause: Option<ProviderError>,
    },

    /// UltraDNS refuses directional records whose geolocation or source ip
    /// groups overlap an existing group.
    #[error("{message}")]
    DirectionalGroupOverlap {
        message: String,
        #[source]
        cause: Option<ProviderError>,
    },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("{message}")]
    ContainerNotFound { container: String, message: String },

    /// A non-successful response that no handler could give a portable meaning.
    #[error("command: {command} failed with response: HTTP/1.1 {status} {message}; content: [{}]", .body.as_deref().unwrap_or(""))]
    HttpResponse {
        command: String,
        status: u16,
        message: String,
        body: Option<String>,
    },

    /// Vendor error with no portable meaning.
    #[error(transparent)]
    Provider(ProviderError),

    // =========================================================================
    // Plumbing
    // =========================================================================
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    NoSuchElement(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to parse json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse xml: {0}")]
    Xml(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    RunNodes(Box<RunNodesError>),
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Xml(e.to_string())
    }
}

impl From<RunNodesError> for Error {
    fn from(e: RunNodesError) -> Self {
        Error::RunNodes(Box::new(e))
    }
}

impl Error {
    pub fn not_found(message: impl Into<String>) -> Self {
        Error::ResourceNotFound {
            message: message.into(),
            cause: None,
        }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Error::AuthorizationFailed {
            message: message.into(),
            cause: None,
        }
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        Error::IllegalState {
            message: message.into(),
            cause: None,
        }
    }

    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Error::IllegalArgument {
            message: message.into(),
            cause: None,
        }
    }

    pub fn insufficient_resources(message: impl Into<String>) -> Self {
        Error::InsufficientResources {
            message: message.into(),
            cause: None,
        }
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Error::ResourceAlreadyExists {
            message: message.into(),
            cause: None,
        }
    }

    pub fn container_not_found(container: &str, message: impl Into<String>) -> Self {
        Error::ContainerNotFound {
            container: container.to_string(),
            message: message.into(),
        }
    }

    /// Attach a vendor error to a portable variant. Variants without a
    /// `cause` slot are returned unchanged.
    pub fn caused_by(mut self, provider_error: ProviderError) -> Self {
        match &mut self {
            Error::ResourceNotFound { cause, .. }
            | Error::AuthorizationFailed { cause, .. }
            | Error::IllegalState { cause, .. }
            | Error::IllegalArgument { cause, .. }
            | Error::InsufficientResources { cause, .. }
            | Error::ResourceAlreadyExists { cause, .. }
            | Error::DirectionalGroupOverlap { cause, .. } => *cause = Some(provider_error),
            _ => {}
        }
        self
    }

    /// The vendor error behind a portable variant, if any.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Error::ResourceNotFound { cause, .. }
            | Error::AuthorizationFailed { cause, .. }
            | Error::IllegalState { cause, .. }
            | Error::IllegalArgument { cause, .. }
            | Error::InsufficientResources { cause, .. }
            | Error::ResourceAlreadyExists { cause, .. }
            | Error::DirectionalGroupOverlap { cause, .. } => cause.as_ref(),
            Error::Provider(e) => Some(e),
            _ => None,
        }
    }

    /// HTTP status of the response this error was built from, when known.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpResponse { status, .. } => Some(*status),
            Error::Transport(e) => e.status().map(|s| s.as_u16()),
            other => other.provider_error().and_then(|e| e.status),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ResourceNotFound { .. } | Error::ContainerNotFound { .. }
        ) || self.status() == Some(404)
    }

    /// Transport failures, timeouts and 5xx responses may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_connect() || e.is_timeout(),
            Error::Timeout(_) => true,
            Error::HttpResponse { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
