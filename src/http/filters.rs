//! Request filters applied just before a request is sent

use base64::Engine;
use std::fmt::Debug;

use super::request::HttpRequest;
use crate::error::Result;

/// Rewrites a request on its way out (signing, auth headers, ...)
pub trait RequestFilter: Send + Sync + Debug {
    fn filter(&self, request: HttpRequest) -> Result<HttpRequest>;
}

/// `Authorization: Basic base64(identity:credential)`
#[derive(Clone)]
pub struct BasicAuthentication {
    header: String,
}

impl BasicAuthentication {
    pub fn new(identity: &str, credential: &str) -> Self {
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", identity, credential));
        Self {
            header: format!("Basic {}", encoded),
        }
    }
}

// keep credentials out of Debug output
impl Debug for BasicAuthentication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BasicAuthentication")
    }
}

impl RequestFilter for BasicAuthentication {
    fn filter(&self, request: HttpRequest) -> Result<HttpRequest> {
        Ok(request.with_header("Authorization", self.header.clone()))
    }
}

/// `Authorization: Bearer <token>`
#[derive(Clone)]
pub struct BearerToken {
    token: String,
}

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken")
    }
}

impl RequestFilter for BearerToken {
    fn filter(&self, request: HttpRequest) -> Result<HttpRequest> {
        Ok(request.with_header("Authorization", format!("Bearer {}", self.token)))
    }
}

/// Some endpoints reject `Expect: 100-continue`.
#[derive(Debug, Clone, Default)]
pub struct StripExpectHeader;

impl RequestFilter for StripExpectHeader {
    fn filter(&self, request: HttpRequest) -> Result<HttpRequest> {
        Ok(request.without_header("Expect"))
    }
}

/// Adds a `User-Agent` unless the request already has one
#[derive(Debug, Clone)]
pub struct AddDefaultHeaders {
    user_agent: String,
}

impl AddDefaultHeaders {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

impl RequestFilter for AddDefaultHeaders {
    fn filter(&self, request: HttpRequest) -> Result<HttpRequest> {
        if request.headers().contains("User-Agent") {
            return Ok(request);
        }
        Ok(request.with_header("User-Agent", self.user_agent.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use url::Url;

    fn request() -> HttpRequest {
        HttpRequest::builder()
            .endpoint(Url::parse("https://api.example.com/servers").unwrap())
            .header("Expect", "100-continue")
            .filter(Arc::new(BasicAuthentication::new("Aladdin", "open sesame")))
            .filter(Arc::new(StripExpectHeader))
            .filter(Arc::new(AddDefaultHeaders::new("multicloud/test")))
            .build()
            .unwrap()
    }

    #[test]
    fn test_filter_chain() {
        let filtered = request().apply_filters().unwrap();
        assert_eq!(
            filtered.first_header("Authorization"),
            Some("Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==")
        );
        assert!(filtered.first_header("Expect").is_none());
        assert_eq!(filtered.first_header("User-Agent"), Some("multicloud/test"));
    }

    #[test]
    fn test_user_agent_not_overridden() {
        let req = request().with_header("User-Agent", "custom");
        let filtered = AddDefaultHeaders::new("multicloud/test").filter(req).unwrap();
        assert_eq!(filtered.first_header("User-Agent"), Some("custom"));
    }

    #[test]
    fn test_bearer_token_replaces_authorization() {
        let req = request().with_header("Authorization", "stale");
        let filtered = BearerToken::new("tok").filter(req).unwrap();
        assert_eq!(filtered.headers().get_all("authorization").count(), 1);
        assert_eq!(filtered.first_header("Authorization"), Some("Bearer tok"));
        assert_eq!(format!("{:?}", BearerToken::new("secret")), "BearerToken");
    }
}
