//! Request, response and command values

use md5::{Digest, Md5};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

use super::filters::RequestFilter;
use crate::error::{Error, Result};

// =============================================================================
// Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Options => "OPTIONS",
        }
    }

    /// Whether a body may be sent with this method.
    pub fn allows_payload(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Patch => reqwest::Method::PATCH,
            Method::Options => reqwest::Method::OPTIONS,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "PATCH" => Ok(Method::Patch),
            "OPTIONS" => Ok(Method::Options),
            other => Err(Error::illegal_argument(format!("unknown http method {}", other))),
        }
    }
}

// =============================================================================
// Headers
// =============================================================================

/// Ordered multimap of headers; names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Append a value, keeping existing ones
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replace every value of `name` with a single one
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    pub fn remove(&mut self, name: &str) -> Vec<String> {
        let mut removed = Vec::new();
        self.entries.retain(|(k, v)| {
            if k.eq_ignore_ascii_case(name) {
                removed.push(v.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.append(k, v);
        }
        headers
    }
}

// =============================================================================
// Payload
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentMetadata {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub content_md5: Option<Vec<u8>>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
}

/// Request or response body with its content metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    data: Vec<u8>,
    pub metadata: ContentMetadata,
}

impl Payload {
    fn with_type(data: Vec<u8>, content_type: &str) -> Self {
        let metadata = ContentMetadata {
            content_type: Some(content_type.to_string()),
            content_length: Some(data.len() as u64),
            ..Default::default()
        };
        Self { data, metadata }
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self::with_type(s.into().into_bytes(), "text/plain")
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::with_type(bytes.into(), "application/octet-stream")
    }

    pub fn from_json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::with_type(serde_json::to_vec(value)?, "application/json"))
    }

    /// `application/x-www-form-urlencoded` body, keys kept in order
    pub fn url_encoded_form<K: AsRef<str>, V: AsRef<str>>(params: &[(K, V)]) -> Self {
        let body = params
            .iter()
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    urlencoding::encode(k.as_ref()),
                    urlencoding::encode(v.as_ref())
                )
            })
            .collect::<Vec<_>>()
            .join("&");
        Self::with_type(body.into_bytes(), "application/x-www-form-urlencoded")
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.metadata.content_type = Some(content_type.into());
        self
    }

    /// Fill `content_md5` from the current bytes.
    pub fn compute_md5(&mut self) -> &[u8] {
        let digest = Md5::digest(&self.data);
        self.metadata.content_md5 = Some(digest.to_vec());
        self.metadata.content_md5.as_deref().unwrap_or_default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Body as text, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// =============================================================================
// Request
// =============================================================================

#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: Method,
    endpoint: Url,
    headers: Headers,
    payload: Option<Payload>,
    filters: Vec<Arc<dyn RequestFilter>>,
}

impl HttpRequest {
    pub fn builder() -> HttpRequestBuilder {
        HttpRequestBuilder::default()
    }

    pub fn to_builder(&self) -> HttpRequestBuilder {
        HttpRequestBuilder {
            method: Some(self.method),
            endpoint: Some(self.endpoint.clone()),
            headers: self.headers.clone(),
            payload: self.payload.clone(),
            filters: self.filters.clone(),
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn first_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn filters(&self) -> &[Arc<dyn RequestFilter>] {
        &self.filters
    }

    /// Copy of this request with a header replaced
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn without_header(mut self, name: &str) -> Self {
        self.headers.remove(name);
        self
    }

    /// `GET https://host/path?x=y HTTP/1.1`
    pub fn request_line(&self) -> String {
        format!("{} {} HTTP/1.1", self.method, self.endpoint)
    }

    /// Run the filter chain in order.
    pub fn apply_filters(self) -> Result<HttpRequest> {
        let filters = self.filters.clone();
        filters.iter().try_fold(self, |request, filter| filter.filter(request))
    }
}

impl PartialEq for HttpRequest {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method
            && self.endpoint == other.endpoint
            && self.headers == other.headers
            && self.payload == other.payload
            && self.filters.len() == other.filters.len()
    }
}

#[derive(Debug, Default)]
pub struct HttpRequestBuilder {
    method: Option<Method>,
    endpoint: Option<Url>,
    headers: Headers,
    payload: Option<Payload>,
    filters: Vec<Arc<dyn RequestFilter>>,
}

impl HttpRequestBuilder {
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Append a header value
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn replace_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn remove_header(mut self, name: &str) -> Self {
        self.headers.remove(name);
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn payload(mut self, payload: Option<Payload>) -> Self {
        self.payload = payload;
        self
    }

    pub fn filter(mut self, filter: Arc<dyn RequestFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(mut self, filters: Vec<Arc<dyn RequestFilter>>) -> Self {
        self.filters = filters;
        self
    }

    pub fn build(self) -> Result<HttpRequest> {
        let method = self.method.unwrap_or(Method::Get);
        let endpoint = self
            .endpoint
            .ok_or_else(|| Error::illegal_argument("endpoint must be set on a request"))?;
        let mut headers = self.headers;
        let mut payload = self.payload;

        // content headers live on the payload
        if let Some(payload) = payload.as_mut() {
            if let Some(content_type) = headers.remove("Content-Type").into_iter().next() {
                payload.metadata.content_type = Some(content_type);
            }
        } else if method.allows_payload() {
            // a body-less POST/PUT with a Content-Type still sends an empty body of that type
            if let Some(content_type) = headers.remove("Content-Type").into_iter().next() {
                payload = Some(Payload::from_bytes(Vec::new()).with_content_type(content_type));
            }
        }

        Ok(HttpRequest {
            method,
            endpoint,
            headers,
            payload,
            filters: self.filters,
        })
    }
}

// =============================================================================
// Response
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub message: String,
    pub headers: Headers,
    pub payload: Option<Payload>,
}

impl HttpResponse {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn first_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Body as (lossy) text; empty when there is no payload
    pub fn payload_as_string(&self) -> String {
        self.payload
            .as_ref()
            .map(|p| String::from_utf8_lossy(p.as_bytes()).into_owned())
            .unwrap_or_default()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.payload
            .as_ref()
            .and_then(|p| p.metadata.content_type.as_deref())
            .or_else(|| self.first_header("Content-Type"))
    }
}

// =============================================================================
// Command
// =============================================================================

/// A request in flight: the original request, the one currently being sent
/// (redirects rewrite it) and how often it failed or was redirected.
#[derive(Debug, Clone)]
pub struct HttpCommand {
    original: HttpRequest,
    current: HttpRequest,
    failure_count: u32,
    redirect_count: u32,
}

impl HttpCommand {
    pub fn new(request: HttpRequest) -> Self {
        Self {
            current: request.clone(),
            original: request,
            failure_count: 0,
            redirect_count: 0,
        }
    }

    pub fn original_request(&self) -> &HttpRequest {
        &self.original
    }

    pub fn current_request(&self) -> &HttpRequest {
        &self.current
    }

    pub fn set_current_request(&mut self, request: HttpRequest) {
        self.current = request;
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn increment_failure_count(&mut self) -> u32 {
        self.failure_count += 1;
        self.failure_count
    }

    pub fn redirect_count(&self) -> u32 {
        self.redirect_count
    }

    pub fn increment_redirect_count(&mut self) -> u32 {
        self.redirect_count += 1;
        self.redirect_count
    }
}

impl fmt::Display for HttpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original.request_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = Headers::new();
        headers.append("X-Auth-Token", "a");
        headers.append("x-auth-token", "b");
        assert_eq!(headers.get("X-AUTH-TOKEN"), Some("a"));
        assert_eq!(headers.get_all("x-Auth-token").count(), 2);

        headers.set("x-auth-TOKEN", "c");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-Auth-Token"), Some("c"));
    }

    #[test]
    fn test_request_line() {
        let request = HttpRequest::builder()
            .method(Method::Get)
            .endpoint(url("https://host/path?x=y"))
            .build()
            .unwrap();
        assert_eq!(request.request_line(), "GET https://host/path?x=y HTTP/1.1");
    }

    #[test]
    fn test_content_type_moves_to_payload() {
        let request = HttpRequest::builder()
            .method(Method::Post)
            .endpoint(url("https://host/servers"))
            .header("Content-Type", "application/vnd.vmware.vcloud.vApp+xml")
            .payload(Some(Payload::from_string("<VApp/>")))
            .build()
            .unwrap();
        assert!(!request.headers().contains("Content-Type"));
        assert_eq!(
            request.payload().unwrap().metadata.content_type.as_deref(),
            Some("application/vnd.vmware.vcloud.vApp+xml")
        );
    }

    #[test]
    fn test_content_type_alone_makes_empty_payload_only_for_body_methods() {
        let post = HttpRequest::builder()
            .method(Method::Post)
            .endpoint(url("https://host/action/powerOn"))
            .header("Content-Type", "application/json")
            .build()
            .unwrap();
        let payload = post.payload().unwrap();
        assert!(payload.is_empty());
        assert_eq!(payload.metadata.content_type.as_deref(), Some("application/json"));

        let get = HttpRequest::builder()
            .method(Method::Get)
            .endpoint(url("https://host/servers"))
            .header("Content-Type", "application/json")
            .build()
            .unwrap();
        assert!(get.payload().is_none());
    }

    #[test]
    fn test_build_requires_endpoint() {
        assert!(matches!(
            HttpRequest::builder().build(),
            Err(Error::IllegalArgument { .. })
        ));
    }

    #[test]
    fn test_form_payload_encoding() {
        let payload = Payload::url_encoded_form(&[("Action", "RunInstances"), ("Name", "a b&c")]);
        assert_eq!(payload.as_str(), Some("Action=RunInstances&Name=a%20b%26c"));
        assert_eq!(
            payload.metadata.content_type.as_deref(),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn test_compute_md5() {
        let mut payload = Payload::from_string("hello");
        let md5 = payload.compute_md5().to_vec();
        assert_eq!(
            md5,
            vec![
                0x5d, 0x41, 0x40, 0x2a, 0xbc, 0x4b, 0x2a, 0x76, 0xb9, 0x71, 0x9d, 0x91, 0x10, 0x17,
                0xc5, 0x92
            ]
        );
    }

    #[test]
    fn test_command_keeps_original() {
        let request = HttpRequest::builder()
            .endpoint(url("https://a/x"))
            .build()
            .unwrap();
        let mut command = HttpCommand::new(request.clone());
        let redirected = request.to_builder().endpoint(url("https://b/x")).build().unwrap();
        command.set_current_request(redirected);
        assert_eq!(command.increment_redirect_count(), 1);
        assert_eq!(command.original_request().endpoint().as_str(), "https://a/x");
        assert_eq!(command.current_request().endpoint().as_str(), "https://b/x");
        assert_eq!(command.to_string(), "GET https://a/x HTTP/1.1");
    }
}
