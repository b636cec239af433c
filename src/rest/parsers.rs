//! Response parsers

use serde::de::DeserializeOwned;
use std::marker::PhantomData;

use crate::error::{Error, Result};
use crate::http::request::HttpResponse;

/// Turns a successful response into a value
pub trait ResponseParser<T>: Send + Sync {
    fn parse(&self, response: HttpResponse) -> Result<T>;
}

fn body_bytes(response: &HttpResponse) -> &[u8] {
    match &response.payload {
        Some(p) if !p.is_empty() => p.as_bytes(),
        _ => b"null",
    }
}

/// Deserialize the whole body. An empty body reads as JSON `null`.
pub struct ParseJson<T>(PhantomData<fn() -> T>);

impl<T> ParseJson<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for ParseJson<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> ResponseParser<T> for ParseJson<T> {
    fn parse(&self, response: HttpResponse) -> Result<T> {
        Ok(serde_json::from_slice(body_bytes(&response))?)
    }
}

/// Deserialize the value under a top-level key, `None` when absent
pub struct ParseJsonWrapped<T> {
    key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ParseJsonWrapped<T> {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> ResponseParser<Option<T>> for ParseJsonWrapped<T> {
    fn parse(&self, response: HttpResponse) -> Result<Option<T>> {
        let mut value: serde_json::Value = serde_json::from_slice(body_bytes(&response))?;
        match value.get_mut(&self.key).map(serde_json::Value::take) {
            Some(serde_json::Value::Null) | None => Ok(None),
            Some(inner) => Ok(Some(serde_json::from_value(inner)?)),
        }
    }
}

/// Deserialize the first value named `key` at any depth
pub struct ParseFirstJsonValueNamed<T> {
    key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ParseFirstJsonValueNamed<T> {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            _marker: PhantomData,
        }
    }
}

fn find_named<'v>(value: &'v serde_json::Value, key: &str) -> Option<&'v serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map
            .get(key)
            .or_else(|| map.values().find_map(|v| find_named(v, key))),
        serde_json::Value::Array(items) => items.iter().find_map(|v| find_named(v, key)),
        _ => None,
    }
}

impl<T: DeserializeOwned> ResponseParser<Option<T>> for ParseFirstJsonValueNamed<T> {
    fn parse(&self, response: HttpResponse) -> Result<Option<T>> {
        let value: serde_json::Value = serde_json::from_slice(body_bytes(&response))?;
        match find_named(&value, &self.key) {
            Some(serde_json::Value::Null) | None => Ok(None),
            Some(found) => Ok(Some(serde_json::from_value(found.clone())?)),
        }
    }
}

pub struct ReturnStringIf2xx;

impl ResponseParser<String> for ReturnStringIf2xx {
    fn parse(&self, response: HttpResponse) -> Result<String> {
        Ok(response.payload_as_string())
    }
}

pub struct ReturnTrueIf2xx;

impl ResponseParser<bool> for ReturnTrueIf2xx {
    fn parse(&self, _response: HttpResponse) -> Result<bool> {
        Ok(true)
    }
}

/// Drop the body
pub struct ReleasePayloadAndReturn;

impl ResponseParser<()> for ReleasePayloadAndReturn {
    fn parse(&self, _response: HttpResponse) -> Result<()> {
        Ok(())
    }
}

/// The `ETag` header, unquoted
pub struct ParseETagHeader;

impl ResponseParser<String> for ParseETagHeader {
    fn parse(&self, response: HttpResponse) -> Result<String> {
        response
            .first_header("ETag")
            .map(|etag| etag.trim_matches('"').to_string())
            .ok_or_else(|| {
                Error::NoSuchElement(format!(
                    "no ETag header in response HTTP/1.1 {} {}",
                    response.status, response.message
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::Payload;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Flavor {
        id: String,
        ram: u32,
    }

    fn json(body: &str) -> HttpResponse {
        HttpResponse::new(200, "OK").with_payload(Payload::from_string(body))
    }

    #[test]
    fn test_parse_json() {
        let flavor: Flavor = ParseJson::new().parse(json(r#"{"id":"1","ram":512}"#)).unwrap();
        assert_eq!(flavor, Flavor { id: "1".into(), ram: 512 });

        let none: Option<Flavor> = ParseJson::new().parse(HttpResponse::new(204, "No Content")).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_parse_wrapped() {
        let parser = ParseJsonWrapped::<Flavor>::new("flavor");
        let flavor = parser.parse(json(r#"{"flavor":{"id":"2","ram":1024}}"#)).unwrap();
        assert_eq!(flavor.unwrap().ram, 1024);
        assert!(parser.parse(json(r#"{"server":{}}"#)).unwrap().is_none());
    }

    #[test]
    fn test_parse_first_value_named() {
        let parser = ParseFirstJsonValueNamed::<String>::new("jobid");
        let body = r#"{"deployvirtualmachineresponse":{"id":"10","jobid":"abc"}}"#;
        assert_eq!(parser.parse(json(body)).unwrap().as_deref(), Some("abc"));
        assert!(parser.parse(json(r#"[{"x":1}]"#)).unwrap().is_none());
    }

    #[test]
    fn test_etag() {
        let response = HttpResponse::new(200, "OK").with_header("ETag", "\"d41d8cd98f00b204e9800998ecf8427e\"");
        assert_eq!(ParseETagHeader.parse(response).unwrap(), "d41d8cd98f00b204e9800998ecf8427e");
        assert!(matches!(
            ParseETagHeader.parse(HttpResponse::new(200, "OK")),
            Err(Error::NoSuchElement(_))
        ));
    }

    #[test]
    fn test_string_and_flags() {
        assert_eq!(ReturnStringIf2xx.parse(json("hello")).unwrap(), "hello");
        assert!(ReturnTrueIf2xx.parse(HttpResponse::new(204, "No Content")).unwrap());
        ReleasePayloadAndReturn.parse(json("ignored")).unwrap();
    }
}
