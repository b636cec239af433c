//! URI templates
//!
//! `{name}` variables may appear in the host, path and query of a template.
//! Path values are percent-encoded except for the skip characters; query
//! values are fully encoded; host values are inserted as-is.

use std::collections::HashMap;
use url::Url;

use crate::error::{Error, Result};

/// Characters left alone when encoding path variables
pub const DEFAULT_SKIP_PATH_ENCODING: &str = "/:;=";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriBuilder {
    scheme: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: String,
    query: Vec<(String, String)>,
    skip_path_encoding: Vec<char>,
    literal_query: bool,
}

/// Parse a template such as `https://{bucket}.s3.amazonaws.com/{key}?acl`.
pub fn uri_builder(template: &str) -> UriBuilder {
    let (scheme, rest) = match template.split_once("://") {
        Some((scheme, rest)) => (Some(scheme.to_string()), rest),
        None => (None, template),
    };

    let (authority, path_and_query) = if scheme.is_some() {
        match rest.find(['/', '?']) {
            Some(i) => (Some(&rest[..i]), &rest[i..]),
            None => (Some(rest), ""),
        }
    } else {
        (None, rest)
    };

    let (host, port) = match authority {
        Some(authority) => match authority.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => {
                (Some(host.to_string()), port.parse().ok())
            }
            _ => (Some(authority.to_string()), None),
        },
        None => (None, None),
    };

    let (path, query) = match path_and_query.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_and_query, None),
    };

    UriBuilder {
        scheme,
        host,
        port,
        path: path.to_string(),
        query: query.map(parse_query).unwrap_or_default(),
        skip_path_encoding: DEFAULT_SKIP_PATH_ENCODING.chars().collect(),
        literal_query: false,
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(k), decode(v))
        })
        .collect()
}

fn decode(s: &str) -> String {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

impl UriBuilder {
    /// Start from a concrete url; its path is kept already encoded.
    pub fn from_url(url: &Url) -> Self {
        UriBuilder {
            scheme: Some(url.scheme().to_string()),
            host: url.host_str().map(str::to_string),
            port: url.port(),
            path: url.path().to_string(),
            query: url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
            skip_path_encoding: DEFAULT_SKIP_PATH_ENCODING.chars().collect(),
            literal_query: true,
        }
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Join with exactly one `/`
    pub fn append_path(mut self, path: &str) -> Self {
        if path.is_empty() {
            return self;
        }
        let base = self.path.trim_end_matches('/');
        let tail = path.trim_start_matches('/');
        self.path = format!("{}/{}", base, tail);
        self
    }

    /// Replace the whole query
    pub fn query(mut self, params: Vec<(String, String)>) -> Self {
        self.query = params;
        self
    }

    pub fn add_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Drop every value of `key` then add the new one
    pub fn replace_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.retain(|(k, _)| k != key);
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn remove_query(mut self, key: &str) -> Self {
        self.query.retain(|(k, _)| k != key);
        self
    }

    pub fn clear_query(mut self) -> Self {
        self.query.clear();
        self
    }

    pub fn skip_path_encoding(mut self, chars: &str) -> Self {
        self.skip_path_encoding = chars.chars().collect();
        self
    }

    /// Query keys and values are sent as given, without variable expansion
    pub fn literal_query(mut self, literal: bool) -> Self {
        self.literal_query = literal;
        self
    }

    pub fn has_host(&self) -> bool {
        self.host.is_some()
    }

    pub fn path_template(&self) -> &str {
        &self.path
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// Expand variables and produce an absolute url
    pub fn build(&self, vars: &HashMap<String, String>) -> Result<Url> {
        let template = self.to_template();
        let scheme = self.scheme.as_deref().unwrap_or("https");
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| Error::illegal_argument(format!("no host in uri {}", template)))?;

        let mut out = format!("{}://{}", scheme, expand(host, vars, &template, |v| v.to_string())?);
        if let Some(port) = self.port {
            out.push_str(&format!(":{}", port));
        }

        let path = expand(&self.path, vars, &template, |v| {
            encode_except(v, &self.skip_path_encoding)
        })?;
        if !path.is_empty() && !path.starts_with('/') {
            out.push('/');
        }
        out.push_str(&path);

        if !self.query.is_empty() {
            let mut pairs = Vec::with_capacity(self.query.len());
            for (k, v) in &self.query {
                let (key, value) = if self.literal_query {
                    (k.clone(), v.clone())
                } else {
                    (
                        expand(k, vars, &template, |s| s.to_string())?,
                        expand(v, vars, &template, |s| s.to_string())?,
                    )
                };
                if v.is_empty() {
                    pairs.push(encode_query(&key));
                } else {
                    pairs.push(format!("{}={}", encode_query(&key), encode_query(&value)));
                }
            }
            out.push('?');
            out.push_str(&pairs.join("&"));
        }

        Ok(Url::parse(&out)?)
    }

    fn to_template(&self) -> String {
        let mut s = String::new();
        if let Some(scheme) = &self.scheme {
            s.push_str(scheme);
            s.push_str("://");
        }
        if let Some(host) = &self.host {
            s.push_str(host);
        }
        if let Some(port) = self.port {
            s.push_str(&format!(":{}", port));
        }
        s.push_str(&self.path);
        if !self.query.is_empty() {
            let q: Vec<String> = self.query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            s.push('?');
            s.push_str(&q.join("&"));
        }
        s
    }
}

/// Replace every `{name}` in `input` with `encode(vars[name])`.
fn expand(
    input: &str,
    vars: &HashMap<String, String>,
    template: &str,
    encode: impl Fn(&str) -> String,
) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = &rest[open + 1..open + close];
        let value = vars.get(name).ok_or_else(|| {
            Error::illegal_argument(format!(
                "missing value for template variable {{{}}} in {}",
                name, template
            ))
        })?;
        out.push_str(&encode(value));
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn encode_except(value: &str, skip: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    let mut buf = [0u8; 4];
    for c in value.chars() {
        if skip.contains(&c) {
            out.push(c);
        } else {
            out.push_str(&urlencoding::encode(c.encode_utf8(&mut buf)));
        }
    }
    out
}

fn encode_query(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Give a relative endpoint the scheme, host and port of `with_host`.
/// Absolute endpoints are returned unchanged.
pub fn add_host_if_missing(original: &str, with_host: &Url) -> Result<Url> {
    if let Ok(url) = Url::parse(original) {
        if url.has_host() {
            return Ok(url);
        }
    }
    let (path, query) = match original.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (original, None),
    };
    let mut url = with_host.clone();
    url.set_path(path);
    url.set_query(query);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_expand_path_and_query() {
        let url = uri_builder("https://api.example.com/v2/{tenant}/servers/{id}?name={name}")
            .build(&vars(&[("tenant", "acme"), ("id", "a b"), ("name", "web/1")]))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v2/acme/servers/a%20b?name=web%2F1"
        );
    }

    #[test]
    fn test_skip_path_encoding_defaults() {
        let url = uri_builder("https://host/{key}")
            .build(&vars(&[("key", "dir/sub:x;y=z?")]))
            .unwrap();
        assert_eq!(url.path(), "/dir/sub:x;y=z%3F");

        let url = uri_builder("https://host/{key}")
            .skip_path_encoding("")
            .build(&vars(&[("key", "dir/sub")]))
            .unwrap();
        assert_eq!(url.path(), "/dir%2Fsub");
    }

    #[test]
    fn test_host_template() {
        let url = uri_builder("https://{bucket}.s3.amazonaws.com/{key}")
            .build(&vars(&[("bucket", "photos"), ("key", "cat.jpg")]))
            .unwrap();
        assert_eq!(url.as_str(), "https://photos.s3.amazonaws.com/cat.jpg");
    }

    #[test]
    fn test_unresolved_variable_is_illegal_argument() {
        let err = uri_builder("https://host/{missing}").build(&HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::IllegalArgument { .. }));
        assert!(err.to_string().contains("{missing}"));
    }

    #[test]
    fn test_append_path_single_slash() {
        let b = uri_builder("https://host/api/").append_path("/v1").append_path("servers");
        assert_eq!(b.path_template(), "/api/v1/servers");
        let b = uri_builder("https://host").append_path("x");
        assert_eq!(b.build(&HashMap::new()).unwrap().as_str(), "https://host/x");
    }

    #[test]
    fn test_query_manipulation() {
        let url = uri_builder("https://host/?Action=DescribeImages&Owner.1=self")
            .add_query("Owner.2", "amazon")
            .replace_query("Action", "DescribeInstances")
            .remove_query("Owner.1")
            .build(&HashMap::new())
            .unwrap();
        assert_eq!(url.query(), Some("Owner.2=amazon&Action=DescribeInstances"));

        let url = uri_builder("https://host/bucket?acl").build(&HashMap::new()).unwrap();
        assert_eq!(url.query(), Some("acl"));

        let url = uri_builder("https://host/x?a=1").clear_query().build(&HashMap::new()).unwrap();
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_port_is_kept() {
        let url = uri_builder("http://localhost:8774/v2").build(&HashMap::new()).unwrap();
        assert_eq!(url.port(), Some(8774));
    }

    #[test]
    fn test_add_host_if_missing() {
        let base = Url::parse("https://compute.example.com:8443/api").unwrap();
        let url = add_host_if_missing("/v2/tenant?x=1", &base).unwrap();
        assert_eq!(url.as_str(), "https://compute.example.com:8443/v2/tenant?x=1");

        let url = add_host_if_missing("https://other.example.com/v1", &base).unwrap();
        assert_eq!(url.host_str(), Some("other.example.com"));
    }
}
