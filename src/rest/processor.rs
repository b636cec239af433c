//! Turns invocations into HTTP requests

use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use super::descriptor::{Invocation, ParamKind, ParamValue};
use crate::error::{Error, Result};
use crate::http::filters::{RequestFilter, StripExpectHeader};
use crate::http::request::{HttpRequest, Payload};
use crate::http::uri::{add_host_if_missing, UriBuilder};

/// Token names available to every template
pub const API_VERSION_TOKEN: &str = "api-version";
pub const BUILD_VERSION_TOKEN: &str = "build-version";

/// Builds requests for one provider context
#[derive(Debug, Clone, Default)]
pub struct RestProcessor {
    default_endpoint: Option<Url>,
    endpoints: HashMap<String, String>,
    api_version: Option<String>,
    build_version: Option<String>,
    strip_expect_header: bool,
}

impl RestProcessor {
    pub fn new(default_endpoint: Option<Url>) -> Self {
        Self {
            default_endpoint,
            ..Default::default()
        }
    }

    /// Register a named endpoint; relative values resolve against the default one
    pub fn with_endpoint(mut self, name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        self.endpoints.insert(name.into(), endpoint.into());
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn with_build_version(mut self, version: impl Into<String>) -> Self {
        self.build_version = Some(version.into());
        self
    }

    pub fn with_strip_expect_header(mut self, strip: bool) -> Self {
        self.strip_expect_header = strip;
        self
    }

    pub fn default_endpoint(&self) -> Option<&Url> {
        self.default_endpoint.as_ref()
    }

    pub fn create_request(&self, invocation: &Invocation<'_>) -> Result<HttpRequest> {
        let api = invocation.api;
        let call = invocation.call;

        // arguments
        for binding in &call.params {
            if !binding.nullable && invocation.value(&binding.name).is_none() {
                return Err(Error::illegal_argument(format!(
                    "param{{{}}} for invocation {}",
                    binding.kind.key(),
                    invocation
                )));
            }
        }

        let endpoint = self.resolve_endpoint(invocation)?;
        tracing::trace!("using endpoint {} for {}", endpoint, invocation);

        // tokens
        let mut tokens: HashMap<String, String> = HashMap::new();
        if let Some(v) = &self.api_version {
            tokens.insert(API_VERSION_TOKEN.to_string(), v.clone());
        }
        if let Some(v) = &self.build_version {
            tokens.insert(BUILD_VERSION_TOKEN.to_string(), v.clone());
        }
        for binding in &call.params {
            if let ParamKind::Path(key) = &binding.kind {
                if let Some(value) = invocation.value(&binding.name).and_then(ParamValue::as_text) {
                    tokens.insert(key.clone(), value);
                }
            }
        }

        // path, query, form and headers
        let mut uri = UriBuilder::from_url(&endpoint)
            .append_path(&api.base_path)
            .append_path(&call.path);
        if let Some(skip) = &api.skip_encoding {
            uri = uri.skip_path_encoding(skip);
        }

        let mut query: Vec<(String, String)> = Vec::new();
        let mut form: Vec<(String, String)> = Vec::new();
        let mut headers: Vec<(String, String)> = Vec::new();

        query.extend(api.query_params.iter().cloned());
        query.extend(call.query_params.iter().cloned());
        form.extend(api.form_params.iter().cloned());
        form.extend(call.form_params.iter().cloned());
        headers.extend(api.headers.iter().cloned());
        headers.extend(call.headers.iter().cloned());

        let mut payload_params: Vec<(String, ParamValue)> = Vec::new();
        for binding in &call.params {
            let value = invocation.args.get(&binding.name).cloned().unwrap_or(ParamValue::Null);
            match &binding.kind {
                ParamKind::Path(_) => {}
                ParamKind::Query(key) => {
                    query.extend(value.values().into_iter().map(|v| (key.clone(), v)));
                }
                ParamKind::Form(key) => {
                    form.extend(value.values().into_iter().map(|v| (key.clone(), v)));
                }
                ParamKind::Header(key) => {
                    if let Some(v) = value.as_text() {
                        headers.push((key.clone(), v));
                    }
                }
                ParamKind::Payload(key) => payload_params.push((key.clone(), value)),
            }
        }

        if let Some(content_type) = call.produces.as_ref().or(api.produces.as_ref()) {
            headers.push(("Content-Type".to_string(), content_type.clone()));
        }
        if let Some(accept) = call.consumes.as_ref().or(api.consumes.as_ref()) {
            headers.push(("Accept".to_string(), accept.clone()));
        }

        // options
        let mut string_payload: Option<String> = None;
        for options in &invocation.options {
            headers.extend(options.headers.iter().cloned());
            query.extend(options.query_params.iter().cloned());
            form.extend(options.form_params.iter().cloned());
            if let Some(suffix) = &options.path_suffix {
                uri = uri.append_path(suffix);
            }
            if let Some(p) = &options.payload {
                string_payload = Some(p.clone());
            }
        }

        let replace = |pairs: Vec<(String, String)>| -> Result<Vec<(String, String)>> {
            pairs
                .into_iter()
                .map(|(k, v)| Ok((k, replace_tokens(&v, &tokens)?)))
                .collect()
        };
        let query = replace(query)?;
        let form = replace(form)?;
        let headers = replace(headers)?;

        let mut all_query = uri.query_pairs().to_vec();
        all_query.extend(query);
        let url = uri.query(all_query).literal_query(true).build(&tokens)?;

        // payload
        let method = call.method;
        let mut payload = if let Some(p) = string_payload {
            Some(Payload::from_string(p))
        } else if let Some(p) = invocation.payload.clone() {
            Some(p)
        } else if !form.is_empty() {
            Some(Payload::url_encoded_form(&form))
        } else {
            None
        };
        if let Some(binder) = &call.binder {
            if !payload_params.is_empty() {
                payload = Some(binder.bind(&payload_params)?);
            }
        }

        let mut builder = HttpRequest::builder().method(method).endpoint(url.clone());
        for (name, value) in headers {
            builder = builder.header(name, value);
        }

        if api.virtual_host || call.virtual_host {
            if let Some(host) = url.host_str() {
                let host = match url.port() {
                    Some(port) => format!("{}:{}", host, port),
                    None => host.to_string(),
                };
                builder = builder.replace_header("Host", host);
            }
        }

        // filters
        let mut filters: Vec<Arc<dyn RequestFilter>> = if call.override_filters {
            Vec::new()
        } else {
            api.filters.clone()
        };
        filters.extend(call.filters.iter().cloned());
        if self.strip_expect_header {
            filters.push(Arc::new(StripExpectHeader));
        }

        builder.payload(payload).filters(filters).build()
    }

    fn resolve_endpoint(&self, invocation: &Invocation<'_>) -> Result<Url> {
        if let Some(explicit) = &invocation.endpoint {
            return Ok(explicit.clone());
        }
        let named = invocation
            .call
            .endpoint
            .as_ref()
            .or(invocation.api.endpoint.as_ref())
            .and_then(|name| self.endpoints.get(name));
        if let Some(value) = named {
            return match &self.default_endpoint {
                Some(base) => add_host_if_missing(value, base),
                None => Ok(Url::parse(value)?),
            };
        }
        self.default_endpoint
            .clone()
            .ok_or_else(|| Error::NoSuchElement(format!("no endpoint found for {}", invocation)))
    }
}

fn replace_tokens(value: &str, tokens: &HashMap<String, String>) -> Result<String> {
    if !value.contains('{') {
        return Ok(value.to_string());
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = &rest[open + 1..open + close];
        match tokens.get(name) {
            Some(v) => out.push_str(v),
            // not a token: keep the literal text
            None => out.push_str(&rest[open..=open + close]),
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::filters::BearerToken;
    use crate::http::request::Method;
    use crate::rest::binders::Binder;
    use crate::rest::descriptor::{ApiDescriptor, CallDescriptor};
    use crate::rest::options::RequestOptions;
    use serde_json::json;

    fn processor() -> RestProcessor {
        RestProcessor::new(Some(Url::parse("https://compute.example.com/v2/tenant").unwrap()))
            .with_api_version("1.1")
    }

    fn server_api() -> ApiDescriptor {
        ApiDescriptor::new("ServerApi")
            .consumes("application/json")
            .query_param("format", "json")
    }

    #[test]
    fn test_path_query_and_headers() {
        let api = server_api();
        let call = CallDescriptor::new("list", Method::Get, "/servers/{id}/ips")
            .path_param("id", "id")
            .query("names", "name")
            .header("X-Api-Version", "{api-version}");
        let invocation = Invocation::new(&api, &call)
            .arg("id", "42")
            .arg("names", vec!["a".to_string(), "b".to_string()]);

        let request = processor().create_request(&invocation).unwrap();
        assert_eq!(
            request.endpoint().as_str(),
            "https://compute.example.com/v2/tenant/servers/42/ips?format=json&name=a&name=b"
        );
        assert_eq!(request.first_header("Accept"), Some("application/json"));
        assert_eq!(request.first_header("X-Api-Version"), Some("1.1"));
        assert!(request.payload().is_none());
    }

    #[test]
    fn test_missing_required_param() {
        let api = server_api();
        let call = CallDescriptor::new("get", Method::Get, "/servers/{id}").path_param("id", "id");
        let err = processor().create_request(&Invocation::new(&api, &call)).unwrap_err();
        assert_eq!(err.to_string(), "param{id} for invocation ServerApi.get");
    }

    #[test]
    fn test_endpoint_resolution_order() {
        let api = ApiDescriptor::new("StorageApi").endpoint("storage");
        let call = CallDescriptor::new("list", Method::Get, "/containers");
        let processor = processor().with_endpoint("storage", "/swift/v1");

        let request = processor.create_request(&Invocation::new(&api, &call)).unwrap();
        assert_eq!(request.endpoint().as_str(), "https://compute.example.com/swift/v1/containers");

        let explicit = Url::parse("https://other.example.com/x").unwrap();
        let request = processor
            .create_request(&Invocation::new(&api, &call).endpoint(explicit))
            .unwrap();
        assert_eq!(request.endpoint().as_str(), "https://other.example.com/x/containers");

        let err = RestProcessor::default()
            .create_request(&Invocation::new(&api, &call))
            .unwrap_err();
        assert_eq!(err.to_string(), "no endpoint found for StorageApi.list");
    }

    #[test]
    fn test_form_params_make_payload() {
        let api = ApiDescriptor::new("InstanceApi").form_param("Version", "{api-version}");
        let call = CallDescriptor::new("run", Method::Post, "/")
            .form_param("Action", "RunInstances")
            .form("image", "ImageId");
        let request = processor()
            .create_request(&Invocation::new(&api, &call).arg("image", "ami-1"))
            .unwrap();
        let payload = request.payload().unwrap();
        assert_eq!(payload.as_str(), Some("Version=1.1&Action=RunInstances&ImageId=ami-1"));
        assert_eq!(
            payload.metadata.content_type.as_deref(),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn test_binder_and_produces() {
        let api = server_api();
        let call = CallDescriptor::new("create", Method::Post, "/servers")
            .produces("application/json")
            .payload_param("name", "name")
            .payload_param("flavor", "flavorRef")
            .binder(Binder::JsonPayloadWrappedWith("server".into()));
        let request = processor()
            .create_request(&Invocation::new(&api, &call).arg("name", "web").arg("flavor", "1"))
            .unwrap();
        let payload = request.payload().unwrap();
        let body: serde_json::Value = serde_json::from_slice(payload.as_bytes()).unwrap();
        assert_eq!(body, json!({"server": {"name": "web", "flavorRef": "1"}}));
        assert_eq!(payload.metadata.content_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn test_options_and_virtual_host() {
        let api = ApiDescriptor::new("BucketApi").virtual_host();
        let call = CallDescriptor::new("put", Method::Put, "/");
        let options = RequestOptions::new()
            .header("x-amz-acl", "public-read")
            .query_param("acl", "")
            .path_suffix("photos")
            .payload("<CreateBucketConfiguration/>");
        let request = RestProcessor::new(Some(Url::parse("https://s3.amazonaws.com:8443").unwrap()))
            .create_request(&Invocation::new(&api, &call).options(options))
            .unwrap();
        assert_eq!(request.endpoint().path(), "/photos");
        assert_eq!(request.first_header("Host"), Some("s3.amazonaws.com:8443"));
        assert_eq!(request.first_header("x-amz-acl"), Some("public-read"));
        assert_eq!(request.payload().unwrap().as_str(), Some("<CreateBucketConfiguration/>"));
    }

    #[test]
    fn test_filter_override_and_strip_expect() {
        let api = ApiDescriptor::new("Api").filter(Arc::new(BearerToken::new("a")));
        let normal = CallDescriptor::new("x", Method::Get, "/x");
        let overridden = CallDescriptor::new("y", Method::Get, "/y")
            .filter(Arc::new(BearerToken::new("b")))
            .override_filters();
        let processor = processor().with_strip_expect_header(true);

        let request = processor.create_request(&Invocation::new(&api, &normal)).unwrap();
        assert_eq!(request.filters().len(), 2);

        let request = processor.create_request(&Invocation::new(&api, &overridden)).unwrap();
        assert_eq!(request.filters().len(), 2);
        let filtered = request.apply_filters().unwrap();
        assert_eq!(filtered.first_header("Authorization"), Some("Bearer b"));
    }

    #[test]
    fn test_content_type_on_body_method_without_payload() {
        let api = server_api();
        let call = CallDescriptor::new("reboot", Method::Post, "/servers/1/action").produces("application/json");
        let request = processor().create_request(&Invocation::new(&api, &call)).unwrap();
        let payload = request.payload().unwrap();
        assert!(payload.is_empty());
        assert_eq!(payload.metadata.content_type.as_deref(), Some("application/json"));
    }
}
