//! Declarative descriptions of API calls
//!
//! An [`ApiDescriptor`] holds what every call of one API shares; a
//! [`CallDescriptor`] describes a single operation. An [`Invocation`] pairs a
//! call with its argument values.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

use super::binders::Binder;
use super::options::RequestOptions;
use crate::http::filters::RequestFilter;
use crate::http::request::{Method, Payload};

/// Argument value of a call parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Str(String),
    List(Vec<String>),
    Json(serde_json::Value),
    Null,
}

impl ParamValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    /// Every value as text; lists expand, null is empty
    pub fn values(&self) -> Vec<String> {
        match self {
            ParamValue::Str(s) => vec![s.clone()],
            ParamValue::List(l) => l.clone(),
            ParamValue::Json(serde_json::Value::String(s)) => vec![s.clone()],
            ParamValue::Json(v) => vec![v.to_string()],
            ParamValue::Null => Vec::new(),
        }
    }

    /// Single text value (lists joined with `,`)
    pub fn as_text(&self) -> Option<String> {
        match self {
            ParamValue::Null => None,
            ParamValue::List(l) => Some(l.join(",")),
            other => other.values().into_iter().next(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ParamValue::Str(s) => serde_json::Value::String(s.clone()),
            ParamValue::List(l) => serde_json::Value::from(l.clone()),
            ParamValue::Json(v) => v.clone(),
            ParamValue::Null => serde_json::Value::Null,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(l: Vec<String>) -> Self {
        ParamValue::List(l)
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(v: serde_json::Value) -> Self {
        ParamValue::Json(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

/// Where an argument ends up in the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    /// `{key}` in the path template
    Path(String),
    Query(String),
    Form(String),
    Header(String),
    /// Input to the call's binder
    Payload(String),
}

impl ParamKind {
    pub fn key(&self) -> &str {
        match self {
            ParamKind::Path(k)
            | ParamKind::Query(k)
            | ParamKind::Form(k)
            | ParamKind::Header(k)
            | ParamKind::Payload(k) => k,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamBinding {
    /// Argument name in the invocation
    pub name: String,
    pub kind: ParamKind,
    pub nullable: bool,
}

// =============================================================================
// Api level
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct ApiDescriptor {
    pub name: String,
    pub base_path: String,
    pub query_params: Vec<(String, String)>,
    pub form_params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub produces: Option<String>,
    pub consumes: Option<String>,
    pub filters: Vec<Arc<dyn RequestFilter>>,
    pub virtual_host: bool,
    pub skip_encoding: Option<String>,
    /// Named endpoint, resolved through the processor
    pub endpoint: Option<String>,
}

impl ApiDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn base_path(mut self, path: impl Into<String>) -> Self {
        self.base_path = path.into();
        self
    }

    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    pub fn form_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form_params.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn produces(mut self, content_type: impl Into<String>) -> Self {
        self.produces = Some(content_type.into());
        self
    }

    pub fn consumes(mut self, accept: impl Into<String>) -> Self {
        self.consumes = Some(accept.into());
        self
    }

    pub fn filter(mut self, filter: Arc<dyn RequestFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn virtual_host(mut self) -> Self {
        self.virtual_host = true;
        self
    }

    pub fn skip_encoding(mut self, chars: impl Into<String>) -> Self {
        self.skip_encoding = Some(chars.into());
        self
    }

    pub fn endpoint(mut self, name: impl Into<String>) -> Self {
        self.endpoint = Some(name.into());
        self
    }
}

// =============================================================================
// Call level
// =============================================================================

#[derive(Debug, Clone)]
pub struct CallDescriptor {
    pub name: String,
    pub method: Method,
    pub path: String,
    pub query_params: Vec<(String, String)>,
    pub form_params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub params: Vec<ParamBinding>,
    pub produces: Option<String>,
    pub consumes: Option<String>,
    pub filters: Vec<Arc<dyn RequestFilter>>,
    pub override_filters: bool,
    pub binder: Option<Binder>,
    pub endpoint: Option<String>,
    pub virtual_host: bool,
}

impl CallDescriptor {
    pub fn new(name: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            path: path.into(),
            query_params: Vec::new(),
            form_params: Vec::new(),
            headers: Vec::new(),
            params: Vec::new(),
            produces: None,
            consumes: None,
            filters: Vec::new(),
            override_filters: false,
            binder: None,
            endpoint: None,
            virtual_host: false,
        }
    }

    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    pub fn form_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.form_params.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn param(mut self, name: &str, kind: ParamKind, nullable: bool) -> Self {
        self.params.push(ParamBinding {
            name: name.to_string(),
            kind,
            nullable,
        });
        self
    }

    /// Required path parameter bound to `{key}`
    pub fn path_param(self, name: &str, key: &str) -> Self {
        self.param(name, ParamKind::Path(key.to_string()), false)
    }

    pub fn query(self, name: &str, key: &str) -> Self {
        self.param(name, ParamKind::Query(key.to_string()), false)
    }

    pub fn optional_query(self, name: &str, key: &str) -> Self {
        self.param(name, ParamKind::Query(key.to_string()), true)
    }

    pub fn form(self, name: &str, key: &str) -> Self {
        self.param(name, ParamKind::Form(key.to_string()), false)
    }

    pub fn optional_form(self, name: &str, key: &str) -> Self {
        self.param(name, ParamKind::Form(key.to_string()), true)
    }

    pub fn header_param(self, name: &str, key: &str) -> Self {
        self.param(name, ParamKind::Header(key.to_string()), false)
    }

    pub fn payload_param(self, name: &str, key: &str) -> Self {
        self.param(name, ParamKind::Payload(key.to_string()), false)
    }

    pub fn optional_payload_param(self, name: &str, key: &str) -> Self {
        self.param(name, ParamKind::Payload(key.to_string()), true)
    }

    pub fn produces(mut self, content_type: impl Into<String>) -> Self {
        self.produces = Some(content_type.into());
        self
    }

    pub fn consumes(mut self, accept: impl Into<String>) -> Self {
        self.consumes = Some(accept.into());
        self
    }

    pub fn filter(mut self, filter: Arc<dyn RequestFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Call filters replace the api filters instead of following them
    pub fn override_filters(mut self) -> Self {
        self.override_filters = true;
        self
    }

    pub fn binder(mut self, binder: Binder) -> Self {
        self.binder = Some(binder);
        self
    }

    pub fn endpoint(mut self, name: impl Into<String>) -> Self {
        self.endpoint = Some(name.into());
        self
    }

    pub fn virtual_host(mut self) -> Self {
        self.virtual_host = true;
        self
    }
}

// =============================================================================
// Invocation
// =============================================================================

/// A call with its argument values
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    pub api: &'a ApiDescriptor,
    pub call: &'a CallDescriptor,
    pub args: HashMap<String, ParamValue>,
    pub options: Vec<RequestOptions>,
    pub endpoint: Option<Url>,
    pub payload: Option<Payload>,
}

impl<'a> Invocation<'a> {
    pub fn new(api: &'a ApiDescriptor, call: &'a CallDescriptor) -> Self {
        Self {
            api,
            call,
            args: HashMap::new(),
            options: Vec::new(),
            endpoint: None,
            payload: None,
        }
    }

    pub fn arg(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.args.insert(name.to_string(), value.into());
        self
    }

    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options.push(options);
        self
    }

    /// Explicit endpoint, taking precedence over named and default ones
    pub fn endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn value(&self, name: &str) -> Option<&ParamValue> {
        self.args.get(name).filter(|v| !v.is_null())
    }
}

impl fmt::Display for Invocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.api.name, self.call.name)
    }
}
