//! Payload binders

use std::collections::BTreeMap;

use super::descriptor::ParamValue;
use crate::error::{Error, Result};
use crate::http::request::Payload;

/// Builds a request body from the payload parameters of a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binder {
    /// A single payload parameter is serialized as is; several become an object
    JsonPayload,
    /// Like `JsonPayload`, wrapped in `{ "<key>": ... }`
    JsonPayloadWrappedWith(String),
    /// Expand `{name}` references in a string template
    MapToStringPayload(String),
}

impl Binder {
    /// `params` keyed by payload key, in declaration order.
    pub fn bind(&self, params: &[(String, ParamValue)]) -> Result<Payload> {
        match self {
            Binder::JsonPayload => Payload::from_json(&json_body(params)),
            Binder::JsonPayloadWrappedWith(key) => {
                let mut wrapper = serde_json::Map::new();
                wrapper.insert(key.clone(), json_body(params));
                Payload::from_json(&serde_json::Value::Object(wrapper))
            }
            Binder::MapToStringPayload(template) => {
                let values: BTreeMap<&str, String> = params
                    .iter()
                    .filter_map(|(k, v)| v.as_text().map(|t| (k.as_str(), t)))
                    .collect();
                Ok(Payload::from_string(expand_template(template, &values)?))
            }
        }
    }
}

fn json_body(params: &[(String, ParamValue)]) -> serde_json::Value {
    let present: Vec<&(String, ParamValue)> = params.iter().filter(|(_, v)| !v.is_null()).collect();
    if let [(_, single)] = present.as_slice() {
        return single.to_json();
    }
    let object = present
        .into_iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect::<serde_json::Map<_, _>>();
    serde_json::Value::Object(object)
}

fn expand_template(template: &str, values: &BTreeMap<&str, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = &rest[open + 1..open + close];
        let value = values.get(name).ok_or_else(|| {
            Error::illegal_argument(format!(
                "no value for {{{}}} in payload template {}",
                name, template
            ))
        })?;
        out.push_str(value);
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
