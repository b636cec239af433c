//! Provider registry - api and provider metadata loaded from embedded JSON
//!
//! An *api* describes a wire protocol (endpoint shape, version, credential
//! names); a *provider* is a concrete deployment of an api with its own
//! endpoint and ISO-3166 codes. Provider entries inherit whatever they don't
//! set from their api.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use crate::config::{keys, Properties, GLOBAL_PREFIX};
use crate::error::{Error, Result};

/// Embedded registry (compiled into the binary)
const REGISTRY_JSON: &str = include_str!("../resources/providers.json");

/// Portable views an api can back
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Compute,
    BlobStore,
    Dns,
    LoadBalancer,
    Queue,
}

impl View {
    pub fn as_str(self) -> &'static str {
        match self {
            View::Compute => "compute",
            View::BlobStore => "blobstore",
            View::Dns => "dns",
            View::LoadBalancer => "loadbalancer",
            View::Queue => "queue",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How requests are signed with the context credentials
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    #[default]
    None,
    Basic,
    /// The credential is sent as a pre-issued token
    Bearer,
}

/// Api definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ApiDef {
    pub name: String,
    pub endpoint: String,
    pub api_version: String,
    #[serde(default)]
    pub build_version: Option<String>,
    /// What the identity means to this api; absent when none is needed
    #[serde(default)]
    pub identity_name: Option<String>,
    #[serde(default)]
    pub credential_name: Option<String>,
    #[serde(default)]
    pub auth: AuthScheme,
    #[serde(default)]
    pub views: Vec<View>,
}

/// Provider definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderDef {
    pub name: String,
    pub api: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub iso3166_codes: Vec<String>,
}

/// Full registry
#[derive(Debug, Clone, Deserialize)]
pub struct Registry {
    pub apis: BTreeMap<String, ApiDef>,
    pub providers: BTreeMap<String, ProviderDef>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Get the registry (parses the embedded JSON on first access)
pub fn get_registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        serde_json::from_str(REGISTRY_JSON)
            .unwrap_or_else(|e| panic!("Failed to parse embedded provider registry: {}", e))
    })
}

pub fn get_api(id: &str) -> Option<&'static ApiDef> {
    get_registry().apis.get(id)
}

pub fn get_provider(id: &str) -> Option<&'static ProviderDef> {
    get_registry().providers.get(id)
}

pub fn provider_ids() -> Vec<&'static str> {
    get_registry().providers.keys().map(String::as_str).collect()
}

pub fn api_ids() -> Vec<&'static str> {
    get_registry().apis.keys().map(String::as_str).collect()
}

// =============================================================================
// Resolved metadata
// =============================================================================

/// A provider or bare api with the api defaults filled in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMetadata {
    pub id: String,
    pub name: String,
    pub api: String,
    pub endpoint: String,
    pub api_version: String,
    pub build_version: Option<String>,
    pub identity_name: Option<String>,
    pub credential_name: Option<String>,
    pub auth: AuthScheme,
    pub iso3166_codes: Vec<String>,
    pub views: Vec<View>,
}

impl ProviderMetadata {
    /// Look `id` up among providers, then apis.
    pub fn lookup(id: &str) -> Result<Self> {
        if let Some(provider) = get_provider(id) {
            let api = get_api(&provider.api).ok_or_else(|| {
                Error::Config(format!("provider {} refers to unknown api {}", id, provider.api))
            })?;
            return Ok(Self {
                id: id.to_string(),
                name: provider.name.clone(),
                api: provider.api.clone(),
                endpoint: provider.endpoint.clone().unwrap_or_else(|| api.endpoint.clone()),
                api_version: provider.api_version.clone().unwrap_or_else(|| api.api_version.clone()),
                build_version: api.build_version.clone(),
                identity_name: api.identity_name.clone(),
                credential_name: api.credential_name.clone(),
                auth: api.auth,
                iso3166_codes: provider.iso3166_codes.clone(),
                views: api.views.clone(),
            });
        }
        if let Some(api) = get_api(id) {
            return Ok(Self {
                id: id.to_string(),
                name: api.name.clone(),
                api: id.to_string(),
                endpoint: api.endpoint.clone(),
                api_version: api.api_version.clone(),
                build_version: api.build_version.clone(),
                identity_name: api.identity_name.clone(),
                credential_name: api.credential_name.clone(),
                auth: api.auth,
                iso3166_codes: Vec::new(),
                views: api.views.clone(),
            });
        }
        Err(Error::NoSuchElement(format!(
            "key [{}] not in the list of providers or apis: {{providers=[{}], apis=[{}]}}",
            id,
            provider_ids().join(", "),
            api_ids().join(", ")
        )))
    }

    pub fn supports(&self, view: View) -> bool {
        self.views.contains(&view)
    }

    /// Registry defaults as global properties, the lowest layer a context
    /// resolves from.
    pub fn default_properties(&self) -> Properties {
        let global = |key: &str| format!("{}.{}", GLOBAL_PREFIX, key);
        let mut props = Properties::new();
        props.set(global(keys::ENDPOINT), self.endpoint.clone());
        props.set(global(keys::API), self.api.clone());
        props.set(global(keys::API_VERSION), self.api_version.clone());
        if let Some(build) = &self.build_version {
            props.set(global(keys::BUILD_VERSION), build.clone());
        }
        if !self.iso3166_codes.is_empty() {
            props.set(global(keys::ISO3166_CODES), self.iso3166_codes.join(","));
        }
        props
    }
}
