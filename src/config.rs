//! Configuration Management
//!
//! Two layers: `Properties`, the flat key/value set a context is built from,
//! and `Config`, the persisted user settings under the config directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

/// Prefix of properties that apply to every provider.
pub const GLOBAL_PREFIX: &str = "multicloud";

/// Well-known property keys
pub mod keys {
    pub const ENDPOINT: &str = "endpoint";
    pub const IDENTITY: &str = "identity";
    pub const CREDENTIAL: &str = "credential";
    pub const API: &str = "api";
    pub const API_VERSION: &str = "api-version";
    pub const BUILD_VERSION: &str = "build-version";
    pub const ISO3166_CODES: &str = "iso3166-codes";
    pub const MAX_RETRIES: &str = "max-retries";
    pub const RETRY_DELAY_START: &str = "retry-delay-start";
    pub const MAX_REDIRECTS: &str = "max-redirects";
    pub const SO_TIMEOUT: &str = "so-timeout";
    pub const CONNECTION_TIMEOUT: &str = "connection-timeout";
    pub const STRIP_EXPECT_HEADER: &str = "strip-expect-header";
    pub const USER_AGENT: &str = "user-agent";
    pub const TIMEOUT_NODE_RUNNING: &str = "timeout.node-running";
    pub const TIMEOUT_NODE_TERMINATED: &str = "timeout.node-terminated";
    pub const TIMEOUT_NODE_SUSPENDED: &str = "timeout.node-suspended";
    pub const POLL_PERIOD: &str = "poll-period";
}

/// Defaults applied under the global prefix when a context is built.
pub fn default_properties() -> Properties {
    let mut props = Properties::new();
    props.set(global_key(keys::MAX_RETRIES), "5");
    props.set(global_key(keys::RETRY_DELAY_START), "50");
    props.set(global_key(keys::MAX_REDIRECTS), "5");
    props.set(global_key(keys::SO_TIMEOUT), "60000");
    props.set(global_key(keys::CONNECTION_TIMEOUT), "60000");
    props.set(global_key(keys::STRIP_EXPECT_HEADER), "false");
    props.set(
        global_key(keys::USER_AGENT),
        concat!("multicloud/", env!("CARGO_PKG_VERSION")),
    );
    props.set(global_key(keys::TIMEOUT_NODE_RUNNING), "1200000");
    props.set(global_key(keys::TIMEOUT_NODE_TERMINATED), "30000");
    props.set(global_key(keys::TIMEOUT_NODE_SUSPENDED), "120000");
    props.set(global_key(keys::POLL_PERIOD), "50");
    props
}

fn global_key(key: &str) -> String {
    format!("{}.{}", GLOBAL_PREFIX, key)
}

// =============================================================================
// Properties
// =============================================================================

/// Ordered string map of context settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load properties from a YAML mapping of scalars.
    pub fn from_yaml_str(yaml: &str) -> crate::error::Result<Self> {
        let raw: BTreeMap<String, serde_yaml::Value> = serde_yaml::from_str(yaml)?;
        let mut props = Self::new();
        for (key, value) in raw {
            let value = match value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Null => String::new(),
                other => {
                    return Err(Error::Config(format!(
                        "property {} must be a scalar, got {:?}",
                        key, other
                    )))
                }
            };
            props.set(key, value);
        }
        Ok(props)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
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

    /// Copy every entry of `other` over this set.
    pub fn extend(&mut self, other: &Properties) {
        for (k, v) in other.iter() {
            self.set(k, v);
        }
    }

    /// Resolve `<provider>.<key>`, falling back to `multicloud.<key>`.
    /// Both forms are removed so later scans don't see them again.
    pub fn take_scoped(&mut self, provider: &str, key: &str) -> Option<String> {
        let scoped = self.entries.remove(&format!("{}.{}", provider, key));
        let global = self.entries.remove(&global_key(key));
        scoped.or(global)
    }

    /// Like [`Properties::take_scoped`] but the key must be present.
    pub fn require_scoped(&mut self, provider: &str, key: &str) -> crate::error::Result<String> {
        let listing = self.listing();
        self.take_scoped(provider, key).ok_or_else(|| {
            Error::NoSuchElement(format!(
                "property {}.{} not present in properties: {}",
                provider, key, listing
            ))
        })
    }

    /// Non-destructive scoped lookup.
    pub fn get_scoped(&self, provider: &str, key: &str) -> Option<&str> {
        self.get(&format!("{}.{}", provider, key))
            .or_else(|| self.get(&global_key(key)))
    }

    pub fn get_u64(&self, provider: &str, key: &str) -> crate::error::Result<Option<u64>> {
        self.get_scoped(provider, key)
            .map(|v| {
                v.trim().parse::<u64>().map_err(|_| {
                    Error::Config(format!("{}.{} value {} is not an integer", provider, key, v))
                })
            })
            .transpose()
    }

    pub fn get_bool(&self, provider: &str, key: &str) -> crate::error::Result<Option<bool>> {
        self.get_scoped(provider, key)
            .map(|v| match v.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(Error::Config(format!(
                    "{}.{} value {} is not a boolean",
                    provider, key, v
                ))),
            })
            .transpose()
    }

    /// Millisecond setting as a `Duration`, with a default.
    pub fn get_millis(&self, provider: &str, key: &str, default: u64) -> crate::error::Result<Duration> {
        Ok(Duration::from_millis(self.get_u64(provider, key)?.unwrap_or(default)))
    }

    fn listing(&self) -> String {
        let pairs: Vec<String> = self.entries.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        format!("{{{}}}", pairs.join(", "))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut props = Self::new();
        for (k, v) in iter {
            props.set(k, v);
        }
        props
    }
}

// =============================================================================
// Persisted user settings
// =============================================================================

/// Per-provider defaults remembered between sessions
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProviderSettings {
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Provider used when none is named
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Settings keyed by provider id
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("multicloud").join("config.json"))
    }

    /// Load configuration from the default location
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from `path`, falling back to defaults when the file
    /// is missing or unreadable.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }

    /// Stored settings for `provider` as scoped properties.
    pub fn to_properties(&self, provider: &str) -> Properties {
        let mut props = Properties::new();
        if let Some(settings) = self.providers.get(provider) {
            if let Some(identity) = &settings.identity {
                props.set(format!("{}.{}", provider, keys::IDENTITY), identity.clone());
            }
            if let Some(endpoint) = &settings.endpoint {
                props.set(format!("{}.{}", provider, keys::ENDPOINT), endpoint.clone());
            }
            if let Some(version) = &settings.api_version {
                props.set(format!("{}.{}", provider, keys::API_VERSION), version.clone());
            }
        }
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_lookup_prefers_provider() {
        let mut props: Properties = [
            ("aws-ec2.endpoint", "https://ec2.us-east-1.amazonaws.com"),
            ("multicloud.endpoint", "https://fallback"),
            ("multicloud.api-version", "2010-06-15"),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            props.take_scoped("aws-ec2", "endpoint").as_deref(),
            Some("https://ec2.us-east-1.amazonaws.com")
        );
        // both forms are consumed
        assert!(!props.contains_key("multicloud.endpoint"));
        assert_eq!(props.take_scoped("aws-ec2", "api-version").as_deref(), Some("2010-06-15"));
        assert!(props.is_empty());
    }

    #[test]
    fn test_require_scoped_missing() {
        let mut props: Properties = [("stub.identity", "me")].into_iter().collect();
        let err = props.require_scoped("stub", "endpoint").unwrap_err();
        assert_eq!(
            err.to_string(),
            "property stub.endpoint not present in properties: {stub.identity=me}"
        );
    }

    #[test]
    fn test_typed_getters() {
        let props: Properties = [
            ("multicloud.max-retries", "3"),
            ("stub.strip-expect-header", "TRUE"),
            ("stub.so-timeout", "soon"),
        ]
        .into_iter()
        .collect();

        assert_eq!(props.get_u64("stub", keys::MAX_RETRIES).unwrap(), Some(3));
        assert_eq!(props.get_bool("stub", keys::STRIP_EXPECT_HEADER).unwrap(), Some(true));
        assert!(matches!(
            props.get_u64("stub", keys::SO_TIMEOUT),
            Err(Error::Config(_))
        ));
        assert_eq!(props.get_u64("stub", keys::MAX_REDIRECTS).unwrap(), None);
    }

    #[test]
    fn test_from_yaml() {
        let props = Properties::from_yaml_str(
            "vcloud.endpoint: https://vcloud.example.com/api\nmulticloud.max-retries: 2\nvcloud.strip-expect-header: true\n",
        )
        .unwrap();
        assert_eq!(props.get("multicloud.max-retries"), Some("2"));
        assert_eq!(props.get("vcloud.strip-expect-header"), Some("true"));

        assert!(Properties::from_yaml_str("a: [1, 2]").is_err());
    }

    #[test]
    fn test_config_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.default_provider = Some("stub".into());
        config.providers.insert(
            "stub".into(),
            ProviderSettings {
                identity: Some("alice".into()),
                endpoint: Some("https://stub.local".into()),
                api_version: None,
            },
        );
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded, config);

        let props = loaded.to_properties("stub");
        assert_eq!(props.get("stub.identity"), Some("alice"));
        assert_eq!(props.get("stub.endpoint"), Some("https://stub.local"));
        assert!(loaded.to_properties("other").is_empty());
    }

    #[test]
    fn test_load_missing_or_malformed_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        assert_eq!(Config::load_from(&path), Config::default());

        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }
}
