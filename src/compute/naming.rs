//! Encoding groups into node names

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};

fn group_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9-]+$").expect("static regex"))
}

fn unique_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([a-z0-9-]+)-[0-9a-f]{3}$").expect("static regex"))
}

/// Names nodes `<group>-<3 hex>` and shared resources `<prefix>-<group>`.
#[derive(Debug, Clone)]
pub struct GroupNamingConvention {
    shared_prefix: String,
}

impl Default for GroupNamingConvention {
    fn default() -> Self {
        Self {
            shared_prefix: crate::config::GLOBAL_PREFIX.to_string(),
        }
    }
}

impl GroupNamingConvention {
    pub fn with_shared_prefix(prefix: impl Into<String>) -> Self {
        Self {
            shared_prefix: prefix.into(),
        }
    }

    pub fn check_group(&self, group: &str) -> Result<()> {
        if group_pattern().is_match(group) {
            Ok(())
        } else {
            Err(Error::illegal_argument(format!(
                "group name {} must be lowercase and match [a-z0-9-]+",
                group
            )))
        }
    }

    pub fn unique_name_for_group(&self, group: &str) -> Result<String> {
        self.check_group(group)?;
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Ok(format!("{}-{}", group, &suffix[..3]))
    }

    pub fn shared_name_for_group(&self, group: &str) -> Result<String> {
        self.check_group(group)?;
        Ok(format!("{}-{}", self.shared_prefix, group))
    }

    pub fn group_in_unique_name_or_null(&self, name: &str) -> Option<String> {
        unique_name_pattern()
            .captures(name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    pub fn group_in_shared_name_or_null(&self, name: &str) -> Option<String> {
        name.strip_prefix(&self.shared_prefix)
            .and_then(|rest| rest.strip_prefix('-'))
            .filter(|group| group_pattern().is_match(group))
            .map(str::to_string)
    }
}
