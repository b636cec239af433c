//! Portable compute domain
//!
//! Provider adapters convert their own objects into these types so that the
//! compute service and the template builder can work across providers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

// =============================================================================
// Locations
// =============================================================================

/// How wide a location is. Ordered from widest to narrowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationScope {
    Provider,
    Region,
    Zone,
    Host,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub description: String,
    pub scope: LocationScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<Location>>,
    #[serde(default)]
    pub iso3166_codes: BTreeSet<String>,
}

impl Location {
    pub fn new(scope: LocationScope, id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            scope,
            parent: None,
            iso3166_codes: BTreeSet::new(),
        }
    }

    pub fn with_parent(mut self, parent: Location) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    pub fn with_iso3166_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.iso3166_codes = codes.into_iter().map(Into::into).collect();
        self
    }

    /// This location followed by its parents, narrowest first.
    pub fn ancestry(&self) -> impl Iterator<Item = &Location> {
        std::iter::successors(Some(self), |l| l.parent.as_deref())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[id={}, scope={:?}, description={}]", self.id, self.scope, self.description)
    }
}

// =============================================================================
// Operating systems and images
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    #[default]
    Unrecognized,
    Ubuntu,
    Debian,
    Centos,
    Rhel,
    Fedora,
    Suse,
    Amzn,
    Oel,
    Gentoo,
    Arch,
    Freebsd,
    Solaris,
    Windows,
}

impl OsFamily {
    pub const ALL: &'static [OsFamily] = &[
        OsFamily::Unrecognized,
        OsFamily::Ubuntu,
        OsFamily::Debian,
        OsFamily::Centos,
        OsFamily::Rhel,
        OsFamily::Fedora,
        OsFamily::Suse,
        OsFamily::Amzn,
        OsFamily::Oel,
        OsFamily::Gentoo,
        OsFamily::Arch,
        OsFamily::Freebsd,
        OsFamily::Solaris,
        OsFamily::Windows,
    ];

    pub fn value(&self) -> &'static str {
        match self {
            OsFamily::Unrecognized => "unrecognized",
            OsFamily::Ubuntu => "ubuntu",
            OsFamily::Debian => "debian",
            OsFamily::Centos => "centos",
            OsFamily::Rhel => "rhel",
            OsFamily::Fedora => "fedora",
            OsFamily::Suse => "suse",
            OsFamily::Amzn => "amzn",
            OsFamily::Oel => "oel",
            OsFamily::Gentoo => "gentoo",
            OsFamily::Arch => "arch",
            OsFamily::Freebsd => "freebsd",
            OsFamily::Solaris => "solaris",
            OsFamily::Windows => "windows",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

impl FromStr for OsFamily {
    type Err = Error;

    /// Case-insensitive, so `UBUNTU`, `Ubuntu` and `ubuntu` all parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        OsFamily::ALL
            .iter()
            .copied()
            .find(|f| f.value() == lower)
            .ok_or_else(|| Error::illegal_argument(format!("unknown os family {}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OperatingSystem {
    pub family: OsFamily,
    pub name: Option<String>,
    pub version: Option<String>,
    pub arch: Option<String>,
    pub description: String,
    pub is_64bit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageStatus {
    Available,
    Pending,
    Deleted,
    Error,
    #[default]
    Unrecognized,
}

#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoginCredentials {
    pub user: Option<String>,
    pub password: Option<String>,
    pub private_key: Option<String>,
    pub authenticate_sudo: bool,
}

impl LoginCredentials {
    pub fn for_user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    pub fn with_authenticate_sudo(mut self, sudo: bool) -> Self {
        self.authenticate_sudo = sudo;
        self
    }
}

impl fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("private_key", &self.private_key.as_ref().map(|_| "****"))
            .field("authenticate_sudo", &self.authenticate_sudo)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub provider_id: String,
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub operating_system: OperatingSystem,
    pub location: Option<Location>,
    pub default_credentials: Option<LoginCredentials>,
    pub status: ImageStatus,
}

// =============================================================================
// Hardware
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Processor {
    pub cores: f64,
    /// GHz per core
    pub speed: f64,
}

impl Processor {
    pub fn new(cores: f64, speed: f64) -> Self {
        Self { cores, speed }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VolumeType {
    #[default]
    Local,
    San,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Volume {
    pub id: Option<String>,
    pub volume_type: VolumeType,
    pub size_gb: Option<f64>,
    pub device: Option<String>,
    pub boot_device: bool,
    pub durable: bool,
}

impl Volume {
    pub fn local(size_gb: f64, device: &str, boot_device: bool) -> Self {
        Self {
            size_gb: Some(size_gb),
            device: Some(device.to_string()),
            boot_device,
            ..Default::default()
        }
    }
}

/// Which images a hardware profile can boot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum ImageConstraint {
    #[default]
    Any,
    ImageIds(BTreeSet<String>),
    Is64Bit(bool),
    OsFamilies(Vec<OsFamily>),
    All(Vec<ImageConstraint>),
}

impl ImageConstraint {
    pub fn matches(&self, image: &Image) -> bool {
        match self {
            ImageConstraint::Any => true,
            ImageConstraint::ImageIds(ids) => ids.contains(&image.id),
            ImageConstraint::Is64Bit(is_64bit) => image.operating_system.is_64bit == *is_64bit,
            ImageConstraint::OsFamilies(families) => families.contains(&image.operating_system.family),
            ImageConstraint::All(all) => all.iter().all(|c| c.matches(image)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Hardware {
    pub id: String,
    pub provider_id: String,
    pub name: Option<String>,
    pub processors: Vec<Processor>,
    /// MB
    pub ram: u32,
    pub volumes: Vec<Volume>,
    pub hypervisor: Option<String>,
    pub location: Option<Location>,
    pub supports_image: ImageConstraint,
}

impl Hardware {
    pub fn cores(&self) -> f64 {
        self.processors.iter().map(|p| p.cores).sum()
    }

    pub fn cores_and_speed(&self) -> f64 {
        self.processors.iter().map(|p| p.cores * p.speed).sum()
    }

    pub fn total_disk_gb(&self) -> f64 {
        self.volumes.iter().filter_map(|v| v.size_gb).sum()
    }

    pub fn supports_image(&self, image: &Image) -> bool {
        self.supports_image.matches(image)
    }
}

// =============================================================================
// Nodes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NodeStatus {
    Pending,
    Running,
    Suspended,
    Terminated,
    Error,
    #[default]
    Unrecognized,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Pending => "PENDING",
            NodeStatus::Running => "RUNNING",
            NodeStatus::Suspended => "SUSPENDED",
            NodeStatus::Terminated => "TERMINATED",
            NodeStatus::Error => "ERROR",
            NodeStatus::Unrecognized => "UNRECOGNIZED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub id: String,
    pub provider_id: String,
    pub name: Option<String>,
    pub hostname: Option<String>,
    pub group: Option<String>,
    pub location: Option<Location>,
    pub image_id: Option<String>,
    pub hardware: Option<Hardware>,
    pub operating_system: Option<OperatingSystem>,
    pub status: NodeStatus,
    pub backend_status: Option<String>,
    pub login_port: u16,
    pub public_addresses: BTreeSet<String>,
    pub private_addresses: BTreeSet<String>,
    pub credentials: Option<LoginCredentials>,
    pub tags: BTreeSet<String>,
    pub user_metadata: BTreeMap<String, String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Provisioning options carried by a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateOptions {
    pub inbound_ports: Vec<u16>,
    pub run_script: Option<String>,
    pub login_user: Option<String>,
    pub authenticate_sudo: Option<bool>,
    pub tags: BTreeSet<String>,
    pub user_metadata: BTreeMap<String, String>,
    /// Explicit names for the nodes; generated when empty or exhausted.
    pub node_names: Vec<String>,
    pub block_until_running: bool,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            inbound_ports: vec![22],
            run_script: None,
            login_user: None,
            authenticate_sudo: None,
            tags: BTreeSet::new(),
            user_metadata: BTreeMap::new(),
            node_names: Vec::new(),
            block_until_running: true,
        }
    }
}

impl TemplateOptions {
    pub fn inbound_ports(mut self, ports: &[u16]) -> Self {
        self.inbound_ports = ports.to_vec();
        self
    }

    pub fn run_script(mut self, script: impl Into<String>) -> Self {
        self.run_script = Some(script.into());
        self
    }

    pub fn login_user(mut self, user: impl Into<String>) -> Self {
        self.login_user = Some(user.into());
        self
    }

    pub fn authenticate_sudo(mut self, sudo: bool) -> Self {
        self.authenticate_sudo = Some(sudo);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn user_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_metadata.insert(key.into(), value.into());
        self
    }

    pub fn node_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.node_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn block_until_running(mut self, block: bool) -> Self {
        self.block_until_running = block;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub image: Image,
    pub hardware: Hardware,
    pub location: Location,
    pub options: TemplateOptions,
}
