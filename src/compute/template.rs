//! Choosing an image, hardware profile and location from loose criteria

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;

use super::domain::{Hardware, Image, Location, OsFamily, Template, TemplateOptions};
use crate::error::{Error, Result};

/// Substring match, or a full match of `pattern` as a regex.
fn matches_pattern(pattern: &str, value: Option<&str>) -> bool {
    let Some(value) = value else {
        return false;
    };
    if value.contains(pattern) {
        return true;
    }
    Regex::new(&format!("^(?:{})$", pattern))
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

/// Natural order with `None` sorting after every value.
fn cmp_nulls_last(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
    }
}

fn image_ordering(a: &Image, b: &Image) -> Ordering {
    let (ao, bo) = (&a.operating_system, &b.operating_system);
    cmp_nulls_last(a.name.as_deref(), b.name.as_deref())
        .then_with(|| cmp_nulls_last(a.version.as_deref(), b.version.as_deref()))
        .then_with(|| cmp_nulls_last(a.description.as_deref(), b.description.as_deref()))
        .then_with(|| cmp_nulls_last(ao.name.as_deref(), bo.name.as_deref()))
        .then_with(|| cmp_nulls_last(ao.version.as_deref(), bo.version.as_deref()))
        .then_with(|| cmp_nulls_last(Some(ao.description.as_str()), Some(bo.description.as_str())))
        .then_with(|| cmp_nulls_last(ao.arch.as_deref(), bo.arch.as_deref()))
}

fn hardware_ordering(a: &Hardware, b: &Hardware) -> Ordering {
    a.cores()
        .total_cmp(&b.cores())
        .then_with(|| a.ram.cmp(&b.ram))
        .then_with(|| a.total_disk_gb().total_cmp(&b.total_disk_gb()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum HardwareSort {
    #[default]
    Smallest,
    Biggest,
    Fastest,
}

/// Builds a [`Template`] from the catalog a compute service loaded.
#[derive(Debug, Clone)]
pub struct TemplateBuilder {
    images: Vec<Image>,
    hardware: Vec<Hardware>,
    locations: Vec<Location>,
    default_location: Option<Location>,

    location_id: Option<String>,
    image_id: Option<String>,
    hardware_id: Option<String>,
    os_family: Option<OsFamily>,
    os_name: Option<String>,
    os_version: Option<String>,
    os_description: Option<String>,
    os_arch: Option<String>,
    os_64bit: Option<bool>,
    image_name: Option<String>,
    image_version: Option<String>,
    image_description: Option<String>,
    hypervisor: Option<String>,
    min_cores: f64,
    min_ram: u32,
    min_disk: f64,
    sort: HardwareSort,
    options: TemplateOptions,
}

impl TemplateBuilder {
    pub fn new(
        images: Vec<Image>,
        hardware: Vec<Hardware>,
        locations: Vec<Location>,
        default_location: Option<Location>,
    ) -> Self {
        Self {
            images,
            hardware,
            locations,
            default_location,
            location_id: None,
            image_id: None,
            hardware_id: None,
            os_family: None,
            os_name: None,
            os_version: None,
            os_description: None,
            os_arch: None,
            os_64bit: None,
            image_name: None,
            image_version: None,
            image_description: None,
            hypervisor: None,
            min_cores: 0.0,
            min_ram: 0,
            min_disk: 0.0,
            sort: HardwareSort::Smallest,
            options: TemplateOptions::default(),
        }
    }

    // =========================================================================
    // Criteria
    // =========================================================================

    pub fn image_id(mut self, id: impl Into<String>) -> Self {
        self.image_id = Some(id.into());
        self
    }

    pub fn hardware_id(mut self, id: impl Into<String>) -> Self {
        self.hardware_id = Some(id.into());
        self
    }

    pub fn location_id(mut self, id: impl Into<String>) -> Self {
        self.location_id = Some(id.into());
        self
    }

    pub fn os_family(mut self, family: OsFamily) -> Self {
        self.os_family = Some(family);
        self
    }

    pub fn os_name_matches(mut self, pattern: impl Into<String>) -> Self {
        self.os_name = Some(pattern.into());
        self
    }

    pub fn os_version_matches(mut self, pattern: impl Into<String>) -> Self {
        self.os_version = Some(pattern.into());
        self
    }

    pub fn os_description_matches(mut self, pattern: impl Into<String>) -> Self {
        self.os_description = Some(pattern.into());
        self
    }

    pub fn os_arch_matches(mut self, pattern: impl Into<String>) -> Self {
        self.os_arch = Some(pattern.into());
        self
    }

    pub fn os_64bit(mut self, is_64bit: bool) -> Self {
        self.os_64bit = Some(is_64bit);
        self
    }

    pub fn image_name_matches(mut self, pattern: impl Into<String>) -> Self {
        self.image_name = Some(pattern.into());
        self
    }

    pub fn image_version_matches(mut self, pattern: impl Into<String>) -> Self {
        self.image_version = Some(pattern.into());
        self
    }

    pub fn image_description_matches(mut self, pattern: impl Into<String>) -> Self {
        self.image_description = Some(pattern.into());
        self
    }

    pub fn hypervisor_matches(mut self, pattern: impl Into<String>) -> Self {
        self.hypervisor = Some(pattern.into());
        self
    }

    pub fn min_cores(mut self, cores: f64) -> Self {
        self.min_cores = cores;
        self
    }

    /// MB
    pub fn min_ram(mut self, ram: u32) -> Self {
        self.min_ram = ram;
        self
    }

    /// GB
    pub fn min_disk(mut self, disk: f64) -> Self {
        self.min_disk = disk;
        self
    }

    pub fn smallest(mut self) -> Self {
        self.sort = HardwareSort::Smallest;
        self
    }

    pub fn biggest(mut self) -> Self {
        self.sort = HardwareSort::Biggest;
        self
    }

    pub fn fastest(mut self) -> Self {
        self.sort = HardwareSort::Fastest;
        self
    }

    pub fn from_image(mut self, image: &Image) -> Self {
        if let Some(location) = &image.location {
            self.location_id = Some(location.id.clone());
        }
        self.image_id = Some(image.id.clone());
        self
    }

    pub fn from_hardware(mut self, hardware: &Hardware) -> Self {
        if let Some(location) = &hardware.location {
            self.location_id = Some(location.id.clone());
        }
        self.hardware_id = Some(hardware.id.clone());
        self
    }

    pub fn from_template(self, template: &Template) -> Self {
        let mut builder = self
            .from_hardware(&template.hardware)
            .from_image(&template.image)
            .options(template.options.clone());
        builder.location_id = Some(template.location.id.clone());
        builder
    }

    pub fn from_spec(self, spec: &TemplateBuilderSpec) -> Self {
        spec.copy_to(self)
    }

    pub fn options(mut self, options: TemplateOptions) -> Self {
        self.options = options;
        self
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    fn resolve_location(&self) -> Result<Location> {
        match &self.location_id {
            Some(id) => self.locations.iter().find(|l| &l.id == id).cloned().ok_or_else(|| {
                let ids: Vec<&str> = self.locations.iter().map(|l| l.id.as_str()).collect();
                Error::NoSuchElement(format!("location id {} not found in: {:?}", id, ids))
            }),
            None => self
                .default_location
                .clone()
                .or_else(|| self.locations.first().cloned())
                .ok_or_else(|| Error::illegal_state("no locations present!")),
        }
    }

    fn image_matches(&self, image: &Image) -> bool {
        if let Some(id) = &self.image_id {
            return &image.id == id;
        }
        let os = &image.operating_system;
        self.os_family.map_or(true, |f| os.family == f)
            && self.os_64bit.map_or(true, |b| os.is_64bit == b)
            && self.os_name.as_deref().map_or(true, |p| matches_pattern(p, os.name.as_deref()))
            && self.os_version.as_deref().map_or(true, |p| matches_pattern(p, os.version.as_deref()))
            && self
                .os_description
                .as_deref()
                .map_or(true, |p| matches_pattern(p, Some(os.description.as_str())))
            && self.os_arch.as_deref().map_or(true, |p| matches_pattern(p, os.arch.as_deref()))
            && self.image_name.as_deref().map_or(true, |p| matches_pattern(p, image.name.as_deref()))
            && self
                .image_version
                .as_deref()
                .map_or(true, |p| matches_pattern(p, image.version.as_deref()))
            && self
                .image_description
                .as_deref()
                .map_or(true, |p| matches_pattern(p, image.description.as_deref()))
    }

    fn hardware_matches(&self, hardware: &Hardware) -> bool {
        if let Some(id) = &self.hardware_id {
            return &hardware.id == id;
        }
        hardware.cores() >= self.min_cores
            && hardware.ram >= self.min_ram
            && hardware.total_disk_gb() >= self.min_disk
            && self
                .hypervisor
                .as_deref()
                .map_or(true, |p| matches_pattern(p, hardware.hypervisor.as_deref()))
    }

    fn pick_hardware<'a>(&self, candidates: impl Iterator<Item = &'a Hardware>) -> Option<&'a Hardware> {
        match self.sort {
            HardwareSort::Smallest => candidates.min_by(|a, b| hardware_ordering(a, b)),
            HardwareSort::Biggest => candidates.max_by(|a, b| hardware_ordering(a, b)),
            HardwareSort::Fastest => candidates.max_by(|a, b| {
                a.cores_and_speed()
                    .total_cmp(&b.cores_and_speed())
                    .then_with(|| hardware_ordering(a, b))
            }),
        }
    }

    pub fn build(self) -> Result<Template> {
        let location = self.resolve_location()?;
        // the chosen location, its parent or grandparent
        let visible: Vec<&str> = location.ancestry().take(3).map(|l| l.id.as_str()).collect();
        let in_scope = |resource_location: Option<&Location>| {
            resource_location.map_or(true, |l| visible.contains(&l.id.as_str()))
        };

        if self.images.is_empty() {
            return Err(Error::illegal_state("no images present!"));
        }
        let images: Vec<&Image> = self
            .images
            .iter()
            .filter(|i| in_scope(i.location.as_ref()) && self.image_matches(i))
            .collect();
        if images.is_empty() {
            return Err(Error::NoSuchElement(format!("no image matched predicate: {}", self)));
        }

        let hardware = self.pick_hardware(self.hardware.iter().filter(|h| {
            in_scope(h.location.as_ref())
                && self.hardware_matches(h)
                && images.iter().any(|i| h.supports_image(i))
        }));
        let Some(hardware) = hardware else {
            return Err(Error::NoSuchElement(format!(
                "no hardware profiles support images matching params: {}",
                self
            )));
        };

        let image = images
            .iter()
            .copied()
            .filter(|i| hardware.supports_image(i))
            .max_by(|a, b| image_ordering(a, b))
            .ok_or_else(|| Error::NoSuchElement(format!("no image matched predicate: {}", self)))?;

        tracing::debug!(
            "Template resolved image={} hardware={} location={}",
            image.id,
            hardware.id,
            location.id
        );
        Ok(Template {
            image: image.clone(),
            hardware: hardware.clone(),
            location,
            options: self.options,
        })
    }
}

impl fmt::Display for TemplateBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        let mut push = |key: &str, value: Option<String>| {
            if let Some(v) = value {
                parts.push(format!("{}={}", key, v));
            }
        };
        push("locationId", self.location_id.clone());
        push("imageId", self.image_id.clone());
        push("hardwareId", self.hardware_id.clone());
        push("osFamily", self.os_family.map(|f| f.to_string()));
        push("osName", self.os_name.clone());
        push("osVersion", self.os_version.clone());
        push("osDescription", self.os_description.clone());
        push("osArch", self.os_arch.clone());
        push("os64Bit", self.os_64bit.map(|b| b.to_string()));
        push("imageName", self.image_name.clone());
        push("imageVersion", self.image_version.clone());
        push("imageDescription", self.image_description.clone());
        push("hypervisor", self.hypervisor.clone());
        push("minCores", (self.min_cores > 0.0).then(|| self.min_cores.to_string()));
        push("minRam", (self.min_ram > 0).then(|| self.min_ram.to_string()));
        push("minDisk", (self.min_disk > 0.0).then(|| self.min_disk.to_string()));
        push("biggest", Some((self.sort == HardwareSort::Biggest).to_string()));
        push("fastest", Some((self.sort == HardwareSort::Fastest).to_string()));
        write!(f, "[{}]", parts.join(", "))
    }
}

// =============================================================================
// String specs: "osFamily=ubuntu,minRam=2048"
// =============================================================================

const SPEC_KEYS: &[&str] = &[
    "hardwareId",
    "minCores",
    "minRam",
    "minDisk",
    "hypervisorMatches",
    "imageId",
    "imageNameMatches",
    "osFamily",
    "osVersionMatches",
    "os64Bit",
    "osArchMatches",
    "osDescriptionMatches",
    "loginUser",
    "authenticateSudo",
    "locationId",
];

fn unset<T: fmt::Display>(what: &str, value: &Option<T>) -> Result<()> {
    match value {
        Some(v) => Err(Error::illegal_argument(format!("{} was already set to {}", what, v))),
        None => Ok(()),
    }
}

fn parse_f64(key: &str, value: &str) -> Result<f64> {
    value.parse().map_err(|_| {
        Error::illegal_argument(format!("key {} value set to {}, must be double", key, value))
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32> {
    value.parse().map_err(|_| {
        Error::illegal_argument(format!("key {} value set to {}, must be integer", key, value))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(Error::illegal_argument(format!(
            "key {} value set to {}, must be booleans",
            key, value
        ))),
    }
}

/// Parsed form of a comma separated template spec.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateBuilderSpec {
    specification: String,
    pub hardware_id: Option<String>,
    pub min_cores: Option<f64>,
    pub min_ram: Option<u32>,
    pub min_disk: Option<f64>,
    pub hypervisor_matches: Option<String>,
    pub image_id: Option<String>,
    pub image_name_matches: Option<String>,
    pub os_family: Option<OsFamily>,
    pub os_version_matches: Option<String>,
    pub os_64bit: Option<bool>,
    pub os_arch_matches: Option<String>,
    pub os_description_matches: Option<String>,
    pub login_user: Option<String>,
    pub authenticate_sudo: Option<bool>,
    pub location_id: Option<String>,
}

impl TemplateBuilderSpec {
    pub fn parse(specification: &str) -> Result<Self> {
        let mut spec = Self {
            specification: specification.to_string(),
            ..Default::default()
        };
        if specification.is_empty() {
            return Ok(spec);
        }
        for pair in specification.split(',').map(str::trim) {
            if pair.is_empty() {
                return Err(Error::illegal_argument("blank key-value pair"));
            }
            let key_and_value: Vec<&str> = pair.split('=').map(str::trim).collect();
            if key_and_value.len() > 2 {
                return Err(Error::illegal_argument(format!(
                    "key-value pair {} with more than one equals sign",
                    pair
                )));
            }
            let key = key_and_value[0];
            if !SPEC_KEYS.contains(&key) {
                return Err(Error::illegal_argument(format!("unknown key {}", key)));
            }
            let value = key_and_value.get(1).copied().filter(|v| !v.is_empty());
            let Some(value) = value else {
                return Err(Error::illegal_argument(format!("value of key {} omitted", key)));
            };
            spec.set(key, value)?;
        }
        Ok(spec)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "hardwareId" => {
                unset("hardware id", &self.hardware_id)?;
                unset("min cores", &self.min_cores)?;
                unset("min ram", &self.min_ram)?;
                unset("hypervisor matches", &self.hypervisor_matches)?;
                self.hardware_id = Some(value.to_string());
            }
            "minCores" => {
                let cores = parse_f64(key, value)?;
                unset("min cores", &self.min_cores)?;
                unset("hardware id", &self.hardware_id)?;
                self.min_cores = Some(cores);
            }
            "minRam" => {
                let ram = parse_u32(key, value)?;
                unset("min ram", &self.min_ram)?;
                unset("hardware id", &self.hardware_id)?;
                self.min_ram = Some(ram);
            }
            "minDisk" => {
                let disk = parse_f64(key, value)?;
                unset("min disk", &self.min_disk)?;
                unset("hardware id", &self.hardware_id)?;
                self.min_disk = Some(disk);
            }
            "hypervisorMatches" => {
                unset("hypervisor matches", &self.hypervisor_matches)?;
                unset("hardware id", &self.hardware_id)?;
                self.hypervisor_matches = Some(value.to_string());
            }
            "imageId" => {
                unset("image id", &self.image_id)?;
                unset("image name matches", &self.image_name_matches)?;
                unset("operating system family", &self.os_family)?;
                unset("os version matches", &self.os_version_matches)?;
                unset("os 64 bit", &self.os_64bit)?;
                unset("os arch matches", &self.os_arch_matches)?;
                unset("os description matches", &self.os_description_matches)?;
                self.image_id = Some(value.to_string());
            }
            "imageNameMatches" => {
                unset("image name matches", &self.image_name_matches)?;
                unset("image id", &self.image_id)?;
                self.image_name_matches = Some(value.to_string());
            }
            "osFamily" => {
                let family = value.parse::<OsFamily>().map_err(|_| {
                    Error::illegal_argument(format!(
                        "key {} value set to {}, must be a name in enum OsFamily",
                        key, value
                    ))
                })?;
                unset("operating system family", &self.os_family)?;
                unset("image id", &self.image_id)?;
                self.os_family = Some(family);
            }
            "osVersionMatches" => {
                unset("os version matches", &self.os_version_matches)?;
                unset("image id", &self.image_id)?;
                self.os_version_matches = Some(value.to_string());
            }
            "os64Bit" => {
                let is_64bit = parse_bool(key, value)?;
                unset("os 64 bit", &self.os_64bit)?;
                unset("image id", &self.image_id)?;
                self.os_64bit = Some(is_64bit);
            }
            "osArchMatches" => {
                unset("os arch matches", &self.os_arch_matches)?;
                unset("image id", &self.image_id)?;
                self.os_arch_matches = Some(value.to_string());
            }
            "osDescriptionMatches" => {
                unset("os description matches", &self.os_description_matches)?;
                unset("image id", &self.image_id)?;
                self.os_description_matches = Some(value.to_string());
            }
            "loginUser" => {
                unset("login user", &self.login_user)?;
                self.login_user = Some(value.to_string());
            }
            "authenticateSudo" => {
                let sudo = parse_bool(key, value)?;
                if self.login_user.is_none() {
                    return Err(Error::illegal_argument(
                        "login user must be set to use authenticateSudo",
                    ));
                }
                unset("authenticate sudo", &self.authenticate_sudo)?;
                self.authenticate_sudo = Some(sudo);
            }
            "locationId" => {
                unset("location id", &self.location_id)?;
                self.location_id = Some(value.to_string());
            }
            other => return Err(Error::illegal_argument(format!("unknown key {}", other))),
        }
        Ok(())
    }

    /// Apply the parsed criteria to a builder.
    pub fn copy_to(&self, mut builder: TemplateBuilder) -> TemplateBuilder {
        if let Some(v) = &self.hardware_id {
            builder = builder.hardware_id(v);
        }
        if let Some(v) = self.min_cores {
            builder = builder.min_cores(v);
        }
        if let Some(v) = self.min_ram {
            builder = builder.min_ram(v);
        }
        if let Some(v) = self.min_disk {
            builder = builder.min_disk(v);
        }
        if let Some(v) = &self.hypervisor_matches {
            builder = builder.hypervisor_matches(v);
        }
        if let Some(v) = &self.image_id {
            builder = builder.image_id(v);
        }
        if let Some(v) = &self.image_name_matches {
            builder = builder.image_name_matches(v);
        }
        if let Some(v) = self.os_family {
            builder = builder.os_family(v);
        }
        if let Some(v) = &self.os_version_matches {
            builder = builder.os_version_matches(v);
        }
        if let Some(v) = self.os_64bit {
            builder = builder.os_64bit(v);
        }
        if let Some(v) = &self.os_arch_matches {
            builder = builder.os_arch_matches(v);
        }
        if let Some(v) = &self.os_description_matches {
            builder = builder.os_description_matches(v);
        }
        if let Some(v) = &self.location_id {
            builder = builder.location_id(v);
        }
        if self.login_user.is_some() || self.authenticate_sudo.is_some() {
            let mut options = builder.options.clone();
            if let Some(user) = &self.login_user {
                options = options.login_user(user);
            }
            if let Some(sudo) = self.authenticate_sudo {
                options = options.authenticate_sudo(sudo);
            }
            builder = builder.options(options);
        }
        builder
    }
}

impl fmt::Display for TemplateBuilderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.specification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::domain::{
        ImageConstraint, LocationScope, OperatingSystem, Processor, Volume,
    };

    fn locations() -> (Location, Location, Location) {
        let provider = Location::new(LocationScope::Provider, "stub", "stub");
        let region = Location::new(LocationScope::Region, "region-1", "region").with_parent(provider.clone());
        let zone = Location::new(LocationScope::Zone, "zone-1a", "zone").with_parent(region.clone());
        (provider, region, zone)
    }

    fn image(id: &str, name: &str, family: OsFamily, version: &str, is_64bit: bool) -> Image {
        Image {
            id: id.into(),
            provider_id: id.into(),
            name: Some(name.into()),
            operating_system: OperatingSystem {
                family,
                version: Some(version.into()),
                description: format!("{} {}", family, version),
                is_64bit,
                arch: Some(if is_64bit { "x86_64" } else { "i386" }.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn hardware(id: &str, cores: f64, speed: f64, ram: u32, disk: f64, only_64: bool) -> Hardware {
        Hardware {
            id: id.into(),
            provider_id: id.into(),
            processors: vec![Processor::new(cores, speed)],
            ram,
            volumes: vec![Volume::local(disk, "/dev/sda1", true)],
            hypervisor: Some("xen".into()),
            supports_image: if only_64 {
                ImageConstraint::Is64Bit(true)
            } else {
                ImageConstraint::Any
            },
            ..Default::default()
        }
    }

    fn builder() -> TemplateBuilder {
        let (provider, region, zone) = locations();
        let images = vec![
            image("1", "ubuntu-10.04", OsFamily::Ubuntu, "10.04", false),
            image("2", "ubuntu-11.04", OsFamily::Ubuntu, "11.04", true),
            image("3", "centos-5.5", OsFamily::Centos, "5.5", true),
        ];
        let hardware = vec![
            hardware("small", 1.0, 1.0, 1740, 160.0, false),
            hardware("medium", 2.0, 2.5, 7680, 850.0, true),
            hardware("fast", 2.0, 3.5, 7680, 850.0, true),
            hardware("large", 4.0, 2.0, 15360, 1690.0, true),
        ];
        TemplateBuilder::new(images, hardware, vec![provider, region, zone.clone()], Some(zone))
    }

    #[test]
    fn test_defaults_to_smallest_hardware_and_greatest_image() {
        let template = builder().build().unwrap();
        assert_eq!(template.hardware.id, "small");
        assert_eq!(template.image.id, "2");
        assert_eq!(template.location.id, "zone-1a");
    }

    #[test]
    fn test_biggest_and_fastest() {
        assert_eq!(builder().biggest().build().unwrap().hardware.id, "large");
        assert_eq!(builder().fastest().build().unwrap().hardware.id, "large");
        let fast = builder().fastest().min_ram(7000).hardware_id("fast").build().unwrap();
        assert_eq!(fast.hardware.id, "fast");
    }

    #[test]
    fn test_min_ram_skips_small() {
        let template = builder().min_ram(2048).build().unwrap();
        assert_eq!(template.hardware.id, "medium");
        assert!(template.image.operating_system.is_64bit);
    }

    #[test]
    fn test_os_predicates() {
        let template = builder().os_family(OsFamily::Centos).build().unwrap();
        assert_eq!(template.image.id, "3");
        let template = builder().os_version_matches("10\\..*").build().unwrap();
        assert_eq!(template.image.id, "1");
        let template = builder().image_name_matches("11.04").build().unwrap();
        assert_eq!(template.image.id, "2");
    }

    #[test]
    fn test_no_image_matched() {
        let err = builder().os_family(OsFamily::Windows).build().unwrap_err();
        assert!(matches!(err, Error::NoSuchElement(_)));
        assert!(err.to_string().starts_with("no image matched predicate: "));
        assert!(err.to_string().contains("osFamily=windows"));
    }

    #[test]
    fn test_no_hardware_supports_image() {
        let err = builder()
            .image_id("1")
            .min_cores(2.0)
            .build()
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("no hardware profiles support images matching params: "));
    }

    #[test]
    fn test_no_images() {
        let err = TemplateBuilder::new(vec![], vec![], vec![], None)
            .location_id("x")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchElement(_)));
        let (_, _, zone) = locations();
        let err = TemplateBuilder::new(vec![], vec![], vec![zone], None).build().unwrap_err();
        assert_eq!(err.to_string(), "no images present!");
        assert!(matches!(err, Error::IllegalState { .. }));
    }

    #[test]
    fn test_location_scope_filtering() {
        let (_, region, zone) = locations();
        let other = Location::new(LocationScope::Zone, "zone-2b", "other").with_parent(region.clone());
        let mut in_region = image("10", "zz-region", OsFamily::Ubuntu, "12.04", true);
        in_region.location = Some(region);
        let mut in_other = image("11", "zzz-other", OsFamily::Ubuntu, "12.04", true);
        in_other.location = Some(other);

        let mut b = builder();
        b.images.push(in_region);
        b.images.push(in_other);
        b.locations.push(zone);
        let template = b.build().unwrap();
        // zzz-other sorts highest but is outside the chosen zone
        assert_eq!(template.image.id, "10");
    }

    #[test]
    fn test_from_template_round_trip() {
        let first = builder().min_ram(2048).os_family(OsFamily::Centos).build().unwrap();
        let again = builder().from_template(&first).build().unwrap();
        assert_eq!(again.image.id, first.image.id);
        assert_eq!(again.hardware.id, first.hardware.id);
        assert_eq!(again.location.id, first.location.id);
    }

    #[test]
    fn test_matches_pattern() {
        assert!(matches_pattern("11", Some("ubuntu-11.04")));
        assert!(matches_pattern("ubuntu-1[01].*", Some("ubuntu-11.04")));
        assert!(!matches_pattern("centos", Some("ubuntu-11.04")));
        assert!(!matches_pattern("(", Some("ubuntu")));
        assert!(!matches_pattern("x", None));
    }

    // -------------------------------------------------------------------------
    // Spec parsing
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_empty() {
        let spec = TemplateBuilderSpec::parse("").unwrap();
        assert_eq!(spec.hardware_id, None);
        assert_eq!(spec.min_cores, None);
        assert_eq!(spec.to_string(), "");
    }

    #[test]
    fn test_parse_values() {
        let spec = TemplateBuilderSpec::parse(
            "osFamily=UBUNTU, os64Bit=true, minRam=2048, minCores=2.5, loginUser=ubuntu, authenticateSudo=true",
        )
        .unwrap();
        assert_eq!(spec.os_family, Some(OsFamily::Ubuntu));
        assert_eq!(spec.os_64bit, Some(true));
        assert_eq!(spec.min_ram, Some(2048));
        assert_eq!(spec.min_cores, Some(2.5));
        assert_eq!(spec.login_user.as_deref(), Some("ubuntu"));
        assert_eq!(spec.authenticate_sudo, Some(true));
    }

    #[test]
    fn test_parse_errors() {
        let cases = [
            ("hardwareId=m1.small,hardwareId=m1.large", "hardware id was already set to m1.small"),
            ("hardwareId=m1.small,minRam=10", "hardware id was already set to m1.small"),
            ("minRam=10,hardwareId=m1.small", "min ram was already set to 10"),
            ("imageId=ami-1,osFamily=ubuntu", "image id was already set to ami-1"),
            ("minCores=four", "key minCores value set to four, must be double"),
            ("minRam=1.5", "key minRam value set to 1.5, must be integer"),
            ("osFamily=beos", "key osFamily value set to beos, must be a name in enum OsFamily"),
            ("os64Bit=maybe", "key os64Bit value set to maybe, must be booleans"),
            ("color=blue", "unknown key color"),
            ("minRam", "value of key minRam omitted"),
            ("minRam=", "value of key minRam omitted"),
            ("minRam=1=2", "key-value pair minRam=1=2 with more than one equals sign"),
            ("minRam=1,,minCores=2", "blank key-value pair"),
            ("authenticateSudo=true", "login user must be set to use authenticateSudo"),
            // values are checked before duplicates and conflicts
            ("minRam=10,minRam=x", "key minRam value set to x, must be integer"),
            ("hardwareId=m1.small,minCores=two", "key minCores value set to two, must be double"),
            ("imageId=ami-1,os64Bit=maybe", "key os64Bit value set to maybe, must be booleans"),
            ("authenticateSudo=maybe", "key authenticateSudo value set to maybe, must be booleans"),
        ];
        for (input, message) in cases {
            let err = TemplateBuilderSpec::parse(input).unwrap_err();
            assert!(matches!(err, Error::IllegalArgument { .. }), "{input}");
            assert_eq!(err.to_string(), message, "{input}");
        }
    }

    #[test]
    fn test_spec_drives_builder() {
        let spec = TemplateBuilderSpec::parse("osFamily=centos,minRam=2048,loginUser=root").unwrap();
        let template = builder().from_spec(&spec).build().unwrap();
        assert_eq!(template.image.id, "3");
        assert_eq!(template.hardware.id, "medium");
        assert_eq!(template.options.login_user.as_deref(), Some("root"));
    }
}
