//! In-memory compute provider
//!
//! Backs the `stub` provider. Nodes boot instantly: a node is created
//! `Pending` and reads as `Running` from the next lookup on.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::adapter::{ComputeServiceAdapter, NodeAndInitialCredentials};
use super::domain::{
    Hardware, Image, ImageStatus, Location, LocationScope, LoginCredentials, NodeMetadata, NodeStatus,
    OperatingSystem, OsFamily, Processor, Template, Volume,
};
use crate::error::{Error, Result};

pub const PROVIDER: &str = "stub";

#[derive(Debug, Default)]
struct StubState {
    nodes: BTreeMap<String, NodeMetadata>,
    next_id: u32,
    failing_creates: u32,
    busy_destroys: u32,
    keep_terminated: bool,
}

#[derive(Debug)]
pub struct StubComputeServiceAdapter {
    state: Mutex<StubState>,
    provider: Location,
    region: Location,
    zones: Vec<Location>,
}

impl Default for StubComputeServiceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl StubComputeServiceAdapter {
    pub fn new() -> Self {
        let provider = Location::new(LocationScope::Provider, PROVIDER, PROVIDER);
        let region = Location::new(LocationScope::Region, "stub-region-1", "stub region 1")
            .with_parent(provider.clone())
            .with_iso3166_codes(["US-CA"]);
        let zones = ["a", "b"]
            .into_iter()
            .map(|z| {
                Location::new(LocationScope::Zone, format!("stub-zone-1{}", z), format!("stub zone 1{}", z))
                    .with_parent(region.clone())
                    .with_iso3166_codes(["US-CA"])
            })
            .collect();
        Self {
            state: Mutex::new(StubState::default()),
            provider,
            region,
            zones,
        }
    }

    /// The next `count` creations fail with `InsufficientResources`.
    pub fn fail_next_creates(&self, count: u32) {
        self.lock().failing_creates = count;
    }

    /// The next `count` destroys fail with `IllegalState`, as when a node is busy.
    pub fn busy_next_destroys(&self, count: u32) {
        self.lock().busy_destroys = count;
    }

    /// Destroyed nodes stay listed as `Terminated` instead of disappearing.
    pub fn keep_terminated_nodes(&self, keep: bool) {
        self.lock().keep_terminated = keep;
    }

    // Poisoning only happens when a test panics mid-update; keep serving.
    fn lock(&self) -> MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn booted(node: &mut NodeMetadata) -> NodeMetadata {
        if node.status == NodeStatus::Pending {
            node.status = NodeStatus::Running;
        }
        node.clone()
    }

    fn set_status(&self, id: &str, from: &[NodeStatus], to: NodeStatus) -> Result<()> {
        let mut state = self.lock();
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("node {} not found", id)))?;
        if !from.contains(&node.status) && node.status != NodeStatus::Pending {
            return Err(Error::illegal_state(format!(
                "node {} is {}, expected one of {:?}",
                id, node.status, from
            )));
        }
        node.status = to;
        Ok(())
    }
}

fn hardware(id: &str, cores: f64, speed: f64, ram: u32, disk: f64) -> Hardware {
    Hardware {
        id: id.into(),
        provider_id: id.into(),
        name: Some(id.into()),
        processors: vec![Processor::new(cores, speed)],
        ram,
        volumes: vec![Volume::local(disk, "/dev/sda1", true)],
        hypervisor: Some("stub".into()),
        ..Default::default()
    }
}

fn image(id: &str, family: OsFamily, version: &str, is_64bit: bool, user: &str) -> Image {
    let bits = if is_64bit { "64" } else { "32" };
    Image {
        id: id.into(),
        provider_id: id.into(),
        name: Some(format!("{}-{}-{}", family, version, bits)),
        version: Some(version.into()),
        description: Some(format!("stub {} {} {}-bit", family, version, bits)),
        operating_system: OperatingSystem {
            family,
            name: Some(family.to_string()),
            version: Some(version.into()),
            arch: Some(if is_64bit { "x86_64" } else { "i386" }.into()),
            description: format!("{} {}", family, version),
            is_64bit,
        },
        location: None,
        default_credentials: Some(LoginCredentials::for_user(user)),
        status: ImageStatus::Available,
    }
}

#[async_trait]
impl ComputeServiceAdapter for StubComputeServiceAdapter {
    type Node = NodeMetadata;
    type Hardware = Hardware;
    type Image = Image;
    type Location = Location;

    async fn create_node_with_group_encoded_into_name(
        &self,
        group: &str,
        name: &str,
        template: &Template,
    ) -> Result<NodeAndInitialCredentials<NodeMetadata>> {
        let mut state = self.lock();
        if state.failing_creates > 0 {
            state.failing_creates -= 1;
            return Err(Error::insufficient_resources(format!("no capacity left for {}", name)));
        }
        state.next_id += 1;
        let n = state.next_id;
        let id = n.to_string();

        let user = template
            .options
            .login_user
            .clone()
            .or_else(|| template.image.default_credentials.as_ref().and_then(|c| c.user.clone()))
            .unwrap_or_else(|| "root".to_string());
        let credentials = LoginCredentials::for_user(user)
            .with_password(uuid::Uuid::new_v4().simple().to_string())
            .with_authenticate_sudo(template.options.authenticate_sudo.unwrap_or(false));

        let node = NodeMetadata {
            id: id.clone(),
            provider_id: id.clone(),
            name: Some(name.to_string()),
            hostname: Some(name.to_string()),
            group: Some(group.to_string()),
            location: Some(template.location.clone()),
            image_id: Some(template.image.id.clone()),
            hardware: Some(template.hardware.clone()),
            operating_system: Some(template.image.operating_system.clone()),
            status: NodeStatus::Pending,
            backend_status: None,
            login_port: 22,
            public_addresses: [format!("144.175.1.{}", n)].into(),
            private_addresses: [format!("10.1.1.{}", n)].into(),
            credentials: None,
            tags: template.options.tags.clone(),
            user_metadata: template.options.user_metadata.clone(),
        };
        state.nodes.insert(id.clone(), node.clone());
        tracing::debug!("stub created node {} ({})", id, name);
        Ok(NodeAndInitialCredentials::new(node, id, Some(credentials)))
    }

    async fn list_hardware_profiles(&self) -> Result<Vec<Hardware>> {
        Ok(vec![
            hardware("small", 1.0, 1.0, 1740, 160.0),
            hardware("medium", 2.0, 2.5, 7680, 850.0),
            hardware("large", 4.0, 2.5, 15360, 1690.0),
        ])
    }

    async fn list_images(&self) -> Result<Vec<Image>> {
        Ok(vec![
            image("1", OsFamily::Ubuntu, "11.04", false, "root"),
            image("2", OsFamily::Ubuntu, "11.04", true, "root"),
            image("3", OsFamily::Centos, "5.5", false, "root"),
            image("4", OsFamily::Centos, "5.5", true, "root"),
            image("5", OsFamily::Windows, "2008", false, "Administrator"),
            image("6", OsFamily::Windows, "2008", true, "Administrator"),
        ])
    }

    async fn get_image(&self, id: &str) -> Result<Option<Image>> {
        Ok(self.list_images().await?.into_iter().find(|i| i.id == id))
    }

    async fn list_locations(&self) -> Result<Vec<Location>> {
        let mut locations = vec![self.provider.clone(), self.region.clone()];
        locations.extend(self.zones.iter().cloned());
        Ok(locations)
    }

    async fn list_nodes(&self) -> Result<Vec<NodeMetadata>> {
        Ok(self.lock().nodes.values_mut().map(Self::booted).collect())
    }

    async fn list_nodes_by_ids(&self, ids: &[String]) -> Result<Vec<NodeMetadata>> {
        let mut state = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.nodes.get_mut(id).map(Self::booted))
            .collect())
    }

    async fn get_node(&self, id: &str) -> Result<Option<NodeMetadata>> {
        Ok(self.lock().nodes.get_mut(id).map(Self::booted))
    }

    async fn destroy_node(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        if state.busy_destroys > 0 {
            state.busy_destroys -= 1;
            return Err(Error::illegal_state(format!("node {} is busy", id)));
        }
        if state.keep_terminated {
            if let Some(node) = state.nodes.get_mut(id) {
                node.status = NodeStatus::Terminated;
                tracing::debug!("stub terminated node {}", node.id);
            }
        } else if let Some(mut node) = state.nodes.remove(id) {
            node.status = NodeStatus::Terminated;
            tracing::debug!("stub destroyed node {}", node.id);
        }
        Ok(())
    }

    async fn reboot_node(&self, id: &str) -> Result<()> {
        self.set_status(id, &[NodeStatus::Running], NodeStatus::Running)
    }

    async fn resume_node(&self, id: &str) -> Result<()> {
        self.set_status(id, &[NodeStatus::Suspended, NodeStatus::Running], NodeStatus::Running)
    }

    async fn suspend_node(&self, id: &str) -> Result<()> {
        self.set_status(id, &[NodeStatus::Running, NodeStatus::Suspended], NodeStatus::Suspended)
    }
}
