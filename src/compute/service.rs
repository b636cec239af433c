//! Generic compute service assembled on top of a provider adapter
//!
//! The adapter only knows how to create, list and act on single nodes. This
//! layer adds group naming, concurrent creation, waiting for node state,
//! credential bookkeeping and the "matching" bulk operations.

use futures::future::{join_all, try_join_all};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use super::adapter::{ComputeServiceAdapter, IdentityTransform, PortableTransform};
use super::domain::{Hardware, Image, Location, LocationScope, LoginCredentials, NodeMetadata, NodeStatus, Template};
use super::naming::GroupNamingConvention;
use super::predicates::retry;
use super::template::{TemplateBuilder, TemplateBuilderSpec};
use crate::config::{keys, Properties};
use crate::error::{Error, Result};

/// Raised when some nodes of a group could not be created.
#[derive(Debug, thiserror::Error)]
#[error("error running {} nodes group({}): {} failed", .requested, .group, .failures.len())]
pub struct RunNodesError {
    pub group: String,
    pub requested: usize,
    /// Nodes that did come up
    pub successful: Vec<NodeMetadata>,
    /// Node name and the reason it failed
    pub failures: Vec<(String, Error)>,
}

/// How long to wait for nodes to reach a state.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTimeouts {
    pub node_running: Duration,
    pub node_terminated: Duration,
    pub node_suspended: Duration,
    pub poll_period: Duration,
    pub max_poll_period: Duration,
}

impl Default for NodeTimeouts {
    fn default() -> Self {
        Self {
            node_running: Duration::from_secs(1200),
            node_terminated: Duration::from_secs(30),
            node_suspended: Duration::from_secs(120),
            poll_period: Duration::from_millis(50),
            max_poll_period: Duration::from_secs(1),
        }
    }
}

impl NodeTimeouts {
    pub fn from_properties(provider: &str, props: &Properties) -> Result<Self> {
        let defaults = Self::default();
        let millis = |d: Duration| d.as_millis() as u64;
        Ok(Self {
            node_running: props.get_millis(provider, keys::TIMEOUT_NODE_RUNNING, millis(defaults.node_running))?,
            node_terminated: props.get_millis(
                provider,
                keys::TIMEOUT_NODE_TERMINATED,
                millis(defaults.node_terminated),
            )?,
            node_suspended: props.get_millis(
                provider,
                keys::TIMEOUT_NODE_SUSPENDED,
                millis(defaults.node_suspended),
            )?,
            poll_period: props.get_millis(provider, keys::POLL_PERIOD, millis(defaults.poll_period))?,
            max_poll_period: defaults.max_poll_period,
        })
    }
}

fn credential_key(node_id: &str) -> String {
    format!("node#{}", node_id)
}

pub struct ComputeService<A: ?Sized, T = IdentityTransform> {
    adapter: Arc<A>,
    transform: Arc<T>,
    naming: GroupNamingConvention,
    timeouts: NodeTimeouts,
    default_location_id: Option<String>,
    credential_store: Arc<RwLock<BTreeMap<String, LoginCredentials>>>,
}

impl<A: ?Sized, T> Clone for ComputeService<A, T> {
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            transform: Arc::clone(&self.transform),
            naming: self.naming.clone(),
            timeouts: self.timeouts.clone(),
            default_location_id: self.default_location_id.clone(),
            credential_store: Arc::clone(&self.credential_store),
        }
    }
}

impl<A: ?Sized, T> fmt::Debug for ComputeService<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeService")
            .field("timeouts", &self.timeouts)
            .field("default_location_id", &self.default_location_id)
            .finish_non_exhaustive()
    }
}

impl<A, T> ComputeService<A, T>
where
    A: ComputeServiceAdapter + ?Sized,
    T: PortableTransform<A>,
{
    pub fn new(adapter: A, transform: T) -> Self
    where
        A: Sized,
    {
        Self::from_arc(Arc::new(adapter), transform)
    }

    pub fn from_arc(adapter: Arc<A>, transform: T) -> Self {
        Self {
            adapter,
            transform: Arc::new(transform),
            naming: GroupNamingConvention::default(),
            timeouts: NodeTimeouts::default(),
            default_location_id: None,
            credential_store: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub fn with_timeouts(mut self, timeouts: NodeTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_naming(mut self, naming: GroupNamingConvention) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_default_location(mut self, location_id: impl Into<String>) -> Self {
        self.default_location_id = Some(location_id.into());
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn naming(&self) -> &GroupNamingConvention {
        &self.naming
    }

    // =========================================================================
    // Credential store
    // =========================================================================

    pub fn credentials_for_node(&self, node_id: &str) -> Option<LoginCredentials> {
        let store = self.credential_store.read().unwrap_or_else(|e| e.into_inner());
        store.get(&credential_key(node_id)).cloned()
    }

    fn store_credentials(&self, node_id: &str, credentials: LoginCredentials) {
        let mut store = self.credential_store.write().unwrap_or_else(|e| e.into_inner());
        store.insert(credential_key(node_id), credentials);
    }

    fn forget_credentials(&self, node_id: &str) {
        let mut store = self.credential_store.write().unwrap_or_else(|e| e.into_inner());
        store.remove(&credential_key(node_id));
    }

    fn to_node(&self, node: &A::Node) -> Result<NodeMetadata> {
        let mut node = self.transform.to_node(node)?;
        if node.credentials.is_none() {
            node.credentials = self.credentials_for_node(&node.id);
        }
        Ok(node)
    }

    // =========================================================================
    // Listing
    // =========================================================================

    pub async fn list_nodes(&self) -> Result<Vec<NodeMetadata>> {
        self.adapter.list_nodes().await?.iter().map(|n| self.to_node(n)).collect()
    }

    pub async fn list_nodes_by_ids(&self, ids: &[String]) -> Result<Vec<NodeMetadata>> {
        self.adapter
            .list_nodes_by_ids(ids)
            .await?
            .iter()
            .map(|n| self.to_node(n))
            .collect()
    }

    pub async fn list_nodes_details_matching<F>(&self, filter: F) -> Result<Vec<NodeMetadata>>
    where
        F: Fn(&NodeMetadata) -> bool,
    {
        Ok(self.list_nodes().await?.into_iter().filter(|n| filter(n)).collect())
    }

    pub async fn get_node_metadata(&self, id: &str) -> Result<Option<NodeMetadata>> {
        self.adapter.get_node(id).await?.map(|n| self.to_node(&n)).transpose()
    }

    pub async fn list_images(&self) -> Result<Vec<Image>> {
        self.adapter
            .list_images()
            .await?
            .iter()
            .map(|i| self.transform.to_image(i))
            .collect()
    }

    pub async fn get_image(&self, id: &str) -> Result<Option<Image>> {
        self.adapter
            .get_image(id)
            .await?
            .map(|i| self.transform.to_image(&i))
            .transpose()
    }

    pub async fn list_hardware_profiles(&self) -> Result<Vec<Hardware>> {
        self.adapter
            .list_hardware_profiles()
            .await?
            .iter()
            .map(|h| self.transform.to_hardware(h))
            .collect()
    }

    pub async fn list_assignable_locations(&self) -> Result<Vec<Location>> {
        self.adapter
            .list_locations()
            .await?
            .iter()
            .map(|l| self.transform.to_location(l))
            .collect()
    }

    // =========================================================================
    // Templates
    // =========================================================================

    pub async fn template_builder(&self) -> Result<TemplateBuilder> {
        let (images, hardware, locations) = tokio::try_join!(
            self.list_images(),
            self.list_hardware_profiles(),
            self.list_assignable_locations()
        )?;
        let default_location = match &self.default_location_id {
            Some(id) => locations.iter().find(|l| &l.id == id).cloned(),
            None => locations
                .iter()
                .find(|l| l.scope == LocationScope::Zone)
                .or_else(|| locations.first())
                .cloned(),
        };
        Ok(TemplateBuilder::new(images, hardware, locations, default_location))
    }

    pub async fn templates_from_spec(&self, spec: &str) -> Result<Template> {
        let spec = TemplateBuilderSpec::parse(spec)?;
        self.template_builder().await?.from_spec(&spec).build()
    }

    // =========================================================================
    // Creating nodes
    // =========================================================================

    fn node_names(
        &self,
        group: &str,
        count: usize,
        template: &Template,
        existing: &BTreeSet<String>,
    ) -> Result<Vec<String>> {
        let mut names: Vec<String> = template.options.node_names.iter().take(count).cloned().collect();
        let mut attempts = 0;
        while names.len() < count {
            let name = self.naming.unique_name_for_group(group)?;
            if !existing.contains(&name) && !names.contains(&name) {
                names.push(name);
            }
            attempts += 1;
            if attempts > count * 100 {
                return Err(Error::illegal_state(format!(
                    "could not find {} unused names in group {}",
                    count, group
                )));
            }
        }
        Ok(names)
    }

    async fn create_node(&self, group: &str, name: &str, template: &Template) -> Result<NodeMetadata> {
        let created = self
            .adapter
            .create_node_with_group_encoded_into_name(group, name, template)
            .await?;
        if let Some(credentials) = created.credentials {
            self.store_credentials(&created.node_id, credentials);
        }
        let node = self.to_node(&created.node)?;
        if !template.options.block_until_running {
            return Ok(node);
        }
        self.await_status(&created.node_id, NodeStatus::Running, self.timeouts.node_running)
            .await
    }

    /// Create `count` nodes named for `group`, concurrently. When some fail,
    /// the error carries both the nodes that came up and the failures.
    pub async fn create_nodes_in_group(
        &self,
        group: &str,
        count: usize,
        template: Template,
    ) -> Result<Vec<NodeMetadata>> {
        self.naming.check_group(group)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let existing: BTreeSet<String> = self.list_nodes().await?.into_iter().filter_map(|n| n.name).collect();
        let names = self.node_names(group, count, &template, &existing)?;
        tracing::info!(
            "Creating {} nodes in group {} (image={}, hardware={}, location={})",
            count,
            group,
            template.image.id,
            template.hardware.id,
            template.location.id
        );

        let results = join_all(names.iter().map(|name| self.create_node(group, name, &template))).await;

        let mut successful = Vec::new();
        let mut failures = Vec::new();
        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(node) => successful.push(node),
                Err(e) => {
                    tracing::warn!("Failed to create node {} in group {}: {}", name, group, e);
                    failures.push((name, e));
                }
            }
        }
        if failures.is_empty() {
            Ok(successful)
        } else {
            Err(RunNodesError {
                group: group.to_string(),
                requested: count,
                successful,
                failures,
            }
            .into())
        }
    }

    /// Poll until the node reaches `target`. Error and terminated nodes end the
    /// wait unless they are the target.
    async fn await_status(&self, id: &str, target: NodeStatus, timeout: Duration) -> Result<NodeMetadata> {
        let reached = retry(
            || async move {
                match self.get_node_metadata(id).await? {
                    Some(node) if node.status == target => Ok(true),
                    Some(node) if matches!(node.status, NodeStatus::Error | NodeStatus::Terminated) => {
                        Err(Error::illegal_state(format!(
                            "node({}) entered {} while waiting for {}",
                            id, node.status, target
                        )))
                    }
                    _ => Ok(false),
                }
            },
            timeout,
            self.timeouts.poll_period,
            self.timeouts.max_poll_period,
        )
        .await?;
        if !reached {
            return Err(Error::Timeout(format!("node({}) not {} after {:?}", id, target, timeout)));
        }
        self.get_node_metadata(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("node({}) disappeared", id)))
    }

    // =========================================================================
    // Acting on nodes
    // =========================================================================

    /// Destroy a node, retrying while the provider reports it busy. Returns the
    /// node as last seen, or `None` when it did not exist.
    pub async fn destroy_node(&self, id: &str) -> Result<Option<NodeMetadata>> {
        let Some(mut node) = self.get_node_metadata(id).await? else {
            self.forget_credentials(id);
            return Ok(None);
        };

        let destroyed = retry(
            || async move {
                match self.adapter.destroy_node(id).await {
                    Ok(()) => Ok(true),
                    Err(e @ Error::IllegalState { .. }) => {
                        tracing::warn!("Retrying destroy of node({}): {}", id, e);
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            },
            self.timeouts.node_terminated,
            self.timeouts.poll_period,
            self.timeouts.max_poll_period,
        )
        .await?;
        if !destroyed {
            return Err(Error::Timeout(format!(
                "node({}) still busy after {:?}",
                id, self.timeouts.node_terminated
            )));
        }

        let gone = retry(
            || async move {
                Ok(match self.adapter.get_node(id).await? {
                    None => true,
                    Some(n) => self.transform.to_node(&n)?.status == NodeStatus::Terminated,
                })
            },
            self.timeouts.node_terminated,
            self.timeouts.poll_period,
            self.timeouts.max_poll_period,
        )
        .await?;
        if !gone {
            return Err(Error::Timeout(format!(
                "node({}) not terminated after {:?}",
                id, self.timeouts.node_terminated
            )));
        }

        self.forget_credentials(id);
        node.status = NodeStatus::Terminated;
        tracing::info!("Destroyed node({})", id);
        Ok(Some(node))
    }

    async fn active_nodes_matching<F>(&self, filter: F) -> Result<Vec<NodeMetadata>>
    where
        F: Fn(&NodeMetadata) -> bool,
    {
        self.list_nodes_details_matching(|n| n.status != NodeStatus::Terminated && filter(n))
            .await
    }

    async fn require_nodes_matching<F>(&self, filter: F) -> Result<Vec<NodeMetadata>>
    where
        F: Fn(&NodeMetadata) -> bool,
    {
        let nodes = self.active_nodes_matching(filter).await?;
        if nodes.is_empty() {
            return Err(Error::NoSuchElement("no nodes matched filter".to_string()));
        }
        Ok(nodes)
    }

    /// Destroy every non-terminated node the filter accepts. Matching nothing
    /// is not an error.
    pub async fn destroy_nodes_matching<F>(&self, filter: F) -> Result<Vec<NodeMetadata>>
    where
        F: Fn(&NodeMetadata) -> bool,
    {
        let nodes = self.active_nodes_matching(filter).await?;
        let destroyed = try_join_all(nodes.iter().map(|n| self.destroy_node(&n.id))).await?;
        Ok(destroyed.into_iter().flatten().collect())
    }

    pub async fn reboot_node(&self, id: &str) -> Result<()> {
        self.adapter.reboot_node(id).await?;
        self.await_status(id, NodeStatus::Running, self.timeouts.node_running).await?;
        Ok(())
    }

    pub async fn reboot_nodes_matching<F>(&self, filter: F) -> Result<()>
    where
        F: Fn(&NodeMetadata) -> bool,
    {
        let nodes = self.require_nodes_matching(filter).await?;
        try_join_all(nodes.iter().map(|n| self.reboot_node(&n.id))).await?;
        Ok(())
    }

    pub async fn suspend_node(&self, id: &str) -> Result<()> {
        self.adapter.suspend_node(id).await?;
        self.await_status(id, NodeStatus::Suspended, self.timeouts.node_suspended).await?;
        Ok(())
    }

    pub async fn suspend_nodes_matching<F>(&self, filter: F) -> Result<()>
    where
        F: Fn(&NodeMetadata) -> bool,
    {
        let nodes = self.require_nodes_matching(filter).await?;
        try_join_all(nodes.iter().map(|n| self.suspend_node(&n.id))).await?;
        Ok(())
    }

    pub async fn resume_node(&self, id: &str) -> Result<()> {
        self.adapter.resume_node(id).await?;
        self.await_status(id, NodeStatus::Running, self.timeouts.node_running).await?;
        Ok(())
    }

    pub async fn resume_nodes_matching<F>(&self, filter: F) -> Result<()>
    where
        F: Fn(&NodeMetadata) -> bool,
    {
        let nodes = self.require_nodes_matching(filter).await?;
        try_join_all(nodes.iter().map(|n| self.resume_node(&n.id))).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::predicates::{node_id_in, node_in_group};
    use crate::compute::stub::StubComputeServiceAdapter;

    fn service() -> ComputeService<StubComputeServiceAdapter> {
        ComputeService::new(StubComputeServiceAdapter::new(), IdentityTransform).with_timeouts(NodeTimeouts {
            node_running: Duration::from_secs(2),
            node_terminated: Duration::from_secs(2),
            node_suspended: Duration::from_secs(2),
            poll_period: Duration::from_millis(1),
            max_poll_period: Duration::from_millis(10),
        })
    }

    #[tokio::test]
    async fn test_create_nodes_in_group() {
        let compute = service();
        let template = compute.templates_from_spec("osFamily=ubuntu,os64Bit=true").await.unwrap();
        assert_eq!(template.location.id, "stub-zone-1a");

        let nodes = compute.create_nodes_in_group("web", 3, template).await.unwrap();
        assert_eq!(nodes.len(), 3);
        let names: BTreeSet<_> = nodes.iter().filter_map(|n| n.name.clone()).collect();
        assert_eq!(names.len(), 3);
        for node in &nodes {
            assert_eq!(node.status, NodeStatus::Running);
            assert_eq!(node.group.as_deref(), Some("web"));
            let name = node.name.as_deref().unwrap();
            assert_eq!(compute.naming().group_in_unique_name_or_null(name).as_deref(), Some("web"));
            assert!(compute.credentials_for_node(&node.id).is_some());
            assert!(node.credentials.is_some());
        }
    }

    #[tokio::test]
    async fn test_explicit_node_names() {
        let compute = service();
        let mut template = compute.template_builder().await.unwrap().build().unwrap();
        template.options = template.options.node_names(["alpha", "beta"]).block_until_running(false);
        let nodes = compute.create_nodes_in_group("db", 2, template).await.unwrap();
        let names: Vec<_> = nodes.iter().filter_map(|n| n.name.as_deref()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert_eq!(nodes[0].status, NodeStatus::Pending);
    }

    #[tokio::test]
    async fn test_partial_failure_reports_both_sides() {
        let compute = service();
        let template = compute.template_builder().await.unwrap().build().unwrap();
        compute.adapter().fail_next_creates(1);
        let err = compute.create_nodes_in_group("web", 2, template).await.unwrap_err();
        match err {
            Error::RunNodes(run) => {
                assert_eq!(run.requested, 2);
                assert_eq!(run.successful.len(), 1);
                assert_eq!(run.failures.len(), 1);
                assert!(matches!(run.failures[0].1, Error::InsufficientResources { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_group() {
        let compute = service();
        let template = compute.template_builder().await.unwrap().build().unwrap();
        let err = compute.create_nodes_in_group("Web", 1, template).await.unwrap_err();
        assert!(matches!(err, Error::IllegalArgument { .. }));
    }

    #[tokio::test]
    async fn test_destroy_retries_while_busy_and_forgets_credentials() {
        let compute = service();
        let template = compute.template_builder().await.unwrap().build().unwrap();
        let node = compute.create_nodes_in_group("web", 1, template).await.unwrap().remove(0);

        compute.adapter().busy_next_destroys(2);
        let destroyed = compute.destroy_node(&node.id).await.unwrap().unwrap();
        assert_eq!(destroyed.status, NodeStatus::Terminated);
        assert!(compute.credentials_for_node(&node.id).is_none());
        assert!(compute.get_node_metadata(&node.id).await.unwrap().is_none());
        assert!(compute.destroy_node(&node.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_matching_operations() {
        let compute = service();
        let template = compute.template_builder().await.unwrap().build().unwrap();
        compute.create_nodes_in_group("web", 2, template.clone()).await.unwrap();
        let db = compute.create_nodes_in_group("db", 1, template).await.unwrap();

        compute.suspend_nodes_matching(node_in_group("web")).await.unwrap();
        let web = compute.list_nodes_details_matching(node_in_group("web")).await.unwrap();
        assert!(web.iter().all(|n| n.status == NodeStatus::Suspended));
        compute.resume_nodes_matching(node_in_group("web")).await.unwrap();
        compute.reboot_nodes_matching(node_id_in([db[0].id.clone()])).await.unwrap();

        let err = compute.reboot_nodes_matching(node_in_group("cache")).await.unwrap_err();
        assert!(matches!(err, Error::NoSuchElement(_)));
        assert_eq!(err.to_string(), "no nodes matched filter");

        assert!(compute.destroy_nodes_matching(node_in_group("cache")).await.unwrap().is_empty());
        let destroyed = compute.destroy_nodes_matching(node_in_group("web")).await.unwrap();
        assert_eq!(destroyed.len(), 2);
        assert_eq!(compute.list_nodes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_matching_operations_skip_terminated_nodes() {
        let compute = service();
        compute.adapter().keep_terminated_nodes(true);
        let template = compute.template_builder().await.unwrap().build().unwrap();
        let nodes = compute.create_nodes_in_group("web", 2, template).await.unwrap();
        compute.destroy_nodes_matching(node_in_group("web")).await.unwrap();

        let listed = compute.list_nodes_details_matching(node_in_group("web")).await.unwrap();
        assert_eq!(listed.len(), nodes.len());
        assert!(listed.iter().all(|n| n.status == NodeStatus::Terminated));

        let err = compute.reboot_nodes_matching(node_in_group("web")).await.unwrap_err();
        assert!(matches!(err, Error::NoSuchElement(_)));
        let err = compute.suspend_nodes_matching(node_in_group("web")).await.unwrap_err();
        assert!(matches!(err, Error::NoSuchElement(_)));
        assert!(compute.destroy_nodes_matching(node_in_group("web")).await.unwrap().is_empty());
    }

    #[test]
    fn test_timeouts_from_properties() {
        let mut props = crate::config::default_properties();
        props.set("stub.timeout.node-running", "5000");
        let timeouts = NodeTimeouts::from_properties("stub", &props).unwrap();
        assert_eq!(timeouts.node_running, Duration::from_secs(5));
        assert_eq!(timeouts.node_terminated, Duration::from_secs(30));
        assert_eq!(timeouts.poll_period, Duration::from_millis(50));
    }
}
