//! The small surface a provider implements to get a full compute service

use async_trait::async_trait;

use super::domain::{Hardware, Image, Location, LoginCredentials, NodeMetadata, Template};
use crate::error::Result;

/// A freshly created node together with the credentials the provider handed
/// out at creation time, if any.
#[derive(Debug, Clone)]
pub struct NodeAndInitialCredentials<N> {
    pub node: N,
    pub node_id: String,
    pub credentials: Option<LoginCredentials>,
}

impl<N> NodeAndInitialCredentials<N> {
    pub fn new(node: N, node_id: impl Into<String>, credentials: Option<LoginCredentials>) -> Self {
        Self {
            node,
            node_id: node_id.into(),
            credentials,
        }
    }
}

/// Provider operations, in the provider's own types.
#[async_trait]
pub trait ComputeServiceAdapter: Send + Sync {
    type Node: Clone + Send + Sync;
    type Hardware: Clone + Send + Sync;
    type Image: Clone + Send + Sync;
    type Location: Clone + Send + Sync;

    /// Create one node; `name` already encodes the group.
    async fn create_node_with_group_encoded_into_name(
        &self,
        group: &str,
        name: &str,
        template: &Template,
    ) -> Result<NodeAndInitialCredentials<Self::Node>>;

    async fn list_hardware_profiles(&self) -> Result<Vec<Self::Hardware>>;

    async fn list_images(&self) -> Result<Vec<Self::Image>>;

    async fn get_image(&self, id: &str) -> Result<Option<Self::Image>>;

    async fn list_locations(&self) -> Result<Vec<Self::Location>>;

    async fn list_nodes(&self) -> Result<Vec<Self::Node>>;

    async fn list_nodes_by_ids(&self, ids: &[String]) -> Result<Vec<Self::Node>>;

    async fn get_node(&self, id: &str) -> Result<Option<Self::Node>>;

    async fn destroy_node(&self, id: &str) -> Result<()>;

    async fn reboot_node(&self, id: &str) -> Result<()>;

    async fn resume_node(&self, id: &str) -> Result<()>;

    async fn suspend_node(&self, id: &str) -> Result<()>;
}

/// Converts an adapter's provider objects to the portable domain.
pub trait PortableTransform<A: ComputeServiceAdapter + ?Sized>: Send + Sync {
    fn to_node(&self, node: &A::Node) -> Result<NodeMetadata>;

    fn to_image(&self, image: &A::Image) -> Result<Image>;

    fn to_hardware(&self, hardware: &A::Hardware) -> Result<Hardware>;

    fn to_location(&self, location: &A::Location) -> Result<Location>;
}

/// For adapters that already speak the portable types.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl<A> PortableTransform<A> for IdentityTransform
where
    A: ComputeServiceAdapter<Node = NodeMetadata, Hardware = Hardware, Image = Image, Location = Location>
        + ?Sized,
{
    fn to_node(&self, node: &NodeMetadata) -> Result<NodeMetadata> {
        Ok(node.clone())
    }

    fn to_image(&self, image: &Image) -> Result<Image> {
        Ok(image.clone())
    }

    fn to_hardware(&self, hardware: &Hardware) -> Result<Hardware> {
        Ok(hardware.clone())
    }

    fn to_location(&self, location: &Location) -> Result<Location> {
        Ok(location.clone())
    }
}
