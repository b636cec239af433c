//! Portable blob storage

pub mod domain;
pub mod transient;

use async_trait::async_trait;

use crate::compute::domain::Location;
use crate::error::Result;

pub use domain::{
    Blob, BlobMetadata, GetOptions, ListContainerOptions, PageSet, StorageMetadata, StorageType,
};
pub use transient::TransientBlobStore;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// All containers.
    async fn list(&self) -> Result<PageSet<StorageMetadata>>;

    async fn container_exists(&self, container: &str) -> Result<bool>;

    /// `false` when the container already existed.
    async fn create_container_in_location(&self, location: Option<&Location>, container: &str) -> Result<bool>;

    async fn list_container(
        &self,
        container: &str,
        options: &ListContainerOptions,
    ) -> Result<PageSet<StorageMetadata>>;

    async fn clear_container(&self, container: &str) -> Result<()>;

    async fn delete_container(&self, container: &str) -> Result<()>;

    /// `false` when the container still holds blobs.
    async fn delete_container_if_empty(&self, container: &str) -> Result<bool>;

    async fn blob_exists(&self, container: &str, name: &str) -> Result<bool>;

    /// Store a blob and return its etag.
    async fn put_blob(&self, container: &str, blob: Blob) -> Result<String>;

    async fn get_blob(&self, container: &str, name: &str, options: &GetOptions) -> Result<Option<Blob>>;

    async fn blob_metadata(&self, container: &str, name: &str) -> Result<Option<BlobMetadata>>;

    async fn remove_blob(&self, container: &str, name: &str) -> Result<()>;

    async fn count_blobs(&self, container: &str) -> Result<u64>;
}
