//! In-memory blob store
//!
//! Backs the `transient` provider. Listings follow the usual object store
//! rules: names sort lexically, a marker resumes strictly after itself, and
//! a non-recursive listing folds everything below the next `/` into one
//! `RelativePath` entry.

use async_trait::async_trait;
use chrono::Utc;
use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::domain::{
    Blob, BlobMetadata, GetOptions, ListContainerOptions, PageSet, StorageMetadata, StorageType,
    DEFAULT_MAX_RESULTS,
};
use super::BlobStore;
use crate::compute::domain::{Location, LocationScope};
use crate::error::{Error, Result};
use crate::http::request::Payload;

pub const PROVIDER: &str = "transient";

const DELIMITER: char = '/';
const FOLDER_SUFFIX: &str = "_$folder$";
const DIRECTORY_CONTENT_TYPE: &str = "application/directory";

#[derive(Debug, Default)]
struct Container {
    location: Option<Location>,
    blobs: BTreeMap<String, Blob>,
}

#[derive(Debug)]
pub struct TransientBlobStore {
    containers: RwLock<BTreeMap<String, Container>>,
    default_location: Location,
}

impl Default for TransientBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Name of the directory a marker blob stands for, if it is one.
fn directory_name(metadata: &BlobMetadata) -> Option<String> {
    let name = &metadata.name;
    if let Some(dir) = name.strip_suffix(FOLDER_SUFFIX) {
        return Some(dir.to_string());
    }
    if metadata.content.content_type.as_deref() == Some(DIRECTORY_CONTENT_TYPE) {
        return Some(name.trim_end_matches(DELIMITER).to_string());
    }
    None
}

/// The prefix with exactly one trailing delimiter.
fn directory_prefix(prefix: &str) -> String {
    if prefix.ends_with(DELIMITER) {
        prefix.to_string()
    } else {
        format!("{}{}", prefix, DELIMITER)
    }
}

/// First path segment below `prefix`, when the name has more segments.
fn common_prefix(name: &str, prefix: Option<&str>) -> Option<String> {
    let working = match prefix {
        Some(p) => {
            let to_match = directory_prefix(p);
            name.strip_prefix(to_match.as_str()).unwrap_or(name)
        }
        None => name,
    };
    working.find(DELIMITER).map(|i| working[..i].to_string())
}

/// Entries directly inside `prefix`, not in a subdirectory of it.
fn is_direct_child(name: &str, prefix: Option<&str>) -> bool {
    match prefix {
        None => !name.contains(DELIMITER),
        Some(p) => {
            let to_match = directory_prefix(p);
            match name.strip_prefix(to_match.as_str()) {
                Some("") | None => false,
                Some(rest) => !rest.contains(DELIMITER),
            }
        }
    }
}

fn status_error(container: &str, name: &str, status: u16, message: impl Into<String>) -> Error {
    Error::HttpResponse {
        command: format!("GET {}/{}", container, name),
        status,
        message: message.into(),
        body: None,
    }
}

fn slice_ranges(data: &[u8], ranges: &[String]) -> Result<Vec<u8>> {
    let len = data.len();
    let mut out = Vec::new();
    for range in ranges {
        let invalid = || Error::illegal_argument(format!("invalid range {}", range));
        let (start, end) = if let Some(tail) = range.strip_prefix('-') {
            let n: usize = tail.parse().map_err(|_| invalid())?;
            (len.saturating_sub(n), len)
        } else if let Some(head) = range.strip_suffix('-') {
            let first: usize = head.parse().map_err(|_| invalid())?;
            (first.min(len), len)
        } else if let Some((first, last)) = range.split_once('-') {
            let first: usize = first.parse().map_err(|_| invalid())?;
            let last: usize = last.parse().map_err(|_| invalid())?;
            (first.min(len), last.saturating_add(1).min(len))
        } else {
            return Err(invalid());
        };
        if start < end {
            out.extend_from_slice(&data[start..end]);
        }
    }
    Ok(out)
}

impl TransientBlobStore {
    pub fn new() -> Self {
        Self::with_default_location(Location::new(LocationScope::Provider, PROVIDER, PROVIDER))
    }

    pub fn with_default_location(default_location: Location) -> Self {
        Self {
            containers: RwLock::new(BTreeMap::new()),
            default_location,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Container>> {
        self.containers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Container>> {
        self.containers.write().unwrap_or_else(|e| e.into_inner())
    }

    fn container_not_found(containers: &BTreeMap<String, Container>, name: &str) -> Error {
        let names: Vec<&str> = containers.keys().map(String::as_str).collect();
        Error::container_not_found(name, format!("container {} not in {:?}", name, names))
    }

    fn copy_metadata(metadata: &BlobMetadata) -> BlobMetadata {
        let mut copy = metadata.clone();
        copy.user_metadata = metadata
            .user_metadata
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.clone()))
            .collect();
        copy
    }

    fn list_entries(container: &Container, options: &ListContainerOptions) -> PageSet<StorageMetadata> {
        let mut contents: Vec<StorageMetadata> = container
            .blobs
            .values()
            .map(|blob| {
                let metadata = Self::copy_metadata(&blob.metadata);
                let mut entry = metadata.to_storage_metadata();
                if let Some(dir) = directory_name(&metadata) {
                    entry.name = dir;
                    entry.storage_type = StorageType::RelativePath;
                }
                entry
            })
            .collect();
        contents.sort_by(|a, b| a.name.cmp(&b.name));
        contents.dedup_by(|a, b| a.name == b.name);

        if let Some(marker) = &options.marker {
            contents.retain(|m| m.name.as_str() > marker.as_str());
        }

        let prefix = options.dir.as_deref();
        if let Some(p) = prefix {
            contents.retain(|m| m.name.starts_with(p) && m.name != p);
        }

        let max_results = options.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
        let mut next_marker = None;
        if contents.len() > max_results {
            contents.truncate(max_results);
            next_marker = contents.last().map(|m| m.name.clone());
        }

        if !options.recursive {
            let mut prefixes: Vec<String> = contents
                .iter()
                .filter_map(|m| common_prefix(&m.name, prefix))
                .collect();
            prefixes.sort();
            prefixes.dedup();

            contents.retain(|m| is_direct_child(&m.name, prefix));
            contents.extend(
                prefixes
                    .into_iter()
                    .map(|p| StorageMetadata::new(StorageType::RelativePath, p)),
            );
            contents.sort_by(|a, b| a.name.cmp(&b.name));
        }

        if !options.detailed {
            for entry in &mut contents {
                entry.user_metadata.clear();
            }
        }
        PageSet::new(contents, next_marker)
    }
}

#[async_trait]
impl BlobStore for TransientBlobStore {
    async fn list(&self) -> Result<PageSet<StorageMetadata>> {
        let containers = self.read();
        let items = containers
            .iter()
            .map(|(name, c)| StorageMetadata {
                location: c.location.clone(),
                ..StorageMetadata::new(StorageType::Container, name.clone())
            })
            .collect();
        Ok(PageSet::new(items, None))
    }

    async fn container_exists(&self, container: &str) -> Result<bool> {
        Ok(self.read().contains_key(container))
    }

    async fn create_container_in_location(&self, location: Option<&Location>, container: &str) -> Result<bool> {
        let mut containers = self.write();
        if containers.contains_key(container) {
            return Ok(false);
        }
        containers.insert(
            container.to_string(),
            Container {
                location: Some(location.cloned().unwrap_or_else(|| self.default_location.clone())),
                blobs: BTreeMap::new(),
            },
        );
        tracing::debug!("Created container {}", container);
        Ok(true)
    }

    async fn list_container(
        &self,
        container: &str,
        options: &ListContainerOptions,
    ) -> Result<PageSet<StorageMetadata>> {
        let containers = self.read();
        let entry = containers
            .get(container)
            .ok_or_else(|| Self::container_not_found(&containers, container))?;
        Ok(Self::list_entries(entry, options))
    }

    async fn clear_container(&self, container: &str) -> Result<()> {
        let mut containers = self.write();
        match containers.get_mut(container) {
            Some(entry) => {
                entry.blobs.clear();
                Ok(())
            }
            None => Err(Self::container_not_found(&containers, container)),
        }
    }

    async fn delete_container(&self, container: &str) -> Result<()> {
        self.write().remove(container);
        Ok(())
    }

    async fn delete_container_if_empty(&self, container: &str) -> Result<bool> {
        let mut containers = self.write();
        match containers.get(container) {
            Some(entry) if !entry.blobs.is_empty() => Ok(false),
            Some(_) => {
                containers.remove(container);
                Ok(true)
            }
            None => Ok(true),
        }
    }

    async fn blob_exists(&self, container: &str, name: &str) -> Result<bool> {
        let containers = self.read();
        containers
            .get(container)
            .map(|c| c.blobs.contains_key(name))
            .ok_or_else(|| Self::container_not_found(&containers, container))
    }

    async fn put_blob(&self, container: &str, blob: Blob) -> Result<String> {
        let mut containers = self.write();
        if !containers.contains_key(container) {
            return Err(Self::container_not_found(&containers, container));
        }

        let Blob { metadata, payload } = blob;
        let md5 = Md5::digest(payload.as_bytes()).to_vec();
        let etag = hex(&md5);

        let mut stored = Self::copy_metadata(&metadata);
        stored.container = Some(container.to_string());
        stored.size = Some(payload.len() as u64);
        stored.etag = Some(etag.clone());
        stored.last_modified = Some(Utc::now());
        stored.content.content_md5 = Some(md5);
        stored.content.content_length = Some(payload.len() as u64);
        if stored.content.content_type.is_none() {
            stored.content.content_type = payload.metadata.content_type.clone();
        }

        let mut payload = payload;
        payload.metadata = stored.content.clone();
        let name = stored.name.clone();
        if let Some(entry) = containers.get_mut(container) {
            entry.blobs.insert(name.clone(), Blob { metadata: stored, payload });
        }
        tracing::debug!("Stored {}/{} etag={}", container, name, etag);
        Ok(etag)
    }

    async fn get_blob(&self, container: &str, name: &str, options: &GetOptions) -> Result<Option<Blob>> {
        let containers = self.read();
        let entry = containers
            .get(container)
            .ok_or_else(|| Self::container_not_found(&containers, container))?;
        let Some(blob) = entry.blobs.get(name) else {
            return Ok(None);
        };
        let etag = blob.metadata.etag.as_deref().unwrap_or_default();

        if let Some(if_match) = &options.if_match {
            if if_match != etag {
                return Err(status_error(container, name, 412, "Precondition Failed"));
            }
        }
        if let Some(if_none_match) = &options.if_none_match {
            if if_none_match == etag {
                return Err(status_error(container, name, 304, "Not Modified"));
            }
        }
        if let (Some(since), Some(modified)) = (options.if_modified_since, blob.metadata.last_modified) {
            if modified < since {
                return Err(status_error(container, name, 304, format!("{} is before {}", modified, since)));
            }
        }
        if let (Some(since), Some(modified)) = (options.if_unmodified_since, blob.metadata.last_modified) {
            if modified > since {
                return Err(status_error(container, name, 412, format!("{} is after {}", modified, since)));
            }
        }

        let mut copy = Blob {
            metadata: Self::copy_metadata(&blob.metadata),
            payload: blob.payload.clone(),
        };
        if !options.ranges.is_empty() {
            let data = slice_ranges(blob.payload.as_bytes(), &options.ranges)?;
            let mut payload = Payload::from_bytes(data);
            payload.metadata.content_type = blob.payload.metadata.content_type.clone();
            copy.metadata.content.content_length = Some(payload.len() as u64);
            copy.payload = payload;
        }
        Ok(Some(copy))
    }

    async fn blob_metadata(&self, container: &str, name: &str) -> Result<Option<BlobMetadata>> {
        let containers = self.read();
        let entry = containers
            .get(container)
            .ok_or_else(|| Self::container_not_found(&containers, container))?;
        Ok(entry.blobs.get(name).map(|b| Self::copy_metadata(&b.metadata)))
    }

    async fn remove_blob(&self, container: &str, name: &str) -> Result<()> {
        if let Some(entry) = self.write().get_mut(container) {
            entry.blobs.remove(name);
        }
        Ok(())
    }

    async fn count_blobs(&self, container: &str) -> Result<u64> {
        let containers = self.read();
        containers
            .get(container)
            .map(|c| c.blobs.len() as u64)
            .ok_or_else(|| Self::container_not_found(&containers, container))
    }
}
