//! Blob storage types and request options

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::compute::domain::Location;
use crate::http::request::{ContentMetadata, Payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StorageType {
    Container,
    Blob,
    /// A blob standing in for a directory
    Folder,
    /// A common prefix folded out of a non-recursive listing
    RelativePath,
}

/// One entry of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageMetadata {
    pub storage_type: StorageType,
    pub name: String,
    pub location: Option<Location>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub size: Option<u64>,
    pub user_metadata: BTreeMap<String, String>,
}

impl StorageMetadata {
    pub fn new(storage_type: StorageType, name: impl Into<String>) -> Self {
        Self {
            storage_type,
            name: name.into(),
            location: None,
            etag: None,
            last_modified: None,
            size: None,
            user_metadata: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlobMetadata {
    pub name: String,
    pub container: Option<String>,
    pub size: Option<u64>,
    pub content: ContentMetadata,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    /// Keys are lowercased when the blob is stored
    pub user_metadata: BTreeMap<String, String>,
}

impl BlobMetadata {
    pub fn to_storage_metadata(&self) -> StorageMetadata {
        StorageMetadata {
            storage_type: StorageType::Blob,
            name: self.name.clone(),
            location: None,
            etag: self.etag.clone(),
            last_modified: self.last_modified,
            size: self.size,
            user_metadata: self.user_metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub metadata: BlobMetadata,
    pub payload: Payload,
}

impl Blob {
    pub fn new(name: impl Into<String>, payload: Payload) -> Self {
        let metadata = BlobMetadata {
            name: name.into(),
            size: Some(payload.len() as u64),
            content: payload.metadata.clone(),
            ..Default::default()
        };
        Self { metadata, payload }
    }

    pub fn with_user_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.user_metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        let content_type = content_type.into();
        self.payload.metadata.content_type = Some(content_type.clone());
        self.metadata.content.content_type = Some(content_type);
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

/// A page of a listing and the marker to continue from.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSet<T> {
    pub items: Vec<T>,
    pub next_marker: Option<String>,
}

impl<T> PageSet<T> {
    pub fn new(items: Vec<T>, next_marker: Option<String>) -> Self {
        Self { items, next_marker }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> IntoIterator for PageSet<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

// =============================================================================
// Options
// =============================================================================

pub const DEFAULT_MAX_RESULTS: usize = 1000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListContainerOptions {
    pub dir: Option<String>,
    pub marker: Option<String>,
    pub max_results: Option<usize>,
    pub recursive: bool,
    pub detailed: bool,
}

impl ListContainerOptions {
    pub fn in_directory(mut self, dir: impl Into<String>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn after_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn max_results(mut self, max: usize) -> Self {
        self.max_results = Some(max);
        self
    }

    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    pub fn with_details(mut self) -> Self {
        self.detailed = true;
        self
    }
}

/// Conditions and byte ranges for a blob read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<DateTime<Utc>>,
    pub if_unmodified_since: Option<DateTime<Utc>>,
    /// `a-b`, `a-` or `-n`
    pub ranges: Vec<String>,
}

impl GetOptions {
    pub fn if_etag_matches(mut self, etag: impl Into<String>) -> Self {
        self.if_match = Some(etag.into());
        self
    }

    pub fn if_etag_doesnt_match(mut self, etag: impl Into<String>) -> Self {
        self.if_none_match = Some(etag.into());
        self
    }

    pub fn if_modified_since(mut self, since: DateTime<Utc>) -> Self {
        self.if_modified_since = Some(since);
        self
    }

    pub fn if_unmodified_since(mut self, since: DateTime<Utc>) -> Self {
        self.if_unmodified_since = Some(since);
        self
    }

    pub fn range(mut self, first: u64, last: u64) -> Self {
        self.ranges.push(format!("{}-{}", first, last));
        self
    }

    pub fn start_at(mut self, first: u64) -> Self {
        self.ranges.push(format!("{}-", first));
        self
    }

    pub fn tail(mut self, count: u64) -> Self {
        self.ranges.push(format!("-{}", count));
        self
    }
}
