//! Backend collaborator contract.
//!
//! The resolver and handles decide *which* backend object to address and
//! *how* to page through listings; the actual I/O is delegated to these
//! collaborators. Cloud SDK adapters implement [`BlobStore`] and
//! [`FileShareStore`]; the in-memory implementations in [`memory`] serve
//! tests and local development.
//!
//! # Design Principles
//! - Collaborators are stateless with respect to handles: every call names
//!   the account and the address it operates on
//! - Streams are plain tokio `AsyncRead`/`AsyncWrite`; a write is committed
//!   when the writer is shut down
//! - Listing is one page per call; the continuation token is opaque

pub mod local;
pub mod memory;

use async_trait::async_trait;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};
use url::Url;

use uristore_common::{ContinuationToken, Error, PropertyBag, Result};

use crate::account::StorageAccount;
use crate::location::{child_uri, segments};

pub use local::LocalFileSystem;
pub use memory::{MemoryBlobStore, MemoryFileShareStore};

/// Readable byte stream returned by `open_read`.
pub type BoxReader = Pin<Box<dyn AsyncRead + Send>>;

/// Writable byte stream returned by `open_write`.
///
/// Contents are committed on `shutdown`.
pub type BoxWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Address of a blob or virtual blob directory within an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobAddress {
    /// Container name.
    pub container: String,
    /// Blob name within the container. Empty for the container root;
    /// ends with `/` for a virtual directory.
    pub name: String,
}

impl BlobAddress {
    /// Split a blob URI into container and blob name.
    ///
    /// # Errors
    /// - `InvalidLocationForBackend` if the URI names no container
    pub fn from_url(uri: &Url) -> Result<Self> {
        let mut parts = segments(uri).into_iter();
        let container = parts.next().ok_or_else(|| {
            Error::InvalidLocationForBackend(format!("Blob location {} names no container", uri))
        })?;
        let mut name = parts.collect::<Vec<_>>().join("/");
        if !name.is_empty() && uri.path().ends_with('/') {
            name.push('/');
        }
        Ok(Self { container, name })
    }

    /// Whether this addresses the container itself.
    pub fn is_container_root(&self) -> bool {
        self.name.is_empty()
    }

    /// Whether this addresses a blob (not a container or virtual directory).
    pub fn is_blob(&self) -> bool {
        !self.name.is_empty() && !self.name.ends_with('/')
    }

    /// The same address viewed as a virtual directory (`name/`).
    pub fn as_directory(&self) -> Self {
        let mut name = self.name.clone();
        if !name.is_empty() && !name.ends_with('/') {
            name.push('/');
        }
        Self {
            container: self.container.clone(),
            name,
        }
    }

    /// URI of this address on `base`'s host; directories end with a slash.
    pub fn to_url(&self, base: &Url) -> Result<Url> {
        let mut parts = vec![self.container.as_str()];
        parts.extend(self.name.split('/').filter(|s| !s.is_empty()));
        child_uri(base, &parts, !self.is_blob())
    }

    /// The enclosing virtual directory or container root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_container_root() {
            return None;
        }
        let trimmed = self.name.trim_end_matches('/');
        let name = match trimmed.rfind('/') {
            Some(idx) => trimmed[..=idx].to_string(),
            None => String::new(),
        };
        Some(Self {
            container: self.container.clone(),
            name,
        })
    }
}

/// Address of a file or directory within a file share.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShareAddress {
    /// Share name.
    pub share: String,
    /// Directory and file names below the share root.
    pub path: Vec<String>,
}

impl ShareAddress {
    /// Split a file-share URI into share and path.
    ///
    /// # Errors
    /// - `InvalidLocationForBackend` if the URI names no share
    pub fn from_url(uri: &Url) -> Result<Self> {
        let mut parts = segments(uri).into_iter();
        let share = parts.next().ok_or_else(|| {
            Error::InvalidLocationForBackend(format!("File-share location {} names no share", uri))
        })?;
        Ok(Self {
            share,
            path: parts.collect(),
        })
    }

    /// Whether this addresses the share root directory.
    pub fn is_share_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Path below the share root joined with `/`.
    pub fn key(&self) -> String {
        self.path.join("/")
    }

    /// URI of this address on `base`'s host.
    pub fn to_url(&self, base: &Url, directory: bool) -> Result<Url> {
        let mut parts = vec![self.share.as_str()];
        parts.extend(self.path.iter().map(String::as_str));
        child_uri(base, &parts, directory)
    }

    /// The enclosing directory; `None` at the share root.
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.path.split_last()?;
        Some(Self {
            share: self.share.clone(),
            path: rest.to_vec(),
        })
    }

    /// A child of this directory.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        path.push(name.into());
        Self {
            share: self.share.clone(),
            path,
        }
    }
}

/// One entry of a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Blob stores: the full blob name within the container.
    /// File shares: the entry's name within the listed directory.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_container: bool,
}

/// One page of a backend listing.
#[derive(Debug, Clone, Default)]
pub struct ListSegment {
    pub entries: Vec<ListEntry>,
    /// Token for the next page; `None` once the listing is exhausted.
    pub next: Option<ContinuationToken>,
}

/// Cloud blob store collaborator.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Get the store name (e.g., "memory-blob").
    fn name(&self) -> &str;

    /// Open a blob for reading.
    ///
    /// # Errors
    /// - `NotFound` if the blob does not exist
    async fn open_read(&self, account: &StorageAccount, blob: &BlobAddress) -> Result<BoxReader>;

    /// Open a blob for writing; the blob is committed when the writer shuts down.
    ///
    /// # Errors
    /// - `AlreadyExists` if `overwrite` is false and the blob exists
    /// - `NotFound` if the container does not exist
    async fn open_write(
        &self,
        account: &StorageAccount,
        blob: &BlobAddress,
        overwrite: bool,
        size_hint: Option<u64>,
    ) -> Result<BoxWriter>;

    async fn exists(&self, account: &StorageAccount, blob: &BlobAddress) -> Result<bool>;

    /// Delete a blob.
    async fn delete(&self, account: &StorageAccount, blob: &BlobAddress) -> Result<()>;

    /// Fetch blob properties.
    async fn properties(&self, account: &StorageAccount, blob: &BlobAddress) -> Result<PropertyBag>;

    async fn container_exists(&self, account: &StorageAccount, container: &str) -> Result<bool>;

    /// Create the container unless it already exists.
    async fn create_container_if_not_exists(
        &self,
        account: &StorageAccount,
        container: &str,
    ) -> Result<()>;

    /// Delete a container and everything in it.
    async fn delete_container(&self, account: &StorageAccount, container: &str) -> Result<()>;

    async fn container_properties(
        &self,
        account: &StorageAccount,
        container: &str,
    ) -> Result<PropertyBag>;

    /// List one page of blobs (flat) whose names start with `prefix`.
    async fn list_segment(
        &self,
        account: &StorageAccount,
        container: &str,
        prefix: &str,
        max_results: usize,
        token: Option<&ContinuationToken>,
    ) -> Result<ListSegment>;
}

/// Cloud file-share collaborator.
#[async_trait]
pub trait FileShareStore: Send + Sync {
    /// Get the store name (e.g., "memory-file-share").
    fn name(&self) -> &str;

    /// Open a file for reading.
    async fn open_read(&self, account: &StorageAccount, file: &ShareAddress) -> Result<BoxReader>;

    /// Open a file for writing; committed when the writer shuts down.
    ///
    /// # Errors
    /// - `AlreadyExists` if `overwrite` is false and the file exists
    /// - `NotFound` if the parent directory does not exist
    async fn open_write(
        &self,
        account: &StorageAccount,
        file: &ShareAddress,
        overwrite: bool,
        size_hint: Option<u64>,
    ) -> Result<BoxWriter>;

    async fn exists(&self, account: &StorageAccount, file: &ShareAddress) -> Result<bool>;

    async fn delete(&self, account: &StorageAccount, file: &ShareAddress) -> Result<()>;

    async fn properties(
        &self,
        account: &StorageAccount,
        file: &ShareAddress,
    ) -> Result<PropertyBag>;

    /// Create the share unless it already exists.
    async fn create_share_if_not_exists(&self, account: &StorageAccount, share: &str) -> Result<()>;

    /// Whether a directory exists; the share root exists iff the share does.
    async fn directory_exists(&self, account: &StorageAccount, dir: &ShareAddress) -> Result<bool>;

    /// Create one directory level unless it already exists.
    ///
    /// # Errors
    /// - `NotFound` if the parent directory does not exist
    async fn create_directory_if_not_exists(
        &self,
        account: &StorageAccount,
        dir: &ShareAddress,
    ) -> Result<()>;

    /// Delete a directory; the share root deletes the share.
    async fn delete_directory(&self, account: &StorageAccount, dir: &ShareAddress) -> Result<()>;

    async fn directory_properties(
        &self,
        account: &StorageAccount,
        dir: &ShareAddress,
    ) -> Result<PropertyBag>;

    /// List one page of a directory's direct children whose names start
    /// with `prefix`.
    async fn list_segment(
        &self,
        account: &StorageAccount,
        dir: &ShareAddress,
        prefix: &str,
        max_results: usize,
        token: Option<&ContinuationToken>,
    ) -> Result<ListSegment>;
}
