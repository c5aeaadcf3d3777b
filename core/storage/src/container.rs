//! Container handles: directories, blob containers and file-share directories.

use std::path::Path;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tracing::debug;
use url::Url;

use uristore_common::{BackendKind, Error, PropertyBag, Result};

use crate::account::StorageAccount;
use crate::backend::{BlobAddress, ShareAddress};
use crate::item::StorageItem;
use crate::resolver::{NativeTarget, Resolver};

/// Handle to a directory-like location: a local directory, a blob
/// container or virtual blob directory, or a file-share directory.
///
/// Creating a handle never touches storage; use
/// [`StorageContainer::create_if_not_exists`] to materialize it.
pub struct StorageContainer {
    uri: Url,
    target: NativeTarget,
    pub(crate) resolver: Resolver,
    parent: OnceLock<Option<Box<StorageContainer>>>,
    properties: RwLock<Option<Arc<PropertyBag>>>,
}

impl StorageContainer {
    pub(crate) fn new(resolver: Resolver, uri: Url, target: NativeTarget) -> Self {
        Self {
            uri,
            target,
            resolver,
            parent: OnceLock::new(),
            properties: RwLock::new(None),
        }
    }

    /// The container enclosing `target`, or `None` at a namespace root.
    pub(crate) fn parent_of(resolver: &Resolver, uri: &Url, target: &NativeTarget) -> Option<Self> {
        let (parent_uri, parent_target) = match target {
            NativeTarget::Local(path) => {
                let parent = path.parent()?;
                let parent_uri = Url::from_directory_path(parent).ok()?;
                (parent_uri, NativeTarget::Local(parent.to_path_buf()))
            }
            NativeTarget::Blob { account, address } => {
                let parent = address.parent()?;
                let parent_uri = parent.to_url(uri).ok()?;
                (
                    parent_uri,
                    NativeTarget::Blob {
                        account: account.clone(),
                        address: parent,
                    },
                )
            }
            NativeTarget::FileShare { account, address } => {
                let parent = address.parent()?;
                let parent_uri = parent.to_url(uri, true).ok()?;
                (
                    parent_uri,
                    NativeTarget::FileShare {
                        account: account.clone(),
                        address: parent,
                    },
                )
            }
        };
        Some(Self::new(resolver.clone(), parent_uri, parent_target))
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn kind(&self) -> BackendKind {
        self.target.kind()
    }

    pub fn is_cloud(&self) -> bool {
        self.kind().is_cloud()
    }

    /// The owning account; `None` for local directories.
    pub fn account(&self) -> Option<&Arc<StorageAccount>> {
        self.target.account()
    }

    pub fn native(&self) -> &NativeTarget {
        &self.target
    }

    /// Whether the container exists.
    ///
    /// Blob directories are virtual, so for blobs this reports whether the
    /// blob container exists.
    pub async fn exists(&self) -> Result<bool> {
        match &self.target {
            NativeTarget::Local(path) => self.resolver.local().is_dir(path).await,
            NativeTarget::Blob { account, address } => {
                self.resolver
                    .blob_store()?
                    .container_exists(account, &address.container)
                    .await
            }
            NativeTarget::FileShare { account, address } => {
                self.resolver.file_share_store()?.directory_exists(account, address).await
            }
        }
    }

    /// Create the container and any missing ancestors.
    ///
    /// - Local: the directory and all missing parents.
    /// - File share: the share, then each directory level from the share
    ///   root down.
    /// - Blob: the blob container; virtual directories need nothing.
    ///
    /// # Errors
    /// - `BackendUnavailable` if an underlying creation call fails
    pub async fn create_if_not_exists(&self) -> Result<()> {
        match &self.target {
            NativeTarget::Local(path) => self
                .resolver
                .local()
                .create_dir_all(path)
                .await
                .map_err(unavailable)?,
            NativeTarget::Blob { account, address } => self
                .resolver
                .blob_store()?
                .create_container_if_not_exists(account, &address.container)
                .await
                .map_err(unavailable)?,
            NativeTarget::FileShare { account, address } => {
                let store = self.resolver.file_share_store()?;
                store
                    .create_share_if_not_exists(account, &address.share)
                    .await
                    .map_err(unavailable)?;
                let mut dir = ShareAddress {
                    share: address.share.clone(),
                    path: Vec::with_capacity(address.path.len()),
                };
                for name in &address.path {
                    dir = dir.child(name.clone());
                    debug!("Ensuring directory {}/{}", dir.share, dir.key());
                    store
                        .create_directory_if_not_exists(account, &dir)
                        .await
                        .map_err(unavailable)?;
                }
            }
        }
        debug!("Ensured container {}", self.uri);
        Ok(())
    }

    /// Delete the container.
    ///
    /// Local directories are removed recursively. A blob container root
    /// deletes the container; deleting a virtual blob directory does
    /// nothing.
    pub async fn delete(&self) -> Result<()> {
        match &self.target {
            NativeTarget::Local(path) => self.resolver.local().delete_dir(path).await,
            NativeTarget::Blob { account, address } => {
                if address.is_container_root() {
                    self.resolver
                        .blob_store()?
                        .delete_container(account, &address.container)
                        .await
                } else {
                    debug!("Not deleting virtual blob directory {}", self.uri);
                    Ok(())
                }
            }
            NativeTarget::FileShare { account, address } => {
                self.resolver.file_share_store()?.delete_directory(account, address).await
            }
        }
    }

    /// Fetch the container's properties and cache them.
    ///
    /// Blob directories report their container's properties.
    pub async fn fetch_properties(&self) -> Result<Arc<PropertyBag>> {
        let props = match &self.target {
            NativeTarget::Local(path) => self.resolver.local().properties(path).await?,
            NativeTarget::Blob { account, address } => {
                self.resolver
                    .blob_store()?
                    .container_properties(account, &address.container)
                    .await?
            }
            NativeTarget::FileShare { account, address } => {
                self.resolver
                    .file_share_store()?
                    .directory_properties(account, address)
                    .await?
            }
        };
        let props = Arc::new(props);
        *self.properties.write().unwrap_or_else(PoisonError::into_inner) = Some(props.clone());
        Ok(props)
    }

    /// Properties from the last successful fetch.
    pub fn properties(&self) -> Option<Arc<PropertyBag>> {
        self.properties.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The enclosing container, computed once; `None` at a namespace root.
    pub fn parent(&self) -> Option<&StorageContainer> {
        self.parent
            .get_or_init(|| Self::parent_of(&self.resolver, &self.uri, &self.target).map(Box::new))
            .as_deref()
    }

    /// Item handle for `name` below this container.
    ///
    /// `name` may contain `/`-separated directories.
    pub fn item(&self, name: &str) -> Result<StorageItem> {
        let (uri, target) = self.child(name, false)?;
        Ok(StorageItem::new(self.resolver.clone(), uri, target))
    }

    /// Container handle for `name` below this container.
    pub fn container(&self, name: &str) -> Result<StorageContainer> {
        let (uri, target) = self.child(name, true)?;
        Ok(StorageContainer::new(self.resolver.clone(), uri, target))
    }

    fn child(&self, name: &str, directory: bool) -> Result<(Url, NativeTarget)> {
        let parts: Vec<&str> = name.split(['/', '\\']).filter(|s| !s.is_empty()).collect();
        if parts.is_empty() {
            return Err(Error::InvalidInput(format!("'{}' is not a valid child name", name)));
        }
        match &self.target {
            NativeTarget::Local(path) => self.local_child(&path.join(parts.join("/")), directory),
            NativeTarget::Blob { account, address } => {
                let mut child = address.as_directory().name;
                child.push_str(&parts.join("/"));
                if directory {
                    child.push('/');
                }
                self.blob_child(account, &address.container, child)
            }
            NativeTarget::FileShare { account, address } => {
                let child = parts.iter().fold(address.clone(), |dir, part| dir.child(*part));
                self.share_child(account, child, directory)
            }
        }
    }

    pub(crate) fn local_child(&self, path: &Path, directory: bool) -> Result<(Url, NativeTarget)> {
        let uri = if directory {
            Url::from_directory_path(path)
        } else {
            Url::from_file_path(path)
        }
        .map_err(|_| {
            Error::InvalidLocationForBackend(format!("{} is not an absolute path", path.display()))
        })?;
        Ok((uri, NativeTarget::Local(path.to_path_buf())))
    }

    pub(crate) fn blob_child(
        &self,
        account: &Arc<StorageAccount>,
        container: &str,
        name: String,
    ) -> Result<(Url, NativeTarget)> {
        let address = BlobAddress {
            container: container.to_string(),
            name,
        };
        let uri = address.to_url(&self.uri)?;
        Ok((
            uri,
            NativeTarget::Blob {
                account: account.clone(),
                address,
            },
        ))
    }

    pub(crate) fn share_child(
        &self,
        account: &Arc<StorageAccount>,
        address: ShareAddress,
        directory: bool,
    ) -> Result<(Url, NativeTarget)> {
        let uri = address.to_url(&self.uri, directory)?;
        Ok((
            uri,
            NativeTarget::FileShare {
                account: account.clone(),
                address,
            },
        ))
    }
}

impl std::fmt::Debug for StorageContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageContainer")
            .field("uri", &self.uri.as_str())
            .field("kind", &self.kind())
            .finish()
    }
}

/// Report a failed backend call as `BackendUnavailable`.
pub(crate) fn unavailable(err: Error) -> Error {
    match err {
        Error::BackendUnavailable(_) => err,
        other => Error::BackendUnavailable(other.to_string()),
    }
}
