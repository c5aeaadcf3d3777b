//! Location resolution into backend handles.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use uristore_common::{BackendKind, Error, Result};

use crate::account::StorageAccount;
use crate::backend::{BlobAddress, BlobStore, FileShareStore, LocalFileSystem, ShareAddress};
use crate::classify::Classifier;
use crate::config::{ListingDefaults, StorageSettings};
use crate::container::StorageContainer;
use crate::item::StorageItem;
use crate::location::normalize;
use crate::registry::AccountRegistry;

/// The backend object a handle addresses.
///
/// Chosen once when the location is resolved; operations match on it and
/// never re-classify. Cloud variants carry their owning account.
#[derive(Debug, Clone)]
pub enum NativeTarget {
    /// Absolute local filesystem path.
    Local(PathBuf),
    /// Blob, virtual blob directory or container root.
    Blob {
        account: Arc<StorageAccount>,
        address: BlobAddress,
    },
    /// File or directory within a file share.
    FileShare {
        account: Arc<StorageAccount>,
        address: ShareAddress,
    },
}

impl NativeTarget {
    pub fn kind(&self) -> BackendKind {
        match self {
            NativeTarget::Local(_) => BackendKind::LocalFile,
            NativeTarget::Blob { .. } => BackendKind::CloudBlob,
            NativeTarget::FileShare { .. } => BackendKind::CloudFileShare,
        }
    }

    /// The owning account; `None` for local targets.
    pub fn account(&self) -> Option<&Arc<StorageAccount>> {
        match self {
            NativeTarget::Local(_) => None,
            NativeTarget::Blob { account, .. } | NativeTarget::FileShare { account, .. } => {
                Some(account)
            }
        }
    }
}

#[derive(Clone)]
struct ResolverInner {
    registry: Arc<AccountRegistry>,
    classifier: Classifier,
    blob: Option<Arc<dyn BlobStore>>,
    file_share: Option<Arc<dyn FileShareStore>>,
    local: LocalFileSystem,
    listing: ListingDefaults,
}

/// Turns locations into item and container handles.
///
/// Cheap to clone; every handle keeps a clone so it can produce related
/// handles (parents, children, copy destinations) against the same
/// registry and backends.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<ResolverInner>,
}

impl Resolver {
    /// Start building a resolver from settings.
    pub fn builder(settings: StorageSettings) -> ResolverBuilder {
        ResolverBuilder::new(settings)
    }

    /// The account registry used for cloud locations.
    pub fn registry(&self) -> &Arc<AccountRegistry> {
        &self.inner.registry
    }

    /// A resolver identical to this one but resolving accounts from `registry`.
    pub fn with_registry(&self, registry: Arc<AccountRegistry>) -> Self {
        let mut inner = (*self.inner).clone();
        inner.registry = registry;
        Self { inner: Arc::new(inner) }
    }

    /// Defaults applied to unsegmented listings.
    pub fn listing_defaults(&self) -> &ListingDefaults {
        &self.inner.listing
    }

    /// Classify an absolute URI.
    pub fn classify(&self, uri: &Url) -> BackendKind {
        self.inner.classifier.classify(uri)
    }

    /// Resolve a location to an item handle.
    ///
    /// # Errors
    /// - `MalformedLocation` if the location is neither a URI nor a path
    /// - `AccountNotFound` if a cloud location has no configured account
    /// - `InvalidLocationForBackend` if the location cannot name an item
    ///   (a container root, a share root, a non-file local URI)
    /// - `BackendUnavailable` if no store is configured for the backend
    pub fn create_item(&self, location: &str) -> Result<StorageItem> {
        self.item_from_url(normalize(location)?)
    }

    /// Resolve a location to a container handle without touching storage.
    ///
    /// # Errors
    /// As for [`Resolver::create_item`]; container and share roots are valid.
    pub fn create_container(&self, location: &str) -> Result<StorageContainer> {
        self.container_from_url(normalize(location)?)
    }

    /// Resolve an absolute URI to an item handle.
    pub fn item_from_url(&self, uri: Url) -> Result<StorageItem> {
        let target = match self.classify(&uri) {
            BackendKind::LocalFile => {
                let path = local_path(&uri)?;
                if path.file_name().is_none() {
                    return Err(Error::InvalidLocationForBackend(format!(
                        "{} does not name a file",
                        uri
                    )));
                }
                NativeTarget::Local(path)
            }
            BackendKind::CloudBlob => {
                self.blob_store()?;
                let account = self.resolve_account(&uri)?;
                let address = BlobAddress::from_url(&uri)?;
                if !address.is_blob() {
                    return Err(Error::InvalidLocationForBackend(format!(
                        "{} does not name a blob",
                        uri
                    )));
                }
                NativeTarget::Blob { account, address }
            }
            BackendKind::CloudFileShare => {
                self.file_share_store()?;
                let account = self.resolve_account(&uri)?;
                let address = ShareAddress::from_url(&uri)?;
                if address.is_share_root() {
                    return Err(Error::InvalidLocationForBackend(format!(
                        "{} does not name a file",
                        uri
                    )));
                }
                NativeTarget::FileShare { account, address }
            }
        };
        debug!("Resolved item {} as {}", uri, target.kind());
        Ok(StorageItem::new(self.clone(), uri, target))
    }

    /// Resolve an absolute URI to a container handle.
    pub fn container_from_url(&self, uri: Url) -> Result<StorageContainer> {
        let target = match self.classify(&uri) {
            BackendKind::LocalFile => NativeTarget::Local(local_path(&uri)?),
            BackendKind::CloudBlob => {
                self.blob_store()?;
                let account = self.resolve_account(&uri)?;
                let address = BlobAddress::from_url(&uri)?.as_directory();
                NativeTarget::Blob { account, address }
            }
            BackendKind::CloudFileShare => {
                self.file_share_store()?;
                let account = self.resolve_account(&uri)?;
                let address = ShareAddress::from_url(&uri)?;
                NativeTarget::FileShare { account, address }
            }
        };
        debug!("Resolved container {} as {}", uri, target.kind());
        Ok(StorageContainer::new(self.clone(), uri, target))
    }

    fn resolve_account(&self, uri: &Url) -> Result<Arc<StorageAccount>> {
        let account = self.inner.registry.resolve_by_url(uri)?;
        debug!("Location {} uses storage account '{}'", uri, account.name());
        Ok(account)
    }

    pub(crate) fn local(&self) -> &LocalFileSystem {
        &self.inner.local
    }

    pub(crate) fn blob_store(&self) -> Result<&Arc<dyn BlobStore>> {
        self.inner
            .blob
            .as_ref()
            .ok_or_else(|| Error::BackendUnavailable("No blob store is configured".to_string()))
    }

    pub(crate) fn file_share_store(&self) -> Result<&Arc<dyn FileShareStore>> {
        self.inner
            .file_share
            .as_ref()
            .ok_or_else(|| {
                Error::BackendUnavailable("No file-share store is configured".to_string())
            })
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("registry", &self.inner.registry)
            .field("blob", &self.inner.blob.as_ref().map(|s| s.name().to_string()))
            .field("file_share", &self.inner.file_share.as_ref().map(|s| s.name().to_string()))
            .finish()
    }
}

fn local_path(uri: &Url) -> Result<PathBuf> {
    uri.to_file_path().map_err(|_| {
        Error::InvalidLocationForBackend(format!("{} is not a local file location", uri))
    })
}

/// Builder for [`Resolver`].
pub struct ResolverBuilder {
    settings: StorageSettings,
    registry: Option<Arc<AccountRegistry>>,
    blob: Option<Arc<dyn BlobStore>>,
    file_share: Option<Arc<dyn FileShareStore>>,
}

impl ResolverBuilder {
    fn new(settings: StorageSettings) -> Self {
        Self {
            settings,
            registry: None,
            blob: None,
            file_share: None,
        }
    }

    /// Account registry to resolve cloud locations against.
    ///
    /// Defaults to an empty registry using the settings' selector.
    pub fn registry(mut self, registry: Arc<AccountRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blob = Some(store);
        self
    }

    pub fn file_share_store(mut self, store: Arc<dyn FileShareStore>) -> Self {
        self.file_share = Some(store);
        self
    }

    /// Build the resolver.
    ///
    /// # Errors
    /// - `InvalidInput` if a settings pattern does not compile
    pub fn build(self) -> Result<Resolver> {
        let classifier = self.settings.classifier()?;
        let registry = match self.registry {
            Some(registry) => registry,
            None => Arc::new(AccountRegistry::with_selector(self.settings.account_selector()?)),
        };
        Ok(Resolver {
            inner: Arc::new(ResolverInner {
                registry,
                classifier,
                blob: self.blob,
                file_share: self.file_share,
                local: LocalFileSystem::new(),
                listing: self.settings.listing,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Credentials;
    use crate::backend::{MemoryBlobStore, MemoryFileShareStore};
    use uristore_common::ErrorKind;

    fn resolver() -> Resolver {
        let registry = AccountRegistry::new();
        registry.register(StorageAccount::new("acct", Credentials::Anonymous));
        Resolver::builder(StorageSettings::default())
            .registry(Arc::new(registry))
            .blob_store(Arc::new(MemoryBlobStore::default()))
            .file_share_store(Arc::new(MemoryFileShareStore::default()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_create_item_per_backend() {
        let r = resolver();

        let blob = r.create_item("https://acct.blob.core.windows.net/c/dir/x.zip").unwrap();
        assert_eq!(blob.kind(), BackendKind::CloudBlob);
        assert_eq!(blob.account().unwrap().name(), "acct");

        let file = r.create_item("https://acct.file.core.windows.net/share/d/x.zip").unwrap();
        assert_eq!(file.kind(), BackendKind::CloudFileShare);

        let local = r.create_item("/tmp/x.zip").unwrap();
        assert_eq!(local.kind(), BackendKind::LocalFile);
        assert!(local.account().is_none());
    }

    #[test]
    fn test_create_item_relative_missing_path() {
        let r = resolver();
        let item = r.create_item("does/not/exist.bin").unwrap();
        let expected = std::env::current_dir().unwrap().join("does/not/exist.bin");
        assert_eq!(item.kind(), BackendKind::LocalFile);
        assert_eq!(item.uri().to_file_path().unwrap(), expected);
    }

    #[test]
    fn test_item_requires_object_name() {
        let r = resolver();
        let err = r.create_item("https://acct.blob.core.windows.net/c").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLocationForBackend);
        let err = r.create_item("https://acct.blob.core.windows.net/c/dir/").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLocationForBackend);
        let err = r.create_item("https://acct.file.core.windows.net/share").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLocationForBackend);
        let err = r.create_item("https://example.com/x.zip").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidLocationForBackend);
    }

    #[test]
    fn test_unknown_account_is_an_error() {
        let r = resolver();
        let err = r.create_item("https://other.blob.core.windows.net/c/x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccountNotFound);
    }

    #[test]
    fn test_missing_store_is_unavailable() {
        let r = Resolver::builder(StorageSettings::default()).build().unwrap();
        let err = r.create_item("https://acct.blob.core.windows.net/c/x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    }

    #[test]
    fn test_create_container_roots() {
        let r = resolver();
        let container = r.create_container("https://acct.blob.core.windows.net/c").unwrap();
        match container.native() {
            NativeTarget::Blob { address, .. } => assert!(address.is_container_root()),
            other => panic!("unexpected target {:?}", other),
        }
        let share = r.create_container("https://acct.file.core.windows.net/share").unwrap();
        assert_eq!(share.kind(), BackendKind::CloudFileShare);
    }

    #[test]
    fn test_with_registry_swaps_accounts() {
        let r = resolver();
        let other = AccountRegistry::new();
        other.register(StorageAccount::new("other", Credentials::Anonymous));
        let swapped = r.with_registry(Arc::new(other));

        assert!(swapped.create_item("https://other.blob.core.windows.net/c/x").is_ok());
        assert!(swapped.create_item("https://acct.blob.core.windows.net/c/x").is_err());
        assert!(r.create_item("https://acct.blob.core.windows.net/c/x").is_ok());
    }
}
