//! Item handles: files and blobs.

use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};
use url::Url;

use uristore_common::{BackendKind, Error, PropertyBag, Result};

use crate::account::StorageAccount;
use crate::backend::{BoxReader, BoxWriter};
use crate::container::StorageContainer;
use crate::resolver::{NativeTarget, Resolver};

/// Handle to a single stored object: a local file, a blob or a file in a
/// file share.
///
/// Handles are bound to one location for their whole lifetime. The parent
/// and the last fetched properties are cached on the handle.
pub struct StorageItem {
    uri: Url,
    target: NativeTarget,
    resolver: Resolver,
    parent: OnceLock<Option<StorageContainer>>,
    properties: RwLock<Option<Arc<PropertyBag>>>,
}

impl StorageItem {
    pub(crate) fn new(resolver: Resolver, uri: Url, target: NativeTarget) -> Self {
        Self {
            uri,
            target,
            resolver,
            parent: OnceLock::new(),
            properties: RwLock::new(None),
        }
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

    /// The owning account; `None` for local files.
    pub fn account(&self) -> Option<&Arc<StorageAccount>> {
        self.target.account()
    }

    /// The backend object this handle addresses.
    pub fn native(&self) -> &NativeTarget {
        &self.target
    }

    /// Open a read stream.
    ///
    /// # Errors
    /// - `NotFound` if the object does not exist
    pub async fn open_read(&self) -> Result<BoxReader> {
        match &self.target {
            NativeTarget::Local(path) => self.resolver.local().open_read(path).await,
            NativeTarget::Blob { account, address } => {
                self.resolver.blob_store()?.open_read(account, address).await
            }
            NativeTarget::FileShare { account, address } => {
                self.resolver.file_share_store()?.open_read(account, address).await
            }
        }
    }

    /// Open a write stream. The object is written when the stream is shut down.
    ///
    /// # Errors
    /// - `AlreadyExists` if `overwrite` is false and the object exists
    /// - `NotFound` if the enclosing directory or container does not exist
    pub async fn open_write(&self, overwrite: bool, size_hint: Option<u64>) -> Result<BoxWriter> {
        match &self.target {
            NativeTarget::Local(path) => {
                self.resolver.local().open_write(path, overwrite, size_hint).await
            }
            NativeTarget::Blob { account, address } => {
                self.resolver
                    .blob_store()?
                    .open_write(account, address, overwrite, size_hint)
                    .await
            }
            NativeTarget::FileShare { account, address } => {
                self.resolver
                    .file_share_store()?
                    .open_write(account, address, overwrite, size_hint)
                    .await
            }
        }
    }

    pub async fn exists(&self) -> Result<bool> {
        match &self.target {
            NativeTarget::Local(path) => self.resolver.local().exists(path).await,
            NativeTarget::Blob { account, address } => {
                self.resolver.blob_store()?.exists(account, address).await
            }
            NativeTarget::FileShare { account, address } => {
                self.resolver.file_share_store()?.exists(account, address).await
            }
        }
    }

    /// Delete the object.
    ///
    /// # Errors
    /// - `NotFound` if the object does not exist
    pub async fn delete(&self) -> Result<()> {
        match &self.target {
            NativeTarget::Local(path) => self.resolver.local().delete_file(path).await,
            NativeTarget::Blob { account, address } => {
                self.resolver.blob_store()?.delete(account, address).await
            }
            NativeTarget::FileShare { account, address } => {
                self.resolver.file_share_store()?.delete(account, address).await
            }
        }
    }

    /// Fetch the object's properties from its backend and cache them.
    ///
    /// The key set depends on the backend; keys a backend does not report
    /// are absent.
    pub async fn fetch_properties(&self) -> Result<Arc<PropertyBag>> {
        let props = match &self.target {
            NativeTarget::Local(path) => self.resolver.local().properties(path).await?,
            NativeTarget::Blob { account, address } => {
                self.resolver.blob_store()?.properties(account, address).await?
            }
            NativeTarget::FileShare { account, address } => {
                self.resolver.file_share_store()?.properties(account, address).await?
            }
        };
        let props = Arc::new(props);
        *self.properties.write().unwrap_or_else(PoisonError::into_inner) = Some(props.clone());
        Ok(props)
    }

    /// Properties from the last successful [`StorageItem::fetch_properties`].
    pub fn properties(&self) -> Option<Arc<PropertyBag>> {
        self.properties.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The enclosing directory or container, computed once.
    pub fn parent(&self) -> Option<&StorageContainer> {
        self.parent
            .get_or_init(|| StorageContainer::parent_of(&self.resolver, &self.uri, &self.target))
            .as_ref()
    }

    /// Source length in bytes, from cached or freshly fetched properties.
    async fn known_length(&self) -> Option<u64> {
        let props = match self.properties() {
            Some(props) => props,
            None => self.fetch_properties().await.ok()?,
        };
        props.get("Length").and_then(|v| v.as_u64())
    }

    /// Copy this object to `destination`, resolved through this handle's
    /// resolver, and return the destination handle.
    ///
    /// The existence check happens when the destination is opened for
    /// writing, so with `overwrite` false a concurrent writer can still
    /// win the race on stores without conditional writes. A failed copy
    /// may leave a partial destination behind.
    ///
    /// # Errors
    /// - `AlreadyExists` if `overwrite` is false and the destination exists
    /// - `InvalidInput` if `destination` resolves to this object
    /// - Any resolution error for `destination`
    pub async fn copy_to_location(
        &self,
        destination: &str,
        overwrite: bool,
    ) -> Result<StorageItem> {
        let mut reader = self.open_read().await?;
        let dest = self.resolver.create_item(destination)?;
        if dest.uri() == &self.uri {
            return Err(Error::InvalidInput(format!("Cannot copy {} onto itself", self.uri)));
        }
        let size_hint = self.known_length().await;
        let mut writer = dest.open_write(overwrite, size_hint).await?;

        let copied = tokio::io::copy(&mut reader, &mut writer).await?;
        writer.flush().await?;
        writer.shutdown().await?;

        info!("Copied {} bytes from {} to {}", copied, self.uri, dest.uri());
        Ok(dest)
    }

    /// Stream this object's bytes into `dest`.
    ///
    /// With `keep_open` the stream is only flushed; otherwise it is also
    /// shut down. Returns the number of bytes copied.
    pub async fn copy_to_stream<W>(&self, dest: &mut W, keep_open: bool) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut reader = self.open_read().await?;
        let copied = tokio::io::copy(&mut reader, dest).await?;
        dest.flush().await?;
        if !keep_open {
            dest.shutdown().await?;
        }
        Ok(copied)
    }

    /// Copy this object to `destination`, then delete it.
    ///
    /// Not atomic: if the delete fails after a successful copy, both the
    /// source and the copy remain and the delete error is returned.
    pub async fn move_to_location(
        &self,
        destination: &str,
        overwrite: bool,
    ) -> Result<StorageItem> {
        let dest = self.copy_to_location(destination, overwrite).await?;
        if let Err(e) = self.delete().await {
            warn!("Copied {} to {} but could not delete the source: {}", self.uri, dest.uri(), e);
            return Err(e);
        }
        info!("Moved {} to {}", self.uri, dest.uri());
        Ok(dest)
    }
}

impl std::fmt::Debug for StorageItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageItem")
            .field("uri", &self.uri.as_str())
            .field("kind", &self.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Credentials, StorageAccount};
    use crate::backend::{MemoryBlobStore, MemoryFileShareStore};
    use crate::config::StorageSettings;
    use crate::registry::AccountRegistry;
    use serde_json::Value;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use uristore_common::ErrorKind;

    const BLOB: &str = "https://acct.blob.core.windows.net";
    const SHARE: &str = "https://acct.file.core.windows.net";

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

    async fn setup(r: &Resolver) {
        r.create_container(&format!("{}/c", BLOB))
            .unwrap()
            .create_if_not_exists()
            .await
            .unwrap();
        r.create_container(&format!("{}/share/dir", SHARE))
            .unwrap()
            .create_if_not_exists()
            .await
            .unwrap();
    }

    async fn read_all(item: &StorageItem) -> Vec<u8> {
        let mut reader = item.open_read().await.unwrap();
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await.unwrap();
        data
    }

    async fn put(item: &StorageItem, data: &[u8]) {
        let mut writer = item.open_write(true, None).await.unwrap();
        writer.write_all(data).await.unwrap();
        writer.shutdown().await.unwrap();
    }

    fn local(temp: &TempDir, name: &str) -> String {
        temp.path().join(name).display().to_string()
    }

    #[tokio::test]
    async fn test_copy_round_trips() {
        let r = resolver();
        setup(&r).await;
        let temp = TempDir::new().unwrap();
        let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();

        let source = r.create_item(&local(&temp, "source.bin")).unwrap();
        put(&source, &payload).await;

        // local -> local
        let copy = source.copy_to_location(&local(&temp, "copy.bin"), false).await.unwrap();
        assert_eq!(read_all(&copy).await, payload);

        // local -> blob
        let blob = copy
            .copy_to_location(&format!("{}/c/dir/x.bin", BLOB), false)
            .await
            .unwrap();
        assert_eq!(blob.kind(), BackendKind::CloudBlob);
        assert_eq!(read_all(&blob).await, payload);

        // blob -> file share
        let file = blob
            .copy_to_location(&format!("{}/share/dir/x.bin", SHARE), false)
            .await
            .unwrap();
        assert_eq!(read_all(&file).await, payload);

        // file share -> blob
        let blob2 = file
            .copy_to_location(&format!("{}/c/y.bin", BLOB), false)
            .await
            .unwrap();
        assert_eq!(read_all(&blob2).await, payload);

        // blob -> local
        let back = blob2.copy_to_location(&local(&temp, "back.bin"), false).await.unwrap();
        assert_eq!(std::fs::read(back.uri().to_file_path().unwrap()).unwrap(), payload);
    }

    #[tokio::test]
    async fn test_copy_without_overwrite_keeps_destination() {
        let r = resolver();
        setup(&r).await;
        let source = r.create_item(&format!("{}/c/source", BLOB)).unwrap();
        put(&source, b"new content").await;
        let dest = r.create_item(&format!("{}/c/dest", BLOB)).unwrap();
        put(&dest, b"original").await;

        let err = source
            .copy_to_location(dest.uri().as_str(), false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(read_all(&dest).await, b"original");

        source.copy_to_location(dest.uri().as_str(), true).await.unwrap();
        assert_eq!(read_all(&dest).await, b"new content");
    }

    #[tokio::test]
    async fn test_copy_onto_itself_keeps_content() {
        let r = resolver();
        setup(&r).await;
        let temp = TempDir::new().unwrap();
        let path = local(&temp, "a.bin");
        let item = r.create_item(&path).unwrap();
        put(&item, b"precious data").await;

        let err = item.copy_to_location(&path, true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = item.move_to_location(&path, true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(std::fs::read(&path).unwrap(), b"precious data");

        let blob = r.create_item(&format!("{}/c/self", BLOB)).unwrap();
        put(&blob, b"blob data").await;
        let err = blob.copy_to_location(blob.uri().as_str(), true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(read_all(&blob).await, b"blob data");
    }

    #[tokio::test]
    async fn test_copy_to_stream_keep_open() {
        let r = resolver();
        setup(&r).await;
        let item = r.create_item(&format!("{}/c/x", BLOB)).unwrap();
        put(&item, b"abc").await;

        let mut buffer: Vec<u8> = Vec::new();
        assert_eq!(item.copy_to_stream(&mut buffer, true).await.unwrap(), 3);
        assert_eq!(item.copy_to_stream(&mut buffer, false).await.unwrap(), 3);
        assert_eq!(buffer, b"abcabc");
    }

    #[tokio::test]
    async fn test_move_deletes_source() {
        let r = resolver();
        setup(&r).await;
        let source = r.create_item(&format!("{}/share/dir/a.txt", SHARE)).unwrap();
        put(&source, b"moving").await;

        let dest = source
            .move_to_location(&format!("{}/c/a.txt", BLOB), false)
            .await
            .unwrap();
        assert!(!source.exists().await.unwrap());
        assert_eq!(read_all(&dest).await, b"moving");
    }

    #[tokio::test]
    async fn test_properties_are_cached() {
        let r = resolver();
        setup(&r).await;
        let item = r.create_item(&format!("{}/c/x", BLOB)).unwrap();
        put(&item, b"12345").await;

        assert!(item.properties().is_none());
        let props = item.fetch_properties().await.unwrap();
        assert_eq!(props["Length"], Value::from(5));
        assert!(props.contains_key("ETag"));
        assert!(!props.contains_key("IsDirectory"));
        assert_eq!(item.properties().unwrap()["Length"], Value::from(5));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let r = resolver();
        setup(&r).await;
        let item = r.create_item(&format!("{}/c/missing", BLOB)).unwrap();
        assert!(!item.exists().await.unwrap());
        assert_eq!(item.delete().await.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_parent_is_cached() {
        let r = resolver();
        let item = r.create_item(&format!("{}/c/a/b.zip", BLOB)).unwrap();
        let parent = item.parent().unwrap();
        assert_eq!(parent.uri().as_str(), format!("{}/c/a/", BLOB));
        assert!(std::ptr::eq(parent, item.parent().unwrap()));

        let grand = parent.parent().unwrap();
        assert_eq!(grand.uri().as_str(), format!("{}/c/", BLOB));
        assert!(grand.parent().is_none());
    }
}
