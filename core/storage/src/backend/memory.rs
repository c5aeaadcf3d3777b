//! In-memory blob and file-share stores for testing.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use uuid::Uuid;

use uristore_common::{ContinuationToken, Error, PropertyBag, Result};

use super::{
    BlobAddress, BlobStore, BoxReader, BoxWriter, FileShareStore, ListEntry, ListSegment,
    ShareAddress,
};
use crate::account::StorageAccount;

/// Page size used when a store is created with [`Default`].
pub const DEFAULT_PAGE_SIZE: usize = 5000;

type Commit = Box<dyn FnOnce(Bytes) -> Result<()> + Send>;

/// Writer that buffers everything and hands it to a commit callback on shutdown.
struct CommitWriter {
    buffer: Vec<u8>,
    commit: Option<Commit>,
}

impl CommitWriter {
    fn new(size_hint: Option<u64>, commit: Commit) -> Self {
        let capacity = size_hint.map(|n| n.min(64 * 1024 * 1024) as usize).unwrap_or(0);
        Self {
            buffer: Vec::with_capacity(capacity),
            commit: Some(commit),
        }
    }
}

impl AsyncWrite for CommitWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.commit.is_none() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "writer already closed",
            )));
        }
        this.buffer.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(commit) = this.commit.take() {
            let data = Bytes::from(std::mem::take(&mut this.buffer));
            if let Err(e) = commit(data) {
                return Poll::Ready(Err(io::Error::other(e)));
            }
        }
        Poll::Ready(Ok(()))
    }
}

fn reader(data: Bytes) -> BoxReader {
    Box::pin(io::Cursor::new(data))
}

fn etag() -> String {
    format!("\"{}\"", Uuid::new_v4())
}

/// Stored object payload and metadata.
#[derive(Debug, Clone)]
struct Object {
    data: Bytes,
    etag: String,
    modified: DateTime<Utc>,
}

impl Object {
    fn new(data: Bytes) -> Self {
        Self {
            data,
            etag: etag(),
            modified: Utc::now(),
        }
    }
}

/// Directory, container or share metadata.
#[derive(Debug, Clone)]
struct Folder {
    etag: String,
    modified: DateTime<Utc>,
}

impl Folder {
    fn new() -> Self {
        Self {
            etag: etag(),
            modified: Utc::now(),
        }
    }
}

/// Paging and failure-injection knobs shared by both stores.
struct Paging {
    page_size: usize,
    pages_served: AtomicUsize,
    fail_after_pages: RwLock<Option<usize>>,
}

impl Paging {
    fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            pages_served: AtomicUsize::new(0),
            fail_after_pages: RwLock::new(None),
        }
    }

    /// Count a page request, failing it if the injected limit is reached.
    fn next_page(&self) -> Result<()> {
        let served = self.pages_served.fetch_add(1, Ordering::SeqCst);
        let limit = *self.fail_after_pages.read().unwrap_or_else(PoisonError::into_inner);
        match limit {
            Some(limit) if served >= limit => Err(Error::BackendUnavailable(format!(
                "injected listing failure after {} pages",
                limit
            ))),
            _ => Ok(()),
        }
    }

    fn limit(&self, max_results: usize) -> usize {
        if max_results == 0 {
            self.page_size
        } else {
            max_results.min(self.page_size)
        }
    }

    /// Page through entries sorted by name, resuming at the token's name.
    fn page(
        &self,
        entries: Vec<ListEntry>,
        max_results: usize,
        token: Option<&ContinuationToken>,
    ) -> ListSegment {
        let limit = self.limit(max_results);
        let mut remaining = entries
            .into_iter()
            .skip_while(|e| token.is_some_and(|t| e.name.as_str() < t.as_str()));
        let page: Vec<ListEntry> = remaining.by_ref().take(limit).collect();
        let next = remaining.next().map(|e| ContinuationToken::new(e.name));
        ListSegment { entries: page, next }
    }
}

#[derive(Debug, Default)]
struct BlobContainer {
    meta: Option<Folder>,
    blobs: BTreeMap<String, Object>,
}

type BlobAccounts = HashMap<String, HashMap<String, BlobContainer>>;

/// In-memory blob store.
///
/// Accounts are isolated by name. Listings are served in pages of at most
/// `page_size` entries, so small page sizes exercise continuation tokens.
pub struct MemoryBlobStore {
    accounts: Arc<RwLock<BlobAccounts>>,
    paging: Paging,
}

impl MemoryBlobStore {
    /// Create an empty store serving listing pages of `page_size` entries.
    pub fn new(page_size: usize) -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            paging: Paging::new(page_size),
        }
    }

    /// Make every listing page request after the first `pages` fail.
    pub fn fail_listing_after(&self, pages: usize) {
        *self.paging.fail_after_pages.write().unwrap_or_else(PoisonError::into_inner) = Some(pages);
    }

    /// Number of listing pages requested so far.
    pub fn pages_served(&self) -> usize {
        self.paging.pages_served.load(Ordering::SeqCst)
    }

    fn with_container<T>(
        &self,
        account: &StorageAccount,
        container: &str,
        f: impl FnOnce(&BlobContainer) -> Result<T>,
    ) -> Result<T> {
        let accounts = self.accounts.read().unwrap_or_else(PoisonError::into_inner);
        match accounts.get(account.name()).and_then(|c| c.get(container)) {
            Some(c) if c.meta.is_some() => f(c),
            _ => Err(Error::NotFound(format!("Container not found: {}", container))),
        }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &str {
        "memory-blob"
    }

    async fn open_read(&self, account: &StorageAccount, blob: &BlobAddress) -> Result<BoxReader> {
        self.with_container(account, &blob.container, |c| {
            c.blobs
                .get(&blob.name)
                .map(|o| reader(o.data.clone()))
                .ok_or_else(|| {
                    Error::NotFound(format!("Blob not found: {}/{}", blob.container, blob.name))
                })
        })
    }

    async fn open_write(
        &self,
        account: &StorageAccount,
        blob: &BlobAddress,
        overwrite: bool,
        size_hint: Option<u64>,
    ) -> Result<BoxWriter> {
        let exists = self.with_container(account, &blob.container, |c| {
            Ok(c.blobs.contains_key(&blob.name))
        })?;
        if exists && !overwrite {
            return Err(Error::AlreadyExists(format!(
                "Blob {}/{} exists and overwrite is false",
                blob.container, blob.name
            )));
        }

        let accounts = self.accounts.clone();
        let account_name = account.name().to_string();
        let blob = blob.clone();
        let commit: Commit = Box::new(move |data| {
            let mut accounts = accounts.write().unwrap_or_else(PoisonError::into_inner);
            let container = accounts
                .get_mut(&account_name)
                .and_then(|c| c.get_mut(&blob.container))
                .filter(|c| c.meta.is_some())
                .ok_or_else(|| {
                    Error::NotFound(format!("Container not found: {}", blob.container))
                })?;
            container.blobs.insert(blob.name.clone(), Object::new(data));
            Ok(())
        });
        Ok(Box::pin(CommitWriter::new(size_hint, commit)))
    }

    async fn exists(&self, account: &StorageAccount, blob: &BlobAddress) -> Result<bool> {
        let accounts = self.accounts.read().unwrap_or_else(PoisonError::into_inner);
        Ok(accounts
            .get(account.name())
            .and_then(|c| c.get(&blob.container))
            .is_some_and(|c| c.blobs.contains_key(&blob.name)))
    }

    async fn delete(&self, account: &StorageAccount, blob: &BlobAddress) -> Result<()> {
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        accounts
            .get_mut(account.name())
            .and_then(|c| c.get_mut(&blob.container))
            .and_then(|c| c.blobs.remove(&blob.name))
            .map(|_| ())
            .ok_or_else(|| {
                Error::NotFound(format!("Blob not found: {}/{}", blob.container, blob.name))
            })
    }

    async fn properties(
        &self,
        account: &StorageAccount,
        blob: &BlobAddress,
    ) -> Result<PropertyBag> {
        self.with_container(account, &blob.container, |c| {
            let object = c
                .blobs
                .get(&blob.name)
                .ok_or_else(|| {
                    Error::NotFound(format!("Blob not found: {}/{}", blob.container, blob.name))
                })?;
            let mut props = PropertyBag::new();
            props.insert("BlobType".into(), Value::from("BlockBlob"));
            props.insert("ContentType".into(), Value::from("application/octet-stream"));
            props.insert("ETag".into(), Value::from(object.etag.clone()));
            props.insert("LastModified".into(), Value::from(object.modified.to_rfc3339()));
            props.insert("LeaseState".into(), Value::from("available"));
            props.insert("LeaseStatus".into(), Value::from("unlocked"));
            props.insert("Length".into(), Value::from(object.data.len() as u64));
            Ok(props)
        })
    }

    async fn container_exists(&self, account: &StorageAccount, container: &str) -> Result<bool> {
        Ok(self.with_container(account, container, |_| Ok(())).is_ok())
    }

    async fn create_container_if_not_exists(
        &self,
        account: &StorageAccount,
        container: &str,
    ) -> Result<()> {
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        let entry = accounts
            .entry(account.name().to_string())
            .or_default()
            .entry(container.to_string())
            .or_default();
        if entry.meta.is_none() {
            entry.meta = Some(Folder::new());
        }
        Ok(())
    }

    async fn delete_container(&self, account: &StorageAccount, container: &str) -> Result<()> {
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        accounts
            .get_mut(account.name())
            .and_then(|c| c.remove(container))
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Container not found: {}", container)))
    }

    async fn container_properties(
        &self,
        account: &StorageAccount,
        container: &str,
    ) -> Result<PropertyBag> {
        self.with_container(account, container, |c| {
            let mut props = PropertyBag::new();
            if let Some(meta) = &c.meta {
                props.insert("ETag".into(), Value::from(meta.etag.clone()));
                props.insert("LastModified".into(), Value::from(meta.modified.to_rfc3339()));
            }
            props.insert("LeaseState".into(), Value::from("available"));
            props.insert("LeaseStatus".into(), Value::from("unlocked"));
            Ok(props)
        })
    }

    async fn list_segment(
        &self,
        account: &StorageAccount,
        container: &str,
        prefix: &str,
        max_results: usize,
        token: Option<&ContinuationToken>,
    ) -> Result<ListSegment> {
        self.paging.next_page()?;
        let entries = self.with_container(account, container, |c| {
            Ok(c.blobs
                .keys()
                .filter(|name| name.starts_with(prefix))
                .map(|name| ListEntry {
                    name: name.clone(),
                    is_container: false,
                })
                .collect::<Vec<_>>())
        })?;
        Ok(self.paging.page(entries, max_results, token))
    }
}

#[derive(Debug, Default)]
struct Share {
    meta: Option<Folder>,
    dirs: BTreeMap<String, Folder>,
    files: BTreeMap<String, Object>,
}

impl Share {
    fn has_dir(&self, dir: &ShareAddress) -> bool {
        dir.is_share_root() || self.dirs.contains_key(&dir.key())
    }
}

type ShareAccounts = HashMap<String, HashMap<String, Share>>;

/// In-memory file-share store.
///
/// Directories must be created one level at a time, parent first, as on
/// a real file share. Listings page like [`MemoryBlobStore`].
pub struct MemoryFileShareStore {
    accounts: Arc<RwLock<ShareAccounts>>,
    paging: Paging,
}

impl MemoryFileShareStore {
    /// Create an empty store serving listing pages of `page_size` entries.
    pub fn new(page_size: usize) -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            paging: Paging::new(page_size),
        }
    }

    /// Make every listing page request after the first `pages` fail.
    pub fn fail_listing_after(&self, pages: usize) {
        *self.paging.fail_after_pages.write().unwrap_or_else(PoisonError::into_inner) = Some(pages);
    }

    /// Number of listing pages requested so far.
    pub fn pages_served(&self) -> usize {
        self.paging.pages_served.load(Ordering::SeqCst)
    }

    fn with_share<T>(
        &self,
        account: &StorageAccount,
        share: &str,
        f: impl FnOnce(&Share) -> Result<T>,
    ) -> Result<T> {
        let accounts = self.accounts.read().unwrap_or_else(PoisonError::into_inner);
        match accounts.get(account.name()).and_then(|s| s.get(share)) {
            Some(s) if s.meta.is_some() => f(s),
            _ => Err(Error::NotFound(format!("Share not found: {}", share))),
        }
    }

    fn with_share_mut<T>(
        &self,
        account: &StorageAccount,
        share: &str,
        f: impl FnOnce(&mut Share) -> Result<T>,
    ) -> Result<T> {
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        match accounts.get_mut(account.name()).and_then(|s| s.get_mut(share)) {
            Some(s) if s.meta.is_some() => f(s),
            _ => Err(Error::NotFound(format!("Share not found: {}", share))),
        }
    }
}

impl Default for MemoryFileShareStore {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

#[async_trait]
impl FileShareStore for MemoryFileShareStore {
    fn name(&self) -> &str {
        "memory-file-share"
    }

    async fn open_read(&self, account: &StorageAccount, file: &ShareAddress) -> Result<BoxReader> {
        self.with_share(account, &file.share, |s| {
            s.files
                .get(&file.key())
                .map(|o| reader(o.data.clone()))
                .ok_or_else(|| {
                    Error::NotFound(format!("File not found: {}/{}", file.share, file.key()))
                })
        })
    }

    async fn open_write(
        &self,
        account: &StorageAccount,
        file: &ShareAddress,
        overwrite: bool,
        size_hint: Option<u64>,
    ) -> Result<BoxWriter> {
        let parent = file
            .parent()
            .ok_or_else(|| Error::InvalidInput("Cannot write to a share root".to_string()))?;
        self.with_share(account, &file.share, |s| {
            if !s.has_dir(&parent) {
                return Err(Error::NotFound(format!(
                    "Directory not found: {}/{}",
                    parent.share,
                    parent.key()
                )));
            }
            if s.files.contains_key(&file.key()) && !overwrite {
                return Err(Error::AlreadyExists(format!(
                    "File {}/{} exists and overwrite is false",
                    file.share,
                    file.key()
                )));
            }
            Ok(())
        })?;

        let accounts = self.accounts.clone();
        let account_name = account.name().to_string();
        let file = file.clone();
        let commit: Commit = Box::new(move |data| {
            let mut accounts = accounts.write().unwrap_or_else(PoisonError::into_inner);
            let share = accounts
                .get_mut(&account_name)
                .and_then(|s| s.get_mut(&file.share))
                .filter(|s| s.meta.is_some())
                .ok_or_else(|| Error::NotFound(format!("Share not found: {}", file.share)))?;
            share.files.insert(file.key(), Object::new(data));
            Ok(())
        });
        Ok(Box::pin(CommitWriter::new(size_hint, commit)))
    }

    async fn exists(&self, account: &StorageAccount, file: &ShareAddress) -> Result<bool> {
        Ok(self
            .with_share(account, &file.share, |s| Ok(s.files.contains_key(&file.key())))
            .unwrap_or(false))
    }

    async fn delete(&self, account: &StorageAccount, file: &ShareAddress) -> Result<()> {
        self.with_share_mut(account, &file.share, |s| {
            s.files
                .remove(&file.key())
                .map(|_| ())
                .ok_or_else(|| {
                    Error::NotFound(format!("File not found: {}/{}", file.share, file.key()))
                })
        })
    }

    async fn properties(
        &self,
        account: &StorageAccount,
        file: &ShareAddress,
    ) -> Result<PropertyBag> {
        self.with_share(account, &file.share, |s| {
            let object = s
                .files
                .get(&file.key())
                .ok_or_else(|| {
                    Error::NotFound(format!("File not found: {}/{}", file.share, file.key()))
                })?;
            let mut props = PropertyBag::new();
            props.insert("ContentType".into(), Value::from("application/octet-stream"));
            props.insert("ETag".into(), Value::from(object.etag.clone()));
            props.insert("LastModified".into(), Value::from(object.modified.to_rfc3339()));
            props.insert("Length".into(), Value::from(object.data.len() as u64));
            Ok(props)
        })
    }

    async fn create_share_if_not_exists(
        &self,
        account: &StorageAccount,
        share: &str,
    ) -> Result<()> {
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        let entry = accounts
            .entry(account.name().to_string())
            .or_default()
            .entry(share.to_string())
            .or_default();
        if entry.meta.is_none() {
            entry.meta = Some(Folder::new());
        }
        Ok(())
    }

    async fn directory_exists(&self, account: &StorageAccount, dir: &ShareAddress) -> Result<bool> {
        Ok(self
            .with_share(account, &dir.share, |s| Ok(s.has_dir(dir)))
            .unwrap_or(false))
    }

    async fn create_directory_if_not_exists(
        &self,
        account: &StorageAccount,
        dir: &ShareAddress,
    ) -> Result<()> {
        let Some(parent) = dir.parent() else {
            return Ok(());
        };
        self.with_share_mut(account, &dir.share, |s| {
            if !s.has_dir(&parent) {
                return Err(Error::NotFound(format!(
                    "Directory not found: {}/{}",
                    parent.share,
                    parent.key()
                )));
            }
            if s.files.contains_key(&dir.key()) {
                return Err(Error::AlreadyExists(format!("{}/{} is a file", dir.share, dir.key())));
            }
            s.dirs.entry(dir.key()).or_insert_with(Folder::new);
            Ok(())
        })
    }

    async fn delete_directory(&self, account: &StorageAccount, dir: &ShareAddress) -> Result<()> {
        if dir.is_share_root() {
            let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
            return accounts
                .get_mut(account.name())
                .and_then(|s| s.remove(&dir.share))
                .map(|_| ())
                .ok_or_else(|| Error::NotFound(format!("Share not found: {}", dir.share)));
        }
        self.with_share_mut(account, &dir.share, |s| {
            let key = dir.key();
            let prefix = format!("{}/", key);
            if s.dirs.keys().chain(s.files.keys()).any(|k| k.starts_with(&prefix)) {
                return Err(Error::InvalidInput(format!(
                    "Directory not empty: {}/{}",
                    dir.share,
                    key
                )));
            }
            s.dirs
                .remove(&key)
                .map(|_| ())
                .ok_or_else(|| {
                    Error::NotFound(format!("Directory not found: {}/{}", dir.share, key))
                })
        })
    }

    async fn directory_properties(
        &self,
        account: &StorageAccount,
        dir: &ShareAddress,
    ) -> Result<PropertyBag> {
        self.with_share(account, &dir.share, |s| {
            let folder = if dir.is_share_root() {
                s.meta.as_ref()
            } else {
                s.dirs.get(&dir.key())
            }
            .ok_or_else(|| {
                Error::NotFound(format!("Directory not found: {}/{}", dir.share, dir.key()))
            })?;
            let mut props = PropertyBag::new();
            props.insert("ETag".into(), Value::from(folder.etag.clone()));
            props.insert("LastModified".into(), Value::from(folder.modified.to_rfc3339()));
            Ok(props)
        })
    }

    async fn list_segment(
        &self,
        account: &StorageAccount,
        dir: &ShareAddress,
        prefix: &str,
        max_results: usize,
        token: Option<&ContinuationToken>,
    ) -> Result<ListSegment> {
        self.paging.next_page()?;
        let entries = self.with_share(account, &dir.share, |s| {
            if !s.has_dir(dir) {
                return Err(Error::NotFound(format!(
                    "Directory not found: {}/{}",
                    dir.share,
                    dir.key()
                )));
            }
            let base = if dir.is_share_root() {
                String::new()
            } else {
                format!("{}/", dir.key())
            };
            let child = |key: &String| -> Option<String> {
                let rest = key.strip_prefix(base.as_str())?;
                let direct = !rest.is_empty() && !rest.contains('/') && rest.starts_with(prefix);
                direct.then(|| rest.to_string())
            };
            let mut entries: Vec<ListEntry> = s
                .dirs
                .keys()
                .filter_map(|k| child(k).map(|name| ListEntry { name, is_container: true }))
                .chain(s.files.keys().filter_map(|k| {
                    child(k).map(|name| ListEntry {
                        name,
                        is_container: false,
                    })
                }))
                .collect();
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(entries)
        })?;
        Ok(self.paging.page(entries, max_results, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Credentials;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use uristore_common::ErrorKind;

    fn account() -> StorageAccount {
        StorageAccount::new("memacct", Credentials::Anonymous)
    }

    fn blob(name: &str) -> BlobAddress {
        BlobAddress {
            container: "c".into(),
            name: name.into(),
        }
    }

    async fn put_blob(store: &MemoryBlobStore, name: &str, data: &[u8]) {
        let mut writer = store.open_write(&account(), &blob(name), true, None).await.unwrap();
        writer.write_all(data).await.unwrap();
        writer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_blob_write_requires_container() {
        let store = MemoryBlobStore::default();
        let err = store.open_write(&account(), &blob("x"), true, None).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_blob_write_read() {
        let store = MemoryBlobStore::default();
        store.create_container_if_not_exists(&account(), "c").await.unwrap();
        put_blob(&store, "dir/x.zip", b"Hello, Blob!").await;

        let mut reader = store.open_read(&account(), &blob("dir/x.zip")).await.unwrap();
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"Hello, Blob!");

        let props = store.properties(&account(), &blob("dir/x.zip")).await.unwrap();
        assert_eq!(props["Length"], Value::from(12));
        assert!(props.contains_key("ETag"));
    }

    #[tokio::test]
    async fn test_blob_uncommitted_write_is_invisible() {
        let store = MemoryBlobStore::default();
        store.create_container_if_not_exists(&account(), "c").await.unwrap();
        let mut writer = store.open_write(&account(), &blob("x"), false, None).await.unwrap();
        writer.write_all(b"partial").await.unwrap();
        assert!(!store.exists(&account(), &blob("x")).await.unwrap());
        writer.shutdown().await.unwrap();
        assert!(store.exists(&account(), &blob("x")).await.unwrap());
    }

    #[tokio::test]
    async fn test_blob_listing_pages() {
        let store = MemoryBlobStore::new(2);
        store.create_container_if_not_exists(&account(), "c").await.unwrap();
        for name in ["a", "b", "c", "d", "e"] {
            put_blob(&store, name, b"x").await;
        }

        let mut token = None;
        let mut names = Vec::new();
        loop {
            let page = store
                .list_segment(&account(), "c", "", 100, token.as_ref())
                .await
                .unwrap();
            assert!(page.entries.len() <= 2);
            names.extend(page.entries.into_iter().map(|e| e.name));
            token = page.next;
            if token.is_none() {
                break;
            }
        }
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(store.pages_served(), 3);
    }

    #[tokio::test]
    async fn test_blob_listing_failure_injection() {
        let store = MemoryBlobStore::new(1);
        store.create_container_if_not_exists(&account(), "c").await.unwrap();
        put_blob(&store, "a", b"x").await;
        put_blob(&store, "b", b"x").await;
        store.fail_listing_after(1);

        let first = store.list_segment(&account(), "c", "", 10, None).await.unwrap();
        let err = store
            .list_segment(&account(), "c", "", 10, first.next.as_ref())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    }

    #[tokio::test]
    async fn test_share_directories_created_parent_first() {
        let store = MemoryFileShareStore::default();
        let acct = account();
        let root = ShareAddress {
            share: "s".into(),
            path: vec![],
        };
        store.create_share_if_not_exists(&acct, "s").await.unwrap();

        let nested = root.child("a").child("b");
        let err = store.create_directory_if_not_exists(&acct, &nested).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        store.create_directory_if_not_exists(&acct, &root.child("a")).await.unwrap();
        store.create_directory_if_not_exists(&acct, &nested).await.unwrap();
        store.create_directory_if_not_exists(&acct, &nested).await.unwrap();
        assert!(store.directory_exists(&acct, &nested).await.unwrap());
    }

    #[tokio::test]
    async fn test_share_listing_direct_children() {
        let store = MemoryFileShareStore::default();
        let acct = account();
        let root = ShareAddress {
            share: "s".into(),
            path: vec![],
        };
        store.create_share_if_not_exists(&acct, "s").await.unwrap();
        store.create_directory_if_not_exists(&acct, &root.child("d")).await.unwrap();
        for file in [root.child("x.zip"), root.child("d").child("nested.zip")] {
            let mut writer = store.open_write(&acct, &file, false, None).await.unwrap();
            writer.write_all(b"data").await.unwrap();
            writer.shutdown().await.unwrap();
        }

        let page = store.list_segment(&acct, &root, "", 10, None).await.unwrap();
        assert_eq!(
            page.entries,
            vec![
                ListEntry { name: "d".into(), is_container: true },
                ListEntry { name: "x.zip".into(), is_container: false },
            ]
        );
        assert!(page.next.is_none());

        let prefixed = store.list_segment(&acct, &root, "x", 10, None).await.unwrap();
        assert_eq!(prefixed.entries.len(), 1);
    }
}
