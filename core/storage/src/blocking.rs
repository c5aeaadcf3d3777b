//! Blocking wrappers over the async handles.
//!
//! Every method blocks on its async counterpart on an explicitly passed
//! runtime. Do not call these from inside an async task; use the async
//! handles there.

use std::io::{Read, Write};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::runtime::{Builder, Runtime};

use uristore_common::{ContinuationToken, Error, PropertyBag, Result};

use crate::backend::{BoxReader, BoxWriter};
use crate::container::StorageContainer;
use crate::item::StorageItem;
use crate::listing::{ListOptions, ListPage, StorageEntry};

/// Build a current-thread runtime for the blocking wrappers.
pub fn current_thread_runtime() -> Result<Arc<Runtime>> {
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::BackendUnavailable(format!("Failed to create runtime: {}", e)))?;
    Ok(Arc::new(runtime))
}

/// Blocking view of a [`StorageItem`].
#[derive(Debug)]
pub struct BlockingItem {
    inner: StorageItem,
    runtime: Arc<Runtime>,
}

impl BlockingItem {
    pub fn new(inner: StorageItem, runtime: Arc<Runtime>) -> Self {
        Self { inner, runtime }
    }

    /// The async handle.
    pub fn get_ref(&self) -> &StorageItem {
        &self.inner
    }

    pub fn into_inner(self) -> StorageItem {
        self.inner
    }

    /// See [`StorageItem::open_read`].
    pub fn open_read(&self) -> Result<BlockingReader> {
        let inner = self.runtime.block_on(self.inner.open_read())?;
        Ok(BlockingReader {
            inner,
            runtime: self.runtime.clone(),
        })
    }

    /// See [`StorageItem::open_write`]. Contents are committed by
    /// [`BlockingWriter::close`]; a writer dropped without closing may
    /// leave nothing behind.
    pub fn open_write(&self, overwrite: bool, size_hint: Option<u64>) -> Result<BlockingWriter> {
        let inner = self
            .runtime
            .block_on(self.inner.open_write(overwrite, size_hint))?;
        Ok(BlockingWriter {
            inner,
            runtime: self.runtime.clone(),
        })
    }

    pub fn exists(&self) -> Result<bool> {
        self.runtime.block_on(self.inner.exists())
    }

    pub fn delete(&self) -> Result<()> {
        self.runtime.block_on(self.inner.delete())
    }

    pub fn fetch_properties(&self) -> Result<Arc<PropertyBag>> {
        self.runtime.block_on(self.inner.fetch_properties())
    }

    /// See [`StorageItem::copy_to_location`].
    pub fn copy_to_location(&self, destination: &str, overwrite: bool) -> Result<BlockingItem> {
        let dest = self
            .runtime
            .block_on(self.inner.copy_to_location(destination, overwrite))?;
        Ok(BlockingItem::new(dest, self.runtime.clone()))
    }

    /// See [`StorageItem::copy_to_stream`].
    pub fn copy_to_stream<W>(&self, dest: &mut W, keep_open: bool) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.runtime.block_on(self.inner.copy_to_stream(dest, keep_open))
    }

    /// See [`StorageItem::move_to_location`]; not atomic.
    pub fn move_to_location(&self, destination: &str, overwrite: bool) -> Result<BlockingItem> {
        let dest = self
            .runtime
            .block_on(self.inner.move_to_location(destination, overwrite))?;
        Ok(BlockingItem::new(dest, self.runtime.clone()))
    }
}

/// Blocking read stream from [`BlockingItem::open_read`].
pub struct BlockingReader {
    inner: BoxReader,
    runtime: Arc<Runtime>,
}

impl Read for BlockingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.runtime.block_on(self.inner.read(buf))
    }
}

/// Blocking write stream from [`BlockingItem::open_write`].
pub struct BlockingWriter {
    inner: BoxWriter,
    runtime: Arc<Runtime>,
}

impl BlockingWriter {
    /// Flush and shut the stream down, committing the object.
    pub fn close(self) -> Result<()> {
        let BlockingWriter { mut inner, runtime } = self;
        runtime.block_on(async move {
            inner.flush().await?;
            inner.shutdown().await
        })?;
        Ok(())
    }
}

impl Write for BlockingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.runtime.block_on(self.inner.write(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.runtime.block_on(self.inner.flush())
    }
}

/// Blocking view of a [`StorageContainer`].
#[derive(Debug)]
pub struct BlockingContainer {
    inner: StorageContainer,
    runtime: Arc<Runtime>,
}

impl BlockingContainer {
    pub fn new(inner: StorageContainer, runtime: Arc<Runtime>) -> Self {
        Self { inner, runtime }
    }

    pub fn get_ref(&self) -> &StorageContainer {
        &self.inner
    }

    pub fn into_inner(self) -> StorageContainer {
        self.inner
    }

    pub fn exists(&self) -> Result<bool> {
        self.runtime.block_on(self.inner.exists())
    }

    pub fn create_if_not_exists(&self) -> Result<()> {
        self.runtime.block_on(self.inner.create_if_not_exists())
    }

    pub fn delete(&self) -> Result<()> {
        self.runtime.block_on(self.inner.delete())
    }

    pub fn fetch_properties(&self) -> Result<Arc<PropertyBag>> {
        self.runtime.block_on(self.inner.fetch_properties())
    }

    pub fn list(&self, options: &ListOptions) -> Result<Vec<StorageEntry>> {
        self.runtime.block_on(self.inner.list(options))
    }

    pub fn list_all(&self, filter: &str) -> Result<Vec<StorageEntry>> {
        self.runtime.block_on(self.inner.list_all(filter))
    }

    pub fn list_page(
        &self,
        options: &ListOptions,
        token: Option<&ContinuationToken>,
    ) -> Result<ListPage> {
        self.runtime.block_on(self.inner.list_page(options, token))
    }
}
