//! Uniform access to local files, cloud blobs and cloud file shares.
//!
//! A location string (a path, a `file://` URI, or a blob or file-share
//! URL) is resolved into an item or container handle for exactly one
//! backend. Cloud locations are bound to the storage account whose
//! endpoint host matches.
//!
//! # Design Principles
//! - Backend selection happens once, at resolution; handles carry a
//!   closed [`NativeTarget`] and never re-classify
//! - Accounts live in an explicitly passed [`AccountRegistry`]
//! - Backend I/O is delegated to collaborators behind [`BlobStore`] and
//!   [`FileShareStore`]; the async API is primary and the [`blocking`]
//!   module wraps it

pub mod account;
pub mod backend;
pub mod blocking;
pub mod classify;
pub mod config;
pub mod container;
pub mod item;
pub mod listing;
pub mod location;
pub mod registry;
pub mod resolver;

pub use account::{Credentials, Endpoints, Service, StorageAccount};
pub use backend::{
    BlobAddress, BlobStore, BoxReader, BoxWriter, FileShareStore, ListEntry, ListSegment,
    LocalFileSystem, MemoryBlobStore, MemoryFileShareStore, ShareAddress,
};
pub use blocking::{BlockingContainer, BlockingItem, BlockingReader, BlockingWriter};
pub use classify::Classifier;
pub use config::{ListingDefaults, StorageSettings};
pub use container::StorageContainer;
pub use item::StorageItem;
pub use listing::{GlobFilter, ListOptions, ListPage, StorageEntry};
pub use registry::AccountRegistry;
pub use resolver::{NativeTarget, Resolver, ResolverBuilder};
