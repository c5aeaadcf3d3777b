//! Common types used throughout uristore.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The backend a location resolves to.
///
/// Decided once when a location is resolved; handles never re-classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Local filesystem path.
    LocalFile,
    /// Cloud blob store.
    CloudBlob,
    /// Cloud file share.
    CloudFileShare,
}

impl BackendKind {
    /// Whether this kind needs a storage account.
    pub fn is_cloud(&self) -> bool {
        !matches!(self, BackendKind::LocalFile)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::LocalFile => "local-file",
            BackendKind::CloudBlob => "cloud-blob",
            BackendKind::CloudFileShare => "cloud-file-share",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque cursor for resuming a paginated listing.
///
/// Produced by a backend and passed back verbatim on the next request.
/// Callers must not interpret its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Backend-specific key/value properties of a stored object.
///
/// Keys a backend does not provide are absent, never set to a placeholder.
pub type PropertyBag = BTreeMap<String, serde_json::Value>;

/// Secret string that zeroizes on drop and is redacted in debug output.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SensitiveString(String);

impl SensitiveString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveString([REDACTED; {} chars])", self.0.len())
    }
}
