//! Location classification by host pattern.

use regex::Regex;
use url::Url;

use uristore_common::{BackendKind, Result};

use crate::config::compile_pattern;

/// Maps a URI to the backend kind that serves it.
///
/// Pure; no I/O. The file-share pattern is checked before the blob
/// pattern, and anything matching neither is a local file.
#[derive(Debug, Clone)]
pub struct Classifier {
    file_share: Regex,
    blob: Regex,
}

impl Classifier {
    /// Build a classifier from two case-insensitive host patterns.
    pub fn new(file_share_pattern: &str, blob_pattern: &str) -> Result<Self> {
        Ok(Self {
            file_share: compile_pattern(file_share_pattern)?,
            blob: compile_pattern(blob_pattern)?,
        })
    }

    /// Classify an absolute URI by its host.
    pub fn classify(&self, uri: &Url) -> BackendKind {
        self.classify_host(uri.host_str().unwrap_or(""))
    }

    /// Classify a bare host name.
    pub fn classify_host(&self, host: &str) -> BackendKind {
        if self.file_share.is_match(host) {
            BackendKind::CloudFileShare
        } else if self.blob.is_match(host) {
            BackendKind::CloudBlob
        } else {
            BackendKind::LocalFile
        }
    }
}
