//! Storage settings: location patterns, account discovery and listing defaults.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use uristore_common::{Error, Result};

use crate::classify::Classifier;

/// Host pattern identifying cloud file-share locations.
pub const DEFAULT_FILE_SHARE_PATTERN: &str = r"\.file\.core\.windows\.net";
/// Host pattern identifying cloud blob locations.
pub const DEFAULT_BLOB_PATTERN: &str = r"\.blob\.core\.windows\.net";
/// Pattern picking connection strings out of arbitrary configuration values.
pub const DEFAULT_CONNECTION_PATTERN: &str = "Account=|AccountName=";
/// Default-account selector; matches any account name.
pub const DEFAULT_ACCOUNT_SELECTOR: &str = ".";

/// Defaults applied to unsegmented listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingDefaults {
    /// Cap on accumulated results.
    pub max_results: usize,
    /// Wall-clock budget for the whole listing, in seconds when serialized.
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for ListingDefaults {
    fn default() -> Self {
        Self {
            max_results: 10_000_000,
            timeout: Duration::from_secs(60 * 60),
        }
    }
}

/// Settings for location classification, account discovery and listing.
///
/// Loading these from files or the environment is left to the caller;
/// every field has a default so partial documents deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Case-insensitive host pattern for cloud file shares.
    pub file_share_pattern: String,
    /// Case-insensitive host pattern for cloud blobs.
    pub blob_pattern: String,
    /// Case-insensitive pattern a configuration value must match to be
    /// treated as a connection string.
    pub connection_pattern: String,
    /// Case-insensitive pattern the default account's name must match.
    pub default_account_selector: String,
    /// Listing defaults.
    pub listing: ListingDefaults,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            file_share_pattern: DEFAULT_FILE_SHARE_PATTERN.to_string(),
            blob_pattern: DEFAULT_BLOB_PATTERN.to_string(),
            connection_pattern: DEFAULT_CONNECTION_PATTERN.to_string(),
            default_account_selector: DEFAULT_ACCOUNT_SELECTOR.to_string(),
            listing: ListingDefaults::default(),
        }
    }
}

impl StorageSettings {
    /// Build the location classifier from the host patterns.
    ///
    /// # Errors
    /// - `InvalidInput` if either pattern is not a valid regex
    pub fn classifier(&self) -> Result<Classifier> {
        Classifier::new(&self.file_share_pattern, &self.blob_pattern)
    }

    /// Compile the default-account selector.
    pub fn account_selector(&self) -> Result<Regex> {
        compile_pattern(&self.default_account_selector)
    }

    /// Compile the connection-string pattern.
    pub fn connection_matcher(&self) -> Result<Regex> {
        compile_pattern(&self.connection_pattern)
    }
}

/// Compile a case-insensitive pattern.
pub(crate) fn compile_pattern(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::InvalidInput(format!("Invalid pattern '{}': {}", pattern, e)))
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
