//! Account registry for resolving locations to storage accounts.

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;
use url::Url;

use uristore_common::{Error, Result};

use crate::account::StorageAccount;
use crate::config::StorageSettings;

/// Registry of known storage accounts.
///
/// Maps endpoint hostnames and account names to accounts, and tracks one
/// default account. Safe for concurrent lookups and registrations; each
/// key is last-writer-wins.
pub struct AccountRegistry {
    by_host: RwLock<HashMap<String, Arc<StorageAccount>>>,
    by_name: RwLock<HashMap<String, Arc<StorageAccount>>>,
    default: RwLock<Option<Arc<StorageAccount>>>,
    /// `None` selects the first account registered.
    selector: Option<Regex>,
}

impl AccountRegistry {
    /// Create an empty registry whose default is the first account registered.
    pub fn new() -> Self {
        Self {
            by_host: RwLock::new(HashMap::new()),
            by_name: RwLock::new(HashMap::new()),
            default: RwLock::new(None),
            selector: None,
        }
    }

    /// Create an empty registry with a compiled default-account selector.
    pub fn with_selector(selector: Regex) -> Self {
        Self {
            selector: Some(selector),
            ..Self::new()
        }
    }

    /// Build a registry from configuration values.
    ///
    /// Only values matching the connection pattern are considered; values
    /// that then fail to parse are skipped. Accounts are registered in
    /// input order, so the first one matching the selector is the default.
    ///
    /// # Errors
    /// - `InvalidInput` if a settings pattern does not compile
    pub fn discover<I, S>(values: I, settings: &StorageSettings) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let matcher = settings.connection_matcher()?;
        let registry = Self::with_selector(settings.account_selector()?);

        for value in values {
            let value = value.as_ref();
            if !matcher.is_match(value) {
                continue;
            }
            match StorageAccount::parse(value) {
                Ok(account) => {
                    registry.register(account);
                }
                Err(e) => debug!("Skipping malformed connection string: {}", e),
            }
        }

        Ok(registry)
    }

    /// Register an account under every endpoint host and its name.
    ///
    /// # Postconditions
    /// - Existing entries for the same hosts/name are overwritten
    /// - The account becomes the default if none is set yet and its name
    ///   matches the selector
    pub fn register(&self, account: impl Into<Arc<StorageAccount>>) -> Arc<StorageAccount> {
        let account = account.into();

        {
            let mut by_host = self.by_host.write().unwrap_or_else(PoisonError::into_inner);
            for host in account.hosts() {
                by_host.insert(host.to_ascii_lowercase(), account.clone());
            }
        }
        self.by_name
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(account.name().to_ascii_lowercase(), account.clone());

        let mut default = self.default.write().unwrap_or_else(PoisonError::into_inner);
        let selected = self.selector.as_ref().map_or(true, |s| s.is_match(account.name()));
        if default.is_none() && selected {
            debug!("Default storage account is '{}'", account.name());
            *default = Some(account.clone());
        }

        account
    }

    /// Resolve an account by exact host, falling back to the host's first
    /// DNS label as an account name.
    ///
    /// # Errors
    /// - `AccountNotFound` if neither lookup matches
    pub fn resolve_by_host(&self, host: &str) -> Result<Arc<StorageAccount>> {
        self.lookup(host).ok_or_else(|| {
            Error::AccountNotFound(format!("No configured storage account for host name {}", host))
        })
    }

    /// Resolve an account from an absolute URI string.
    ///
    /// # Errors
    /// - `MalformedLocation` if `uri` is not an absolute URI
    /// - `AccountNotFound` if no account matches its host
    pub fn resolve_by_uri(&self, uri: &str) -> Result<Arc<StorageAccount>> {
        let parsed = Url::parse(uri).map_err(|e| {
            Error::MalformedLocation(format!("'{}' is not an absolute URI: {}", uri, e))
        })?;
        self.resolve_by_url(&parsed)
    }

    /// Resolve an account from a parsed URL's host.
    pub fn resolve_by_url(&self, uri: &Url) -> Result<Arc<StorageAccount>> {
        let host = uri.host_str().unwrap_or("");
        self.lookup(host).ok_or_else(|| {
            Error::AccountNotFound(format!("No configured storage account for URI {}", uri))
        })
    }

    /// Resolve an account from a UNC-style path such as `\\host\share\dir`.
    ///
    /// The first path segment is treated as a host or account name.
    ///
    /// # Errors
    /// - `AccountNotFound` naming the original path
    pub fn resolve_by_path(&self, path: &str) -> Result<Arc<StorageAccount>> {
        path.split(['\\', '/'])
            .find(|segment| !segment.is_empty())
            .and_then(|first| self.lookup(first))
            .ok_or_else(|| {
                Error::AccountNotFound(format!("No configured storage account for path {}", path))
            })
    }

    /// Resolve an account by exact name.
    pub fn resolve_by_name(&self, name: &str) -> Result<Arc<StorageAccount>> {
        self.by_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                Error::AccountNotFound(format!("No configured storage account named {}", name))
            })
    }

    /// Resolve an account from either an absolute URI or a UNC-style path.
    pub fn resolve_by_location(&self, location: &str) -> Result<Arc<StorageAccount>> {
        match Url::parse(location) {
            Ok(uri) if uri.has_host() => self.resolve_by_url(&uri),
            _ => self.resolve_by_path(location),
        }
    }

    /// The default account, if any account matched the selector.
    pub fn default_account(&self) -> Option<Arc<StorageAccount>> {
        self.default.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Snapshot of all registered accounts, sorted by name.
    pub fn accounts(&self) -> Vec<Arc<StorageAccount>> {
        let mut accounts: Vec<_> = self
            .by_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        accounts.sort_by(|a, b| a.name().cmp(b.name()));
        accounts
    }

    /// Check whether nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.by_name.read().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    fn lookup(&self, host: &str) -> Option<Arc<StorageAccount>> {
        let host = host.to_ascii_lowercase();
        if host.is_empty() {
            return None;
        }
        if let Some(account) = self
            .by_host
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&host)
        {
            return Some(account.clone());
        }
        let label = host.split('.').next()?;
        self.by_name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(label)
            .cloned()
    }
}

impl Default for AccountRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AccountRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRegistry")
            .field(
                "accounts",
                &self.accounts().iter().map(|a| a.name().to_string()).collect::<Vec<_>>(),
            )
            .field("default", &self.default_account().map(|a| a.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Credentials, Service};
    use proptest::prelude::*;
    use uristore_common::ErrorKind;

    fn account(name: &str) -> StorageAccount {
        StorageAccount::new(name, Credentials::Anonymous)
    }

    #[test]
    fn test_register_and_resolve_by_host() {
        let registry = AccountRegistry::new();
        registry.register(account("alpha"));

        for host in [
            "alpha.blob.core.windows.net",
            "alpha.file.core.windows.net",
            "alpha.table.core.windows.net",
            "alpha.queue.core.windows.net",
        ] {
            assert_eq!(registry.resolve_by_host(host).unwrap().name(), "alpha");
        }
    }

    #[test]
    fn test_resolve_by_host_falls_back_to_first_label() {
        let registry = AccountRegistry::new();
        registry.register(account("alpha").with_endpoint(Service::Blob, "127.0.0.1"));

        // Not a registered host, but the first label names the account.
        let found = registry.resolve_by_host("alpha.dfs.core.windows.net").unwrap();
        assert_eq!(found.name(), "alpha");
        assert_eq!(registry.resolve_by_host("127.0.0.1").unwrap().name(), "alpha");
    }

    #[test]
    fn test_resolve_unknown_fails() {
        let registry = AccountRegistry::new();
        registry.register(account("alpha"));
        let err = registry.resolve_by_host("beta.blob.core.windows.net").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccountNotFound);
    }

    #[test]
    fn test_resolve_by_uri_requires_absolute() {
        let registry = AccountRegistry::new();
        registry.register(account("alpha"));
        let err = registry.resolve_by_uri("container/blob.txt").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedLocation);

        let found = registry
            .resolve_by_uri("https://alpha.blob.core.windows.net/c/b.txt")
            .unwrap();
        assert_eq!(found.name(), "alpha");
    }

    #[test]
    fn test_resolve_by_path_unc() {
        let registry = AccountRegistry::new();
        registry.register(account("alpha"));
        let found = registry
            .resolve_by_path(r"\\alpha.file.core.windows.net\share\dir\x.zip")
            .unwrap();
        assert_eq!(found.name(), "alpha");
        assert_eq!(registry.resolve_by_path("alpha/share").unwrap().name(), "alpha");

        let err = registry.resolve_by_path(r"\\gamma\share").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccountNotFound);
        assert!(err.to_string().contains(r"\\gamma\share"));
    }

    #[test]
    fn test_resolve_by_location() {
        let registry = AccountRegistry::new();
        registry.register(account("alpha"));
        assert!(registry.resolve_by_location("https://alpha.file.core.windows.net/s").is_ok());
        assert!(registry.resolve_by_location(r"\\alpha\s").is_ok());
        assert!(registry.resolve_by_name("ALPHA").is_ok());
    }

    #[test]
    fn test_default_is_first_match_and_never_overwritten() {
        let registry = AccountRegistry::with_selector(Regex::new("^prod").unwrap());
        assert!(registry.default_account().is_none());

        registry.register(account("devacct"));
        assert!(registry.default_account().is_none());

        registry.register(account("prodone"));
        registry.register(account("prodtwo"));
        assert_eq!(registry.default_account().unwrap().name(), "prodone");

        registry.register(account("prodone"));
        assert_eq!(registry.default_account().unwrap().name(), "prodone");
    }

    #[test]
    fn test_reregister_overwrites() {
        let registry = AccountRegistry::new();
        registry.register(account("alpha"));
        registry.register(account("alpha").with_endpoint(Service::Blob, "blob.local"));
        assert_eq!(registry.accounts().len(), 1);
        let found = registry.resolve_by_host("blob.local").unwrap();
        assert_eq!(found.endpoint(Service::Blob), Some("blob.local"));
    }

    #[test]
    fn test_discover_skips_malformed() {
        let values = vec![
            "Server=db;Database=orders",
            "AccountName=;AccountKey=",
            "AccountName=first;AccountKey=a2V5",
            "Account=broken",
            "DefaultEndpointsProtocol=https;AccountName=second;AccountKey=a2V5",
        ];
        let registry = AccountRegistry::discover(values, &StorageSettings::default()).unwrap();
        let names: Vec<_> = registry.accounts().iter().map(|a| a.name().to_string()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(registry.default_account().unwrap().name(), "first");
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(AccountRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry.register(account(&format!("acct{}", i)));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.accounts().len(), 8);
        for i in 0..8 {
            let host = format!("acct{}.blob.core.windows.net", i);
            assert!(registry.resolve_by_host(&host).is_ok());
        }
    }

    proptest! {
        #[test]
        fn prop_resolution_independent_of_order(
            names in proptest::collection::hash_set("[a-z][a-z0-9]{2,12}", 1..6),
        ) {
            let names: Vec<String> = names.into_iter().collect();
            let forward = AccountRegistry::new();
            let backward = AccountRegistry::new();
            for name in &names {
                forward.register(account(name));
            }
            for name in names.iter().rev() {
                backward.register(account(name));
            }
            for name in &names {
                let expected = account(name);
                for host in expected.hosts() {
                    let found = forward.resolve_by_host(host).unwrap();
                    prop_assert_eq!(found.name(), name.as_str());
                    let found = backward.resolve_by_host(host).unwrap();
                    prop_assert_eq!(found.name(), name.as_str());
                }
            }
        }
    }
}
