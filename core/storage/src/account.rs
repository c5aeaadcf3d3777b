//! Storage accounts and connection-string parsing.

use std::fmt;
use url::Url;

use uristore_common::{Error, Result, SensitiveString};

/// Endpoint suffix used when a connection string does not name one.
pub const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Services an account exposes endpoints for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Blob,
    File,
    Table,
    Queue,
}

impl Service {
    pub const ALL: [Service; 4] = [Service::File, Service::Blob, Service::Table, Service::Queue];

    /// DNS label used for derived endpoint hosts.
    pub fn label(&self) -> &'static str {
        match self {
            Service::Blob => "blob",
            Service::File => "file",
            Service::Table => "table",
            Service::Queue => "queue",
        }
    }

    fn endpoint_key(&self) -> &'static str {
        match self {
            Service::Blob => "blobendpoint",
            Service::File => "fileendpoint",
            Service::Table => "tableendpoint",
            Service::Queue => "queueendpoint",
        }
    }
}

/// Credentials carried for the wrapped backend SDKs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Shared account key.
    AccountKey(SensitiveString),
    /// Shared access signature token.
    SharedAccessSignature(SensitiveString),
    /// No credentials (public access).
    Anonymous,
}

/// Per-service endpoint hostnames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoints {
    pub blob: Option<String>,
    pub file: Option<String>,
    pub table: Option<String>,
    pub queue: Option<String>,
}

impl Endpoints {
    /// Hosts derived as `<account>.<service>.<suffix>` for every service.
    pub fn derived(account_name: &str, suffix: &str) -> Self {
        let host =
            |service: Service| Some(format!("{}.{}.{}", account_name, service.label(), suffix));
        Self {
            blob: host(Service::Blob),
            file: host(Service::File),
            table: host(Service::Table),
            queue: host(Service::Queue),
        }
    }

    pub fn get(&self, service: Service) -> Option<&str> {
        match service {
            Service::Blob => self.blob.as_deref(),
            Service::File => self.file.as_deref(),
            Service::Table => self.table.as_deref(),
            Service::Queue => self.queue.as_deref(),
        }
    }

    fn slot(&mut self, service: Service) -> &mut Option<String> {
        match service {
            Service::Blob => &mut self.blob,
            Service::File => &mut self.file,
            Service::Table => &mut self.table,
            Service::Queue => &mut self.queue,
        }
    }
}

/// A storage account: name, credentials and service endpoint hosts.
///
/// Immutable once built. Identity is the account name; the same account
/// is reachable under each of its endpoint hosts.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageAccount {
    name: String,
    credentials: Credentials,
    protocol: String,
    endpoints: Endpoints,
}

impl StorageAccount {
    /// Create an account with endpoints derived from the default suffix.
    pub fn new(name: impl Into<String>, credentials: Credentials) -> Self {
        let name = name.into();
        let endpoints = Endpoints::derived(&name, DEFAULT_ENDPOINT_SUFFIX);
        Self {
            name,
            credentials,
            protocol: "https".to_string(),
            endpoints,
        }
    }

    /// Replace the endpoint host for one service.
    pub fn with_endpoint(mut self, service: Service, host: impl Into<String>) -> Self {
        *self.endpoints.slot(service) = Some(host.into().to_ascii_lowercase());
        self
    }

    /// Drop the endpoint for one service.
    pub fn without_endpoint(mut self, service: Service) -> Self {
        *self.endpoints.slot(service) = None;
        self
    }

    /// Parse a `Key=Value;` connection string.
    ///
    /// Recognized keys (case-insensitive): `AccountName`, `AccountKey`,
    /// `SharedAccessSignature`, `DefaultEndpointsProtocol`,
    /// `EndpointSuffix` and the explicit `BlobEndpoint`, `FileEndpoint`,
    /// `TableEndpoint`, `QueueEndpoint`. Explicit endpoints win over
    /// derived ones. Without an `AccountName` only the explicit endpoints
    /// are known, and the name is taken from the first DNS label of one.
    ///
    /// # Errors
    /// - `InvalidInput` if a segment is not `key=value`, an endpoint is not
    ///   a URL with a host, or no account name can be determined
    pub fn parse(connection_string: &str) -> Result<Self> {
        let mut name = None;
        let mut key = None;
        let mut sas = None;
        let mut protocol = None;
        let mut suffix = None;
        let mut explicit = Endpoints::default();

        for segment in connection_string.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (k, v) = segment.split_once('=').ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Connection string segment '{}' is not key=value",
                    segment
                ))
            })?;
            let v = v.trim();
            match k.trim().to_ascii_lowercase().as_str() {
                "accountname" => name = Some(v.to_string()),
                "accountkey" => key = Some(SensitiveString::new(v)),
                "sharedaccesssignature" => {
                    sas = Some(SensitiveString::new(v.trim_start_matches('?')))
                }
                "defaultendpointsprotocol" => protocol = Some(v.to_ascii_lowercase()),
                "endpointsuffix" => suffix = Some(v.to_string()),
                other => {
                    if let Some(service) = Service::ALL.iter().find(|s| s.endpoint_key() == other) {
                        *explicit.slot(*service) = Some(endpoint_host(v)?);
                    }
                }
            }
        }

        let named = name.as_deref().is_some_and(|n| !n.is_empty());
        let name = match name {
            Some(name) if named => name,
            _ => Service::ALL
                .iter()
                .filter_map(|s| explicit.get(*s))
                .find_map(|host| host.split('.').next().map(str::to_string))
                .ok_or_else(|| {
                    Error::InvalidInput(
                        "Connection string has no account name or endpoint".to_string(),
                    )
                })?,
        };

        let mut endpoints = if named {
            Endpoints::derived(
                &name.to_ascii_lowercase(),
                suffix.as_deref().unwrap_or(DEFAULT_ENDPOINT_SUFFIX),
            )
        } else {
            Endpoints::default()
        };
        for service in Service::ALL {
            if let Some(host) = explicit.get(service) {
                *endpoints.slot(service) = Some(host.to_string());
            }
        }

        let credentials = match (key, sas) {
            (Some(key), _) => Credentials::AccountKey(key),
            (None, Some(sas)) => Credentials::SharedAccessSignature(sas),
            (None, None) => Credentials::Anonymous,
        };

        Ok(Self {
            name,
            credentials,
            protocol: protocol.unwrap_or_else(|| "https".to_string()),
            endpoints,
        })
    }

    /// Account name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Endpoint host for a service, if the account has one.
    pub fn endpoint(&self, service: Service) -> Option<&str> {
        self.endpoints.get(service)
    }

    /// All endpoint hosts, in file, blob, table, queue order.
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        Service::ALL.into_iter().filter_map(move |s| self.endpoints.get(s))
    }

    /// Base URL of a service endpoint.
    pub fn service_url(&self, service: Service) -> Option<Url> {
        let host = self.endpoint(service)?;
        Url::parse(&format!("{}://{}/", self.protocol, host)).ok()
    }
}

impl fmt::Debug for StorageAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageAccount")
            .field("name", &self.name)
            .field("credentials", &self.credentials)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

fn endpoint_host(value: &str) -> Result<String> {
    let url = Url::parse(value)
        .map_err(|e| Error::InvalidInput(format!("Invalid endpoint '{}': {}", value, e)))?;
    url.host_str()
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| Error::InvalidInput(format!("Endpoint '{}' has no host", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONN: &str = concat!(
        "DefaultEndpointsProtocol=https;AccountName=myacct;",
        "AccountKey=a2V5a2V5==;EndpointSuffix=core.windows.net",
    );

    #[test]
    fn test_parse_derives_all_endpoints() {
        let account = StorageAccount::parse(CONN).unwrap();
        assert_eq!(account.name(), "myacct");
        assert_eq!(account.endpoint(Service::Blob), Some("myacct.blob.core.windows.net"));
        assert_eq!(account.endpoint(Service::File), Some("myacct.file.core.windows.net"));
        assert_eq!(account.endpoint(Service::Table), Some("myacct.table.core.windows.net"));
        assert_eq!(account.endpoint(Service::Queue), Some("myacct.queue.core.windows.net"));
        assert_eq!(account.hosts().count(), 4);
    }

    #[test]
    fn test_parse_keeps_key_padding() {
        let account = StorageAccount::parse(CONN).unwrap();
        match account.credentials() {
            Credentials::AccountKey(key) => assert_eq!(key.expose(), "a2V5a2V5=="),
            other => panic!("unexpected credentials {:?}", other),
        }
    }

    #[test]
    fn test_parse_explicit_endpoint_only() {
        let account = StorageAccount::parse(
            "BlobEndpoint=https://sasacct.blob.core.windows.net/;\
             SharedAccessSignature=?sv=2020&sig=abc",
        )
        .unwrap();
        assert_eq!(account.name(), "sasacct");
        assert_eq!(account.endpoint(Service::Blob), Some("sasacct.blob.core.windows.net"));
        assert_eq!(account.endpoint(Service::File), None);
        assert!(matches!(
            account.credentials(),
            Credentials::SharedAccessSignature(s) if s.expose() == "sv=2020&sig=abc"
        ));
    }

    #[test]
    fn test_parse_explicit_endpoint_overrides_derived() {
        let account = StorageAccount::parse(
            "AccountName=dev;AccountKey=k;BlobEndpoint=http://127.0.0.1:10000/dev",
        )
        .unwrap();
        assert_eq!(account.endpoint(Service::Blob), Some("127.0.0.1"));
        assert_eq!(account.endpoint(Service::File), Some("dev.file.core.windows.net"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(StorageAccount::parse("not a connection string").is_err());
        assert!(StorageAccount::parse("AccountKey=abc").is_err());
        assert!(StorageAccount::parse("").is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let account = StorageAccount::parse(CONN).unwrap();
        assert!(!format!("{:?}", account).contains("a2V5a2V5"));
    }

    #[test]
    fn test_service_url() {
        let account = StorageAccount::new("acct", Credentials::Anonymous);
        assert_eq!(
            account.service_url(Service::File).unwrap().as_str(),
            "https://acct.file.core.windows.net/"
        );
        let account = account.without_endpoint(Service::File);
        assert!(account.service_url(Service::File).is_none());
    }
}
