//! Segmented listing over containers.
//!
//! Cloud listings are fetched one backend page at a time. [`StorageContainer::list`]
//! accumulates pages until one of these happens first:
//! - `max_results` entries have been collected (truncated exactly)
//! - the backend reports no continuation token
//! - the wall-clock timeout elapses (checked between pages)
//! - the cancellation token fires (checked between pages)
//!
//! Early termination returns the partial result. An error on any page
//! fails the whole call.

use futures::stream::{self, Stream};
use regex::Regex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use uristore_common::{ContinuationToken, Error, Result};

use crate::backend::ListEntry;
use crate::config::ListingDefaults;
use crate::container::{unavailable, StorageContainer};
use crate::item::StorageItem;
use crate::location::last_segment;
use crate::resolver::NativeTarget;

/// Glob filter matched against the last path segment of each entry.
///
/// `*` matches any run of characters and `?` exactly one; everything else
/// is literal. The match is anchored at both ends.
#[derive(Debug, Clone)]
pub struct GlobFilter {
    glob: String,
    regex: Regex,
    prefix: String,
}

impl GlobFilter {
    /// Compile a glob.
    ///
    /// # Errors
    /// - `InvalidInput` if the translated pattern does not compile
    pub fn new(glob: &str) -> Result<Self> {
        let mut pattern = String::with_capacity(glob.len() + 8);
        pattern.push('^');
        for c in glob.chars() {
            match c {
                '*' => pattern.push_str(".*"),
                '?' => pattern.push('.'),
                c => pattern.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern)
            .map_err(|e| Error::InvalidInput(format!("Invalid filter '{}': {}", glob, e)))?;
        let prefix = glob.chars().take_while(|c| *c != '*' && *c != '?').collect();
        Ok(Self {
            glob: glob.to_string(),
            regex,
            prefix,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.glob
    }

    /// Literal text before the first wildcard.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// Options for a listing call.
#[derive(Debug, Clone)]
pub struct ListOptions {
    filter: Option<GlobFilter>,
    max_results: usize,
    timeout: Duration,
    cancellation: Option<CancellationToken>,
}

impl ListOptions {
    /// Options with no filter and the given defaults.
    pub fn new(defaults: &ListingDefaults) -> Self {
        Self {
            filter: None,
            max_results: defaults.max_results,
            timeout: defaults.timeout,
            cancellation: None,
        }
    }

    /// Set a glob filter; an empty glob lists everything.
    pub fn with_filter(mut self, glob: &str) -> Result<Self> {
        self.filter = if glob.is_empty() {
            None
        } else {
            Some(GlobFilter::new(glob)?)
        };
        Ok(self)
    }

    /// Cap on the number of entries returned.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Wall-clock budget for an unsegmented listing.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn filter(&self) -> Option<&GlobFilter> {
        self.filter.as_ref()
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation.as_ref().is_some_and(|t| t.is_cancelled())
    }

    fn matches(&self, name: &str) -> bool {
        self.filter.as_ref().map_or(true, |f| f.is_match(name))
    }
}

impl Default for ListOptions {
    fn default() -> Self {
        Self::new(&ListingDefaults::default())
    }
}

/// A listed child of a container.
#[derive(Debug)]
pub enum StorageEntry {
    Item(StorageItem),
    Container(StorageContainer),
}

impl StorageEntry {
    pub fn uri(&self) -> &Url {
        match self {
            StorageEntry::Item(item) => item.uri(),
            StorageEntry::Container(container) => container.uri(),
        }
    }

    /// Last path segment of the entry's URI.
    pub fn name(&self) -> String {
        last_segment(self.uri()).unwrap_or_default()
    }

    pub fn is_container(&self) -> bool {
        matches!(self, StorageEntry::Container(_))
    }

    pub fn into_item(self) -> Option<StorageItem> {
        match self {
            StorageEntry::Item(item) => Some(item),
            StorageEntry::Container(_) => None,
        }
    }

    pub fn into_container(self) -> Option<StorageContainer> {
        match self {
            StorageEntry::Container(container) => Some(container),
            StorageEntry::Item(_) => None,
        }
    }
}

/// One page of a segmented listing.
#[derive(Debug, Default)]
pub struct ListPage {
    pub entries: Vec<StorageEntry>,
    /// Token for the next page; `None` once the listing is exhausted.
    pub next: Option<ContinuationToken>,
}

impl ListPage {
    pub fn is_exhausted(&self) -> bool {
        self.next.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
enum Stop {
    Exhausted,
    MaxResults,
    Deadline,
    Cancelled,
}

impl StorageContainer {
    /// Fetch exactly one page of children.
    ///
    /// Pass the previous page's `next` token to continue. Local
    /// directories are not paginated: the single page holds every match
    /// (up to `max_results`) and is always exhausted.
    ///
    /// # Errors
    /// - `NotFound` if the container does not exist
    /// - `BackendUnavailable` if the backend listing call fails
    pub async fn list_page(
        &self,
        options: &ListOptions,
        token: Option<&ContinuationToken>,
    ) -> Result<ListPage> {
        match self.native() {
            NativeTarget::Local(path) => {
                let mut entries = Vec::new();
                let listed = self.resolver.local().list(path).await.map_err(listing_error)?;
                for entry in listed {
                    let name = entry
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    if !options.matches(&name) {
                        continue;
                    }
                    if entries.len() >= options.max_results {
                        break;
                    }
                    let (uri, target) = self.local_child(&entry.path, entry.is_dir)?;
                    entries.push(self.entry(uri, target, entry.is_dir));
                }
                Ok(ListPage { entries, next: None })
            }
            NativeTarget::Blob { account, address } => {
                let prefix = address.as_directory().name;
                let segment = self
                    .resolver
                    .blob_store()?
                    .list_segment(account, &address.container, &prefix, options.max_results, token)
                    .await
                    .map_err(listing_error)?;
                let mut entries = Vec::with_capacity(segment.entries.len());
                for ListEntry { name, is_container } in segment.entries {
                    let last = name.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
                    if !options.matches(last) {
                        continue;
                    }
                    let (uri, target) = self.blob_child(account, &address.container, name)?;
                    entries.push(self.entry(uri, target, is_container));
                }
                Ok(ListPage {
                    entries,
                    next: segment.next,
                })
            }
            NativeTarget::FileShare { account, address } => {
                let prefix = options.filter().map(GlobFilter::prefix).unwrap_or_default();
                let segment = self
                    .resolver
                    .file_share_store()?
                    .list_segment(account, address, prefix, options.max_results, token)
                    .await
                    .map_err(listing_error)?;
                let mut entries = Vec::with_capacity(segment.entries.len());
                for ListEntry { name, is_container } in segment.entries {
                    if !options.matches(&name) {
                        continue;
                    }
                    let (uri, target) =
                        self.share_child(account, address.child(name), is_container)?;
                    entries.push(self.entry(uri, target, is_container));
                }
                Ok(ListPage {
                    entries,
                    next: segment.next,
                })
            }
        }
    }

    /// List children across pages, bounded by `max_results`, the timeout
    /// and the cancellation token.
    ///
    /// # Errors
    /// Any page failure; entries gathered so far are discarded.
    pub async fn list(&self, options: &ListOptions) -> Result<Vec<StorageEntry>> {
        // A timeout too large to represent means no deadline.
        let deadline = Instant::now().checked_add(options.timeout);
        let mut results = Vec::new();
        let mut token: Option<ContinuationToken> = None;
        let mut pages = 0usize;

        let stop = loop {
            let page = self.list_page(options, token.as_ref()).await?;
            pages += 1;
            results.extend(page.entries);

            if results.len() >= options.max_results {
                results.truncate(options.max_results);
                break Stop::MaxResults;
            }
            match page.next {
                Some(next) => token = Some(next),
                None => break Stop::Exhausted,
            }
            if options.is_cancelled() {
                break Stop::Cancelled;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break Stop::Deadline;
            }
        };

        debug!(
            "Listed {} entries from {} in {} pages ({:?})",
            results.len(),
            self.uri(),
            pages,
            stop
        );
        Ok(results)
    }

    /// List everything matching `filter` using the configured defaults.
    pub async fn list_all(&self, filter: &str) -> Result<Vec<StorageEntry>> {
        let options = ListOptions::new(self.resolver.listing_defaults()).with_filter(filter)?;
        self.list(&options).await
    }

    /// Pages of the listing as a stream.
    ///
    /// The stream ends after the exhausted page or after the first error.
    /// Timeout and `max_results` accumulation are left to the consumer.
    pub fn pages<'a>(
        &'a self,
        options: &'a ListOptions,
    ) -> impl Stream<Item = Result<ListPage>> + 'a {
        stream::unfold(Some(None), move |state: Option<Option<ContinuationToken>>| async move {
            let token = state?;
            if token.is_some() && options.is_cancelled() {
                return None;
            }
            match self.list_page(options, token.as_ref()).await {
                Ok(page) => {
                    let next = page.next.clone().map(Some);
                    Some((Ok(page), next))
                }
                Err(e) => Some((Err(e), None)),
            }
        })
    }

    fn entry(&self, uri: Url, target: NativeTarget, is_container: bool) -> StorageEntry {
        if is_container {
            StorageEntry::Container(StorageContainer::new(self.resolver.clone(), uri, target))
        } else {
            StorageEntry::Item(StorageItem::new(self.resolver.clone(), uri, target))
        }
    }
}

fn listing_error(err: Error) -> Error {
    match err {
        Error::NotFound(_) => err,
        other => unavailable(other),
    }
}
