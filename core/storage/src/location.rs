//! Location normalization and URI helpers.

use percent_encoding::percent_decode_str;
use std::path::Path;
use url::Url;

use uristore_common::{Error, Result};

/// Normalize a location string to an absolute URI.
///
/// Strings that parse as absolute URIs are used as-is. Anything else is
/// treated as a local path: relative paths are made absolute against the
/// current directory and turned into `file://` URIs. Single-letter schemes
/// (`C:\data`) are drive letters, not URI schemes.
///
/// # Errors
/// - `MalformedLocation` carrying the original parse error when the
///   string is neither a URI nor a usable path
pub fn normalize(location: &str) -> Result<Url> {
    let parse_error = match Url::parse(location) {
        Ok(uri) if uri.scheme().len() > 1 => return Ok(uri),
        Ok(_) => None,
        Err(e) => Some(e),
    };

    let malformed = || match &parse_error {
        Some(e) => Error::MalformedLocation(format!("{}: {}", location, e)),
        None => Error::MalformedLocation(location.to_string()),
    };

    if location.trim().is_empty() {
        return Err(malformed());
    }

    let path = Path::new(location);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::path::absolute(path).map_err(|_| malformed())?
    };
    Url::from_file_path(&absolute).map_err(|_| malformed())
}

/// Non-empty, percent-decoded path segments of a URI.
pub fn segments(uri: &Url) -> Vec<String> {
    uri.path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default()
}

/// Percent-decoded final path segment, ignoring a trailing slash.
pub fn last_segment(uri: &Url) -> Option<String> {
    segments(uri).pop()
}

/// The URI with its last segment removed; `None` at the root.
///
/// The result always ends with a slash.
pub fn parent_uri(uri: &Url) -> Option<Url> {
    let mut parts: Vec<&str> = uri.path_segments()?.filter(|s| !s.is_empty()).collect();
    parts.pop()?;
    let mut parent = uri.clone();
    parent.set_query(None);
    parent.set_fragment(None);
    let mut path = String::from("/");
    for part in parts {
        path.push_str(part);
        path.push('/');
    }
    parent.set_path(&path);
    Some(parent)
}

/// Build a URI under `base`'s origin from raw path segments.
///
/// Segments are percent-encoded as needed. With `directory` set the URI
/// ends with a slash.
pub fn child_uri<S: AsRef<str>>(base: &Url, parts: &[S], directory: bool) -> Result<Url> {
    let mut uri = base.clone();
    uri.set_query(None);
    uri.set_fragment(None);
    {
        let mut path = uri
            .path_segments_mut()
            .map_err(|_| Error::MalformedLocation(format!("{} cannot have path segments", base)))?;
        path.clear();
        for part in parts {
            path.push(part.as_ref());
        }
        if directory && !parts.is_empty() {
            path.push("");
        }
    }
    Ok(uri)
}

/// Convert a UNC path (`\\host\share\dir`) to an `https://` file-share URI.
///
/// Absolute URIs pass through unchanged.
pub fn to_file_share_uri(path: &str) -> Result<Url> {
    if let Ok(uri) = Url::parse(path) {
        if uri.has_host() {
            return Ok(uri);
        }
    }
    let rewritten = match path.strip_prefix(r"\\") {
        Some(rest) => format!("https://{}", rest.replace('\\', "/")),
        None => path.replace('\\', "/"),
    };
    Url::parse(&rewritten).map_err(|e| Error::MalformedLocation(format!("{}: {}", path, e)))
}

/// Convert an `https://` file-share URI to a UNC path, percent-decoded.
pub fn to_unc_path(uri: &Url) -> String {
    let mut unc = String::from(r"\\");
    unc.push_str(uri.host_str().unwrap_or(""));
    for segment in segments(uri) {
        unc.push('\\');
        unc.push_str(&segment);
    }
    unc
}
