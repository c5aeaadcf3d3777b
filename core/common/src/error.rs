//! Common error types for uristore.

use thiserror::Error;

/// Category of an [`Error`], for matching without inspecting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedLocation,
    AccountNotFound,
    InvalidLocationForBackend,
    AlreadyExists,
    BackendUnavailable,
    NotFound,
    InvalidInput,
    Io,
}

/// Top-level error type for uristore operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Location could not be parsed, or is not absolute where it must be.
    #[error("Malformed location: {0}")]
    MalformedLocation(String),

    /// No configured account matches a host, name or path.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Location was classified to a backend but does not address a valid
    /// object of that backend.
    #[error("Invalid location for backend: {0}")]
    InvalidLocationForBackend(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// An underlying creation or listing call failed.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input provided (configuration values, patterns).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedLocation(_) => ErrorKind::MalformedLocation,
            Error::AccountNotFound(_) => ErrorKind::AccountNotFound,
            Error::InvalidLocationForBackend(_) => ErrorKind::InvalidLocationForBackend,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Convert an I/O error on `target`, keeping the not-found and
    /// already-exists cases as their own kinds.
    pub fn from_io(err: std::io::Error, target: impl std::fmt::Display) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(target.to_string()),
            std::io::ErrorKind::AlreadyExists => Error::AlreadyExists(target.to_string()),
            _ => Error::Io(err),
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
