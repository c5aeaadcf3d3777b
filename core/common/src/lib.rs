//! Common utilities and types shared across uristore crates.
//!
//! This module provides the error type every storage operation reports
//! and the small value types (backend kinds, continuation tokens,
//! property bags, secrets) that cross crate boundaries.

pub mod error;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use types::{BackendKind, ContinuationToken, PropertyBag, SensitiveString};
