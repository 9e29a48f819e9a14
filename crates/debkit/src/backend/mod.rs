//! Backend abstraction for reading the package database.
//!
//! The [`Backend`] trait decouples the [`Client`](crate::Client) from how
//! the package index is obtained, allowing for:
//! - Reading the dpkg status database directly
//! - Asking `dpkg-query`
//! - Mock implementations for testing

pub mod dpkg_query;
pub mod status_file;

use crate::error::Result;
use crate::types::PackageIndex;

pub use dpkg_query::DpkgQueryBackend;
pub use status_file::{DEFAULT_STATUS_FILE, StatusFileBackend};

/// Backend trait for package database access.
pub trait Backend: Send + Sync {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Check if the package database can be read.
    fn is_available(&self) -> bool;

    /// Read the whole package database.
    fn load_index(&self) -> Result<PackageIndex>;
}

/// Get the default backend (the dpkg status database).
pub fn default_backend() -> StatusFileBackend {
    StatusFileBackend::default()
}
