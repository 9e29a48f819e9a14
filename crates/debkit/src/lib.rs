//! # debkit
//!
//! Pure Rust library for answering "is this Debian package installed?".
//!
//! The package database is read once, on the first query, and kept for the
//! life of the [`Client`]. Lookups for names the database does not know are
//! answered with "not installed" rather than an error, so callers can probe
//! arbitrary package lists without special-casing typos or packages from
//! other releases.
//!
//! ## Example
//!
//! ```no_run
//! use debkit::Client;
//!
//! let client = Client::new();
//!
//! if client.installed(&["mysql-server", "rabbitmq-server"]) {
//!     println!("database and broker are present");
//! }
//!
//! let version = client.get_version("mysql-server").expect("index unreadable");
//! println!("mysql-server: {:?}", version);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod status;
pub mod types;

pub use error::{Error, Result};
pub use types::{PackageIndex, PackageRecord, PackageState};

use backend::{Backend, DpkgQueryBackend, StatusFileBackend};
use std::cell::OnceCell;
use std::path::Path;

/// High-level client for package presence queries.
///
/// The client wraps a backend and memoizes the index it produces: the
/// backend is asked to load the database at most once successfully.
pub struct Client {
    backend: Box<dyn Backend>,
    index: OnceCell<PackageIndex>,
}

impl Client {
    /// Create a client reading the default dpkg status database.
    pub fn new() -> Self {
        Self::with_backend(Box::new(backend::default_backend()))
    }

    /// Create a client reading a status database at a custom path.
    pub fn from_status_file(path: &Path) -> Self {
        Self::with_backend(Box::new(StatusFileBackend::new(path)))
    }

    /// Create a client backed by `dpkg-query`.
    pub fn dpkg_query() -> Self {
        Self::with_backend(Box::new(DpkgQueryBackend::new()))
    }

    /// Create a client with a custom backend (useful for testing).
    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            index: OnceCell::new(),
        }
    }

    /// Check if the package database can be read.
    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    /// Get the index, loading it on first use.
    pub fn try_index(&self) -> Result<&PackageIndex> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }

        let index = self.backend.load_index()?;
        log::debug!(
            "Package index loaded via {} ({} packages)",
            self.backend.name(),
            index.len()
        );
        Ok(self.index.get_or_init(|| index))
    }

    /// Get the index, falling back to an empty one if it cannot be read.
    ///
    /// The fallback is memoized too, so an unreadable database is reported
    /// once and every later lookup answers "not installed".
    pub fn index(&self) -> &PackageIndex {
        match self.try_index() {
            Ok(index) => index,
            Err(e) => {
                log::warn!(
                    "Failed to load package index via {}: {}",
                    self.backend.name(),
                    e
                );
                self.index.get_or_init(PackageIndex::new)
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Whether every named package is installed.
    ///
    /// Never fails: unknown names and an unreadable database both count as
    /// "not installed". An empty list is trivially installed.
    pub fn installed<S: AsRef<str>>(&self, names: &[S]) -> bool {
        if names.is_empty() {
            return true;
        }

        let index = self.index();
        names.iter().all(|name| {
            let installed = index.is_installed(name.as_ref());
            if !installed {
                log::debug!("Package {:?} is not installed", name.as_ref());
            }
            installed
        })
    }

    /// Check if a single package is installed.
    pub fn is_installed(&self, name: &str) -> Result<bool> {
        Ok(self.try_index()?.is_installed(name))
    }

    /// Get the recorded version of an installed package.
    pub fn get_version(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .try_index()?
            .get(name)
            .filter(|r| r.is_installed())
            .and_then(|r| r.version.clone()))
    }

    /// List all installed packages, sorted by name.
    pub fn list_installed(&self) -> Result<Vec<PackageRecord>> {
        let mut installed: Vec<PackageRecord> =
            self.try_index()?.installed().cloned().collect();
        installed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(installed)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("backend", &self.backend.name())
            .field("loaded", &self.index.get().is_some())
            .finish()
    }
}
