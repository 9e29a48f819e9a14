//! Backend that parses the dpkg status database directly.

use crate::backend::Backend;
use crate::error::Result;
use crate::status;
use crate::types::PackageIndex;
use std::path::{Path, PathBuf};

/// Default location of the dpkg status database.
pub const DEFAULT_STATUS_FILE: &str = "/var/lib/dpkg/status";

/// Backend reading `/var/lib/dpkg/status` (or another status file).
#[derive(Debug, Clone)]
pub struct StatusFileBackend {
    path: PathBuf,
}

impl StatusFileBackend {
    /// Create a backend reading the status database at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the status database.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for StatusFileBackend {
    fn default() -> Self {
        Self::new(DEFAULT_STATUS_FILE)
    }
}

impl Backend for StatusFileBackend {
    fn name(&self) -> &'static str {
        "status-file"
    }

    fn is_available(&self) -> bool {
        self.path.is_file()
    }

    fn load_index(&self) -> Result<PackageIndex> {
        let index = status::parse_file(&self.path)?;
        log::debug!(
            "Loaded {} packages from {}",
            index.len(),
            self.path.display()
        );
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::io::Write;

    #[test]
    fn test_load_index() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Package: rabbitmq-server").unwrap();
        writeln!(file, "Status: install ok installed").unwrap();

        let backend = StatusFileBackend::new(file.path());
        assert!(backend.is_available());
        let index = backend.load_index().unwrap();
        assert!(index.is_installed("rabbitmq-server"));
    }

    #[test]
    fn test_missing_status_file() {
        let backend = StatusFileBackend::new("/nonexistent/status");
        assert!(!backend.is_available());
        assert!(matches!(
            backend.load_index(),
            Err(Error::StatusFileNotFound(_))
        ));
    }

    #[test]
    fn test_default_path() {
        assert_eq!(
            StatusFileBackend::default().path(),
            Path::new(DEFAULT_STATUS_FILE)
        );
    }
}
