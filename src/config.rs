use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.toml";

// ============================================================================
// Config
// ============================================================================

/// Settings from `config.toml`; every field has a default
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub packages: PackagesConfig,
    pub tempest: TempestConfig,
    pub logs: LogsConfig,
}

/// How installed packages are detected
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PackageBackend {
    /// Parse the dpkg status database
    #[default]
    StatusFile,
    /// Ask `dpkg-query`
    DpkgQuery,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PackagesConfig {
    pub backend: PackageBackend,
    pub status_file: String,
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            backend: PackageBackend::default(),
            status_file: debkit::backend::DEFAULT_STATUS_FILE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TempestConfig {
    /// Workspace directory created by `tempest init`
    pub workspace: String,
    pub flavor_min_mem: u32,
    pub flavor_min_disk: u32,
    /// Image for `discover-tempest-config`; defaults to the Ubuntu cloud
    /// image matching the host release and architecture
    pub image: Option<String>,
}

impl Default for TempestConfig {
    fn default() -> Self {
        Self {
            workspace: "mycloud01".to_string(),
            flavor_min_mem: 1024,
            flavor_min_disk: 5,
            image: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogsConfig {
    /// Dump the systemd journal when collecting diagnostics
    pub journal: bool,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self { journal: true }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf> {
        Ok(paths::config_dir()?.join(CONFIG_FILE))
    }

    /// Load config from `path`, or from the default location
    ///
    /// A missing file at the default location yields the defaults; an
    /// explicitly given file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path()?;
                if !path.exists() {
                    log::debug!("No config at {}, using defaults", path.display());
                    return Ok(Self::default());
                }
                Self::load_from(&path)
            }
        }
    }

    /// Load config from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Package client for the configured backend
    pub fn package_client(&self) -> debkit::Client {
        match self.packages.backend {
            PackageBackend::StatusFile => {
                debkit::Client::from_status_file(&paths::expand(&self.packages.status_file))
            }
            PackageBackend::DpkgQuery => debkit::Client::dpkg_query(),
        }
    }

    /// Tempest workspace path
    pub fn tempest_workspace(&self) -> PathBuf {
        paths::expand(&self.tempest.workspace)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.packages.backend, PackageBackend::StatusFile);
        assert_eq!(config.packages.status_file, "/var/lib/dpkg/status");
        assert_eq!(config.tempest.workspace, "mycloud01");
        assert_eq!(config.tempest.flavor_min_mem, 1024);
        assert!(config.logs.journal);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[packages]
backend = "dpkg-query"

[tempest]
image = "/srv/images/noble.img"
"#,
        )
        .unwrap();

        assert_eq!(config.packages.backend, PackageBackend::DpkgQuery);
        assert_eq!(config.packages.status_file, "/var/lib/dpkg/status");
        assert_eq!(config.tempest.image.as_deref(), Some("/srv/images/noble.img"));
        assert_eq!(config.tempest.flavor_min_disk, 5);
        assert!(config.logs.journal);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logs]\njournal = false").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert!(!config.logs.journal);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let err = Config::load(Some(Path::new("/nonexistent/regress-stack.toml"))).unwrap_err();
        assert!(err.to_string().contains("Could not read"));
    }

    #[test]
    fn test_invalid_backend_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[packages]\nbackend = \"rpm\"").unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_serialize_roundtrip_of_defaults() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(text.contains("backend = \"status-file\""));
    }
}
