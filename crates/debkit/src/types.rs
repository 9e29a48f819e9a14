//! Core types for Debian package queries.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Installation state of a package as recorded by dpkg.
///
/// A package counts as installed once it is configured, including while
/// trigger processing is still outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageState {
    /// Not installed at all
    NotInstalled,
    /// Removed, only configuration files remain
    ConfigFiles,
    /// Installation started but did not complete
    HalfInstalled,
    /// Unpacked but not configured
    Unpacked,
    /// Configuration started but did not complete
    HalfConfigured,
    /// Waiting on another package's trigger processing
    TriggersAwaited,
    /// Triggered but trigger processing has not run
    TriggersPending,
    /// Unpacked and configured
    Installed,
}

impl PackageState {
    /// Parse the state word of a `Status:` field (third word).
    pub fn from_status_word(s: &str) -> Option<Self> {
        match s {
            "not-installed" => Some(Self::NotInstalled),
            "config-files" => Some(Self::ConfigFiles),
            "half-installed" => Some(Self::HalfInstalled),
            "unpacked" => Some(Self::Unpacked),
            "half-configured" => Some(Self::HalfConfigured),
            "triggers-awaited" => Some(Self::TriggersAwaited),
            "triggers-pending" => Some(Self::TriggersPending),
            "installed" => Some(Self::Installed),
            _ => None,
        }
    }

    /// Parse the state letter of `${db:Status-Abbrev}` (second character).
    pub fn from_abbrev(c: char) -> Option<Self> {
        match c {
            'n' => Some(Self::NotInstalled),
            'c' => Some(Self::ConfigFiles),
            'H' => Some(Self::HalfInstalled),
            'U' => Some(Self::Unpacked),
            'F' => Some(Self::HalfConfigured),
            'W' => Some(Self::TriggersAwaited),
            't' => Some(Self::TriggersPending),
            'i' => Some(Self::Installed),
            _ => None,
        }
    }

    /// The dpkg status word for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInstalled => "not-installed",
            Self::ConfigFiles => "config-files",
            Self::HalfInstalled => "half-installed",
            Self::Unpacked => "unpacked",
            Self::HalfConfigured => "half-configured",
            Self::TriggersAwaited => "triggers-awaited",
            Self::TriggersPending => "triggers-pending",
            Self::Installed => "installed",
        }
    }

    /// Whether the package is configured and usable.
    ///
    /// Pending or awaited triggers do not undo configuration, and apt runs
    /// routinely leave packages in those states.
    pub fn is_installed(&self) -> bool {
        matches!(
            self,
            Self::Installed | Self::TriggersPending | Self::TriggersAwaited
        )
    }
}

impl std::fmt::Display for PackageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One package entry of the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    /// Package name without architecture qualifier
    pub name: String,
    /// Architecture (`amd64`, `all`, ...), if recorded
    pub architecture: Option<String>,
    /// Version string, if recorded
    pub version: Option<String>,
    /// Installation state
    pub state: PackageState,
}

impl PackageRecord {
    /// Create a record with the given name and state.
    pub fn new(name: impl Into<String>, state: PackageState) -> Self {
        Self {
            name: name.into(),
            architecture: None,
            version: None,
            state,
        }
    }

    /// Set the architecture.
    pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = Some(architecture.into());
        self
    }

    /// Set the version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Whether this record is fully installed.
    pub fn is_installed(&self) -> bool {
        self.state.is_installed()
    }
}

/// Snapshot of the system package database.
///
/// Multi-arch systems can carry several records for one name (one per
/// architecture), so records are grouped by name.
#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
    records: HashMap<String, Vec<PackageRecord>>,
}

impl PackageIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record.
    pub fn insert(&mut self, record: PackageRecord) {
        self.records
            .entry(record.name.clone())
            .or_default()
            .push(record);
    }

    /// Look up a package by `name` or `name:arch`.
    ///
    /// For a bare name, an installed record is preferred over any other.
    pub fn get(&self, query: &str) -> Option<&PackageRecord> {
        let (name, arch) = split_arch(query);
        let candidates = self.records.get(name)?;

        match arch {
            Some(arch) => candidates
                .iter()
                .find(|r| r.architecture.as_deref() == Some(arch)),
            None => candidates
                .iter()
                .find(|r| r.is_installed())
                .or_else(|| candidates.first()),
        }
    }

    /// Whether the named package is installed. Unknown names are not.
    pub fn is_installed(&self, query: &str) -> bool {
        self.get(query).is_some_and(PackageRecord::is_installed)
    }

    /// Iterate over installed records.
    pub fn installed(&self) -> impl Iterator<Item = &PackageRecord> {
        self.records
            .values()
            .flatten()
            .filter(|r| r.is_installed())
    }

    /// Number of distinct package names.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the index has no packages.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<PackageRecord> for PackageIndex {
    fn from_iter<I: IntoIterator<Item = PackageRecord>>(iter: I) -> Self {
        let mut index = Self::new();
        for record in iter {
            index.insert(record);
        }
        index
    }
}

/// Split `name:arch` into its parts.
fn split_arch(query: &str) -> (&str, Option<&str>) {
    match query.split_once(':') {
        Some((name, arch)) if !arch.is_empty() => (name, Some(arch)),
        Some((name, _)) => (name, None),
        None => (query, None),
    }
}
