use crate::paths;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const STATE_FILE: &str = "state.toml";

// ============================================================================
// State Structures
// ============================================================================

/// Which modules have completed setup on this host
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SetupState {
    /// Completed modules, keyed by canonical module name
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleState>,

    /// Last time the state was updated
    pub last_updated: DateTime<Utc>,

    #[serde(skip)]
    path: PathBuf,
}

/// Setup record for one module
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ModuleState {
    /// When setup last completed
    pub completed_at: DateTime<Utc>,
}

// ============================================================================
// SetupState Implementation
// ============================================================================

impl SetupState {
    /// Get the state file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(paths::state_dir()?.join(STATE_FILE))
    }

    /// Load state from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load state from disk, or return empty state if the file doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("State file does not exist, using empty state");
            return Ok(Self::empty(path));
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file: {}", path.display()))?;

        let mut state: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
        state.path = path.to_path_buf();

        log::debug!("Loaded state from {}", path.display());
        Ok(state)
    }

    fn empty(path: &Path) -> Self {
        Self {
            modules: BTreeMap::new(),
            last_updated: Utc::now(),
            path: path.to_path_buf(),
        }
    }

    /// Save state to disk
    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content = toml::to_string_pretty(&self).context("Failed to serialize state to TOML")?;

        fs::write(&self.path, &content)
            .with_context(|| format!("Failed to write state file: {}", self.path.display()))?;

        log::debug!("Saved state to {}", self.path.display());
        Ok(())
    }

    // ========================================================================
    // Module Helpers
    // ========================================================================

    /// Record that `module` finished setup, and persist
    pub fn mark_setup(&mut self, module: &str) -> Result<()> {
        let now = Utc::now();
        self.modules
            .insert(module.to_string(), ModuleState { completed_at: now });
        self.last_updated = now;
        self.save()
    }

    /// Whether `module` has completed setup
    pub fn is_setup_done(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    /// When `module` completed setup
    pub fn completed_at(&self, module: &str) -> Option<DateTime<Utc>> {
        self.modules.get(module).map(|m| m.completed_at)
    }
}

// ============================================================================
// Tests
// ============================================================================
