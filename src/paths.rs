//! Centralized path resolution for regress-stack
//!
//! # Environment Variables
//!
//! - `REGRESS_STACK_CONFIG_DIR` - Override config directory
//! - `REGRESS_STACK_STATE_DIR` - Override state directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `REGRESS_STACK_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/regress-stack` (if set)
//! 3. `~/.config/regress-stack`
//!
//! For state_dir():
//! 1. `REGRESS_STACK_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/regress-stack` (if set)
//! 3. `~/.local/state/regress-stack`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "REGRESS_STACK_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "REGRESS_STACK_STATE_DIR";

const APP_DIR: &str = "regress-stack";

/// Get the regress-stack config directory path
pub fn config_dir() -> Result<PathBuf> {
    // 1. Check environment variable override
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    // 2. Check XDG_CONFIG_HOME
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    // 3. Default: ~/.config/regress-stack
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the regress-stack state directory path
pub fn state_dir() -> Result<PathBuf> {
    // 1. Check environment variable override
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    // 2. Check XDG_STATE_HOME
    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join(APP_DIR);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    // 3. Default: ~/.local/state/regress-stack
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP_DIR);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Process environment overrides, restored on drop
    struct ScopedEnv {
        saved: Vec<(&'static str, Option<String>)>,
        _lock: MutexGuard<'static, ()>,
    }

    impl ScopedEnv {
        fn new(vars: &[(&'static str, Option<&str>)]) -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();
            for (key, value) in vars {
                set(key, *value);
            }
            Self { saved, _lock: lock }
        }
    }

    impl Drop for ScopedEnv {
        fn drop(&mut self) {
            for (key, value) in &self.saved {
                set(key, value.as_deref());
            }
        }
    }

    fn set(key: &str, value: Option<&str>) {
        // SAFETY: callers hold ENV_LOCK
        match value {
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
    }

    #[test]
    fn test_override_beats_xdg_and_expands_tilde() {
        let _env = ScopedEnv::new(&[
            (ENV_CONFIG_DIR, Some("~/ci/regress-stack")),
            (ENV_STATE_DIR, Some("/srv/regress-stack/state")),
            ("XDG_CONFIG_HOME", Some("/tmp/xdg-config")),
            ("XDG_STATE_HOME", Some("/tmp/xdg-state")),
        ]);
        let home = dirs::home_dir().unwrap();
        assert_eq!(config_dir().unwrap(), home.join("ci").join("regress-stack"));
        assert_eq!(state_dir().unwrap(), PathBuf::from("/srv/regress-stack/state"));
    }

    #[test]
    fn test_xdg_dirs_without_override() {
        let _env = ScopedEnv::new(&[
            (ENV_CONFIG_DIR, None),
            (ENV_STATE_DIR, None),
            ("XDG_CONFIG_HOME", Some("/tmp/xdg-config")),
            ("XDG_STATE_HOME", Some("/tmp/xdg-state")),
        ]);
        assert_eq!(config_dir().unwrap(), PathBuf::from("/tmp/xdg-config/regress-stack"));
        assert_eq!(state_dir().unwrap(), PathBuf::from("/tmp/xdg-state/regress-stack"));
    }

    #[cfg(unix)]
    #[test]
    fn test_home_defaults() {
        let _env = ScopedEnv::new(&[
            (ENV_CONFIG_DIR, None),
            (ENV_STATE_DIR, None),
            ("XDG_CONFIG_HOME", None),
            ("XDG_STATE_HOME", None),
        ]);
        let home = dirs::home_dir().unwrap();
        assert_eq!(config_dir().unwrap(), home.join(".config/regress-stack"));
        assert_eq!(state_dir().unwrap(), home.join(".local/state/regress-stack"));
    }

    #[test]
    fn test_expand() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand("~/mycloud01"), home.join("mycloud01"));
        assert_eq!(expand("/var/lib/dpkg/status"), PathBuf::from("/var/lib/dpkg/status"));
        // shellexpand fails on unknown variables; the input is kept
        assert_eq!(
            expand("/srv/$REGRESS_STACK_UNSET_12345/ws"),
            PathBuf::from("/srv/$REGRESS_STACK_UNSET_12345/ws")
        );
    }
}
