//! Shared helpers every service module builds on.
//!
//! Always ordered first, so its packages (crudini) are present before any
//! config file is touched.

use crate::runner;
use anyhow::Result;
use stackgraph::ModuleSpec;

/// Keystone region every endpoint is registered in
pub const REGION: &str = "AutoPkgOne";

/// Password used for every service account
pub const SERVICE_PASSWORD: &str = "changeme";

pub fn spec() -> ModuleSpec {
    ModuleSpec::new()
        .packages(&["crudini"])
        .logs(&["/var/log/apache2/"])
}

/// An ordered batch of `(section, key, value)` settings for an INI file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    entries: Vec<(String, String, String)>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, section: &str, key: &str, value: impl Into<String>) -> Self {
        self.entries
            .push((section.to_string(), key.to_string(), value.into()));
        self
    }

    /// Set every `(key, value)` pair under `section`
    pub fn section<K, V>(mut self, section: &str, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.entries.extend(
            pairs
                .into_iter()
                .map(|(k, v)| (section.to_string(), k.into(), v.into())),
        );
        self
    }

    pub fn entries(&self) -> &[(String, String, String)] {
        &self.entries
    }

    /// Write every setting into `file` with crudini
    pub fn apply(&self, file: &str) -> Result<()> {
        log::debug!("Writing {} settings to {}", self.entries.len(), file);
        for (section, key, value) in &self.entries {
            runner::run("crudini", &["--set", file, section, key, value])?;
        }
        Ok(())
    }
}

/// Shrink an apache WSGI daemon to a single process
pub fn single_wsgi_process(daemon: &str, site_conf: &str) -> Result<()> {
    let expr = format!("s|{daemon} processes=5 threads=1|{daemon} processes=1 threads=1|");
    runner::run("sed", &["-i", &expr, site_conf])?;
    Ok(())
}

pub fn restart_apache() -> Result<()> {
    runner::restart_service("apache2")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_keep_order() {
        let settings = Settings::new()
            .set("database", "max_pool_size", "1")
            .section("keystone_authtoken", [("auth_type", "password"), ("username", "glance")])
            .set("DEFAULT", "workers", String::from("1"));

        let sections: Vec<_> = settings
            .entries()
            .iter()
            .map(|(s, k, _)| format!("{s}.{k}"))
            .collect();
        assert_eq!(
            sections,
            [
                "database.max_pool_size",
                "keystone_authtoken.auth_type",
                "keystone_authtoken.username",
                "DEFAULT.workers"
            ]
        );
    }

    #[test]
    fn test_spec_packages() {
        let spec = spec();
        assert_eq!(spec.packages, ["crudini"]);
        assert!(spec.dependencies.is_empty());
        assert!(spec.setup.is_none());
    }
}
