//! Backend that asks `dpkg-query` for the package list.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{PackageIndex, PackageRecord, PackageState};
use std::process::Command;

/// Output format: one tab-separated line per package.
const QUERY_FORMAT: &str = "${Package}\t${db:Status-Abbrev}\t${Version}\t${Architecture}\n";

/// Backend executing `dpkg-query -W`.
#[derive(Debug, Clone)]
pub struct DpkgQueryBackend {
    program: String,
}

impl DpkgQueryBackend {
    /// Create a backend using `dpkg-query` from `$PATH`.
    pub fn new() -> Self {
        Self {
            program: "dpkg-query".to_string(),
        }
    }

    /// Create a backend using a specific executable.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for DpkgQueryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for DpkgQueryBackend {
    fn name(&self) -> &'static str {
        "dpkg-query"
    }

    fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn load_index(&self) -> Result<PackageIndex> {
        let output = Command::new(&self.program)
            .args(["-W", "-f", QUERY_FORMAT])
            .output()
            .map_err(|e| Error::CommandFailed {
                message: format!("failed to execute {}: {}", self.program, e),
                stderr: String::new(),
            })?;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                message: format!("{} exited with {}", self.program, output.status),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_query_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `dpkg-query -W -f` output produced with [`QUERY_FORMAT`].
fn parse_query_output(stdout: &str) -> Result<PackageIndex> {
    let mut index = PackageIndex::new();

    for (line_num, line) in stdout.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        let [name, abbrev, version, arch] = fields.as_slice() else {
            return Err(Error::parse(
                line_num + 1,
                format!("expected 4 tab-separated fields, got {}", fields.len()),
            ));
        };

        // Abbreviation is want/state/error, e.g. "ii " or "rc "
        let state = abbrev
            .chars()
            .nth(1)
            .and_then(PackageState::from_abbrev)
            .unwrap_or(PackageState::NotInstalled);

        let mut record = PackageRecord::new(*name, state);
        if !version.is_empty() {
            record = record.with_version(*version);
        }
        if !arch.is_empty() {
            record = record.with_architecture(*arch);
        }
        index.insert(record);
    }

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_output() {
        let stdout = "mysql-server\tii \t8.0.36\tall\n\
                      keystone\trc \t2:25.0.0\tall\n\
                      ceph-osd\tun \t\t\n";
        let index = parse_query_output(stdout).unwrap();

        assert!(index.is_installed("mysql-server"));
        assert!(!index.is_installed("keystone"));
        assert!(!index.is_installed("ceph-osd"));
        assert_eq!(
            index.get("keystone").unwrap().state,
            PackageState::ConfigFiles
        );
        assert_eq!(index.get("ceph-osd").unwrap().version, None);
    }

    #[test]
    fn test_parse_query_output_malformed() {
        let err = parse_query_output("mysql-server ii\n").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 1, .. }));
    }

    #[test]
    fn test_missing_program_is_command_failure() {
        let backend = DpkgQueryBackend::with_program("/nonexistent/dpkg-query");
        assert!(!backend.is_available());
        assert!(matches!(
            backend.load_index(),
            Err(Error::CommandFailed { .. })
        ));
    }
}
