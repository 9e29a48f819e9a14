//! Parser for the dpkg status database.
//!
//! The database is a sequence of RFC 822 style stanzas separated by blank
//! lines:
//! ```text
//! Package: mysql-server
//! Status: install ok installed
//! Architecture: all
//! Version: 8.0.36-0ubuntu0.24.04.1
//! Description: MySQL database server
//!  This is an empty package that depends on the current "best" version
//! ```
//! Only `Package`, `Status`, `Architecture` and `Version` are kept.
//! Continuation lines (leading whitespace) belong to multi-line fields and
//! are skipped.

use crate::error::{Error, Result};
use crate::types::{PackageIndex, PackageRecord, PackageState};
use std::path::Path;

/// Parse the status database at `path`.
pub fn parse_file(path: &Path) -> Result<PackageIndex> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::StatusFileNotFound(path.to_path_buf())
        } else {
            Error::Io(e)
        }
    })?;
    parse_string(&content)
}

/// Parse status database content.
///
/// A malformed stanza is skipped with a warning; the rest of the database
/// is still read.
pub fn parse_string(content: &str) -> Result<PackageIndex> {
    let mut index = PackageIndex::new();
    let mut stanza = Stanza::default();

    for (line_num, line) in content.lines().enumerate() {
        let line_num = line_num + 1;

        if line.trim().is_empty() {
            stanza.finish_into(&mut index);
            continue;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            continue;
        }

        if stanza.start_line == 0 {
            stanza.start_line = line_num;
        }

        let Some((key, value)) = line.split_once(':') else {
            stanza.reject(Error::parse(
                line_num,
                format!("expected 'Field: value', got {line:?}"),
            ));
            continue;
        };

        let value = value.trim();
        match key {
            "Package" => stanza.package = Some(value.to_string()),
            "Status" => match parse_status(value, line_num) {
                Ok(state) => stanza.state = Some(state),
                Err(e) => stanza.reject(e),
            },
            "Architecture" => stanza.architecture = Some(value.to_string()),
            "Version" => stanza.version = Some(value.to_string()),
            _ => {}
        }
    }

    stanza.finish_into(&mut index);
    Ok(index)
}

/// Parse a `Status:` value (`want flag state`) into its state.
fn parse_status(value: &str, line_num: usize) -> Result<PackageState> {
    let words: Vec<&str> = value.split_whitespace().collect();
    let [_want, _flag, state] = words.as_slice() else {
        return Err(Error::parse(
            line_num,
            format!("Status must have three words, got {value:?}"),
        ));
    };

    PackageState::from_status_word(state)
        .ok_or_else(|| Error::parse(line_num, format!("unknown package state {state:?}")))
}

/// Fields collected for the stanza being parsed.
#[derive(Default)]
struct Stanza {
    start_line: usize,
    package: Option<String>,
    state: Option<PackageState>,
    architecture: Option<String>,
    version: Option<String>,
    error: Option<Error>,
}

impl Stanza {
    /// Mark the stanza as unusable; the first error is kept.
    fn reject(&mut self, error: Error) {
        self.error.get_or_insert(error);
    }

    /// Turn the collected fields into a record and reset for the next stanza.
    fn finish(&mut self) -> Result<Option<PackageRecord>> {
        let stanza = std::mem::take(self);
        if stanza.start_line == 0 {
            return Ok(None);
        }
        if let Some(error) = stanza.error {
            return Err(error);
        }

        let name = stanza
            .package
            .ok_or_else(|| Error::parse(stanza.start_line, "stanza has no Package field"))?;

        let mut record =
            PackageRecord::new(name, stanza.state.unwrap_or(PackageState::NotInstalled));
        record.architecture = stanza.architecture;
        record.version = stanza.version;
        Ok(Some(record))
    }

    /// Add the finished record to `index`, or warn and drop the stanza.
    fn finish_into(&mut self, index: &mut PackageIndex) {
        let package = self.package.clone();
        match self.finish() {
            Ok(Some(record)) => index.insert(record),
            Ok(None) => {}
            Err(e) => log::warn!(
                "Skipping status entry {}: {}",
                package.as_deref().unwrap_or("<unnamed>"),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
Package: mysql-server
Status: install ok installed
Priority: optional
Architecture: all
Version: 8.0.36-0ubuntu0.24.04.1
Description: MySQL database server (metapackage depending on the latest version)
 This is an empty package that depends on the current \"best\" version of
 mysql-server.

Package: keystone
Status: deinstall ok config-files
Architecture: all
Version: 2:25.0.0-0ubuntu1

Package: glance-api
Status: install reinstreq half-installed
Architecture: all
Version: 2:28.0.1-0ubuntu1
";

    #[test]
    fn test_parse_sample() {
        let index = parse_string(SAMPLE).unwrap();
        assert_eq!(index.len(), 3);
        assert!(index.is_installed("mysql-server"));
        assert!(!index.is_installed("keystone"));
        assert!(!index.is_installed("glance-api"));

        let mysql = index.get("mysql-server").unwrap();
        assert_eq!(mysql.version.as_deref(), Some("8.0.36-0ubuntu0.24.04.1"));
        assert_eq!(mysql.architecture.as_deref(), Some("all"));

        let keystone = index.get("keystone").unwrap();
        assert_eq!(keystone.state, PackageState::ConfigFiles);
    }

    #[test]
    fn test_parse_without_trailing_blank_line() {
        let index = parse_string("Package: crudini\nStatus: install ok installed").unwrap();
        assert!(index.is_installed("crudini"));
    }

    #[test]
    fn test_parse_empty() {
        let index = parse_string("\n\n").unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_trigger_states_count_as_installed() {
        let index = parse_string(
            "Package: apache2\n\
             Status: install ok triggers-pending\n\
             \n\
             Package: keystone\n\
             Status: install ok triggers-awaited\n",
        )
        .unwrap();
        assert!(index.is_installed("apache2"));
        assert!(index.is_installed("keystone"));
        assert_eq!(
            index.get("apache2").unwrap().state,
            PackageState::TriggersPending
        );
    }

    #[test]
    fn test_stanza_without_package_is_skipped() {
        let index = parse_string(
            "Status: install ok installed\nVersion: 1.0\n\nPackage: crudini\nStatus: install ok installed\n",
        )
        .unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.is_installed("crudini"));
    }

    #[test]
    fn test_malformed_status_skips_only_its_stanza() {
        let index = parse_string(&format!(
            "Package: foo\nStatus: installed\n\nPackage: bar\nStatus: install ok purged\n\n{SAMPLE}"
        ))
        .unwrap();
        assert!(index.get("foo").is_none());
        assert!(index.get("bar").is_none());
        assert!(index.is_installed("mysql-server"));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_line_without_colon_skips_only_its_stanza() {
        let index = parse_string(
            "Package: foo\ngarbage\nStatus: install ok installed\n\nPackage: crudini\nStatus: install ok installed",
        )
        .unwrap();
        assert!(index.get("foo").is_none());
        assert!(index.is_installed("crudini"));
    }

    #[test]
    fn test_parse_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let index = parse_file(file.path()).unwrap();
        assert!(index.is_installed("mysql-server"));
    }

    #[test]
    fn test_parse_missing_file() {
        let err = parse_file(Path::new("/nonexistent/var/lib/dpkg/status")).unwrap_err();
        assert!(matches!(err, Error::StatusFileNotFound(_)));
    }
}
