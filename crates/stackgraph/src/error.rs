//! Error types for module resolution.
//!
//! Every variant is fatal for the resolution that raised it: no partial
//! order is ever returned alongside an error.

use thiserror::Error;

/// Errors raised while loading modules or computing an execution order.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A referenced module is not part of the collection
    #[error("module {name:?} not found")]
    ModuleNotFound {
        /// Canonical name that was looked up
        name: String,
    },

    /// The filtered dependency graph contains a cycle
    #[error("circular dependency detected between: {}", .modules.join(", "))]
    CircularDependency {
        /// Modules on (or between) the cycles, sorted by name
        modules: Vec<String>,
    },

    /// The requested target is not part of the resolved order
    #[error("target {target:?} not found (unknown module, or excluded by missing packages/dependencies)")]
    TargetNotFound {
        /// Target as given by the caller
        target: String,
    },
}

/// Result type for module resolution.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CircularDependency {
            modules: vec!["stack.a".into(), "stack.b".into()],
        };
        assert_eq!(
            err.to_string(),
            "circular dependency detected between: stack.a, stack.b"
        );

        let err = Error::ModuleNotFound {
            name: "stack.swift".into(),
        };
        assert_eq!(err.to_string(), "module \"stack.swift\" not found");
    }
}
