//! Provider traits
//!
//! These traits keep the graph builder independent of how package presence
//! is actually determined.

use std::collections::HashSet;

/// Answers whether a module's packages are present on the system.
pub trait PackageOracle {
    /// Whether every listed package is installed.
    ///
    /// An empty list is installed. Implementations must not fail: anything
    /// that cannot be determined counts as not installed.
    fn installed(&self, packages: &[String]) -> bool;
}

impl PackageOracle for debkit::Client {
    fn installed(&self, packages: &[String]) -> bool {
        debkit::Client::installed(self, packages)
    }
}

impl<T: PackageOracle + ?Sized> PackageOracle for &T {
    fn installed(&self, packages: &[String]) -> bool {
        (**self).installed(packages)
    }
}

/// Oracle reporting every package as installed
pub struct AllInstalled;

impl PackageOracle for AllInstalled {
    fn installed(&self, _packages: &[String]) -> bool {
        true
    }
}

/// Oracle backed by a fixed set of package names
#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    packages: HashSet<String>,
}

impl StaticOracle {
    /// Create an oracle that knows exactly these packages.
    pub fn new<I, S>(packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            packages: packages.into_iter().map(Into::into).collect(),
        }
    }
}

impl PackageOracle for StaticOracle {
    fn installed(&self, packages: &[String]) -> bool {
        packages.iter().all(|p| self.packages.contains(p))
    }
}
