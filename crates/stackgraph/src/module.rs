//! Module records.
//!
//! A [`ModuleSpec`] is what a module author writes: plain data plus optional
//! entry points. The registry turns it into a [`Module`], the immutable,
//! canonically-named record the graph works with.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Entry point performing a module's configuration work.
pub type SetupFn = fn() -> anyhow::Result<()>;

/// Entry point adjusting the tempest workspace for a module.
pub type ConfigureTempestFn = fn(&Path) -> anyhow::Result<()>;

/// Declaration of a module, as returned by its factory.
///
/// Dependency references may be short names (`"mysql"`) or canonical names
/// (`"stack.mysql"`); the registry canonicalizes them on load.
#[derive(Clone, Default)]
pub struct ModuleSpec {
    /// Modules that must be present and run first
    pub dependencies: Vec<String>,
    /// Modules that order this one if present
    pub optional_dependencies: Vec<String>,
    /// System packages the module needs
    pub packages: Vec<String>,
    /// Diagnostic files or directories
    pub logs: Vec<PathBuf>,
    /// Configuration entry point
    pub setup: Option<SetupFn>,
    /// Tempest configuration entry point
    pub configure_tempest: Option<ConfigureTempestFn>,
    /// Extra tempest tests to run
    pub test_include_regexes: Vec<String>,
    /// Tempest tests to skip
    pub test_exclude_regexes: Vec<String>,
}

impl ModuleSpec {
    /// Create an empty declaration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the required dependencies.
    pub fn requires(mut self, modules: &[&str]) -> Self {
        self.dependencies = to_strings(modules);
        self
    }

    /// Set the optional dependencies.
    pub fn optional(mut self, modules: &[&str]) -> Self {
        self.optional_dependencies = to_strings(modules);
        self
    }

    /// Set the required packages.
    pub fn packages(mut self, packages: &[&str]) -> Self {
        self.packages = to_strings(packages);
        self
    }

    /// Set the diagnostic log locations.
    pub fn logs(mut self, logs: &[&str]) -> Self {
        self.logs = logs.iter().map(PathBuf::from).collect();
        self
    }

    /// Set the setup entry point.
    pub fn setup(mut self, setup: SetupFn) -> Self {
        self.setup = Some(setup);
        self
    }

    /// Set the tempest configuration entry point.
    pub fn configure_tempest(mut self, configure: ConfigureTempestFn) -> Self {
        self.configure_tempest = Some(configure);
        self
    }

    /// Set the tempest include regexes.
    pub fn include_tests(mut self, regexes: &[&str]) -> Self {
        self.test_include_regexes = to_strings(regexes);
        self
    }

    /// Set the tempest exclude regexes.
    pub fn exclude_tests(mut self, regexes: &[&str]) -> Self {
        self.test_exclude_regexes = to_strings(regexes);
        self
    }
}

impl fmt::Debug for ModuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleSpec")
            .field("dependencies", &self.dependencies)
            .field("optional_dependencies", &self.optional_dependencies)
            .field("packages", &self.packages)
            .field("logs", &self.logs)
            .field("setup", &self.setup.is_some())
            .field("configure_tempest", &self.configure_tempest.is_some())
            .finish_non_exhaustive()
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// A loaded module.
///
/// Two modules are equal when both their canonical name and source identity
/// match. Modules order by name.
pub struct Module {
    name: String,
    source: String,
    dependencies: BTreeSet<String>,
    optional_dependencies: BTreeSet<String>,
    packages: Vec<String>,
    logs: Vec<PathBuf>,
    setup: Option<SetupFn>,
    configure_tempest: Option<ConfigureTempestFn>,
    test_include_regexes: Vec<String>,
    test_exclude_regexes: Vec<String>,
}

impl Module {
    /// Build a module from its declaration. Dependency references must
    /// already be canonical.
    pub(crate) fn from_spec(name: String, source: String, spec: ModuleSpec) -> Self {
        Self {
            name,
            source,
            dependencies: spec.dependencies.into_iter().collect(),
            optional_dependencies: spec.optional_dependencies.into_iter().collect(),
            packages: spec.packages,
            logs: spec.logs,
            setup: spec.setup,
            configure_tempest: spec.configure_tempest,
            test_include_regexes: spec.test_include_regexes,
            test_exclude_regexes: spec.test_exclude_regexes,
        }
    }

    /// Canonical dotted name (`<package>.<short>`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last component of the canonical name.
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }

    /// Where the module was registered from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether `name` designates this module, by canonical or short name.
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.short_name() == name
    }

    /// Declared required dependencies, canonical names.
    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    /// Declared optional dependencies, canonical names.
    pub fn optional_dependencies(&self) -> &BTreeSet<String> {
        &self.optional_dependencies
    }

    /// Dependencies producing required edges.
    ///
    /// A module listed both as required and optional only counts as optional.
    pub fn required_dependencies(&self) -> impl Iterator<Item = &String> {
        self.dependencies.difference(&self.optional_dependencies)
    }

    /// Required system packages.
    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    /// Diagnostic log locations.
    pub fn logs(&self) -> &[PathBuf] {
        &self.logs
    }

    /// Setup entry point, if the module has one.
    pub fn setup(&self) -> Option<SetupFn> {
        self.setup
    }

    /// Tempest configuration entry point, if the module has one.
    pub fn configure_tempest(&self) -> Option<ConfigureTempestFn> {
        self.configure_tempest
    }

    /// Extra tempest tests to run.
    pub fn test_include_regexes(&self) -> &[String] {
        &self.test_include_regexes
    }

    /// Tempest tests to skip.
    pub fn test_exclude_regexes(&self) -> &[String] {
        &self.test_exclude_regexes
    }
}

/// Last component of a dotted name.
pub fn short_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.source == other.source
    }
}

impl Eq for Module {}

impl Hash for Module {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.source.hash(state);
    }
}

impl PartialOrd for Module {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Module {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.source.cmp(&other.source))
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) fn stub(name: &str) -> std::rc::Rc<Module> {
    std::rc::Rc::new(Module::from_spec(
        name.to_string(),
        format!("test:{name}"),
        ModuleSpec::new(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("stack.keystone"), "keystone");
        assert_eq!(short_name("keystone"), "keystone");
        assert_eq!(short_name("a.b.c"), "c");
    }

    #[test]
    fn test_identity_is_name_and_source() {
        let a = Module::from_spec("stack.mysql".into(), "a.rs".into(), ModuleSpec::new());
        let b = Module::from_spec("stack.mysql".into(), "a.rs".into(), ModuleSpec::new());
        let c = Module::from_spec("stack.mysql".into(), "b.rs".into(), ModuleSpec::new());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_ordering_by_name() {
        let mut modules = [stub("stack.nova"), stub("stack.glance"), stub("stack.keystone")];
        modules.sort();
        let names: Vec<_> = modules.iter().map(|m| m.name()).collect();
        assert_eq!(names, ["stack.glance", "stack.keystone", "stack.nova"]);
    }

    #[test]
    fn test_both_sets_counts_as_optional() {
        let spec = ModuleSpec::new()
            .requires(&["stack.mysql", "stack.ceph"])
            .optional(&["stack.ceph"]);
        let module = Module::from_spec("stack.cinder".into(), "cinder.rs".into(), spec);

        let required: Vec<_> = module.required_dependencies().collect();
        assert_eq!(required, ["stack.mysql"]);
        assert!(module.optional_dependencies().contains("stack.ceph"));
    }

    #[test]
    fn test_matches_full_or_short_name() {
        let module = stub("stack.heat");
        assert!(module.matches("heat"));
        assert!(module.matches("stack.heat"));
        assert!(!module.matches("stack"));
    }
}
