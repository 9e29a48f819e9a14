//! Module registration tables and the load-once cache.
//!
//! Modules are not discovered by reflection: a [`Collection`] lists a
//! [`ModuleDescriptor`] per module, each carrying a factory that produces the
//! module's [`ModuleSpec`]. The [`Registry`] runs each factory at most once
//! per canonical name and hands out shared [`Module`] instances.

use crate::error::{Error, Result};
use crate::module::{Module, ModuleSpec, short_name};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Factory producing a module's declaration.
pub type ModuleFactory = fn() -> ModuleSpec;

/// Default short name of the shared-utility module.
pub const DEFAULT_SHARED_MODULE: &str = "utils";

/// Registration entry for one module.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    name: String,
    source: String,
    factory: ModuleFactory,
}

impl ModuleDescriptor {
    /// Create a descriptor. `source` identifies where the module is defined,
    /// typically `file!()`.
    pub fn new(name: impl Into<String>, source: impl Into<String>, factory: ModuleFactory) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            factory,
        }
    }

    /// Short name of the module.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source identity.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// A named table of modules.
#[derive(Debug, Clone)]
pub struct Collection {
    package: String,
    shared: String,
    descriptors: Vec<ModuleDescriptor>,
}

impl Collection {
    /// Create an empty collection whose modules are named `<package>.<short>`.
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            shared: DEFAULT_SHARED_MODULE.to_string(),
            descriptors: Vec::new(),
        }
    }

    /// Use a different short name for the shared-utility module.
    pub fn with_shared(mut self, short: impl Into<String>) -> Self {
        self.shared = short.into();
        self
    }

    /// Register a module.
    pub fn with_module(mut self, descriptor: ModuleDescriptor) -> Self {
        self.add(descriptor);
        self
    }

    /// Register a module.
    pub fn add(&mut self, descriptor: ModuleDescriptor) {
        self.descriptors.push(descriptor);
    }

    /// Package prefix of canonical names.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Canonical name of the shared-utility module.
    pub fn shared_name(&self) -> String {
        self.canonical_name(&self.shared)
    }

    /// Canonicalize a module reference. Names already under the package are
    /// returned unchanged.
    pub fn canonical_name(&self, name: &str) -> String {
        match name.strip_prefix(self.package.as_str()) {
            Some(rest) if rest.starts_with('.') => name.to_string(),
            _ => format!("{}.{}", self.package, name),
        }
    }

    /// Every registered module, in registration order.
    pub fn discover(&self) -> &[ModuleDescriptor] {
        &self.descriptors
    }

    /// Find the descriptor for a canonical name.
    fn find(&self, canonical: &str) -> Option<&ModuleDescriptor> {
        self.descriptors
            .iter()
            .find(|d| self.canonical_name(&d.name) == canonical)
    }
}

/// Cache of loaded modules, keyed by canonical name.
#[derive(Debug, Default)]
pub struct Registry {
    loaded: BTreeMap<String, Rc<Module>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the module a descriptor designates.
    ///
    /// If a module with the same canonical name is already cached it is
    /// returned as is, even when the descriptor's source differs; the factory
    /// never runs twice for a name.
    pub fn load(&mut self, collection: &Collection, descriptor: &ModuleDescriptor) -> Rc<Module> {
        let name = collection.canonical_name(&descriptor.name);
        if let Some(module) = self.loaded.get(&name) {
            return Rc::clone(module);
        }

        let mut spec = (descriptor.factory)();
        spec.dependencies = canonicalize(collection, &spec.dependencies);
        spec.optional_dependencies = canonicalize(collection, &spec.optional_dependencies);

        let module = Rc::new(Module::from_spec(
            name.clone(),
            descriptor.source.clone(),
            spec,
        ));
        log::debug!("Loaded module {:?} from {:?}", name, descriptor.source);
        self.loaded.insert(name, Rc::clone(&module));
        module
    }

    /// Load a module by canonical or short name.
    pub fn resolve(&mut self, collection: &Collection, name: &str) -> Result<Rc<Module>> {
        let canonical = collection.canonical_name(name);
        if let Some(module) = self.loaded.get(&canonical) {
            return Ok(Rc::clone(module));
        }

        let descriptor = collection
            .find(&canonical)
            .ok_or(Error::ModuleNotFound { name: canonical })?;
        Ok(self.load(collection, descriptor))
    }

    /// A loaded module, by canonical name.
    pub fn get(&self, name: &str) -> Option<Rc<Module>> {
        self.loaded.get(name).cloned()
    }

    /// Short names of every module loaded so far, sorted.
    pub fn modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .loaded
            .keys()
            .map(|name| short_name(name).to_string())
            .collect();
        names.sort();
        names
    }

    /// Number of loaded modules.
    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    /// Whether nothing has been loaded yet.
    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }
}

fn canonicalize(collection: &Collection, names: &[String]) -> Vec<String> {
    names.iter().map(|n| collection.canonical_name(n)).collect()
}
