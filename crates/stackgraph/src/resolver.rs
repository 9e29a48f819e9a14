//! Execution order resolution.
//!
//! The resolver owns the module cache and the package oracle for the whole
//! run, so modules load once and the package database is read once no
//! matter how many orders are computed.

use crate::builder;
use crate::context::PackageOracle;
use crate::error::{Error, Result};
use crate::filter::{self, FilterReport};
use crate::graph::DependencyGraph;
use crate::module::Module;
use crate::registry::{Collection, Registry};
use std::rc::Rc;

/// A resolved execution order.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Modules to run, shared-utility module first
    pub order: Vec<Rc<Module>>,
    /// Modules left out, with the reason
    pub excluded: FilterReport,
}

impl Plan {
    /// Canonical names of the modules to run.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|m| m.name()).collect()
    }
}

/// Computes execution orders over a collection.
pub struct Resolver<O: PackageOracle> {
    registry: Registry,
    oracle: O,
}

impl Resolver<debkit::Client> {
    /// Create a resolver backed by the system package database.
    pub fn system() -> Self {
        Self::new(debkit::Client::new())
    }
}

impl<O: PackageOracle> Resolver<O> {
    /// Create a resolver with the given oracle and an empty module cache.
    pub fn new(oracle: O) -> Self {
        Self {
            registry: Registry::new(),
            oracle,
        }
    }

    /// The module cache.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The package oracle.
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Short names of every module loaded so far, sorted.
    pub fn modules(&self) -> Vec<String> {
        self.registry.modules()
    }

    /// Build the unfiltered dependency graph.
    pub fn build_graph(&mut self, collection: &Collection) -> Result<DependencyGraph> {
        builder::build(&mut self.registry, &self.oracle, collection)
    }

    /// Execution order for the whole collection, or for what `target` needs.
    pub fn order(&mut self, collection: &Collection, target: Option<&str>) -> Result<Vec<Rc<Module>>> {
        Ok(self.plan(collection, target)?.order)
    }

    /// Resolve the execution order, keeping track of excluded modules.
    ///
    /// The shared-utility module always comes first. With a target, only the
    /// target and the modules it transitively depends on are kept. Targets
    /// match by canonical or short name.
    pub fn plan(&mut self, collection: &Collection, target: Option<&str>) -> Result<Plan> {
        let shared = self.registry.resolve(collection, &collection.shared_name())?;
        if target.is_some_and(|t| shared.matches(t)) {
            return Ok(Plan {
                order: vec![shared],
                excluded: FilterReport::new(),
            });
        }

        let graph = self.build_graph(collection)?;
        let (graph, excluded) = filter::filter_with_report(graph);
        if let Some(modules) = graph.find_cycle() {
            return Err(Error::CircularDependency { modules });
        }

        let sorted = graph.topological_sort()?;
        let Some(target) = target else {
            return Ok(Plan {
                order: with_shared_first(&shared, sorted),
                excluded,
            });
        };

        let end = sorted
            .iter()
            .find(|m| m.matches(target))
            .ok_or_else(|| Error::TargetNotFound {
                target: target.to_string(),
            })?;

        let mut closure = graph.ancestors(end.name());
        closure.insert(end.name().to_string());
        log::debug!("Restricting order to {} for target {}", closure.len(), target);

        let sorted = graph.subgraph(&closure).topological_sort()?;
        Ok(Plan {
            order: with_shared_first(&shared, sorted),
            excluded,
        })
    }
}

fn with_shared_first(shared: &Rc<Module>, sorted: Vec<Rc<Module>>) -> Vec<Rc<Module>> {
    let mut order = Vec::with_capacity(sorted.len() + 1);
    order.push(Rc::clone(shared));
    order.extend(sorted.into_iter().filter(|m| m != shared));
    order
}

impl<O: PackageOracle> std::fmt::Debug for Resolver<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
