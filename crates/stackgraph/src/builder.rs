//! Dependency graph construction.

use crate::context::PackageOracle;
use crate::error::Result;
use crate::graph::DependencyGraph;
use crate::registry::{Collection, Registry};
use std::rc::Rc;

/// Build the dependency graph of every module in `collection`.
///
/// The shared-utility module becomes the root node. Every other module gets
/// a node annotated with whether its packages are installed, and an edge
/// from each of its dependencies. A dependency missing from the collection
/// is fatal.
pub fn build<O: PackageOracle + ?Sized>(
    registry: &mut Registry,
    oracle: &O,
    collection: &Collection,
) -> Result<DependencyGraph> {
    let mut graph = DependencyGraph::new();
    let root = registry.resolve(collection, &collection.shared_name())?;
    graph.set_root(Rc::clone(&root));

    for descriptor in collection.discover() {
        let module = registry.load(collection, descriptor);
        if module.name() == root.name() {
            continue;
        }

        let installed = oracle.installed(module.packages());
        if !installed {
            log::debug!(
                "Module {} is missing packages from {:?}",
                module.name(),
                module.packages()
            );
        }
        graph.add_node(Rc::clone(&module), installed);

        for dep in module.required_dependencies() {
            let dependency = registry.resolve(collection, dep)?;
            graph.add_edge(dependency, Rc::clone(&module), false);
        }
        for dep in module.optional_dependencies() {
            let dependency = registry.resolve(collection, dep)?;
            graph.add_edge(dependency, Rc::clone(&module), true);
        }
    }

    log::debug!(
        "Built dependency graph of {} modules and {} edges",
        graph.node_count(),
        graph.edge_count()
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AllInstalled, StaticOracle};
    use crate::error::Error;
    use crate::graph::Edge;
    use crate::module::ModuleSpec;
    use crate::registry::ModuleDescriptor;

    fn collection() -> Collection {
        Collection::new("stack")
            .with_module(ModuleDescriptor::new("utils", "utils.rs", || {
                ModuleSpec::new().packages(&["crudini"])
            }))
            .with_module(ModuleDescriptor::new("mysql", "mysql.rs", || {
                ModuleSpec::new().packages(&["mysql-server"])
            }))
            .with_module(ModuleDescriptor::new("ceph", "ceph.rs", || {
                ModuleSpec::new().packages(&["ceph-mon"])
            }))
            .with_module(ModuleDescriptor::new("cinder", "cinder.rs", || {
                ModuleSpec::new()
                    .requires(&["mysql", "ceph"])
                    .optional(&["ceph"])
                    .packages(&["cinder-api"])
            }))
    }

    #[test]
    fn test_build_nodes_and_edges() {
        let mut registry = Registry::new();
        let oracle = StaticOracle::new(["mysql-server", "cinder-api"]);
        let graph = build(&mut registry, &oracle, &collection()).unwrap();

        assert_eq!(graph.root(), Some("stack.utils"));
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.node("stack.utils").unwrap().installed, None);
        assert_eq!(graph.node("stack.mysql").unwrap().installed, Some(true));
        assert_eq!(graph.node("stack.ceph").unwrap().installed, Some(false));
        assert_eq!(graph.node("stack.cinder").unwrap().installed, Some(true));
        assert_eq!(graph.predecessors("stack.utils").count(), 0);
    }

    #[test]
    fn test_required_and_optional_yields_optional_edge() {
        let mut registry = Registry::new();
        let graph = build(&mut registry, &AllInstalled, &collection()).unwrap();

        assert_eq!(
            graph.edge("stack.ceph", "stack.cinder"),
            Some(Edge { optional: true })
        );
        assert_eq!(
            graph.edge("stack.mysql", "stack.cinder"),
            Some(Edge { optional: false })
        );
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_unknown_dependency_is_fatal() {
        let collection = collection().with_module(ModuleDescriptor::new("heat", "heat.rs", || {
            ModuleSpec::new().requires(&["swift"])
        }));
        let mut registry = Registry::new();
        let err = build(&mut registry, &AllInstalled, &collection).unwrap_err();
        assert_eq!(
            err,
            Error::ModuleNotFound {
                name: "stack.swift".into()
            }
        );
    }

    #[test]
    fn test_missing_shared_module_is_fatal() {
        let collection = Collection::new("stack").with_module(ModuleDescriptor::new(
            "mysql",
            "mysql.rs",
            ModuleSpec::new,
        ));
        let mut registry = Registry::new();
        let err = build(&mut registry, &AllInstalled, &collection).unwrap_err();
        assert!(matches!(err, Error::ModuleNotFound { .. }));
    }
}
