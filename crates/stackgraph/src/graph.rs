//! Directed dependency graph over modules.
//!
//! Edges point from a dependency to its dependent. Nodes are keyed by
//! canonical module name, so every iteration order in this module is
//! lexicographic.

use crate::error::{Error, Result};
use crate::module::Module;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

/// A graph node.
#[derive(Debug, Clone)]
pub struct Node {
    /// The module this node stands for
    pub module: Rc<Module>,
    /// Whether the module's packages are present; `None` when never
    /// evaluated (root, or a module only seen as a dependency)
    pub installed: Option<bool>,
}

impl Node {
    /// Whether the node counts as installed. Unannotated nodes do.
    pub fn is_installed(&self) -> bool {
        self.installed.unwrap_or(true)
    }
}

/// Attributes of a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Whether the dependent can do without the dependency
    pub optional: bool,
}

/// Dependency graph.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, Node>,
    successors: BTreeMap<String, BTreeMap<String, Edge>>,
    predecessors: BTreeMap<String, BTreeMap<String, Edge>>,
    root: Option<String>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Add the root node. The root carries no installed annotation.
    pub fn set_root(&mut self, module: Rc<Module>) {
        self.root = Some(module.name().to_string());
        self.ensure_node(module);
    }

    /// Add a node, or update the annotation of an existing one.
    pub fn add_node(&mut self, module: Rc<Module>, installed: bool) {
        let name = module.name().to_string();
        self.nodes
            .entry(name)
            .and_modify(|node| node.installed = Some(installed))
            .or_insert(Node {
                module,
                installed: Some(installed),
            });
    }

    /// Add an edge `from -> to`, creating missing endpoints.
    pub fn add_edge(&mut self, from: Rc<Module>, to: Rc<Module>, optional: bool) {
        let (from_name, to_name) = (from.name().to_string(), to.name().to_string());
        self.ensure_node(from);
        self.ensure_node(to);

        let edge = Edge { optional };
        self.successors
            .entry(from_name.clone())
            .or_default()
            .insert(to_name.clone(), edge);
        self.predecessors
            .entry(to_name)
            .or_default()
            .insert(from_name, edge);
    }

    fn ensure_node(&mut self, module: Rc<Module>) {
        self.nodes
            .entry(module.name().to_string())
            .or_insert(Node {
                module,
                installed: None,
            });
    }

    /// Remove nodes and every edge touching them.
    pub fn remove_nodes(&mut self, names: &BTreeSet<String>) {
        for name in names {
            self.nodes.remove(name);
            if let Some(succ) = self.successors.remove(name) {
                for to in succ.keys() {
                    if let Some(preds) = self.predecessors.get_mut(to) {
                        preds.remove(name);
                    }
                }
            }
            if let Some(preds) = self.predecessors.remove(name) {
                for from in preds.keys() {
                    if let Some(succ) = self.successors.get_mut(from) {
                        succ.remove(name);
                    }
                }
            }
            if self.root.as_deref() == Some(name.as_str()) {
                self.root = None;
            }
        }
    }

    /// Induced subgraph over `names`.
    pub fn subgraph(&self, names: &BTreeSet<String>) -> Self {
        let mut sub = Self {
            root: self.root.clone().filter(|r| names.contains(r)),
            ..Self::default()
        };

        for name in names {
            if let Some(node) = self.nodes.get(name) {
                sub.nodes.insert(name.clone(), node.clone());
            }
        }
        for (from, to, edge) in self.edges() {
            if names.contains(from) && names.contains(to) {
                sub.successors
                    .entry(from.to_string())
                    .or_default()
                    .insert(to.to_string(), edge);
                sub.predecessors
                    .entry(to.to_string())
                    .or_default()
                    .insert(from.to_string(), edge);
            }
        }
        sub
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Canonical name of the root node, if any.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Whether the graph has a node for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Node by canonical name.
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Nodes, sorted by name.
    pub fn nodes(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.nodes.iter().map(|(name, node)| (name.as_str(), node))
    }

    /// Edges as `(from, to, edge)`, sorted.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, Edge)> {
        self.successors.iter().flat_map(|(from, succ)| {
            succ.iter()
                .map(move |(to, edge)| (from.as_str(), to.as_str(), *edge))
        })
    }

    /// Edge `from -> to`, if present.
    pub fn edge(&self, from: &str, to: &str) -> Option<Edge> {
        self.successors.get(from)?.get(to).copied()
    }

    /// Incoming edges of `name`, as `(dependency, edge)`.
    pub fn predecessors(&self, name: &str) -> impl Iterator<Item = (&str, Edge)> {
        self.predecessors
            .get(name)
            .into_iter()
            .flatten()
            .map(|(from, edge)| (from.as_str(), *edge))
    }

    /// Outgoing edges of `name`, as `(dependent, edge)`.
    pub fn successors(&self, name: &str) -> impl Iterator<Item = (&str, Edge)> {
        self.successors
            .get(name)
            .into_iter()
            .flatten()
            .map(|(to, edge)| (to.as_str(), *edge))
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.successors.values().map(BTreeMap::len).sum()
    }

    /// Every node `name` is reachable from, excluding `name` itself.
    pub fn ancestors(&self, name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([name]);

        while let Some(current) = queue.pop_front() {
            for (pred, _) in self.predecessors(current) {
                if pred != name && seen.insert(pred.to_string()) {
                    queue.push_back(pred);
                }
            }
        }
        seen
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    /// Modules lying on a cycle, or on a path between cycles. `None` when the
    /// graph is acyclic.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let (_, blocked) = self.kahn();
        if blocked.is_empty() {
            return None;
        }

        // Peel off blocked nodes that merely hang below a cycle
        let mut remaining: BTreeSet<String> = blocked.into_iter().collect();
        loop {
            let sinks: Vec<String> = remaining
                .iter()
                .filter(|n| {
                    !self
                        .successors(n)
                        .any(|(succ, _)| remaining.contains(succ))
                })
                .cloned()
                .collect();
            if sinks.is_empty() {
                break;
            }
            for sink in sinks {
                remaining.remove(&sink);
            }
        }

        Some(remaining.into_iter().collect())
    }

    /// Whether the graph has no cycle.
    pub fn is_acyclic(&self) -> bool {
        self.find_cycle().is_none()
    }

    /// Topological order, ties broken by ascending module name.
    pub fn topological_sort(&self) -> Result<Vec<Rc<Module>>> {
        if let Some(modules) = self.find_cycle() {
            return Err(Error::CircularDependency { modules });
        }

        let (order, _) = self.kahn();
        Ok(order
            .iter()
            .filter_map(|name| self.nodes.get(name))
            .map(|node| Rc::clone(&node.module))
            .collect())
    }

    /// Kahn's algorithm with an ordered ready set. Returns the sorted names
    /// and the names that could not be placed.
    fn kahn(&self) -> (Vec<String>, Vec<String>) {
        let mut in_degree: BTreeMap<&str, usize> = self
            .nodes
            .keys()
            .map(|name| (name.as_str(), self.predecessors(name).count()))
            .collect();

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(name) = ready.pop_first() {
            order.push(name.to_string());
            for (succ, _) in self.successors(name) {
                if let Some(degree) = in_degree.get_mut(succ) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(succ);
                    }
                }
            }
        }

        let blocked = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(name, _)| name.to_string())
            .collect();
        (order, blocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::stub;

    fn graph(edges: &[(&str, &str, bool)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for (from, to, optional) in edges {
            g.add_edge(stub(from), stub(to), *optional);
        }
        g
    }

    fn names(modules: &[Rc<Module>]) -> Vec<&str> {
        modules.iter().map(|m| m.name()).collect()
    }

    #[test]
    fn test_add_node_keeps_edges() {
        let mut g = graph(&[("mysql", "keystone", false)]);
        assert_eq!(g.node("mysql").unwrap().installed, None);
        assert!(g.node("mysql").unwrap().is_installed());

        g.add_node(stub("mysql"), false);
        assert_eq!(g.node("mysql").unwrap().installed, Some(false));
        assert_eq!(g.edge("mysql", "keystone"), Some(Edge { optional: false }));
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn test_lexicographic_topological_sort() {
        let mut g = graph(&[
            ("mysql", "keystone", false),
            ("keystone", "glance", false),
            ("mysql", "glance", false),
            ("rabbitmq", "neutron", false),
            ("keystone", "neutron", false),
        ]);
        g.add_node(stub("ceph"), true);

        let order = g.topological_sort().unwrap();
        assert_eq!(
            names(&order),
            ["ceph", "mysql", "keystone", "glance", "rabbitmq", "neutron"]
        );
    }

    #[test]
    fn test_sort_is_deterministic() {
        let edges = [("b", "d", false), ("a", "d", true), ("c", "e", false)];
        let first = graph(&edges).topological_sort().unwrap();
        let mut reversed = edges;
        reversed.reverse();
        let second = graph(&reversed).topological_sort().unwrap();
        assert_eq!(names(&first), names(&second));
        assert_eq!(names(&first), ["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_cycle_detection() {
        let g = graph(&[
            ("a", "b", false),
            ("b", "c", false),
            ("c", "a", false),
            ("c", "d", false),
            ("x", "a", false),
        ]);
        assert!(!g.is_acyclic());
        assert_eq!(g.find_cycle().unwrap(), ["a", "b", "c"]);

        let err = g.topological_sort().unwrap_err();
        assert_eq!(
            err,
            Error::CircularDependency {
                modules: vec!["a".into(), "b".into(), "c".into()]
            }
        );
    }

    #[test]
    fn test_optional_edges_take_part_in_cycles() {
        let g = graph(&[("a", "b", true), ("b", "a", false)]);
        assert_eq!(g.find_cycle().unwrap(), ["a", "b"]);
    }

    #[test]
    fn test_ancestors() {
        let g = graph(&[
            ("mysql", "keystone", false),
            ("keystone", "glance", false),
            ("rabbitmq", "neutron", false),
            ("ceph", "glance", true),
        ]);
        let ancestors: Vec<_> = g.ancestors("glance").into_iter().collect();
        assert_eq!(ancestors, ["ceph", "keystone", "mysql"]);
        assert!(g.ancestors("mysql").is_empty());
    }

    #[test]
    fn test_remove_nodes_drops_incident_edges() {
        let mut g = graph(&[("mysql", "keystone", false), ("keystone", "glance", false)]);
        g.set_root(stub("utils"));
        g.remove_nodes(&BTreeSet::from(["keystone".to_string()]));

        assert!(!g.contains("keystone"));
        assert_eq!(g.edge_count(), 0);
        assert_eq!(g.predecessors("glance").count(), 0);
        assert_eq!(g.successors("mysql").count(), 0);
        assert_eq!(g.root(), Some("utils"));
    }

    #[test]
    fn test_subgraph() {
        let mut g = graph(&[("mysql", "keystone", false), ("keystone", "glance", false)]);
        g.set_root(stub("utils"));
        let sub = g.subgraph(&BTreeSet::from(["mysql".to_string(), "keystone".to_string()]));

        assert_eq!(sub.node_count(), 2);
        assert_eq!(sub.edge_count(), 1);
        assert_eq!(sub.root(), None);
        assert_eq!(names(&sub.topological_sort().unwrap()), ["mysql", "keystone"]);
    }
}
