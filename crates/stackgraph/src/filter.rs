//! Pruning of modules that cannot or need not run.
//!
//! Exclusion is a fixpoint: a module is dropped when its packages are
//! missing, when one of its required dependencies was dropped, or when it is
//! reachable only through optional dependencies.

use crate::graph::DependencyGraph;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Why a module was excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    /// Some of its packages are not installed
    PackagesMissing,
    /// A required dependency was excluded
    MissingRequired {
        /// The excluded dependency
        dependency: String,
    },
    /// Every dependency it has is optional
    OnlyOptional,
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PackagesMissing => write!(f, "required packages are not installed"),
            Self::MissingRequired { dependency } => {
                write!(f, "required dependency {dependency} is excluded")
            }
            Self::OnlyOptional => write!(f, "only optional dependencies"),
        }
    }
}

/// Excluded modules with their reasons, keyed by canonical name.
pub type FilterReport = BTreeMap<String, Exclusion>;

/// Remove excluded modules from the graph.
pub fn filter(graph: DependencyGraph) -> DependencyGraph {
    filter_with_report(graph).0
}

/// Remove excluded modules from the graph, reporting why each went.
///
/// The root node is never excluded.
pub fn filter_with_report(mut graph: DependencyGraph) -> (DependencyGraph, FilterReport) {
    let root = graph.root().map(str::to_string);
    let is_root = |name: &str| root.as_deref() == Some(name);

    let mut excluded: FilterReport = graph
        .nodes()
        .filter(|(name, node)| !is_root(*name) && !node.is_installed())
        .map(|(name, _)| (name.to_string(), Exclusion::PackagesMissing))
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        let candidates: Vec<String> = graph
            .nodes()
            .map(|(name, _)| name)
            .filter(|name| !is_root(*name) && !excluded.contains_key(*name))
            .map(str::to_string)
            .collect();

        for name in candidates {
            if let Some(reason) = exclusion(&graph, &name, &excluded) {
                log::debug!("Excluding module {name}: {reason}");
                excluded.insert(name, reason);
                changed = true;
            }
        }
    }

    if !excluded.is_empty() {
        log::debug!(
            "Removing modules {:?}",
            excluded.keys().collect::<Vec<_>>()
        );
    }
    let names: BTreeSet<String> = excluded.keys().cloned().collect();
    graph.remove_nodes(&names);

    (graph, excluded)
}

/// Reason to exclude `name` given what is excluded so far, if any.
fn exclusion(graph: &DependencyGraph, name: &str, excluded: &FilterReport) -> Option<Exclusion> {
    let mut predecessors = graph.predecessors(name).peekable();
    predecessors.peek()?;

    let mut only_optional = true;
    let mut missing = None;
    for (pred, edge) in predecessors {
        if edge.optional {
            continue;
        }
        only_optional = false;
        if missing.is_none() && excluded.contains_key(pred) {
            missing = Some(pred.to_string());
        }
    }

    if only_optional {
        return Some(Exclusion::OnlyOptional);
    }
    missing.map(|dependency| Exclusion::MissingRequired { dependency })
}
