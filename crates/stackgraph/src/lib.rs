//! # stackgraph
//!
//! Dependency resolution and execution ordering for configuration modules.
//!
//! A collection of modules, each declaring required and optional
//! dependencies on other modules plus the system packages it needs, is
//! turned into a deterministic execution order:
//!
//! - modules whose packages are missing are excluded, along with everything
//!   that requires them;
//! - modules reachable only through optional dependencies are excluded;
//! - ties are broken by module name, so the same inputs always give the same
//!   order;
//! - the shared-utility module always runs first.
//!
//! ## Example
//!
//! ```
//! use stackgraph::{Collection, ModuleDescriptor, ModuleSpec, Resolver, StaticOracle};
//!
//! let collection = Collection::new("stack")
//!     .with_module(ModuleDescriptor::new("utils", "utils.rs", ModuleSpec::new))
//!     .with_module(ModuleDescriptor::new("mysql", "mysql.rs", || {
//!         ModuleSpec::new().packages(&["mysql-server"])
//!     }))
//!     .with_module(ModuleDescriptor::new("keystone", "keystone.rs", || {
//!         ModuleSpec::new().requires(&["mysql"]).packages(&["keystone"])
//!     }));
//!
//! let mut resolver = Resolver::new(StaticOracle::new(["mysql-server", "keystone"]));
//! let order = resolver.order(&collection, None).unwrap();
//! let names: Vec<_> = order.iter().map(|m| m.short_name()).collect();
//! assert_eq!(names, ["utils", "mysql", "keystone"]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod context;
pub mod error;
pub mod filter;
pub mod graph;
pub mod module;
pub mod registry;
pub mod resolver;

pub use context::{AllInstalled, PackageOracle, StaticOracle};
pub use error::{Error, Result};
pub use filter::{Exclusion, FilterReport};
pub use graph::{DependencyGraph, Edge, Node};
pub use module::{ConfigureTempestFn, Module, ModuleSpec, SetupFn};
pub use registry::{Collection, ModuleDescriptor, ModuleFactory, Registry};
pub use resolver::{Plan, Resolver};
