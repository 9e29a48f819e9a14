//! The service catalog.
//!
//! Each submodule describes one service: what it depends on, the packages
//! that must be installed for it to take part, where its logs live, and how
//! to configure it.

pub mod ceph;
pub mod cinder;
pub mod glance;
pub mod heat;
pub mod keystone;
pub mod mysql;
pub mod neutron;
pub mod nova;
pub mod ovn;
pub mod placement;
pub mod rabbitmq;
pub mod utils;

use stackgraph::{Collection, ModuleDescriptor};

/// Prefix of every catalog module's canonical name
pub const PACKAGE: &str = "regress_stack.modules";

macro_rules! descriptor {
    ($module:ident) => {
        ModuleDescriptor::new(
            stringify!($module),
            concat!("src/modules/", stringify!($module), ".rs"),
            $module::spec,
        )
    };
}

/// Every module this tool can deploy
pub fn collection() -> Collection {
    Collection::new(PACKAGE)
        .with_module(descriptor!(utils))
        .with_module(descriptor!(mysql))
        .with_module(descriptor!(rabbitmq))
        .with_module(descriptor!(keystone))
        .with_module(descriptor!(glance))
        .with_module(descriptor!(placement))
        .with_module(descriptor!(ovn))
        .with_module(descriptor!(neutron))
        .with_module(descriptor!(ceph))
        .with_module(descriptor!(cinder))
        .with_module(descriptor!(nova))
        .with_module(descriptor!(heat))
}
