pub mod list;
pub mod plan;
pub mod setup;
pub mod test;

use crate::logs;
use crate::modules;
use crate::Context;
use stackgraph::Resolver;

/// Resolver over the configured package database
pub fn resolver(ctx: &Context) -> Resolver<debkit::Client> {
    Resolver::new(ctx.config.package_client())
}

/// Dump diagnostics for every deployable module
///
/// Runs in error paths, so its own failures are only logged.
pub fn collect_logs(ctx: &Context) {
    let order = match resolver(ctx).order(&modules::collection(), None) {
        Ok(order) => order,
        Err(e) => {
            log::warn!("Could not resolve modules for log collection: {e}");
            Vec::new()
        }
    };
    if let Err(e) = logs::collect(&order, ctx.config.logs.journal) {
        log::warn!("Log collection failed: {e:#}");
    }
}
