use anyhow::Result;

use crate::commands;
use crate::modules;
use crate::Context;

/// Print every module the registry knows about
///
/// A full resolution pass runs first so that the registry holds the whole
/// collection, excluded modules included.
pub fn run(ctx: &Context) -> Result<()> {
    let mut resolver = commands::resolver(ctx);
    resolver.order(&modules::collection(), None)?;
    for module in resolver.modules() {
        println!("{module}");
    }
    Ok(())
}
