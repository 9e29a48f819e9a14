use anyhow::{Context as _, Result};
use std::rc::Rc;
use std::time::Instant;

use stackgraph::Module;

use crate::commands;
use crate::host;
use crate::modules;
use crate::state::SetupState;
use crate::ui;
use crate::Context;

pub fn run(ctx: &Context, target: Option<&str>) -> Result<()> {
    let start = Instant::now();
    let label = target.unwrap_or("all modules");

    if let Err(e) = setup(ctx, target) {
        log::error!("Failed to setup {label}: {e:#}");
        commands::collect_logs(ctx);
        return Err(e);
    }

    if !ctx.quiet {
        ui::success(&format!(
            "Set up {} in {}",
            label,
            ui::format_duration(start.elapsed())
        ));
    }
    Ok(())
}

fn setup(ctx: &Context, target: Option<&str>) -> Result<()> {
    let order = commands::resolver(ctx).order(&modules::collection(), target)?;
    let mut state = SetupState::load()?;

    let steps = with_setup(&order);
    for (i, module) in steps.iter().enumerate() {
        let Some(setup) = module.setup() else {
            continue;
        };
        if !ctx.quiet {
            ui::step(i + 1, steps.len(), module.short_name());
        }
        host::measure(&format!("setup {}", module.name()), setup)
            .with_context(|| format!("Setup of {} failed", module.name()))?;
        state.mark_setup(module.name())?;
    }
    Ok(())
}

/// Modules of `order` that have a setup procedure, in order
fn with_setup(order: &[Rc<Module>]) -> Vec<&Rc<Module>> {
    order.iter().filter(|m| m.setup().is_some()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackgraph::{AllInstalled, Resolver};

    #[test]
    fn test_modules_without_setup_are_skipped() {
        let mut resolver = Resolver::new(AllInstalled);
        let order = resolver.order(&modules::collection(), None).unwrap();
        let steps = with_setup(&order);

        assert_eq!(steps.len(), order.len() - 2);
        assert!(steps
            .iter()
            .all(|m| m.short_name() != "utils" && m.short_name() != "mysql"));
        assert_eq!(steps[0].short_name(), "ceph");
    }
}
