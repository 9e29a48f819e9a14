use anyhow::Result;
use stackgraph::Plan;

use crate::commands;
use crate::modules;
use crate::state::SetupState;
use crate::ui;
use crate::Context;

pub fn run(ctx: &Context, target: Option<&str>) -> Result<()> {
    let plan = commands::resolver(ctx).plan(&modules::collection(), target)?;

    if !ctx.quiet {
        ui::header("Execution Order");
    }
    for line in order_lines(&plan) {
        println!("{line}");
    }

    if ctx.verbose > 0 {
        print_setup_state(&plan)?;
    }

    if ctx.verbose > 0 && !plan.excluded.is_empty() {
        ui::section("Excluded");
        for (name, reason) in &plan.excluded {
            ui::kv(name, &reason.to_string());
        }
    }
    Ok(())
}

fn print_setup_state(plan: &Plan) -> Result<()> {
    let state = SetupState::load()?;
    ui::section("Setup state");
    for module in &plan.order {
        match state.completed_at(module.name()) {
            Some(at) => ui::kv(
                module.short_name(),
                &at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            ),
            None => ui::dim(&format!("{}: not set up", module.short_name())),
        }
    }
    Ok(())
}

fn order_lines(plan: &Plan) -> Vec<String> {
    plan.order
        .iter()
        .enumerate()
        .map(|(i, module)| format!("{:>3}. {}", i + 1, module.name()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackgraph::{Resolver, StaticOracle};

    #[test]
    fn test_order_lines_are_numbered() {
        let mut resolver = Resolver::new(StaticOracle::new(["crudini", "mysql-server"]));
        let plan = resolver.plan(&modules::collection(), Some("mysql")).unwrap();
        assert_eq!(
            order_lines(&plan),
            [
                "  1. regress_stack.modules.utils",
                "  2. regress_stack.modules.mysql",
            ]
        );
    }
}
