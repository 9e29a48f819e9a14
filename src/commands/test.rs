//! Tempest run against whatever `setup` has configured.

use anyhow::{Context as _, Result};
use std::fs;
use std::path::Path;
use std::time::Instant;

use crate::commands;
use crate::host;
use crate::modules::{self, keystone, utils::Settings};
use crate::runner::{self, RunOptions};
use crate::state::SetupState;
use crate::ui;
use crate::Context;

const TEST_LIST: &str = "regress_tests.txt";

/// Tests one module adds on top of the smoke set
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selection {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl Selection {
    /// `tempest run --list` arguments for this selection
    fn list_args(&self) -> Vec<&str> {
        let mut args = vec!["run", "--list"];
        for regex in &self.include {
            args.extend(["--regex", regex.as_str()]);
        }
        for regex in &self.exclude {
            args.extend(["--exclude-regex", regex.as_str()]);
        }
        args
    }
}

pub fn run(ctx: &Context) -> Result<()> {
    let start = Instant::now();
    let env = keystone::auth_env()?;
    let workspace = ctx.config.tempest_workspace();
    let opts = RunOptions {
        env: &env,
        cwd: Some(&workspace),
        quiet: false,
    };

    init_workspace(ctx, &workspace, opts)?;
    let tempest_conf = workspace.join("etc").join("tempest.conf");
    Settings::new()
        .set("validation", "image_ssh_user", "ubuntu")
        .set("validation", "image_alt_ssh_user", "ubuntu")
        .apply(&tempest_conf.to_string_lossy())?;

    let selections = configure_modules(ctx, &tempest_conf)?;

    log::info!("Building test list");
    let mut tests = runner::run_with("tempest", &["run", "--smoke", "--list"], opts)?;
    for selection in &selections {
        tests.push_str(&runner::run_with("tempest", &selection.list_args(), opts)?);
    }
    let list = workspace.join(TEST_LIST);
    fs::write(&list, &tests).with_context(|| format!("Failed to write {}", list.display()))?;
    if !ctx.quiet {
        ui::info(&format!(
            "{} tests selected",
            tests.lines().filter(|l| !l.trim().is_empty()).count()
        ));
    }

    // Failures are reported by stestr below.
    if let Err(e) = runner::run_with(
        "tempest",
        &["run", "--load-list", TEST_LIST, "--serial"],
        opts,
    ) {
        log::debug!("tempest run: {e}");
    }

    ui::banner("START Fetching failing tests");
    let failing = runner::run_with(
        "stestr",
        &["failing", "--list"],
        RunOptions {
            cwd: Some(&workspace),
            ..RunOptions::default()
        },
    );
    ui::banner("END Fetching failing tests");
    if let Err(e) = failing {
        commands::collect_logs(ctx);
        return Err(e.context("Tempest reported failing tests"));
    }

    if !ctx.quiet {
        ui::success(&format!(
            "Tempest passed in {}",
            ui::format_duration(start.elapsed())
        ));
    }
    Ok(())
}

fn init_workspace(ctx: &Context, workspace: &Path, opts: RunOptions<'_>) -> Result<()> {
    let tempest = &ctx.config.tempest;
    let image = match &tempest.image {
        Some(image) => image.clone(),
        None => default_image(&host::release()?, host::machine()),
    };

    runner::run("tempest", &["init", &workspace.to_string_lossy()])?;
    runner::run_with(
        "discover-tempest-config",
        &[
            "--create",
            "--flavor-min-mem",
            &tempest.flavor_min_mem.to_string(),
            "--flavor-min-disk",
            &tempest.flavor_min_disk.to_string(),
            "--image",
            &image,
        ],
        opts,
    )?;
    Ok(())
}

/// Let each set-up module adjust tempest, collecting its test selection
///
/// Modules without include regexes add nothing beyond the smoke set.
fn configure_modules(ctx: &Context, tempest_conf: &Path) -> Result<Vec<Selection>> {
    let order = commands::resolver(ctx).order(&modules::collection(), None)?;
    let state = SetupState::load()?;

    let mut selections = Vec::new();
    for module in &order {
        if !state.is_setup_done(module.name()) {
            log::info!("Skipping {}", module.name());
            continue;
        }
        if let Some(configure) = module.configure_tempest() {
            host::measure(&format!("configure_tempest {}", module.name()), || {
                configure(tempest_conf)
            })?;
        }
        if module.test_include_regexes().is_empty() {
            continue;
        }
        selections.push(Selection {
            include: module.test_include_regexes().to_vec(),
            exclude: module.test_exclude_regexes().to_vec(),
        });
    }
    Ok(selections)
}

/// Ubuntu cloud image for `release` on `arch`
fn default_image(release: &str, arch: &str) -> String {
    format!(
        "http://cloud-images.ubuntu.com/{release}/current/{release}-server-cloudimg-{arch}.img"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_image() {
        assert_eq!(
            default_image("noble", "amd64"),
            "http://cloud-images.ubuntu.com/noble/current/noble-server-cloudimg-amd64.img"
        );
    }

    #[test]
    fn test_selection_args() {
        let selection = Selection {
            include: vec!["heat_tempest_plugin".to_string()],
            exclude: vec!["aodh".to_string(), "multi_signal".to_string()],
        };
        assert_eq!(
            selection.list_args(),
            [
                "run",
                "--list",
                "--regex",
                "heat_tempest_plugin",
                "--exclude-regex",
                "aodh",
                "--exclude-regex",
                "multi_signal",
            ]
        );
    }

    #[test]
    fn test_include_only_selection() {
        let selection = Selection {
            include: vec!["a".to_string(), "b".to_string()],
            exclude: Vec::new(),
        };
        assert_eq!(
            selection.list_args(),
            ["run", "--list", "--regex", "a", "--regex", "b"]
        );
    }
}
