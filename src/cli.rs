use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "regress-stack")]
#[command(version)]
#[command(
    about = "Deploy a single-node cloud from distribution packages and run tempest against it",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/regress-stack/config.toml)
    #[arg(long, global = true, env = "REGRESS_STACK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the execution order
    Plan(TargetArgs),

    /// Configure every module in execution order
    Setup(TargetArgs),

    /// Run tempest against the configured modules
    Test,

    /// List the available modules
    ListModules,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Only what this module needs, and the module itself (short or full name)
    pub target: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_plan_with_target() {
        let cli = Cli::try_parse_from(["regress-stack", "plan", "neutron"]).unwrap();
        match cli.command {
            Command::Plan(args) => assert_eq!(args.target.as_deref(), Some("neutron")),
            _ => panic!("expected plan"),
        }
    }

    #[test]
    fn test_setup_without_target() {
        let cli = Cli::try_parse_from(["regress-stack", "setup"]).unwrap();
        assert!(matches!(cli.command, Command::Setup(TargetArgs { target: None })));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "regress-stack",
            "test",
            "-vv",
            "--config",
            "/etc/regress-stack.toml",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Test));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/regress-stack.toml")));
    }

    #[test]
    fn test_list_modules_and_completions() {
        let cli = Cli::try_parse_from(["regress-stack", "list-modules", "-q"]).unwrap();
        assert!(matches!(cli.command, Command::ListModules));
        assert!(cli.quiet);

        let cli = Cli::try_parse_from(["regress-stack", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Completions { shell: Shell::Bash }
        ));
    }

    #[test]
    fn test_unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["regress-stack", "teardown"]).is_err());
        assert!(Cli::try_parse_from(["regress-stack", "plan", "a", "b"]).is_err());
    }
}
