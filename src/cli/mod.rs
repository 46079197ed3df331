//! Command-line interface for recipe-driven report generation
//!
//! `run` is the main entry point: it loads recipes, queries the platform,
//! and writes reports. The list commands answer "what can I run this
//! against", and `periods` documents the period grammar.

mod commands;
mod context;
mod output;

pub use context::{redact_token, CliContext};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "scanreport",
    version,
    about = "Recipe-driven security reports from your scanning platform",
    long_about = "scanreport turns YAML recipes into CSV, XLSX, and HTML reports by querying \
                  the scanning platform's REST API, shaping the records through a transform \
                  pipeline, and rendering tables and charts.\n\n\
                  Credentials come from --token/--domain, the SCANREPORT_TOKEN and \
                  SCANREPORT_DOMAIN environment variables, or the configuration file."
)]
pub struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate reports for the selected recipes
    #[command(visible_alias = "r")]
    Run(commands::run::RunArgs),

    /// List the recipes available in the recipes directory
    ListRecipes(commands::list_recipes::ListRecipesArgs),

    /// List projects known to the platform
    ListProjects(commands::list_projects::ListProjectsArgs),

    /// List versions of one project, or version counts across the portfolio
    ListVersions(commands::list_versions::ListVersionsArgs),

    /// Explain the period grammar accepted by --period
    Periods,
}

/// Parsed arguments plus the resolved execution context
pub struct CliApp {
    cli: Cli,
    context: CliContext,
}

impl CliApp {
    pub fn new(cli: Cli, context: CliContext) -> Self {
        Self { cli, context }
    }

    /// Dispatch the selected command, returning its exit code
    pub async fn run(self) -> anyhow::Result<i32> {
        match self.cli.command {
            Commands::Run(ref args) => commands::run::run(&self.context, args).await,
            Commands::ListRecipes(ref args) => {
                commands::list_recipes::run(&self.context, args).await
            }
            Commands::ListProjects(ref args) => {
                commands::list_projects::run(&self.context, args).await
            }
            Commands::ListVersions(ref args) => {
                commands::list_versions::run(&self.context, args).await
            }
            Commands::Periods => commands::periods::run(),
        }
    }
}

/// Process exit codes for scripting and CI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    /// Configuration or usage error
    pub const CONFIG_ERROR: i32 = 2;
    /// API request or authentication failure
    pub const API_ERROR: i32 = 3;
    /// Some recipes failed while others were generated
    pub const PARTIAL_FAILURE: i32 = 4;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_run_invocation() {
        let cli = Cli::parse_from([
            "scanreport",
            "run",
            "--period",
            "7d",
            "--recipe",
            "severity",
            "--recipe",
            "mttr",
            "--format",
            "csv",
            "--no-cache",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.period.as_deref(), Some("7d"));
        assert_eq!(args.recipe, vec!["severity", "mttr"]);
        assert_eq!(args.format.len(), 1);
        assert!(args.no_cache);
    }

    #[test]
    fn period_conflicts_with_explicit_dates() {
        let result = Cli::try_parse_from([
            "scanreport",
            "run",
            "--period",
            "7d",
            "--start",
            "2025-01-01",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn list_versions_takes_a_positional_project() {
        let cli = Cli::parse_from(["scanreport", "list-versions", "Router", "--top", "5"]);
        let Commands::ListVersions(args) = cli.command else {
            panic!("expected list-versions command");
        };
        assert_eq!(args.project.as_deref(), Some("Router"));
        assert_eq!(args.top, 5);
    }
}
