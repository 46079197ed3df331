//! Report generation command
//!
//! Resolves the reporting period, loads and filters recipes, builds the data
//! source (HTTP client or saved JSON file), and hands everything to the
//! report engine. Individual recipe failures surface as a partial-failure
//! exit code rather than aborting the run.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use tracing::{error, info};

use crate::application::{load_recipes, select_recipes, ReportEngine, RunOptions};
use crate::cli::context::{redact_token, CliContext};
use crate::cli::exit_codes;
use crate::domain::period::{self, PeriodError, ReportPeriod};
use crate::domain::recipe::OutputFormat;
use crate::infrastructure::api::{FileSource, PlatformDataSource};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Recipes directory
    #[arg(long, short = 'r')]
    pub recipes: Option<PathBuf>,

    /// Run only recipes whose name matches (repeatable, case-insensitive)
    #[arg(long = "recipe")]
    pub recipe: Vec<String>,

    /// Output directory for generated reports
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Reporting period, e.g. 7d, mtd, q1, 2024 (see `scanreport periods`)
    #[arg(long, short = 'p', conflicts_with_all = ["start", "end"])]
    pub period: Option<String>,

    /// Start date (YYYY-MM-DD); defaults to 30 days ago
    #[arg(long, short = 's')]
    pub start: Option<String>,

    /// End date (YYYY-MM-DD); defaults to today
    #[arg(long, short = 'e')]
    pub end: Option<String>,

    /// Restrict every recipe to one project (id or name)
    #[arg(long)]
    pub project: Option<String>,

    /// Restrict every recipe to one project version
    #[arg(long)]
    pub project_version: Option<String>,

    /// Output format override (repeatable: csv, xlsx, html)
    #[arg(long = "format", short = 'f')]
    pub format: Vec<OutputFormat>,

    /// API token (prefer the SCANREPORT_TOKEN environment variable)
    #[arg(long, short = 't')]
    pub token: Option<String>,

    /// Platform domain, e.g. customer.example.com
    #[arg(long, short = 'd')]
    pub domain: Option<String>,

    /// Serve report data from a saved JSON file instead of the API
    #[arg(long)]
    pub data_file: Option<PathBuf>,

    /// Skip the response cache for this run
    #[arg(long)]
    pub no_cache: bool,
}

pub async fn run(ctx: &CliContext, args: &RunArgs) -> Result<i32> {
    let period = match resolve_period(args) {
        Ok(period) => period,
        Err(err) => {
            eprintln!("Error: {}", err);
            eprintln!("{}", period::help_text());
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let recipes_dir = ctx.recipes_dir(args.recipes.as_deref());
    let recipes =
        match load_recipes(&recipes_dir).and_then(|all| select_recipes(all, &args.recipe)) {
            Ok(recipes) => recipes,
            Err(err) => {
                eprintln!("Error: {}", err);
                return Ok(exit_codes::CONFIG_ERROR);
            }
        };

    let (source, cache): (Arc<dyn PlatformDataSource>, _) = if let Some(path) = &args.data_file {
        let source = match FileSource::load(path) {
            Ok(source) => source,
            Err(err) => {
                eprintln!("Error: {}", err);
                return Ok(exit_codes::CONFIG_ERROR);
            }
        };
        info!(path = %path.display(), "Serving report data from file");
        (Arc::new(source), None)
    } else {
        let (token, domain) =
            match ctx.require_credentials(args.token.as_deref(), args.domain.as_deref()) {
                Ok(credentials) => credentials,
                Err(err) => {
                    eprintln!("Error: {}", err);
                    return Ok(exit_codes::CONFIG_ERROR);
                }
            };
        let cache = ctx.file_cache(args.no_cache);
        info!(
            domain = %domain,
            token = %redact_token(&token),
            cache = cache.is_some(),
            "Connecting to platform"
        );
        let client = ctx.api_client(token, &domain, cache.is_some())?;
        (Arc::new(client), cache)
    };

    if let Err(err) = source.test_connection().await {
        error!(error = %err, "Connection preflight failed");
        eprintln!("Error: {}", err);
        return Ok(exit_codes::API_ERROR);
    }

    let output_dir = ctx.output_dir(args.output.as_deref());
    std::fs::create_dir_all(&output_dir)?;

    info!(
        recipes = recipes.len(),
        period = %period,
        output = %output_dir.display(),
        "Starting report run"
    );

    let options = RunOptions {
        period,
        project: args.project.clone(),
        project_version: args.project_version.clone(),
        formats: args.format.clone(),
        output_dir,
    };
    let engine = ReportEngine::new(source, cache, ctx.default_formats());
    let summary = engine.run(&recipes, &options).await;

    for path in summary.generated_files() {
        println!("{}", path.display());
    }

    let failed = summary.failed_recipes();
    if failed.is_empty() {
        println!(
            "Report generation completed: {} recipe(s).",
            summary.outcomes.len()
        );
        Ok(exit_codes::SUCCESS)
    } else {
        eprintln!(
            "{} of {} recipe(s) failed: {}",
            failed.len(),
            summary.outcomes.len(),
            failed.join(", ")
        );
        Ok(exit_codes::PARTIAL_FAILURE)
    }
}

/// `--period` wins; otherwise explicit dates, with missing ends filled from
/// the default last-30-days window
fn resolve_period(args: &RunArgs) -> Result<ReportPeriod, PeriodError> {
    if let Some(spec) = &args.period {
        return ReportPeriod::parse(spec);
    }

    let today = Utc::now().date_naive();
    let default_start = (today - chrono::Duration::days(30))
        .format("%Y-%m-%d")
        .to_string();
    let start = args.start.clone().unwrap_or(default_start);
    let end = args
        .end
        .clone()
        .unwrap_or_else(|| today.format("%Y-%m-%d").to_string());
    ReportPeriod::from_dates(&start, &end)
}
