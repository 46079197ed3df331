//! List projects known to the platform

use anyhow::Result;
use clap::Args;
use serde_json::Value;
use tracing::error;

use crate::cli::context::CliContext;
use crate::cli::exit_codes;
use crate::cli::output::print_table;
use crate::domain::recipe::QueryParams;
use crate::domain::table::cell_text;
use crate::infrastructure::api::{PlatformDataSource, PROJECTS_ENDPOINT};

#[derive(Args, Debug)]
pub struct ListProjectsArgs {
    /// API token (prefer the SCANREPORT_TOKEN environment variable)
    #[arg(long, short = 't')]
    pub token: Option<String>,

    /// Platform domain, e.g. customer.example.com
    #[arg(long, short = 'd')]
    pub domain: Option<String>,
}

pub async fn run(ctx: &CliContext, args: &ListProjectsArgs) -> Result<i32> {
    let (token, domain) =
        match ctx.require_credentials(args.token.as_deref(), args.domain.as_deref()) {
            Ok(credentials) => credentials,
            Err(err) => {
                eprintln!("Error: {}", err);
                return Ok(exit_codes::CONFIG_ERROR);
            }
        };
    let client = ctx.api_client(token, &domain, false)?;

    println!("Fetching projects from {}...", domain);
    let params = QueryParams {
        limit: Some(1000),
        offset: Some(0),
        archived: Some(false),
        ..QueryParams::default()
    };
    let mut projects = match client.fetch_all(PROJECTS_ENDPOINT, &params).await {
        Ok(projects) => projects,
        Err(err) => {
            error!(error = %err, "Failed to fetch projects");
            eprintln!("Error: {}", err);
            return Ok(exit_codes::API_ERROR);
        }
    };

    if projects.is_empty() {
        println!("No projects found.");
        return Ok(exit_codes::SUCCESS);
    }

    projects.sort_by_key(|project| project_name(project).to_lowercase());

    let rows: Vec<Vec<String>> = projects
        .iter()
        .map(|project| {
            let id = project
                .get("id")
                .map(cell_text)
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| "-".to_string());
            vec![id, project_name(project)]
        })
        .collect();

    println!("Available projects ({} found)\n", projects.len());
    print_table(&["ID", "Name"], &rows);
    println!("\nUse --project with a name or id to restrict report runs.");

    Ok(exit_codes::SUCCESS)
}

fn project_name(project: &Value) -> String {
    project
        .get("name")
        .map(cell_text)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "Unknown".to_string())
}
