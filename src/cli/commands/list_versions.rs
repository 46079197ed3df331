//! List versions of one project, or version counts across the portfolio
//!
//! With a project argument this prints that project's versions. Without one
//! it walks every project, counting versions and skipping projects whose
//! fetch fails, then prints the counts sorted descending.

use anyhow::Result;
use clap::Args;
use serde_json::Value;
use tracing::{error, warn};

use crate::cli::context::CliContext;
use crate::cli::exit_codes;
use crate::cli::output::print_table;
use crate::domain::recipe::QueryParams;
use crate::domain::table::cell_text;
use crate::infrastructure::api::{PlatformClient, PlatformDataSource, PROJECTS_ENDPOINT};

#[derive(Args, Debug)]
pub struct ListVersionsArgs {
    /// Project name or id; omit to list version counts across the portfolio
    pub project: Option<String>,

    /// Portfolio mode: only show the top N projects by version count
    #[arg(long, short = 'n', default_value_t = 0)]
    pub top: usize,

    /// API token (prefer the SCANREPORT_TOKEN environment variable)
    #[arg(long, short = 't')]
    pub token: Option<String>,

    /// Platform domain, e.g. customer.example.com
    #[arg(long, short = 'd')]
    pub domain: Option<String>,
}

pub async fn run(ctx: &CliContext, args: &ListVersionsArgs) -> Result<i32> {
    let (token, domain) =
        match ctx.require_credentials(args.token.as_deref(), args.domain.as_deref()) {
            Ok(credentials) => credentials,
            Err(err) => {
                eprintln!("Error: {}", err);
                return Ok(exit_codes::CONFIG_ERROR);
            }
        };
    let client = ctx.api_client(token, &domain, false)?;

    let params = QueryParams {
        limit: Some(1000),
        offset: Some(0),
        archived: Some(false),
        ..QueryParams::default()
    };
    let projects = match client.fetch_all(PROJECTS_ENDPOINT, &params).await {
        Ok(projects) => projects,
        Err(err) => {
            error!(error = %err, "Failed to fetch projects");
            eprintln!("Error: {}", err);
            return Ok(exit_codes::API_ERROR);
        }
    };

    match &args.project {
        Some(wanted) => single_project(&client, &projects, wanted).await,
        None => portfolio(&client, &projects, args.top).await,
    }
}

async fn single_project(
    client: &PlatformClient,
    projects: &[Value],
    wanted: &str,
) -> Result<i32> {
    let Some(target) = find_project(projects, wanted) else {
        eprintln!(
            "Project '{}' not found. Run `scanreport list-projects` to see what exists.",
            wanted
        );
        return Ok(exit_codes::CONFIG_ERROR);
    };
    let id = cell_text(target.get("id").unwrap_or(&Value::Null));
    let name = target
        .get("name")
        .map(cell_text)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| id.clone());

    println!("Fetching versions for {} (id {})...", name, id);
    let versions = match client.list_versions(&id).await {
        Ok(versions) => versions,
        Err(err) => {
            error!(project = %name, error = %err, "Failed to fetch versions");
            eprintln!("Error: {}", err);
            return Ok(exit_codes::API_ERROR);
        }
    };

    if versions.is_empty() {
        println!("No versions found for '{}'.", name);
        return Ok(exit_codes::SUCCESS);
    }

    let rows: Vec<Vec<String>> = versions
        .iter()
        .map(|version| {
            vec![
                cell_text(version.get("id").unwrap_or(&Value::Null)),
                cell_text(version.get("version").unwrap_or(&Value::Null)),
                format_created(version.get("created")),
            ]
        })
        .collect();

    println!("Versions for '{}' ({} found)\n", name, versions.len());
    print_table(&["ID", "Version", "Created"], &rows);

    Ok(exit_codes::SUCCESS)
}

async fn portfolio(client: &PlatformClient, projects: &[Value], top: usize) -> Result<i32> {
    if projects.is_empty() {
        println!("No projects found.");
        return Ok(exit_codes::SUCCESS);
    }

    println!("Fetching versions across {} projects...", projects.len());
    let mut counts: Vec<(String, String, usize)> = Vec::new();
    let mut skipped = 0usize;
    for project in projects {
        let id = cell_text(project.get("id").unwrap_or(&Value::Null));
        if id.is_empty() {
            continue;
        }
        let name = project
            .get("name")
            .map(cell_text)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| id.clone());
        match client.list_versions(&id).await {
            Ok(versions) => counts.push((name, id, versions.len())),
            Err(err) => {
                warn!(project = %name, error = %err, "Skipping project");
                skipped += 1;
            }
        }
    }

    let total: usize = counts.iter().map(|(_, _, n)| n).sum();
    let with_versions = counts.iter().filter(|(_, _, n)| *n > 0).count();
    println!(
        "\nPortfolio: {} versions across {} projects",
        total, with_versions
    );
    if skipped > 0 {
        println!("({} project(s) skipped due to fetch errors)", skipped);
    }

    counts.sort_by(|a, b| b.2.cmp(&a.2));
    if top > 0 && counts.len() > top {
        println!("Showing top {} of {} projects.", top, counts.len());
        counts.truncate(top);
    }

    let rows: Vec<Vec<String>> = counts
        .into_iter()
        .map(|(name, id, n)| vec![name, n.to_string(), id])
        .collect();
    println!();
    print_table(&["Project", "Versions", "ID"], &rows);

    Ok(exit_codes::SUCCESS)
}

/// Match by id first, then by case-insensitive name
fn find_project<'a>(projects: &'a [Value], wanted: &str) -> Option<&'a Value> {
    projects
        .iter()
        .find(|p| p.get("id").map(cell_text).as_deref() == Some(wanted))
        .or_else(|| {
            projects.iter().find(|p| {
                p.get("name")
                    .map(cell_text)
                    .is_some_and(|name| name.eq_ignore_ascii_case(wanted))
            })
        })
}

fn format_created(value: Option<&Value>) -> String {
    let Some(text) = value.map(cell_text).filter(|t| !t.is_empty()) else {
        return "-".to_string();
    };
    match chrono::DateTime::parse_from_rfc3339(&text) {
        Ok(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => text,
    }
}
