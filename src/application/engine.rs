//! Report engine orchestrating fetch, transform, and render per recipe
//!
//! A run walks the selected recipes in order. Each recipe fetches its main
//! query (cache first), resolves any side queries, runs the transform
//! pipeline, and renders the configured formats. One failing recipe never
//! stops the run; its error lands in the run summary instead.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::application::errors::EngineError;
use crate::application::transform::{apply_pipeline, table_from_records, SideTables};
use crate::domain::period::ReportPeriod;
use crate::domain::recipe::{OutputFormat, QueryParams, Recipe, TransformStep};
use crate::domain::report::{RecipeOutcome, ReportData, ReportMetadata, RunSummary};
use crate::domain::table::cell_text;
use crate::infrastructure::api::{substitute_period, PlatformDataSource, PROJECTS_ENDPOINT};
use crate::infrastructure::cache::FileCache;
use crate::presentation::render_report;

/// Per-run settings resolved by the CLI before the engine starts
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub period: ReportPeriod,
    pub project: Option<String>,
    pub project_version: Option<String>,
    /// Format override; empty falls back to the recipe, then the config default
    pub formats: Vec<OutputFormat>,
    pub output_dir: PathBuf,
}

pub struct ReportEngine {
    source: Arc<dyn PlatformDataSource>,
    cache: Option<FileCache>,
    default_formats: Vec<OutputFormat>,
}

impl ReportEngine {
    pub fn new(
        source: Arc<dyn PlatformDataSource>,
        cache: Option<FileCache>,
        default_formats: Vec<OutputFormat>,
    ) -> Self {
        Self {
            source,
            cache,
            default_formats,
        }
    }

    /// Generate every selected recipe, continuing past individual failures
    pub async fn run(&self, recipes: &[Recipe], options: &RunOptions) -> RunSummary {
        let total = recipes.len();
        let mut summary = RunSummary::default();

        for (idx, recipe) in recipes.iter().enumerate() {
            info!(
                recipe = %recipe.name,
                index = idx + 1,
                total,
                "Generating report"
            );
            let result = self.run_recipe(recipe, options).await;
            if let Err(err) = &result {
                error!(recipe = %recipe.name, error = %err, "Recipe failed");
            }
            summary.outcomes.push(RecipeOutcome {
                recipe_name: recipe.name.clone(),
                result,
            });
        }

        if let Some(cache) = &self.cache {
            let stats = cache.stats();
            info!(
                hits = stats.hits,
                misses = stats.misses,
                subset_hits = stats.subset_hits,
                writes = stats.writes,
                "Cache summary"
            );
            match cache.cleanup_expired() {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "Removed stale cache entries"),
                Err(err) => warn!(error = %err, "Cache cleanup failed"),
            }
        }

        info!(
            generated = summary.generated_files().len(),
            failed = summary.failed_recipes().len(),
            "Report run finished"
        );
        summary
    }

    async fn run_recipe(
        &self,
        recipe: &Recipe,
        options: &RunOptions,
    ) -> Result<Vec<PathBuf>, EngineError> {
        let params = effective_params(&recipe.query, &recipe.endpoint, options, true);
        let mut records = self.fetch(&recipe.endpoint, &params).await?;
        if records.is_empty() {
            warn!(recipe = %recipe.name, "Query returned no records");
            return Err(EngineError::NoData {
                recipe: recipe.name.clone(),
            });
        }

        let mut side = SideTables::new();
        for (name, side_query) in &recipe.additional_queries {
            let side_params =
                effective_params(&side_query.query, &side_query.endpoint, options, false);
            debug!(recipe = %recipe.name, query = %name, "Fetching side query");
            let rows = self.fetch(&side_query.endpoint, &side_params).await?;
            side.insert(name.clone(), rows);
        }

        if wants_project_names(&recipe.transforms) {
            let catalog: Vec<Value>;
            let projects: &[Value] = match side.get("projects") {
                Some(rows) => rows,
                None => {
                    catalog = self.fetch(PROJECTS_ENDPOINT, &catalog_params()).await?;
                    &catalog
                }
            };
            let names = project_name_map(projects);
            inject_project_names(&mut records, &names);
            for rows in side.values_mut() {
                inject_project_names(rows, &names);
            }
        }

        let raw_table = table_from_records(&records);
        let table = apply_pipeline(raw_table.clone(), &recipe.transforms, &side)?;

        let metadata = ReportMetadata {
            recipe_name: recipe.name.clone(),
            description: recipe.description.clone(),
            period: options.period,
            project: options.project.clone(),
            raw_count: records.len(),
            transformed_count: table.len(),
            cache: self.cache.as_ref().map(FileCache::stats).unwrap_or_default(),
            generated_at: Utc::now(),
        };

        let data = ReportData {
            table,
            raw_table: recipe.output.raw_data.then_some(raw_table),
            metadata,
        };

        let formats = self.resolve_formats(recipe, options);
        let dir = options.output_dir.join(sanitize_filename(&recipe.name));
        std::fs::create_dir_all(&dir)?;

        let files = render_report(recipe, &data, &dir, &formats)?;
        debug!(recipe = %recipe.name, files = files.len(), "Report rendered");
        Ok(files)
    }

    /// Cache-first fetch; misses go to the data source and backfill the cache
    async fn fetch(&self, endpoint: &str, params: &QueryParams) -> Result<Vec<Value>, EngineError> {
        if let Some(cache) = &self.cache {
            if let Some(rows) = cache.get(endpoint, params)? {
                return Ok(rows);
            }
        }

        let rows = self.source.fetch_all(endpoint, params).await?;
        if let Some(cache) = &self.cache {
            cache.put(endpoint, params, &rows)?;
        }
        Ok(rows)
    }

    fn resolve_formats(&self, recipe: &Recipe, options: &RunOptions) -> Vec<OutputFormat> {
        if !options.formats.is_empty() {
            options.formats.clone()
        } else if !recipe.output.formats.is_empty() {
            recipe.output.formats.clone()
        } else {
            self.default_formats.clone()
        }
    }
}

/// Substitute the run period into the filter and, for main queries, append
/// the project and version clauses
fn effective_params(
    query: &QueryParams,
    endpoint: &str,
    options: &RunOptions,
    apply_project: bool,
) -> QueryParams {
    let mut params = query.clone();
    let mut filter = params
        .filter
        .as_deref()
        .map(|f| substitute_period(f, endpoint, &options.period));

    if apply_project {
        let mut clauses: Vec<String> = Vec::new();
        if let Some(project) = &options.project {
            clauses.push(format!("project=={}", project));
        }
        if let Some(version) = &options.project_version {
            clauses.push(format!("projectVersion=={}", version));
        }
        if !clauses.is_empty() {
            let appended = clauses.join(";");
            filter = Some(match filter {
                Some(f) if !f.is_empty() => format!("{};{}", f, appended),
                _ => appended,
            });
        }
    }

    params.filter = filter;
    params
}

fn catalog_params() -> QueryParams {
    QueryParams {
        limit: Some(1000),
        offset: Some(0),
        ..QueryParams::default()
    }
}

/// Whether any transform step references the injected `project_name` column
fn wants_project_names(steps: &[TransformStep]) -> bool {
    const COLUMN: &str = "project_name";
    steps.iter().any(|step| match step {
        TransformStep::GroupBy(spec) => spec.by.iter().any(|c| c == COLUMN),
        TransformStep::Select(spec) => spec.columns.iter().any(|c| c == COLUMN),
        TransformStep::Pivot(spec) => spec.index == COLUMN || spec.columns == COLUMN,
        TransformStep::Sort(spec) => spec.by == COLUMN,
        _ => false,
    })
}

/// Project id (as text) to name, tolerating both `id` and `projectId` keys
fn project_name_map(projects: &[Value]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for project in projects {
        let id = project
            .get("id")
            .filter(|v| !v.is_null())
            .or_else(|| project.get("projectId").filter(|v| !v.is_null()));
        let name = project.get("name").and_then(Value::as_str);
        if let (Some(id), Some(name)) = (id, name) {
            map.insert(cell_text(id), name.to_string());
        }
    }
    map
}

/// Add a `project_name` field to each record from its project reference.
/// Embedded project objects carry their own name; bare ids go through the
/// catalog map and fall back to the id text when unknown.
fn inject_project_names(records: &mut [Value], names: &HashMap<String, String>) {
    for record in records.iter_mut() {
        let Some(obj) = record.as_object_mut() else {
            continue;
        };
        let field = obj
            .get("project")
            .filter(|v| !v.is_null())
            .or_else(|| obj.get("projectId").filter(|v| !v.is_null()))
            .cloned();
        let Some(field) = field else {
            continue;
        };

        let name = match &field {
            Value::Object(project) => match project.get("name").and_then(Value::as_str) {
                Some(name) => name.to_string(),
                None => {
                    let id = project.get("id").map(cell_text).unwrap_or_default();
                    names.get(&id).cloned().unwrap_or(id)
                }
            },
            other => {
                let id = cell_text(other);
                names.get(&id).cloned().unwrap_or(id)
            }
        };
        obj.insert("project_name".to_string(), Value::String(name));
    }
}

/// Make a recipe name safe as a directory and file stem
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_underscore = false;
    for c in name.chars() {
        let mapped = if c.is_ascii_alphanumeric() || matches!(c, '.' | '-') {
            c
        } else {
            '_'
        };
        if mapped == '_' {
            if last_was_underscore {
                continue;
            }
            last_was_underscore = true;
        } else {
            last_was_underscore = false;
        }
        out.push(mapped);
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "report".to_string()
    } else {
        trimmed.to_string()
    }
}
