//! Report run data models
//!
//! This module defines the structures carried from the engine into the
//! renderers and the run summary returned to the CLI.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::period::ReportPeriod;
use crate::domain::table::DataTable;
use crate::infrastructure::cache::CacheStats;

/// Everything a renderer needs to produce one report
#[derive(Debug, Clone)]
pub struct ReportData {
    pub table: DataTable,
    /// Pre-transform rows, kept when the recipe asks for raw data output
    pub raw_table: Option<DataTable>,
    pub metadata: ReportMetadata,
}

/// Context describing how a report was produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub recipe_name: String,
    pub description: String,
    pub period: ReportPeriod,
    /// Project filter applied to the query, if any
    pub project: Option<String>,
    pub raw_count: usize,
    pub transformed_count: usize,
    pub cache: CacheStats,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

/// Outcome of a single recipe within a run
#[derive(Debug)]
pub struct RecipeOutcome {
    pub recipe_name: String,
    pub result: Result<Vec<PathBuf>, crate::application::errors::EngineError>,
}

impl RecipeOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Aggregate result of a whole report run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<RecipeOutcome>,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(RecipeOutcome::succeeded)
    }

    pub fn generated_files(&self) -> Vec<&PathBuf> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .flatten()
            .collect()
    }

    pub fn failed_recipes(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.succeeded())
            .map(|o| o.recipe_name.as_str())
            .collect()
    }
}
