//! Report renderers: CSV, XLSX, and HTML with embedded charts
//!
//! Every renderer consumes the same transformed table plus run metadata.
//! `render_report` is the engine's single entry point; it writes one file per
//! requested format into the recipe's output directory.

pub mod charts;
pub mod csv;
pub mod html;
pub mod xlsx;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::application::engine::sanitize_filename;
use crate::application::errors::RenderError;
use crate::domain::recipe::{OutputFormat, Recipe};
use crate::domain::report::ReportData;

/// Write the report in each requested format, returning the created files
pub fn render_report(
    recipe: &Recipe,
    data: &ReportData,
    dir: &Path,
    formats: &[OutputFormat],
) -> Result<Vec<PathBuf>, RenderError> {
    let stem = sanitize_filename(&recipe.name);
    let mut files = Vec::new();

    for format in formats {
        match format {
            OutputFormat::Csv => {
                let path = dir.join(format!("{}.csv", stem));
                csv::write_csv(&data.table, &path)?;
                files.push(path);

                if let Some(raw) = &data.raw_table {
                    let path = dir.join(format!("{}_Raw_Data.csv", stem));
                    csv::write_csv(raw, &path)?;
                    files.push(path);
                }
            }
            OutputFormat::Xlsx => {
                let path = dir.join(format!("{}.xlsx", stem));
                xlsx::write_xlsx(&data.table, &path, &recipe.name)?;
                files.push(path);

                if let Some(raw) = &data.raw_table {
                    let path = dir.join(format!("{}_Raw_Data.xlsx", stem));
                    xlsx::write_xlsx(raw, &path, &format!("{} - Raw Data", recipe.name))?;
                    files.push(path);
                }
            }
            OutputFormat::Html => {
                let path = dir.join(format!("{}.html", stem));
                html::write_html(recipe, data, &path)?;
                files.push(path);
            }
        }
    }

    debug!(recipe = %recipe.name, files = files.len(), "Rendered output files");
    Ok(files)
}
