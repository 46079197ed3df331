//! Self-contained HTML report pages
//!
//! Markup is built with maud; charts are Plotly divs inlined into the page
//! with the plotly.js runtime pulled from its CDN. The executive layout
//! arranges charts in a two-column grid, the single layout stacks them.

use std::path::Path;

use maud::{html, Markup, PreEscaped, DOCTYPE};
use serde_json::Value;

use crate::application::errors::RenderError;
use crate::domain::recipe::Recipe;
use crate::domain::report::ReportData;
use crate::domain::table::cell_text;
use crate::presentation::charts;

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

const PAGE_CSS: &str = "\
body { font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; margin: 2rem auto; \
max-width: 1200px; color: #1a1a2e; }\n\
h1 { border-bottom: 2px solid #d7e4bc; padding-bottom: 0.4rem; }\n\
p.description { color: #444; }\n\
p.meta { color: #666; font-size: 0.9rem; }\n\
div.charts { display: grid; grid-template-columns: 1fr; gap: 24px; margin: 1.5rem 0; }\n\
div.charts.executive { grid-template-columns: 1fr 1fr; }\n\
table.report { border-collapse: collapse; width: 100%; margin-top: 1rem; }\n\
table.report th { background: #d7e4bc; text-align: left; }\n\
table.report th, table.report td { border: 1px solid #ccc; padding: 6px 10px; }\n\
table.report tr:nth-child(even) { background: #f7f7f2; }\n\
footer { margin-top: 2rem; color: #888; font-size: 0.8rem; }";

/// Render the report page and write it to `path`
pub fn write_html(recipe: &Recipe, data: &ReportData, path: &Path) -> Result<(), RenderError> {
    let page = render_page(recipe, data);
    std::fs::write(path, page.into_string()).map_err(|source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn render_page(recipe: &Recipe, data: &ReportData) -> Markup {
    let chart_divs: Vec<String> = recipe
        .output
        .charts
        .iter()
        .enumerate()
        .map(|(idx, spec)| {
            charts::build_chart(spec, &data.table).to_inline_html(Some(&format!("chart-{}", idx)))
        })
        .collect();

    let charts_class = if executive_layout(recipe) {
        "charts executive"
    } else {
        "charts"
    };
    let meta = &data.metadata;

    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                title { (meta.recipe_name) }
                @if !chart_divs.is_empty() {
                    script src=(PLOTLY_CDN) {}
                }
                style { (PreEscaped(PAGE_CSS)) }
            }
            body {
                h1 { (meta.recipe_name) }
                @if !meta.description.is_empty() {
                    p class="description" { (meta.description) }
                }
                p class="meta" {
                    "Period: " (meta.period)
                    @if let Some(project) = &meta.project {
                        " | Project: " (project)
                    }
                }
                @if !chart_divs.is_empty() {
                    div class=(charts_class) {
                        @for chart in &chart_divs {
                            div { (PreEscaped(chart.as_str())) }
                        }
                    }
                }
                @if recipe.output.table {
                    table class="report" {
                        thead {
                            tr {
                                @for column in data.table.columns() {
                                    th { (column) }
                                }
                            }
                        }
                        tbody {
                            @for row in data.table.rows() {
                                tr {
                                    @for column in data.table.columns() {
                                        td { (html_cell(row.get(column))) }
                                    }
                                }
                            }
                        }
                    }
                }
                footer {
                    "Generated " (meta.generated_at.format("%Y-%m-%d %H:%M:%S UTC"))
                    " from " (meta.raw_count) " records ("
                    (meta.transformed_count) " rows shown). Cache: "
                    (meta.cache.hits) " hits, " (meta.cache.misses) " misses."
                }
            }
        }
    }
}

/// Recipe `template: executive` forces the grid; otherwise more than one
/// chart opts in automatically
fn executive_layout(recipe: &Recipe) -> bool {
    match recipe.output.template.as_deref() {
        Some(template) => template.eq_ignore_ascii_case("executive"),
        None => recipe.output.charts.len() > 1,
    }
}

/// Nulls show as a dash in HTML tables instead of an empty cell
fn html_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(other) => cell_text(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::transform::table_from_records;
    use crate::domain::period::ReportPeriod;
    use crate::domain::recipe::{ChartSpec, ChartType, OutputConfig, QueryParams};
    use crate::domain::report::ReportMetadata;
    use serde_json::json;

    fn chart(title: &str) -> ChartSpec {
        ChartSpec {
            chart_type: ChartType::Bar,
            x: "severity".to_string(),
            y: "count".to_string(),
            title: Some(title.to_string()),
        }
    }

    fn recipe_with_charts(charts: Vec<ChartSpec>) -> Recipe {
        Recipe {
            name: "Findings by Severity".to_string(),
            description: "Counts per severity".to_string(),
            endpoint: "/public/v0/findings".to_string(),
            query: QueryParams::default(),
            additional_queries: Default::default(),
            transforms: Vec::new(),
            output: OutputConfig {
                charts,
                ..OutputConfig::default()
            },
        }
    }

    fn report_data() -> ReportData {
        let table = table_from_records(&[
            json!({"severity": "critical", "count": 5}),
            json!({"severity": "low", "count": null}),
        ]);
        ReportData {
            raw_table: None,
            metadata: ReportMetadata {
                recipe_name: "Findings by Severity".to_string(),
                description: "Counts per severity".to_string(),
                period: ReportPeriod::from_dates("2025-01-01", "2025-01-31").unwrap(),
                project: Some("42".to_string()),
                raw_count: 10,
                transformed_count: table.len(),
                cache: Default::default(),
                generated_at: chrono::Utc::now(),
            },
            table,
        }
    }

    #[test]
    fn page_contains_table_metadata_and_chart() {
        let recipe = recipe_with_charts(vec![chart("Findings")]);
        let page = render_page(&recipe, &report_data()).into_string();

        assert!(page.contains("<title>Findings by Severity</title>"));
        assert!(page.contains("Period: 2025-01-01 to 2025-01-31"));
        assert!(page.contains("Project: 42"));
        assert!(page.contains("<th>severity</th>"));
        assert!(page.contains("<td>critical</td>"));
        // Null cells render as a dash
        assert!(page.contains("<td>-</td>"));
        assert!(page.contains("chart-0"));
        assert!(page.contains(PLOTLY_CDN));
    }

    #[test]
    fn chartless_pages_skip_the_plotly_runtime() {
        let recipe = recipe_with_charts(Vec::new());
        let page = render_page(&recipe, &report_data()).into_string();
        assert!(!page.contains(PLOTLY_CDN));
        assert!(page.contains("<table"));
    }

    #[test]
    fn executive_grid_kicks_in_with_multiple_charts() {
        let single = recipe_with_charts(vec![chart("A")]);
        assert!(!executive_layout(&single));

        let multi = recipe_with_charts(vec![chart("A"), chart("B")]);
        assert!(executive_layout(&multi));

        let mut forced = recipe_with_charts(vec![chart("A")]);
        forced.output.template = Some("executive".to_string());
        assert!(executive_layout(&forced));

        let page = render_page(&multi, &report_data()).into_string();
        assert!(page.contains("charts executive"));
    }

    #[test]
    fn table_can_be_disabled_by_the_recipe() {
        let mut recipe = recipe_with_charts(vec![chart("A")]);
        recipe.output.table = false;
        let page = render_page(&recipe, &report_data()).into_string();
        assert!(!page.contains("<table class=\"report\">"));
    }
}
