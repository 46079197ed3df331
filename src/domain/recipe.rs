//! Recipe model: the YAML contract between report authors and the engine
//!
//! A recipe names a report, the API query feeding it, a transform pipeline,
//! and the output formats and charts to render. Failing recipes never take
//! the whole run down, so validation errors carry enough context to fix the
//! file they came from.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Validation failures for a parsed recipe
#[derive(Debug, thiserror::Error)]
pub enum RecipeError {
    #[error("Recipe name must not be empty")]
    EmptyName,

    #[error("Recipe '{name}': endpoint '{endpoint}' must start with '/'")]
    BadEndpoint { name: String, endpoint: String },

    #[error("Recipe '{name}': query limit {limit} is outside 1-10000")]
    BadLimit { name: String, limit: u32 },

    #[error("Recipe '{name}': chart references empty '{field}' column")]
    BadChart { name: String, field: &'static str },
}

/// A declarative report definition loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// API path the main query hits, e.g. `/public/v0/findings`
    pub endpoint: String,
    #[serde(default)]
    pub query: QueryParams,
    /// Named side queries whose results are available to `join` transforms
    #[serde(default)]
    pub additional_queries: BTreeMap<String, SideQuery>,
    #[serde(default)]
    pub transforms: Vec<TransformStep>,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Recipe {
    /// Structural checks applied at load time
    pub fn validate(&self) -> Result<(), RecipeError> {
        if self.name.trim().is_empty() {
            return Err(RecipeError::EmptyName);
        }

        if !self.endpoint.starts_with('/') {
            return Err(RecipeError::BadEndpoint {
                name: self.name.clone(),
                endpoint: self.endpoint.clone(),
            });
        }

        if let Some(limit) = self.query.limit {
            if limit == 0 || limit > 10_000 {
                return Err(RecipeError::BadLimit {
                    name: self.name.clone(),
                    limit,
                });
            }
        }

        for chart in &self.output.charts {
            if chart.x.trim().is_empty() {
                return Err(RecipeError::BadChart {
                    name: self.name.clone(),
                    field: "x",
                });
            }
            if chart.y.trim().is_empty() {
                return Err(RecipeError::BadChart {
                    name: self.name.clone(),
                    field: "y",
                });
            }
        }

        Ok(())
    }

    /// Case-insensitive name match used by the CLI recipe filter
    pub fn matches_filter(&self, terms: &[String]) -> bool {
        if terms.is_empty() {
            return true;
        }
        let name = self.name.to_lowercase();
        terms.iter().any(|t| name.contains(&t.to_lowercase()))
    }
}

/// Query parameters for a list endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    /// Server-side filter expression; `${start}` and `${end}` are
    /// substituted with the run period before the request goes out
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
    pub archived: Option<bool>,
}

/// A named secondary query, fetched once per recipe run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SideQuery {
    pub endpoint: String,
    #[serde(flatten)]
    pub query: QueryParams,
}

/// One transform pipeline step; the YAML key picks the operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformStep {
    Flatten(FlattenSpec),
    Filter(FilterSpec),
    GroupBy(GroupBySpec),
    Sort(SortSpec),
    Pivot(PivotSpec),
    Select(SelectSpec),
    Rename(RenameSpec),
    Calc(CalcSpec),
    Join(JoinSpec),
    Limit(LimitSpec),
}

/// Flatten nested records into dotted columns; takes no options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlattenSpec {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSpec {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    /// Membership test; `value` must be a list
    #[serde(rename = "=in=")]
    In,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupBySpec {
    pub by: Vec<String>,
    /// Aggregation specs: `COUNT`, `SUM:col`, `AVG:col`, `MIN:col`,
    /// `MAX:col`, `COUNT_DISTINCT:col`
    pub aggregations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortSpec {
    pub by: String,
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
    /// Sort severity labels critical-first instead of alphabetically
    Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PivotSpec {
    pub index: String,
    pub columns: String,
    pub values: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectSpec {
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameSpec {
    pub map: BTreeMap<String, String>,
}

/// Computed column added to every row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalcSpec {
    pub name: String,
    #[serde(flatten)]
    pub op: CalcOp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CalcOp {
    /// `YYYY-MM` prefix of an ISO date column
    MonthYear { source: String },
    /// Collapse raw status values into Resolved / Triaged / Open
    StatusCase { source: String },
    /// Whole days between two date columns; `to: now` uses today
    DatediffDays { from: String, to: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinSpec {
    /// Name of the `additional_queries` result to join against
    pub with: String,
    pub left_on: String,
    /// May be a dotted path into nested objects on the right side
    pub right_on: String,
    /// Right-side column -> new column name
    pub select: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitSpec {
    pub rows: usize,
}

/// Output bindings: formats, charts, and layout hints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Formats to render; empty means the configured default set
    pub formats: Vec<OutputFormat>,
    /// Include the data table in the HTML page
    pub table: bool,
    pub charts: Vec<ChartSpec>,
    /// HTML template override; `executive` forces the multi-chart layout
    pub template: Option<String>,
    /// Also write the raw pre-transform rows next to the report
    pub raw_data: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            formats: Vec::new(),
            table: true,
            charts: Vec::new(),
            template: None,
            raw_data: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Xlsx,
    Html,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Xlsx => write!(f, "xlsx"),
            Self::Html => write!(f, "html"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" => Ok(Self::Xlsx),
            "html" => Ok(Self::Html),
            other => Err(format!(
                "Unknown output format '{}' (supported: csv, xlsx, html)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    /// Column feeding the x axis (labels for pie charts)
    pub x: String,
    /// Column feeding the y axis (values for pie charts)
    pub y: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
    Pie,
    Scatter,
    /// Sorted bars plus a cumulative-percentage line
    Pareto,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
name: findings-by-severity
endpoint: /public/v0/findings
query:
  filter: "detected>=${start};detected<=${end}"
  limit: 500
transforms:
  - flatten: {}
  - group_by:
      by: [severity]
      aggregations: ["COUNT", "AVG:risk"]
  - sort: { by: severity, order: severity }
output:
  formats: [csv, html]
  charts:
    - type: bar
      x: severity
      y: count
      title: Findings by severity
"#
    }

    #[test]
    fn parses_full_recipe_yaml() {
        let recipe: Recipe = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert_eq!(recipe.name, "findings-by-severity");
        assert_eq!(recipe.transforms.len(), 3);
        assert_eq!(recipe.output.formats, vec![OutputFormat::Csv, OutputFormat::Html]);
        assert!(recipe.validate().is_ok());

        match &recipe.transforms[1] {
            TransformStep::GroupBy(spec) => {
                assert_eq!(spec.by, vec!["severity"]);
                assert_eq!(spec.aggregations.len(), 2);
            }
            other => panic!("expected group_by, got {:?}", other),
        }
    }

    #[test]
    fn parses_calc_and_join_steps() {
        let yaml = r#"
name: aging
endpoint: /public/v0/findings
additional_queries:
  projects:
    endpoint: /public/v0/projects
    limit: 1000
transforms:
  - calc: { name: age_days, op: datediff_days, from: detected, to: now }
  - calc: { name: month, op: month_year, source: detected }
  - join:
      with: projects
      left_on: project
      right_on: id
      select: { name: project_name }
"#;
        let recipe: Recipe = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(recipe.additional_queries.len(), 1);
        match &recipe.transforms[0] {
            TransformStep::Calc(spec) => match &spec.op {
                CalcOp::DatediffDays { from, to } => {
                    assert_eq!(from, "detected");
                    assert_eq!(to, "now");
                }
                other => panic!("expected datediff_days, got {:?}", other),
            },
            other => panic!("expected calc, got {:?}", other),
        }
        match &recipe.transforms[2] {
            TransformStep::Join(spec) => {
                assert_eq!(spec.with, "projects");
                assert_eq!(spec.select.get("name").map(String::as_str), Some("project_name"));
            }
            other => panic!("expected join, got {:?}", other),
        }
    }

    #[test]
    fn validation_rejects_bad_endpoint_and_limit() {
        let mut recipe: Recipe = serde_yaml::from_str(minimal_yaml()).unwrap();
        recipe.endpoint = "public/v0/findings".to_string();
        assert!(matches!(
            recipe.validate(),
            Err(RecipeError::BadEndpoint { .. })
        ));

        let mut recipe: Recipe = serde_yaml::from_str(minimal_yaml()).unwrap();
        recipe.query.limit = Some(20_000);
        assert!(matches!(recipe.validate(), Err(RecipeError::BadLimit { .. })));

        let mut recipe: Recipe = serde_yaml::from_str(minimal_yaml()).unwrap();
        recipe.name = "  ".to_string();
        assert!(matches!(recipe.validate(), Err(RecipeError::EmptyName)));
    }

    #[test]
    fn filter_op_symbols_round_trip() {
        let yaml = r#"
name: open-criticals
endpoint: /public/v0/findings
transforms:
  - filter: { column: severity, op: "==", value: critical }
  - filter: { column: status, op: "=in=", value: [open, triaged] }
"#;
        let recipe: Recipe = serde_yaml::from_str(yaml).unwrap();
        match &recipe.transforms[0] {
            TransformStep::Filter(spec) => assert_eq!(spec.op, FilterOp::Eq),
            other => panic!("expected filter, got {:?}", other),
        }
        match &recipe.transforms[1] {
            TransformStep::Filter(spec) => {
                assert_eq!(spec.op, FilterOp::In);
                assert!(spec.value.is_array());
            }
            other => panic!("expected filter, got {:?}", other),
        }
    }

    #[test]
    fn name_filter_matches_case_insensitive_substring() {
        let recipe: Recipe = serde_yaml::from_str(minimal_yaml()).unwrap();
        assert!(recipe.matches_filter(&["SEVERITY".to_string()]));
        assert!(recipe.matches_filter(&[]));
        assert!(!recipe.matches_filter(&["mttr".to_string()]));
    }

    #[test]
    fn unknown_chart_type_is_rejected_at_parse_time() {
        let yaml = r#"
name: heat
endpoint: /public/v0/findings
output:
  charts:
    - type: heatmap
      x: a
      y: b
"#;
        let parsed: Result<Recipe, _> = serde_yaml::from_str(yaml);
        assert!(parsed.is_err());
    }
}
