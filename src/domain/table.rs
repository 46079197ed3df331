//! Tabular data model shared by transforms and renderers

use serde_json::{Map, Value};

/// One table row: column name to JSON value
pub type Row = Map<String, Value>;

/// Column-ordered table of JSON values.
///
/// Raw API records become a `DataTable` via [`DataTable::from_records`];
/// every transform consumes and produces one, and all renderers read the
/// same final table. Column order is explicit and survives the whole
/// pipeline, so reports come out with stable layouts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl DataTable {
    /// Create a table with an explicit column order
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Build a table from raw records, taking columns in first-seen order
    pub fn from_records(records: Vec<Row>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self {
            columns,
            rows: records,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Values of one column in row order; missing cells yield `Value::Null`
    pub fn column_values(&self, name: &str) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| row.get(name).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Append a column if it is not present yet
    pub fn ensure_column(&mut self, name: &str) {
        if !self.has_column(name) {
            self.columns.push(name.to_string());
        }
    }

    pub fn rows_mut(&mut self) -> &mut Vec<Row> {
        &mut self.rows
    }

    /// Replace the column list, keeping row data untouched
    pub fn set_columns(&mut self, columns: Vec<String>) {
        self.columns = columns;
    }

    pub fn truncate(&mut self, rows: usize) {
        self.rows.truncate(rows);
    }
}

/// Render a cell for CSV/XLSX output: null is empty, whole floats drop the
/// fraction, everything else uses its JSON display form without quotes.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    return format!("{}", f as i64);
                }
            }
            n.to_string()
        }
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Numeric view of a cell: numbers pass through, numeric strings parse,
/// anything else is `None`.
pub fn cell_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Severity rank for sorting: critical first, unknown values last
pub fn severity_rank(value: &str) -> u8 {
    match value.to_ascii_lowercase().as_str() {
        "critical" => 0,
        "high" => 1,
        "medium" => 2,
        "low" => 3,
        _ => 99,
    }
}

/// Column order used when pivoting on severity
pub const SEVERITY_PIVOT_ORDER: [&str; 4] = ["low", "medium", "high", "critical"];
