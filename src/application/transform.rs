//! Transform pipeline turning raw API records into report tables
//!
//! Steps run in recipe order over a `DataTable`. Every step is total over
//! messy input rows (missing fields, nulls, mixed types); errors are reserved
//! for recipe mistakes such as unknown columns or malformed aggregation specs.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::application::errors::TransformError;
use crate::domain::recipe::{
    CalcOp, CalcSpec, FilterOp, FilterSpec, GroupBySpec, JoinSpec, PivotSpec, RenameSpec,
    SelectSpec, SortOrder, SortSpec, TransformStep,
};
use crate::domain::table::{
    cell_number, cell_text, severity_rank, DataTable, Row, SEVERITY_PIVOT_ORDER,
};

/// Named side-query results that `join` steps can reference
pub type SideTables = HashMap<String, Vec<Value>>;

/// Build the initial table from raw API records, dropping non-object entries
pub fn table_from_records(records: &[Value]) -> DataTable {
    let rows: Vec<Row> = records
        .iter()
        .filter_map(|record| record.as_object().cloned())
        .collect();
    DataTable::from_records(rows)
}

/// Run a recipe's transform steps in order
pub fn apply_pipeline(
    mut table: DataTable,
    steps: &[TransformStep],
    side: &SideTables,
) -> Result<DataTable, TransformError> {
    for step in steps {
        table = apply_step(table, step, side)?;
        debug!(rows = table.len(), cols = table.columns().len(), "Applied transform step");
    }
    Ok(table)
}

fn apply_step(
    table: DataTable,
    step: &TransformStep,
    side: &SideTables,
) -> Result<DataTable, TransformError> {
    match step {
        TransformStep::Flatten(_) => Ok(flatten(table)),
        TransformStep::Filter(spec) => filter(table, spec),
        TransformStep::GroupBy(spec) => group_by(table, spec),
        TransformStep::Sort(spec) => sort(table, spec),
        TransformStep::Pivot(spec) => pivot(table, spec),
        TransformStep::Select(spec) => Ok(select(table, spec)),
        TransformStep::Rename(spec) => Ok(rename(table, spec)),
        TransformStep::Calc(spec) => Ok(calc(table, spec)),
        TransformStep::Join(spec) => join(table, spec, side),
        TransformStep::Limit(spec) => {
            let mut table = table;
            table.truncate(spec.rows);
            Ok(table)
        }
    }
}

/// Flatten nested objects into dotted columns. Arrays of scalars join with
/// `", "`; arrays holding objects serialize to compact JSON.
fn flatten(table: DataTable) -> DataTable {
    let rows: Vec<Row> = table
        .into_rows()
        .into_iter()
        .map(|row| {
            let mut flat = Row::new();
            for (key, value) in row {
                flatten_into(&key, value, &mut flat);
            }
            flat
        })
        .collect();
    DataTable::from_records(rows)
}

fn flatten_into(key: &str, value: Value, out: &mut Row) {
    match value {
        Value::Object(map) => {
            for (child_key, child) in map {
                flatten_into(&format!("{}.{}", key, child_key), child, out);
            }
        }
        Value::Array(items) => {
            let scalars_only = items.iter().all(|i| !i.is_object() && !i.is_array());
            let rendered = if scalars_only {
                items.iter().map(cell_text).collect::<Vec<_>>().join(", ")
            } else {
                Value::Array(items).to_string()
            };
            out.insert(key.to_string(), Value::String(rendered));
        }
        other => {
            out.insert(key.to_string(), other);
        }
    }
}

fn filter(table: DataTable, spec: &FilterSpec) -> Result<DataTable, TransformError> {
    require_column(&table, "filter", &spec.column)?;

    if spec.op == FilterOp::In && !spec.value.is_array() {
        return Err(TransformError::InValueNotList {
            column: spec.column.clone(),
        });
    }

    let columns = table.columns().to_vec();
    let rows: Vec<Row> = table
        .into_rows()
        .into_iter()
        .filter(|row| {
            let cell = row.get(&spec.column).unwrap_or(&Value::Null);
            cell_matches(cell, spec.op, &spec.value)
        })
        .collect();
    Ok(DataTable::new(columns, rows))
}

fn cell_matches(cell: &Value, op: FilterOp, target: &Value) -> bool {
    match op {
        FilterOp::Eq => values_equal(cell, target),
        FilterOp::Ne => !values_equal(cell, target),
        FilterOp::In => match target {
            Value::Array(options) => options.iter().any(|option| values_equal(cell, option)),
            _ => false,
        },
        FilterOp::Gt => compare_values(cell, target) == Ordering::Greater,
        FilterOp::Ge => compare_values(cell, target) != Ordering::Less,
        FilterOp::Lt => compare_values(cell, target) == Ordering::Less,
        FilterOp::Le => compare_values(cell, target) != Ordering::Greater,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (cell_number(a), cell_number(b)) {
        return x == y;
    }
    cell_text(a) == cell_text(b)
}

/// Numeric comparison when both sides parse as numbers, else lexicographic
fn compare_values(a: &Value, b: &Value) -> Ordering {
    if let (Some(x), Some(y)) = (cell_number(a), cell_number(b)) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    cell_text(a).cmp(&cell_text(b))
}

#[derive(Clone, Copy, PartialEq)]
enum AggKind {
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

struct Aggregation {
    kind: AggKind,
    column: String,
    output: String,
}

impl Aggregation {
    fn parse(spec: &str) -> Result<Self, TransformError> {
        let (head, column) = match spec.split_once(':') {
            Some((head, column)) => (head.trim(), column.trim()),
            None => (spec.trim(), ""),
        };

        let (kind, prefix) = match head.to_ascii_uppercase().as_str() {
            "COUNT" => (AggKind::Count, "count"),
            "COUNT_DISTINCT" => (AggKind::CountDistinct, "count_distinct"),
            "SUM" => (AggKind::Sum, "sum"),
            "AVG" => (AggKind::Avg, "avg"),
            "MIN" => (AggKind::Min, "min"),
            "MAX" => (AggKind::Max, "max"),
            _ => {
                return Err(TransformError::BadAggregation {
                    spec: spec.to_string(),
                    detail: "unknown function".to_string(),
                });
            }
        };

        if kind == AggKind::Count {
            if !column.is_empty() {
                return Err(TransformError::BadAggregation {
                    spec: spec.to_string(),
                    detail: "COUNT takes no column".to_string(),
                });
            }
            return Ok(Self {
                kind,
                column: String::new(),
                output: "count".to_string(),
            });
        }

        if column.is_empty() {
            return Err(TransformError::BadAggregation {
                spec: spec.to_string(),
                detail: "missing column, expected e.g. SUM:risk".to_string(),
            });
        }

        Ok(Self {
            kind,
            column: column.to_string(),
            output: format!("{}_{}", prefix, column),
        })
    }

    fn evaluate(&self, rows: &[&Row]) -> Value {
        match self.kind {
            AggKind::Count => Value::from(rows.len() as u64),
            AggKind::CountDistinct => {
                let distinct: HashSet<String> = rows
                    .iter()
                    .filter_map(|row| row.get(&self.column))
                    .filter(|cell| !cell.is_null())
                    .map(cell_text)
                    .collect();
                Value::from(distinct.len() as u64)
            }
            AggKind::Sum => Value::from(self.total(rows)),
            AggKind::Avg => {
                if rows.is_empty() {
                    Value::from(0.0)
                } else {
                    Value::from(round2(self.total(rows) / rows.len() as f64))
                }
            }
            AggKind::Min => Value::from(
                self.present(rows)
                    .min_by(f64::total_cmp)
                    .unwrap_or(0.0),
            ),
            AggKind::Max => Value::from(
                self.present(rows)
                    .max_by(f64::total_cmp)
                    .unwrap_or(0.0),
            ),
        }
    }

    /// Sum treating missing or non-numeric cells as 0
    fn total(&self, rows: &[&Row]) -> f64 {
        rows.iter()
            .map(|row| row.get(&self.column).and_then(cell_number).unwrap_or(0.0))
            .sum()
    }

    fn present<'a>(&'a self, rows: &'a [&Row]) -> impl Iterator<Item = f64> + 'a {
        rows.iter()
            .filter_map(|row| row.get(&self.column).and_then(cell_number))
    }
}

fn group_by(table: DataTable, spec: &GroupBySpec) -> Result<DataTable, TransformError> {
    let aggregations: Vec<Aggregation> = spec
        .aggregations
        .iter()
        .map(|s| Aggregation::parse(s))
        .collect::<Result<_, _>>()?;

    // Group in first-seen key order
    let mut groups: Vec<(Vec<String>, Vec<&Row>)> = Vec::new();
    let mut index: HashMap<Vec<String>, usize> = HashMap::new();
    for row in table.rows() {
        let key: Vec<String> = spec.by.iter().map(|col| group_key_text(row, col)).collect();
        match index.get(&key) {
            Some(&slot) => groups[slot].1.push(row),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![row]));
            }
        }
    }

    let mut out_rows = Vec::with_capacity(groups.len());
    for (key, members) in &groups {
        let mut row = Row::new();
        for (column, value) in spec.by.iter().zip(key) {
            row.insert(column.clone(), Value::String(value.clone()));
        }
        for agg in &aggregations {
            row.insert(agg.output.clone(), agg.evaluate(members));
        }
        out_rows.push(row);
    }

    let mut columns = spec.by.clone();
    columns.extend(aggregations.iter().map(|a| a.output.clone()));
    Ok(DataTable::new(columns, out_rows))
}

/// Group key for a row; absent or null cells group under "Unknown"
fn group_key_text(row: &Row, column: &str) -> String {
    match row.get(column) {
        None | Some(Value::Null) => "Unknown".to_string(),
        Some(value) => cell_text(value),
    }
}

fn sort(mut table: DataTable, spec: &SortSpec) -> Result<DataTable, TransformError> {
    require_column(&table, "sort", &spec.by)?;
    let by = spec.by.clone();

    match spec.order {
        SortOrder::Severity => table
            .rows_mut()
            .sort_by_key(|row| severity_rank(&group_key_text(row, &by))),
        SortOrder::Asc => table
            .rows_mut()
            .sort_by(|a, b| compare_cells(a.get(&by), b.get(&by))),
        SortOrder::Desc => table
            .rows_mut()
            .sort_by(|a, b| compare_cells(b.get(&by), a.get(&by))),
    }
    Ok(table)
}

/// Missing and null cells sort after real values
fn compare_cells(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (non_null(a), non_null(b)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => compare_values(x, y),
    }
}

fn non_null(cell: Option<&Value>) -> Option<&Value> {
    cell.filter(|v| !v.is_null())
}

fn pivot(table: DataTable, spec: &PivotSpec) -> Result<DataTable, TransformError> {
    require_column(&table, "pivot", &spec.index)?;
    require_column(&table, "pivot", &spec.columns)?;
    require_column(&table, "pivot", &spec.values)?;

    let mut row_keys: Vec<String> = Vec::new();
    let mut col_keys: Vec<String> = Vec::new();
    let mut cells: HashMap<(String, String), f64> = HashMap::new();

    for row in table.rows() {
        let row_key = group_key_text(row, &spec.index);
        let col_key = group_key_text(row, &spec.columns);
        let value = row.get(&spec.values).and_then(cell_number).unwrap_or(0.0);

        if !row_keys.contains(&row_key) {
            row_keys.push(row_key.clone());
        }
        if !col_keys.contains(&col_key) {
            col_keys.push(col_key.clone());
        }
        *cells.entry((row_key, col_key)).or_insert(0.0) += value;
    }

    row_keys.sort();
    col_keys = if spec.columns == "severity" {
        // Fixed severity order, any unexpected labels after
        let mut ordered: Vec<String> = SEVERITY_PIVOT_ORDER
            .iter()
            .map(|s| s.to_string())
            .filter(|s| col_keys.contains(s))
            .collect();
        let mut rest: Vec<String> = col_keys
            .into_iter()
            .filter(|k| !SEVERITY_PIVOT_ORDER.contains(&k.as_str()))
            .collect();
        rest.sort();
        ordered.extend(rest);
        ordered
    } else {
        col_keys.sort();
        col_keys
    };

    let mut rows = Vec::with_capacity(row_keys.len());
    for row_key in &row_keys {
        let mut row = Row::new();
        row.insert(spec.index.clone(), Value::String(row_key.clone()));
        for col_key in &col_keys {
            let value = cells
                .get(&(row_key.clone(), col_key.clone()))
                .copied()
                .unwrap_or(0.0);
            row.insert(col_key.clone(), Value::from(value));
        }
        rows.push(row);
    }

    let mut columns = vec![spec.index.clone()];
    columns.extend(col_keys);
    Ok(DataTable::new(columns, rows))
}

/// Keep the listed columns in the given order, skipping ones that don't exist
fn select(table: DataTable, spec: &SelectSpec) -> DataTable {
    let keep: Vec<String> = spec
        .columns
        .iter()
        .filter(|c| table.has_column(c))
        .cloned()
        .collect();

    let rows: Vec<Row> = table
        .into_rows()
        .into_iter()
        .map(|mut row| {
            let mut out = Row::new();
            for column in &keep {
                if let Some(value) = row.remove(column) {
                    out.insert(column.clone(), value);
                }
            }
            out
        })
        .collect();
    DataTable::new(keep, rows)
}

fn rename(table: DataTable, spec: &RenameSpec) -> DataTable {
    let columns: Vec<String> = table
        .columns()
        .iter()
        .map(|c| spec.map.get(c).cloned().unwrap_or_else(|| c.clone()))
        .collect();

    let rows: Vec<Row> = table
        .into_rows()
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(key, value)| match spec.map.get(&key) {
                    Some(new_key) => (new_key.clone(), value),
                    None => (key, value),
                })
                .collect()
        })
        .collect();
    DataTable::new(columns, rows)
}

fn calc(mut table: DataTable, spec: &CalcSpec) -> DataTable {
    for row in table.rows_mut().iter_mut() {
        let value = match &spec.op {
            CalcOp::MonthYear { source } => month_year(row.get(source)),
            CalcOp::StatusCase { source } => status_case(row.get(source)),
            CalcOp::DatediffDays { from, to } => datediff_days(row, from, to),
        };
        row.insert(spec.name.clone(), value);
    }
    table.ensure_column(&spec.name);
    table
}

/// `YYYY-MM` prefix of an ISO date string, null when the cell isn't one
fn month_year(cell: Option<&Value>) -> Value {
    match cell {
        Some(Value::String(s)) => s
            .get(..7)
            .map(|prefix| Value::String(prefix.to_string()))
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Collapse the platform's raw finding statuses into three buckets
fn status_case(cell: Option<&Value>) -> Value {
    let status = match cell {
        Some(Value::String(s)) => s.to_ascii_uppercase(),
        _ => String::new(),
    };
    let label = match status.as_str() {
        "RESOLVED" | "RESOLVED_WITH_PEDIGREE" => "Resolved",
        "NOT_AFFECTED" | "FALSE_POSITIVE" => "Triaged",
        _ => "Open",
    };
    Value::String(label.to_string())
}

/// Whole days from one date column to another; `to: now` measures to today
fn datediff_days(row: &Row, from: &str, to: &str) -> Value {
    let Some(from_dt) = row.get(from).and_then(value_datetime) else {
        return Value::Null;
    };
    let to_dt = if to.eq_ignore_ascii_case("now") {
        Utc::now().naive_utc()
    } else {
        match row.get(to).and_then(value_datetime) {
            Some(dt) => dt,
            None => return Value::Null,
        }
    };
    Value::from((to_dt - from_dt).num_days())
}

fn value_datetime(cell: &Value) -> Option<NaiveDateTime> {
    let text = cell.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn join(table: DataTable, spec: &JoinSpec, side: &SideTables) -> Result<DataTable, TransformError> {
    let source = side
        .get(&spec.with)
        .ok_or_else(|| TransformError::UnknownJoinSource {
            name: spec.with.clone(),
        })?;

    // First record per key wins, matching a lookup-table join
    let mut right: HashMap<String, &Value> = HashMap::new();
    for record in source {
        if let Some(key) = path_value(record, &spec.right_on).filter(|v| !v.is_null()) {
            right.entry(cell_text(key)).or_insert(record);
        }
    }

    let mut columns = table.columns().to_vec();
    for new_name in spec.select.values() {
        if !columns.iter().any(|c| c == new_name) {
            columns.push(new_name.clone());
        }
    }

    let rows: Vec<Row> = table
        .into_rows()
        .into_iter()
        .map(|mut row| {
            let matched = row
                .get(&spec.left_on)
                .filter(|v| !v.is_null())
                .map(cell_text)
                .and_then(|key| right.get(&key).copied());
            for (right_column, new_name) in &spec.select {
                let value = matched
                    .and_then(|record| path_value(record, right_column))
                    .cloned()
                    .unwrap_or(Value::Null);
                row.insert(new_name.clone(), value);
            }
            row
        })
        .collect();

    Ok(DataTable::new(columns, rows))
}

/// Walk a dotted path into nested objects
fn path_value<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

fn require_column(
    table: &DataTable,
    step: &'static str,
    column: &str,
) -> Result<(), TransformError> {
    if table.columns().is_empty() || table.has_column(column) {
        Ok(())
    } else {
        Err(TransformError::UnknownColumn {
            step,
            column: column.to_string(),
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
