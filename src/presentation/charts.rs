//! Chart construction for the HTML renderer
//!
//! Each `ChartSpec` becomes a `plotly::Plot` fed from two table columns:
//! `x` supplies the labels and `y` the values. Non-numeric y cells chart
//! as zero rather than breaking the trace.

use std::cmp::Ordering;

use plotly::common::{AxisSide, Mode};
use plotly::layout::{Axis, Layout};
use plotly::{Bar, Pie, Plot, Scatter};
use serde_json::Value;

use crate::domain::recipe::{ChartSpec, ChartType};
use crate::domain::table::{cell_number, cell_text, DataTable};

pub fn build_chart(spec: &ChartSpec, table: &DataTable) -> Plot {
    let labels = text_column(table, &spec.x);
    let values = number_column(table, &spec.y);

    let mut plot = Plot::new();
    let mut layout = Layout::new();
    if let Some(title) = &spec.title {
        layout = layout.title(title.as_str());
    }

    match spec.chart_type {
        ChartType::Line => {
            plot.add_trace(
                Scatter::new(labels, values)
                    .mode(Mode::Lines)
                    .name(&spec.y),
            );
        }
        ChartType::Bar => {
            plot.add_trace(Bar::new(labels, values).name(&spec.y));
        }
        ChartType::Scatter => {
            plot.add_trace(
                Scatter::new(labels, values)
                    .mode(Mode::Markers)
                    .name(&spec.y),
            );
        }
        ChartType::Pie => {
            plot.add_trace(Pie::new(values).labels(labels));
        }
        ChartType::Pareto => {
            let (labels, values, cumulative) = pareto_series(labels, values);
            plot.add_trace(Bar::new(labels.clone(), values).name(&spec.y));
            plot.add_trace(
                Scatter::new(labels, cumulative)
                    .mode(Mode::LinesMarkers)
                    .name("Cumulative %")
                    .y_axis("y2"),
            );
            layout = layout.y_axis(Axis::new().title(spec.y.as_str())).y_axis2(
                Axis::new()
                    .title("Cumulative %")
                    .overlaying("y")
                    .side(AxisSide::Right)
                    .range(vec![0.0, 100.0]),
            );
        }
    }

    plot.set_layout(layout);
    plot
}

fn text_column(table: &DataTable, column: &str) -> Vec<String> {
    table
        .rows()
        .iter()
        .map(|row| cell_text(row.get(column).unwrap_or(&Value::Null)))
        .collect()
}

fn number_column(table: &DataTable, column: &str) -> Vec<f64> {
    table
        .rows()
        .iter()
        .map(|row| row.get(column).and_then(cell_number).unwrap_or(0.0))
        .collect()
}

/// Bars sorted largest-first plus the running share of the total
fn pareto_series(labels: Vec<String>, values: Vec<f64>) -> (Vec<String>, Vec<f64>, Vec<f64>) {
    let mut pairs: Vec<(String, f64)> = labels.into_iter().zip(values).collect();
    pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let total: f64 = pairs.iter().map(|(_, v)| v).sum();
    let mut running = 0.0;
    let cumulative: Vec<f64> = pairs
        .iter()
        .map(|(_, value)| {
            running += value;
            if total > 0.0 {
                running / total * 100.0
            } else {
                0.0
            }
        })
        .collect();

    let (labels, values) = pairs.into_iter().unzip();
    (labels, values, cumulative)
}
