//! CSV output

use std::path::Path;

use serde_json::Value;

use crate::application::errors::RenderError;
use crate::domain::table::{cell_text, DataTable};

/// Write the table as a CSV file with a header row
pub fn write_csv(table: &DataTable, path: &Path) -> Result<(), RenderError> {
    let csv_err = |source| RenderError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(table.columns()).map_err(csv_err)?;

    for row in table.rows() {
        let record: Vec<String> = table
            .columns()
            .iter()
            .map(|column| cell_text(row.get(column).unwrap_or(&Value::Null)))
            .collect();
        writer.write_record(&record).map_err(csv_err)?;
    }

    writer.flush().map_err(|source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::transform::table_from_records;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn writes_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let table = table_from_records(&[
            json!({"severity": "critical", "count": 3.0}),
            json!({"severity": "low", "count": null}),
        ]);

        write_csv(&table, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "severity,count");
        assert_eq!(lines[1], "critical,3");
        // Null cells come out empty, not as the word "null"
        assert_eq!(lines[2], "low,");
    }

    #[test]
    fn quotes_cells_containing_commas() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let table = table_from_records(&[json!({"tags": "iot, firmware"})]);

        write_csv(&table, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"iot, firmware\""));
    }
}
