//! Offline data source backed by a saved JSON payload

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{PlatformDataSource, PROJECTS_ENDPOINT};
use crate::application::errors::{ApiError, EngineError};
use crate::domain::recipe::QueryParams;

/// Serves recipe queries from a JSON file instead of the API.
///
/// The file is either a bare array, which answers every endpoint with the
/// same rows, or an object mapping endpoint paths to arrays. Query parameters
/// are ignored; the file's rows stand in for whatever the query would return.
#[derive(Debug)]
pub struct FileSource {
    source: String,
    tables: HashMap<String, Vec<Value>>,
    fallback: Option<Vec<Value>>,
}

impl FileSource {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let source = path.display().to_string();
        let body = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&body).map_err(|source_err| EngineError::Parse {
            endpoint: source.clone(),
            source: source_err,
        })?;

        match value {
            Value::Array(rows) => {
                debug!(file = %source, rows = rows.len(), "Loaded data file (bare array)");
                Ok(Self {
                    source,
                    tables: HashMap::new(),
                    fallback: Some(rows),
                })
            }
            Value::Object(map) => {
                let mut tables = HashMap::new();
                for (endpoint, rows) in map {
                    let rows = match rows {
                        Value::Array(rows) => rows,
                        single => vec![single],
                    };
                    tables.insert(normalize(&endpoint), rows);
                }
                debug!(file = %source, endpoints = tables.len(), "Loaded data file");
                Ok(Self {
                    source,
                    tables,
                    fallback: None,
                })
            }
            other => Err(ApiError::UnexpectedShape {
                endpoint: source,
                detail: format!(
                    "data file must be an array or an endpoint map, got {}",
                    match other {
                        Value::Null => "null",
                        Value::Bool(_) => "a boolean",
                        Value::Number(_) => "a number",
                        Value::String(_) => "a string",
                        _ => "something else",
                    }
                ),
            }
            .into()),
        }
    }

    fn rows_for(&self, endpoint: &str) -> Result<Vec<Value>, EngineError> {
        if let Some(rows) = self.tables.get(&normalize(endpoint)) {
            return Ok(rows.clone());
        }
        if let Some(rows) = &self.fallback {
            return Ok(rows.clone());
        }
        Err(ApiError::UnexpectedShape {
            endpoint: endpoint.to_string(),
            detail: format!("data file {} has no entry for this endpoint", self.source),
        }
        .into())
    }
}

#[async_trait]
impl PlatformDataSource for FileSource {
    async fn fetch_all(
        &self,
        endpoint: &str,
        _params: &QueryParams,
    ) -> Result<Vec<Value>, EngineError> {
        self.rows_for(endpoint)
    }

    async fn list_projects(&self) -> Result<Vec<Value>, EngineError> {
        self.rows_for(PROJECTS_ENDPOINT)
    }

    async fn list_versions(&self, project_id: &str) -> Result<Vec<Value>, EngineError> {
        self.rows_for(&format!("{}/{}/versions", PROJECTS_ENDPOINT, project_id))
    }

    async fn test_connection(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Endpoint keys in the file may omit the leading slash
fn normalize(endpoint: &str) -> String {
    format!("/{}", endpoint.trim_matches('/'))
}
