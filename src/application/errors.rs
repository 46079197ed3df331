//! Application error types shared across layers
//!
//! Library code returns these typed errors; only the CLI boundary collapses
//! them into anyhow reports and exit codes.

use std::path::PathBuf;

use crate::domain::period::PeriodError;
use crate::domain::recipe::RecipeError;

/// Errors talking to the scan platform API
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Rate limited by the platform")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Authentication failed (HTTP {status}); check the API token")]
    Authentication { status: u16 },

    #[error("Unexpected response shape from {endpoint}: {detail}")]
    UnexpectedShape { endpoint: String, detail: String },
}

/// Cache and progress checkpoint store errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache entry at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Transform pipeline errors; these fail one recipe, never the whole run
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("{step} step references unknown column '{column}'")]
    UnknownColumn { step: &'static str, column: String },

    #[error("Bad aggregation spec '{spec}': {detail}")]
    BadAggregation { spec: String, detail: String },

    #[error("Join references unknown additional query '{name}'")]
    UnknownJoinSource { name: String },

    #[error("Filter '=in=' on column '{column}' needs a list value")]
    InValueNotList { column: String },
}

/// Report renderer errors
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error writing {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("XLSX error writing {path}: {source}")]
    Xlsx {
        path: PathBuf,
        #[source]
        source: rust_xlsxwriter::XlsxError,
    },
}

/// Recipe discovery and parsing errors
#[derive(Debug, thiserror::Error)]
pub enum RecipeLoadError {
    #[error("Recipes directory {path} does not exist")]
    MissingDir { path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid recipe in {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: RecipeError,
    },

    #[error("No recipes matched {filters:?}; available: {available:?}")]
    NoneSelected {
        filters: Vec<String>,
        available: Vec<String>,
    },
}

/// Top-level error for engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Recipe error: {0}")]
    Recipes(#[from] RecipeLoadError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Period error: {0}")]
    Period(#[from] PeriodError),

    #[error("Failed to parse response from {endpoint}: {source}")]
    Parse {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No data returned for recipe '{recipe}'; nothing to render")]
    NoData { recipe: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
