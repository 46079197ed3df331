//! Application layer: recipe loading, the transform pipeline, and the engine

pub mod engine;
pub mod errors;
pub mod recipes;
pub mod transform;

pub use engine::{sanitize_filename, ReportEngine, RunOptions};
pub use errors::{
    ApiError, CacheError, EngineError, RecipeLoadError, RenderError, TransformError,
};
pub use recipes::{load_recipes, select_recipes};
pub use transform::{apply_pipeline, table_from_records, SideTables};
