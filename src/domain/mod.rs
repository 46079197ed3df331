//! Domain Layer - Core business logic and entities
//!
//! This module contains the report-domain models: recipes, tabular data,
//! reporting periods, and run outcomes.

pub mod period;
pub mod recipe;
pub mod report;
pub mod table;

pub use period::ReportPeriod;
pub use recipe::Recipe;
pub use table::DataTable;
