//! Recipe-driven report generation for security scanning platforms
//!
//! YAML recipes describe which API endpoint to query, how to reshape the
//! records (flatten, filter, group, pivot, join, derive columns), and which
//! outputs to render (CSV, XLSX, HTML with charts). The engine fetches data
//! through a cached, retrying HTTP client, applies the transform pipeline,
//! and writes one report directory per recipe.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;
pub mod presentation;

pub use config::Config;
pub use logging::init_tracing;
