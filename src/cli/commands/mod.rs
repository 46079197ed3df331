//! CLI subcommand implementations

pub mod list_projects;
pub mod list_recipes;
pub mod list_versions;
pub mod periods;
pub mod run;
