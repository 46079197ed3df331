//! Recipe discovery and loading

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::application::errors::RecipeLoadError;
use crate::domain::Recipe;

/// Load every valid recipe under `dir`, sorted by file path.
///
/// Files that fail to parse or validate are skipped with a warning so one
/// broken recipe cannot take down a whole batch run.
pub fn load_recipes(dir: &Path) -> Result<Vec<Recipe>, RecipeLoadError> {
    if !dir.is_dir() {
        return Err(RecipeLoadError::MissingDir {
            path: dir.to_path_buf(),
        });
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_yaml(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();

    let mut recipes = Vec::new();
    for path in files {
        match load_recipe_file(&path) {
            Ok(recipe) => {
                debug!(path = %path.display(), name = %recipe.name, "Loaded recipe");
                recipes.push(recipe);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping invalid recipe"),
        }
    }
    Ok(recipes)
}

/// Parse and validate a single recipe file
pub fn load_recipe_file(path: &Path) -> Result<Recipe, RecipeLoadError> {
    let body = fs::read_to_string(path).map_err(|source| RecipeLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let recipe: Recipe = serde_yaml::from_str(&body).map_err(|source| RecipeLoadError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    recipe
        .validate()
        .map_err(|source| RecipeLoadError::Invalid {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(recipe)
}

/// Keep the recipes whose names match any of the filter terms.
/// No terms selects everything; no matches is an error listing what exists.
pub fn select_recipes(
    recipes: Vec<Recipe>,
    filters: &[String],
) -> Result<Vec<Recipe>, RecipeLoadError> {
    if filters.is_empty() {
        return Ok(recipes);
    }
    let available: Vec<String> = recipes.iter().map(|r| r.name.clone()).collect();
    let selected: Vec<Recipe> = recipes
        .into_iter()
        .filter(|r| r.matches_filter(filters))
        .collect();
    if selected.is_empty() {
        return Err(RecipeLoadError::NoneSelected {
            filters: filters.to_vec(),
            available,
        });
    }
    Ok(selected)
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}
