//! List the recipes available in the recipes directory

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::application::load_recipes;
use crate::cli::context::CliContext;
use crate::cli::exit_codes;
use crate::cli::output::print_table;

#[derive(Args, Debug)]
pub struct ListRecipesArgs {
    /// Recipes directory
    #[arg(long, short = 'r')]
    pub recipes: Option<PathBuf>,
}

pub async fn run(ctx: &CliContext, args: &ListRecipesArgs) -> Result<i32> {
    let dir = ctx.recipes_dir(args.recipes.as_deref());
    let recipes = match load_recipes(&dir) {
        Ok(recipes) => recipes,
        Err(err) => {
            eprintln!("Error: {}", err);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    if recipes.is_empty() {
        println!("No recipes found in {}", dir.display());
        return Ok(exit_codes::SUCCESS);
    }

    println!("Available recipes ({} found)\n", recipes.len());
    let rows: Vec<Vec<String>> = recipes
        .iter()
        .map(|recipe| {
            let formats: Vec<String> = recipe
                .output
                .formats
                .iter()
                .map(ToString::to_string)
                .collect();
            vec![
                recipe.name.clone(),
                recipe.endpoint.clone(),
                formats.join(","),
                recipe.description.clone(),
            ]
        })
        .collect();
    print_table(&["Name", "Endpoint", "Formats", "Description"], &rows);

    Ok(exit_codes::SUCCESS)
}
