//! Guards the recipe files shipped in recipes/ against grammar drift

use std::path::{Path, PathBuf};

use scanreport::application::load_recipes;
use scanreport::domain::recipe::{ChartType, OutputFormat, Recipe, TransformStep};

fn recipes_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("recipes")
}

fn shipped() -> Vec<Recipe> {
    load_recipes(&recipes_dir()).expect("shipped recipes should load")
}

#[test]
fn every_shipped_recipe_parses_and_validates() {
    let recipes = shipped();
    let names: Vec<&str> = recipes.iter().map(|r| r.name.as_str()).collect();
    // load_recipes skips files it cannot parse, so a short list means breakage
    assert_eq!(recipes.len(), 6, "loaded: {names:?}");

    for recipe in &recipes {
        if let Err(err) = recipe.validate() {
            panic!("{}: {err}", recipe.name);
        }
    }
}

#[test]
fn the_standard_reports_are_all_present() {
    let recipes = shipped();
    for expected in [
        "Component Risk Pareto",
        "Findings by Severity",
        "Mean Time to Resolve",
        "Monthly Findings Trend",
        "Open Issues by Project",
        "Project Findings Summary",
    ] {
        assert!(
            recipes.iter().any(|r| r.name == expected),
            "missing recipe {expected:?}"
        );
    }
}

#[test]
fn the_shipped_set_exercises_the_whole_transform_grammar() {
    let recipes = shipped();
    let steps: Vec<&TransformStep> = recipes.iter().flat_map(|r| &r.transforms).collect();

    assert!(steps.iter().any(|s| matches!(s, TransformStep::Flatten(_))));
    assert!(steps.iter().any(|s| matches!(s, TransformStep::Filter(_))));
    assert!(steps.iter().any(|s| matches!(s, TransformStep::GroupBy(_))));
    assert!(steps.iter().any(|s| matches!(s, TransformStep::Sort(_))));
    assert!(steps.iter().any(|s| matches!(s, TransformStep::Pivot(_))));
    assert!(steps.iter().any(|s| matches!(s, TransformStep::Select(_))));
    assert!(steps.iter().any(|s| matches!(s, TransformStep::Rename(_))));
    assert!(steps.iter().any(|s| matches!(s, TransformStep::Calc(_))));
    assert!(steps.iter().any(|s| matches!(s, TransformStep::Join(_))));
    assert!(steps.iter().any(|s| matches!(s, TransformStep::Limit(_))));
}

#[test]
fn charts_and_formats_cover_the_render_surface() {
    let recipes = shipped();
    let charts: Vec<ChartType> = recipes
        .iter()
        .flat_map(|r| r.output.charts.iter().map(|c| c.chart_type))
        .collect();

    assert!(charts.contains(&ChartType::Bar));
    assert!(charts.contains(&ChartType::Line));
    assert!(charts.contains(&ChartType::Pareto));

    let formats: Vec<OutputFormat> = recipes
        .iter()
        .flat_map(|r| r.output.formats.iter().copied())
        .collect();
    assert!(formats.contains(&OutputFormat::Csv));
    assert!(formats.contains(&OutputFormat::Xlsx));
    assert!(formats.contains(&OutputFormat::Html));
}

#[test]
fn period_placeholders_appear_in_every_main_filter() {
    for recipe in shipped() {
        let filter = recipe.query.filter.as_deref().unwrap_or_default();
        assert!(
            filter.contains("${start}") && filter.contains("${end}"),
            "{} should scope its query to the report period",
            recipe.name
        );
    }
}

#[test]
fn the_project_summary_joins_the_catalog_side_query() {
    let recipes = shipped();
    let summary = recipes
        .iter()
        .find(|r| r.name == "Project Findings Summary")
        .expect("summary recipe");

    assert!(summary.additional_queries.contains_key("projects"));
    let join = summary.transforms.iter().find_map(|s| match s {
        TransformStep::Join(spec) => Some(spec),
        _ => None,
    });
    let join = join.expect("summary recipe should join the catalog");
    assert_eq!(join.with, "projects");
    assert_eq!(join.right_on, "id");
}
