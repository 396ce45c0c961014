use anyhow::{Result, bail};
use std::path::Path;
use std::process;

use cookbook_core::db::Database;
use cookbook_core::models::{IngredientDraft, MethodDraft, Recipe};

use super::helpers::{format_quantity, json_error, read_json_file};

/// Print the updated recipe, or exit with status 2 when the recipe was
/// missing.
fn report(recipe: Option<Recipe>, recipe_id: i64, json: bool, summary: &str) -> Result<()> {
    let Some(recipe) = recipe else {
        if json {
            println!("{}", json_error(&format!("Recipe {recipe_id} not found")));
        } else {
            eprintln!("Recipe {recipe_id} not found");
        }
        process::exit(2);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let name = &recipe.name;
        println!("{name}: {summary}");
    }
    Ok(())
}

pub(crate) fn cmd_ingredients(
    db: &Database,
    recipe_id: i64,
    file: &Path,
    json: bool,
) -> Result<()> {
    let drafts: Vec<IngredientDraft> = read_json_file(file)?;
    let recipe = db.reconcile_ingredients(recipe_id, &drafts)?;
    let summary = recipe.as_ref().map_or(String::new(), |r| {
        format!("{} ingredients", r.ingredients.len())
    });
    report(recipe, recipe_id, json, &summary)
}

pub(crate) fn cmd_methods(db: &Database, recipe_id: i64, file: &Path, json: bool) -> Result<()> {
    let drafts: Vec<MethodDraft> = read_json_file(file)?;
    let recipe = db.reconcile_methods(recipe_id, &drafts)?;
    let summary = recipe
        .as_ref()
        .map_or(String::new(), |r| format!("{} steps", r.methods.len()));
    report(recipe, recipe_id, json, &summary)
}

pub(crate) fn cmd_portion(
    db: &Database,
    recipe_id: i64,
    value: f64,
    measurement: &str,
    json: bool,
) -> Result<()> {
    if value <= 0.0 {
        bail!("Portion must be greater than 0");
    }
    let recipe = db.set_portion(recipe_id, value, measurement)?;
    let summary = format!("serves {} {measurement}", format_quantity(value));
    report(recipe, recipe_id, json, &summary)
}
