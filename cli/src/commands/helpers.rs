use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use cookbook_core::models::Recipe;

pub(crate) fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Format a quantity without a trailing `.0` for whole numbers.
pub(crate) fn format_quantity(v: f64) -> String {
    let v = if v == 0.0 { 0.0 } else { v };
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v}")
    }
}

pub(crate) fn print_recipe_table(recipes: &[Recipe]) {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Type")]
        recipe_type: String,
        #[tabled(rename = "Portion")]
        portion: String,
        #[tabled(rename = "Ingredients")]
        ingredients: usize,
        #[tabled(rename = "Steps")]
        steps: usize,
        #[tabled(rename = "Edited")]
        edited: String,
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.id,
            name: truncate(&r.name, 30),
            recipe_type: truncate(&r.recipe_type, 15),
            portion: r.portion.as_ref().map_or("-".into(), |p| {
                format!("{} {}", format_quantity(p.value), p.measurement)
                    .trim()
                    .to_string()
            }),
            ingredients: r.ingredients.len(),
            steps: r.methods.len(),
            edited: r.last_edited_at.clone(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_recipe_detail(recipe: &Recipe) {
    let name = &recipe.name;
    let id = recipe.id;
    println!("=== {name} (#{id}) ===");
    if !recipe.recipe_type.is_empty() {
        println!("  Type: {}", recipe.recipe_type);
    }
    if !recipe.url.is_empty() {
        println!("  URL: {}", recipe.url);
    }
    if let Some(portion) = &recipe.portion {
        println!(
            "  Serves: {} {}",
            format_quantity(portion.value),
            portion.measurement
        );
    }
    if let Some(image) = &recipe.image {
        println!("  Image: {}", image.filename);
    }
    println!(
        "  Created: {}  |  Edited: {}",
        recipe.created_at, recipe.last_edited_at
    );

    println!("\n  INGREDIENTS:");
    if recipe.ingredients.is_empty() {
        println!("    (none)");
    }
    for ing in &recipe.ingredients {
        let qty = format_quantity(ing.value);
        let unit = &ing.measurement;
        let iname = &ing.name;
        println!("    {:>3}. {iname} - {qty} {unit}", ing.sort_order);
    }

    println!("\n  METHOD:");
    if recipe.methods.is_empty() {
        println!("    (none)");
    }
    for step in &recipe.methods {
        println!("    {:>3}. {}", step.sort_order, step.value);
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cookbook_core::models::IngredientDraft;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Pancakes", 10), "Pancakes");
        assert_eq!(truncate("Slow-cooked beef ragu", 10), "Slow-co...");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("Crème brûlée tart", 10), "Crème b...");
        assert_eq!(truncate("日本のカレーライス", 8), "日本のカレ...");
    }

    #[test]
    fn test_format_quantity() {
        assert_eq!(format_quantity(2.0), "2");
        assert_eq!(format_quantity(0.5), "0.5");
        assert_eq!(format_quantity(-0.0), "0");
    }

    #[test]
    fn test_json_error_escapes() {
        assert_eq!(
            json_error("Recipe \"x\" not found"),
            r#"{"error":"Recipe \"x\" not found"}"#
        );
    }

    #[test]
    fn test_read_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingredients.json");
        std::fs::write(&path, r#"[{"name":"Salt","value":1},{"id":4,"name":"Egg"}]"#).unwrap();

        let drafts: Vec<IngredientDraft> = read_json_file(&path).unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].id, 0);
        assert_eq!(drafts[1].id, 4);
    }

    #[test]
    fn test_read_json_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "not json").unwrap();

        let err = read_json_file::<Vec<IngredientDraft>>(&path).unwrap_err();
        assert!(format!("{err:#}").contains("broken.json"));
    }
}
