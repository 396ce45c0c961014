use anyhow::{Context, Result, bail};
use std::path::Path;

use cookbook_core::db::Database;
use cookbook_core::models::{ChildDraft, IngredientDraft, IngredientFields, RecipeFields};

struct ParsedCooklang {
    title: Option<String>,
    servings: Option<f64>,
    ingredients: Vec<IngredientDraft>,
}

fn parse_cooklang(input: &str) -> Result<ParsedCooklang> {
    let (recipe_data, _report) = cooklang::parse(input)
        .into_result()
        .map_err(|e| anyhow::anyhow!("Failed to parse Cooklang file: {e}"))?;

    let converter = cooklang::Converter::default();
    let ingredients = recipe_data
        .group_ingredients(&converter)
        .iter()
        .map(|gi| cooklang_ingredient_to_draft(gi))
        .collect();

    Ok(ParsedCooklang {
        title: recipe_data.metadata.title().map(String::from),
        servings: recipe_data
            .metadata
            .servings()
            .and_then(|s| s.as_number().map(f64::from)),
        ingredients,
    })
}

fn cooklang_ingredient_to_draft(
    gi: &cooklang::ingredient_list::GroupedIngredient<'_>,
) -> IngredientDraft {
    // Only the first quantity of a grouped ingredient is kept
    let (value, measurement) =
        gi.quantity
            .iter()
            .next()
            .map_or((0.0, String::new()), |qty: &cooklang::Quantity| {
                let unit = qty.unit().unwrap_or_default();
                match qty.value() {
                    cooklang::Value::Number(n) => (n.value(), unit.to_string()),
                    cooklang::Value::Range { start, .. } => (start.value(), unit.to_string()),
                    cooklang::Value::Text(t) => {
                        (0.0, format!("{t} {unit}").trim().to_string())
                    }
                }
            });

    ChildDraft::new(IngredientFields {
        name: gi.ingredient.display_name().to_string(),
        measurement,
        value,
    })
}

pub(crate) fn cmd_import(
    db: &Database,
    file: &Path,
    name_override: Option<String>,
    portions_override: Option<f64>,
    json: bool,
) -> Result<()> {
    let input = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let parsed = parse_cooklang(&input)?;

    if parsed.ingredients.is_empty() {
        bail!("No ingredients found in recipe");
    }

    let name = name_override
        .or(parsed.title)
        .or_else(|| file.file_stem().and_then(|s| s.to_str()).map(String::from))
        .context("Could not determine recipe name. Use --name to specify one")?;

    let portion = portions_override
        .or(parsed.servings)
        .map(|servings| (servings, "servings"));
    let recipe = db.import_recipe(
        &RecipeFields {
            name,
            ..RecipeFields::default()
        },
        portion,
        &parsed.ingredients,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let rname = &recipe.name;
        let id = recipe.id;
        let ing_count = recipe.ingredients.len();
        println!("Imported recipe: {rname} (id: {id}, {ing_count} ingredients)");
    }

    Ok(())
}
