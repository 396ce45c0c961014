use anyhow::Result;
use std::process;

use cookbook_core::Error as CoreError;
use cookbook_core::db::Database;
use cookbook_core::models::{RecipeFields, RecipeQuery};

use super::helpers::{json_error, print_recipe_detail, print_recipe_table};

pub(crate) fn cmd_list(db: &Database, query: &RecipeQuery, json: bool) -> Result<()> {
    let recipes = db.list_recipes(query)?;
    if recipes.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No recipes found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }

    print_recipe_table(&recipes);
    Ok(())
}

pub(crate) fn cmd_show(db: &Database, id: i64, json: bool) -> Result<()> {
    let recipe = match db.get_recipe(id) {
        Ok(recipe) => recipe,
        Err(CoreError::NotFound(what)) => {
            let message = format!("{what} not found");
            if json {
                println!("{}", json_error(&message));
            } else {
                eprintln!("{message}");
            }
            process::exit(2);
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        print_recipe_detail(&recipe);
    }
    Ok(())
}

pub(crate) fn cmd_create(db: &Database, fields: &RecipeFields, json: bool) -> Result<()> {
    let recipe = db.create_recipe(fields)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let name = &recipe.name;
        let id = recipe.id;
        println!("Created recipe: {name} (id: {id})");
        println!("Add ingredients with: cookbook ingredients {id} <file.json>");
    }
    Ok(())
}

pub(crate) fn cmd_delete(db: &Database, id: i64, json: bool) -> Result<()> {
    if db.delete_recipe(id)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("Deleted recipe {id}");
        }
    } else {
        if json {
            println!("{}", json_error(&format!("Recipe {id} not found")));
        } else {
            eprintln!("Recipe {id} not found");
        }
        process::exit(2);
    }
    Ok(())
}
