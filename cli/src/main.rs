mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_create, cmd_delete, cmd_import, cmd_ingredients, cmd_list, cmd_methods, cmd_portion,
    cmd_show,
};
use crate::config::Config;
use cookbook_core::db::Database;
use cookbook_core::models::{RecipeFields, RecipeQuery, SortKey};

#[derive(Parser)]
#[command(
    name = "cookbook",
    version,
    about = "A local-first recipe book with a REST API"
)]
struct Cli {
    /// Path to the database file (default: per-user data directory)
    #[arg(long, global = true, env = "COOKBOOK_DB", value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
    /// List recipes
    List {
        /// Only recipes whose name contains this text
        #[arg(short, long)]
        search: Option<String>,
        /// Sort key: name, url, createdAt, lastEditedAt, type, sortOrder, portion
        #[arg(long, default_value = "sortOrder", value_parser = SortKey::ALL)]
        sort: String,
        /// Sort direction: asc or desc
        #[arg(long, default_value = "desc")]
        dir: String,
        /// Only recipes using one of these ingredients (repeatable)
        #[arg(short, long = "ingredient", value_name = "NAME")]
        ingredients: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe with its ingredients and method
    Show {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a new recipe
    Create {
        /// Recipe name
        name: String,
        /// Source URL
        #[arg(long, default_value = "")]
        url: String,
        /// Category (e.g. "Dinner")
        #[arg(long = "type", default_value = "")]
        recipe_type: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe and everything attached to it
    Delete {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Merge a JSON list of ingredients into a recipe
    Ingredients {
        /// Recipe ID
        recipe_id: i64,
        /// JSON file with an array of ingredients ({"id", "name", "measurement", "value", "sortOrder"})
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Merge a JSON list of method steps into a recipe
    Methods {
        /// Recipe ID
        recipe_id: i64,
        /// JSON file with an array of steps ({"id", "value", "sortOrder"})
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set how much a recipe makes
    Portion {
        /// Recipe ID
        recipe_id: i64,
        /// Amount (e.g. 4)
        value: f64,
        /// Unit (e.g. "servings", "slices")
        measurement: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a recipe from a Cooklang (.cook) file
    Import {
        /// Path to the .cook file
        file: PathBuf,
        /// Recipe name override (defaults to metadata title or filename)
        #[arg(long)]
        name: Option<String>,
        /// Portions override (defaults to metadata servings)
        #[arg(long)]
        portions: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.db)?;
    let db = Database::open(&config.db_path)?;

    match cli.command {
        Commands::Serve { port, bind } => server::start_server(db, port, &bind).await,
        Commands::List {
            search,
            sort,
            dir,
            ingredients,
            json,
        } => {
            let query = RecipeQuery {
                search: search.filter(|s| !s.trim().is_empty()),
                sort_key: sort.parse()?,
                direction: dir.parse()?,
                ingredient_names: ingredients,
            };
            cmd_list(&db, &query, json)
        }
        Commands::Show { id, json } => cmd_show(&db, id, json),
        Commands::Create {
            name,
            url,
            recipe_type,
            json,
        } => cmd_create(
            &db,
            &RecipeFields {
                name,
                url,
                recipe_type,
            },
            json,
        ),
        Commands::Delete { id, json } => cmd_delete(&db, id, json),
        Commands::Ingredients {
            recipe_id,
            file,
            json,
        } => cmd_ingredients(&db, recipe_id, &file, json),
        Commands::Methods {
            recipe_id,
            file,
            json,
        } => cmd_methods(&db, recipe_id, &file, json),
        Commands::Portion {
            recipe_id,
            value,
            measurement,
            json,
        } => cmd_portion(&db, recipe_id, value, &measurement, json),
        Commands::Import {
            file,
            name,
            portions,
            json,
        } => cmd_import(&db, &file, name, portions, json),
    }
}
