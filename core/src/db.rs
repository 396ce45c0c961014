use std::fmt::Write;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Local;
use rand::Rng;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::debug;

use crate::children::{
    INGREDIENT_COLUMNS, IngredientStore, METHOD_COLUMNS, MethodStore, ingredient_from_row,
    method_from_row,
};
use crate::error::{Error, Result};
use crate::models::{
    Image, Ingredient, IngredientDraft, Method, MethodDraft, Portion, Recipe, RecipeFields,
    RecipeQuery, SortDirection, SortKey,
};
use crate::ordering::{retain_with_ingredients, sort_by_portion};
use crate::reconcile::{ChildStore, Reconciler};

/// Format of `createdAt` / `lastEditedAt`, local time.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const RECIPE_COLUMNS: &str = "id, name, url, created_at, last_edited_at, type, sort_order";

fn now_stamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

fn insert_recipe(conn: &Connection, fields: &RecipeFields) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM recipes", [], |row| row.get(0))?;
    let sort_order = (count + 1).max(1);
    let now = now_stamp();

    conn.execute(
        "INSERT INTO recipes (name, url, type, created_at, last_edited_at, sort_order)
         VALUES (?1, ?2, ?3, ?4, ?4, ?5)",
        params![fields.name, fields.url, fields.recipe_type, now, sort_order],
    )?;
    let id = conn.last_insert_rowid();
    debug!(id, sort_order, "created recipe");
    Ok(id)
}

fn upsert_portion(
    conn: &Connection,
    recipe_id: i64,
    value: f64,
    measurement: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO portions (value, measurement, recipe_id) VALUES (?1, ?2, ?3)
         ON CONFLICT(recipe_id) DO UPDATE
         SET value = excluded.value, measurement = excluded.measurement",
        params![value, measurement, recipe_id],
    )?;
    Ok(())
}

/// Bump the recipe's `lastEditedAt` to now.
fn touch_recipe(conn: &Connection, recipe_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE recipes SET last_edited_at = ?1 WHERE id = ?2",
        params![now_stamp(), recipe_id],
    )?;
    Ok(())
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn random_filename() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    let mut name = bytes
        .iter()
        .fold(String::with_capacity(36), |mut acc: String, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        });
    name.push_str(".png");
    name
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.migrate()?;
        debug!(path = %path.display(), "opened database");
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.pragma_update(None, "foreign_keys", "ON")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL DEFAULT '',
                    url TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL,
                    last_edited_at TEXT NOT NULL,
                    type TEXT NOT NULL DEFAULT '',
                    sort_order INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS portions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    value REAL NOT NULL DEFAULT 0,
                    measurement TEXT NOT NULL DEFAULT '',
                    recipe_id INTEGER NOT NULL UNIQUE REFERENCES recipes(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS images (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    url TEXT NOT NULL,
                    filename TEXT NOT NULL,
                    recipe_id INTEGER NOT NULL UNIQUE REFERENCES recipes(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL DEFAULT '',
                    measurement TEXT NOT NULL DEFAULT '',
                    value REAL NOT NULL DEFAULT 0,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    sort_order INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS methods (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    value TEXT NOT NULL DEFAULT '',
                    sort_order INTEGER NOT NULL DEFAULT 0,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_ingredients_recipe ON ingredients(recipe_id, sort_order);
                CREATE INDEX IF NOT EXISTS idx_methods_recipe ON methods(recipe_id, sort_order);
                CREATE INDEX IF NOT EXISTS idx_recipes_name ON recipes(name);

                PRAGMA user_version = 1;",
            )?;
            debug!("applied schema version 1");
        }

        Ok(())
    }

    /// Run `f` inside a transaction. Any error rolls back every write `f`
    /// made.
    fn in_transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    // --- Recipes ---

    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        Ok(Recipe {
            id: row.get(0)?,
            name: row.get(1)?,
            url: row.get(2)?,
            created_at: row.get(3)?,
            last_edited_at: row.get(4)?,
            recipe_type: row.get(5)?,
            sort_order: row.get(6)?,
            ..Recipe::default()
        })
    }

    fn hydrate(&self, mut recipe: Recipe) -> Result<Recipe> {
        recipe.portion = self.get_portion(recipe.id)?;
        recipe.image = self.get_image(recipe.id)?;
        recipe.ingredients = IngredientStore::new(&self.conn).list_children(recipe.id)?;
        recipe.methods = MethodStore::new(&self.conn).list_children(recipe.id)?;
        Ok(recipe)
    }

    pub fn recipe_exists(&self, id: i64) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM recipes WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn find_recipe(&self, id: i64) -> Result<Option<Recipe>> {
        let recipe = self
            .conn
            .query_row(
                &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1"),
                params![id],
                Self::recipe_from_row,
            )
            .optional()?;
        recipe.map(|r| self.hydrate(r)).transpose()
    }

    pub fn get_recipe(&self, id: i64) -> Result<Recipe> {
        self.find_recipe(id)?
            .ok_or_else(|| Error::NotFound(format!("Recipe {id}")))
    }

    pub fn list_recipes(&self, query: &RecipeQuery) -> Result<Vec<Recipe>> {
        let mut sql = format!("SELECT {RECIPE_COLUMNS} FROM recipes");
        let mut args: Vec<String> = Vec::new();

        if let Some(search) = &query.search {
            sql.push_str(" WHERE name LIKE ?1 ESCAPE '\\'");
            args.push(format!("%{}%", escape_like(search)));
        }

        // Columns come from a fixed whitelist, never from the request.
        match query.sort_key.column() {
            Some(column) => {
                let direction = query.direction.as_sql();
                sql.push_str(&format!(" ORDER BY {column} {direction}, id"));
            }
            None => sql.push_str(" ORDER BY id"),
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), Self::recipe_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut recipes = rows
            .into_iter()
            .map(|r| self.hydrate(r))
            .collect::<Result<Vec<_>>>()?;

        retain_with_ingredients(&mut recipes, &query.ingredient_names);
        if query.sort_key == SortKey::Portion {
            sort_by_portion(&mut recipes, query.direction);
        }

        Ok(recipes)
    }

    pub fn create_recipe(&self, fields: &RecipeFields) -> Result<Recipe> {
        let id = insert_recipe(&self.conn, fields)?;
        self.get_recipe(id)
    }

    /// Create a recipe together with its portion and ingredients. Nothing is
    /// stored unless every step succeeds.
    pub fn import_recipe(
        &self,
        fields: &RecipeFields,
        portion: Option<(f64, &str)>,
        ingredients: &[IngredientDraft],
    ) -> Result<Recipe> {
        let id = self.in_transaction(|conn| {
            let id = insert_recipe(conn, fields)?;
            if let Some((value, measurement)) = portion {
                upsert_portion(conn, id, value, measurement)?;
            }
            Reconciler::new(IngredientStore::new(conn)).reconcile(id, ingredients)?;
            Ok(id)
        })?;
        self.get_recipe(id)
    }

    pub fn update_recipe(&self, id: i64, fields: &RecipeFields) -> Result<Recipe> {
        let changed = self.conn.execute(
            "UPDATE recipes SET name = ?1, url = ?2, type = ?3, last_edited_at = ?4
             WHERE id = ?5",
            params![fields.name, fields.url, fields.recipe_type, now_stamp(), id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Recipe {id}")));
        }
        self.get_recipe(id)
    }

    /// Delete a recipe together with its portion, image, ingredients and
    /// method steps. Returns false when no recipe matched.
    pub fn delete_recipe(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM recipes WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Give the recipes in `ids` the sort orders 1, 2, 3... in list order.
    /// Unknown ids are skipped. Returns every recipe by sort order.
    pub fn reorder_recipes(&self, ids: &[i64]) -> Result<Vec<Recipe>> {
        self.in_transaction(|conn| {
            let mut stmt = conn.prepare("UPDATE recipes SET sort_order = ?1 WHERE id = ?2")?;
            for (index, id) in ids.iter().enumerate() {
                let order = i64::try_from(index + 1).unwrap_or(i64::MAX);
                stmt.execute(params![order, id])?;
            }
            Ok(())
        })?;

        self.list_recipes(&RecipeQuery {
            sort_key: SortKey::SortOrder,
            direction: SortDirection::Asc,
            ..RecipeQuery::default()
        })
    }

    // --- Portions ---

    fn portion_from_row(row: &rusqlite::Row) -> rusqlite::Result<Portion> {
        Ok(Portion {
            id: row.get(0)?,
            value: row.get(1)?,
            measurement: row.get(2)?,
            recipe_id: row.get(3)?,
        })
    }

    pub fn get_portion(&self, recipe_id: i64) -> Result<Option<Portion>> {
        let portion = self
            .conn
            .query_row(
                "SELECT id, value, measurement, recipe_id FROM portions WHERE recipe_id = ?1",
                params![recipe_id],
                Self::portion_from_row,
            )
            .optional()?;
        Ok(portion)
    }

    /// Insert or replace the recipe's portion. `None` when the recipe does
    /// not exist.
    pub fn set_portion(
        &self,
        recipe_id: i64,
        value: f64,
        measurement: &str,
    ) -> Result<Option<Recipe>> {
        if !self.recipe_exists(recipe_id)? {
            return Ok(None);
        }
        self.in_transaction(|conn| {
            upsert_portion(conn, recipe_id, value, measurement)?;
            touch_recipe(conn, recipe_id)
        })?;
        self.find_recipe(recipe_id)
    }

    pub fn delete_portion(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM portions WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    pub fn list_portions(&self) -> Result<Vec<Portion>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, value, measurement, recipe_id FROM portions ORDER BY id")?;
        let rows = stmt
            .query_map([], Self::portion_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // --- Images ---

    fn image_from_row(row: &rusqlite::Row) -> rusqlite::Result<Image> {
        Ok(Image {
            id: row.get(0)?,
            url: row.get(1)?,
            filename: row.get(2)?,
            recipe_id: row.get(3)?,
        })
    }

    pub fn get_image(&self, recipe_id: i64) -> Result<Option<Image>> {
        let image = self
            .conn
            .query_row(
                "SELECT id, url, filename, recipe_id FROM images WHERE recipe_id = ?1",
                params![recipe_id],
                Self::image_from_row,
            )
            .optional()?;
        Ok(image)
    }

    /// Store `bytes` base64-encoded as the recipe's image. A first upload gets
    /// a random filename; later uploads replace the data and keep the name.
    pub fn set_image(&self, recipe_id: i64, bytes: &[u8]) -> Result<Option<Recipe>> {
        if bytes.is_empty() {
            return Err(Error::Validation("Image must not be empty".to_string()));
        }
        if !self.recipe_exists(recipe_id)? {
            return Ok(None);
        }

        let encoded = STANDARD.encode(bytes);
        let existing = self.get_image(recipe_id)?;
        self.in_transaction(|conn| {
            if let Some(image) = existing {
                conn.execute(
                    "UPDATE images SET url = ?1 WHERE id = ?2",
                    params![encoded, image.id],
                )?;
            } else {
                conn.execute(
                    "INSERT INTO images (url, filename, recipe_id) VALUES (?1, ?2, ?3)",
                    params![encoded, random_filename(), recipe_id],
                )?;
            }
            touch_recipe(conn, recipe_id)
        })?;
        debug!(recipe_id, size = bytes.len(), "stored image");
        self.find_recipe(recipe_id)
    }

    pub fn list_images(&self) -> Result<Vec<Image>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, url, filename, recipe_id FROM images ORDER BY id")?;
        let rows = stmt
            .query_map([], Self::image_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // --- Ingredients ---

    /// Merge `drafts` into the recipe's ingredients in one transaction and
    /// touch the recipe. `None` when the recipe does not exist.
    pub fn reconcile_ingredients(
        &self,
        recipe_id: i64,
        drafts: &[IngredientDraft],
    ) -> Result<Option<Recipe>> {
        if !self.recipe_exists(recipe_id)? {
            return Ok(None);
        }
        self.in_transaction(|conn| {
            Reconciler::new(IngredientStore::new(conn)).reconcile(recipe_id, drafts)?;
            touch_recipe(conn, recipe_id)
        })?;
        self.find_recipe(recipe_id)
    }

    pub fn upsert_ingredient(
        &self,
        recipe_id: i64,
        draft: &IngredientDraft,
    ) -> Result<Option<Recipe>> {
        if !self.recipe_exists(recipe_id)? {
            return Ok(None);
        }
        self.in_transaction(|conn| {
            Reconciler::new(IngredientStore::new(conn)).upsert(recipe_id, draft)?;
            touch_recipe(conn, recipe_id)
        })?;
        self.find_recipe(recipe_id)
    }

    pub fn delete_ingredient(&self, id: i64) -> Result<bool> {
        Reconciler::new(IngredientStore::new(&self.conn)).delete(id)
    }

    pub fn list_ingredients(&self) -> Result<Vec<Ingredient>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INGREDIENT_COLUMNS} FROM ingredients ORDER BY recipe_id, sort_order, id"
        ))?;
        let rows = stmt
            .query_map([], ingredient_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // --- Methods ---

    pub fn reconcile_methods(
        &self,
        recipe_id: i64,
        drafts: &[MethodDraft],
    ) -> Result<Option<Recipe>> {
        if !self.recipe_exists(recipe_id)? {
            return Ok(None);
        }
        self.in_transaction(|conn| {
            Reconciler::new(MethodStore::new(conn)).reconcile(recipe_id, drafts)?;
            touch_recipe(conn, recipe_id)
        })?;
        self.find_recipe(recipe_id)
    }

    pub fn upsert_method(&self, recipe_id: i64, draft: &MethodDraft) -> Result<Option<Recipe>> {
        if !self.recipe_exists(recipe_id)? {
            return Ok(None);
        }
        self.in_transaction(|conn| {
            Reconciler::new(MethodStore::new(conn)).upsert(recipe_id, draft)?;
            touch_recipe(conn, recipe_id)
        })?;
        self.find_recipe(recipe_id)
    }

    pub fn delete_method(&self, id: i64) -> Result<bool> {
        Reconciler::new(MethodStore::new(&self.conn)).delete(id)
    }

    pub fn list_methods(&self) -> Result<Vec<Method>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {METHOD_COLUMNS} FROM methods ORDER BY recipe_id, sort_order, id"
        ))?;
        let rows = stmt
            .query_map([], method_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChildDraft, IngredientFields, MethodFields};

    fn fields(name: &str) -> RecipeFields {
        RecipeFields {
            name: name.to_string(),
            url: format!("https://example.com/{}", name.to_lowercase()),
            recipe_type: "Dinner".to_string(),
        }
    }

    fn ingredient(id: i64, name: &str, sort_order: i64) -> IngredientDraft {
        ChildDraft {
            id,
            sort_order,
            fields: IngredientFields {
                name: name.to_string(),
                measurement: "g".to_string(),
                value: 10.0,
            },
        }
    }

    fn step(id: i64, text: &str) -> MethodDraft {
        ChildDraft {
            id,
            sort_order: 0,
            fields: MethodFields {
                value: text.to_string(),
            },
        }
    }

    fn names(recipe: &Recipe) -> Vec<(&str, i64)> {
        recipe
            .ingredients
            .iter()
            .map(|i| (i.name.as_str(), i.sort_order))
            .collect()
    }

    fn count(db: &Database, table: &str) -> i64 {
        db.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .unwrap()
    }

    fn backdate(db: &Database, id: i64) {
        db.conn
            .execute(
                "UPDATE recipes SET last_edited_at = '2000-01-01 00:00:00' WHERE id = ?1",
                params![id],
            )
            .unwrap();
    }

    #[test]
    fn test_open_file_database_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookbook.db");

        let id = {
            let db = Database::open(&path).unwrap();
            db.create_recipe(&fields("Soup")).unwrap().id
        };

        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_recipe(id).unwrap().name, "Soup");
    }

    #[test]
    fn test_create_recipe_assigns_count_plus_one() {
        let db = Database::open_in_memory().unwrap();
        let first = db.create_recipe(&fields("Soup")).unwrap();
        let second = db.create_recipe(&fields("Stew")).unwrap();

        assert_eq!(first.sort_order, 1);
        assert_eq!(second.sort_order, 2);
        assert_eq!(first.created_at, first.last_edited_at);
        assert!(
            chrono::NaiveDateTime::parse_from_str(&first.created_at, TIMESTAMP_FORMAT).is_ok()
        );
        assert!(first.portion.is_none());
        assert!(first.ingredients.is_empty());
    }

    #[test]
    fn test_get_missing_recipe_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_recipe(99), Err(Error::NotFound(_))));
        assert!(db.find_recipe(99).unwrap().is_none());
    }

    #[test]
    fn test_update_recipe() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&fields("Soup")).unwrap();
        backdate(&db, recipe.id);

        let updated = db.update_recipe(recipe.id, &fields("Tomato Soup")).unwrap();
        assert_eq!(updated.name, "Tomato Soup");
        assert_eq!(updated.recipe_type, "Dinner");
        assert_ne!(updated.last_edited_at, "2000-01-01 00:00:00");

        assert!(matches!(
            db.update_recipe(404, &fields("x")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_recipe_cascades() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&fields("Soup")).unwrap();
        db.reconcile_ingredients(recipe.id, &[ingredient(0, "Salt", 0)])
            .unwrap();
        db.reconcile_methods(recipe.id, &[step(0, "Boil")]).unwrap();
        db.set_portion(recipe.id, 4.0, "bowls").unwrap();
        db.set_image(recipe.id, b"png").unwrap();

        assert!(db.delete_recipe(recipe.id).unwrap());
        assert!(!db.delete_recipe(recipe.id).unwrap());

        for table in ["ingredients", "methods", "portions", "images"] {
            assert_eq!(count(&db, table), 0, "{table} not cleaned up");
        }
    }

    #[test]
    fn test_list_recipes_search_is_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        db.create_recipe(&fields("Banana Bread")).unwrap();
        db.create_recipe(&fields("Pancakes")).unwrap();

        let query = RecipeQuery::parse(Some("bread"), None, None, None).unwrap();
        let found = db.list_recipes(&query).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Banana Bread");
    }

    #[test]
    fn test_list_recipes_search_treats_wildcards_literally() {
        let db = Database::open_in_memory().unwrap();
        db.create_recipe(&fields("100% Rye")).unwrap();
        db.create_recipe(&fields("Rye")).unwrap();

        let query = RecipeQuery::parse(Some("%"), None, None, None).unwrap();
        let found = db.list_recipes(&query).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "100% Rye");
    }

    #[test]
    fn test_list_recipes_default_order_is_sort_order_desc() {
        let db = Database::open_in_memory().unwrap();
        db.create_recipe(&fields("A")).unwrap();
        db.create_recipe(&fields("B")).unwrap();
        db.create_recipe(&fields("C")).unwrap();

        let listed = db.list_recipes(&RecipeQuery::default()).unwrap();
        let names: Vec<&str> = listed.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["C", "B", "A"]);
    }

    #[test]
    fn test_list_recipes_by_name_asc() {
        let db = Database::open_in_memory().unwrap();
        db.create_recipe(&fields("Stew")).unwrap();
        db.create_recipe(&fields("Bread")).unwrap();

        let query = RecipeQuery::parse(None, Some("name"), Some("asc"), None).unwrap();
        let listed = db.list_recipes(&query).unwrap();
        assert_eq!(listed[0].name, "Bread");
        assert_eq!(listed[1].name, "Stew");
    }

    #[test]
    fn test_list_recipes_by_portion_absent_last() {
        let db = Database::open_in_memory().unwrap();
        let none = db.create_recipe(&fields("None")).unwrap();
        let five = db.create_recipe(&fields("Five")).unwrap();
        let two = db.create_recipe(&fields("Two")).unwrap();
        db.set_portion(five.id, 5.0, "servings").unwrap();
        db.set_portion(two.id, 2.0, "servings").unwrap();

        let query = RecipeQuery::parse(None, Some("portion"), Some("desc"), None).unwrap();
        let ids: Vec<i64> = db.list_recipes(&query).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![five.id, two.id, none.id]);

        let query = RecipeQuery::parse(None, Some("portion"), Some("asc"), None).unwrap();
        let ids: Vec<i64> = db.list_recipes(&query).unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![two.id, five.id, none.id]);
    }

    #[test]
    fn test_list_recipes_by_ingredient_names() {
        let db = Database::open_in_memory().unwrap();
        let cake = db.create_recipe(&fields("Cake")).unwrap();
        let soup = db.create_recipe(&fields("Soup")).unwrap();
        db.reconcile_ingredients(cake.id, &[ingredient(0, "Flour", 0), ingredient(0, "Egg", 0)])
            .unwrap();
        db.reconcile_ingredients(soup.id, &[ingredient(0, "Leek", 0)])
            .unwrap();

        let query = RecipeQuery::parse(None, None, None, Some("egg,milk")).unwrap();
        let found = db.list_recipes(&query).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, cake.id);
    }

    #[test]
    fn test_reorder_recipes() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_recipe(&fields("A")).unwrap();
        let b = db.create_recipe(&fields("B")).unwrap();
        let c = db.create_recipe(&fields("C")).unwrap();

        let listed = db.reorder_recipes(&[c.id, 999, a.id, b.id]).unwrap();
        let order: Vec<(i64, i64)> = listed.iter().map(|r| (r.id, r.sort_order)).collect();
        assert_eq!(order, vec![(c.id, 1), (a.id, 3), (b.id, 4)]);
    }

    #[test]
    fn test_reconcile_ingredients_into_empty_recipe() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&fields("Soup")).unwrap();

        let updated = db
            .reconcile_ingredients(recipe.id, &[ingredient(0, "Salt", 0)])
            .unwrap()
            .unwrap();
        assert_eq!(names(&updated), vec![("Salt", 1)]);
        assert_eq!(updated.ingredients[0].recipe_id, recipe.id);
    }

    #[test]
    fn test_reconcile_ingredients_updates_and_appends() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&fields("Soup")).unwrap();
        let first = db
            .reconcile_ingredients(
                recipe.id,
                &[ingredient(0, "Salt", 0), ingredient(0, "Pepper", 0)],
            )
            .unwrap()
            .unwrap();
        let salt = first.ingredients[0].id;
        let pepper = first.ingredients[1].id;

        let second = db
            .reconcile_ingredients(
                recipe.id,
                &[
                    ingredient(salt, "Sea salt", 0),
                    ingredient(pepper, "Pepper", 0),
                    ingredient(0, "Leek", 0),
                ],
            )
            .unwrap()
            .unwrap();
        assert_eq!(
            names(&second),
            vec![("Sea salt", 1), ("Pepper", 2), ("Leek", 5)]
        );
        assert_eq!(second.ingredients[0].id, salt);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&fields("Soup")).unwrap();
        let stored = db
            .reconcile_ingredients(recipe.id, &[ingredient(0, "A", 0), ingredient(0, "B", 0)])
            .unwrap()
            .unwrap();

        let resubmit: Vec<IngredientDraft> = stored
            .ingredients
            .iter()
            .map(|i| ingredient(i.id, &i.name, i.sort_order))
            .collect();
        let once = db.reconcile_ingredients(recipe.id, &resubmit).unwrap().unwrap();
        let twice = db.reconcile_ingredients(recipe.id, &resubmit).unwrap().unwrap();
        assert_eq!(once.ingredients, stored.ingredients);
        assert_eq!(twice.ingredients, once.ingredients);
    }

    #[test]
    fn test_reconcile_missing_recipe_returns_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db
            .reconcile_ingredients(42, &[ingredient(0, "Salt", 0)])
            .unwrap()
            .is_none());
        assert!(db.upsert_method(42, &step(0, "Boil")).unwrap().is_none());
        assert!(db.set_portion(42, 1.0, "cup").unwrap().is_none());
        assert_eq!(count(&db, "ingredients"), 0);
    }

    #[test]
    fn test_reconcile_rolls_back_on_failed_write() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&fields("Soup")).unwrap();
        let stored = db
            .reconcile_ingredients(recipe.id, &[ingredient(0, "Salt", 0)])
            .unwrap()
            .unwrap();
        backdate(&db, recipe.id);

        db.conn
            .execute_batch(
                "CREATE TRIGGER reject_boom BEFORE INSERT ON ingredients
                 WHEN NEW.name = 'boom'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let salt = stored.ingredients[0].id;
        let err = db
            .reconcile_ingredients(
                recipe.id,
                &[ingredient(salt, "Sea salt", 0), ingredient(0, "boom", 0)],
            )
            .unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));

        let after = db.get_recipe(recipe.id).unwrap();
        assert_eq!(after.ingredients, stored.ingredients);
        assert_eq!(after.last_edited_at, "2000-01-01 00:00:00");
    }

    #[test]
    fn test_import_recipe_stores_everything() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db
            .import_recipe(
                &fields("Pancakes"),
                Some((4.0, "servings")),
                &[ingredient(0, "Flour", 0), ingredient(0, "Milk", 0)],
            )
            .unwrap();
        assert_eq!(recipe.sort_order, 1);
        assert_eq!(recipe.portion.as_ref().unwrap().measurement, "servings");
        let names: Vec<&str> = recipe
            .ingredients
            .iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(names, vec!["Flour", "Milk"]);
    }

    #[test]
    fn test_import_recipe_leaves_nothing_on_failure() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute_batch(
                "CREATE TRIGGER reject_boom BEFORE INSERT ON ingredients
                 WHEN NEW.name = 'boom'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let err = db
            .import_recipe(
                &fields("Pancakes"),
                Some((4.0, "servings")),
                &[ingredient(0, "Flour", 0), ingredient(0, "boom", 0)],
            )
            .unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert!(db.list_recipes(&RecipeQuery::default()).unwrap().is_empty());
        assert!(db.list_portions().unwrap().is_empty());
        assert!(db.list_ingredients().unwrap().is_empty());
    }

    #[test]
    fn test_reconcile_touches_recipe() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&fields("Soup")).unwrap();
        backdate(&db, recipe.id);

        let updated = db
            .reconcile_methods(recipe.id, &[step(0, "Chop"), step(0, "Boil")])
            .unwrap()
            .unwrap();
        assert_ne!(updated.last_edited_at, "2000-01-01 00:00:00");
        let steps: Vec<(&str, i64)> = updated
            .methods
            .iter()
            .map(|m| (m.value.as_str(), m.sort_order))
            .collect();
        assert_eq!(steps, vec![("Chop", 1), ("Boil", 2)]);
    }

    #[test]
    fn test_upsert_method_appends_then_updates() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&fields("Soup")).unwrap();
        db.reconcile_methods(recipe.id, &[step(0, "Chop"), step(0, "Boil")])
            .unwrap();

        let appended = db.upsert_method(recipe.id, &step(0, "Serve")).unwrap().unwrap();
        assert_eq!(appended.methods[2].value, "Serve");
        assert_eq!(appended.methods[2].sort_order, 3);

        let chop = appended.methods[0].id;
        let edited = db
            .upsert_method(recipe.id, &step(chop, "Chop finely"))
            .unwrap()
            .unwrap();
        assert_eq!(edited.methods[0].value, "Chop finely");
        assert_eq!(edited.methods[0].sort_order, 1);
        assert_eq!(edited.methods.len(), 3);
    }

    #[test]
    fn test_upsert_ingredient_appends_at_tail() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&fields("Soup")).unwrap();
        db.reconcile_ingredients(recipe.id, &[ingredient(0, "Salt", 0)])
            .unwrap();

        let updated = db
            .upsert_ingredient(recipe.id, &ingredient(0, "Pepper", 0))
            .unwrap()
            .unwrap();
        assert_eq!(names(&updated), vec![("Salt", 1), ("Pepper", 2)]);
    }

    #[test]
    fn test_delete_children() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&fields("Soup")).unwrap();
        let updated = db
            .reconcile_ingredients(recipe.id, &[ingredient(0, "Salt", 0)])
            .unwrap()
            .unwrap();
        let with_steps = db
            .reconcile_methods(recipe.id, &[step(0, "Boil")])
            .unwrap()
            .unwrap();

        assert!(db.delete_ingredient(updated.ingredients[0].id).unwrap());
        assert!(!db.delete_ingredient(updated.ingredients[0].id).unwrap());
        assert!(db.delete_method(with_steps.methods[0].id).unwrap());
        assert!(db.list_ingredients().unwrap().is_empty());
        assert!(db.list_methods().unwrap().is_empty());
    }

    #[test]
    fn test_set_portion_inserts_then_updates() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&fields("Soup")).unwrap();

        let first = db.set_portion(recipe.id, 2.0, "bowls").unwrap().unwrap();
        let portion = first.portion.unwrap();
        assert!((portion.value - 2.0).abs() < f64::EPSILON);
        assert_eq!(portion.measurement, "bowls");

        let second = db.set_portion(recipe.id, 6.0, "cups").unwrap().unwrap();
        let replaced = second.portion.unwrap();
        assert_eq!(replaced.id, portion.id);
        assert_eq!(replaced.measurement, "cups");
        assert_eq!(db.list_portions().unwrap().len(), 1);

        assert!(db.delete_portion(replaced.id).unwrap());
        assert!(db.get_recipe(recipe.id).unwrap().portion.is_none());
    }

    #[test]
    fn test_set_image_inserts_then_replaces() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&fields("Soup")).unwrap();

        let first = db.set_image(recipe.id, b"hello").unwrap().unwrap();
        let image = first.image.unwrap();
        assert_eq!(image.url, "aGVsbG8=");
        assert_eq!(image.filename.len(), 36);
        assert!(image.filename.ends_with(".png"));

        let second = db.set_image(recipe.id, b"world").unwrap().unwrap();
        let replaced = second.image.unwrap();
        assert_eq!(replaced.filename, image.filename);
        assert_eq!(replaced.url, "d29ybGQ=");
        assert_eq!(db.list_images().unwrap().len(), 1);
    }

    #[test]
    fn test_set_image_rejects_empty_upload() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&fields("Soup")).unwrap();
        assert!(matches!(
            db.set_image(recipe.id, &[]),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_touch_recipe() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&fields("Soup")).unwrap();
        backdate(&db, recipe.id);
        touch_recipe(&db.conn, recipe.id).unwrap();
        assert_ne!(
            db.get_recipe(recipe.id).unwrap().last_edited_at,
            "2000-01-01 00:00:00"
        );
    }

    #[test]
    fn test_random_filename_shape() {
        let name = random_filename();
        assert_eq!(name.len(), 36);
        assert!(name[..32].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(name, random_filename());
    }
}
