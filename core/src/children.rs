//! SQLite-backed child stores for the reconciler.

use rusqlite::{Connection, params};

use crate::error::{Error, Result};
use crate::models::{Ingredient, IngredientFields, Method, MethodFields};
use crate::reconcile::{ChildRecord, ChildStore};

impl ChildRecord for Ingredient {
    fn id(&self) -> i64 {
        self.id
    }
}

impl ChildRecord for Method {
    fn id(&self) -> i64 {
        self.id
    }
}

pub(crate) fn ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ingredient> {
    Ok(Ingredient {
        id: row.get(0)?,
        name: row.get(1)?,
        measurement: row.get(2)?,
        value: row.get(3)?,
        recipe_id: row.get(4)?,
        sort_order: row.get(5)?,
    })
}

pub(crate) fn method_from_row(row: &rusqlite::Row) -> rusqlite::Result<Method> {
    Ok(Method {
        id: row.get(0)?,
        value: row.get(1)?,
        sort_order: row.get(2)?,
        recipe_id: row.get(3)?,
    })
}

pub(crate) const INGREDIENT_COLUMNS: &str = "id, name, measurement, value, recipe_id, sort_order";
pub(crate) const METHOD_COLUMNS: &str = "id, value, sort_order, recipe_id";

/// Ingredients of a recipe, stored in the `ingredients` table.
pub struct IngredientStore<'c> {
    conn: &'c Connection,
}

impl<'c> IngredientStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl ChildStore for IngredientStore<'_> {
    type Child = Ingredient;
    type Fields = IngredientFields;

    fn list_children(&self, parent_id: i64) -> Result<Vec<Ingredient>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {INGREDIENT_COLUMNS} FROM ingredients
             WHERE recipe_id = ?1 ORDER BY sort_order, id"
        ))?;
        let rows = stmt
            .query_map(params![parent_id], ingredient_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn insert_child(&self, parent_id: i64, fields: &IngredientFields, order: i64) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO ingredients (name, measurement, value, recipe_id, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                fields.name,
                fields.measurement,
                fields.value,
                parent_id,
                order
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_child(&self, id: i64, fields: &IngredientFields, order: i64) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE ingredients SET name = ?1, measurement = ?2, value = ?3, sort_order = ?4
             WHERE id = ?5",
            params![fields.name, fields.measurement, fields.value, order, id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Ingredient {id}")));
        }
        Ok(())
    }

    fn delete_child(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM ingredients WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

/// Method steps of a recipe, stored in the `methods` table.
pub struct MethodStore<'c> {
    conn: &'c Connection,
}

impl<'c> MethodStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl ChildStore for MethodStore<'_> {
    type Child = Method;
    type Fields = MethodFields;

    fn list_children(&self, parent_id: i64) -> Result<Vec<Method>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {METHOD_COLUMNS} FROM methods
             WHERE recipe_id = ?1 ORDER BY sort_order, id"
        ))?;
        let rows = stmt
            .query_map(params![parent_id], method_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn insert_child(&self, parent_id: i64, fields: &MethodFields, order: i64) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO methods (value, sort_order, recipe_id) VALUES (?1, ?2, ?3)",
            params![fields.value, order, parent_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_child(&self, id: i64, fields: &MethodFields, order: i64) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE methods SET value = ?1, sort_order = ?2 WHERE id = ?3",
            params![fields.value, order, id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("Method {id}")));
        }
        Ok(())
    }

    fn delete_child(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM methods WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}
