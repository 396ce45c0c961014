use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Portion {
    pub id: i64,
    pub value: f64,
    pub measurement: String,
    pub recipe_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Image {
    pub id: i64,
    /// Base64 of the uploaded bytes.
    pub url: String,
    pub filename: String,
    pub recipe_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub measurement: String,
    pub value: f64,
    pub recipe_id: i64,
    #[serde(rename = "sortOrder")]
    pub sort_order: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Method {
    pub id: i64,
    pub value: String,
    #[serde(rename = "sortOrder")]
    pub sort_order: i64,
    pub recipe_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipe {
    pub id: i64,
    pub name: String,
    pub portion: Option<Portion>,
    pub image: Option<Image>,
    pub url: String,
    pub ingredients: Vec<Ingredient>,
    pub methods: Vec<Method>,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "lastEditedAt")]
    pub last_edited_at: String,
    #[serde(rename = "type")]
    pub recipe_type: String,
    #[serde(rename = "sortOrder")]
    pub sort_order: i64,
}

/// Editable scalar fields of a recipe, as accepted on create and update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecipeFields {
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub recipe_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct IngredientFields {
    pub name: String,
    pub measurement: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MethodFields {
    pub value: String,
}

/// A client-submitted child record. `id == 0` marks a child that has not been
/// stored yet; `sort_order == 0` means the client did not ask for a position.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChildDraft<F> {
    #[serde(default, deserialize_with = "null_as_zero")]
    pub id: i64,
    #[serde(default, rename = "sortOrder", deserialize_with = "null_as_zero")]
    pub sort_order: i64,
    #[serde(flatten)]
    pub fields: F,
}

impl<F> ChildDraft<F> {
    pub fn new(fields: F) -> Self {
        Self {
            id: 0,
            sort_order: 0,
            fields,
        }
    }
}

/// Reads an optional integer, mapping JSON `null` to 0.
pub fn null_as_zero<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or_default())
}

pub type IngredientDraft = ChildDraft<IngredientFields>;
pub type MethodDraft = ChildDraft<MethodFields>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Url,
    CreatedAt,
    LastEditedAt,
    Type,
    #[default]
    SortOrder,
    Portion,
}

impl SortKey {
    pub const ALL: [&'static str; 7] = [
        "name",
        "url",
        "createdAt",
        "lastEditedAt",
        "type",
        "sortOrder",
        "portion",
    ];

    /// Column to order by in SQL. `Portion` lives in another table and is
    /// sorted after loading.
    pub fn column(self) -> Option<&'static str> {
        match self {
            Self::Name => Some("name"),
            Self::Url => Some("url"),
            Self::CreatedAt => Some("created_at"),
            Self::LastEditedAt => Some("last_edited_at"),
            Self::Type => Some("type"),
            Self::SortOrder => Some("sort_order"),
            Self::Portion => None,
        }
    }
}

impl FromStr for SortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "sortOrder" => Ok(Self::SortOrder),
            "name" => Ok(Self::Name),
            "url" => Ok(Self::Url),
            "createdAt" => Ok(Self::CreatedAt),
            "lastEditedAt" => Ok(Self::LastEditedAt),
            "type" => Ok(Self::Type),
            "portion" => Ok(Self::Portion),
            _ => Err(Error::Validation(format!(
                "Invalid sort key '{s}'. Must be one of: {}",
                Self::ALL.join(", ")
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || s.eq_ignore_ascii_case("desc") {
            Ok(Self::Desc)
        } else if s.eq_ignore_ascii_case("asc") {
            Ok(Self::Asc)
        } else {
            Err(Error::Validation(format!(
                "Invalid sort direction '{s}'. Use asc or desc"
            )))
        }
    }
}

/// Parameters for listing recipes.
#[derive(Debug, Clone, Default)]
pub struct RecipeQuery {
    pub search: Option<String>,
    pub sort_key: SortKey,
    pub direction: SortDirection,
    pub ingredient_names: Vec<String>,
}

impl RecipeQuery {
    /// Build a query from raw request parameters; absent or empty values take
    /// their defaults.
    pub fn parse(
        search: Option<&str>,
        sort_key: Option<&str>,
        direction: Option<&str>,
        ingredient_names: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            search: search
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            sort_key: sort_key.unwrap_or_default().parse()?,
            direction: direction.unwrap_or_default().parse()?,
            ingredient_names: ingredient_names.map(split_names).unwrap_or_default(),
        })
    }
}

/// Split a comma-separated list of names, dropping blanks.
pub fn split_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a textual record identity, as found in a request path.
pub fn parse_identity(raw: &str) -> Result<i64> {
    raw.trim()
        .parse()
        .map_err(|_| Error::InvalidIdentity(raw.to_string()))
}
