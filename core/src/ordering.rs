use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::{Recipe, SortDirection};

/// Compare two optional numbers. Absent values sort after present ones in
/// either direction; the direction only flips present-vs-present results.
pub fn compare_nullable(a: Option<f64>, b: Option<f64>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => match direction {
            SortDirection::Asc => x.total_cmp(&y),
            SortDirection::Desc => y.total_cmp(&x),
        },
    }
}

/// Stable sort by portion value; recipes without a portion keep their
/// relative order at the end.
pub fn sort_by_portion(recipes: &mut [Recipe], direction: SortDirection) {
    recipes.sort_by(|a, b| {
        compare_nullable(
            a.portion.as_ref().map(|p| p.value),
            b.portion.as_ref().map(|p| p.value),
            direction,
        )
    });
}

/// Lower-cased name set for [`has_any_ingredient`].
pub fn name_set<S: AsRef<str>>(names: &[S]) -> HashSet<String> {
    names.iter().map(|n| n.as_ref().to_lowercase()).collect()
}

/// True when any ingredient name of `recipe` is in `wanted` (lower-cased).
pub fn has_any_ingredient(recipe: &Recipe, wanted: &HashSet<String>) -> bool {
    recipe
        .ingredients
        .iter()
        .any(|i| wanted.contains(&i.name.to_lowercase()))
}

/// Keep only recipes containing at least one of `names`. An empty name list
/// keeps everything.
pub fn retain_with_ingredients<S: AsRef<str>>(recipes: &mut Vec<Recipe>, names: &[S]) {
    if names.is_empty() {
        return;
    }
    let wanted = name_set(names);
    recipes.retain(|r| has_any_ingredient(r, &wanted));
}
