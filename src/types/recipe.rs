//! Recipe payloads as returned by the recipe source

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Numeric recipe identifier assigned by the remote API.
pub type RecipeId = u64;

/// A recipe as returned by the remote API.
///
/// Only the fields this crate inspects are typed; everything else the API
/// sends is kept in `extra` so a cached recipe serializes back to the same
/// JSON the caller would have received from the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: RecipeId,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_in_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servings: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_ingredients: Option<Vec<Ingredient>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_instructions: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Recipe {
    /// Minimal recipe with just an id and title.
    pub fn new(id: RecipeId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            image: None,
            ready_in_minutes: None,
            servings: None,
            extended_ingredients: None,
            analyzed_instructions: None,
            extra: Map::new(),
        }
    }

    /// Attach ingredients.
    pub fn with_ingredients(mut self, ingredients: Vec<Ingredient>) -> Self {
        self.extended_ingredients = Some(ingredients);
        self
    }

    /// Attach analyzed instructions.
    pub fn with_instructions(mut self, instructions: Value) -> Self {
        self.analyzed_instructions = Some(instructions);
        self
    }

    /// Whether the recipe carries ingredients and instructions.
    ///
    /// Search endpoints sometimes return summaries without either; those
    /// need a detail fetch before they are useful on a recipe page.
    pub fn is_complete(&self) -> bool {
        self.extended_ingredients.is_some() && self.analyzed_instructions.is_some()
    }
}

/// One entry of `extendedIngredients`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Ingredient {
    pub fn new(name: impl Into<String>, amount: f64, unit: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            amount: Some(amount),
            unit: Some(unit.into()),
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_survive_roundtrip() {
        let raw = serde_json::json!({
            "id": 715538,
            "title": "Bruschetta",
            "readyInMinutes": 35,
            "vegetarian": true,
            "sourceUrl": "https://example.com/bruschetta",
            "extendedIngredients": [
                { "id": 1, "name": "tomato", "amount": 2.0, "unit": "", "aisle": "Produce" }
            ]
        });
        let recipe: Recipe = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(recipe.id, 715538);
        assert_eq!(recipe.ready_in_minutes, Some(35));
        assert_eq!(recipe.extra["vegetarian"], true);

        let back = serde_json::to_value(&recipe).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn completeness_requires_ingredients_and_instructions() {
        let summary = Recipe::new(1, "Soup");
        assert!(!summary.is_complete());

        let with_ingredients = summary
            .clone()
            .with_ingredients(vec![Ingredient::new("water", 1.0, "l")]);
        assert!(!with_ingredients.is_complete());

        let full = with_ingredients.with_instructions(serde_json::json!([]));
        assert!(full.is_complete());
    }

    #[test]
    fn missing_id_is_rejected() {
        let result: std::result::Result<Recipe, _> =
            serde_json::from_value(serde_json::json!({ "title": "No id" }));
        assert!(result.is_err());
    }
}
