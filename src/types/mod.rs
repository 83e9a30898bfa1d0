//! Public types for the ordelo cache API.

mod fetched;
mod recipe;
mod usage;

pub use fetched::{Fetched, Origin};
pub use recipe::{Ingredient, Recipe, RecipeId};
pub use usage::{UsageState, UsageStatus};
