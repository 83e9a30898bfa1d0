//! Capability trait for remote recipe sources.
//!
//! The gateway only ever sees success or a single error per call: anything
//! like credential rotation happens inside the implementation.
//!
//! # Example
//!
//! ```ignore
//! struct Fixed(Vec<Recipe>);
//!
//! #[async_trait]
//! impl RecipeSource for Fixed {
//!     fn name(&self) -> &str { "fixed" }
//!     async fn fetch_random(&self, count: u32) -> Result<Vec<Recipe>> {
//!         Ok(self.0.iter().take(count as usize).cloned().collect())
//!     }
//!     // ...
//! }
//! ```

use async_trait::async_trait;

use crate::Result;
use crate::types::{Recipe, RecipeId};

/// Remote source of recipe data.
///
/// Every operation is an idempotent read, so callers may retry blindly.
#[async_trait]
pub trait RecipeSource: Send + Sync {
    /// Source name for logging/debugging.
    fn name(&self) -> &str;

    /// A batch of `count` random recipes.
    async fn fetch_random(&self, count: u32) -> Result<Vec<Recipe>>;

    /// Recipes matching a free-text query (already normalized by the caller).
    async fn search(&self, query: &str) -> Result<Vec<Recipe>>;

    /// Recipes of one cuisine (already lower-cased by the caller).
    async fn by_cuisine(&self, cuisine: &str) -> Result<Vec<Recipe>>;

    /// Full detail for one recipe.
    async fn by_id(&self, id: RecipeId) -> Result<Recipe>;
}
