//! Remote recipe sources.
//!
//! The gateway talks to the remote API only through the [`RecipeSource`]
//! trait. [`SpoonacularClient`] is the HTTP implementation, with its own
//! ranked credential fallback; [`RetryingRecipeSource`] wraps any source
//! with exponential-backoff retry on transient errors.

pub mod retry;
pub mod spoonacular;
pub mod traits;

pub use retry::{RetryConfig, RetryingRecipeSource, with_retry};
pub use spoonacular::{DEFAULT_BASE_URL, SpoonacularClient};
pub use traits::RecipeSource;
