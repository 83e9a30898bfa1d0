//! Cache-aware recipe gateway

mod builder;
mod cached;
pub mod policy;

pub use builder::RecipeGatewayBuilder;
pub use cached::RecipeGateway;
pub use policy::{CacheKind, CacheWindows, RANDOM_KEY};
