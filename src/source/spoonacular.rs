//! Spoonacular API client with ranked credential fallback.
//!
//! Every request is tried with each configured API key in order. A key that
//! is rejected or out of quota (401, 402, 429) moves the request on to the
//! next key; any other failure ends the chain immediately, since a different
//! key would not help. If every key is rejected the caller gets a single
//! [`OrdeloError::CredentialsExhausted`] listing each attempt.
//!
//! # Fallback Chain Flow
//!
//! ```text
//! search("pasta")
//!        │
//!        ▼
//! ┌──────────────┐  402 / 429
//! │  key #0      │ ───────────┐
//! └──────────────┘            ▼
//!                     ┌──────────────┐  200
//!                     │  key #1      │ ─────► results
//!                     └──────────────┘
//! ```
//!
//! See: <https://spoonacular.com/food-api/docs>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use super::traits::RecipeSource;
use crate::types::{Recipe, RecipeId};
use crate::{OrdeloError, Result};

/// Default base URL for the Spoonacular API
pub const DEFAULT_BASE_URL: &str = "https://api.spoonacular.com";

/// Recipes requested per batch (random, search, cuisine).
pub const DEFAULT_BATCH_SIZE: u32 = 12;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the Spoonacular recipe API.
#[derive(Clone)]
pub struct SpoonacularClient {
    api_keys: Vec<String>,
    http: Client,
    base_url: String,
    batch_size: u32,
}

impl SpoonacularClient {
    /// Create a client that tries `api_keys` in order.
    pub fn new(api_keys: Vec<String>) -> Result<Self> {
        Self::with_base_url(api_keys, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(api_keys: Vec<String>, base_url: impl Into<String>) -> Result<Self> {
        let api_keys: Vec<String> = api_keys
            .into_iter()
            .map(|k| k.trim().to_owned())
            .filter(|k| !k.is_empty())
            .collect();
        if api_keys.is_empty() {
            return Err(OrdeloError::NoCredentials);
        }

        Ok(Self {
            api_keys,
            http: build_http(DEFAULT_TIMEOUT)?,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Set the per-request HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = build_http(timeout)?;
        Ok(self)
    }

    /// Set the number of recipes requested for batch endpoints.
    pub fn batch_size(mut self, n: u32) -> Self {
        self.batch_size = n;
        self
    }

    /// Number of configured credentials.
    pub fn credential_count(&self) -> usize {
        self.api_keys.len()
    }

    /// GET `path` with each credential in turn until one is accepted.
    #[instrument(skip(self, params), fields(keys = self.api_keys.len()))]
    async fn get_with_fallback<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let mut attempts = Vec::new();
        for (index, key) in self.api_keys.iter().enumerate() {
            let masked = mask_key(key);
            match self.get_once(path, params, key).await {
                Ok(value) => {
                    debug!(key = %masked, attempt = index + 1, "request succeeded");
                    return Ok(value);
                }
                Err(e @ OrdeloError::CredentialRejected { .. }) => {
                    warn!(
                        key = %masked,
                        attempt = index + 1,
                        remaining_keys = self.api_keys.len() - index - 1,
                        error = %e,
                        "credential rejected, trying next key"
                    );
                    attempts.push(format!("{masked}: {e}"));
                }
                Err(e) => return Err(e),
            }
        }
        Err(OrdeloError::CredentialsExhausted { attempts })
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        api_key: &str,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http
            .get(&url)
            .query(params)
            .query(&[("apiKey", api_key)])
            .send()
            .await?;

        Self::handle_response_errors(&response)?;

        response
            .json()
            .await
            .map_err(|e| OrdeloError::Json(format!("unexpected response from {path}: {e}")))
    }

    fn handle_response_errors(response: &reqwest::Response) -> Result<()> {
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        match status.as_u16() {
            code @ (401 | 402 | 429) => Err(OrdeloError::CredentialRejected { status: code }),
            code => Err(OrdeloError::Api {
                status: code,
                message: format!("Spoonacular API error: {status}"),
            }),
        }
    }

    fn batch_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("number", self.batch_size.to_string()),
            ("addRecipeInformation", "true".to_owned()),
            ("fillIngredients", "true".to_owned()),
        ]
    }
}

fn build_http(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| OrdeloError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// `abcdefgh...wxyz` for logs; short keys are fully hidden.
fn mask_key(key: &str) -> String {
    if key.len() > 12 && key.is_ascii() {
        format!("{}...{}", &key[..8], &key[key.len() - 4..])
    } else {
        "****".to_owned()
    }
}

#[async_trait]
impl RecipeSource for SpoonacularClient {
    fn name(&self) -> &str {
        "spoonacular"
    }

    async fn fetch_random(&self, count: u32) -> Result<Vec<Recipe>> {
        let mut params = self.batch_params();
        params[0].1 = count.to_string();
        let response: RandomResponse = self.get_with_fallback("/recipes/random", &params).await?;
        Ok(response.recipes)
    }

    async fn search(&self, query: &str) -> Result<Vec<Recipe>> {
        let mut params = self.batch_params();
        params.push(("query", query.to_owned()));
        let response: SearchResponse = self
            .get_with_fallback("/recipes/complexSearch", &params)
            .await?;
        Ok(response.results)
    }

    async fn by_cuisine(&self, cuisine: &str) -> Result<Vec<Recipe>> {
        let mut params = self.batch_params();
        params.push(("cuisine", cuisine.to_owned()));
        params.push(("instructionsRequired", "true".to_owned()));
        let response: SearchResponse = self
            .get_with_fallback("/recipes/complexSearch", &params)
            .await?;
        Ok(response.results)
    }

    async fn by_id(&self, id: RecipeId) -> Result<Recipe> {
        let params = [("includeNutrition", "true".to_owned())];
        let path = format!("/recipes/{id}/information");
        match self.get_with_fallback(&path, &params).await {
            Err(OrdeloError::Api { status: 404, .. }) => Err(OrdeloError::RecipeNotFound(id)),
            other => other,
        }
    }
}

#[derive(Deserialize)]
struct RandomResponse {
    #[serde(default)]
    recipes: Vec<Recipe>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Recipe>,
}
