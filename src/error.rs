//! Ordelo cache error types

/// Ordelo cache error types.
///
/// Errors are `Clone` so that a single failed remote call can be delivered
/// to every caller waiting on the same deduplicated request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OrdeloError {
    // Remote source / network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The credential was rejected or its quota is spent (401 / 402 / 429).
    /// The adapter moves on to the next credential.
    #[error("credential rejected ({status})")]
    CredentialRejected { status: u16 },

    /// Every configured credential failed. Carries one line per attempt.
    #[error("all {} API credentials failed: {}", attempts.len(), attempts.join("; "))]
    CredentialsExhausted { attempts: Vec<String> },

    #[error("recipe not found: {0}")]
    RecipeNotFound(u64),

    #[error("empty response from recipe source")]
    EmptyResponse,

    // Quota errors
    /// Usage tracker forbids a remote call and nothing is cached.
    #[error("daily API limit reached and no cached data available for {key}")]
    QuotaExceeded { key: String },

    // Storage errors
    /// The persistent store could not be opened; caching is disabled.
    #[error("persistent store unavailable: {0}")]
    StorageUnavailable(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// A stored record failed shape validation on read.
    #[error("malformed cache entry {collection}/{key}: {reason}")]
    MalformedCacheEntry {
        collection: &'static str,
        key: String,
        reason: String,
    },

    // Data errors
    #[error("JSON error: {0}")]
    Json(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("no API credentials configured")]
    NoCredentials,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl OrdeloError {
    /// Whether the error is worth retrying.
    ///
    /// Network failures and 5xx responses are transient. Quota, storage,
    /// credential and data errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            OrdeloError::Http(_) => true,
            OrdeloError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Whether the remote source failed (as opposed to quota or storage).
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            OrdeloError::Http(_)
                | OrdeloError::Api { .. }
                | OrdeloError::CredentialRejected { .. }
                | OrdeloError::CredentialsExhausted { .. }
                | OrdeloError::RecipeNotFound(_)
                | OrdeloError::EmptyResponse
        )
    }
}

impl From<serde_json::Error> for OrdeloError {
    fn from(err: serde_json::Error) -> Self {
        OrdeloError::Json(err.to_string())
    }
}

impl From<rusqlite::Error> for OrdeloError {
    fn from(err: rusqlite::Error) -> Self {
        OrdeloError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for OrdeloError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            OrdeloError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            OrdeloError::Http(err.to_string())
        }
    }
}

impl From<std::io::Error> for OrdeloError {
    fn from(err: std::io::Error) -> Self {
        OrdeloError::Storage(err.to_string())
    }
}

/// Result type alias for ordelo cache operations
pub type Result<T> = std::result::Result<T, OrdeloError>;
