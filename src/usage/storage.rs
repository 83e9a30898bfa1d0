//! Persistence backends for [`UsageState`].

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use crate::types::UsageState;
use crate::{OrdeloError, Result};

/// File name used under the data directory.
pub const DEFAULT_USAGE_FILE: &str = "spoonacular_api_usage.json";

/// Where the usage counter lives between runs.
pub trait UsageStorage: Send + Sync {
    /// Load the stored state. `Ok(None)` when nothing was stored yet.
    fn load(&self) -> Result<Option<UsageState>>;

    /// Replace the stored state.
    fn save(&self, state: &UsageState) -> Result<()>;
}

/// Single JSON blob on disk.
#[derive(Debug, Clone)]
pub struct FileUsageStorage {
    path: PathBuf,
}

impl FileUsageStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UsageStorage for FileUsageStorage {
    fn load(&self) -> Result<Option<UsageState>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(OrdeloError::Storage(format!(
                    "failed to read usage state {}: {e}",
                    self.path.display()
                )));
            }
        };
        match serde_json::from_str(&content) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt usage state, starting over");
                Ok(None)
            }
        }
    }

    /// Atomic write via tmp + rename.
    fn save(&self, state: &UsageState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string(state)?;
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Process-local storage, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryUsageStorage {
    state: Mutex<Option<UsageState>>,
}

impl MemoryUsageStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed with a state (e.g. yesterday's counter).
    pub fn with_state(state: UsageState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }
}

impl UsageStorage for MemoryUsageStorage {
    fn load(&self) -> Result<Option<UsageState>> {
        Ok(self
            .state
            .lock()
            .map_err(|_| OrdeloError::Storage("usage storage poisoned".into()))?
            .clone())
    }

    fn save(&self, state: &UsageState) -> Result<()> {
        *self
            .state
            .lock()
            .map_err(|_| OrdeloError::Storage("usage storage poisoned".into()))? =
            Some(state.clone());
        Ok(())
    }
}
