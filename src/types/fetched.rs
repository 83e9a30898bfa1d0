//! Result wrapper carrying cache provenance

use serde::{Deserialize, Serialize};

/// Where a [`Fetched`] value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Served from the persistent store.
    Cache,
    /// Fetched from the recipe source during this call.
    Remote,
}

/// Data returned by a gateway operation.
///
/// `is_stale` is derived at read time and never stored: it is set when the
/// record is older than its collection's window (a background refresh may
/// be running, or the tracker is in cache-only mode).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fetched<T> {
    pub data: T,
    pub is_stale: bool,
    pub origin: Origin,
}

impl<T> Fetched<T> {
    /// A fresh value read from the store.
    pub fn cached(data: T) -> Self {
        Self {
            data,
            is_stale: false,
            origin: Origin::Cache,
        }
    }

    /// A stale value read from the store.
    pub fn stale(data: T) -> Self {
        Self {
            data,
            is_stale: true,
            origin: Origin::Cache,
        }
    }

    /// A value obtained from the recipe source.
    pub fn remote(data: T) -> Self {
        Self {
            data,
            is_stale: false,
            origin: Origin::Remote,
        }
    }

    /// Whether the value came out of the store.
    pub fn from_cache(&self) -> bool {
        self.origin == Origin::Cache
    }

    /// Discard provenance.
    pub fn into_inner(self) -> T {
        self.data
    }
}
