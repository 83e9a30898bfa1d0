//! Persistent recipe store.
//!
//! A SQLite database holding three independent collections:
//!
//! - `recipes`: single recipes keyed by id, plus the `"random"` sentinel
//!   holding the last random batch
//! - `searches`: search results keyed by normalized query
//! - `cuisines`: cuisine results keyed by lower-cased cuisine
//!
//! Every record carries a `written_at` timestamp stamped by the store on
//! each [`put`](RecipeStore::put); callers never supply it. Each table has
//! an index on `written_at` so [`delete_older_than`](RecipeStore::delete_older_than)
//! is a range delete rather than a scan.
//!
//! All operations run on tokio's blocking pool and serialize on the
//! connection mutex.

mod schema;

pub use schema::SCHEMA_VERSION;

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::{OrdeloError, Result};

/// File name used under the cache directory.
pub const DEFAULT_DB_FILE: &str = "ordelo-recipe-cache.sqlite3";

/// One of the store's independent collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Recipes,
    Searches,
    Cuisines,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Recipes,
        Collection::Searches,
        Collection::Cuisines,
    ];

    /// Table name.
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Recipes => "recipes",
            Collection::Searches => "searches",
            Collection::Cuisines => "cuisines",
        }
    }

    /// Natural-key column.
    pub fn key_column(&self) -> &'static str {
        match self {
            Collection::Recipes => "id",
            Collection::Searches => "query",
            Collection::Cuisines => "cuisine",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A record read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: String,
    pub payload: Value,
    pub written_at: DateTime<Utc>,
}

impl StoredRecord {
    /// Age relative to `now` (negative if the clock went backwards).
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.written_at
    }

    /// Decode the payload into a concrete type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// SQLite-backed store for recipe payloads.
#[derive(Clone)]
pub struct RecipeStore {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl RecipeStore {
    /// Open (or create) the database at `path` and upgrade its schema.
    ///
    /// Any failure is reported as [`OrdeloError::StorageUnavailable`]: the
    /// caller should run without a cache rather than abort.
    pub fn open(path: &Path, clock: Arc<dyn Clock>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                OrdeloError::StorageUnavailable(format!(
                    "failed to create store dir {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let conn = Connection::open(path).map_err(|e| {
            OrdeloError::StorageUnavailable(format!("failed to open {}: {e}", path.display()))
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| OrdeloError::StorageUnavailable(format!("PRAGMA failed: {e}")))?;

        let store = Self::init(conn, clock)?;
        info!(path = %path.display(), "recipe store opened");
        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| OrdeloError::StorageUnavailable(e.to_string()))?;
        Self::init(conn, clock)
    }

    fn init(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        let found = schema::migrate(&conn)
            .map_err(|e| OrdeloError::StorageUnavailable(e.to_string()))?;
        if found < SCHEMA_VERSION {
            debug!(from = found, to = SCHEMA_VERSION, "upgraded store schema");
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    /// Schema version recorded in the database.
    pub async fn schema_version(&self) -> Result<i32> {
        self.with_conn(|conn| Ok(schema::stored_version(conn)?))
            .await
    }

    /// Upsert `payload` under `key`, stamping `written_at = now`.
    ///
    /// Returns the timestamp written.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        collection: Collection,
        key: &str,
        payload: &T,
    ) -> Result<DateTime<Utc>> {
        let json = serde_json::to_string(payload)?;
        let now = self.clock.now();
        let written_at = now.timestamp_millis();
        let key = key.to_owned();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO {} ({}, payload, written_at) VALUES (?1, ?2, ?3)",
                    collection.name(),
                    collection.key_column()
                ),
                params![key, json, written_at],
            )?;
            Ok(())
        })
        .await?;
        Ok(now)
    }

    /// Look up a record by key.
    ///
    /// Absence is `Ok(None)`. A record that fails validation is deleted and
    /// reported as [`OrdeloError::MalformedCacheEntry`].
    pub async fn get(&self, collection: Collection, key: &str) -> Result<Option<StoredRecord>> {
        let key = key.to_owned();
        self.with_conn(move |conn| {
            let row: Option<(String, i64)> = conn
                .query_row(
                    &format!(
                        "SELECT payload, written_at FROM {} WHERE {} = ?1",
                        collection.name(),
                        collection.key_column()
                    ),
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((payload, written_at)) = row else {
                return Ok(None);
            };

            match parse_record(collection, key.clone(), &payload, written_at) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    delete_key(conn, collection, &key)?;
                    warn!(%collection, key = %key, error = %e, "dropped malformed cache entry");
                    Err(e)
                }
            }
        })
        .await
    }

    /// Every record in the collection, in no particular order.
    ///
    /// Malformed rows are skipped with a warning.
    pub async fn get_all(&self, collection: Collection) -> Result<Vec<StoredRecord>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {}, payload, written_at FROM {}",
                collection.key_column(),
                collection.name()
            ))?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?;

            let mut records = Vec::new();
            for row in rows {
                let (key, payload, written_at) = row?;
                match parse_record(collection, key, &payload, written_at) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!(%collection, error = %e, "skipping malformed cache entry"),
                }
            }
            Ok(records)
        })
        .await
    }

    /// Delete one record. Returns whether it existed.
    pub async fn delete(&self, collection: Collection, key: &str) -> Result<bool> {
        let key = key.to_owned();
        self.with_conn(move |conn| Ok(delete_key(conn, collection, &key)? > 0))
            .await
    }

    /// Delete every record with `now - written_at > max_age`.
    ///
    /// Returns the number of records deleted.
    pub async fn delete_older_than(&self, collection: Collection, max_age: Duration) -> Result<usize> {
        let cutoff = self.clock.now_millis().saturating_sub(max_age.num_milliseconds());
        self.with_conn(move |conn| {
            let deleted = conn.execute(
                &format!("DELETE FROM {} WHERE written_at < ?1", collection.name()),
                params![cutoff],
            )?;
            Ok(deleted)
        })
        .await
    }

    /// Number of records in the collection.
    pub async fn count(&self, collection: Collection) -> Result<usize> {
        self.with_conn(move |conn| {
            let n: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", collection.name()),
                [],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        })
        .await
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| OrdeloError::Storage("store connection poisoned".into()))?;
            f(&conn)
        })
        .await
        .map_err(|e| OrdeloError::Storage(format!("store task failed: {e}")))?
    }
}

fn parse_record(
    collection: Collection,
    key: String,
    payload: &str,
    written_at: i64,
) -> Result<StoredRecord> {
    let malformed = |reason: String| OrdeloError::MalformedCacheEntry {
        collection: collection.name(),
        key: key.clone(),
        reason,
    };

    let payload: Value =
        serde_json::from_str(payload).map_err(|e| malformed(format!("invalid payload: {e}")))?;
    let written_at = DateTime::from_timestamp_millis(written_at)
        .ok_or_else(|| malformed(format!("invalid written_at {written_at}")))?;

    Ok(StoredRecord {
        key,
        payload,
        written_at,
    })
}

fn delete_key(conn: &Connection, collection: Collection, key: &str) -> Result<usize> {
    Ok(conn.execute(
        &format!(
            "DELETE FROM {} WHERE {} = ?1",
            collection.name(),
            collection.key_column()
        ),
        params![key],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn store() -> (RecipeStore, ManualClock) {
        let clock = ManualClock::starting_now();
        let store = RecipeStore::open_in_memory(Arc::new(clock.clone())).unwrap();
        (store, clock)
    }

    #[tokio::test]
    async fn get_missing_key_returns_none() {
        let (store, _) = store();
        assert!(store.get(Collection::Recipes, "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_stamps_written_at_from_clock() {
        let (store, clock) = store();
        let written = store
            .put(Collection::Searches, "pasta", &json!([{ "id": 1 }]))
            .await
            .unwrap();
        assert_eq!(written.timestamp_millis(), clock.now_millis());

        let record = store.get(Collection::Searches, "pasta").await.unwrap().unwrap();
        assert_eq!(record.written_at.timestamp_millis(), clock.now_millis());
        assert_eq!(record.payload, json!([{ "id": 1 }]));
    }

    #[tokio::test]
    async fn put_overwrites_and_restamps() {
        let (store, clock) = store();
        store.put(Collection::Recipes, "5", &json!({ "v": 1 })).await.unwrap();
        clock.advance(Duration::hours(2));
        store.put(Collection::Recipes, "5", &json!({ "v": 2 })).await.unwrap();

        let record = store.get(Collection::Recipes, "5").await.unwrap().unwrap();
        assert_eq!(record.payload["v"], 2);
        assert_eq!(record.age(clock.now()), Duration::zero());
        assert_eq!(store.count(Collection::Recipes).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn collections_are_independent() {
        let (store, _) = store();
        store.put(Collection::Searches, "thai", &json!([])).await.unwrap();
        assert!(store.get(Collection::Cuisines, "thai").await.unwrap().is_none());
        assert_eq!(store.count(Collection::Searches).await.unwrap(), 1);
        assert_eq!(store.count(Collection::Cuisines).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_older_than_with_huge_age_keeps_everything() {
        let (store, clock) = store();
        store.put(Collection::Recipes, "1", &json!({ "id": 1 })).await.unwrap();
        clock.advance(Duration::days(400));

        let deleted = store
            .delete_older_than(Collection::Recipes, Duration::MAX)
            .await
            .unwrap();
        assert_eq!(deleted, 0);
        assert_eq!(store.count(Collection::Recipes).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_older_than_removes_only_expired() {
        let (store, clock) = store();
        store.put(Collection::Cuisines, "old", &json!([])).await.unwrap();
        clock.advance(Duration::hours(30));
        store.put(Collection::Cuisines, "new", &json!([])).await.unwrap();
        clock.advance(Duration::hours(1));

        let deleted = store
            .delete_older_than(Collection::Cuisines, Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get(Collection::Cuisines, "old").await.unwrap().is_none());
        assert!(store.get(Collection::Cuisines, "new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn get_all_returns_every_record() {
        let (store, _) = store();
        for key in ["a", "b", "c"] {
            store.put(Collection::Searches, key, &json!([])).await.unwrap();
        }
        let mut keys: Vec<_> = store
            .get_all(Collection::Searches)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn malformed_payload_is_deleted_on_read() {
        let (store, clock) = store();
        let now = clock.now_millis();
        store
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO recipes (id, payload, written_at) VALUES ('9', 'not json', ?1)",
                    params![now],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let err = store.get(Collection::Recipes, "9").await.unwrap_err();
        assert!(matches!(err, OrdeloError::MalformedCacheEntry { .. }));
        assert_eq!(store.count(Collection::Recipes).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reopen_file_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(DEFAULT_DB_FILE);
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());

        {
            let store = RecipeStore::open(&path, clock.clone()).unwrap();
            store.put(Collection::Recipes, "42", &json!({ "id": 42 })).await.unwrap();
        }

        let store = RecipeStore::open(&path, clock).unwrap();
        assert_eq!(store.schema_version().await.unwrap(), SCHEMA_VERSION);
        assert!(store.get(Collection::Recipes, "42").await.unwrap().is_some());
    }

    #[test]
    fn unopenable_path_is_storage_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a database file.
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let err = RecipeStore::open(dir.path(), clock).err().unwrap();
        assert!(matches!(err, OrdeloError::StorageUnavailable(_)));
    }
}
