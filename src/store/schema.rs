//! Store schema and version upgrades.
//!
//! The schema version lives in `PRAGMA user_version`. Opening a database
//! runs every upgrade step between the stored version and
//! [`SCHEMA_VERSION`]; each step only creates what is missing, so existing
//! collections and their records survive.

use rusqlite::Connection;

use super::Collection;

pub const SCHEMA_VERSION: i32 = 1;

/// Why a database could not be brought to [`SCHEMA_VERSION`].
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// The file was written by a newer release.
    #[error("database schema version {found} is newer than supported version {SCHEMA_VERSION}")]
    TooNew { found: i32 },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Read the stored schema version (0 for a new database).
pub fn stored_version(conn: &Connection) -> rusqlite::Result<i32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

/// Bring the database up to [`SCHEMA_VERSION`].
///
/// Returns the version found before upgrading.
pub fn migrate(conn: &Connection) -> Result<i32, MigrationError> {
    let found = stored_version(conn)?;
    if found > SCHEMA_VERSION {
        return Err(MigrationError::TooNew { found });
    }

    for version in (found + 1)..=SCHEMA_VERSION {
        let tx = conn.unchecked_transaction()?;
        apply(&tx, version)?;
        tx.execute_batch(&format!("PRAGMA user_version = {version};"))?;
        tx.commit()?;
    }

    Ok(found)
}

fn apply(conn: &Connection, version: i32) -> rusqlite::Result<()> {
    match version {
        1 => {
            for collection in Collection::ALL {
                create_collection(conn, collection)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Create a collection table and its `written_at` index if missing.
fn create_collection(conn: &Connection, collection: Collection) -> rusqlite::Result<()> {
    let table = collection.name();
    let key = collection.key_column();
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            {key} TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            written_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_{table}_written_at ON {table}(written_at);"
    ))
}
