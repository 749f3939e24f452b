//! Durable, crash-safe repository for items, sessions, tasks, and workflow
//! results, with full-text search.
//!
//! Backed by SQLite (WAL). Every public operation runs as one transaction;
//! the FTS index is maintained inside the same transaction as the row
//! writes, so readers never observe an item without its search entry.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;

use fc_domain::{Error, Result};

mod items;
mod schema;
mod sessions;
mod tasks;

pub use items::ItemFilter;
pub use sessions::SessionFilter;

/// Map a SQLite error into the domain error space.
pub(crate) fn db_err(e: rusqlite::Error) -> Error {
    Error::StoreIo(e.to_string())
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::StoreIo(format!("bad timestamp {raw:?}: {e}")))
}

pub(crate) fn parse_uuid(raw: &str) -> Result<uuid::Uuid> {
    raw.parse()
        .map_err(|e| Error::StoreIo(format!("bad uuid {raw:?}: {e}")))
}

/// The persistent store. Cheap to share behind an `Arc`; all operations
/// serialize on an internal connection lock and commit atomically.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        schema::init(&conn)?;
        tracing::info!(path = %path.display(), "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` inside a transaction, committing on `Ok`.
    pub(crate) fn with_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        let out = f(&tx)?;
        tx.commit().map_err(db_err)?;
        Ok(out)
    }
}
