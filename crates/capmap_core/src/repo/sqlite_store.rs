//! SQLite-backed store shared by the workspace, map and node contracts.
//!
//! # Responsibility
//! - Own one migrated connection and serialize access to it.
//! - Verify schema readiness before any query runs.
//!
//! # Invariants
//! - The connection lock is never held across an await point; every trait
//!   method runs its SQL inside one synchronous `with_conn` call.

use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

use super::store::{StoreError, StoreResult};
use crate::db::migrations::latest_version;
use crate::db::{open_db, open_db_in_memory};

const REQUIRED_TABLES: [&str; 5] = [
    "workspaces",
    "workspace_owners",
    "workspace_maps",
    "maps",
    "nodes",
];

/// Store implementing `WorkspaceStore`, `MapStore` and `NodeStore`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Wraps an already migrated connection.
    pub fn try_new(conn: Connection) -> StoreResult<Self> {
        ensure_connection_ready(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::try_new(open_db(path)?)
    }

    /// Opens an isolated in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    pub(crate) fn with_conn<T>(
        &self,
        work: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        work(&conn)
    }
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn parse_flag(value: i64, column: &'static str) -> StoreResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StoreError::InvalidData(format!(
            "invalid boolean `{other}` in {column}"
        ))),
    }
}

pub(crate) fn version_to_sql(version: u64) -> StoreResult<i64> {
    i64::try_from(version)
        .map_err(|_| StoreError::InvalidData(format!("taxonomy version {version} out of range")))
}

pub(crate) fn version_from_sql(value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| {
        StoreError::InvalidData(format!(
            "invalid taxonomy version `{value}` in workspaces.taxonomy_version"
        ))
    })
}

fn ensure_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in REQUIRED_TABLES {
        let exists: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(StoreError::MissingRequiredTable(table));
        }
    }
    Ok(())
}
