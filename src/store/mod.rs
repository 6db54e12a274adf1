//! Append-only SQLite store for diagnosis history.
//!
//! Records are inserted once and never updated or deleted; the dashboard and
//! reporting layers read from here.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use thiserror::Error;

/// Read-side queries over the diagnosis history.
pub mod read;
/// Schema management for the history database.
pub mod schema;
/// Insert helpers for new diagnosis records.
pub mod write;

/// Current schema version written to the metadata table.
pub const SCHEMA_VERSION: &str = "1";
/// Metadata key holding the schema version.
pub const META_SCHEMA_VERSION: &str = "schema_version";

/// Errors raised by the diagnosis history store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file could not be opened or created.
    #[error("Failed to open diagnosis database {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },
    /// The directory holding the database could not be created.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Another writer holds the database lock.
    #[error("Diagnosis database is busy")]
    Busy,
    /// A stored row could not be interpreted.
    #[error("Diagnosis database row is malformed: {0}")]
    Corrupt(String),
    /// Any other SQLite failure.
    #[error("Diagnosis database query failed: {0}")]
    Sql(rusqlite::Error),
}

/// Translate rusqlite errors into friendlier store variants.
pub(crate) fn map_sql_error(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(sql_err, _)
            if sql_err.extended_code == rusqlite::ffi::SQLITE_BUSY =>
        {
            StoreError::Busy
        }
        other => StoreError::Sql(other),
    }
}

/// Handle on the diagnosis history database.
pub struct DiagnosisStore {
    connection: Connection,
}

impl DiagnosisStore {
    /// Open (and create if needed) the history database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let connection = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::prepare(connection)
    }

    /// Open an in-memory database; used by tests and ad-hoc tooling.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory().map_err(map_sql_error)?;
        Self::prepare(connection)
    }

    fn prepare(connection: Connection) -> Result<Self, StoreError> {
        connection
            .busy_timeout(std::time::Duration::from_secs(5))
            .map_err(map_sql_error)?;
        schema::apply_schema(&connection)?;
        Ok(Self { connection })
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("history.db");
        let store = DiagnosisStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn reopen_preserves_schema_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.db");
        drop(DiagnosisStore::open(&path).unwrap());
        let store = DiagnosisStore::open(&path).unwrap();
        let version: String = store
            .connection()
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                [META_SCHEMA_VERSION],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
