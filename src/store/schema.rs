use rusqlite::Connection;

use super::{META_SCHEMA_VERSION, SCHEMA_VERSION, StoreError, map_sql_error};

pub(super) fn apply_schema(connection: &Connection) -> Result<(), StoreError> {
    connection
        .execute_batch(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
             CREATE TABLE IF NOT EXISTS diagnoses (
                id TEXT PRIMARY KEY,
                device_id TEXT NOT NULL,
                label TEXT NOT NULL,
                confidence REAL NOT NULL,
                grade TEXT NOT NULL,
                model_id TEXT NOT NULL,
                model_version INTEGER NOT NULL,
                duration_seconds REAL NOT NULL,
                created_at INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_diagnoses_device_created
                ON diagnoses (device_id, created_at);
             CREATE INDEX IF NOT EXISTS idx_diagnoses_label
                ON diagnoses (label);",
        )
        .map_err(map_sql_error)?;

    let mut stmt = connection
        .prepare_cached(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .map_err(map_sql_error)?;
    stmt.execute([META_SCHEMA_VERSION, SCHEMA_VERSION])
        .map_err(map_sql_error)?;
    Ok(())
}
