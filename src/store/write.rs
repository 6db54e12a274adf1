use rusqlite::params;

use super::{DiagnosisStore, StoreError, map_sql_error};
use crate::diagnosis::DiagnosisResult;

impl DiagnosisStore {
    /// Append one diagnosis record to the history.
    ///
    /// Records are immutable; inserting the same id twice is an error.
    pub fn insert(&self, record: &DiagnosisResult) -> Result<(), StoreError> {
        let mut stmt = self
            .connection()
            .prepare_cached(
                "INSERT INTO diagnoses (
                    id, device_id, label, confidence, grade,
                    model_id, model_version, duration_seconds, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .map_err(map_sql_error)?;
        stmt.execute(params![
            record.id.to_string(),
            record.device_id,
            record.label.as_str(),
            f64::from(record.confidence),
            record.grade.as_str(),
            record.model_id,
            record.model_version,
            f64::from(record.duration_seconds),
            record.created_at,
        ])
        .map_err(map_sql_error)?;
        Ok(())
    }
}
