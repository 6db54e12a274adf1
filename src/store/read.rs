use rusqlite::Row;
use uuid::Uuid;

use super::{DiagnosisStore, StoreError, map_sql_error};
use crate::classifier::{ConfidenceGrade, FaultLabel};
use crate::diagnosis::DiagnosisResult;

impl DiagnosisStore {
    /// The most recent diagnoses for one device, newest first.
    pub fn recent_for_device(
        &self,
        device_id: &str,
        limit: usize,
    ) -> Result<Vec<DiagnosisResult>, StoreError> {
        let mut stmt = self
            .connection()
            .prepare_cached(
                "SELECT id, device_id, label, confidence, grade,
                        model_id, model_version, duration_seconds, created_at
                 FROM diagnoses
                 WHERE device_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2",
            )
            .map_err(map_sql_error)?;
        let rows = stmt
            .query_map(
                rusqlite::params![device_id, limit as i64],
                row_to_raw_record,
            )
            .map_err(map_sql_error)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(parse_record(row.map_err(map_sql_error)?)?);
        }
        Ok(records)
    }

    /// How often each fault label appears across the whole history.
    ///
    /// Labels with no occurrences are omitted; rows with ids no current
    /// label maps to are reported as corrupt.
    pub fn label_distribution(&self) -> Result<Vec<(FaultLabel, u64)>, StoreError> {
        let mut stmt = self
            .connection()
            .prepare_cached(
                "SELECT label, COUNT(*) FROM diagnoses
                 GROUP BY label
                 ORDER BY COUNT(*) DESC, label ASC",
            )
            .map_err(map_sql_error)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(map_sql_error)?;

        let mut distribution = Vec::new();
        for row in rows {
            let (label_id, count) = row.map_err(map_sql_error)?;
            let label = FaultLabel::from_id(&label_id)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown fault label {label_id:?}")))?;
            distribution.push((label, count.max(0) as u64));
        }
        Ok(distribution)
    }

    /// Total number of diagnoses in the history.
    pub fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .connection()
            .query_row("SELECT COUNT(*) FROM diagnoses", [], |row| row.get(0))
            .map_err(map_sql_error)?;
        Ok(count.max(0) as u64)
    }
}

/// Column values of one diagnosis row, before id and enum parsing.
struct RawRecord {
    id: String,
    device_id: String,
    label: String,
    confidence: f64,
    grade: String,
    model_id: String,
    model_version: i64,
    duration_seconds: f64,
    created_at: i64,
}

fn row_to_raw_record(row: &Row<'_>) -> Result<RawRecord, rusqlite::Error> {
    Ok(RawRecord {
        id: row.get(0)?,
        device_id: row.get(1)?,
        label: row.get(2)?,
        confidence: row.get(3)?,
        grade: row.get(4)?,
        model_id: row.get(5)?,
        model_version: row.get(6)?,
        duration_seconds: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn parse_record(raw: RawRecord) -> Result<DiagnosisResult, StoreError> {
    let id = Uuid::parse_str(&raw.id)
        .map_err(|err| StoreError::Corrupt(format!("invalid diagnosis id {:?}: {err}", raw.id)))?;
    let label = FaultLabel::from_id(&raw.label)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown fault label {:?}", raw.label)))?;
    let grade = ConfidenceGrade::from_id(&raw.grade)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown confidence grade {:?}", raw.grade)))?;
    Ok(DiagnosisResult {
        id,
        device_id: raw.device_id,
        label,
        confidence: raw.confidence as f32,
        grade,
        model_id: raw.model_id,
        model_version: raw.model_version,
        duration_seconds: raw.duration_seconds as f32,
        created_at: raw.created_at,
    })
}
