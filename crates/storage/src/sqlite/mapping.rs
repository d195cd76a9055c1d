use interview_core::model::{Session, TelemetrySample};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// JSON document for the `sessions.document` column.
///
/// Telemetry is stripped; it is stored row by row in `telemetry_samples`.
pub(crate) fn session_document(session: &Session) -> Result<String, StorageError> {
    let mut stored = session.clone();
    stored.replace_telemetry(Vec::new());
    serde_json::to_string(&stored).map_err(ser)
}

pub(crate) fn map_session_row(row: &sqlx::sqlite::SqliteRow) -> Result<Session, StorageError> {
    let document: String = row.try_get("document").map_err(ser)?;
    let session: Session = serde_json::from_str(&document).map_err(ser)?;
    session.validate()?;
    Ok(session)
}

pub(crate) fn sample_payload(sample: &TelemetrySample) -> Result<String, StorageError> {
    serde_json::to_string(sample).map_err(ser)
}

pub(crate) fn map_sample_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<TelemetrySample, StorageError> {
    let payload: String = row.try_get("payload").map_err(ser)?;
    serde_json::from_str(&payload).map_err(ser)
}

pub(crate) fn bool_to_i64(value: bool) -> i64 {
    i64::from(value)
}
