use interview_core::model::{OwnerId, Session, SessionId, TelemetrySample};

use super::SqliteRepository;
use super::mapping::{
    bool_to_i64, conn, map_sample_row, map_session_row, sample_payload, session_document,
};
use crate::repository::{
    AnswerRecord, SessionRepository, StorageError, apply_answer_records,
    ensure_completion_monotonic,
};

impl SqliteRepository {
    async fn ensure_exists(&self, id: SessionId) -> Result<(), StorageError> {
        sqlx::query("SELECT 1 FROM sessions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn insert_session(&self, session: &Session) -> Result<(), StorageError> {
        let document = session_document(session)?;
        let res = sqlx::query(
            r"
                INSERT INTO sessions (
                    id, owner_id, mode, stage, is_completed, document, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(id) DO NOTHING
            ",
        )
        .bind(session.id().to_string())
        .bind(session.owner().as_str())
        .bind(session.mode().label())
        .bind(session.stage().as_str())
        .bind(bool_to_i64(session.is_completed()))
        .bind(document)
        .bind(session.created_at())
        .bind(session.updated_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::Conflict(format!(
                "session {} already exists",
                session.id()
            )));
        }
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<Session, StorageError> {
        let row = sqlx::query("SELECT document FROM sessions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        let mut session = map_session_row(&row)?;
        session.replace_telemetry(self.list_telemetry(id).await?);
        Ok(session)
    }

    async fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let row = sqlx::query("SELECT document FROM sessions WHERE id = ?1")
            .bind(session.id().to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        let stored = map_session_row(&row)?;
        ensure_completion_monotonic(&stored, session)?;

        sqlx::query(
            r"
                UPDATE sessions
                SET stage = ?2, is_completed = ?3, document = ?4, updated_at = ?5
                WHERE id = ?1
            ",
        )
        .bind(session.id().to_string())
        .bind(session.stage().as_str())
        .bind(bool_to_i64(session.is_completed()))
        .bind(session_document(session)?)
        .bind(session.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn record_answers(
        &self,
        id: SessionId,
        answers: &[AnswerRecord],
    ) -> Result<Session, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let row = sqlx::query("SELECT document FROM sessions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        let mut session = map_session_row(&row)?;
        apply_answer_records(&mut session, answers)?;

        sqlx::query("UPDATE sessions SET document = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id.to_string())
            .bind(session_document(&session)?)
            .bind(session.updated_at())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        tx.commit().await.map_err(conn)?;

        session.replace_telemetry(self.list_telemetry(id).await?);
        Ok(session)
    }

    async fn append_telemetry(
        &self,
        id: SessionId,
        sample: &TelemetrySample,
    ) -> Result<(), StorageError> {
        self.ensure_exists(id).await?;
        sqlx::query(
            r"
                INSERT INTO telemetry_samples (session_id, recorded_at, simulated, payload)
                VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(id.to_string())
        .bind(sample.timestamp)
        .bind(bool_to_i64(sample.simulated))
        .bind(sample_payload(sample)?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn list_telemetry(&self, id: SessionId) -> Result<Vec<TelemetrySample>, StorageError> {
        self.ensure_exists(id).await?;
        let rows = sqlx::query(
            r"
                SELECT payload
                FROM telemetry_samples
                WHERE session_id = ?1
                ORDER BY id ASC
            ",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_sample_row(&row)?);
        }
        Ok(out)
    }

    async fn list_sessions(
        &self,
        owner: &OwnerId,
        limit: u32,
    ) -> Result<Vec<Session>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT document
                FROM sessions
                WHERE owner_id = ?1
                ORDER BY created_at DESC, id DESC
                LIMIT ?2
            ",
        )
        .bind(owner.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_session_row(&row)?);
        }
        Ok(out)
    }
}
