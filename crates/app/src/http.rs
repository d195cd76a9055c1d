use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use interview_core::Clock;
use interview_core::model::{OwnerId, Session, SessionId, SessionMode, TelemetrySample, is_filled};
use services::{AnswerEntry, SessionLoopService, SessionView, StartRequest};

use crate::error::ApiError;

pub const HEALTH_PATH: &str = "/health";
pub const START_PATH: &str = "/session/start";
pub const SESSIONS_PATH: &str = "/sessions";
pub const SESSION_PATH: &str = "/session/:id";
pub const ANSWER_PATH: &str = "/session/:id/answer";
pub const SUBMIT_PATH: &str = "/session/:id/submit";
pub const COMPLETE_PATH: &str = "/session/:id/complete";
pub const EVALUATE_PATH: &str = "/session/:id/evaluate";
pub const SUMMARY_PATH: &str = "/session/:id/summary";
pub const FRAME_PATH: &str = "/session/:id/video-frame";
pub const PROGRESS_PATH: &str = "/session/:id/progress";
pub const NAVIGATE_PATH: &str = "/session/:id/navigate";

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionLoopService>,
    pub clock: Clock,
}

impl AppState {
    #[must_use]
    pub fn new(sessions: Arc<SessionLoopService>, clock: Clock) -> Self {
        Self { sessions, clock }
    }
}

/// All session routes plus the health check.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(START_PATH, post(start_session))
        .route(SESSIONS_PATH, get(list_sessions))
        .route(SESSION_PATH, get(get_session).delete(abandon_session))
        .route(ANSWER_PATH, post(answer))
        .route(SUBMIT_PATH, post(submit))
        .route(COMPLETE_PATH, post(complete))
        .route(EVALUATE_PATH, post(evaluate))
        .route(SUMMARY_PATH, post(summarize))
        .route(FRAME_PATH, post(video_frame))
        .route(PROGRESS_PATH, get(progress))
        .route(NAVIGATE_PATH, post(navigate))
        .with_state(state)
}

//
// ─── BODIES ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartBody {
    #[serde(flatten)]
    mode: SessionMode,
    #[serde(default)]
    question_count: Option<u32>,
    #[serde(default)]
    owner_id: Option<String>,
}

impl StartBody {
    fn into_request(self) -> Result<StartRequest, ApiError> {
        let blank = match &self.mode {
            SessionMode::Exam { exam_type } => {
                (!is_filled(Some(exam_type.as_str()))).then_some("examType")
            }
            SessionMode::Interview {
                company,
                role,
                experience,
            } => [("company", company), ("role", role), ("experience", experience)]
                .into_iter()
                .find(|(_, value)| !is_filled(Some(value.as_str())))
                .map(|(field, _)| field),
        };
        if let Some(field) = blank {
            return Err(ApiError::BadRequest(format!("{field} must not be blank")));
        }
        if self.question_count == Some(0) {
            return Err(ApiError::BadRequest("questionCount must be positive".into()));
        }

        let owner = self
            .owner_id
            .filter(|id| is_filled(Some(id.as_str())))
            .map_or_else(OwnerId::anonymous, OwnerId::new);
        Ok(StartRequest {
            owner,
            mode: self.mode,
            question_count: self.question_count,
        })
    }
}

/// Page size used when `limit` is omitted, and the largest one accepted.
const DEFAULT_LIST_LIMIT: u32 = 20;
const MAX_LIST_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SubmitBody {
    answers: Vec<AnswerEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    acknowledged: bool,
    submitted: usize,
    session: Session,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavigateBody {
    round_index: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameBody {
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    face_detected: bool,
    #[serde(default)]
    num_faces: u32,
    #[serde(default)]
    emotions: BTreeMap<String, f32>,
}

fn session_id(raw: &str) -> Result<SessionId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid session id: {e}")))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

//
// ─── HANDLERS ──────────────────────────────────────────────────────────────────
//

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

async fn start_session(
    State(st): State<AppState>,
    payload: Result<Json<StartBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let request = body(payload)?.into_request()?;
    let session = st.sessions.start(request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn list_sessions(
    State(st): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<Session>>, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let owner = query
        .owner
        .filter(|id| is_filled(Some(id.as_str())))
        .map_or_else(OwnerId::anonymous, OwnerId::new);
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    Ok(Json(st.sessions.list(&owner, limit).await?))
}

async fn get_session(
    State(st): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let id = session_id(&id)?;
    Ok(Json(st.sessions.session(id).await?))
}

async fn abandon_session(
    State(st): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = session_id(&id)?;
    st.sessions.abandon(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn answer(
    State(st): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<AnswerEntry>, JsonRejection>,
) -> Result<Json<Session>, ApiError> {
    let id = session_id(&id)?;
    let entry = body(payload)?;
    let session = st
        .sessions
        .answer(id, entry.round_index, entry.question_index, entry.answer)
        .await?;
    Ok(Json(session))
}

async fn submit(
    State(st): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<SubmitBody>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let id = session_id(&id)?;
    let outcome = st.sessions.submit(id, body(payload)?.answers).await?;
    Ok(Json(SubmitResponse {
        acknowledged: true,
        submitted: outcome.submitted,
        session: outcome.session,
    }))
}

async fn complete(
    State(st): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let id = session_id(&id)?;
    Ok(Json(st.sessions.complete(id).await?))
}

async fn evaluate(
    State(st): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let id = session_id(&id)?;
    Ok(Json(st.sessions.evaluate(id).await?))
}

async fn summarize(
    State(st): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let id = session_id(&id)?;
    Ok(Json(st.sessions.summarize(id).await?))
}

/// Accepts every frame. Malformed or unknown input is dropped after logging.
async fn video_frame(
    State(st): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<FrameBody>, JsonRejection>,
) -> StatusCode {
    let (id, frame) = match session_id(&id).and_then(|parsed| Ok((parsed, body(payload)?))) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::debug!(session_id = %id, error = %err, "video frame dropped");
            return StatusCode::ACCEPTED;
        }
    };
    let sample = TelemetrySample {
        timestamp: frame.timestamp.unwrap_or_else(|| st.clock.now()),
        face_detected: frame.face_detected,
        num_faces: frame.num_faces,
        emotions: frame.emotions,
        simulated: false,
    };
    let outcome = st.sessions.record_frame(id, sample).await;
    tracing::trace!(session_id = %id, ?outcome, "video frame handled");
    StatusCode::ACCEPTED
}

async fn progress(
    State(st): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let id = session_id(&id)?;
    Ok(Json(st.sessions.view(id).await?))
}

async fn navigate(
    State(st): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<NavigateBody>, JsonRejection>,
) -> Result<Json<SessionView>, ApiError> {
    let id = session_id(&id)?;
    let target = body(payload)?.round_index;
    Ok(Json(st.sessions.navigate(id, target).await?))
}
