use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::Serialize;

use crate::{
    analysis::{JobParameters, JobStatus},
    db::{Round, RoundsListing, Session},
    error::{Result, ScoutError},
    AppState,
};

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub message: String,
    pub job_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRoundsResponse {
    pub session_id: String,
    pub rounds: Vec<Round>,
}

/// Single-session shape older dashboards poll.
#[derive(Debug, Serialize)]
pub struct LegacyRoundsResponse {
    pub rounds: Vec<Round>,
}

pub async fn health() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "vlrscout analysis service is running".into(),
    })
}

pub async fn start_analysis(
    State(state): State<AppState>,
    payload: std::result::Result<Json<JobParameters>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>> {
    let Json(params) =
        payload.map_err(|rejection| ScoutError::InvalidParameters(rejection.body_text()))?;
    let job_id = state.controller.start(params).await?;
    Ok(Json(AnalyzeResponse {
        message: "Analysis started".into(),
        job_id,
    }))
}

pub async fn stop_analysis(State(state): State<AppState>) -> Json<MessageResponse> {
    let message = if state.controller.stop().await {
        "Stop requested"
    } else {
        "No analysis is running"
    };
    Json(MessageResponse {
        message: message.into(),
    })
}

pub async fn get_status(State(state): State<AppState>) -> Json<JobStatus> {
    Json(state.controller.status())
}

pub async fn list_rounds(State(state): State<AppState>) -> Result<Json<RoundsListing>> {
    Ok(Json(state.db.list_sessions_with_rounds().await?))
}

pub async fn list_latest_rounds(State(state): State<AppState>) -> Result<Json<LegacyRoundsResponse>> {
    let rounds = match state.db.latest_session().await? {
        Some(session) => state.db.list_rounds_for(&session.session_id).await?,
        None => Vec::new(),
    };
    Ok(Json(LegacyRoundsResponse { rounds }))
}

pub async fn list_sessions(State(state): State<AppState>) -> Result<Json<Vec<Session>>> {
    Ok(Json(state.db.list_sessions().await?))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>> {
    state
        .db
        .get_session(&session_id)
        .await?
        .map(Json)
        .ok_or_else(|| ScoutError::NotFound(format!("session {session_id}")))
}

pub async fn get_session_rounds(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionRoundsResponse>> {
    if state.db.get_session(&session_id).await?.is_none() {
        return Err(ScoutError::NotFound(format!("session {session_id}")));
    }
    let rounds = state.db.list_rounds_for(&session_id).await?;
    Ok(Json(SessionRoundsResponse { session_id, rounds }))
}
