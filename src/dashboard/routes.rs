//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engine::{AlertRecord, Engine, GameStatus, ALERT_HISTORY_LIMIT};
use crate::types::EngineError;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub engine: Arc<Engine>,
    pub started_at: DateTime<Utc>,
}

impl DashboardState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            started_at: Utc::now(),
        }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub generated_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub games: Vec<GameStatus>,
    /// Games excluded at load time, with the validation error.
    pub rejected: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorBody>)>;

fn api_error(err: EngineError) -> (StatusCode, Json<ErrorBody>) {
    let status = match &err {
        EngineError::UnknownGame(_) => StatusCode::NOT_FOUND,
        EngineError::Config { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    let now = Utc::now();
    let games = state.engine.status(now).await.map_err(api_error)?;
    let rejected = state
        .engine
        .rejected()
        .iter()
        .map(|(id, e)| (id.clone(), e.to_string()))
        .collect();

    Ok(Json(StatusResponse {
        generated_at: now,
        uptime_secs: (now - state.started_at).num_seconds(),
        games,
        rejected,
    }))
}

/// GET /api/history?limit=N
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<AlertRecord>> {
    let limit = query.limit.unwrap_or(ALERT_HISTORY_LIMIT).min(500);
    let history = state.engine.alert_history(limit).await.map_err(api_error)?;
    Ok(Json(history))
}

/// GET /api/games/:id
pub async fn get_game(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> ApiResult<GameStatus> {
    let status = state
        .engine
        .game_status(&game_id, Utc::now())
        .await
        .map_err(api_error)?;
    Ok(Json(status))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
