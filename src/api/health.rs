//! Health and diagnostics endpoints

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use super::AppState;
use crate::audio::AudioStats;
use crate::recovery::ErrorSummary;
use crate::session::SessionStats;

/// Most recent error events included in `/stats`
const RECENT_ERRORS: usize = 20;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Diagnostics across sessions, audio and errors
#[derive(Serialize)]
pub struct StatsResponse {
    pub version: &'static str,
    pub sessions: SessionStats,
    pub audio: AudioStats,
    pub errors: ErrorSummary,
}

/// Liveness probe - is the service running?
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.sessions.stats().await,
        audio: state.publisher.stats(),
        errors: state.tracker.summary(RECENT_ERRORS),
    })
}

/// Build health router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .with_state(state)
}
