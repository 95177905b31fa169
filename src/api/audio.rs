//! Published audio endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};

use super::AppState;
use crate::audio::AudioStats;

/// Serve a stored audio object, or 404 once it has expired
async fn get_audio(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> Response {
    match state.publisher.get(&key) {
        Some(object) => (
            [
                (header::CONTENT_TYPE, object.content_type),
                (header::CACHE_CONTROL, "no-store"),
            ],
            Bytes::copy_from_slice(&object.bytes),
        )
            .into_response(),
        None => {
            tracing::debug!(key = %key, "audio not found");
            (StatusCode::NOT_FOUND, "audio not found").into_response()
        }
    }
}

async fn audio_stats(State(state): State<Arc<AppState>>) -> Json<AudioStats> {
    Json(state.publisher.stats())
}

/// Build audio router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/audio/{key}", get(get_audio))
        .route("/audio-storage/stats", get(audio_stats))
        .with_state(state)
}
