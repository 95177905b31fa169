//! HTTP API server for the IVR tutor

pub mod audio;
pub mod health;
pub mod webhooks;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::audio::AudioPublisher;
use crate::ivr::CallFlow;
use crate::recovery::ErrorTracker;
use crate::session::SessionStore;

/// Shared state for every route
pub struct AppState {
    pub flow: Arc<CallFlow>,
    pub publisher: Arc<AudioPublisher>,
    pub sessions: Arc<dyn SessionStore>,
    pub tracker: Arc<ErrorTracker>,
}

/// Build the router with all routes
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(webhooks::router(Arc::clone(&state)))
        .merge(audio::router(Arc::clone(&state)))
        .merge(health::router(state))
        .layer(TraceLayer::new_for_http())
}

/// API server
pub struct ApiServer {
    state: Arc<AppState>,
    host: String,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub fn new(state: Arc<AppState>, host: impl Into<String>, port: u16) -> Self {
        Self {
            state,
            host: host.into(),
            port,
        }
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server on {addr}: {e}")))?;

        tracing::info!(host = %self.host, port = self.port, "API server listening");

        axum::serve(listener, router(self.state))
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
