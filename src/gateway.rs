//! Gateway - the main IVR service
//!
//! Wires configuration into the pipeline, call flow and HTTP API, then runs
//! the periodic housekeeping tasks until interrupted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::api::{ApiServer, AppState};
use crate::audio::AudioPublisher;
use crate::ivr::CallFlow;
use crate::knowledge::CuratedAnswers;
use crate::pipeline::{HttpRecordingFetcher, Pipeline, Services};
use crate::recovery::ErrorTracker;
use crate::services::{AnswerService, HttpAnswerService, OpenAiSpeech};
use crate::session::{InMemorySessionStore, SessionStore};
use crate::{Config, Error, Result};

/// The IVR gateway
pub struct Gateway {
    config: Config,
    state: Arc<AppState>,
}

impl Gateway {
    /// Build the gateway with the configured network back ends
    ///
    /// # Errors
    ///
    /// Returns error if a back end client cannot be created
    pub fn new(config: Config) -> Result<Self> {
        let speech = Arc::new(OpenAiSpeech::new(&config.speech)?);

        let backend = match &config.answer.url {
            Some(url) => {
                tracing::info!(url = %url, "answer service configured");
                let service: Arc<dyn AnswerService> =
                    Arc::new(HttpAnswerService::new(url.clone(), config.answer.timeout)?);
                Some(service)
            }
            None => {
                tracing::warn!("no answer service configured, serving curated answers only");
                None
            }
        };

        let fetcher = Arc::new(HttpRecordingFetcher::new(
            config.recording.credentials.clone(),
            config.recording.timeout,
        )?);

        let services = Services {
            speech,
            answers: Arc::new(CuratedAnswers::new(backend)),
            fetcher,
        };

        Ok(Self::with_services(config, services))
    }

    /// Build the gateway around the given back ends
    #[must_use]
    pub fn with_services(config: Config, services: Services) -> Self {
        let publisher = Arc::new(AudioPublisher::new(
            config.server.public_base_url.clone(),
            config.audio.ttl,
            config.audio.sample_rate,
        ));
        let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let tracker = Arc::new(ErrorTracker::default());

        let pipeline = Arc::new(Pipeline::new(
            services,
            Arc::clone(&publisher),
            Arc::clone(&sessions),
            Arc::clone(&tracker),
            config.pipeline.clone(),
        ));

        let flow = Arc::new(CallFlow::new(
            Arc::clone(&sessions),
            pipeline,
            Arc::clone(&tracker),
            config.telephony.clone(),
        ));

        let state = Arc::new(AppState {
            flow,
            publisher,
            sessions,
            tracker,
        });

        Self { config, state }
    }

    /// Shared state handed to the HTTP routes
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Run the gateway until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if the API server fails
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            host = %self.config.server.host,
            port = self.config.server.port,
            base_url = %self.config.server.public_base_url,
            "gateway running"
        );

        let sweeper =
            Arc::clone(&self.state.publisher).spawn_sweeper(self.config.audio.sweep_interval);
        let cleaner = spawn_session_cleanup(
            Arc::clone(&self.state.sessions),
            self.config.session.cleanup_interval,
            self.config.session.idle_expiry,
        );

        let mut server = ApiServer::new(
            self.state(),
            self.config.server.host.clone(),
            self.config.server.port,
        )
        .spawn();

        // Set up shutdown signal
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(()).await;
            }
        });

        let outcome = tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("shutdown requested");
                Ok(())
            }
            joined = &mut server => match joined {
                Ok(result) => result,
                Err(e) => Err(Error::Config(format!("API server task failed: {e}"))),
            },
        };

        server.abort();
        sweeper.abort();
        cleaner.abort();

        tracing::info!("gateway stopped");
        outcome
    }
}

/// Periodically drop ended and idle sessions
fn spawn_session_cleanup(
    sessions: Arc<dyn SessionStore>,
    interval: Duration,
    idle_expiry: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = sessions.cleanup(idle_expiry).await;
            if removed > 0 {
                tracing::info!(removed, "expired sessions cleaned up");
            }
        }
    })
}
