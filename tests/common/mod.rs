//! Shared test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use ivr_tutor::api::AppState;
use ivr_tutor::audio::silence_wav;
use ivr_tutor::knowledge::CuratedAnswers;
use ivr_tutor::pipeline::{RecordingFetcher, Services};
use ivr_tutor::recovery::RetryPolicy;
use ivr_tutor::services::{
    Answer, AnswerService, DetailLevel, SpeechService, Subject, Transcription,
};
use ivr_tutor::session::{ProcessingStatus, Session};
use ivr_tutor::{Config, Error, Gateway, Language, Result};

pub const BASE_URL: &str = "http://ivr.test";
pub const CALLER: &str = "+919876543210";
pub const RECORDING: &str = "https://api.provider.test/Recordings/RE123";

// -- speech -------------------------------------------------------------------

/// Speech back end that hears a fixed transcript per language
#[derive(Default)]
pub struct StubSpeech {
    transcripts: HashMap<Language, Transcription>,
    failing_synthesis: Vec<String>,
    gate: Option<Arc<Notify>>,
    pub transcribe_calls: AtomicUsize,
    pub synthesize_calls: AtomicUsize,
}

impl StubSpeech {
    /// Hears `text` in English with high confidence
    pub fn hearing(text: &str) -> Self {
        Self::default().with_transcript(Language::English, text, 0.95)
    }

    pub fn with_transcript(mut self, language: Language, text: &str, confidence: f32) -> Self {
        self.transcripts.insert(
            language,
            Transcription {
                text: text.to_string(),
                confidence,
            },
        );
        self
    }

    /// Synthesis of any text containing `needle` fails
    pub fn failing_synthesis_of(mut self, needle: &str) -> Self {
        self.failing_synthesis.push(needle.to_string());
        self
    }

    /// Transcription waits until `gate` is notified
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl SpeechService for StubSpeech {
    async fn transcribe(&self, _audio: &[u8], language: Language) -> Result<Transcription> {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.transcripts
            .get(&language)
            .cloned()
            .ok_or_else(|| Error::Stt(format!("nothing recognized in {language}")))
    }

    async fn synthesize(&self, text: &str, _language: Language) -> Result<Vec<u8>> {
        self.synthesize_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_synthesis.iter().any(|n| text.contains(n.as_str())) {
            return Err(Error::Tts("voice engine rejected text".to_string()));
        }
        silence_wav(200, 8000)
    }
}

// -- answers ------------------------------------------------------------------

/// Answer back end with fixed texts per detail level
pub struct StubAnswers {
    pub simple: Option<String>,
    pub detailed: Option<String>,
    pub calls: AtomicUsize,
}

impl StubAnswers {
    pub fn new(simple: &str, detailed: Option<&str>) -> Self {
        Self {
            simple: Some(simple.to_string()),
            detailed: detailed.map(ToString::to_string),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn nothing_found() -> Self {
        Self {
            simple: None,
            detailed: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AnswerService for StubAnswers {
    async fn answer(
        &self,
        _question: &str,
        _language: Language,
        detail: DetailLevel,
        _subject: Option<Subject>,
    ) -> Result<Answer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = match detail {
            DetailLevel::Simple => &self.simple,
            DetailLevel::Detailed => &self.detailed,
        };
        match (detail, text) {
            (_, Some(text)) => Ok(Answer::found(text.clone(), 0.9)),
            (DetailLevel::Detailed, None) => Err(Error::Answer("detail model unavailable".to_string())),
            (DetailLevel::Simple, None) => Ok(Answer::not_found()),
        }
    }
}

// -- recordings ---------------------------------------------------------------

/// Returns a short WAV for any reference
#[derive(Default)]
pub struct StubFetcher {
    pub calls: AtomicUsize,
}

#[async_trait]
impl RecordingFetcher for StubFetcher {
    async fn fetch(&self, _reference: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        silence_wav(1500, 8000)
    }
}

// -- harness ------------------------------------------------------------------

/// Configuration with no retry delays
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.public_base_url = BASE_URL.to_string();
    config.pipeline.external_retry = RetryPolicy::none();
    config.pipeline.synthesis_retry = RetryPolicy::none();
    config
}

/// A gateway wired to stub back ends
pub struct Harness {
    pub state: Arc<AppState>,
    pub speech: Arc<StubSpeech>,
    pub fetcher: Arc<StubFetcher>,
}

impl Harness {
    /// Stub speech with the curated answers
    pub fn new(speech: StubSpeech) -> Self {
        Self::with(speech, Arc::new(CuratedAnswers::new(None)), test_config())
    }

    pub fn with(speech: StubSpeech, answers: Arc<dyn AnswerService>, config: Config) -> Self {
        let speech = Arc::new(speech);
        let fetcher = Arc::new(StubFetcher::default());
        let services = Services {
            speech: Arc::clone(&speech) as Arc<dyn SpeechService>,
            answers,
            fetcher: Arc::clone(&fetcher) as Arc<dyn RecordingFetcher>,
        };
        let gateway = Gateway::with_services(config, services);
        Self {
            state: gateway.state(),
            speech,
            fetcher,
        }
    }

    pub async fn session(&self) -> Session {
        self.state
            .sessions
            .get(CALLER)
            .await
            .expect("session exists")
    }

    /// Wait until the caller's job reaches a terminal status
    pub async fn settled(&self) -> Session {
        for _ in 0..200 {
            let session = self.session().await;
            if matches!(
                session.processing_status,
                ProcessingStatus::Ready | ProcessingStatus::Error
            ) {
                return session;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job did not settle");
    }

    /// Wait until the detail job has stored its outcome
    pub async fn detail_settled(&self) -> Session {
        for _ in 0..200 {
            let session = self.session().await;
            if session.detail_started_at.is_none()
                && session
                    .current_response
                    .as_ref()
                    .is_some_and(|r| r.detail_attempted)
            {
                return session;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("detail job did not settle");
    }
}
