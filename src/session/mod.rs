//! Per-caller session state
//!
//! One [`Session`] per phone number holds everything the stateless webhook
//! calls need: menu position, language, history, and the status of the
//! background job answering the caller's latest question.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::recovery::ErrorCategory;
use crate::{Language, Result};

pub use memory::InMemorySessionStore;

/// Named steps of the voice menu
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuState {
    #[default]
    Welcome,
    LanguageSelection,
    GradeConfirmation,
    InteractionMode,
    RecordingQuestion,
    ProcessingQuestion,
    DeliveringResponse,
    FollowUpMenu,
    ErrorRecovery,
    Ended,
}

impl MenuState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::LanguageSelection => "language_selection",
            Self::GradeConfirmation => "grade_confirmation",
            Self::InteractionMode => "interaction_mode",
            Self::RecordingQuestion => "recording_question",
            Self::ProcessingQuestion => "processing_question",
            Self::DeliveringResponse => "delivering_response",
            Self::FollowUpMenu => "follow_up_menu",
            Self::ErrorRecovery => "error_recovery",
            Self::Ended => "ended",
        }
    }
}

impl std::fmt::Display for MenuState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the background job for a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Idle,
    ProcessingAudio,
    GeneratingResponse,
    Ready,
    Error,
}

impl ProcessingStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ProcessingAudio => "processing_audio",
            Self::GeneratingResponse => "generating_response",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }

    /// A job owns the session while in one of these
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::ProcessingAudio | Self::GeneratingResponse)
    }

    /// Lifecycle: `idle -> processing_audio -> generating_response -> ready|error`.
    ///
    /// `processing_audio -> error` covers failures before transcription
    /// completes. Terminal statuses restart at `processing_audio` for a new
    /// job or return to `idle` through error recovery.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::ProcessingAudio)
                | (Self::ProcessingAudio, Self::GeneratingResponse | Self::Error)
                | (Self::GeneratingResponse, Self::Ready | Self::Error)
                | (Self::Ready | Self::Error, Self::ProcessingAudio | Self::Idle)
        )
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer produced for the caller's latest question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseData {
    pub question_text: String,
    pub short_answer_text: String,
    pub short_answer_audio_url: String,
    pub detailed_answer_text: Option<String>,
    pub detailed_answer_audio_url: Option<String>,
    pub language: Language,
    /// Set once a detail job has run, whether or not it produced audio
    #[serde(default)]
    pub detail_attempted: bool,
}

/// Conversational state for one call
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub phone_number: String,
    pub session_id: Uuid,
    pub language: Language,
    pub menu_state: MenuState,
    pub question_history: Vec<String>,
    pub response_history: Vec<String>,
    pub processing_status: ProcessingStatus,
    pub current_response: Option<ResponseData>,
    pub call_active: bool,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Consecutive invalid inputs in fixed-choice menus
    pub invalid_attempts: u32,
    pub job_started_at: Option<DateTime<Utc>>,
    /// Bumped whenever a job is admitted or abandoned
    pub job_generation: u64,
    pub last_error: Option<ErrorCategory>,
    pub detail_started_at: Option<DateTime<Utc>>,
}

impl Session {
    #[must_use]
    pub fn new(phone_number: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            phone_number: phone_number.into(),
            session_id: Uuid::new_v4(),
            language: Language::default(),
            menu_state: MenuState::Welcome,
            question_history: Vec::new(),
            response_history: Vec::new(),
            processing_status: ProcessingStatus::Idle,
            current_response: None,
            call_active: true,
            start_time: now,
            last_activity: now,
            invalid_attempts: 0,
            job_started_at: None,
            job_generation: 0,
            last_error: None,
            detail_started_at: None,
        }
    }

    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.processing_status.is_in_flight()
    }

    /// Time since the current job was admitted
    #[must_use]
    pub fn job_elapsed(&self) -> Option<Duration> {
        self.job_started_at.map(elapsed_since)
    }

    /// Time since the current detail job was started
    #[must_use]
    pub fn detail_elapsed(&self) -> Option<Duration> {
        self.detail_started_at.map(elapsed_since)
    }

    /// Whether `ticket` still owns this session's job
    #[must_use]
    pub fn owns(&self, ticket: &JobTicket) -> bool {
        self.session_id == ticket.session_id && self.job_generation == ticket.generation
    }
}

fn elapsed_since(at: DateTime<Utc>) -> Duration {
    (Utc::now() - at).to_std().unwrap_or_default()
}

/// Proof of job admission, carried by the background job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTicket {
    pub session_id: Uuid,
    pub generation: u64,
    pub language: Language,
}

/// Final result of a job, written through [`SessionStore::complete_job`]
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Ready(ResponseData),
    Failed {
        category: ErrorCategory,
        /// Transcript, when the failure happened after transcription
        question_text: Option<String>,
    },
}

/// Snapshot handed to a detail job
#[derive(Debug, Clone)]
pub struct DetailTicket {
    pub job: JobTicket,
    pub response: ResponseData,
}

/// Result of a detail job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailOutcome {
    pub text: String,
    pub audio_url: Option<String>,
}

/// Counts for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub jobs_in_flight: usize,
}

/// Storage for sessions, keyed by phone number.
///
/// Every mutation for one phone number is serialized; implementations must
/// never let two writes for the same caller interleave. Operations on an
/// unknown phone number return [`crate::Error::SessionNotFound`].
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Start a fresh session, replacing any previous one for the number
    async fn create(&self, phone: &str) -> Session;

    async fn get(&self, phone: &str) -> Option<Session>;

    /// Return the active session, or start a fresh one if the last call ended
    async fn get_or_create(&self, phone: &str) -> Session;

    /// # Errors
    ///
    /// Returns error if no session exists
    async fn update_language(&self, phone: &str, language: Language) -> Result<()>;

    /// # Errors
    ///
    /// Returns error if no session exists
    async fn update_menu(&self, phone: &str, state: MenuState) -> Result<()>;

    /// # Errors
    ///
    /// Returns error if no session exists
    async fn append_question(&self, phone: &str, question: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns error if no session exists
    async fn append_response(&self, phone: &str, response: &str) -> Result<()>;

    /// Move along the status lifecycle
    ///
    /// # Errors
    ///
    /// Returns error if no session exists or the transition is not allowed
    async fn update_processing_status(&self, phone: &str, status: ProcessingStatus) -> Result<()>;

    /// Replace the current response and append it to history
    ///
    /// # Errors
    ///
    /// Returns error if no session exists
    async fn store_response(&self, phone: &str, response: ResponseData) -> Result<()>;

    /// Atomically admit a job, moving the session to `processing_audio`.
    ///
    /// Returns `None` when a job is already in flight.
    ///
    /// # Errors
    ///
    /// Returns error if no session exists
    async fn begin_job(&self, phone: &str) -> Result<Option<JobTicket>>;

    /// Advance an admitted job's status; stale tickets are ignored (`false`)
    ///
    /// # Errors
    ///
    /// Returns error if no session exists or the transition is not allowed
    async fn advance_job(&self, phone: &str, ticket: &JobTicket, status: ProcessingStatus)
    -> Result<bool>;

    /// Write a job's single result; stale tickets are ignored (`false`)
    ///
    /// # Errors
    ///
    /// Returns error if no session exists
    async fn complete_job(&self, phone: &str, ticket: &JobTicket, outcome: JobOutcome)
    -> Result<bool>;

    /// Abandon an in-flight job that has run past `ceiling`.
    ///
    /// Returns `true` only for the call that performed the transition.
    ///
    /// # Errors
    ///
    /// Returns error if no session exists
    async fn force_timeout(&self, phone: &str, ceiling: Duration) -> Result<bool>;

    /// Return a terminal status to `idle` for a fresh attempt
    ///
    /// # Errors
    ///
    /// Returns error if no session exists or a job is in flight
    async fn reset_processing(&self, phone: &str) -> Result<()>;

    /// Admit a detail job for the current response, if none has run yet
    ///
    /// # Errors
    ///
    /// Returns error if no session exists
    async fn begin_detail_job(&self, phone: &str) -> Result<Option<DetailTicket>>;

    /// # Errors
    ///
    /// Returns error if no session exists
    async fn complete_detail_job(
        &self,
        phone: &str,
        ticket: &DetailTicket,
        outcome: DetailOutcome,
    ) -> Result<bool>;

    /// Count an invalid menu input, returning the new consecutive count
    ///
    /// # Errors
    ///
    /// Returns error if no session exists
    async fn record_invalid_input(&self, phone: &str) -> Result<u32>;

    /// # Errors
    ///
    /// Returns error if no session exists
    async fn reset_invalid_input(&self, phone: &str) -> Result<()>;

    /// Mark the call as ended; the session is kept for history until cleanup
    ///
    /// # Errors
    ///
    /// Returns error if no session exists
    async fn end(&self, phone: &str) -> Result<()>;

    async fn remove(&self, phone: &str) -> Option<Session>;

    /// Drop ended sessions and sessions idle for longer than `max_idle`
    async fn cleanup(&self, max_idle: Duration) -> usize;

    async fn stats(&self) -> SessionStats;
}
