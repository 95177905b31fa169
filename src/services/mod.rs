//! External capabilities consumed by the pipeline
//!
//! Speech recognition and synthesis sit behind [`SpeechService`]; turning a
//! question into answer text sits behind [`AnswerService`]. Both are injected
//! as trait objects so back ends can be swapped or stubbed.

pub mod answer;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Language, Result};

pub use answer::HttpAnswerService;
pub use openai::OpenAiSpeech;

/// Result of a transcription call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    /// Recognizer confidence in `[0.0, 1.0]`
    pub confidence: f32,
}

/// Speech recognition and synthesis
#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Transcribe recorded audio spoken in `language`
    ///
    /// # Errors
    ///
    /// Returns error if the back end fails or rejects the audio
    async fn transcribe(&self, audio: &[u8], language: Language) -> Result<Transcription>;

    /// Synthesize `text` as audio bytes
    ///
    /// # Errors
    ///
    /// Returns error if the back end fails
    async fn synthesize(&self, text: &str, language: Language) -> Result<Vec<u8>>;
}

/// Answer variant requested from the back end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Simple,
    Detailed,
}

impl DetailLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Detailed => "detailed",
        }
    }
}

/// Curriculum subject used to narrow retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Physics,
    Chemistry,
    Biology,
}

/// Answer text returned by an [`AnswerService`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub source_confidence: f32,
    /// `false` when nothing relevant was found for the question
    pub success: bool,
}

impl Answer {
    #[must_use]
    pub fn found(text: impl Into<String>, source_confidence: f32) -> Self {
        Self {
            text: text.into(),
            source_confidence,
            success: true,
        }
    }

    #[must_use]
    pub const fn not_found() -> Self {
        Self {
            text: String::new(),
            source_confidence: 0.0,
            success: false,
        }
    }
}

/// Retrieval and generation of answer text
#[async_trait]
pub trait AnswerService: Send + Sync {
    /// Answer `question` in `language` at the requested detail level
    ///
    /// # Errors
    ///
    /// Returns error if the back end fails; an unanswerable question is
    /// reported with `success = false` instead
    async fn answer(
        &self,
        question: &str,
        language: Language,
        detail: DetailLevel,
        subject: Option<Subject>,
    ) -> Result<Answer>;
}
