//! Error types for the IVR tutor gateway

use thiserror::Error;

use crate::recovery::ErrorCategory;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the IVR tutor gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No session exists for the caller
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Processing status change outside the allowed lifecycle
    #[error("invalid status transition: {0}")]
    InvalidTransition(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Answer back-end error
    #[error("answer error: {0}")]
    Answer(String),

    /// Nothing relevant was found for the question
    #[error("content not found: {0}")]
    ContentNotFound(String),

    /// Caller recording could not be used
    #[error("recording error: {0}")]
    Recording(String),

    /// Audio container/format error
    #[error("audio error: {0}")]
    Audio(String),

    /// An external call exceeded its deadline
    #[error("timeout: {0}")]
    Timeout(String),

    /// An external service could not be reached or failed upstream
    #[error("network error: {0}")]
    Network(String),

    /// An external service rejected the call for rate limiting
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Input rejected before reaching an external service
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Build an error from a failed HTTP response of an external service.
    ///
    /// `kind` wraps the message for statuses that carry no more specific meaning.
    #[must_use]
    pub fn from_status(status: u16, body: &str, kind: fn(String) -> Self) -> Self {
        let message = format!("status {status}: {body}");
        match ErrorCategory::from_status(status, body) {
            ErrorCategory::RateLimit => Self::RateLimited(message),
            ErrorCategory::Timeout => Self::Timeout(message),
            ErrorCategory::Network => Self::Network(message),
            _ => kind(message),
        }
    }

    /// Map this error onto the recovery taxonomy
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::RateLimited(_) => ErrorCategory::RateLimit,
            Self::Network(_) => ErrorCategory::Network,
            Self::InvalidInput(_) => ErrorCategory::InvalidInput,
            Self::ContentNotFound(_) => ErrorCategory::ContentNotFound,
            Self::Recording(msg) => {
                ErrorCategory::from_message(msg).unwrap_or(ErrorCategory::RecordingIssue)
            }
            Self::Stt(msg) | Self::Tts(msg) | Self::Audio(msg) => {
                ErrorCategory::from_message(msg).unwrap_or(ErrorCategory::AudioProcessing)
            }
            Self::Answer(msg) => ErrorCategory::from_message(msg).unwrap_or(ErrorCategory::System),
            Self::Http(e) => {
                if e.is_timeout() {
                    ErrorCategory::Timeout
                } else if let Some(status) = e.status() {
                    ErrorCategory::from_status(status.as_u16(), "")
                } else if e.is_connect() || e.is_request() {
                    ErrorCategory::Network
                } else {
                    ErrorCategory::System
                }
            }
            Self::Config(_)
            | Self::SessionNotFound(_)
            | Self::InvalidTransition(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Toml(_) => ErrorCategory::System,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_variants_map_directly() {
        assert_eq!(Error::Timeout("x".into()).category(), ErrorCategory::Timeout);
        assert_eq!(
            Error::RateLimited("x".into()).category(),
            ErrorCategory::RateLimit
        );
        assert_eq!(
            Error::InvalidInput("x".into()).category(),
            ErrorCategory::InvalidInput
        );
        assert_eq!(
            Error::SessionNotFound("x".into()).category(),
            ErrorCategory::System
        );
    }

    #[test]
    fn speech_errors_default_to_audio_processing() {
        assert_eq!(
            Error::Tts("voice rejected".into()).category(),
            ErrorCategory::AudioProcessing
        );
        assert_eq!(
            Error::Stt("connection reset by peer".into()).category(),
            ErrorCategory::Network
        );
    }

    #[test]
    fn recording_errors_default_to_recording_issue() {
        assert_eq!(
            Error::Recording("empty reference".into()).category(),
            ErrorCategory::RecordingIssue
        );
    }

    #[test]
    fn from_status_prefers_specific_variants() {
        assert!(matches!(
            Error::from_status(429, "", Error::Tts),
            Error::RateLimited(_)
        ));
        assert!(matches!(
            Error::from_status(504, "", Error::Tts),
            Error::Timeout(_)
        ));
        assert!(matches!(
            Error::from_status(400, "bad voice", Error::Tts),
            Error::Tts(_)
        ));
        assert!(matches!(
            Error::from_status(503, "", Error::Answer),
            Error::Network(_)
        ));
    }
}
