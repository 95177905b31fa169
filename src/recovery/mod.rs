//! Failure categorization and recovery scripts
//!
//! Every handled failure is mapped onto an [`ErrorCategory`]. The category
//! decides whether the failing call is re-invoked ([`retry::with_retry`]),
//! what the caller hears, and whether the call returns to the menu or ends.

pub mod retry;
pub mod tracker;

pub use retry::{RetryPolicy, delay_for_attempt, with_retry};
pub use tracker::{Correlation, ErrorEvent, ErrorSummary, ErrorTracker, hash_phone};

use serde::{Deserialize, Serialize};

use crate::Language;

/// Categories of failures seen by the call flow and the processing pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    RateLimit,
    AudioProcessing,
    ContentNotFound,
    UnclearSpeech,
    RecordingIssue,
    ProcessingTimeout,
    Network,
    InvalidInput,
    System,
}

impl ErrorCategory {
    pub const ALL: [Self; 10] = [
        Self::Timeout,
        Self::RateLimit,
        Self::AudioProcessing,
        Self::ContentNotFound,
        Self::UnclearSpeech,
        Self::RecordingIssue,
        Self::ProcessingTimeout,
        Self::Network,
        Self::InvalidInput,
        Self::System,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::AudioProcessing => "audio_processing",
            Self::ContentNotFound => "content_not_found",
            Self::UnclearSpeech => "unclear_speech",
            Self::RecordingIssue => "recording_issue",
            Self::ProcessingTimeout => "processing_timeout",
            Self::Network => "network",
            Self::InvalidInput => "invalid_input",
            Self::System => "system",
        }
    }

    /// Whether a failed external call in this category is re-invoked automatically.
    ///
    /// Only transient failures qualify. Everything else propagates on the first
    /// attempt.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimit | Self::Network | Self::AudioProcessing
        )
    }

    /// Whether the caller is offered "press 1 to try again" after this failure
    #[must_use]
    pub const fn offers_caller_retry(self) -> bool {
        !matches!(self, Self::System)
    }

    /// Whether the fallback returns the caller to the interaction menu.
    ///
    /// When `false` the fallback ends the call politely.
    #[must_use]
    pub const fn redirects_to_menu(self) -> bool {
        !matches!(self, Self::Timeout | Self::RateLimit | Self::Network)
    }

    /// Recovery recorded alongside each [`ErrorEvent`]
    #[must_use]
    pub const fn recovery_action(self) -> &'static str {
        match self {
            Self::Timeout => "retry with exponential backoff",
            Self::RateLimit => "retry after delay",
            Self::AudioProcessing => "request a new recording",
            Self::ContentNotFound => "suggest curriculum topics",
            Self::UnclearSpeech => "ask caller to speak slowly and clearly",
            Self::RecordingIssue => "guide caller to re-record in a quiet place",
            Self::ProcessingTimeout => "abandon job and suggest a simpler question",
            Self::Network => "retry after network recovery",
            Self::InvalidInput => "guide caller to supported topics",
            Self::System => "end call politely",
        }
    }

    /// Spoken explanation of the failure in the caller's language
    #[must_use]
    pub const fn message(self, language: Language) -> &'static str {
        match language {
            Language::English => self.english_message(),
            Language::Telugu => self.telugu_message(),
        }
    }

    const fn english_message(self) -> &'static str {
        match self {
            Self::Timeout => {
                "I'm taking a bit longer than usual to process your question. Please wait a moment while I try again."
            }
            Self::RateLimit => {
                "I'm currently handling many questions. Please wait a moment and I'll process your question shortly."
            }
            Self::AudioProcessing => {
                "I'm having trouble with the audio. Please speak clearly and try asking your question again."
            }
            Self::ContentNotFound => {
                "I don't have information about that topic in our Class 10 Science curriculum. Please ask about Physics, Chemistry, or Biology topics."
            }
            Self::UnclearSpeech => {
                "I couldn't understand your question clearly. Please speak slowly and clearly, then ask your question again."
            }
            Self::RecordingIssue => {
                "There was a problem with your recording. Please make sure you're in a quiet place and try recording your question again."
            }
            Self::ProcessingTimeout => {
                "I'm taking longer than expected to answer your question. Please ask a more specific question."
            }
            Self::Network => {
                "I'm having connectivity issues. Please wait a moment while I reconnect, then try again."
            }
            Self::InvalidInput => {
                "I can only help with Class 10 Science questions. Please ask about topics like light, acids and bases, or life processes."
            }
            Self::System => {
                "I'm experiencing a technical issue. Please try asking your question again, or call back in a few minutes."
            }
        }
    }

    const fn telugu_message(self) -> &'static str {
        match self {
            Self::Timeout => {
                "మీ ప్రశ్నను ప్రాసెస్ చేయడానికి సాధారణం కంటే ఎక్కువ సమయం పడుతోంది. నేను మళ్లీ ప్రయత్నిస్తున్నప్పుడు దయచేసి కాసేపు వేచి ఉండండి."
            }
            Self::RateLimit => {
                "నేను ప్రస్తుతం చాలా ప్రశ్నలను హ్యాండిల్ చేస్తున్నాను. దయచేసి కాసేపు వేచి ఉండండి, నేను మీ ప్రశ్నను త్వరలో ప్రాసెస్ చేస్తాను."
            }
            Self::AudioProcessing => {
                "ఆడియోతో నాకు సమస్య ఉంది. దయచేసి స్పష్టంగా మాట్లాడి మీ ప్రశ్నను మళ్లీ అడగండి."
            }
            Self::ContentNotFound => {
                "మా క్లాస్ 10 సైన్స్ పాఠ్యక్రమంలో ఆ విషయం గురించి నాకు సమాచారం లేదు. దయచేసి భౌతిక శాస్త్రం, రసాయన శాస్త్రం లేదా జీవ శాస్త్రం గురించి అడగండి."
            }
            Self::UnclearSpeech => {
                "మీ ప్రశ్న స్పష్టంగా అర్థం కాలేదు. దయచేసి నెమ్మదిగా మరియు స్పష్టంగా మాట్లాడి మీ ప్రశ్నను మళ్లీ అడగండి."
            }
            Self::RecordingIssue => {
                "మీ రికార్డింగ్‌లో సమస్య ఉంది. దయచేసి మీరు నిశ్శబ్ద ప్రదేశంలో ఉన్నారని నిర్ధారించుకుని మీ ప్రశ్నను మళ్లీ రికార్డ్ చేయండి."
            }
            Self::ProcessingTimeout => {
                "మీ ప్రశ్నకు సమాధానం ఇవ్వడానికి ఊహించిన దానికంటే ఎక్కువ సమయం పడుతోంది. దయచేసి మరింత నిర్దిష్టమైన ప్రశ్న అడగండి."
            }
            Self::Network => {
                "నాకు కనెక్టివిటీ సమస్యలు ఉన్నాయి. నేను మళ్లీ కనెక్ట్ అవుతున్నప్పుడు దయచేసి కాసేపు వేచి ఉండి, ఆపై మళ్లీ ప్రయత్నించండి."
            }
            Self::InvalidInput => {
                "నేను క్లాస్ 10 సైన్స్ ప్రశ్నలతో మాత్రమే సహాయం చేయగలను. దయచేసి వెలుతురు, ఆమ్లాలు మరియు క్షారాలు లేదా జీవ ప్రక్రియలు వంటి విషయాల గురించి అడగండి."
            }
            Self::System => {
                "నాకు సాంకేతిక సమస్య ఉంది. దయచేసి మీ ప్రశ్నను మళ్లీ అడగండి లేదా కొన్ని నిమిషాల తర్వాత మళ్లీ కాల్ చేయండి."
            }
        }
    }

    /// Categorize a failed HTTP response from an external service.
    ///
    /// Rate limits (429) and gateway timeouts are distinguished from generic
    /// upstream failures (5xx), which count as network trouble. Transport errors
    /// surfaced in the body text are recognized as well.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            429 => Self::RateLimit,
            408 | 504 => Self::Timeout,
            500..=599 => Self::Network,
            _ => Self::from_message(body).unwrap_or(if (400..500).contains(&status) {
                Self::InvalidInput
            } else {
                Self::System
            }),
        }
    }

    /// Recognize transient failures from free-form error text
    #[must_use]
    pub fn from_message(message: &str) -> Option<Self> {
        let lower = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(&["timeout", "timed out", "deadline exceeded"]) {
            Some(Self::Timeout)
        } else if has(&["rate limit", "quota exceeded", "too many requests"]) {
            Some(Self::RateLimit)
        } else if has(&["connection reset", "connection refused", "unreachable", "dns error"]) {
            Some(Self::Network)
        } else if has(&["low confidence", "unclear"]) {
            Some(Self::UnclearSpeech)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
