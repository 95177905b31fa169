//! Voice menu: webhook steps, state machine, prompts and markup

pub mod flow;
pub mod markup;
pub mod menu;
pub mod prompts;

pub use flow::{CallFlow, WebhookRequest};
pub use markup::VoiceResponse;
pub use menu::{Directive, Effect, FixedMenu, MenuContext, MenuInput, Transition, transition};

pub const INCOMING_CALL: &str = "/webhook/incoming-call";
pub const LANGUAGE_SELECTION: &str = "/webhook/language-selection";
pub const GRADE_CONFIRMATION: &str = "/webhook/grade-confirmation";
pub const INTERACTION_MODE: &str = "/webhook/interaction-mode";
pub const INTERACTION_MODE_SELECTION: &str = "/webhook/interaction-mode-selection";
pub const QUESTION_RECORDING: &str = "/webhook/question-recording";
pub const RECORDING_STATUS: &str = "/webhook/recording-status";
pub const RESPONSE_DELIVERY: &str = "/webhook/response-delivery";
pub const FOLLOW_UP_MENU: &str = "/webhook/follow-up-menu";
pub const DETAILED_ANSWER: &str = "/webhook/detailed-answer";
pub const ERROR_RECOVERY: &str = "/webhook/error-recovery";
pub const CALL_END: &str = "/webhook/call-end";

/// One webhook the telephony provider calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    IncomingCall,
    LanguageSelection,
    GradeConfirmation,
    InteractionMode,
    InteractionModeSelection,
    QuestionRecording,
    RecordingStatus,
    ResponseDelivery,
    FollowUpMenu,
    DetailedAnswer,
    ErrorRecovery,
    CallEnd,
}

impl Step {
    pub const ALL: [Self; 12] = [
        Self::IncomingCall,
        Self::LanguageSelection,
        Self::GradeConfirmation,
        Self::InteractionMode,
        Self::InteractionModeSelection,
        Self::QuestionRecording,
        Self::RecordingStatus,
        Self::ResponseDelivery,
        Self::FollowUpMenu,
        Self::DetailedAnswer,
        Self::ErrorRecovery,
        Self::CallEnd,
    ];

    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::IncomingCall => INCOMING_CALL,
            Self::LanguageSelection => LANGUAGE_SELECTION,
            Self::GradeConfirmation => GRADE_CONFIRMATION,
            Self::InteractionMode => INTERACTION_MODE,
            Self::InteractionModeSelection => INTERACTION_MODE_SELECTION,
            Self::QuestionRecording => QUESTION_RECORDING,
            Self::RecordingStatus => RECORDING_STATUS,
            Self::ResponseDelivery => RESPONSE_DELIVERY,
            Self::FollowUpMenu => FOLLOW_UP_MENU,
            Self::DetailedAnswer => DETAILED_ANSWER,
            Self::ErrorRecovery => ERROR_RECOVERY,
            Self::CallEnd => CALL_END,
        }
    }

    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.path() == path)
    }
}

/// Normalize DTMF input: trim, drop surrounding quotes, keep ASCII digits
#[must_use]
pub fn normalize_digits(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .chars()
        .filter(char::is_ascii_digit)
        .collect()
}
