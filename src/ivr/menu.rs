//! Voice menu state machine
//!
//! [`transition`] is pure: given the step being handled, the caller's input
//! and a snapshot of the session it returns the next menu state, what to say
//! and which session effects to apply. Applying effects is left to
//! [`super::flow::CallFlow`].

use std::time::Duration;

use crate::config::TelephonyConfig;
use crate::recovery::ErrorCategory;
use crate::session::{MenuState, ProcessingStatus, ResponseData, Session};
use crate::{Error, Language, Result};

/// Menus that accept a fixed set of digits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedMenu {
    Language,
    Interaction,
    FollowUp,
    ErrorRecovery,
}

/// Normalized caller input for one webhook
#[derive(Debug, Clone, PartialEq)]
pub enum MenuInput {
    CallStarted,
    /// DTMF digits, already normalized
    Digits(String),
    /// Re-present the current menu
    Enter,
    Recording {
        reference: Option<String>,
        duration_secs: Option<f64>,
    },
    /// Re-entry of "deliver answer" while a job may be running
    DeliveryPoll,
    /// Re-entry of the detailed answer step
    DetailPoll,
    Hangup,
}

/// What the caller hears next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Welcome,
    GradeConfirmation,
    InteractionMenu,
    RecordQuestion,
    RecordingTooShort,
    RecordingTooLong,
    /// Thank the caller and start polling
    Processing,
    PleaseWait,
    /// Play the short answer (or apologize if it has no audio) and offer follow-ups
    DeliverAnswer {
        audio_url: Option<String>,
    },
    PlayAnswer {
        audio_url: String,
    },
    SpeakAnswer {
        text: String,
    },
    DetailPleaseWait,
    InvalidSelection(FixedMenu),
    ReturningToMainMenu,
    TopicsUnavailable,
    ErrorFallback(ErrorCategory),
    CallEnded,
}

/// Session change requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    SetLanguage(Language),
    StartJob { reference: String },
    StartDetailJob,
    RecordInvalid,
    ResetInvalid,
    ResetProcessing,
    ForceTimeout,
    EndCall,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: MenuState,
    pub directive: Directive,
    pub effects: Vec<Effect>,
}

impl Transition {
    #[must_use]
    pub const fn to(next: MenuState, directive: Directive) -> Self {
        Self {
            next,
            directive,
            effects: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Session facts the state machine reads
#[derive(Debug, Clone, Copy)]
pub struct MenuContext<'a> {
    pub language: Language,
    pub invalid_attempts: u32,
    pub processing_status: ProcessingStatus,
    pub job_elapsed: Option<Duration>,
    pub last_error: Option<ErrorCategory>,
    pub response: Option<&'a ResponseData>,
    pub detail_elapsed: Option<Duration>,
    pub limits: &'a TelephonyConfig,
}

impl<'a> MenuContext<'a> {
    #[must_use]
    pub fn new(session: &'a Session, limits: &'a TelephonyConfig) -> Self {
        Self {
            language: session.language,
            invalid_attempts: session.invalid_attempts,
            processing_status: session.processing_status,
            job_elapsed: session.job_elapsed(),
            last_error: session.last_error,
            response: session.current_response.as_ref(),
            detail_elapsed: session.detail_elapsed(),
            limits,
        }
    }
}

/// Compute the next step of the voice menu.
///
/// `state` is the step the webhook belongs to.
///
/// # Errors
///
/// Returns [`Error::InvalidTransition`] for inputs the step does not accept
pub fn transition(state: MenuState, input: &MenuInput, ctx: &MenuContext<'_>) -> Result<Transition> {
    use MenuState as S;

    let transition = match (state, input) {
        (_, MenuInput::Hangup) => Transition::to(S::Ended, Directive::CallEnded).with(Effect::EndCall),
        (_, MenuInput::CallStarted) => Transition::to(S::LanguageSelection, Directive::Welcome),

        (S::Welcome | S::LanguageSelection, MenuInput::Digits(digits)) => {
            match Language::from_digit(digits) {
                Some(language) => Transition::to(S::GradeConfirmation, Directive::GradeConfirmation)
                    .with(Effect::SetLanguage(language))
                    .with(Effect::ResetInvalid),
                None => invalid(S::LanguageSelection, FixedMenu::Language, ctx),
            }
        }

        // Any key, or none, moves on
        (S::GradeConfirmation, MenuInput::Digits(_) | MenuInput::Enter) | (S::InteractionMode, MenuInput::Enter) => {
            Transition::to(S::InteractionMode, Directive::InteractionMenu)
        }

        (S::InteractionMode, MenuInput::Digits(digits)) => match digits.as_str() {
            "1" => Transition::to(S::InteractionMode, Directive::TopicsUnavailable).with(Effect::ResetInvalid),
            "2" => Transition::to(S::RecordingQuestion, Directive::RecordQuestion).with(Effect::ResetInvalid),
            _ => invalid(S::InteractionMode, FixedMenu::Interaction, ctx),
        },

        (S::RecordingQuestion, MenuInput::Recording { reference, duration_secs }) => {
            recording(reference.as_deref(), *duration_secs, ctx.limits)
        }

        (S::ProcessingQuestion, MenuInput::DeliveryPoll) => delivery_poll(ctx),

        (S::FollowUpMenu, MenuInput::Digits(digits)) => match digits.as_str() {
            "1" => detail_step(ctx).with(Effect::ResetInvalid),
            "2" => repeat(ctx).with(Effect::ResetInvalid),
            "3" => Transition::to(S::RecordingQuestion, Directive::RecordQuestion).with(Effect::ResetInvalid),
            "9" => Transition::to(S::InteractionMode, Directive::InteractionMenu).with(Effect::ResetInvalid),
            _ => invalid(S::FollowUpMenu, FixedMenu::FollowUp, ctx),
        },

        (S::FollowUpMenu, MenuInput::DetailPoll) => detail_step(ctx),

        (S::ErrorRecovery, MenuInput::Digits(digits)) => match digits.as_str() {
            "1" => Transition::to(S::RecordingQuestion, Directive::RecordQuestion)
                .with(Effect::ResetProcessing)
                .with(Effect::ResetInvalid),
            "9" => Transition::to(S::InteractionMode, Directive::InteractionMenu)
                .with(Effect::ResetProcessing)
                .with(Effect::ResetInvalid),
            _ => invalid(S::ErrorRecovery, FixedMenu::ErrorRecovery, ctx),
        },

        (state, input) => {
            return Err(Error::InvalidTransition(format!(
                "{state} does not accept {input:?}"
            )));
        }
    };

    Ok(transition)
}

/// First invalid input re-enters the menu; the second returns to the main menu
fn invalid(state: MenuState, menu: FixedMenu, ctx: &MenuContext<'_>) -> Transition {
    if ctx.invalid_attempts == 0 {
        Transition::to(state, Directive::InvalidSelection(menu)).with(Effect::RecordInvalid)
    } else {
        Transition::to(MenuState::InteractionMode, Directive::ReturningToMainMenu)
            .with(Effect::ResetInvalid)
    }
}

fn recording(reference: Option<&str>, duration_secs: Option<f64>, limits: &TelephonyConfig) -> Transition {
    let Some(reference) = reference.map(str::trim).filter(|r| !r.is_empty()) else {
        return Transition::to(
            MenuState::ErrorRecovery,
            Directive::ErrorFallback(ErrorCategory::RecordingIssue),
        );
    };

    match duration_secs {
        Some(secs) if secs < limits.min_recording_secs => {
            Transition::to(MenuState::RecordingQuestion, Directive::RecordingTooShort)
        }
        Some(secs) if secs > limits.max_recording_secs => {
            Transition::to(MenuState::RecordingQuestion, Directive::RecordingTooLong)
        }
        _ => Transition::to(MenuState::ProcessingQuestion, Directive::Processing).with(
            Effect::StartJob {
                reference: reference.to_string(),
            },
        ),
    }
}

/// One pass of the "deliver answer" poll loop
fn delivery_poll(ctx: &MenuContext<'_>) -> Transition {
    match ctx.processing_status {
        ProcessingStatus::Ready => match ctx.response {
            Some(response) => Transition::to(
                MenuState::FollowUpMenu,
                Directive::DeliverAnswer {
                    audio_url: Some(response.short_answer_audio_url.clone())
                        .filter(|url| !url.is_empty()),
                },
            ),
            None => Transition::to(
                MenuState::ErrorRecovery,
                Directive::ErrorFallback(ErrorCategory::System),
            ),
        },
        ProcessingStatus::Error => Transition::to(
            MenuState::ErrorRecovery,
            Directive::ErrorFallback(ctx.last_error.unwrap_or(ErrorCategory::System)),
        ),
        ProcessingStatus::ProcessingAudio | ProcessingStatus::GeneratingResponse => {
            if ctx
                .job_elapsed
                .is_some_and(|elapsed| elapsed > ctx.limits.poll_ceiling)
            {
                Transition::to(
                    MenuState::ErrorRecovery,
                    Directive::ErrorFallback(ErrorCategory::ProcessingTimeout),
                )
                .with(Effect::ForceTimeout)
            } else {
                Transition::to(MenuState::ProcessingQuestion, Directive::PleaseWait)
            }
        }
        // Nothing pending
        ProcessingStatus::Idle => Transition::to(MenuState::InteractionMode, Directive::InteractionMenu),
    }
}

fn repeat(ctx: &MenuContext<'_>) -> Transition {
    let Some(response) = ctx.response else {
        return Transition::to(MenuState::InteractionMode, Directive::InteractionMenu);
    };
    let directive = if response.short_answer_audio_url.is_empty() {
        Directive::SpeakAnswer {
            text: response.short_answer_text.clone(),
        }
    } else {
        Directive::PlayAnswer {
            audio_url: response.short_answer_audio_url.clone(),
        }
    };
    Transition::to(MenuState::FollowUpMenu, directive)
}

/// "More detail": cached audio, wait for a running job, speak the text, or start a job
fn detail_step(ctx: &MenuContext<'_>) -> Transition {
    let Some(response) = ctx.response else {
        return Transition::to(MenuState::InteractionMode, Directive::InteractionMenu);
    };
    if let Some(url) = &response.detailed_answer_audio_url {
        return Transition::to(
            MenuState::FollowUpMenu,
            Directive::PlayAnswer {
                audio_url: url.clone(),
            },
        );
    }

    let speak = || {
        Transition::to(
            MenuState::FollowUpMenu,
            Directive::SpeakAnswer {
                text: response
                    .detailed_answer_text
                    .clone()
                    .unwrap_or_else(|| response.short_answer_text.clone()),
            },
        )
    };

    match ctx.detail_elapsed {
        Some(elapsed) if elapsed <= ctx.limits.poll_ceiling => {
            Transition::to(MenuState::FollowUpMenu, Directive::DetailPleaseWait)
        }
        Some(_) => speak(),
        None if response.detail_attempted => speak(),
        None => Transition::to(MenuState::FollowUpMenu, Directive::DetailPleaseWait)
            .with(Effect::StartDetailJob),
    }
}
