//! Webhook orchestration: session reads, state machine, effects, markup

use std::sync::Arc;

use serde::Deserialize;

use crate::config::TelephonyConfig;
use crate::pipeline::{Pipeline, ProcessingJob};
use crate::recovery::{Correlation, ErrorCategory, ErrorTracker, hash_phone};
use crate::session::{MenuState, Session, SessionStore};
use crate::{Error, Language, Result};

use super::markup::VoiceResponse;
use super::menu::{self, Directive, Effect, MenuContext, MenuInput, Transition};
use super::{Step, normalize_digits, prompts};

/// Fields the telephony provider posts to every webhook
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookRequest {
    #[serde(rename = "From", alias = "CallFrom", default)]
    pub from: String,
    #[serde(rename = "CallSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "Digits", default)]
    pub digits: Option<String>,
    #[serde(rename = "RecordingUrl", default)]
    pub recording_url: Option<String>,
    #[serde(rename = "RecordingDuration", default)]
    pub recording_duration: Option<String>,
    #[serde(rename = "RecordingStatus", default)]
    pub recording_status: Option<String>,
}

impl WebhookRequest {
    #[must_use]
    pub fn from_caller(phone: &str) -> Self {
        Self {
            from: phone.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_digits(mut self, digits: &str) -> Self {
        self.digits = Some(digits.to_string());
        self
    }

    #[must_use]
    pub fn with_recording(mut self, url: &str, duration_secs: &str) -> Self {
        self.recording_url = Some(url.to_string());
        self.recording_duration = Some(duration_secs.to_string());
        self
    }
}

/// Drives one caller through the voice menu, one webhook at a time.
///
/// Never fails: anything unexpected becomes a polite system-error document.
pub struct CallFlow {
    store: Arc<dyn SessionStore>,
    pipeline: Arc<Pipeline>,
    tracker: Arc<ErrorTracker>,
    telephony: TelephonyConfig,
}

impl CallFlow {
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        pipeline: Arc<Pipeline>,
        tracker: Arc<ErrorTracker>,
        telephony: TelephonyConfig,
    ) -> Self {
        Self {
            store,
            pipeline,
            tracker,
            telephony,
        }
    }

    /// Handle one webhook call and return the markup for the provider
    pub async fn handle(&self, step: Step, request: &WebhookRequest) -> VoiceResponse {
        let phone = request.from.trim();
        match self.dispatch(step, phone, request).await {
            Ok(doc) => doc,
            Err(e) => {
                let session = self.store.get(phone).await;
                let language = session.as_ref().map(|s| s.language).unwrap_or_default();
                self.tracker.record(
                    e.category(),
                    step.path(),
                    &e.to_string(),
                    Correlation {
                        phone_number: Some(phone).filter(|p| !p.is_empty()),
                        session_id: session.as_ref().map(|s| s.session_id),
                        language: Some(language),
                    },
                );
                prompts::system_error(language)
            }
        }
    }

    async fn dispatch(&self, step: Step, phone: &str, request: &WebhookRequest) -> Result<VoiceResponse> {
        if phone.is_empty() {
            return Err(Error::InvalidInput("webhook without caller number".to_string()));
        }
        let phone_hash = hash_phone(phone);

        let session = match step {
            Step::RecordingStatus => {
                tracing::info!(
                    phone_hash = %phone_hash,
                    status = request.recording_status.as_deref().unwrap_or("unknown"),
                    duration = request.recording_duration.as_deref().unwrap_or("unknown"),
                    "recording status"
                );
                return Ok(VoiceResponse::new());
            }
            Step::IncomingCall => {
                let session = self.store.create(phone).await;
                tracing::info!(
                    phone_hash = %phone_hash,
                    session_id = %session.session_id,
                    call_sid = request.call_sid.as_deref().unwrap_or(""),
                    "incoming call"
                );
                session
            }
            Step::CallEnd => match self.store.get(phone).await {
                Some(session) => session,
                None => return Ok(VoiceResponse::new()),
            },
            _ => self
                .store
                .get(phone)
                .await
                .filter(|s| s.call_active)
                .ok_or_else(|| Error::SessionNotFound(phone_hash.clone()))?,
        };

        let (state, input) = step_input(step, request, session.menu_state);
        let transition = {
            let ctx = MenuContext::new(&session, &self.telephony);
            menu::transition(state, &input, &ctx)?
        };
        let (transition, language) = self
            .apply(phone, &session, (step, state), &input, transition)
            .await?;

        self.store.update_menu(phone, transition.next).await?;
        tracing::debug!(
            phone_hash = %phone_hash,
            session_id = %session.session_id,
            step = step.path(),
            next = %transition.next,
            directive = ?transition.directive,
            "menu step"
        );

        Ok(prompts::render(&transition.directive, language, &self.telephony))
    }

    /// Apply a transition's effects; races with background jobs may replace the directive
    async fn apply(
        &self,
        phone: &str,
        session: &Session,
        (step, state): (Step, MenuState),
        input: &MenuInput,
        mut transition: Transition,
    ) -> Result<(Transition, Language)> {
        let mut language = session.language;
        let phone_hash = hash_phone(phone);
        let effects = std::mem::take(&mut transition.effects);

        for effect in effects {
            match effect {
                Effect::SetLanguage(selected) => {
                    self.store.update_language(phone, selected).await?;
                    language = selected;
                    tracing::info!(phone_hash = %phone_hash, language = %selected, "language selected");
                }
                Effect::RecordInvalid => {
                    let attempts = self.store.record_invalid_input(phone).await?;
                    tracing::info!(phone_hash = %phone_hash, state = %state, attempts, "invalid menu input");
                }
                Effect::ResetInvalid => self.store.reset_invalid_input(phone).await?,
                Effect::ResetProcessing => {
                    if let Err(e) = self.store.reset_processing(phone).await {
                        tracing::warn!(phone_hash = %phone_hash, error = %e, "processing status not reset");
                    }
                }
                Effect::StartJob { reference } => self.start_job(phone, reference).await?,
                Effect::StartDetailJob => {
                    if let Some(directive) = self.start_detail_job(phone, session).await? {
                        transition.directive = directive;
                    }
                }
                Effect::ForceTimeout => {
                    if self
                        .store
                        .force_timeout(phone, self.telephony.poll_ceiling)
                        .await?
                    {
                        self.tracker.record(
                            ErrorCategory::ProcessingTimeout,
                            "response_delivery",
                            "job exceeded poll ceiling",
                            Correlation::caller(phone, session.session_id, language),
                        );
                    } else {
                        // The job finished between our read and the forced write
                        transition = self.recompute(phone, state, input).await?;
                    }
                }
                Effect::EndCall => self.store.end(phone).await?,
            }
        }

        if let (Step::QuestionRecording, Directive::ErrorFallback(category)) =
            (step, &transition.directive)
        {
            self.tracker.record(
                *category,
                "question_recording",
                "recording webhook without a usable reference",
                Correlation::caller(phone, session.session_id, language),
            );
        }

        Ok((transition, language))
    }

    async fn start_job(&self, phone: &str, reference: String) -> Result<()> {
        let phone_hash = hash_phone(phone);
        match self.store.begin_job(phone).await? {
            Some(ticket) => {
                tracing::info!(
                    phone_hash = %phone_hash,
                    session_id = %ticket.session_id,
                    generation = ticket.generation,
                    language = %ticket.language,
                    "question job admitted"
                );
                let job = ProcessingJob {
                    phone_number: phone.to_string(),
                    recording_reference: reference,
                    language: ticket.language,
                };
                self.pipeline.spawn(job, ticket);
            }
            None => tracing::info!(phone_hash = %phone_hash, "job already in flight, not starting another"),
        }
        Ok(())
    }

    /// Start a detail job; returns a replacement directive if none can run
    async fn start_detail_job(&self, phone: &str, session: &Session) -> Result<Option<Directive>> {
        if let Some(ticket) = self.store.begin_detail_job(phone).await? {
            tracing::info!(phone_hash = %hash_phone(phone), "detail job started");
            self.pipeline.spawn_detail(phone.to_string(), ticket);
            return Ok(None);
        }

        let running = self
            .store
            .get(phone)
            .await
            .is_some_and(|s| s.detail_started_at.is_some());
        if running {
            return Ok(None);
        }
        Ok(session.current_response.as_ref().map(|response| Directive::SpeakAnswer {
            text: response
                .detailed_answer_text
                .clone()
                .unwrap_or_else(|| response.short_answer_text.clone()),
        }))
    }

    async fn recompute(&self, phone: &str, state: MenuState, input: &MenuInput) -> Result<Transition> {
        let session = self
            .store
            .get(phone)
            .await
            .ok_or_else(|| Error::SessionNotFound(hash_phone(phone)))?;
        let ctx = MenuContext::new(&session, &self.telephony);
        let mut transition = menu::transition(state, input, &ctx)?;
        if transition.effects.contains(&Effect::ForceTimeout) {
            transition = Transition::to(MenuState::ProcessingQuestion, Directive::PleaseWait);
        }
        transition.effects.clear();
        Ok(transition)
    }
}

/// Map a webhook to the menu step it belongs to and the caller's input
fn step_input(step: Step, request: &WebhookRequest, current: MenuState) -> (MenuState, MenuInput) {
    let digits = || MenuInput::Digits(normalize_digits(request.digits.as_deref().unwrap_or_default()));
    match step {
        Step::IncomingCall => (MenuState::Welcome, MenuInput::CallStarted),
        Step::LanguageSelection => (MenuState::LanguageSelection, digits()),
        Step::GradeConfirmation => (MenuState::GradeConfirmation, digits()),
        Step::InteractionMode => (MenuState::InteractionMode, MenuInput::Enter),
        Step::InteractionModeSelection => (MenuState::InteractionMode, digits()),
        Step::QuestionRecording => (
            MenuState::RecordingQuestion,
            MenuInput::Recording {
                reference: request.recording_url.clone(),
                duration_secs: request
                    .recording_duration
                    .as_deref()
                    .and_then(|d| d.trim().parse().ok()),
            },
        ),
        Step::ResponseDelivery => (MenuState::ProcessingQuestion, MenuInput::DeliveryPoll),
        Step::FollowUpMenu => (MenuState::FollowUpMenu, digits()),
        Step::DetailedAnswer => (MenuState::FollowUpMenu, MenuInput::DetailPoll),
        Step::ErrorRecovery => (MenuState::ErrorRecovery, digits()),
        Step::CallEnd | Step::RecordingStatus => (current, MenuInput::Hangup),
    }
}
