//! In-process session store

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{
    DetailOutcome, DetailTicket, JobOutcome, JobTicket, MenuState, ProcessingStatus, ResponseData,
    Session, SessionStats, SessionStore,
};
use crate::recovery::{ErrorCategory, hash_phone};
use crate::{Error, Language, Result};

/// Session store backed by a single mutex over a map.
///
/// The lock is never held across an await point, so the async trait methods
/// complete without yielding.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the caller's session under the lock, touching `last_activity`
    fn with_session<R>(&self, phone: &str, f: impl FnOnce(&mut Session) -> Result<R>) -> Result<R> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(phone)
            .ok_or_else(|| Error::SessionNotFound(hash_phone(phone)))?;
        session.last_activity = Utc::now();
        f(session)
    }
}

fn transition(session: &mut Session, next: ProcessingStatus) -> Result<()> {
    let current = session.processing_status;
    if !current.can_transition_to(next) {
        return Err(Error::InvalidTransition(format!("{current} -> {next}")));
    }
    session.processing_status = next;
    Ok(())
}

fn store_response_locked(session: &mut Session, response: ResponseData) {
    session.response_history.push(response.short_answer_text.clone());
    session.current_response = Some(response);
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, phone: &str) -> Session {
        let session = Session::new(phone);
        let previous = self.lock().insert(phone.to_string(), session.clone());
        tracing::info!(
            phone_hash = %hash_phone(phone),
            session_id = %session.session_id,
            replaced = previous.is_some(),
            "session created"
        );
        session
    }

    async fn get(&self, phone: &str) -> Option<Session> {
        self.lock().get(phone).cloned()
    }

    async fn get_or_create(&self, phone: &str) -> Session {
        {
            let mut sessions = self.lock();
            if let Some(session) = sessions.get_mut(phone).filter(|s| s.call_active) {
                session.last_activity = Utc::now();
                return session.clone();
            }
        }
        self.create(phone).await
    }

    async fn update_language(&self, phone: &str, language: Language) -> Result<()> {
        self.with_session(phone, |s| {
            s.language = language;
            Ok(())
        })
    }

    async fn update_menu(&self, phone: &str, state: MenuState) -> Result<()> {
        self.with_session(phone, |s| {
            if s.menu_state != state {
                tracing::debug!(
                    session_id = %s.session_id,
                    from = %s.menu_state,
                    to = %state,
                    "menu transition"
                );
            }
            s.menu_state = state;
            Ok(())
        })
    }

    async fn append_question(&self, phone: &str, question: &str) -> Result<()> {
        self.with_session(phone, |s| {
            s.question_history.push(question.to_string());
            Ok(())
        })
    }

    async fn append_response(&self, phone: &str, response: &str) -> Result<()> {
        self.with_session(phone, |s| {
            s.response_history.push(response.to_string());
            Ok(())
        })
    }

    async fn update_processing_status(&self, phone: &str, status: ProcessingStatus) -> Result<()> {
        self.with_session(phone, |s| transition(s, status))
    }

    async fn store_response(&self, phone: &str, response: ResponseData) -> Result<()> {
        self.with_session(phone, |s| {
            store_response_locked(s, response);
            Ok(())
        })
    }

    async fn begin_job(&self, phone: &str) -> Result<Option<JobTicket>> {
        self.with_session(phone, |s| {
            if s.is_in_flight() {
                return Ok(None);
            }
            transition(s, ProcessingStatus::ProcessingAudio)?;
            s.job_generation += 1;
            s.job_started_at = Some(Utc::now());
            s.last_error = None;
            s.detail_started_at = None;
            Ok(Some(JobTicket {
                session_id: s.session_id,
                generation: s.job_generation,
                language: s.language,
            }))
        })
    }

    async fn advance_job(
        &self,
        phone: &str,
        ticket: &JobTicket,
        status: ProcessingStatus,
    ) -> Result<bool> {
        self.with_session(phone, |s| {
            if !s.owns(ticket) {
                return Ok(false);
            }
            transition(s, status)?;
            Ok(true)
        })
    }

    async fn complete_job(
        &self,
        phone: &str,
        ticket: &JobTicket,
        outcome: JobOutcome,
    ) -> Result<bool> {
        self.with_session(phone, |s| {
            if !s.owns(ticket) || !s.is_in_flight() {
                tracing::debug!(
                    session_id = %ticket.session_id,
                    generation = ticket.generation,
                    "discarding stale job result"
                );
                return Ok(false);
            }

            match outcome {
                JobOutcome::Ready(response) => {
                    // Ready is only reachable from generating_response
                    if s.processing_status == ProcessingStatus::ProcessingAudio {
                        transition(s, ProcessingStatus::GeneratingResponse)?;
                    }
                    transition(s, ProcessingStatus::Ready)?;
                    s.question_history.push(response.question_text.clone());
                    store_response_locked(s, response);
                    s.last_error = None;
                }
                JobOutcome::Failed {
                    category,
                    question_text,
                } => {
                    transition(s, ProcessingStatus::Error)?;
                    if let Some(question) = question_text {
                        s.question_history.push(question);
                    }
                    s.last_error = Some(category);
                }
            }
            Ok(true)
        })
    }

    async fn force_timeout(&self, phone: &str, ceiling: Duration) -> Result<bool> {
        self.with_session(phone, |s| {
            let overdue = s.job_elapsed().is_some_and(|elapsed| elapsed > ceiling);
            if !s.is_in_flight() || !overdue {
                return Ok(false);
            }
            transition(s, ProcessingStatus::Error)?;
            s.last_error = Some(ErrorCategory::ProcessingTimeout);
            // Orphan the running job so its late result is discarded
            s.job_generation += 1;
            tracing::warn!(session_id = %s.session_id, "job exceeded poll ceiling");
            Ok(true)
        })
    }

    async fn reset_processing(&self, phone: &str) -> Result<()> {
        self.with_session(phone, |s| {
            if s.processing_status == ProcessingStatus::Idle {
                return Ok(());
            }
            transition(s, ProcessingStatus::Idle)?;
            s.job_started_at = None;
            s.last_error = None;
            Ok(())
        })
    }

    async fn begin_detail_job(&self, phone: &str) -> Result<Option<DetailTicket>> {
        self.with_session(phone, |s| {
            if s.detail_started_at.is_some() || s.processing_status != ProcessingStatus::Ready {
                return Ok(None);
            }
            let Some(response) = s.current_response.clone() else {
                return Ok(None);
            };
            if response.detail_attempted || response.detailed_answer_audio_url.is_some() {
                return Ok(None);
            }
            s.detail_started_at = Some(Utc::now());
            Ok(Some(DetailTicket {
                job: JobTicket {
                    session_id: s.session_id,
                    generation: s.job_generation,
                    language: response.language,
                },
                response,
            }))
        })
    }

    async fn complete_detail_job(
        &self,
        phone: &str,
        ticket: &DetailTicket,
        outcome: DetailOutcome,
    ) -> Result<bool> {
        self.with_session(phone, |s| {
            if !s.owns(&ticket.job) {
                return Ok(false);
            }
            let Some(current) = s.current_response.as_mut() else {
                return Ok(false);
            };
            if current.question_text != ticket.response.question_text {
                return Ok(false);
            }
            current.detailed_answer_text = Some(outcome.text);
            current.detailed_answer_audio_url = outcome.audio_url;
            current.detail_attempted = true;
            s.detail_started_at = None;
            Ok(true)
        })
    }

    async fn record_invalid_input(&self, phone: &str) -> Result<u32> {
        self.with_session(phone, |s| {
            s.invalid_attempts += 1;
            Ok(s.invalid_attempts)
        })
    }

    async fn reset_invalid_input(&self, phone: &str) -> Result<()> {
        self.with_session(phone, |s| {
            s.invalid_attempts = 0;
            Ok(())
        })
    }

    async fn end(&self, phone: &str) -> Result<()> {
        self.with_session(phone, |s| {
            s.call_active = false;
            s.menu_state = MenuState::Ended;
            tracing::info!(
                session_id = %s.session_id,
                questions = s.question_history.len(),
                duration_secs = (Utc::now() - s.start_time).num_seconds(),
                "call ended"
            );
            Ok(())
        })
    }

    async fn remove(&self, phone: &str) -> Option<Session> {
        self.lock().remove(phone)
    }

    async fn cleanup(&self, max_idle: Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, s| {
            let idle = (now - s.last_activity).to_std().unwrap_or_default();
            // Never drop a session whose job is still running
            s.is_in_flight() || (s.call_active && idle < max_idle)
        });
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(removed, remaining = sessions.len(), "cleaned up sessions");
        }
        removed
    }

    async fn stats(&self) -> SessionStats {
        let sessions = self.lock();
        SessionStats {
            total_sessions: sessions.len(),
            active_sessions: sessions.values().filter(|s| s.call_active).count(),
            jobs_in_flight: sessions.values().filter(|s| s.is_in_flight()).count(),
        }
    }
}
