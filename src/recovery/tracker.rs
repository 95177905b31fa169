//! Bounded in-memory log of handled failures

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::ErrorCategory;
use crate::Language;

/// Default number of events kept before the oldest are dropped
pub const DEFAULT_CAPACITY: usize = 500;

/// Hash a phone number for logs and error events.
///
/// Raw numbers never appear in diagnostics; the short hash still lets an
/// operator correlate events for the same caller.
#[must_use]
pub fn hash_phone(phone_number: &str) -> String {
    let digest = Sha256::digest(phone_number.as_bytes());
    hex::encode(&digest[..4])
}

/// Identifiers tying a failure to a caller
#[derive(Debug, Clone, Copy, Default)]
pub struct Correlation<'a> {
    pub phone_number: Option<&'a str>,
    pub session_id: Option<Uuid>,
    pub language: Option<Language>,
}

impl<'a> Correlation<'a> {
    #[must_use]
    pub const fn caller(phone_number: &'a str, session_id: Uuid, language: Language) -> Self {
        Self {
            phone_number: Some(phone_number),
            session_id: Some(session_id),
            language: Some(language),
        }
    }
}

/// A single handled failure
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub at: DateTime<Utc>,
    pub component: String,
    pub category: ErrorCategory,
    pub message: String,
    pub session_id: Option<Uuid>,
    pub phone_hash: Option<String>,
    pub language: Option<Language>,
    pub recovery_action: &'static str,
}

/// Aggregate view returned by [`ErrorTracker::summary`]
#[derive(Debug, Clone, Serialize)]
pub struct ErrorSummary {
    pub total: u64,
    pub retained: usize,
    pub by_category: HashMap<ErrorCategory, u64>,
    pub recent: Vec<ErrorEvent>,
}

#[derive(Debug, Default)]
struct TrackerState {
    events: VecDeque<ErrorEvent>,
    counts: HashMap<ErrorCategory, u64>,
    total: u64,
}

/// Records failures for diagnostics, keeping the most recent `capacity` events
#[derive(Debug)]
pub struct ErrorTracker {
    capacity: usize,
    state: Mutex<TrackerState>,
}

impl Default for ErrorTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ErrorTracker {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Record a failure and return the event that was stored
    pub fn record(
        &self,
        category: ErrorCategory,
        component: &str,
        message: &str,
        ids: Correlation<'_>,
    ) -> ErrorEvent {
        let event = ErrorEvent {
            at: Utc::now(),
            component: component.to_string(),
            category,
            message: message.to_string(),
            session_id: ids.session_id,
            phone_hash: ids.phone_number.map(hash_phone),
            language: ids.language,
            recovery_action: category.recovery_action(),
        };

        tracing::warn!(
            category = category.as_str(),
            phone_hash = event.phone_hash.as_deref().unwrap_or("-"),
            component,
            error = message,
            recovery = event.recovery_action,
            "handled failure"
        );

        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.events.len() >= self.capacity {
            state.events.pop_front();
        }
        state.events.push_back(event.clone());
        *state.counts.entry(category).or_insert(0) += 1;
        state.total += 1;

        event
    }

    /// Totals per category plus the `recent` most recent events, newest last
    #[must_use]
    pub fn summary(&self, recent: usize) -> ErrorSummary {
        let state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let skip = state.events.len().saturating_sub(recent);
        ErrorSummary {
            total: state.total,
            retained: state.events.len(),
            by_category: state.counts.clone(),
            recent: state.events.iter().skip(skip).cloned().collect(),
        }
    }

    /// Number of recorded failures in a category since startup
    #[must_use]
    pub fn count(&self, category: ErrorCategory) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .counts
            .get(&category)
            .copied()
            .unwrap_or(0)
    }
}
