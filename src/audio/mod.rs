//! Audio publisher
//!
//! Content-addressed, TTL-evicted store that turns synthesized audio into
//! short-lived URLs the telephony provider can fetch. Entries live
//! independently of sessions and are only removed by age.

pub mod wav;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;

use crate::Result;

pub use wav::{Container, ensure_container, silence_wav, wav_duration_ms};

/// Default time an audio object stays fetchable (1 hour)
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// A stored audio payload
#[derive(Debug, Clone)]
pub struct AudioObject {
    pub bytes: Arc<[u8]>,
    pub content_hash: String,
    pub content_type: &'static str,
    pub created_at: DateTime<Utc>,
    stored: Instant,
}

/// Handle returned by [`AudioPublisher::store`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedAudio {
    pub key: String,
    pub url: String,
}

/// Diagnostic counts for `GET /audio-storage/stats`
#[derive(Debug, Clone, Serialize)]
pub struct AudioStats {
    pub entries: usize,
    pub total_bytes: usize,
    pub expired_pending: usize,
    pub ttl_secs: u64,
    pub oldest_age_secs: Option<u64>,
    pub stored_total: u64,
    pub swept_total: u64,
}

/// Shared audio object store
#[derive(Debug)]
pub struct AudioPublisher {
    entries: DashMap<String, AudioObject>,
    ttl: Duration,
    base_url: String,
    sample_rate: u32,
    stored_total: AtomicU64,
    swept_total: AtomicU64,
}

impl AudioPublisher {
    /// Create a publisher whose URLs start with `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>, ttl: Duration, sample_rate: u32) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            sample_rate,
            stored_total: AtomicU64::new(0),
            swept_total: AtomicU64::new(0),
        }
    }

    /// Public URL for a key
    #[must_use]
    pub fn url_for(&self, key: &str) -> String {
        format!("{}/audio/{key}", self.base_url)
    }

    /// Store audio and return its key and URL.
    ///
    /// Raw PCM is wrapped in a WAV container first. The key embeds a hash of the
    /// stored bytes, so storing identical content under the same hint refreshes
    /// the existing entry instead of writing a second copy.
    ///
    /// # Errors
    ///
    /// Returns error if the payload is empty or cannot be wrapped
    pub fn store(&self, bytes: &[u8], name_hint: &str) -> Result<PublishedAudio> {
        let (payload, container) = ensure_container(bytes, self.sample_rate)?;
        let content_hash = hex::encode(Sha256::digest(&payload));
        let key = format!(
            "{}_{}.{}",
            sanitize_hint(name_hint),
            &content_hash[..16],
            container.extension()
        );

        let now = Instant::now();
        self.entries
            .entry(key.clone())
            .and_modify(|existing| {
                existing.stored = now;
                existing.created_at = Utc::now();
            })
            .or_insert_with(|| AudioObject {
                bytes: Arc::from(payload),
                content_hash,
                content_type: container.content_type(),
                created_at: Utc::now(),
                stored: now,
            });
        self.stored_total.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(key = %key, "audio published");

        Ok(PublishedAudio {
            url: self.url_for(&key),
            key,
        })
    }

    /// Fetch a stored object; expired entries are treated as absent
    #[must_use]
    pub fn get(&self, key: &str) -> Option<AudioObject> {
        let entry = self.entries.get(key)?;
        if entry.stored.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.clone())
    }

    /// Remove every entry older than the TTL, returning how many were dropped
    pub fn sweep_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, object| object.stored.elapsed() < self.ttl);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.swept_total
                .fetch_add(u64::try_from(removed).unwrap_or(u64::MAX), Ordering::Relaxed);
            tracing::info!(removed, remaining = self.entries.len(), "swept expired audio");
        }
        removed
    }

    #[must_use]
    pub fn stats(&self) -> AudioStats {
        let mut total_bytes = 0;
        let mut expired_pending = 0;
        let mut oldest: Option<Duration> = None;
        for entry in &self.entries {
            let age = entry.stored.elapsed();
            total_bytes += entry.bytes.len();
            if age >= self.ttl {
                expired_pending += 1;
            }
            oldest = Some(oldest.map_or(age, |o| o.max(age)));
        }

        AudioStats {
            entries: self.entries.len(),
            total_bytes,
            expired_pending,
            ttl_secs: self.ttl.as_secs(),
            oldest_age_secs: oldest.map(|d| d.as_secs()),
            stored_total: self.stored_total.load(Ordering::Relaxed),
            swept_total: self.swept_total.load(Ordering::Relaxed),
        }
    }

    /// Run [`Self::sweep_expired`] every `interval` until the task is aborted
    #[must_use]
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep_expired();
            }
        })
    }
}

/// Reduce a name hint to a URL-safe key prefix
fn sanitize_hint(hint: &str) -> String {
    let cleaned: String = hint
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(48)
        .collect();
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "audio".to_string()
    } else {
        cleaned.to_string()
    }
}
