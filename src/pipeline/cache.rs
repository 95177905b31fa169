//! TTL cache of synthesized answer audio

use std::sync::Arc;
use std::time::Duration;

use mini_moka::sync::Cache;

use crate::Language;

#[derive(Debug, Hash, Eq, PartialEq, Clone)]
struct SynthesisKey {
    language: Language,
    text: String,
}

/// Synthesized audio keyed by language and exact text
///
/// Repeated answers (curated questions, detailed text equal to the short
/// text) skip the synthesis call while the cached audio is younger than the
/// audio TTL.
#[derive(Clone, Debug)]
pub struct SynthesisCache {
    entries: Cache<SynthesisKey, Arc<Vec<u8>>>,
}

impl SynthesisCache {
    #[must_use]
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    #[must_use]
    pub fn get(&self, language: Language, text: &str) -> Option<Arc<Vec<u8>>> {
        self.entries.get(&SynthesisKey {
            language,
            text: text.to_string(),
        })
    }

    pub fn put(&self, language: Language, text: &str, audio: Arc<Vec<u8>>) {
        self.entries.insert(
            SynthesisKey {
                language,
                text: text.to_string(),
            },
            audio,
        );
    }
}
