//! Configuration management for the IVR tutor
//!
//! Values resolve as env > TOML file > built-in default.

pub mod file;

use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::pipeline::RecordingCredentials;
use crate::recovery::RetryPolicy;
use crate::{Error, Result};

use file::ConfigFile;

/// IVR tutor configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub telephony: TelephonyConfig,
    pub pipeline: PipelineConfig,
    pub audio: AudioConfig,
    pub session: SessionConfig,
    pub speech: SpeechConfig,
    pub answer: AnswerConfig,
    pub recording: RecordingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base of every published audio URL; must be reachable by the provider
    pub public_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            public_base_url: "http://localhost:5000".to_string(),
        }
    }
}

/// Call-flow limits and timings
#[derive(Debug, Clone, PartialEq)]
pub struct TelephonyConfig {
    /// Recordings shorter than this are rejected as too short
    pub min_recording_secs: f64,
    /// Recordings longer than this are rejected as too long
    pub max_recording_secs: f64,
    /// `maxLength` of the record instruction
    pub record_max_length_secs: u32,
    /// Silence that ends a recording
    pub record_silence_timeout_secs: u32,
    /// How long "deliver answer" keeps polling before forcing a timeout
    pub poll_ceiling: Duration,
    /// Pause before each poll redirect
    pub poll_pause_secs: u32,
    /// Digit timeout for language and recovery menus
    pub gather_timeout_secs: u32,
    /// Digit timeout for the interaction and follow-up menus
    pub menu_timeout_secs: u32,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            min_recording_secs: 1.0,
            max_recording_secs: 16.0,
            record_max_length_secs: 15,
            record_silence_timeout_secs: 3,
            poll_ceiling: Duration::from_secs(15),
            poll_pause_secs: 3,
            gather_timeout_secs: 10,
            menu_timeout_secs: 15,
        }
    }
}

/// Question processing configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Transcriptions below this confidence trigger the language fallback
    pub confidence_threshold: f32,
    /// Recording references containing any of these resolve to silence
    pub placeholder_markers: Vec<String>,
    pub placeholder_silence_ms: u32,
    pub placeholder_sample_rate: u32,
    /// Recording fetch, transcription and answer calls
    pub external_retry: RetryPolicy,
    pub synthesis_retry: RetryPolicy,
    pub synthesis_cache_ttl: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            placeholder_markers: vec!["example.com".to_string(), "placeholder".to_string()],
            placeholder_silence_ms: 1000,
            placeholder_sample_rate: 8000,
            external_retry: RetryPolicy::default(),
            synthesis_retry: RetryPolicy::fixed(2, Duration::from_millis(500)),
            synthesis_cache_ttl: Duration::from_secs(3600),
        }
    }
}

/// Published audio store configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    pub ttl: Duration,
    pub sweep_interval: Duration,
    /// Sample rate assumed when wrapping raw PCM
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(600),
            sample_rate: 8000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Sessions idle longer than this are dropped by cleanup
    pub idle_expiry: Duration,
    pub cleanup_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_expiry: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// OpenAI-compatible speech back end
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub stt_model: String,
    pub tts_model: String,
    pub voice: String,
    /// TTS speed multiplier (0.25 to 4.0)
    pub speed: f32,
    pub timeout: Duration,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            stt_model: "whisper-1".to_string(),
            tts_model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            speed: 1.0,
            timeout: Duration::from_secs(20),
        }
    }
}

/// Answer back end; curated answers only when no URL is set
#[derive(Debug, Clone)]
pub struct AnswerConfig {
    pub url: Option<String>,
    pub timeout: Duration,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordingConfig {
    pub credentials: Option<RecordingCredentials>,
    pub timeout: Duration,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from the config file and process environment
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load() -> Result<Self> {
        let config = Self::from_sources(&file::load_config_file(), |key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Assemble configuration from a parsed file and an env lookup
    #[must_use]
    pub fn from_sources(fc: &ConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let secs = |key: &str| parsed::<u64>(&var, key).map(Duration::from_secs);

        let server = ServerConfig {
            host: var("IVR_HOST")
                .or_else(|| fc.server.host.clone())
                .unwrap_or(defaults.server.host),
            port: parsed(&var, "IVR_PORT")
                .or_else(|| parsed(&var, "PORT"))
                .or(fc.server.port)
                .unwrap_or(defaults.server.port),
            public_base_url: var("IVR_PUBLIC_BASE_URL")
                .or_else(|| fc.server.public_base_url.clone())
                .unwrap_or(defaults.server.public_base_url)
                .trim_end_matches('/')
                .to_string(),
        };

        let t = &fc.telephony;
        let telephony = TelephonyConfig {
            min_recording_secs: parsed(&var, "IVR_MIN_RECORDING_SECS")
                .or(t.min_recording_secs)
                .unwrap_or(defaults.telephony.min_recording_secs),
            max_recording_secs: parsed(&var, "IVR_MAX_RECORDING_SECS")
                .or(t.max_recording_secs)
                .unwrap_or(defaults.telephony.max_recording_secs),
            record_max_length_secs: t
                .record_max_length_secs
                .unwrap_or(defaults.telephony.record_max_length_secs),
            poll_ceiling: secs("IVR_POLL_CEILING_SECS")
                .or_else(|| t.poll_ceiling_secs.map(Duration::from_secs))
                .unwrap_or(defaults.telephony.poll_ceiling),
            poll_pause_secs: t.poll_pause_secs.unwrap_or(defaults.telephony.poll_pause_secs),
            gather_timeout_secs: t
                .gather_timeout_secs
                .unwrap_or(defaults.telephony.gather_timeout_secs),
            menu_timeout_secs: t.menu_timeout_secs.unwrap_or(defaults.telephony.menu_timeout_secs),
            ..defaults.telephony
        };

        let audio = AudioConfig {
            ttl: secs("IVR_AUDIO_TTL_SECS")
                .or_else(|| fc.audio.ttl_secs.map(Duration::from_secs))
                .unwrap_or(defaults.audio.ttl),
            sweep_interval: fc
                .audio
                .sweep_interval_secs
                .map_or(defaults.audio.sweep_interval, Duration::from_secs),
            sample_rate: fc.audio.sample_rate.unwrap_or(defaults.audio.sample_rate),
        };

        let mut external_retry = defaults.pipeline.external_retry.clone();
        let mut synthesis_retry = defaults.pipeline.synthesis_retry.clone();
        if let Some(max_retries) = parsed(&var, "IVR_MAX_RETRIES").or(fc.pipeline.max_retries) {
            external_retry.max_retries = max_retries;
            synthesis_retry.max_retries = max_retries;
        }
        let pipeline = PipelineConfig {
            confidence_threshold: parsed(&var, "IVR_CONFIDENCE_THRESHOLD")
                .or(fc.pipeline.confidence_threshold)
                .unwrap_or(defaults.pipeline.confidence_threshold),
            placeholder_markers: fc
                .pipeline
                .placeholder_markers
                .clone()
                .unwrap_or(defaults.pipeline.placeholder_markers),
            placeholder_sample_rate: audio.sample_rate,
            external_retry,
            synthesis_retry,
            synthesis_cache_ttl: audio.ttl,
            ..defaults.pipeline
        };

        let session = SessionConfig {
            idle_expiry: secs("IVR_SESSION_IDLE_SECS")
                .or_else(|| fc.session.idle_expiry_secs.map(Duration::from_secs))
                .unwrap_or(defaults.session.idle_expiry),
            cleanup_interval: fc
                .session
                .cleanup_interval_secs
                .map_or(defaults.session.cleanup_interval, Duration::from_secs),
        };

        let s = &fc.speech;
        let speech = SpeechConfig {
            base_url: var("OPENAI_BASE_URL")
                .or_else(|| s.base_url.clone())
                .unwrap_or(defaults.speech.base_url),
            api_key: var("OPENAI_API_KEY")
                .or_else(|| s.api_key.clone())
                .map(SecretString::from),
            stt_model: var("IVR_STT_MODEL")
                .or_else(|| s.stt_model.clone())
                .unwrap_or(defaults.speech.stt_model),
            tts_model: var("IVR_TTS_MODEL")
                .or_else(|| s.tts_model.clone())
                .unwrap_or(defaults.speech.tts_model),
            voice: var("IVR_TTS_VOICE")
                .or_else(|| s.voice.clone())
                .unwrap_or(defaults.speech.voice),
            speed: s.speed.unwrap_or(defaults.speech.speed),
            timeout: s
                .timeout_secs
                .map_or(defaults.speech.timeout, Duration::from_secs),
        };

        let answer = AnswerConfig {
            url: var("IVR_ANSWER_URL").or_else(|| fc.answer.url.clone()),
            timeout: fc
                .answer
                .timeout_secs
                .map_or(defaults.answer.timeout, Duration::from_secs),
        };

        let username = var("IVR_RECORDING_USERNAME")
            .or_else(|| var("TWILIO_ACCOUNT_SID"))
            .or_else(|| fc.recording.username.clone());
        let password = var("IVR_RECORDING_PASSWORD")
            .or_else(|| var("TWILIO_AUTH_TOKEN"))
            .or_else(|| fc.recording.password.clone());
        let recording = RecordingConfig {
            credentials: username.zip(password).map(|(username, password)| RecordingCredentials {
                username,
                password: SecretString::from(password),
            }),
            timeout: fc
                .recording
                .timeout_secs
                .map_or(defaults.recording.timeout, Duration::from_secs),
        };

        Self {
            server,
            telephony,
            pipeline,
            audio,
            session,
            speech,
            answer,
            recording,
        }
    }

    /// Check values that would break the call flow
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if !(self.server.public_base_url.starts_with("http://")
            || self.server.public_base_url.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "public base URL must be http(s): {}",
                self.server.public_base_url
            )));
        }
        let t = &self.telephony;
        if !(t.min_recording_secs >= 0.0 && t.min_recording_secs < t.max_recording_secs) {
            return Err(Error::Config(format!(
                "recording bounds must satisfy 0 <= min < max, got {} and {}",
                t.min_recording_secs, t.max_recording_secs
            )));
        }
        if t.poll_ceiling.is_zero() {
            return Err(Error::Config("poll ceiling must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.pipeline.confidence_threshold) {
            return Err(Error::Config(format!(
                "confidence threshold must be within 0..=1, got {}",
                self.pipeline.confidence_threshold
            )));
        }
        if self.audio.ttl.is_zero() || self.audio.sample_rate == 0 {
            return Err(Error::Config(
                "audio TTL and sample rate must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Human-readable summary with secrets masked
    #[must_use]
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        let set = |present: bool| (if present { "set" } else { "not set" }).to_string();
        vec![
            ("listen", format!("{}:{}", self.server.host, self.server.port)),
            ("public base URL", self.server.public_base_url.clone()),
            (
                "recording bounds",
                format!(
                    "{}s..{}s",
                    self.telephony.min_recording_secs, self.telephony.max_recording_secs
                ),
            ),
            (
                "poll ceiling",
                format!("{}s", self.telephony.poll_ceiling.as_secs()),
            ),
            (
                "confidence threshold",
                self.pipeline.confidence_threshold.to_string(),
            ),
            ("audio TTL", format!("{}s", self.audio.ttl.as_secs())),
            (
                "session idle expiry",
                format!("{}s", self.session.idle_expiry.as_secs()),
            ),
            ("speech base URL", self.speech.base_url.clone()),
            (
                "speech API key",
                set(self
                    .speech
                    .api_key
                    .as_ref()
                    .is_some_and(|k| !k.expose_secret().is_empty())),
            ),
            (
                "speech models",
                format!("{} / {}", self.speech.stt_model, self.speech.tts_model),
            ),
            (
                "answer back end",
                self.answer
                    .url
                    .clone()
                    .unwrap_or_else(|| "curated answers only".to_string()),
            ),
            (
                "recording credentials",
                set(self.recording.credentials.is_some()),
            ),
        ]
    }
}

fn parsed<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn file_from(toml_text: &str) -> ConfigFile {
        toml::from_str(toml_text).unwrap()
    }

    // -- defaults ---------------------------------------------------------------

    #[test]
    fn defaults_match_call_flow_constants() {
        let config = Config::from_sources(&ConfigFile::default(), env_of(&[]));
        assert_eq!(config.server.port, 5000);
        assert!((config.telephony.min_recording_secs - 1.0).abs() < f64::EPSILON);
        assert!((config.telephony.max_recording_secs - 16.0).abs() < f64::EPSILON);
        assert_eq!(config.telephony.poll_ceiling, Duration::from_secs(15));
        assert_eq!(config.audio.ttl, Duration::from_secs(3600));
        assert_eq!(config.pipeline.external_retry.max_retries, 2);
        assert_eq!(
            config.pipeline.synthesis_retry,
            RetryPolicy::fixed(2, Duration::from_millis(500))
        );
        assert!(config.speech.api_key.is_none());
        assert!(config.answer.url.is_none());
        assert!(config.recording.credentials.is_none());
        config.validate().unwrap();
    }

    // -- layering ---------------------------------------------------------------

    #[test]
    fn file_overrides_defaults() {
        let fc = file_from(
            r#"
[server]
port = 8080
public_base_url = "https://ivr.test/"

[telephony]
poll_ceiling_secs = 20
"#,
        );
        let config = Config::from_sources(&fc, env_of(&[]));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.public_base_url, "https://ivr.test");
        assert_eq!(config.telephony.poll_ceiling, Duration::from_secs(20));
    }

    #[test]
    fn env_overrides_file() {
        let fc = file_from("[server]\nport = 8080\n[speech]\napi_key = \"from-file\"\n");
        let config = Config::from_sources(
            &fc,
            env_of(&[("PORT", "9000"), ("OPENAI_API_KEY", "from-env")]),
        );
        assert_eq!(config.server.port, 9000);
        assert_eq!(
            config.speech.api_key.as_ref().map(|k| k.expose_secret().to_string()),
            Some("from-env".to_string())
        );
    }

    #[test]
    fn ivr_port_wins_over_port() {
        let config = Config::from_sources(
            &ConfigFile::default(),
            env_of(&[("PORT", "9000"), ("IVR_PORT", "7000")]),
        );
        assert_eq!(config.server.port, 7000);
    }

    #[test]
    fn unparseable_env_falls_back() {
        let config = Config::from_sources(
            &ConfigFile::default(),
            env_of(&[("IVR_PORT", "not-a-port"), ("IVR_POLL_CEILING_SECS", "")]),
        );
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.telephony.poll_ceiling, Duration::from_secs(15));
    }

    #[test]
    fn recording_credentials_need_both_parts() {
        let only_user = Config::from_sources(
            &ConfigFile::default(),
            env_of(&[("TWILIO_ACCOUNT_SID", "AC1")]),
        );
        assert!(only_user.recording.credentials.is_none());

        let both = Config::from_sources(
            &ConfigFile::default(),
            env_of(&[("TWILIO_ACCOUNT_SID", "AC1"), ("TWILIO_AUTH_TOKEN", "secret")]),
        );
        let creds = both.recording.credentials.unwrap();
        assert_eq!(creds.username, "AC1");
        assert_eq!(creds.password.expose_secret(), "secret");
    }

    #[test]
    fn synthesis_cache_follows_audio_ttl() {
        let config = Config::from_sources(
            &ConfigFile::default(),
            env_of(&[("IVR_AUDIO_TTL_SECS", "120")]),
        );
        assert_eq!(config.pipeline.synthesis_cache_ttl, Duration::from_secs(120));
    }

    // -- validation -------------------------------------------------------------

    #[test]
    fn rejects_inverted_recording_bounds() {
        let mut config = Config::default();
        config.telephony.min_recording_secs = 20.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_non_http_base_url() {
        let mut config = Config::default();
        config.server.public_base_url = "ftp://host".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn summary_masks_secrets() {
        let config = Config::from_sources(
            &ConfigFile::default(),
            env_of(&[("OPENAI_API_KEY", "sk-very-secret")]),
        );
        let rendered = format!("{:?}", config.summary());
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("speech API key"));
    }
}
