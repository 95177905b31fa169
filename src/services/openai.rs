//! OpenAI-compatible speech back end (Whisper transcription, `/audio/speech` synthesis)

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{SpeechService, Transcription};
use crate::config::SpeechConfig;
use crate::{Error, Language, Result};

/// Whisper `verbose_json` response
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(serde::Deserialize)]
struct WhisperSegment {
    avg_logprob: f64,
    #[serde(default)]
    no_speech_prob: f64,
}

/// Speech service backed by an OpenAI-compatible HTTP API
pub struct OpenAiSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    stt_model: String,
    tts_model: String,
    voice: String,
    speed: f32,
}

impl OpenAiSpeech {
    /// Create a speech client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing or the HTTP client cannot be built
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.expose_secret().is_empty())
            .ok_or_else(|| Error::Config("OpenAI API key required for speech".to_string()))?;

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            stt_model: config.stt_model.clone(),
            tts_model: config.tts_model.clone(),
            voice: config.voice.clone(),
            speed: config.speed,
        })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key.expose_secret())
    }
}

#[async_trait]
impl SpeechService for OpenAiSpeech {
    async fn transcribe(&self, audio: &[u8], language: Language) -> Result<Transcription> {
        tracing::debug!(
            audio_bytes = audio.len(),
            language = %language,
            "starting Whisper transcription"
        );

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("question.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.stt_model.clone())
            .text("language", language.iso_code())
            .text("response_format", "verbose_json");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header("Authorization", self.bearer())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::from_status(status.as_u16(), &body, Error::Stt));
        }

        let result: WhisperResponse = response.json().await?;
        let confidence = segment_confidence(&result.text, &result.segments);

        tracing::info!(
            chars = result.text.len(),
            confidence,
            "transcription complete"
        );
        Ok(Transcription {
            text: result.text.trim().to_string(),
            confidence,
        })
    }

    async fn synthesize(&self, text: &str, language: Language) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        if text.trim().is_empty() {
            return Err(Error::Tts("nothing to synthesize".to_string()));
        }

        let request = SpeechRequest {
            model: &self.tts_model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
            response_format: "wav",
        };

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .header("Authorization", self.bearer())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "speech synthesis API error");
            return Err(Error::from_status(status.as_u16(), &body, Error::Tts));
        }

        let bytes = response.bytes().await?;
        tracing::debug!(
            audio_bytes = bytes.len(),
            language = %language,
            "synthesis complete"
        );
        Ok(bytes.to_vec())
    }
}

/// Confidence from Whisper segment statistics.
///
/// Each segment contributes `exp(avg_logprob)` weighted by the probability
/// that it contains speech. Without segments, any text counts as confident.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn segment_confidence(text: &str, segments: &[WhisperSegment]) -> f32 {
    if text.trim().is_empty() {
        return 0.0;
    }
    if segments.is_empty() {
        return 1.0;
    }

    let sum: f64 = segments
        .iter()
        .map(|s| s.avg_logprob.exp().clamp(0.0, 1.0) * (1.0 - s.no_speech_prob.clamp(0.0, 1.0)))
        .sum();
    (sum / segments.len() as f64) as f32
}
