//! Background question processing
//!
//! A job turns a recorded question into a spoken answer:
//!
//! 1. fetch the recording (demo sentinels resolve to generated silence)
//! 2. transcribe, with one fallback in the alternate language
//! 3. check the transcript is an in-scope question
//! 4. request simple and detailed answers
//! 5. synthesize both answers
//! 6. publish the audio for the telephony provider to fetch
//!
//! Every stage failure is caught at the stage boundary and turned into a
//! failed [`ProcessingResult`]; the job always writes exactly one outcome to
//! the session store.

pub mod cache;
pub mod fetch;
pub mod validate;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::audio::{AudioPublisher, silence_wav, wav_duration_ms};
use crate::config::PipelineConfig;
use crate::recovery::{Correlation, ErrorCategory, ErrorTracker, hash_phone, with_retry};
use crate::services::{AnswerService, DetailLevel, SpeechService, Subject, Transcription};
use crate::session::{
    DetailOutcome, DetailTicket, JobOutcome, JobTicket, ProcessingStatus, ResponseData,
    SessionStore,
};
use crate::{Error, Language, Result};

pub use cache::SynthesisCache;
pub use fetch::{HttpRecordingFetcher, RecordingCredentials, RecordingFetcher, is_placeholder};
pub use validate::{Verdict, validate_question};

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Transcribe,
    Validate,
    Answer,
    Synthesize,
    Publish,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Transcribe => "transcribe",
            Self::Validate => "validate",
            Self::Answer => "answer",
            Self::Synthesize => "synthesize",
            Self::Publish => "publish",
        }
    }
}

/// Wall-clock time spent in one stage
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub elapsed: Duration,
}

/// One question to process
#[derive(Debug, Clone)]
pub struct ProcessingJob {
    pub phone_number: String,
    pub recording_reference: String,
    pub language: Language,
}

/// Everything a job produced, successful or not
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub question_text: Option<String>,
    /// Language the question was understood in
    pub language: Language,
    pub short_answer_text: Option<String>,
    pub short_answer_audio_url: Option<String>,
    pub detailed_answer_text: Option<String>,
    pub detailed_answer_audio_url: Option<String>,
    pub error_category: Option<ErrorCategory>,
    pub error_message: Option<String>,
    pub elapsed: Duration,
    pub stages: Vec<StageTiming>,
}

impl ProcessingResult {
    /// Convert into the outcome written to the session store
    #[must_use]
    pub fn into_outcome(self) -> JobOutcome {
        match (self.success, self.short_answer_text, self.short_answer_audio_url) {
            (true, Some(short_answer_text), Some(short_answer_audio_url)) => {
                JobOutcome::Ready(ResponseData {
                    question_text: self.question_text.unwrap_or_default(),
                    short_answer_text,
                    short_answer_audio_url,
                    detailed_answer_text: self.detailed_answer_text,
                    detailed_answer_audio_url: self.detailed_answer_audio_url,
                    language: self.language,
                    detail_attempted: false,
                })
            }
            _ => JobOutcome::Failed {
                category: self.error_category.unwrap_or(ErrorCategory::System),
                question_text: self.question_text,
            },
        }
    }
}

/// Capabilities the pipeline calls out to
#[derive(Clone)]
pub struct Services {
    pub speech: Arc<dyn SpeechService>,
    pub answers: Arc<dyn AnswerService>,
    pub fetcher: Arc<dyn RecordingFetcher>,
}

/// A failure carried out of a stage
struct StageFailure {
    stage: Stage,
    category: ErrorCategory,
    message: String,
}

impl StageFailure {
    fn from_error(stage: Stage, error: &Error) -> Self {
        Self {
            stage,
            category: error.category(),
            message: error.to_string(),
        }
    }
}

/// Runs processing jobs and writes their results into the session store
pub struct Pipeline {
    services: Services,
    publisher: Arc<AudioPublisher>,
    store: Arc<dyn SessionStore>,
    tracker: Arc<ErrorTracker>,
    synth_cache: SynthesisCache,
    config: PipelineConfig,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        services: Services,
        publisher: Arc<AudioPublisher>,
        store: Arc<dyn SessionStore>,
        tracker: Arc<ErrorTracker>,
        config: PipelineConfig,
    ) -> Self {
        let synth_cache = SynthesisCache::new(config.synthesis_cache_ttl, 512);
        Self {
            services,
            publisher,
            store,
            tracker,
            synth_cache,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage without touching the session store
    pub async fn process(&self, job: &ProcessingJob) -> ProcessingResult {
        self.process_inner(job, None).await
    }

    /// Process `job` and write its outcome for `ticket`.
    ///
    /// Returns the result even when the write was discarded because the
    /// ticket went stale.
    pub async fn run(&self, job: &ProcessingJob, ticket: &JobTicket) -> ProcessingResult {
        let result = self.process_inner(job, Some(ticket)).await;
        let phone_hash = hash_phone(&job.phone_number);

        match self
            .store
            .complete_job(&job.phone_number, ticket, result.clone().into_outcome())
            .await
        {
            Ok(true) => tracing::info!(
                phone_hash = %phone_hash,
                success = result.success,
                elapsed_ms = millis(result.elapsed),
                "job result stored"
            ),
            Ok(false) => tracing::info!(
                phone_hash = %phone_hash,
                "job result discarded, session moved on"
            ),
            Err(e) => tracing::warn!(
                phone_hash = %phone_hash,
                error = %e,
                "failed to store job result"
            ),
        }

        result
    }

    /// Run `job` on a background task.
    ///
    /// A supervisor awaits the task; if it panics, a system error is written
    /// so the session never stays in flight.
    pub fn spawn(self: &Arc<Self>, job: ProcessingJob, ticket: JobTicket) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        let worker = {
            let pipeline = Arc::clone(self);
            let job = job.clone();
            tokio::spawn(async move {
                pipeline.run(&job, &ticket).await;
            })
        };

        tokio::spawn(async move {
            if let Err(e) = worker.await {
                let message = format!("processing task failed: {e}");
                pipeline.tracker.record(
                    ErrorCategory::System,
                    "pipeline",
                    &message,
                    Correlation::caller(&job.phone_number, ticket.session_id, ticket.language),
                );
                let outcome = JobOutcome::Failed {
                    category: ErrorCategory::System,
                    question_text: None,
                };
                if let Err(e) = pipeline
                    .store
                    .complete_job(&job.phone_number, &ticket, outcome)
                    .await
                {
                    tracing::error!(error = %e, "failed to record crashed job");
                }
            }
        })
    }

    /// Produce the detailed answer audio for a stored response
    pub async fn run_detail(&self, phone: &str, ticket: &DetailTicket) -> DetailOutcome {
        let response = &ticket.response;
        let language = response.language;
        let ids = Correlation::caller(phone, ticket.job.session_id, language);

        let text = match &response.detailed_answer_text {
            Some(text) if !text.trim().is_empty() => text.clone(),
            _ => {
                let subject = match validate_question(&response.question_text, language) {
                    Verdict::Accepted { subject } => subject,
                    Verdict::NotAQuestion | Verdict::OffTopic => None,
                };
                match self
                    .answer(&response.question_text, language, DetailLevel::Detailed, subject)
                    .await
                {
                    Ok(text) => text,
                    Err(e) => {
                        self.tracker
                            .record(e.category(), "detail_answer", &e.to_string(), ids);
                        response.short_answer_text.clone()
                    }
                }
            }
        };

        let audio_url = match self.synthesize(&text, language).await {
            Ok(audio) => match self
                .publisher
                .store(&audio, &format!("detailed_{}", hash_phone(phone)))
            {
                Ok(published) => Some(published.url),
                Err(e) => {
                    self.tracker.record(e.category(), "detail_publish", &e.to_string(), ids);
                    None
                }
            },
            Err(e) => {
                self.tracker
                    .record(e.category(), "detail_synthesis", &e.to_string(), ids);
                None
            }
        };

        DetailOutcome { text, audio_url }
    }

    /// Run a detail job on a background task and store its outcome
    pub fn spawn_detail(self: &Arc<Self>, phone: String, ticket: DetailTicket) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        let worker = {
            let pipeline = Arc::clone(self);
            let phone = phone.clone();
            let ticket = ticket.clone();
            tokio::spawn(async move {
                let outcome = pipeline.run_detail(&phone, &ticket).await;
                pipeline.store.complete_detail_job(&phone, &ticket, outcome).await
            })
        };

        tokio::spawn(async move {
            let stored = match worker.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(error = %e, "detail task failed");
                    // Fall back to speaking the short answer text
                    let outcome = DetailOutcome {
                        text: ticket.response.short_answer_text.clone(),
                        audio_url: None,
                    };
                    pipeline.store.complete_detail_job(&phone, &ticket, outcome).await
                }
            };
            if let Err(e) = stored {
                tracing::warn!(error = %e, "failed to store detail outcome");
            }
        })
    }

    async fn process_inner(&self, job: &ProcessingJob, ticket: Option<&JobTicket>) -> ProcessingResult {
        let started = Instant::now();
        let mut result = ProcessingResult {
            language: job.language,
            ..ProcessingResult::default()
        };

        if let Err(failure) = self.stages(job, ticket, &mut result).await {
            let session_id = ticket.map(|t| t.session_id);
            self.tracker.record(
                failure.category,
                failure.stage.as_str(),
                &failure.message,
                Correlation {
                    phone_number: Some(&job.phone_number),
                    session_id,
                    language: Some(job.language),
                },
            );
            result.success = false;
            result.error_category = Some(failure.category);
            result.error_message = Some(failure.message);
        }

        result.elapsed = started.elapsed();
        result
    }

    async fn stages(
        &self,
        job: &ProcessingJob,
        ticket: Option<&JobTicket>,
        result: &mut ProcessingResult,
    ) -> std::result::Result<(), StageFailure> {
        let phone_hash = hash_phone(&job.phone_number);

        // 1. Fetch
        let clock = Instant::now();
        let recording = self
            .fetch_recording(&job.recording_reference)
            .await
            .map_err(|e| StageFailure::from_error(Stage::Fetch, &e))?;
        tracing::debug!(
            phone_hash = %phone_hash,
            bytes = recording.len(),
            duration_ms = ?wav_duration_ms(&recording),
            "recording fetched"
        );
        finish_stage(result, Stage::Fetch, clock, &phone_hash);

        // 2. Transcribe
        let clock = Instant::now();
        let (transcription, language) = self.transcribe(&recording, job.language).await?;
        result.question_text = Some(transcription.text.clone());
        result.language = language;
        finish_stage(result, Stage::Transcribe, clock, &phone_hash);

        if let Some(ticket) = ticket {
            match self
                .store
                .advance_job(&job.phone_number, ticket, ProcessingStatus::GeneratingResponse)
                .await
            {
                Ok(true) => {}
                Ok(false) => tracing::debug!(phone_hash = %phone_hash, "job no longer current"),
                Err(e) => tracing::warn!(phone_hash = %phone_hash, error = %e, "status update failed"),
            }
        }

        let phone = job.phone_number.as_str();
        let session_id = ticket.map(|t| t.session_id);
        let ids = move |language: Language| Correlation {
            phone_number: Some(phone),
            session_id,
            language: Some(language),
        };

        // 3. Validate
        let clock = Instant::now();
        let subject = match validate_question(&transcription.text, language) {
            Verdict::Accepted { subject } => subject,
            verdict => {
                tracing::info!(phone_hash = %phone_hash, ?verdict, "question out of scope");
                return Err(StageFailure {
                    stage: Stage::Validate,
                    category: ErrorCategory::InvalidInput,
                    message: ErrorCategory::InvalidInput.message(language).to_string(),
                });
            }
        };
        finish_stage(result, Stage::Validate, clock, &phone_hash);

        // 4. Answer
        let clock = Instant::now();
        let short_text = self
            .answer(&transcription.text, language, DetailLevel::Simple, subject)
            .await
            .map_err(|e| StageFailure::from_error(Stage::Answer, &e))?;
        let detailed_text = match self
            .answer(&transcription.text, language, DetailLevel::Detailed, subject)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(
                    phone_hash = %phone_hash,
                    error = %e,
                    "detailed answer failed, reusing simple answer"
                );
                self.tracker
                    .record(e.category(), "detail_answer", &e.to_string(), ids(language));
                short_text.clone()
            }
        };
        result.short_answer_text = Some(short_text.clone());
        result.detailed_answer_text = Some(detailed_text.clone());
        finish_stage(result, Stage::Answer, clock, &phone_hash);

        // 5. Synthesize
        let clock = Instant::now();
        let short_audio = self
            .synthesize(&short_text, language)
            .await
            .map_err(|e| StageFailure::from_error(Stage::Synthesize, &e))?;
        let detailed_audio = match self.synthesize(&detailed_text, language).await {
            Ok(audio) => Some(audio),
            Err(e) => {
                tracing::warn!(
                    phone_hash = %phone_hash,
                    error = %e,
                    "detailed synthesis failed, continuing without detailed audio"
                );
                self.tracker
                    .record(e.category(), "detail_synthesis", &e.to_string(), ids(language));
                None
            }
        };
        finish_stage(result, Stage::Synthesize, clock, &phone_hash);

        // 6. Publish
        let clock = Instant::now();
        let short = self
            .publisher
            .store(&short_audio, &format!("short_{phone_hash}"))
            .map_err(|e| StageFailure::from_error(Stage::Publish, &e))?;
        result.short_answer_audio_url = Some(short.url);
        result.detailed_answer_audio_url = detailed_audio.and_then(|audio| {
            match self.publisher.store(&audio, &format!("detailed_{phone_hash}")) {
                Ok(published) => Some(published.url),
                Err(e) => {
                    tracing::warn!(error = %e, "detailed audio not published");
                    self.tracker
                        .record(e.category(), "detail_publish", &e.to_string(), ids(language));
                    None
                }
            }
        });
        finish_stage(result, Stage::Publish, clock, &phone_hash);

        result.success = true;
        Ok(())
    }

    async fn fetch_recording(&self, reference: &str) -> Result<Vec<u8>> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(Error::Recording("no recording reference".to_string()));
        }
        if is_placeholder(reference, &self.config.placeholder_markers) {
            tracing::debug!("placeholder recording, using generated silence");
            return silence_wav(
                self.config.placeholder_silence_ms,
                self.config.placeholder_sample_rate,
            );
        }

        let fetcher = &self.services.fetcher;
        with_retry(&self.config.external_retry, "fetch_recording", || {
            fetcher.fetch(reference)
        })
        .await
    }

    /// Transcribe in `language`, falling back once to the alternate language
    async fn transcribe(
        &self,
        audio: &[u8],
        language: Language,
    ) -> std::result::Result<(Transcription, Language), StageFailure> {
        let threshold = self.config.confidence_threshold;
        let accept = |t: &Transcription| !t.text.trim().is_empty() && t.confidence >= threshold;

        let primary = self.transcribe_once(audio, language).await;
        if let Ok(t) = &primary
            && accept(t)
        {
            return Ok((t.clone(), language));
        }

        let alternate = language.alternate();
        tracing::info!(
            from = %language,
            to = %alternate,
            "transcription unusable, retrying in alternate language"
        );
        let fallback = self.transcribe_once(audio, alternate).await;
        if let Ok(t) = &fallback
            && accept(t)
        {
            return Ok((t.clone(), alternate));
        }

        // Prefer reporting a hard error over low confidence
        let failure = match (primary, fallback) {
            (_, Err(e)) | (Err(e), Ok(_)) => {
                let mut failure = StageFailure::from_error(Stage::Transcribe, &e);
                if !matches!(
                    failure.category,
                    ErrorCategory::Timeout | ErrorCategory::RateLimit | ErrorCategory::Network
                ) {
                    failure.category = ErrorCategory::AudioProcessing;
                }
                failure
            }
            (Ok(a), Ok(b)) => StageFailure {
                stage: Stage::Transcribe,
                category: ErrorCategory::UnclearSpeech,
                message: format!(
                    "low confidence transcription ({:.2} / {:.2})",
                    a.confidence, b.confidence
                ),
            },
        };
        Err(failure)
    }

    async fn transcribe_once(&self, audio: &[u8], language: Language) -> Result<Transcription> {
        let speech = &self.services.speech;
        with_retry(&self.config.external_retry, "transcribe", || {
            speech.transcribe(audio, language)
        })
        .await
    }

    async fn answer(
        &self,
        question: &str,
        language: Language,
        detail: DetailLevel,
        subject: Option<Subject>,
    ) -> Result<String> {
        let answers = &self.services.answers;
        let answer = with_retry(&self.config.external_retry, "answer", || {
            answers.answer(question, language, detail, subject)
        })
        .await?;

        if !answer.success || answer.text.trim().is_empty() {
            tracing::debug!(detail = detail.as_str(), "answer back end found nothing");
            return Err(Error::ContentNotFound(format!(
                "no {} answer for question",
                detail.as_str()
            )));
        }
        Ok(answer.text)
    }

    async fn synthesize(&self, text: &str, language: Language) -> Result<Arc<Vec<u8>>> {
        if let Some(cached) = self.synth_cache.get(language, text) {
            tracing::debug!("synthesis cache hit");
            return Ok(cached);
        }

        let speech = &self.services.speech;
        let audio = with_retry(&self.config.synthesis_retry, "synthesize", || {
            speech.synthesize(text, language)
        })
        .await?;
        if audio.is_empty() {
            return Err(Error::Tts("synthesis returned no audio".to_string()));
        }

        let audio = Arc::new(audio);
        self.synth_cache.put(language, text, Arc::clone(&audio));
        Ok(audio)
    }
}

fn finish_stage(result: &mut ProcessingResult, stage: Stage, started: Instant, phone_hash: &str) {
    let elapsed = started.elapsed();
    tracing::debug!(
        phone_hash,
        stage = stage.as_str(),
        elapsed_ms = millis(elapsed),
        "stage complete"
    );
    result.stages.push(StageTiming { stage, elapsed });
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
