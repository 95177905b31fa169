//! Question pipeline integration tests

use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_trait::async_trait;

use ivr_tutor::audio::AudioPublisher;
use ivr_tutor::knowledge::CuratedAnswers;
use ivr_tutor::pipeline::{Pipeline, ProcessingJob, Services, Stage};
use ivr_tutor::recovery::{ErrorCategory, ErrorTracker};
use ivr_tutor::services::{Answer, AnswerService, DetailLevel, Subject};
use ivr_tutor::session::{
    InMemorySessionStore, JobOutcome, ProcessingStatus, ResponseData, SessionStore,
};
use ivr_tutor::{Language, Result};

mod common;
use common::{BASE_URL, CALLER, RECORDING, StubAnswers, StubFetcher, StubSpeech, test_config};

struct Fixture {
    pipeline: Arc<Pipeline>,
    store: Arc<InMemorySessionStore>,
    speech: Arc<StubSpeech>,
    fetcher: Arc<StubFetcher>,
    tracker: Arc<ErrorTracker>,
}

fn fixture(speech: StubSpeech, answers: Arc<dyn AnswerService>) -> Fixture {
    let config = test_config();
    let speech = Arc::new(speech);
    let fetcher = Arc::new(StubFetcher::default());
    let tracker = Arc::new(ErrorTracker::default());
    let store = Arc::new(InMemorySessionStore::new());
    let publisher = Arc::new(AudioPublisher::new(
        BASE_URL,
        config.audio.ttl,
        config.audio.sample_rate,
    ));
    let pipeline = Pipeline::new(
        Services {
            speech: Arc::clone(&speech) as _,
            answers,
            fetcher: Arc::clone(&fetcher) as _,
        },
        publisher,
        Arc::clone(&store) as _,
        Arc::clone(&tracker),
        config.pipeline,
    );
    Fixture {
        pipeline: Arc::new(pipeline),
        store,
        speech,
        fetcher,
        tracker,
    }
}

fn job(language: Language) -> ProcessingJob {
    ProcessingJob {
        phone_number: CALLER.to_string(),
        recording_reference: RECORDING.to_string(),
        language,
    }
}

/// Answer back end whose every call panics
struct PanickingAnswers;

#[async_trait]
impl AnswerService for PanickingAnswers {
    async fn answer(
        &self,
        _question: &str,
        _language: Language,
        _detail: DetailLevel,
        _subject: Option<Subject>,
    ) -> Result<Answer> {
        panic!("answer back end crashed");
    }
}

fn stub_answers() -> Arc<StubAnswers> {
    Arc::new(StubAnswers::new(
        "Simple: light bounces back.",
        Some("Detailed: light bounces back from a polished surface at equal angles."),
    ))
}

// -- success ----------------------------------------------------------------

#[tokio::test]
async fn curated_question_produces_both_answers() {
    let f = fixture(
        StubSpeech::hearing("What is reflection of light?"),
        Arc::new(CuratedAnswers::new(None)),
    );

    let result = f.pipeline.process(&job(Language::English)).await;

    assert!(result.success, "{:?}", result.error_message);
    assert_eq!(result.question_text.as_deref(), Some("What is reflection of light?"));
    assert_eq!(result.language, Language::English);
    assert!(
        result
            .short_answer_text
            .as_deref()
            .is_some_and(|t| t.starts_with("Reflection of light occurs"))
    );
    let short_url = result.short_answer_audio_url.expect("short audio url");
    assert!(short_url.starts_with(&format!("{BASE_URL}/audio/short_")));
    assert!(short_url.ends_with(".wav"));
    assert!(
        result
            .detailed_answer_audio_url
            .is_some_and(|url| url.starts_with(&format!("{BASE_URL}/audio/detailed_")))
    );
    assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stages_are_timed_in_order() {
    let f = fixture(StubSpeech::hearing("What is refraction of light?"), stub_answers());

    let result = f.pipeline.process(&job(Language::English)).await;

    let stages: Vec<Stage> = result.stages.iter().map(|t| t.stage).collect();
    assert_eq!(
        stages,
        vec![
            Stage::Fetch,
            Stage::Transcribe,
            Stage::Validate,
            Stage::Answer,
            Stage::Synthesize,
            Stage::Publish,
        ]
    );
}

#[tokio::test]
async fn placeholder_recording_skips_download() {
    let f = fixture(StubSpeech::hearing("How do we breathe?"), stub_answers());
    let job = ProcessingJob {
        recording_reference: "https://example.com/recording.wav".to_string(),
        ..job(Language::English)
    };

    let result = f.pipeline.process(&job).await;

    assert!(result.success);
    assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 0);
}

// -- language fallback --------------------------------------------------------

#[tokio::test]
async fn falls_back_to_alternate_language() {
    let speech = StubSpeech::default().with_transcript(
        Language::Telugu,
        "కాంతి పరావర్తనం అంటే ఏమిటి?",
        0.9,
    );
    let f = fixture(speech, stub_answers());

    let result = f.pipeline.process(&job(Language::English)).await;

    assert!(result.success, "{:?}", result.error_message);
    assert_eq!(result.language, Language::Telugu);
    assert_eq!(f.speech.transcribe_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn low_confidence_everywhere_is_unclear_speech() {
    let speech = StubSpeech::default()
        .with_transcript(Language::English, "what is", 0.2)
        .with_transcript(Language::Telugu, "ఏమిటి", 0.3);
    let f = fixture(speech, stub_answers());

    let result = f.pipeline.process(&job(Language::English)).await;

    assert!(!result.success);
    assert_eq!(result.error_category, Some(ErrorCategory::UnclearSpeech));
    assert_eq!(f.tracker.count(ErrorCategory::UnclearSpeech), 1);
}

#[tokio::test]
async fn recognizer_failure_is_audio_processing() {
    let f = fixture(StubSpeech::default(), stub_answers());

    let result = f.pipeline.process(&job(Language::Telugu)).await;

    assert!(!result.success);
    assert_eq!(result.error_category, Some(ErrorCategory::AudioProcessing));
    assert!(result.question_text.is_none());
}

// -- scope ------------------------------------------------------------------

#[tokio::test]
async fn off_topic_question_is_rejected_before_answering() {
    let answers = stub_answers();
    let f = fixture(
        StubSpeech::hearing("Tell me about the cricket match"),
        Arc::clone(&answers) as _,
    );

    let result = f.pipeline.process(&job(Language::English)).await;

    assert!(!result.success);
    assert_eq!(result.error_category, Some(ErrorCategory::InvalidInput));
    assert_eq!(
        result.question_text.as_deref(),
        Some("Tell me about the cricket match")
    );
    assert_eq!(answers.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unanswerable_question_is_content_not_found() {
    let f = fixture(
        StubSpeech::hearing("Why is the sky blue?"),
        Arc::new(StubAnswers::nothing_found()),
    );

    let result = f.pipeline.process(&job(Language::English)).await;

    assert!(!result.success);
    assert_eq!(result.error_category, Some(ErrorCategory::ContentNotFound));
}

// -- partial failures -------------------------------------------------------

#[tokio::test]
async fn detailed_answer_failure_reuses_simple_answer() {
    let answers = Arc::new(StubAnswers::new("Simple: acids turn litmus red.", None));
    let f = fixture(StubSpeech::hearing("What is an acid?"), answers);

    let result = f.pipeline.process(&job(Language::English)).await;

    assert!(result.success);
    assert_eq!(result.detailed_answer_text, result.short_answer_text);

    let summary = f.tracker.summary(10);
    assert_eq!(summary.total, 1);
    assert_eq!(summary.recent[0].component, "detail_answer");
}

#[tokio::test]
async fn detailed_synthesis_failure_is_not_fatal() {
    let f = fixture(
        StubSpeech::hearing("What is refraction of light?").failing_synthesis_of("Detailed"),
        stub_answers(),
    );

    let result = f.pipeline.process(&job(Language::English)).await;

    assert!(result.success);
    assert!(result.short_answer_audio_url.is_some());
    assert!(result.detailed_answer_audio_url.is_none());
    assert!(result.detailed_answer_text.is_some());

    let summary = f.tracker.summary(10);
    assert_eq!(summary.total, 1);
    assert_eq!(summary.recent[0].component, "detail_synthesis");
    assert_eq!(f.tracker.count(ErrorCategory::AudioProcessing), 1);
}

#[tokio::test]
async fn short_synthesis_failure_fails_the_job() {
    let f = fixture(
        StubSpeech::hearing("What is refraction of light?").failing_synthesis_of("Simple"),
        stub_answers(),
    );

    let result = f.pipeline.process(&job(Language::English)).await;

    assert!(!result.success);
    assert_eq!(result.error_category, Some(ErrorCategory::AudioProcessing));
    assert!(result.short_answer_audio_url.is_none());
    assert_eq!(f.tracker.count(ErrorCategory::AudioProcessing), 1);
}

#[tokio::test]
async fn repeated_text_is_synthesized_once() {
    let f = fixture(StubSpeech::hearing("What is refraction of light?"), stub_answers());

    assert!(f.pipeline.process(&job(Language::English)).await.success);
    assert!(f.pipeline.process(&job(Language::English)).await.success);

    // Short and detailed texts, each synthesized on the first run only
    assert_eq!(f.speech.synthesize_calls.load(Ordering::SeqCst), 2);
}

// -- supervision --------------------------------------------------------------

#[tokio::test]
async fn crashed_job_leaves_session_in_error() {
    let f = fixture(
        StubSpeech::hearing("What is reflection of light?"),
        Arc::new(PanickingAnswers),
    );
    f.store.create(CALLER).await;
    let ticket = f.store.begin_job(CALLER).await.unwrap().unwrap();

    f.pipeline.spawn(job(Language::English), ticket).await.unwrap();

    let session = f.store.get(CALLER).await.unwrap();
    assert_eq!(session.processing_status, ProcessingStatus::Error);
    assert_eq!(session.last_error, Some(ErrorCategory::System));
    assert_eq!(f.tracker.count(ErrorCategory::System), 1);
}

#[tokio::test]
async fn crashed_detail_job_falls_back_to_short_text() {
    let f = fixture(
        StubSpeech::hearing("What is reflection of light?"),
        Arc::new(PanickingAnswers),
    );
    f.store.create(CALLER).await;
    let ticket = f.store.begin_job(CALLER).await.unwrap().unwrap();
    let response = ResponseData {
        question_text: "What is reflection of light?".to_string(),
        short_answer_text: "Light bounces back.".to_string(),
        short_answer_audio_url: format!("{BASE_URL}/audio/short_1.wav"),
        detailed_answer_text: None,
        detailed_answer_audio_url: None,
        language: Language::English,
        detail_attempted: false,
    };
    assert!(
        f.store
            .complete_job(CALLER, &ticket, JobOutcome::Ready(response))
            .await
            .unwrap()
    );
    let detail = f.store.begin_detail_job(CALLER).await.unwrap().unwrap();

    f.pipeline
        .spawn_detail(CALLER.to_string(), detail)
        .await
        .unwrap();

    let session = f.store.get(CALLER).await.unwrap();
    assert!(session.detail_started_at.is_none());
    let stored = session.current_response.unwrap();
    assert_eq!(stored.detailed_answer_text.as_deref(), Some("Light bounces back."));
    assert!(stored.detailed_answer_audio_url.is_none());
    assert!(stored.detail_attempted);
}
