//! End-to-end call flow tests against stub back ends

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::Notify;

use ivr_tutor::ivr::markup::Verb;
use ivr_tutor::ivr::{
    DETAILED_ANSWER, ERROR_RECOVERY, FOLLOW_UP_MENU, QUESTION_RECORDING, RESPONSE_DELIVERY, Step,
    VoiceResponse, WebhookRequest,
};
use ivr_tutor::recovery::ErrorCategory;
use ivr_tutor::session::{MenuState, ProcessingStatus};
use ivr_tutor::Language;

mod common;
use common::{BASE_URL, CALLER, Harness, RECORDING, StubAnswers, StubSpeech, test_config};

fn caller() -> WebhookRequest {
    WebhookRequest::from_caller(CALLER)
}

async fn call(h: &Harness, step: Step, request: WebhookRequest) -> VoiceResponse {
    h.state.flow.handle(step, &request).await
}

/// Dial in, pick English, confirm the grade and choose "ask a question"
async fn reach_recording(h: &Harness) {
    call(h, Step::IncomingCall, caller()).await;
    call(h, Step::LanguageSelection, caller().with_digits("1")).await;
    call(h, Step::GradeConfirmation, caller()).await;
    let doc = call(h, Step::InteractionModeSelection, caller().with_digits("2")).await;
    assert!(doc.verbs().iter().any(|v| matches!(v, Verb::Record { .. })));
}

fn records(doc: &VoiceResponse) -> bool {
    doc.to_xml()
        .contains(&format!(r#"action="{QUESTION_RECORDING}""#))
}

// -- happy path ---------------------------------------------------------------

#[tokio::test]
async fn question_is_answered_end_to_end() {
    let h = Harness::new(StubSpeech::hearing("What is reflection of light?"));
    reach_recording(&h).await;

    let doc = call(&h, Step::QuestionRecording, caller().with_recording(RECORDING, "4")).await;
    assert_eq!(doc.redirect_target(), Some(RESPONSE_DELIVERY));

    let settled = h.settled().await;
    assert_eq!(settled.processing_status, ProcessingStatus::Ready);

    let doc = call(&h, Step::ResponseDelivery, caller()).await;
    let played = doc.played_urls();
    assert_eq!(played.len(), 1);
    assert!(played[0].starts_with(&format!("{BASE_URL}/audio/short_")));
    assert!(played[0].ends_with(".wav"));
    assert_eq!(doc.gather_action(), Some(FOLLOW_UP_MENU));

    let session = h.session().await;
    assert_eq!(session.menu_state, MenuState::FollowUpMenu);
    assert_eq!(session.question_history, vec!["What is reflection of light?"]);
    assert_eq!(session.language, Language::English);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn follow_up_repeats_and_plays_detail() {
    let h = Harness::new(StubSpeech::hearing("What is reflection of light?"));
    reach_recording(&h).await;
    call(&h, Step::QuestionRecording, caller().with_recording(RECORDING, "4")).await;
    h.settled().await;
    let delivered = call(&h, Step::ResponseDelivery, caller()).await;
    let short_url = delivered.played_urls()[0].to_string();

    let repeat = call(&h, Step::FollowUpMenu, caller().with_digits("2")).await;
    assert_eq!(repeat.played_urls(), vec![short_url.as_str()]);

    let detail = call(&h, Step::FollowUpMenu, caller().with_digits("1")).await;
    let played = detail.played_urls();
    assert_eq!(played.len(), 1);
    assert!(played[0].starts_with(&format!("{BASE_URL}/audio/detailed_")));

    let menu = call(&h, Step::FollowUpMenu, caller().with_digits("9")).await;
    assert!(menu.spoken_text().contains("ask a question directly"));
    assert_eq!(h.session().await.menu_state, MenuState::InteractionMode);
}

#[tokio::test]
async fn missing_detail_audio_is_produced_on_demand_then_spoken() {
    let answers = Arc::new(StubAnswers::new(
        "Simple: light bounces back.",
        Some("Detailed: light bounces back from a polished surface."),
    ));
    let h = Harness::with(
        StubSpeech::hearing("What is reflection of light?").failing_synthesis_of("Detailed"),
        answers,
        test_config(),
    );
    reach_recording(&h).await;
    call(&h, Step::QuestionRecording, caller().with_recording(RECORDING, "4")).await;
    h.settled().await;
    call(&h, Step::ResponseDelivery, caller()).await;

    let wait = call(&h, Step::FollowUpMenu, caller().with_digits("1")).await;
    assert_eq!(wait.redirect_target(), Some(DETAILED_ANSWER));

    h.detail_settled().await;
    let spoken = call(&h, Step::DetailedAnswer, caller()).await;
    assert!(spoken.played_urls().is_empty());
    assert!(spoken.spoken_text().contains("Detailed: light bounces back"));
    assert_eq!(spoken.gather_action(), Some(FOLLOW_UP_MENU));

    // Attempted once; asking again speaks without another job
    let calls = h.speech.synthesize_calls.load(Ordering::SeqCst);
    call(&h, Step::FollowUpMenu, caller().with_digits("1")).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(h.speech.synthesize_calls.load(Ordering::SeqCst), calls);
}

// -- recordings ---------------------------------------------------------------

#[tokio::test]
async fn recordings_outside_duration_bounds_are_rerecorded() {
    let h = Harness::new(StubSpeech::hearing("What is reflection of light?"));
    reach_recording(&h).await;

    for duration in ["0.4", "20"] {
        let doc = call(&h, Step::QuestionRecording, caller().with_recording(RECORDING, duration)).await;
        assert!(records(&doc), "duration {duration}");
        let session = h.session().await;
        assert_eq!(session.menu_state, MenuState::RecordingQuestion);
        assert_eq!(session.processing_status, ProcessingStatus::Idle);
    }

    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn recording_without_reference_offers_recovery() {
    let h = Harness::new(StubSpeech::hearing("What is reflection of light?"));
    reach_recording(&h).await;

    let doc = call(&h, Step::QuestionRecording, caller()).await;

    assert_eq!(doc.gather_action(), Some(ERROR_RECOVERY));
    assert_eq!(h.session().await.menu_state, MenuState::ErrorRecovery);
    assert_eq!(h.state.tracker.count(ErrorCategory::RecordingIssue), 1);
}

// -- polling ------------------------------------------------------------------

#[tokio::test]
async fn repeated_webhooks_admit_one_job() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(StubSpeech::hearing("What is reflection of light?").gated(Arc::clone(&gate)));
    reach_recording(&h).await;

    call(&h, Step::QuestionRecording, caller().with_recording(RECORDING, "4")).await;
    // Provider retried the recording callback
    call(&h, Step::QuestionRecording, caller().with_recording(RECORDING, "4")).await;

    for _ in 0..2 {
        let doc = call(&h, Step::ResponseDelivery, caller()).await;
        assert_eq!(doc.redirect_target(), Some(RESPONSE_DELIVERY));
        assert!(!doc.hangs_up());
    }

    gate.notify_one();
    let session = h.settled().await;
    assert_eq!(session.processing_status, ProcessingStatus::Ready);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.speech.transcribe_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn slow_job_times_out_once_and_late_result_is_discarded() {
    let gate = Arc::new(Notify::new());
    let mut config = test_config();
    config.telephony.poll_ceiling = Duration::from_millis(50);
    let h = Harness::with(
        StubSpeech::hearing("What is reflection of light?").gated(Arc::clone(&gate)),
        Arc::new(ivr_tutor::knowledge::CuratedAnswers::new(None)),
        config,
    );
    reach_recording(&h).await;
    call(&h, Step::QuestionRecording, caller().with_recording(RECORDING, "4")).await;

    tokio::time::sleep(Duration::from_millis(80)).await;

    let first = call(&h, Step::ResponseDelivery, caller()).await;
    assert_eq!(first.gather_action(), Some(ERROR_RECOVERY));
    let session = h.session().await;
    assert_eq!(session.processing_status, ProcessingStatus::Error);
    assert_eq!(session.last_error, Some(ErrorCategory::ProcessingTimeout));

    let second = call(&h, Step::ResponseDelivery, caller()).await;
    assert_eq!(second.gather_action(), Some(ERROR_RECOVERY));
    assert_eq!(h.state.tracker.count(ErrorCategory::ProcessingTimeout), 1);

    // The abandoned job finishes late
    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let session = h.session().await;
    assert_eq!(session.processing_status, ProcessingStatus::Error);
    assert!(session.current_response.is_none());
}

#[tokio::test]
async fn unclear_speech_then_retry_from_recovery_menu() {
    let speech = StubSpeech::default()
        .with_transcript(Language::English, "um", 0.1)
        .with_transcript(Language::Telugu, "um", 0.1);
    let h = Harness::new(speech);
    reach_recording(&h).await;
    call(&h, Step::QuestionRecording, caller().with_recording(RECORDING, "3")).await;
    h.settled().await;

    let doc = call(&h, Step::ResponseDelivery, caller()).await;
    assert_eq!(doc.gather_action(), Some(ERROR_RECOVERY));
    assert_eq!(h.session().await.last_error, Some(ErrorCategory::UnclearSpeech));

    let retry = call(&h, Step::ErrorRecovery, caller().with_digits("1")).await;
    assert!(records(&retry));
    let session = h.session().await;
    assert_eq!(session.menu_state, MenuState::RecordingQuestion);
    assert_eq!(session.processing_status, ProcessingStatus::Idle);
}

// -- menus ----------------------------------------------------------------------

#[tokio::test]
async fn second_invalid_input_returns_to_main_menu() {
    let h = Harness::new(StubSpeech::default());
    call(&h, Step::IncomingCall, caller()).await;
    call(&h, Step::LanguageSelection, caller().with_digits("2")).await;
    call(&h, Step::GradeConfirmation, caller().with_digits("5")).await;

    call(&h, Step::InteractionModeSelection, caller().with_digits("7")).await;
    let session = h.session().await;
    assert_eq!(session.invalid_attempts, 1);
    assert_eq!(session.language, Language::Telugu);

    call(&h, Step::InteractionModeSelection, caller().with_digits("")).await;
    let session = h.session().await;
    assert_eq!(session.invalid_attempts, 0);
    assert_eq!(session.menu_state, MenuState::InteractionMode);
}

#[tokio::test]
async fn hangup_ends_the_session() {
    let h = Harness::new(StubSpeech::default());
    call(&h, Step::IncomingCall, caller()).await;

    let doc = call(&h, Step::CallEnd, caller()).await;
    assert!(doc.verbs().is_empty());
    let session = h.session().await;
    assert!(!session.call_active);
    assert_eq!(session.menu_state, MenuState::Ended);

    // Webhooks after the call ended get a polite goodbye
    let late = call(&h, Step::ResponseDelivery, caller()).await;
    assert!(late.hangs_up());
}

#[tokio::test]
async fn webhook_without_caller_gets_system_error() {
    let h = Harness::new(StubSpeech::default());

    let doc = call(&h, Step::LanguageSelection, WebhookRequest::default().with_digits("1")).await;

    assert!(doc.hangs_up());
    assert_eq!(h.state.tracker.count(ErrorCategory::InvalidInput), 1);
}

#[tokio::test]
async fn new_call_replaces_previous_session() {
    let h = Harness::new(StubSpeech::default());
    call(&h, Step::IncomingCall, caller()).await;
    let first = h.session().await.session_id;

    call(&h, Step::IncomingCall, caller()).await;

    assert_ne!(h.session().await.session_id, first);
}
