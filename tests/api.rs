//! API endpoint integration tests

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use tower::ServiceExt;

use ivr_tutor::audio::silence_wav;

mod common;
use common::{CALLER, Harness, StubSpeech};

/// Build a test API router
fn build_test_router(h: &Harness) -> axum::Router {
    ivr_tutor::api::router(h.state.clone())
}

fn form_post(uri: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// -- health -------------------------------------------------------------------

#[tokio::test]
async fn test_health_endpoint() {
    let h = Harness::new(StubSpeech::default());
    let app = build_test_router(&h);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_stats_counts_sessions() {
    let h = Harness::new(StubSpeech::default());
    let app = build_test_router(&h);

    let response = app
        .clone()
        .oneshot(form_post("/webhook/incoming-call", "From=%2B919876543210"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["sessions"]["total_sessions"], 1);
    assert_eq!(json["sessions"]["active_sessions"], 1);
    assert_eq!(json["errors"]["total"], 0);
}

// -- webhooks -----------------------------------------------------------------

#[tokio::test]
async fn test_incoming_call_returns_markup() {
    let h = Harness::new(StubSpeech::default());
    let app = build_test_router(&h);

    let response = app
        .oneshot(form_post(
            "/webhook/incoming-call",
            "From=%2B919876543210&CallSid=CA123",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/xml"
    );
    let body = body_text(response).await;
    assert!(body.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
    assert!(body.contains("<Response>"));
    assert!(body.contains(r#"action="/webhook/language-selection""#));
    assert!(body.contains("Press 1 for English"));

    assert!(h.state.sessions.get(CALLER).await.is_some());
}

#[tokio::test]
async fn test_webhook_accepts_query_string() {
    let h = Harness::new(StubSpeech::default());
    let app = build_test_router(&h);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/webhook/incoming-call?CallFrom=%2B919876543210")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/webhook/language-selection?From=%2B919876543210&Digits=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains(r#"language="te-IN""#));
    assert!(body.contains(r#"action="/webhook/grade-confirmation""#));
}

#[tokio::test]
async fn test_unknown_caller_gets_goodbye_not_http_error() {
    let h = Harness::new(StubSpeech::default());
    let app = build_test_router(&h);

    let response = app
        .oneshot(form_post("/webhook/follow-up-menu", "From=%2B911111111111&Digits=1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("<Hangup/>"));
}

#[tokio::test]
async fn test_recording_status_is_acknowledged() {
    let h = Harness::new(StubSpeech::default());
    let app = build_test_router(&h);

    let response = app
        .oneshot(form_post(
            "/webhook/recording-status",
            "From=%2B919876543210&RecordingStatus=completed&RecordingDuration=4",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(!body.contains("<Say"));
}

// -- audio --------------------------------------------------------------------

#[tokio::test]
async fn test_unknown_audio_is_not_found() {
    let h = Harness::new(StubSpeech::default());
    let app = build_test_router(&h);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/audio/short_missing.wav")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_published_audio_is_served() {
    let h = Harness::new(StubSpeech::default());
    let wav = silence_wav(100, 8000).unwrap();
    let published = h.state.publisher.store(&wav, "short_test").unwrap();
    let app = build_test_router(&h);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/audio/{}", published.key))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "audio/wav"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.as_ref(), wav.as_slice());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/audio-storage/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["entries"], 1);
    assert_eq!(json["total_bytes"], wav.len());
}
