//! Telephony webhook endpoints
//!
//! Every step accepts a form-encoded POST or a query-string GET and answers
//! with a voice markup document.

use std::sync::Arc;

use axum::{
    Form, Router,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};

use super::AppState;
use crate::ivr::{Step, VoiceResponse, WebhookRequest};

/// Markup documents are served as `application/xml`
pub struct Xml(pub VoiceResponse);

impl IntoResponse for Xml {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, "application/xml")], self.0.to_xml()).into_response()
    }
}

/// Build webhooks router
pub fn router(state: Arc<AppState>) -> Router {
    Step::ALL
        .into_iter()
        .fold(Router::new(), |router, step| {
            let handler = move |State(state): State<Arc<AppState>>, Form(request): Form<WebhookRequest>| async move {
                Xml(state.flow.handle(step, &request).await)
            };
            router.route(step.path(), get(handler.clone()).post(handler))
        })
        .with_state(state)
}
