//! HTTP JSON answer back end

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Answer, AnswerService, DetailLevel, Subject};
use crate::{Error, Language, Result};

#[derive(Serialize)]
struct AnswerRequest<'a> {
    question: &'a str,
    language: Language,
    detail_level: DetailLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<Subject>,
}

#[derive(Deserialize)]
struct AnswerResponse {
    #[serde(alias = "answer")]
    text: String,
    #[serde(default, alias = "confidence")]
    source_confidence: f32,
    #[serde(default = "default_success")]
    success: bool,
}

const fn default_success() -> bool {
    true
}

/// [`AnswerService`] that posts questions to a retrieval/generation endpoint
pub struct HttpAnswerService {
    client: reqwest::Client,
    url: String,
}

impl HttpAnswerService {
    /// # Errors
    ///
    /// Returns error if the URL is empty or the HTTP client cannot be built
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(Error::Config("answer back-end URL is empty".to_string()));
        }
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            url,
        })
    }
}

#[async_trait]
impl AnswerService for HttpAnswerService {
    async fn answer(
        &self,
        question: &str,
        language: Language,
        detail: DetailLevel,
        subject: Option<Subject>,
    ) -> Result<Answer> {
        let request = AnswerRequest {
            question,
            language,
            detail_level: detail,
            subject,
        };

        let response = self.client.post(&self.url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, detail = detail.as_str(), "answer back-end error");
            return Err(Error::from_status(status.as_u16(), &body, Error::Answer));
        }

        let parsed: AnswerResponse = response.json().await?;
        let success = parsed.success && !parsed.text.trim().is_empty();
        tracing::debug!(
            detail = detail.as_str(),
            success,
            confidence = parsed.source_confidence,
            "answer received"
        );

        Ok(Answer {
            text: parsed.text,
            source_confidence: parsed.source_confidence,
            success,
        })
    }
}
