//! Fetching caller recordings from the telephony provider

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::{Error, Result};

/// Source of recorded question audio
#[async_trait]
pub trait RecordingFetcher: Send + Sync {
    /// Download the recording at `reference`
    ///
    /// # Errors
    ///
    /// Returns error if the recording cannot be retrieved
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>>;
}

/// Basic-auth credentials for provider recording URLs
#[derive(Debug, Clone)]
pub struct RecordingCredentials {
    pub username: String,
    pub password: SecretString,
}

/// Fetches recordings over HTTP(S)
pub struct HttpRecordingFetcher {
    client: reqwest::Client,
    credentials: Option<RecordingCredentials>,
}

impl HttpRecordingFetcher {
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(credentials: Option<RecordingCredentials>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            credentials,
        })
    }
}

#[async_trait]
impl RecordingFetcher for HttpRecordingFetcher {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        if !(reference.starts_with("http://") || reference.starts_with("https://")) {
            return Err(Error::Recording(format!(
                "unsupported recording reference: {reference}"
            )));
        }

        let mut request = self.client.get(reference);
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(creds.password.expose_secret()));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status.as_u16(), &body, Error::Recording));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(Error::Recording("recording is empty".to_string()));
        }

        tracing::debug!(bytes = bytes.len(), "recording downloaded");
        Ok(bytes.to_vec())
    }
}

/// Whether a reference is a known non-resolvable demo sentinel
#[must_use]
pub fn is_placeholder(reference: &str, markers: &[String]) -> bool {
    let lower = reference.to_lowercase();
    markers
        .iter()
        .any(|marker| !marker.is_empty() && lower.contains(&marker.to_lowercase()))
}
