//! Completion service capability used by the chat coordinator.
//!
//! The coordinator only needs one operation: turn a conversation into a
//! reply. [`HttpCompletionService`] reaches a study proxy over HTTP;
//! [`LocalCompletionService`] calls a [`StudyService`] in process.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::study::{ChatRequest, StudyService};

/// Path of the chat endpoint on the study proxy.
pub const CHAT_SEND_PATH: &str = "api/chat/send";

/// Reply envelope from the completion service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub success: bool,
    /// Assistant text, present when `success` is true.
    #[serde(default)]
    pub response: Option<String>,
    /// Failure description, present when `success` is false.
    #[serde(default)]
    pub error: Option<String>,
}

impl CompletionResponse {
    #[must_use]
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            success: true,
            response: Some(text.into()),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(error.into()),
        }
    }
}

/// Transport-level failures talking to the completion service.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// HTTP request failed.
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("Service error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// Invalid base URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// No reply arrived within the configured limit.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The request task ended without producing a reply.
    #[error("Request aborted: {0}")]
    Aborted(String),
}

/// Turns a conversation into an assistant reply.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Request a reply for the conversation in `request`.
    async fn complete(&self, request: ChatRequest) -> Result<CompletionResponse, CompletionError>;
}

/// Completion service backed by a study proxy server.
#[derive(Debug, Clone)]
pub struct HttpCompletionService {
    endpoint: Url,
    http: reqwest::Client,
}

impl HttpCompletionService {
    /// Create a client for the proxy at `base_url` (e.g. `http://localhost:3000`).
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, CompletionError> {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Create a client with a custom reqwest client.
    pub fn with_client(
        base_url: impl AsRef<str>,
        http: reqwest::Client,
    ) -> Result<Self, CompletionError> {
        let mut base = Url::parse(base_url.as_ref())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join(CHAT_SEND_PATH)?;
        Ok(Self { endpoint, http })
    }

    /// Full URL of the chat endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionService for HttpCompletionService {
    async fn complete(&self, request: ChatRequest) -> Result<CompletionResponse, CompletionError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".into());
            Err(CompletionError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Completion service that runs the study service in process.
#[derive(Debug, Clone)]
pub struct LocalCompletionService {
    study: Arc<StudyService>,
}

impl LocalCompletionService {
    #[must_use]
    pub fn new(study: Arc<StudyService>) -> Self {
        Self { study }
    }
}

#[async_trait]
impl CompletionService for LocalCompletionService {
    async fn complete(&self, request: ChatRequest) -> Result<CompletionResponse, CompletionError> {
        let reply = self.study.send_message(request).await;
        Ok(CompletionResponse {
            success: reply.success,
            response: reply.success.then_some(reply.response),
            error: reply.error,
        })
    }
}
