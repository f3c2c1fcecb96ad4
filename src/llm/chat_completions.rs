//! OpenAI Chat Completions API driver.
//!
//! This module implements the [`LlmDriver`] trait for the OpenAI Chat Completions
//! API (`/v1/chat/completions`) with a single non-streaming request per call.

use serde::Deserialize;

use super::{LlmDriver, LlmError, LlmRequest, LlmSettings};

#[derive(Debug, Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Driver for the OpenAI Chat Completions API.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .field("provider", &self.settings.provider)
            .finish()
    }
}

impl ChatCompletionsDriver {
    /// Create a new Chat Completions driver with the given settings.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    /// Get the LLM settings.
    #[must_use]
    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }
}

#[async_trait::async_trait]
impl LlmDriver for ChatCompletionsDriver {
    async fn complete(&self, req: LlmRequest) -> Result<String, LlmError> {
        let url = self.settings.provider.build_chat_url(&self.settings.base_url);

        let body = serde_json::json!({
            "model": self.settings.model,
            "messages": req.messages,
        });

        let mut rb = self.http.post(&url).json(&body);
        if let Some(k) = &self.settings.api_key {
            rb = if self.settings.provider.uses_api_key_header() {
                rb.header("api-key", k)
            } else {
                rb.bearer_auth(k)
            };
        }

        tracing::debug!(
            url = %url,
            message_count = req.messages.len(),
            "Sending chat completion request"
        );

        let resp = rb.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = resp.text().await?;
        Ok(extract_content(&text)?)
    }
}

/// Pull `choices[0].message.content` out of a completion body.
fn extract_content(body: &str) -> Result<String, serde_json::Error> {
    let parsed: CompletionBody = serde_json::from_str(body)?;
    Ok(parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .unwrap_or_default())
}
