//! LLM driver traits and implementations.
//!
//! This module provides the abstraction the study service uses to reach an
//! OpenAI-compatible Chat Completions API. Responses are requested in a single
//! round trip; token streaming is not used.
//!
//! # Drivers
//!
//! - [`ChatCompletionsDriver`]: `OpenAI` Chat Completions API (`/v1/chat/completions`)
//!
//! # Example
//!
//! ```rust,ignore
//! use study_assistant::llm::{ChatCompletionsDriver, LlmSettings, Provider};
//!
//! let settings = LlmSettings {
//!     base_url: "https://api.openai.com".to_string(),
//!     api_key: Some("sk-...".to_string()),
//!     model: "gpt-4o-mini".to_string(),
//!     provider: Provider::OpenAI,
//! };
//! let driver = ChatCompletionsDriver::new(settings);
//! ```

pub mod chat_completions;
pub mod provider;

pub use chat_completions::ChatCompletionsDriver;
pub use provider::Provider;

/// LLM connection and model settings.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Base URL for the LLM API (e.g., `https://api.openai.com`).
    pub base_url: String,
    /// Optional API key for authentication.
    pub api_key: Option<String>,
    /// Model identifier (e.g., `gpt-4o-mini`).
    pub model: String,
    /// Provider type (auto-detected from `base_url` if not specified).
    pub provider: Provider,
}

/// A message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    /// Role of the message author.
    pub role: MessageRole,
    /// Text content of the message.
    pub content: String,
}

impl Message {
    /// Create a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System prompt.
    System,
    /// User message.
    User,
    /// Assistant response.
    Assistant,
}

/// Request to an LLM driver.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Conversation messages, system prompt first.
    pub messages: Vec<Message>,
}

/// Errors returned by LLM drivers.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The HTTP request could not be completed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("LLM API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body returned by the provider.
        message: String,
    },

    /// The response body was not the expected JSON shape.
    #[error("Invalid LLM response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Trait for LLM drivers.
///
/// Implementations send the full conversation and return the assistant's
/// reply text. An empty string means the model produced no content.
#[async_trait::async_trait]
pub trait LlmDriver: Send + Sync {
    /// Request a single completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be decoded.
    async fn complete(&self, req: LlmRequest) -> Result<String, LlmError>;
}
