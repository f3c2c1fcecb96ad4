//! Study proxy: prompt construction and LLM invocation.
//!
//! This is the remote completion service the chat core talks to. It turns a
//! conversation (plus optional subject and study mode) into a tutor-style
//! system prompt and forwards it to the configured [`LlmDriver`], and it
//! offers one-shot study tools built the same way.
//!
//! # Architecture
//!
//! - [`types`]: request and reply DTOs shared with HTTP clients
//! - [`prompts`]: system and user prompt builders
//! - [`StudyService`]: executes requests against an LLM driver
//!
//! [`LlmDriver`]: crate::llm::LlmDriver

pub mod prompts;
mod service;
pub mod types;

pub use service::StudyService;
pub use types::*;

/// Errors returned for study requests that fail validation.
///
/// LLM failures are not errors at this level; they are reported inside the
/// reply with `success: false`.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StudyError {
    /// A required field was blank or a count was out of range.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
