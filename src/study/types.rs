//! Wire types for the study API.
//!
//! Field names are camelCase on the wire to match the mobile client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::ChatMessage;

use super::StudyError;

/// Largest number of questions a quiz or question list may ask for.
pub const MAX_QUESTION_COUNT: u32 = 20;

/// Study mode selected in the chat screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StudyMode {
    /// Plain tutoring, no extra instructions.
    #[default]
    General,
    /// Step-by-step problem solving.
    Homework,
    /// Concise exam-preparation answers.
    Exam,
    /// Clearing up misconceptions.
    Doubt,
}

impl StudyMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Homework => "homework",
            Self::Exam => "exam",
            Self::Doubt => "doubt",
        }
    }
}

/// How much detail generated notes should have.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Brief,
    #[default]
    Standard,
    Detailed,
}

/// Target audience for an explanation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExplainLevel {
    #[serde(rename = "5year")]
    FiveYearOld,
    #[default]
    #[serde(rename = "10year")]
    TenYearOld,
    #[serde(rename = "exam")]
    Exam,
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for a chat turn.
///
/// Carries the full conversation so far; the server keeps no history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Conversation in order, ending with the new user message.
    pub messages: Vec<ChatMessage>,
    /// Subject the tutor should specialise in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Study mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<StudyMode>,
}

/// Reply to a chat turn.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub success: bool,
    /// Assistant text on success, an apology on failure.
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Study tools
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesRequest {
    pub topic: String,
    pub subject: String,
    #[serde(default)]
    pub detail_level: DetailLevel,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesReply {
    pub success: bool,
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizRequest {
    pub topic: String,
    pub subject: String,
    #[serde(default = "default_quiz_count")]
    pub question_count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizReply {
    pub success: bool,
    /// Raw model output with the questions.
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainRequest {
    pub content: String,
    #[serde(default)]
    pub level: ExplainLevel,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainReply {
    pub success: bool,
    pub explanation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<ExplainLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportantQuestionsRequest {
    pub topic: String,
    pub subject: String,
    #[serde(default = "default_important_count")]
    pub count: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaSheetRequest {
    pub topic: String,
    pub subject: String,
}

/// Reply for tools that return free-form content about a topic.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicReply {
    pub success: bool,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaSheetReply {
    pub success: bool,
    pub formulas: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

fn default_quiz_count() -> u32 {
    5
}

fn default_important_count() -> u32 {
    10
}

/// Reject blank required text fields.
pub(crate) fn require_text(field: &str, value: &str) -> Result<(), StudyError> {
    if value.trim().is_empty() {
        return Err(StudyError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Reject counts outside `1..=MAX_QUESTION_COUNT`.
pub(crate) fn require_count(field: &str, value: u32) -> Result<(), StudyError> {
    if !(1..=MAX_QUESTION_COUNT).contains(&value) {
        return Err(StudyError::InvalidInput(format!(
            "{field} must be between 1 and {MAX_QUESTION_COUNT}"
        )));
    }
    Ok(())
}
