//! Prompt builders for chat and study tools.

use crate::llm::Message;

use super::types::{
    DetailLevel, ExplainLevel, ExplainRequest, FormulaSheetRequest, ImportantQuestionsRequest,
    NotesRequest, QuizRequest, StudyMode,
};

/// Base persona for every chat turn.
pub const TUTOR_PROMPT: &str = "You are StudyAI, a helpful AI tutor for students. Provide clear, concise, and educational responses.";

/// A system prompt and the user prompt that goes with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Convert into the two-message conversation sent to the model.
    #[must_use]
    pub fn into_messages(self) -> Vec<Message> {
        vec![Message::system(self.system), Message::user(self.user)]
    }
}

/// Build the chat system prompt for an optional subject and mode.
///
/// Blank subjects are ignored. [`StudyMode::General`] adds nothing.
#[must_use]
pub fn chat_system_prompt(subject: Option<&str>, mode: Option<StudyMode>) -> String {
    let mut prompt = TUTOR_PROMPT.to_string();

    if let Some(subject) = subject.filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!(" You are specialized in {subject}."));
    }

    match mode {
        Some(StudyMode::Homework) => prompt.push_str(
            " Help the student understand the concept and solve problems step-by-step.",
        ),
        Some(StudyMode::Exam) => {
            prompt.push_str(" Provide concise answers suitable for exam preparation.");
        }
        Some(StudyMode::Doubt) => prompt.push_str(
            " Focus on clarifying misconceptions and explaining difficult concepts.",
        ),
        Some(StudyMode::General) | None => {}
    }

    prompt
}

fn detail_instructions(level: DetailLevel) -> &'static str {
    match level {
        DetailLevel::Brief => "Provide a concise summary with key points only (2-3 paragraphs).",
        DetailLevel::Standard => {
            "Provide comprehensive notes with main concepts and examples (5-7 paragraphs)."
        }
        DetailLevel::Detailed => {
            "Provide detailed notes with all concepts, examples, and related topics (10+ paragraphs)."
        }
    }
}

fn explain_instructions(level: ExplainLevel) -> &'static str {
    match level {
        ExplainLevel::FiveYearOld => {
            "Explain this as if you're talking to a 5-year-old. Use very simple words and everyday examples."
        }
        ExplainLevel::TenYearOld => {
            "Explain this as if you're talking to a 10-year-old. Use simple language with some technical terms."
        }
        ExplainLevel::Exam => {
            "Explain this in a way suitable for exam preparation. Include key concepts and important details."
        }
    }
}

#[must_use]
pub fn notes_prompt(req: &NotesRequest) -> Prompt {
    Prompt {
        system: format!(
            "You are an expert {} tutor. Generate well-structured study notes. {}",
            req.subject,
            detail_instructions(req.detail_level)
        ),
        user: format!(
            "Generate study notes for: {} (Subject: {})",
            req.topic, req.subject
        ),
    }
}

#[must_use]
pub fn quiz_prompt(req: &QuizRequest) -> Prompt {
    Prompt {
        system: format!(
            "You are an expert {} teacher. Generate {} multiple-choice questions about \"{}\". For each question provide the question text, four options (A, B, C, D), the correct answer, and a brief explanation.",
            req.subject, req.question_count, req.topic
        ),
        user: format!(
            "Generate {} quiz questions for {}",
            req.question_count, req.topic
        ),
    }
}

#[must_use]
pub fn explain_prompt(req: &ExplainRequest) -> Prompt {
    Prompt {
        system: format!(
            "You are an excellent educator. {}",
            explain_instructions(req.level)
        ),
        user: format!("Please explain: {}", req.content),
    }
}

#[must_use]
pub fn important_questions_prompt(req: &ImportantQuestionsRequest) -> Prompt {
    Prompt {
        system: format!(
            "You are an expert {} teacher. Generate {} important questions likely to appear in exams for: \"{}\".",
            req.subject, req.count, req.topic
        ),
        user: format!("Generate {} important questions for {}", req.count, req.topic),
    }
}

#[must_use]
pub fn formula_sheet_prompt(req: &FormulaSheetRequest) -> Prompt {
    Prompt {
        system: format!(
            "You are an expert {} teacher. Generate a comprehensive formula sheet for \"{}\". Include all important formulas, their meanings, and when to use them.",
            req.subject, req.topic
        ),
        user: format!("Generate a formula sheet for {}", req.topic),
    }
}
