//! Study request execution.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::llm::{LlmDriver, LlmError, LlmRequest, Message};
use crate::session::ChatRole;

use super::StudyError;
use super::prompts::{self, Prompt};
use super::types::{
    ChatReply, ChatRequest, ExplainReply, ExplainRequest, FormulaSheetReply, FormulaSheetRequest,
    ImportantQuestionsRequest, NotesReply, NotesRequest, QuizReply, QuizRequest, TopicReply,
    require_count, require_text,
};

const CHAT_FALLBACK: &str = "Unable to generate response";
const CHAT_APOLOGY: &str = "Sorry, I encountered an error. Please try again.";

/// Executes chat turns and study tools against an LLM driver.
#[derive(Clone)]
pub struct StudyService {
    driver: Arc<dyn LlmDriver>,
}

impl std::fmt::Debug for StudyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StudyService")
            .field("driver", &"LlmDriver")
            .finish()
    }
}

impl StudyService {
    #[must_use]
    pub fn new(driver: Arc<dyn LlmDriver>) -> Self {
        Self { driver }
    }

    /// Answer the latest message of a conversation.
    ///
    /// Never fails: LLM errors come back as `success: false` with the error text.
    pub async fn send_message(&self, req: ChatRequest) -> ChatReply {
        let system = prompts::chat_system_prompt(req.subject.as_deref(), req.mode);

        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        messages.push(Message::system(system));
        messages.extend(req.messages.into_iter().map(|m| match m.role {
            ChatRole::User => Message::user(m.content),
            ChatRole::Assistant => Message::assistant(m.content),
        }));

        match self.invoke("chat", messages).await {
            Ok(text) => ChatReply {
                success: true,
                response: or_fallback(text, CHAT_FALLBACK),
                error: None,
                timestamp: Some(Utc::now()),
            },
            Err(e) => ChatReply {
                success: false,
                response: CHAT_APOLOGY.to_string(),
                error: Some(e.to_string()),
                timestamp: None,
            },
        }
    }

    pub async fn generate_notes(&self, req: NotesRequest) -> Result<NotesReply, StudyError> {
        require_text("topic", &req.topic)?;
        require_text("subject", &req.subject)?;

        let reply = match self.run("notes", prompts::notes_prompt(&req)).await {
            Ok(text) => NotesReply {
                success: true,
                notes: or_fallback(text, "Unable to generate notes"),
                topic: Some(req.topic),
                subject: Some(req.subject),
                error: None,
                timestamp: Some(Utc::now()),
            },
            Err(e) => NotesReply {
                success: false,
                notes: "Unable to generate notes. Please try again.".to_string(),
                topic: None,
                subject: None,
                error: Some(e.to_string()),
                timestamp: None,
            },
        };
        Ok(reply)
    }

    pub async fn generate_quiz(&self, req: QuizRequest) -> Result<QuizReply, StudyError> {
        require_text("topic", &req.topic)?;
        require_text("subject", &req.subject)?;
        require_count("questionCount", req.question_count)?;

        let reply = match self.run("quiz", prompts::quiz_prompt(&req)).await {
            Ok(content) => QuizReply {
                success: true,
                content,
                topic: Some(req.topic),
                subject: Some(req.subject),
                count: Some(req.question_count),
                error: None,
                timestamp: Some(Utc::now()),
            },
            Err(e) => QuizReply {
                success: false,
                content: String::new(),
                topic: None,
                subject: None,
                count: None,
                error: Some(e.to_string()),
                timestamp: None,
            },
        };
        Ok(reply)
    }

    pub async fn explain(&self, req: ExplainRequest) -> Result<ExplainReply, StudyError> {
        require_text("content", &req.content)?;

        let reply = match self.run("explain", prompts::explain_prompt(&req)).await {
            Ok(text) => ExplainReply {
                success: true,
                explanation: or_fallback(text, "Unable to generate explanation"),
                level: Some(req.level),
                error: None,
                timestamp: Some(Utc::now()),
            },
            Err(e) => ExplainReply {
                success: false,
                explanation: "Unable to generate explanation. Please try again.".to_string(),
                level: None,
                error: Some(e.to_string()),
                timestamp: None,
            },
        };
        Ok(reply)
    }

    pub async fn generate_important_questions(
        &self,
        req: ImportantQuestionsRequest,
    ) -> Result<TopicReply, StudyError> {
        require_text("topic", &req.topic)?;
        require_text("subject", &req.subject)?;
        require_count("count", req.count)?;

        let prompt = prompts::important_questions_prompt(&req);
        let reply = match self.run("important_questions", prompt).await {
            Ok(content) => TopicReply {
                success: true,
                content,
                topic: Some(req.topic),
                subject: Some(req.subject),
                error: None,
                timestamp: Some(Utc::now()),
            },
            Err(e) => TopicReply {
                success: false,
                content: String::new(),
                topic: None,
                subject: None,
                error: Some(e.to_string()),
                timestamp: None,
            },
        };
        Ok(reply)
    }

    pub async fn generate_formula_sheet(
        &self,
        req: FormulaSheetRequest,
    ) -> Result<FormulaSheetReply, StudyError> {
        require_text("topic", &req.topic)?;
        require_text("subject", &req.subject)?;

        let reply = match self
            .run("formula_sheet", prompts::formula_sheet_prompt(&req))
            .await
        {
            Ok(text) => FormulaSheetReply {
                success: true,
                formulas: or_fallback(text, "Unable to generate formula sheet"),
                topic: Some(req.topic),
                subject: Some(req.subject),
                error: None,
                timestamp: Some(Utc::now()),
            },
            Err(e) => FormulaSheetReply {
                success: false,
                formulas: "Unable to generate formula sheet. Please try again.".to_string(),
                topic: None,
                subject: None,
                error: Some(e.to_string()),
                timestamp: None,
            },
        };
        Ok(reply)
    }

    async fn run(&self, operation: &'static str, prompt: Prompt) -> Result<String, LlmError> {
        self.invoke(operation, prompt.into_messages()).await
    }

    async fn invoke(
        &self,
        operation: &'static str,
        messages: Vec<Message>,
    ) -> Result<String, LlmError> {
        let request_id = Uuid::new_v4().to_string();

        tracing::info!(
            request_id = %request_id,
            operation,
            message_count = messages.len(),
            "Invoking LLM"
        );

        let result = self.driver.complete(LlmRequest { messages }).await;

        match &result {
            Ok(text) => tracing::info!(
                request_id = %request_id,
                operation,
                response_length = text.len(),
                "LLM responded"
            ),
            Err(e) => tracing::error!(
                request_id = %request_id,
                operation,
                error = %e,
                "LLM request failed"
            ),
        }

        result
    }
}

fn or_fallback(text: String, fallback: &str) -> String {
    if text.is_empty() {
        fallback.to_string()
    } else {
        text
    }
}
