//! HTTP handlers for the study API.

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde_json::{Value, json};

use crate::AppState;
use crate::study::{
    ChatReply, ChatRequest, ExplainReply, ExplainRequest, FormulaSheetReply, FormulaSheetRequest,
    ImportantQuestionsRequest, NotesReply, NotesRequest, QuizReply, QuizRequest, StudyError,
    TopicReply,
};

/// Name of the pass-through session cookie cleared on logout.
pub const SESSION_COOKIE_NAME: &str = "study_session";

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn bad_request(err: StudyError) -> (StatusCode, String) {
    tracing::info!(error = %err, "Rejected study request");
    (StatusCode::BAD_REQUEST, err.to_string())
}

/// GET /api/health
pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// GET /api/auth/me - There are no accounts; always `null`.
pub async fn auth_me() -> Json<Value> {
    Json(Value::Null)
}

/// POST /api/auth/logout - Expire the session cookie.
pub async fn auth_logout() -> impl IntoResponse {
    let cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax");
    (
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "success": true })),
    )
}

/// POST /api/chat/send - Answer the latest message of a conversation.
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Json<ChatReply> {
    tracing::info!(
        message_count = req.messages.len(),
        subject = ?req.subject,
        mode = ?req.mode,
        "Received chat request"
    );
    Json(state.study.send_message(req).await)
}

/// POST /api/study-tools/notes
pub async fn generate_notes(
    State(state): State<AppState>,
    Json(req): Json<NotesRequest>,
) -> ApiResult<NotesReply> {
    state
        .study
        .generate_notes(req)
        .await
        .map(Json)
        .map_err(bad_request)
}

/// POST /api/study-tools/quiz
pub async fn generate_quiz(
    State(state): State<AppState>,
    Json(req): Json<QuizRequest>,
) -> ApiResult<QuizReply> {
    state
        .study
        .generate_quiz(req)
        .await
        .map(Json)
        .map_err(bad_request)
}

/// POST /api/study-tools/explain
pub async fn explain(
    State(state): State<AppState>,
    Json(req): Json<ExplainRequest>,
) -> ApiResult<ExplainReply> {
    state.study.explain(req).await.map(Json).map_err(bad_request)
}

/// POST /api/study-tools/important-questions
pub async fn generate_important_questions(
    State(state): State<AppState>,
    Json(req): Json<ImportantQuestionsRequest>,
) -> ApiResult<TopicReply> {
    state
        .study
        .generate_important_questions(req)
        .await
        .map(Json)
        .map_err(bad_request)
}

/// POST /api/study-tools/formula-sheet
pub async fn generate_formula_sheet(
    State(state): State<AppState>,
    Json(req): Json<FormulaSheetRequest>,
) -> ApiResult<FormulaSheetReply> {
    state
        .study
        .generate_formula_sheet(req)
        .await
        .map(Json)
        .map_err(bad_request)
}
