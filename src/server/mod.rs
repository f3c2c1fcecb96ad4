use axum::{
    Router,
    extract::{DefaultBodyLimit, Request},
    http::StatusCode,
    middleware::Next,
    response::IntoResponse,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::config::AppConfig;
use crate::llm::{ChatCompletionsDriver, LlmSettings};
use crate::study::StudyService;

pub mod rate_limit;
pub mod routes;

use rate_limit::SimpleRateLimiter;

/// Request bodies larger than this are rejected.
const BODY_LIMIT_BYTES: usize = 1024 * 1024;

impl AppState {
    /// Assemble handler state around a study service.
    #[must_use]
    pub fn new(config: Arc<AppConfig>, study: StudyService) -> Self {
        let rate_limiter = Arc::new(SimpleRateLimiter::new(
            config.resilience.requests_per_second,
            config.resilience.burst_size,
        ));
        Self {
            study: Arc::new(study),
            rate_limiter,
            config,
        }
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    // A disabled timeout becomes a very long one so the layer stack keeps one type.
    let timeout_duration = if state.config.resilience.timeout_disabled {
        Duration::from_secs(365 * 24 * 60 * 60)
    } else {
        Duration::from_secs(state.config.resilience.request_timeout_secs)
    };

    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/auth/me", get(routes::auth_me))
        .route("/api/auth/logout", post(routes::auth_logout))
        .route("/api/chat/send", post(routes::send_message))
        .route("/api/study-tools/notes", post(routes::generate_notes))
        .route("/api/study-tools/quiz", post(routes::generate_quiz))
        .route("/api/study-tools/explain", post(routes::explain))
        .route(
            "/api/study-tools/important-questions",
            post(routes::generate_important_questions),
        )
        .route(
            "/api/study-tools/formula-sheet",
            post(routes::generate_formula_sheet),
        )
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                match tokio::time::timeout(timeout_duration, next.run(req)).await {
                    Ok(res) => res,
                    Err(_) => (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response(),
                }
            },
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>, settings: LlmSettings) -> anyhow::Result<()> {
    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        provider = ?settings.provider,
        "LLM configuration loaded"
    );

    let driver = Arc::new(ChatCompletionsDriver::new(settings));
    let state = AppState::new(Arc::clone(&config), StudyService::new(driver));
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
