//! Study assistant
//!
//! A study-assistant chat core and the LLM study proxy it talks to.
//!
//! # Architecture
//!
//! - **Chat core**: session log with durable snapshots and a request
//!   coordinator that keeps one send in flight with rollback on failure
//! - **Study proxy**: Axum server that builds tutor prompts and forwards
//!   conversations to an OpenAI-compatible API
//! - **Terminal chat**: line-oriented front-end over the chat core
//!
//! # Modules
//!
//! - [`session`]: chat log, persistence, completion services, coordinator
//! - [`study`]: prompt construction and study tools
//! - [`llm`]: LLM driver trait and Chat Completions implementation
//! - [`server`]: HTTP routes and middleware
//! - [`repl`]: terminal chat loop
//! - [`config`]: layered configuration

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]
#![allow(clippy::format_push_string)]

pub mod config;
pub mod llm;
pub mod repl;
pub mod server;
pub mod session;
pub mod study;

use crate::config::AppConfig;
use crate::server::rate_limit::SimpleRateLimiter;
use crate::study::StudyService;

use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Study service answering chat and tool requests.
    pub study: Arc<StudyService>,
    /// Global Rate Limiter
    pub rate_limiter: Arc<SimpleRateLimiter>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}
