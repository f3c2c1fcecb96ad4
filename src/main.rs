//! Study assistant entry point.
//!
//! `serve` runs the study proxy; `chat` opens a terminal conversation.

#![allow(clippy::map_err_ignore)]

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use study_assistant::config::{AppConfig, ChatArgs, Cli, Command, LoggingConfig, load_llm_settings};
use study_assistant::llm::ChatCompletionsDriver;
use study_assistant::repl;
use study_assistant::server::start_server;
use study_assistant::session::{
    ChatCoordinator, ChatOptions, CompletionService, FileStore, HttpCompletionService,
    KeyValueStore, LocalCompletionService, MemoryStore, SessionStore,
};
use study_assistant::study::StudyService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    let cli = Cli::parse();
    let config = Arc::new(AppConfig::load_from_cli(&cli).context("Configuration error")?);

    init_tracing(&config.logging);

    match cli.command.clone().unwrap_or(Command::Serve) {
        Command::Serve => {
            let settings = load_llm_settings()
                .map_err(|msg| anyhow::anyhow!("Configuration error: {msg}"))?;
            start_server(config, settings).await
        }
        Command::Chat(args) => run_chat(&config, &args).await,
    }
}

/// Initialize tracing (M-LOG-STRUCTURED). Logs go to stderr; stdout belongs to the chat.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.clone()));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

async fn run_chat(config: &AppConfig, args: &ChatArgs) -> anyhow::Result<()> {
    let service: Arc<dyn CompletionService> = if args.local {
        let settings = load_llm_settings()
            .map_err(|msg| anyhow::anyhow!("Configuration error: {msg}"))?;
        let driver = Arc::new(ChatCompletionsDriver::new(settings));
        Arc::new(LocalCompletionService::new(Arc::new(StudyService::new(
            driver,
        ))))
    } else {
        Arc::new(
            HttpCompletionService::new(&config.chat.server_url)
                .with_context(|| format!("Invalid server URL {}", config.chat.server_url))?,
        )
    };

    let storage: Arc<dyn KeyValueStore> = if args.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(FileStore::new(config.chat.data_dir()))
    };

    info!(
        name: "chat.started",
        local = args.local,
        server_url = %config.chat.server_url,
        ephemeral = args.ephemeral,
        "Starting terminal chat"
    );

    let chat = ChatCoordinator::new(SessionStore::new(storage), service)
        .with_options(ChatOptions {
            subject: config.chat.subject.clone(),
            mode: config.chat.mode,
        })
        .with_timeout(config.chat.request_timeout());

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    repl::run(&chat, stdin, tokio::io::stdout()).await?;
    Ok(())
}
