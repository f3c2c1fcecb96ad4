use crate::llm::{LlmSettings, Provider, provider::DEFAULT_AZURE_API_VERSION};
use crate::study::StudyMode;
use clap::{Args, Parser, Subcommand};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Enable rate limiting
    #[arg(long, env = "RATE_LIMIT_ENABLED")]
    pub rate_limit_enabled: Option<bool>,

    /// Disable timeout middleware
    #[arg(long, env = "TIMEOUT_DISABLED")]
    pub timeout_disabled: Option<bool>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the study proxy HTTP server (default)
    Serve,
    /// Chat from the terminal
    Chat(ChatArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ChatArgs {
    /// Base URL of the study proxy server
    #[arg(long, conflicts_with = "local")]
    pub server: Option<String>,

    /// Call the LLM directly instead of going through a server
    #[arg(long)]
    pub local: bool,

    /// Subject the tutor should specialise in
    #[arg(long)]
    pub subject: Option<String>,

    /// Study mode
    #[arg(long, value_enum)]
    pub mode: Option<StudyMode>,

    /// Keep the conversation in memory only
    #[arg(long)]
    pub ephemeral: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub resilience: ResilienceConfig,
    pub chat: ChatConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub rate_limit_enabled: bool,
    pub timeout_disabled: bool,
    pub request_timeout_secs: u64,
    pub requests_per_second: f32,
    pub burst_size: f32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Study proxy used by `chat` when `--local` is not given.
    pub server_url: String,
    /// Where the chat log snapshot lives.
    #[serde(default)]
    pub data_dir: Option<String>,
    /// Reply timeout for a single send; `0` waits forever.
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub mode: Option<StudyMode>,
}

impl ChatConfig {
    /// Resolved snapshot directory.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .map(|d| d.join("study-assistant"))
                .unwrap_or_else(|| PathBuf::from(".study-assistant")),
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Self::load_from_cli(&cli)
    }

    /// Layer defaults, config file, `STUDY_` environment, and CLI flags.
    ///
    /// Priority: CLI flag > CLI env var > `STUDY_` env > config file > defaults.
    pub fn load_from_cli(cli: &Cli) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("resilience.rate_limit_enabled", true)?
            .set_default("resilience.timeout_disabled", false)?
            .set_default("resilience.request_timeout_secs", 30)?
            .set_default("resilience.requests_per_second", 5.0)?
            .set_default("resilience.burst_size", 10.0)?
            .set_default("chat.server_url", "http://127.0.0.1:3000")?
            .set_default("chat.request_timeout_secs", 60)?
            .set_default("logging.json", false)?
            .set_default("logging.level", "info")?;

        // Explicit file must exist; ./config.{yaml,toml,json} is optional.
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // E.g. STUDY_SERVER__PORT=8000, STUDY_CHAT__SERVER_URL=http://...
        builder = builder.add_source(
            Environment::with_prefix("STUDY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(rl) = cli.rate_limit_enabled {
            builder = builder.set_override("resilience.rate_limit_enabled", rl)?;
        }
        if let Some(td) = cli.timeout_disabled {
            builder = builder.set_override("resilience.timeout_disabled", td)?;
        }
        if let Some(Command::Chat(chat)) = &cli.command {
            if let Some(server) = &chat.server {
                builder = builder.set_override("chat.server_url", server.as_str())?;
            }
            if let Some(subject) = &chat.subject {
                builder = builder.set_override("chat.subject", subject.as_str())?;
            }
            if let Some(mode) = chat.mode {
                builder = builder.set_override("chat.mode", mode.as_str())?;
            }
        }

        builder.build()?.try_deserialize()
    }
}

pub fn load_llm_settings() -> Result<LlmSettings, String> {
    let base_url = std::env::var("LLM_BASE_URL")
        .map_err(|_| "Missing required env var: LLM_BASE_URL".to_string())?;
    if base_url.trim().is_empty() {
        return Err("LLM_BASE_URL cannot be empty".to_string());
    }

    let model = std::env::var("LLM_MODEL")
        .map_err(|_| "Missing required env var: LLM_MODEL".to_string())?;
    if model.trim().is_empty() {
        return Err("LLM_MODEL cannot be empty".to_string());
    }

    let api_key = std::env::var("LLM_API_KEY")
        .ok()
        .filter(|s| !s.trim().is_empty());

    // Auto-detect provider from base URL
    let mut provider = Provider::detect_from_url(&base_url);

    if let Provider::AzureOpenAI { .. } = &provider {
        let deployment_name = std::env::var("AZURE_DEPLOYMENT_NAME")
            .map_err(|_| "Azure OpenAI requires AZURE_DEPLOYMENT_NAME".to_string())?;
        provider = Provider::AzureOpenAI {
            deployment_name,
            api_version: std::env::var("AZURE_API_VERSION")
                .unwrap_or_else(|_| DEFAULT_AZURE_API_VERSION.to_string()),
        };
    }

    Ok(LlmSettings {
        base_url,
        api_key,
        model,
        provider,
    })
}
