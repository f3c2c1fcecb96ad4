//! Durable ownership of the conversation log.

use std::sync::Arc;

use super::log::{ChatLog, ChatMessage, ChatRole};
use super::storage::{KeyValueStore, StorageError};

/// Storage key of the chat log snapshot.
pub const CHAT_LOG_KEY: &str = "study_assistant.chat_log";

/// Result of a store mutation.
///
/// The in-memory change always happens; `warning` is set when the durable
/// write failed.
#[derive(Debug)]
pub struct Persisted<T> {
    pub value: T,
    pub warning: Option<StorageError>,
}

impl<T> Persisted<T> {
    /// Whether the durable write succeeded.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        self.warning.is_none()
    }
}

/// Owns the chat log and keeps its snapshot in sync.
///
/// The in-memory log is the source of truth for the running session;
/// persistence is best-effort.
#[derive(Debug)]
pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
    key: String,
    log: ChatLog,
}

impl SessionStore {
    /// Create a store over `storage` using [`CHAT_LOG_KEY`]. Starts empty; call
    /// [`SessionStore::load`] to restore a previous session.
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(storage, CHAT_LOG_KEY)
    }

    #[must_use]
    pub fn with_key(storage: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            log: ChatLog::new(),
        }
    }

    /// Current in-memory log.
    #[must_use]
    pub fn log(&self) -> &ChatLog {
        &self.log
    }

    /// Restore the log from its snapshot.
    ///
    /// A missing, unreadable, or corrupt snapshot yields an empty log. A
    /// trailing user message with no reply is dropped: it is left behind when
    /// a rollback could not be written or the process stopped mid-send.
    pub async fn load(&mut self) -> ChatLog {
        let log = match self.storage.get(&self.key).await {
            Ok(Some(text)) => match serde_json::from_str::<ChatLog>(&text) {
                Ok(log) => log,
                Err(e) => {
                    tracing::warn!(
                        name: "session.snapshot.corrupt",
                        key = %self.key,
                        error = %e,
                        "Discarding unreadable chat log snapshot"
                    );
                    ChatLog::new()
                }
            },
            Ok(None) => ChatLog::new(),
            Err(e) => {
                tracing::warn!(
                    name: "session.snapshot.read_failed",
                    key = %self.key,
                    error = %e,
                    "Failed to read chat log snapshot"
                );
                ChatLog::new()
            }
        };

        let log = self.without_unanswered_tail(log);

        tracing::debug!(key = %self.key, message_count = log.len(), "Chat log restored");
        self.log = log.clone();
        log
    }

    /// Append `message` and persist the new log.
    pub async fn append(&mut self, message: ChatMessage) -> Persisted<ChatLog> {
        let next = self.log.appended(message);
        self.replace(next).await
    }

    /// Set the whole log (used for rollback) and persist it.
    pub async fn replace(&mut self, log: ChatLog) -> Persisted<ChatLog> {
        self.log = log;
        let warning = self.write_snapshot().await.err();
        if let Some(e) = &warning {
            tracing::warn!(
                name: "session.snapshot.write_failed",
                key = %self.key,
                error = %e,
                "Chat log kept in memory only"
            );
        }
        Persisted {
            value: self.log.clone(),
            warning,
        }
    }

    /// Empty the log and remove its snapshot.
    pub async fn clear(&mut self) -> Persisted<()> {
        self.log = ChatLog::new();
        let warning = self.storage.remove(&self.key).await.err();
        if let Some(e) = &warning {
            tracing::warn!(
                name: "session.snapshot.remove_failed",
                key = %self.key,
                error = %e,
                "Failed to remove chat log snapshot"
            );
        }
        Persisted { value: (), warning }
    }

    fn without_unanswered_tail(&self, log: ChatLog) -> ChatLog {
        if log.last().is_none_or(|m| m.role != ChatRole::User) {
            return log;
        }
        let mut messages = log.into_vec();
        while messages.last().is_some_and(|m| m.role == ChatRole::User) {
            messages.pop();
        }
        tracing::warn!(
            name: "session.snapshot.unanswered",
            key = %self.key,
            "Dropping unanswered user message from restored chat log"
        );
        ChatLog::from(messages)
    }

    async fn write_snapshot(&self) -> Result<(), StorageError> {
        let text = serde_json::to_string(&self.log)
            .map_err(|e| StorageError::Unavailable(format!("snapshot encoding failed: {e}")))?;
        self.storage.set(&self.key, &text).await
    }
}
