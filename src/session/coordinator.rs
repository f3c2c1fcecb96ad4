//! Request coordination around the chat log.
//!
//! [`ChatCoordinator`] runs at most one send at a time. A send appends the
//! user's message optimistically, asks the completion service for a reply,
//! and then either appends the reply or restores the log it started from.
//!
//! ```text
//!            send(text)                     reply
//!   Idle ───────────────▶ Sending ───────────────────▶ Idle (+user, +assistant)
//!    ▲                       │
//!    └───────────────────────┘ failure / timeout: rollback, last_error set
//! ```
//!
//! `clear()` is accepted in either state. A send that was in flight when the
//! log was cleared is discarded when it completes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::study::{ChatRequest, StudyMode};

use super::completion::{CompletionError, CompletionResponse, CompletionService};
use super::log::{ChatLog, ChatMessage};
use super::storage::StorageError;
use super::store::SessionStore;

/// Default limit on how long a send may wait for its reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Context passed through unmodified with every completion request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatOptions {
    pub subject: Option<String>,
    pub mode: Option<StudyMode>,
}

/// Transient request status. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestState {
    pub busy: bool,
    pub last_error: Option<String>,
}

/// What a call to [`ChatCoordinator::send`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input; nothing changed.
    Ignored,
    /// Another send was in flight; nothing changed.
    Rejected,
    /// The reply was appended after the user's message.
    Replied(ChatMessage),
    /// The log was rolled back; the message is also in `last_error`.
    Failed(String),
    /// The log was cleared while the request was in flight.
    Discarded,
}

#[derive(Debug)]
struct InFlight {
    epoch: u64,
    pre_call: ChatLog,
    text: String,
}

#[derive(Debug)]
struct Inner {
    store: SessionStore,
    request: RequestState,
    /// Bumped by `clear()`; sends from an older epoch never commit.
    epoch: u64,
    in_flight: Option<InFlight>,
    draft: Option<String>,
    storage_warning: Option<String>,
}

impl Inner {
    fn note_storage(&mut self, warning: Option<StorageError>) {
        self.storage_warning = warning.map(|e| e.to_string());
    }
}

/// Coordinates sends, rollbacks, and clears over a [`SessionStore`].
///
/// Cheap to clone; clones share the same log and request state.
#[derive(Clone)]
pub struct ChatCoordinator {
    inner: Arc<Mutex<Inner>>,
    service: Arc<dyn CompletionService>,
    options: ChatOptions,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for ChatCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCoordinator")
            .field("options", &self.options)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ChatCoordinator {
    /// Create a coordinator in the idle state over `store`.
    #[must_use]
    pub fn new(store: SessionStore, service: Arc<dyn CompletionService>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                store,
                request: RequestState::default(),
                epoch: 0,
                in_flight: None,
                draft: None,
                storage_warning: None,
            })),
            service,
            options: ChatOptions::default(),
            timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the reply timeout. `None` waits forever.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn options(&self) -> &ChatOptions {
        &self.options
    }

    /// Restore the log from durable storage.
    pub async fn restore(&self) -> ChatLog {
        self.inner.lock().await.store.load().await
    }

    pub async fn messages(&self) -> ChatLog {
        self.inner.lock().await.store.log().clone()
    }

    pub async fn request_state(&self) -> RequestState {
        self.inner.lock().await.request.clone()
    }

    /// Text of the last failed send, kept so it can be retried.
    pub async fn draft(&self) -> Option<String> {
        self.inner.lock().await.draft.clone()
    }

    /// Most recent persistence failure, if the last write did not stick.
    pub async fn storage_warning(&self) -> Option<String> {
        self.inner.lock().await.storage_warning.clone()
    }

    /// Send `text` as the next user message.
    ///
    /// Blank text is ignored and a send while busy is rejected, both without
    /// touching any state. Otherwise the log ends up either one user/assistant
    /// pair longer or exactly as it was.
    pub async fn send(&self, text: &str) -> SendOutcome {
        if text.trim().is_empty() {
            return SendOutcome::Ignored;
        }

        // The send runs on its own task so an abandoned caller cannot leave
        // the coordinator stuck in the busy state.
        let this = self.clone();
        let text = text.to_string();
        match tokio::spawn(async move { this.run_send(text).await }).await {
            Ok(outcome) => outcome,
            Err(e) => self.settle(Err(CompletionError::Aborted(e.to_string()))).await,
        }
    }

    /// Resend the saved draft, if there is one.
    pub async fn retry(&self) -> SendOutcome {
        let draft = self.inner.lock().await.draft.clone();
        match draft {
            Some(text) => self.send(&text).await,
            None => SendOutcome::Ignored,
        }
    }

    /// Empty the log, remove its snapshot, and reset the error and draft.
    ///
    /// Never blocked by an in-flight send.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.epoch += 1;
        inner.request.last_error = None;
        inner.draft = None;
        let cleared = inner.store.clear().await;
        inner.note_storage(cleared.warning);
        tracing::info!(name: "chat.cleared", busy = inner.request.busy, "Chat log cleared");
    }

    async fn run_send(&self, text: String) -> SendOutcome {
        let request = {
            let mut inner = self.inner.lock().await;
            if inner.request.busy {
                tracing::debug!("Send rejected while another request is in flight");
                return SendOutcome::Rejected;
            }
            inner.request.busy = true;
            inner.request.last_error = None;

            let pre_call = inner.store.log().clone();
            let epoch = inner.epoch;
            inner.in_flight = Some(InFlight {
                epoch,
                pre_call,
                text: text.clone(),
            });

            let appended = inner.store.append(ChatMessage::user(text)).await;
            inner.note_storage(appended.warning);

            ChatRequest {
                messages: appended.value.into_vec(),
                subject: self.options.subject.clone(),
                mode: self.options.mode,
            }
        };

        tracing::info!(
            name: "chat.send.started",
            message_count = request.messages.len(),
            subject = ?request.subject,
            mode = ?request.mode,
            "Sending chat request"
        );

        let result = self.call_service(request).await;
        self.settle(result).await
    }

    async fn call_service(
        &self,
        request: ChatRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        let call = self.service.complete(request);
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_elapsed) => Err(CompletionError::Timeout(limit)),
            },
            None => call.await,
        }
    }

    /// Commit or roll back the in-flight send and return to idle.
    async fn settle(
        &self,
        result: Result<CompletionResponse, CompletionError>,
    ) -> SendOutcome {
        let mut inner = self.inner.lock().await;
        inner.request.busy = false;

        let Some(flight) = inner.in_flight.take() else {
            return SendOutcome::Discarded;
        };
        if flight.epoch != inner.epoch {
            tracing::info!(
                name: "chat.send.discarded",
                "Dropping reply for a conversation that was cleared"
            );
            return SendOutcome::Discarded;
        }

        match reply_text(result) {
            Ok(text) => {
                let reply = ChatMessage::assistant(text);
                let appended = inner.store.append(reply.clone()).await;
                inner.note_storage(appended.warning);
                inner.request.last_error = None;
                inner.draft = None;
                tracing::info!(
                    name: "chat.send.completed",
                    message_count = appended.value.len(),
                    "Chat reply received"
                );
                SendOutcome::Replied(reply)
            }
            Err(message) => {
                let restored = inner.store.replace(flight.pre_call).await;
                inner.note_storage(restored.warning);
                inner.request.last_error = Some(message.clone());
                inner.draft = Some(flight.text);
                tracing::warn!(
                    name: "chat.send.failed",
                    error = %message,
                    "Chat request failed; user message rolled back"
                );
                SendOutcome::Failed(message)
            }
        }
    }
}

/// Reduce a service result to reply text or a non-empty error message.
fn reply_text(result: Result<CompletionResponse, CompletionError>) -> Result<String, String> {
    match result {
        Ok(CompletionResponse {
            success: true,
            response: Some(text),
            ..
        }) => Ok(text),
        Ok(CompletionResponse { success: true, .. }) => {
            Err("Malformed response: missing reply text".to_string())
        }
        Ok(CompletionResponse { error, .. }) => Err(error
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| "Failed to get response".to_string())),
        Err(e) => Err(e.to_string()),
    }
}
