//! Send/rollback/clear behaviour of the chat coordinator against fake services.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use study_assistant::llm::{LlmDriver, LlmError, LlmRequest};
use study_assistant::session::{
    CHAT_LOG_KEY, ChatCoordinator, ChatMessage, ChatOptions, CompletionError, CompletionResponse,
    CompletionService, FileStore, KeyValueStore, LocalCompletionService, MemoryStore,
    RequestState, SendOutcome, SessionStore, StorageError,
};
use study_assistant::study::{ChatRequest, StudyMode, StudyService};

/// Completion service that replays scripted results and records requests.
#[derive(Default)]
struct FakeService {
    script: Mutex<VecDeque<Result<CompletionResponse, CompletionError>>>,
    requests: Mutex<Vec<ChatRequest>>,
    /// Signalled when a request reaches the service.
    entered: Notify,
    /// When set, each request waits here before answering.
    gate: Option<Notify>,
    /// Never answer.
    hang: bool,
}

impl FakeService {
    fn scripted(
        results: impl IntoIterator<Item = Result<CompletionResponse, CompletionError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(results.into_iter().collect()),
            ..Self::default()
        })
    }

    fn gated(
        results: impl IntoIterator<Item = Result<CompletionResponse, CompletionError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(results.into_iter().collect()),
            gate: Some(Notify::new()),
            ..Self::default()
        })
    }

    fn hanging() -> Arc<Self> {
        Arc::new(Self {
            hang: true,
            ..Self::default()
        })
    }

    fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for FakeService {
    async fn complete(&self, request: ChatRequest) -> Result<CompletionResponse, CompletionError> {
        self.requests.lock().unwrap().push(request);
        self.entered.notify_one();

        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(CompletionResponse::reply("ok")))
    }
}

/// Storage whose writes always fail.
#[derive(Debug)]
struct BrokenStore;

#[async_trait]
impl KeyValueStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("disk full".to_string()))
    }

    async fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("disk full".to_string()))
    }
}

/// Memory storage that accepts a fixed number of writes, then fails.
#[derive(Debug)]
struct WriteLimitedStore {
    inner: MemoryStore,
    writes_left: AtomicUsize,
}

impl WriteLimitedStore {
    fn new(writes: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            writes_left: AtomicUsize::new(writes),
        })
    }
}

#[async_trait]
impl KeyValueStore for WriteLimitedStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let granted = self
            .writes_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !granted {
            return Err(StorageError::Unavailable("write quota used".to_string()));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key).await
    }
}

/// LLM that answers with fixed text or fails with a fixed API error.
struct FixedLlm(Result<String, String>);

#[async_trait]
impl LlmDriver for FixedLlm {
    async fn complete(&self, _req: LlmRequest) -> Result<String, LlmError> {
        self.0.clone().map_err(|message| LlmError::Api {
            status: 503,
            message,
        })
    }
}

fn local_coordinator(llm: FixedLlm) -> ChatCoordinator {
    let study = Arc::new(StudyService::new(Arc::new(llm)));
    ChatCoordinator::new(
        SessionStore::new(Arc::new(MemoryStore::new())),
        Arc::new(LocalCompletionService::new(study)),
    )
}

fn coordinator(service: Arc<FakeService>) -> (ChatCoordinator, Arc<MemoryStore>) {
    let storage = Arc::new(MemoryStore::new());
    let chat = ChatCoordinator::new(SessionStore::new(storage.clone()), service);
    (chat, storage)
}

async fn snapshot(storage: &MemoryStore) -> Option<Vec<ChatMessage>> {
    storage
        .get(CHAT_LOG_KEY)
        .await
        .unwrap()
        .map(|raw| serde_json::from_str(&raw).unwrap())
}

#[tokio::test]
async fn test_successful_send_appends_pair_and_persists() {
    let service = FakeService::scripted([Ok(CompletionResponse::reply("4"))]);
    let (chat, storage) = coordinator(service.clone());

    let outcome = chat.send("What is 2+2?").await;
    assert_eq!(outcome, SendOutcome::Replied(ChatMessage::assistant("4")));

    let expected = vec![ChatMessage::user("What is 2+2?"), ChatMessage::assistant("4")];
    assert_eq!(chat.messages().await.messages(), expected.as_slice());
    assert_eq!(snapshot(&storage).await, Some(expected));
    assert_eq!(chat.request_state().await, RequestState::default());
}

#[tokio::test]
async fn test_request_carries_history_and_options() {
    let service = FakeService::scripted([
        Ok(CompletionResponse::reply("A1")),
        Ok(CompletionResponse::reply("A2")),
    ]);
    let storage = Arc::new(MemoryStore::new());
    let chat = ChatCoordinator::new(SessionStore::new(storage), service.clone()).with_options(
        ChatOptions {
            subject: Some("Physics".to_string()),
            mode: Some(StudyMode::Exam),
        },
    );

    chat.send("Q1").await;
    chat.send("Q2").await;

    let requests = service.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[1].messages,
        vec![
            ChatMessage::user("Q1"),
            ChatMessage::assistant("A1"),
            ChatMessage::user("Q2"),
        ]
    );
    assert_eq!(requests[1].subject.as_deref(), Some("Physics"));
    assert_eq!(requests[1].mode, Some(StudyMode::Exam));
}

#[tokio::test]
async fn test_blank_input_is_ignored() {
    let service = FakeService::scripted([]);
    let (chat, storage) = coordinator(service.clone());

    assert_eq!(chat.send("").await, SendOutcome::Ignored);
    assert_eq!(chat.send("   \n\t").await, SendOutcome::Ignored);

    assert!(service.requests().is_empty());
    assert!(chat.messages().await.is_empty());
    assert_eq!(snapshot(&storage).await, None);
}

#[tokio::test]
async fn test_blank_input_keeps_last_error() {
    let service = FakeService::scripted([Ok(CompletionResponse::failure("model overloaded"))]);
    let (chat, _storage) = coordinator(service.clone());

    chat.send("first").await;
    let failed_state = chat.request_state().await;
    assert_eq!(failed_state.last_error.as_deref(), Some("model overloaded"));

    assert_eq!(chat.send("   ").await, SendOutcome::Ignored);
    assert_eq!(chat.request_state().await, failed_state);
    assert_eq!(chat.draft().await.as_deref(), Some("first"));
    assert!(chat.messages().await.is_empty());
    assert_eq!(service.requests().len(), 1);
}

#[tokio::test]
async fn test_service_failure_rolls_back() {
    let service = FakeService::scripted([
        Ok(CompletionResponse::reply("first answer")),
        Ok(CompletionResponse::failure("model overloaded")),
    ]);
    let (chat, storage) = coordinator(service);

    chat.send("first").await;
    let before = chat.messages().await;

    let outcome = chat.send("second").await;
    assert_eq!(outcome, SendOutcome::Failed("model overloaded".to_string()));

    assert_eq!(chat.messages().await, before);
    assert_eq!(
        snapshot(&storage).await.as_deref(),
        Some(before.messages())
    );
    let state = chat.request_state().await;
    assert!(!state.busy);
    assert_eq!(state.last_error.as_deref(), Some("model overloaded"));
}

#[tokio::test]
async fn test_transport_failure_rolls_back() {
    let service = FakeService::scripted([Err(CompletionError::Api {
        status: 502,
        message: "bad gateway".to_string(),
    })]);
    let (chat, _storage) = coordinator(service);

    let outcome = chat.send("hello").await;
    assert_eq!(
        outcome,
        SendOutcome::Failed("Service error (502): bad gateway".to_string())
    );
    assert!(chat.messages().await.is_empty());
}

#[tokio::test]
async fn test_missing_reply_text_is_a_failure() {
    let service = FakeService::scripted([Ok(CompletionResponse {
        success: true,
        response: None,
        error: None,
    })]);
    let (chat, _storage) = coordinator(service);

    let outcome = chat.send("hello").await;
    assert!(matches!(outcome, SendOutcome::Failed(msg) if msg.contains("Malformed")));
    assert!(chat.messages().await.is_empty());
}

#[tokio::test]
async fn test_failed_text_is_kept_for_retry() {
    let service = FakeService::scripted([
        Ok(CompletionResponse::failure("try later")),
        Ok(CompletionResponse::reply("here you go")),
    ]);
    let (chat, _storage) = coordinator(service.clone());

    chat.send("explain entropy").await;
    assert_eq!(chat.draft().await.as_deref(), Some("explain entropy"));

    let outcome = chat.retry().await;
    assert_eq!(
        outcome,
        SendOutcome::Replied(ChatMessage::assistant("here you go"))
    );
    assert_eq!(chat.draft().await, None);
    assert_eq!(chat.request_state().await.last_error, None);
    assert_eq!(service.requests()[1].messages, vec![ChatMessage::user("explain entropy")]);
}

#[tokio::test]
async fn test_retry_without_draft_is_ignored() {
    let service = FakeService::scripted([]);
    let (chat, _storage) = coordinator(service.clone());

    assert_eq!(chat.retry().await, SendOutcome::Ignored);
    assert!(service.requests().is_empty());
}

#[tokio::test]
async fn test_send_while_busy_is_rejected() {
    let service = FakeService::gated([Ok(CompletionResponse::reply("slow answer"))]);
    let (chat, _storage) = coordinator(service.clone());

    let first = tokio::spawn({
        let chat = chat.clone();
        async move { chat.send("first").await }
    });
    service.entered.notified().await;

    assert!(chat.request_state().await.busy);
    assert_eq!(chat.messages().await.messages(), &[ChatMessage::user("first")]);
    assert_eq!(chat.send("second").await, SendOutcome::Rejected);
    assert_eq!(chat.messages().await.len(), 1);

    assert_eq!(chat.send(" \n ").await, SendOutcome::Ignored);
    assert!(chat.request_state().await.busy);
    assert_eq!(chat.messages().await.len(), 1);

    service.release();
    let outcome = first.await.unwrap();
    assert_eq!(
        outcome,
        SendOutcome::Replied(ChatMessage::assistant("slow answer"))
    );
    assert_eq!(service.requests().len(), 1);
    assert!(!chat.request_state().await.busy);
}

#[tokio::test]
async fn test_clear_during_send_discards_reply() {
    let service = FakeService::gated([Ok(CompletionResponse::reply("late answer"))]);
    let (chat, storage) = coordinator(service.clone());

    let pending = tokio::spawn({
        let chat = chat.clone();
        async move { chat.send("question").await }
    });
    service.entered.notified().await;

    chat.clear().await;
    assert!(chat.messages().await.is_empty());

    service.release();
    assert_eq!(pending.await.unwrap(), SendOutcome::Discarded);

    assert!(chat.messages().await.is_empty());
    assert_eq!(snapshot(&storage).await, None);
    assert_eq!(chat.request_state().await, RequestState::default());

    // The coordinator is usable again afterwards.
    let outcome = chat.send("again").await;
    assert_eq!(outcome, SendOutcome::Replied(ChatMessage::assistant("ok")));
}

#[tokio::test]
async fn test_clear_resets_error_and_draft() {
    let service = FakeService::scripted([Ok(CompletionResponse::failure("nope"))]);
    let (chat, storage) = coordinator(service);

    chat.send("hello").await;
    assert!(chat.request_state().await.last_error.is_some());

    chat.clear().await;
    assert_eq!(chat.request_state().await.last_error, None);
    assert_eq!(chat.draft().await, None);
    assert_eq!(snapshot(&storage).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_request_times_out() {
    let service = FakeService::hanging();
    let storage = Arc::new(MemoryStore::new());
    let chat = ChatCoordinator::new(SessionStore::new(storage), service)
        .with_timeout(Some(Duration::from_secs(5)));

    let outcome = chat.send("anyone there?").await;
    assert_eq!(
        outcome,
        SendOutcome::Failed("Request timed out after 5s".to_string())
    );
    assert!(chat.messages().await.is_empty());
    assert!(!chat.request_state().await.busy);
    assert_eq!(chat.draft().await.as_deref(), Some("anyone there?"));
}

#[tokio::test(start_paused = true)]
async fn test_sub_second_timeout_reports_milliseconds() {
    let storage = Arc::new(MemoryStore::new());
    let chat = ChatCoordinator::new(SessionStore::new(storage), FakeService::hanging())
        .with_timeout(Some(Duration::from_millis(500)));

    let outcome = chat.send("quick?").await;
    assert_eq!(
        outcome,
        SendOutcome::Failed("Request timed out after 500ms".to_string())
    );
}

#[tokio::test]
async fn test_local_service_reply_is_appended() {
    let chat = local_coordinator(FixedLlm(Ok("Photosynthesis.".to_string())));

    let outcome = chat.send("How do plants make food?").await;
    assert_eq!(
        outcome,
        SendOutcome::Replied(ChatMessage::assistant("Photosynthesis."))
    );
    assert_eq!(
        chat.messages().await.messages(),
        &[
            ChatMessage::user("How do plants make food?"),
            ChatMessage::assistant("Photosynthesis."),
        ]
    );
    assert_eq!(chat.request_state().await, RequestState::default());
}

#[tokio::test]
async fn test_local_service_failure_rolls_back_with_driver_error() {
    let chat = local_coordinator(FixedLlm(Err("quota exceeded".to_string())));

    let outcome = chat.send("How do plants make food?").await;
    let SendOutcome::Failed(message) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(message.contains("quota exceeded"));
    assert!(!message.contains("Sorry"));

    assert!(chat.messages().await.is_empty());
    let state = chat.request_state().await;
    assert!(!state.busy);
    assert_eq!(state.last_error, Some(message));
}

#[tokio::test]
async fn test_unwritten_rollback_is_not_restored() {
    // The optimistic append is written; the rollback write is refused.
    let storage = WriteLimitedStore::new(1);
    let service = FakeService::scripted([Ok(CompletionResponse::failure("offline"))]);
    let chat = ChatCoordinator::new(SessionStore::new(storage.clone()), service);

    let outcome = chat.send("orphan?").await;
    assert_eq!(outcome, SendOutcome::Failed("offline".to_string()));
    assert!(chat.storage_warning().await.is_some());
    assert!(storage.get(CHAT_LOG_KEY).await.unwrap().is_some());

    let reopened = ChatCoordinator::new(SessionStore::new(storage), FakeService::scripted([]));
    assert!(reopened.restore().await.is_empty());
}

#[tokio::test]
async fn test_storage_failure_keeps_memory_and_warns() {
    let service = FakeService::scripted([Ok(CompletionResponse::reply("4"))]);
    let chat = ChatCoordinator::new(SessionStore::new(Arc::new(BrokenStore)), service);

    let outcome = chat.send("2+2?").await;
    assert!(matches!(outcome, SendOutcome::Replied(_)));
    assert_eq!(chat.messages().await.len(), 2);

    let warning = chat.storage_warning().await.expect("warning expected");
    assert!(warning.contains("disk full"));
}

#[tokio::test]
async fn test_restore_previous_session_from_disk() {
    let dir = tempfile::tempdir().unwrap();

    {
        let service = FakeService::scripted([Ok(CompletionResponse::reply("Paris"))]);
        let storage = Arc::new(FileStore::new(dir.path()));
        let chat = ChatCoordinator::new(SessionStore::new(storage), service);
        chat.send("Capital of France?").await;
    }

    let service = FakeService::scripted([]);
    let storage = Arc::new(FileStore::new(dir.path()));
    let chat = ChatCoordinator::new(SessionStore::new(storage), service);

    let restored = chat.restore().await;
    assert_eq!(
        restored.messages(),
        &[
            ChatMessage::user("Capital of France?"),
            ChatMessage::assistant("Paris"),
        ]
    );
    assert_eq!(chat.messages().await, restored);
}

#[tokio::test]
async fn test_corrupt_snapshot_restores_empty() {
    let storage = Arc::new(MemoryStore::new());
    storage.set(CHAT_LOG_KEY, "[{\"role\":\"robot\"").await.unwrap();

    let chat = ChatCoordinator::new(SessionStore::new(storage), FakeService::scripted([]));
    assert!(chat.restore().await.is_empty());

    let outcome = chat.send("fresh start").await;
    assert!(matches!(outcome, SendOutcome::Replied(_)));
}
