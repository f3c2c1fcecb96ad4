//! Chat session state: the conversation log and the request coordinator.
//!
//! # Architecture
//!
//! - [`SessionStore`]: owns the [`ChatLog`] and mirrors it to a [`KeyValueStore`]
//! - [`ChatCoordinator`]: one send at a time, optimistic append, rollback on failure
//! - [`CompletionService`]: the remote side that turns a conversation into a reply
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use study_assistant::session::{
//!     ChatCoordinator, HttpCompletionService, MemoryStore, SessionStore,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SessionStore::new(Arc::new(MemoryStore::new()));
//! let service = Arc::new(HttpCompletionService::new("http://localhost:3000")?);
//! let chat = ChatCoordinator::new(store, service);
//!
//! chat.restore().await;
//! chat.send("What is 2+2?").await;
//! assert_eq!(chat.messages().await.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod completion;
pub mod coordinator;
mod log;
pub mod storage;
pub mod store;

pub use completion::{
    CompletionError, CompletionResponse, CompletionService, HttpCompletionService,
    LocalCompletionService,
};
pub use coordinator::{ChatCoordinator, ChatOptions, RequestState, SendOutcome};
pub use log::{ChatLog, ChatMessage, ChatRole};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use store::{CHAT_LOG_KEY, Persisted, SessionStore};
