//! Chat service: validates requests, runs the graph, commits results
//!
//! Transport agnostic; the HTTP layer only maps its types and errors.

use crate::runtime::{GraphRunner, LlmClient, RunError, ToolExecutor};
use crate::store::{Message, StoreError, ThreadStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Answer to one chat request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub thread_id: String,
    pub message_count: usize,
}

/// One message as exposed to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&Message> for HistoryEntry {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.to_string(),
            content: message.content.clone(),
            timestamp: message.created_at,
        }
    }
}

/// Ordered history of a thread
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadHistory {
    pub thread_id: String,
    pub messages: Vec<HistoryEntry>,
    pub message_count: usize,
}

type LockMap = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// One async mutex per thread id, dropped once nobody holds or awaits it
#[derive(Default)]
pub struct ThreadLocks {
    locks: LockMap,
}

/// A reference to one thread's mutex that prunes the map entry when it is
/// the last one out, whether it got the lock or was cancelled waiting
struct LockEntry {
    thread_id: String,
    locks: LockMap,
    mutex: Option<Arc<tokio::sync::Mutex<()>>>,
}

impl Drop for LockEntry {
    fn drop(&mut self) {
        self.mutex.take();
        let mut map = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(mutex) = map.get(&self.thread_id) {
            if Arc::strong_count(mutex) == 1 {
                map.remove(&self.thread_id);
            }
        }
    }
}

/// Exclusive access to one thread until dropped
pub struct ThreadGuard {
    // Field order matters: the guard's own reference goes before the entry checks
    _guard: OwnedMutexGuard<()>,
    _entry: LockEntry,
}

impl ThreadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, thread_id: &str) -> ThreadGuard {
        let mutex = {
            let mut map = self
                .locks
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            map.entry(thread_id.to_string()).or_default().clone()
        };
        let entry = LockEntry {
            thread_id: thread_id.to_string(),
            locks: self.locks.clone(),
            mutex: Some(mutex.clone()),
        };

        let guard = mutex.lock_owned().await;
        ThreadGuard {
            _guard: guard,
            _entry: entry,
        }
    }

    /// Threads with a live lock entry
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The request handler behind every transport
pub struct ChatService<L, T> {
    store: Arc<dyn ThreadStore>,
    runner: GraphRunner<L, T>,
    locks: ThreadLocks,
}

impl<L: LlmClient, T: ToolExecutor> ChatService<L, T> {
    pub fn new(store: Arc<dyn ThreadStore>, runner: GraphRunner<L, T>) -> Self {
        Self {
            store,
            runner,
            locks: ThreadLocks::new(),
        }
    }

    /// Run one user message through the thread's graph and commit the result
    pub async fn chat(&self, message: &str, thread_id: &str) -> Result<ChatReply, ServiceError> {
        if message.trim().is_empty() {
            return Err(ServiceError::Validation("message is required".to_string()));
        }
        if thread_id.trim().is_empty() {
            return Err(ServiceError::Validation("thread_id is required".to_string()));
        }

        let _guard = self.locks.lock(thread_id).await;

        let snapshot = self.store.load(thread_id).await?;
        let outcome = self.runner.run(thread_id, &snapshot, message).await?;

        self.store
            .append_and_checkpoint(thread_id, &outcome.new_messages, &outcome.checkpoint)
            .await?;

        Ok(ChatReply {
            response: outcome.response().to_string(),
            thread_id: thread_id.to_string(),
            message_count: outcome.message_count,
        })
    }

    /// Committed history of a thread; empty for a thread never seen
    pub async fn thread_messages(&self, thread_id: &str) -> Result<ThreadHistory, ServiceError> {
        let messages = self.store.read_history(thread_id).await?;
        let entries: Vec<HistoryEntry> = messages.iter().map(HistoryEntry::from).collect();

        Ok(ThreadHistory {
            thread_id: thread_id.to_string(),
            message_count: entries.len(),
            messages: entries,
        })
    }
}
