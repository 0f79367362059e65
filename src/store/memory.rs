//! In-process thread stores

use super::{Checkpoint, Message, StoreResult, ThreadSnapshot, ThreadStore};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Keeps every thread for the lifetime of the process
#[derive(Default)]
pub struct MemoryStore {
    threads: RwLock<HashMap<String, ThreadSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Threads with at least one commit
    #[cfg(test)]
    pub async fn thread_count(&self) -> usize {
        self.threads.read().await.len()
    }
}

#[async_trait]
impl ThreadStore for MemoryStore {
    async fn load(&self, thread_id: &str) -> StoreResult<ThreadSnapshot> {
        let threads = self.threads.read().await;
        Ok(threads.get(thread_id).cloned().unwrap_or_default())
    }

    async fn append_and_checkpoint(
        &self,
        thread_id: &str,
        new_messages: &[Message],
        checkpoint: &Checkpoint,
    ) -> StoreResult<()> {
        // Single write lock: readers see all of it or none of it
        let mut threads = self.threads.write().await;
        let thread = threads.entry(thread_id.to_string()).or_default();
        thread.messages.extend_from_slice(new_messages);
        thread.checkpoint = checkpoint.clone();
        Ok(())
    }

    async fn read_history(&self, thread_id: &str) -> StoreResult<Vec<Message>> {
        let threads = self.threads.read().await;
        Ok(threads
            .get(thread_id)
            .map(|t| t.messages.clone())
            .unwrap_or_default())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Retains nothing: every run sees a fresh thread.
///
/// Used when persistence is switched off or the database is unreachable.
#[derive(Default)]
pub struct EphemeralStore;

#[async_trait]
impl ThreadStore for EphemeralStore {
    async fn load(&self, _thread_id: &str) -> StoreResult<ThreadSnapshot> {
        Ok(ThreadSnapshot::default())
    }

    async fn append_and_checkpoint(
        &self,
        thread_id: &str,
        new_messages: &[Message],
        _checkpoint: &Checkpoint,
    ) -> StoreResult<()> {
        tracing::debug!(
            thread_id = %thread_id,
            discarded = new_messages.len(),
            "Persistence disabled, dropping run output"
        );
        Ok(())
    }

    async fn read_history(&self, _thread_id: &str) -> StoreResult<Vec<Message>> {
        Ok(Vec::new())
    }

    fn backend(&self) -> &'static str {
        "ephemeral"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::GraphState;
    use std::sync::Arc;

    fn terminated(runs: u64) -> Checkpoint {
        Checkpoint {
            state: GraphState::Terminated,
            step: 1,
            runs,
        }
    }

    #[tokio::test]
    async fn test_unseen_thread_is_empty() {
        let store = MemoryStore::new();
        let snapshot = store.load("never-seen").await.unwrap();
        assert!(snapshot.messages.is_empty());
        assert_eq!(snapshot.checkpoint, Checkpoint::initial());
    }

    #[tokio::test]
    async fn test_append_extends_in_order_and_replaces_checkpoint() {
        let store = MemoryStore::new();
        store
            .append_and_checkpoint(
                "t",
                &[Message::user("one"), Message::assistant("two")],
                &terminated(1),
            )
            .await
            .unwrap();
        store
            .append_and_checkpoint(
                "t",
                &[Message::user("three"), Message::assistant("four")],
                &terminated(2),
            )
            .await
            .unwrap();

        let snapshot = store.load("t").await.unwrap();
        let contents: Vec<_> = snapshot.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three", "four"]);
        assert_eq!(snapshot.checkpoint, terminated(2));
    }

    #[tokio::test]
    async fn test_threads_are_isolated() {
        let store = MemoryStore::new();
        store
            .append_and_checkpoint("a", &[Message::user("for a")], &terminated(1))
            .await
            .unwrap();

        assert_eq!(store.read_history("a").await.unwrap().len(), 1);
        assert!(store.read_history("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_history_is_idempotent() {
        let store = MemoryStore::new();
        store
            .append_and_checkpoint("t", &[Message::user("hi")], &terminated(1))
            .await
            .unwrap();

        let first = store.read_history("t").await.unwrap();
        let second = store.read_history("t").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.load("t").await.unwrap().checkpoint, terminated(1));
    }

    #[tokio::test]
    async fn test_concurrent_reader_sees_whole_commits() {
        let store = Arc::new(MemoryStore::new());
        let batch: Vec<Message> = (0..50).map(|i| Message::user(i.to_string())).collect();

        let writer = {
            let store = store.clone();
            let batch = batch.clone();
            tokio::spawn(async move {
                for run in 1..=20 {
                    store
                        .append_and_checkpoint("t", &batch, &terminated(run))
                        .await
                        .unwrap();
                }
            })
        };

        for _ in 0..100 {
            let snapshot = store.load("t").await.unwrap();
            assert_eq!(snapshot.messages.len() % batch.len(), 0);
            let runs = u64::try_from(snapshot.messages.len() / batch.len()).unwrap();
            assert_eq!(snapshot.checkpoint.runs, runs);
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_ephemeral_store_forgets() {
        let store = EphemeralStore;
        store
            .append_and_checkpoint("t", &[Message::user("hi")], &terminated(1))
            .await
            .unwrap();

        let snapshot = store.load("t").await.unwrap();
        assert!(snapshot.messages.is_empty());
        assert_eq!(snapshot.checkpoint, Checkpoint::initial());
        assert!(store.read_history("t").await.unwrap().is_empty());
    }
}
