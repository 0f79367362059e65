//! PostgreSQL thread store

use super::schema::SCHEMA;
use super::{Checkpoint, Message, StoreError, StoreResult, ThreadSnapshot, ThreadStore, ToolCall};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use std::time::Duration;

/// Default wait for a pooled connection
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_CONNECTIONS: u32 = 10;

/// Thread store backed by a `PostgreSQL` pool
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and verify the server answers within `acquire_timeout`
    pub async fn connect(
        options: PgConnectOptions,
        acquire_timeout: Duration,
    ) -> StoreResult<Self> {
        tracing::info!("Initializing PostgreSQL connection pool");

        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Create tables if they don't exist
    pub async fn setup(&self) -> StoreResult<()> {
        tracing::info!("Running thread store migrations");
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Release every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn message_from_row(row: &PgRow) -> StoreResult<Message> {
    let role: String = row.try_get("role")?;
    let tool_calls: Option<Json<Vec<ToolCall>>> = row.try_get("tool_calls")?;

    Ok(Message {
        role: role.parse().map_err(StoreError::Corrupt)?,
        content: row.try_get("content")?,
        tool_calls: tool_calls.map(|calls| calls.0).unwrap_or_default(),
        tool_call_id: row.try_get("tool_call_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn count_to_i64(count: usize) -> StoreResult<i64> {
    i64::try_from(count).map_err(|_| StoreError::Corrupt(format!("message count {count} overflows")))
}

#[async_trait]
impl ThreadStore for PostgresStore {
    async fn load(&self, thread_id: &str) -> StoreResult<ThreadSnapshot> {
        // One snapshot for both tables so a concurrent commit is seen whole or not at all
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let checkpoint: Option<Json<Checkpoint>> =
            sqlx::query_scalar("SELECT checkpoint FROM agent_threads WHERE thread_id = $1")
                .bind(thread_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(Json(checkpoint)) = checkpoint else {
            tx.commit().await?;
            return Ok(ThreadSnapshot::default());
        };

        let rows = sqlx::query(
            "SELECT role, content, tool_calls, tool_call_id, created_at
             FROM agent_messages WHERE thread_id = $1 ORDER BY sequence_id",
        )
        .bind(thread_id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let messages = rows
            .iter()
            .map(message_from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(ThreadSnapshot {
            messages,
            checkpoint,
        })
    }

    async fn append_and_checkpoint(
        &self,
        thread_id: &str,
        new_messages: &[Message],
        checkpoint: &Checkpoint,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO agent_threads (thread_id, checkpoint) VALUES ($1, $2)
             ON CONFLICT (thread_id) DO NOTHING",
        )
        .bind(thread_id)
        .bind(Json(Checkpoint::initial()))
        .execute(&mut *tx)
        .await?;

        // Row lock serializes writers on the same thread across processes
        let existing: i64 = sqlx::query_scalar(
            "SELECT message_count FROM agent_threads WHERE thread_id = $1 FOR UPDATE",
        )
        .bind(thread_id)
        .fetch_one(&mut *tx)
        .await?;

        for (offset, message) in new_messages.iter().enumerate() {
            let tool_calls = message.has_tool_calls().then(|| Json(&message.tool_calls));
            sqlx::query(
                "INSERT INTO agent_messages
                 (thread_id, sequence_id, role, content, tool_calls, tool_call_id, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(thread_id)
            .bind(existing + count_to_i64(offset)?)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(tool_calls)
            .bind(message.tool_call_id.as_deref())
            .bind(message.created_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "UPDATE agent_threads
             SET checkpoint = $2, message_count = $3, updated_at = NOW()
             WHERE thread_id = $1",
        )
        .bind(thread_id)
        .bind(Json(checkpoint))
        .bind(existing + count_to_i64(new_messages.len())?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn read_history(&self, thread_id: &str) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT role, content, tool_calls, tool_call_id, created_at
             FROM agent_messages WHERE thread_id = $1 ORDER BY sequence_id",
        )
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

#[cfg(test)]
mod tests {
    //! Needs a reachable server: `TEST_DATABASE_URL=postgres://... cargo test -- --ignored`

    use super::*;
    use crate::state_machine::GraphState;
    use serde_json::json;

    async fn test_store() -> PostgresStore {
        let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL not set");
        let store = PostgresStore::connect(url.parse().unwrap(), ACQUIRE_TIMEOUT)
            .await
            .unwrap();
        store.setup().await.unwrap();
        store
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn test_round_trip_with_tool_calls() {
        let store = test_store().await;
        let thread_id = format!("test-{}", uuid::Uuid::new_v4());

        let fresh = store.load(&thread_id).await.unwrap();
        assert!(fresh.messages.is_empty());
        assert_eq!(fresh.checkpoint, Checkpoint::initial());

        let call = ToolCall::new("call_1", "tavily_search", json!({"query": "X"}));
        let messages = vec![
            Message::user("search for X"),
            Message::assistant_with_tools("", vec![call]),
            Message::tool(&crate::store::ToolResult::success("call_1", "X is ...")),
            Message::assistant("X is ..."),
        ];
        let checkpoint = Checkpoint {
            state: GraphState::Terminated,
            step: 2,
            runs: 1,
        };
        store
            .append_and_checkpoint(&thread_id, &messages, &checkpoint)
            .await
            .unwrap();

        let snapshot = store.load(&thread_id).await.unwrap();
        assert_eq!(snapshot.checkpoint, checkpoint);
        assert_eq!(snapshot.messages.len(), 4);
        assert_eq!(snapshot.messages[1].tool_calls[0].id, "call_1");
        assert_eq!(snapshot.messages[2].tool_call_id.as_deref(), Some("call_1"));

        let again = store.read_history(&thread_id).await.unwrap();
        assert_eq!(again.len(), 4);
        assert_eq!(again[3].content, "X is ...");
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL"]
    async fn test_sequence_continues_across_commits() {
        let store = test_store().await;
        let thread_id = format!("test-{}", uuid::Uuid::new_v4());
        let done = Checkpoint {
            state: GraphState::Terminated,
            step: 1,
            runs: 1,
        };

        for text in ["a", "b", "c"] {
            store
                .append_and_checkpoint(&thread_id, &[Message::user(text)], &done)
                .await
                .unwrap();
        }

        let history = store.read_history(&thread_id).await.unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }
}
