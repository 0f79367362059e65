//! Thread persistence
//!
//! Each thread owns an ordered message history and the checkpoint of its
//! respond/act graph. Commits replace both atomically.

mod memory;
mod postgres;
mod schema;

pub use memory::{EphemeralStore, MemoryStore};
pub use postgres::{PostgresStore, ACQUIRE_TIMEOUT};
pub use schema::*;

use crate::config::{managed_connect_options, ConfigError, DbConfig, PersistenceMode};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Corrupt thread data: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage for thread history and checkpoints
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// History and checkpoint of a thread; a fresh thread when never seen
    async fn load(&self, thread_id: &str) -> StoreResult<ThreadSnapshot>;

    /// Extend history and replace the checkpoint, all or nothing
    async fn append_and_checkpoint(
        &self,
        thread_id: &str,
        new_messages: &[Message],
        checkpoint: &Checkpoint,
    ) -> StoreResult<()>;

    /// Ordered history, without touching the checkpoint
    async fn read_history(&self, thread_id: &str) -> StoreResult<Vec<Message>>;

    /// Backend name for health reporting
    fn backend(&self) -> &'static str;
}

#[async_trait]
impl<T: ThreadStore + ?Sized> ThreadStore for Arc<T> {
    async fn load(&self, thread_id: &str) -> StoreResult<ThreadSnapshot> {
        (**self).load(thread_id).await
    }

    async fn append_and_checkpoint(
        &self,
        thread_id: &str,
        new_messages: &[Message],
        checkpoint: &Checkpoint,
    ) -> StoreResult<()> {
        (**self)
            .append_and_checkpoint(thread_id, new_messages, checkpoint)
            .await
    }

    async fn read_history(&self, thread_id: &str) -> StoreResult<Vec<Message>> {
        (**self).read_history(thread_id).await
    }

    fn backend(&self) -> &'static str {
        (**self).backend()
    }
}

/// Store chosen at startup
pub struct OpenedStore {
    pub store: Arc<dyn ThreadStore>,
    /// The configured database could not be used
    pub degraded: bool,
    /// Pool to close on shutdown
    pub postgres: Option<PostgresStore>,
}

impl OpenedStore {
    fn in_process(store: Arc<dyn ThreadStore>) -> Self {
        Self {
            store,
            degraded: false,
            postgres: None,
        }
    }

    fn degraded(reason: &StoreError) -> Self {
        tracing::warn!(
            error = %reason,
            "Thread store unavailable, running without persistence"
        );
        Self {
            store: Arc::new(EphemeralStore),
            degraded: true,
            postgres: None,
        }
    }

    /// Persistence status as reported on `/health`
    pub fn status(&self) -> &'static str {
        if self.degraded {
            "degraded"
        } else {
            self.store.backend()
        }
    }
}

/// Open the store for a persistence mode.
///
/// Missing configuration is fatal. An unreachable database is not: the
/// service falls back to an ephemeral store and reports itself degraded.
pub async fn open_store(mode: PersistenceMode) -> Result<OpenedStore, ConfigError> {
    open_store_with(mode, |key| std::env::var(key).ok(), ACQUIRE_TIMEOUT).await
}

/// `open_store` over any variable source and pool acquire timeout
pub async fn open_store_with(
    mode: PersistenceMode,
    lookup: impl Fn(&str) -> Option<String>,
    acquire_timeout: Duration,
) -> Result<OpenedStore, ConfigError> {
    let options = match mode {
        PersistenceMode::None => {
            tracing::info!("Persistence disabled");
            return Ok(OpenedStore::in_process(Arc::new(EphemeralStore)));
        }
        PersistenceMode::Memory => {
            tracing::info!("Using in-memory thread store");
            return Ok(OpenedStore::in_process(Arc::new(MemoryStore::new())));
        }
        PersistenceMode::Managed => {
            tracing::info!("Using platform-managed PostgreSQL");
            managed_connect_options(&lookup)?
        }
        PersistenceMode::SelfProvisioned => {
            let db = DbConfig::from_lookup(&lookup)?;
            tracing::info!(host = %db.host, port = db.port, database = %db.name, "Using self-provisioned PostgreSQL");
            db.connect_options()
        }
    };

    let store = match PostgresStore::connect(options, acquire_timeout).await {
        Ok(store) => store,
        Err(e) => return Ok(OpenedStore::degraded(&e)),
    };

    if let Err(e) = store.setup().await {
        // Pool is released before falling back
        store.close().await;
        return Ok(OpenedStore::degraded(&e));
    }

    tracing::info!("PostgreSQL thread store ready");
    Ok(OpenedStore {
        store: Arc::new(store.clone()),
        degraded: false,
        postgres: Some(store),
    })
}
