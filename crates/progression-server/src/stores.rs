//! Opening the configured backend and the caches on top of it.
//!
//! [`Stores`] is what the game server embeds: one [`ProgressionEngine`]
//! plus one [`KeyedDataCache`] per configured domain, all sharing the same
//! backend connection and persistence policy.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use progression_core::config::{Backend, InfrastructureConfig};
use progression_core::{
    BroadcastNotifier, KeyedDataCache, KeyedRecord, MemoryAdapter, PersistenceAdapter,
    ProgressionConfig, ProgressionEngine, Schema,
};
use progression_db::{
    DragonflyPool, DragonflyStore, PgKeyedStore, PgProgressionStore, PostgresPool,
};
use progression_types::ProgressionRecord;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::ServerError;

/// Level-up events buffered for slow subscribers.
const EVENT_CAPACITY: usize = 1024;

/// Counter value type of every keyed domain (`BIGINT` columns).
pub type Counter = i64;

/// Connected persistence backend.
enum Backends {
    Postgres(PostgresPool),
    Dragonfly(DragonflyPool),
    Memory,
}

impl Backends {
    async fn connect(infra: &InfrastructureConfig) -> Result<Self, ServerError> {
        let backend = match infra.backend {
            Backend::Postgres => Self::Postgres(
                PostgresPool::connect(&infra.postgres_url, infra.max_connections).await?,
            ),
            Backend::Dragonfly => Self::Dragonfly(DragonflyPool::connect(&infra.dragonfly_url).await?),
            Backend::Memory => {
                warn!("Using in-memory backend; progression will not survive a restart");
                Self::Memory
            }
        };
        Ok(backend)
    }

    fn progression(
        &self,
        table: &str,
        batch_size: usize,
    ) -> Result<Arc<dyn PersistenceAdapter<ProgressionRecord>>, ServerError> {
        let adapter: Arc<dyn PersistenceAdapter<ProgressionRecord>> = match self {
            Self::Postgres(pool) => Arc::new(
                PgProgressionStore::new(pool.pool().clone(), table)?.with_batch_size(batch_size),
            ),
            Self::Dragonfly(pool) => Arc::new(
                DragonflyStore::<ProgressionRecord>::new(pool.clone(), table)?
                    .with_batch_size(batch_size),
            ),
            Self::Memory => Arc::new(MemoryAdapter::<ProgressionRecord>::new()),
        };
        Ok(adapter)
    }

    fn keyed(
        &self,
        schema: &Schema,
        batch_size: usize,
    ) -> Result<Arc<dyn PersistenceAdapter<KeyedRecord<Counter>>>, ServerError> {
        let adapter: Arc<dyn PersistenceAdapter<KeyedRecord<Counter>>> = match self {
            Self::Postgres(pool) => Arc::new(
                PgKeyedStore::<Counter>::new(pool.pool().clone(), schema.clone())
                    .with_batch_size(batch_size),
            ),
            Self::Dragonfly(pool) => Arc::new(
                DragonflyStore::<KeyedRecord<Counter>>::new(pool.clone(), schema.table_name())?
                    .with_batch_size(batch_size),
            ),
            Self::Memory => Arc::new(MemoryAdapter::<KeyedRecord<Counter>>::new()),
        };
        Ok(adapter)
    }

    async fn close(&self) {
        if let Self::Postgres(pool) = self {
            pool.close().await;
        }
    }
}

/// The progression engine and every keyed domain cache.
pub struct Stores {
    engine: ProgressionEngine,
    domains: BTreeMap<String, KeyedDataCache<Counter>>,
    events: BroadcastNotifier,
    backend: Backends,
}

impl Stores {
    /// Connect the configured backend, create every table and open the
    /// caches on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the configuration is invalid, the backend
    /// is unreachable or schema creation fails.
    pub async fn open(config: &ProgressionConfig) -> Result<Self, ServerError> {
        let rules = config.rules()?;
        let policy = config.persistence.policy();
        let batch_size = config.persistence.batch_size;
        let backend = Backends::connect(&config.infrastructure).await?;

        let events = BroadcastNotifier::new(EVENT_CAPACITY);
        let engine = ProgressionEngine::open(
            &config.leveling.domain,
            rules,
            backend.progression(&config.leveling.table, batch_size)?,
            policy,
            Arc::new(events.clone()),
        )
        .await?;

        let mut domains = BTreeMap::new();
        for (domain, schema) in config.domains.iter().zip(config.schemas()?) {
            let adapter = backend.keyed(&schema, batch_size)?;
            let cache = KeyedDataCache::open(schema, adapter, policy).await?;
            domains.insert(domain.name.clone(), cache);
        }

        info!(
            progression = engine.domain(),
            keyed_domains = domains.len(),
            "Stores opened"
        );
        Ok(Self {
            engine,
            domains,
            events,
            backend,
        })
    }

    /// The progression engine.
    pub const fn engine(&self) -> &ProgressionEngine {
        &self.engine
    }

    /// The keyed cache registered under `name`.
    pub fn domain(&self, name: &str) -> Option<&KeyedDataCache<Counter>> {
        self.domains.get(name)
    }

    /// Names of every keyed domain.
    pub fn domain_names(&self) -> impl Iterator<Item = &str> {
        self.domains.keys().map(String::as_str)
    }

    /// Level-up event source for the presentation layer.
    pub const fn events(&self) -> &BroadcastNotifier {
        &self.events
    }

    /// Start `save_all` on every cache and wait for all of them.
    ///
    /// Returns the number of entities that were cached at the start.
    pub async fn checkpoint(&self) -> usize {
        let mut cached = self.engine.loaded_count();
        let mut handles: Vec<JoinHandle<()>> = vec![self.engine.save_all()];
        for cache in self.domains.values() {
            cached = cached.saturating_add(cache.loaded_count());
            handles.push(cache.save_all());
        }

        let failed = join_all(handles)
            .await
            .into_iter()
            .filter(Result::is_err)
            .count();
        if failed > 0 {
            warn!(failed, "Checkpoint tasks did not complete");
        }
        cached
    }

    /// Flush everything and release backend connections.
    pub async fn shutdown(self) {
        let cached = self.checkpoint().await;
        self.backend.close().await;
        info!(count = cached, "Stores flushed and closed");
    }
}
