//! Shared write-back plumbing for every data domain.
//!
//! [`WriteBackStore`] owns the per-entity record map of one domain and the
//! adapter that persists it. Reads and mutations run synchronously against
//! the map on the caller's thread; loads and saves are spawned onto the
//! tokio runtime captured at construction and never awaited by the caller.
//!
//! The map is a sharded [`DashMap`]: a mutation locks only the entry it
//! touches, and background snapshots for `save_all` never serialize
//! unrelated entities behind one global lock.
//!
//! Every load takes a ticket for its entity. The record is installed only
//! while that ticket is still the current one, so an `unload` (or a newer
//! `load`) issued while the adapter call is in flight wins over it.
//!
//! Lifecycle operations return the spawned task's [`JoinHandle`]. Dropping
//! it detaches the task; awaiting it (tests, shutdown) waits for the I/O.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use progression_types::EntityId;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::adapter::PersistenceAdapter;
use crate::error::AdapterError;
use crate::persist::{self, PersistPolicy};

/// Outcome of a closure passed to [`WriteBackStore::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mutation<T> {
    /// Value handed back to the caller.
    pub value: T,
    /// Whether the record was modified and must be persisted.
    pub changed: bool,
}

impl<T> Mutation<T> {
    /// The record was modified.
    pub const fn changed(value: T) -> Self {
        Self {
            value,
            changed: true,
        }
    }

    /// The record was left as it was.
    pub const fn unchanged(value: T) -> Self {
        Self {
            value,
            changed: false,
        }
    }
}

/// In-memory records of one domain, written back through an adapter.
pub struct WriteBackStore<R> {
    domain: Arc<str>,
    records: Arc<DashMap<EntityId, R>>,
    /// Ticket of the newest load still allowed to install its record.
    pending_loads: Arc<DashMap<EntityId, u64>>,
    next_ticket: Arc<AtomicU64>,
    adapter: Arc<dyn PersistenceAdapter<R>>,
    policy: PersistPolicy,
    runtime: Handle,
}

impl<R> Clone for WriteBackStore<R> {
    fn clone(&self) -> Self {
        Self {
            domain: Arc::clone(&self.domain),
            records: Arc::clone(&self.records),
            pending_loads: Arc::clone(&self.pending_loads),
            next_ticket: Arc::clone(&self.next_ticket),
            adapter: Arc::clone(&self.adapter),
            policy: self.policy,
            runtime: self.runtime.clone(),
        }
    }
}

impl<R> core::fmt::Debug for WriteBackStore<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WriteBackStore")
            .field("domain", &self.domain)
            .field("loaded", &self.records.len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<R> WriteBackStore<R>
where
    R: Clone + Default + Send + Sync + 'static,
{
    /// Create a store that spawns its persistence tasks on `runtime`.
    pub fn new(
        domain: &str,
        adapter: Arc<dyn PersistenceAdapter<R>>,
        policy: PersistPolicy,
        runtime: Handle,
    ) -> Self {
        Self {
            domain: Arc::from(domain),
            records: Arc::new(DashMap::new()),
            pending_loads: Arc::new(DashMap::new()),
            next_ticket: Arc::new(AtomicU64::new(0)),
            adapter,
            policy,
            runtime,
        }
    }

    /// Create the adapter's schema, then a store bound to the current
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error if schema creation fails.
    pub async fn open(
        domain: &str,
        adapter: Arc<dyn PersistenceAdapter<R>>,
        policy: PersistPolicy,
    ) -> Result<Self, AdapterError> {
        adapter.create_schema().await?;
        Ok(Self::new(domain, adapter, policy, Handle::current()))
    }

    /// Tag of the data domain this store serves.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Whether `id` currently has an in-memory record.
    pub fn is_loaded(&self, id: EntityId) -> bool {
        self.records.contains_key(&id)
    }

    /// Number of entities currently cached.
    pub fn loaded_count(&self) -> usize {
        self.records.len()
    }

    /// Identifiers of every cached entity.
    pub fn loaded_ids(&self) -> Vec<EntityId> {
        self.records.iter().map(|entry| *entry.key()).collect()
    }

    // =========================================================================
    // Reads and mutations (caller's thread, no I/O)
    // =========================================================================

    /// Run `f` against the record of `id`, if cached.
    pub fn read<T>(&self, id: EntityId, f: impl FnOnce(&R) -> T) -> Option<T> {
        self.records.get(&id).map(|entry| f(entry.value()))
    }

    /// Copy of the record of `id`, if cached.
    pub fn snapshot(&self, id: EntityId) -> Option<R> {
        self.read(id, R::clone)
    }

    /// Mutate the record of `id` under its entry lock.
    ///
    /// Returns `None` if `id` is not cached. When `f` reports a change, one
    /// save is scheduled after the lock is released.
    pub fn update<T>(&self, id: EntityId, f: impl FnOnce(&mut R) -> Mutation<T>) -> Option<T> {
        let mutation = {
            let mut entry = self.records.get_mut(&id)?;
            f(entry.value_mut())
        };
        if mutation.changed {
            drop(self.save(id));
        }
        Some(mutation.value)
    }

    // =========================================================================
    // Lifecycle (spawned, never awaited by the caller)
    // =========================================================================

    /// Load `id` from the adapter and install it, replacing any cached
    /// record. An entity with no stored row starts from `R::default()`.
    pub fn load(&self, id: EntityId) -> JoinHandle<()> {
        self.load_with(id, |_| {})
    }

    /// Like [`load`](Self::load), running `init` on the record before it
    /// becomes visible.
    ///
    /// On adapter failure the error is logged and the map is left as it
    /// was, so reads keep returning defaults for a never-loaded entity. A
    /// load overtaken by [`unload`](Self::unload) or by a later load of the
    /// same entity discards its record.
    pub fn load_with(
        &self,
        id: EntityId,
        init: impl FnOnce(&mut R) + Send + 'static,
    ) -> JoinHandle<()> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        self.pending_loads.insert(id, ticket);
        let store = self.clone();
        self.runtime.spawn(async move {
            match store.adapter.load_one(id).await {
                Ok(found) => {
                    let fresh = found.is_none();
                    let mut record = found.unwrap_or_default();
                    init(&mut record);
                    if store.install(id, ticket, record) {
                        debug!(entity = %id, domain = %store.domain, fresh, "Loaded record");
                    } else {
                        debug!(entity = %id, domain = %store.domain, "Discarded superseded load");
                    }
                }
                Err(e) => {
                    store.pending_loads.remove_if(&id, |_, current| *current == ticket);
                    error!(
                        entity = %id,
                        domain = %store.domain,
                        error = %e,
                        "Failed to load record, entity stays uncached"
                    );
                }
            }
        })
    }

    /// Insert `record` if `ticket` is still the pending load of `id`.
    ///
    /// The pending entry stays locked across the insert; `unload` clears it
    /// before evicting, so the two cannot interleave.
    fn install(&self, id: EntityId, ticket: u64, record: R) -> bool {
        let entry = self.pending_loads.entry(id);
        match entry {
            Entry::Occupied(pending) if *pending.get() == ticket => {
                self.records.insert(id, record);
                pending.remove();
                true
            }
            _ => false,
        }
    }

    /// Persist the current record of `id`.
    ///
    /// The snapshot is taken when the task runs, so a save scheduled by an
    /// earlier mutation carries every mutation made before it ran.
    pub fn save(&self, id: EntityId) -> JoinHandle<()> {
        let store = self.clone();
        self.runtime.spawn(async move {
            let records = Arc::clone(&store.records);
            persist::save_entity(store.adapter.as_ref(), &store.domain, id, store.policy, || {
                records.get(&id).map(|entry| entry.value().clone())
            })
            .await;
        })
    }

    /// Persist a snapshot of every cached record in one batch.
    ///
    /// Used for periodic checkpoints and shutdown; await the handle to make
    /// sure the batch landed before the process exits.
    pub fn save_all(&self) -> JoinHandle<()> {
        let store = self.clone();
        self.runtime.spawn(async move {
            let records = Arc::clone(&store.records);
            persist::save_batch(store.adapter.as_ref(), &store.domain, store.policy, || {
                records
                    .iter()
                    .map(|entry| (*entry.key(), entry.value().clone()))
                    .collect()
            })
            .await;
        })
    }

    /// Evict `id` and persist its final state.
    ///
    /// The record is removed immediately, whether or not the save later
    /// succeeds; mutations issued after this call are no-ops. Saves already
    /// in flight for `id` are not cancelled; a load in flight for `id` is
    /// discarded when it completes.
    pub fn unload(&self, id: EntityId) -> JoinHandle<()> {
        self.pending_loads.remove(&id);
        let evicted = self.records.remove(&id).map(|(_, record)| record);
        let store = self.clone();
        self.runtime.spawn(async move {
            let Some(record) = evicted else {
                debug!(entity = %id, domain = %store.domain, "Unload of uncached entity");
                return;
            };
            persist::save_entity(store.adapter.as_ref(), &store.domain, id, store.policy, || {
                Some(record.clone())
            })
            .await;
            debug!(entity = %id, domain = %store.domain, "Unloaded record");
        })
    }
}
