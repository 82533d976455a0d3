//! Write-back cache for schema-declared counter domains.
//!
//! A [`KeyedDataCache`] maps `(entity, key)` to a number for one domain
//! (named counters, tiered component counts, ...). The set of keys is fixed
//! by the domain's [`Schema`]; unknown keys are ignored on write and read as
//! zero. Each domain is a thin instantiation of the same cache with its own
//! schema and adapter.
//!
//! Values never go below zero and are unbounded above.

use std::collections::BTreeMap;
use std::sync::Arc;

use progression_types::{EntityId, UpdateType};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::adapter::PersistenceAdapter;
use crate::clamp::{self, Bounds, ClampValue};
use crate::error::{AdapterError, CacheError};
use crate::persist::PersistPolicy;
use crate::schema::Schema;
use crate::store::{Mutation, WriteBackStore};

/// Per-entity record of a keyed domain.
pub type KeyedRecord<V> = BTreeMap<String, V>;

/// Write-back cache of one keyed data domain.
pub struct KeyedDataCache<V> {
    store: WriteBackStore<KeyedRecord<V>>,
    schema: Arc<Schema>,
}

impl<V> Clone for KeyedDataCache<V> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            schema: Arc::clone(&self.schema),
        }
    }
}

impl<V> core::fmt::Debug for KeyedDataCache<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeyedDataCache")
            .field("schema", &self.schema)
            .field("store", &self.store)
            .finish()
    }
}

impl<V> KeyedDataCache<V>
where
    V: ClampValue + Default,
{
    /// Create a cache for `schema` whose saves run on `runtime`.
    ///
    /// The domain tag is the schema's table name.
    pub fn new(
        schema: Schema,
        adapter: Arc<dyn PersistenceAdapter<KeyedRecord<V>>>,
        policy: PersistPolicy,
        runtime: Handle,
    ) -> Self {
        let store = WriteBackStore::new(schema.table_name(), adapter, policy, runtime);
        Self {
            store,
            schema: Arc::new(schema),
        }
    }

    /// Create the backing table, then a cache bound to the current runtime.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error if schema creation fails.
    pub async fn open(
        schema: Schema,
        adapter: Arc<dyn PersistenceAdapter<KeyedRecord<V>>>,
        policy: PersistPolicy,
    ) -> Result<Self, AdapterError> {
        let store = WriteBackStore::open(schema.table_name(), adapter, policy).await?;
        Ok(Self {
            store,
            schema: Arc::new(schema),
        })
    }

    /// The domain's schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Tag of the data domain (the table name).
    pub fn domain(&self) -> &str {
        self.store.domain()
    }

    /// Whether `id` is cached.
    pub fn is_loaded(&self, id: EntityId) -> bool {
        self.store.is_loaded(id)
    }

    /// Number of cached entities.
    pub fn loaded_count(&self) -> usize {
        self.store.loaded_count()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load `id` in the background. Stored keys the schema no longer
    /// declares are dropped.
    pub fn load(&self, id: EntityId) -> JoinHandle<()> {
        let schema = Arc::clone(&self.schema);
        self.store
            .load_with(id, move |record| record.retain(|key, _| schema.contains(key)))
    }

    /// Persist `id` in the background.
    pub fn save(&self, id: EntityId) -> JoinHandle<()> {
        self.store.save(id)
    }

    /// Persist every cached entity in one background batch.
    pub fn save_all(&self) -> JoinHandle<()> {
        self.store.save_all()
    }

    /// Evict `id` and persist its final state in the background.
    pub fn unload(&self, id: EntityId) -> JoinHandle<()> {
        self.store.unload(id)
    }

    // =========================================================================
    // Strict API
    // =========================================================================

    /// Cached value of `key`.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidKey`] if the schema does not declare `key`,
    /// [`CacheError::NotLoaded`] if `id` is not cached.
    pub fn try_get(&self, id: EntityId, key: &str) -> Result<V, CacheError> {
        self.check_key(key)?;
        self.store
            .read(id, |record| record.get(key).copied().unwrap_or(V::ZERO))
            .ok_or_else(|| self.not_loaded(id))
    }

    /// Apply `update` with `amount` to `key` and return the resulting value.
    ///
    /// A non-positive `Add`/`Subtract` amount changes nothing and returns
    /// the current value.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidKey`] if the schema does not declare `key`,
    /// [`CacheError::NotLoaded`] if `id` is not cached.
    pub fn try_update(
        &self,
        id: EntityId,
        key: &str,
        update: UpdateType,
        amount: V,
    ) -> Result<V, CacheError> {
        self.check_key(key)?;
        self.store
            .update(id, |record| {
                let current = record.get(key).copied().unwrap_or(V::ZERO);
                match clamp::apply(update, current, amount, Bounds::non_negative()) {
                    Some(value) => {
                        record.insert(key.to_owned(), value);
                        Mutation::changed(value)
                    }
                    None => Mutation::unchanged(current),
                }
            })
            .ok_or_else(|| self.not_loaded(id))
    }

    /// Strict [`add`](Self::add).
    ///
    /// # Errors
    ///
    /// See [`try_update`](Self::try_update).
    pub fn try_add(&self, id: EntityId, key: &str, amount: V) -> Result<V, CacheError> {
        self.try_update(id, key, UpdateType::Add, amount)
    }

    /// Strict [`subtract`](Self::subtract).
    ///
    /// # Errors
    ///
    /// See [`try_update`](Self::try_update).
    pub fn try_subtract(&self, id: EntityId, key: &str, amount: V) -> Result<V, CacheError> {
        self.try_update(id, key, UpdateType::Subtract, amount)
    }

    /// Strict [`set`](Self::set).
    ///
    /// # Errors
    ///
    /// See [`try_update`](Self::try_update).
    pub fn try_set(&self, id: EntityId, key: &str, amount: V) -> Result<V, CacheError> {
        self.try_update(id, key, UpdateType::Set, amount)
    }

    // =========================================================================
    // Permissive API
    // =========================================================================

    /// Cached value of `key`, or zero if unknown or not loaded.
    pub fn get(&self, id: EntityId, key: &str) -> V {
        self.try_get(id, key).unwrap_or(V::ZERO)
    }

    /// Copy of the whole record of `id`, or an empty map if not loaded.
    pub fn get_all(&self, id: EntityId) -> KeyedRecord<V> {
        self.store.snapshot(id).unwrap_or_default()
    }

    /// Increase `key` by `amount`.
    pub fn add(&self, id: EntityId, key: &str, amount: V) -> V {
        self.try_add(id, key, amount).unwrap_or(V::ZERO)
    }

    /// Decrease `key` by `amount`, never below zero.
    pub fn subtract(&self, id: EntityId, key: &str, amount: V) -> V {
        self.try_subtract(id, key, amount).unwrap_or(V::ZERO)
    }

    /// Replace `key` with `amount`, clamped at zero.
    pub fn set(&self, id: EntityId, key: &str, amount: V) -> V {
        self.try_set(id, key, amount).unwrap_or(V::ZERO)
    }

    /// Increase `key` by one.
    pub fn increment(&self, id: EntityId, key: &str) -> V {
        self.add(id, key, V::ONE)
    }

    /// Decrease `key` by one.
    pub fn decrement(&self, id: EntityId, key: &str) -> V {
        self.subtract(id, key, V::ONE)
    }

    fn check_key(&self, key: &str) -> Result<(), CacheError> {
        if self.schema.contains(key) {
            Ok(())
        } else {
            Err(CacheError::InvalidKey {
                key: key.to_owned(),
                domain: self.domain().to_owned(),
            })
        }
    }

    fn not_loaded(&self, id: EntityId) -> CacheError {
        CacheError::NotLoaded {
            entity: id,
            domain: self.domain().to_owned(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::memory::MemoryAdapter;

    type Counters = KeyedDataCache<i64>;

    fn setup() -> (Counters, Arc<MemoryAdapter<KeyedRecord<i64>>>) {
        let adapter = Arc::new(MemoryAdapter::new());
        let schema = Schema::new("player_counters", ["kills", "deaths"]).unwrap();
        let dyn_adapter: Arc<dyn PersistenceAdapter<KeyedRecord<i64>>> = Arc::clone(&adapter) as _;
        let cache = KeyedDataCache::new(schema, dyn_adapter, PersistPolicy::default(), Handle::current());
        (cache, adapter)
    }

    #[tokio::test]
    async fn mutations_on_unloaded_entity_are_noops() {
        let (cache, adapter) = setup();
        let id = EntityId::new();
        assert_eq!(cache.add(id, "kills", 5), 0);
        assert_eq!(cache.get(id, "kills"), 0);
        assert!(cache.get_all(id).is_empty());
        assert!(matches!(cache.try_add(id, "kills", 1), Err(CacheError::NotLoaded { .. })));
        assert_eq!(adapter.save_calls(), 0);
    }

    #[tokio::test]
    async fn invalid_key_is_ignored() {
        let (cache, _) = setup();
        let id = EntityId::new();
        cache.load(id).await.unwrap();
        cache.set(id, "kills", 3);

        let before = cache.get_all(id);
        assert_eq!(cache.add(id, "assists", 10), 0);
        assert_eq!(cache.get(id, "assists"), 0);
        assert_eq!(cache.get_all(id), before);
        assert!(matches!(cache.try_get(id, "assists"), Err(CacheError::InvalidKey { .. })));
    }

    #[tokio::test]
    async fn counters_never_go_negative() {
        let (cache, _) = setup();
        let id = EntityId::new();
        cache.load(id).await.unwrap();
        assert_eq!(cache.add(id, "deaths", 2), 2);
        assert_eq!(cache.subtract(id, "deaths", 5), 0);
        assert_eq!(cache.set(id, "deaths", -7), 0);
        assert_eq!(cache.decrement(id, "deaths"), 0);
        assert_eq!(cache.increment(id, "deaths"), 1);
    }

    #[tokio::test]
    async fn non_positive_amount_returns_current_value() {
        let (cache, adapter) = setup();
        let id = EntityId::new();
        cache.load(id).await.unwrap();
        cache.set(id, "kills", 4);
        cache.save(id).await.unwrap();
        let calls = adapter.save_calls();

        assert_eq!(cache.try_add(id, "kills", 0), Ok(4));
        assert_eq!(cache.try_subtract(id, "kills", -2), Ok(4));
        cache.save_all().await.unwrap();
        assert_eq!(adapter.save_calls(), calls);
    }

    #[tokio::test]
    async fn unload_flushes_to_store() {
        let (cache, adapter) = setup();
        let id = EntityId::new();
        cache.load(id).await.unwrap();
        cache.set(id, "kills", 5);
        cache.unload(id).await.unwrap();
        assert!(!cache.is_loaded(id));

        // A cold cache over the same store sees the flushed value.
        let dyn_adapter: Arc<dyn PersistenceAdapter<KeyedRecord<i64>>> = Arc::clone(&adapter) as _;
        let cold = KeyedDataCache::new(
            cache.schema().clone(),
            dyn_adapter,
            PersistPolicy::default(),
            Handle::current(),
        );
        cold.load(id).await.unwrap();
        assert_eq!(cold.get(id, "kills"), 5);
    }

    #[tokio::test]
    async fn load_drops_undeclared_keys() {
        let (cache, adapter) = setup();
        let id = EntityId::new();
        adapter.insert(
            id,
            BTreeMap::from([("kills".to_owned(), 3), ("legacy".to_owned(), 9)]),
        );
        cache.load(id).await.unwrap();
        assert_eq!(cache.get_all(id), BTreeMap::from([("kills".to_owned(), 3)]));
    }

    #[tokio::test]
    async fn open_runs_create_schema() {
        let adapter = Arc::new(MemoryAdapter::<KeyedRecord<u32>>::new());
        let schema = Schema::new("tiers", ["common", "rare", "epic"]).unwrap();
        let dyn_adapter: Arc<dyn PersistenceAdapter<KeyedRecord<u32>>> = Arc::clone(&adapter) as _;
        let cache = KeyedDataCache::open(schema, dyn_adapter, PersistPolicy::default()).await;
        assert!(cache.is_ok());
        assert!(adapter.schema_created());
        assert_eq!(cache.unwrap().domain(), "tiers");
    }
}
