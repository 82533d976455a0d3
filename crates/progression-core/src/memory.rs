//! In-process [`PersistenceAdapter`] backed by a map.
//!
//! Used by the `memory` backend of the server (nothing survives a restart)
//! and by tests, which rely on its failure injection and call counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use progression_types::EntityId;

use crate::adapter::PersistenceAdapter;
use crate::error::AdapterError;

/// Map-backed adapter with failure injection.
#[derive(Debug)]
pub struct MemoryAdapter<R> {
    rows: Mutex<BTreeMap<EntityId, R>>,
    schema_created: AtomicBool,
    fail_loads: AtomicBool,
    failing_saves: AtomicU32,
    save_delay_ms: AtomicU64,
    load_delay_ms: AtomicU64,
    save_calls: AtomicU64,
    batch_calls: AtomicU64,
}

impl<R: Clone> MemoryAdapter<R> {
    /// Create an empty adapter.
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            schema_created: AtomicBool::new(false),
            fail_loads: AtomicBool::new(false),
            failing_saves: AtomicU32::new(0),
            save_delay_ms: AtomicU64::new(0),
            load_delay_ms: AtomicU64::new(0),
            save_calls: AtomicU64::new(0),
            batch_calls: AtomicU64::new(0),
        }
    }

    /// Store `record` for `id` directly, bypassing the counters.
    pub fn insert(&self, id: EntityId, record: R) {
        self.lock().insert(id, record);
    }

    /// The record currently stored for `id`.
    pub fn stored(&self, id: EntityId) -> Option<R> {
        self.lock().get(&id).cloned()
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no row is stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Make the next `count` save attempts (single or batch) fail.
    pub fn fail_next_saves(&self, count: u32) {
        self.failing_saves.store(count, Ordering::Release);
    }

    /// Make every load fail until switched off again.
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::Release);
    }

    /// Delay every save by `delay` before it touches the map.
    pub fn set_save_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.save_delay_ms.store(millis, Ordering::Release);
    }

    /// Delay every load by `delay` before it reads the map.
    pub fn set_load_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.load_delay_ms.store(millis, Ordering::Release);
    }

    /// Number of `save_one` calls, including failed ones.
    pub fn save_calls(&self) -> u64 {
        self.save_calls.load(Ordering::Acquire)
    }

    /// Number of `save_all` calls, including failed ones.
    pub fn batch_calls(&self) -> u64 {
        self.batch_calls.load(Ordering::Acquire)
    }

    /// Whether `create_schema` has been called.
    pub fn schema_created(&self) -> bool {
        self.schema_created.load(Ordering::Acquire)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<EntityId, R>> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume one injected save failure, if any is pending.
    fn take_injected_failure(&self) -> bool {
        self.failing_saves
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn simulate_latency(&self) {
        Self::sleep_ms(self.save_delay_ms.load(Ordering::Acquire)).await;
    }

    async fn sleep_ms(millis: u64) {
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}

impl<R: Clone> Default for MemoryAdapter<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R> PersistenceAdapter<R> for MemoryAdapter<R>
where
    R: Clone + Send + Sync + 'static,
{
    async fn create_schema(&self) -> Result<(), AdapterError> {
        self.schema_created.store(true, Ordering::Release);
        Ok(())
    }

    async fn load_one(&self, id: EntityId) -> Result<Option<R>, AdapterError> {
        Self::sleep_ms(self.load_delay_ms.load(Ordering::Acquire)).await;
        if self.fail_loads.load(Ordering::Acquire) {
            return Err(AdapterError::Unavailable(format!("injected load failure for {id}")));
        }
        Ok(self.stored(id))
    }

    async fn save_one(&self, id: EntityId, record: &R) -> Result<(), AdapterError> {
        self.save_calls.fetch_add(1, Ordering::AcqRel);
        self.simulate_latency().await;
        if self.take_injected_failure() {
            return Err(AdapterError::Unavailable(format!("injected save failure for {id}")));
        }
        self.lock().insert(id, record.clone());
        Ok(())
    }

    async fn save_all(&self, records: &[(EntityId, R)]) -> Result<(), AdapterError> {
        self.batch_calls.fetch_add(1, Ordering::AcqRel);
        self.simulate_latency().await;
        if self.take_injected_failure() {
            return Err(AdapterError::Unavailable(format!(
                "injected batch failure for {} records",
                records.len()
            )));
        }
        let mut rows = self.lock();
        for (id, record) in records {
            rows.insert(*id, record.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_roundtrip() {
        let adapter = MemoryAdapter::<u32>::new();
        let id = EntityId::new();
        adapter.save_one(id, &7).await.unwrap();
        adapter.save_one(id, &7).await.unwrap();
        assert_eq!(adapter.load_one(id).await.unwrap(), Some(7));
        assert_eq!(adapter.len(), 1);
        assert_eq!(adapter.save_calls(), 2);
    }

    #[tokio::test]
    async fn missing_row_loads_as_none() {
        let adapter = MemoryAdapter::<u32>::new();
        assert_eq!(adapter.load_one(EntityId::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let adapter = MemoryAdapter::<u32>::new();
        let id = EntityId::new();
        adapter.fail_next_saves(1);
        assert!(adapter.save_one(id, &1).await.is_err());
        assert!(adapter.save_one(id, &2).await.is_ok());
        assert_eq!(adapter.stored(id), Some(2));
    }

    #[tokio::test]
    async fn load_failure_switch() {
        let adapter = MemoryAdapter::<u32>::new();
        adapter.set_fail_loads(true);
        assert!(adapter.load_one(EntityId::new()).await.is_err());
        adapter.set_fail_loads(false);
        assert!(adapter.load_one(EntityId::new()).await.is_ok());
    }
}
