//! Storage boundary consumed by the write-back cache.
//!
//! A [`PersistenceAdapter`] moves whole records between memory and a
//! durable store. The cache calls it only from background tasks, never
//! from the gameplay thread.
//!
//! Saves may reach the store in any order, so every implementation must
//! treat `save_one`/`save_all` as a full-row upsert of the record's current
//! fields, never as a delta. Whichever write lands last wins.

use async_trait::async_trait;
use progression_types::EntityId;

use crate::error::AdapterError;

/// Durable storage for one data domain.
#[async_trait]
pub trait PersistenceAdapter<R>: Send + Sync
where
    R: Send + Sync + 'static,
{
    /// Create the backing table (or equivalent) if it does not exist.
    ///
    /// Must be idempotent. Called once when a cache is opened.
    async fn create_schema(&self) -> Result<(), AdapterError>;

    /// Fetch the stored record of `id`, or `None` if there is no row.
    async fn load_one(&self, id: EntityId) -> Result<Option<R>, AdapterError>;

    /// Replace the stored record of `id` with `record`.
    async fn save_one(&self, id: EntityId, record: &R) -> Result<(), AdapterError>;

    /// Replace the stored records of every entity in `records`.
    ///
    /// Implementations may split the batch into chunks.
    async fn save_all(&self, records: &[(EntityId, R)]) -> Result<(), AdapterError>;
}
