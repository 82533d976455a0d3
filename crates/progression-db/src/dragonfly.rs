//! `Dragonfly` (Redis-compatible) record storage.
//!
//! An alternative backend for deployments that keep progression in
//! `Dragonfly` instead of `PostgreSQL`. Every record is one JSON string.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `progress:{table}:{uuid}` | JSON | Full record of one entity in one domain |

use std::marker::PhantomData;

use async_trait::async_trait;
use fred::prelude::*;
use progression_core::schema::validate_identifier;
use progression_core::{AdapterError, PersistenceAdapter};
use progression_types::EntityId;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DbError;

/// Default number of keys per `MSET`.
const DEFAULT_BATCH_SIZE: usize = 500;

/// Connection handle to a `Dragonfly` (Redis-compatible) instance.
#[derive(Clone)]
pub struct DragonflyPool {
    client: Client,
}

impl DragonflyPool {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    /// Serialize `value` as JSON and store it at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if serialization fails.
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), DbError> {
        let json = serde_json::to_string(value)?;
        let _: () = self.client.set(key, json.as_str(), None, None, false).await?;
        Ok(())
    }

    /// Serialize every value as JSON and store all of them with one `MSET`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if serialization fails.
    /// Returns [`DbError::Dragonfly`] if the write fails.
    pub async fn mset_json<T: Serialize>(&self, entries: &[(String, T)]) -> Result<(), DbError> {
        if entries.is_empty() {
            return Ok(());
        }
        let pairs = entries
            .iter()
            .map(|(key, value)| Ok((key.clone(), serde_json::to_string(value)?)))
            .collect::<Result<Vec<(String, String)>, serde_json::Error>>()?;
        let _: () = self.client.mset(pairs).await?;
        Ok(())
    }

    /// Read the value at `key` and deserialize from JSON.
    ///
    /// Returns `None` if the key does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if deserialization fails.
    /// Returns [`DbError::Dragonfly`] if the read fails.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DbError> {
        let value: Option<String> = self.client.get(key).await?;
        value
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(DbError::from)
    }

    /// Delete a key from `Dragonfly`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Dragonfly`] if the delete fails.
    pub async fn delete(&self, key: &str) -> Result<(), DbError> {
        let _: u32 = self.client.del(key).await?;
        Ok(())
    }

    /// Return a reference to the underlying [`Client`].
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

/// Key of one entity's record in one table.
pub fn record_key(table: &str, id: EntityId) -> String {
    format!("progress:{table}:{id}")
}

/// `Dragonfly` adapter storing records of type `R` as JSON.
pub struct DragonflyStore<R> {
    pool: DragonflyPool,
    table: String,
    batch_size: usize,
    _record: PhantomData<fn() -> R>,
}

impl<R> DragonflyStore<R>
where
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create a store whose keys live under `progress:{table}:`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Schema`] if `table` is not a plain identifier.
    pub fn new(pool: DragonflyPool, table: &str) -> Result<Self, DbError> {
        validate_identifier(table)?;
        Ok(Self {
            pool,
            table: table.to_owned(),
            batch_size: DEFAULT_BATCH_SIZE,
            _record: PhantomData,
        })
    }

    /// Set the number of keys per `MSET`.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Key of `id`'s record.
    pub fn key(&self, id: EntityId) -> String {
        record_key(&self.table, id)
    }

    /// Fetch the record of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the read or decode fails.
    pub async fn fetch(&self, id: EntityId) -> Result<Option<R>, DbError> {
        self.pool.get_json(&self.key(id)).await
    }

    /// Store many records, one `MSET` per chunk of `batch_size`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or a write fails.
    pub async fn store_batch(&self, records: &[(EntityId, R)]) -> Result<(), DbError> {
        for chunk in records.chunks(self.batch_size) {
            let entries: Vec<(String, &R)> = chunk
                .iter()
                .map(|(id, record)| (self.key(*id), record))
                .collect();
            self.pool.mset_json(&entries).await?;
        }
        tracing::debug!(table = %self.table, count = records.len(), "Stored records in Dragonfly");
        Ok(())
    }
}

#[async_trait]
impl<R> PersistenceAdapter<R> for DragonflyStore<R>
where
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn create_schema(&self) -> Result<(), AdapterError> {
        tracing::debug!(table = %self.table, "Dragonfly needs no schema");
        Ok(())
    }

    async fn load_one(&self, id: EntityId) -> Result<Option<R>, AdapterError> {
        Ok(self.fetch(id).await?)
    }

    async fn save_one(&self, id: EntityId, record: &R) -> Result<(), AdapterError> {
        Ok(self.pool.set_json(&self.key(id), record).await?)
    }

    async fn save_all(&self, records: &[(EntityId, R)]) -> Result<(), AdapterError> {
        Ok(self.store_batch(records).await?)
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn record_key_embeds_table_and_uuid() {
        let id = EntityId::from(Uuid::nil());
        assert_eq!(
            record_key("player_counters", id),
            "progress:player_counters:00000000-0000-0000-0000-000000000000"
        );
    }
}
