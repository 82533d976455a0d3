//! Dynamic-schema counter tables.
//!
//! One table per keyed domain, one row per entity:
//!
//! | Column | Type |
//! |--------|------|
//! | `uuid` | `UUID PRIMARY KEY` |
//! | one per schema key | `BIGINT NOT NULL DEFAULT 0` |
//! | `updated_at` | `TIMESTAMPTZ` |
//!
//! Saves are full-row upserts, so writing the same record twice leaves the
//! row as if it had been written once. Table and column names come from a
//! validated [`Schema`], which is what makes interpolating them safe; all
//! values are bound parameters.

use std::marker::PhantomData;

use async_trait::async_trait;
use progression_core::{AdapterError, ClampValue, KeyedRecord, PersistenceAdapter, Schema};
use progression_types::EntityId;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::DbError;

/// Default number of rows per batch transaction.
const DEFAULT_BATCH_SIZE: usize = 500;

/// Counter value storable in a `BIGINT` column.
///
/// Conversions saturate instead of failing.
pub trait BigIntValue: ClampValue + Default {
    /// Value to write.
    fn to_column(self) -> i64;
    /// Value read back.
    fn from_column(value: i64) -> Self;
}

macro_rules! impl_bigint_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl BigIntValue for $ty {
                fn to_column(self) -> i64 {
                    i64::try_from(self).unwrap_or(i64::MAX)
                }

                fn from_column(value: i64) -> Self {
                    <$ty>::try_from(value).unwrap_or(if value < 0 { <$ty>::MIN } else { <$ty>::MAX })
                }
            }
        )*
    };
}

impl_bigint_value!(i32, i64, u32, u64);

/// `PostgreSQL` adapter for one keyed domain.
pub struct PgKeyedStore<V> {
    pool: PgPool,
    schema: Schema,
    batch_size: usize,
    select_sql: String,
    upsert_sql: String,
    batch_sql: String,
    _value: PhantomData<fn() -> V>,
}

impl<V: BigIntValue> PgKeyedStore<V> {
    /// Create a store for `schema` on `pool`.
    pub fn new(pool: PgPool, schema: Schema) -> Self {
        Self {
            select_sql: select_sql(&schema),
            upsert_sql: upsert_sql(&schema),
            batch_sql: batch_sql(&schema),
            pool,
            schema,
            batch_size: DEFAULT_BATCH_SIZE,
            _value: PhantomData,
        }
    }

    /// Set the number of rows per batch transaction.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// The domain's schema.
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Create the table and add any column the schema declares but the
    /// table lacks. Existing data is never dropped.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if a DDL statement fails.
    pub async fn ensure_table(&self) -> Result<(), DbError> {
        let table = self.schema.table_name();
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                uuid UUID PRIMARY KEY,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"
        ))
        .execute(&self.pool)
        .await?;

        for key in self.schema.keys() {
            sqlx::query(&format!(
                "ALTER TABLE {table} ADD COLUMN IF NOT EXISTS {key} BIGINT NOT NULL DEFAULT 0"
            ))
            .execute(&self.pool)
            .await?;
        }

        tracing::info!(table, columns = self.schema.len(), "Ensured keyed table");
        Ok(())
    }

    /// Fetch the row of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn fetch(&self, id: EntityId) -> Result<Option<KeyedRecord<V>>, DbError> {
        let row = sqlx::query(&self.select_sql)
            .bind(id.into_inner())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut record = KeyedRecord::new();
        for key in self.schema.keys() {
            let value: i64 = row.try_get(key.as_str())?;
            record.insert(key.clone(), V::from_column(value));
        }
        Ok(Some(record))
    }

    /// Upsert the full row of `id`. Keys missing from `record` are written
    /// as zero.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the upsert fails.
    pub async fn upsert(&self, id: EntityId, record: &KeyedRecord<V>) -> Result<(), DbError> {
        let mut query = sqlx::query(&self.upsert_sql).bind(id.into_inner());
        for key in self.schema.keys() {
            query = query.bind(column_value(record, key));
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    /// Upsert many rows, one transaction per chunk of `batch_size`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if a chunk fails. Chunks committed
    /// before the failure stay committed.
    pub async fn upsert_batch(&self, records: &[(EntityId, KeyedRecord<V>)]) -> Result<(), DbError> {
        if records.is_empty() {
            return Ok(());
        }

        for chunk in records.chunks(self.batch_size) {
            let mut tx = self.pool.begin().await?;

            let ids: Vec<Uuid> = chunk.iter().map(|(id, _)| id.into_inner()).collect();
            let columns: Vec<Vec<i64>> = self
                .schema
                .keys()
                .iter()
                .map(|key| chunk.iter().map(|(_, record)| column_value(record, key)).collect())
                .collect();

            let mut query = sqlx::query(&self.batch_sql).bind(&ids);
            for column in &columns {
                query = query.bind(column);
            }
            query.execute(&mut *tx).await?;

            tx.commit().await?;
        }

        tracing::debug!(
            table = self.schema.table_name(),
            count = records.len(),
            "Upserted keyed rows (batch UNNEST)"
        );
        Ok(())
    }
}

#[async_trait]
impl<V: BigIntValue> PersistenceAdapter<KeyedRecord<V>> for PgKeyedStore<V> {
    async fn create_schema(&self) -> Result<(), AdapterError> {
        Ok(self.ensure_table().await?)
    }

    async fn load_one(&self, id: EntityId) -> Result<Option<KeyedRecord<V>>, AdapterError> {
        Ok(self.fetch(id).await?)
    }

    async fn save_one(&self, id: EntityId, record: &KeyedRecord<V>) -> Result<(), AdapterError> {
        Ok(self.upsert(id, record).await?)
    }

    async fn save_all(&self, records: &[(EntityId, KeyedRecord<V>)]) -> Result<(), AdapterError> {
        Ok(self.upsert_batch(records).await?)
    }
}

fn column_value<V: BigIntValue>(record: &KeyedRecord<V>, key: &str) -> i64 {
    record.get(key).copied().unwrap_or_default().to_column()
}

fn column_list(schema: &Schema) -> String {
    schema.keys().join(", ")
}

fn conflict_updates(schema: &Schema) -> String {
    schema
        .keys()
        .iter()
        .map(|key| format!("{key} = EXCLUDED.{key}"))
        .chain(std::iter::once("updated_at = EXCLUDED.updated_at".to_owned()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn select_sql(schema: &Schema) -> String {
    format!(
        "SELECT {} FROM {} WHERE uuid = $1",
        column_list(schema),
        schema.table_name()
    )
}

fn upsert_sql(schema: &Schema) -> String {
    let placeholders = (2..=schema.len().saturating_add(1))
        .map(|n| format!("${n}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {table} (uuid, {columns}, updated_at) VALUES ($1, {placeholders}, now()) \
         ON CONFLICT (uuid) DO UPDATE SET {updates}",
        table = schema.table_name(),
        columns = column_list(schema),
        updates = conflict_updates(schema),
    )
}

fn batch_sql(schema: &Schema) -> String {
    let arrays = (2..=schema.len().saturating_add(1))
        .map(|n| format!("${n}::BIGINT[]"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {table} (uuid, {columns}, updated_at) \
         SELECT *, now() FROM UNNEST($1::UUID[], {arrays}) \
         ON CONFLICT (uuid) DO UPDATE SET {updates}",
        table = schema.table_name(),
        columns = column_list(schema),
        updates = conflict_updates(schema),
    )
}
