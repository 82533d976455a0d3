//! Fixed-shape progression table.
//!
//! Every [`ProgressionRecord`] is stored as one row with typed columns.
//! Unsigned in-memory fields are stored in the next wider signed column
//! type and converted with saturation in both directions.

use async_trait::async_trait;
use progression_core::schema::validate_identifier;
use progression_core::{AdapterError, PersistenceAdapter};
use progression_types::{EntityId, ProgressionRecord, TraitLevels};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DbError;

/// Default number of rows per batch transaction.
const DEFAULT_BATCH_SIZE: usize = 500;

/// Column list shared by every statement, in bind order after `uuid`.
const COLUMNS: &str = "name, experience, bonus_experience, multiplier, level, luck, \
                       trait_points, talent_points, wisdom, charisma, karma, dexterity";

/// `PostgreSQL` adapter for progression records.
pub struct PgProgressionStore {
    pool: PgPool,
    table: String,
    batch_size: usize,
}

impl PgProgressionStore {
    /// Create a store for `table` on `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Schema`] if `table` is not a plain identifier.
    pub fn new(pool: PgPool, table: &str) -> Result<Self, DbError> {
        validate_identifier(table)?;
        Ok(Self {
            pool,
            table: table.to_owned(),
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Set the number of rows per batch transaction.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Name of the backing table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the progression table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the DDL fails.
    pub async fn ensure_table(&self) -> Result<(), DbError> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                uuid UUID PRIMARY KEY,
                name TEXT NOT NULL DEFAULT '',
                experience DOUBLE PRECISION NOT NULL DEFAULT 0,
                bonus_experience DOUBLE PRECISION NOT NULL DEFAULT 0,
                multiplier DOUBLE PRECISION NOT NULL DEFAULT 1,
                level BIGINT NOT NULL DEFAULT 1,
                luck BIGINT NOT NULL DEFAULT 0,
                trait_points BIGINT NOT NULL DEFAULT 0,
                talent_points BIGINT NOT NULL DEFAULT 0,
                wisdom BIGINT NOT NULL DEFAULT 0,
                charisma BIGINT NOT NULL DEFAULT 0,
                karma BIGINT NOT NULL DEFAULT 0,
                dexterity BIGINT NOT NULL DEFAULT 0,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            self.table
        ))
        .execute(&self.pool)
        .await?;

        tracing::info!(table = %self.table, "Ensured progression table");
        Ok(())
    }

    /// Fetch the record of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn fetch(&self, id: EntityId) -> Result<Option<ProgressionRecord>, DbError> {
        let row = sqlx::query_as::<_, ProgressionRow>(&format!(
            "SELECT uuid, {COLUMNS} FROM {} WHERE uuid = $1",
            self.table
        ))
        .bind(id.into_inner())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ProgressionRow::into_record))
    }

    /// Upsert the full row of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the upsert fails.
    pub async fn upsert(&self, id: EntityId, record: &ProgressionRecord) -> Result<(), DbError> {
        let row = ProgressionRow::from_record(id, record);
        sqlx::query(&format!(
            "INSERT INTO {} (uuid, {COLUMNS}, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, now())
             ON CONFLICT (uuid) DO UPDATE SET {}",
            self.table,
            conflict_updates()
        ))
        .bind(row.uuid)
        .bind(&row.name)
        .bind(row.experience)
        .bind(row.bonus_experience)
        .bind(row.multiplier)
        .bind(row.level)
        .bind(row.luck)
        .bind(row.trait_points)
        .bind(row.talent_points)
        .bind(row.wisdom)
        .bind(row.charisma)
        .bind(row.karma)
        .bind(row.dexterity)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upsert many records, one transaction per chunk of `batch_size`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if a chunk fails. Chunks committed
    /// before the failure stay committed.
    pub async fn upsert_batch(&self, records: &[(EntityId, ProgressionRecord)]) -> Result<(), DbError> {
        if records.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "INSERT INTO {} (uuid, {COLUMNS}, updated_at)
             SELECT *, now() FROM UNNEST(
                $1::UUID[], $2::TEXT[], $3::DOUBLE PRECISION[], $4::DOUBLE PRECISION[],
                $5::DOUBLE PRECISION[], $6::BIGINT[], $7::BIGINT[], $8::BIGINT[], $9::BIGINT[],
                $10::BIGINT[], $11::BIGINT[], $12::BIGINT[], $13::BIGINT[]
             )
             ON CONFLICT (uuid) DO UPDATE SET {}",
            self.table,
            conflict_updates()
        );

        for chunk in records.chunks(self.batch_size) {
            let mut tx = self.pool.begin().await?;

            let rows: Vec<ProgressionRow> = chunk
                .iter()
                .map(|(id, record)| ProgressionRow::from_record(*id, record))
                .collect();
            let column = |f: fn(&ProgressionRow) -> i64| rows.iter().map(f).collect::<Vec<_>>();
            let float = |f: fn(&ProgressionRow) -> f64| rows.iter().map(f).collect::<Vec<_>>();

            sqlx::query(&sql)
                .bind(rows.iter().map(|r| r.uuid).collect::<Vec<_>>())
                .bind(rows.iter().map(|r| r.name.clone()).collect::<Vec<_>>())
                .bind(float(|r| r.experience))
                .bind(float(|r| r.bonus_experience))
                .bind(float(|r| r.multiplier))
                .bind(column(|r| r.level))
                .bind(column(|r| r.luck))
                .bind(column(|r| r.trait_points))
                .bind(column(|r| r.talent_points))
                .bind(column(|r| r.wisdom))
                .bind(column(|r| r.charisma))
                .bind(column(|r| r.karma))
                .bind(column(|r| r.dexterity))
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
        }

        tracing::debug!(
            table = %self.table,
            count = records.len(),
            "Upserted progression rows (batch UNNEST)"
        );
        Ok(())
    }
}

#[async_trait]
impl PersistenceAdapter<ProgressionRecord> for PgProgressionStore {
    async fn create_schema(&self) -> Result<(), AdapterError> {
        Ok(self.ensure_table().await?)
    }

    async fn load_one(&self, id: EntityId) -> Result<Option<ProgressionRecord>, AdapterError> {
        Ok(self.fetch(id).await?)
    }

    async fn save_one(&self, id: EntityId, record: &ProgressionRecord) -> Result<(), AdapterError> {
        Ok(self.upsert(id, record).await?)
    }

    async fn save_all(&self, records: &[(EntityId, ProgressionRecord)]) -> Result<(), AdapterError> {
        Ok(self.upsert_batch(records).await?)
    }
}

fn conflict_updates() -> String {
    COLUMNS
        .split(',')
        .map(str::trim)
        .map(|column| format!("{column} = EXCLUDED.{column}"))
        .chain(std::iter::once("updated_at = EXCLUDED.updated_at".to_owned()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A row from a progression table.
///
/// Uses runtime types rather than compile-time checked types to
/// avoid requiring a live database during builds.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ProgressionRow {
    /// Entity primary key.
    pub uuid: Uuid,
    /// Display name.
    pub name: String,
    /// Accumulated experience.
    pub experience: f64,
    /// Remaining bonus experience.
    pub bonus_experience: f64,
    /// Experience multiplier.
    pub multiplier: f64,
    /// Current level.
    pub level: i64,
    /// Luck.
    pub luck: i64,
    /// Spendable trait points.
    pub trait_points: i64,
    /// Spendable talent points.
    pub talent_points: i64,
    /// Wisdom level.
    pub wisdom: i64,
    /// Charisma level.
    pub charisma: i64,
    /// Karma level.
    pub karma: i64,
    /// Dexterity level.
    pub dexterity: i64,
}

impl ProgressionRow {
    /// Build the row written for `record`.
    pub fn from_record(id: EntityId, record: &ProgressionRecord) -> Self {
        Self {
            uuid: id.into_inner(),
            name: record.name.clone(),
            experience: record.experience,
            bonus_experience: record.bonus_experience,
            multiplier: record.multiplier,
            level: i64::from(record.level),
            luck: to_bigint(record.luck),
            trait_points: to_bigint(record.trait_points),
            talent_points: to_bigint(record.talent_points),
            wisdom: i64::from(record.traits.wisdom),
            charisma: i64::from(record.traits.charisma),
            karma: i64::from(record.traits.karma),
            dexterity: i64::from(record.traits.dexterity),
        }
    }

    /// Turn the row back into an in-memory record.
    ///
    /// Out-of-range columns saturate; negative values read as zero.
    pub fn into_record(self) -> ProgressionRecord {
        ProgressionRecord {
            name: self.name,
            experience: self.experience.max(0.0),
            bonus_experience: self.bonus_experience.max(0.0),
            multiplier: self.multiplier.max(0.0),
            level: to_u32(self.level).max(ProgressionRecord::STARTING_LEVEL),
            luck: to_u64(self.luck),
            trait_points: to_u64(self.trait_points),
            talent_points: to_u64(self.talent_points),
            traits: TraitLevels {
                wisdom: to_u32(self.wisdom),
                charisma: to_u32(self.charisma),
                karma: to_u32(self.karma),
                dexterity: to_u32(self.dexterity),
            },
        }
    }
}

fn to_bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_u32(value: i64) -> u32 {
    if value < 0 {
        0
    } else {
        u32::try_from(value).unwrap_or(u32::MAX)
    }
}
