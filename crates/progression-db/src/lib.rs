//! Persistence adapters for the progression store (`PostgreSQL` + `Dragonfly`).
//!
//! Every adapter implements [`progression_core::PersistenceAdapter`] for one
//! record type and one table. Adapters are shared behind an `Arc` by the
//! write-back caches and called only from background tasks, never from the
//! gameplay thread.
//!
//! # Architecture
//!
//! ```text
//! WriteBackStore (tokio task)
//!     |
//!     +-- PgKeyedStore<V>      one BIGINT column per schema key
//!     +-- PgProgressionStore   fixed typed progression columns
//!     +-- DragonflyStore<R>    progress:{table}:{uuid} -> JSON
//! ```
//!
//! # Modules
//!
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) connection and JSON store
//! - [`postgres`] -- `PostgreSQL` connection pool
//! - [`keyed_store`] -- Dynamic-schema counter tables
//! - [`progression_store`] -- Fixed-shape progression table
//! - [`error`] -- Shared error types

pub mod dragonfly;
pub mod error;
pub mod keyed_store;
pub mod postgres;
pub mod progression_store;

// Re-export primary types for convenience.
pub use dragonfly::{DragonflyPool, DragonflyStore};
pub use error::DbError;
pub use keyed_store::{BigIntValue, PgKeyedStore};
pub use postgres::PostgresPool;
pub use progression_store::{PgProgressionStore, ProgressionRow};
