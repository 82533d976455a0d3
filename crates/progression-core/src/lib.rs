//! Write-back progression cache and leveling state machine.
//!
//! This crate owns the in-memory side of the progression store: every read
//! and mutation issued by the game's critical thread is served from a
//! concurrent per-entity map, and every change is persisted afterwards on a
//! tokio worker through a [`PersistenceAdapter`].
//!
//! # Architecture
//!
//! ```text
//! gameplay (critical thread)
//!     |
//!     +-- get / add / set ------> KeyedDataCache<V>  --+
//!     +-- update_experience ----> ProgressionEngine  --+--> WriteBackStore<R>
//!                                     |                        |
//!                                     +-- leveling::advance    +-- spawn save --> PersistenceAdapter
//!                                     +-- LevelTransitionNotifier
//! ```
//!
//! # Modules
//!
//! - [`adapter`] -- [`PersistenceAdapter`] storage boundary
//! - [`clamp`] -- Add/subtract/set semantics with per-field bounds
//! - [`config`] -- YAML configuration into strongly-typed structs
//! - [`engine`] -- [`ProgressionEngine`] typed mutators and level-ups
//! - [`error`] -- Cache and adapter error types
//! - [`keyed`] -- [`KeyedDataCache`] for schema-declared counter domains
//! - [`leveling`] -- Leveling rules and the transition loop
//! - [`memory`] -- In-process [`MemoryAdapter`]
//! - [`notifier`] -- [`LevelTransitionNotifier`] boundary and implementations
//! - [`persist`] -- Retry policy for background saves
//! - [`schema`] -- Declared key sets per data domain
//! - [`store`] -- [`WriteBackStore`] shared write-back plumbing
//! - [`tables`] -- Experience and point reward tables

pub mod adapter;
pub mod clamp;
pub mod config;
pub mod engine;
pub mod error;
pub mod keyed;
pub mod leveling;
pub mod memory;
pub mod notifier;
pub mod persist;
pub mod schema;
pub mod store;
pub mod tables;

// Re-export primary types for convenience.
pub use adapter::PersistenceAdapter;
pub use clamp::{Bounds, ClampValue};
pub use config::{ConfigError, ProgressionConfig};
pub use engine::ProgressionEngine;
pub use error::{AdapterError, CacheError};
pub use keyed::{KeyedDataCache, KeyedRecord};
pub use leveling::{Advancement, LevelingRules, TraitCaps};
pub use memory::MemoryAdapter;
pub use notifier::{BroadcastNotifier, LevelTransitionNotifier, NoOpNotifier, TracingNotifier};
pub use persist::PersistPolicy;
pub use schema::{Schema, SchemaError};
pub use store::{Mutation, WriteBackStore};
pub use tables::{ExperienceTable, PointRewardTable, TableError};
