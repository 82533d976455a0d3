//! Shared type definitions for the progression store.
//!
//! This crate is the single source of truth for the identifiers, update
//! kinds, and per-entity records used across the workspace. The cache and
//! engine in `progression-core` and the storage adapters in
//! `progression-db` all speak these types.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrapper for tracked entities
//! - [`enums`] -- Update kinds, trait kinds, and point pools
//! - [`structs`] -- Progression record, trait levels, and level-up events

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{PointPool, TraitKind, UpdateType};
pub use ids::EntityId;
pub use structs::{LevelUpEvent, ProgressionRecord, TraitLevels};
