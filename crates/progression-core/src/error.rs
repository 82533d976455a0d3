//! Error types for the progression cache.
//!
//! The permissive API never returns these: invalid keys and unloaded
//! entities degrade to "no visible effect" plus default values. The strict
//! `try_*` API surfaces [`CacheError`] so integrations can detect bugs.
//! [`AdapterError`] is what storage backends report; the cache logs it and
//! never hands it to gameplay callers.

use progression_types::EntityId;

/// Errors reported by the strict cache API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The entity has no in-memory record (never loaded, unloaded, or its
    /// load failed).
    #[error("entity {entity} is not loaded in domain {domain}")]
    NotLoaded {
        /// The entity that was addressed.
        entity: EntityId,
        /// The data domain that was addressed.
        domain: String,
    },

    /// The key is not declared in the domain's schema.
    #[error("key {key:?} is not declared in the schema of domain {domain}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// The data domain that was addressed.
        domain: String,
    },
}

/// Errors reported by a [`PersistenceAdapter`](crate::PersistenceAdapter).
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The backing store rejected or failed the operation.
    #[error("{backend} error: {message}")]
    Backend {
        /// Name of the backend (e.g. `PostgreSQL`).
        backend: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// A stored row could not be turned back into a record.
    #[error("failed to decode stored record for {entity}: {message}")]
    Decode {
        /// The entity whose row was malformed.
        entity: EntityId,
        /// Description of the decode failure.
        message: String,
    },

    /// The adapter refused the call (e.g. injected failure, closed pool).
    #[error("adapter unavailable: {0}")]
    Unavailable(String),
}
