//! Error types for the progression server binary.
//!
//! [`ServerError`] is the top-level error type that wraps all possible
//! failure modes during startup. Once the stores are open nothing is
//! fatal: persistence failures are logged by the caches.

/// Top-level error for the progression server binary.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: progression_core::ConfigError,
    },

    /// Connecting to a backend failed.
    #[error("database error: {source}")]
    Db {
        /// The underlying data layer error.
        #[from]
        source: progression_db::DbError,
    },

    /// A backend refused to create its schema.
    #[error("adapter error: {source}")]
    Adapter {
        /// The underlying adapter error.
        #[from]
        source: progression_core::AdapterError,
    },

    /// Installing the log subscriber failed.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}
