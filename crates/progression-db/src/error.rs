//! Error types for the data layer.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`sqlx`] and [`fred`] errors. At the adapter boundary they are turned
//! into [`AdapterError`] so the caches never see backend types.

use progression_core::{AdapterError, SchemaError};

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A table name is not usable as an SQL identifier.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<DbError> for AdapterError {
    fn from(err: DbError) -> Self {
        let backend = match &err {
            DbError::Postgres(_) => "PostgreSQL",
            DbError::Dragonfly(_) => "Dragonfly",
            DbError::Serialization(_) => "JSON",
            DbError::Schema(_) | DbError::Config(_) => "configuration",
        };
        Self::Backend {
            backend,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_into_adapter_error() {
        let err = DbError::Config("bad url".to_owned());
        let adapter: AdapterError = err.into();
        assert!(matches!(
            adapter,
            AdapterError::Backend { backend: "configuration", .. }
        ));
        assert!(adapter.to_string().contains("bad url"));
    }
}
