//! Declared key sets per data domain.
//!
//! A [`Schema`] names the backing table of one domain and the fixed set of
//! keys it tracks. Every read and write through a
//! [`KeyedDataCache`](crate::KeyedDataCache) is checked against it.
//!
//! Storage adapters interpolate the table name and keys into DDL and upsert
//! statements, so both must be plain lowercase SQL identifiers. The check
//! happens once here, at construction.

use std::collections::HashSet;

/// Longest identifier `PostgreSQL` keeps without truncation.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Column names every keyed table carries besides the schema keys.
pub const RESERVED_COLUMNS: &[&str] = &["uuid", "updated_at"];

/// Errors raised while building a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// The table name or a key is not a plain lowercase identifier.
    #[error("invalid identifier {0:?}: expected [a-z_][a-z0-9_]* of at most 63 bytes")]
    InvalidIdentifier(String),

    /// A key collides with a column the adapters manage themselves.
    #[error("key {0:?} is reserved")]
    ReservedKey(String),

    /// The schema declares no keys.
    #[error("schema for table {0:?} declares no keys")]
    Empty(String),
}

/// Immutable declaration of the valid keys of one data domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    table_name: String,
    valid_keys: HashSet<String>,
    /// Same keys as `valid_keys`, sorted, for stable column order.
    ordered_keys: Vec<String>,
}

impl Schema {
    /// Build a schema for `table_name` declaring `keys`.
    ///
    /// Duplicate keys are collapsed.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidIdentifier`] if the table name or a key
    /// is not a plain identifier, [`SchemaError::ReservedKey`] if a key is
    /// one of [`RESERVED_COLUMNS`], and [`SchemaError::Empty`] if no keys
    /// are given.
    pub fn new<I, S>(table_name: &str, keys: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        validate_identifier(table_name)?;

        let mut ordered_keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        for key in &ordered_keys {
            validate_identifier(key)?;
            if RESERVED_COLUMNS.contains(&key.as_str()) {
                return Err(SchemaError::ReservedKey(key.clone()));
            }
        }
        ordered_keys.sort_unstable();
        ordered_keys.dedup();

        if ordered_keys.is_empty() {
            return Err(SchemaError::Empty(table_name.to_owned()));
        }

        Ok(Self {
            table_name: table_name.to_owned(),
            valid_keys: ordered_keys.iter().cloned().collect(),
            ordered_keys,
        })
    }

    /// Whether `key` is declared by this schema.
    pub fn contains(&self, key: &str) -> bool {
        self.valid_keys.contains(key)
    }

    /// Declared keys in sorted order.
    pub fn keys(&self) -> &[String] {
        &self.ordered_keys
    }

    /// Name of the backing table.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Number of declared keys.
    pub fn len(&self) -> usize {
        self.ordered_keys.len()
    }

    /// Always `false`: construction rejects empty schemas.
    pub fn is_empty(&self) -> bool {
        self.ordered_keys.is_empty()
    }
}

/// Check that `ident` is `[a-z_][a-z0-9_]*` and short enough for `PostgreSQL`.
///
/// # Errors
///
/// Returns [`SchemaError::InvalidIdentifier`] on any violation.
pub fn validate_identifier(ident: &str) -> Result<(), SchemaError> {
    let mut chars = ident.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let tail_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if head_ok && tail_ok && ident.len() <= MAX_IDENTIFIER_LEN {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(ident.to_owned()))
    }
}
