//! Type-safe identifier wrapper around [`Uuid`].
//!
//! Tracked entities (connected players in the game server) are keyed by a
//! 128-bit UUID everywhere. The newtype keeps entity keys from being mixed
//! up with any other UUID the host game passes around.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Create a new identifier using UUID v7 (time-ordered).
    ///
    /// Real entity IDs come from the host game; this exists for tests and
    /// tooling that need fresh identifiers.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for EntityId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EntityId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<EntityId> for Uuid {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_distinct() {
        let a = EntityId::new();
        let b = EntityId::new();
        assert_ne!(a, b);
        assert_ne!(a.into_inner(), Uuid::nil());
    }

    #[test]
    fn serializes_as_bare_uuid() {
        let id = EntityId::new();
        let json = serde_json::to_string(&id).unwrap_or_default();
        assert_eq!(json, format!("\"{}\"", id.into_inner()));
    }

    #[test]
    fn display_matches_uuid() {
        let id = EntityId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }
}
