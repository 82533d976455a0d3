//! Enumeration types for the progression store.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Update kinds
// ---------------------------------------------------------------------------

/// How a mutation combines its amount with the stored value.
///
/// Every typed mutator in the cache and the progression engine accepts one
/// of these. `Add` and `Subtract` ignore non-positive amounts; `Set` clamps
/// the amount into the field's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    /// Increase the stored value, saturating at the upper bound.
    Add,
    /// Decrease the stored value, saturating at the lower bound.
    Subtract,
    /// Replace the stored value, clamped into the bounds.
    Set,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// One of the four trait sub-attributes carried by every progression record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraitKind {
    /// Wisdom trait.
    Wisdom,
    /// Charisma trait.
    Charisma,
    /// Karma trait.
    Karma,
    /// Dexterity trait.
    Dexterity,
}

impl TraitKind {
    /// All trait kinds in canonical order.
    pub const ALL: [Self; 4] = [Self::Wisdom, Self::Charisma, Self::Karma, Self::Dexterity];

    /// Lowercase name, also used as the storage column name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wisdom => "wisdom",
            Self::Charisma => "charisma",
            Self::Karma => "karma",
            Self::Dexterity => "dexterity",
        }
    }
}

impl core::fmt::Display for TraitKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Point pools
// ---------------------------------------------------------------------------

/// A spendable reward currency.
///
/// Trait points are granted on level-up through the point reward table.
/// Talent points are granted by the host game directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointPool {
    /// Points spent on trait sub-attributes.
    Trait,
    /// Points spent on talents.
    Talent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trait_names_are_unique() {
        let mut names: Vec<&str> = TraitKind::ALL.iter().map(|t| t.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), TraitKind::ALL.len());
    }

    #[test]
    fn update_type_uses_snake_case() {
        let json = serde_json::to_string(&UpdateType::Subtract).unwrap_or_default();
        assert_eq!(json, "\"subtract\"");
    }
}
