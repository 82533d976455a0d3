//! Core record types held in memory by the progression engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::TraitKind;
use crate::ids::EntityId;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Levels of the four trait sub-attributes.
///
/// Each level is capped independently by its trait's configured maximum;
/// the cap is enforced by the engine, not by this type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraitLevels {
    /// Wisdom level.
    pub wisdom: u32,
    /// Charisma level.
    pub charisma: u32,
    /// Karma level.
    pub karma: u32,
    /// Dexterity level.
    pub dexterity: u32,
}

impl TraitLevels {
    /// Return the level of one trait.
    pub const fn get(&self, kind: TraitKind) -> u32 {
        match kind {
            TraitKind::Wisdom => self.wisdom,
            TraitKind::Charisma => self.charisma,
            TraitKind::Karma => self.karma,
            TraitKind::Dexterity => self.dexterity,
        }
    }

    /// Return a mutable reference to the level of one trait.
    pub const fn get_mut(&mut self, kind: TraitKind) -> &mut u32 {
        match kind {
            TraitKind::Wisdom => &mut self.wisdom,
            TraitKind::Charisma => &mut self.charisma,
            TraitKind::Karma => &mut self.karma,
            TraitKind::Dexterity => &mut self.dexterity,
        }
    }
}

// ---------------------------------------------------------------------------
// Progression record
// ---------------------------------------------------------------------------

/// Fixed-shape progression state of one entity.
///
/// Held in memory while the entity is loaded and persisted as one full row.
/// `level` stays consistent with `experience` on the add path: it is the
/// highest level whose cumulative threshold does not exceed `experience`,
/// up to the configured maximum level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionRecord {
    /// Display name of the entity, refreshed on every load.
    pub name: String,
    /// Accumulated experience (never negative).
    pub experience: f64,
    /// Consumable pool that boosts the next experience gains.
    pub bonus_experience: f64,
    /// Multiplier applied to awarded experience (default `1.0`).
    pub multiplier: f64,
    /// Current level, between 1 and the configured maximum.
    pub level: u32,
    /// Luck attribute.
    pub luck: u64,
    /// Spendable trait points.
    pub trait_points: u64,
    /// Spendable talent points.
    pub talent_points: u64,
    /// Trait sub-attribute levels.
    #[serde(flatten)]
    pub traits: TraitLevels,
}

impl ProgressionRecord {
    /// Level every record starts at.
    pub const STARTING_LEVEL: u32 = 1;

    /// Create a fresh record for a newly tracked entity.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }
}

impl Default for ProgressionRecord {
    fn default() -> Self {
        Self {
            name: String::new(),
            experience: 0.0,
            bonus_experience: 0.0,
            multiplier: 1.0,
            level: Self::STARTING_LEVEL,
            luck: 0,
            trait_points: 0,
            talent_points: 0,
            traits: TraitLevels::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Level-up event
// ---------------------------------------------------------------------------

/// Notification emitted once per mutation that crosses one or more levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpEvent {
    /// The entity that leveled up.
    pub entity: EntityId,
    /// Tag of the data domain the transition happened in.
    pub domain: String,
    /// Level before the mutation.
    pub previous_level: u32,
    /// Level reached after the mutation.
    pub new_level: u32,
    /// Trait point total after rewards were granted.
    pub trait_points: u64,
    /// When the transition was applied.
    pub occurred_at: DateTime<Utc>,
}

impl LevelUpEvent {
    /// Number of levels crossed by the mutation.
    pub const fn levels_gained(&self) -> u32 {
        self.new_level.saturating_sub(self.previous_level)
    }
}
