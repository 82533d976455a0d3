//! Leveling rules and the experience-driven transition loop.
//!
//! The state of the machine is simply the integer level. After experience
//! changes, [`advance`] walks the level upwards one step at a time while the
//! entity's experience meets the next level's threshold, granting that
//! level's trait point reward on every step. A single large gain can cross
//! several levels; the caller turns the resulting [`Advancement`] into one
//! notification.
//!
//! The loop stops at [`LevelingRules::max_level`]. Past that point
//! experience still accumulates (up to the experience cap) but no further
//! transitions or rewards happen.

use progression_types::{TraitKind, TraitLevels};

use crate::clamp::Bounds;
use crate::tables::{ExperienceTable, PointRewardTable, TableError};

/// Per-trait maximum levels.
///
/// The single authoritative source for trait caps: every trait mutation
/// reads its upper bound from here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraitCaps {
    caps: TraitLevels,
}

impl TraitCaps {
    /// Caps taken from a [`TraitLevels`] value, one field per trait.
    pub const fn new(caps: TraitLevels) -> Self {
        Self { caps }
    }

    /// The same cap for every trait.
    pub const fn uniform(max_level: u32) -> Self {
        Self::new(TraitLevels {
            wisdom: max_level,
            charisma: max_level,
            karma: max_level,
            dexterity: max_level,
        })
    }

    /// Maximum level of `kind`.
    pub const fn cap(&self, kind: TraitKind) -> u32 {
        self.caps.get(kind)
    }
}

/// Immutable rules consulted by the progression engine.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelingRules {
    max_level: u32,
    experience_cap: f64,
    experience: ExperienceTable,
    rewards: PointRewardTable,
    trait_caps: TraitCaps,
}

impl LevelingRules {
    /// Assemble and validate leveling rules.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::ZeroMaxLevel`] if `max_level` is zero and
    /// [`TableError::InvalidExperienceCap`] if the cap is not a positive
    /// finite number.
    pub fn new(
        max_level: u32,
        experience_cap: f64,
        experience: ExperienceTable,
        rewards: PointRewardTable,
        trait_caps: TraitCaps,
    ) -> Result<Self, TableError> {
        if max_level == 0 {
            return Err(TableError::ZeroMaxLevel);
        }
        if !experience_cap.is_finite() || experience_cap <= 0.0 {
            return Err(TableError::InvalidExperienceCap(experience_cap));
        }
        Ok(Self {
            max_level,
            experience_cap,
            experience,
            rewards,
            trait_caps,
        })
    }

    /// Highest level an entity can reach.
    pub const fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Upper bound of accumulated experience.
    pub const fn experience_cap(&self) -> f64 {
        self.experience_cap
    }

    /// The experience threshold table.
    pub const fn experience_table(&self) -> &ExperienceTable {
        &self.experience
    }

    /// The point reward table.
    pub const fn reward_table(&self) -> &PointRewardTable {
        &self.rewards
    }

    /// Per-trait caps.
    pub const fn trait_caps(&self) -> &TraitCaps {
        &self.trait_caps
    }

    /// Bounds of the experience field.
    pub const fn experience_bounds(&self) -> Bounds<f64> {
        Bounds::new(0.0, self.experience_cap)
    }

    /// Bounds of the level field. The lower bound is 1, not 0.
    pub const fn level_bounds(&self) -> Bounds<u32> {
        Bounds::new(1, self.max_level)
    }

    /// Bounds of one trait sub-attribute.
    pub const fn trait_bounds(&self, kind: TraitKind) -> Bounds<u32> {
        Bounds::up_to(self.trait_caps.cap(kind))
    }
}

/// Result of a transition loop that crossed at least one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advancement {
    /// Level before the loop ran.
    pub previous_level: u32,
    /// Level the loop stopped at.
    pub new_level: u32,
    /// Sum of rewards of every level crossed.
    pub points_granted: u64,
}

/// Run the transition loop for an entity at `level` with `experience`.
///
/// Returns `None` when no level boundary is crossed (including when
/// `level` is already at or above the maximum).
pub fn advance(rules: &LevelingRules, level: u32, experience: f64) -> Option<Advancement> {
    let mut current = level;
    let mut points_granted: u64 = 0;

    while current < rules.max_level {
        let Some(next) = current.checked_add(1) else {
            break;
        };
        if experience < rules.experience.threshold_for(next) {
            break;
        }
        current = next;
        points_granted = points_granted.saturating_add(rules.rewards.reward_for(next));
    }

    (current > level).then_some(Advancement {
        previous_level: level,
        new_level: current,
        points_granted,
    })
}

/// Experience still missing before the next level.
///
/// Returns `None` at the maximum level or when the next level is not
/// defined in the table.
pub fn experience_to_next_level(rules: &LevelingRules, level: u32, experience: f64) -> Option<f64> {
    if level >= rules.max_level {
        return None;
    }
    let next = level.checked_add(1)?;
    let threshold = rules.experience.threshold_for(next);
    threshold
        .is_finite()
        .then(|| (threshold - experience).max(0.0))
}
