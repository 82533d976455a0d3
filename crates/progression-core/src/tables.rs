//! Experience and point reward tables.
//!
//! Both tables are immutable after startup and keyed by the *target*
//! level. With an experience table of `{2: 100, 3: 250}` an entity reaches
//! level 2 once its total experience is at least 100, and level 3 at 250.
//! A level missing from the experience table is unreachable; a level
//! missing from the reward table grants nothing.

use std::collections::BTreeMap;

/// Errors raised while building an [`ExperienceTable`] or leveling rules.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TableError {
    /// A threshold is negative, NaN, or infinite.
    #[error("invalid experience threshold {value} for level {level}")]
    InvalidThreshold {
        /// Level the threshold belongs to.
        level: u32,
        /// The rejected threshold.
        value: f64,
    },

    /// A threshold is lower than the threshold of an earlier level.
    #[error("threshold {value} for level {level} is below {previous} required by an earlier level")]
    Decreasing {
        /// Level whose threshold decreased.
        level: u32,
        /// The offending threshold.
        value: f64,
        /// The larger threshold of the preceding level.
        previous: f64,
    },

    /// The maximum level is zero.
    #[error("max level must be at least 1")]
    ZeroMaxLevel,

    /// The experience cap is not a positive finite number.
    #[error("invalid experience cap {0}")]
    InvalidExperienceCap(f64),
}

/// Cumulative experience required to reach each level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperienceTable {
    thresholds: BTreeMap<u32, f64>,
}

impl ExperienceTable {
    /// Build a table from `level -> cumulative experience` entries.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::InvalidThreshold`] for a negative or non-finite
    /// threshold and [`TableError::Decreasing`] when a higher level requires
    /// less experience than a lower one.
    pub fn new(thresholds: BTreeMap<u32, f64>) -> Result<Self, TableError> {
        let mut previous: Option<f64> = None;
        for (&level, &value) in &thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(TableError::InvalidThreshold { level, value });
            }
            if let Some(prev) = previous {
                if value < prev {
                    return Err(TableError::Decreasing {
                        level,
                        value,
                        previous: prev,
                    });
                }
            }
            previous = Some(value);
        }
        Ok(Self { thresholds })
    }

    /// Experience needed to reach `level`.
    ///
    /// Returns [`f64::INFINITY`] for levels the table does not define.
    pub fn threshold_for(&self, level: u32) -> f64 {
        self.thresholds.get(&level).copied().unwrap_or(f64::INFINITY)
    }

    /// Highest level the table defines a threshold for.
    pub fn highest_level(&self) -> Option<u32> {
        self.thresholds.keys().next_back().copied()
    }

    /// Number of defined levels.
    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    /// Whether no level is reachable through experience.
    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }
}

/// Trait points granted on reaching each level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointRewardTable {
    rewards: BTreeMap<u32, u64>,
}

impl PointRewardTable {
    /// Build a table from `level -> points` entries.
    pub const fn new(rewards: BTreeMap<u32, u64>) -> Self {
        Self { rewards }
    }

    /// Points granted on reaching `level` (zero if undefined).
    pub fn reward_for(&self, level: u32) -> u64 {
        self.rewards.get(&level).copied().unwrap_or(0)
    }
}

impl From<BTreeMap<u32, u64>> for PointRewardTable {
    fn from(rewards: BTreeMap<u32, u64>) -> Self {
        Self::new(rewards)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn table(entries: &[(u32, f64)]) -> Result<ExperienceTable, TableError> {
        ExperienceTable::new(entries.iter().copied().collect())
    }

    #[test]
    fn missing_level_is_unreachable() {
        let t = table(&[(2, 100.0), (3, 250.0)]).unwrap();
        assert_eq!(t.threshold_for(2), 100.0);
        assert!(t.threshold_for(4).is_infinite());
        assert_eq!(t.highest_level(), Some(3));
    }

    #[test]
    fn rejects_negative_threshold() {
        let err = table(&[(2, -1.0)]).unwrap_err();
        assert!(matches!(err, TableError::InvalidThreshold { level: 2, .. }));
    }

    #[test]
    fn rejects_nan_threshold() {
        assert!(table(&[(2, f64::NAN)]).is_err());
    }

    #[test]
    fn rejects_decreasing_thresholds() {
        let err = table(&[(2, 100.0), (3, 90.0)]).unwrap_err();
        assert!(matches!(err, TableError::Decreasing { level: 3, .. }));
    }

    #[test]
    fn equal_thresholds_are_allowed() {
        assert!(table(&[(2, 100.0), (3, 100.0)]).is_ok());
    }

    #[test]
    fn missing_reward_is_zero() {
        let rewards = PointRewardTable::from(BTreeMap::from([(2, 3)]));
        assert_eq!(rewards.reward_for(2), 3);
        assert_eq!(rewards.reward_for(3), 0);
    }
}
