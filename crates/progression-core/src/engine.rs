//! Typed progression mutators and the leveling state machine.
//!
//! [`ProgressionEngine`] serves the fixed-shape [`ProgressionRecord`] of
//! every loaded entity. Each mutator takes an [`UpdateType`], applies the
//! field's clamp rules and returns the resulting value. Experience gains
//! additionally draw from the bonus pool and run the transition loop in
//! [`leveling::advance`]; a mutation that crosses one or more levels
//! produces exactly one [`LevelUpEvent`].
//!
//! # Experience paths
//!
//! | Update | Bonus drawn | Transition loop |
//! |--------|-------------|-----------------|
//! | `Add` | `min(bonus, amount, room left under the cap)` | yes |
//! | `Set` | no | yes (upward only) |
//! | `Subtract` | no | no |

use std::sync::Arc;

use chrono::Utc;
use progression_types::{
    EntityId, LevelUpEvent, PointPool, ProgressionRecord, TraitKind, TraitLevels, UpdateType,
};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::adapter::PersistenceAdapter;
use crate::clamp::{self, Bounds, ClampValue};
use crate::error::{AdapterError, CacheError};
use crate::leveling::{self, LevelingRules};
use crate::notifier::LevelTransitionNotifier;
use crate::persist::PersistPolicy;
use crate::store::{Mutation, WriteBackStore};

/// Write-back cache of progression records with leveling.
#[derive(Clone)]
pub struct ProgressionEngine {
    store: WriteBackStore<ProgressionRecord>,
    rules: Arc<LevelingRules>,
    notifier: Arc<dyn LevelTransitionNotifier>,
}

impl core::fmt::Debug for ProgressionEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProgressionEngine")
            .field("store", &self.store)
            .field("max_level", &self.rules.max_level())
            .finish_non_exhaustive()
    }
}

impl ProgressionEngine {
    /// Create an engine for `domain` whose saves run on `runtime`.
    pub fn new(
        domain: &str,
        rules: LevelingRules,
        adapter: Arc<dyn PersistenceAdapter<ProgressionRecord>>,
        policy: PersistPolicy,
        notifier: Arc<dyn LevelTransitionNotifier>,
        runtime: Handle,
    ) -> Self {
        Self {
            store: WriteBackStore::new(domain, adapter, policy, runtime),
            rules: Arc::new(rules),
            notifier,
        }
    }

    /// Create the backing table, then an engine bound to the current runtime.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error if schema creation fails.
    pub async fn open(
        domain: &str,
        rules: LevelingRules,
        adapter: Arc<dyn PersistenceAdapter<ProgressionRecord>>,
        policy: PersistPolicy,
        notifier: Arc<dyn LevelTransitionNotifier>,
    ) -> Result<Self, AdapterError> {
        let store = WriteBackStore::open(domain, adapter, policy).await?;
        Ok(Self {
            store,
            rules: Arc::new(rules),
            notifier,
        })
    }

    /// Tag of the data domain this engine serves.
    pub fn domain(&self) -> &str {
        self.store.domain()
    }

    /// The leveling rules in effect.
    pub fn rules(&self) -> &LevelingRules {
        &self.rules
    }

    /// Whether `id` is cached.
    pub fn is_loaded(&self, id: EntityId) -> bool {
        self.store.is_loaded(id)
    }

    /// Number of cached entities.
    pub fn loaded_count(&self) -> usize {
        self.store.loaded_count()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load `id` in the background and refresh its display name.
    ///
    /// Stored levels and trait levels outside the current rules are pulled
    /// back into range.
    pub fn load(&self, id: EntityId, name: &str) -> JoinHandle<()> {
        let rules = Arc::clone(&self.rules);
        let name = name.to_owned();
        self.store.load_with(id, move |record| {
            record.name = name;
            record.level = rules.level_bounds().clamp(record.level);
            for kind in TraitKind::ALL {
                let level = record.traits.get_mut(kind);
                *level = rules.trait_bounds(kind).clamp(*level);
            }
        })
    }

    /// Persist `id` in the background.
    pub fn save(&self, id: EntityId) -> JoinHandle<()> {
        self.store.save(id)
    }

    /// Persist every cached entity in one background batch.
    pub fn save_all(&self) -> JoinHandle<()> {
        self.store.save_all()
    }

    /// Evict `id` and persist its final state in the background.
    pub fn unload(&self, id: EntityId) -> JoinHandle<()> {
        self.store.unload(id)
    }

    // =========================================================================
    // Experience
    // =========================================================================

    /// Strict [`update_experience`](Self::update_experience).
    ///
    /// # Errors
    ///
    /// [`CacheError::NotLoaded`] if `id` is not cached.
    pub fn try_update_experience(
        &self,
        id: EntityId,
        update: UpdateType,
        amount: f64,
    ) -> Result<f64, CacheError> {
        let rules = &self.rules;
        let mut transition = None;

        let experience = self.mutate(id, |record| {
            let current = record.experience;
            let bounds = rules.experience_bounds();
            let applied = match update {
                UpdateType::Add => {
                    // Bonus only covers what still fits under the cap.
                    let drawn = if amount > 0.0 {
                        let room = (rules.experience_cap() - current - amount).max(0.0);
                        record.bonus_experience.min(amount).min(room)
                    } else {
                        0.0
                    };
                    match clamp::apply(update, current, amount + drawn, bounds) {
                        Some(value) if value > current => {
                            record.bonus_experience = (record.bonus_experience - drawn).max(0.0);
                            Some(value)
                        }
                        _ => None,
                    }
                }
                UpdateType::Subtract | UpdateType::Set => {
                    clamp::apply(update, current, amount, bounds)
                }
            };
            let Some(value) = applied else {
                return Mutation::unchanged(current);
            };
            record.experience = value;

            if update != UpdateType::Subtract {
                if let Some(advancement) = leveling::advance(rules, record.level, value) {
                    record.level = advancement.new_level;
                    record.trait_points = record
                        .trait_points
                        .saturating_add(advancement.points_granted);
                    transition = Some((advancement, record.trait_points));
                }
            }
            Mutation::changed(value)
        })?;

        if let Some((advancement, trait_points)) = transition {
            self.notifier.on_level_up(&LevelUpEvent {
                entity: id,
                domain: self.domain().to_owned(),
                previous_level: advancement.previous_level,
                new_level: advancement.new_level,
                trait_points,
                occurred_at: Utc::now(),
            });
        }
        Ok(experience)
    }

    /// Apply `update` to the entity's experience and return the result.
    ///
    /// Returns `0.0` if `id` is not loaded.
    pub fn update_experience(&self, id: EntityId, update: UpdateType, amount: f64) -> f64 {
        self.try_update_experience(id, update, amount).unwrap_or(0.0)
    }

    /// Strict [`award_experience`](Self::award_experience).
    ///
    /// # Errors
    ///
    /// [`CacheError::NotLoaded`] if `id` is not cached.
    pub fn try_award_experience(&self, id: EntityId, base: f64) -> Result<f64, CacheError> {
        let multiplier = self
            .store
            .read(id, |record| record.multiplier)
            .ok_or_else(|| self.not_loaded(id))?;
        self.try_update_experience(id, UpdateType::Add, base * multiplier)
    }

    /// Grant `base` experience scaled by the entity's multiplier.
    pub fn award_experience(&self, id: EntityId, base: f64) -> f64 {
        self.try_award_experience(id, base).unwrap_or(0.0)
    }

    // =========================================================================
    // Plain fields
    // =========================================================================

    /// Strict [`update_bonus_experience`](Self::update_bonus_experience).
    ///
    /// # Errors
    ///
    /// [`CacheError::NotLoaded`] if `id` is not cached.
    pub fn try_update_bonus_experience(
        &self,
        id: EntityId,
        update: UpdateType,
        amount: f64,
    ) -> Result<f64, CacheError> {
        self.update_field(id, update, amount, Bounds::non_negative(), |record| {
            &mut record.bonus_experience
        })
    }

    /// Apply `update` to the bonus experience pool.
    pub fn update_bonus_experience(&self, id: EntityId, update: UpdateType, amount: f64) -> f64 {
        self.try_update_bonus_experience(id, update, amount)
            .unwrap_or(0.0)
    }

    /// Strict [`update_multiplier`](Self::update_multiplier).
    ///
    /// # Errors
    ///
    /// [`CacheError::NotLoaded`] if `id` is not cached.
    pub fn try_update_multiplier(
        &self,
        id: EntityId,
        update: UpdateType,
        amount: f64,
    ) -> Result<f64, CacheError> {
        self.update_field(id, update, amount, Bounds::non_negative(), |record| {
            &mut record.multiplier
        })
    }

    /// Apply `update` to the experience multiplier.
    pub fn update_multiplier(&self, id: EntityId, update: UpdateType, amount: f64) -> f64 {
        self.try_update_multiplier(id, update, amount).unwrap_or(1.0)
    }

    /// Strict [`update_level`](Self::update_level).
    ///
    /// # Errors
    ///
    /// [`CacheError::NotLoaded`] if `id` is not cached.
    pub fn try_update_level(
        &self,
        id: EntityId,
        update: UpdateType,
        amount: u32,
    ) -> Result<u32, CacheError> {
        let bounds = self.rules.level_bounds();
        self.update_field(id, update, amount, bounds, |record| &mut record.level)
    }

    /// Apply `update` to the level directly.
    ///
    /// Direct level changes grant no rewards and emit no event.
    pub fn update_level(&self, id: EntityId, update: UpdateType, amount: u32) -> u32 {
        self.try_update_level(id, update, amount)
            .unwrap_or(ProgressionRecord::STARTING_LEVEL)
    }

    /// Strict [`update_luck`](Self::update_luck).
    ///
    /// # Errors
    ///
    /// [`CacheError::NotLoaded`] if `id` is not cached.
    pub fn try_update_luck(
        &self,
        id: EntityId,
        update: UpdateType,
        amount: u64,
    ) -> Result<u64, CacheError> {
        self.update_field(id, update, amount, Bounds::non_negative(), |record| {
            &mut record.luck
        })
    }

    /// Apply `update` to luck.
    pub fn update_luck(&self, id: EntityId, update: UpdateType, amount: u64) -> u64 {
        self.try_update_luck(id, update, amount).unwrap_or(0)
    }

    /// Strict [`update_points`](Self::update_points).
    ///
    /// # Errors
    ///
    /// [`CacheError::NotLoaded`] if `id` is not cached.
    pub fn try_update_points(
        &self,
        id: EntityId,
        pool: PointPool,
        update: UpdateType,
        amount: u64,
    ) -> Result<u64, CacheError> {
        self.update_field(id, update, amount, Bounds::non_negative(), |record| {
            match pool {
                PointPool::Trait => &mut record.trait_points,
                PointPool::Talent => &mut record.talent_points,
            }
        })
    }

    /// Apply `update` to one spendable point pool.
    pub fn update_points(&self, id: EntityId, pool: PointPool, update: UpdateType, amount: u64) -> u64 {
        self.try_update_points(id, pool, update, amount).unwrap_or(0)
    }

    /// Apply `update` to the trait point pool.
    pub fn update_trait_points(&self, id: EntityId, update: UpdateType, amount: u64) -> u64 {
        self.update_points(id, PointPool::Trait, update, amount)
    }

    /// Apply `update` to the talent point pool.
    pub fn update_talent_points(&self, id: EntityId, update: UpdateType, amount: u64) -> u64 {
        self.update_points(id, PointPool::Talent, update, amount)
    }

    /// Strict [`update_trait`](Self::update_trait).
    ///
    /// # Errors
    ///
    /// [`CacheError::NotLoaded`] if `id` is not cached.
    pub fn try_update_trait(
        &self,
        id: EntityId,
        kind: TraitKind,
        update: UpdateType,
        amount: u32,
    ) -> Result<u32, CacheError> {
        let bounds = self.rules.trait_bounds(kind);
        self.update_field(id, update, amount, bounds, |record| {
            record.traits.get_mut(kind)
        })
    }

    /// Apply `update` to one trait sub-attribute, capped at its maximum.
    pub fn update_trait(&self, id: EntityId, kind: TraitKind, update: UpdateType, amount: u32) -> u32 {
        self.try_update_trait(id, kind, update, amount).unwrap_or(0)
    }

    // =========================================================================
    // Readers
    // =========================================================================

    /// Current level, or 1 if not loaded.
    pub fn get_level(&self, id: EntityId) -> u32 {
        self.store
            .read(id, |record| record.level)
            .unwrap_or(ProgressionRecord::STARTING_LEVEL)
    }

    /// Accumulated experience, or `0.0` if not loaded.
    pub fn get_experience(&self, id: EntityId) -> f64 {
        self.store.read(id, |record| record.experience).unwrap_or(0.0)
    }

    /// Remaining bonus experience, or `0.0` if not loaded.
    pub fn get_bonus_experience(&self, id: EntityId) -> f64 {
        self.store
            .read(id, |record| record.bonus_experience)
            .unwrap_or(0.0)
    }

    /// Experience multiplier, or `1.0` if not loaded.
    pub fn get_multiplier(&self, id: EntityId) -> f64 {
        self.store.read(id, |record| record.multiplier).unwrap_or(1.0)
    }

    /// Luck, or 0 if not loaded.
    pub fn get_luck(&self, id: EntityId) -> u64 {
        self.store.read(id, |record| record.luck).unwrap_or(0)
    }

    /// Spendable trait points, or 0 if not loaded.
    pub fn get_trait_points(&self, id: EntityId) -> u64 {
        self.store.read(id, |record| record.trait_points).unwrap_or(0)
    }

    /// Spendable talent points, or 0 if not loaded.
    pub fn get_talent_points(&self, id: EntityId) -> u64 {
        self.store.read(id, |record| record.talent_points).unwrap_or(0)
    }

    /// Level of one trait, or 0 if not loaded.
    pub fn get_trait(&self, id: EntityId, kind: TraitKind) -> u32 {
        self.store
            .read(id, |record| record.traits.get(kind))
            .unwrap_or(0)
    }

    /// All trait levels, or all zero if not loaded.
    pub fn get_all_traits(&self, id: EntityId) -> TraitLevels {
        self.store.read(id, |record| record.traits).unwrap_or_default()
    }

    /// Copy of the full record, if loaded.
    pub fn get_record(&self, id: EntityId) -> Option<ProgressionRecord> {
        self.store.snapshot(id)
    }

    /// Experience still missing before the next level.
    ///
    /// `None` if not loaded, at the maximum level, or when the next level
    /// is unreachable.
    pub fn experience_to_next_level(&self, id: EntityId) -> Option<f64> {
        let (level, experience) = self
            .store
            .read(id, |record| (record.level, record.experience))?;
        leveling::experience_to_next_level(&self.rules, level, experience)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn mutate<T>(
        &self,
        id: EntityId,
        f: impl FnOnce(&mut ProgressionRecord) -> Mutation<T>,
    ) -> Result<T, CacheError> {
        self.store.update(id, f).ok_or_else(|| self.not_loaded(id))
    }

    fn update_field<T: ClampValue>(
        &self,
        id: EntityId,
        update: UpdateType,
        amount: T,
        bounds: Bounds<T>,
        field: impl FnOnce(&mut ProgressionRecord) -> &mut T,
    ) -> Result<T, CacheError> {
        self.mutate(id, |record| {
            let slot = field(record);
            match clamp::apply(update, *slot, amount, bounds) {
                Some(value) => {
                    *slot = value;
                    Mutation::changed(value)
                }
                None => Mutation::unchanged(*slot),
            }
        })
    }

    fn not_loaded(&self, id: EntityId) -> CacheError {
        CacheError::NotLoaded {
            entity: id,
            domain: self.domain().to_owned(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::leveling::TraitCaps;
    use crate::memory::MemoryAdapter;
    use crate::notifier::{BroadcastNotifier, NoOpNotifier};
    use crate::tables::{ExperienceTable, PointRewardTable};

    struct Harness {
        engine: ProgressionEngine,
        adapter: Arc<MemoryAdapter<ProgressionRecord>>,
        events: tokio::sync::broadcast::Receiver<LevelUpEvent>,
    }

    fn rules(max_level: u32) -> LevelingRules {
        LevelingRules::new(
            max_level,
            10_000.0,
            ExperienceTable::new(BTreeMap::from([(2, 100.0), (3, 250.0), (4, 500.0)])).unwrap(),
            PointRewardTable::new(BTreeMap::from([(2, 1), (3, 2), (4, 3)])),
            TraitCaps::uniform(5),
        )
        .unwrap()
    }

    async fn harness(max_level: u32) -> (Harness, EntityId) {
        let adapter = Arc::new(MemoryAdapter::new());
        let notifier = Arc::new(BroadcastNotifier::new(16));
        let events = notifier.subscribe();
        let dyn_adapter: Arc<dyn PersistenceAdapter<ProgressionRecord>> =
            Arc::clone(&adapter) as _;
        let engine = ProgressionEngine::new(
            "progression",
            rules(max_level),
            dyn_adapter,
            PersistPolicy::default(),
            notifier,
            Handle::current(),
        );
        let id = EntityId::new();
        engine.load(id, "Steve").await.unwrap();
        (
            Harness {
                engine,
                adapter,
                events,
            },
            id,
        )
    }

    #[tokio::test]
    async fn multi_level_up_emits_one_event() {
        let (mut h, id) = harness(10).await;

        assert_eq!(h.engine.update_experience(id, UpdateType::Add, 300.0), 300.0);
        assert_eq!(h.engine.get_level(id), 3);
        assert_eq!(h.engine.get_trait_points(id), 3);

        let event = h.events.try_recv().unwrap();
        assert_eq!((event.previous_level, event.new_level), (1, 3));
        assert_eq!(event.trait_points, 3);
        assert_eq!(event.domain, "progression");
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn bonus_experience_is_consumed_once() {
        let (h, id) = harness(10).await;
        h.engine.update_bonus_experience(id, UpdateType::Set, 40.0);

        assert_eq!(h.engine.update_experience(id, UpdateType::Add, 100.0), 140.0);
        assert_eq!(h.engine.get_bonus_experience(id), 0.0);

        assert_eq!(h.engine.update_experience(id, UpdateType::Add, 100.0), 240.0);
    }

    #[tokio::test]
    async fn partial_bonus_draw_leaves_remainder() {
        let (h, id) = harness(10).await;
        h.engine.update_bonus_experience(id, UpdateType::Add, 150.0);
        h.engine.update_experience(id, UpdateType::Add, 50.0);
        assert_eq!(h.engine.get_experience(id), 100.0);
        assert_eq!(h.engine.get_bonus_experience(id), 100.0);
    }

    #[tokio::test]
    async fn gain_at_cap_keeps_bonus_and_skips_save() {
        let (h, id) = harness(10).await;
        h.engine.update_experience(id, UpdateType::Set, 10_000.0);
        h.engine.update_bonus_experience(id, UpdateType::Set, 40.0);
        h.engine.save(id).await.unwrap();
        let saves = h.adapter.save_calls();

        assert_eq!(h.engine.update_experience(id, UpdateType::Add, 100.0), 10_000.0);
        assert_eq!(h.engine.get_bonus_experience(id), 40.0);

        h.engine.save_all().await.unwrap();
        assert_eq!(h.adapter.save_calls(), saves);
    }

    #[tokio::test]
    async fn gain_near_cap_draws_only_remaining_room() {
        let (h, id) = harness(10).await;
        h.engine.update_experience(id, UpdateType::Set, 9_950.0);
        h.engine.update_bonus_experience(id, UpdateType::Set, 100.0);

        assert_eq!(h.engine.update_experience(id, UpdateType::Add, 40.0), 10_000.0);
        assert_eq!(h.engine.get_bonus_experience(id), 90.0);
    }

    #[tokio::test]
    async fn max_level_only_accumulates_experience() {
        let (mut h, id) = harness(3).await;
        h.engine.update_experience(id, UpdateType::Add, 300.0);
        assert_eq!(h.engine.get_level(id), 3);
        let _ = h.events.try_recv().unwrap();
        let points = h.engine.get_trait_points(id);

        h.engine.update_experience(id, UpdateType::Add, 1_000.0);
        assert_eq!(h.engine.get_level(id), 3);
        assert_eq!(h.engine.get_experience(id), 1_300.0);
        assert_eq!(h.engine.get_trait_points(id), points);
        assert!(h.events.try_recv().is_err());
        assert_eq!(h.engine.experience_to_next_level(id), None);
    }

    #[tokio::test]
    async fn experience_never_exceeds_cap() {
        let (h, id) = harness(10).await;
        for _ in 0..20 {
            h.engine.update_experience(id, UpdateType::Add, 1_000.0);
        }
        assert_eq!(h.engine.get_experience(id), 10_000.0);
    }

    #[tokio::test]
    async fn subtract_never_lowers_level() {
        let (mut h, id) = harness(10).await;
        h.engine.update_experience(id, UpdateType::Add, 260.0);
        assert_eq!(h.engine.get_level(id), 3);
        let _ = h.events.try_recv().unwrap();

        assert_eq!(h.engine.update_experience(id, UpdateType::Subtract, 500.0), 0.0);
        assert_eq!(h.engine.get_level(id), 3);
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn set_runs_transitions_without_bonus() {
        let (mut h, id) = harness(10).await;
        h.engine.update_bonus_experience(id, UpdateType::Set, 40.0);

        assert_eq!(h.engine.update_experience(id, UpdateType::Set, 120.0), 120.0);
        assert_eq!(h.engine.get_level(id), 2);
        assert_eq!(h.engine.get_bonus_experience(id), 40.0);
        assert_eq!(h.events.try_recv().unwrap().new_level, 2);

        // Setting lower keeps the level.
        h.engine.update_experience(id, UpdateType::Set, 10.0);
        assert_eq!(h.engine.get_level(id), 2);
    }

    #[tokio::test]
    async fn level_and_traits_respect_bounds() {
        let (h, id) = harness(10).await;
        assert_eq!(h.engine.update_level(id, UpdateType::Subtract, 5), 1);
        assert_eq!(h.engine.update_level(id, UpdateType::Set, 99), 10);
        assert_eq!(h.engine.update_level(id, UpdateType::Set, 0), 1);

        for _ in 0..10 {
            h.engine.update_trait(id, TraitKind::Wisdom, UpdateType::Add, 1);
        }
        assert_eq!(h.engine.get_trait(id, TraitKind::Wisdom), 5);
        assert_eq!(h.engine.get_all_traits(id).charisma, 0);
    }

    #[tokio::test]
    async fn point_pools_are_independent() {
        let (h, id) = harness(10).await;
        h.engine.update_trait_points(id, UpdateType::Add, 4);
        h.engine.update_talent_points(id, UpdateType::Add, 7);
        assert_eq!(h.engine.update_talent_points(id, UpdateType::Subtract, 10), 0);
        assert_eq!(h.engine.get_trait_points(id), 4);
        assert_eq!(h.engine.update_luck(id, UpdateType::Set, 3), 3);
    }

    #[tokio::test]
    async fn award_scales_by_multiplier() {
        let (h, id) = harness(10).await;
        h.engine.update_multiplier(id, UpdateType::Set, 2.5);
        assert_eq!(h.engine.award_experience(id, 40.0), 100.0);
        assert_eq!(h.engine.get_level(id), 2);
    }

    #[tokio::test]
    async fn unloaded_entity_reads_defaults() {
        let (h, _) = harness(10).await;
        let stranger = EntityId::new();
        assert_eq!(h.engine.get_level(stranger), 1);
        assert_eq!(h.engine.get_multiplier(stranger), 1.0);
        assert_eq!(h.engine.update_experience(stranger, UpdateType::Add, 50.0), 0.0);
        assert!(h.engine.get_record(stranger).is_none());
        assert!(matches!(
            h.engine.try_update_luck(stranger, UpdateType::Add, 1),
            Err(CacheError::NotLoaded { .. })
        ));
    }

    #[tokio::test]
    async fn load_refreshes_name_and_clamps_level() {
        let adapter = Arc::new(MemoryAdapter::new());
        let id = EntityId::new();
        adapter.insert(
            id,
            ProgressionRecord {
                level: 40,
                ..ProgressionRecord::named("old name")
            },
        );
        let dyn_adapter: Arc<dyn PersistenceAdapter<ProgressionRecord>> =
            Arc::clone(&adapter) as _;
        let engine = ProgressionEngine::new(
            "progression",
            rules(10),
            dyn_adapter,
            PersistPolicy::default(),
            Arc::new(NoOpNotifier),
            Handle::current(),
        );
        engine.load(id, "new name").await.unwrap();

        let record = engine.get_record(id).unwrap();
        assert_eq!(record.name, "new name");
        assert_eq!(record.level, 10);
    }

    #[tokio::test]
    async fn unload_persists_progress() {
        let (h, id) = harness(10).await;
        h.engine.update_experience(id, UpdateType::Add, 120.0);
        h.engine.unload(id).await.unwrap();

        let stored = h.adapter.stored(id).unwrap();
        assert_eq!(stored.experience, 120.0);
        assert_eq!(stored.level, 2);
        assert!(!h.engine.is_loaded(id));
    }

    #[tokio::test]
    async fn experience_to_next_level_counts_down() {
        let (h, id) = harness(10).await;
        assert_eq!(h.engine.experience_to_next_level(id), Some(100.0));
        h.engine.update_experience(id, UpdateType::Add, 130.0);
        assert_eq!(h.engine.experience_to_next_level(id), Some(120.0));
    }
}
