//! End-to-end tests of the write-back caches over the in-process adapter.
//!
//! These exercise the public API only: configuration into rules and
//! schemas, gameplay mutations from several threads, and the persistence
//! guarantees (unload flushes, retries converge on the latest value).

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::time::Duration;

use progression_core::{
    BroadcastNotifier, KeyedDataCache, KeyedRecord, MemoryAdapter, PersistPolicy,
    PersistenceAdapter, ProgressionConfig, ProgressionEngine,
};
use progression_types::{EntityId, ProgressionRecord, TraitKind, UpdateType};
use tokio::runtime::Handle;

const CONFIG: &str = r#"
leveling:
  max_level: 5
  experience_table:
    2: 100.0
    3: 250.0
    4: 500.0
    5: 1000.0
  point_rewards:
    2: 1
    3: 1
    4: 2
    5: 3
traits:
  karma:
    max_level: 3
domains:
  - name: "counters"
    table: "player_counters"
    keys: ["kills", "deaths", "blocks_mined"]
infrastructure:
  backend: memory
"#;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_experience_gains_are_not_lost() {
    let config = ProgressionConfig::parse(CONFIG).unwrap();
    let adapter = Arc::new(MemoryAdapter::<ProgressionRecord>::new());
    let notifier = Arc::new(BroadcastNotifier::new(64));
    let mut events = notifier.subscribe();
    let dyn_adapter: Arc<dyn PersistenceAdapter<ProgressionRecord>> = Arc::clone(&adapter) as _;

    let engine = ProgressionEngine::open(
        &config.leveling.domain,
        config.rules().unwrap(),
        dyn_adapter,
        config.persistence.policy(),
        notifier,
    )
    .await
    .unwrap();

    let id = EntityId::new();
    engine.load(id, "Alex").await.unwrap();

    let mut workers = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        workers.push(std::thread::spawn(move || {
            for _ in 0..25 {
                engine.update_experience(id, UpdateType::Add, 5.0);
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(engine.get_experience(id), 500.0);
    assert_eq!(engine.get_level(id), 4);
    assert_eq!(engine.get_trait_points(id), 4);

    // Each 5-point gain crosses at most one level.
    let mut reached = Vec::new();
    while let Ok(event) = events.try_recv() {
        reached.push(event.new_level);
    }
    reached.sort_unstable();
    assert_eq!(reached, vec![2, 3, 4]);

    engine.save_all().await.unwrap();
    assert_eq!(adapter.stored(id).unwrap().name, "Alex");
    assert!(adapter.batch_calls() >= 1);
}

#[tokio::test]
async fn keyed_domains_from_config_flush_on_unload() {
    let config = ProgressionConfig::parse(CONFIG).unwrap();
    let schema = config.schemas().unwrap().remove(0);
    let adapter = Arc::new(MemoryAdapter::<KeyedRecord<i64>>::new());
    let dyn_adapter: Arc<dyn PersistenceAdapter<KeyedRecord<i64>>> = Arc::clone(&adapter) as _;
    let counters = KeyedDataCache::open(schema, dyn_adapter, PersistPolicy::default())
        .await
        .unwrap();

    let id = EntityId::new();
    counters.load(id).await.unwrap();
    counters.set(id, "kills", 5);
    counters.increment(id, "blocks_mined");
    counters.add(id, "not_a_key", 9);
    counters.unload(id).await.unwrap();

    let stored = adapter.stored(id).unwrap();
    assert_eq!(stored.get("kills"), Some(&5));
    assert_eq!(stored.get("blocks_mined"), Some(&1));
    assert!(!stored.contains_key("not_a_key"));

    counters.load(id).await.unwrap();
    assert_eq!(counters.get(id, "kills"), 5);
}

#[tokio::test(start_paused = true)]
async fn retried_save_writes_latest_value() {
    let adapter = Arc::new(MemoryAdapter::<KeyedRecord<u64>>::new());
    let schema = progression_core::Schema::new("player_tiers", ["common", "rare"]).unwrap();
    let dyn_adapter: Arc<dyn PersistenceAdapter<KeyedRecord<u64>>> = Arc::clone(&adapter) as _;
    let cache = KeyedDataCache::new(
        schema,
        dyn_adapter,
        PersistPolicy::with_retries(3, Duration::from_millis(100)),
        Handle::current(),
    );

    let id = EntityId::new();
    cache.load(id).await.unwrap();

    adapter.fail_next_saves(1);
    let first = cache.save(id);
    // Lands between the failed attempt and its retry.
    tokio::task::yield_now().await;
    cache.set(id, "rare", 7);

    first.await.unwrap();
    let stored = adapter.stored(id).unwrap();
    assert_eq!(stored.get("rare"), Some(&7));
}

#[tokio::test]
async fn trait_caps_come_from_config() {
    let config = ProgressionConfig::parse(CONFIG).unwrap();
    let dyn_adapter: Arc<dyn PersistenceAdapter<ProgressionRecord>> =
        Arc::new(MemoryAdapter::new());
    let engine = ProgressionEngine::new(
        "progression",
        config.rules().unwrap(),
        dyn_adapter,
        PersistPolicy::default(),
        Arc::new(progression_core::NoOpNotifier),
        Handle::current(),
    );
    let id = EntityId::new();
    engine.load(id, "Sam").await.unwrap();

    assert_eq!(engine.update_trait(id, TraitKind::Karma, UpdateType::Set, 10), 3);
    assert_eq!(engine.update_trait(id, TraitKind::Wisdom, UpdateType::Set, 10), 10);
}
