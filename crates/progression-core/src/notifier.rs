//! Level transition notifications.
//!
//! The engine calls [`LevelTransitionNotifier::on_level_up`] once per
//! mutation that crossed at least one level, after the entity's entry lock
//! has been released. Implementations run on the caller's thread and must
//! not block.

use progression_types::LevelUpEvent;
use tokio::sync::broadcast;

/// Receiver of level-up events.
pub trait LevelTransitionNotifier: Send + Sync {
    /// Handle one level transition.
    fn on_level_up(&self, event: &LevelUpEvent);
}

/// Notifier that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNotifier;

impl LevelTransitionNotifier for NoOpNotifier {
    fn on_level_up(&self, _event: &LevelUpEvent) {}
}

/// Notifier that emits one structured `info` record per event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl LevelTransitionNotifier for TracingNotifier {
    fn on_level_up(&self, event: &LevelUpEvent) {
        tracing::info!(
            entity = %event.entity,
            domain = %event.domain,
            previous_level = event.previous_level,
            new_level = event.new_level,
            trait_points = event.trait_points,
            "Entity leveled up"
        );
    }
}

/// Notifier that fans events out over a tokio broadcast channel.
///
/// Used by the presentation layer (chat messages, titles, sounds). Events
/// sent while nobody is subscribed are dropped; slow subscribers observe
/// `RecvError::Lagged` rather than blocking the engine.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<LevelUpEvent>,
}

impl BroadcastNotifier {
    /// Create a notifier whose channel buffers `capacity` events.
    ///
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to future level-up events.
    pub fn subscribe(&self) -> broadcast::Receiver<LevelUpEvent> {
        self.tx.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl LevelTransitionNotifier for BroadcastNotifier {
    fn on_level_up(&self, event: &LevelUpEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use progression_types::EntityId;

    use super::*;

    fn event() -> LevelUpEvent {
        LevelUpEvent {
            entity: EntityId::new(),
            domain: "progression".to_owned(),
            previous_level: 2,
            new_level: 3,
            trait_points: 4,
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn broadcast_delivers_to_subscribers() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 1);

        let sent = event();
        notifier.on_level_up(&sent);
        assert_eq!(rx.recv().await.unwrap(), sent);
    }

    #[test]
    fn broadcast_without_subscribers_is_silent() {
        let notifier = BroadcastNotifier::new(0);
        notifier.on_level_up(&event());
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn noop_and_tracing_accept_events() {
        let event = event();
        NoOpNotifier.on_level_up(&event);
        TracingNotifier.on_level_up(&event);
    }
}
