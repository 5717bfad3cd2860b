//! The broadcast hub and its subscriptions.

use std::sync::{Arc, Mutex, PoisonError};

use tessera_core::event::{EventRecord, EventSink};
use tokio::sync::mpsc;
use uuid::Uuid;

const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Which entities a subscription wants events for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityFilter {
    /// Every entity (the wildcard `*`).
    All,
    /// One named entity.
    Entity(String),
}

impl EntityFilter {
    /// Parses the wire form: `*` for the wildcard, anything else as an
    /// entity name.
    #[must_use]
    pub fn from_pattern(pattern: &str) -> Self {
        if pattern == "*" {
            Self::All
        } else {
            Self::Entity(pattern.to_owned())
        }
    }

    /// Whether an event for `entity` passes this filter.
    #[must_use]
    pub fn matches(&self, entity: &str) -> bool {
        match self {
            Self::All => true,
            Self::Entity(name) => name == entity,
        }
    }
}

/// Why a subscription stopped receiving events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The consumer could not keep up and its queue filled; the hub evicted
    /// it. Resume with the last received sequence number.
    Overflow,
    /// The subscription was explicitly removed.
    Unsubscribed,
}

#[derive(Debug, Default)]
struct SubscriptionShared {
    close_reason: Mutex<Option<CloseReason>>,
}

/// A live subscription: the receiving half of a bounded event queue.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    rx: mpsc::Receiver<EventRecord>,
    shared: Arc<SubscriptionShared>,
}

impl Subscription {
    /// Subscription identity, used for `unsubscribe`.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Receives the next event; `None` once the subscription is closed and
    /// its queue drained.
    pub async fn recv(&mut self) -> Option<EventRecord> {
        self.rx.recv().await
    }

    /// Receives without waiting; `None` when the queue is currently empty or
    /// closed.
    #[must_use]
    pub fn try_recv(&mut self) -> Option<EventRecord> {
        self.rx.try_recv().ok()
    }

    /// Why the subscription was closed, once it has been.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        *self
            .shared
            .close_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

struct Slot {
    id: Uuid,
    filter: EntityFilter,
    tx: mpsc::Sender<EventRecord>,
    shared: Arc<SubscriptionShared>,
}

impl Slot {
    fn close(&self, reason: CloseReason) {
        *self
            .shared
            .close_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reason);
    }
}

/// Fan-out hub: one bounded queue per subscription, non-blocking publish.
pub struct BroadcastHub {
    capacity: usize,
    slots: Mutex<Vec<Slot>>,
}

impl std::fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl BroadcastHub {
    /// Creates a hub whose subscriptions buffer up to `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Opens a subscription for events matching `filter`.
    #[must_use]
    pub fn subscribe(&self, filter: EntityFilter) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();
        let shared = Arc::new(SubscriptionShared::default());
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Slot {
                id,
                filter,
                tx,
                shared: shared.clone(),
            });
        tracing::debug!(subscription = %id, "subscription opened");
        Subscription { id, rx, shared }
    }

    /// Removes a subscription; its queue closes after draining.
    pub fn unsubscribe(&self, id: Uuid) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(index) = slots.iter().position(|s| s.id == id) {
            let slot = slots.swap_remove(index);
            slot.close(CloseReason::Unsubscribed);
            tracing::debug!(subscription = %id, "subscription removed");
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl EventSink for BroadcastHub {
    /// Pushes one committed event to every matching subscription.
    ///
    /// Called by the event log under its append lock; must stay synchronous
    /// and non-blocking. A subscription whose queue is full is closed with
    /// [`CloseReason::Overflow`] and evicted so it cannot stall anyone else.
    fn publish(&self, event: &EventRecord) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|slot| {
            if !slot.filter.matches(&event.entity) {
                return true;
            }
            match slot.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    slot.close(CloseReason::Overflow);
                    tracing::warn!(
                        subscription = %slot.id,
                        seq = event.seq,
                        "slow subscriber evicted on queue overflow"
                    );
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::event::Operation;
    use tessera_core::principal::Principal;
    use tessera_core::record::FieldMap;

    fn event(seq: u64, entity: &str) -> EventRecord {
        EventRecord {
            seq,
            entity: entity.into(),
            record_id: 1,
            op: Operation::Update,
            before: Some(FieldMap::new()),
            after: Some(FieldMap::new()),
            principal: Principal::anonymous(),
            occurred_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_events_arrive_in_publish_order() {
        let hub = BroadcastHub::new(16);
        let mut sub = hub.subscribe(EntityFilter::All);

        for seq in 1..=5 {
            hub.publish(&event(seq, "users"));
        }

        for expected in 1..=5 {
            assert_eq!(sub.recv().await.unwrap().seq, expected);
        }
    }

    #[tokio::test]
    async fn test_entity_filter_excludes_other_entities() {
        let hub = BroadcastHub::new(16);
        let mut sub = hub.subscribe(EntityFilter::Entity("users".into()));

        hub.publish(&event(1, "orders"));
        hub.publish(&event(2, "users"));

        assert_eq!(sub.recv().await.unwrap().seq, 2);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_wildcard_filter_matches_everything() {
        assert!(EntityFilter::from_pattern("*").matches("anything"));
        assert_eq!(
            EntityFilter::from_pattern("users"),
            EntityFilter::Entity("users".into())
        );
    }

    #[tokio::test]
    async fn test_overflowing_subscriber_is_evicted_without_disturbing_peers() {
        let hub = BroadcastHub::new(2);
        let mut slow = hub.subscribe(EntityFilter::All);
        let mut fast = hub.subscribe(EntityFilter::All);

        // Publish more than the slow consumer's capacity without draining it.
        for seq in 1..=5 {
            hub.publish(&event(seq, "users"));
            // Keep the fast consumer drained.
            assert_eq!(fast.recv().await.unwrap().seq, seq);
        }

        assert_eq!(hub.subscriber_count(), 1);

        // The slow subscription drains what it buffered, then reports the
        // overflow.
        assert_eq!(slow.recv().await.unwrap().seq, 1);
        assert_eq!(slow.recv().await.unwrap().seq, 2);
        assert!(slow.recv().await.is_none());
        assert_eq!(slow.close_reason(), Some(CloseReason::Overflow));
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_after_drain() {
        let hub = BroadcastHub::new(4);
        let mut sub = hub.subscribe(EntityFilter::All);

        hub.publish(&event(1, "users"));
        hub.unsubscribe(sub.id());

        assert_eq!(sub.recv().await.unwrap().seq, 1);
        assert!(sub.recv().await.is_none());
        assert_eq!(sub.close_reason(), Some(CloseReason::Unsubscribed));
        assert_eq!(hub.subscriber_count(), 0);
    }
}
