//! Resumable event streams: replay handoff to live delivery.

use std::collections::VecDeque;
use std::sync::Arc;

use tessera_broadcast::{BroadcastHub, CloseReason, Subscription};
use tessera_core::event::EventRecord;
use uuid::Uuid;

/// An ordered, exactly-once event stream for one subscriber.
///
/// Serves the replayed history first, then switches to the live queue. The
/// cursor (last delivered sequence number) suppresses the overlap between the
/// two, so a reconnecting client that passes its last received `seq` misses
/// nothing and sees nothing twice.
pub struct EventStream {
    replay: VecDeque<EventRecord>,
    subscription: Subscription,
    cursor: u64,
    hub: Arc<BroadcastHub>,
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("cursor", &self.cursor)
            .field("pending_replay", &self.replay.len())
            .finish_non_exhaustive()
    }
}

impl EventStream {
    pub(crate) fn new(
        replay: VecDeque<EventRecord>,
        subscription: Subscription,
        cursor: u64,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        Self {
            replay,
            subscription,
            cursor,
            hub,
        }
    }

    /// Subscription identity.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.subscription.id()
    }

    /// Last delivered sequence number.
    #[must_use]
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Delivers the next event in ascending sequence order, or `None` once
    /// the stream is closed and drained.
    pub async fn next(&mut self) -> Option<EventRecord> {
        while let Some(event) = self.replay.pop_front() {
            if event.seq > self.cursor {
                self.cursor = event.seq;
                return Some(event);
            }
        }
        loop {
            let event = self.subscription.recv().await?;
            if event.seq > self.cursor {
                self.cursor = event.seq;
                return Some(event);
            }
            // Already covered by the replay window.
        }
    }

    /// Why the stream was closed, once it has been. [`CloseReason::Overflow`]
    /// means the consumer fell behind and must resume from its cursor.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.subscription.close_reason()
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.subscription.id());
    }
}
