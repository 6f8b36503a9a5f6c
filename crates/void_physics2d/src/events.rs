//! Physics events (collisions, sleep/wake, joint breaks)

use crate::body::BodyHandle;
use crate::fixture::FixtureHandle;
use crate::joint::JointHandle;
use crate::narrowphase::WorldManifold;
use crossbeam_channel::{Receiver, Sender};

/// Event raised by a physics tick
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicsEvent {
    /// Two fixtures started touching
    CollisionBegin {
        fixture_a: FixtureHandle,
        fixture_b: FixtureHandle,
        body_a: BodyHandle,
        body_b: BodyHandle,
        /// Contact points at the time of the event, normal from A to B
        manifold: WorldManifold,
    },
    /// Two fixtures stopped touching
    CollisionEnd {
        fixture_a: FixtureHandle,
        fixture_b: FixtureHandle,
        body_a: BodyHandle,
        body_b: BodyHandle,
    },
    BodyWoke(BodyHandle),
    BodySlept(BodyHandle),
    /// Joint exceeded its break impulse and was removed
    JointBroken { joint: JointHandle, impulse: f32 },
    /// Body state went non-finite; it was reset and put to sleep
    SolverDiverged(BodyHandle),
}

impl PhysicsEvent {
    /// Check if this is a collision begin event
    pub fn is_collision_begin(&self) -> bool {
        matches!(self, Self::CollisionBegin { .. })
    }

    /// Check if this is a collision end event
    pub fn is_collision_end(&self) -> bool {
        matches!(self, Self::CollisionEnd { .. })
    }

    /// Whether the event concerns `body`
    pub fn involves(&self, body: BodyHandle) -> bool {
        match self {
            Self::CollisionBegin { body_a, body_b, .. } | Self::CollisionEnd { body_a, body_b, .. } => {
                *body_a == body || *body_b == body
            }
            Self::BodyWoke(b) | Self::BodySlept(b) | Self::SolverDiverged(b) => *b == body,
            Self::JointBroken { .. } => false,
        }
    }
}

/// Batches events per tick and fans them out to channel subscribers
#[derive(Default)]
pub struct EventCollector {
    /// Events published by the last completed tick
    events: Vec<PhysicsEvent>,
    /// Events raised by the tick in progress
    pending: Vec<PhysicsEvent>,
    subscribers: Vec<Sender<PhysicsEvent>>,
}

impl EventCollector {
    /// Create a new event collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every published event from now on
    pub fn subscribe(&mut self) -> Receiver<PhysicsEvent> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.subscribers.push(sender);
        receiver
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub(crate) fn push(&mut self, event: PhysicsEvent) {
        self.pending.push(event);
    }

    /// Close the current tick
    ///
    /// Prediction ticks discard their events so nothing becomes visible.
    pub(crate) fn publish(&mut self, is_prediction: bool) {
        self.events.clear();
        if is_prediction {
            self.pending.clear();
            return;
        }
        std::mem::swap(&mut self.events, &mut self.pending);

        let events = &self.events;
        self.subscribers.retain(|sender| {
            events
                .iter()
                .all(|event| sender.send(event.clone()).is_ok())
        });
    }

    /// Events of the last published tick
    pub fn events(&self) -> &[PhysicsEvent] {
        &self.events
    }

    /// Collision begin events of the last tick
    pub fn collision_begins(&self) -> impl Iterator<Item = &PhysicsEvent> {
        self.events.iter().filter(|e| e.is_collision_begin())
    }

    /// Collision end events of the last tick
    pub fn collision_ends(&self) -> impl Iterator<Item = &PhysicsEvent> {
        self.events.iter().filter(|e| e.is_collision_end())
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::SlotKey;

    fn body(i: u32) -> BodyHandle {
        BodyHandle(SlotKey::new(i, 0))
    }

    #[test]
    fn test_publish_fans_out_to_subscribers() {
        let mut collector = EventCollector::new();
        let rx = collector.subscribe();

        collector.push(PhysicsEvent::BodyWoke(body(1)));
        assert!(collector.events().is_empty());
        collector.publish(false);

        assert_eq!(collector.events().len(), 1);
        assert_eq!(rx.try_recv().ok(), Some(PhysicsEvent::BodyWoke(body(1))));
    }

    #[test]
    fn test_prediction_publishes_nothing() {
        let mut collector = EventCollector::new();
        let rx = collector.subscribe();

        collector.push(PhysicsEvent::BodySlept(body(2)));
        collector.publish(true);

        assert!(collector.events().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disconnected_subscribers_are_dropped() {
        let mut collector = EventCollector::new();
        drop(collector.subscribe());
        let _live = collector.subscribe();

        collector.push(PhysicsEvent::BodyWoke(body(0)));
        collector.publish(false);
        assert_eq!(collector.subscriber_count(), 1);
    }
}
