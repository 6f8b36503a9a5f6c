//! Collide behaviors
//!
//! User callbacks attached to a body and invoked for contacts involving it.
//! Each call is isolated: an `Err` is logged as a warning and a panic is
//! caught and logged as an error, and contact bookkeeping carries on either
//! way. Callbacks cannot touch the world directly; they queue
//! [`BehaviorCommands`] that the world applies once the pass is over.

use crate::arena::{SlotKey, SlotMap};
use crate::body::BodyHandle;
use crate::fixture::FixtureHandle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use void_math2d::Vec2;

/// Error returned by a collide behavior
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct BehaviorError(pub String);

impl BehaviorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Outcome of a pre-solve callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreSolveResponse {
    #[default]
    Continue,
    /// Disable the contact for the current step
    Cancel,
}

/// A contact seen from the side of the body owning the behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactInfo {
    pub our_body: BodyHandle,
    pub our_fixture: FixtureHandle,
    pub other_body: BodyHandle,
    pub other_fixture: FixtureHandle,
    /// World normal pointing away from our body
    pub normal: Vec2,
    pub point_count: usize,
    /// Both fixtures are hard
    pub hard: bool,
}

/// Callback interface for contacts of one body
pub trait CollideBehavior: Send {
    fn pre_solve(
        &mut self,
        _info: &ContactInfo,
        _commands: &mut BehaviorCommands,
    ) -> Result<PreSolveResponse, BehaviorError> {
        Ok(PreSolveResponse::Continue)
    }

    fn collide_begin(&mut self, _info: &ContactInfo, _commands: &mut BehaviorCommands) -> Result<(), BehaviorError> {
        Ok(())
    }

    fn collide_end(&mut self, _info: &ContactInfo, _commands: &mut BehaviorCommands) -> Result<(), BehaviorError> {
        Ok(())
    }
}

/// Shared, lockable behavior
pub type SharedBehavior = Arc<Mutex<dyn CollideBehavior>>;

/// Handle to a registered behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BehaviorHandle(pub(crate) SlotKey);

/// Deferred world mutation requested by a behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BehaviorCommand {
    Unregister(BehaviorHandle),
    WakeBody(BodyHandle),
    ApplyLinearImpulse { body: BodyHandle, impulse: Vec2 },
}

/// Queue of commands filled during a callback pass
#[derive(Debug, Default)]
pub struct BehaviorCommands {
    queue: Vec<BehaviorCommand>,
}

impl BehaviorCommands {
    pub fn unregister(&mut self, handle: BehaviorHandle) {
        self.queue.push(BehaviorCommand::Unregister(handle));
    }

    pub fn wake_body(&mut self, body: BodyHandle) {
        self.queue.push(BehaviorCommand::WakeBody(body));
    }

    pub fn apply_linear_impulse(&mut self, body: BodyHandle, impulse: Vec2) {
        self.queue
            .push(BehaviorCommand::ApplyLinearImpulse { body, impulse });
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, BehaviorCommand> {
        self.queue.drain(..)
    }
}

struct BehaviorEntry {
    body: BodyHandle,
    behavior: SharedBehavior,
}

/// Registry of behaviors keyed by body
#[derive(Default)]
pub struct BehaviorRegistry {
    entries: SlotMap<BehaviorEntry>,
    by_body: HashMap<BodyHandle, Vec<BehaviorHandle>>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<B: CollideBehavior + 'static>(&mut self, body: BodyHandle, behavior: B) -> BehaviorHandle {
        self.register_shared(body, Arc::new(Mutex::new(behavior)))
    }

    pub fn register_shared(&mut self, body: BodyHandle, behavior: SharedBehavior) -> BehaviorHandle {
        let handle = BehaviorHandle(self.entries.insert(BehaviorEntry { body, behavior }));
        self.by_body.entry(body).or_default().push(handle);
        handle
    }

    pub fn unregister(&mut self, handle: BehaviorHandle) -> bool {
        let Some(entry) = self.entries.remove(handle.0) else {
            return false;
        };
        if let Some(list) = self.by_body.get_mut(&entry.body) {
            list.retain(|h| *h != handle);
            if list.is_empty() {
                self.by_body.remove(&entry.body);
            }
        }
        true
    }

    /// Drop every behavior of a destroyed body
    pub fn remove_body(&mut self, body: BodyHandle) {
        for handle in self.by_body.remove(&body).unwrap_or_default() {
            self.entries.remove(handle.0);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_behaviors(&self, body: BodyHandle) -> bool {
        self.by_body.contains_key(&body)
    }

    /// Stable snapshot of a body's behaviors, safe against registry changes
    fn snapshot(&self, body: BodyHandle) -> Vec<(BehaviorHandle, SharedBehavior)> {
        self.by_body
            .get(&body)
            .map(|list| {
                list.iter()
                    .filter_map(|h| self.entries.get(h.0).map(|e| (*h, Arc::clone(&e.behavior))))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Run pre-solve for `info.our_body`; true when any behavior cancelled
    pub(crate) fn pre_solve(&self, info: &ContactInfo, commands: &mut BehaviorCommands) -> bool {
        let mut cancel = false;
        for (handle, behavior) in self.snapshot(info.our_body) {
            let response = invoke(handle, "pre_solve", || behavior.lock().pre_solve(info, commands));
            cancel |= response == Some(PreSolveResponse::Cancel);
        }
        cancel
    }

    pub(crate) fn collide_begin(&self, info: &ContactInfo, commands: &mut BehaviorCommands) {
        for (handle, behavior) in self.snapshot(info.our_body) {
            invoke(handle, "collide_begin", || behavior.lock().collide_begin(info, commands));
        }
    }

    pub(crate) fn collide_end(&self, info: &ContactInfo, commands: &mut BehaviorCommands) {
        for (handle, behavior) in self.snapshot(info.our_body) {
            invoke(handle, "collide_end", || behavior.lock().collide_end(info, commands));
        }
    }
}

/// Call a behavior, isolating errors and panics
fn invoke<R>(
    handle: BehaviorHandle,
    callback: &str,
    f: impl FnOnce() -> Result<R, BehaviorError>,
) -> Option<R> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(result)) => Some(result),
        Ok(Err(e)) => {
            log::warn!("Collide behavior {:?} failed in {}: {}", handle, callback, e);
            None
        }
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            log::error!("Collide behavior {:?} panicked in {}: {}", handle, callback, message);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canceller;

    impl CollideBehavior for Canceller {
        fn pre_solve(
            &mut self,
            _info: &ContactInfo,
            commands: &mut BehaviorCommands,
        ) -> Result<PreSolveResponse, BehaviorError> {
            commands.wake_body(BodyHandle(SlotKey::new(9, 0)));
            Ok(PreSolveResponse::Cancel)
        }
    }

    struct Faulty;

    impl CollideBehavior for Faulty {
        fn pre_solve(
            &mut self,
            _info: &ContactInfo,
            _commands: &mut BehaviorCommands,
        ) -> Result<PreSolveResponse, BehaviorError> {
            panic!("behavior exploded")
        }

        fn collide_begin(&mut self, _info: &ContactInfo, _commands: &mut BehaviorCommands) -> Result<(), BehaviorError> {
            Err(BehaviorError::new("refused"))
        }
    }

    fn info(body: BodyHandle) -> ContactInfo {
        ContactInfo {
            our_body: body,
            our_fixture: FixtureHandle(SlotKey::new(0, 0)),
            other_body: BodyHandle(SlotKey::new(1, 0)),
            other_fixture: FixtureHandle(SlotKey::new(1, 0)),
            normal: Vec2::X,
            point_count: 1,
            hard: true,
        }
    }

    #[test]
    fn test_cancel_and_commands() {
        let body = BodyHandle(SlotKey::new(0, 0));
        let mut registry = BehaviorRegistry::new();
        registry.register(body, Canceller);

        let mut commands = BehaviorCommands::default();
        assert!(registry.pre_solve(&info(body), &mut commands));
        assert_eq!(commands.drain().count(), 1);
    }

    #[test]
    fn test_faults_are_isolated() {
        let body = BodyHandle(SlotKey::new(0, 0));
        let mut registry = BehaviorRegistry::new();
        registry.register(body, Faulty);
        registry.register(body, Canceller);

        let mut commands = BehaviorCommands::default();
        // The panicking behavior does not stop the second one from running
        assert!(registry.pre_solve(&info(body), &mut commands));
        registry.collide_begin(&info(body), &mut commands);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unregister_and_remove_body() {
        let body = BodyHandle(SlotKey::new(0, 0));
        let mut registry = BehaviorRegistry::new();
        let a = registry.register(body, Canceller);
        registry.register(body, Faulty);

        assert!(registry.unregister(a));
        assert!(!registry.unregister(a));
        registry.remove_body(body);
        assert!(registry.is_empty());
        assert!(!registry.has_behaviors(body));
    }
}
