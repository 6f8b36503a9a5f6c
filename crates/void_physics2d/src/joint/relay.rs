//! Joint relay
//!
//! A body placed inside a container hands its joints to the container's
//! outermost ancestor. The body remembers its relay target and the target
//! keeps the reverse set, so either side can tear the relation down.

use super::{Joint, JointHandle};
use crate::arena::SlotMap;
use crate::body::{Body, BodyHandle};
use std::collections::{HashMap, HashSet};

/// Container hierarchy supplied by the world-management collaborator
pub trait ContainerQuery {
    /// Direct container of `body`, if any
    fn container_of(&self, body: BodyHandle) -> Option<BodyHandle>;
}

/// No body is ever contained
impl ContainerQuery for () {
    fn container_of(&self, _body: BodyHandle) -> Option<BodyHandle> {
        None
    }
}

/// Plain parent map, enough for hosts without their own hierarchy
#[derive(Debug, Clone, Default)]
pub struct ContainerMap {
    parents: HashMap<BodyHandle, BodyHandle>,
}

impl ContainerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `body` inside `container`
    pub fn insert(&mut self, body: BodyHandle, container: BodyHandle) {
        self.parents.insert(body, container);
    }

    /// Take `body` out of its container
    pub fn remove(&mut self, body: BodyHandle) -> Option<BodyHandle> {
        self.parents.remove(&body)
    }
}

impl ContainerQuery for ContainerMap {
    fn container_of(&self, body: BodyHandle) -> Option<BodyHandle> {
        self.parents.get(&body).copied()
    }
}

/// Outermost container ancestor of `body`, stopping at the first repeat
pub fn outermost_container(body: BodyHandle, query: &dyn ContainerQuery) -> Option<BodyHandle> {
    let mut visited = HashSet::new();
    visited.insert(body);

    let mut outermost = None;
    let mut current = body;
    while let Some(parent) = query.container_of(current) {
        if !visited.insert(parent) {
            log::warn!("Container cycle detected at {:?}", parent);
            break;
        }
        outermost = Some(parent);
        current = parent;
    }
    outermost
}

/// Body the solver actually uses in place of `body`
pub(crate) fn effective_body(bodies: &SlotMap<Body>, body: BodyHandle) -> BodyHandle {
    bodies
        .get(body.0)
        .and_then(|b| b.relay)
        .filter(|target| bodies.contains_key(target.0))
        .unwrap_or(body)
}

/// Point `body`'s relay at `target`, updating reverse sets and joint edges
///
/// Returns the bodies that must be woken. Does nothing when the target is
/// unchanged.
pub(crate) fn set_relay(
    bodies: &mut SlotMap<Body>,
    joints: &mut SlotMap<Joint>,
    body: BodyHandle,
    target: Option<BodyHandle>,
) -> Vec<BodyHandle> {
    let mut woken = Vec::new();
    let target = target.filter(|t| *t != body && bodies.contains_key(t.0));

    let old = match bodies.get(body.0) {
        Some(b) => b.relay,
        None => return woken,
    };
    if old == target {
        return woken;
    }

    if let Some(old_target) = old {
        if let Some(t) = bodies.get_mut(old_target.0) {
            t.relayed.remove(&body);
            if t.relayed.is_empty() {
                woken.push(old_target);
            }
        }
    }

    if let Some(b) = bodies.get_mut(body.0) {
        b.relay = target;
    }

    if let Some(new_target) = target {
        if let Some(t) = bodies.get_mut(new_target.0) {
            t.relayed.insert(body);
            woken.push(new_target);
        }
    }

    log::debug!("Relay of {:?} changed from {:?} to {:?}", body, old, target);

    let declared: Vec<JointHandle> = joints
        .iter()
        .filter(|(_, j)| j.body_a == body || j.body_b == body)
        .map(|(_, j)| j.handle)
        .collect();
    for handle in declared {
        woken.extend(refresh_joint_edges(bodies, joints, handle));
    }

    woken
}

/// Recompute a joint's effective endpoints and move its adjacency entries
pub(crate) fn refresh_joint_edges(
    bodies: &mut SlotMap<Body>,
    joints: &mut SlotMap<Joint>,
    handle: JointHandle,
) -> Vec<BodyHandle> {
    let Some(joint) = joints.get(handle.0) else {
        return Vec::new();
    };
    let (old_a, old_b) = (joint.edge_a, joint.edge_b);
    let new_a = effective_body(bodies, joint.body_a);
    let new_b = effective_body(bodies, joint.body_b);
    if (old_a, old_b) == (new_a, new_b) {
        return Vec::new();
    }

    for edge in [old_a, old_b] {
        if let Some(b) = bodies.get_mut(edge.0) {
            b.joints.retain(|j| *j != handle);
        }
    }
    for edge in [new_a, new_b] {
        if let Some(b) = bodies.get_mut(edge.0) {
            if !b.joints.contains(&handle) {
                b.joints.push(handle);
            }
        }
    }
    if let Some(joint) = joints.get_mut(handle.0) {
        joint.edge_a = new_a;
        joint.edge_b = new_b;
    }

    vec![old_a, old_b, new_a, new_b]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::SlotKey;

    fn handle(i: u32) -> BodyHandle {
        BodyHandle(SlotKey::new(i, 0))
    }

    #[test]
    fn test_outermost_container_walks_to_root() {
        let mut map = ContainerMap::new();
        map.insert(handle(0), handle(1));
        map.insert(handle(1), handle(2));
        assert_eq!(outermost_container(handle(0), &map), Some(handle(2)));
        assert_eq!(outermost_container(handle(2), &map), None);

        map.remove(handle(1));
        assert_eq!(outermost_container(handle(0), &map), Some(handle(1)));
    }

    #[test]
    fn test_container_cycle_terminates() {
        let mut map = ContainerMap::new();
        map.insert(handle(0), handle(1));
        map.insert(handle(1), handle(0));
        assert_eq!(outermost_container(handle(0), &map), Some(handle(1)));
    }
}
