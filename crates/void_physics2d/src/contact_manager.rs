//! Contact manager
//!
//! Owns the broadphase and every live [`Contact`]. New pairs come from
//! broadphase queries around awake bodies; existing contacts are updated with
//! fresh manifolds each step and destroyed once their fat AABBs separate or
//! their filter stops admitting them.

use crate::arena::SlotMap;
use crate::body::{Body, BodyHandle};
use crate::broadphase::{BroadPhase, TreeMargins};
use crate::contact::{Contact, ContactHandle, ContactKey};
use crate::fixture::{Fixture, FixtureHandle};
use crate::joint::relay::effective_body;
use crate::joint::Joint;
use crate::narrowphase::{self, Manifold};
use std::collections::{HashMap, HashSet};
use void_math2d::{Transform2, Vec2};

/// Touching state change produced by a contact update
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ContactTransition {
    Began(ContactHandle),
    Ended(EndedContact),
}

/// Identity of a contact that stopped touching, possibly already destroyed
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct EndedContact {
    pub fixture_a: FixtureHandle,
    pub fixture_b: FixtureHandle,
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
}

impl EndedContact {
    fn of(contact: &Contact) -> Self {
        Self {
            fixture_a: contact.fixture_a,
            fixture_b: contact.fixture_b,
            body_a: contact.body_a,
            body_b: contact.body_b,
        }
    }
}

pub struct ContactManager {
    pub(crate) broadphase: BroadPhase,
    pub(crate) contacts: SlotMap<Contact>,
    pairs: HashMap<ContactKey, ContactHandle>,
    /// Pairs already evaluated since the last post-solve
    seen: HashSet<ContactKey>,
    scratch: Vec<FixtureHandle>,
    pairs_created: usize,
}

impl ContactManager {
    pub fn new(margins: TreeMargins) -> Self {
        Self {
            broadphase: BroadPhase::new(margins),
            contacts: SlotMap::new(),
            pairs: HashMap::new(),
            seen: HashSet::new(),
            scratch: Vec::new(),
            pairs_created: 0,
        }
    }

    pub fn broadphase(&self) -> &BroadPhase {
        &self.broadphase
    }

    pub fn contact(&self, handle: ContactHandle) -> Option<&Contact> {
        self.contacts.get(handle.0)
    }

    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contacts.iter().map(|(_, c)| c)
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// Contact for a fixture pair, in either order
    pub fn find(
        &self,
        a: (BodyHandle, FixtureHandle),
        b: (BodyHandle, FixtureHandle),
    ) -> Option<ContactHandle> {
        self.pairs.get(&ContactKey::new(a, b)).copied()
    }

    /// Contacts created since the counter was last taken
    pub(crate) fn take_pairs_created(&mut self) -> usize {
        std::mem::take(&mut self.pairs_created)
    }

    // ==================== Proxies ====================

    pub(crate) fn create_proxy(&mut self, fixture: &mut Fixture, xf: &Transform2) {
        fixture.aabb = fixture.shape.compute_aabb(xf);
        fixture.proxy = Some(self.broadphase.insert(fixture.aabb, fixture.handle));
    }

    pub(crate) fn destroy_proxy(&mut self, fixture: &mut Fixture) {
        if let Some(proxy) = fixture.proxy.take() {
            self.broadphase.remove(proxy);
        }
    }

    /// Refit a fixture's proxy after its body moved by `displacement`
    pub(crate) fn synchronize(&mut self, fixture: &mut Fixture, xf: &Transform2, displacement: Vec2) {
        fixture.aabb = fixture.shape.compute_aabb(xf);
        if let Some(proxy) = fixture.proxy {
            self.broadphase.move_proxy(proxy, fixture.aabb, displacement);
        }
    }

    // ==================== Pair creation ====================

    /// Create contacts for new broadphase pairs around awake bodies
    pub(crate) fn find_new_contacts(
        &mut self,
        bodies: &mut SlotMap<Body>,
        fixtures: &SlotMap<Fixture>,
        joints: &SlotMap<Joint>,
    ) {
        let queried: Vec<FixtureHandle> = bodies
            .iter()
            .filter(|(_, b)| b.awake && !b.body_type.is_static() && b.can_collide)
            .flat_map(|(_, b)| b.fixtures.iter().copied())
            .collect();

        let mut candidates = std::mem::take(&mut self.scratch);
        for fixture_a in queried {
            let Some(proxy) = fixtures.get(fixture_a.0).and_then(|f| f.proxy) else {
                continue;
            };
            candidates.clear();
            self.broadphase.query_proxy(proxy, &mut candidates);
            for &fixture_b in candidates.iter() {
                self.add_pair(fixture_a, fixture_b, bodies, fixtures, joints);
            }
        }
        candidates.clear();
        self.scratch = candidates;
    }

    fn add_pair(
        &mut self,
        fixture_a: FixtureHandle,
        fixture_b: FixtureHandle,
        bodies: &mut SlotMap<Body>,
        fixtures: &SlotMap<Fixture>,
        joints: &SlotMap<Joint>,
    ) {
        let (Some(fa), Some(fb)) = (fixtures.get(fixture_a.0), fixtures.get(fixture_b.0)) else {
            return;
        };
        if fa.body == fb.body {
            return;
        }

        let key = ContactKey::new((fa.body, fixture_a), (fb.body, fixture_b));
        if !self.seen.insert(key) || self.pairs.contains_key(&key) {
            return;
        }
        if !Self::pair_allowed(fa, fb, bodies, joints) {
            return;
        }

        let (fa, fb) = if narrowphase::should_swap(fa.shape.shape_type(), fb.shape.shape_type()) {
            (fb, fa)
        } else {
            (fa, fb)
        };

        let handle = ContactHandle(self.contacts.insert_with_key(|slot| Contact {
            handle: ContactHandle(slot),
            key,
            fixture_a: fa.handle,
            fixture_b: fb.handle,
            body_a: fa.body,
            body_b: fb.body,
            manifold: Manifold::EMPTY,
            friction: fa.material.combine_friction(&fb.material),
            restitution: fa.material.combine_restitution(&fb.material),
            touching: false,
            enabled: true,
            sensor: !fa.hard || !fb.hard,
            filter_dirty: false,
            island_flag: false,
        }));
        self.pairs.insert(key, handle);
        self.pairs_created += 1;

        for body in [fa.body, fb.body] {
            if let Some(b) = bodies.get_mut(body.0) {
                b.contacts.push(handle);
            }
        }
    }

    /// Whether two fixtures may have a contact at all
    fn pair_allowed(fa: &Fixture, fb: &Fixture, bodies: &SlotMap<Body>, joints: &SlotMap<Joint>) -> bool {
        let (Some(body_a), Some(body_b)) = (bodies.get(fa.body.0), bodies.get(fb.body.0)) else {
            return false;
        };
        if !body_a.body_type.should_collide(body_b.body_type) {
            return false;
        }
        if !body_a.can_collide || !body_b.can_collide {
            return false;
        }
        if !fa.groups.can_collide(&fb.groups) {
            return false;
        }
        if !narrowphase::shapes_can_touch(fa.shape.shape_type(), fb.shape.shape_type()) {
            return false;
        }

        // Jointed bodies only collide when the joint asks for it
        let edge_a = effective_body(bodies, fa.body);
        let edge_b = effective_body(bodies, fb.body);
        let Some(edge_body) = bodies.get(edge_a.0) else {
            return true;
        };
        !edge_body
            .joints
            .iter()
            .filter_map(|j| joints.get(j.0))
            .any(|j| j.connects(edge_a, edge_b) && !j.collide_connected)
    }

    // ==================== Update ====================

    /// Refresh manifolds of every contact touching an awake body
    ///
    /// Contacts whose fat AABBs separated or whose filter no longer admits
    /// them are destroyed.
    pub(crate) fn collide(
        &mut self,
        bodies: &mut SlotMap<Body>,
        fixtures: &SlotMap<Fixture>,
        joints: &SlotMap<Joint>,
    ) -> Vec<ContactTransition> {
        let mut transitions = Vec::new();
        let handles: Vec<ContactHandle> = self.contacts.keys().map(ContactHandle).collect();

        for handle in handles {
            let Some(contact) = self.contacts.get(handle.0) else {
                continue;
            };
            let (Some(fa), Some(fb)) = (
                fixtures.get(contact.fixture_a.0),
                fixtures.get(contact.fixture_b.0),
            ) else {
                transitions.extend(self.destroy(handle, bodies).map(ContactTransition::Ended));
                continue;
            };
            let (Some(body_a), Some(body_b)) = (bodies.get(fa.body.0), bodies.get(fb.body.0)) else {
                transitions.extend(self.destroy(handle, bodies).map(ContactTransition::Ended));
                continue;
            };

            if !body_a.awake && !body_b.awake {
                continue;
            }

            if contact.filter_dirty && !Self::pair_allowed(fa, fb, bodies, joints) {
                transitions.extend(self.destroy(handle, bodies).map(ContactTransition::Ended));
                continue;
            }

            let overlapping = match (fa.proxy, fb.proxy) {
                (Some(pa), Some(pb)) => self.broadphase.test_overlap(pa, pb),
                _ => false,
            };
            if !overlapping {
                transitions.extend(self.destroy(handle, bodies).map(ContactTransition::Ended));
                continue;
            }

            let mut manifold = narrowphase::collide(&fa.shape, &body_a.xf, &fb.shape, &body_b.xf);
            let friction = fa.material.combine_friction(&fb.material);
            let restitution = fa.material.combine_restitution(&fb.material);
            let sensor = !fa.hard || !fb.hard;

            let Some(contact) = self.contacts.get_mut(handle.0) else {
                continue;
            };
            manifold.carry_impulses_from(&contact.manifold);
            let was_touching = contact.touching;
            contact.manifold = manifold;
            contact.touching = manifold.point_count > 0;
            contact.friction = friction;
            contact.restitution = restitution;
            contact.sensor = sensor;
            contact.filter_dirty = false;

            match (was_touching, contact.touching) {
                (false, true) => transitions.push(ContactTransition::Began(handle)),
                (true, false) => transitions.push(ContactTransition::Ended(EndedContact::of(contact))),
                _ => {}
            }
        }

        transitions
    }

    /// Clear per-step bookkeeping and re-enable contacts cancelled this step
    pub(crate) fn post_solve(&mut self) {
        self.seen.clear();
        for contact in self.contacts.values_mut() {
            contact.enabled = true;
        }
    }

    // ==================== Destruction ====================

    /// Destroy a contact; returns its identity when it was touching
    pub(crate) fn destroy(&mut self, handle: ContactHandle, bodies: &mut SlotMap<Body>) -> Option<EndedContact> {
        let contact = self.contacts.remove(handle.0)?;
        self.pairs.remove(&contact.key);
        for body in [contact.body_a, contact.body_b] {
            if let Some(b) = bodies.get_mut(body.0) {
                b.contacts.retain(|c| *c != handle);
            }
        }
        contact.touching.then(|| EndedContact::of(&contact))
    }

    /// Destroy every contact that references `fixture`
    pub(crate) fn destroy_fixture_contacts(
        &mut self,
        fixture: FixtureHandle,
        body: BodyHandle,
        bodies: &mut SlotMap<Body>,
    ) -> Vec<EndedContact> {
        let handles: Vec<ContactHandle> = bodies
            .get(body.0)
            .map(|b| b.contacts.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|h| {
                self.contacts
                    .get(h.0)
                    .is_some_and(|c| c.fixture_a == fixture || c.fixture_b == fixture)
            })
            .collect();
        handles
            .into_iter()
            .filter_map(|h| self.destroy(h, bodies))
            .collect()
    }

    /// Destroy every contact of `body`
    pub(crate) fn destroy_body_contacts(&mut self, body: BodyHandle, bodies: &mut SlotMap<Body>) -> Vec<EndedContact> {
        let handles = bodies.get(body.0).map(|b| b.contacts.clone()).unwrap_or_default();
        handles
            .into_iter()
            .filter_map(|h| self.destroy(h, bodies))
            .collect()
    }

    /// Re-check the filter of every contact of `body` on the next update
    pub(crate) fn flag_body_filter(&mut self, body: &Body) {
        for handle in &body.contacts {
            if let Some(contact) = self.contacts.get_mut(handle.0) {
                contact.filter_dirty = true;
            }
        }
    }

    /// Re-check the filter of every contact of `fixture` on the next update
    pub(crate) fn flag_fixture_filter(&mut self, fixture: FixtureHandle, body: &Body) {
        for handle in &body.contacts {
            if let Some(contact) = self.contacts.get_mut(handle.0) {
                if contact.fixture_a == fixture || contact.fixture_b == fixture {
                    contact.filter_dirty = true;
                }
            }
        }
    }

    /// Mutable access for pre-solve cancellation
    pub(crate) fn contact_mut(&mut self, handle: ContactHandle) -> Option<&mut Contact> {
        self.contacts.get_mut(handle.0)
    }
}
