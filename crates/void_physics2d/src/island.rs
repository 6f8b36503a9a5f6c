//! Island management
//!
//! Awake bodies are partitioned into islands: connected components of the
//! graph formed by touching contacts and active joints. Each island is solved
//! on its own, so islands never share a body. Static bodies are never part of
//! an island, and kinematic bodies only ever join the lone island since they
//! do not carry impulses between the bodies they touch.

use crate::arena::SlotMap;
use crate::body::{Body, BodyHandle, BodyType};
use crate::contact::{Contact, ContactHandle};
use crate::fixture::Fixture;
use crate::joint::{Joint, JointAnchors, JointHandle};
use crate::solver::{ContactConstraint, IslandJoint, IslandSolver, StepContext};
use void_math2d::Vec2;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Index of an island in the manager's pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IslandId(pub(crate) usize);

/// A group of bodies solved together
#[derive(Debug, Default)]
pub struct Island {
    pub(crate) bodies: Vec<BodyHandle>,
    pub(crate) contacts: Vec<ContactHandle>,
    pub(crate) joints: Vec<JointHandle>,
    body_capacity: usize,
    contact_capacity: usize,
    joint_capacity: usize,
    pub(crate) active: bool,
    is_lone: bool,
    pub(crate) solver: IslandSolver,
}

/// What the world has to apply after islands were solved
#[derive(Debug, Default)]
pub(crate) struct SolveReport {
    /// Bodies written back, with their center-of-mass displacement
    pub moved: Vec<(BodyHandle, Vec2)>,
    pub diverged: Vec<BodyHandle>,
    pub broken_joints: Vec<(JointHandle, f32)>,
    pub sleepers: Vec<BodyHandle>,
}

impl Island {
    fn with_capacity(bodies: usize, contacts: usize, joints: usize) -> Self {
        Self {
            bodies: Vec::with_capacity(bodies),
            contacts: Vec::with_capacity(contacts),
            joints: Vec::with_capacity(joints),
            body_capacity: bodies,
            contact_capacity: contacts,
            joint_capacity: joints,
            active: false,
            is_lone: false,
            solver: IslandSolver::default(),
        }
    }

    /// Copy the island's bodies, contacts and joints into its solver
    pub(crate) fn load_solver(
        &mut self,
        bodies: &SlotMap<Body>,
        fixtures: &SlotMap<Fixture>,
        contacts: &SlotMap<Contact>,
        joints: &SlotMap<Joint>,
    ) {
        let solver = &mut self.solver;
        solver.clear();
        solver.lone = self.is_lone;

        for handle in &self.bodies {
            if let Some(body) = bodies.get(handle.0) {
                solver.push_body(body, true);
            }
        }

        for (index, handle) in self.contacts.iter().enumerate() {
            let Some(contact) = contacts.get(handle.0) else {
                continue;
            };
            let (Some(fa), Some(fb)) = (fixtures.get(contact.fixture_a.0), fixtures.get(contact.fixture_b.0)) else {
                continue;
            };
            let (Some(ba), Some(bb)) = (bodies.get(contact.body_a.0), bodies.get(contact.body_b.0)) else {
                continue;
            };
            let index_a = solver.push_body(ba, false);
            let index_b = solver.push_body(bb, false);
            solver.push_contact(ContactConstraint::new(
                index,
                index_a,
                index_b,
                contact.manifold,
                fa.shape.radius(),
                fb.shape.radius(),
                contact.friction,
                contact.restitution,
            ));
        }

        for handle in &self.joints {
            let Some(joint) = joints.get(handle.0) else {
                continue;
            };
            let (Some(ba), Some(bb)) = (bodies.get(joint.edge_a.0), bodies.get(joint.edge_b.0)) else {
                continue;
            };
            let index_a = solver.push_body(ba, false);
            let index_b = solver.push_body(bb, false);
            solver.push_joint(IslandJoint {
                handle: *handle,
                kind: joint.kind.clone(),
                anchors: JointAnchors {
                    index_a,
                    index_b,
                    local_anchor_a: joint.local_anchor_a,
                    local_anchor_b: joint.local_anchor_b,
                },
                break_impulse: joint.break_impulse,
            });
        }
    }

    /// Write solver results back into the world
    pub(crate) fn store_solver(
        &mut self,
        bodies: &mut SlotMap<Body>,
        contacts: &mut SlotMap<Contact>,
        joints: &mut SlotMap<Joint>,
        report: &mut SolveReport,
    ) {
        let solver = &mut self.solver;

        for (sb, state) in solver.bodies.iter().zip(solver.states.iter()) {
            if !state.owned {
                continue;
            }
            let Some(body) = bodies.get_mut(state.handle.0) else {
                continue;
            };
            let old_center = body.center;
            body.center = sb.c;
            body.angle = sb.a;
            body.linear_velocity = sb.v;
            body.angular_velocity = sb.w;
            body.sleep_time = state.sleep_time;
            body.synchronize_transform();
            report.moved.push((state.handle, sb.c - old_center));
        }

        for constraint in &solver.contacts.constraints {
            let Some(handle) = self.contacts.get(constraint.contact_index) else {
                continue;
            };
            if let Some(contact) = contacts.get_mut(handle.0) {
                contact.manifold = constraint.manifold;
            }
        }

        for island_joint in solver.joints.iter_mut() {
            if let Some(joint) = joints.get_mut(island_joint.handle.0) {
                std::mem::swap(&mut joint.kind, &mut island_joint.kind);
            }
        }

        let outcome = &solver.outcome;
        report
            .diverged
            .extend(outcome.diverged.iter().map(|&i| solver.states[i].handle));
        report.broken_joints.extend_from_slice(&outcome.broken_joints);
        if outcome.sleep_island {
            report.sleepers.extend(
                solver
                    .states
                    .iter()
                    .filter(|s| s.owned)
                    .map(|s| s.handle),
            );
        } else {
            report
                .sleepers
                .extend(outcome.sleepers.iter().map(|&i| solver.states[i].handle));
        }
    }

    #[inline]
    pub fn bodies(&self) -> &[BodyHandle] {
        &self.bodies
    }

    #[inline]
    pub fn contacts(&self) -> &[ContactHandle] {
        &self.contacts
    }

    #[inline]
    pub fn joints(&self) -> &[JointHandle] {
        &self.joints
    }

    /// `(bodies, contacts, joints)` the island can hold without growing
    pub fn capacity(&self) -> (usize, usize, usize) {
        (self.body_capacity, self.contact_capacity, self.joint_capacity)
    }

    fn total_capacity(&self) -> usize {
        self.body_capacity + self.contact_capacity + self.joint_capacity
    }

    fn fits(&self, bodies: usize, contacts: usize, joints: usize) -> bool {
        self.body_capacity >= bodies
            && self.contact_capacity >= contacts
            && self.joint_capacity >= joints
    }

    fn reset(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
        self.active = false;
    }
}

/// Pools islands across ticks and builds them from the constraint graph
#[derive(Debug)]
pub struct IslandManager {
    /// Every island ever allocated; only grows
    pool: Vec<Island>,
    /// Free pool indices, sorted by total capacity descending
    free: Vec<usize>,
    active: Vec<usize>,
    lone: Island,
    stack: Vec<BodyHandle>,
    scratch_bodies: Vec<BodyHandle>,
    scratch_contacts: Vec<ContactHandle>,
    scratch_joints: Vec<JointHandle>,
}

impl Default for IslandManager {
    fn default() -> Self {
        let mut lone = Island::default();
        lone.is_lone = true;
        Self {
            pool: Vec::new(),
            free: Vec::new(),
            active: Vec::new(),
            lone,
            stack: Vec::new(),
            scratch_bodies: Vec::new(),
            scratch_contacts: Vec::new(),
            scratch_joints: Vec::new(),
        }
    }
}

impl IslandManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return every active island to the free pool and empty the lone island
    pub fn initialize_pools(&mut self) {
        for index in self.active.drain(..) {
            self.pool[index].reset();
            self.free.push(index);
        }
        let pool = &self.pool;
        self.free
            .sort_by(|a, b| pool[*b].total_capacity().cmp(&pool[*a].total_capacity()));
        self.lone.reset();
    }

    /// Drop bodies that fell asleep, were destroyed or became static since the
    /// islands were built; emptied islands go back to the free pool
    pub(crate) fn retain_awake(&mut self, bodies: &SlotMap<Body>) {
        let simulated = |handle: &BodyHandle| {
            bodies
                .get(handle.0)
                .is_some_and(|body| body.awake && !body.body_type.is_static())
        };

        let pool = &mut self.pool;
        let free = &mut self.free;
        let before = free.len();
        self.active.retain(|&index| {
            let island = &mut pool[index];
            island.bodies.retain(|handle| simulated(handle));
            if island.bodies.is_empty() {
                island.reset();
                free.push(index);
                false
            } else {
                true
            }
        });
        if free.len() != before {
            let pool = &self.pool;
            self.free
                .sort_by(|a, b| pool[*b].total_capacity().cmp(&pool[*a].total_capacity()));
        }

        self.lone.bodies.retain(|handle| simulated(handle));
        if self.lone.bodies.is_empty() {
            self.lone.reset();
        }
    }

    /// Hand out the smallest free island that can hold the requested counts,
    /// growing the pool when none fits
    pub fn allocate_island(&mut self, bodies: usize, contacts: usize, joints: usize) -> IslandId {
        // Free list is sorted descending, so the best fit is the last fitting entry
        let best = self
            .free
            .iter()
            .rposition(|&index| self.pool[index].fits(bodies, contacts, joints));

        let index = match best {
            Some(position) => self.free.remove(position),
            None => {
                let index = self.pool.len();
                self.pool.push(Island::with_capacity(bodies, contacts, joints));
                log::debug!(
                    "Island pool grew to {} (bodies {}, contacts {}, joints {})",
                    self.pool.len(),
                    bodies,
                    contacts,
                    joints
                );
                index
            }
        };

        let island = &mut self.pool[index];
        island.reset();
        island.active = true;
        self.active.push(index);
        IslandId(index)
    }

    pub fn island(&self, id: IslandId) -> Option<&Island> {
        self.pool.get(id.0).filter(|island| island.active)
    }

    /// Bodies without constraints this tick
    pub fn lone_island(&self) -> &Island {
        &self.lone
    }

    /// Active islands, lone island last
    pub fn islands(&self) -> impl Iterator<Item = &Island> {
        self.active.iter().map(|&i| &self.pool[i]).chain(std::iter::once(&self.lone))
    }

    pub(crate) fn islands_mut(&mut self) -> impl Iterator<Item = &mut Island> {
        self.pool
            .iter_mut()
            .filter(|island| island.active)
            .chain(std::iter::once(&mut self.lone))
    }

    /// Solve every active island, in parallel when the feature is enabled
    pub(crate) fn solve_all(&mut self, ctx: &StepContext) {
        let mut islands: Vec<&mut Island> = self
            .islands_mut()
            .filter(|island| !island.bodies.is_empty())
            .collect();
        debug_assert!(islands_are_disjoint(&islands), "a body appears in two islands");

        #[cfg(feature = "parallel")]
        islands
            .par_iter_mut()
            .for_each(|island| island.solver.solve(ctx));

        #[cfg(not(feature = "parallel"))]
        for island in islands.iter_mut() {
            island.solver.solve(ctx);
        }
    }

    /// Number of active islands, counting a non-empty lone island
    pub fn island_count(&self) -> usize {
        self.active.len() + usize::from(!self.lone.bodies.is_empty())
    }

    /// Size of the permanent pool
    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    /// Partition the awake bodies into islands
    ///
    /// Sleeping bodies reached through a touching contact or an active joint
    /// are woken. Returns the bodies woken this way.
    pub(crate) fn build(
        &mut self,
        bodies: &mut SlotMap<Body>,
        contacts: &mut SlotMap<Contact>,
        joints: &mut SlotMap<Joint>,
    ) -> Vec<BodyHandle> {
        self.initialize_pools();
        let mut woken = Vec::new();

        for body in bodies.values_mut() {
            body.island_flag = false;
        }
        for contact in contacts.values_mut() {
            contact.island_flag = false;
        }
        for joint in joints.values_mut() {
            joint.island_flag = false;
        }

        let seeds: Vec<BodyHandle> = bodies
            .iter()
            .filter(|(_, b)| b.awake && !b.body_type.is_static())
            .map(|(_, b)| b.handle)
            .collect();

        for seed in seeds {
            let Some(body) = bodies.get_mut(seed.0) else {
                continue;
            };
            if body.island_flag {
                continue;
            }
            body.island_flag = true;
            if body.body_type == BodyType::Kinematic {
                self.lone.bodies.push(seed);
                continue;
            }

            self.scratch_bodies.clear();
            self.scratch_contacts.clear();
            self.scratch_joints.clear();
            self.stack.clear();
            self.stack.push(seed);

            while let Some(handle) = self.stack.pop() {
                self.scratch_bodies.push(handle);
                let Some(body) = bodies.get_mut(handle.0) else {
                    continue;
                };
                // Keep the sleep timer running for bodies that were already awake
                if !body.awake {
                    body.awake = true;
                    woken.push(handle);
                }
                let contact_list = body.contacts.clone();
                let joint_list = body.joints.clone();

                for c in contact_list {
                    let Some(contact) = contacts.get_mut(c.0) else {
                        continue;
                    };
                    if contact.island_flag || !contact.is_solvable() {
                        continue;
                    }
                    contact.island_flag = true;
                    self.scratch_contacts.push(c);
                    let other = contact.other_body(handle);
                    Self::visit(bodies, &mut self.stack, other);
                }

                for j in joint_list {
                    let Some(joint) = joints.get_mut(j.0) else {
                        continue;
                    };
                    if joint.island_flag || !joint.is_active() {
                        continue;
                    }
                    joint.island_flag = true;
                    self.scratch_joints.push(j);
                    let other = joint.other_edge(handle);
                    Self::visit(bodies, &mut self.stack, other);
                }
            }

            if self.scratch_bodies.len() == 1
                && self.scratch_contacts.is_empty()
                && self.scratch_joints.is_empty()
            {
                self.lone.bodies.push(seed);
                continue;
            }

            let id = self.allocate_island(
                self.scratch_bodies.len(),
                self.scratch_contacts.len(),
                self.scratch_joints.len(),
            );
            let island = &mut self.pool[id.0];
            island.bodies.extend_from_slice(&self.scratch_bodies);
            island.contacts.extend_from_slice(&self.scratch_contacts);
            island.joints.extend_from_slice(&self.scratch_joints);
        }

        if self.lone.bodies.len() > self.lone.body_capacity {
            self.lone.body_capacity = self.lone.bodies.capacity();
        }

        woken
    }

    /// Queue `other` for the traversal unless it is already placed or is an
    /// inert neighbour that never propagates
    fn visit(bodies: &mut SlotMap<Body>, stack: &mut Vec<BodyHandle>, other: BodyHandle) {
        let Some(body) = bodies.get_mut(other.0) else {
            return;
        };
        if body.island_flag || matches!(body.body_type, BodyType::Static | BodyType::Kinematic) {
            return;
        }
        body.island_flag = true;
        stack.push(other);
    }
}

fn islands_are_disjoint(islands: &[&mut Island]) -> bool {
    let mut seen = std::collections::HashSet::new();
    islands
        .iter()
        .flat_map(|island| island.bodies.iter())
        .all(|body| seen.insert(*body))
}
