//! Physics world - main simulation container

use crate::arena::SlotMap;
use crate::behavior::{
    BehaviorCommand, BehaviorCommands, BehaviorHandle, BehaviorRegistry, CollideBehavior, ContactInfo,
};
use crate::body::{Body, BodyDesc, BodyHandle, BodyType};
use crate::broadphase::TreeMargins;
use crate::config::{ConfigValue, PhysicsConfig};
use crate::contact::{Contact, ContactHandle};
use crate::contact_manager::{ContactManager, ContactTransition, EndedContact};
use crate::error::{PhysicsError, Result};
use crate::events::{EventCollector, PhysicsEvent};
use crate::fixture::{Fixture, FixtureDesc, FixtureHandle};
use crate::island::{IslandManager, SolveReport};
use crate::joint::relay::{effective_body, set_relay};
use crate::joint::{outermost_container, ContainerQuery, Joint, JointDesc, JointHandle, JointKind};
use crate::layers::CollisionGroups;
use crate::narrowphase::WorldManifold;
use crate::query::{PhysicsQuery, RaycastHit, RaycastOptions};
use crate::shape::Shape;
use crate::solver::StepContext;
use crossbeam_channel::Receiver;
use std::collections::{HashMap, HashSet};
use void_math2d::{Vec2, AABB};

/// Counters describing the last simulated tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepStats {
    /// Ticks simulated so far, predictions included
    pub tick: u64,
    pub substeps: u32,
    /// Islands solved, summed over substeps
    pub islands_solved: usize,
    pub contacts_touching: usize,
    pub pairs_created: usize,
    pub bodies_awake: usize,
}

/// The main physics world containing all simulation state
pub struct PhysicsWorld {
    /// Configuration
    config: PhysicsConfig,

    /// Substeps per tick derived from the tick rates
    substeps: u32,

    /// Rigid body set
    bodies: SlotMap<Body>,

    /// Fixture set
    fixtures: SlotMap<Fixture>,

    /// Joint set
    joints: SlotMap<Joint>,

    /// Broadphase and contacts
    contact_manager: ContactManager,

    /// Island pool
    islands: IslandManager,

    /// Collide behaviors keyed by body
    behaviors: BehaviorRegistry,

    /// Event collector
    events: EventCollector,

    /// Mapping from entity user_data to body handles
    entity_to_body: HashMap<u128, BodyHandle>,

    /// Length of the previous substep, for warm-start scaling
    prev_dt: f32,

    stats: StepStats,
}

impl PhysicsWorld {
    /// Create a new physics world
    pub fn new(config: PhysicsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: PhysicsConfig) -> Self {
        let substeps = config.substep_count();
        let margins = TreeMargins {
            extension: config.aabb_extension,
            displacement_multiplier: config.aabb_multiplier,
        };
        log::debug!("Physics world created ({} Hz, {} substeps)", config.tick_rate, substeps);

        Self {
            config,
            substeps,
            bodies: SlotMap::new(),
            fixtures: SlotMap::new(),
            joints: SlotMap::new(),
            contact_manager: ContactManager::new(margins),
            islands: IslandManager::new(),
            behaviors: BehaviorRegistry::new(),
            events: EventCollector::new(),
            entity_to_body: HashMap::new(),
            prev_dt: 0.0,
            stats: StepStats::default(),
        }
    }

    // ==================== Configuration ====================

    /// Get the active configuration
    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    /// Replace the whole configuration
    pub fn set_config(&mut self, config: PhysicsConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.apply_config();
        Ok(())
    }

    /// Set one configuration value by key
    ///
    /// The configuration is left untouched when the new value fails
    /// validation.
    pub fn set_config_value(&mut self, key: &str, value: ConfigValue) -> Result<()> {
        let mut config = self.config.clone();
        config.set(key, value)?;
        self.set_config(config)
    }

    /// Read one configuration value by key
    pub fn config_value(&self, key: &str) -> Option<ConfigValue> {
        self.config.get(key)
    }

    fn apply_config(&mut self) {
        let substeps = self.config.substep_count();
        if substeps != self.substeps {
            log::debug!("Substep count changed from {} to {}", self.substeps, substeps);
            self.substeps = substeps;
        }
        self.contact_manager.broadphase.set_margins(TreeMargins {
            extension: self.config.aabb_extension,
            displacement_multiplier: self.config.aabb_multiplier,
        });
    }

    /// Set gravity
    pub fn set_gravity(&mut self, gravity: Vec2) {
        self.config.gravity = gravity;
    }

    /// Get gravity
    pub fn gravity(&self) -> Vec2 {
        self.config.gravity
    }

    /// Substeps run by every tick
    pub fn substep_count(&self) -> u32 {
        self.substeps
    }

    /// Fixture description using the configured default friction and restitution
    pub fn default_fixture_desc(&self, shape: Shape) -> FixtureDesc {
        FixtureDesc::new(shape)
            .with_friction(self.config.default_friction)
            .with_restitution(self.config.default_restitution)
    }

    // ==================== Bodies ====================

    /// Create a rigid body
    pub fn create_body(&mut self, desc: BodyDesc) -> BodyHandle {
        let key = self.bodies.insert_with_key(|slot| Body::new(BodyHandle(slot), &desc));
        if let Some(body) = self.bodies.get_mut(key) {
            body.reset_mass_data(&self.fixtures);
        }
        log::debug!("Created {:?} body {:?}", desc.body_type, key);
        BodyHandle(key)
    }

    /// Create a body owned by an entity
    pub fn create_body_for_entity(&mut self, entity: u128, desc: BodyDesc) -> BodyHandle {
        if let Some(previous) = self.entity_to_body.get(&entity).copied() {
            log::debug!("Entity {} already owns body {:?}, replacing it", entity, previous);
            if let Err(err) = self.destroy_body(previous) {
                log::warn!("Stale body {:?} for entity {}: {}", previous, entity, err);
                self.entity_to_body.remove(&entity);
            }
        }
        let handle = self.create_body(desc);
        if let Some(body) = self.bodies.get_mut(handle.0) {
            body.entity = Some(entity);
        }
        self.entity_to_body.insert(entity, handle);
        handle
    }

    /// Get body handle for entity
    pub fn body_for_entity(&self, entity: u128) -> Option<BodyHandle> {
        self.entity_to_body.get(&entity).copied()
    }

    /// Destroy the body owned by an entity
    pub fn remove_entity(&mut self, entity: u128) -> Result<()> {
        match self.entity_to_body.get(&entity).copied() {
            Some(handle) => self.destroy_body(handle),
            None => Ok(()),
        }
    }

    /// Destroy a body with its fixtures, contacts and joints
    pub fn destroy_body(&mut self, handle: BodyHandle) -> Result<()> {
        let body = self.bodies.get(handle.0).ok_or(PhysicsError::BodyNotFound(handle))?;
        let relayed: Vec<BodyHandle> = body.relayed.iter().copied().collect();

        // Bodies relaying onto this one fall back to themselves
        for other in relayed {
            let woken = set_relay(&mut self.bodies, &mut self.joints, other, None);
            self.wake_all(woken);
        }
        let woken = set_relay(&mut self.bodies, &mut self.joints, handle, None);
        self.wake_all(woken);

        let attached: Vec<JointHandle> = self
            .joints
            .iter()
            .filter(|(_, j)| [j.body_a, j.body_b, j.edge_a, j.edge_b].contains(&handle))
            .map(|(_, j)| j.handle)
            .collect();
        for joint in attached {
            self.remove_joint(joint);
        }

        let ended = self.contact_manager.destroy_body_contacts(handle, &mut self.bodies);
        self.end_contacts(ended, true);

        let Some(body) = self.bodies.remove(handle.0) else {
            return Err(PhysicsError::BodyNotFound(handle));
        };
        for fixture in &body.fixtures {
            if let Some(mut fixture) = self.fixtures.remove(fixture.0) {
                self.contact_manager.destroy_proxy(&mut fixture);
            }
        }
        self.behaviors.remove_body(handle);
        if let Some(entity) = body.entity {
            self.entity_to_body.remove(&entity);
        }
        self.islands.retain_awake(&self.bodies);

        log::debug!("Destroyed body {:?}", handle);
        Ok(())
    }

    /// Get a body
    pub fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle.0)
    }

    /// Whether the handle refers to a live body
    pub fn contains_body(&self, handle: BodyHandle) -> bool {
        self.bodies.contains_key(handle.0)
    }

    /// Iterate all bodies
    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        self.bodies.iter().map(|(_, b)| b)
    }

    /// Get rigid body position
    pub fn body_position(&self, handle: BodyHandle) -> Option<Vec2> {
        self.bodies.get(handle.0).map(|b| b.position())
    }

    /// Get rigid body angle
    pub fn body_angle(&self, handle: BodyHandle) -> Option<f32> {
        self.bodies.get(handle.0).map(|b| b.angle())
    }

    /// Teleport a body
    pub fn set_transform(&mut self, handle: BodyHandle, position: Vec2, angle: f32) -> Result<()> {
        let body = self.bodies.get_mut(handle.0).ok_or(PhysicsError::BodyNotFound(handle))?;
        body.set_transform(position, angle);
        self.synchronize_fixtures(handle, Vec2::ZERO);
        self.wake_island(handle);
        Ok(())
    }

    /// Set linear velocity
    pub fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vec2) -> Result<()> {
        let body = self.bodies.get_mut(handle.0).ok_or(PhysicsError::BodyNotFound(handle))?;
        if body.body_type.is_static() {
            return Ok(());
        }
        body.linear_velocity = velocity;
        if velocity.length_squared() > 0.0 {
            self.wake_island(handle);
        }
        Ok(())
    }

    /// Set angular velocity
    pub fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: f32) -> Result<()> {
        let body = self.bodies.get_mut(handle.0).ok_or(PhysicsError::BodyNotFound(handle))?;
        if body.body_type.is_static() {
            return Ok(());
        }
        body.angular_velocity = if body.fixed_rotation { 0.0 } else { velocity };
        if velocity != 0.0 {
            self.wake_island(handle);
        }
        Ok(())
    }

    /// Change body type, rebuilding its contacts and mass
    pub fn set_body_type(&mut self, handle: BodyHandle, body_type: BodyType) -> Result<()> {
        let body = self.bodies.get_mut(handle.0).ok_or(PhysicsError::BodyNotFound(handle))?;
        if body.body_type == body_type {
            return Ok(());
        }
        body.body_type = body_type;
        body.reset_mass_data(&self.fixtures);
        if body_type.is_static() {
            body.sleep();
        }

        let ended = self.contact_manager.destroy_body_contacts(handle, &mut self.bodies);
        self.end_contacts(ended, true);
        self.synchronize_fixtures(handle, Vec2::ZERO);
        if body_type.is_static() {
            self.islands.retain_awake(&self.bodies);
        } else {
            self.wake_island(handle);
        }
        log::debug!("Body {:?} is now {:?}", handle, body_type);
        Ok(())
    }

    /// Enable or disable collision for a whole body
    pub fn set_can_collide(&mut self, handle: BodyHandle, can_collide: bool) -> Result<()> {
        let body = self.bodies.get_mut(handle.0).ok_or(PhysicsError::BodyNotFound(handle))?;
        if body.can_collide == can_collide {
            return Ok(());
        }
        body.can_collide = can_collide;
        if !can_collide {
            let ended = self.contact_manager.destroy_body_contacts(handle, &mut self.bodies);
            self.end_contacts(ended, true);
        }
        self.wake_island(handle);
        Ok(())
    }

    /// Wake or put to sleep a body together with everything connected to it
    pub fn set_awake(&mut self, handle: BodyHandle, awake: bool) -> Result<()> {
        if !self.bodies.contains_key(handle.0) {
            return Err(PhysicsError::BodyNotFound(handle));
        }
        if awake {
            self.wake_island(handle);
        } else {
            self.sleep_island(handle);
        }
        Ok(())
    }

    /// Wake a body and everything connected to it
    pub fn wake_body(&mut self, handle: BodyHandle) -> Result<()> {
        self.set_awake(handle, true)
    }

    // ==================== Forces ====================

    /// Apply a force at the center of mass until the end of the tick
    pub fn apply_force(&mut self, handle: BodyHandle, force: Vec2) -> Result<()> {
        let body = self.bodies.get_mut(handle.0).ok_or(PhysicsError::BodyNotFound(handle))?;
        if !body.body_type.has_finite_mass() {
            return Ok(());
        }
        body.force += force;
        self.wake_island(handle);
        Ok(())
    }

    /// Apply a force at a world point
    pub fn apply_force_at_point(&mut self, handle: BodyHandle, force: Vec2, point: Vec2) -> Result<()> {
        let body = self.bodies.get_mut(handle.0).ok_or(PhysicsError::BodyNotFound(handle))?;
        if !body.body_type.has_finite_mass() {
            return Ok(());
        }
        body.force += force;
        body.torque += (point - body.center).cross(force);
        self.wake_island(handle);
        Ok(())
    }

    /// Apply torque until the end of the tick
    pub fn apply_torque(&mut self, handle: BodyHandle, torque: f32) -> Result<()> {
        let body = self.bodies.get_mut(handle.0).ok_or(PhysicsError::BodyNotFound(handle))?;
        if !body.body_type.has_finite_mass() {
            return Ok(());
        }
        body.torque += torque;
        self.wake_island(handle);
        Ok(())
    }

    /// Apply impulse at the center of mass
    pub fn apply_linear_impulse(&mut self, handle: BodyHandle, impulse: Vec2) -> Result<()> {
        let body = self.bodies.get_mut(handle.0).ok_or(PhysicsError::BodyNotFound(handle))?;
        if !body.body_type.has_finite_mass() {
            return Ok(());
        }
        body.linear_velocity += impulse * body.inv_mass;
        self.wake_island(handle);
        Ok(())
    }

    /// Apply impulse at a world point
    pub fn apply_linear_impulse_at_point(&mut self, handle: BodyHandle, impulse: Vec2, point: Vec2) -> Result<()> {
        let body = self.bodies.get_mut(handle.0).ok_or(PhysicsError::BodyNotFound(handle))?;
        if !body.body_type.has_finite_mass() {
            return Ok(());
        }
        body.linear_velocity += impulse * body.inv_mass;
        body.angular_velocity += body.inv_inertia * (point - body.center).cross(impulse);
        self.wake_island(handle);
        Ok(())
    }

    /// Apply angular impulse
    pub fn apply_angular_impulse(&mut self, handle: BodyHandle, impulse: f32) -> Result<()> {
        let body = self.bodies.get_mut(handle.0).ok_or(PhysicsError::BodyNotFound(handle))?;
        if !body.body_type.has_finite_mass() {
            return Ok(());
        }
        body.angular_velocity += body.inv_inertia * impulse;
        self.wake_island(handle);
        Ok(())
    }

    // ==================== Fixtures ====================

    /// Attach a fixture to a body
    pub fn create_fixture(&mut self, body: BodyHandle, desc: FixtureDesc) -> Result<FixtureHandle> {
        desc.shape.validate()?;
        let xf = self.bodies.get(body.0).ok_or(PhysicsError::BodyNotFound(body))?.xf;

        let key = self
            .fixtures
            .insert_with_key(|slot| Fixture::new(FixtureHandle(slot), body, desc));
        let handle = FixtureHandle(key);
        if let Some(fixture) = self.fixtures.get_mut(key) {
            self.contact_manager.create_proxy(fixture, &xf);
        }
        if let Some(b) = self.bodies.get_mut(body.0) {
            b.fixtures.push(handle);
            b.reset_mass_data(&self.fixtures);
        }
        self.wake_island(body);

        log::debug!("Created fixture {:?} on body {:?}", handle, body);
        Ok(handle)
    }

    /// Detach and destroy a fixture
    pub fn destroy_fixture(&mut self, handle: FixtureHandle) -> Result<()> {
        let body = self
            .fixtures
            .get(handle.0)
            .ok_or(PhysicsError::FixtureNotFound(handle))?
            .body;

        let ended = self
            .contact_manager
            .destroy_fixture_contacts(handle, body, &mut self.bodies);
        self.end_contacts(ended, true);

        if let Some(mut fixture) = self.fixtures.remove(handle.0) {
            self.contact_manager.destroy_proxy(&mut fixture);
        }
        if let Some(b) = self.bodies.get_mut(body.0) {
            b.fixtures.retain(|f| *f != handle);
            b.reset_mass_data(&self.fixtures);
        }
        self.wake_island(body);

        log::debug!("Destroyed fixture {:?}", handle);
        Ok(())
    }

    /// Get a fixture
    pub fn fixture(&self, handle: FixtureHandle) -> Option<&Fixture> {
        self.fixtures.get(handle.0)
    }

    /// Change a fixture's collision filter
    pub fn set_fixture_groups(&mut self, handle: FixtureHandle, groups: CollisionGroups) -> Result<()> {
        let fixture = self
            .fixtures
            .get_mut(handle.0)
            .ok_or(PhysicsError::FixtureNotFound(handle))?;
        fixture.groups = groups;
        let body = fixture.body;
        self.refilter_fixture(handle, body);
        Ok(())
    }

    /// Switch a fixture between hard and sensor
    pub fn set_fixture_hard(&mut self, handle: FixtureHandle, hard: bool) -> Result<()> {
        let fixture = self
            .fixtures
            .get_mut(handle.0)
            .ok_or(PhysicsError::FixtureNotFound(handle))?;
        fixture.hard = hard;
        let body = fixture.body;
        self.refilter_fixture(handle, body);
        Ok(())
    }

    /// Change a fixture's density and recompute its body's mass
    pub fn set_fixture_density(&mut self, handle: FixtureHandle, density: f32) -> Result<()> {
        if !(density >= 0.0 && density.is_finite()) {
            return Err(PhysicsError::InvalidConfig(format!("invalid density {density}")));
        }
        let fixture = self
            .fixtures
            .get_mut(handle.0)
            .ok_or(PhysicsError::FixtureNotFound(handle))?;
        fixture.set_density(density);
        let body = fixture.body;
        if let Some(b) = self.bodies.get_mut(body.0) {
            b.reset_mass_data(&self.fixtures);
        }
        self.wake_island(body);
        Ok(())
    }

    fn refilter_fixture(&mut self, fixture: FixtureHandle, body: BodyHandle) {
        if let Some(b) = self.bodies.get(body.0) {
            self.contact_manager.flag_fixture_filter(fixture, b);
        }
        self.wake_island(body);
    }

    // ==================== Joints ====================

    /// Create a joint between two bodies
    pub fn create_joint(&mut self, desc: JointDesc) -> Result<JointHandle> {
        if desc.body_a == desc.body_b {
            return Err(PhysicsError::JointSelfConnection(desc.body_a));
        }
        let body_a = self
            .bodies
            .get(desc.body_a.0)
            .ok_or(PhysicsError::BodyNotFound(desc.body_a))?;
        let body_b = self
            .bodies
            .get(desc.body_b.0)
            .ok_or(PhysicsError::BodyNotFound(desc.body_b))?;

        let kind = JointKind::from_desc(&desc, body_a, body_b);
        let edge_a = effective_body(&self.bodies, desc.body_a);
        let edge_b = effective_body(&self.bodies, desc.body_b);

        let key = self.joints.insert_with_key(|slot| Joint {
            handle: JointHandle(slot),
            body_a: desc.body_a,
            body_b: desc.body_b,
            edge_a,
            edge_b,
            local_anchor_a: desc.local_anchor_a,
            local_anchor_b: desc.local_anchor_b,
            collide_connected: desc.collide_connected,
            break_impulse: desc.break_impulse,
            kind,
            island_flag: false,
        });
        let handle = JointHandle(key);

        for edge in [edge_a, edge_b] {
            if let Some(b) = self.bodies.get_mut(edge.0) {
                if !b.joints.contains(&handle) {
                    b.joints.push(handle);
                }
            }
        }
        if !desc.collide_connected {
            for body in [desc.body_a, desc.body_b] {
                if let Some(b) = self.bodies.get(body.0) {
                    self.contact_manager.flag_body_filter(b);
                }
            }
        }
        self.wake_island(edge_a);
        self.wake_island(edge_b);

        log::debug!("Created {:?} joint {:?}", desc.joint_type(), handle);
        Ok(handle)
    }

    /// Destroy a joint
    pub fn destroy_joint(&mut self, handle: JointHandle) -> Result<()> {
        self.remove_joint(handle)
            .map(|_| ())
            .ok_or(PhysicsError::JointNotFound(handle))
    }

    fn remove_joint(&mut self, handle: JointHandle) -> Option<Joint> {
        let joint = self.joints.remove(handle.0)?;
        for edge in [joint.edge_a, joint.edge_b] {
            if let Some(b) = self.bodies.get_mut(edge.0) {
                b.joints.retain(|j| *j != handle);
            }
        }
        self.wake_island(joint.edge_a);
        self.wake_island(joint.edge_b);
        log::debug!("Destroyed joint {:?}", handle);
        Some(joint)
    }

    /// Get a joint
    pub fn joint(&self, handle: JointHandle) -> Option<&Joint> {
        self.joints.get(handle.0)
    }

    /// Iterate all joints
    pub fn joints(&self) -> impl Iterator<Item = &Joint> {
        self.joints.iter().map(|(_, j)| j)
    }

    /// Change a revolute joint's motor speed
    pub fn set_motor_speed(&mut self, handle: JointHandle, speed: f32) -> Result<()> {
        let joint = self
            .joints
            .get_mut(handle.0)
            .ok_or(PhysicsError::JointNotFound(handle))?;
        if let JointKind::Revolute(revolute) = &mut joint.kind {
            revolute.set_motor_speed(speed);
        }
        let (edge_a, edge_b) = (joint.edge_a, joint.edge_b);
        self.wake_island(edge_a);
        self.wake_island(edge_b);
        Ok(())
    }

    // ==================== Relay ====================

    /// Re-resolve where `body` relays its joints
    ///
    /// An explicit target wins; otherwise the outermost container reported
    /// by `containers` is used, or no relay at all.
    pub fn refresh_relay(
        &mut self,
        body: BodyHandle,
        explicit: Option<BodyHandle>,
        containers: &dyn ContainerQuery,
    ) -> Result<()> {
        if !self.bodies.contains_key(body.0) {
            return Err(PhysicsError::BodyNotFound(body));
        }
        let target = explicit.or_else(|| outermost_container(body, containers));
        let woken = set_relay(&mut self.bodies, &mut self.joints, body, target);
        for handle in woken.iter().copied().chain(std::iter::once(body)) {
            if let Some(b) = self.bodies.get(handle.0) {
                self.contact_manager.flag_body_filter(b);
            }
        }
        self.wake_all(woken);
        Ok(())
    }

    // ==================== Behaviors ====================

    /// Register a collide behavior on a body
    pub fn register_behavior<B: CollideBehavior + 'static>(
        &mut self,
        body: BodyHandle,
        behavior: B,
    ) -> Result<BehaviorHandle> {
        if !self.bodies.contains_key(body.0) {
            return Err(PhysicsError::BodyNotFound(body));
        }
        Ok(self.behaviors.register(body, behavior))
    }

    /// Remove a collide behavior
    pub fn unregister_behavior(&mut self, handle: BehaviorHandle) -> bool {
        self.behaviors.unregister(handle)
    }

    /// Get the behavior registry
    pub fn behaviors(&self) -> &BehaviorRegistry {
        &self.behaviors
    }

    // ==================== Simulation ====================

    /// Advance one fixed tick
    pub fn step(&mut self) {
        let dt = self.config.tick_dt();
        self.simulate(dt, false);
    }

    /// Advance the world by `dt` seconds split into substeps
    ///
    /// Prediction ticks run the same numerics but skip begin/end callbacks
    /// and publish no events.
    pub fn simulate(&mut self, dt: f32, is_prediction: bool) {
        if !(dt > 0.0 && dt.is_finite()) {
            log::warn!("Ignoring simulate call with dt = {}", dt);
            return;
        }

        let substeps = self.substeps.max(1);
        let h = dt / substeps as f32;
        let mut stats = StepStats {
            tick: self.stats.tick + 1,
            substeps,
            ..StepStats::default()
        };

        for _ in 0..substeps {
            self.substep(h, is_prediction, &mut stats);
        }

        for body in self.bodies.values_mut() {
            body.force = Vec2::ZERO;
            body.torque = 0.0;
        }

        stats.pairs_created = self.contact_manager.take_pairs_created();
        stats.contacts_touching = self.contact_manager.contacts().filter(|c| c.touching).count();
        stats.bodies_awake = self.awake_body_count();
        self.stats = stats;
        self.events.publish(is_prediction);

        log::trace!(
            "Tick {}: {} islands, {} touching contacts, {} awake bodies",
            stats.tick,
            stats.islands_solved,
            stats.contacts_touching,
            stats.bodies_awake
        );
    }

    fn substep(&mut self, h: f32, is_prediction: bool, stats: &mut StepStats) {
        let dt_ratio = if self.prev_dt > 0.0 { h / self.prev_dt } else { 1.0 };
        self.prev_dt = h;

        self.wake_kinematic_neighbours();

        self.contact_manager
            .find_new_contacts(&mut self.bodies, &self.fixtures, &self.joints);
        let transitions = self
            .contact_manager
            .collide(&mut self.bodies, &self.fixtures, &self.joints);
        self.handle_transitions(transitions, is_prediction);
        self.run_pre_solve();

        let woken = self.islands.build(
            &mut self.bodies,
            &mut self.contact_manager.contacts,
            &mut self.joints,
        );
        for handle in woken {
            self.events.push(PhysicsEvent::BodyWoke(handle));
        }

        for island in self.islands.islands_mut() {
            island.load_solver(
                &self.bodies,
                &self.fixtures,
                &self.contact_manager.contacts,
                &self.joints,
            );
        }

        let ctx = StepContext::new(&self.config, h, dt_ratio);
        self.islands.solve_all(&ctx);
        stats.islands_solved += self.islands.island_count();

        let mut report = SolveReport::default();
        for island in self.islands.islands_mut() {
            island.store_solver(
                &mut self.bodies,
                &mut self.contact_manager.contacts,
                &mut self.joints,
                &mut report,
            );
        }
        self.apply_report(report);

        self.contact_manager.post_solve();
    }

    fn apply_report(&mut self, report: SolveReport) {
        for handle in report.diverged {
            if let Some(body) = self.bodies.get_mut(handle.0) {
                log::warn!("Solver diverged on body {:?}; resetting it", handle);
                body.synchronize_transform();
                body.sleep();
                self.events.push(PhysicsEvent::SolverDiverged(handle));
            }
        }

        for (handle, displacement) in report.moved {
            self.synchronize_fixtures(handle, displacement);
        }

        for (joint, impulse) in report.broken_joints {
            if self.remove_joint(joint).is_some() {
                log::debug!("Joint {:?} broke at impulse {}", joint, impulse);
                self.events.push(PhysicsEvent::JointBroken { joint, impulse });
            }
        }

        for handle in report.sleepers {
            if let Some(body) = self.bodies.get_mut(handle.0) {
                if body.awake {
                    body.sleep();
                    self.events.push(PhysicsEvent::BodySlept(handle));
                }
            }
        }

        self.islands.retain_awake(&self.bodies);
    }

    /// Move every proxy of a body to its current transform
    fn synchronize_fixtures(&mut self, handle: BodyHandle, displacement: Vec2) {
        let Some(body) = self.bodies.get(handle.0) else {
            return;
        };
        let xf = body.xf;
        for fixture in &body.fixtures {
            if let Some(fixture) = self.fixtures.get_mut(fixture.0) {
                self.contact_manager.synchronize(fixture, &xf, displacement);
            }
        }
    }

    /// Moving kinematic bodies wake whatever rests on them
    fn wake_kinematic_neighbours(&mut self) {
        let movers: Vec<BodyHandle> = self
            .bodies
            .iter()
            .filter(|(_, b)| {
                b.awake
                    && b.body_type == BodyType::Kinematic
                    && (b.linear_velocity.length_squared() > 0.0 || b.angular_velocity != 0.0)
            })
            .map(|(_, b)| b.handle)
            .collect();

        for mover in movers {
            let neighbours: Vec<BodyHandle> = self
                .bodies
                .get(mover.0)
                .map(|b| {
                    b.contacts
                        .iter()
                        .filter_map(|c| self.contact_manager.contacts.get(c.0))
                        .filter(|c| c.touching && !c.sensor)
                        .map(|c| c.other_body(mover))
                        .collect()
                })
                .unwrap_or_default();
            self.wake_all(neighbours);
        }
    }

    // ==================== Contacts & Callbacks ====================

    fn handle_transitions(&mut self, transitions: Vec<ContactTransition>, is_prediction: bool) {
        let mut commands = BehaviorCommands::default();
        for transition in transitions {
            match transition {
                ContactTransition::Began(handle) => {
                    let Some(contact) = self.contact_manager.contacts.get(handle.0) else {
                        continue;
                    };
                    let Some(manifold) = self.world_manifold(contact) else {
                        continue;
                    };
                    self.events.push(PhysicsEvent::CollisionBegin {
                        fixture_a: contact.fixture_a,
                        fixture_b: contact.fixture_b,
                        body_a: contact.body_a,
                        body_b: contact.body_b,
                        manifold,
                    });
                    if !is_prediction {
                        for info in contact_infos(contact, manifold.normal) {
                            self.behaviors.collide_begin(&info, &mut commands);
                        }
                    }
                }
                ContactTransition::Ended(ended) => {
                    self.end_contact(ended, !is_prediction, &mut commands);
                }
            }
        }
        self.apply_commands(commands);
    }

    /// Report contacts that stopped touching outside the solver pass
    fn end_contacts(&mut self, ended: Vec<EndedContact>, run_behaviors: bool) {
        let mut commands = BehaviorCommands::default();
        for contact in ended {
            self.end_contact(contact, run_behaviors, &mut commands);
        }
        self.apply_commands(commands);
    }

    fn end_contact(&mut self, ended: EndedContact, run_behaviors: bool, commands: &mut BehaviorCommands) {
        self.events.push(PhysicsEvent::CollisionEnd {
            fixture_a: ended.fixture_a,
            fixture_b: ended.fixture_b,
            body_a: ended.body_a,
            body_b: ended.body_b,
        });
        if run_behaviors {
            let sides = [
                (ended.body_a, ended.fixture_a, ended.body_b, ended.fixture_b),
                (ended.body_b, ended.fixture_b, ended.body_a, ended.fixture_a),
            ];
            for (our_body, our_fixture, other_body, other_fixture) in sides {
                let info = ContactInfo {
                    our_body,
                    our_fixture,
                    other_body,
                    other_fixture,
                    normal: Vec2::ZERO,
                    point_count: 0,
                    hard: self.pair_is_hard(ended.fixture_a, ended.fixture_b),
                };
                self.behaviors.collide_end(&info, commands);
            }
        }
        self.wake_island(ended.body_a);
        self.wake_island(ended.body_b);
    }

    /// Let behaviors cancel touching contacts for this substep
    fn run_pre_solve(&mut self) {
        if self.behaviors.is_empty() {
            return;
        }
        let mut commands = BehaviorCommands::default();
        let candidates: Vec<ContactHandle> = self
            .contact_manager
            .contacts()
            .filter(|c| c.touching)
            .filter(|c| self.behaviors.has_behaviors(c.body_a) || self.behaviors.has_behaviors(c.body_b))
            .map(|c| c.handle)
            .collect();

        for handle in candidates {
            let Some(contact) = self.contact_manager.contacts.get(handle.0) else {
                continue;
            };
            let normal = self.world_manifold(contact).map_or(Vec2::ZERO, |m| m.normal);
            let mut cancel = false;
            for info in contact_infos(contact, normal) {
                cancel |= self.behaviors.pre_solve(&info, &mut commands);
            }
            if cancel {
                if let Some(contact) = self.contact_manager.contact_mut(handle) {
                    contact.enabled = false;
                }
            }
        }
        self.apply_commands(commands);
    }

    fn apply_commands(&mut self, mut commands: BehaviorCommands) {
        let queued: Vec<BehaviorCommand> = commands.drain().collect();
        for command in queued {
            let outcome = match command {
                BehaviorCommand::Unregister(handle) => {
                    self.behaviors.unregister(handle);
                    Ok(())
                }
                BehaviorCommand::WakeBody(body) => self.wake_body(body),
                BehaviorCommand::ApplyLinearImpulse { body, impulse } => self.apply_linear_impulse(body, impulse),
            };
            if let Err(e) = outcome {
                log::debug!("Dropped behavior command {:?}: {}", command, e);
            }
        }
    }

    fn world_manifold(&self, contact: &Contact) -> Option<WorldManifold> {
        let body_a = self.bodies.get(contact.body_a.0)?;
        let body_b = self.bodies.get(contact.body_b.0)?;
        let fixture_a = self.fixtures.get(contact.fixture_a.0)?;
        let fixture_b = self.fixtures.get(contact.fixture_b.0)?;
        Some(contact.world_manifold(
            &body_a.xf,
            fixture_a.shape.radius(),
            &body_b.xf,
            fixture_b.shape.radius(),
        ))
    }

    fn pair_is_hard(&self, a: FixtureHandle, b: FixtureHandle) -> bool {
        let hard = |f: FixtureHandle| self.fixtures.get(f.0).map_or(true, |f| f.hard);
        hard(a) && hard(b)
    }

    // ==================== Sleep / Wake ====================

    /// `start` and every body reachable from it through touching contacts
    /// and active joints
    ///
    /// Static and kinematic bodies are included but never propagate.
    fn connected_bodies(&self, start: BodyHandle) -> Vec<BodyHandle> {
        let mut stack = vec![start];
        let mut visited = HashSet::from([start]);
        let mut connected = Vec::new();

        while let Some(handle) = stack.pop() {
            let Some(body) = self.bodies.get(handle.0) else {
                continue;
            };
            connected.push(handle);
            if !body.body_type.has_finite_mass() {
                continue;
            }

            for contact in &body.contacts {
                let Some(contact) = self.contact_manager.contacts.get(contact.0) else {
                    continue;
                };
                if contact.touching && !contact.sensor {
                    let other = contact.other_body(handle);
                    if visited.insert(other) {
                        stack.push(other);
                    }
                }
            }
            for joint in &body.joints {
                let Some(joint) = self.joints.get(joint.0) else {
                    continue;
                };
                if joint.is_active() {
                    let other = joint.other_edge(handle);
                    if visited.insert(other) {
                        stack.push(other);
                    }
                }
            }
        }
        connected
    }

    /// Wake `start` and everything connected to it
    fn wake_island(&mut self, start: BodyHandle) {
        for handle in self.connected_bodies(start) {
            if let Some(body) = self.bodies.get_mut(handle.0) {
                if body.wake() {
                    self.events.push(PhysicsEvent::BodyWoke(handle));
                }
            }
        }
    }

    /// Put `start` and the dynamic bodies connected to it to sleep
    ///
    /// Kinematic neighbours keep their state; static bodies are untouched.
    fn sleep_island(&mut self, start: BodyHandle) {
        for handle in self.connected_bodies(start) {
            let Some(body) = self.bodies.get_mut(handle.0) else {
                continue;
            };
            let eligible = body.body_type.has_finite_mass() || handle == start;
            if eligible && body.awake && !body.body_type.is_static() {
                body.sleep();
                self.events.push(PhysicsEvent::BodySlept(handle));
            }
        }
        self.islands.retain_awake(&self.bodies);
    }

    fn wake_all(&mut self, bodies: Vec<BodyHandle>) {
        for body in bodies {
            self.wake_island(body);
        }
    }

    // ==================== Queries ====================

    /// Get a query interface for raycasting and overlap tests
    pub fn query(&self) -> PhysicsQuery<'_> {
        PhysicsQuery {
            broadphase: &self.contact_manager.broadphase,
            bodies: &self.bodies,
            fixtures: &self.fixtures,
        }
    }

    /// Bodies whose fixtures overlap a box
    pub fn query_aabb(&self, aabb: &AABB) -> Vec<BodyHandle> {
        self.query().query_aabb(aabb)
    }

    /// Fixtures containing a point
    pub fn query_point(&self, point: Vec2) -> Vec<FixtureHandle> {
        self.query().query_point(point)
    }

    /// Closest hit along a ray
    pub fn ray_cast(&self, origin: Vec2, direction: Vec2, max_distance: f32) -> Option<RaycastHit> {
        let options = RaycastOptions::default().with_max_distance(max_distance);
        self.query().ray_cast(origin, direction, &options)
    }

    /// Every hit along a ray, nearest first
    pub fn ray_cast_all(&self, origin: Vec2, direction: Vec2, options: &RaycastOptions) -> Vec<RaycastHit> {
        self.query().ray_cast_all(origin, direction, options)
    }

    // ==================== Events ====================

    /// Events of the last published tick
    pub fn events(&self) -> &[PhysicsEvent] {
        self.events.events()
    }

    /// Collision begin events of the last tick
    pub fn collision_begins(&self) -> impl Iterator<Item = &PhysicsEvent> {
        self.events.collision_begins()
    }

    /// Collision end events of the last tick
    pub fn collision_ends(&self) -> impl Iterator<Item = &PhysicsEvent> {
        self.events.collision_ends()
    }

    /// Receive every event published from now on
    pub fn subscribe(&mut self) -> Receiver<PhysicsEvent> {
        self.events.subscribe()
    }

    // ==================== Debug ====================

    /// Get number of bodies
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Get number of fixtures
    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    /// Get number of contacts, touching or not
    pub fn contact_count(&self) -> usize {
        self.contact_manager.contact_count()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Get number of awake non-static bodies
    pub fn awake_body_count(&self) -> usize {
        self.bodies
            .iter()
            .filter(|(_, b)| b.awake && !b.body_type.is_static())
            .count()
    }

    /// Islands built by the last substep
    pub fn island_count(&self) -> usize {
        self.islands.island_count()
    }

    pub fn islands(&self) -> &IslandManager {
        &self.islands
    }

    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.contact_manager.contacts()
    }

    pub fn contact(&self, handle: ContactHandle) -> Option<&Contact> {
        self.contact_manager.contact(handle)
    }

    /// Contact between two fixtures, if one exists
    pub fn find_contact(&self, a: FixtureHandle, b: FixtureHandle) -> Option<&Contact> {
        let fa = self.fixtures.get(a.0)?;
        let fb = self.fixtures.get(b.0)?;
        let handle = self.contact_manager.find((fa.body, a), (fb.body, b))?;
        self.contact_manager.contact(handle)
    }

    pub fn broadphase_proxy_count(&self) -> usize {
        self.contact_manager.broadphase().proxy_count()
    }

    /// Counters of the last tick
    pub fn stats(&self) -> StepStats {
        self.stats
    }
}

/// Both sides of a contact, normal pointing away from each owner
fn contact_infos(contact: &Contact, normal: Vec2) -> [ContactInfo; 2] {
    let point_count = contact.manifold.point_count;
    let hard = !contact.sensor;
    [
        ContactInfo {
            our_body: contact.body_a,
            our_fixture: contact.fixture_a,
            other_body: contact.body_b,
            other_fixture: contact.fixture_b,
            normal,
            point_count,
            hard,
        },
        ContactInfo {
            our_body: contact.body_b,
            our_fixture: contact.fixture_b,
            other_body: contact.body_a,
            other_fixture: contact.fixture_a,
            normal: -normal,
            point_count,
            hard,
        },
    ]
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::with_valid_config(PhysicsConfig::default())
    }
}
