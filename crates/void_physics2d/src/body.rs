//! Rigid body types

use crate::arena::{SlotKey, SlotMap};
use crate::contact::ContactHandle;
use crate::fixture::{Fixture, FixtureHandle};
use crate::joint::JointHandle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use void_math2d::{cross_sv, Rot, Transform2, Vec2};

/// Handle to a body in the physics world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub(crate) SlotKey);

impl BodyHandle {
    /// Get the raw slot key
    pub fn raw(&self) -> SlotKey {
        self.0
    }
}

/// Type of rigid body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BodyType {
    /// Never moves, infinite mass
    Static,
    /// Moved by velocity only, infinite mass, ignores contacts
    Kinematic,
    /// Player/NPC style body: has mass and is pushed by contacts, ignores gravity
    KinematicController,
    /// Fully simulated
    #[default]
    Dynamic,
}

impl BodyType {
    #[inline]
    pub fn is_static(self) -> bool {
        self == Self::Static
    }

    /// Whether impulses can change this body's velocity
    #[inline]
    pub fn has_finite_mass(self) -> bool {
        matches!(self, Self::Dynamic | Self::KinematicController)
    }

    /// Whether gravity applies
    #[inline]
    pub fn uses_gravity(self) -> bool {
        self == Self::Dynamic
    }

    /// Kinematic bodies of either flavour stay awake while moving
    #[inline]
    pub fn is_kinematic_family(self) -> bool {
        matches!(self, Self::Kinematic | Self::KinematicController)
    }

    /// Static and kinematic bodies never collide with each other
    pub fn should_collide(self, other: BodyType) -> bool {
        let inert = |t: BodyType| matches!(t, BodyType::Static | BodyType::Kinematic);
        !(inert(self) && inert(other))
    }
}

/// Description for creating a body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyDesc {
    pub body_type: BodyType,
    /// World position of the body origin
    pub position: Vec2,
    /// Rotation in radians
    pub angle: f32,
    pub linear_velocity: Vec2,
    pub angular_velocity: f32,
    /// Gravity scale (0 = no gravity, 1 = normal, 2 = double)
    pub gravity_scale: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    /// Prevent rotation (zero inverse inertia)
    pub fixed_rotation: bool,
    /// Whether the body may fall asleep
    pub can_sleep: bool,
    /// Start awake
    pub awake: bool,
    /// Participates in collision at all
    pub can_collide: bool,
    /// Mass override; when set, fixture densities only shape the inertia
    pub mass: Option<f32>,
    /// Arbitrary user data
    pub user_data: u128,
}

impl Default for BodyDesc {
    fn default() -> Self {
        Self {
            body_type: BodyType::Dynamic,
            position: Vec2::ZERO,
            angle: 0.0,
            linear_velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            gravity_scale: 1.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            fixed_rotation: false,
            can_sleep: true,
            awake: true,
            can_collide: true,
            mass: None,
            user_data: 0,
        }
    }
}

impl BodyDesc {
    /// Create a dynamic body description
    pub fn dynamic() -> Self {
        Self::default()
    }

    /// Create a static body description
    pub fn fixed() -> Self {
        Self {
            body_type: BodyType::Static,
            ..Default::default()
        }
    }

    /// Create a velocity-driven kinematic body description
    pub fn kinematic() -> Self {
        Self {
            body_type: BodyType::Kinematic,
            ..Default::default()
        }
    }

    /// Create a kinematic controller description
    pub fn controller() -> Self {
        Self {
            body_type: BodyType::KinematicController,
            ..Default::default()
        }
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Vec2::new(x, y);
        self
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_linear_velocity(mut self, x: f32, y: f32) -> Self {
        self.linear_velocity = Vec2::new(x, y);
        self
    }

    pub fn with_angular_velocity(mut self, w: f32) -> Self {
        self.angular_velocity = w;
        self
    }

    pub fn with_gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn with_fixed_rotation(mut self, fixed: bool) -> Self {
        self.fixed_rotation = fixed;
        self
    }

    pub fn with_can_sleep(mut self, can_sleep: bool) -> Self {
        self.can_sleep = can_sleep;
        self
    }

    pub fn with_awake(mut self, awake: bool) -> Self {
        self.awake = awake;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = Some(mass);
        self
    }

    pub fn with_user_data(mut self, data: u128) -> Self {
        self.user_data = data;
        self
    }
}

/// A rigid body owned by the physics world
///
/// Position is tracked both as the origin transform and as the world-space
/// center of mass; the solver integrates the center and the transform is
/// derived from it.
#[derive(Debug, Clone)]
pub struct Body {
    pub(crate) handle: BodyHandle,
    pub(crate) body_type: BodyType,

    pub(crate) xf: Transform2,
    pub(crate) center: Vec2,
    pub(crate) angle: f32,
    pub(crate) local_center: Vec2,

    pub(crate) linear_velocity: Vec2,
    pub(crate) angular_velocity: f32,
    pub(crate) force: Vec2,
    pub(crate) torque: f32,

    pub(crate) mass: f32,
    pub(crate) inv_mass: f32,
    /// Rotational inertia about the center of mass
    pub(crate) inertia: f32,
    pub(crate) inv_inertia: f32,
    pub(crate) mass_override: Option<f32>,

    pub(crate) gravity_scale: f32,
    pub(crate) linear_damping: f32,
    pub(crate) angular_damping: f32,
    pub(crate) fixed_rotation: bool,

    pub(crate) can_sleep: bool,
    pub(crate) awake: bool,
    pub(crate) can_collide: bool,
    pub(crate) sleep_time: f32,

    pub(crate) fixtures: Vec<FixtureHandle>,
    pub(crate) contacts: Vec<ContactHandle>,
    /// Joints whose effective endpoint is this body
    pub(crate) joints: Vec<JointHandle>,
    /// Joints declared on this body but driven through this target
    pub(crate) relay: Option<BodyHandle>,
    /// Bodies relaying their joints onto this one
    pub(crate) relayed: BTreeSet<BodyHandle>,

    pub(crate) island_flag: bool,
    pub(crate) user_data: u128,
    pub(crate) entity: Option<u128>,
}

impl Body {
    pub(crate) fn new(handle: BodyHandle, desc: &BodyDesc) -> Self {
        let xf = Transform2::from_position_angle(desc.position, desc.angle);
        let movable = !desc.body_type.is_static();
        Self {
            handle,
            body_type: desc.body_type,
            xf,
            center: xf.position,
            angle: desc.angle,
            local_center: Vec2::ZERO,
            linear_velocity: if movable { desc.linear_velocity } else { Vec2::ZERO },
            angular_velocity: if movable { desc.angular_velocity } else { 0.0 },
            force: Vec2::ZERO,
            torque: 0.0,
            mass: 0.0,
            inv_mass: 0.0,
            inertia: 0.0,
            inv_inertia: 0.0,
            mass_override: desc.mass.filter(|m| *m > 0.0),
            gravity_scale: desc.gravity_scale,
            linear_damping: desc.linear_damping.max(0.0),
            angular_damping: desc.angular_damping.max(0.0),
            fixed_rotation: desc.fixed_rotation,
            can_sleep: desc.can_sleep,
            awake: movable && desc.awake,
            can_collide: desc.can_collide,
            sleep_time: 0.0,
            fixtures: Vec::new(),
            contacts: Vec::new(),
            joints: Vec::new(),
            relay: None,
            relayed: BTreeSet::new(),
            island_flag: false,
            user_data: desc.user_data,
            entity: None,
        }
    }

    #[inline]
    pub fn handle(&self) -> BodyHandle {
        self.handle
    }

    #[inline]
    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    /// World position of the body origin
    #[inline]
    pub fn position(&self) -> Vec2 {
        self.xf.position
    }

    #[inline]
    pub fn angle(&self) -> f32 {
        self.angle
    }

    #[inline]
    pub fn rotation(&self) -> Rot {
        self.xf.rotation
    }

    #[inline]
    pub fn transform(&self) -> Transform2 {
        self.xf
    }

    /// World-space center of mass
    #[inline]
    pub fn world_center(&self) -> Vec2 {
        self.center
    }

    #[inline]
    pub fn local_center(&self) -> Vec2 {
        self.local_center
    }

    #[inline]
    pub fn linear_velocity(&self) -> Vec2 {
        self.linear_velocity
    }

    #[inline]
    pub fn angular_velocity(&self) -> f32 {
        self.angular_velocity
    }

    /// Velocity of a world point attached to the body
    pub fn velocity_at_point(&self, point: Vec2) -> Vec2 {
        self.linear_velocity + cross_sv(self.angular_velocity, point - self.center)
    }

    #[inline]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    #[inline]
    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    /// Rotational inertia about the center of mass
    #[inline]
    pub fn inertia(&self) -> f32 {
        self.inertia
    }

    #[inline]
    pub fn inv_inertia(&self) -> f32 {
        self.inv_inertia
    }

    #[inline]
    pub fn is_awake(&self) -> bool {
        self.awake
    }

    #[inline]
    pub fn can_sleep(&self) -> bool {
        self.can_sleep
    }

    #[inline]
    pub fn can_collide(&self) -> bool {
        self.can_collide
    }

    #[inline]
    pub fn fixed_rotation(&self) -> bool {
        self.fixed_rotation
    }

    #[inline]
    pub fn gravity_scale(&self) -> f32 {
        self.gravity_scale
    }

    /// Seconds this body has been resting
    #[inline]
    pub fn sleep_time(&self) -> f32 {
        self.sleep_time
    }

    #[inline]
    pub fn fixtures(&self) -> &[FixtureHandle] {
        &self.fixtures
    }

    #[inline]
    pub fn contacts(&self) -> &[ContactHandle] {
        &self.contacts
    }

    #[inline]
    pub fn joints(&self) -> &[JointHandle] {
        &self.joints
    }

    /// Body this one's joints are redirected to
    #[inline]
    pub fn relay_target(&self) -> Option<BodyHandle> {
        self.relay
    }

    /// Bodies whose joints are redirected onto this one
    pub fn relayed_bodies(&self) -> impl Iterator<Item = BodyHandle> + '_ {
        self.relayed.iter().copied()
    }

    #[inline]
    pub fn user_data(&self) -> u128 {
        self.user_data
    }

    #[inline]
    pub fn entity(&self) -> Option<u128> {
        self.entity
    }

    pub fn world_point(&self, local: Vec2) -> Vec2 {
        self.xf.transform_point(local)
    }

    pub fn local_point(&self, world: Vec2) -> Vec2 {
        self.xf.inverse_transform_point(world)
    }

    pub fn world_vector(&self, local: Vec2) -> Vec2 {
        self.xf.transform_direction(local)
    }

    /// Rebuild the origin transform from center of mass and angle
    pub(crate) fn synchronize_transform(&mut self) {
        self.xf.rotation = Rot::from_angle(self.angle);
        self.xf.position = self.center - self.xf.rotation.rotate(self.local_center);
    }

    /// Teleport the body origin
    pub(crate) fn set_transform(&mut self, position: Vec2, angle: f32) {
        self.xf = Transform2::from_position_angle(position, angle);
        self.angle = angle;
        self.center = self.xf.transform_point(self.local_center);
    }

    /// Recompute mass, center of mass and inertia from the attached fixtures
    ///
    /// Static and kinematic bodies always end with zero inverse mass and
    /// inverse inertia.
    pub(crate) fn reset_mass_data(&mut self, fixtures: &SlotMap<Fixture>) {
        self.mass = 0.0;
        self.inv_mass = 0.0;
        self.inertia = 0.0;
        self.inv_inertia = 0.0;
        self.local_center = Vec2::ZERO;

        if !self.body_type.has_finite_mass() {
            self.center = self.xf.position;
            return;
        }

        let mut mass = 0.0;
        let mut inertia = 0.0;
        let mut local_center = Vec2::ZERO;
        for fixture in self.fixtures.iter().filter_map(|h| fixtures.get(h.0)) {
            let md = fixture.mass_data();
            if md.mass == 0.0 {
                continue;
            }
            mass += md.mass;
            local_center += md.center * md.mass;
            inertia += md.inertia;
        }

        if mass > 0.0 {
            local_center = local_center * (1.0 / mass);
        } else {
            // Massless dynamic bodies behave as unit point masses
            mass = 1.0;
            inertia = 0.0;
        }

        // Inertia about the center of mass
        inertia -= mass * local_center.dot(local_center);

        if let Some(override_mass) = self.mass_override {
            inertia *= override_mass / mass;
            mass = override_mass;
        }

        self.mass = mass;
        self.inv_mass = 1.0 / mass;

        if inertia > 0.0 && !self.fixed_rotation {
            self.inertia = inertia;
            self.inv_inertia = 1.0 / inertia;
        }

        // Keep the velocity of the center of mass consistent with the shift
        let old_center = self.center;
        self.local_center = local_center;
        self.center = self.xf.transform_point(local_center);
        self.linear_velocity += cross_sv(self.angular_velocity, self.center - old_center);
    }

    /// Put the body to sleep, clearing velocities and accumulated forces
    pub(crate) fn sleep(&mut self) {
        self.awake = false;
        self.sleep_time = 0.0;
        self.linear_velocity = Vec2::ZERO;
        self.angular_velocity = 0.0;
        self.force = Vec2::ZERO;
        self.torque = 0.0;
    }

    /// Wake the body; returns true if it was asleep
    pub(crate) fn wake(&mut self) -> bool {
        if self.body_type.is_static() {
            return false;
        }
        self.sleep_time = 0.0;
        let was_asleep = !self.awake;
        self.awake = true;
        was_asleep
    }
}
