//! Fixtures: shapes attached to bodies

use crate::arena::SlotKey;
use crate::body::BodyHandle;
use crate::broadphase::ProxyId;
use crate::layers::CollisionGroups;
use crate::material::PhysicsMaterial;
use crate::shape::{MassData, Shape};
use void_math2d::AABB;

/// Handle to a fixture in the physics world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FixtureHandle(pub(crate) SlotKey);

impl FixtureHandle {
    /// Get the raw slot key
    pub fn raw(&self) -> SlotKey {
        self.0
    }
}

/// Description for attaching a fixture to a body
#[derive(Debug, Clone)]
pub struct FixtureDesc {
    /// Shape in body-local space
    pub shape: Shape,
    /// Friction, restitution and density
    pub material: PhysicsMaterial,
    /// Blocking collision; `false` makes the fixture a sensor
    pub hard: bool,
    /// Layer/mask filter
    pub groups: CollisionGroups,
    /// Arbitrary user data
    pub user_data: u128,
}

impl FixtureDesc {
    pub fn new(shape: Shape) -> Self {
        Self {
            shape,
            material: PhysicsMaterial::default(),
            hard: true,
            groups: CollisionGroups::default(),
            user_data: 0,
        }
    }

    pub fn with_material(mut self, material: PhysicsMaterial) -> Self {
        self.material = material;
        self
    }

    pub fn with_density(mut self, density: f32) -> Self {
        self.material.density = density.max(0.0);
        self
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.material.friction = friction.max(0.0);
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.material.restitution = restitution.max(0.0);
        self
    }

    /// Make this fixture a non-blocking sensor
    pub fn sensor(mut self) -> Self {
        self.hard = false;
        self
    }

    pub fn with_groups(mut self, groups: CollisionGroups) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_user_data(mut self, data: u128) -> Self {
        self.user_data = data;
        self
    }
}

/// A shape attached to exactly one body
#[derive(Debug, Clone)]
pub struct Fixture {
    pub(crate) handle: FixtureHandle,
    pub(crate) body: BodyHandle,
    pub(crate) shape: Shape,
    pub(crate) material: PhysicsMaterial,
    pub(crate) hard: bool,
    pub(crate) groups: CollisionGroups,
    pub(crate) proxy: Option<ProxyId>,
    /// Tight world AABB at the last synchronization
    pub(crate) aabb: AABB,
    pub(crate) mass_data: MassData,
    pub(crate) user_data: u128,
}

impl Fixture {
    pub(crate) fn new(handle: FixtureHandle, body: BodyHandle, desc: FixtureDesc) -> Self {
        let mass_data = desc.shape.compute_mass(desc.material.density);
        Self {
            handle,
            body,
            shape: desc.shape,
            material: desc.material,
            hard: desc.hard,
            groups: desc.groups,
            proxy: None,
            aabb: AABB::default(),
            mass_data,
            user_data: desc.user_data,
        }
    }

    #[inline]
    pub fn handle(&self) -> FixtureHandle {
        self.handle
    }

    #[inline]
    pub fn body(&self) -> BodyHandle {
        self.body
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn material(&self) -> &PhysicsMaterial {
        &self.material
    }

    #[inline]
    pub fn density(&self) -> f32 {
        self.material.density
    }

    #[inline]
    pub fn is_hard(&self) -> bool {
        self.hard
    }

    #[inline]
    pub fn is_sensor(&self) -> bool {
        !self.hard
    }

    #[inline]
    pub fn groups(&self) -> CollisionGroups {
        self.groups
    }

    #[inline]
    pub fn proxy(&self) -> Option<ProxyId> {
        self.proxy
    }

    /// Tight world AABB
    #[inline]
    pub fn aabb(&self) -> AABB {
        self.aabb
    }

    #[inline]
    pub fn mass_data(&self) -> MassData {
        self.mass_data
    }

    #[inline]
    pub fn user_data(&self) -> u128 {
        self.user_data
    }

    pub(crate) fn set_density(&mut self, density: f32) {
        self.material.density = density.max(0.0);
        self.mass_data = self.shape.compute_mass(self.material.density);
    }
}
