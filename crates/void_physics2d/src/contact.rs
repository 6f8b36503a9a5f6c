//! Contacts between fixture pairs

use crate::arena::SlotKey;
use crate::body::BodyHandle;
use crate::fixture::FixtureHandle;
use crate::narrowphase::{Manifold, WorldManifold};
use void_math2d::Transform2;

/// Handle to a live contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContactHandle(pub(crate) SlotKey);

/// Order-independent identity of a fixture pair
///
/// Sides are sorted by `(body, fixture)` so `(A, B)` and `(B, A)` produce the
/// same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContactKey {
    pub low: (BodyHandle, FixtureHandle),
    pub high: (BodyHandle, FixtureHandle),
}

impl ContactKey {
    pub fn new(a: (BodyHandle, FixtureHandle), b: (BodyHandle, FixtureHandle)) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }
}

/// A potentially colliding fixture pair
///
/// `fixture_a`/`body_a` is the side the manifold normal points away from.
#[derive(Debug, Clone)]
pub struct Contact {
    pub(crate) handle: ContactHandle,
    pub(crate) key: ContactKey,
    pub(crate) fixture_a: FixtureHandle,
    pub(crate) fixture_b: FixtureHandle,
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,
    pub(crate) manifold: Manifold,
    pub(crate) friction: f32,
    pub(crate) restitution: f32,
    /// Shapes overlap this step
    pub(crate) touching: bool,
    /// Cleared by pre-solve callbacks for the current step
    pub(crate) enabled: bool,
    /// Either fixture is a sensor; never solved
    pub(crate) sensor: bool,
    /// Filter inputs changed; re-check before the next update
    pub(crate) filter_dirty: bool,
    pub(crate) island_flag: bool,
}

impl Contact {
    #[inline]
    pub fn handle(&self) -> ContactHandle {
        self.handle
    }

    #[inline]
    pub fn key(&self) -> ContactKey {
        self.key
    }

    #[inline]
    pub fn fixture_a(&self) -> FixtureHandle {
        self.fixture_a
    }

    #[inline]
    pub fn fixture_b(&self) -> FixtureHandle {
        self.fixture_b
    }

    #[inline]
    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    #[inline]
    pub fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    #[inline]
    pub fn manifold(&self) -> &Manifold {
        &self.manifold
    }

    #[inline]
    pub fn friction(&self) -> f32 {
        self.friction
    }

    #[inline]
    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    #[inline]
    pub fn is_touching(&self) -> bool {
        self.touching
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn is_sensor(&self) -> bool {
        self.sensor
    }

    /// Participates in the constraint graph this step
    #[inline]
    pub(crate) fn is_solvable(&self) -> bool {
        self.touching && self.enabled && !self.sensor
    }

    /// The other body of the pair
    pub fn other_body(&self, body: BodyHandle) -> BodyHandle {
        if self.body_a == body {
            self.body_b
        } else {
            self.body_a
        }
    }

    /// World-space manifold given both body transforms and shape radii
    pub fn world_manifold(
        &self,
        xf_a: &Transform2,
        radius_a: f32,
        xf_b: &Transform2,
        radius_b: f32,
    ) -> WorldManifold {
        WorldManifold::new(&self.manifold, xf_a, radius_a, xf_b, radius_b)
    }
}
