//! Physics queries (AABB overlap, point tests, ray casts)

use crate::arena::SlotMap;
use crate::body::{Body, BodyHandle};
use crate::broadphase::BroadPhase;
use crate::fixture::{Fixture, FixtureHandle};
use crate::layers::CollisionGroups;
use void_math2d::{Ray2, Vec2, AABB};

/// Longest ray the world will cast
pub const MAX_RAY_DISTANCE: f32 = 1.0e6;

/// Result of a raycast query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    /// The fixture that was hit
    pub fixture: FixtureHandle,
    /// Body owning the fixture
    pub body: BodyHandle,
    /// Hit point in world space
    pub point: Vec2,
    /// Surface normal at hit point
    pub normal: Vec2,
    /// Distance from ray origin
    pub distance: f32,
    /// User data from the fixture
    pub user_data: u128,
}

/// Options for raycast queries
#[derive(Debug, Clone)]
pub struct RaycastOptions {
    /// Maximum distance for the ray
    pub max_distance: f32,
    /// Only hit hard fixtures (not sensors)
    pub solid_only: bool,
    /// Collision groups filter
    pub filter: CollisionGroups,
    /// Bodies to exclude
    pub exclude: Vec<BodyHandle>,
}

impl Default for RaycastOptions {
    fn default() -> Self {
        Self {
            max_distance: MAX_RAY_DISTANCE,
            solid_only: true,
            filter: CollisionGroups::ALL,
            exclude: Vec::new(),
        }
    }
}

impl RaycastOptions {
    /// Set maximum distance
    pub fn with_max_distance(mut self, distance: f32) -> Self {
        self.max_distance = distance;
        self
    }

    /// Set whether to hit sensors
    pub fn with_sensors(mut self, include_sensors: bool) -> Self {
        self.solid_only = !include_sensors;
        self
    }

    /// Set collision filter
    pub fn with_filter(mut self, filter: CollisionGroups) -> Self {
        self.filter = filter;
        self
    }

    /// Exclude a body
    pub fn excluding(mut self, body: BodyHandle) -> Self {
        self.exclude.push(body);
        self
    }

    fn accepts(&self, fixture: &Fixture) -> bool {
        if self.solid_only && fixture.is_sensor() {
            return false;
        }
        if !self.filter.can_collide(&fixture.groups) {
            return false;
        }
        !self.exclude.contains(&fixture.body)
    }
}

/// Spatial query interface borrowed from the world between ticks
pub struct PhysicsQuery<'w> {
    pub(crate) broadphase: &'w BroadPhase,
    pub(crate) bodies: &'w SlotMap<Body>,
    pub(crate) fixtures: &'w SlotMap<Fixture>,
}

impl PhysicsQuery<'_> {
    /// Bodies with a fixture whose tight AABB overlaps `aabb`, each once, in
    /// broadphase order
    pub fn query_aabb(&self, aabb: &AABB) -> Vec<BodyHandle> {
        let mut out = Vec::new();
        self.broadphase.query(aabb, |handle| {
            if let Some(fixture) = self.fixtures.get(handle.0) {
                if fixture.aabb.intersects(aabb) && !out.contains(&fixture.body) {
                    out.push(fixture.body);
                }
            }
            true
        });
        out
    }

    /// Fixtures containing `point`
    pub fn query_point(&self, point: Vec2) -> Vec<FixtureHandle> {
        let point_box = AABB::new(point, point);
        let mut out = Vec::new();
        self.broadphase.query(&point_box, |handle| {
            let hit = self.fixtures.get(handle.0).and_then(|fixture| {
                let body = self.bodies.get(fixture.body.0)?;
                fixture.shape.test_point(&body.xf, point).then_some(handle)
            });
            out.extend(hit);
            true
        });
        out
    }

    /// Closest hit along the ray
    pub fn ray_cast(&self, origin: Vec2, direction: Vec2, options: &RaycastOptions) -> Option<RaycastHit> {
        let mut closest = None;
        self.cast(origin, direction, options, |hit| {
            let fraction = hit.distance;
            closest = Some(hit);
            fraction
        });
        closest
    }

    /// Every hit along the ray, sorted by distance
    pub fn ray_cast_all(&self, origin: Vec2, direction: Vec2, options: &RaycastOptions) -> Vec<RaycastHit> {
        let mut hits = Vec::new();
        self.cast(origin, direction, options, |hit| {
            hits.push(hit);
            -1.0
        });
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    /// Walk the broadphase along the ray; `on_hit` returns the new max
    /// distance, or a negative value to keep the current one
    fn cast<F>(&self, origin: Vec2, direction: Vec2, options: &RaycastOptions, mut on_hit: F)
    where
        F: FnMut(RaycastHit) -> f32,
    {
        let max_distance = options.max_distance.clamp(0.0, MAX_RAY_DISTANCE);
        if direction.length_squared() == 0.0 || max_distance == 0.0 {
            return;
        }
        let ray = Ray2::new(origin, direction);
        let input = ray.to_input(max_distance);

        self.broadphase.ray_cast(&input, |sub, handle| {
            let Some(fixture) = self.fixtures.get(handle.0) else {
                return -1.0;
            };
            if !options.accepts(fixture) {
                return -1.0;
            }
            let Some(body) = self.bodies.get(fixture.body.0) else {
                return -1.0;
            };
            let Some(output) = fixture.shape.ray_cast(sub, &body.xf) else {
                return -1.0;
            };

            let hit = RaycastHit {
                fixture: handle,
                body: fixture.body,
                point: sub.point_at(output.fraction),
                normal: output.normal,
                distance: output.fraction * max_distance,
                user_data: fixture.user_data,
            };
            let new_max = on_hit(hit);
            if new_max < 0.0 {
                sub.max_fraction
            } else {
                new_max / max_distance
            }
        });
    }
}
