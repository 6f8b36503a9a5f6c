//! 2D rays and ray-cast input/output records

use crate::vector::Vec2;

/// 2D ray with a normalized direction
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray2 {
    /// Ray origin point
    pub origin: Vec2,
    /// Ray direction (normalized)
    pub direction: Vec2,
}

impl Ray2 {
    /// Create a new ray with normalized direction
    #[inline]
    pub fn new(origin: Vec2, direction: Vec2) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Create a ray from two points
    #[inline]
    pub fn from_points(start: Vec2, end: Vec2) -> Self {
        Self::new(start, end - start)
    }

    /// Get a point at distance t along the ray
    #[inline]
    pub fn at(&self, t: f32) -> Vec2 {
        self.origin + self.direction * t
    }

    /// Segment input covering `max_distance` along the ray
    #[inline]
    pub fn to_input(&self, max_distance: f32) -> RayCastInput {
        RayCastInput::new(self.origin, self.direction * max_distance, 1.0)
    }
}

/// Ray segment `origin + t * translation` for `t` in `[0, max_fraction]`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayCastInput {
    pub origin: Vec2,
    pub translation: Vec2,
    pub max_fraction: f32,
}

impl RayCastInput {
    #[inline]
    pub const fn new(origin: Vec2, translation: Vec2, max_fraction: f32) -> Self {
        Self {
            origin,
            translation,
            max_fraction,
        }
    }

    /// World point at a given fraction
    #[inline]
    pub fn point_at(&self, fraction: f32) -> Vec2 {
        self.origin + self.translation * fraction
    }
}

/// Hit fraction along the input translation plus the surface normal
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayCastOutput {
    pub fraction: f32,
    pub normal: Vec2,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ray_at() {
        let ray = Ray2::new(Vec2::ZERO, Vec2::new(2.0, 0.0));
        assert_eq!(ray.at(3.0), Vec2::new(3.0, 0.0));
    }

    #[test]
    fn test_ray_to_input_scales_translation() {
        let ray = Ray2::from_points(Vec2::ZERO, Vec2::new(0.0, 5.0));
        let input = ray.to_input(10.0);
        assert_eq!(input.point_at(1.0), Vec2::new(0.0, 10.0));
    }
}
