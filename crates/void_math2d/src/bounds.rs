//! Axis-aligned bounding boxes

use crate::ray::{RayCastInput, RayCastOutput};
use crate::vector::Vec2;

/// Axis-Aligned Bounding Box
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AABB {
    pub min: Vec2,
    pub max: Vec2,
}

impl AABB {
    /// Create an empty (inverted) AABB
    pub const EMPTY: Self = Self {
        min: Vec2::new(f32::MAX, f32::MAX),
        max: Vec2::new(f32::MIN, f32::MIN),
    };

    /// Create from min and max points
    #[inline]
    pub const fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Create from center and half-extents
    #[inline]
    pub fn from_center_half_extents(center: Vec2, half_extents: Vec2) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Create from a set of points
    pub fn from_points(points: &[Vec2]) -> Self {
        let mut aabb = Self::EMPTY;
        for &point in points {
            aabb = aabb.expand_to_include(point);
        }
        aabb
    }

    /// Get the center point
    #[inline]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Get the half-extents
    #[inline]
    pub fn half_extents(&self) -> Vec2 {
        (self.max - self.min) * 0.5
    }

    /// Perimeter, the 2D surface-area heuristic
    #[inline]
    pub fn perimeter(&self) -> f32 {
        let size = self.max - self.min;
        2.0 * (size.x + size.y)
    }

    /// Check if the AABB is valid (min <= max)
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x
            && self.min.y <= self.max.y
            && self.min.is_finite()
            && self.max.is_finite()
    }

    /// Expand to include a point
    pub fn expand_to_include(self, point: Vec2) -> Self {
        Self {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    /// Union of two AABBs
    #[inline]
    pub fn union(&self, other: &AABB) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Expand AABB by a uniform amount in all directions
    #[inline]
    pub fn expand(&self, amount: f32) -> Self {
        Self {
            min: self.min - Vec2::splat(amount),
            max: self.max + Vec2::splat(amount),
        }
    }

    /// Check whether `other` lies entirely inside this box
    #[inline]
    pub fn contains(&self, other: &AABB) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
    }

    /// Check if a point is inside
    #[inline]
    pub fn contains_point(&self, point: Vec2) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    /// Check if two AABBs overlap (touching counts)
    #[inline]
    pub fn intersects(&self, other: &AABB) -> bool {
        !(other.min.x > self.max.x
            || other.min.y > self.max.y
            || self.min.x > other.max.x
            || self.min.y > other.max.y)
    }

    /// Slab test against a ray segment
    pub fn ray_cast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let mut tmin = f32::MIN;
        let mut tmax = f32::MAX;
        let p = input.origin;
        let d = input.translation;
        let mut normal = Vec2::ZERO;

        for axis in 0..2 {
            let (p_i, d_i, lo, hi) = if axis == 0 {
                (p.x, d.x, self.min.x, self.max.x)
            } else {
                (p.y, d.y, self.min.y, self.max.y)
            };

            if d_i.abs() < f32::EPSILON {
                if p_i < lo || hi < p_i {
                    return None;
                }
            } else {
                let inv_d = 1.0 / d_i;
                let mut t1 = (lo - p_i) * inv_d;
                let mut t2 = (hi - p_i) * inv_d;
                let mut s = -1.0;
                if t1 > t2 {
                    core::mem::swap(&mut t1, &mut t2);
                    s = 1.0;
                }
                if t1 > tmin {
                    normal = if axis == 0 { Vec2::new(s, 0.0) } else { Vec2::new(0.0, s) };
                    tmin = t1;
                }
                tmax = tmax.min(t2);
                if tmin > tmax {
                    return None;
                }
            }
        }

        if tmin < 0.0 || input.max_fraction < tmin {
            return None;
        }

        Some(RayCastOutput {
            fraction: tmin,
            normal,
        })
    }
}

impl Default for AABB {
    fn default() -> Self {
        Self::new(Vec2::ZERO, Vec2::ZERO)
    }
}
