//! Rigid 2D transform (translation + rotation)

use crate::rotation::Rot;
use crate::vector::Vec2;

/// Rigid transform: rotate then translate
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transform2 {
    pub position: Vec2,
    pub rotation: Rot,
}

impl Transform2 {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        position: Vec2::ZERO,
        rotation: Rot::IDENTITY,
    };

    /// Create a new transform
    #[inline]
    pub const fn new(position: Vec2, rotation: Rot) -> Self {
        Self { position, rotation }
    }

    /// Create from position and angle in radians
    #[inline]
    pub fn from_position_angle(position: Vec2, angle: f32) -> Self {
        Self {
            position,
            rotation: Rot::from_angle(angle),
        }
    }

    /// Create from position only
    #[inline]
    pub fn from_position(position: Vec2) -> Self {
        Self {
            position,
            rotation: Rot::IDENTITY,
        }
    }

    /// Transform a local point to world space
    #[inline]
    pub fn transform_point(&self, point: Vec2) -> Vec2 {
        self.position + self.rotation.rotate(point)
    }

    /// Transform a world point into local space
    #[inline]
    pub fn inverse_transform_point(&self, point: Vec2) -> Vec2 {
        self.rotation.inv_rotate(point - self.position)
    }

    /// Transform a direction (ignores position)
    #[inline]
    pub fn transform_direction(&self, direction: Vec2) -> Vec2 {
        self.rotation.rotate(direction)
    }

    /// Transform a world direction into local space
    #[inline]
    pub fn inverse_transform_direction(&self, direction: Vec2) -> Vec2 {
        self.rotation.inv_rotate(direction)
    }

    /// `self * other`
    pub fn mul_transform(&self, other: &Transform2) -> Self {
        Self {
            position: self.transform_point(other.position),
            rotation: self.rotation.mul_rot(other.rotation),
        }
    }

    /// `inverse(self) * other`
    pub fn inv_mul_transform(&self, other: &Transform2) -> Self {
        Self {
            position: self.rotation.inv_rotate(other.position - self.position),
            rotation: self.rotation.inv_mul_rot(other.rotation),
        }
    }

    /// Compute the inverse transform
    pub fn inverse(&self) -> Self {
        let inv_rotation = Rot {
            s: -self.rotation.s,
            c: self.rotation.c,
        };
        Self {
            position: inv_rotation.rotate(-self.position),
            rotation: inv_rotation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_transform_point_roundtrip() {
        let xf = Transform2::from_position_angle(Vec2::new(3.0, -1.0), 1.2);
        let p = Vec2::new(0.5, 2.0);
        let local = xf.inverse_transform_point(xf.transform_point(p));
        assert_abs_diff_eq!(local.x, p.x, epsilon = 1e-5);
        assert_abs_diff_eq!(local.y, p.y, epsilon = 1e-5);
    }

    #[test]
    fn test_inverse_composes_to_identity() {
        let xf = Transform2::from_position_angle(Vec2::new(-2.0, 4.0), -0.4);
        let id = xf.mul_transform(&xf.inverse());
        assert_abs_diff_eq!(id.position.x, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(id.position.y, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(id.rotation.angle(), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_inv_mul_matches_inverse_then_mul() {
        let a = Transform2::from_position_angle(Vec2::new(1.0, 2.0), 0.3);
        let b = Transform2::from_position_angle(Vec2::new(-1.0, 0.5), 1.1);
        let direct = a.inv_mul_transform(&b);
        let composed = a.inverse().mul_transform(&b);
        assert_abs_diff_eq!(direct.position.x, composed.position.x, epsilon = 1e-5);
        assert_abs_diff_eq!(direct.position.y, composed.position.y, epsilon = 1e-5);
        assert_abs_diff_eq!(direct.rotation.angle(), composed.rotation.angle(), epsilon = 1e-5);
    }
}
