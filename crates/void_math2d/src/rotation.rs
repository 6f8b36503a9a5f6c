//! Planar rotation and 2x2 matrix

use crate::vector::Vec2;
use core::ops::{Add, Mul};

/// Rotation stored as sine/cosine of the angle
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rot {
    pub s: f32,
    pub c: f32,
}

impl Rot {
    pub const IDENTITY: Self = Self { s: 0.0, c: 1.0 };

    /// Create from an angle in radians
    #[inline]
    pub fn from_angle(angle: f32) -> Self {
        let (s, c) = angle.sin_cos();
        Self { s, c }
    }

    /// Angle in radians, in `(-pi, pi]`
    #[inline]
    pub fn angle(&self) -> f32 {
        self.s.atan2(self.c)
    }

    /// Local x-axis in world space
    #[inline]
    pub fn x_axis(&self) -> Vec2 {
        Vec2::new(self.c, self.s)
    }

    /// Local y-axis in world space
    #[inline]
    pub fn y_axis(&self) -> Vec2 {
        Vec2::new(-self.s, self.c)
    }

    /// Rotate a vector
    #[inline]
    pub fn rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x - self.s * v.y, self.s * v.x + self.c * v.y)
    }

    /// Rotate a vector by the inverse rotation
    #[inline]
    pub fn inv_rotate(&self, v: Vec2) -> Vec2 {
        Vec2::new(self.c * v.x + self.s * v.y, -self.s * v.x + self.c * v.y)
    }

    /// `self * other`
    #[inline]
    pub fn mul_rot(&self, other: Rot) -> Rot {
        Rot {
            s: self.s * other.c + self.c * other.s,
            c: self.c * other.c - self.s * other.s,
        }
    }

    /// `transpose(self) * other`
    #[inline]
    pub fn inv_mul_rot(&self, other: Rot) -> Rot {
        Rot {
            s: self.c * other.s - self.s * other.c,
            c: self.c * other.c + self.s * other.s,
        }
    }
}

impl Default for Rot {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul<Vec2> for Rot {
    type Output = Vec2;
    #[inline]
    fn mul(self, rhs: Vec2) -> Vec2 {
        self.rotate(rhs)
    }
}

/// Column-major 2x2 matrix
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Mat22 {
    pub ex: Vec2,
    pub ey: Vec2,
}

impl Mat22 {
    pub const ZERO: Self = Self { ex: Vec2::ZERO, ey: Vec2::ZERO };
    pub const IDENTITY: Self = Self { ex: Vec2::X, ey: Vec2::Y };

    #[inline]
    pub const fn from_cols(ex: Vec2, ey: Vec2) -> Self {
        Self { ex, ey }
    }

    #[inline]
    pub fn determinant(&self) -> f32 {
        self.ex.x * self.ey.y - self.ey.x * self.ex.y
    }

    /// Inverse, or the zero matrix when singular
    pub fn inverse(&self) -> Self {
        let (a, b, c, d) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a * d - b * c;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Self {
            ex: Vec2::new(det * d, -det * c),
            ey: Vec2::new(-det * b, det * a),
        }
    }

    /// Solve `A * x = b` without forming the inverse; zero when singular
    pub fn solve(&self, b: Vec2) -> Vec2 {
        let (a11, a12, a21, a22) = (self.ex.x, self.ey.x, self.ex.y, self.ey.y);
        let mut det = a11 * a22 - a12 * a21;
        if det != 0.0 {
            det = 1.0 / det;
        }
        Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
    }
}

impl Mul<Vec2> for Mat22 {
    type Output = Vec2;
    #[inline]
    fn mul(self, v: Vec2) -> Vec2 {
        Vec2::new(
            self.ex.x * v.x + self.ey.x * v.y,
            self.ex.y * v.x + self.ey.y * v.y,
        )
    }
}

impl Add for Mat22 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self { ex: self.ex + rhs.ex, ey: self.ey + rhs.ey }
    }
}
