//! Contact manifolds
//!
//! Manifolds are stored in the local frame of one of the shapes so they can
//! be re-evaluated cheaply during position correction. Each point carries a
//! feature id used to match points between steps for warm starting.

use void_math2d::{Transform2, Vec2};

/// Maximum number of points in a manifold
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Which kind of feature a contact point came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FeatureType {
    #[default]
    Vertex,
    Face,
}

/// The features that intersect to form a contact point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContactFeature {
    pub index_a: u8,
    pub index_b: u8,
    pub type_a: FeatureType,
    pub type_b: FeatureType,
}

impl ContactFeature {
    /// Packed key used to compare features quickly
    pub fn key(&self) -> u32 {
        u32::from(self.index_a)
            | u32::from(self.index_b) << 8
            | (self.type_a as u32) << 16
            | (self.type_b as u32) << 24
    }

    /// Same feature seen from the other shape
    pub fn swapped(self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            type_a: self.type_b,
            type_b: self.type_a,
        }
    }
}

/// How the manifold's local data is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifoldType {
    /// `local_point` is circle A's center, point is circle B's center
    #[default]
    Circles,
    /// Reference face on shape A; points live on shape B
    FaceA,
    /// Reference face on shape B; points live on shape A
    FaceB,
}

/// A manifold point, with impulses persisted for warm starting
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ManifoldPoint {
    /// Meaning depends on the manifold type:
    /// circle B center, or clip point on the incident shape
    pub local_point: Vec2,
    pub normal_impulse: f32,
    pub tangent_impulse: f32,
    pub id: ContactFeature,
}

/// Contact points between two convex shapes
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Manifold {
    pub points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    pub local_normal: Vec2,
    pub local_point: Vec2,
    pub kind: ManifoldType,
    pub point_count: usize,
}

impl Manifold {
    /// No contact
    pub const EMPTY: Self = Self {
        points: [ManifoldPoint {
            local_point: Vec2::ZERO,
            normal_impulse: 0.0,
            tangent_impulse: 0.0,
            id: ContactFeature {
                index_a: 0,
                index_b: 0,
                type_a: FeatureType::Vertex,
                type_b: FeatureType::Vertex,
            },
        }; MAX_MANIFOLD_POINTS],
        local_normal: Vec2::ZERO,
        local_point: Vec2::ZERO,
        kind: ManifoldType::Circles,
        point_count: 0,
    };

    #[inline]
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    /// Carry accumulated impulses over from `old` where feature ids match
    pub fn carry_impulses_from(&mut self, old: &Manifold) {
        for point in self.points[..self.point_count].iter_mut() {
            point.normal_impulse = 0.0;
            point.tangent_impulse = 0.0;

            let key = point.id.key();
            if let Some(prev) = old.points().iter().find(|p| p.id.key() == key) {
                point.normal_impulse = prev.normal_impulse;
                point.tangent_impulse = prev.tangent_impulse;
            }
        }
    }

    /// Sum of normal impulses over all points
    pub fn total_normal_impulse(&self) -> f32 {
        self.points().iter().map(|p| p.normal_impulse).sum()
    }
}

/// World-space view of a manifold
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldManifold {
    /// Points from A to B
    pub normal: Vec2,
    /// Midpoints between the two surfaces
    pub points: [Vec2; MAX_MANIFOLD_POINTS],
    /// Negative when penetrating
    pub separations: [f32; MAX_MANIFOLD_POINTS],
    pub point_count: usize,
}

impl WorldManifold {
    pub fn new(
        manifold: &Manifold,
        xf_a: &Transform2,
        radius_a: f32,
        xf_b: &Transform2,
        radius_b: f32,
    ) -> Self {
        let mut out = Self {
            point_count: manifold.point_count,
            ..Default::default()
        };
        if manifold.point_count == 0 {
            return out;
        }

        match manifold.kind {
            ManifoldType::Circles => {
                let point_a = xf_a.transform_point(manifold.local_point);
                let point_b = xf_b.transform_point(manifold.points[0].local_point);
                let mut normal = Vec2::X;
                if point_a.distance_squared(point_b) > f32::EPSILON * f32::EPSILON {
                    normal = (point_b - point_a).normalize();
                }
                let c_a = point_a + normal * radius_a;
                let c_b = point_b - normal * radius_b;
                out.normal = normal;
                out.points[0] = (c_a + c_b) * 0.5;
                out.separations[0] = (c_b - c_a).dot(normal);
            }
            ManifoldType::FaceA => {
                let normal = xf_a.transform_direction(manifold.local_normal);
                let plane_point = xf_a.transform_point(manifold.local_point);
                for (i, mp) in manifold.points().iter().enumerate() {
                    let clip = xf_b.transform_point(mp.local_point);
                    let c_a = clip + normal * (radius_a - (clip - plane_point).dot(normal));
                    let c_b = clip - normal * radius_b;
                    out.points[i] = (c_a + c_b) * 0.5;
                    out.separations[i] = (c_b - c_a).dot(normal);
                }
                out.normal = normal;
            }
            ManifoldType::FaceB => {
                let normal = xf_b.transform_direction(manifold.local_normal);
                let plane_point = xf_b.transform_point(manifold.local_point);
                for (i, mp) in manifold.points().iter().enumerate() {
                    let clip = xf_a.transform_point(mp.local_point);
                    let c_b = clip + normal * (radius_b - (clip - plane_point).dot(normal));
                    let c_a = clip - normal * radius_a;
                    out.points[i] = (c_a + c_b) * 0.5;
                    out.separations[i] = (c_a - c_b).dot(normal);
                }
                // Keep the normal pointing from A to B
                out.normal = -normal;
            }
        }

        out
    }

    #[inline]
    pub fn points(&self) -> &[Vec2] {
        &self.points[..self.point_count]
    }

    /// Deepest penetration, zero when only touching
    pub fn max_penetration(&self) -> f32 {
        self.separations[..self.point_count]
            .iter()
            .fold(0.0f32, |acc, s| acc.max(-s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_key_distinguishes_roles() {
        let a = ContactFeature {
            index_a: 1,
            index_b: 2,
            type_a: FeatureType::Face,
            type_b: FeatureType::Vertex,
        };
        assert_ne!(a.key(), a.swapped().key());
        assert_eq!(a.swapped().swapped(), a);
    }

    #[test]
    fn test_carry_impulses_matches_ids() {
        let mut old = Manifold::EMPTY;
        old.point_count = 2;
        old.points[0].id.index_b = 1;
        old.points[0].normal_impulse = 3.0;
        old.points[1].id.index_b = 2;
        old.points[1].normal_impulse = 5.0;

        let mut new = Manifold::EMPTY;
        new.point_count = 1;
        new.points[0].id.index_b = 2;
        new.carry_impulses_from(&old);

        assert_eq!(new.points[0].normal_impulse, 5.0);
    }
}
