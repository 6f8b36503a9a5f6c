//! Collision shapes
//!
//! All shape geometry is stored in body-local space. Polygons are convex and
//! wound counter-clockwise with outward normals precomputed at construction.

use crate::error::ShapeError;
use serde::{Deserialize, Serialize};
use void_math2d::{RayCastInput, RayCastOutput, Transform2, Vec2, AABB};

/// Maximum number of vertices on a convex polygon
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Nominal penetration tolerance used to size shape skins
pub const LINEAR_SLOP: f32 = 0.005;

/// Skin thickness around polygons and edges
pub const POLYGON_RADIUS: f32 = 2.0 * LINEAR_SLOP;

/// Mass properties of a shape at a given density, about the body origin
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MassData {
    pub mass: f32,
    pub center: Vec2,
    /// Rotational inertia about the body origin
    pub inertia: f32,
}

/// Shape discriminant, used for narrowphase dispatch and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeType {
    Circle,
    Polygon,
    Edge,
}

/// A convex polygon with up to [`MAX_POLYGON_VERTICES`] vertices
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Polygon {
    vertices: [Vec2; MAX_POLYGON_VERTICES],
    normals: [Vec2; MAX_POLYGON_VERTICES],
    count: usize,
    centroid: Vec2,
    radius: f32,
}

impl Polygon {
    /// Build the convex hull of `points`
    ///
    /// Points closer than half the linear slop are welded. Fails when the hull
    /// has fewer than three vertices or encloses no area.
    pub fn new(points: &[Vec2]) -> Result<Self, ShapeError> {
        if points.len() < 3 {
            return Err(ShapeError::TooFewVertices(points.len()));
        }
        if points.len() > MAX_POLYGON_VERTICES {
            return Err(ShapeError::TooManyVertices {
                count: points.len(),
                max: MAX_POLYGON_VERTICES,
            });
        }
        if points.iter().any(|p| !p.is_finite()) {
            return Err(ShapeError::NonFinite);
        }

        let weld_sq = (0.5 * LINEAR_SLOP) * (0.5 * LINEAR_SLOP);
        let mut unique: Vec<Vec2> = Vec::with_capacity(points.len());
        for &p in points {
            if unique.iter().all(|q| q.distance_squared(p) > weld_sq) {
                unique.push(p);
            }
        }
        if unique.len() < 3 {
            return Err(ShapeError::Degenerate);
        }

        let hull = convex_hull(&unique);
        if hull.len() < 3 {
            return Err(ShapeError::Degenerate);
        }

        let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        let mut normals = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        let count = hull.len();
        vertices[..count].copy_from_slice(&hull);

        for i in 0..count {
            let edge = vertices[(i + 1) % count] - vertices[i];
            if edge.length_squared() <= f32::EPSILON * f32::EPSILON {
                return Err(ShapeError::Degenerate);
            }
            normals[i] = edge.right_perpendicular().normalize();
        }

        let centroid = compute_centroid(&vertices[..count]).ok_or(ShapeError::Degenerate)?;

        Ok(Self {
            vertices,
            normals,
            count,
            centroid,
            radius: POLYGON_RADIUS,
        })
    }

    /// Axis-aligned box centered on the body origin
    pub fn boxed(half_width: f32, half_height: f32) -> Result<Self, ShapeError> {
        Self::oriented_box(half_width, half_height, Vec2::ZERO, 0.0)
    }

    /// Box with a local center and rotation
    pub fn oriented_box(
        half_width: f32,
        half_height: f32,
        center: Vec2,
        angle: f32,
    ) -> Result<Self, ShapeError> {
        if !(half_width > 0.0 && half_height > 0.0) {
            return Err(ShapeError::Degenerate);
        }
        let xf = Transform2::from_position_angle(center, angle);
        let corners = [
            Vec2::new(-half_width, -half_height),
            Vec2::new(half_width, -half_height),
            Vec2::new(half_width, half_height),
            Vec2::new(-half_width, half_height),
        ]
        .map(|v| xf.transform_point(v));
        Self::new(&corners)
    }

    /// Two-sided segment treated as a degenerate polygon by the narrowphase
    pub(crate) fn from_segment(v1: Vec2, v2: Vec2) -> Self {
        let mut vertices = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        let mut normals = [Vec2::ZERO; MAX_POLYGON_VERTICES];
        vertices[0] = v1;
        vertices[1] = v2;
        let n = (v2 - v1).right_perpendicular().normalize();
        normals[0] = n;
        normals[1] = -n;
        Self {
            vertices,
            normals,
            count: 2,
            centroid: (v1 + v2) * 0.5,
            radius: POLYGON_RADIUS,
        }
    }

    #[inline]
    pub fn vertices(&self) -> &[Vec2] {
        &self.vertices[..self.count]
    }

    #[inline]
    pub fn normals(&self) -> &[Vec2] {
        &self.normals[..self.count]
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn centroid(&self) -> Vec2 {
        self.centroid
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    fn mass(&self, density: f32) -> MassData {
        let vs = self.vertices();
        let origin = vs[0];
        let inv3 = 1.0 / 3.0;

        let mut area = 0.0;
        let mut center = Vec2::ZERO;
        let mut inertia = 0.0;

        for i in 0..vs.len() {
            let e1 = vs[i] - origin;
            let e2 = vs[(i + 1) % vs.len()] - origin;
            let d = e1.cross(e2);
            let tri_area = 0.5 * d;
            area += tri_area;
            center += (e1 + e2) * (tri_area * inv3);

            let int_x2 = e1.x * e1.x + e2.x * e1.x + e2.x * e2.x;
            let int_y2 = e1.y * e1.y + e2.y * e1.y + e2.y * e2.y;
            inertia += (0.25 * inv3 * d) * (int_x2 + int_y2);
        }

        let mass = density * area;
        let center = center * (1.0 / area);
        let mass_center = center + origin;
        // Shift from the reference vertex to the body origin
        let inertia = density * inertia
            + mass * (mass_center.dot(mass_center) - center.dot(center));

        MassData {
            mass,
            center: mass_center,
            inertia,
        }
    }

    fn ray_cast_local(&self, p1: Vec2, d: Vec2, max_fraction: f32) -> Option<(f32, Vec2)> {
        let mut lower = 0.0f32;
        let mut upper = max_fraction;
        let mut index = None;

        for (i, (&v, &n)) in self.vertices().iter().zip(self.normals()).enumerate() {
            let numerator = n.dot(v - p1);
            let denominator = n.dot(d);

            if denominator == 0.0 {
                if numerator < 0.0 {
                    return None;
                }
            } else if denominator < 0.0 && numerator < lower * denominator {
                lower = numerator / denominator;
                index = Some(i);
            } else if denominator > 0.0 && numerator < upper * denominator {
                upper = numerator / denominator;
            }

            if upper < lower {
                return None;
            }
        }

        index.map(|i| (lower, self.normals[i]))
    }
}

/// Gift-wrapping hull in counter-clockwise order; collinear input collapses to two points
fn convex_hull(points: &[Vec2]) -> Vec<Vec2> {
    let n = points.len();

    let mut i0 = 0;
    for i in 1..n {
        let (p, best) = (points[i], points[i0]);
        if p.x > best.x || (p.x == best.x && p.y < best.y) {
            i0 = i;
        }
    }

    let mut hull: Vec<usize> = Vec::with_capacity(n);
    let mut ih = i0;
    loop {
        hull.push(ih);
        let current = points[ih];

        let mut ie = 0;
        for j in 1..n {
            if ie == ih {
                ie = j;
                continue;
            }
            let r = points[ie] - current;
            let v = points[j] - current;
            let c = r.cross(v);
            if c < 0.0 || (c == 0.0 && v.length_squared() > r.length_squared()) {
                ie = j;
            }
        }

        ih = ie;
        if ie == i0 || hull.len() > n {
            break;
        }
    }

    hull.iter().map(|&i| points[i]).collect()
}

fn compute_centroid(vs: &[Vec2]) -> Option<Vec2> {
    let origin = vs[0];
    let inv3 = 1.0 / 3.0;
    let mut c = Vec2::ZERO;
    let mut area = 0.0;

    for i in 1..vs.len() - 1 {
        let e1 = vs[i] - origin;
        let e2 = vs[i + 1] - origin;
        let tri_area = 0.5 * e1.cross(e2);
        area += tri_area;
        c += (e1 + e2) * (tri_area * inv3);
    }

    if area <= f32::EPSILON {
        return None;
    }
    Some(c * (1.0 / area) + origin)
}

/// Geometric primitive carried by a fixture
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Circle { center: Vec2, radius: f32 },
    Polygon(Polygon),
    /// Two-sided segment; edges never collide with other edges
    Edge { v1: Vec2, v2: Vec2 },
}

impl Shape {
    /// Circle centered on the body origin
    pub fn circle(radius: f32) -> Result<Self, ShapeError> {
        Self::circle_at(Vec2::ZERO, radius)
    }

    /// Circle with a local center
    pub fn circle_at(center: Vec2, radius: f32) -> Result<Self, ShapeError> {
        let shape = Self::Circle { center, radius };
        shape.validate()?;
        Ok(shape)
    }

    /// Convex hull of the given points
    pub fn polygon(points: &[Vec2]) -> Result<Self, ShapeError> {
        Polygon::new(points).map(Self::Polygon)
    }

    /// Axis-aligned box centered on the body origin
    pub fn boxed(half_width: f32, half_height: f32) -> Result<Self, ShapeError> {
        Polygon::boxed(half_width, half_height).map(Self::Polygon)
    }

    /// Line segment
    pub fn edge(v1: Vec2, v2: Vec2) -> Result<Self, ShapeError> {
        let shape = Self::Edge { v1, v2 };
        shape.validate()?;
        Ok(shape)
    }

    /// Re-check the shape invariants
    ///
    /// Fixtures validate on insertion, so a shape assembled by hand is caught
    /// before it reaches the solver.
    pub fn validate(&self) -> Result<(), ShapeError> {
        match *self {
            Self::Circle { center, radius } => {
                if !center.is_finite() {
                    return Err(ShapeError::NonFinite);
                }
                if !(radius.is_finite() && radius > 0.0) {
                    return Err(ShapeError::InvalidRadius(radius));
                }
                Ok(())
            }
            Self::Polygon(ref poly) => {
                if poly.count < 3 {
                    return Err(ShapeError::TooFewVertices(poly.count));
                }
                if poly.vertices().iter().any(|v| !v.is_finite()) {
                    return Err(ShapeError::NonFinite);
                }
                Ok(())
            }
            Self::Edge { v1, v2 } => {
                if !(v1.is_finite() && v2.is_finite()) {
                    return Err(ShapeError::NonFinite);
                }
                if v1.distance_squared(v2) <= LINEAR_SLOP * LINEAR_SLOP {
                    return Err(ShapeError::ZeroLengthEdge);
                }
                Ok(())
            }
        }
    }

    pub fn shape_type(&self) -> ShapeType {
        match self {
            Self::Circle { .. } => ShapeType::Circle,
            Self::Polygon(_) => ShapeType::Polygon,
            Self::Edge { .. } => ShapeType::Edge,
        }
    }

    /// Collision radius (skin for polygons and edges)
    pub fn radius(&self) -> f32 {
        match self {
            Self::Circle { radius, .. } => *radius,
            Self::Polygon(poly) => poly.radius,
            Self::Edge { .. } => POLYGON_RADIUS,
        }
    }

    /// World-space bounds under `xf`, including the skin
    pub fn compute_aabb(&self, xf: &Transform2) -> AABB {
        match self {
            Self::Circle { center, radius } => {
                let p = xf.transform_point(*center);
                AABB::new(p - Vec2::splat(*radius), p + Vec2::splat(*radius))
            }
            Self::Polygon(poly) => {
                let mut lower = xf.transform_point(poly.vertices[0]);
                let mut upper = lower;
                for &v in &poly.vertices()[1..] {
                    let p = xf.transform_point(v);
                    lower = lower.min(p);
                    upper = upper.max(p);
                }
                AABB::new(lower, upper).expand(poly.radius)
            }
            Self::Edge { v1, v2 } => {
                let a = xf.transform_point(*v1);
                let b = xf.transform_point(*v2);
                AABB::new(a.min(b), a.max(b)).expand(POLYGON_RADIUS)
            }
        }
    }

    /// Mass properties at `density`; edges are massless
    pub fn compute_mass(&self, density: f32) -> MassData {
        match self {
            Self::Circle { center, radius } => {
                let rr = radius * radius;
                let mass = density * std::f32::consts::PI * rr;
                MassData {
                    mass,
                    center: *center,
                    inertia: mass * (0.5 * rr + center.dot(*center)),
                }
            }
            Self::Polygon(poly) => poly.mass(density),
            Self::Edge { v1, v2 } => MassData {
                mass: 0.0,
                center: (*v1 + *v2) * 0.5,
                inertia: 0.0,
            },
        }
    }

    /// Whether a world point lies inside the shape
    pub fn test_point(&self, xf: &Transform2, point: Vec2) -> bool {
        match self {
            Self::Circle { center, radius } => {
                let c = xf.transform_point(*center);
                c.distance_squared(point) <= radius * radius
            }
            Self::Polygon(poly) => {
                let local = xf.inverse_transform_point(point);
                poly.vertices()
                    .iter()
                    .zip(poly.normals())
                    .all(|(&v, &n)| n.dot(local - v) <= 0.0)
            }
            Self::Edge { .. } => false,
        }
    }

    /// Cast a world-space ray against the shape placed at `xf`
    pub fn ray_cast(&self, input: &RayCastInput, xf: &Transform2) -> Option<RayCastOutput> {
        match self {
            Self::Circle { center, radius } => {
                let position = xf.transform_point(*center);
                let s = input.origin - position;
                let b = s.dot(s) - radius * radius;

                let r = input.translation;
                let c = s.dot(r);
                let rr = r.dot(r);
                let sigma = c * c - rr * b;

                if sigma < 0.0 || rr < f32::EPSILON {
                    return None;
                }

                let a = -(c + sigma.sqrt());
                if (0.0..=input.max_fraction * rr).contains(&a) {
                    let fraction = a / rr;
                    Some(RayCastOutput {
                        fraction,
                        normal: (s + r * fraction).normalize(),
                    })
                } else {
                    None
                }
            }
            Self::Polygon(poly) => {
                let p1 = xf.inverse_transform_point(input.origin);
                let d = xf.inverse_transform_direction(input.translation);
                poly.ray_cast_local(p1, d, input.max_fraction)
                    .map(|(fraction, normal)| RayCastOutput {
                        fraction,
                        normal: xf.transform_direction(normal),
                    })
            }
            Self::Edge { v1, v2 } => {
                let p1 = xf.inverse_transform_point(input.origin);
                let d = xf.inverse_transform_direction(input.translation);

                let e = *v2 - *v1;
                let normal = e.right_perpendicular().normalize();

                let numerator = normal.dot(*v1 - p1);
                let denominator = normal.dot(d);
                if denominator == 0.0 {
                    return None;
                }

                let t = numerator / denominator;
                if t < 0.0 || input.max_fraction < t {
                    return None;
                }

                let q = p1 + d * t;
                let rr = e.dot(e);
                if rr == 0.0 {
                    return None;
                }
                let s = (q - *v1).dot(e) / rr;
                if !(0.0..=1.0).contains(&s) {
                    return None;
                }

                let local_normal = if numerator > 0.0 { -normal } else { normal };
                Some(RayCastOutput {
                    fraction: t,
                    normal: xf.transform_direction(local_normal),
                })
            }
        }
    }

    /// The shape as a polygon for clipping; edges become two-vertex polygons
    pub(crate) fn as_polygon(&self) -> Option<Polygon> {
        match self {
            Self::Polygon(poly) => Some(*poly),
            Self::Edge { v1, v2 } => Some(Polygon::from_segment(*v1, *v2)),
            Self::Circle { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_polygon_hull_is_ccw() {
        let poly = Polygon::new(&[
            Vec2::new(1.0, 1.0),
            Vec2::new(-1.0, -1.0),
            Vec2::new(1.0, -1.0),
            Vec2::new(-1.0, 1.0),
            Vec2::new(0.0, 0.0),
        ])
        .unwrap();
        assert_eq!(poly.count(), 4);

        let vs = poly.vertices();
        for i in 0..vs.len() {
            let a = vs[i];
            let b = vs[(i + 1) % vs.len()];
            let c = vs[(i + 2) % vs.len()];
            assert!((b - a).cross(c - b) > 0.0);
        }
        assert_abs_diff_eq!(poly.centroid().x, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_polygon_validation() {
        assert_eq!(
            Polygon::new(&[Vec2::ZERO, Vec2::X]).unwrap_err(),
            ShapeError::TooFewVertices(2)
        );
        assert_eq!(
            Polygon::new(&[Vec2::ZERO, Vec2::X, Vec2::new(2.0, 0.0)]).unwrap_err(),
            ShapeError::Degenerate
        );
        assert_eq!(
            Polygon::new(&[Vec2::ZERO, Vec2::X, Vec2::new(f32::NAN, 1.0)]).unwrap_err(),
            ShapeError::NonFinite
        );
        let nine: Vec<Vec2> = (0..9)
            .map(|i| {
                let a = i as f32 / 9.0 * std::f32::consts::TAU;
                Vec2::new(a.cos(), a.sin())
            })
            .collect();
        assert!(matches!(
            Polygon::new(&nine),
            Err(ShapeError::TooManyVertices { count: 9, .. })
        ));
    }

    #[test]
    fn test_circle_and_edge_validation() {
        assert_eq!(Shape::circle(0.0).unwrap_err(), ShapeError::InvalidRadius(0.0));
        assert_eq!(
            Shape::edge(Vec2::ONE, Vec2::ONE).unwrap_err(),
            ShapeError::ZeroLengthEdge
        );
    }

    #[test]
    fn test_box_mass() {
        let shape = Shape::boxed(1.0, 0.5).unwrap();
        let md = shape.compute_mass(2.0);
        // 2 x 1 box at density 2
        assert_abs_diff_eq!(md.mass, 4.0, epsilon = 1e-5);
        assert_abs_diff_eq!(md.center.x, 0.0, epsilon = 1e-5);
        // m * (w² + h²) / 12
        assert_abs_diff_eq!(md.inertia, 4.0 * (4.0 + 1.0) / 12.0, epsilon = 1e-4);
    }

    #[test]
    fn test_offset_circle_mass() {
        let shape = Shape::circle_at(Vec2::new(2.0, 0.0), 1.0).unwrap();
        let md = shape.compute_mass(1.0);
        let pi = std::f32::consts::PI;
        assert_abs_diff_eq!(md.mass, pi, epsilon = 1e-5);
        assert_abs_diff_eq!(md.inertia, pi * (0.5 + 4.0), epsilon = 1e-4);
    }

    #[test]
    fn test_ray_cast_circle() {
        let shape = Shape::circle(1.0).unwrap();
        let xf = Transform2::from_position(Vec2::new(5.0, 0.0));
        let input = RayCastInput::new(Vec2::ZERO, Vec2::new(10.0, 0.0), 1.0);
        let hit = shape.ray_cast(&input, &xf).unwrap();
        assert_abs_diff_eq!(hit.fraction, 0.4, epsilon = 1e-5);
        assert_abs_diff_eq!(hit.normal.x, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_ray_cast_rotated_box() {
        let shape = Shape::boxed(1.0, 1.0).unwrap();
        let xf = Transform2::from_position_angle(Vec2::new(0.0, 5.0), std::f32::consts::FRAC_PI_2);
        let input = RayCastInput::new(Vec2::ZERO, Vec2::new(0.0, 10.0), 1.0);
        let hit = shape.ray_cast(&input, &xf).unwrap();
        assert_abs_diff_eq!(hit.fraction, 0.4, epsilon = 1e-5);
        assert_abs_diff_eq!(hit.normal.y, -1.0, epsilon = 1e-5);

        let miss = RayCastInput::new(Vec2::new(3.0, 0.0), Vec2::new(0.0, 10.0), 1.0);
        assert!(shape.ray_cast(&miss, &xf).is_none());
    }

    #[test]
    fn test_ray_cast_edge_two_sided() {
        let shape = Shape::edge(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)).unwrap();
        let xf = Transform2::IDENTITY;

        let down = RayCastInput::new(Vec2::new(0.0, 2.0), Vec2::new(0.0, -4.0), 1.0);
        let hit = shape.ray_cast(&down, &xf).unwrap();
        assert_abs_diff_eq!(hit.fraction, 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(hit.normal.y, 1.0, epsilon = 1e-5);

        let up = RayCastInput::new(Vec2::new(0.0, -2.0), Vec2::new(0.0, 4.0), 1.0);
        let hit = shape.ray_cast(&up, &xf).unwrap();
        assert_abs_diff_eq!(hit.normal.y, -1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_aabb_and_point() {
        let shape = Shape::boxed(1.0, 2.0).unwrap();
        let xf = Transform2::from_position(Vec2::new(3.0, 0.0));
        let aabb = shape.compute_aabb(&xf);
        assert_abs_diff_eq!(aabb.min.x, 2.0 - POLYGON_RADIUS, epsilon = 1e-5);
        assert_abs_diff_eq!(aabb.max.y, 2.0 + POLYGON_RADIUS, epsilon = 1e-5);

        assert!(shape.test_point(&xf, Vec2::new(3.5, 1.5)));
        assert!(!shape.test_point(&xf, Vec2::new(4.5, 0.0)));
    }
}
