//! Circle-circle and polygon-circle manifolds

use super::manifold::{ContactFeature, Manifold, ManifoldType};
use crate::shape::Polygon;
use void_math2d::{Transform2, Vec2};

/// Circle A against circle B
pub fn collide_circles(
    center_a: Vec2,
    radius_a: f32,
    xf_a: &Transform2,
    center_b: Vec2,
    radius_b: f32,
    xf_b: &Transform2,
) -> Manifold {
    let mut manifold = Manifold::EMPTY;

    let p_a = xf_a.transform_point(center_a);
    let p_b = xf_b.transform_point(center_b);
    let radius = radius_a + radius_b;
    if p_a.distance_squared(p_b) > radius * radius {
        return manifold;
    }

    manifold.kind = ManifoldType::Circles;
    manifold.local_point = center_a;
    manifold.local_normal = Vec2::ZERO;
    manifold.point_count = 1;
    manifold.points[0].local_point = center_b;
    manifold.points[0].id = ContactFeature::default();
    manifold
}

/// Polygon (or two-vertex edge) A against circle B
pub fn collide_polygon_circle(
    poly_a: &Polygon,
    xf_a: &Transform2,
    center_b: Vec2,
    radius_b: f32,
    xf_b: &Transform2,
) -> Manifold {
    let mut manifold = Manifold::EMPTY;

    // Circle center in the polygon's frame
    let c = xf_b.transform_point(center_b);
    let c_local = xf_a.inverse_transform_point(c);

    let radius = poly_a.radius() + radius_b;
    let vertices = poly_a.vertices();
    let normals = poly_a.normals();
    let count = poly_a.count();

    // Face of minimum penetration
    let mut normal_index = 0;
    let mut separation = f32::MIN;
    for i in 0..count {
        let s = normals[i].dot(c_local - vertices[i]);
        if s > radius {
            return manifold;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let v1 = vertices[normal_index];
    let v2 = vertices[(normal_index + 1) % count];

    manifold.kind = ManifoldType::FaceA;
    manifold.point_count = 1;
    manifold.points[0].local_point = center_b;
    manifold.points[0].id = ContactFeature::default();

    // Center inside the polygon
    if separation < f32::EPSILON {
        manifold.local_normal = normals[normal_index];
        manifold.local_point = (v1 + v2) * 0.5;
        return manifold;
    }

    // Voronoi regions of the face
    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);
    if u1 <= 0.0 {
        if c_local.distance_squared(v1) > radius * radius {
            return Manifold::EMPTY;
        }
        manifold.local_normal = (c_local - v1).normalize();
        manifold.local_point = v1;
    } else if u2 <= 0.0 {
        if c_local.distance_squared(v2) > radius * radius {
            return Manifold::EMPTY;
        }
        manifold.local_normal = (c_local - v2).normalize();
        manifold.local_point = v2;
    } else {
        let face_center = (v1 + v2) * 0.5;
        let s = (c_local - face_center).dot(normals[normal_index]);
        if s > radius {
            return Manifold::EMPTY;
        }
        manifold.local_normal = normals[normal_index];
        manifold.local_point = face_center;
    }

    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrowphase::WorldManifold;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_touching_circles_report_contact() {
        let xf_a = Transform2::from_position(Vec2::ZERO);
        let xf_b = Transform2::from_position(Vec2::new(1.0, 0.0));
        let m = collide_circles(Vec2::ZERO, 0.5, &xf_a, Vec2::ZERO, 0.5, &xf_b);
        assert_eq!(m.point_count, 1);

        let wm = WorldManifold::new(&m, &xf_a, 0.5, &xf_b, 0.5);
        assert_abs_diff_eq!(wm.normal.x, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(wm.separations[0], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_separated_circles() {
        let xf_a = Transform2::IDENTITY;
        let xf_b = Transform2::from_position(Vec2::new(1.1, 0.0));
        let m = collide_circles(Vec2::ZERO, 0.5, &xf_a, Vec2::ZERO, 0.5, &xf_b);
        assert!(m.is_empty());
    }

    #[test]
    fn test_circle_on_box_face() {
        let poly = Polygon::boxed(1.0, 1.0).unwrap();
        let xf_a = Transform2::IDENTITY;
        let xf_b = Transform2::from_position(Vec2::new(0.0, 1.4));
        let m = collide_polygon_circle(&poly, &xf_a, Vec2::ZERO, 0.5, &xf_b);
        assert_eq!(m.point_count, 1);
        assert_eq!(m.kind, ManifoldType::FaceA);

        let wm = WorldManifold::new(&m, &xf_a, poly.radius(), &xf_b, 0.5);
        assert_abs_diff_eq!(wm.normal.y, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(wm.separations[0], -0.1 - poly.radius(), epsilon = 1e-5);
    }

    #[test]
    fn test_circle_near_box_corner() {
        let poly = Polygon::boxed(1.0, 1.0).unwrap();
        let xf_b = Transform2::from_position(Vec2::new(1.3, 1.3));
        let m = collide_polygon_circle(&poly, &Transform2::IDENTITY, Vec2::ZERO, 0.5, &xf_b);
        assert_eq!(m.point_count, 1);
        assert_abs_diff_eq!(m.local_point.x, 1.0, epsilon = 1e-6);

        let far = Transform2::from_position(Vec2::new(1.5, 1.5));
        assert!(collide_polygon_circle(&poly, &Transform2::IDENTITY, Vec2::ZERO, 0.5, &far).is_empty());
    }
}
