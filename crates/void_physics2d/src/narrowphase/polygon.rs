//! Polygon-polygon manifolds by separating axes and incident face clipping
//!
//! Two-vertex polygons stand in for edges, so this also covers edge-polygon.

use super::manifold::{ContactFeature, FeatureType, Manifold, ManifoldType};
use crate::shape::{Polygon, LINEAR_SLOP};
use void_math2d::{Transform2, Vec2};

#[derive(Debug, Clone, Copy, Default)]
struct ClipVertex {
    v: Vec2,
    id: ContactFeature,
}

/// Largest separation of `poly2` along the face normals of `poly1`
fn find_max_separation(
    poly1: &Polygon,
    xf1: &Transform2,
    poly2: &Polygon,
    xf2: &Transform2,
) -> (usize, f32) {
    // poly1 expressed in poly2's frame
    let xf = xf2.inv_mul_transform(xf1);

    let mut best_index = 0;
    let mut max_separation = f32::MIN;
    for (i, (&n1, &v1)) in poly1.normals().iter().zip(poly1.vertices()).enumerate() {
        let n = xf.transform_direction(n1);
        let v1 = xf.transform_point(v1);

        let si = poly2
            .vertices()
            .iter()
            .map(|&v2| n.dot(v2 - v1))
            .fold(f32::MAX, f32::min);

        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }

    (best_index, max_separation)
}

/// Face on `poly2` most anti-parallel to reference face `edge1`, in world space
fn find_incident_edge(
    poly1: &Polygon,
    xf1: &Transform2,
    edge1: usize,
    poly2: &Polygon,
    xf2: &Transform2,
) -> [ClipVertex; 2] {
    let normal1 = xf2.inverse_transform_direction(xf1.transform_direction(poly1.normals()[edge1]));

    let normals2 = poly2.normals();
    let mut index = 0;
    let mut min_dot = f32::MAX;
    for (i, n) in normals2.iter().enumerate() {
        let dot = normal1.dot(*n);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let i1 = index;
    let i2 = (i1 + 1) % poly2.count();
    let feature = |i: usize| ContactFeature {
        index_a: edge1 as u8,
        index_b: i as u8,
        type_a: FeatureType::Face,
        type_b: FeatureType::Vertex,
    };

    [
        ClipVertex {
            v: xf2.transform_point(poly2.vertices()[i1]),
            id: feature(i1),
        },
        ClipVertex {
            v: xf2.transform_point(poly2.vertices()[i2]),
            id: feature(i2),
        },
    ]
}

/// Sutherland-Hodgman clipping of a segment against a half plane
fn clip_segment_to_line(
    v_in: &[ClipVertex; 2],
    normal: Vec2,
    offset: f32,
    vertex_index_a: usize,
) -> ([ClipVertex; 2], usize) {
    let mut v_out = [ClipVertex::default(); 2];
    let mut count = 0;

    let distance0 = normal.dot(v_in[0].v) - offset;
    let distance1 = normal.dot(v_in[1].v) - offset;

    if distance0 <= 0.0 {
        v_out[count] = v_in[0];
        count += 1;
    }
    if distance1 <= 0.0 {
        v_out[count] = v_in[1];
        count += 1;
    }

    // Points on opposite sides: add the intersection
    if distance0 * distance1 < 0.0 && count < 2 {
        let interp = distance0 / (distance0 - distance1);
        v_out[count] = ClipVertex {
            v: v_in[0].v + (v_in[1].v - v_in[0].v) * interp,
            id: ContactFeature {
                index_a: vertex_index_a as u8,
                index_b: v_in[0].id.index_b,
                type_a: FeatureType::Vertex,
                type_b: FeatureType::Face,
            },
        };
        count += 1;
    }

    (v_out, count)
}

/// Polygon A against polygon B
pub fn collide_polygons(
    poly_a: &Polygon,
    xf_a: &Transform2,
    poly_b: &Polygon,
    xf_b: &Transform2,
) -> Manifold {
    let mut manifold = Manifold::EMPTY;
    let total_radius = poly_a.radius() + poly_b.radius();

    let (edge_a, separation_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return manifold;
    }

    let (edge_b, separation_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return manifold;
    }

    // Prefer A as the reference unless B is clearly better
    let tolerance = 0.1 * LINEAR_SLOP;
    let (poly1, xf1, poly2, xf2, edge1, flip) = if separation_b > separation_a + tolerance {
        manifold.kind = ManifoldType::FaceB;
        (poly_b, xf_b, poly_a, xf_a, edge_b, true)
    } else {
        manifold.kind = ManifoldType::FaceA;
        (poly_a, xf_a, poly_b, xf_b, edge_a, false)
    };

    let incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let vertices1 = poly1.vertices();
    let iv1 = edge1;
    let iv2 = (edge1 + 1) % poly1.count();

    let local_tangent = (vertices1[iv2] - vertices1[iv1]).normalize();
    let local_normal = local_tangent.right_perpendicular();
    let plane_point = (vertices1[iv1] + vertices1[iv2]) * 0.5;

    let tangent = xf1.transform_direction(local_tangent);
    let normal = tangent.right_perpendicular();

    let v11 = xf1.transform_point(vertices1[iv1]);
    let v12 = xf1.transform_point(vertices1[iv2]);

    // Face offset and side planes
    let front_offset = normal.dot(v11);
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    let (clip1, count1) = clip_segment_to_line(&incident_edge, -tangent, side_offset1, iv1);
    if count1 < 2 {
        return Manifold::EMPTY;
    }
    let (clip2, count2) = clip_segment_to_line(&clip1, tangent, side_offset2, iv2);
    if count2 < 2 {
        return Manifold::EMPTY;
    }

    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    let mut point_count = 0;
    for cv in clip2.iter() {
        let separation = normal.dot(cv.v) - front_offset;
        if separation <= total_radius {
            let point = &mut manifold.points[point_count];
            point.local_point = xf2.inverse_transform_point(cv.v);
            point.id = if flip { cv.id.swapped() } else { cv.id };
            point_count += 1;
        }
    }
    manifold.point_count = point_count;

    manifold
}
