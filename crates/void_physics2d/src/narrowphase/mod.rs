//! Narrowphase: exact contact manifolds between shape pairs
//!
//! Shape pairs are ordered before dispatch so that polygons and edges are
//! always shape A against a circle. Edges run through the polygon paths as
//! two-vertex polygons; edge against edge never produces contact.

mod circle;
mod manifold;
mod polygon;

pub use circle::{collide_circles, collide_polygon_circle};
pub use manifold::{
    ContactFeature, FeatureType, Manifold, ManifoldPoint, ManifoldType, WorldManifold,
    MAX_MANIFOLD_POINTS,
};
pub use polygon::collide_polygons;

use crate::shape::{Shape, ShapeType};
use void_math2d::Transform2;

/// Whether a pair must be swapped so the dispatcher sees it in canonical order
pub fn should_swap(a: ShapeType, b: ShapeType) -> bool {
    matches!(
        (a, b),
        (ShapeType::Circle, ShapeType::Polygon) | (ShapeType::Circle, ShapeType::Edge)
    )
}

/// Whether two shape types can ever produce a manifold
pub fn shapes_can_touch(a: ShapeType, b: ShapeType) -> bool {
    !(a == ShapeType::Edge && b == ShapeType::Edge)
}

/// Compute the manifold for a canonically ordered shape pair
pub fn collide(shape_a: &Shape, xf_a: &Transform2, shape_b: &Shape, xf_b: &Transform2) -> Manifold {
    debug_assert!(!should_swap(shape_a.shape_type(), shape_b.shape_type()));

    match (shape_a, shape_b) {
        (
            Shape::Circle {
                center: ca,
                radius: ra,
            },
            Shape::Circle {
                center: cb,
                radius: rb,
            },
        ) => collide_circles(*ca, *ra, xf_a, *cb, *rb, xf_b),
        (Shape::Edge { .. }, Shape::Edge { .. }) | (Shape::Circle { .. }, _) => Manifold::EMPTY,
        (_, Shape::Circle { center, radius }) => match shape_a.as_polygon() {
            Some(poly) => collide_polygon_circle(&poly, xf_a, *center, *radius, xf_b),
            None => Manifold::EMPTY,
        },
        _ => match (shape_a.as_polygon(), shape_b.as_polygon()) {
            (Some(poly_a), Some(poly_b)) => collide_polygons(&poly_a, xf_a, &poly_b, xf_b),
            _ => Manifold::EMPTY,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use void_math2d::Vec2;

    #[test]
    fn test_dispatch_order() {
        assert!(should_swap(ShapeType::Circle, ShapeType::Polygon));
        assert!(!should_swap(ShapeType::Polygon, ShapeType::Circle));
        assert!(!shapes_can_touch(ShapeType::Edge, ShapeType::Edge));
    }

    #[test]
    fn test_edge_circle() {
        let edge = Shape::edge(Vec2::new(-2.0, 0.0), Vec2::new(2.0, 0.0)).unwrap();
        let ball = Shape::circle(0.5).unwrap();
        let m = collide(
            &edge,
            &Transform2::IDENTITY,
            &ball,
            &Transform2::from_position(Vec2::new(0.5, 0.45)),
        );
        assert_eq!(m.point_count, 1);

        let wm = WorldManifold::new(
            &m,
            &Transform2::IDENTITY,
            edge.radius(),
            &Transform2::from_position(Vec2::new(0.5, 0.45)),
            0.5,
        );
        assert!(wm.normal.y > 0.99);
    }

    #[test]
    fn test_edges_never_touch() {
        let a = Shape::edge(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0)).unwrap();
        let b = Shape::edge(Vec2::new(0.0, -1.0), Vec2::new(0.0, 1.0)).unwrap();
        assert!(collide(&a, &Transform2::IDENTITY, &b, &Transform2::IDENTITY).is_empty());
    }
}
