//! Sequential-impulse contact constraints

use super::{SolverBody, StepContext};
use crate::narrowphase::{Manifold, ManifoldType, WorldManifold, MAX_MANIFOLD_POINTS};
use void_math2d::{cross_sv, Mat22, Transform2, Vec2};

/// Two-point manifolds whose normal mass matrix is worse conditioned than this
/// are solved one point at a time
const MAX_CONDITION_NUMBER: f32 = 1000.0;

#[derive(Debug, Clone, Copy, Default)]
struct ConstraintPoint {
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f32,
    tangent_impulse: f32,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
}

/// Solver copy of one touching contact
#[derive(Debug, Clone)]
pub(crate) struct ContactConstraint {
    /// Position of the contact in the island's contact list
    pub contact_index: usize,
    pub index_a: usize,
    pub index_b: usize,
    pub manifold: Manifold,
    pub radius_a: f32,
    pub radius_b: f32,
    pub friction: f32,
    pub restitution: f32,

    points: [ConstraintPoint; MAX_MANIFOLD_POINTS],
    /// Points taking part in the velocity solve
    velocity_count: usize,
    normal: Vec2,
    /// Block normal mass of a two-point manifold and its inverse
    k: Mat22,
    normal_mass: Mat22,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_i_a: f32,
    inv_i_b: f32,
    local_center_a: Vec2,
    local_center_b: Vec2,
}

impl ContactConstraint {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        contact_index: usize,
        index_a: usize,
        index_b: usize,
        manifold: Manifold,
        radius_a: f32,
        radius_b: f32,
        friction: f32,
        restitution: f32,
    ) -> Self {
        Self {
            contact_index,
            index_a,
            index_b,
            manifold,
            radius_a,
            radius_b,
            friction,
            restitution,
            points: [ConstraintPoint::default(); MAX_MANIFOLD_POINTS],
            velocity_count: manifold.point_count,
            normal: Vec2::ZERO,
            k: Mat22::ZERO,
            normal_mass: Mat22::ZERO,
            inv_mass_a: 0.0,
            inv_mass_b: 0.0,
            inv_i_a: 0.0,
            inv_i_b: 0.0,
            local_center_a: Vec2::ZERO,
            local_center_b: Vec2::ZERO,
        }
    }

    #[inline]
    fn point_count(&self) -> usize {
        self.manifold.point_count
    }

    /// Solve both normal impulses of a two-point manifold together as a
    /// linear complementarity problem, trying each active set in turn
    fn solve_normal_block(&mut self, a: &mut SolverBody, b: &mut SolverBody) {
        let normal = self.normal;
        let [cp1, cp2] = &mut self.points;

        let accumulated = Vec2::new(cp1.normal_impulse, cp2.normal_impulse);
        let dv1 = b.v + cross_sv(b.w, cp1.r_b) - a.v - cross_sv(a.w, cp1.r_a);
        let dv2 = b.v + cross_sv(b.w, cp2.r_b) - a.v - cross_sv(a.w, cp2.r_a);
        let vn = Vec2::new(dv1.dot(normal), dv2.dot(normal));
        let rhs = vn - Vec2::new(cp1.velocity_bias, cp2.velocity_bias) - self.k * accumulated;

        let k = self.k;
        let solution = [
            // Both points active
            -(self.normal_mass * rhs),
            // Only the first point active
            Vec2::new(-cp1.normal_mass * rhs.x, 0.0),
            // Only the second point active
            Vec2::new(0.0, -cp2.normal_mass * rhs.y),
            // Neither active
            Vec2::ZERO,
        ]
        .into_iter()
        .enumerate()
        .find(|(case, x)| {
            let vn = k * *x + rhs;
            match case {
                0 => x.x >= 0.0 && x.y >= 0.0,
                1 => x.x >= 0.0 && vn.y >= 0.0,
                2 => x.y >= 0.0 && vn.x >= 0.0,
                _ => vn.x >= 0.0 && vn.y >= 0.0,
            }
        });
        let Some((_, x)) = solution else {
            return;
        };

        let d = x - accumulated;
        let p1 = normal * d.x;
        let p2 = normal * d.y;
        a.v -= (p1 + p2) * self.inv_mass_a;
        a.w -= self.inv_i_a * (cp1.r_a.cross(p1) + cp2.r_a.cross(p2));
        b.v += (p1 + p2) * self.inv_mass_b;
        b.w += self.inv_i_b * (cp1.r_b.cross(p1) + cp2.r_b.cross(p2));

        cp1.normal_impulse = x.x;
        cp2.normal_impulse = x.y;
    }
}

/// Separation data for one manifold point at the current positions
struct PositionManifold {
    normal: Vec2,
    point: Vec2,
    separation: f32,
}

impl PositionManifold {
    fn new(c: &ContactConstraint, xf_a: &Transform2, xf_b: &Transform2, index: usize) -> Self {
        let m = &c.manifold;
        match m.kind {
            ManifoldType::Circles => {
                let point_a = xf_a.transform_point(m.local_point);
                let point_b = xf_b.transform_point(m.points[0].local_point);
                let d = point_b - point_a;
                let normal = if d.length_squared() > f32::EPSILON * f32::EPSILON {
                    d.normalize()
                } else {
                    Vec2::X
                };
                Self {
                    normal,
                    point: (point_a + point_b) * 0.5,
                    separation: (point_b - point_a).dot(normal) - c.radius_a - c.radius_b,
                }
            }
            ManifoldType::FaceA => {
                let normal = xf_a.transform_direction(m.local_normal);
                let plane_point = xf_a.transform_point(m.local_point);
                let clip_point = xf_b.transform_point(m.points[index].local_point);
                Self {
                    normal,
                    point: clip_point,
                    separation: (clip_point - plane_point).dot(normal) - c.radius_a - c.radius_b,
                }
            }
            ManifoldType::FaceB => {
                let normal = xf_b.transform_direction(m.local_normal);
                let plane_point = xf_b.transform_point(m.local_point);
                let clip_point = xf_a.transform_point(m.points[index].local_point);
                Self {
                    // Keep the normal pointing from A to B
                    normal: -normal,
                    point: clip_point,
                    separation: (clip_point - plane_point).dot(normal) - c.radius_a - c.radius_b,
                }
            }
        }
    }
}

/// Contact constraints of one island
#[derive(Debug, Default)]
pub(crate) struct ContactSolver {
    pub constraints: Vec<ContactConstraint>,
}

impl ContactSolver {
    pub fn clear(&mut self) {
        self.constraints.clear();
    }

    /// Compute arms, effective masses and restitution bias, then warm start
    pub fn init_velocity(&mut self, bodies: &mut [SolverBody], ctx: &StepContext) {
        for c in self.constraints.iter_mut() {
            let a = bodies[c.index_a];
            let b = bodies[c.index_b];
            c.inv_mass_a = a.inv_mass;
            c.inv_mass_b = b.inv_mass;
            c.inv_i_a = a.inv_inertia;
            c.inv_i_b = b.inv_inertia;
            c.local_center_a = a.local_center;
            c.local_center_b = b.local_center;

            let world = WorldManifold::new(
                &c.manifold,
                &a.transform(),
                c.radius_a,
                &b.transform(),
                c.radius_b,
            );
            c.normal = world.normal;
            c.velocity_count = c.point_count();
            let tangent = c.normal.right_perpendicular();

            for j in 0..c.velocity_count {
                let mp = &c.manifold.points[j];
                let cp = &mut c.points[j];

                cp.normal_impulse = if ctx.warm_starting {
                    ctx.dt_ratio * mp.normal_impulse
                } else {
                    0.0
                };
                cp.tangent_impulse = if ctx.warm_starting {
                    ctx.dt_ratio * mp.tangent_impulse
                } else {
                    0.0
                };

                cp.r_a = world.points[j] - a.c;
                cp.r_b = world.points[j] - b.c;

                let rn_a = cp.r_a.cross(c.normal);
                let rn_b = cp.r_b.cross(c.normal);
                let k_normal =
                    c.inv_mass_a + c.inv_mass_b + c.inv_i_a * rn_a * rn_a + c.inv_i_b * rn_b * rn_b;
                cp.normal_mass = if k_normal > 0.0 { 1.0 / k_normal } else { 0.0 };

                let rt_a = cp.r_a.cross(tangent);
                let rt_b = cp.r_b.cross(tangent);
                let k_tangent =
                    c.inv_mass_a + c.inv_mass_b + c.inv_i_a * rt_a * rt_a + c.inv_i_b * rt_b * rt_b;
                cp.tangent_mass = if k_tangent > 0.0 { 1.0 / k_tangent } else { 0.0 };

                cp.velocity_bias = 0.0;
                let dv = b.v + cross_sv(b.w, cp.r_b) - a.v - cross_sv(a.w, cp.r_a);
                let v_rel = c.normal.dot(dv);
                if v_rel < -ctx.restitution_threshold {
                    cp.velocity_bias = -c.restitution * v_rel;
                }
            }

            if c.velocity_count == 2 {
                let [cp1, cp2] = &c.points;
                let rn1_a = cp1.r_a.cross(c.normal);
                let rn1_b = cp1.r_b.cross(c.normal);
                let rn2_a = cp2.r_a.cross(c.normal);
                let rn2_b = cp2.r_b.cross(c.normal);
                let m = c.inv_mass_a + c.inv_mass_b;

                let k11 = m + c.inv_i_a * rn1_a * rn1_a + c.inv_i_b * rn1_b * rn1_b;
                let k22 = m + c.inv_i_a * rn2_a * rn2_a + c.inv_i_b * rn2_b * rn2_b;
                let k12 = m + c.inv_i_a * rn1_a * rn2_a + c.inv_i_b * rn1_b * rn2_b;

                if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
                    c.k = Mat22::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));
                    c.normal_mass = c.k.inverse();
                } else {
                    // Nearly parallel points: keep only the first
                    c.velocity_count = 1;
                }
            }
        }

        if ctx.warm_starting {
            self.warm_start(bodies);
        }
    }

    fn warm_start(&self, bodies: &mut [SolverBody]) {
        for c in &self.constraints {
            let tangent = c.normal.right_perpendicular();
            for cp in &c.points[..c.velocity_count] {
                let p = c.normal * cp.normal_impulse + tangent * cp.tangent_impulse;
                let a = &mut bodies[c.index_a];
                a.w -= c.inv_i_a * cp.r_a.cross(p);
                a.v -= p * c.inv_mass_a;
                let b = &mut bodies[c.index_b];
                b.w += c.inv_i_b * cp.r_b.cross(p);
                b.v += p * c.inv_mass_b;
            }
        }
    }

    /// One velocity iteration: friction first, then non-penetration
    pub fn solve_velocity(&mut self, bodies: &mut [SolverBody]) {
        for c in self.constraints.iter_mut() {
            let mut a = bodies[c.index_a];
            let mut b = bodies[c.index_b];
            let normal = c.normal;
            let tangent = normal.right_perpendicular();
            let count = c.velocity_count;

            for cp in c.points[..count].iter_mut() {
                let dv = b.v + cross_sv(b.w, cp.r_b) - a.v - cross_sv(a.w, cp.r_a);
                let vt = dv.dot(tangent);
                let lambda = cp.tangent_mass * -vt;

                let max_friction = c.friction * cp.normal_impulse;
                let new_impulse = (cp.tangent_impulse + lambda).clamp(-max_friction, max_friction);
                let lambda = new_impulse - cp.tangent_impulse;
                cp.tangent_impulse = new_impulse;

                let p = tangent * lambda;
                a.v -= p * c.inv_mass_a;
                a.w -= c.inv_i_a * cp.r_a.cross(p);
                b.v += p * c.inv_mass_b;
                b.w += c.inv_i_b * cp.r_b.cross(p);
            }

            if count == 2 {
                c.solve_normal_block(&mut a, &mut b);
            } else {
                for cp in c.points[..count].iter_mut() {
                    let dv = b.v + cross_sv(b.w, cp.r_b) - a.v - cross_sv(a.w, cp.r_a);
                    let vn = dv.dot(normal);
                    let lambda = -cp.normal_mass * (vn - cp.velocity_bias);

                    let new_impulse = (cp.normal_impulse + lambda).max(0.0);
                    let lambda = new_impulse - cp.normal_impulse;
                    cp.normal_impulse = new_impulse;

                    let p = normal * lambda;
                    a.v -= p * c.inv_mass_a;
                    a.w -= c.inv_i_a * cp.r_a.cross(p);
                    b.v += p * c.inv_mass_b;
                    b.w += c.inv_i_b * cp.r_b.cross(p);
                }
            }

            bodies[c.index_a].v = a.v;
            bodies[c.index_a].w = a.w;
            bodies[c.index_b].v = b.v;
            bodies[c.index_b].w = b.w;
        }
    }

    /// Copy accumulated impulses back into the manifolds
    pub fn store_impulses(&mut self) {
        for c in self.constraints.iter_mut() {
            for j in 0..c.velocity_count {
                c.manifold.points[j].normal_impulse = c.points[j].normal_impulse;
                c.manifold.points[j].tangent_impulse = c.points[j].tangent_impulse;
            }
        }
    }

    /// One nonlinear position iteration; true when no point penetrates past
    /// three times the linear slop
    pub fn solve_position(&self, bodies: &mut [SolverBody], ctx: &StepContext) -> bool {
        let mut min_separation = 0.0f32;

        for c in &self.constraints {
            for j in 0..c.point_count() {
                let a = bodies[c.index_a];
                let b = bodies[c.index_b];
                let pm = PositionManifold::new(c, &a.transform(), &b.transform(), j);

                let r_a = pm.point - a.c;
                let r_b = pm.point - b.c;
                min_separation = min_separation.min(pm.separation);

                let correction = (ctx.baumgarte * (pm.separation + ctx.linear_slop))
                    .clamp(-ctx.max_linear_correction, 0.0);

                let rn_a = r_a.cross(pm.normal);
                let rn_b = r_b.cross(pm.normal);
                let k = c.inv_mass_a + c.inv_mass_b + c.inv_i_a * rn_a * rn_a + c.inv_i_b * rn_b * rn_b;
                let impulse = if k > 0.0 { -correction / k } else { 0.0 };
                let p = pm.normal * impulse;

                let a = &mut bodies[c.index_a];
                a.c -= p * c.inv_mass_a;
                a.a -= c.inv_i_a * r_a.cross(p);
                let b = &mut bodies[c.index_b];
                b.c += p * c.inv_mass_b;
                b.a += c.inv_i_b * r_b.cross(p);
            }
        }

        min_separation >= -3.0 * ctx.linear_slop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhysicsConfig;
    use crate::narrowphase::{collide_circles, collide_polygons};
    use crate::shape::Polygon;
    use approx::assert_abs_diff_eq;

    fn circle_pair(gap: f32, va: Vec2) -> (Vec<SolverBody>, ContactSolver) {
        let bodies = vec![
            SolverBody {
                c: Vec2::ZERO,
                v: va,
                inv_mass: 1.0,
                inv_inertia: 2.0,
                ..Default::default()
            },
            SolverBody {
                c: Vec2::new(1.0 + gap, 0.0),
                inv_mass: 1.0,
                inv_inertia: 2.0,
                ..Default::default()
            },
        ];
        let manifold = collide_circles(
            Vec2::ZERO,
            0.5,
            &bodies[0].transform(),
            Vec2::ZERO,
            0.5,
            &bodies[1].transform(),
        );
        assert_eq!(manifold.point_count, 1);
        let mut solver = ContactSolver::default();
        solver
            .constraints
            .push(ContactConstraint::new(0, 0, 1, manifold, 0.5, 0.5, 0.0, 1.0));
        (bodies, solver)
    }

    #[test]
    fn test_elastic_head_on_swaps_velocities() {
        let ctx = StepContext::new(&PhysicsConfig::default(), 1.0 / 60.0, 1.0);
        let (mut bodies, mut solver) = circle_pair(0.0, Vec2::new(5.0, 0.0));

        solver.init_velocity(&mut bodies, &ctx);
        solver.solve_velocity(&mut bodies);

        assert_abs_diff_eq!(bodies[0].v.x, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(bodies[1].v.x, 5.0, epsilon = 1e-4);
    }

    #[test]
    fn test_separating_bodies_get_no_impulse() {
        let ctx = StepContext::new(&PhysicsConfig::default(), 1.0 / 60.0, 1.0);
        let (mut bodies, mut solver) = circle_pair(0.0, Vec2::new(-1.0, 0.0));

        solver.init_velocity(&mut bodies, &ctx);
        solver.solve_velocity(&mut bodies);
        solver.store_impulses();

        assert_eq!(solver.constraints[0].manifold.points[0].normal_impulse, 0.0);
        assert_abs_diff_eq!(bodies[0].v.x, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_position_solve_pushes_apart() {
        let ctx = StepContext::new(&PhysicsConfig::default(), 1.0 / 60.0, 1.0);
        let (mut bodies, mut solver) = circle_pair(-0.1, Vec2::ZERO);
        solver.init_velocity(&mut bodies, &ctx);

        let before = bodies[1].c.x - bodies[0].c.x;
        let done = solver.solve_position(&mut bodies, &ctx);
        let after = bodies[1].c.x - bodies[0].c.x;

        assert!(!done);
        assert!(after > before);
    }

    #[test]
    fn test_coincident_circles_get_a_unit_normal() {
        let ctx = StepContext::new(&PhysicsConfig::default(), 1.0 / 60.0, 1.0);
        let (mut bodies, mut solver) = circle_pair(-1.0, Vec2::ZERO);
        assert_eq!(bodies[0].c, bodies[1].c);

        let c = &solver.constraints[0];
        let pm = PositionManifold::new(c, &bodies[0].transform(), &bodies[1].transform(), 0);
        assert_eq!(pm.normal, Vec2::X);
        assert_abs_diff_eq!(pm.separation, -1.0, epsilon = 1e-6);

        solver.init_velocity(&mut bodies, &ctx);
        solver.solve_position(&mut bodies, &ctx);
        assert!(bodies[0].c.is_finite() && bodies[1].c.is_finite());
        assert!(bodies[1].c.x > bodies[0].c.x);
    }

    #[test]
    fn test_resting_box_gets_even_block_impulses() {
        let ctx = StepContext::new(&PhysicsConfig::default(), 1.0 / 60.0, 1.0);
        let ground = Polygon::boxed(5.0, 0.5).unwrap();
        let block = Polygon::boxed(0.5, 0.5).unwrap();
        let mut bodies = vec![
            SolverBody::default(),
            SolverBody {
                c: Vec2::new(0.0, 1.0),
                v: Vec2::new(0.0, -0.5),
                inv_mass: 1.0,
                inv_inertia: 6.0,
                ..Default::default()
            },
        ];
        let manifold = collide_polygons(&ground, &bodies[0].transform(), &block, &bodies[1].transform());
        assert_eq!(manifold.point_count, 2);

        let mut solver = ContactSolver::default();
        solver.constraints.push(ContactConstraint::new(
            0,
            0,
            1,
            manifold,
            ground.radius(),
            block.radius(),
            0.0,
            0.0,
        ));
        solver.init_velocity(&mut bodies, &ctx);
        solver.solve_velocity(&mut bodies);
        solver.store_impulses();

        let points = solver.constraints[0].manifold.points();
        assert_abs_diff_eq!(points[0].normal_impulse, points[1].normal_impulse, epsilon = 1e-5);
        assert_abs_diff_eq!(points[0].normal_impulse + points[1].normal_impulse, 0.5, epsilon = 1e-4);
        assert_abs_diff_eq!(bodies[1].v.y, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(bodies[1].w, 0.0, epsilon = 1e-5);
    }
}
