//! Weld joint
//!
//! The point and angular rows are solved one after the other rather than as
//! a coupled 3x3 block. A positive angular stiffness turns the angular row
//! into a spring.

use super::{inverse_or_zero, soft_coefficients, JointAnchors, JointConstraint, JointFrame};
use crate::solver::{SolverBody, StepContext};
use void_math2d::Vec2;

#[derive(Debug, Clone)]
pub struct WeldJoint {
    reference_angle: f32,
    stiffness: f32,
    damping: f32,

    frame: JointFrame,
    angular_mass: f32,
    gamma: f32,
    bias: f32,
    linear_impulse: Vec2,
    angular_impulse: f32,
}

impl WeldJoint {
    pub(crate) fn new(reference_angle: f32, stiffness: f32, damping: f32) -> Self {
        Self {
            reference_angle,
            stiffness: stiffness.max(0.0),
            damping: damping.max(0.0),
            frame: JointFrame::default(),
            angular_mass: 0.0,
            gamma: 0.0,
            bias: 0.0,
            linear_impulse: Vec2::ZERO,
            angular_impulse: 0.0,
        }
    }

    pub fn reference_angle(&self) -> f32 {
        self.reference_angle
    }

    pub fn stiffness(&self) -> f32 {
        self.stiffness
    }

    pub fn damping(&self) -> f32 {
        self.damping
    }
}

impl JointConstraint for WeldJoint {
    fn init_velocity(&mut self, anchors: &JointAnchors, bodies: &mut [SolverBody], ctx: &StepContext) {
        self.frame = JointFrame::new(anchors, bodies);
        let mut inv_i = self.frame.inv_i_a + self.frame.inv_i_b;

        if self.stiffness > 0.0 {
            let c = self.frame.relative_angle(bodies) - self.reference_angle;
            let (gamma, bias) = soft_coefficients(self.stiffness, self.damping, c, ctx.dt);
            self.gamma = gamma;
            self.bias = bias;
            inv_i += gamma;
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
        }
        self.angular_mass = if inv_i != 0.0 { 1.0 / inv_i } else { 0.0 };

        if ctx.warm_starting {
            self.linear_impulse *= ctx.dt_ratio;
            self.angular_impulse *= ctx.dt_ratio;
            self.frame.apply_impulse(bodies, self.linear_impulse, self.angular_impulse);
        } else {
            self.linear_impulse = Vec2::ZERO;
            self.angular_impulse = 0.0;
        }
    }

    fn solve_velocity(&mut self, bodies: &mut [SolverBody], _ctx: &StepContext) {
        let (ia, ib) = (self.frame.index_a, self.frame.index_b);

        let cdot = bodies[ib].w - bodies[ia].w;
        let impulse = -self.angular_mass * (cdot + self.bias + self.gamma * self.angular_impulse);
        self.angular_impulse += impulse;
        bodies[ia].w -= self.frame.inv_i_a * impulse;
        bodies[ib].w += self.frame.inv_i_b * impulse;

        let cdot = self.frame.relative_velocity(bodies);
        let impulse = self.frame.point_mass(self.frame.r_a, self.frame.r_b).solve(-cdot);
        self.linear_impulse += impulse;
        self.frame.apply_impulse(bodies, impulse, 0.0);
    }

    fn solve_position(&mut self, bodies: &mut [SolverBody], ctx: &StepContext) -> bool {
        let f = self.frame;
        let mut angular_error = 0.0;

        if self.stiffness == 0.0 {
            let c = f.relative_angle(bodies) - self.reference_angle;
            angular_error = c.abs();
            let c = c.clamp(-ctx.max_angular_correction, ctx.max_angular_correction);
            let impulse = -inverse_or_zero(f.inv_i_a + f.inv_i_b) * c;
            bodies[f.index_a].a -= f.inv_i_a * impulse;
            bodies[f.index_b].a += f.inv_i_b * impulse;
        }

        let (r_a, r_b) = f.arms(bodies);
        let c = f.separation(bodies, r_a, r_b);
        let position_error = c.length();
        let impulse = -f.point_mass(r_a, r_b).solve(c);
        f.apply_position_impulse(bodies, r_a, r_b, impulse, 0.0);

        position_error <= ctx.linear_slop && angular_error <= ctx.angular_slop
    }

    fn reaction_impulse(&self) -> f32 {
        self.linear_impulse.length().max(self.angular_impulse.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhysicsConfig;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_welded_bodies_share_angular_velocity() {
        let ctx = StepContext::new(&PhysicsConfig::default(), 1.0 / 60.0, 1.0);
        let mut bodies = vec![
            SolverBody {
                inv_mass: 1.0,
                inv_inertia: 1.0,
                w: 2.0,
                ..Default::default()
            },
            SolverBody {
                c: Vec2::new(1.0, 0.0),
                inv_mass: 1.0,
                inv_inertia: 1.0,
                ..Default::default()
            },
        ];
        let anchors = JointAnchors {
            index_a: 0,
            index_b: 1,
            local_anchor_a: Vec2::new(0.5, 0.0),
            local_anchor_b: Vec2::new(-0.5, 0.0),
        };

        let mut joint = WeldJoint::new(0.0, 0.0, 0.0);
        joint.init_velocity(&anchors, &mut bodies, &ctx);
        for _ in 0..30 {
            joint.solve_velocity(&mut bodies, &ctx);
        }

        assert_abs_diff_eq!(bodies[0].w, bodies[1].w, epsilon = 1e-3);
        assert!(joint.reaction_impulse() > 0.0);
    }
}
