//! Friction joint: top-down drag towards zero relative motion

use super::{inverse_or_zero, JointAnchors, JointConstraint, JointFrame};
use crate::solver::{SolverBody, StepContext};
use void_math2d::{Mat22, Vec2};

#[derive(Debug, Clone)]
pub struct FrictionJoint {
    max_force: f32,
    max_torque: f32,

    frame: JointFrame,
    linear_mass: Mat22,
    angular_mass: f32,
    linear_impulse: Vec2,
    angular_impulse: f32,
}

impl FrictionJoint {
    pub(crate) fn new(max_force: f32, max_torque: f32) -> Self {
        Self {
            max_force: max_force.max(0.0),
            max_torque: max_torque.max(0.0),
            frame: JointFrame::default(),
            linear_mass: Mat22::ZERO,
            angular_mass: 0.0,
            linear_impulse: Vec2::ZERO,
            angular_impulse: 0.0,
        }
    }

    pub fn max_force(&self) -> f32 {
        self.max_force
    }

    pub fn max_torque(&self) -> f32 {
        self.max_torque
    }
}

impl JointConstraint for FrictionJoint {
    fn init_velocity(&mut self, anchors: &JointAnchors, bodies: &mut [SolverBody], ctx: &StepContext) {
        self.frame = JointFrame::new(anchors, bodies);
        self.linear_mass = self.frame.point_mass(self.frame.r_a, self.frame.r_b).inverse();
        self.angular_mass = inverse_or_zero(self.frame.inv_i_a + self.frame.inv_i_b);

        if ctx.warm_starting {
            self.linear_impulse *= ctx.dt_ratio;
            self.angular_impulse *= ctx.dt_ratio;
            self.frame.apply_impulse(bodies, self.linear_impulse, self.angular_impulse);
        } else {
            self.linear_impulse = Vec2::ZERO;
            self.angular_impulse = 0.0;
        }
    }

    fn solve_velocity(&mut self, bodies: &mut [SolverBody], ctx: &StepContext) {
        let (ia, ib) = (self.frame.index_a, self.frame.index_b);

        {
            let cdot = bodies[ib].w - bodies[ia].w;
            let impulse = -self.angular_mass * cdot;
            let old = self.angular_impulse;
            let max_impulse = ctx.dt * self.max_torque;
            self.angular_impulse = (old + impulse).clamp(-max_impulse, max_impulse);
            let applied = self.angular_impulse - old;
            bodies[ia].w -= self.frame.inv_i_a * applied;
            bodies[ib].w += self.frame.inv_i_b * applied;
        }

        {
            let cdot = self.frame.relative_velocity(bodies);
            let impulse = -(self.linear_mass * cdot);
            let old = self.linear_impulse;
            self.linear_impulse += impulse;

            let max_impulse = ctx.dt * self.max_force;
            if self.linear_impulse.length_squared() > max_impulse * max_impulse {
                self.linear_impulse = self.linear_impulse.normalize() * max_impulse;
            }
            let applied = self.linear_impulse - old;
            self.frame.apply_impulse(bodies, applied, 0.0);
        }
    }

    fn solve_position(&mut self, _bodies: &mut [SolverBody], _ctx: &StepContext) -> bool {
        true
    }

    fn reaction_impulse(&self) -> f32 {
        self.linear_impulse.length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhysicsConfig;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_friction_is_capped_by_max_force() {
        let ctx = StepContext::new(&PhysicsConfig::default(), 0.5, 1.0);
        let mut bodies = vec![
            SolverBody::default(),
            SolverBody {
                v: Vec2::new(10.0, 0.0),
                inv_mass: 1.0,
                ..Default::default()
            },
        ];
        let anchors = JointAnchors {
            index_a: 0,
            index_b: 1,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
        };

        let mut joint = FrictionJoint::new(2.0, 0.0);
        joint.init_velocity(&anchors, &mut bodies, &ctx);
        joint.solve_velocity(&mut bodies, &ctx);

        // dt * max_force = 1.0 of impulse on a unit mass
        assert_abs_diff_eq!(bodies[1].v.x, 9.0, epsilon = 1e-5);
        assert!(joint.solve_position(&mut bodies, &ctx));
    }
}
