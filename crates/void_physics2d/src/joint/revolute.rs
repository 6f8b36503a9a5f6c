//! Revolute joint: shared pivot with optional limits and motor

use super::{inverse_or_zero, JointAnchors, JointConstraint, JointFrame};
use crate::solver::{SolverBody, StepContext};
use void_math2d::Vec2;

#[derive(Debug, Clone)]
pub struct RevoluteJoint {
    reference_angle: f32,
    enable_limit: bool,
    lower_angle: f32,
    upper_angle: f32,
    enable_motor: bool,
    motor_speed: f32,
    max_motor_torque: f32,

    frame: JointFrame,
    angle: f32,
    axial_mass: f32,
    impulse: Vec2,
    motor_impulse: f32,
    lower_impulse: f32,
    upper_impulse: f32,
}

impl RevoluteJoint {
    pub(crate) fn new(reference_angle: f32) -> Self {
        Self {
            reference_angle,
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
            frame: JointFrame::default(),
            angle: 0.0,
            axial_mass: 0.0,
            impulse: Vec2::ZERO,
            motor_impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
        }
    }

    pub(crate) fn with_limit(mut self, enable: bool, lower: f32, upper: f32) -> Self {
        self.enable_limit = enable;
        self.lower_angle = lower.min(upper);
        self.upper_angle = upper.max(lower);
        self
    }

    pub(crate) fn with_motor(mut self, enable: bool, speed: f32, max_torque: f32) -> Self {
        self.enable_motor = enable;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque.max(0.0);
        self
    }

    pub fn reference_angle(&self) -> f32 {
        self.reference_angle
    }

    /// Relative angle at the start of the last solve
    pub fn joint_angle(&self) -> f32 {
        self.angle
    }

    pub fn limits(&self) -> Option<(f32, f32)> {
        self.enable_limit.then_some((self.lower_angle, self.upper_angle))
    }

    pub fn motor_speed(&self) -> f32 {
        self.motor_speed
    }

    pub fn is_motor_enabled(&self) -> bool {
        self.enable_motor
    }

    pub fn set_motor_speed(&mut self, speed: f32) {
        self.motor_speed = speed;
    }

    /// Torque impulse applied by the motor over the last step
    pub fn motor_impulse(&self) -> f32 {
        self.motor_impulse
    }

    fn fixed_rotation(&self) -> bool {
        self.frame.inv_i_a + self.frame.inv_i_b == 0.0
    }

    fn apply_angular(&self, bodies: &mut [SolverBody], impulse: f32) {
        bodies[self.frame.index_a].w -= self.frame.inv_i_a * impulse;
        bodies[self.frame.index_b].w += self.frame.inv_i_b * impulse;
    }
}

impl JointConstraint for RevoluteJoint {
    fn init_velocity(&mut self, anchors: &JointAnchors, bodies: &mut [SolverBody], ctx: &StepContext) {
        self.frame = JointFrame::new(anchors, bodies);
        self.axial_mass = inverse_or_zero(self.frame.inv_i_a + self.frame.inv_i_b);
        self.angle = self.frame.relative_angle(bodies) - self.reference_angle;

        let fixed = self.fixed_rotation();
        if !self.enable_motor || fixed {
            self.motor_impulse = 0.0;
        }
        if !self.enable_limit || fixed {
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }

        if ctx.warm_starting {
            self.impulse *= ctx.dt_ratio;
            self.motor_impulse *= ctx.dt_ratio;
            self.lower_impulse *= ctx.dt_ratio;
            self.upper_impulse *= ctx.dt_ratio;
            let axial = self.motor_impulse + self.lower_impulse - self.upper_impulse;
            self.frame.apply_impulse(bodies, self.impulse, axial);
        } else {
            self.impulse = Vec2::ZERO;
            self.motor_impulse = 0.0;
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }
    }

    fn solve_velocity(&mut self, bodies: &mut [SolverBody], ctx: &StepContext) {
        let fixed = self.fixed_rotation();
        let (ia, ib) = (self.frame.index_a, self.frame.index_b);

        if self.enable_motor && !fixed {
            let cdot = bodies[ib].w - bodies[ia].w - self.motor_speed;
            let impulse = -self.axial_mass * cdot;
            let old = self.motor_impulse;
            let max_impulse = ctx.dt * self.max_motor_torque;
            self.motor_impulse = (old + impulse).clamp(-max_impulse, max_impulse);
            self.apply_angular(bodies, self.motor_impulse - old);
        }

        if self.enable_limit && !fixed {
            // Lower limit
            {
                let c = self.angle - self.lower_angle;
                let bias = c.max(0.0) * ctx.inv_dt;
                let cdot = bodies[ib].w - bodies[ia].w;
                let impulse = -self.axial_mass * (cdot + bias);
                let new_impulse = (self.lower_impulse + impulse).max(0.0);
                let applied = new_impulse - self.lower_impulse;
                self.lower_impulse = new_impulse;
                self.apply_angular(bodies, applied);
            }
            // Upper limit
            {
                let c = self.upper_angle - self.angle;
                let bias = c.max(0.0) * ctx.inv_dt;
                let cdot = bodies[ia].w - bodies[ib].w;
                let impulse = -self.axial_mass * (cdot + bias);
                let new_impulse = (self.upper_impulse + impulse).max(0.0);
                let applied = new_impulse - self.upper_impulse;
                self.upper_impulse = new_impulse;
                self.apply_angular(bodies, -applied);
            }
        }

        let cdot = self.frame.relative_velocity(bodies);
        let k = self.frame.point_mass(self.frame.r_a, self.frame.r_b);
        let impulse = k.solve(-cdot);
        self.impulse += impulse;
        self.frame.apply_impulse(bodies, impulse, 0.0);
    }

    fn solve_position(&mut self, bodies: &mut [SolverBody], ctx: &StepContext) -> bool {
        let f = self.frame;
        let mut angular_error = 0.0;

        if self.enable_limit && !self.fixed_rotation() {
            let angle = f.relative_angle(bodies) - self.reference_angle;
            let mut c = 0.0;
            if (self.upper_angle - self.lower_angle).abs() < 2.0 * ctx.angular_slop {
                c = (angle - self.lower_angle)
                    .clamp(-ctx.max_angular_correction, ctx.max_angular_correction);
            } else if angle <= self.lower_angle {
                c = (angle - self.lower_angle + ctx.angular_slop).clamp(-ctx.max_angular_correction, 0.0);
            } else if angle >= self.upper_angle {
                c = (angle - self.upper_angle - ctx.angular_slop).clamp(0.0, ctx.max_angular_correction);
            }
            let limit_impulse = -self.axial_mass * c;
            bodies[f.index_a].a -= f.inv_i_a * limit_impulse;
            bodies[f.index_b].a += f.inv_i_b * limit_impulse;
            angular_error = c.abs();
        }

        let (r_a, r_b) = f.arms(bodies);
        let c = f.separation(bodies, r_a, r_b);
        let position_error = c.length();
        let impulse = -f.point_mass(r_a, r_b).solve(c);
        f.apply_position_impulse(bodies, r_a, r_b, impulse, 0.0);

        position_error <= ctx.linear_slop && angular_error <= ctx.angular_slop
    }

    fn reaction_impulse(&self) -> f32 {
        self.impulse.length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhysicsConfig;
    use approx::assert_abs_diff_eq;
    use void_math2d::cross_sv;

    fn pendulum() -> (Vec<SolverBody>, JointAnchors) {
        let bodies = vec![
            // Fixed pivot body
            SolverBody::default(),
            SolverBody {
                c: Vec2::new(1.0, 0.0),
                inv_mass: 1.0,
                inv_inertia: 2.0,
                ..Default::default()
            },
        ];
        let anchors = JointAnchors {
            index_a: 0,
            index_b: 1,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::new(-1.0, 0.0),
        };
        (bodies, anchors)
    }

    #[test]
    fn test_pivot_velocity_is_constrained() {
        let ctx = StepContext::new(&PhysicsConfig::default(), 1.0 / 60.0, 1.0);
        let (mut bodies, anchors) = pendulum();
        bodies[1].v = Vec2::new(0.5, -2.0);

        let mut joint = RevoluteJoint::new(0.0);
        joint.init_velocity(&anchors, &mut bodies, &ctx);
        for _ in 0..ctx.velocity_iterations {
            joint.solve_velocity(&mut bodies, &ctx);
        }

        let pivot_velocity = bodies[1].v + cross_sv(bodies[1].w, Vec2::new(-1.0, 0.0));
        assert_abs_diff_eq!(pivot_velocity.x, 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(pivot_velocity.y, 0.0, epsilon = 1e-4);
        assert_eq!(bodies[0].v, Vec2::ZERO);
    }

    #[test]
    fn test_motor_respects_max_torque() {
        let ctx = StepContext::new(&PhysicsConfig::default(), 1.0 / 60.0, 1.0);
        let (mut bodies, anchors) = pendulum();

        let mut joint = RevoluteJoint::new(0.0).with_motor(true, 10.0, 6.0);
        joint.init_velocity(&anchors, &mut bodies, &ctx);
        joint.solve_velocity(&mut bodies, &ctx);

        assert!(joint.motor_impulse().abs() <= ctx.dt * 6.0 + 1e-6);
        assert!(bodies[1].w > 0.0);
    }

    #[test]
    fn test_limit_pushes_back_into_range() {
        let ctx = StepContext::new(&PhysicsConfig::default(), 1.0 / 60.0, 1.0);
        let (mut bodies, anchors) = pendulum();
        bodies[1].a = 0.5;

        let mut joint = RevoluteJoint::new(0.0).with_limit(true, -0.25, 0.25);
        joint.init_velocity(&anchors, &mut bodies, &ctx);
        for _ in 0..20 {
            joint.solve_position(&mut bodies, &ctx);
        }
        assert!(bodies[1].a <= 0.25 + 2.0 * ctx.angular_slop);
    }
}
