//! Distance joint: rod, rope or spring between two anchors

use super::{inverse_or_zero, soft_coefficients, JointAnchors, JointConstraint, JointFrame};
use crate::solver::{SolverBody, StepContext};
use void_math2d::Vec2;

/// Keeps the anchors at a fixed distance, within a range, or springs them
/// towards a rest length
#[derive(Debug, Clone)]
pub struct DistanceJoint {
    length: f32,
    min_length: f32,
    max_length: f32,
    stiffness: f32,
    damping: f32,

    frame: JointFrame,
    u: Vec2,
    current_length: f32,
    mass: f32,
    soft_mass: f32,
    gamma: f32,
    bias: f32,
    impulse: f32,
    lower_impulse: f32,
    upper_impulse: f32,
}

impl DistanceJoint {
    pub(crate) fn new(
        length: f32,
        min_length: Option<f32>,
        max_length: Option<f32>,
        stiffness: f32,
        damping: f32,
    ) -> Self {
        let length = length.max(0.0);
        let stiffness = stiffness.max(0.0);
        // A spring without explicit limits is free to stretch
        let (default_min, default_max) = if stiffness > 0.0 {
            (0.0, f32::MAX)
        } else {
            (length, length)
        };
        let min_length = min_length.unwrap_or(default_min).max(0.0);
        let max_length = max_length.unwrap_or(default_max).max(min_length);
        Self {
            length,
            min_length,
            max_length,
            stiffness,
            damping: damping.max(0.0),
            frame: JointFrame::default(),
            u: Vec2::ZERO,
            current_length: 0.0,
            mass: 0.0,
            soft_mass: 0.0,
            gamma: 0.0,
            bias: 0.0,
            impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
        }
    }

    /// Rest length
    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn min_length(&self) -> f32 {
        self.min_length
    }

    pub fn max_length(&self) -> f32 {
        self.max_length
    }

    pub fn stiffness(&self) -> f32 {
        self.stiffness
    }

    pub fn damping(&self) -> f32 {
        self.damping
    }

    /// Anchor distance at the start of the last solve
    pub fn current_length(&self) -> f32 {
        self.current_length
    }

    fn is_ranged(&self) -> bool {
        self.min_length < self.max_length
    }

    fn axis_velocity(&self, bodies: &[SolverBody]) -> f32 {
        self.u.dot(self.frame.relative_velocity(bodies))
    }
}

impl JointConstraint for DistanceJoint {
    fn init_velocity(&mut self, anchors: &JointAnchors, bodies: &mut [SolverBody], ctx: &StepContext) {
        self.frame = JointFrame::new(anchors, bodies);
        let f = &self.frame;

        let (u, len) = f.separation(bodies, f.r_a, f.r_b).normalize_and_length();
        self.current_length = len;
        if len > ctx.linear_slop {
            self.u = u;
        } else {
            self.u = Vec2::ZERO;
            self.mass = 0.0;
            self.impulse = 0.0;
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }

        let cr_a = f.r_a.cross(self.u);
        let cr_b = f.r_b.cross(self.u);
        let mut inv_mass =
            f.inv_mass_a + f.inv_i_a * cr_a * cr_a + f.inv_mass_b + f.inv_i_b * cr_b * cr_b;
        self.mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };

        if self.is_ranged() && self.stiffness > 0.0 {
            let c = self.current_length - self.length;
            let (gamma, bias) = soft_coefficients(self.stiffness, self.damping, c, ctx.dt);
            self.gamma = gamma;
            self.bias = bias;
            inv_mass += gamma;
            self.soft_mass = if inv_mass != 0.0 { 1.0 / inv_mass } else { 0.0 };
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
            self.soft_mass = self.mass;
        }

        if ctx.warm_starting {
            self.impulse *= ctx.dt_ratio;
            self.lower_impulse *= ctx.dt_ratio;
            self.upper_impulse *= ctx.dt_ratio;
            let p = self.u * (self.impulse + self.lower_impulse - self.upper_impulse);
            self.frame.apply_impulse(bodies, p, 0.0);
        } else {
            self.impulse = 0.0;
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }
    }

    fn solve_velocity(&mut self, bodies: &mut [SolverBody], ctx: &StepContext) {
        if !self.is_ranged() {
            let cdot = self.axis_velocity(bodies);
            let impulse = -self.mass * cdot;
            self.impulse += impulse;
            self.frame.apply_impulse(bodies, self.u * impulse, 0.0);
            return;
        }

        if self.stiffness > 0.0 {
            let cdot = self.axis_velocity(bodies);
            let impulse = -self.soft_mass * (cdot + self.bias + self.gamma * self.impulse);
            self.impulse += impulse;
            self.frame.apply_impulse(bodies, self.u * impulse, 0.0);
        }

        // Lower limit
        {
            let c = self.current_length - self.min_length;
            let bias = c.max(0.0) * ctx.inv_dt;
            let cdot = self.axis_velocity(bodies);
            let mut impulse = -self.mass * (cdot + bias);
            let new_impulse = (self.lower_impulse + impulse).max(0.0);
            impulse = new_impulse - self.lower_impulse;
            self.lower_impulse = new_impulse;
            self.frame.apply_impulse(bodies, self.u * impulse, 0.0);
        }

        // Upper limit
        {
            let c = self.max_length - self.current_length;
            let bias = c.max(0.0) * ctx.inv_dt;
            let cdot = -self.axis_velocity(bodies);
            let mut impulse = -self.mass * (cdot + bias);
            let new_impulse = (self.upper_impulse + impulse).max(0.0);
            impulse = new_impulse - self.upper_impulse;
            self.upper_impulse = new_impulse;
            self.frame.apply_impulse(bodies, self.u * -impulse, 0.0);
        }
    }

    fn solve_position(&mut self, bodies: &mut [SolverBody], ctx: &StepContext) -> bool {
        let f = self.frame;
        let (r_a, r_b) = f.arms(bodies);
        let (u, length) = f.separation(bodies, r_a, r_b).normalize_and_length();

        let c = if self.min_length == self.max_length {
            (length - self.min_length).clamp(-ctx.max_linear_correction, ctx.max_linear_correction)
        } else if length < self.min_length {
            length - self.min_length
        } else if self.max_length < length {
            length - self.max_length
        } else {
            return true;
        };

        let cr_a = r_a.cross(u);
        let cr_b = r_b.cross(u);
        let mass = inverse_or_zero(
            f.inv_mass_a + f.inv_i_a * cr_a * cr_a + f.inv_mass_b + f.inv_i_b * cr_b * cr_b,
        );
        let p = u * (-mass * c);
        f.apply_position_impulse(bodies, r_a, r_b, p, 0.0);

        c.abs() < ctx.linear_slop
    }

    fn reaction_impulse(&self) -> f32 {
        (self.impulse + self.lower_impulse - self.upper_impulse).abs()
    }
}
