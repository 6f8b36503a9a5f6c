//! Sequential-impulse constraint solver
//!
//! Islands copy the bodies they touch into dense [`SolverBody`] arrays, solve
//! contacts and joints against those copies, and write results back once the
//! whole step is done.

mod contact_solver;
mod island_solver;

pub(crate) use contact_solver::{ContactConstraint, ContactSolver};
pub(crate) use island_solver::{IslandJoint, IslandSolver};

use crate::config::PhysicsConfig;
use void_math2d::{Rot, Transform2, Vec2};

/// Per-step solver parameters derived from the configuration
#[derive(Debug, Clone, Copy)]
pub struct StepContext {
    /// Substep length in seconds
    pub dt: f32,
    pub inv_dt: f32,
    /// `dt / previous dt`, scales warm-start impulses
    pub dt_ratio: f32,
    pub gravity: Vec2,
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    pub warm_starting: bool,
    pub linear_slop: f32,
    pub angular_slop: f32,
    pub baumgarte: f32,
    pub max_linear_correction: f32,
    pub max_angular_correction: f32,
    pub max_linear_velocity: f32,
    pub max_angular_velocity: f32,
    pub restitution_threshold: f32,
    pub sleep_allowed: bool,
    pub linear_sleep_tolerance: f32,
    pub angular_sleep_tolerance: f32,
    pub time_to_sleep: f32,
}

impl StepContext {
    pub fn new(config: &PhysicsConfig, dt: f32, dt_ratio: f32) -> Self {
        Self {
            dt,
            inv_dt: if dt > 0.0 { 1.0 / dt } else { 0.0 },
            dt_ratio,
            gravity: config.gravity,
            velocity_iterations: config.velocity_iterations,
            position_iterations: config.position_iterations,
            warm_starting: config.warm_starting,
            linear_slop: config.linear_slop,
            angular_slop: config.angular_slop,
            baumgarte: config.baumgarte,
            max_linear_correction: config.max_linear_correction,
            max_angular_correction: config.max_angular_correction,
            max_linear_velocity: config.max_linear_velocity,
            max_angular_velocity: config.max_angular_velocity,
            restitution_threshold: config.restitution_threshold,
            sleep_allowed: config.sleep_allowed,
            linear_sleep_tolerance: config.linear_sleep_tolerance,
            angular_sleep_tolerance: config.angular_sleep_tolerance,
            time_to_sleep: config.time_to_sleep,
        }
    }
}

/// Dense per-island copy of a body's simulation state
#[derive(Debug, Clone, Copy, Default)]
pub struct SolverBody {
    /// World center of mass
    pub c: Vec2,
    pub a: f32,
    pub v: Vec2,
    pub w: f32,
    pub inv_mass: f32,
    pub inv_inertia: f32,
    pub local_center: Vec2,
}

impl SolverBody {
    /// Origin transform for the current center and angle
    #[inline]
    pub fn transform(&self) -> Transform2 {
        let rotation = Rot::from_angle(self.a);
        Transform2::new(self.c - rotation.rotate(self.local_center), rotation)
    }
}
