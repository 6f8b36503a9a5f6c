//! Per-island solve: integrate, solve constraints, decide sleep

use super::{ContactConstraint, ContactSolver, SolverBody, StepContext};
use crate::body::{Body, BodyHandle, BodyType};
use crate::joint::{JointAnchors, JointHandle, JointKind};
use std::collections::HashMap;
use void_math2d::Vec2;

/// Per-body data the solver needs besides the dense state
#[derive(Debug, Clone, Copy)]
pub(crate) struct BodyState {
    pub handle: BodyHandle,
    pub body_type: BodyType,
    /// Owned bodies are integrated and written back; the rest are read-only
    /// neighbours (statics, kinematics) referenced by constraints
    pub owned: bool,
    pub can_sleep: bool,
    pub gravity_scale: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub force: Vec2,
    pub torque: f32,
    pub sleep_time: f32,
    start_c: Vec2,
    start_a: f32,
}

/// Solver copy of a joint
#[derive(Debug, Clone)]
pub(crate) struct IslandJoint {
    pub handle: JointHandle,
    pub kind: JointKind,
    pub anchors: JointAnchors,
    pub break_impulse: Option<f32>,
}

/// Results gathered during a solve, applied by the world after the join
#[derive(Debug, Default)]
pub(crate) struct SolveOutcome {
    /// Whole island is ready to sleep
    pub sleep_island: bool,
    /// Lone-island bodies ready to sleep, as solver indices
    pub sleepers: Vec<usize>,
    /// Solver indices of bodies whose state went non-finite
    pub diverged: Vec<usize>,
    pub broken_joints: Vec<(JointHandle, f32)>,
    pub positions_solved: bool,
}

/// Scratch state for solving one island, reused across ticks
#[derive(Debug, Default)]
pub(crate) struct IslandSolver {
    pub bodies: Vec<SolverBody>,
    pub states: Vec<BodyState>,
    pub contacts: ContactSolver,
    pub joints: Vec<IslandJoint>,
    pub outcome: SolveOutcome,
    /// Bodies have no constraints and sleep one by one
    pub lone: bool,
    index_of: HashMap<BodyHandle, usize>,
}

impl IslandSolver {
    pub fn clear(&mut self) {
        self.bodies.clear();
        self.states.clear();
        self.contacts.clear();
        self.joints.clear();
        self.index_of.clear();
        self.outcome = SolveOutcome::default();
        self.lone = false;
    }

    /// Solver index of `body`, adding it on first use
    pub fn push_body(&mut self, body: &Body, owned: bool) -> usize {
        if let Some(&index) = self.index_of.get(&body.handle) {
            return index;
        }
        let index = self.bodies.len();
        let movable = owned && !body.body_type.is_static();
        self.bodies.push(SolverBody {
            c: body.center,
            a: body.angle,
            v: if movable || body.body_type.is_kinematic_family() {
                body.linear_velocity
            } else {
                Vec2::ZERO
            },
            w: if movable || body.body_type.is_kinematic_family() {
                body.angular_velocity
            } else {
                0.0
            },
            inv_mass: if owned { body.inv_mass } else { 0.0 },
            inv_inertia: if owned { body.inv_inertia } else { 0.0 },
            local_center: body.local_center,
        });
        self.states.push(BodyState {
            handle: body.handle,
            body_type: body.body_type,
            owned,
            can_sleep: body.can_sleep,
            gravity_scale: body.gravity_scale,
            linear_damping: body.linear_damping,
            angular_damping: body.angular_damping,
            force: body.force,
            torque: body.torque,
            sleep_time: body.sleep_time,
            start_c: body.center,
            start_a: body.angle,
        });
        self.index_of.insert(body.handle, index);
        index
    }

    pub fn push_contact(&mut self, constraint: ContactConstraint) {
        self.contacts.constraints.push(constraint);
    }

    pub fn push_joint(&mut self, joint: IslandJoint) {
        self.joints.push(joint);
    }

    /// Run one full substep on this island
    pub fn solve(&mut self, ctx: &StepContext) {
        self.outcome = SolveOutcome::default();
        let h = ctx.dt;

        for (body, state) in self.bodies.iter_mut().zip(self.states.iter_mut()) {
            state.start_c = body.c;
            state.start_a = body.a;
            if !state.owned || !state.body_type.has_finite_mass() {
                continue;
            }
            if state.body_type.uses_gravity() {
                body.v += ctx.gravity * (h * state.gravity_scale);
            }
            body.v += state.force * (h * body.inv_mass);
            body.w += h * body.inv_inertia * state.torque;

            body.v *= 1.0 / (1.0 + h * state.linear_damping);
            body.w *= 1.0 / (1.0 + h * state.angular_damping);
        }

        self.contacts.init_velocity(&mut self.bodies, ctx);
        for joint in self.joints.iter_mut() {
            joint
                .kind
                .as_constraint_mut()
                .init_velocity(&joint.anchors, &mut self.bodies, ctx);
        }

        for _ in 0..ctx.velocity_iterations {
            for joint in self.joints.iter_mut() {
                joint.kind.as_constraint_mut().solve_velocity(&mut self.bodies, ctx);
            }
            self.contacts.solve_velocity(&mut self.bodies);
        }
        self.contacts.store_impulses();

        for (body, state) in self.bodies.iter_mut().zip(self.states.iter()) {
            if !state.owned || state.body_type.is_static() {
                continue;
            }
            let speed = body.v.length();
            if speed > ctx.max_linear_velocity {
                body.v *= ctx.max_linear_velocity / speed;
            }
            body.w = body.w.clamp(-ctx.max_angular_velocity, ctx.max_angular_velocity);
            body.c += body.v * h;
            body.a += h * body.w;
        }

        let mut positions_solved = false;
        for _ in 0..ctx.position_iterations {
            let contacts_ok = self.contacts.solve_position(&mut self.bodies, ctx);
            let mut joints_ok = true;
            for joint in self.joints.iter_mut() {
                let ok = joint.kind.as_constraint_mut().solve_position(&mut self.bodies, ctx);
                joints_ok = joints_ok && ok;
            }
            if contacts_ok && joints_ok {
                positions_solved = true;
                break;
            }
        }
        self.outcome.positions_solved = positions_solved;

        self.check_divergence();

        for joint in &self.joints {
            if let Some(threshold) = joint.break_impulse {
                let impulse = joint.kind.as_constraint().reaction_impulse();
                if impulse > threshold {
                    self.outcome.broken_joints.push((joint.handle, impulse));
                }
            }
        }

        self.update_sleep(ctx, positions_solved);
    }

    fn check_divergence(&mut self) {
        for (index, (body, state)) in self.bodies.iter_mut().zip(self.states.iter()).enumerate() {
            if !state.owned {
                continue;
            }
            let finite = body.v.is_finite()
                && body.w.is_finite()
                && body.c.is_finite()
                && body.a.is_finite();
            if !finite {
                body.c = state.start_c;
                body.a = state.start_a;
                body.v = Vec2::ZERO;
                body.w = 0.0;
                self.outcome.diverged.push(index);
            }
        }
    }

    fn update_sleep(&mut self, ctx: &StepContext, positions_solved: bool) {
        let lin_tol_sqr = ctx.linear_sleep_tolerance * ctx.linear_sleep_tolerance;
        let ang_tol_sqr = ctx.angular_sleep_tolerance * ctx.angular_sleep_tolerance;
        let mut min_sleep_time = f32::MAX;

        for (index, (body, state)) in self.bodies.iter().zip(self.states.iter_mut()).enumerate() {
            if !state.owned || state.body_type.is_static() {
                continue;
            }
            let moving_kinematic = state.body_type.is_kinematic_family()
                && (body.v != Vec2::ZERO || body.w != 0.0);
            if !ctx.sleep_allowed
                || !state.can_sleep
                || moving_kinematic
                || body.w * body.w > ang_tol_sqr
                || body.v.length_squared() > lin_tol_sqr
            {
                state.sleep_time = 0.0;
                min_sleep_time = 0.0;
            } else {
                state.sleep_time += ctx.dt;
                min_sleep_time = min_sleep_time.min(state.sleep_time);
            }

            if self.lone && state.sleep_time >= ctx.time_to_sleep {
                self.outcome.sleepers.push(index);
            }
        }

        self.outcome.sleep_island = !self.lone
            && ctx.sleep_allowed
            && positions_solved
            && min_sleep_time >= ctx.time_to_sleep;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::SlotKey;
    use crate::body::BodyDesc;
    use crate::config::PhysicsConfig;
    use approx::assert_abs_diff_eq;

    fn body(index: u32, desc: BodyDesc) -> Body {
        let mut body = Body::new(BodyHandle(SlotKey::new(index, 0)), &desc);
        body.inv_mass = if desc.body_type.has_finite_mass() { 1.0 } else { 0.0 };
        body
    }

    #[test]
    fn test_gravity_integrates_dynamic_only() {
        let config = PhysicsConfig::default().with_gravity(0.0, -10.0);
        let ctx = StepContext::new(&config, 0.1, 1.0);
        let mut solver = IslandSolver::default();
        solver.lone = true;
        solver.push_body(&body(0, BodyDesc::dynamic()), true);
        solver.push_body(&body(1, BodyDesc::controller()), true);

        solver.solve(&ctx);

        assert_abs_diff_eq!(solver.bodies[0].v.y, -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(solver.bodies[0].c.y, -0.1, epsilon = 1e-6);
        assert_eq!(solver.bodies[1].v, Vec2::ZERO);
    }

    #[test]
    fn test_lone_bodies_sleep_independently() {
        let mut config = PhysicsConfig::default().with_gravity(0.0, 0.0);
        config.time_to_sleep = 0.2;
        let ctx = StepContext::new(&config, 0.1, 1.0);
        let mut solver = IslandSolver::default();
        solver.lone = true;
        solver.push_body(&body(0, BodyDesc::dynamic()), true);
        solver.push_body(&body(1, BodyDesc::dynamic().with_linear_velocity(3.0, 0.0)), true);

        solver.solve(&ctx);
        assert!(solver.outcome.sleepers.is_empty());
        solver.solve(&ctx);
        assert_eq!(solver.outcome.sleepers, vec![0]);
        assert!(!solver.outcome.sleep_island);
    }

    #[test]
    fn test_moving_kinematic_never_sleeps() {
        let mut config = PhysicsConfig::default();
        config.time_to_sleep = 0.0;
        let ctx = StepContext::new(&config, 0.1, 1.0);
        let mut solver = IslandSolver::default();
        solver.lone = true;
        solver.push_body(&body(0, BodyDesc::kinematic().with_linear_velocity(0.001, 0.0)), true);

        solver.solve(&ctx);
        assert!(solver.outcome.sleepers.is_empty());
        assert_abs_diff_eq!(solver.bodies[0].c.x, 0.0001, epsilon = 1e-7);
    }

    #[test]
    fn test_non_finite_state_is_restored() {
        let ctx = StepContext::new(&PhysicsConfig::default(), 0.1, 1.0);
        let mut solver = IslandSolver::default();
        solver.lone = true;
        let mut b = body(0, BodyDesc::dynamic().with_position(1.0, 2.0));
        b.force = Vec2::new(f32::NAN, 0.0);
        solver.push_body(&b, true);

        solver.solve(&ctx);

        assert_eq!(solver.outcome.diverged, vec![0]);
        assert_eq!(solver.bodies[0].c, Vec2::new(1.0, 2.0));
        assert_eq!(solver.bodies[0].v, Vec2::ZERO);
    }
}
