//! Joints: constraints between two bodies
//!
//! A joint is declared between two bodies but solved between its effective
//! endpoints, which differ from the declared ones while a body's joints are
//! relayed onto a container (see [`relay`]).

mod distance;
mod friction;
pub mod relay;
mod revolute;
mod weld;

pub use distance::DistanceJoint;
pub use friction::FrictionJoint;
pub use relay::{outermost_container, ContainerMap, ContainerQuery};
pub use revolute::RevoluteJoint;
pub use weld::WeldJoint;

use crate::arena::SlotKey;
use crate::body::{Body, BodyHandle};
use crate::solver::{SolverBody, StepContext};
use serde::{Deserialize, Serialize};
use void_math2d::{cross_sv, Mat22, Rot, Vec2};

/// Handle to a joint in the physics world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointHandle(pub(crate) SlotKey);

/// Joint discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointType {
    Distance,
    Revolute,
    Weld,
    Friction,
}

/// Type-specific joint parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum JointParams {
    Distance {
        /// Rest length; `None` uses the anchor distance at creation
        length: Option<f32>,
        min_length: Option<f32>,
        max_length: Option<f32>,
        /// Spring stiffness (N/m); zero makes the joint rigid
        stiffness: f32,
        damping: f32,
    },
    Revolute {
        /// `None` captures the relative angle at creation
        reference_angle: Option<f32>,
        enable_limit: bool,
        lower_angle: f32,
        upper_angle: f32,
        enable_motor: bool,
        motor_speed: f32,
        max_motor_torque: f32,
    },
    Weld {
        reference_angle: Option<f32>,
        /// Angular spring stiffness; zero welds rigidly
        stiffness: f32,
        damping: f32,
    },
    Friction {
        max_force: f32,
        max_torque: f32,
    },
}

/// Description for creating a joint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointDesc {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    /// Anchor on body A in its local frame
    pub local_anchor_a: Vec2,
    /// Anchor on body B in its local frame
    pub local_anchor_b: Vec2,
    /// Allow contacts between the connected bodies
    pub collide_connected: bool,
    /// Reaction impulse above which the joint breaks
    pub break_impulse: Option<f32>,
    pub params: JointParams,
}

impl JointDesc {
    fn with_params(body_a: BodyHandle, body_b: BodyHandle, params: JointParams) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: Vec2::ZERO,
            local_anchor_b: Vec2::ZERO,
            collide_connected: false,
            break_impulse: None,
            params,
        }
    }

    /// Rigid rod between the anchors
    pub fn distance(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self::with_params(
            body_a,
            body_b,
            JointParams::Distance {
                length: None,
                min_length: None,
                max_length: None,
                stiffness: 0.0,
                damping: 0.0,
            },
        )
    }

    /// Pin joint around a shared point
    pub fn revolute(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self::with_params(
            body_a,
            body_b,
            JointParams::Revolute {
                reference_angle: None,
                enable_limit: false,
                lower_angle: 0.0,
                upper_angle: 0.0,
                enable_motor: false,
                motor_speed: 0.0,
                max_motor_torque: 0.0,
            },
        )
    }

    /// Glue two bodies together
    pub fn weld(body_a: BodyHandle, body_b: BodyHandle) -> Self {
        Self::with_params(
            body_a,
            body_b,
            JointParams::Weld {
                reference_angle: None,
                stiffness: 0.0,
                damping: 0.0,
            },
        )
    }

    /// Top-down friction against a (usually static) body
    pub fn friction(body_a: BodyHandle, body_b: BodyHandle, max_force: f32, max_torque: f32) -> Self {
        Self::with_params(
            body_a,
            body_b,
            JointParams::Friction {
                max_force: max_force.max(0.0),
                max_torque: max_torque.max(0.0),
            },
        )
    }

    pub fn with_anchors(mut self, local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        self.local_anchor_a = local_anchor_a;
        self.local_anchor_b = local_anchor_b;
        self
    }

    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }

    pub fn with_break_impulse(mut self, impulse: f32) -> Self {
        self.break_impulse = Some(impulse);
        self
    }

    pub fn joint_type(&self) -> JointType {
        match self.params {
            JointParams::Distance { .. } => JointType::Distance,
            JointParams::Revolute { .. } => JointType::Revolute,
            JointParams::Weld { .. } => JointType::Weld,
            JointParams::Friction { .. } => JointType::Friction,
        }
    }
}

/// Body indices and anchors resolved for one solve
#[derive(Debug, Clone, Copy)]
pub(crate) struct JointAnchors {
    pub index_a: usize,
    pub index_b: usize,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
}

/// Solver interface implemented by each joint type
pub(crate) trait JointConstraint {
    fn init_velocity(&mut self, anchors: &JointAnchors, bodies: &mut [SolverBody], ctx: &StepContext);
    fn solve_velocity(&mut self, bodies: &mut [SolverBody], ctx: &StepContext);
    /// Returns true when the position error is within tolerance
    fn solve_position(&mut self, bodies: &mut [SolverBody], ctx: &StepContext) -> bool;
    /// Magnitude of the accumulated reaction impulse
    fn reaction_impulse(&self) -> f32;
}

/// Concrete joint state
#[derive(Debug, Clone)]
pub enum JointKind {
    Distance(DistanceJoint),
    Revolute(RevoluteJoint),
    Weld(WeldJoint),
    Friction(FrictionJoint),
}

impl JointKind {
    /// Build the joint state, capturing rest lengths and angles from the
    /// current body poses where the description leaves them open
    pub(crate) fn from_desc(desc: &JointDesc, body_a: &Body, body_b: &Body) -> Self {
        let world_a = body_a.world_point(desc.local_anchor_a);
        let world_b = body_b.world_point(desc.local_anchor_b);
        let relative_angle = body_b.angle() - body_a.angle();
        match desc.params {
            JointParams::Distance {
                length,
                min_length,
                max_length,
                stiffness,
                damping,
            } => Self::Distance(DistanceJoint::new(
                length.unwrap_or_else(|| world_a.distance(world_b)),
                min_length,
                max_length,
                stiffness,
                damping,
            )),
            JointParams::Revolute {
                reference_angle,
                enable_limit,
                lower_angle,
                upper_angle,
                enable_motor,
                motor_speed,
                max_motor_torque,
            } => Self::Revolute(
                RevoluteJoint::new(reference_angle.unwrap_or(relative_angle))
                    .with_limit(enable_limit, lower_angle, upper_angle)
                    .with_motor(enable_motor, motor_speed, max_motor_torque),
            ),
            JointParams::Weld {
                reference_angle,
                stiffness,
                damping,
            } => Self::Weld(WeldJoint::new(
                reference_angle.unwrap_or(relative_angle),
                stiffness,
                damping,
            )),
            JointParams::Friction {
                max_force,
                max_torque,
            } => Self::Friction(FrictionJoint::new(max_force, max_torque)),
        }
    }

    pub(crate) fn as_constraint_mut(&mut self) -> &mut dyn JointConstraint {
        match self {
            Self::Distance(j) => j,
            Self::Revolute(j) => j,
            Self::Weld(j) => j,
            Self::Friction(j) => j,
        }
    }

    pub(crate) fn as_constraint(&self) -> &dyn JointConstraint {
        match self {
            Self::Distance(j) => j,
            Self::Revolute(j) => j,
            Self::Weld(j) => j,
            Self::Friction(j) => j,
        }
    }

    pub fn joint_type(&self) -> JointType {
        match self {
            Self::Distance(_) => JointType::Distance,
            Self::Revolute(_) => JointType::Revolute,
            Self::Weld(_) => JointType::Weld,
            Self::Friction(_) => JointType::Friction,
        }
    }
}

/// A joint owned by the physics world
#[derive(Debug, Clone)]
pub struct Joint {
    pub(crate) handle: JointHandle,
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,
    /// Bodies actually constrained (relay targets when relayed)
    pub(crate) edge_a: BodyHandle,
    pub(crate) edge_b: BodyHandle,
    pub(crate) local_anchor_a: Vec2,
    pub(crate) local_anchor_b: Vec2,
    pub(crate) collide_connected: bool,
    pub(crate) break_impulse: Option<f32>,
    pub(crate) kind: JointKind,
    pub(crate) island_flag: bool,
}

impl Joint {
    #[inline]
    pub fn handle(&self) -> JointHandle {
        self.handle
    }

    /// Declared endpoints
    #[inline]
    pub fn bodies(&self) -> (BodyHandle, BodyHandle) {
        (self.body_a, self.body_b)
    }

    /// Endpoints the solver constrains
    #[inline]
    pub fn effective_bodies(&self) -> (BodyHandle, BodyHandle) {
        (self.edge_a, self.edge_b)
    }

    /// Relaying can fold both ends onto one body, which disables the joint
    #[inline]
    pub fn is_active(&self) -> bool {
        self.edge_a != self.edge_b
    }

    #[inline]
    pub fn joint_type(&self) -> JointType {
        self.kind.joint_type()
    }

    #[inline]
    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    #[inline]
    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    #[inline]
    pub fn break_impulse(&self) -> Option<f32> {
        self.break_impulse
    }

    #[inline]
    pub fn local_anchor_a(&self) -> Vec2 {
        self.local_anchor_a
    }

    #[inline]
    pub fn local_anchor_b(&self) -> Vec2 {
        self.local_anchor_b
    }

    /// Magnitude of the last accumulated reaction impulse
    pub fn reaction_impulse(&self) -> f32 {
        self.kind.as_constraint().reaction_impulse()
    }

    /// Whether this joint connects the two bodies (in either order)
    pub(crate) fn connects(&self, a: BodyHandle, b: BodyHandle) -> bool {
        (self.edge_a == a && self.edge_b == b) || (self.edge_a == b && self.edge_b == a)
    }

    pub(crate) fn other_edge(&self, body: BodyHandle) -> BodyHandle {
        if self.edge_a == body {
            self.edge_b
        } else {
            self.edge_a
        }
    }
}

// ==================== Shared solver helpers ====================

/// Per-solve body data shared by every joint type
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct JointFrame {
    pub index_a: usize,
    pub index_b: usize,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    pub local_center_a: Vec2,
    pub local_center_b: Vec2,
    pub inv_mass_a: f32,
    pub inv_mass_b: f32,
    pub inv_i_a: f32,
    pub inv_i_b: f32,
    /// Anchor arms from the centers of mass, fixed during velocity iterations
    pub r_a: Vec2,
    pub r_b: Vec2,
}

impl JointFrame {
    pub fn new(anchors: &JointAnchors, bodies: &[SolverBody]) -> Self {
        let a = &bodies[anchors.index_a];
        let b = &bodies[anchors.index_b];
        let mut frame = Self {
            index_a: anchors.index_a,
            index_b: anchors.index_b,
            local_anchor_a: anchors.local_anchor_a,
            local_anchor_b: anchors.local_anchor_b,
            local_center_a: a.local_center,
            local_center_b: b.local_center,
            inv_mass_a: a.inv_mass,
            inv_mass_b: b.inv_mass,
            inv_i_a: a.inv_inertia,
            inv_i_b: b.inv_inertia,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
        };
        let (r_a, r_b) = frame.arms(bodies);
        frame.r_a = r_a;
        frame.r_b = r_b;
        frame
    }

    /// Anchor arms for the bodies' current angles
    pub fn arms(&self, bodies: &[SolverBody]) -> (Vec2, Vec2) {
        let a = &bodies[self.index_a];
        let b = &bodies[self.index_b];
        (
            Rot::from_angle(a.a).rotate(self.local_anchor_a - self.local_center_a),
            Rot::from_angle(b.a).rotate(self.local_anchor_b - self.local_center_b),
        )
    }

    /// Effective mass matrix of a point-to-point constraint
    pub fn point_mass(&self, r_a: Vec2, r_b: Vec2) -> Mat22 {
        let (m_a, m_b, i_a, i_b) = (self.inv_mass_a, self.inv_mass_b, self.inv_i_a, self.inv_i_b);
        let ex = Vec2::new(
            m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b,
            -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b,
        );
        let ey = Vec2::new(ex.y, m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b);
        Mat22::from_cols(ex, ey)
    }

    /// Relative velocity of the anchor points, B minus A
    #[inline]
    pub fn relative_velocity(&self, bodies: &[SolverBody]) -> Vec2 {
        let a = &bodies[self.index_a];
        let b = &bodies[self.index_b];
        b.v + cross_sv(b.w, self.r_b) - a.v - cross_sv(a.w, self.r_a)
    }

    /// Apply linear impulse `p` (on B, opposite on A) plus angular impulse `axial`
    #[inline]
    pub fn apply_impulse(&self, bodies: &mut [SolverBody], p: Vec2, axial: f32) {
        let a = &mut bodies[self.index_a];
        a.v -= p * self.inv_mass_a;
        a.w -= self.inv_i_a * (self.r_a.cross(p) + axial);
        let b = &mut bodies[self.index_b];
        b.v += p * self.inv_mass_b;
        b.w += self.inv_i_b * (self.r_b.cross(p) + axial);
    }

    /// Positional counterpart of [`apply_impulse`](Self::apply_impulse)
    pub fn apply_position_impulse(
        &self,
        bodies: &mut [SolverBody],
        r_a: Vec2,
        r_b: Vec2,
        p: Vec2,
        axial: f32,
    ) {
        let a = &mut bodies[self.index_a];
        a.c -= p * self.inv_mass_a;
        a.a -= self.inv_i_a * (r_a.cross(p) + axial);
        let b = &mut bodies[self.index_b];
        b.c += p * self.inv_mass_b;
        b.a += self.inv_i_b * (r_b.cross(p) + axial);
    }

    /// Separation vector between the anchors for the current poses
    pub fn separation(&self, bodies: &[SolverBody], r_a: Vec2, r_b: Vec2) -> Vec2 {
        bodies[self.index_b].c + r_b - bodies[self.index_a].c - r_a
    }

    /// Relative angle of B to A for the current poses
    #[inline]
    pub fn relative_angle(&self, bodies: &[SolverBody]) -> f32 {
        bodies[self.index_b].a - bodies[self.index_a].a
    }
}

/// Soft-constraint coefficients `(gamma, bias)` for a spring with error `c`
pub(crate) fn soft_coefficients(stiffness: f32, damping: f32, c: f32, dt: f32) -> (f32, f32) {
    let mut gamma = dt * (damping + dt * stiffness);
    gamma = if gamma != 0.0 { 1.0 / gamma } else { 0.0 };
    (gamma, c * dt * stiffness * gamma)
}

#[inline]
pub(crate) fn inverse_or_zero(k: f32) -> f32 {
    if k > 0.0 {
        1.0 / k
    } else {
        0.0
    }
}
