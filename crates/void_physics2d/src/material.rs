//! Fixture materials defining surface properties

use serde::{Deserialize, Serialize};

/// Surface and mass properties of a fixture
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsMaterial {
    /// Friction coefficient (0 = frictionless)
    pub friction: f32,
    /// Restitution/bounciness (0 = no bounce, 1 = perfect bounce)
    pub restitution: f32,
    /// Area density for mass calculation (kg/m²)
    pub density: f32,
    /// How friction is combined between two fixtures
    pub friction_combine: CombineRule,
    /// How restitution is combined between two fixtures
    pub restitution_combine: CombineRule,
}

impl Default for PhysicsMaterial {
    fn default() -> Self {
        Self {
            friction: 0.4,
            restitution: 0.0,
            density: 1.0,
            friction_combine: CombineRule::Multiply,
            restitution_combine: CombineRule::Max,
        }
    }
}

impl PhysicsMaterial {
    /// Create a new material with unit density
    pub fn new(friction: f32, restitution: f32) -> Self {
        Self {
            friction,
            restitution,
            ..Default::default()
        }
    }

    /// Low-friction surface
    pub fn ice() -> Self {
        Self {
            friction: 0.02,
            density: 0.9,
            ..Default::default()
        }
    }

    /// Bouncy surface
    pub fn rubber() -> Self {
        Self {
            friction: 0.9,
            restitution: 0.8,
            density: 1.1,
            ..Default::default()
        }
    }

    /// Heavy, grippy surface
    pub fn metal() -> Self {
        Self {
            friction: 0.3,
            restitution: 0.1,
            density: 7.8,
            ..Default::default()
        }
    }

    /// Set friction
    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction.max(0.0);
        self
    }

    /// Set restitution
    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution.max(0.0);
        self
    }

    /// Set density; zero density gives a massless fixture
    pub fn with_density(mut self, density: f32) -> Self {
        self.density = density.max(0.0);
        self
    }

    /// Effective friction for a pair of materials
    pub fn combine_friction(&self, other: &PhysicsMaterial) -> f32 {
        let rule = self.friction_combine.max_priority(other.friction_combine);
        match rule {
            // Geometric mean keeps a frictionless side frictionless
            CombineRule::Multiply => (self.friction * other.friction).sqrt(),
            _ => rule.combine(self.friction, other.friction),
        }
    }

    /// Effective restitution for a pair of materials
    pub fn combine_restitution(&self, other: &PhysicsMaterial) -> f32 {
        let rule = self.restitution_combine.max_priority(other.restitution_combine);
        rule.combine(self.restitution, other.restitution)
    }
}

/// Rule for combining material properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CombineRule {
    /// Use the average of both values
    #[default]
    Average,
    /// Use the minimum value
    Min,
    /// Use the maximum value
    Max,
    /// Multiply the values
    Multiply,
}

impl CombineRule {
    /// Pick the rule that wins when two fixtures disagree
    pub fn max_priority(self, other: Self) -> Self {
        use CombineRule::*;
        match (self, other) {
            (Average, _) => other,
            (_, Average) => self,
            (Min, _) | (_, Min) => Min,
            (Multiply, _) | (_, Multiply) => Multiply,
            (Max, Max) => Max,
        }
    }

    /// Combine two values using this rule
    pub fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            Self::Average => (a + b) * 0.5,
            Self::Min => a.min(b),
            Self::Max => a.max(b),
            Self::Multiply => a * b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_combine() {
        let a = PhysicsMaterial::new(0.25, 0.2);
        let b = PhysicsMaterial::new(1.0, 0.9);

        assert_relative_eq!(a.combine_friction(&b), 0.5);
        assert_relative_eq!(a.combine_restitution(&b), 0.9);
    }

    #[test]
    fn test_rule_priority() {
        assert_eq!(CombineRule::Average.max_priority(CombineRule::Max), CombineRule::Max);
        assert_eq!(CombineRule::Max.max_priority(CombineRule::Min), CombineRule::Min);
        assert_eq!(
            CombineRule::Multiply.max_priority(CombineRule::Max),
            CombineRule::Multiply
        );
    }

    #[test]
    fn test_min_rule() {
        let a = PhysicsMaterial {
            friction_combine: CombineRule::Min,
            ..PhysicsMaterial::new(0.3, 0.0)
        };
        let b = PhysicsMaterial::rubber();
        assert_relative_eq!(a.combine_friction(&b), 0.3);
    }
}
