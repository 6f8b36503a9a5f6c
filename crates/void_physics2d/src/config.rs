//! Physics configuration
//!
//! Besides plain field access, every tunable is reachable through a string key
//! so that console/cvar style collaborators can adjust the world at runtime
//! without knowing this struct.

use crate::error::{PhysicsError, Result};
use serde::{Deserialize, Serialize};
use void_math2d::Vec2;

/// Physics world configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Gravity vector (default: -9.81 in Y)
    pub gravity: Vec2,

    /// Simulation ticks per second
    pub tick_rate: f32,

    /// Minimum effective tick rate; ticks are split into substeps to reach it
    pub target_min_tickrate: f32,

    /// Solver iterations for velocity
    pub velocity_iterations: u32,

    /// Solver iterations for position
    pub position_iterations: u32,

    /// Reuse accumulated impulses as the initial solver guess
    pub warm_starting: bool,

    /// Enable sleeping for inactive islands
    pub sleep_allowed: bool,

    /// Linear speed below which a body counts as resting
    pub linear_sleep_tolerance: f32,

    /// Angular speed below which a body counts as resting
    pub angular_sleep_tolerance: f32,

    /// Seconds an island must rest before it is put to sleep
    pub time_to_sleep: f32,

    /// Allowed penetration before position correction kicks in
    pub linear_slop: f32,

    /// Allowed angular error for joint position correction
    pub angular_slop: f32,

    /// Fraction of the position error removed per iteration
    pub baumgarte: f32,

    /// Largest positional push applied in a single correction step
    pub max_linear_correction: f32,

    /// Largest angular push applied in a single correction step
    pub max_angular_correction: f32,

    /// Speed clamp applied before integration
    pub max_linear_velocity: f32,

    /// Angular speed clamp applied before integration
    pub max_angular_velocity: f32,

    /// Approach speed under which contacts are treated as inelastic
    pub restitution_threshold: f32,

    /// Fixed margin added around each fixture AABB in the broadphase
    pub aabb_extension: f32,

    /// Displacement prediction multiplier for moved proxies
    pub aabb_multiplier: f32,

    /// Default friction coefficient
    pub default_friction: f32,

    /// Default restitution (bounciness)
    pub default_restitution: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -9.81),
            tick_rate: 60.0,
            target_min_tickrate: 60.0,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
            sleep_allowed: true,
            linear_sleep_tolerance: 0.01,
            angular_sleep_tolerance: 2.0 / 180.0 * std::f32::consts::PI,
            time_to_sleep: 0.5,
            linear_slop: 0.005,
            angular_slop: 2.0 / 180.0 * std::f32::consts::PI,
            baumgarte: 0.2,
            max_linear_correction: 0.2,
            max_angular_correction: 8.0 / 180.0 * std::f32::consts::PI,
            max_linear_velocity: 400.0,
            max_angular_velocity: 0.5 * std::f32::consts::PI * 60.0,
            restitution_threshold: 1.0,
            aabb_extension: 0.1,
            aabb_multiplier: 2.0,
            default_friction: 0.4,
            default_restitution: 0.0,
        }
    }
}

/// A dynamically typed configuration value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    Vec2(Vec2),
}

impl ConfigValue {
    fn as_f32(self, key: &str) -> Result<f32> {
        match self {
            Self::Float(v) => Ok(v),
            Self::Int(v) => Ok(v as f32),
            _ => Err(mismatch(key, "float")),
        }
    }

    fn as_u32(self, key: &str) -> Result<u32> {
        match self {
            Self::Int(v) if v >= 0 && v <= u32::MAX as i64 => Ok(v as u32),
            Self::Int(_) => Err(PhysicsError::InvalidConfig(format!(
                "{key} must fit in an unsigned 32-bit integer"
            ))),
            _ => Err(mismatch(key, "integer")),
        }
    }

    fn as_bool(self, key: &str) -> Result<bool> {
        match self {
            Self::Bool(v) => Ok(v),
            _ => Err(mismatch(key, "bool")),
        }
    }

    fn as_vec2(self, key: &str) -> Result<Vec2> {
        match self {
            Self::Vec2(v) => Ok(v),
            _ => Err(mismatch(key, "vec2")),
        }
    }
}

fn mismatch(key: &str, expected: &'static str) -> PhysicsError {
    PhysicsError::ConfigTypeMismatch {
        key: key.to_string(),
        expected,
    }
}

impl PhysicsConfig {
    /// Every key accepted by [`PhysicsConfig::set`] and [`PhysicsConfig::get`]
    /// Upper bound on substeps per tick
    pub const MAX_SUBSTEPS: u32 = 64;

    pub const KEYS: &'static [&'static str] = &[
        "gravity",
        "tick_rate",
        "target_min_tickrate",
        "velocity_iterations",
        "position_iterations",
        "warm_starting",
        "sleep_allowed",
        "linear_sleep_tolerance",
        "angular_sleep_tolerance",
        "time_to_sleep",
        "linear_slop",
        "angular_slop",
        "baumgarte",
        "max_linear_correction",
        "max_angular_correction",
        "max_linear_velocity",
        "max_angular_velocity",
        "restitution_threshold",
        "aabb_extension",
        "aabb_multiplier",
        "default_friction",
        "default_restitution",
    ];

    /// Create a configuration for high-precision simulation
    pub fn high_precision() -> Self {
        Self {
            velocity_iterations: 16,
            position_iterations: 6,
            target_min_tickrate: 120.0,
            ..Default::default()
        }
    }

    /// Create a configuration for fast simulation (lower quality)
    pub fn fast() -> Self {
        Self {
            velocity_iterations: 4,
            position_iterations: 2,
            target_min_tickrate: 30.0,
            ..Default::default()
        }
    }

    /// Set gravity
    pub fn with_gravity(mut self, x: f32, y: f32) -> Self {
        self.gravity = Vec2::new(x, y);
        self
    }

    /// Set tick rate
    pub fn with_tick_rate(mut self, tick_rate: f32) -> Self {
        self.tick_rate = tick_rate;
        self
    }

    /// Set the minimum effective tick rate
    pub fn with_target_min_tickrate(mut self, rate: f32) -> Self {
        self.target_min_tickrate = rate;
        self
    }

    /// Set solver iteration counts
    pub fn with_iterations(mut self, velocity: u32, position: u32) -> Self {
        self.velocity_iterations = velocity;
        self.position_iterations = position;
        self
    }

    /// Enable or disable sleeping
    pub fn with_sleep_allowed(mut self, allowed: bool) -> Self {
        self.sleep_allowed = allowed;
        self
    }

    /// Enable or disable warm starting
    pub fn with_warm_starting(mut self, enabled: bool) -> Self {
        self.warm_starting = enabled;
        self
    }

    /// Fixed tick length in seconds
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_rate
    }

    /// Number of substeps each tick is divided into
    pub fn substep_count(&self) -> u32 {
        if self.tick_rate <= 0.0 || !self.target_min_tickrate.is_finite() {
            return 1;
        }
        let ratio = (self.target_min_tickrate / self.tick_rate).ceil();
        if ratio.is_finite() && ratio > 1.0 {
            ratio.min(Self::MAX_SUBSTEPS as f32) as u32
        } else {
            1
        }
    }

    /// Check the configuration for values the solver cannot work with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(PhysicsError::InvalidConfig(msg.to_string()));

        if !(self.tick_rate.is_finite() && self.tick_rate > 0.0) {
            return invalid("tick_rate must be positive");
        }
        if !(self.target_min_tickrate.is_finite() && self.target_min_tickrate >= 0.0) {
            return invalid("target_min_tickrate must not be negative");
        }
        if self.target_min_tickrate / self.tick_rate > Self::MAX_SUBSTEPS as f32 {
            return Err(PhysicsError::InvalidConfig(format!(
                "target_min_tickrate needs more than {} substeps per tick",
                Self::MAX_SUBSTEPS
            )));
        }
        if self.velocity_iterations == 0 {
            return invalid("velocity_iterations must be at least 1");
        }
        if !self.gravity.is_finite() {
            return invalid("gravity must be finite");
        }
        let non_negative = [
            ("linear_sleep_tolerance", self.linear_sleep_tolerance),
            ("angular_sleep_tolerance", self.angular_sleep_tolerance),
            ("time_to_sleep", self.time_to_sleep),
            ("linear_slop", self.linear_slop),
            ("angular_slop", self.angular_slop),
            ("baumgarte", self.baumgarte),
            ("max_linear_correction", self.max_linear_correction),
            ("max_angular_correction", self.max_angular_correction),
            ("max_linear_velocity", self.max_linear_velocity),
            ("max_angular_velocity", self.max_angular_velocity),
            ("restitution_threshold", self.restitution_threshold),
            ("aabb_extension", self.aabb_extension),
            ("aabb_multiplier", self.aabb_multiplier),
            ("default_friction", self.default_friction),
            ("default_restitution", self.default_restitution),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(PhysicsError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Read a value by key
    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        use ConfigValue::*;
        let value = match key {
            "gravity" => Vec2(self.gravity),
            "tick_rate" => Float(self.tick_rate),
            "target_min_tickrate" => Float(self.target_min_tickrate),
            "velocity_iterations" => Int(self.velocity_iterations as i64),
            "position_iterations" => Int(self.position_iterations as i64),
            "warm_starting" => Bool(self.warm_starting),
            "sleep_allowed" => Bool(self.sleep_allowed),
            "linear_sleep_tolerance" => Float(self.linear_sleep_tolerance),
            "angular_sleep_tolerance" => Float(self.angular_sleep_tolerance),
            "time_to_sleep" => Float(self.time_to_sleep),
            "linear_slop" => Float(self.linear_slop),
            "angular_slop" => Float(self.angular_slop),
            "baumgarte" => Float(self.baumgarte),
            "max_linear_correction" => Float(self.max_linear_correction),
            "max_angular_correction" => Float(self.max_angular_correction),
            "max_linear_velocity" => Float(self.max_linear_velocity),
            "max_angular_velocity" => Float(self.max_angular_velocity),
            "restitution_threshold" => Float(self.restitution_threshold),
            "aabb_extension" => Float(self.aabb_extension),
            "aabb_multiplier" => Float(self.aabb_multiplier),
            "default_friction" => Float(self.default_friction),
            "default_restitution" => Float(self.default_restitution),
            _ => return None,
        };
        Some(value)
    }

    /// Write a value by key
    ///
    /// The new configuration is validated as a whole; on failure `self` is
    /// left untouched.
    pub fn set(&mut self, key: &str, value: ConfigValue) -> Result<()> {
        let mut next = self.clone();
        match key {
            "gravity" => next.gravity = value.as_vec2(key)?,
            "tick_rate" => next.tick_rate = value.as_f32(key)?,
            "target_min_tickrate" => next.target_min_tickrate = value.as_f32(key)?,
            "velocity_iterations" => next.velocity_iterations = value.as_u32(key)?,
            "position_iterations" => next.position_iterations = value.as_u32(key)?,
            "warm_starting" => next.warm_starting = value.as_bool(key)?,
            "sleep_allowed" => next.sleep_allowed = value.as_bool(key)?,
            "linear_sleep_tolerance" => next.linear_sleep_tolerance = value.as_f32(key)?,
            "angular_sleep_tolerance" => next.angular_sleep_tolerance = value.as_f32(key)?,
            "time_to_sleep" => next.time_to_sleep = value.as_f32(key)?,
            "linear_slop" => next.linear_slop = value.as_f32(key)?,
            "angular_slop" => next.angular_slop = value.as_f32(key)?,
            "baumgarte" => next.baumgarte = value.as_f32(key)?,
            "max_linear_correction" => next.max_linear_correction = value.as_f32(key)?,
            "max_angular_correction" => next.max_angular_correction = value.as_f32(key)?,
            "max_linear_velocity" => next.max_linear_velocity = value.as_f32(key)?,
            "max_angular_velocity" => next.max_angular_velocity = value.as_f32(key)?,
            "restitution_threshold" => next.restitution_threshold = value.as_f32(key)?,
            "aabb_extension" => next.aabb_extension = value.as_f32(key)?,
            "aabb_multiplier" => next.aabb_multiplier = value.as_f32(key)?,
            "default_friction" => next.default_friction = value.as_f32(key)?,
            "default_restitution" => next.default_restitution = value.as_f32(key)?,
            _ => return Err(PhysicsError::UnknownConfigKey(key.to_string())),
        }
        next.validate()?;
        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PhysicsConfig::default().validate().is_ok());
        assert!(PhysicsConfig::high_precision().validate().is_ok());
        assert!(PhysicsConfig::fast().validate().is_ok());
    }

    #[test]
    fn test_substep_count() {
        let config = PhysicsConfig::default()
            .with_tick_rate(20.0)
            .with_target_min_tickrate(60.0);
        assert_eq!(config.substep_count(), 3);

        let config = config.with_target_min_tickrate(50.0);
        assert_eq!(config.substep_count(), 3);

        let config = config.with_target_min_tickrate(10.0);
        assert_eq!(config.substep_count(), 1);
    }

    #[test]
    fn test_substep_count_is_bounded() {
        let at_limit = PhysicsConfig::default()
            .with_tick_rate(1.0)
            .with_target_min_tickrate(PhysicsConfig::MAX_SUBSTEPS as f32);
        assert!(at_limit.validate().is_ok());
        assert_eq!(at_limit.substep_count(), PhysicsConfig::MAX_SUBSTEPS);

        let huge = at_limit.clone().with_target_min_tickrate(1.0e12);
        assert!(matches!(huge.validate(), Err(PhysicsError::InvalidConfig(_))));
        assert_eq!(huge.substep_count(), PhysicsConfig::MAX_SUBSTEPS);

        let mut world_config = PhysicsConfig::default();
        assert!(world_config
            .set("target_min_tickrate", ConfigValue::Float(1.0e9))
            .is_err());
        assert_eq!(world_config.substep_count(), 1);
    }

    #[test]
    fn test_set_and_get() {
        let mut config = PhysicsConfig::default();
        config.set("tick_rate", ConfigValue::Float(30.0)).unwrap();
        assert_eq!(config.get("tick_rate"), Some(ConfigValue::Float(30.0)));

        config.set("velocity_iterations", ConfigValue::Int(12)).unwrap();
        assert_eq!(config.velocity_iterations, 12);

        config
            .set("gravity", ConfigValue::Vec2(Vec2::new(0.0, -20.0)))
            .unwrap();
        assert_eq!(config.gravity, Vec2::new(0.0, -20.0));
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut config = PhysicsConfig::default();

        assert!(matches!(
            config.set("no_such_key", ConfigValue::Bool(true)),
            Err(PhysicsError::UnknownConfigKey(_))
        ));
        assert!(matches!(
            config.set("sleep_allowed", ConfigValue::Float(1.0)),
            Err(PhysicsError::ConfigTypeMismatch { .. })
        ));
        assert!(matches!(
            config.set("tick_rate", ConfigValue::Float(0.0)),
            Err(PhysicsError::InvalidConfig(_))
        ));
        // Failed writes leave the config untouched
        assert_eq!(config, PhysicsConfig::default());
    }

    #[test]
    fn test_every_key_is_readable() {
        let config = PhysicsConfig::default();
        for key in PhysicsConfig::KEYS {
            assert!(config.get(key).is_some(), "missing key {key}");
        }
    }
}
