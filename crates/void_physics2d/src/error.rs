//! Error types for the physics system

use crate::body::BodyHandle;
use crate::fixture::FixtureHandle;
use crate::joint::JointHandle;
use thiserror::Error;

/// Physics system errors
#[derive(Debug, Error)]
pub enum PhysicsError {
    /// Body not found (never created, or already destroyed)
    #[error("Body not found: {0:?}")]
    BodyNotFound(BodyHandle),

    /// Fixture not found
    #[error("Fixture not found: {0:?}")]
    FixtureNotFound(FixtureHandle),

    /// Joint not found
    #[error("Joint not found: {0:?}")]
    JointNotFound(JointHandle),

    /// Shape failed validation
    #[error("Invalid shape: {0}")]
    InvalidShape(#[from] ShapeError),

    /// A joint was requested between a body and itself
    #[error("Joint cannot connect body {0:?} to itself")]
    JointSelfConnection(BodyHandle),

    /// Invalid configuration
    #[error("Invalid physics configuration: {0}")]
    InvalidConfig(String),

    /// Configuration key is not recognised
    #[error("Unknown physics configuration key: {0}")]
    UnknownConfigKey(String),

    /// Configuration value has the wrong type for its key
    #[error("Configuration key '{key}' expects a {expected} value")]
    ConfigTypeMismatch {
        key: String,
        expected: &'static str,
    },
}

/// Shape validation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShapeError {
    #[error("polygon needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),

    #[error("polygon supports at most {max} vertices, got {count}")]
    TooManyVertices { count: usize, max: usize },

    #[error("polygon vertices are collinear or too close together")]
    Degenerate,

    #[error("radius must be positive and finite, got {0}")]
    InvalidRadius(f32),

    #[error("edge vertices must be distinct")]
    ZeroLengthEdge,

    #[error("shape contains a non-finite coordinate")]
    NonFinite,
}

/// Result type for physics operations
pub type Result<T> = std::result::Result<T, PhysicsError>;
