//! Void Physics 2D - rigid-body simulation core
//!
//! A self-contained 2D physics engine for the Void Engine: bodies carry
//! fixtures, the broadphase pairs fixtures into contacts, contacts and joints
//! are grouped into islands and each island is solved with sequential
//! impulses.
//!
//! # Features
//!
//! - Static, kinematic, kinematic-controller and dynamic bodies
//! - Circle, convex polygon and edge shapes
//! - Sensors and layer/mask collision filtering
//! - Distance, revolute, weld and friction joints, breakable on demand
//! - Joint relay onto containing bodies
//! - Island sleeping with atomic wake-up
//! - Persistent contacts with warm starting
//! - Parallel island solve (`parallel` feature)
//! - Collide behaviors and channel-based event fan-out
//! - AABB, point and ray queries
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    PhysicsWorld                      │
//! │  ┌────────┐  ┌──────────┐  ┌────────┐  ┌──────────┐  │
//! │  │ Bodies │  │ Fixtures │  │ Joints │  │ Queries  │  │
//! │  └────────┘  └──────────┘  └────────┘  └──────────┘  │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │ ContactManager (broadphase tree + contacts)    │  │
//! │  └────────────────────────────────────────────────┘  │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │ IslandManager (pooled islands, solver copies)  │  │
//! │  └────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────┘
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!     ┌───────────┐  ┌───────────┐  ┌───────────┐
//!     │  Events   │  │ Behaviors │  │  Config   │
//!     └───────────┘  └───────────┘  └───────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use void_physics2d::prelude::*;
//!
//! let mut physics = PhysicsWorld::new(PhysicsConfig::default())?;
//!
//! let floor = physics.create_body(BodyDesc::fixed());
//! physics.create_fixture(floor, FixtureDesc::new(Shape::boxed(10.0, 0.5)?))?;
//!
//! let ball = physics.create_body(BodyDesc::dynamic().with_position(0.0, 5.0));
//! physics.create_fixture(ball, FixtureDesc::new(Shape::circle(0.5)?))?;
//!
//! physics.step();
//! ```

pub mod arena;
pub mod behavior;
pub mod body;
pub mod broadphase;
pub mod config;
pub mod contact;
pub mod contact_manager;
pub mod error;
pub mod events;
pub mod fixture;
pub mod island;
pub mod joint;
pub mod layers;
pub mod material;
pub mod narrowphase;
pub mod query;
pub mod shape;
pub mod solver;
pub mod world;

pub mod prelude {
    //! Common imports for physics functionality
    pub use crate::behavior::{
        BehaviorCommands, BehaviorError, BehaviorHandle, CollideBehavior, ContactInfo, PreSolveResponse,
    };
    pub use crate::body::{Body, BodyDesc, BodyHandle, BodyType};
    pub use crate::config::{ConfigValue, PhysicsConfig};
    pub use crate::contact::{Contact, ContactHandle};
    pub use crate::error::{PhysicsError, Result, ShapeError};
    pub use crate::events::PhysicsEvent;
    pub use crate::fixture::{Fixture, FixtureDesc, FixtureHandle};
    pub use crate::joint::{ContainerMap, ContainerQuery, JointDesc, JointHandle, JointParams, JointType};
    pub use crate::layers::{CollisionGroups, CollisionLayer, CollisionMatrix};
    pub use crate::material::{CombineRule, PhysicsMaterial};
    pub use crate::query::{RaycastHit, RaycastOptions};
    pub use crate::shape::{Polygon, Shape, ShapeType};
    pub use crate::world::{PhysicsWorld, StepStats};
    pub use void_math2d::{Vec2, AABB};
}

pub use prelude::*;
