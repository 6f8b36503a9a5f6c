//! Scenario tests for void_physics2d
//!
//! End-to-end simulations through the public world API

use approx::assert_abs_diff_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use void_physics2d::prelude::*;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn new_world(config: PhysicsConfig) -> PhysicsWorld {
    init_logger();
    PhysicsWorld::new(config).unwrap()
}

fn zero_gravity() -> PhysicsWorld {
    new_world(PhysicsConfig::default().with_gravity(0.0, 0.0))
}

fn add_floor(world: &mut PhysicsWorld) -> (BodyHandle, FixtureHandle) {
    let floor = world.create_body(BodyDesc::fixed().with_position(0.0, -0.5));
    let fixture = world
        .create_fixture(floor, FixtureDesc::new(Shape::boxed(20.0, 0.5).unwrap()).with_friction(0.6))
        .unwrap();
    (floor, fixture)
}

fn add_ball(world: &mut PhysicsWorld, x: f32, y: f32) -> BodyHandle {
    let ball = world.create_body(BodyDesc::dynamic().with_position(x, y));
    world
        .create_fixture(ball, FixtureDesc::new(Shape::circle(0.5).unwrap()))
        .unwrap();
    ball
}

// ==================== Contacts ====================

#[test]
fn test_head_on_circles_swap_velocities() {
    let mut world = zero_gravity();
    let a = world.create_body(
        BodyDesc::dynamic()
            .with_position(0.0, 0.0)
            .with_linear_velocity(5.0, 0.0)
            .with_mass(1.0),
    );
    let b = world.create_body(BodyDesc::dynamic().with_position(1.0, 0.0).with_mass(1.0));
    for body in [a, b] {
        world
            .create_fixture(
                body,
                FixtureDesc::new(Shape::circle(0.5).unwrap())
                    .with_friction(0.0)
                    .with_restitution(1.0),
            )
            .unwrap();
    }

    world.step();

    let va = world.body(a).unwrap().linear_velocity();
    let vb = world.body(b).unwrap().linear_velocity();
    assert_abs_diff_eq!(va.x, 0.0, epsilon = 0.05);
    assert_abs_diff_eq!(vb.x, 5.0, epsilon = 0.05);
    assert_abs_diff_eq!(va.y, 0.0, epsilon = 1e-4);
    assert_abs_diff_eq!(vb.y, 0.0, epsilon = 1e-4);
    assert_eq!(world.collision_begins().count(), 1);
}

#[test]
fn test_box_settles_on_static_floor() {
    let mut world = new_world(PhysicsConfig::default());
    add_floor(&mut world);
    let body = world.create_body(BodyDesc::dynamic().with_position(0.0, 3.0));
    world
        .create_fixture(body, FixtureDesc::new(Shape::boxed(0.5, 0.5).unwrap()))
        .unwrap();

    for _ in 0..300 {
        world.step();
        let y = world.body(body).unwrap().position().y;
        assert!(y > 0.4, "box fell through the floor: y = {}", y);
    }

    let y = world.body(body).unwrap().position().y;
    let penetration = 0.5 - y;
    assert!(penetration < 0.01, "penetration {} too deep", penetration);
    assert!(y < 0.55, "box floating at {}", y);
}

#[test]
fn test_fast_ball_does_not_tunnel_with_substeps() {
    let config = PhysicsConfig::default()
        .with_gravity(0.0, 0.0)
        .with_tick_rate(20.0)
        .with_target_min_tickrate(120.0);
    let mut world = new_world(config);
    assert_eq!(world.substep_count(), 6);

    let wall = world.create_body(BodyDesc::fixed().with_position(5.0, 0.0));
    world
        .create_fixture(wall, FixtureDesc::new(Shape::boxed(0.25, 5.0).unwrap()))
        .unwrap();
    let ball = world.create_body(BodyDesc::dynamic().with_linear_velocity(40.0, 0.0));
    world
        .create_fixture(ball, FixtureDesc::new(Shape::circle(0.25).unwrap()))
        .unwrap();

    for _ in 0..10 {
        world.step();
    }
    assert!(world.body(ball).unwrap().position().x < 5.0);
}

#[test]
fn test_sensor_reports_without_blocking() {
    let mut world = new_world(PhysicsConfig::default());
    let zone = world.create_body(BodyDesc::fixed());
    let zone_fixture = world
        .create_fixture(zone, FixtureDesc::new(Shape::boxed(5.0, 0.5).unwrap()).sensor())
        .unwrap();
    let ball = add_ball(&mut world, 0.0, 2.0);
    let events = world.subscribe();

    for _ in 0..120 {
        world.step();
    }

    assert!(world.body(ball).unwrap().position().y < -2.0);
    let received: Vec<PhysicsEvent> = events.try_iter().collect();
    let began = received.iter().any(|e| {
        matches!(e, PhysicsEvent::CollisionBegin { fixture_a, fixture_b, .. }
            if *fixture_a == zone_fixture || *fixture_b == zone_fixture)
    });
    let ended = received.iter().any(|e| {
        matches!(e, PhysicsEvent::CollisionEnd { fixture_a, fixture_b, .. }
            if *fixture_a == zone_fixture || *fixture_b == zone_fixture)
    });
    assert!(began && ended);
}

#[test]
fn test_layer_filter_lets_bodies_pass() {
    let mut world = new_world(PhysicsConfig::default());
    let (_, floor_fixture) = add_floor(&mut world);
    world
        .set_fixture_groups(
            floor_fixture,
            CollisionGroups::from_layer(CollisionLayer::WALLS, &[CollisionLayer::MOBS]),
        )
        .unwrap();

    let item = world.create_body(BodyDesc::dynamic().with_position(0.0, 1.0));
    world
        .create_fixture(
            item,
            FixtureDesc::new(Shape::circle(0.25).unwrap())
                .with_groups(CollisionGroups::from_layer(CollisionLayer::ITEMS, &[CollisionLayer::WALLS])),
        )
        .unwrap();

    for _ in 0..60 {
        world.step();
    }
    assert!(world.body(item).unwrap().position().y < -1.0);
}

// ==================== Joints ====================

#[test]
fn test_relay_follows_outermost_container() {
    let mut world = zero_gravity();
    let anchor = world.create_body(BodyDesc::fixed());
    let item = add_ball(&mut world, 2.0, 0.0);
    let bag = add_ball(&mut world, 10.0, 0.0);
    let chest = add_ball(&mut world, 20.0, 0.0);
    let joint = world.create_joint(JointDesc::distance(anchor, item)).unwrap();

    let mut containers = ContainerMap::new();
    containers.insert(item, bag);
    world.refresh_relay(item, None, &containers).unwrap();
    assert_eq!(world.joint(joint).unwrap().effective_bodies(), (anchor, bag));

    containers.insert(bag, chest);
    world.refresh_relay(item, None, &containers).unwrap();
    assert_eq!(world.joint(joint).unwrap().effective_bodies(), (anchor, chest));
    assert!(world.body(chest).unwrap().relayed_bodies().any(|b| b == item));
    assert_eq!(world.body(bag).unwrap().relayed_bodies().count(), 0);

    containers.remove(bag);
    world.refresh_relay(item, None, &containers).unwrap();
    assert_eq!(world.joint(joint).unwrap().effective_bodies(), (anchor, bag));
    assert_eq!(world.joint(joint).unwrap().bodies(), (anchor, item));

    // Destroying the relay target falls back to the declared body
    world.destroy_body(bag).unwrap();
    assert_eq!(world.joint(joint).unwrap().effective_bodies(), (anchor, item));
    assert_eq!(world.body(item).unwrap().relay_target(), None);
}

#[test]
fn test_explicit_relay_target_wins() {
    let mut world = zero_gravity();
    let anchor = world.create_body(BodyDesc::fixed());
    let item = add_ball(&mut world, 2.0, 0.0);
    let bag = add_ball(&mut world, 10.0, 0.0);
    let cart = add_ball(&mut world, 30.0, 0.0);
    let joint = world.create_joint(JointDesc::distance(anchor, item)).unwrap();

    let mut containers = ContainerMap::new();
    containers.insert(item, bag);
    world.refresh_relay(item, Some(cart), &containers).unwrap();
    assert_eq!(world.joint(joint).unwrap().effective_bodies(), (anchor, cart));

    world.refresh_relay(item, None, &()).unwrap();
    assert_eq!(world.joint(joint).unwrap().effective_bodies(), (anchor, item));
}

#[test]
fn test_pendulum_keeps_its_length() {
    let mut world = new_world(PhysicsConfig::default());
    let pivot = world.create_body(BodyDesc::fixed().with_position(0.0, 10.0));
    let bob = add_ball(&mut world, 3.0, 10.0);
    world
        .create_joint(JointDesc::revolute(pivot, bob).with_anchors(Vec2::ZERO, Vec2::new(-3.0, 0.0)))
        .unwrap();

    for _ in 0..240 {
        world.step();
        let distance = world.body(bob).unwrap().position().distance(Vec2::new(0.0, 10.0));
        assert_abs_diff_eq!(distance, 3.0, epsilon = 0.05);
    }
}

#[test]
fn test_breakable_joint_snaps_under_load() {
    let mut world = new_world(PhysicsConfig::default());
    let ceiling = world.create_body(BodyDesc::fixed().with_position(0.0, 10.0));
    let weight = world.create_body(BodyDesc::dynamic().with_position(0.0, 8.0).with_mass(50.0));
    world
        .create_fixture(weight, FixtureDesc::new(Shape::boxed(0.5, 0.5).unwrap()))
        .unwrap();
    let rope = world
        .create_joint(JointDesc::distance(ceiling, weight).with_break_impulse(1.0))
        .unwrap();

    let mut broken = false;
    for _ in 0..10 {
        world.step();
        if world
            .events()
            .iter()
            .any(|e| matches!(e, PhysicsEvent::JointBroken { joint, .. } if *joint == rope))
        {
            broken = true;
            break;
        }
    }

    assert!(broken);
    assert!(world.joint(rope).is_none());
    assert_eq!(world.joint_count(), 0);
    assert!(world.body(ceiling).unwrap().joints().is_empty());
    assert!(world.body(weight).unwrap().joints().is_empty());
}

#[test]
fn test_jointed_bodies_skip_collision_unless_asked() {
    let mut world = zero_gravity();
    let a = add_ball(&mut world, 0.0, 0.0);
    let b = add_ball(&mut world, 0.6, 0.0);
    let anchors = (Vec2::new(0.3, 0.0), Vec2::new(-0.3, 0.0));
    let joint = world
        .create_joint(JointDesc::weld(a, b).with_anchors(anchors.0, anchors.1))
        .unwrap();

    world.step();
    assert_eq!(world.contact_count(), 0);

    world.destroy_joint(joint).unwrap();
    world
        .create_joint(
            JointDesc::weld(a, b)
                .with_anchors(anchors.0, anchors.1)
                .with_collide_connected(true),
        )
        .unwrap();
    world.step();
    assert_eq!(world.contact_count(), 1);
}

// ==================== Behaviors & Events ====================

struct OneWayPlatform;

impl CollideBehavior for OneWayPlatform {
    fn pre_solve(
        &mut self,
        _info: &ContactInfo,
        _commands: &mut BehaviorCommands,
    ) -> std::result::Result<PreSolveResponse, BehaviorError> {
        Ok(PreSolveResponse::Cancel)
    }
}

struct CountingBehavior {
    begins: Arc<AtomicUsize>,
    ends: Arc<AtomicUsize>,
}

impl CollideBehavior for CountingBehavior {
    fn collide_begin(
        &mut self,
        _info: &ContactInfo,
        _commands: &mut BehaviorCommands,
    ) -> std::result::Result<(), BehaviorError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn collide_end(
        &mut self,
        _info: &ContactInfo,
        _commands: &mut BehaviorCommands,
    ) -> std::result::Result<(), BehaviorError> {
        self.ends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct PanickingBehavior;

impl CollideBehavior for PanickingBehavior {
    fn collide_begin(
        &mut self,
        _info: &ContactInfo,
        _commands: &mut BehaviorCommands,
    ) -> std::result::Result<(), BehaviorError> {
        panic!("behavior blew up");
    }
}

struct Bouncer;

impl CollideBehavior for Bouncer {
    fn collide_begin(
        &mut self,
        info: &ContactInfo,
        commands: &mut BehaviorCommands,
    ) -> std::result::Result<(), BehaviorError> {
        commands.apply_linear_impulse(info.other_body, Vec2::new(0.0, 20.0));
        Ok(())
    }
}

#[test]
fn test_pre_solve_cancel_makes_platform_one_way() {
    let mut world = new_world(PhysicsConfig::default());
    let (floor, _) = add_floor(&mut world);
    world.register_behavior(floor, OneWayPlatform).unwrap();
    let ball = add_ball(&mut world, 0.0, 1.0);

    for _ in 0..60 {
        world.step();
    }
    assert!(world.body(ball).unwrap().position().y < -1.0);
}

#[test]
fn test_begin_and_end_callbacks_fire_once_per_touch() {
    let mut world = zero_gravity();
    let target = add_ball(&mut world, 0.0, 0.0);
    let begins = Arc::new(AtomicUsize::new(0));
    let ends = Arc::new(AtomicUsize::new(0));
    world
        .register_behavior(
            target,
            CountingBehavior {
                begins: Arc::clone(&begins),
                ends: Arc::clone(&ends),
            },
        )
        .unwrap();

    let mover = world.create_body(BodyDesc::kinematic().with_position(-3.0, 0.0).with_linear_velocity(12.0, 0.0));
    world
        .create_fixture(mover, FixtureDesc::new(Shape::circle(0.5).unwrap()).sensor())
        .unwrap();

    for _ in 0..60 {
        world.step();
    }
    assert_eq!(begins.load(Ordering::SeqCst), 1);
    assert_eq!(ends.load(Ordering::SeqCst), 1);
}

#[test]
fn test_panicking_behavior_does_not_stop_the_tick() {
    let mut world = new_world(PhysicsConfig::default());
    let (floor, _) = add_floor(&mut world);
    world.register_behavior(floor, PanickingBehavior).unwrap();
    let ball = add_ball(&mut world, 0.0, 0.6);

    for _ in 0..60 {
        world.step();
    }

    let y = world.body(ball).unwrap().position().y;
    assert!(y > 0.4, "ball fell through at {}", y);
    assert!(world.collision_begins().count() <= 1);
    assert_eq!(world.behaviors().len(), 1);
}

#[test]
fn test_behavior_commands_apply_after_the_pass() {
    let mut world = new_world(PhysicsConfig::default());
    let (floor, _) = add_floor(&mut world);
    world.register_behavior(floor, Bouncer).unwrap();
    let ball = add_ball(&mut world, 0.0, 0.6);

    let mut launched = false;
    for _ in 0..30 {
        world.step();
        if world.body(ball).unwrap().linear_velocity().y > 5.0 {
            launched = true;
            break;
        }
    }
    assert!(launched);
}

#[test]
fn test_prediction_publishes_nothing() {
    let mut world = zero_gravity();
    let events = world.subscribe();
    let a = world.create_body(BodyDesc::dynamic().with_linear_velocity(5.0, 0.0));
    world
        .create_fixture(a, FixtureDesc::new(Shape::circle(0.5).unwrap()))
        .unwrap();
    add_ball(&mut world, 1.0, 0.0);
    // Creation events belong to the next published tick
    world.step();
    let _ = events.try_iter().count();

    let before = world.body(a).unwrap().position();
    world.simulate(1.0 / 60.0, true);

    assert!(events.try_recv().is_err());
    assert!(world.events().is_empty());
    assert!(world.body(a).unwrap().position() != before);
}

// ==================== Configuration ====================

#[test]
fn test_config_from_json_drives_substeps() {
    let json = r#"{
        "gravity": { "x": 0.0, "y": -20.0 },
        "tick_rate": 30.0,
        "target_min_tickrate": 90.0
    }"#;
    let config: PhysicsConfig = serde_json::from_str(json).unwrap();
    let mut world = new_world(config);

    assert_eq!(world.substep_count(), 3);
    assert_eq!(world.gravity(), Vec2::new(0.0, -20.0));
    assert_eq!(world.config().velocity_iterations, PhysicsConfig::default().velocity_iterations);

    world.set_config_value("tick_rate", ConfigValue::Float(90.0)).unwrap();
    assert_eq!(world.substep_count(), 1);

    let rejected = world.set_config_value("tick_rate", ConfigValue::Float(-1.0));
    assert!(matches!(rejected, Err(PhysicsError::InvalidConfig(_))));
    assert_eq!(world.config_value("tick_rate"), Some(ConfigValue::Float(90.0)));

    assert!(matches!(
        world.set_config_value("warp_factor", ConfigValue::Int(9)),
        Err(PhysicsError::UnknownConfigKey(_))
    ));
    assert!(matches!(
        world.set_config_value("sleep_allowed", ConfigValue::Float(1.0)),
        Err(PhysicsError::ConfigTypeMismatch { .. })
    ));
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = PhysicsConfig {
        velocity_iterations: 0,
        ..Default::default()
    };
    assert!(matches!(PhysicsWorld::new(config), Err(PhysicsError::InvalidConfig(_))));
}

// ==================== Errors & Queries ====================

#[test]
fn test_precondition_violations_fail_fast() {
    let mut world = zero_gravity();
    let body = add_ball(&mut world, 0.0, 0.0);

    let degenerate = Shape::Circle {
        center: Vec2::ZERO,
        radius: -1.0,
    };
    assert!(matches!(
        world.create_fixture(body, FixtureDesc::new(degenerate)),
        Err(PhysicsError::InvalidShape(_))
    ));
    assert!(matches!(
        world.create_joint(JointDesc::weld(body, body)),
        Err(PhysicsError::JointSelfConnection(_))
    ));

    world.destroy_body(body).unwrap();
    assert!(matches!(
        world.create_fixture(body, FixtureDesc::new(Shape::circle(1.0).unwrap())),
        Err(PhysicsError::BodyNotFound(_))
    ));
    assert_eq!(world.fixture_count(), 0);
}

#[test]
fn test_ray_cast_and_aabb_query() {
    let mut world = zero_gravity();
    let near = world.create_body(BodyDesc::fixed().with_position(3.0, 0.0));
    world
        .create_fixture(near, FixtureDesc::new(Shape::boxed(0.5, 0.5).unwrap()))
        .unwrap();
    let far = add_ball(&mut world, 8.0, 0.0);

    let hit = world.ray_cast(Vec2::ZERO, Vec2::new(1.0, 0.0), 100.0).unwrap();
    assert_eq!(hit.body, near);
    assert_abs_diff_eq!(hit.point.x, 2.5, epsilon = 1e-3);
    assert_abs_diff_eq!(hit.normal.x, -1.0, epsilon = 1e-3);

    let all = world.ray_cast_all(Vec2::ZERO, Vec2::new(1.0, 0.0), &RaycastOptions::default());
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].body, far);

    assert!(world.ray_cast(Vec2::ZERO, Vec2::new(1.0, 0.0), 2.0).is_none());

    let found = world.query_aabb(&AABB::from_center_half_extents(Vec2::new(8.0, 0.0), Vec2::new(1.0, 1.0)));
    assert_eq!(found, vec![far]);
}

#[test]
fn test_entity_mapping_tracks_bodies() {
    let mut world = zero_gravity();
    let body = world.create_body_for_entity(42, BodyDesc::dynamic());
    assert_eq!(world.body_for_entity(42), Some(body));
    assert_eq!(world.body(body).unwrap().entity(), Some(42));

    world.remove_entity(42).unwrap();
    assert_eq!(world.body_for_entity(42), None);
    assert!(!world.contains_body(body));
}

#[test]
fn test_entity_rebinding_replaces_previous_body() {
    let mut world = zero_gravity();
    let first = world.create_body_for_entity(7, BodyDesc::dynamic());
    let anchor = world.create_body(BodyDesc::fixed().with_position(0.0, 3.0));
    world.create_joint(JointDesc::distance(anchor, first)).unwrap();

    let second = world.create_body_for_entity(7, BodyDesc::dynamic().with_position(1.0, 0.0));
    assert_ne!(first, second);
    assert!(!world.contains_body(first));
    assert_eq!(world.joint_count(), 0);
    assert_eq!(world.body_for_entity(7), Some(second));
    assert_eq!(world.body(second).unwrap().entity(), Some(7));

    // A body destroyed directly releases its entity for a clean rebind
    world.destroy_body(second).unwrap();
    assert_eq!(world.body_for_entity(7), None);
    let third = world.create_body_for_entity(7, BodyDesc::dynamic());
    assert_eq!(world.body_for_entity(7), Some(third));
    assert_eq!(world.body_count(), 2);
}
