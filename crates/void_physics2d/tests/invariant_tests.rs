//! Invariant tests for void_physics2d
//!
//! These tests verify simulation invariants that MUST NEVER be violated

use std::collections::HashSet;
use void_physics2d::prelude::*;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn world(config: PhysicsConfig) -> PhysicsWorld {
    init_logger();
    PhysicsWorld::new(config).expect("valid config")
}

fn add_floor(world: &mut PhysicsWorld) -> BodyHandle {
    let floor = world.create_body(BodyDesc::fixed().with_position(0.0, -0.5));
    world
        .create_fixture(floor, FixtureDesc::new(Shape::boxed(20.0, 0.5).unwrap()).with_friction(0.6))
        .unwrap();
    floor
}

fn add_box(world: &mut PhysicsWorld, x: f32, y: f32) -> BodyHandle {
    let body = world.create_body(BodyDesc::dynamic().with_position(x, y));
    world
        .create_fixture(body, FixtureDesc::new(Shape::boxed(0.5, 0.5).unwrap()).with_friction(0.6))
        .unwrap();
    body
}

fn add_ball(world: &mut PhysicsWorld, desc: BodyDesc, radius: f32) -> BodyHandle {
    let body = world.create_body(desc);
    world
        .create_fixture(body, FixtureDesc::new(Shape::circle(radius).unwrap()))
        .unwrap();
    body
}

fn assert_islands_partition_awake(world: &PhysicsWorld) {
    let awake: HashSet<BodyHandle> = world
        .bodies()
        .filter(|b| b.is_awake() && b.body_type() != BodyType::Static)
        .map(|b| b.handle())
        .collect();

    let mut seen = HashSet::new();
    for island in world.islands().islands() {
        for body in island.bodies() {
            assert!(seen.insert(*body), "body {:?} is in two islands", body);
        }
    }
    assert_eq!(seen, awake);
}

/// Step a stack of `height` boxes until every box sleeps, checking it never
/// diverges or slides off its column
fn settle_stack(height: usize, max_ticks: usize) {
    let mut world = world(PhysicsConfig::default());
    add_floor(&mut world);
    let stack: Vec<BodyHandle> = (0..height)
        .map(|i| add_box(&mut world, 0.0, 0.5 + i as f32))
        .collect();

    for _ in 0..max_ticks {
        world.step();

        for body in &stack {
            let b = world.body(*body).unwrap();
            assert!(b.linear_velocity().is_finite(), "velocity diverged");
            assert!(b.angular_velocity().is_finite(), "spin diverged");
            assert!(b.position().is_finite(), "position diverged");
        }
        assert!(!world.events().iter().any(|e| matches!(e, PhysicsEvent::SolverDiverged(_))));
        assert_islands_partition_awake(&world);

        if stack.iter().all(|b| !world.body(*b).unwrap().is_awake()) {
            for (i, body) in stack.iter().enumerate() {
                let position = world.body(*body).unwrap().position();
                assert!(position.x.abs() < 0.05, "box {} slid to {:?}", i, position);
            }
            assert_eq!(world.island_count(), 0);
            return;
        }
    }
    panic!("stack of {} never fell asleep in {} ticks", height, max_ticks);
}

fn assert_inert_mass(world: &PhysicsWorld, body: BodyHandle) {
    let b = world.body(body).unwrap();
    assert_eq!(b.inv_mass(), 0.0, "{:?} has inverse mass", b.body_type());
    assert_eq!(b.inv_inertia(), 0.0, "{:?} has inverse inertia", b.body_type());
}

/// INVARIANT: Static and kinematic bodies never gain inverse mass
#[test]
fn invariant_inert_bodies_have_zero_inverse_mass() {
    let mut world = world(PhysicsConfig::default());
    let fixed = world.create_body(BodyDesc::fixed());
    let kinematic = world.create_body(BodyDesc::kinematic().with_position(5.0, 0.0));

    for body in [fixed, kinematic] {
        assert_inert_mass(&world, body);

        let circle = world
            .create_fixture(body, FixtureDesc::new(Shape::circle(1.0).unwrap()).with_density(3.0))
            .unwrap();
        assert_inert_mass(&world, body);

        let square = world
            .create_fixture(body, FixtureDesc::new(Shape::boxed(0.5, 2.0).unwrap()))
            .unwrap();
        assert_inert_mass(&world, body);

        world.set_fixture_density(square, 10.0).unwrap();
        assert_inert_mass(&world, body);

        world.destroy_fixture(circle).unwrap();
        assert_inert_mass(&world, body);
    }

    // Converting a dynamic body drops its mass
    let converted = add_box(&mut world, -5.0, 0.0);
    assert!(world.body(converted).unwrap().inv_mass() > 0.0);
    world.set_body_type(converted, BodyType::Static).unwrap();
    assert_inert_mass(&world, converted);
    world.set_body_type(converted, BodyType::Kinematic).unwrap();
    assert_inert_mass(&world, converted);
}

/// INVARIANT: At most one contact exists per fixture pair
#[test]
fn invariant_one_contact_per_fixture_pair() {
    let mut world = world(PhysicsConfig::default().with_gravity(0.0, 0.0));

    // A tight cluster of overlapping circles, created in scrambled order
    let mut bodies = Vec::new();
    for i in [3, 0, 4, 1, 2] {
        let x = i as f32 * 0.5;
        bodies.push(add_ball(&mut world, BodyDesc::dynamic().with_position(x, 0.0), 0.6));
    }
    // A second fixture on one body overlaps the same neighbours
    world
        .create_fixture(bodies[0], FixtureDesc::new(Shape::circle(0.4).unwrap()))
        .unwrap();

    for _ in 0..30 {
        world.step();

        let mut pairs = HashSet::new();
        for contact in world.contacts() {
            let (a, b) = (contact.fixture_a(), contact.fixture_b());
            assert_ne!(a, b);
            let pair = if a < b { (a, b) } else { (b, a) };
            assert!(pairs.insert(pair), "duplicate contact for {:?}", pair);
        }
        assert_eq!(pairs.len(), world.contact_count());
    }
    assert!(world.contact_count() > 0);
}

/// INVARIANT: Islands partition the awake bodies exactly
#[test]
fn invariant_islands_partition_awake_bodies() {
    let mut world = world(PhysicsConfig::default().with_sleep_allowed(false));
    add_floor(&mut world);

    // Two separate stacks
    for x in [-6.0, 6.0] {
        add_box(&mut world, x, 0.5);
        add_box(&mut world, x, 1.5);
    }

    // A jointed pendulum chain hanging from a static anchor
    let anchor = world.create_body(BodyDesc::fixed().with_position(0.0, 10.0));
    let link_a = add_ball(&mut world, BodyDesc::dynamic().with_position(1.0, 10.0), 0.2);
    let link_b = add_ball(&mut world, BodyDesc::dynamic().with_position(2.0, 10.0), 0.2);
    world
        .create_joint(JointDesc::revolute(anchor, link_a).with_anchors(Vec2::new(1.0, 0.0), Vec2::ZERO))
        .unwrap();
    world.create_joint(JointDesc::distance(link_a, link_b)).unwrap();

    // Lone bodies, a kinematic platform and a sleeper far from everything
    add_ball(&mut world, BodyDesc::dynamic().with_position(-15.0, 20.0), 0.5);
    add_ball(&mut world, BodyDesc::kinematic().with_position(15.0, 20.0).with_linear_velocity(1.0, 0.0), 0.5);
    let sleeper = add_ball(&mut world, BodyDesc::dynamic().with_position(0.0, 40.0), 0.5);
    world.set_awake(sleeper, false).unwrap();

    for _ in 0..20 {
        world.step();
        assert_islands_partition_awake(&world);
        assert!(!world.body(sleeper).unwrap().is_awake());
    }
}

/// INVARIANT: Islands never hold bodies that fell asleep during the tick
#[test]
fn invariant_islands_drop_sleeping_bodies() {
    let mut world = world(PhysicsConfig::default());
    add_floor(&mut world);
    let resting = [
        add_box(&mut world, -4.0, 0.5),
        add_box(&mut world, -4.0, 1.5),
        add_ball(&mut world, BodyDesc::dynamic().with_position(4.0, 0.5), 0.5),
    ];
    let drifter = add_ball(
        &mut world,
        BodyDesc::dynamic()
            .with_position(0.0, 30.0)
            .with_gravity_scale(0.0)
            .with_linear_velocity(1.0, 0.0),
        0.5,
    );

    let mut ticks = 0;
    while resting.iter().any(|b| world.body(*b).unwrap().is_awake()) {
        world.step();
        assert_islands_partition_awake(&world);
        ticks += 1;
        assert!(ticks < 1000, "resting bodies never fell asleep");
    }
    assert_eq!(world.island_count(), 1);

    // Putting the last awake body to sleep by hand empties the islands too
    assert!(world.body(drifter).unwrap().is_awake());
    world.set_awake(drifter, false).unwrap();
    assert_islands_partition_awake(&world);
    assert_eq!(world.island_count(), 0);
}

/// INVARIANT: Sleeping a body by hand sleeps everything connected to it
#[test]
fn invariant_manual_sleep_covers_connected_bodies() {
    let mut world = world(PhysicsConfig::default().with_gravity(0.0, 0.0));
    let a = add_ball(&mut world, BodyDesc::dynamic().with_linear_velocity(1.0, 0.0), 0.25);
    let b = add_ball(&mut world, BodyDesc::dynamic().with_position(2.0, 0.0), 0.25);
    let loner = add_ball(&mut world, BodyDesc::dynamic().with_position(0.0, 10.0), 0.25);
    world.create_joint(JointDesc::distance(a, b)).unwrap();
    world.step();

    world.set_awake(a, false).unwrap();
    for body in [a, b] {
        assert!(!world.body(body).unwrap().is_awake());
    }
    assert!(world.body(loner).unwrap().is_awake());
    assert_islands_partition_awake(&world);

    world.step();
    for body in [a, b] {
        assert!(world.events().contains(&PhysicsEvent::BodySlept(body)));
    }

    // Nothing wakes the pair back up on its own
    for _ in 0..10 {
        world.step();
        assert!(!world.body(a).unwrap().is_awake());
        assert!(!world.body(b).unwrap().is_awake());
        assert_islands_partition_awake(&world);
    }
}

/// INVARIANT: A resting stack comes to sleep without diverging
#[test]
fn invariant_resting_stack_falls_asleep() {
    settle_stack(3, 1000);
}

/// INVARIANT: Tall stacks settle and sleep as well
#[test]
fn invariant_tall_stack_falls_asleep() {
    settle_stack(10, 2400);
}

/// INVARIANT: Converged impulses stay put under identical input
#[test]
fn invariant_warm_start_is_stable() {
    let mut world = world(PhysicsConfig::default().with_sleep_allowed(false));
    let floor = add_floor(&mut world);
    let body = add_box(&mut world, 0.0, 0.5);

    for _ in 0..180 {
        world.step();
    }

    let impulses = |world: &PhysicsWorld| -> Vec<f32> {
        let contact = world
            .contacts()
            .find(|c| c.body_a() == floor || c.body_b() == floor)
            .expect("resting contact");
        let manifold = contact.manifold();
        manifold.points[..manifold.point_count]
            .iter()
            .map(|p| p.normal_impulse)
            .collect()
    };

    let before = impulses(&world);
    world.step();
    let after = impulses(&world);

    assert_eq!(before.len(), 2);
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after.iter()) {
        assert!((a - b).abs() < 2e-3, "impulse moved from {} to {}", b, a);
    }

    // Total impulse carries the weight of the box over one tick
    let weight_impulse = world.body(body).unwrap().mass() * 9.81 / 60.0;
    let total: f32 = after.iter().sum();
    assert!((total - weight_impulse).abs() < 0.1 * weight_impulse);
}

/// INVARIANT: Waking one body of a jointed chain wakes the whole chain
#[test]
fn invariant_chain_wakes_atomically() {
    let mut world = world(PhysicsConfig::default().with_gravity(0.0, 0.0));
    let chain: Vec<BodyHandle> = (0..3)
        .map(|i| add_ball(&mut world, BodyDesc::dynamic().with_position(i as f32 * 2.0, 0.0), 0.25))
        .collect();
    world.create_joint(JointDesc::distance(chain[0], chain[1])).unwrap();
    world.create_joint(JointDesc::distance(chain[1], chain[2])).unwrap();

    let all_asleep = |world: &PhysicsWorld| chain.iter().all(|b| !world.body(*b).unwrap().is_awake());
    for _ in 0..200 {
        world.step();
        if all_asleep(&world) {
            break;
        }
    }
    assert!(all_asleep(&world), "chain never fell asleep");

    world.wake_body(chain[0]).unwrap();
    for body in &chain {
        assert!(world.body(*body).unwrap().is_awake());
    }

    world.step();
    for body in &chain {
        assert!(
            world
                .events()
                .iter()
                .any(|e| *e == PhysicsEvent::BodyWoke(*body)),
            "no wake event for {:?}",
            body
        );
    }

    // An impulse at the far end wakes the chain just the same
    for _ in 0..200 {
        world.step();
        if all_asleep(&world) {
            break;
        }
    }
    assert!(all_asleep(&world));
    world.apply_linear_impulse(chain[2], Vec2::new(0.0, 0.1)).unwrap();
    for body in &chain {
        assert!(world.body(*body).unwrap().is_awake());
    }
}

/// INVARIANT: Destroyed handles are never resolved again
#[test]
fn invariant_destroyed_handles_are_not_found() {
    let mut world = world(PhysicsConfig::default());
    let body = add_ball(&mut world, BodyDesc::dynamic(), 0.5);
    let fixture = world.body(body).unwrap().fixtures()[0];
    world.destroy_body(body).unwrap();

    assert!(world.body(body).is_none());
    assert!(world.fixture(fixture).is_none());
    assert!(matches!(
        world.set_linear_velocity(body, Vec2::ONE),
        Err(PhysicsError::BodyNotFound(_))
    ));
    assert!(matches!(world.destroy_body(body), Err(PhysicsError::BodyNotFound(_))));

    // The slot is reused under a new generation
    let replacement = add_ball(&mut world, BodyDesc::dynamic(), 0.5);
    assert_ne!(replacement, body);
    assert!(world.body(body).is_none());
    assert_eq!(world.broadphase_proxy_count(), 1);
}
