//! Penetration recovery, the drop-in end-to-end scenario, push forces on
//! dynamic bodies, and the wander input producer driving the solver.

use nalgebra::Vector3;

use stridesim::sim::agent::{CapsuleExtent, MovementMode};
use stridesim::sim::params::MovementParams;
use stridesim::sim::physics::CollisionWorld;
use stridesim::sim::steering::{self, MoveTarget, WanderParams};
use stridesim::sim::Simulation;

fn slab_world() -> CollisionWorld {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut world = CollisionWorld::new(-980.0);
    world.add_static_box(
        Vector3::new(0.0, 0.0, -50.0),
        Vector3::new(2000.0, 2000.0, 50.0),
    );
    world
}

#[test]
fn test_end_to_end_drop_one_unit_above_floor() {
    // Capsule (42, 96) spawned 1 cm above a flat floor, zero velocity, zero
    // input, gravity -980: falls for one tick, lands, walks, and ends inside
    // the float band at rest.
    let mut sim = Simulation::new(slab_world(), MovementParams::default());
    let id = sim.spawn_agent_falling(Vector3::new(0.0, 0.0, 97.0), CapsuleExtent::new(42.0, 96.0));

    sim.step(0.1);

    let agent = sim.agent(id).unwrap();
    assert_eq!(agent.mode, MovementMode::Walking, "did not land on the first tick");
    assert!(agent.velocity.norm() < 1e-3, "not at rest: {:?}", agent.velocity);
    assert!(
        (1.9..=2.4).contains(&agent.floor.floor_dist),
        "floor dist {} outside the float band",
        agent.floor.floor_dist
    );

    // And it stays put.
    for _ in 0..30 {
        sim.step(1.0 / 30.0);
    }
    let agent = sim.agent(id).unwrap();
    assert_eq!(agent.mode, MovementMode::Walking);
    assert!(agent.velocity.norm() < 1e-3);
}

#[test]
fn test_spawn_overlapping_floor_is_depenetrated() {
    // Spawned with the capsule bottom 5 cm inside the slab; the resolver must
    // pop it out within a bounded number of attempts, with no residual
    // overlap and the agent settled in the band.
    let mut sim = Simulation::new(slab_world(), MovementParams::default());
    let capsule = CapsuleExtent::new(42.0, 96.0);
    let id = sim.spawn_agent(Vector3::new(0.0, 0.0, 91.0), capsule);

    for _ in 0..5 {
        sim.step(1.0 / 30.0);
    }

    let agent = sim.agent(id).unwrap();
    assert!(
        !sim.world().overlap_test(&capsule, agent.position, 0.0),
        "agent still overlapping at {:?}",
        agent.position
    );
    assert_eq!(agent.mode, MovementMode::Walking);
    assert!(
        (1.9..=2.4).contains(&agent.floor.floor_dist),
        "floor dist {} outside the float band",
        agent.floor.floor_dist
    );
}

#[test]
fn test_walking_into_debris_pushes_it() {
    let mut world = slab_world();
    // A light crate too tall to step over, resting ahead of the agent.
    let (crate_body, _) = world.add_dynamic_box(
        Vector3::new(150.0, 0.0, 35.0),
        Vector3::new(20.0, 20.0, 35.0),
        0.0005,
    );

    let mut sim = Simulation::new(world, MovementParams::default());
    let id = sim.spawn_agent(Vector3::new(0.0, 0.0, 100.0), CapsuleExtent::default());

    let dt = 1.0 / 30.0;
    for _ in 0..60 {
        sim.agent_mut(id).unwrap().acceleration = Vector3::new(2048.0, 0.0, 0.0);
        sim.step(dt);
    }

    let crate_position = sim
        .world()
        .bodies
        .get(crate_body)
        .map(|b| *b.translation())
        .unwrap();
    assert!(
        crate_position.x > 160.0,
        "crate was never pushed: {crate_position:?}"
    );
}

#[test]
fn test_push_forces_disabled_by_config() {
    let mut world = slab_world();
    let (crate_body, _) = world.add_dynamic_box(
        Vector3::new(150.0, 0.0, 35.0),
        Vector3::new(20.0, 20.0, 35.0),
        0.0005,
    );
    let params = MovementParams {
        enable_physics_interaction: false,
        ..MovementParams::default()
    };

    let mut sim = Simulation::new(world, params);
    let id = sim.spawn_agent(Vector3::new(0.0, 0.0, 100.0), CapsuleExtent::default());

    let dt = 1.0 / 30.0;
    for _ in 0..60 {
        sim.agent_mut(id).unwrap().acceleration = Vector3::new(2048.0, 0.0, 0.0);
        sim.step(dt);
    }

    let crate_position = sim
        .world()
        .bodies
        .get(crate_body)
        .map(|b| *b.translation())
        .unwrap();
    assert!(
        (crate_position.x - 150.0).abs() < 1.0,
        "crate moved with physics interaction disabled: {crate_position:?}"
    );
}

#[test]
fn test_wander_steering_drives_walking_batch() {
    let mut sim = Simulation::new(slab_world(), MovementParams::default());
    let wander = WanderParams::default();

    let mut ids = Vec::new();
    let mut targets = Vec::new();
    let mut homes = Vec::new();
    for i in 0..8 {
        let home = Vector3::new(-400.0 + 100.0 * i as f32, 120.0 * (i % 3) as f32, 100.0);
        let id = sim.spawn_agent(home, CapsuleExtent::default());
        ids.push(id);
        homes.push(home);
        targets.push(MoveTarget::at(home));
    }

    let dt = 1.0 / 30.0;
    let max_accel = sim.params().max_acceleration;
    let mut rng = rand::thread_rng();
    for _ in 0..150 {
        for ((id, target), home) in ids.iter().zip(targets.iter_mut()).zip(homes.iter()) {
            let agent = sim.agent_mut(*id).unwrap();
            let position = agent.position;
            steering::update_wander_target(target, position, *home, &wander, &mut rng);
            agent.acceleration = steering::acceleration_toward(target, position, max_accel);
        }
        sim.step(dt);
    }

    for (id, home) in ids.iter().zip(homes.iter()) {
        let agent = sim.agent(*id).unwrap();
        assert_eq!(agent.mode, MovementMode::Walking, "agent {id} left the ground");
        assert!(
            (1.9..=2.4).contains(&agent.floor.floor_dist),
            "agent {id} floor dist {} outside the band",
            agent.floor.floor_dist
        );
        // Wandering stays inside the home square plus slack.
        let offset = agent.position - home;
        assert!(
            offset.x.abs() < wander.move_dist_max + 100.0
                && offset.y.abs() < wander.move_dist_max + 100.0,
            "agent {id} wandered away: {offset:?}"
        );
    }
}

#[test]
fn test_despawn_removes_agent() {
    let mut sim = Simulation::new(slab_world(), MovementParams::default());
    let a = sim.spawn_agent(Vector3::new(0.0, 0.0, 100.0), CapsuleExtent::default());
    let b = sim.spawn_agent(Vector3::new(100.0, 0.0, 100.0), CapsuleExtent::default());
    assert_eq!(sim.agents().len(), 2);

    assert!(sim.despawn_agent(a));
    assert!(!sim.despawn_agent(a));
    assert_eq!(sim.agents().len(), 1);
    assert!(sim.agent(b).is_some());

    sim.step(1.0 / 30.0);
    assert_eq!(sim.agents().len(), 1);
}
