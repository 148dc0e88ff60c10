//! Falling scenarios: gravity integration with the apex sub-step, landing
//! transitions, jumps, and base-velocity inheritance from moving platforms.

use nalgebra::Vector3;

use stridesim::sim::agent::{CapsuleExtent, MovementMode};
use stridesim::sim::params::MovementParams;
use stridesim::sim::physics::CollisionWorld;
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
fn test_jump_gravity_integration_and_apex() {
    let mut sim = Simulation::new(slab_world(), MovementParams::default());
    let id = sim.spawn_agent(Vector3::new(0.0, 0.0, 100.0), CapsuleExtent::default());
    assert!(sim.launch_agent(id));
    assert_eq!(sim.agent(id).unwrap().mode, MovementMode::Falling);
    assert_eq!(sim.agent(id).unwrap().velocity.z, 700.0);

    let dt = 1.0 / 30.0;
    let gravity = -980.0;
    let mut elapsed = 0.0f32;
    let mut crossed_apex = false;
    for _ in 0..60 {
        let before = sim.agent(id).unwrap().velocity.z;
        sim.step(dt);
        elapsed += dt;
        let agent = sim.agent(id).unwrap();
        if agent.mode != MovementMode::Falling {
            break;
        }
        let vz = agent.velocity.z;
        if !crossed_apex {
            if before > 0.0 && vz <= 0.0 {
                // The tick containing the apex lands exactly on zero instead
                // of overshooting negative.
                assert_eq!(vz, 0.0, "apex tick overshot: {vz}");
                crossed_apex = true;
            } else {
                // Plain linear gravity integration away from the apex.
                let expected = 700.0 + gravity * elapsed;
                assert!(
                    (vz - expected).abs() < 1e-2,
                    "velocity {vz} diverged from v0 + g*t = {expected}"
                );
            }
        }
    }
    assert!(crossed_apex, "agent never reached the apex");
}

#[test]
fn test_jump_lands_back_in_walking() {
    let mut sim = Simulation::new(slab_world(), MovementParams::default());
    let id = sim.spawn_agent(Vector3::new(0.0, 0.0, 100.0), CapsuleExtent::default());
    let rest_z = sim.agent(id).unwrap().position.z;
    assert!(sim.launch_agent(id));

    let dt = 1.0 / 30.0;
    let mut peak_z = rest_z;
    let mut landed_tick = None;
    for tick in 0..120 {
        sim.step(dt);
        let agent = sim.agent(id).unwrap();
        peak_z = peak_z.max(agent.position.z);
        if agent.mode == MovementMode::Walking {
            landed_tick = Some(tick);
            break;
        }
    }
    let landed_tick = landed_tick.expect("agent never landed");
    // Flight time for a 700 cm/s jump under 980 gravity is ~1.43 s.
    let flight = (landed_tick + 1) as f32 * dt;
    assert!((1.0..2.0).contains(&flight), "implausible flight time {flight}");
    // Apex of the jump is v0^2 / 2g = 250 above the start.
    assert!(
        (peak_z - rest_z - 250.0).abs() < 15.0,
        "implausible jump peak: {peak_z} from {rest_z}"
    );

    let agent = sim.agent(id).unwrap();
    // Vertical velocity is zeroed by the landing transition, same tick.
    assert_eq!(agent.velocity.z, 0.0);
    assert!((agent.position.z - rest_z).abs() < 1.0);
}

#[test]
fn test_drop_landing_transitions_same_tick() {
    let mut sim = Simulation::new(slab_world(), MovementParams::default());
    let id = sim.spawn_agent_falling(Vector3::new(0.0, 0.0, 300.0), CapsuleExtent::default());

    let dt = 1.0 / 30.0;
    let mut prev_mode = MovementMode::Falling;
    for _ in 0..60 {
        sim.step(dt);
        let agent = sim.agent(id).unwrap();
        if agent.mode == MovementMode::Walking {
            // The transition and the vertical-velocity reset happen on the
            // same tick as the landing hit.
            assert_eq!(prev_mode, MovementMode::Falling);
            assert_eq!(agent.velocity.z, 0.0);
            return;
        }
        assert!(agent.velocity.z < 0.0, "drop never accelerated downward");
        prev_mode = agent.mode;
    }
    panic!("agent never landed");
}

#[test]
fn test_air_control_drifts_lateral_position() {
    let mut sim = Simulation::new(slab_world(), MovementParams::default());
    let id = sim.spawn_agent(Vector3::new(0.0, 0.0, 100.0), CapsuleExtent::default());
    assert!(sim.launch_agent(id));

    let dt = 1.0 / 30.0;
    for _ in 0..20 {
        sim.agent_mut(id).unwrap().acceleration = Vector3::new(2048.0, 0.0, 0.0);
        sim.step(dt);
        if sim.agent(id).unwrap().mode == MovementMode::Walking {
            break;
        }
    }
    let agent = sim.agent(id).unwrap();
    // Air control moves the agent, but far less than ground acceleration
    // would over the same window.
    assert!(agent.position.x > 5.0, "no air control: x={}", agent.position.x);
    assert!(agent.position.x < 300.0, "air control too strong: x={}", agent.position.x);
}

#[test]
fn test_leaving_moving_platform_inherits_velocity() {
    let mut world = slab_world();
    let (platform_body, _platform_collider) = world.add_kinematic_platform(
        Vector3::new(0.0, 0.0, 100.0),
        Vector3::new(150.0, 150.0, 10.0),
    );

    let mut sim = Simulation::new(world, MovementParams::default());
    if let Some(body) = sim.world_mut().bodies.get_mut(platform_body) {
        body.set_linvel(Vector3::new(120.0, 0.0, 0.0), true);
    }

    // Settle on top of the platform (top face at z = 110).
    let id = sim.spawn_agent(Vector3::new(0.0, 0.0, 230.0), CapsuleExtent::default());
    let agent = sim.agent(id).unwrap();
    assert!(agent.floor.is_walkable_floor());
    assert!((agent.position.z - 208.0).abs() < 1.0, "not on platform: {}", agent.position.z);

    assert!(sim.launch_agent(id));
    let velocity = sim.agent(id).unwrap().velocity;
    // Base velocity imparted on leaving the ground.
    assert!((velocity.x - 120.0).abs() < 1.0, "platform velocity not imparted: {velocity:?}");
    assert_eq!(velocity.z, 700.0);
}

#[test]
fn test_wall_hit_while_falling_deflects() {
    let mut world = slab_world();
    // A tall wall ahead of the jump arc.
    world.add_static_box(
        Vector3::new(150.0, 0.0, 250.0),
        Vector3::new(10.0, 500.0, 250.0),
    );

    let mut sim = Simulation::new(world, MovementParams::default());
    let id = sim.spawn_agent(Vector3::new(0.0, 0.0, 100.0), CapsuleExtent::default());
    // Launch with lateral speed toward the wall.
    sim.agent_mut(id).unwrap().velocity = Vector3::new(400.0, 0.0, 0.0);
    assert!(sim.launch_agent(id));

    let dt = 1.0 / 30.0;
    for _ in 0..120 {
        sim.step(dt);
        let agent = sim.agent(id).unwrap();
        // Never tunnel through the wall (face at x = 140, radius 42).
        assert!(agent.position.x <= 98.5, "penetrated the wall: {}", agent.position.x);
        if agent.mode == MovementMode::Walking {
            return;
        }
    }
    panic!("agent never came back down");
}
