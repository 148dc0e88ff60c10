//! Per-agent locomotion: mode dispatch, Walking/Falling transitions, and the
//! bookkeeping both modes share.
//!
//! Every routine here is a pure function over one agent's mutable state plus
//! the shared read-only parameter record and the frozen collision world, so
//! the batch pass can run agents on worker threads with no locking.

pub mod falling;
pub mod floor;
pub mod impact;
pub mod sweeps;
pub mod walking;

use crossbeam_channel::Sender;
use log::{debug, trace};
use nalgebra::Vector3;

use super::agent::{AgentState, FloorResult, MovementMode};
use super::constants::movement as consts;
use super::params::MovementParams;
use super::physics::{CollisionWorld, HitResult};
use impact::WorldCommand;
use rapier3d::prelude::ColliderHandle;

/// Everything a locomotion routine may touch besides the agent itself: the
/// frozen world, the shared parameters, and the deferred command queue for
/// writes that must wait for the parallel pass to finish.
pub struct MoveContext<'a> {
    pub world: &'a CollisionWorld,
    pub params: &'a MovementParams,
    pub commands: &'a Sender<WorldCommand>,
}

/// Advances one agent by `dt`. Called once per agent per tick from the
/// parallel batch pass.
pub fn update_agent(agent: &mut AgentState, ctx: &MoveContext<'_>, dt: f32) {
    if dt < consts::MIN_TICK_TIME {
        return;
    }
    let mut iterations = 0;
    start_new_physics(agent, ctx, dt, &mut iterations);
    save_base_pose(agent, ctx);

    // Orientation follows the movement direction; yaw only.
    if size_2d_squared(&agent.velocity) > consts::EPSILON {
        agent.yaw = agent.velocity.y.atan2(agent.velocity.x);
    }
}

/// Settles a freshly spawned agent: scan deep for a floor and rest the
/// capsule on it when one exists, otherwise let the first tick start a fall.
pub fn initialize_agent(agent: &mut AgentState, ctx: &MoveContext<'_>) {
    agent.mode = MovementMode::Walking;
    let scan_dist = ctx.params.max_floor_trace_dist;
    let position = agent.position;
    let deep = floor::compute_floor_dist(
        &agent.capsule,
        ctx,
        position,
        scan_dist,
        scan_dist,
        agent.capsule.radius,
        None,
    );
    if deep.is_walkable_floor() {
        let target = (super::constants::floor::MIN_FLOOR_DIST
            + super::constants::floor::MAX_FLOOR_DIST)
            * 0.5;
        let adjust = target - deep.floor_dist;
        let _ = sweeps::safe_move(agent, ctx, Vector3::new(0.0, 0.0, adjust));
        let position = agent.position;
        agent.floor = floor::find_floor(agent, ctx, position, false, None);
        set_base_from_floor(agent, ctx);
        agent.just_teleported = false;
    } else {
        agent.force_next_floor_check = true;
    }
}

/// Runs the handler for the current mode. Re-entered when a mode switch
/// leaves part of the tick unconsumed; `iterations` bounds the recursion.
pub(crate) fn start_new_physics(
    agent: &mut AgentState,
    ctx: &MoveContext<'_>,
    dt: f32,
    iterations: &mut u32,
) {
    if dt < consts::MIN_TICK_TIME || *iterations >= consts::MAX_SIMULATION_ITERATIONS {
        return;
    }
    match agent.mode {
        MovementMode::None => {}
        MovementMode::Walking => walking::simulate(agent, ctx, dt, iterations),
        MovementMode::Falling => falling::simulate(agent, ctx, dt, iterations),
    }
}

/// The single place mode flips happen; all mode-dependent side effects live
/// in `on_movement_mode_changed`.
pub(crate) fn set_movement_mode(
    agent: &mut AgentState,
    ctx: &MoveContext<'_>,
    new_mode: MovementMode,
) {
    let previous = agent.mode;
    if previous == new_mode {
        return;
    }
    agent.mode = new_mode;
    trace!("agent {}: {:?} -> {:?}", agent.id, previous, new_mode);
    on_movement_mode_changed(agent, ctx, previous);
}

fn on_movement_mode_changed(
    agent: &mut AgentState,
    ctx: &MoveContext<'_>,
    _previous: MovementMode,
) {
    match agent.mode {
        MovementMode::Walking => {
            // Walking uses only XY velocity and needs a current floor and base.
            agent.velocity.z = 0.0;
            let position = agent.position;
            agent.floor = floor::find_floor(agent, ctx, position, false, None);
            walking::adjust_floor_height(agent, ctx);
            set_base_from_floor(agent, ctx);
        }
        _ => {
            if agent.mode == MovementMode::Falling {
                // Leaving a moving platform keeps its momentum.
                let imparted = imparted_base_velocity(agent, ctx);
                agent.velocity += imparted;
            }
            agent.floor.clear();
            set_base(agent, ctx, None);
        }
    }
}

/// Transition into Falling when ledge rules allow it. Returns true when the
/// fall was taken (or would be allowed), letting the walking loop bail out.
#[allow(clippy::too_many_arguments)]
pub(crate) fn check_fall(
    agent: &mut AgentState,
    ctx: &MoveContext<'_>,
    delta: Vector3<f32>,
    old_location: Vector3<f32>,
    remaining_time: f32,
    time_tick: f32,
    must_fall: bool,
    iterations: &mut u32,
) -> bool {
    if must_fall || ctx.params.can_walk_off_ledges {
        if agent.mode == MovementMode::Walking {
            start_falling(agent, ctx, remaining_time, time_tick, delta, old_location, iterations);
        }
        return true;
    }
    false
}

pub(crate) fn start_falling(
    agent: &mut AgentState,
    ctx: &MoveContext<'_>,
    remaining_time: f32,
    time_tick: f32,
    delta: Vector3<f32>,
    sub_location: Vector3<f32>,
    iterations: &mut u32,
) {
    // Credit back the part of the tick the ground move did not use.
    let desired_dist = delta.norm();
    let remaining = if desired_dist < consts::EPSILON {
        0.0
    } else {
        let travelled = size_2d(&(agent.position - sub_location));
        remaining_time + time_tick * (1.0 - (travelled / desired_dist).min(1.0))
    };
    if agent.mode == MovementMode::Walking {
        set_movement_mode(agent, ctx, MovementMode::Falling);
    }
    start_new_physics(agent, ctx, remaining, iterations);
}

/// A falling agent touched down on a confirmed landing spot.
pub(crate) fn process_landed(
    agent: &mut AgentState,
    ctx: &MoveContext<'_>,
    hit: &HitResult,
    remaining_time: f32,
    iterations: &mut u32,
) {
    if agent.mode == MovementMode::Falling {
        let pre_impact_accel =
            agent.acceleration + Vector3::new(0.0, 0.0, ctx.params.gravity_z);
        let pre_impact_velocity = agent.velocity;
        set_movement_mode(agent, ctx, MovementMode::Walking);
        impact::apply_impact_physics_forces(ctx, hit, &pre_impact_accel, &pre_impact_velocity);
    }
    start_new_physics(agent, ctx, remaining_time, iterations);
}

/// Blocking contact notification; feeds the push-force dispatcher.
pub(crate) fn handle_impact(
    agent: &AgentState,
    ctx: &MoveContext<'_>,
    hit: &HitResult,
    _time_slice: f32,
    _move_delta: &Vector3<f32>,
) {
    let gravity_term = if agent.mode == MovementMode::Falling {
        Vector3::new(0.0, 0.0, ctx.params.gravity_z)
    } else {
        Vector3::zeros()
    };
    let accel = agent.acceleration + gravity_term;
    impact::apply_impact_physics_forces(ctx, hit, &accel, &agent.velocity);
}

/// All recovery attempts failed; keep the pose but do not let the failed
/// displacement contaminate the velocity estimate.
pub(crate) fn on_stuck_in_geometry(agent: &mut AgentState) {
    debug!("agent {} stuck in geometry, skipping velocity update", agent.id);
    agent.just_teleported = true;
}

/// Restore the pre-move pose after a rejected ground move. With `fail_move`
/// the whole move is abandoned and the agent stops.
pub(crate) fn revert_move(
    agent: &mut AgentState,
    ctx: &MoveContext<'_>,
    old_location: Vector3<f32>,
    old_base: Option<ColliderHandle>,
    old_floor: &FloorResult,
    fail_move: bool,
) {
    agent.position = old_location;
    agent.just_teleported = false;
    let base_usable = match old_base {
        Some(handle) => match ctx.world.collider_pose(handle) {
            Some(pose) => {
                !ctx.world.is_moving_base(handle)
                    || poses_match(&pose, &agent.based.old_base_pose)
            }
            None => false,
        },
        None => false,
    };
    if base_usable {
        agent.floor = *old_floor;
        set_base(agent, ctx, old_base);
    } else {
        set_base(agent, ctx, None);
    }
    if fail_move {
        debug!("agent {}: move failed, stopping", agent.id);
        agent.velocity = Vector3::zeros();
        agent.acceleration = Vector3::zeros();
    }
}

pub(crate) fn set_base(
    agent: &mut AgentState,
    ctx: &MoveContext<'_>,
    new_base: Option<ColliderHandle>,
) {
    if agent.based.base == new_base {
        return;
    }
    agent.based.base = new_base;
    if new_base.is_some() {
        save_base_pose(agent, ctx);
    } else {
        agent.floor.clear();
    }
}

pub(crate) fn set_base_from_floor(agent: &mut AgentState, ctx: &MoveContext<'_>) {
    if agent.floor.is_walkable_floor() {
        let base = agent.floor.hit.collider;
        set_base(agent, ctx, base);
    } else {
        set_base(agent, ctx, None);
    }
}

/// Record the base pose so the next tick can tell whether it moved.
pub(crate) fn save_base_pose(agent: &mut AgentState, ctx: &MoveContext<'_>) {
    if let Some(handle) = agent.based.base {
        if let Some(pose) = ctx.world.collider_pose(handle) {
            agent.based.old_base_pose = pose;
        }
    }
}

/// Velocity inherited from the surface being stood on, filtered by the
/// per-axis impart flags.
pub(crate) fn imparted_base_velocity(agent: &AgentState, ctx: &MoveContext<'_>) -> Vector3<f32> {
    let Some(base) = agent.based.base else {
        return Vector3::zeros();
    };
    if !ctx.world.is_moving_base(base) {
        return Vector3::zeros();
    }
    let mut base_velocity = ctx.world.base_linear_velocity(base);
    if ctx.params.impart_base_angular_velocity {
        let feet = agent.position - Vector3::new(0.0, 0.0, agent.capsule.half_height);
        let tangential = ctx.world.base_velocity_at(base, feet) - base_velocity;
        base_velocity += tangential;
    }
    Vector3::new(
        if ctx.params.impart_base_velocity_x { base_velocity.x } else { 0.0 },
        if ctx.params.impart_base_velocity_y { base_velocity.y } else { 0.0 },
        if ctx.params.impart_base_velocity_z { base_velocity.z } else { 0.0 },
    )
}

pub(crate) fn max_braking_deceleration(mode: MovementMode, params: &MovementParams) -> f32 {
    match mode {
        MovementMode::Walking => params.braking_deceleration_walking,
        MovementMode::Falling => params.braking_deceleration_falling,
        MovementMode::None => 0.0,
    }
}

pub(crate) fn is_exceeding_max_speed(velocity: &Vector3<f32>, max_speed: f32) -> bool {
    let max_speed = max_speed.max(0.0);
    // 1% tolerance for numeric imprecision.
    velocity.norm_squared() > max_speed * max_speed * 1.01
}

fn poses_match(a: &nalgebra::Isometry3<f32>, b: &nalgebra::Isometry3<f32>) -> bool {
    (a.translation.vector - b.translation.vector).norm() <= consts::EPSILON
        && a.rotation.angle_to(&b.rotation) <= consts::EPSILON
}

// Small vector helpers shared by the locomotion routines.

pub(crate) fn safe_normal(v: Vector3<f32>) -> Vector3<f32> {
    v.try_normalize(1e-8).unwrap_or_else(Vector3::zeros)
}

pub(crate) fn safe_normal_2d(v: Vector3<f32>) -> Vector3<f32> {
    safe_normal(Vector3::new(v.x, v.y, 0.0))
}

pub(crate) fn clamped_to_max_size(v: Vector3<f32>, max_size: f32) -> Vector3<f32> {
    let max_size = max_size.max(0.0);
    let len_sq = v.norm_squared();
    if len_sq > max_size * max_size {
        v * (max_size / len_sq.sqrt())
    } else {
        v
    }
}

pub(crate) fn size_2d(v: &Vector3<f32>) -> f32 {
    (v.x * v.x + v.y * v.y).sqrt()
}

pub(crate) fn size_2d_squared(v: &Vector3<f32>) -> f32 {
    v.x * v.x + v.y * v.y
}
