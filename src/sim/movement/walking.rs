//! Ground locomotion: friction and braking, ramp-following moves, step-up,
//! ledge probes, and floor-height maintenance.

use log::trace;
use nalgebra::Vector3;

use super::super::agent::{AgentState, FloorResult, MovementMode};
use super::super::constants::floor::{MAX_FLOOR_DIST, MIN_FLOOR_DIST};
use super::super::constants::movement as consts;
use super::super::params::MovementParams;
use super::super::physics::HitResult;
use super::{floor, sweeps, MoveContext};

/// One tick of walking. Iterates when a ledge probe reverts and retries the
/// move in a different direction; `iterations` bounds the loop together with
/// any mode-switch recursion it triggers.
pub(crate) fn simulate(
    agent: &mut AgentState,
    ctx: &MoveContext<'_>,
    dt: f32,
    iterations: &mut u32,
) {
    if dt < consts::MIN_TICK_TIME {
        return;
    }

    agent.just_teleported = false;
    let mut checked_fall = false;
    let mut tried_ledge_move = false;
    let mut remaining_time = dt;

    while remaining_time >= consts::MIN_TICK_TIME
        && *iterations < consts::MAX_SIMULATION_ITERATIONS
        && agent.mode == MovementMode::Walking
    {
        *iterations += 1;
        let time_tick = remaining_time.max(consts::MIN_TICK_TIME);
        remaining_time -= time_tick;

        // Save state in case this move has to be reverted.
        let old_base = agent.based.base;
        let old_location = agent.position;
        let old_floor = agent.floor;

        // Walking input is horizontal by definition.
        agent.acceleration.z = 0.0;

        calc_velocity(
            agent,
            ctx.params,
            time_tick,
            ctx.params.ground_friction,
            super::max_braking_deceleration(agent.mode, ctx.params),
        );

        let move_velocity = agent.velocity;
        let delta = move_velocity * time_tick;
        let zero_delta = delta.norm() <= consts::EPSILON;
        let mut step_down_floor: Option<FloorResult> = None;

        if zero_delta {
            remaining_time = 0.0;
        } else {
            step_down_floor = move_along_floor(agent, ctx, &move_velocity, time_tick);

            if agent.mode == MovementMode::Falling {
                // The move walked us off an edge; refund the unused part of
                // the tick to the falling routine.
                let desired_dist = delta.norm();
                if desired_dist > consts::EPSILON {
                    let travelled = super::size_2d(&(agent.position - old_location));
                    remaining_time +=
                        time_tick * (1.0 - (travelled / desired_dist).min(1.0));
                }
                super::start_new_physics(agent, ctx, remaining_time, iterations);
                return;
            }
        }

        // Refresh the floor unless the step-up already computed it.
        match step_down_floor {
            Some(floor_result) => agent.floor = floor_result,
            None => {
                let position = agent.position;
                agent.floor = floor::find_floor(agent, ctx, position, zero_delta, None);
            }
        }

        let check_ledges = !ctx.params.can_walk_off_ledges;
        if check_ledges && !agent.floor.is_walkable_floor() {
            // Possibly a sideways move keeps us on the walkable surface.
            let gravity_dir = -Vector3::z();
            let new_delta = if tried_ledge_move {
                Vector3::zeros()
            } else {
                get_ledge_move(agent, ctx, old_location, delta, gravity_dir)
            };
            if new_delta != Vector3::zeros() {
                // Revert this move and retry in the alternate direction, at
                // most once.
                super::revert_move(agent, ctx, old_location, old_base, &old_floor, false);
                tried_ledge_move = true;
                agent.velocity = new_delta / time_tick;
                remaining_time += time_tick;
                continue;
            } else {
                let must_fall = zero_delta || old_base.is_none();
                if (must_fall || !checked_fall)
                    && super::check_fall(
                        agent,
                        ctx,
                        delta,
                        old_location,
                        remaining_time,
                        time_tick,
                        must_fall,
                        iterations,
                    )
                {
                    return;
                }
                checked_fall = true;

                super::revert_move(agent, ctx, old_location, old_base, &old_floor, true);
                remaining_time = 0.0;
                break;
            }
        } else {
            if agent.floor.is_walkable_floor() {
                adjust_floor_height(agent, ctx);
                let base = agent.floor.hit.collider;
                super::set_base(agent, ctx, base);
            } else if agent.floor.hit.start_penetrating && remaining_time <= 0.0 {
                // The scan failed because it started inside the floor; pop
                // out rather than trying to move further down.
                let mut hit = agent.floor.hit;
                hit.trace_end = hit.trace_start + Vector3::new(0.0, 0.0, MAX_FLOOR_DIST);
                let adjustment = sweeps::penetration_adjustment(&hit);
                sweeps::resolve_penetration(agent, ctx, adjustment, &hit);
                agent.force_next_floor_check = true;
            }

            // See if we need to start falling.
            if !agent.floor.is_walkable_floor() && !agent.floor.hit.start_penetrating {
                let must_fall = agent.just_teleported || zero_delta || old_base.is_none();
                if (must_fall || !checked_fall)
                    && super::check_fall(
                        agent,
                        ctx,
                        delta,
                        old_location,
                        remaining_time,
                        time_tick,
                        must_fall,
                        iterations,
                    )
                {
                    return;
                }
                checked_fall = true;
            }
        }

        // Make velocity reflect what actually happened, so sliding and
        // stepping feed back into the next tick.
        if agent.mode == MovementMode::Walking
            && !agent.just_teleported
            && time_tick >= consts::MIN_TICK_TIME
        {
            agent.velocity = (agent.position - old_location) / time_tick;
            agent.velocity.z = 0.0;
        }

        // No movement at all means future iterations would be stuck too.
        if agent.position == old_location {
            remaining_time = 0.0;
        }
    }
}

/// Friction/braking velocity update for the tick. With no input (or when over
/// the speed limit) braking decelerates toward rest; with input, friction
/// blends the velocity toward the input direction before integrating it.
pub(crate) fn calc_velocity(
    agent: &mut AgentState,
    params: &MovementParams,
    dt: f32,
    friction: f32,
    braking_deceleration: f32,
) {
    if dt < consts::MIN_TICK_TIME {
        return;
    }

    let friction = friction.max(0.0);
    let max_speed = params.max_speed;

    let zero_acceleration = agent.acceleration == Vector3::zeros();
    let velocity_over_max = super::is_exceeding_max_speed(&agent.velocity, max_speed);

    if zero_acceleration || velocity_over_max {
        let old_velocity = agent.velocity;
        apply_velocity_braking(agent, params, dt, friction, braking_deceleration);

        // Braking may not drop us below max speed if we started above it.
        if velocity_over_max
            && agent.velocity.norm_squared() < max_speed * max_speed
            && agent.acceleration.dot(&old_velocity) > 0.0
        {
            agent.velocity = super::safe_normal(old_velocity) * max_speed;
        }
    } else {
        // Friction limits our ability to change direction.
        let accel_dir = super::safe_normal(agent.acceleration);
        let vel_size = agent.velocity.norm();
        agent.velocity -=
            (agent.velocity - accel_dir * vel_size) * (dt * friction).min(1.0);
    }

    if !zero_acceleration {
        let new_max_speed = if super::is_exceeding_max_speed(&agent.velocity, max_speed) {
            agent.velocity.norm()
        } else {
            max_speed
        };
        agent.velocity += agent.acceleration * dt;
        agent.velocity = super::clamped_to_max_size(agent.velocity, new_max_speed);
    }
}

/// Decelerates toward rest, sub-stepping the integration so results stay
/// consistent at low frame rates. Velocity never reverses direction under
/// braking; it clamps to zero instead.
pub(crate) fn apply_velocity_braking(
    agent: &mut AgentState,
    params: &MovementParams,
    dt: f32,
    friction: f32,
    braking_deceleration: f32,
) {
    if agent.velocity == Vector3::zeros() || dt < consts::MIN_TICK_TIME {
        return;
    }

    let friction_factor = params.braking_friction_factor.max(0.0);
    let friction = (friction * friction_factor).max(0.0);
    let braking_deceleration = braking_deceleration.max(0.0);
    let zero_friction = friction == 0.0;
    let zero_braking = braking_deceleration == 0.0;
    if zero_friction && zero_braking {
        return;
    }

    let old_velocity = agent.velocity;
    let mut remaining_time = dt;
    let max_time_step = params.braking_sub_step_time.clamp(1.0 / 75.0, 1.0 / 20.0);

    let reverse_accel = if zero_braking {
        Vector3::zeros()
    } else {
        super::safe_normal(agent.velocity) * -braking_deceleration
    };

    while remaining_time >= consts::MIN_TICK_TIME {
        // Zero friction decelerates at a constant rate; no need to iterate.
        let step = if remaining_time > max_time_step && !zero_friction {
            max_time_step.min(remaining_time * 0.5)
        } else {
            remaining_time
        };
        remaining_time -= step;

        agent.velocity += (agent.velocity * -friction + reverse_accel) * step;

        if agent.velocity.dot(&old_velocity) <= 0.0 {
            agent.velocity = Vector3::zeros();
            return;
        }
    }

    let speed_sq = agent.velocity.norm_squared();
    if speed_sq <= consts::EPSILON
        || (!zero_braking
            && speed_sq <= consts::BRAKE_TO_STOP_VELOCITY * consts::BRAKE_TO_STOP_VELOCITY)
    {
        agent.velocity = Vector3::zeros();
    }
}

/// Projects a horizontal move onto the current ramp plane so movement follows
/// slopes instead of tunnelling into them.
pub(crate) fn compute_ground_movement_delta(
    params: &MovementParams,
    delta: Vector3<f32>,
    ramp_hit: &HitResult,
    hit_from_line_trace: bool,
) -> Vector3<f32> {
    let floor_normal = ramp_hit.impact_normal;
    let contact_normal = ramp_hit.normal;

    if floor_normal.z < 1.0 - consts::EPSILON
        && floor_normal.z > consts::EPSILON
        && contact_normal.z > consts::EPSILON
        && !hit_from_line_trace
        && floor::is_walkable(params, ramp_hit)
    {
        let floor_dot_delta = floor_normal.dot(&delta);
        let ramp_movement = Vector3::new(delta.x, delta.y, -floor_dot_delta / floor_normal.z);
        return super::safe_normal(ramp_movement) * delta.norm();
    }
    delta
}

/// Moves along the current floor, following ramps, stepping over small
/// obstacles, and sliding along anything else. Returns the floor computed by
/// a successful step-up so the caller can skip its own scan.
pub(crate) fn move_along_floor(
    agent: &mut AgentState,
    ctx: &MoveContext<'_>,
    in_velocity: &Vector3<f32>,
    dt: f32,
) -> Option<FloorResult> {
    if !agent.floor.is_walkable_floor() {
        return None;
    }

    let delta = Vector3::new(in_velocity.x, in_velocity.y, 0.0) * dt;
    let floor_hit = agent.floor.hit;
    let from_line_trace = agent.floor.from_line_trace;
    let mut ramp_vector =
        compute_ground_movement_delta(ctx.params, delta, &floor_hit, from_line_trace);
    let mut hit = sweeps::safe_move(agent, ctx, ramp_vector);
    let mut last_move_time_slice = dt;
    let mut step_down_floor = None;

    if hit.start_penetrating {
        // Treat the stuck contact as something to deflect off so the tick
        // does not visibly hitch.
        super::handle_impact(agent, ctx, &hit, 0.0, &Vector3::zeros());
        let normal = hit.normal;
        sweeps::slide_along_surface(agent, ctx, delta, 1.0, normal, &mut hit, true);

        if hit.start_penetrating {
            super::on_stuck_in_geometry(agent);
        }
    } else if hit.is_valid_blocking_hit() {
        // Impacted something: most likely another ramp, possibly a barrier.
        let mut percent_time_applied = hit.time;
        if hit.time > 0.0 && hit.normal.z > consts::EPSILON && floor::is_walkable(ctx.params, &hit)
        {
            // Another walkable ramp; spend the rest of the move on it.
            let initial_percent_remaining = 1.0 - percent_time_applied;
            ramp_vector = compute_ground_movement_delta(
                ctx.params,
                delta * initial_percent_remaining,
                &hit,
                false,
            );
            last_move_time_slice *= initial_percent_remaining;
            hit = sweeps::safe_move(agent, ctx, ramp_vector);

            let second_hit_percent = hit.time * initial_percent_remaining;
            percent_time_applied = (percent_time_applied + second_hit_percent).clamp(0.0, 1.0);
        }

        if hit.is_valid_blocking_hit() && can_step_up(agent, &hit) {
            // Hit a barrier; try to step over it.
            let pre_step_up_location = agent.position;
            let gravity_dir = -Vector3::z();
            let remaining_delta = delta * (1.0 - percent_time_applied);
            let (stepped, floor_result) =
                step_up(agent, ctx, gravity_dir, remaining_delta, &hit);
            if !stepped {
                super::handle_impact(agent, ctx, &hit, last_move_time_slice, &ramp_vector);
                let normal = hit.normal;
                let mut slide_hit = hit;
                sweeps::slide_along_surface(
                    agent,
                    ctx,
                    delta,
                    1.0 - percent_time_applied,
                    normal,
                    &mut slide_hit,
                    true,
                );
            } else {
                // The vertical part of a step is not attributed to velocity;
                // only the horizontal progress is.
                agent.just_teleported = true;
                let step_up_time_slice = (1.0 - percent_time_applied) * dt;
                if step_up_time_slice >= consts::EPSILON {
                    agent.velocity = (agent.position - pre_step_up_location) / step_up_time_slice;
                    agent.velocity.z = 0.0;
                }
                step_down_floor = floor_result;
            }
        }
    }

    step_down_floor
}

pub(crate) fn can_step_up(agent: &AgentState, hit: &HitResult) -> bool {
    hit.is_valid_blocking_hit() && agent.mode != MovementMode::Falling
}

/// Attempts to surmount a blocking obstacle: sweep up by the step height,
/// forward by the remaining delta, then back down. The whole sequence is
/// rolled back if any stage rejects. Returns the floor computed from the
/// final step-down when it was accepted.
pub(crate) fn step_up(
    agent: &mut AgentState,
    ctx: &MoveContext<'_>,
    gravity_dir: Vector3<f32>,
    delta: Vector3<f32>,
    in_hit: &HitResult,
) -> (bool, Option<FloorResult>) {
    let params = ctx.params;
    let max_step_height = params.max_step_height;

    if !can_step_up(agent, in_hit) || max_step_height <= 0.0 {
        return (false, None);
    }
    if gravity_dir == Vector3::zeros() {
        return (false, None);
    }

    let old_location = agent.position;
    let radius = agent.capsule.radius;
    let half_height = agent.capsule.half_height;

    // No point stepping up when the top of the capsule is what's hitting.
    let initial_impact_z = in_hit.impact_point.z;
    if initial_impact_z > old_location.z + (half_height - radius) {
        return (false, None);
    }

    let mut step_travel_up_height = max_step_height;
    let mut step_travel_down_height = step_travel_up_height;
    let step_side_z = -in_hit.impact_normal.dot(&gravity_dir);
    let mut initial_floor_base_z = old_location.z - half_height;
    let mut floor_point_z = initial_floor_base_z;

    if agent.mode == MovementMode::Walking && agent.floor.is_walkable_floor() {
        // We float a variable amount above the floor, so the step limit is
        // enforced from the actual impact point, not the capsule base.
        let floor_dist = agent.floor.distance_to_floor().max(0.0);
        initial_floor_base_z -= floor_dist;
        step_travel_up_height = (step_travel_up_height - floor_dist).max(0.0);
        step_travel_down_height = max_step_height + MAX_FLOOR_DIST * 2.0;

        let hit_vertical_face =
            !floor::is_within_edge_tolerance(&in_hit.location, &in_hit.impact_point, radius);
        if !agent.floor.from_line_trace && !hit_vertical_face {
            floor_point_z = agent.floor.hit.impact_point.z;
        } else {
            floor_point_z -= agent.floor.floor_dist;
        }
    }

    // Never step up from an impact that is already below us.
    if initial_impact_z <= initial_floor_base_z {
        return (false, None);
    }

    // Snapshot for rollback; every rejection below restores this pose.
    let snapshot = agent.position;

    // Up.
    let sweep_up_hit = sweeps::move_capsule(
        agent,
        ctx,
        -gravity_dir * step_travel_up_height,
        true,
    );
    if sweep_up_hit.start_penetrating {
        agent.position = snapshot;
        return (false, None);
    }

    // Forward.
    let mut hit = sweeps::move_capsule(agent, ctx, delta, true);
    if hit.blocking_hit {
        if hit.start_penetrating {
            agent.position = snapshot;
            return (false, None);
        }

        if sweep_up_hit.blocking_hit {
            super::handle_impact(agent, ctx, &sweep_up_hit, 0.0, &Vector3::zeros());
        }
        super::handle_impact(agent, ctx, &hit, 0.0, &delta);

        // Ran into a wall partway; slide the rest and keep the step attempt
        // only if some progress was made.
        let forward_hit_time = hit.time;
        let normal = hit.normal;
        let forward_slide_amount =
            sweeps::slide_along_surface(agent, ctx, delta, 1.0 - hit.time, normal, &mut hit, true);
        if forward_hit_time == 0.0 && forward_slide_amount == 0.0 {
            trace!("agent {}: step-up rejected, no forward progress", agent.id);
            agent.position = snapshot;
            return (false, None);
        }
    }

    // Down.
    let hit = sweeps::move_capsule(agent, ctx, gravity_dir * step_travel_down_height, true);
    if hit.start_penetrating {
        agent.position = snapshot;
        return (false, None);
    }

    let mut step_down_floor = None;
    if hit.is_valid_blocking_hit() {
        // Would this sequence carry us higher than a step is allowed to?
        let delta_z = hit.impact_point.z - floor_point_z;
        if delta_z > max_step_height {
            trace!("agent {}: step-up rejected, rise {:.1} too high", agent.id, delta_z);
            agent.position = snapshot;
            return (false, None);
        }

        if !floor::is_walkable(ctx.params, &hit) {
            // Unwalkable landing normals opposing the move are walls.
            if hit.impact_normal.dot(&delta) < 0.0 {
                agent.position = snapshot;
                return (false, None);
            }
            // Stepping down onto an unwalkable surface below the start is
            // fine (we'll slide off); ending above it is not.
            if hit.location.z > old_location.z {
                agent.position = snapshot;
                return (false, None);
            }
        }

        // Stay consistent with the floor scanner's edge rejection.
        if !floor::is_within_edge_tolerance(&hit.location, &hit.impact_point, radius) {
            agent.position = snapshot;
            return (false, None);
        }

        // Validate the floor from this step-down so the caller can skip its
        // own scan.
        let position = agent.position;
        let floor_result = floor::find_floor(agent, ctx, position, false, Some(&hit));

        // When ending higher, reject results that would leave us perched on
        // the side of a stair we cannot actually stand on.
        if hit.location.z > old_location.z {
            if !floor_result.blocking_hit && step_side_z < consts::MAX_STEP_SIDE_Z {
                agent.position = snapshot;
                return (false, None);
            }
        }
        step_down_floor = Some(floor_result);
    }

    // The vertical offset of a step is not velocity.
    agent.just_teleported = true;
    (true, step_down_floor)
}

/// Moves vertically to keep the floor distance inside the float band.
pub(crate) fn adjust_floor_height(agent: &mut AgentState, ctx: &MoveContext<'_>) {
    if !agent.floor.is_walkable_floor() {
        return;
    }

    let mut old_floor_dist = agent.floor.floor_dist;
    if agent.floor.from_line_trace {
        if old_floor_dist < MIN_FLOOR_DIST && agent.floor.line_dist >= MIN_FLOOR_DIST {
            // Adjusting on this result would climb an unwalkable wall.
            return;
        }
        // The sweep was unwalkable or penetrating; the line distance drives
        // the vertical adjustment instead.
        old_floor_dist = agent.floor.line_dist;
    }

    if (MIN_FLOOR_DIST..=MAX_FLOOR_DIST).contains(&old_floor_dist) {
        return;
    }

    let initial_z = agent.position.z;
    let avg_floor_dist = (MIN_FLOOR_DIST + MAX_FLOOR_DIST) * 0.5;
    let move_dist = avg_floor_dist - old_floor_dist;
    let adjust_hit = sweeps::safe_move(agent, ctx, Vector3::new(0.0, 0.0, move_dist));

    if !adjust_hit.is_valid_blocking_hit() {
        agent.floor.floor_dist += move_dist;
    } else if move_dist > 0.0 {
        agent.floor.floor_dist += agent.position.z - initial_z;
    } else {
        agent.floor.floor_dist = agent.position.z - adjust_hit.location.z;
        if floor::is_walkable(ctx.params, &adjust_hit) {
            let dist = agent.floor.floor_dist;
            agent.floor.set_from_sweep(&adjust_hit, dist, true);
        }
    }

    // Height adjustments are not velocity.
    agent.just_teleported = true;
}

/// Sideways probe for an alternate walkable direction when the straight-ahead
/// floor is not walkable. Tries the left perpendicular, then the right.
pub(crate) fn get_ledge_move(
    agent: &AgentState,
    ctx: &MoveContext<'_>,
    old_location: Vector3<f32>,
    delta: Vector3<f32>,
    gravity_dir: Vector3<f32>,
) -> Vector3<f32> {
    if delta == Vector3::zeros() {
        return Vector3::zeros();
    }

    let mut side_dir = Vector3::new(delta.y, -delta.x, 0.0);
    if check_ledge_direction(agent, ctx, old_location, side_dir, gravity_dir) {
        return side_dir;
    }
    side_dir = -side_dir;
    if check_ledge_direction(agent, ctx, old_location, side_dir, gravity_dir) {
        return side_dir;
    }
    Vector3::zeros()
}

/// True when a sideways step in `side_step` ends over walkable ground within
/// a step height plus the configured ledge threshold.
fn check_ledge_direction(
    agent: &AgentState,
    ctx: &MoveContext<'_>,
    old_location: Vector3<f32>,
    side_step: Vector3<f32>,
    gravity_dir: Vector3<f32>,
) -> bool {
    let side_dest = old_location + side_step;
    let mut result = ctx
        .world
        .sweep_capsule(&agent.capsule, old_location, side_step);
    if !result.blocking_hit || floor::is_walkable(ctx.params, &result) {
        if !result.blocking_hit {
            let probe_depth = ctx.params.max_step_height + ctx.params.ledge_check_threshold;
            result = ctx
                .world
                .sweep_capsule(&agent.capsule, side_dest, gravity_dir * probe_depth);
        }
        if result.time < 1.0 && floor::is_walkable(ctx.params, &result) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::agent::CapsuleExtent;

    fn walking_agent() -> AgentState {
        let mut agent = AgentState::new(7, Vector3::new(0.0, 0.0, 98.0), CapsuleExtent::default());
        agent.mode = MovementMode::Walking;
        agent
    }

    #[test]
    fn test_braking_monotonic_until_rest() {
        let params = MovementParams::default();
        let mut agent = walking_agent();
        agent.velocity = Vector3::new(300.0, 0.0, 0.0);

        let dt = 1.0 / 60.0;
        let mut last_speed = agent.velocity.norm();
        let mut ticks = 0;
        while agent.velocity != Vector3::zeros() && ticks < 1000 {
            calc_velocity(&mut agent, &params, dt, params.ground_friction, params.braking_deceleration_walking);
            let speed = agent.velocity.norm();
            assert!(speed < last_speed, "speed rose from {last_speed} to {speed}");
            // Never reverses direction.
            assert!(agent.velocity.x >= 0.0);
            last_speed = speed;
            ticks += 1;
        }
        assert_eq!(agent.velocity, Vector3::zeros());
        assert!(ticks < 200, "braking took {ticks} ticks");
    }

    #[test]
    fn test_acceleration_clamps_to_max_speed() {
        let params = MovementParams::default();
        let mut agent = walking_agent();
        agent.acceleration = Vector3::new(params.max_acceleration, 0.0, 0.0);

        let dt = 1.0 / 30.0;
        for _ in 0..200 {
            calc_velocity(&mut agent, &params, dt, params.ground_friction, params.braking_deceleration_walking);
        }
        let speed = agent.velocity.norm();
        assert!(speed <= params.max_speed * 1.01);
        assert!(speed > params.max_speed * 0.95);
    }

    #[test]
    fn test_ground_delta_follows_ramp() {
        let params = MovementParams::default();
        let mut hit = HitResult::default();
        hit.blocking_hit = true;
        // 30 degree ramp rising along +X.
        let angle = 30.0f32.to_radians();
        hit.impact_normal = Vector3::new(-angle.sin(), 0.0, angle.cos());
        hit.normal = hit.impact_normal;

        let delta = Vector3::new(10.0, 0.0, 0.0);
        let ramp_delta = compute_ground_movement_delta(&params, delta, &hit, false);
        // Same length, but now climbing.
        assert!((ramp_delta.norm() - delta.norm()).abs() < 1e-4);
        assert!(ramp_delta.z > 0.0);
        // Parallel to the surface.
        assert!(ramp_delta.dot(&hit.impact_normal).abs() < 1e-3);
    }

    #[test]
    fn test_ground_delta_ignores_unwalkable_ramp() {
        let params = MovementParams::default();
        let mut hit = HitResult::default();
        hit.blocking_hit = true;
        let angle = 60.0f32.to_radians();
        hit.impact_normal = Vector3::new(-angle.sin(), 0.0, angle.cos());
        hit.normal = hit.impact_normal;

        let delta = Vector3::new(10.0, 0.0, 0.0);
        assert_eq!(compute_ground_movement_delta(&params, delta, &hit, false), delta);
    }
}
