//! Air locomotion: gravity integration with an apex-crossing sub-step,
//! air-controlled lateral movement, wall deflection, and landing detection.

use nalgebra::Vector3;
use rand::Rng;

use super::super::agent::{AgentState, MovementMode};
use super::super::constants::movement as consts;
use super::super::params::MovementParams;
use super::super::physics::HitResult;
use super::{floor, sweeps, walking, MoveContext};

/// One tick of falling.
pub(crate) fn simulate(
    agent: &mut AgentState,
    ctx: &MoveContext<'_>,
    dt: f32,
    iterations: &mut u32,
) {
    if dt < consts::MIN_TICK_TIME {
        return;
    }
    *iterations += 1;
    let params = ctx.params;

    let mut fall_acceleration = falling_lateral_acceleration(agent, params);
    fall_acceleration.z = 0.0;
    let has_limited_air_control = super::size_2d_squared(&fall_acceleration) > 0.0;

    let mut remaining_time = dt;
    let mut time_tick = remaining_time.max(consts::MIN_TICK_TIME);
    remaining_time -= time_tick;

    let old_location = agent.position;
    agent.just_teleported = false;
    let old_velocity = agent.velocity;
    let max_decel = super::max_braking_deceleration(agent.mode, params);

    // Lateral velocity update with the air-control acceleration standing in
    // for the raw input; restored immediately after.
    {
        let saved_acceleration = agent.acceleration;
        agent.acceleration = fall_acceleration;
        agent.velocity.z = 0.0;
        walking::calc_velocity(agent, params, time_tick, params.falling_lateral_friction, max_decel);
        agent.velocity.z = old_velocity.z;
        agent.acceleration = saved_acceleration;
    }

    let gravity = Vector3::new(0.0, 0.0, params.gravity_z);
    let mut gravity_time = time_tick;

    // An active jump force may defer gravity for part of the tick.
    let mut ending_jump_force = false;
    if agent.jump_force_time_remaining > 0.0 {
        let jump_force_time = agent.jump_force_time_remaining.min(time_tick);
        gravity_time = if params.apply_gravity_while_jumping {
            time_tick
        } else {
            (time_tick - jump_force_time).max(0.0)
        };
        agent.jump_force_time_remaining -= jump_force_time;
        if agent.jump_force_time_remaining <= 0.0 {
            ending_jump_force = true;
        }
    }

    agent.velocity = new_fall_velocity(agent.velocity, gravity, gravity_time);

    // Sub-step exactly to the apex when this tick crosses it, so low tick
    // rates don't cut the top off the trajectory.
    if old_velocity.z > 0.0 && agent.velocity.z <= 0.0 {
        let derived_accel_z = (agent.velocity.z - old_velocity.z) / time_tick;
        if derived_accel_z.abs() > consts::EPSILON {
            let time_to_apex = -old_velocity.z / derived_accel_z;
            if time_to_apex >= consts::APEX_TIME_MINIMUM && time_to_apex < time_tick {
                let apex_velocity =
                    old_velocity + (agent.velocity - old_velocity) * (time_to_apex / time_tick);
                agent.velocity = apex_velocity;
                // Nearly zero already; make it exact so apex handling is
                // consistent.
                agent.velocity.z = 0.0;
                remaining_time += time_tick - time_to_apex;
                time_tick = time_to_apex;
            }
        }
    }

    // Midpoint-integrated displacement.
    let mut adjusted = (old_velocity + agent.velocity) * 0.5 * time_tick;
    if ending_jump_force && !params.apply_gravity_while_jumping {
        // Part of the tick ran at constant speed, the rest under gravity.
        let non_gravity_time = (time_tick - gravity_time).max(0.0);
        adjusted = old_velocity * non_gravity_time
            + (old_velocity + agent.velocity) * 0.5 * gravity_time;
    }

    let mut hit = sweeps::safe_move(agent, ctx, adjusted);
    let mut last_move_time_slice = time_tick;
    let mut sub_time_tick_remaining = time_tick * (1.0 - hit.time);

    if !hit.blocking_hit {
        lateral_rest(agent);
        return;
    }

    let position = agent.position;
    if is_valid_landing_spot(agent, ctx, position, &hit) {
        remaining_time += sub_time_tick_remaining;
        super::process_landed(agent, ctx, &hit, remaining_time, iterations);
        return;
    }

    // Deflect off whatever we hit. Base the deflection on the final velocity
    // rather than the integration step, so the full gravity effect carries
    // into the slide.
    adjusted = agent.velocity * time_tick;

    // An edge-glance hit may still have a walkable surface on top; a fresh
    // downward scan can convert it into a landing.
    if !hit.start_penetrating && should_check_for_valid_landing_spot(agent, &hit) {
        let pawn_location = agent.position;
        let floor_result = floor::find_floor(agent, ctx, pawn_location, false, None);
        if floor_result.is_walkable_floor()
            && is_valid_landing_spot(agent, ctx, pawn_location, &floor_result.hit)
        {
            remaining_time += sub_time_tick_remaining;
            super::process_landed(agent, ctx, &floor_result.hit, remaining_time, iterations);
            return;
        }
    }

    super::handle_impact(agent, ctx, &hit, last_move_time_slice, &adjusted);
    if agent.mode != MovementMode::Falling {
        return;
    }

    // We moved into the wall using air control; recompute what the velocity
    // would have been without it so the deflection cannot be used to climb.
    let mut velocity_no_air_control = old_velocity;
    let mut air_control_accel = agent.acceleration;
    if has_limited_air_control {
        {
            let saved_acceleration = agent.acceleration;
            let saved_velocity = agent.velocity;
            agent.acceleration = Vector3::zeros();
            agent.velocity = old_velocity;
            agent.velocity.z = 0.0;
            walking::calc_velocity(agent, params, time_tick, params.falling_lateral_friction, max_decel);
            velocity_no_air_control =
                Vector3::new(agent.velocity.x, agent.velocity.y, old_velocity.z);
            velocity_no_air_control = new_fall_velocity(velocity_no_air_control, gravity, gravity_time);
            agent.acceleration = saved_acceleration;
            agent.velocity = saved_velocity;
        }
        air_control_accel = (agent.velocity - velocity_no_air_control) / time_tick;
        let air_control_delta_v =
            limit_air_control(air_control_accel, &hit) * last_move_time_slice;
        adjusted = (velocity_no_air_control + air_control_delta_v) * last_move_time_slice;
    }

    let old_hit_normal = hit.normal;
    let old_hit_impact_normal = hit.impact_normal;
    let mut delta = sweeps::compute_slide_vector(adjusted, 1.0 - hit.time, old_hit_normal);

    // Velocity after the deflection.
    let struck_moving_body = hit
        .collider
        .map(|h| ctx.world.is_moving_base(h))
        .unwrap_or(false);
    if agent.velocity.norm() > consts::EPSILON && struck_moving_body {
        if let Some(collider) = hit.collider {
            let contact_velocity = ctx.world.base_velocity_at(collider, hit.impact_point);
            let relative = agent.velocity - contact_velocity;
            agent.velocity -= hit.impact_normal * relative.dot(&hit.impact_normal);
        }
    } else if sub_time_tick_remaining > consts::EPSILON && !agent.just_teleported {
        agent.velocity = delta / sub_time_tick_remaining;
    }

    if sub_time_tick_remaining > consts::EPSILON && delta.dot(&adjusted) > 0.0 {
        // Move in the deflected direction.
        hit = sweeps::safe_move(agent, ctx, delta);

        if hit.blocking_hit {
            // Second wall.
            last_move_time_slice = sub_time_tick_remaining;
            sub_time_tick_remaining *= 1.0 - hit.time;

            let position = agent.position;
            if is_valid_landing_spot(agent, ctx, position, &hit) {
                remaining_time += sub_time_tick_remaining;
                super::process_landed(agent, ctx, &hit, remaining_time, iterations);
                return;
            }

            super::handle_impact(agent, ctx, &hit, last_move_time_slice, &delta);
            if agent.mode != MovementMode::Falling {
                return;
            }

            // Act as if there were no air control on the last move when
            // computing the new deflection.
            if has_limited_air_control && hit.normal.z > consts::VERTICAL_SLOPE_NORMAL_Z {
                let last_move_no_air_control = velocity_no_air_control * last_move_time_slice;
                delta = sweeps::compute_slide_vector(last_move_no_air_control, 1.0, old_hit_normal);
            }

            sweeps::two_wall_adjust(agent, ctx, &mut delta, &hit, old_hit_normal);

            // Limited air control may still slide along the second wall, but
            // not back into the first.
            if has_limited_air_control {
                let air_control_delta_v =
                    limit_air_control(air_control_accel, &hit) * last_move_time_slice;
                if air_control_delta_v.dot(&old_hit_normal) > 0.0 {
                    delta += air_control_delta_v * sub_time_tick_remaining;
                }
            }

            if sub_time_tick_remaining > consts::EPSILON && !agent.just_teleported {
                agent.velocity = delta / sub_time_tick_remaining;
            }

            // Straddling two opposing slopes neither of which we can stand on
            // is a ditch; treat it as a landing rather than jittering forever.
            let ditch = old_hit_impact_normal.z > 0.0
                && hit.impact_normal.z > 0.0
                && delta.z.abs() <= consts::EPSILON
                && hit.impact_normal.dot(&old_hit_impact_normal) < 0.0;

            hit = sweeps::safe_move(agent, ctx, delta);

            if hit.time == 0.0 {
                // Wedged; try to side-step out.
                let mut side_delta =
                    super::safe_normal_2d(old_hit_normal + hit.impact_normal);
                if side_delta == Vector3::zeros() {
                    side_delta = super::safe_normal(Vector3::new(
                        old_hit_normal.y,
                        -old_hit_normal.x,
                        0.0,
                    ));
                }
                hit = sweeps::safe_move(agent, ctx, side_delta);
            }

            let position = agent.position;
            if ditch || is_valid_landing_spot(agent, ctx, position, &hit) || hit.time == 0.0 {
                super::process_landed(agent, ctx, &hit, 0.0, iterations);
                return;
            } else if floor::perch_radius_threshold(params) > 0.0
                && hit.time == 1.0
                && old_hit_impact_normal.z >= params.walkable_floor_z
            {
                // Possibly a virtual ditch within the perch radius: barely
                // moving despite being over a walkable slope. Rare; jitter
                // out with a nudge and a small hop.
                let z_moved = (agent.position.z - old_location.z).abs();
                let moved_2d_sq = super::size_2d_squared(&(agent.position - old_location));
                if z_moved <= 0.2 * time_tick && moved_2d_sq <= 4.0 * time_tick {
                    let max_speed = params.max_speed;
                    agent.velocity.x += 0.25 * max_speed * (agent.rng.gen::<f32>() - 0.5);
                    agent.velocity.y += 0.25 * max_speed * (agent.rng.gen::<f32>() - 0.5);
                    agent.velocity.z = (params.jump_z_velocity * 0.25).max(1.0);
                    let escape_delta = agent.velocity * time_tick;
                    let _ = sweeps::safe_move(agent, ctx, escape_delta);
                }
            }
        }
    }

    lateral_rest(agent);
}

/// Snap negligible lateral drift to an exact stop.
fn lateral_rest(agent: &mut AgentState) {
    if super::size_2d_squared(&agent.velocity) <= consts::EPSILON * 10.0 {
        agent.velocity.x = 0.0;
        agent.velocity.y = 0.0;
    }
}

/// Lateral input available while airborne, scaled by air control (with its
/// low-speed boost) and clamped to the acceleration limit.
pub(crate) fn falling_lateral_acceleration(
    agent: &AgentState,
    params: &MovementParams,
) -> Vector3<f32> {
    let mut fall_acceleration =
        Vector3::new(agent.acceleration.x, agent.acceleration.y, 0.0);
    if super::size_2d_squared(&fall_acceleration) > 0.0 {
        let control = boosted_air_control(agent, params, params.air_control);
        fall_acceleration *= control;
        fall_acceleration =
            super::clamped_to_max_size(fall_acceleration, params.max_acceleration);
    }
    fall_acceleration
}

/// Air control is boosted while lateral speed is below the threshold, making
/// direction changes right after a jump responsive.
pub(crate) fn boosted_air_control(
    agent: &AgentState,
    params: &MovementParams,
    tick_air_control: f32,
) -> f32 {
    if tick_air_control == 0.0 {
        return 0.0;
    }
    let threshold = params.air_control_boost_velocity_threshold;
    if params.air_control_boost_multiplier > 0.0
        && super::size_2d_squared(&agent.velocity) < threshold * threshold
    {
        return (params.air_control_boost_multiplier * tick_air_control).min(1.0);
    }
    tick_air_control
}

pub(crate) fn new_fall_velocity(
    initial_velocity: Vector3<f32>,
    gravity: Vector3<f32>,
    dt: f32,
) -> Vector3<f32> {
    initial_velocity + gravity * dt
}

/// Caps the air-control acceleration against a surface we are sliding on:
/// movement parallel to the wall is fine, pushing into it could climb it.
pub(crate) fn limit_air_control(
    fall_acceleration: Vector3<f32>,
    hit: &HitResult,
) -> Vector3<f32> {
    if hit.is_valid_blocking_hit() && hit.normal.z > consts::VERTICAL_SLOPE_NORMAL_Z {
        if fall_acceleration.dot(&hit.normal) < 0.0 {
            let normal_2d = super::safe_normal_2d(hit.normal);
            return fall_acceleration - normal_2d * fall_acceleration.dot(&normal_2d);
        }
    } else if hit.start_penetrating {
        // Allow movement out of a penetration, nothing else.
        return if fall_acceleration.dot(&hit.normal) > 0.0 {
            fall_acceleration
        } else {
            Vector3::zeros()
        };
    }
    fall_acceleration
}

/// A falling hit counts as a landing only on a walkable surface contacted by
/// the lower hemisphere, away from the capsule rim, confirmed by a fresh
/// floor scan.
pub(crate) fn is_valid_landing_spot(
    agent: &mut AgentState,
    ctx: &MoveContext<'_>,
    capsule_location: Vector3<f32>,
    hit: &HitResult,
) -> bool {
    if !hit.blocking_hit {
        return false;
    }

    if !hit.start_penetrating {
        if !floor::is_walkable(ctx.params, hit) {
            return false;
        }
        // Reject hits above the lower hemisphere; those happen when sliding
        // down a vertical face.
        let lower_hemisphere_z = hit.location.z - agent.capsule.half_height + agent.capsule.radius;
        if hit.impact_point.z >= lower_hemisphere_z {
            return false;
        }
        if !floor::is_within_edge_tolerance(&hit.location, &hit.impact_point, agent.capsule.radius)
        {
            return false;
        }
    } else {
        // A horizontal depenetration normal means we are against a wall, not
        // a floor; don't pop down onto it.
        if hit.normal.z < consts::EPSILON {
            return false;
        }
    }

    let floor_result = floor::find_floor(agent, ctx, capsule_location, false, Some(hit));
    floor_result.is_walkable_floor()
}

/// An edge-glance while falling: the capsule-side normal disagrees with the
/// surface normal near the bottom rim, so the top of the edge might still be
/// a floor.
pub(crate) fn should_check_for_valid_landing_spot(agent: &AgentState, hit: &HitResult) -> bool {
    if hit.normal.z > consts::EPSILON
        && (hit.normal - hit.impact_normal).norm() > consts::EPSILON
    {
        if floor::is_within_edge_tolerance(&agent.position, &hit.impact_point, agent.capsule.radius)
        {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::agent::CapsuleExtent;

    #[test]
    fn test_gravity_integration_is_linear() {
        let gravity = Vector3::new(0.0, 0.0, -980.0);
        let v = new_fall_velocity(Vector3::new(0.0, 0.0, 700.0), gravity, 0.25);
        assert!((v.z - (700.0 - 245.0)).abs() < 1e-3);
    }

    #[test]
    fn test_air_control_boost_below_threshold() {
        let params = MovementParams::default();
        let mut agent = AgentState::new(1, Vector3::zeros(), CapsuleExtent::default());
        // Slow: boosted (0.35 * 2 = 0.7).
        agent.velocity = Vector3::new(10.0, 0.0, -300.0);
        assert!((boosted_air_control(&agent, &params, params.air_control) - 0.7).abs() < 1e-6);
        // Fast: not boosted.
        agent.velocity = Vector3::new(100.0, 0.0, -300.0);
        assert!(
            (boosted_air_control(&agent, &params, params.air_control) - 0.35).abs() < 1e-6
        );
    }

    #[test]
    fn test_air_control_boost_clamps_at_one() {
        let params = MovementParams {
            air_control: 0.9,
            ..MovementParams::default()
        };
        let agent = AgentState::new(1, Vector3::zeros(), CapsuleExtent::default());
        assert_eq!(boosted_air_control(&agent, &params, params.air_control), 1.0);
    }

    #[test]
    fn test_limit_air_control_removes_wall_push() {
        let mut hit = HitResult::default();
        hit.blocking_hit = true;
        hit.normal = Vector3::new(-1.0, 0.0, 0.01).normalize();
        hit.impact_normal = hit.normal;

        let accel = Vector3::new(100.0, 50.0, 0.0);
        let limited = limit_air_control(accel, &hit);
        // No component into the wall, lateral component preserved.
        assert!(limited.x.abs() < 1.0);
        assert!((limited.y - 50.0).abs() < 1.0);
    }
}
