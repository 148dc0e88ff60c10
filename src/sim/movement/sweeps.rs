//! The swept mover: the single primitive through which every world
//! displacement is applied, plus penetration recovery and surface sliding.

use nalgebra::Vector3;

use super::super::agent::{AgentState, MovementMode};
use super::super::constants::floor::MIN_FLOOR_DIST;
use super::super::constants::movement as consts;
use super::super::constants::penetration;
use super::super::physics::HitResult;
use super::{floor, handle_impact, MoveContext};

/// Moves the capsule by `delta`. With `sweep` the move stops at the first
/// blocking contact; without it the delta is applied verbatim (used for
/// depenetration teleports). A sweep that starts penetrated does not move.
pub(crate) fn move_capsule(
    agent: &mut AgentState,
    ctx: &MoveContext<'_>,
    delta: Vector3<f32>,
    sweep: bool,
) -> HitResult {
    move_capsule_ex(agent, ctx, delta, sweep, true)
}

pub(crate) fn move_capsule_ex(
    agent: &mut AgentState,
    ctx: &MoveContext<'_>,
    delta: Vector3<f32>,
    sweep: bool,
    stop_at_penetration: bool,
) -> HitResult {
    if !sweep {
        agent.position += delta;
        return HitResult::no_hit(agent.position - delta, agent.position);
    }
    let hit = ctx
        .world
        .sweep_capsule_ex(&agent.capsule, agent.position, delta, stop_at_penetration);
    if !hit.start_penetrating {
        agent.position = hit.location;
    }
    hit
}

/// Swept move with automatic penetration recovery: if the sweep starts
/// stuck, push out along the reported normal and retry the original move.
pub(crate) fn safe_move(
    agent: &mut AgentState,
    ctx: &MoveContext<'_>,
    delta: Vector3<f32>,
) -> HitResult {
    let mut hit = move_capsule(agent, ctx, delta, true);
    if hit.start_penetrating {
        let adjustment = penetration_adjustment(&hit);
        if resolve_penetration(agent, ctx, adjustment, &hit) {
            // Retry the original move from the recovered pose.
            hit = move_capsule(agent, ctx, delta, true);
        }
    }
    hit
}

/// Push-out vector for a penetrating hit: along the depenetration normal by
/// the reported depth plus a pull-back margin.
pub(crate) fn penetration_adjustment(hit: &HitResult) -> Vector3<f32> {
    if !hit.start_penetrating {
        return Vector3::zeros();
    }
    let depth = if hit.penetration_depth > 0.0 {
        hit.penetration_depth
    } else {
        penetration::FALLBACK_DEPTH
    };
    hit.normal * (depth + penetration::PULLBACK_DISTANCE)
}

/// Attempts to get the capsule out of an initial overlap. Never leaves the
/// agent deeper than it started; returns true when any headway was made.
pub(crate) fn resolve_penetration(
    agent: &mut AgentState,
    ctx: &MoveContext<'_>,
    adjustment: Vector3<f32>,
    hit: &HitResult,
) -> bool {
    if adjustment == Vector3::zeros() {
        return false;
    }
    // The overlap test is stricter than the sweep so precision differences
    // between the two cannot park us inside another surface.
    let target = hit.trace_start + adjustment;
    let encroached = ctx
        .world
        .overlap_test(&agent.capsule, target, penetration::OVERLAP_INFLATION);
    if !encroached {
        // Teleport without sweeping.
        let _ = move_capsule(agent, ctx, adjustment, false);
        agent.just_teleported = true;
        return true;
    }

    // Sweep as far out as possible, ignoring the initial overlap so the cast
    // can actually leave the surface it starts inside.
    let sweep_hit = move_capsule_ex(agent, ctx, adjustment, true, false);
    let mut moved = !sweep_hit.start_penetrating && sweep_hit.time > 0.0;

    if !moved && sweep_hit.start_penetrating {
        // Combine the two MTD results to escape multiple surfaces at once.
        let second_mtd = penetration_adjustment(&sweep_hit);
        let combined = adjustment + second_mtd;
        if second_mtd != adjustment && combined != Vector3::zeros() {
            let combined_hit = move_capsule_ex(agent, ctx, combined, true, false);
            moved = !combined_hit.start_penetrating && combined_hit.time > 0.0;
        }
    }

    if !moved {
        // Try the adjustment plus the originally requested move; this can
        // slip out of corners formed by several objects.
        let move_delta = hit.trace_end - hit.trace_start;
        if move_delta != Vector3::zeros() {
            let attempt = move_capsule_ex(agent, ctx, adjustment + move_delta, true, false);
            moved = !attempt.start_penetrating && attempt.time > 0.0;

            if !moved && move_delta.dot(&adjustment) > 0.0 {
                let attempt = move_capsule_ex(agent, ctx, move_delta, true, false);
                moved = !attempt.start_penetrating && attempt.time > 0.0;
            }
        }
    }

    if moved {
        agent.just_teleported = true;
    }
    moved
}

/// Projection of `delta` onto the plane of `normal`, scaled by the unused
/// fraction of the move.
pub(crate) fn compute_slide_vector(
    delta: Vector3<f32>,
    time: f32,
    normal: Vector3<f32>,
) -> Vector3<f32> {
    (delta - normal * delta.dot(&normal)) * time
}

/// Slides along a blocking surface, handling a second surface via
/// `two_wall_adjust`. Returns the fraction of `time` actually applied and
/// leaves the last blocking hit in `hit`.
pub(crate) fn slide_along_surface(
    agent: &mut AgentState,
    ctx: &MoveContext<'_>,
    delta: Vector3<f32>,
    time: f32,
    in_normal: Vector3<f32>,
    hit: &mut HitResult,
    notify_impact: bool,
) -> f32 {
    if !hit.blocking_hit {
        return 0.0;
    }

    let mut normal = in_normal;
    if agent.mode == MovementMode::Walking {
        if normal.z > 0.0 {
            // Never get pushed up an unwalkable surface.
            if !floor::is_walkable(ctx.params, hit) {
                normal = super::safe_normal_2d(normal);
            }
        } else if normal.z < -consts::EPSILON {
            // Don't get pushed down into the floor when the impact is on the
            // upper half of the capsule.
            if agent.floor.floor_dist < MIN_FLOOR_DIST && agent.floor.blocking_hit {
                let floor_normal = agent.floor.hit.normal;
                let opposed_to_movement =
                    delta.dot(&floor_normal) < 0.0 && floor_normal.z < 1.0 - 1e-6;
                if opposed_to_movement {
                    normal = floor_normal;
                }
                normal = super::safe_normal_2d(normal);
            }
        }
    }

    let mut percent_time_applied = 0.0;
    let old_hit_normal = normal;

    let mut slide_delta = compute_slide_vector(delta, time, normal);
    if slide_delta.dot(&delta) > 0.0 {
        *hit = safe_move(agent, ctx, slide_delta);
        let first_hit_percent = hit.time;
        percent_time_applied = first_hit_percent;
        if hit.is_valid_blocking_hit() {
            if notify_impact {
                handle_impact(agent, ctx, hit, first_hit_percent * time, &slide_delta);
            }

            // Hit a second surface; compute a new direction that respects both.
            two_wall_adjust(agent, ctx, &mut slide_delta, hit, old_hit_normal);

            if slide_delta.norm() > 1e-3 && slide_delta.dot(&delta) > 0.0 {
                *hit = safe_move(agent, ctx, slide_delta);
                let second_hit_percent = hit.time * (1.0 - first_hit_percent);
                percent_time_applied += second_hit_percent;

                if notify_impact && hit.blocking_hit {
                    handle_impact(agent, ctx, hit, second_hit_percent * time, &slide_delta);
                }
            }
        }
        return percent_time_applied.clamp(0.0, 1.0);
    }
    0.0
}

/// Given a move blocked by a second wall, computes a direction that escapes
/// both the old and the new surface.
pub(crate) fn two_wall_adjust(
    agent: &AgentState,
    ctx: &MoveContext<'_>,
    delta: &mut Vector3<f32>,
    hit: &HitResult,
    old_hit_normal: Vector3<f32>,
) {
    let params = ctx.params;
    let in_delta = *delta;
    let hit_normal = hit.normal;

    if old_hit_normal.dot(&hit_normal) <= 0.0 {
        // 90 degrees or less between the walls; move along their crease.
        let desired_dir = *delta;
        let new_dir = super::safe_normal(hit_normal.cross(&old_hit_normal));
        *delta = new_dir * (delta.dot(&new_dir) * (1.0 - hit.time));
        if desired_dir.dot(delta) < 0.0 {
            *delta = -*delta;
        }
    } else {
        let desired_dir = *delta;
        *delta = compute_slide_vector(*delta, 1.0 - hit.time, hit_normal);
        if delta.dot(&desired_dir) <= 0.0 {
            *delta = Vector3::zeros();
        } else if (hit_normal.dot(&old_hit_normal) - 1.0).abs() < consts::EPSILON {
            // Hit the same wall again despite the first adjustment; nudge away
            // from it to escape precision trouble.
            *delta += hit_normal * 0.01;
        }
    }

    if agent.mode == MovementMode::Walking {
        // Allow slides up walkable surfaces, treat unwalkable ones as walls.
        if delta.z > 0.0 {
            if (hit.normal.z >= params.walkable_floor_z || floor::is_walkable(params, hit))
                && hit.normal.z > consts::EPSILON
            {
                // Maintain horizontal speed up the ramp.
                let time = 1.0 - hit.time;
                let scaled = super::safe_normal(*delta) * in_delta.norm();
                *delta = Vector3::new(in_delta.x, in_delta.y, scaled.z / hit.normal.z) * time;

                // Never exceed the step height vertically; better to lose
                // horizontal speed than to climb too far.
                if delta.z > params.max_step_height {
                    let rescale = params.max_step_height / delta.z;
                    *delta *= rescale;
                }
            } else {
                delta.z = 0.0;
            }
        } else if delta.z < 0.0 {
            // Don't push down into the floor.
            if agent.floor.floor_dist < MIN_FLOOR_DIST && agent.floor.blocking_hit {
                delta.z = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slide_vector_projects_out_normal_component() {
        let delta = Vector3::new(10.0, 0.0, -5.0);
        let normal = Vector3::z();
        let slide = compute_slide_vector(delta, 1.0, normal);
        assert_eq!(slide, Vector3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn test_slide_vector_scales_by_remaining_time() {
        let delta = Vector3::new(10.0, 0.0, 0.0);
        let normal = Vector3::x();
        let slide = compute_slide_vector(delta, 0.5, normal);
        assert_eq!(slide, Vector3::zeros());
        let diagonal = compute_slide_vector(Vector3::new(10.0, 10.0, 0.0), 0.5, normal);
        assert_eq!(diagonal, Vector3::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn test_penetration_adjustment_uses_fallback_depth() {
        let mut hit = HitResult::default();
        hit.start_penetrating = true;
        hit.normal = Vector3::z();
        hit.penetration_depth = 0.0;
        let adj = penetration_adjustment(&hit);
        assert!((adj.z - (penetration::FALLBACK_DEPTH + penetration::PULLBACK_DISTANCE)).abs() < 1e-6);
    }
}
