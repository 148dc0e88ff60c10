//! Floor scanning: the downward probes that decide whether, and how far
//! below, a walkable surface lies under a capsule.

use nalgebra::Vector3;

use super::super::agent::{AgentState, CapsuleExtent, FloorResult, MovementMode};
use super::super::constants::floor::{
    MAX_FLOOR_DIST, MIN_FLOOR_DIST, MIN_PERCH_RADIUS, SWEEP_EDGE_REJECT_DISTANCE,
};
use super::super::constants::movement as consts;
use super::super::params::MovementParams;
use super::super::physics::HitResult;
use super::MoveContext;

/// A hit can be stood on iff it is a clean blocking hit whose surface normal
/// is steeper than the configured cosine. Vertical and overhanging surfaces
/// are never walkable.
pub(crate) fn is_walkable(params: &MovementParams, hit: &HitResult) -> bool {
    if !hit.is_valid_blocking_hit() {
        return false;
    }
    if hit.impact_normal.z < consts::EPSILON {
        return false;
    }
    hit.impact_normal.z >= params.walkable_floor_z
}

/// Rejects contacts that sit on the cusp of the capsule's vertical rim;
/// those belong to adjacent geometry rather than the floor below.
pub(crate) fn is_within_edge_tolerance(
    capsule_location: &Vector3<f32>,
    impact_point: &Vector3<f32>,
    capsule_radius: f32,
) -> bool {
    let dist_sq = super::size_2d_squared(&(impact_point - capsule_location));
    let reduced = (capsule_radius - SWEEP_EDGE_REJECT_DISTANCE)
        .max(SWEEP_EDGE_REJECT_DISTANCE + consts::EPSILON);
    dist_sq < reduced * reduced
}

/// Sweeps a shrunk capsule straight down (with a line-trace fallback when the
/// sweep starts penetrated) and classifies what it finds.
///
/// `sweep_distance` must cover `line_distance`, otherwise the result could
/// not be interpreted consistently; violating that is a configuration error.
pub(crate) fn compute_floor_dist(
    capsule: &CapsuleExtent,
    ctx: &MoveContext<'_>,
    capsule_location: Vector3<f32>,
    line_distance: f32,
    sweep_distance: f32,
    sweep_radius: f32,
    downward_sweep_result: Option<&HitResult>,
) -> FloorResult {
    let params = ctx.params;
    let mut out = FloorResult::default();
    let radius = capsule.radius;
    let half_height = capsule.half_height;

    let mut skip_sweep = false;
    if let Some(ds) = downward_sweep_result {
        if ds.is_valid_blocking_hit() {
            // Reuse the supplied sweep only if it was vertical and downward.
            let horizontal_sq =
                super::size_2d_squared(&(ds.trace_start - ds.trace_end));
            if ds.trace_start.z > ds.trace_end.z && horizontal_sq <= consts::EPSILON {
                if is_within_edge_tolerance(&ds.location, &ds.impact_point, radius) {
                    // Don't run a redundant sweep, whether or not this one is usable.
                    skip_sweep = true;
                    let walkable = is_walkable(params, ds);
                    let floor_dist = capsule_location.z - ds.location.z;
                    out.set_from_sweep(ds, floor_dist, walkable);
                    if walkable {
                        return out;
                    }
                }
            }
        }
    }

    assert!(
        sweep_distance >= line_distance,
        "floor sweep distance ({sweep_distance}) must cover the line-trace distance ({line_distance})"
    );

    if !skip_sweep && sweep_distance > 0.0 && sweep_radius > 0.0 {
        // Use a shorter capsule so a sweep that starts flush on a surface
        // still produces a usable result, and so we can measure back out of
        // penetrations.
        let shrink_scale = 0.9;
        let shrink_scale_overlap = 0.1;
        let mut shrink_height = (half_height - radius) * (1.0 - shrink_scale);
        let mut trace_dist = sweep_distance + shrink_height;
        let mut probe = CapsuleExtent {
            radius: sweep_radius,
            half_height: (half_height - shrink_height).max(sweep_radius),
        };

        let mut hit = ctx.world.sweep_capsule(
            &probe,
            capsule_location,
            Vector3::new(0.0, 0.0, -trace_dist),
        );

        if hit.blocking_hit {
            // Only contacts on the bottom of the capsule count; anything on
            // the rim is adjacent geometry. Retry once with a smaller radius.
            if hit.start_penetrating
                || !is_within_edge_tolerance(&capsule_location, &hit.impact_point, probe.radius)
            {
                probe.radius =
                    (probe.radius - SWEEP_EDGE_REJECT_DISTANCE - consts::EPSILON).max(0.0);
                if probe.radius > consts::EPSILON * 10.0 {
                    shrink_height = (half_height - radius) * (1.0 - shrink_scale_overlap);
                    trace_dist = sweep_distance + shrink_height;
                    probe.half_height = (half_height - shrink_height).max(probe.radius);
                    hit = ctx.world.sweep_capsule(
                        &probe,
                        capsule_location,
                        Vector3::new(0.0, 0.0, -trace_dist),
                    );
                }
            }

            // Compensate for the shrunk sweep shape. Negative distances are
            // allowed; they pull us out of penetrations.
            let max_penetration_adjust = MAX_FLOOR_DIST.max(radius);
            let sweep_result =
                (hit.time * trace_dist - shrink_height).max(-max_penetration_adjust);

            out.set_from_sweep(&hit, sweep_result, false);
            if hit.is_valid_blocking_hit()
                && is_walkable(params, &hit)
                && sweep_result <= sweep_distance
            {
                out.walkable = true;
                return out;
            }
        }
    }

    // The sweep is longer than the line trace, so if it missed everything
    // there is no point tracing. A sweep stuck in penetration is the one case
    // where the line can still tell us something.
    if !out.blocking_hit && !out.hit.start_penetrating {
        out.floor_dist = sweep_distance;
        return out;
    }

    if line_distance > 0.0 {
        let shrink_height = half_height;
        let trace_dist = line_distance + shrink_height;
        let hit = ctx.world.line_trace(
            capsule_location,
            capsule_location + Vector3::new(0.0, 0.0, -trace_dist),
        );
        if hit.blocking_hit && hit.time > 0.0 {
            let max_penetration_adjust = MAX_FLOOR_DIST.max(radius);
            let line_result = (hit.time * trace_dist - shrink_height).max(-max_penetration_adjust);
            out.blocking_hit = true;
            if line_result <= line_distance && is_walkable(params, &hit) {
                let sweep_dist = out.floor_dist;
                out.set_from_line_trace(&hit, sweep_dist, line_result, true);
                return out;
            }
        }
    }

    // Nothing acceptable. Not an error: this is what starts a fall.
    out.walkable = false;
    out
}

/// Full floor scan for an agent: cached fast path, fresh probe, and the
/// perch fallback that lets an agent balance on a ledge its full radius has
/// already slipped off.
pub(crate) fn find_floor(
    agent: &mut AgentState,
    ctx: &MoveContext<'_>,
    capsule_location: Vector3<f32>,
    can_use_cached: bool,
    downward_sweep_result: Option<&HitResult>,
) -> FloorResult {
    let params = ctx.params;

    // Scan slightly further while walking so the height adjustment cannot
    // immediately invalidate the result.
    let height_check_adjust = if agent.mode == MovementMode::Walking {
        MAX_FLOOR_DIST + consts::EPSILON
    } else {
        -MAX_FLOOR_DIST
    };
    let sweep_dist = MAX_FLOOR_DIST.max(params.max_step_height + height_check_adjust);
    let line_dist = sweep_dist;

    let mut need_to_validate_floor = true;
    let mut out;
    if params.always_check_floor
        || !can_use_cached
        || agent.force_next_floor_check
        || agent.just_teleported
    {
        agent.force_next_floor_check = false;
        out = compute_floor_dist(
            &agent.capsule,
            ctx,
            capsule_location,
            line_dist,
            sweep_dist,
            agent.capsule.radius,
            downward_sweep_result,
        );
    } else {
        // Cached path: only trustworthy while standing still on a static
        // base whose pose has not changed since we recorded it.
        let base_unchanged = agent.based.base.is_some_and(|handle| {
            ctx.world.is_static_blocker(handle)
                && ctx
                    .world
                    .collider_pose(handle)
                    .is_some_and(|pose| {
                        (pose.translation.vector - agent.based.old_base_pose.translation.vector)
                            .norm()
                            <= consts::EPSILON
                    })
        });
        if base_unchanged {
            out = agent.floor;
            need_to_validate_floor = false;
        } else {
            agent.force_next_floor_check = false;
            out = compute_floor_dist(
                &agent.capsule,
                ctx,
                capsule_location,
                line_dist,
                sweep_dist,
                agent.capsule.radius,
                downward_sweep_result,
            );
        }
    }

    // See whether we should try to perch at this location: the swept result
    // hit something, but possibly too close to the capsule edge to stand on
    // at full radius.
    if need_to_validate_floor && out.blocking_hit && !out.from_line_trace {
        if should_compute_perch_result(&agent.capsule, params, &out.hit, true) {
            let mut max_perch_floor_dist =
                MAX_FLOOR_DIST.max(params.max_step_height + height_check_adjust);
            if agent.mode == MovementMode::Walking {
                max_perch_floor_dist += params.perch_additional_height.max(0.0);
            }

            let perch_radius = valid_perch_radius(&agent.capsule, params);
            match compute_perch_result(agent, ctx, perch_radius, &out.hit, max_perch_floor_dist) {
                Some(perch) => {
                    // Don't let the height adjustment push us past the perch
                    // distance, or we would fall next tick.
                    let avg_floor_dist = (MIN_FLOOR_DIST + MAX_FLOOR_DIST) * 0.5;
                    let move_up_dist = avg_floor_dist - out.floor_dist;
                    if move_up_dist + perch.floor_dist >= max_perch_floor_dist {
                        out.floor_dist = avg_floor_dist;
                    }

                    // The full-radius result may be unwalkable while the
                    // perched probe can stand; synthesize a walkable result
                    // from the perch hit in that case.
                    if !out.walkable {
                        let sweep_dist_saved = out.floor_dist;
                        let line_result = out.floor_dist.max(MIN_FLOOR_DIST);
                        out.set_from_line_trace(&perch.hit, sweep_dist_saved, line_result, true);
                    }
                }
                None => {
                    // No floor and no perch; invalidate so we start falling.
                    out.walkable = false;
                }
            }
        }
    }

    out
}

pub(crate) fn perch_radius_threshold(params: &MovementParams) -> f32 {
    params.perch_radius_threshold.max(0.0)
}

pub(crate) fn valid_perch_radius(capsule: &CapsuleExtent, params: &MovementParams) -> f32 {
    (capsule.radius - perch_radius_threshold(params)).clamp(MIN_PERCH_RADIUS, capsule.radius)
}

pub(crate) fn should_compute_perch_result(
    capsule: &CapsuleExtent,
    params: &MovementParams,
    in_hit: &HitResult,
    check_radius: bool,
) -> bool {
    if !in_hit.is_valid_blocking_hit() {
        return false;
    }
    // Not worth perching when the edge band is this thin.
    if perch_radius_threshold(params) <= SWEEP_EDGE_REJECT_DISTANCE {
        return false;
    }
    if check_radius {
        let dist_sq = super::size_2d_squared(&(in_hit.impact_point - in_hit.location));
        let stand_on_edge_radius = valid_perch_radius(capsule, params);
        if dist_sq <= stand_on_edge_radius * stand_on_edge_radius {
            // Already standing within the perch radius.
            return false;
        }
    }
    true
}

/// Re-probes with a reduced "standing" radius to decide whether the agent
/// can balance on a marginal ledge contact.
pub(crate) fn compute_perch_result(
    agent: &AgentState,
    ctx: &MoveContext<'_>,
    test_radius: f32,
    in_hit: &HitResult,
    in_max_floor_dist: f32,
) -> Option<FloorResult> {
    if in_max_floor_dist <= 0.0 {
        return None;
    }

    // Sweep further than requested: the reduced radius can miss contacts the
    // full radius would touch.
    let radius = agent.capsule.radius;
    let half_height = agent.capsule.half_height;
    let capsule_location = in_hit.location;

    let in_hit_above_base =
        (in_hit.impact_point.z - (capsule_location.z - half_height)).max(0.0);
    let perch_line_dist = (in_max_floor_dist - in_hit_above_base).max(0.0);
    let perch_sweep_dist = in_max_floor_dist.max(0.0);
    let actual_sweep_dist = perch_sweep_dist + radius;

    let perch = compute_floor_dist(
        &agent.capsule,
        ctx,
        capsule_location,
        perch_line_dist,
        actual_sweep_dist,
        test_radius,
        None,
    );

    if !perch.is_walkable_floor() {
        return None;
    }
    if in_hit_above_base + perch.floor_dist > in_max_floor_dist {
        // Hit something past the maximum distance.
        return None;
    }
    Some(perch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit_with_normal_z(z: f32) -> HitResult {
        let mut hit = HitResult::default();
        hit.blocking_hit = true;
        hit.impact_normal = Vector3::new((1.0 - z * z).max(0.0).sqrt(), 0.0, z);
        hit.normal = hit.impact_normal;
        hit
    }

    #[test]
    fn test_walkability_threshold() {
        let params = MovementParams::default();
        // 44 degrees is walkable at the default 0.71 cosine threshold.
        assert!(is_walkable(&params, &hit_with_normal_z(44.0f32.to_radians().cos())));
        // 46 degrees is not.
        assert!(!is_walkable(&params, &hit_with_normal_z(46.0f32.to_radians().cos())));
    }

    #[test]
    fn test_vertical_surfaces_never_walkable() {
        let params = MovementParams {
            walkable_floor_z: 0.0000001,
            ..MovementParams::default()
        };
        assert!(!is_walkable(&params, &hit_with_normal_z(0.0)));
        assert!(!is_walkable(&params, &hit_with_normal_z(-0.5)));
    }

    #[test]
    fn test_penetrating_hits_not_walkable() {
        let params = MovementParams::default();
        let mut hit = hit_with_normal_z(1.0);
        hit.start_penetrating = true;
        assert!(!is_walkable(&params, &hit));
    }

    #[test]
    fn test_edge_tolerance() {
        let center = Vector3::new(0.0, 0.0, 96.0);
        let radius = 42.0;
        // Directly below: fine.
        assert!(is_within_edge_tolerance(&center, &Vector3::new(0.0, 0.0, 0.0), radius));
        // On the rim: rejected.
        assert!(!is_within_edge_tolerance(&center, &Vector3::new(41.95, 0.0, 50.0), radius));
    }

    #[test]
    fn test_perch_radius_never_negative() {
        let params = MovementParams {
            perch_radius_threshold: 500.0,
            ..MovementParams::default()
        };
        let capsule = CapsuleExtent::new(42.0, 96.0);
        let radius = valid_perch_radius(&capsule, &params);
        assert!(radius >= MIN_PERCH_RADIUS);
        assert!(radius <= capsule.radius);
    }
}
