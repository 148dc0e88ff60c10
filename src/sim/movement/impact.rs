//! Push forces for dynamic bodies struck during movement.
//!
//! Worker threads must not mutate the shared world mid-pass, so the
//! dispatcher only *emits* commands here; the simulation flushes them
//! single-threaded once the parallel phase is done.

use nalgebra::Vector3;
use rapier3d::prelude::RigidBodyHandle;

use super::super::constants::movement as consts;
use super::super::physics::HitResult;
use super::MoveContext;

/// World mutation deferred to the post-pass flush.
#[derive(Debug, Clone, Copy)]
pub enum WorldCommand {
    Impulse {
        body: RigidBodyHandle,
        impulse: Vector3<f32>,
        point: Vector3<f32>,
    },
    Force {
        body: RigidBodyHandle,
        force: Vector3<f32>,
        point: Vector3<f32>,
    },
}

/// Queues a push against the dynamic body behind `impact`, if there is one.
/// A resting body gets a one-off impulse; a body already in motion gets a
/// continuous force, optionally scaled toward velocity parity and by mass.
pub(crate) fn apply_impact_physics_forces(
    ctx: &MoveContext<'_>,
    impact: &HitResult,
    impact_acceleration: &Vector3<f32>,
    impact_velocity: &Vector3<f32>,
) {
    let params = ctx.params;
    if !params.enable_physics_interaction || !impact.blocking_hit {
        return;
    }
    let Some(collider) = impact.collider else {
        return;
    };
    let Some(body) = ctx.world.dynamic_body_of(collider) else {
        return;
    };

    // Mass is a multiplier below, so keep it sane.
    let body_mass = ctx.world.body_mass(body).max(1.0);

    let mut force_point = impact.impact_point;
    if params.push_force_using_z_offset {
        if let Some((center, extents)) = ctx.world.body_bounds(body) {
            if extents.norm_squared() > consts::EPSILON {
                force_point.z = center.z + extents.z * params.push_force_point_z_offset_factor;
            }
        }
    }

    let mut force = -impact.impact_normal;
    let mut push_force_modificator = 1.0;

    let component_velocity = ctx.world.body_linear_velocity(body);
    let virtual_velocity = if *impact_acceleration == Vector3::zeros() {
        *impact_velocity
    } else {
        super::safe_normal(*impact_acceleration) * params.max_speed
    };

    if params.scale_push_force_to_velocity && component_velocity.norm_squared() > consts::EPSILON {
        // Don't accelerate a body that already matches our velocity.
        let dot = component_velocity.dot(&virtual_velocity);
        if dot > 0.0 && dot < 1.0 {
            push_force_modificator *= dot;
        }
    }

    if params.push_force_scaled_to_mass {
        push_force_modificator *= body_mass;
    }

    force *= push_force_modificator;

    let zero_velocity_tolerance = 1.0;
    if component_velocity.norm() <= zero_velocity_tolerance {
        force *= params.initial_push_force_factor;
        let _ = ctx.commands.send(WorldCommand::Impulse {
            body,
            impulse: force,
            point: force_point,
        });
    } else {
        force *= params.push_force_factor;
        let _ = ctx.commands.send(WorldCommand::Force {
            body,
            force,
            point: force_point,
        });
    }
}
