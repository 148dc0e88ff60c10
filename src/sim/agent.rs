//! Per-agent movement state.

use nalgebra::{Isometry3, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rapier3d::prelude::ColliderHandle;
use serde::Deserialize;

use super::constants::queries as query_consts;
use super::physics::HitResult;

/// Capsule collision extent. `half_height` spans from the center to the tip
/// of a hemispherical cap, so it is never smaller than `radius`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CapsuleExtent {
    pub radius: f32,
    pub half_height: f32,
}

impl CapsuleExtent {
    pub fn new(radius: f32, half_height: f32) -> Self {
        let radius = radius.max(query_consts::MIN_CAPSULE_EXTENT);
        Self {
            radius,
            half_height: half_height.max(radius),
        }
    }

    /// Half-length of the cylindrical segment between the two cap centers.
    pub fn segment_half_length(&self) -> f32 {
        (self.half_height - self.radius).max(0.0)
    }

    pub fn inflated(&self, amount: f32) -> Self {
        Self::new(self.radius + amount, self.half_height + amount)
    }
}

impl Default for CapsuleExtent {
    fn default() -> Self {
        Self {
            radius: 42.0,
            half_height: 96.0,
        }
    }
}

/// Closed set of locomotion modes. New modes are added as new variants plus
/// handler functions, not through dynamic dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovementMode {
    None,
    #[default]
    Walking,
    Falling,
}

/// Cached outcome of the most recent floor scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloorResult {
    /// The scan hit something blocking, walkable or not.
    pub blocking_hit: bool,
    /// The hit surface can be stood on.
    pub walkable: bool,
    /// The result came from the line-trace fallback rather than the sweep.
    pub from_line_trace: bool,
    /// Distance from the capsule center's base to the swept contact (cm).
    pub floor_dist: f32,
    /// Distance measured by the line trace when it ran (cm).
    pub line_dist: f32,
    /// The underlying hit.
    pub hit: HitResult,
}

impl FloorResult {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_walkable_floor(&self) -> bool {
        self.blocking_hit && self.walkable
    }

    pub fn distance_to_floor(&self) -> f32 {
        if self.from_line_trace {
            self.line_dist
        } else {
            self.floor_dist
        }
    }

    pub fn set_from_sweep(&mut self, hit: &HitResult, sweep_dist: f32, walkable: bool) {
        self.blocking_hit = hit.blocking_hit;
        self.walkable = walkable;
        self.from_line_trace = false;
        self.floor_dist = sweep_dist;
        self.line_dist = 0.0;
        self.hit = *hit;
    }

    pub fn set_from_line_trace(
        &mut self,
        hit: &HitResult,
        sweep_dist: f32,
        line_dist: f32,
        walkable: bool,
    ) {
        // Keep the original sweep distance; the line distance only refines the
        // vertical adjustment.
        self.blocking_hit = hit.blocking_hit;
        self.walkable = walkable;
        self.from_line_trace = true;
        self.floor_dist = sweep_dist;
        self.line_dist = line_dist;
        self.hit = *hit;
    }
}

/// Reference to the surface an agent is standing on, plus the pose that
/// surface had when last observed. A pose change between ticks means the base
/// moved and any cached floor is stale.
#[derive(Debug, Clone, Copy)]
pub struct BasedMovement {
    pub base: Option<ColliderHandle>,
    pub old_base_pose: Isometry3<f32>,
}

impl Default for BasedMovement {
    fn default() -> Self {
        Self {
            base: None,
            old_base_pose: Isometry3::identity(),
        }
    }
}

/// Mutable simulation state for one agent. The locomotion routines take this
/// struct explicitly; there is no hidden instance state, which is what makes
/// the per-agent pass safe to parallelize.
#[derive(Debug)]
pub struct AgentState {
    pub id: u64,
    /// Capsule center, world space (cm).
    pub position: Vector3<f32>,
    /// Heading in radians about Z. Orientation never affects collision since
    /// the capsule is symmetric about its axis.
    pub yaw: f32,
    pub velocity: Vector3<f32>,
    /// Input acceleration for this tick, written by the upstream steering /
    /// avoidance phase. The solver reads it but never owns it.
    pub acceleration: Vector3<f32>,
    pub capsule: CapsuleExtent,
    pub mode: MovementMode,
    pub floor: FloorResult,
    pub based: BasedMovement,
    /// Seconds left in the jump-force window.
    pub jump_force_time_remaining: f32,
    /// Set when a displacement must not be attributed to velocity this tick.
    pub just_teleported: bool,
    /// Forces the next floor scan to ignore any cached result.
    pub force_next_floor_check: bool,
    pub rng: StdRng,
}

impl AgentState {
    pub fn new(id: u64, position: Vector3<f32>, capsule: CapsuleExtent) -> Self {
        Self {
            id,
            position,
            yaw: 0.0,
            velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
            capsule,
            mode: MovementMode::Walking,
            floor: FloorResult::default(),
            based: BasedMovement::default(),
            jump_force_time_remaining: 0.0,
            just_teleported: false,
            force_next_floor_check: true,
            rng: StdRng::seed_from_u64(id.wrapping_mul(0x9e37_79b9_7f4a_7c15)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capsule_segment_length() {
        let capsule = CapsuleExtent::new(42.0, 96.0);
        assert_eq!(capsule.segment_half_length(), 54.0);
    }

    #[test]
    fn test_capsule_extent_clamps_degenerate_input() {
        let capsule = CapsuleExtent::new(-3.0, 2.0);
        assert!(capsule.radius > 0.0);
        assert!(capsule.half_height >= capsule.radius);
    }

    #[test]
    fn test_floor_result_distance_prefers_line_trace() {
        let mut floor = FloorResult::default();
        floor.set_from_line_trace(&HitResult::default(), 3.0, 1.5, true);
        assert_eq!(floor.distance_to_floor(), 1.5);
        assert_eq!(floor.floor_dist, 3.0);
    }
}
