//! Wander-target input producer.
//!
//! Agents wander within a radius of their home position: pick a random
//! target, steer toward it with bounded acceleration, pick a new one on
//! arrival. This runs before the locomotion pass and only writes the input
//! acceleration; the solver never sees targets.

use nalgebra::Vector3;
use rand::Rng;
use serde::Deserialize;

/// Wander tuning, shared per archetype.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WanderParams {
    /// Distance at which a target counts as reached (cm).
    pub acceptance_radius: f32,
    /// Targets are picked inside a square of this half-width around the home
    /// position (cm).
    pub move_dist_max: f32,
}

impl Default for WanderParams {
    fn default() -> Self {
        Self {
            acceptance_radius: 20.0,
            move_dist_max: 400.0,
        }
    }
}

/// Current wander goal for one agent.
#[derive(Debug, Clone, Copy)]
pub struct MoveTarget {
    pub target: Vector3<f32>,
    pub distance_to_goal: f32,
    pub arrived: bool,
}

impl MoveTarget {
    pub fn at(position: Vector3<f32>) -> Self {
        Self {
            target: position,
            distance_to_goal: 0.0,
            arrived: true,
        }
    }
}

/// Re-targets on arrival and refreshes the distance to goal.
pub fn update_wander_target(
    move_target: &mut MoveTarget,
    current: Vector3<f32>,
    home: Vector3<f32>,
    params: &WanderParams,
    rng: &mut impl Rng,
) {
    if move_target.arrived || move_target.distance_to_goal <= params.acceptance_radius {
        let offset = Vector3::new(
            rng.gen_range(-params.move_dist_max..=params.move_dist_max),
            rng.gen_range(-params.move_dist_max..=params.move_dist_max),
            0.0,
        );
        move_target.target = home + offset;
        move_target.arrived = false;
    }

    let to_target = move_target.target - current;
    move_target.distance_to_goal = (to_target.x * to_target.x + to_target.y * to_target.y).sqrt();
    if move_target.distance_to_goal <= params.acceptance_radius {
        move_target.arrived = true;
    }
}

/// Horizontal acceleration toward the target; zero once arrived.
pub fn acceleration_toward(
    move_target: &MoveTarget,
    current: Vector3<f32>,
    accel_magnitude: f32,
) -> Vector3<f32> {
    if move_target.arrived {
        return Vector3::zeros();
    }
    let mut dir = move_target.target - current;
    dir.z = 0.0;
    match dir.try_normalize(1e-6) {
        Some(dir) => dir * accel_magnitude,
        None => Vector3::zeros(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_retargets_on_arrival() {
        let params = WanderParams::default();
        let mut rng = StdRng::seed_from_u64(1);
        let home = Vector3::new(100.0, 100.0, 0.0);
        let mut target = MoveTarget::at(home);

        update_wander_target(&mut target, home, home, &params, &mut rng);
        assert!(!target.arrived);
        // Target stays inside the wander square.
        assert!((target.target.x - home.x).abs() <= params.move_dist_max);
        assert!((target.target.y - home.y).abs() <= params.move_dist_max);
    }

    #[test]
    fn test_arrives_within_acceptance_radius() {
        let params = WanderParams::default();
        let mut rng = StdRng::seed_from_u64(2);
        let home = Vector3::zeros();
        let mut target = MoveTarget::at(home);
        update_wander_target(&mut target, home, home, &params, &mut rng);

        let goal = target.target;
        update_wander_target(&mut target, goal + Vector3::new(5.0, 0.0, 0.0), home, &params, &mut rng);
        assert!(target.arrived);
    }

    #[test]
    fn test_acceleration_is_horizontal_and_bounded() {
        let target = MoveTarget {
            target: Vector3::new(100.0, 0.0, 50.0),
            distance_to_goal: 100.0,
            arrived: false,
        };
        let accel = acceleration_toward(&target, Vector3::zeros(), 2048.0);
        assert_eq!(accel.z, 0.0);
        assert!((accel.norm() - 2048.0).abs() < 1e-3);
        assert!(accel.x > 0.0);
    }
}
