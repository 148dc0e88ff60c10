//! Shared movement parameter record.

use serde::Deserialize;

/// Tunable locomotion parameters, shared read-only across every agent of an
/// archetype. Units are centimeters and seconds, Z is up.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MovementParams {
    /// Maximum ground speed (cm/s).
    pub max_speed: f32,
    /// Maximum input acceleration magnitude (cm/s^2).
    pub max_acceleration: f32,
    /// Maximum obstacle height an agent can step over (cm).
    pub max_step_height: f32,
    /// Longest downward scan used when settling a freshly spawned agent onto
    /// the ground. Must cover at least the step height.
    pub max_floor_trace_dist: f32,
    /// Minimum Z for a walkable surface normal, i.e. the cosine of the
    /// steepest walkable slope.
    pub walkable_floor_z: f32,
    /// Gravity along Z (cm/s^2, negative is down).
    pub gravity_z: f32,
    /// Friction when walking; higher values turn faster and, scaled by
    /// `braking_friction_factor`, stop faster.
    pub ground_friction: f32,
    /// Constant deceleration applied when walking with no input (cm/s^2).
    pub braking_deceleration_walking: f32,
    /// Constant lateral deceleration applied when falling with no input (cm/s^2).
    pub braking_deceleration_falling: f32,
    /// Multiplier on friction while braking.
    pub braking_friction_factor: f32,
    /// Sub-step used when integrating braking friction (s).
    pub braking_sub_step_time: f32,
    /// Friction applied to lateral movement while falling.
    pub falling_lateral_friction: f32,
    /// Fraction of lateral control available while falling; 0 none, 1 full.
    pub air_control: f32,
    /// Multiplier applied to `air_control` while lateral speed is below
    /// `air_control_boost_velocity_threshold`. Result clamped at 1.
    pub air_control_boost_multiplier: f32,
    /// Lateral speed below which the air-control boost kicks in (cm/s).
    pub air_control_boost_velocity_threshold: f32,
    /// Instantaneous vertical velocity applied when jumping (cm/s).
    pub jump_z_velocity: f32,
    /// Length of the jump-force window during which gravity may be deferred (s).
    pub jump_max_hold_time: f32,
    /// Apply gravity during the jump-force window.
    pub apply_gravity_while_jumping: bool,
    /// Extra height above the step limit an agent may hang while perched on a
    /// ledge edge.
    pub perch_additional_height: f32,
    /// Contacts closer than this to the capsule edge cannot be perched on (cm).
    pub perch_radius_threshold: f32,
    /// Extra probe depth when checking whether a sideways ledge move lands on
    /// walkable ground (cm).
    pub ledge_check_threshold: f32,
    /// Whether agents may walk off ledges at all.
    pub can_walk_off_ledges: bool,
    /// Recompute the floor every tick even when a cached result is usable.
    pub always_check_floor: bool,
    /// Impart the base's X velocity when leaving the ground.
    pub impart_base_velocity_x: bool,
    /// Impart the base's Y velocity when leaving the ground.
    pub impart_base_velocity_y: bool,
    /// Impart the base's Z velocity when leaving the ground.
    pub impart_base_velocity_z: bool,
    /// Also impart the tangential velocity from the base's rotation.
    pub impart_base_angular_velocity: bool,
    /// Push dynamic bodies that block movement.
    pub enable_physics_interaction: bool,
    /// Continuous push force applied to moving blocking bodies.
    pub push_force_factor: f32,
    /// Impulse applied when first bumping a resting body.
    pub initial_push_force_factor: f32,
    /// Scale the push force by the struck body's mass.
    pub push_force_scaled_to_mass: bool,
    /// Move the force application point vertically by
    /// `push_force_point_z_offset_factor` of the body's half-height.
    pub push_force_using_z_offset: bool,
    /// -1 bottom, 0 center, 1 top of the struck body.
    pub push_force_point_z_offset_factor: f32,
    /// Scale the push force down when the body already moves with the agent.
    pub scale_push_force_to_velocity: bool,
}

impl Default for MovementParams {
    fn default() -> Self {
        Self {
            max_speed: 600.0,
            max_acceleration: 2048.0,
            max_step_height: 45.0,
            max_floor_trace_dist: 200.0,
            walkable_floor_z: 0.71,
            gravity_z: -980.0,
            ground_friction: 8.0,
            braking_deceleration_walking: 250.0,
            braking_deceleration_falling: 0.0,
            braking_friction_factor: 2.0,
            braking_sub_step_time: 1.0 / 33.0,
            falling_lateral_friction: 0.0,
            air_control: 0.35,
            air_control_boost_multiplier: 2.0,
            air_control_boost_velocity_threshold: 25.0,
            jump_z_velocity: 700.0,
            jump_max_hold_time: 0.0,
            apply_gravity_while_jumping: true,
            perch_additional_height: 40.0,
            perch_radius_threshold: 15.0,
            ledge_check_threshold: 4.0,
            can_walk_off_ledges: true,
            always_check_floor: false,
            impart_base_velocity_x: true,
            impart_base_velocity_y: true,
            impart_base_velocity_z: true,
            impart_base_angular_velocity: true,
            enable_physics_interaction: true,
            push_force_factor: 750_000.0,
            initial_push_force_factor: 500.0,
            push_force_scaled_to_mass: false,
            push_force_using_z_offset: false,
            push_force_point_z_offset_factor: -0.75,
            scale_push_force_to_velocity: true,
        }
    }
}

impl MovementParams {
    /// Panics when the record is internally inconsistent. A bad record is a
    /// programming error in the embedding application, not a runtime
    /// condition the solver can recover from.
    pub fn validate(&self) {
        assert!(
            self.max_floor_trace_dist >= self.max_step_height,
            "max_floor_trace_dist ({}) must cover max_step_height ({})",
            self.max_floor_trace_dist,
            self.max_step_height
        );
        assert!(
            self.walkable_floor_z > 0.0 && self.walkable_floor_z <= 1.0,
            "walkable_floor_z must be a cosine in (0, 1], got {}",
            self.walkable_floor_z
        );
        assert!(
            self.gravity_z <= 0.0,
            "gravity_z must pull downward, got {}",
            self.gravity_z
        );
        assert!(self.max_speed >= 0.0 && self.max_acceleration >= 0.0);
    }
}
