//! Solver constants.
//! Centralizing these prevents bugs from duplicated hardcoded values.

/// Locomotion tuning constants shared by the walking and falling routines.
pub mod movement {
    /// Minimum delta time considered when ticking. Delta times below this are
    /// not simulated, avoiding divide-by-zero in the integration code.
    pub const MIN_TICK_TIME: f32 = 1e-6;

    /// Upper bound on mode-switch recursion and walking sub-iterations within
    /// one tick, so pathological geometry cannot loop forever.
    pub const MAX_SIMULATION_ITERATIONS: u32 = 8;

    /// Stop completely when braking and velocity magnitude is lower than this (cm/s).
    pub const BRAKE_TO_STOP_VELOCITY: f32 = 10.0;

    /// Vertical component below which a step-down contact counts as the side
    /// of a step rather than its top.
    pub const MAX_STEP_SIDE_Z: f32 = 0.08;

    /// Normals with a Z component below this are treated as vertical walls.
    pub const VERTICAL_SLOPE_NORMAL_Z: f32 = 0.001;

    /// Small-number tolerance for positions and normals (cm scale).
    pub const EPSILON: f32 = 1e-4;

    /// Shortest apex sub-step worth taking when crossing the jump peak (s).
    pub const APEX_TIME_MINIMUM: f32 = 1e-4;
}

/// Floor scanning constants.
pub mod floor {
    /// Minimum acceptable distance for the capsule to float above the floor
    /// when walking (cm).
    pub const MIN_FLOOR_DIST: f32 = 1.9;

    /// Maximum acceptable distance for the capsule to float above the floor
    /// when walking (cm).
    pub const MAX_FLOOR_DIST: f32 = 2.4;

    /// Reject sweep impacts this close to the rim of the capsule when
    /// sweeping vertically, and retry with a smaller capsule.
    pub const SWEEP_EDGE_REJECT_DISTANCE: f32 = 0.15;

    /// Smallest radius a perch probe is allowed to shrink to (cm).
    pub const MIN_PERCH_RADIUS: f32 = 0.11;
}

/// Penetration recovery constants.
pub mod penetration {
    /// Extra pull-back added on top of the reported penetration depth so the
    /// recovered pose is not immediately touching again (cm).
    pub const PULLBACK_DISTANCE: f32 = 0.125;

    /// Depth assumed when a penetrating contact reports no usable depth (cm).
    pub const FALLBACK_DEPTH: f32 = 0.125;

    /// Inflation applied to the overlap test that vets a proposed
    /// depenetration target, making it stricter than the sweep (cm).
    pub const OVERLAP_INFLATION: f32 = 0.1;
}

/// Shape-query constants.
pub mod queries {
    /// Sweeps deposit the capsule this far short of the exact contact so the
    /// next query does not start penetrating (cm).
    pub const SWEEP_SKIN: f32 = 0.01;

    /// Margin for the contact probe that extracts impact geometry at the end
    /// of a sweep (cm).
    pub const CONTACT_PREDICTION: f32 = 0.1;

    /// Sweeps shorter than this are treated as no movement (cm).
    pub const MIN_SWEEP_DISTANCE: f32 = 1e-5;

    /// Capsules never shrink below this extent (cm).
    pub const MIN_CAPSULE_EXTENT: f32 = 1e-3;
}
