//! Collision world and shape-query service backed by rapier3d.
//!
//! The locomotion solver consumes exactly three primitives from this module:
//! capsule sweeps, overlap tests, and line traces. Every query takes `&self`,
//! so worker threads can issue them concurrently while the world is frozen
//! for the duration of a tick.

use nalgebra::{Isometry3, Point3, Vector3};
use rapier3d::parry::query::{self, ShapeCastOptions, ShapeCastStatus};
use rapier3d::parry::shape::Capsule;
use rapier3d::prelude::*;

use super::agent::CapsuleExtent;
use super::constants::queries as consts;

// Collision groups. Agents are pure query shapes and are never inserted into
// the collider set, so they only appear as a membership on the query filter.
pub const GROUP_WORLD: Group = Group::GROUP_1; // static level geometry
pub const GROUP_DEBRIS: Group = Group::GROUP_2; // dynamic pushable bodies
pub const GROUP_AGENT: Group = Group::GROUP_3; // agent query shapes

/// Result of a sweep or line trace against the collision world.
#[derive(Debug, Clone, Copy)]
pub struct HitResult {
    pub blocking_hit: bool,
    /// The query began already overlapping geometry; `normal` then holds the
    /// depenetration direction and `penetration_depth` the overlap depth.
    pub start_penetrating: bool,
    /// Fraction of the requested delta applied before the hit.
    pub time: f32,
    /// Distance travelled before the hit (cm).
    pub distance: f32,
    /// Shape center where the sweep stopped.
    pub location: Vector3<f32>,
    /// Normal on the swept capsule at the contact. Differs from
    /// `impact_normal` on rim and edge contacts.
    pub normal: Vector3<f32>,
    /// Surface normal of the geometry that was struck.
    pub impact_normal: Vector3<f32>,
    pub impact_point: Vector3<f32>,
    pub penetration_depth: f32,
    pub trace_start: Vector3<f32>,
    pub trace_end: Vector3<f32>,
    pub collider: Option<ColliderHandle>,
}

impl HitResult {
    pub fn no_hit(start: Vector3<f32>, end: Vector3<f32>) -> Self {
        Self {
            blocking_hit: false,
            start_penetrating: false,
            time: 1.0,
            distance: (end - start).norm(),
            location: end,
            normal: Vector3::zeros(),
            impact_normal: Vector3::zeros(),
            impact_point: end,
            penetration_depth: 0.0,
            trace_start: start,
            trace_end: end,
            collider: None,
        }
    }

    /// A hit that actually stopped the sweep somewhere along its path, as
    /// opposed to no hit at all or a penetrating start.
    pub fn is_valid_blocking_hit(&self) -> bool {
        self.blocking_hit && !self.start_penetrating
    }
}

impl Default for HitResult {
    fn default() -> Self {
        Self::no_hit(Vector3::zeros(), Vector3::zeros())
    }
}

/// Wrapper around the rapier3d sets and pipelines. Owns the static level
/// geometry plus any dynamic debris the agents can push around.
pub struct CollisionWorld {
    pub gravity: Vector<Real>,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub query_pipeline: QueryPipeline,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
}

impl CollisionWorld {
    pub fn new(gravity_z: f32) -> Self {
        Self {
            gravity: vector![0.0, 0.0, gravity_z],
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            query_pipeline: QueryPipeline::new(),
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
        }
    }

    /// Rebuilds the query acceleration structure after colliders changed.
    pub fn refresh_queries(&mut self) {
        self.query_pipeline.update(&self.colliders);
    }

    /// Advances dynamic debris. Agents are not simulated here; only bodies
    /// pushed by the impact dispatcher move.
    pub fn step_dynamics(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
        // Push forces are per-tick; don't let them accumulate across steps.
        for (_, body) in self.bodies.iter_mut() {
            body.reset_forces(false);
        }
    }

    /// Adds an axis-aligned static box.
    pub fn add_static_box(
        &mut self,
        center: Vector3<f32>,
        half_extents: Vector3<f32>,
    ) -> ColliderHandle {
        self.add_static_box_at(Isometry3::translation(center.x, center.y, center.z), half_extents)
    }

    /// Adds a static box with an arbitrary pose; used for ramps.
    pub fn add_static_box_at(
        &mut self,
        pose: Isometry3<f32>,
        half_extents: Vector3<f32>,
    ) -> ColliderHandle {
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .position(pose)
            .collision_groups(InteractionGroups::new(GROUP_WORLD, Group::ALL))
            .build();
        self.colliders.insert(collider)
    }

    /// Adds a dynamic box the agents can shove around.
    pub fn add_dynamic_box(
        &mut self,
        center: Vector3<f32>,
        half_extents: Vector3<f32>,
        density: f32,
    ) -> (RigidBodyHandle, ColliderHandle) {
        let body = RigidBodyBuilder::dynamic()
            .translation(center)
            .build();
        let body_handle = self.bodies.insert(body);
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .density(density)
            .collision_groups(InteractionGroups::new(GROUP_DEBRIS, Group::ALL))
            .build();
        let collider_handle =
            self.colliders
                .insert_with_parent(collider, body_handle, &mut self.bodies);
        (body_handle, collider_handle)
    }

    /// Adds a kinematic platform; its scripted motion is the caller's business.
    pub fn add_kinematic_platform(
        &mut self,
        center: Vector3<f32>,
        half_extents: Vector3<f32>,
    ) -> (RigidBodyHandle, ColliderHandle) {
        let body = RigidBodyBuilder::kinematic_velocity_based()
            .translation(center)
            .build();
        let body_handle = self.bodies.insert(body);
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .collision_groups(InteractionGroups::new(GROUP_WORLD, Group::ALL))
            .build();
        let collider_handle =
            self.colliders
                .insert_with_parent(collider, body_handle, &mut self.bodies);
        (body_handle, collider_handle)
    }

    fn agent_filter(&self) -> QueryFilter<'_> {
        QueryFilter::default()
            .exclude_sensors()
            .groups(InteractionGroups::new(
                GROUP_AGENT,
                GROUP_WORLD | GROUP_DEBRIS,
            ))
    }

    /// Sweeps a capsule from `start` by `delta` and reports the first
    /// blocking contact, if any.
    pub fn sweep_capsule(
        &self,
        capsule: &CapsuleExtent,
        start: Vector3<f32>,
        delta: Vector3<f32>,
    ) -> HitResult {
        self.sweep_capsule_ex(capsule, start, delta, true)
    }

    /// Sweep variant that can ignore an initial overlap, which is what lets
    /// the penetration resolver sweep its way out of geometry.
    pub fn sweep_capsule_ex(
        &self,
        capsule: &CapsuleExtent,
        start: Vector3<f32>,
        delta: Vector3<f32>,
        stop_at_penetration: bool,
    ) -> HitResult {
        let end = start + delta;
        let dist = delta.norm();
        if dist <= consts::MIN_SWEEP_DISTANCE {
            return HitResult::no_hit(start, end);
        }
        let dir = delta / dist;
        let shape = capsule_shape(capsule);
        let pose = Isometry3::translation(start.x, start.y, start.z);
        let options = ShapeCastOptions {
            max_time_of_impact: dist,
            target_distance: 0.0,
            stop_at_penetration,
            compute_impact_geometry_on_penetration: true,
        };
        let Some((handle, hit)) = self.query_pipeline.cast_shape(
            &self.bodies,
            &self.colliders,
            &pose,
            &dir,
            &shape,
            options,
            self.agent_filter(),
        ) else {
            return HitResult::no_hit(start, end);
        };

        if hit.status == ShapeCastStatus::PenetratingOrWithinTargetDist {
            return self.penetrating_hit(capsule, start, end, handle);
        }

        // Deposit the capsule a skin's width short of the exact contact so the
        // next query does not start penetrating.
        let applied = (hit.time_of_impact - consts::SWEEP_SKIN).max(0.0);
        let location = start + dir * applied;
        let (impact_point, impact_normal) = match self.contact_at(&shape, &location, handle) {
            Some(contact) => contact,
            None => (location + dir * capsule.radius, -dir),
        };
        let mut impact_normal = impact_normal;
        // The reported surface normal must face the capsule.
        if impact_normal.dot(&(location - impact_point)) < 0.0 {
            impact_normal = -impact_normal;
        }
        let normal =
            capsule_surface_normal(capsule, &location, &impact_point).unwrap_or(impact_normal);
        HitResult {
            blocking_hit: true,
            start_penetrating: false,
            time: applied / dist,
            distance: applied,
            location,
            normal,
            impact_normal,
            impact_point,
            penetration_depth: 0.0,
            trace_start: start,
            trace_end: end,
            collider: Some(handle),
        }
    }

    /// Builds the hit report for a sweep that started inside geometry: the
    /// deepest contact over everything we currently intersect, so one
    /// push-out resolves as much overlap as possible.
    fn penetrating_hit(
        &self,
        capsule: &CapsuleExtent,
        start: Vector3<f32>,
        end: Vector3<f32>,
        first: ColliderHandle,
    ) -> HitResult {
        let shape = capsule_shape(capsule);
        let pose = Isometry3::translation(start.x, start.y, start.z);
        let mut best_dist = f32::MAX;
        let mut depth = 0.0f32;
        let mut normal = Vector3::z();
        let mut point = start - Vector3::z() * capsule.half_height;
        let mut collider = first;
        self.query_pipeline.intersections_with_shape(
            &self.bodies,
            &self.colliders,
            &pose,
            &shape,
            self.agent_filter(),
            |handle| {
                if let Some(co) = self.colliders.get(handle) {
                    if let Ok(Some(contact)) =
                        query::contact(&pose, &shape, co.position(), co.shape(), 0.0)
                    {
                        if contact.dist < best_dist {
                            let p1 = contact.point1.coords;
                            let p2 = contact.point2.coords;
                            let toward_capsule = if contact.dist < 0.0 { p2 - p1 } else { p1 - p2 };
                            if let Some(n) = toward_capsule.try_normalize(1e-6) {
                                best_dist = contact.dist;
                                depth = (-contact.dist).max(0.0);
                                normal = n;
                                point = p2;
                                collider = handle;
                            }
                        }
                    }
                }
                true
            },
        );
        HitResult {
            blocking_hit: true,
            start_penetrating: true,
            time: 0.0,
            distance: 0.0,
            location: start,
            normal,
            impact_normal: normal,
            impact_point: point,
            penetration_depth: depth,
            trace_start: start,
            trace_end: end,
            collider: Some(collider),
        }
    }

    /// Closest contact between the capsule at `center` and one collider.
    /// Returns the contact point on the collider and the normal toward the
    /// capsule, both world space.
    fn contact_at(
        &self,
        shape: &Capsule,
        center: &Vector3<f32>,
        handle: ColliderHandle,
    ) -> Option<(Vector3<f32>, Vector3<f32>)> {
        let co = self.colliders.get(handle)?;
        let pose = Isometry3::translation(center.x, center.y, center.z);
        let contact = query::contact(
            &pose,
            shape,
            co.position(),
            co.shape(),
            consts::CONTACT_PREDICTION,
        )
        .ok()??;
        let p1 = contact.point1.coords;
        let p2 = contact.point2.coords;
        let toward_capsule = if contact.dist < 0.0 { p2 - p1 } else { p1 - p2 };
        let normal = toward_capsule.try_normalize(1e-6)?;
        Some((p2, normal))
    }

    /// True when an inflated capsule at `location` overlaps blocking geometry.
    pub fn overlap_test(
        &self,
        capsule: &CapsuleExtent,
        location: Vector3<f32>,
        inflation: f32,
    ) -> bool {
        let shape = capsule_shape(&capsule.inflated(inflation));
        let pose = Isometry3::translation(location.x, location.y, location.z);
        self.query_pipeline
            .intersection_with_shape(
                &self.bodies,
                &self.colliders,
                &pose,
                &shape,
                self.agent_filter(),
            )
            .is_some()
    }

    /// Ray cast from `start` to `end`.
    pub fn line_trace(&self, start: Vector3<f32>, end: Vector3<f32>) -> HitResult {
        let delta = end - start;
        let dist = delta.norm();
        if dist <= consts::MIN_SWEEP_DISTANCE {
            return HitResult::no_hit(start, end);
        }
        let dir = delta / dist;
        let ray = Ray::new(Point3::from(start), dir);
        match self.query_pipeline.cast_ray_and_get_normal(
            &self.bodies,
            &self.colliders,
            &ray,
            dist,
            true,
            self.agent_filter(),
        ) {
            None => HitResult::no_hit(start, end),
            Some((handle, intersection)) => {
                let toi = intersection.time_of_impact;
                let point = start + dir * toi;
                let mut normal = intersection.normal;
                if normal.dot(&dir) > 0.0 {
                    normal = -normal;
                }
                HitResult {
                    blocking_hit: true,
                    start_penetrating: toi <= 0.0,
                    time: toi / dist,
                    distance: toi,
                    location: point,
                    normal,
                    impact_normal: normal,
                    impact_point: point,
                    penetration_depth: 0.0,
                    trace_start: start,
                    trace_end: end,
                    collider: Some(handle),
                }
            }
        }
    }

    pub fn collider_pose(&self, handle: ColliderHandle) -> Option<Isometry3<f32>> {
        self.colliders.get(handle).map(|co| *co.position())
    }

    /// A base that cannot move under us: a plain static collider or one
    /// attached to a fixed body.
    pub fn is_static_blocker(&self, handle: ColliderHandle) -> bool {
        match self.colliders.get(handle) {
            None => false,
            Some(co) => match co.parent() {
                None => !co.is_sensor(),
                Some(body) => self.bodies.get(body).map(|b| b.is_fixed()).unwrap_or(false),
            },
        }
    }

    /// A base that can carry velocity: attached to a dynamic or kinematic body.
    pub fn is_moving_base(&self, handle: ColliderHandle) -> bool {
        self.body_of(handle)
            .and_then(|b| self.bodies.get(b))
            .map(|b| b.is_dynamic() || b.is_kinematic())
            .unwrap_or(false)
    }

    pub fn body_of(&self, handle: ColliderHandle) -> Option<RigidBodyHandle> {
        self.colliders.get(handle)?.parent()
    }

    /// The parent body when it simulates physics and can be pushed.
    pub fn dynamic_body_of(&self, handle: ColliderHandle) -> Option<RigidBodyHandle> {
        let body = self.body_of(handle)?;
        if self.bodies.get(body)?.is_dynamic() {
            Some(body)
        } else {
            None
        }
    }

    pub fn body_mass(&self, handle: RigidBodyHandle) -> f32 {
        self.bodies.get(handle).map(|b| b.mass()).unwrap_or(0.0)
    }

    pub fn body_linear_velocity(&self, handle: RigidBodyHandle) -> Vector3<f32> {
        self.bodies
            .get(handle)
            .map(|b| *b.linvel())
            .unwrap_or_else(Vector3::zeros)
    }

    /// Base velocity including the tangential component from rotation.
    pub fn base_velocity_at(&self, handle: ColliderHandle, point: Vector3<f32>) -> Vector3<f32> {
        self.body_of(handle)
            .and_then(|b| self.bodies.get(b))
            .map(|b| b.velocity_at_point(&Point3::from(point)))
            .unwrap_or_else(Vector3::zeros)
    }

    pub fn base_linear_velocity(&self, handle: ColliderHandle) -> Vector3<f32> {
        self.body_of(handle)
            .map(|b| self.body_linear_velocity(b))
            .unwrap_or_else(Vector3::zeros)
    }

    /// Center and half-extents of a body's combined bounds.
    pub fn body_bounds(&self, handle: RigidBodyHandle) -> Option<(Vector3<f32>, Vector3<f32>)> {
        let body = self.bodies.get(handle)?;
        let mut bounds: Option<Aabb> = None;
        for &collider_handle in body.colliders() {
            if let Some(co) = self.colliders.get(collider_handle) {
                let aabb = co.compute_aabb();
                bounds = Some(match bounds {
                    None => aabb,
                    Some(b) => b.merged(&aabb),
                });
            }
        }
        bounds.map(|b| (b.center().coords, b.half_extents()))
    }

    pub fn apply_impulse_at(
        &mut self,
        handle: RigidBodyHandle,
        impulse: Vector3<f32>,
        point: Vector3<f32>,
    ) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.apply_impulse_at_point(impulse, Point3::from(point), true);
        }
    }

    pub fn apply_force_at(
        &mut self,
        handle: RigidBodyHandle,
        force: Vector3<f32>,
        point: Vector3<f32>,
    ) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.add_force_at_point(force, Point3::from(point), true);
        }
    }
}

fn capsule_shape(extent: &CapsuleExtent) -> Capsule {
    Capsule::new_z(extent.segment_half_length(), extent.radius)
}

/// Normal on the capsule surface for a contact at `impact_point`, derived
/// from the capsule axis. Face contacts under the caps report straight up or
/// sideways; rim contacts report the tilted direction a swept-shape query
/// would, which is what distinguishes edge hits downstream.
fn capsule_surface_normal(
    extent: &CapsuleExtent,
    center: &Vector3<f32>,
    impact_point: &Vector3<f32>,
) -> Option<Vector3<f32>> {
    let seg = extent.segment_half_length();
    let clamped = (impact_point.z - center.z).clamp(-seg, seg);
    let axis_point = Vector3::new(center.x, center.y, center.z + clamped);
    (axis_point - impact_point).try_normalize(1e-6)
}
