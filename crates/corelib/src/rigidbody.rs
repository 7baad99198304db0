//! Rigid-body simulation settings.
//!
//! These are passive records: the configuration surface a physics engine
//! would be driven with (world stepping, per-body material and damping,
//! constraint limits, springs and motors). Nothing here steps a simulation.
//! Records persist as RON; runtime-only state (engine handles, the point
//! cache) lives behind a reference-counted [`Shared`] block that every
//! clone of a record points at, and is never serialized or compared.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use common::{CoreError, CoreResult};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::flags::flag_set;
use crate::id::{CollectionId, ObjectId};
use crate::{Quat, Vec3};

/// Opaque reference to an object owned by an external physics engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PhysicsHandle(pub u64);

/// Runtime block shared between an original record and its evaluated copies.
pub struct Shared<T>(Arc<RwLock<T>>);

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write()
    }

    /// `true` when both handles point at the same block.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Default> Default for Shared<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Shared(..)")
    }
}

/// Runtime state is not part of a record's value.
impl<T> PartialEq for Shared<T> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// World

flag_set! {
    pub struct WorldFlags {
        /// Skip the world when evaluating.
        const MUTED = 1 << 0;
        const NEEDS_REBUILD = 1 << 1;
        const USE_SPLIT_IMPULSE = 1 << 2;
        const OBJECT_CHANGED = 1 << 3;
        const REFRESH_MODIFIERS = 1 << 4;
        const REBUILD_CONSTRAINTS = 1 << 5;
        const VISUALIZE_PHYSICS = 1 << 6;
    }
}

/// Simulated transform of one body at one frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    pub position: Vec3,
    pub orientation: Quat,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PointCache {
    pub start_frame: i32,
    pub end_frame: i32,
    frames: BTreeMap<i32, Vec<BodyState>>,
}

impl Default for PointCache {
    fn default() -> Self {
        Self {
            start_frame: 1,
            end_frame: 250,
            frames: BTreeMap::new(),
        }
    }
}

impl PointCache {
    /// Store body states for `frame`; frames outside the cache range are ignored.
    pub fn store(&mut self, frame: i32, states: Vec<BodyState>) -> bool {
        if frame < self.start_frame || frame > self.end_frame {
            return false;
        }
        self.frames.insert(frame, states);
        true
    }

    pub fn get(&self, frame: i32) -> Option<&[BodyState]> {
        self.frames.get(&frame).map(Vec::as_slice)
    }

    pub fn last_cached_frame(&self) -> Option<i32> {
        self.frames.keys().next_back().copied()
    }

    pub fn cached_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[derive(Debug, Default)]
pub struct WorldShared {
    pub point_cache: PointCache,
    pub physics_world: Option<PhysicsHandle>,
}

/// A simulation scene inside the parent scene.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidBodyWorld {
    /// Collection whose objects take part in the simulation.
    #[serde(skip)]
    pub group: Option<CollectionId>,
    /// Collection whose objects carry constraints.
    #[serde(skip)]
    pub constraints: Option<CollectionId>,
    /// Last frame the world was evaluated for.
    pub last_time: f32,
    pub num_bodies: u32,
    pub steps_per_second: i16,
    /// Constraint solver iterations per simulation step.
    pub num_solver_iterations: i16,
    pub flag: WorldFlags,
    pub time_scale: f32,
    #[serde(skip)]
    pub shared: Shared<WorldShared>,
}

impl Default for RigidBodyWorld {
    fn default() -> Self {
        Self {
            group: None,
            constraints: None,
            last_time: 1.0,
            num_bodies: 0,
            steps_per_second: 60,
            num_solver_iterations: 10,
            flag: WorldFlags::NEEDS_REBUILD,
            time_scale: 1.0,
            shared: Shared::default(),
        }
    }
}

impl RigidBodyWorld {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_muted(&self) -> bool {
        self.flag.contains(WorldFlags::MUTED)
    }

    #[inline]
    pub fn needs_rebuild(&self) -> bool {
        self.flag.contains(WorldFlags::NEEDS_REBUILD)
    }

    /// Simulation sub-step length in seconds.
    pub fn step_size(&self) -> f32 {
        self.time_scale / f32::from(self.steps_per_second.max(1))
    }

    /// Drop cached results and request a rebuild.
    pub fn reset_cache(&mut self) {
        self.shared.write().point_cache.clear();
        self.flag.insert(WorldFlags::NEEDS_REBUILD);
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.steps_per_second <= 0 {
            return Err(invalid("world steps_per_second must be positive"));
        }
        if self.num_solver_iterations <= 0 {
            return Err(invalid("world num_solver_iterations must be positive"));
        }
        if !self.time_scale.is_finite() || self.time_scale < 0.0 {
            return Err(invalid("world time_scale must be finite and non-negative"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Bodies

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyType {
    /// Driven by the simulation.
    #[default]
    Active = 0,
    /// Driven by animation; other bodies collide with it.
    Passive = 1,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollisionShape {
    #[default]
    Box = 0,
    Sphere,
    Capsule,
    Cylinder,
    Cone,
    ConvexHull,
    TriangleMesh,
    /// Concave mesh approximated using primitives.
    Compound,
}

impl CollisionShape {
    /// Shapes built from mesh geometry rather than bounds.
    pub fn is_mesh_based(self) -> bool {
        matches!(
            self,
            CollisionShape::ConvexHull | CollisionShape::TriangleMesh | CollisionShape::Compound
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeshSource {
    Base = 0,
    #[default]
    Deform,
    Final,
    FinalSolid,
}

flag_set! {
    pub struct BodyFlags {
        /// Controlled by the animation system.
        const KINEMATIC = 1 << 0;
        const NEEDS_VALIDATE = 1 << 1;
        const NEEDS_RESHAPE = 1 << 2;
        const USE_DEACTIVATION = 1 << 3;
        const START_DEACTIVATED = 1 << 4;
        const DISABLED = 1 << 5;
        const USE_MARGIN = 1 << 6;
        const USE_DEFORM = 1 << 7;
        const KINEMATIC_REBUILD = 1 << 8;
        const IS_TRIGGERED = 1 << 9;
        const IS_GHOST = 1 << 10;
        const IS_TRIGGER = 1 << 11;
        const PROPAGATE_TRIGGER = 1 << 12;
        const CONSTRAINT_DISSOLVE = 1 << 13;
        const DYNAMIC_TRIGGER = 1 << 14;
        const PLASTIC_DISSOLVE = 1 << 15;
        const ANTI_TRIGGER = 1 << 16;
        const KINEMATIC_BOUND = 1 << 17;
    }
}

#[derive(Debug, Default)]
pub struct BodyShared {
    pub physics_object: Option<PhysicsHandle>,
    pub physics_shape: Option<PhysicsHandle>,
}

/// Per-object participation in a rigid-body world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidBodyObject {
    pub body_type: BodyType,
    pub shape: CollisionShape,
    pub flag: BodyFlags,
    /// Bitmask of collision groups this body belongs to.
    pub col_groups: u32,
    pub mesh_source: MeshSource,

    pub mass: f32,
    pub friction: f32,
    pub restitution: f32,
    /// Collision detection tolerance.
    pub margin: f32,
    pub lin_damping: f32,
    pub ang_damping: f32,
    pub lin_sleep_thresh: f32,
    pub ang_sleep_thresh: f32,

    pub orientation: Quat,
    pub position: Vec3,
    pub lin_vel: Vec3,
    pub ang_vel: Vec3,
    pub force_thresh: f32,

    #[serde(skip)]
    pub shared: Shared<BodyShared>,
}

impl Default for RigidBodyObject {
    fn default() -> Self {
        Self::new(BodyType::Active)
    }
}

impl RigidBodyObject {
    pub fn new(body_type: BodyType) -> Self {
        let shape = match body_type {
            BodyType::Active => CollisionShape::ConvexHull,
            BodyType::Passive => CollisionShape::TriangleMesh,
        };
        Self {
            body_type,
            shape,
            flag: BodyFlags::NEEDS_VALIDATE | BodyFlags::NEEDS_RESHAPE,
            col_groups: 1,
            mesh_source: MeshSource::Deform,
            mass: 1.0,
            friction: 0.5,
            restitution: 0.0,
            margin: 0.04,
            lin_damping: 0.04,
            ang_damping: 0.1,
            lin_sleep_thresh: 0.4,
            ang_sleep_thresh: 0.5,
            orientation: Quat::IDENTITY,
            position: Vec3::ZERO,
            lin_vel: Vec3::ZERO,
            ang_vel: Vec3::ZERO,
            force_thresh: 0.0,
            shared: Shared::default(),
        }
    }

    /// Simulated (not animated, not disabled) body.
    pub fn is_dynamic(&self) -> bool {
        self.body_type == BodyType::Active
            && !self.flag.intersects(BodyFlags::KINEMATIC | BodyFlags::DISABLED)
    }

    pub fn validate(&self) -> CoreResult<()> {
        let scalars = [
            ("mass", self.mass),
            ("friction", self.friction),
            ("restitution", self.restitution),
            ("margin", self.margin),
            ("lin_damping", self.lin_damping),
            ("ang_damping", self.ang_damping),
            ("lin_sleep_thresh", self.lin_sleep_thresh),
            ("ang_sleep_thresh", self.ang_sleep_thresh),
            ("force_thresh", self.force_thresh),
        ];
        for (name, value) in scalars {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("body {name} must be finite and non-negative")));
            }
        }
        if self.body_type == BodyType::Active && self.mass <= 0.0 {
            return Err(invalid("active body mass must be positive"));
        }
        if self.lin_damping > 1.0 || self.ang_damping > 1.0 {
            return Err(invalid("body damping must be within [0, 1]"));
        }
        if !(self.position.is_finite()
            && self.orientation.is_finite()
            && self.lin_vel.is_finite()
            && self.ang_vel.is_finite())
        {
            return Err(invalid("body state must be finite"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Constraints

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintType {
    /// Rotate around a point.
    Point = 0,
    Hinge,
    /// Wheel suspension.
    Hinge2,
    Slider,
    ConeTwist,
    SixDof,
    SixDofSpring,
    Universal,
    #[default]
    Fixed,
    Piston,
    /// Single-axis spring placed between the bodies.
    Spring,
    Motor,
    Compound,
}

impl ConstraintType {
    pub fn uses_limits(self) -> bool {
        matches!(
            self,
            ConstraintType::Hinge
                | ConstraintType::Slider
                | ConstraintType::Piston
                | ConstraintType::SixDof
                | ConstraintType::SixDofSpring
        )
    }

    pub fn uses_springs(self) -> bool {
        matches!(self, ConstraintType::SixDofSpring | ConstraintType::Spring)
    }

    pub fn uses_motor(self) -> bool {
        self == ConstraintType::Motor
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpringType {
    Type1 = 0,
    #[default]
    Type2,
}

flag_set! {
    pub struct ConstraintFlags {
        const ENABLED = 1 << 0;
        const NEEDS_VALIDATE = 1 << 1;
        /// Let the connected bodies collide with each other.
        const DISABLE_COLLISIONS = 1 << 2;
        const USE_BREAKING = 1 << 3;
        const OVERRIDE_SOLVER_ITERATIONS = 1 << 4;
        const USE_LIMIT_LIN_X = 1 << 5;
        const USE_LIMIT_LIN_Y = 1 << 6;
        const USE_LIMIT_LIN_Z = 1 << 7;
        const USE_LIMIT_ANG_X = 1 << 8;
        const USE_LIMIT_ANG_Y = 1 << 9;
        const USE_LIMIT_ANG_Z = 1 << 10;
        const USE_SPRING_X = 1 << 11;
        const USE_SPRING_Y = 1 << 12;
        const USE_SPRING_Z = 1 << 13;
        const USE_MOTOR_LIN = 1 << 14;
        const USE_MOTOR_ANG = 1 << 15;
        const USE_SPRING_ANG_X = 1 << 16;
        const USE_SPRING_ANG_Y = 1 << 17;
        const USE_SPRING_ANG_Z = 1 << 18;
        const USE_KINEMATIC_DEACTIVATION = 1 << 19;
        const USE_PLASTIC = 1 << 20;
        const PLASTIC_ACTIVE = 1 << 21;
    }
}

/// Translation (`lin_*`) and rotation (`ang_*`, radians) limits per axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisLimits {
    pub lin_lower: Vec3,
    pub lin_upper: Vec3,
    pub ang_lower: Vec3,
    pub ang_upper: Vec3,
}

impl Default for AxisLimits {
    fn default() -> Self {
        let quarter = std::f32::consts::FRAC_PI_4;
        Self {
            lin_lower: Vec3::splat(-1.0),
            lin_upper: Vec3::splat(1.0),
            ang_lower: Vec3::splat(-quarter),
            ang_upper: Vec3::splat(quarter),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpringSettings {
    pub stiffness: Vec3,
    pub stiffness_ang: Vec3,
    pub damping: Vec3,
    pub damping_ang: Vec3,
}

impl Default for SpringSettings {
    fn default() -> Self {
        Self {
            stiffness: Vec3::splat(10.0),
            stiffness_ang: Vec3::splat(10.0),
            damping: Vec3::splat(0.5),
            damping_ang: Vec3::splat(0.5),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotorSettings {
    pub lin_target_velocity: f32,
    pub ang_target_velocity: f32,
    pub lin_max_impulse: f32,
    pub ang_max_impulse: f32,
}

impl Default for MotorSettings {
    fn default() -> Self {
        Self {
            lin_target_velocity: 1.0,
            ang_target_velocity: 1.0,
            lin_max_impulse: 1.0,
            ang_max_impulse: 1.0,
        }
    }
}

#[derive(Debug, Default)]
pub struct ConstraintShared {
    pub physics_constraint: Option<PhysicsHandle>,
}

/// Constraint connecting two rigid bodies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidBodyConstraint {
    #[serde(skip)]
    pub object1: Option<ObjectId>,
    #[serde(skip)]
    pub object2: Option<ObjectId>,

    pub con_type: ConstraintType,
    pub num_solver_iterations: i16,
    pub flag: ConstraintFlags,
    /// Impulse above which the constraint breaks.
    pub breaking_threshold: f32,
    pub spring_type: SpringType,
    pub name: String,

    pub orientation: Quat,
    pub position: Vec3,

    pub limits: AxisLimits,
    pub springs: SpringSettings,
    pub motor: MotorSettings,

    #[serde(skip)]
    pub shared: Shared<ConstraintShared>,
}

impl Default for RigidBodyConstraint {
    fn default() -> Self {
        Self::new(ConstraintType::Fixed)
    }
}

impl RigidBodyConstraint {
    pub fn new(con_type: ConstraintType) -> Self {
        Self {
            object1: None,
            object2: None,
            con_type,
            num_solver_iterations: 10,
            flag: ConstraintFlags::ENABLED
                | ConstraintFlags::NEEDS_VALIDATE
                | ConstraintFlags::DISABLE_COLLISIONS,
            breaking_threshold: 10.0,
            spring_type: SpringType::Type2,
            name: String::new(),
            orientation: Quat::IDENTITY,
            position: Vec3::ZERO,
            limits: AxisLimits::default(),
            springs: SpringSettings::default(),
            motor: MotorSettings::default(),
            shared: Shared::default(),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.flag.contains(ConstraintFlags::ENABLED)
    }

    /// Both ends are set and distinct.
    pub fn is_connected(&self) -> bool {
        matches!((self.object1, self.object2), (Some(a), Some(b)) if a != b)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if !self.breaking_threshold.is_finite() || self.breaking_threshold < 0.0 {
            return Err(invalid("constraint breaking_threshold must be non-negative"));
        }
        if self.num_solver_iterations <= 0 {
            return Err(invalid("constraint num_solver_iterations must be positive"));
        }
        let l = &self.limits;
        if l.lin_lower.cmpgt(l.lin_upper).any() || l.ang_lower.cmpgt(l.ang_upper).any() {
            return Err(invalid(format!(
                "constraint '{}' has a lower limit above its upper limit",
                self.name
            )));
        }
        if self.name.len() > crate::id::MAX_NAME_LEN {
            return Err(invalid("constraint name is too long"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Persistence

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyEntry {
    pub object: String,
    pub body: RigidBodyObject,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstraintEntry {
    pub object: String,
    pub object1: Option<String>,
    pub object2: Option<String>,
    pub constraint: RigidBodyConstraint,
}

/// Rigid-body settings of a scene, with object references stored by name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsSettings {
    pub world: Option<RigidBodyWorld>,
    pub world_group: Option<String>,
    pub world_constraints: Option<String>,
    pub bodies: Vec<BodyEntry>,
    pub constraints: Vec<ConstraintEntry>,
}

impl PhysicsSettings {
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(world) = &self.world {
            world.validate()?;
        }
        for entry in &self.bodies {
            entry.body.validate()?;
        }
        for entry in &self.constraints {
            entry.constraint.validate()?;
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let text = self.to_ron()?;
        std::fs::write(path, text)?;
        log::info!("Saved rigid-body settings to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron(&text)
    }
}

/// RON entry points for a record with a `validate` method. Loaded records
/// are validated before they are returned.
macro_rules! ron_record {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $ty {
                pub fn to_ron(&self) -> CoreResult<String> {
                    to_ron(self)
                }

                pub fn from_ron(text: &str) -> CoreResult<Self> {
                    let record: Self = from_ron(text)?;
                    record.validate()?;
                    Ok(record)
                }
            }
        )+
    };
}

ron_record!(RigidBodyWorld, RigidBodyObject, RigidBodyConstraint, PhysicsSettings);

/// Serialize any record as pretty RON.
pub fn to_ron<T: Serialize>(value: &T) -> CoreResult<String> {
    let config = ron::ser::PrettyConfig::new()
        .depth_limit(4)
        .indentor("  ".to_string());
    ron::ser::to_string_pretty(value, config).map_err(|e| CoreError::Persistence(e.to_string()))
}

/// Parse any record from RON without validating it.
pub fn from_ron<T: DeserializeOwned>(text: &str) -> CoreResult<T> {
    ron::from_str(text).map_err(|e| CoreError::Persistence(e.to_string()))
}

fn invalid(msg: impl Into<String>) -> CoreError {
    CoreError::InvalidSettings(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3;

    #[test]
    fn world_defaults() {
        let world = RigidBodyWorld::new();
        assert_eq!(world.steps_per_second, 60);
        assert_eq!(world.num_solver_iterations, 10);
        assert_eq!(world.time_scale, 1.0);
        assert!(world.needs_rebuild());
        assert!(!world.is_muted());
        assert!((world.step_size() - 1.0 / 60.0).abs() < 1e-7);
        world.validate().expect("defaults are valid");
    }

    #[test]
    fn body_defaults_depend_on_type() {
        let active = RigidBodyObject::new(BodyType::Active);
        assert_eq!(active.shape, CollisionShape::ConvexHull);
        assert_eq!(active.mass, 1.0);
        assert_eq!(active.friction, 0.5);
        assert_eq!(active.margin, 0.04);
        assert_eq!(active.col_groups, 1);
        assert_eq!(active.mesh_source, MeshSource::Deform);
        assert!(active.flag.contains(BodyFlags::NEEDS_VALIDATE));
        assert!(active.is_dynamic());

        let passive = RigidBodyObject::new(BodyType::Passive);
        assert_eq!(passive.shape, CollisionShape::TriangleMesh);
        assert!(passive.shape.is_mesh_based());
        assert!(!passive.is_dynamic());
    }

    #[test]
    fn flag_bits_match_persisted_layout() {
        assert_eq!(WorldFlags::USE_SPLIT_IMPULSE.bits(), 4);
        assert_eq!(BodyFlags::KINEMATIC_BOUND.bits(), 1 << 17);
        assert_eq!(ConstraintFlags::USE_MOTOR_ANG.bits(), 1 << 15);
        assert_eq!(ConstraintFlags::PLASTIC_ACTIVE.bits(), 1 << 21);
    }

    #[test]
    fn kinematic_body_is_not_dynamic() {
        let mut body = RigidBodyObject::new(BodyType::Active);
        body.flag.insert(BodyFlags::KINEMATIC);
        assert!(!body.is_dynamic());
    }

    #[test]
    fn body_validation_rejects_bad_values() {
        let mut body = RigidBodyObject::new(BodyType::Active);
        body.mass = -1.0;
        assert!(body.validate().is_err());

        let mut body = RigidBodyObject::new(BodyType::Active);
        body.friction = f32::NAN;
        assert!(body.validate().is_err());

        let mut body = RigidBodyObject::new(BodyType::Passive);
        body.mass = 0.0;
        body.validate().expect("passive bodies may be massless");
    }

    #[test]
    fn constraint_defaults_and_limits() {
        let con = RigidBodyConstraint::new(ConstraintType::Hinge);
        assert!(con.is_enabled());
        assert!(con.flag.contains(ConstraintFlags::DISABLE_COLLISIONS));
        assert_eq!(con.spring_type, SpringType::Type2);
        assert_eq!(con.breaking_threshold, 10.0);
        assert_eq!(con.limits.lin_lower, Vec3::splat(-1.0));
        assert!((con.limits.ang_upper.x - std::f32::consts::FRAC_PI_4).abs() < 1e-7);
        assert_eq!(con.springs.stiffness, Vec3::splat(10.0));
        assert_eq!(con.motor.lin_max_impulse, 1.0);
        assert!(con.con_type.uses_limits());
        assert!(!con.is_connected());

        let mut bad = con.clone();
        bad.limits.lin_lower.y = 2.0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn clones_share_runtime_state() {
        let world = RigidBodyWorld::new();
        let copy = world.clone();
        assert!(world.shared.ptr_eq(&copy.shared));

        world.shared.write().point_cache.store(
            3,
            vec![BodyState {
                position: vec3(0.0, 0.0, 1.0),
                orientation: Quat::IDENTITY,
            }],
        );
        assert_eq!(copy.shared.read().point_cache.cached_frames(), 1);
    }

    #[test]
    fn point_cache_ignores_out_of_range_frames() {
        let mut cache = PointCache::default();
        assert!(!cache.store(0, Vec::new()));
        assert!(cache.store(10, Vec::new()));
        assert!(cache.store(20, Vec::new()));
        assert_eq!(cache.last_cached_frame(), Some(20));
        assert!(cache.get(10).is_some());
        cache.clear();
        assert!(cache.get(10).is_none());
    }

    #[test]
    fn reset_cache_requests_rebuild() {
        let mut world = RigidBodyWorld::new();
        world.flag.remove(WorldFlags::NEEDS_REBUILD);
        world.shared.write().point_cache.store(5, Vec::new());
        world.reset_cache();
        assert!(world.needs_rebuild());
        assert_eq!(world.shared.read().point_cache.cached_frames(), 0);
    }

    #[test]
    fn settings_survive_ron_round_trip() {
        let mut body = RigidBodyObject::new(BodyType::Active);
        body.mass = 2.5;
        body.position = vec3(1.0, 2.0, 3.0);
        body.flag.insert(BodyFlags::USE_DEACTIVATION);

        let mut con = RigidBodyConstraint::new(ConstraintType::SixDofSpring);
        con.name = "Hinge".into();
        con.flag.insert(ConstraintFlags::USE_SPRING_X);

        let mut world = RigidBodyWorld::new();
        world.steps_per_second = 120;

        let settings = PhysicsSettings {
            world: Some(world),
            world_group: Some("RigidBodyWorld".into()),
            world_constraints: None,
            bodies: vec![BodyEntry {
                object: "Cube".into(),
                body,
            }],
            constraints: vec![ConstraintEntry {
                object: "Constraint".into(),
                object1: Some("Cube".into()),
                object2: None,
                constraint: con,
            }],
        };

        let text = settings.to_ron().expect("serialize");
        let loaded = PhysicsSettings::from_ron(&text).expect("deserialize");
        assert_eq!(loaded, settings);
    }

    #[test]
    fn invalid_ron_is_a_persistence_error() {
        let err = PhysicsSettings::from_ron("(bodies: [oops").unwrap_err();
        assert!(matches!(err, CoreError::Persistence(_)));
    }

    #[test]
    fn loaded_settings_are_validated() {
        let text = "(world: Some((steps_per_second: 0)))";
        let err = PhysicsSettings::from_ron(text).unwrap_err();
        assert!(matches!(err, CoreError::InvalidSettings(_)));
    }

    #[test]
    fn single_records_round_trip_through_ron() {
        let mut body = RigidBodyObject::new(BodyType::Passive);
        body.friction = 0.8;
        let text = body.to_ron().expect("serialize body");
        assert_eq!(RigidBodyObject::from_ron(&text).expect("body"), body);

        let con = RigidBodyConstraint::new(ConstraintType::Slider);
        let text = con.to_ron().expect("serialize constraint");
        assert_eq!(RigidBodyConstraint::from_ron(&text).expect("constraint"), con);

        let world = RigidBodyWorld::new();
        let text = world.to_ron().expect("serialize world");
        assert_eq!(RigidBodyWorld::from_ron(&text).expect("world"), world);
    }

    #[test]
    fn single_records_are_validated_on_load() {
        let mut body = RigidBodyObject::new(BodyType::Active);
        body.mass = -1.0;
        let text = to_ron(&body).expect("serialize");
        let err = RigidBodyObject::from_ron(&text).unwrap_err();
        assert!(matches!(err, CoreError::InvalidSettings(_)));

        let err = RigidBodyWorld::from_ron("(steps_per_second: 0)").unwrap_err();
        assert!(matches!(err, CoreError::InvalidSettings(_)));

        // The generic helper leaves validation to the caller.
        let raw: RigidBodyObject = from_ron(&text).expect("raw parse");
        assert_eq!(raw.mass, -1.0);
    }

    #[test]
    fn save_and_load_through_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("physics.ron");
        let settings = PhysicsSettings {
            world: Some(RigidBodyWorld::new()),
            ..PhysicsSettings::default()
        };
        settings.save(&path).expect("save");
        let loaded = PhysicsSettings::load(&path).expect("load");
        assert_eq!(loaded.world.map(|w| w.steps_per_second), Some(60));
    }
}
