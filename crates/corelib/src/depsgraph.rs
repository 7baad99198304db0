//! Dependency graph: per-datablock evaluation operations.
//!
//! Many operation codes have no evaluation callback yet. Nodes for those
//! are still built and scheduled so the graph has its final shape; running
//! one is a no-op that is counted in [`EvalStats::stubbed`].

use common::CoreResult;

use crate::id::{ObjectId, RecalcFlags};
use crate::modifier::apply_stack;
use crate::rigidbody::{BodyFlags, ConstraintFlags, WorldFlags};
use crate::scene::{Main, ObjectData};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationCode {
    AnimsysEvalDriver,

    ConstraintsEvaluate,
    PoseIkTreeEvaluate,
    PoseSplineIkEvaluate,
    PoseEvalBone,

    PoseRebuild,
    PoseEvalInit,
    PoseEvalFlush,

    ParticleSystemEval,

    RigidBodyRebuildSim,
    RigidBodyEvalSimulation,
    RigidBodySyncTransforms,

    ObjectLocalTransform,
    ObjectParent,
    ObjectModifier,

    MeshEvalGeometry,
    MballEvalGeometry,
    CurveEvalGeometry,
    CurveEvalPath,
    LatticeEvalGeometry,
}

/// What an operation node evaluates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationTarget {
    Scene,
    Object(ObjectId),
}

pub type OperationFn = fn(&mut Main, OperationTarget) -> CoreResult<()>;

impl OperationCode {
    pub fn all() -> &'static [OperationCode] {
        use OperationCode::*;
        &[
            AnimsysEvalDriver,
            ConstraintsEvaluate,
            PoseIkTreeEvaluate,
            PoseSplineIkEvaluate,
            PoseEvalBone,
            PoseRebuild,
            PoseEvalInit,
            PoseEvalFlush,
            ParticleSystemEval,
            RigidBodyRebuildSim,
            RigidBodyEvalSimulation,
            RigidBodySyncTransforms,
            ObjectLocalTransform,
            ObjectParent,
            ObjectModifier,
            MeshEvalGeometry,
            MballEvalGeometry,
            CurveEvalGeometry,
            CurveEvalPath,
            LatticeEvalGeometry,
        ]
    }

    pub fn name(self) -> &'static str {
        use OperationCode::*;
        match self {
            AnimsysEvalDriver => "animsys_eval_driver",
            ConstraintsEvaluate => "constraints_evaluate",
            PoseIkTreeEvaluate => "pose_iktree_evaluate",
            PoseSplineIkEvaluate => "pose_splineik_evaluate",
            PoseEvalBone => "pose_eval_bone",
            PoseRebuild => "pose_rebuild",
            PoseEvalInit => "pose_eval_init",
            PoseEvalFlush => "pose_eval_flush",
            ParticleSystemEval => "particle_system_eval",
            RigidBodyRebuildSim => "rigidbody_rebuild_sim",
            RigidBodyEvalSimulation => "rigidbody_eval_simulation",
            RigidBodySyncTransforms => "rigidbody_object_sync_transforms",
            ObjectLocalTransform => "object_eval_local_transform",
            ObjectParent => "object_eval_parent",
            ObjectModifier => "object_eval_modifier",
            MeshEvalGeometry => "mesh_eval_geometry",
            MballEvalGeometry => "mball_eval_geometry",
            CurveEvalGeometry => "curve_eval_geometry",
            CurveEvalPath => "curve_eval_path",
            LatticeEvalGeometry => "lattice_eval_geometry",
        }
    }

    /// Evaluation callback, `None` while the operation is a stub.
    pub fn callback(self) -> Option<OperationFn> {
        use OperationCode::*;
        match self {
            ObjectLocalTransform => Some(eval_local_transform),
            ObjectModifier => Some(eval_modifier),
            MeshEvalGeometry => Some(eval_mesh_geometry),
            RigidBodyRebuildSim => Some(rigidbody_rebuild_sim),
            RigidBodySyncTransforms => Some(rigidbody_sync_transforms),
            _ => None,
        }
    }

    /// Tags on the target that make this operation run.
    fn triggered_by(self) -> RecalcFlags {
        use OperationCode::*;
        match self {
            ObjectLocalTransform | ObjectParent | RigidBodySyncTransforms => {
                RecalcFlags::TRANSFORM | RecalcFlags::COPY_ON_WRITE
            }
            _ => RecalcFlags::GEOMETRY | RecalcFlags::COPY_ON_WRITE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperationNode {
    pub target: OperationTarget,
    pub op: OperationCode,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvalStats {
    pub executed: usize,
    pub stubbed: usize,
    pub failed: usize,
}

/// Ordered operation nodes for one scene.
#[derive(Debug, Default)]
pub struct Depsgraph {
    nodes: Vec<OperationNode>,
    built: bool,
}

impl Depsgraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[OperationNode] {
        &self.nodes
    }

    /// Rebuild nodes from the registry: object transforms, then the
    /// rigid-body chain, then object geometry.
    pub fn build(&mut self, main: &mut Main) {
        self.nodes.clear();

        let objects: Vec<(ObjectId, bool)> = main
            .objects()
            .map(|(id, ob)| (id, matches!(ob.data, ObjectData::Mesh(_))))
            .collect();

        for &(id, _) in &objects {
            let target = OperationTarget::Object(id);
            self.push(target, OperationCode::ObjectLocalTransform);
            self.push(target, OperationCode::ObjectParent);
        }

        if main.rigidbody_world.as_ref().is_some_and(|w| !w.is_muted()) {
            self.push(OperationTarget::Scene, OperationCode::RigidBodyRebuildSim);
            self.push(OperationTarget::Scene, OperationCode::RigidBodyEvalSimulation);
            self.push(OperationTarget::Scene, OperationCode::RigidBodySyncTransforms);
        }

        for &(id, is_mesh) in &objects {
            let target = OperationTarget::Object(id);
            if is_mesh {
                self.push(target, OperationCode::MeshEvalGeometry);
            }
            self.push(target, OperationCode::ObjectModifier);
        }

        main.clear_relations_dirty();
        self.built = true;
        log::debug!("Depsgraph built with {} operations", self.nodes.len());
    }

    fn push(&mut self, target: OperationTarget, op: OperationCode) {
        self.nodes.push(OperationNode { target, op });
    }

    /// Run operations whose targets are tagged, then clear all tags.
    pub fn evaluate(&mut self, main: &mut Main) -> EvalStats {
        if !self.built || main.relations_dirty() {
            self.build(main);
        }
        main.flush_collection_tags();

        let mut stats = EvalStats::default();
        for node in &self.nodes {
            if !is_tagged(main, *node) {
                continue;
            }
            match node.op.callback() {
                Some(callback) => match callback(main, node.target) {
                    Ok(()) => stats.executed += 1,
                    Err(err) => {
                        log::error!("{} failed for {:?}: {}", node.op.name(), node.target, err);
                        stats.failed += 1;
                    }
                },
                None => {
                    log::trace!("{} is not implemented, skipping", node.op.name());
                    stats.stubbed += 1;
                }
            }
        }

        main.clear_object_tags();
        log::debug!(
            "Depsgraph evaluated: {} executed, {} stubbed, {} failed",
            stats.executed,
            stats.stubbed,
            stats.failed
        );
        stats
    }
}

fn is_tagged(main: &Main, node: OperationNode) -> bool {
    let trigger = node.op.triggered_by();
    match node.target {
        OperationTarget::Object(id) => main
            .object(id)
            .is_ok_and(|ob| ob.recalc.intersects(trigger)),
        OperationTarget::Scene => {
            let Some(world) = main.rigidbody_world.as_ref() else {
                return false;
            };
            world.flag.intersects(WorldFlags::NEEDS_REBUILD | WorldFlags::OBJECT_CHANGED)
                || rigidbody_members(main)
                    .iter()
                    .any(|id| main.object(*id).is_ok_and(|ob| ob.recalc.intersects(trigger)))
        }
    }
}

/// Objects in the world's body and constraint collections.
fn rigidbody_members(main: &Main) -> Vec<ObjectId> {
    let Some(world) = main.rigidbody_world.as_ref() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for coll in [world.group, world.constraints].into_iter().flatten() {
        for id in main.collection_objects_recursive(coll).unwrap_or_default() {
            if !out.contains(&id) {
                out.push(id);
            }
        }
    }
    out
}

fn eval_local_transform(main: &mut Main, target: OperationTarget) -> CoreResult<()> {
    let OperationTarget::Object(id) = target else {
        return Ok(());
    };
    let ob = main.object_mut(id)?;
    ob.runtime.world_matrix = ob.transform.matrix();
    Ok(())
}

fn eval_modifier(main: &mut Main, target: OperationTarget) -> CoreResult<()> {
    let OperationTarget::Object(id) = target else {
        return Ok(());
    };
    let ob = main.object_mut(id)?;
    ob.runtime.eval_gpencil = match &ob.data {
        ObjectData::GreasePencil(data) => Some(apply_stack(&ob.modifiers, data)),
        _ => None,
    };
    Ok(())
}

fn eval_mesh_geometry(main: &mut Main, target: OperationTarget) -> CoreResult<()> {
    let OperationTarget::Object(id) = target else {
        return Ok(());
    };
    if let Some(mesh) = main.object(id)?.data.as_mesh() {
        mesh.validate()?;
    }
    Ok(())
}

fn rigidbody_rebuild_sim(main: &mut Main, _target: OperationTarget) -> CoreResult<()> {
    let needs_rebuild = main
        .rigidbody_world
        .as_ref()
        .is_some_and(|w| w.needs_rebuild() || w.flag.contains(WorldFlags::OBJECT_CHANGED));
    if !needs_rebuild {
        return Ok(());
    }

    let group = main.rigidbody_world.as_ref().and_then(|w| w.group);
    let bodies = match group {
        Some(group) => main.collection_objects_recursive(group)?,
        None => Vec::new(),
    };
    let mut num_bodies = 0;
    for id in &bodies {
        if let Some(body) = main.object_mut(*id)?.rigidbody.as_mut() {
            body.validate()?;
            body.flag
                .remove(BodyFlags::NEEDS_VALIDATE | BodyFlags::NEEDS_RESHAPE);
            num_bodies += 1;
        }
    }

    for id in rigidbody_members(main) {
        if let Some(con) = main.object_mut(id)?.rigidbody_constraint.as_mut() {
            con.validate()?;
            con.flag.remove(ConstraintFlags::NEEDS_VALIDATE);
        }
    }

    if let Some(world) = main.rigidbody_world.as_mut() {
        world.num_bodies = num_bodies;
        world.flag.remove(
            WorldFlags::NEEDS_REBUILD | WorldFlags::OBJECT_CHANGED | WorldFlags::REBUILD_CONSTRAINTS,
        );
        log::debug!("Rebuilt rigid-body world with {} bodies", num_bodies);
    }
    Ok(())
}

/// Dynamic bodies with a cached frame push that state into the object
/// matrix. Every other body pulls its state from the object transform.
fn rigidbody_sync_transforms(main: &mut Main, _target: OperationTarget) -> CoreResult<()> {
    let Some(world) = main.rigidbody_world.as_ref() else {
        return Ok(());
    };
    let frame = world.last_time.round() as i32;
    let cached = world.shared.read().point_cache.get(frame).map(<[_]>::to_vec);
    let bodies = match world.group {
        Some(group) => main.collection_objects_recursive(group)?,
        None => Vec::new(),
    };

    let mut dynamic_index = 0usize;
    for id in bodies {
        let ob = main.object_mut(id)?;
        let Some(body) = ob.rigidbody.as_mut() else {
            continue;
        };
        if body.is_dynamic() {
            match cached.as_ref().and_then(|c| c.get(dynamic_index)) {
                Some(state) => {
                    body.position = state.position;
                    body.orientation = state.orientation;
                }
                None => {
                    body.position = ob.transform.translation;
                    body.orientation = ob.transform.rotation();
                }
            }
            dynamic_index += 1;
            ob.runtime.world_matrix = ob.transform.matrix_with(body.orientation, body.position);
        } else {
            body.position = ob.transform.translation;
            body.orientation = ob.transform.rotation();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpencil::{GpencilData, GpencilLayer, Stroke};
    use crate::mesh::Mesh;
    use crate::modifier::ModifierType;
    use crate::rigidbody::{BodyState, BodyType};
    use crate::{Mat4, Quat, Vec3, vec3};

    #[test]
    fn every_operation_has_a_name() {
        let names: Vec<_> = OperationCode::all().iter().map(|op| op.name()).collect();
        assert_eq!(names.len(), 20);
        let mut dedup = names.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(dedup.len(), names.len());
    }

    #[test]
    fn most_operations_are_stubs() {
        let implemented = OperationCode::all()
            .iter()
            .filter(|op| op.callback().is_some())
            .count();
        assert_eq!(implemented, 5);
        assert!(OperationCode::RigidBodyEvalSimulation.callback().is_none());
        assert!(OperationCode::PoseEvalBone.callback().is_none());
    }

    #[test]
    fn build_orders_transform_before_rigidbody_before_geometry() {
        let mut main = Main::new();
        let ob = main.add_object("Cube", ObjectData::Mesh(Mesh::new("Cube")));
        main.add_rigidbody_object(ob, BodyType::Active).expect("body");

        let mut graph = Depsgraph::new();
        graph.build(&mut main);
        let ops: Vec<_> = graph.nodes().iter().map(|n| n.op).collect();
        assert_eq!(
            ops,
            vec![
                OperationCode::ObjectLocalTransform,
                OperationCode::ObjectParent,
                OperationCode::RigidBodyRebuildSim,
                OperationCode::RigidBodyEvalSimulation,
                OperationCode::RigidBodySyncTransforms,
                OperationCode::MeshEvalGeometry,
                OperationCode::ObjectModifier,
            ]
        );
        assert!(!main.relations_dirty());
    }

    #[test]
    fn evaluation_runs_tagged_objects_once() {
        let mut main = Main::new();
        let ob = main.add_object("Empty", ObjectData::Empty);
        main.object_mut(ob).expect("ob").transform.translation = vec3(1.0, 2.0, 3.0);

        let mut graph = Depsgraph::new();
        let stats = graph.evaluate(&mut main);
        // transform + modifier executed, parent stubbed
        assert_eq!(stats.executed, 2);
        assert_eq!(stats.stubbed, 1);
        assert_eq!(
            main.object(ob).map(|o| o.runtime.world_matrix).ok(),
            Some(Mat4::from_translation(vec3(1.0, 2.0, 3.0)))
        );
        assert!(main.id_recalc(ob).map(|f| f.is_empty()).unwrap_or(false));

        // Nothing tagged: nothing runs.
        assert_eq!(graph.evaluate(&mut main), EvalStats::default());

        main.id_tag_update(ob, RecalcFlags::TRANSFORM).expect("tag");
        let stats = graph.evaluate(&mut main);
        assert_eq!((stats.executed, stats.stubbed), (1, 1));
    }

    #[test]
    fn collection_copy_on_write_reevaluates_members() {
        let mut main = Main::new();
        let master = main.master_collection();
        let ob = main.add_object("Empty", ObjectData::Empty);
        main.collection_link_object(master, ob).expect("link");
        let mut graph = Depsgraph::new();
        graph.evaluate(&mut main);

        main.id_tag_update(master, RecalcFlags::COPY_ON_WRITE).expect("tag");
        let stats = graph.evaluate(&mut main);
        assert_eq!(stats.executed, 2);
    }

    #[test]
    fn grease_pencil_modifiers_are_evaluated() {
        let mut main = Main::new();
        let data = GpencilData {
            layers: vec![GpencilLayer {
                name: "Lines".into(),
                strokes: vec![Stroke::from_points([Vec3::ZERO, Vec3::Z])],
            }],
        };
        let ob = main.add_object("Stroke", ObjectData::GreasePencil(data.clone()));
        main.add_modifier(ob, ModifierType::GpencilWave).expect("modifier");

        Depsgraph::new().evaluate(&mut main);
        let object = main.object(ob).expect("ob");
        let eval = object.runtime.eval_gpencil.as_ref().expect("evaluated strokes");
        assert_ne!(eval, &data);
        // Original data is untouched.
        assert_eq!(object.data, ObjectData::GreasePencil(data));
    }

    #[test]
    fn broken_mesh_counts_as_failed() {
        let mut main = Main::new();
        let mut mesh = Mesh::new("Broken");
        mesh.edges.push([0, 5]);
        main.add_object("Broken", ObjectData::Mesh(mesh));
        let stats = Depsgraph::new().evaluate(&mut main);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn rigidbody_rebuild_validates_and_counts_bodies() {
        let mut main = Main::new();
        let a = main.add_object("A", ObjectData::Empty);
        let b = main.add_object("B", ObjectData::Empty);
        main.add_rigidbody_object(a, BodyType::Active).expect("a");
        main.add_rigidbody_object(b, BodyType::Passive).expect("b");
        main.add_rigidbody_constraint(b, crate::rigidbody::ConstraintType::Fixed, Some(a), Some(b))
            .expect("con");

        Depsgraph::new().evaluate(&mut main);
        let world = main.rigidbody_world.as_ref().expect("world");
        assert_eq!(world.num_bodies, 2);
        assert!(!world.needs_rebuild());
        let body = main.object(a).ok().and_then(|o| o.rigidbody.clone()).expect("body");
        assert!(!body.flag.contains(BodyFlags::NEEDS_VALIDATE));
        let con = main
            .object(b)
            .ok()
            .and_then(|o| o.rigidbody_constraint.clone())
            .expect("con");
        assert!(!con.flag.contains(ConstraintFlags::NEEDS_VALIDATE));
    }

    #[test]
    fn sync_uses_cached_state_for_dynamic_bodies() {
        let mut main = Main::new();
        let active = main.add_object("Active", ObjectData::Empty);
        let passive = main.add_object("Passive", ObjectData::Empty);
        main.add_rigidbody_object(active, BodyType::Active).expect("active");
        main.add_rigidbody_object(passive, BodyType::Passive).expect("passive");

        let mut graph = Depsgraph::new();
        graph.evaluate(&mut main);

        let fallen = vec3(0.0, 0.0, -4.0);
        if let Some(world) = main.rigidbody_world.as_ref() {
            world.shared.write().point_cache.store(
                1,
                vec![BodyState {
                    position: fallen,
                    orientation: Quat::IDENTITY,
                }],
            );
        }
        main.object_mut(passive).expect("passive").transform.translation = vec3(5.0, 0.0, 0.0);
        main.id_tag_update(active, RecalcFlags::TRANSFORM).expect("tag");
        main.id_tag_update(passive, RecalcFlags::TRANSFORM).expect("tag");
        graph.evaluate(&mut main);

        let active_ob = main.object(active).expect("active");
        assert_eq!(active_ob.runtime.world_matrix, Mat4::from_translation(fallen));
        let passive_body = main
            .object(passive)
            .ok()
            .and_then(|o| o.rigidbody.clone())
            .expect("passive body");
        assert_eq!(passive_body.position, vec3(5.0, 0.0, 0.0));
    }

    #[test]
    fn uncached_dynamic_body_follows_moved_object() {
        let mut main = Main::new();
        let ob = main.add_object("Active", ObjectData::Empty);
        main.add_rigidbody_object(ob, BodyType::Active).expect("body");
        let mut graph = Depsgraph::new();
        graph.evaluate(&mut main);

        main.object_mut(ob).expect("ob").transform.translation = vec3(3.0, 0.0, 0.0);
        main.id_tag_update(ob, RecalcFlags::TRANSFORM).expect("tag");
        graph.evaluate(&mut main);

        let object = main.object(ob).expect("ob");
        assert_eq!(object.runtime.world_matrix, Mat4::from_translation(vec3(3.0, 0.0, 0.0)));
        let body = object.rigidbody.as_ref().expect("body");
        assert_eq!(body.position, vec3(3.0, 0.0, 0.0));
    }

    #[test]
    fn muted_world_has_no_rigidbody_nodes() {
        let mut main = Main::new();
        let ob = main.add_object("A", ObjectData::Empty);
        main.add_rigidbody_object(ob, BodyType::Active).expect("body");
        if let Some(world) = main.rigidbody_world.as_mut() {
            world.flag.insert(WorldFlags::MUTED);
        }
        let mut graph = Depsgraph::new();
        graph.build(&mut main);
        assert!(
            graph
                .nodes()
                .iter()
                .all(|n| n.target != OperationTarget::Scene)
        );
    }
}
