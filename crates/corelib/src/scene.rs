//! Datablock registry: objects, collections and the rigid-body world.
//!
//! Objects and collections live in dense arrays and are addressed by
//! [`ObjectId`] / [`CollectionId`]. Datablocks are never removed, so ids
//! stay valid for the lifetime of a [`Main`].

use common::{CoreError, CoreResult};

use crate::Mat4;
use crate::gpencil::GpencilData;
use crate::id::{CollectionId, IdRef, ObjectId, RecalcFlags, unique_name};
use crate::mesh::Mesh;
use crate::modifier::{Modifier, ModifierKind, ModifierType, ModifierTypeFlags};
use crate::rigidbody::{
    BodyEntry, BodyType, ConstraintEntry, ConstraintType, PhysicsSettings, RigidBodyConstraint,
    RigidBodyObject, RigidBodyWorld, WorldFlags,
};
use crate::transform::Transform;

pub const MASTER_COLLECTION_NAME: &str = "Scene Collection";
pub const RIGIDBODY_GROUP_NAME: &str = "RigidBodyWorld";
pub const RIGIDBODY_CONSTRAINTS_NAME: &str = "RigidBodyConstraints";

#[derive(Clone, Debug, Default, PartialEq)]
pub enum ObjectData {
    #[default]
    Empty,
    Mesh(Mesh),
    GreasePencil(GpencilData),
}

impl ObjectData {
    pub fn type_name(&self) -> &'static str {
        match self {
            ObjectData::Empty => "Empty",
            ObjectData::Mesh(_) => "Mesh",
            ObjectData::GreasePencil(_) => "GreasePencil",
        }
    }

    pub fn as_mesh(&self) -> Option<&Mesh> {
        match self {
            ObjectData::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }
}

/// Results of the last evaluation; never persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectRuntime {
    pub world_matrix: Mat4,
    pub eval_gpencil: Option<GpencilData>,
}

impl Default for ObjectRuntime {
    fn default() -> Self {
        Self {
            world_matrix: Mat4::IDENTITY,
            eval_gpencil: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Object {
    pub name: String,
    pub transform: Transform,
    pub data: ObjectData,
    pub modifiers: Vec<Modifier>,
    pub rigidbody: Option<RigidBodyObject>,
    pub rigidbody_constraint: Option<RigidBodyConstraint>,
    pub recalc: RecalcFlags,
    pub runtime: ObjectRuntime,
}

#[derive(Clone, Debug, Default)]
pub struct Collection {
    pub name: String,
    pub objects: Vec<ObjectId>,
    pub children: Vec<CollectionId>,
    /// Keep the collection even when nothing links to it.
    pub fake_user: bool,
    pub recalc: RecalcFlags,
}

pub struct Main {
    objects: Vec<Object>,
    collections: Vec<Collection>,
    master_collection: CollectionId,
    pub rigidbody_world: Option<RigidBodyWorld>,
    relations_dirty: bool,
}

impl Default for Main {
    fn default() -> Self {
        Self::new()
    }
}

impl Main {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            collections: vec![Collection {
                name: MASTER_COLLECTION_NAME.to_string(),
                ..Collection::default()
            }],
            master_collection: CollectionId(0),
            rigidbody_world: None,
            relations_dirty: true,
        }
    }

    #[inline]
    pub fn master_collection(&self) -> CollectionId {
        self.master_collection
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    // -- lookup -------------------------------------------------------------

    pub fn object(&self, id: ObjectId) -> CoreResult<&Object> {
        self.objects
            .get(id.0 as usize)
            .ok_or_else(|| CoreError::not_found("Object", format!("#{}", id.0)))
    }

    pub fn object_mut(&mut self, id: ObjectId) -> CoreResult<&mut Object> {
        self.objects
            .get_mut(id.0 as usize)
            .ok_or_else(|| CoreError::not_found("Object", format!("#{}", id.0)))
    }

    pub fn collection(&self, id: CollectionId) -> CoreResult<&Collection> {
        self.collections
            .get(id.0 as usize)
            .ok_or_else(|| CoreError::not_found("Collection", format!("#{}", id.0)))
    }

    pub fn collection_mut(&mut self, id: CollectionId) -> CoreResult<&mut Collection> {
        self.collections
            .get_mut(id.0 as usize)
            .ok_or_else(|| CoreError::not_found("Collection", format!("#{}", id.0)))
    }

    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, ob)| (ObjectId(i as u32), ob))
    }

    pub fn collections(&self) -> impl Iterator<Item = (CollectionId, &Collection)> {
        self.collections
            .iter()
            .enumerate()
            .map(|(i, c)| (CollectionId(i as u32), c))
    }

    pub fn find_object(&self, name: &str) -> Option<ObjectId> {
        self.objects
            .iter()
            .position(|ob| ob.name == name)
            .map(|i| ObjectId(i as u32))
    }

    pub fn object_by_name(&self, name: &str) -> CoreResult<ObjectId> {
        self.find_object(name)
            .ok_or_else(|| CoreError::not_found("Object", name))
    }

    pub fn find_collection(&self, name: &str) -> Option<CollectionId> {
        self.collections
            .iter()
            .position(|c| c.name == name)
            .map(|i| CollectionId(i as u32))
    }

    /// Objects in `id` and all child collections, each listed once.
    pub fn collection_objects_recursive(&self, id: CollectionId) -> CoreResult<Vec<ObjectId>> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        let mut visited = vec![false; self.collections.len()];
        while let Some(cid) = stack.pop() {
            let coll = self.collection(cid)?;
            if std::mem::replace(&mut visited[cid.0 as usize], true) {
                continue;
            }
            for ob in &coll.objects {
                if !out.contains(ob) {
                    out.push(*ob);
                }
            }
            stack.extend(coll.children.iter().rev().copied());
        }
        Ok(out)
    }

    /// Objects reachable from the scene's master collection.
    pub fn scene_objects(&self) -> Vec<ObjectId> {
        self.collection_objects_recursive(self.master_collection)
            .unwrap_or_default()
    }

    // -- creation -----------------------------------------------------------

    /// New collection, linked under `parent` when given.
    pub fn add_collection(
        &mut self,
        parent: Option<CollectionId>,
        name: &str,
    ) -> CoreResult<CollectionId> {
        if let Some(parent) = parent {
            self.collection(parent)?;
        }
        let name = unique_name(name, |n| self.collections.iter().any(|c| c.name == n));
        let id = CollectionId(self.collections.len() as u32);
        log::debug!("Adding collection '{}'", name);
        self.collections.push(Collection {
            name,
            recalc: RecalcFlags::ALL,
            ..Collection::default()
        });
        if let Some(parent) = parent {
            self.collection_mut(parent)?.children.push(id);
        }
        self.relations_dirty = true;
        Ok(id)
    }

    /// New object, not linked into any collection yet.
    pub fn add_object(&mut self, name: &str, data: ObjectData) -> ObjectId {
        let name = unique_name(name, |n| self.objects.iter().any(|ob| ob.name == n));
        let id = ObjectId(self.objects.len() as u32);
        log::debug!("Adding {} object '{}'", data.type_name(), name);
        self.objects.push(Object {
            name,
            transform: Transform::identity(),
            data,
            modifiers: Vec::new(),
            rigidbody: None,
            rigidbody_constraint: None,
            recalc: RecalcFlags::ALL,
            runtime: ObjectRuntime::default(),
        });
        self.relations_dirty = true;
        id
    }

    pub fn collection_link_object(&mut self, coll: CollectionId, ob: ObjectId) -> CoreResult<()> {
        self.object(ob)?;
        let collection = self.collection_mut(coll)?;
        if !collection.objects.contains(&ob) {
            collection.objects.push(ob);
        }
        self.relations_dirty = true;
        Ok(())
    }

    pub fn id_fake_user_set(&mut self, coll: CollectionId) -> CoreResult<()> {
        self.collection_mut(coll)?.fake_user = true;
        Ok(())
    }

    // -- tagging ------------------------------------------------------------

    pub fn id_tag_update(&mut self, id: impl Into<IdRef>, flags: RecalcFlags) -> CoreResult<()> {
        match id.into() {
            IdRef::Object(ob) => self.object_mut(ob)?.recalc.insert(flags),
            IdRef::Collection(coll) => self.collection_mut(coll)?.recalc.insert(flags),
        }
        Ok(())
    }

    pub fn id_recalc(&self, id: impl Into<IdRef>) -> CoreResult<RecalcFlags> {
        Ok(match id.into() {
            IdRef::Object(ob) => self.object(ob)?.recalc,
            IdRef::Collection(coll) => self.collection(coll)?.recalc,
        })
    }

    /// Mark the dependency relations as stale.
    pub fn relations_tag_update(&mut self) {
        self.relations_dirty = true;
    }

    #[inline]
    pub fn relations_dirty(&self) -> bool {
        self.relations_dirty
    }

    pub(crate) fn clear_relations_dirty(&mut self) {
        self.relations_dirty = false;
    }

    /// Push collection tags down onto their objects, then clear them.
    pub(crate) fn flush_collection_tags(&mut self) {
        for ci in 0..self.collections.len() {
            let flags = std::mem::take(&mut self.collections[ci].recalc);
            if flags.is_empty() {
                continue;
            }
            let objects = self
                .collection_objects_recursive(CollectionId(ci as u32))
                .unwrap_or_default();
            for ob in objects {
                self.objects[ob.0 as usize].recalc.insert(flags);
            }
        }
    }

    pub(crate) fn clear_object_tags(&mut self) {
        for ob in &mut self.objects {
            ob.recalc = RecalcFlags::empty();
        }
    }

    // -- modifiers ----------------------------------------------------------

    /// Append a modifier with its type defaults; returns its stack index.
    pub fn add_modifier(&mut self, ob: ObjectId, ty: ModifierType) -> CoreResult<usize> {
        let info = ty.info();
        let object = self.object_mut(ob)?;

        let compatible = match info.kind {
            ModifierKind::Gpencil => matches!(object.data, ObjectData::GreasePencil(_)),
        };
        if !compatible {
            return Err(CoreError::ModifierIncompatible {
                modifier: info.name.to_string(),
                object: object.name.clone(),
            });
        }
        if info.flags.contains(ModifierTypeFlags::SINGLE)
            && object.modifiers.iter().any(|m| m.modifier_type == ty)
        {
            return Err(CoreError::ModifierSingle {
                modifier: info.name.to_string(),
                object: object.name.clone(),
            });
        }

        let mut md = Modifier::new(ty);
        md.name = unique_name(info.name, |n| object.modifiers.iter().any(|m| m.name == n));
        object.modifiers.push(md);
        object.recalc.insert(RecalcFlags::GEOMETRY);
        let index = object.modifiers.len() - 1;
        self.relations_dirty = true;
        Ok(index)
    }

    // -- rigid bodies -------------------------------------------------------

    /// The scene's rigid-body world, created with its body collection on
    /// first use.
    pub fn ensure_rigidbody_world(&mut self) -> CoreResult<&mut RigidBodyWorld> {
        if self.rigidbody_world.is_none() {
            let group = self.add_rigidbody_collection(RIGIDBODY_GROUP_NAME)?;
            let mut world = RigidBodyWorld::new();
            world.group = Some(group);
            log::info!("Created rigid-body world");
            self.rigidbody_world = Some(world);
        }
        self.rigidbody_world
            .as_mut()
            .ok_or_else(|| CoreError::Generic("rigid-body world missing".into()))
    }

    /// The world's body collection, recreated if the world lost it.
    fn rigidbody_group(&mut self) -> CoreResult<CollectionId> {
        let existing = self.ensure_rigidbody_world()?.group;
        if let Some(group) = existing {
            return Ok(group);
        }
        let group = self.add_rigidbody_collection(RIGIDBODY_GROUP_NAME)?;
        if let Some(world) = self.rigidbody_world.as_mut() {
            world.group = Some(group);
        }
        Ok(group)
    }

    fn rigidbody_constraints_group(&mut self) -> CoreResult<CollectionId> {
        let existing = self.ensure_rigidbody_world()?.constraints;
        if let Some(coll) = existing {
            return Ok(coll);
        }
        let coll = self.add_rigidbody_collection(RIGIDBODY_CONSTRAINTS_NAME)?;
        if let Some(world) = self.rigidbody_world.as_mut() {
            world.constraints = Some(coll);
        }
        Ok(coll)
    }

    /// Rigid-body collections stay out of the scene hierarchy and are kept
    /// alive by a fake user.
    fn add_rigidbody_collection(&mut self, name: &str) -> CoreResult<CollectionId> {
        let coll = self.add_collection(None, name)?;
        self.collection_mut(coll)?.fake_user = true;
        Ok(coll)
    }

    fn find_or_add_rigidbody_collection(&mut self, name: &str) -> CoreResult<CollectionId> {
        match self.find_collection(name) {
            Some(id) => {
                self.collection_mut(id)?.fake_user = true;
                Ok(id)
            }
            None => self.add_rigidbody_collection(name),
        }
    }

    /// Give `ob` rigid-body settings and link it into the world's group.
    pub fn add_rigidbody_object(&mut self, ob: ObjectId, body_type: BodyType) -> CoreResult<()> {
        self.object(ob)?;
        let group = self.rigidbody_group()?;

        let object = self.object_mut(ob)?;
        if object.rigidbody.is_none() {
            let mut body = RigidBodyObject::new(body_type);
            body.position = object.transform.translation;
            body.orientation = object.transform.rotation();
            object.rigidbody = Some(body);
        }
        object.recalc.insert(RecalcFlags::TRANSFORM);

        self.collection_link_object(group, ob)?;
        if let Some(world) = self.rigidbody_world.as_mut() {
            world.reset_cache();
            world.flag.insert(WorldFlags::OBJECT_CHANGED);
        }
        Ok(())
    }

    /// Put a constraint on `ob` connecting `object1` and `object2`.
    pub fn add_rigidbody_constraint(
        &mut self,
        ob: ObjectId,
        con_type: ConstraintType,
        object1: Option<ObjectId>,
        object2: Option<ObjectId>,
    ) -> CoreResult<()> {
        for end in [object1, object2].into_iter().flatten() {
            self.object(end)?;
        }
        self.object(ob)?;
        let constraints = self.rigidbody_constraints_group()?;

        let object = self.object_mut(ob)?;
        let mut con = RigidBodyConstraint::new(con_type);
        con.name = object.name.clone();
        con.object1 = object1;
        con.object2 = object2;
        con.position = object.transform.translation;
        con.orientation = object.transform.rotation();
        object.rigidbody_constraint = Some(con);
        object.recalc.insert(RecalcFlags::TRANSFORM);

        self.collection_link_object(constraints, ob)?;
        if let Some(world) = self.rigidbody_world.as_mut() {
            world.flag.insert(WorldFlags::NEEDS_REBUILD | WorldFlags::REBUILD_CONSTRAINTS);
        }
        Ok(())
    }

    /// Snapshot of all rigid-body settings with references stored by name.
    pub fn export_physics(&self) -> PhysicsSettings {
        let name_of = |id: Option<ObjectId>| {
            id.and_then(|id| self.objects.get(id.0 as usize))
                .map(|ob| ob.name.clone())
        };
        let coll_name = |id: Option<CollectionId>| {
            id.and_then(|id| self.collections.get(id.0 as usize))
                .map(|c| c.name.clone())
        };

        PhysicsSettings {
            world: self.rigidbody_world.clone(),
            world_group: self.rigidbody_world.as_ref().and_then(|w| coll_name(w.group)),
            world_constraints: self
                .rigidbody_world
                .as_ref()
                .and_then(|w| coll_name(w.constraints)),
            bodies: self
                .objects
                .iter()
                .filter_map(|ob| {
                    ob.rigidbody.as_ref().map(|body| BodyEntry {
                        object: ob.name.clone(),
                        body: body.clone(),
                    })
                })
                .collect(),
            constraints: self
                .objects
                .iter()
                .filter_map(|ob| {
                    ob.rigidbody_constraint.as_ref().map(|con| ConstraintEntry {
                        object: ob.name.clone(),
                        object1: name_of(con.object1),
                        object2: name_of(con.object2),
                        constraint: con.clone(),
                    })
                })
                .collect(),
        }
    }

    /// Apply settings produced by [`Main::export_physics`], resolving names
    /// against existing objects and collections. Bodies and constraints are
    /// linked into the world's collections. Nothing changes when a name
    /// does not resolve.
    pub fn import_physics(&mut self, settings: &PhysicsSettings) -> CoreResult<()> {
        settings.validate()?;

        let bodies = settings
            .bodies
            .iter()
            .map(|entry| -> CoreResult<_> {
                Ok((self.object_by_name(&entry.object)?, &entry.body))
            })
            .collect::<CoreResult<Vec<_>>>()?;
        let resolve = |name: Option<&str>| name.map(|n| self.object_by_name(n)).transpose();
        let constraints = settings
            .constraints
            .iter()
            .map(|entry| -> CoreResult<_> {
                let mut con = entry.constraint.clone();
                con.object1 = resolve(entry.object1.as_deref())?;
                con.object2 = resolve(entry.object2.as_deref())?;
                Ok((self.object_by_name(&entry.object)?, con))
            })
            .collect::<CoreResult<Vec<_>>>()?;

        if let Some(world) = &settings.world {
            let mut world = world.clone();
            world.group = settings
                .world_group
                .as_deref()
                .map(|name| self.find_or_add_rigidbody_collection(name))
                .transpose()?;
            world.constraints = settings
                .world_constraints
                .as_deref()
                .map(|name| self.find_or_add_rigidbody_collection(name))
                .transpose()?;
            self.rigidbody_world = Some(world);
        }

        if !bodies.is_empty() {
            let group = self.rigidbody_group()?;
            for (ob, body) in bodies {
                let object = self.object_mut(ob)?;
                object.rigidbody = Some(body.clone());
                object.recalc.insert(RecalcFlags::TRANSFORM);
                self.collection_link_object(group, ob)?;
            }
        }

        if !constraints.is_empty() {
            let coll = self.rigidbody_constraints_group()?;
            for (ob, con) in constraints {
                let object = self.object_mut(ob)?;
                object.rigidbody_constraint = Some(con);
                object.recalc.insert(RecalcFlags::TRANSFORM);
                self.collection_link_object(coll, ob)?;
            }
        }

        if let Some(world) = self.rigidbody_world.as_mut() {
            world.reset_cache();
            world.flag.insert(WorldFlags::NEEDS_REBUILD);
        }
        self.relations_dirty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depsgraph::Depsgraph;
    use crate::gpencil::{GpencilLayer, Stroke};
    use crate::{Vec3, vec3};

    fn gp_object(main: &mut Main) -> ObjectId {
        let data = GpencilData {
            layers: vec![GpencilLayer {
                name: "Lines".into(),
                strokes: vec![Stroke::from_points([Vec3::ZERO, Vec3::Z])],
            }],
        };
        main.add_object("Stroke", ObjectData::GreasePencil(data))
    }

    #[test]
    fn new_main_has_master_collection() {
        let main = Main::new();
        let master = main.collection(main.master_collection()).expect("master");
        assert_eq!(master.name, MASTER_COLLECTION_NAME);
        assert!(main.relations_dirty());
        assert!(main.scene_objects().is_empty());
    }

    #[test]
    fn object_names_are_unique() {
        let mut main = Main::new();
        let a = main.add_object("Cube", ObjectData::Empty);
        let b = main.add_object("Cube", ObjectData::Empty);
        assert_eq!(main.object(a).map(|o| o.name.as_str()).ok(), Some("Cube"));
        assert_eq!(main.object(b).map(|o| o.name.as_str()).ok(), Some("Cube.001"));
        assert_eq!(main.find_object("Cube.001"), Some(b));
    }

    #[test]
    fn linking_is_idempotent_and_recursive_listing_dedups() {
        let mut main = Main::new();
        let master = main.master_collection();
        let child = main.add_collection(Some(master), "Child").expect("child");
        let ob = main.add_object("Cube", ObjectData::Empty);
        main.collection_link_object(child, ob).expect("link");
        main.collection_link_object(child, ob).expect("link twice");
        main.collection_link_object(master, ob).expect("link master");

        assert_eq!(main.collection(child).map(|c| c.objects.len()).ok(), Some(1));
        assert_eq!(main.scene_objects(), vec![ob]);
    }

    #[test]
    fn missing_ids_are_not_found_errors() {
        let mut main = Main::new();
        assert!(matches!(
            main.object(ObjectId(7)),
            Err(CoreError::NotFound { kind: "Object", .. })
        ));
        assert!(main.add_collection(Some(CollectionId(9)), "x").is_err());
        assert!(
            main.id_tag_update(ObjectId(3), RecalcFlags::TRANSFORM)
                .is_err()
        );
    }

    #[test]
    fn collection_tags_flush_onto_objects() {
        let mut main = Main::new();
        let master = main.master_collection();
        let ob = main.add_object("Cube", ObjectData::Empty);
        main.collection_link_object(master, ob).expect("link");
        main.clear_object_tags();
        main.id_tag_update(master, RecalcFlags::COPY_ON_WRITE).expect("tag");

        main.flush_collection_tags();
        assert_eq!(main.id_recalc(ob).ok(), Some(RecalcFlags::COPY_ON_WRITE));
        assert!(main.id_recalc(master).map(|f| f.is_empty()).unwrap_or(false));
    }

    #[test]
    fn wave_modifier_needs_grease_pencil() {
        let mut main = Main::new();
        let empty = main.add_object("Empty", ObjectData::Empty);
        let err = main.add_modifier(empty, ModifierType::GpencilWave).unwrap_err();
        assert!(matches!(err, CoreError::ModifierIncompatible { .. }));
    }

    #[test]
    fn single_modifier_cannot_be_added_twice() {
        let mut main = Main::new();
        let ob = gp_object(&mut main);
        assert_eq!(main.add_modifier(ob, ModifierType::GpencilWave).ok(), Some(0));
        let err = main.add_modifier(ob, ModifierType::GpencilWave).unwrap_err();
        assert!(matches!(err, CoreError::ModifierSingle { .. }));
    }

    #[test]
    fn rigidbody_object_joins_world_group() {
        let mut main = Main::new();
        let ob = main.add_object("Cube", ObjectData::Empty);
        main.object_mut(ob).expect("ob").transform.translation = vec3(0.0, 0.0, 5.0);
        main.add_rigidbody_object(ob, BodyType::Active).expect("add body");

        let world = main.rigidbody_world.as_ref().expect("world");
        let group = world.group.expect("group");
        assert!(world.needs_rebuild());
        assert_eq!(main.collection(group).map(|c| c.objects.clone()).ok(), Some(vec![ob]));
        assert!(main.collection(group).map(|c| c.fake_user).unwrap_or(false));

        let body = main.object(ob).ok().and_then(|o| o.rigidbody.clone()).expect("body");
        assert_eq!(body.position, vec3(0.0, 0.0, 5.0));
        // World group is not part of the scene hierarchy.
        assert!(main.scene_objects().is_empty());
    }

    #[test]
    fn constraint_records_its_ends() {
        let mut main = Main::new();
        let a = main.add_object("A", ObjectData::Empty);
        let b = main.add_object("B", ObjectData::Empty);
        let c = main.add_object("Hinge", ObjectData::Empty);
        main.add_rigidbody_constraint(c, ConstraintType::Hinge, Some(a), Some(b))
            .expect("constraint");
        let con = main
            .object(c)
            .ok()
            .and_then(|o| o.rigidbody_constraint.clone())
            .expect("con");
        assert!(con.is_connected());
        assert_eq!(con.name, "Hinge");
        assert!(main.rigidbody_world.as_ref().and_then(|w| w.constraints).is_some());

        assert!(
            main.add_rigidbody_constraint(c, ConstraintType::Fixed, Some(ObjectId(42)), None)
                .is_err()
        );
    }

    #[test]
    fn physics_export_import_resolves_names() {
        let mut src = Main::new();
        let a = src.add_object("A", ObjectData::Empty);
        let b = src.add_object("B", ObjectData::Empty);
        src.add_rigidbody_object(a, BodyType::Active).expect("body a");
        src.add_rigidbody_object(b, BodyType::Passive).expect("body b");
        src.add_rigidbody_constraint(b, ConstraintType::Fixed, Some(a), Some(b))
            .expect("con");
        let settings = src.export_physics();
        assert_eq!(settings.bodies.len(), 2);
        assert_eq!(settings.constraints[0].object1.as_deref(), Some("A"));

        let mut dst = Main::new();
        let b2 = dst.add_object("B", ObjectData::Empty);
        let a2 = dst.add_object("A", ObjectData::Empty);
        dst.import_physics(&settings).expect("import");
        let con = dst
            .object(b2)
            .ok()
            .and_then(|o| o.rigidbody_constraint.clone())
            .expect("con");
        assert_eq!(con.object1, Some(a2));
        assert_eq!(con.object2, Some(b2));
        assert!(dst.find_collection(RIGIDBODY_GROUP_NAME).is_some());
    }

    #[test]
    fn imported_bodies_survive_ron_and_evaluation() {
        let mut src = Main::new();
        let a = src.add_object("A", ObjectData::Empty);
        let b = src.add_object("B", ObjectData::Empty);
        let hinge = src.add_object("Hinge", ObjectData::Empty);
        src.add_rigidbody_object(a, BodyType::Active).expect("body a");
        src.add_rigidbody_object(b, BodyType::Passive).expect("body b");
        src.add_rigidbody_constraint(hinge, ConstraintType::Hinge, Some(a), Some(b))
            .expect("con");
        let text = src.export_physics().to_ron().expect("serialize");
        let settings = PhysicsSettings::from_ron(&text).expect("deserialize");

        let mut dst = Main::new();
        let a2 = dst.add_object("A", ObjectData::Empty);
        let b2 = dst.add_object("B", ObjectData::Empty);
        let hinge2 = dst.add_object("Hinge", ObjectData::Empty);
        dst.import_physics(&settings).expect("import");

        let world = dst.rigidbody_world.as_ref().expect("world");
        let group = world.group.expect("group");
        let constraints = world.constraints.expect("constraints");
        assert_eq!(dst.collection(group).map(|c| c.objects.clone()).ok(), Some(vec![a2, b2]));
        assert_eq!(
            dst.collection(constraints).map(|c| c.objects.clone()).ok(),
            Some(vec![hinge2])
        );
        assert!(dst.collection(group).map(|c| c.fake_user).unwrap_or(false));

        Depsgraph::new().evaluate(&mut dst);
        assert_eq!(dst.rigidbody_world.as_ref().map(|w| w.num_bodies), Some(2));
    }

    #[test]
    fn failed_physics_import_leaves_main_untouched() {
        let mut src = Main::new();
        let a = src.add_object("A", ObjectData::Empty);
        let b = src.add_object("B", ObjectData::Empty);
        src.add_rigidbody_object(a, BodyType::Active).expect("body a");
        src.add_rigidbody_object(b, BodyType::Active).expect("body b");
        let settings = src.export_physics();

        let mut empty = Main::new();
        assert!(matches!(
            empty.import_physics(&settings),
            Err(CoreError::NotFound { kind: "Object", .. })
        ));
        assert!(empty.rigidbody_world.is_none());
        assert_eq!(empty.collections().count(), 1);

        // "A" resolves, "B" does not: "A" must not pick up its body.
        let mut partial = Main::new();
        let a2 = partial.add_object("A", ObjectData::Empty);
        assert!(partial.import_physics(&settings).is_err());
        assert!(partial.object(a2).map(|o| o.rigidbody.is_none()).unwrap_or(false));
        assert!(partial.rigidbody_world.is_none());
        assert_eq!(partial.collections().count(), 1);
    }

    #[test]
    fn recreated_body_group_keeps_fake_user() {
        let mut main = Main::new();
        let ob = main.add_object("Cube", ObjectData::Empty);
        main.ensure_rigidbody_world().expect("world").group = None;
        main.add_rigidbody_object(ob, BodyType::Active).expect("body");

        let group = main.rigidbody_world.as_ref().and_then(|w| w.group).expect("group");
        assert!(main.collection(group).map(|c| c.fake_user).unwrap_or(false));
        assert_eq!(main.collection(group).map(|c| c.objects.clone()).ok(), Some(vec![ob]));
    }
}
