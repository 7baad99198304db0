//! Build polygon meshes from raw OBJ objects.

use std::collections::HashMap;

use corelib::mesh::{Mesh, MeshLoop, MeshPoly};
use corelib::{Vec2, Vec3};

use crate::raw::{RawFace, RawObject};

/// Incremental n-gon builder sharing edges between faces.
struct MeshBuilder {
    mesh: Mesh,
    edge_lookup: HashMap<(u32, u32), u32>,
    uvs: Option<Vec<Vec2>>,
}

impl MeshBuilder {
    fn with_capacity(name: &str, verts: usize, loops: usize, faces: usize, uvs: bool) -> Self {
        let mut mesh = Mesh::new(name);
        mesh.vertices.reserve(verts);
        mesh.loops.reserve(loops);
        mesh.polys.reserve(faces);
        Self {
            mesh,
            edge_lookup: HashMap::with_capacity(loops),
            uvs: uvs.then(|| Vec::with_capacity(loops)),
        }
    }

    fn add_vertex(&mut self, co: Vec3) -> u32 {
        self.mesh.vertices.push(co);
        (self.mesh.vertices.len() - 1) as u32
    }

    /// Existing edge between `a` and `b`, or a new one.
    fn ensure_edge(&mut self, a: u32, b: u32) -> u32 {
        let key = if a < b { (a, b) } else { (b, a) };
        let edges = &mut self.mesh.edges;
        *self.edge_lookup.entry(key).or_insert_with(|| {
            edges.push([key.0, key.1]);
            (edges.len() - 1) as u32
        })
    }

    fn add_ngon(&mut self, verts: &[u32], uvs: &[Vec2], material_index: u16, smooth: bool) {
        let loop_start = self.mesh.loops.len() as u32;
        for (i, &v) in verts.iter().enumerate() {
            let next = verts[(i + 1) % verts.len()];
            let edge = self.ensure_edge(v, next);
            self.mesh.loops.push(MeshLoop { vert: v, edge });
        }
        if let Some(layer) = self.uvs.as_mut() {
            layer.extend_from_slice(uvs);
        }
        self.mesh.polys.push(MeshPoly {
            loop_start,
            loop_total: verts.len() as u32,
            material_index,
            smooth,
        });
    }

    fn finish(mut self) -> Mesh {
        self.mesh.uv_layer = self.uvs;
        self.mesh
    }
}

/// Vertex indices of a face, or `None` when it repeats a vertex,
/// references a missing one or has fewer than three corners.
fn face_verts(raw: &RawObject, face: &RawFace) -> Option<Vec<u32>> {
    let mut verts: Vec<u32> = Vec::with_capacity(face.corners.len());
    for corner in &face.corners {
        let v = corner.vert_index as u32;
        if corner.vert_index >= raw.vertices.len() || verts.contains(&v) {
            return None;
        }
        verts.push(v);
    }
    (verts.len() >= 3).then_some(verts)
}

/// Convert one raw object into a mesh: every vertex, then one n-gon per
/// face. Faces that repeat a vertex or reference a missing one are skipped.
/// The UV layer exists when every corner of every kept face has a UV.
pub fn mesh_from_raw(raw: &RawObject) -> Mesh {
    let mut kept: Vec<(&RawFace, Vec<u32>)> = Vec::with_capacity(raw.faces.len());
    for (face_index, face) in raw.faces.iter().enumerate() {
        match face_verts(raw, face) {
            Some(verts) => kept.push((face, verts)),
            None => log::warn!(
                "Object '{}': skipping degenerate face {}",
                raw.name,
                face_index
            ),
        }
    }
    let skipped = raw.faces.len() - kept.len();

    let use_uvs = !kept.is_empty()
        && kept.iter().all(|(face, _)| {
            face.corners
                .iter()
                .all(|c| c.uv_index.is_some_and(|i| i < raw.texture_vertices.len()))
        });

    let mut builder = MeshBuilder::with_capacity(
        &raw.name,
        raw.vertices.len(),
        raw.tot_loop(),
        kept.len(),
        use_uvs,
    );

    for co in &raw.vertices {
        builder.add_vertex(*co);
    }

    let mut uvs: Vec<Vec2> = Vec::new();
    for (face, verts) in &kept {
        uvs.clear();
        if use_uvs {
            uvs.extend(face.corners.iter().map(|c| {
                c.uv_index
                    .and_then(|i| raw.texture_vertices.get(i).copied())
                    .unwrap_or(Vec2::ZERO)
            }));
        }
        let material_index = face
            .material_index
            .and_then(|i| u16::try_from(i).ok())
            .unwrap_or(0);
        builder.add_ngon(verts, &uvs, material_index, face.smooth);
    }

    let mut mesh = builder.finish();
    mesh.materials = raw.material_names.clone();
    log::debug!(
        "Built mesh '{}': {} verts, {} edges, {} loops, {} polys ({} skipped)",
        mesh.name,
        mesh.vertices.len(),
        mesh.edges.len(),
        mesh.loops.len(),
        mesh.polys.len(),
        skipped
    );
    mesh
}
