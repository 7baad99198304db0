//! Polygon mesh: vertices, unique edges, face corners (loops) and n-gons.

use common::{CoreError, CoreResult};

use crate::{Vec2, Vec3};

/// Face corner: the vertex it sits on and the edge to the next corner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MeshLoop {
    pub vert: u32,
    pub edge: u32,
}

/// N-gon as a contiguous run of loops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MeshPoly {
    pub loop_start: u32,
    pub loop_total: u32,
    pub material_index: u16,
    pub smooth: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<Vec3>,
    pub edges: Vec<[u32; 2]>,
    pub loops: Vec<MeshLoop>,
    pub polys: Vec<MeshPoly>,
    /// Per-loop texture coordinates.
    pub uv_layer: Option<Vec<Vec2>>,
    pub materials: Vec<String>,
}

impl Mesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns `true` if there is at least one polygon to show.
    pub fn is_valid(&self) -> bool {
        !self.vertices.is_empty() && !self.polys.is_empty()
    }

    /// Vertex indices of one polygon, in winding order.
    pub fn poly_verts(&self, poly: &MeshPoly) -> impl Iterator<Item = u32> + '_ {
        let start = poly.loop_start as usize;
        let end = start + poly.loop_total as usize;
        self.loops[start..end].iter().map(|l| l.vert)
    }

    /// Fan-triangulate every polygon into a flat index list.
    pub fn triangulate(&self) -> Vec<u32> {
        let mut indices = Vec::with_capacity(self.loops.len().saturating_sub(2 * self.polys.len()) * 3);
        for poly in &self.polys {
            let verts: Vec<u32> = self.poly_verts(poly).collect();
            if verts.len() < 3 {
                continue;
            }
            for tri in 1..(verts.len() - 1) {
                indices.push(verts[0]);
                indices.push(verts[tri]);
                indices.push(verts[tri + 1]);
            }
        }
        indices
    }

    /// Axis-aligned bounds, `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.vertices.first()?;
        Some(
            self.vertices
                .iter()
                .fold((first, first), |(min, max), v| (min.min(*v), max.max(*v))),
        )
    }

    /// Check that every index stays inside its array and polygons tile
    /// the loop array without gaps.
    pub fn validate(&self) -> CoreResult<()> {
        let vert_count = self.vertices.len() as u32;
        let edge_count = self.edges.len() as u32;

        for (i, [a, b]) in self.edges.iter().enumerate() {
            if *a >= vert_count || *b >= vert_count || a == b {
                return Err(CoreError::Generic(format!(
                    "mesh '{}': edge {} is invalid ({}, {})",
                    self.name, i, a, b
                )));
            }
        }

        let mut expected_start = 0u32;
        for (i, poly) in self.polys.iter().enumerate() {
            if poly.loop_start != expected_start || poly.loop_total < 3 {
                return Err(CoreError::Generic(format!(
                    "mesh '{}': polygon {} has a broken loop range",
                    self.name, i
                )));
            }
            if poly.material_index as usize >= self.materials.len().max(1) {
                return Err(CoreError::Generic(format!(
                    "mesh '{}': polygon {} uses missing material slot {}",
                    self.name, i, poly.material_index
                )));
            }
            expected_start += poly.loop_total;
        }
        if expected_start as usize != self.loops.len() {
            return Err(CoreError::Generic(format!(
                "mesh '{}': polygons own {} loops, mesh has {}",
                self.name,
                expected_start,
                self.loops.len()
            )));
        }

        for (i, l) in self.loops.iter().enumerate() {
            if l.vert >= vert_count || l.edge >= edge_count {
                return Err(CoreError::Generic(format!(
                    "mesh '{}': loop {} is out of range",
                    self.name, i
                )));
            }
        }

        if let Some(uvs) = &self.uv_layer {
            if uvs.len() != self.loops.len() {
                return Err(CoreError::Generic(format!(
                    "mesh '{}': uv layer has {} entries for {} loops",
                    self.name,
                    uvs.len(),
                    self.loops.len()
                )));
            }
        }

        Ok(())
    }
}
