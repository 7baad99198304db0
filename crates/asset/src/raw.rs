//! Raw per-object data collected while scanning OBJ text.

use corelib::{Vec2, Vec3};

/// One face corner. Indices are 0-based and local to the owning object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FaceCorner {
    pub vert_index: usize,
    pub uv_index: Option<usize>,
    pub normal_index: Option<usize>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawFace {
    pub corners: Vec<FaceCorner>,
    /// Slot in [`RawObject::material_names`].
    pub material_index: Option<usize>,
    pub smooth: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawObject {
    pub name: String,
    pub vertices: Vec<Vec3>,
    pub texture_vertices: Vec<Vec2>,
    pub normals: Vec<Vec3>,
    pub faces: Vec<RawFace>,
    /// Material names in first-use order, without duplicates.
    pub material_names: Vec<String>,
}

impl RawObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Total number of face corners.
    pub fn tot_loop(&self) -> usize {
        self.faces.iter().map(|f| f.corners.len()).sum()
    }

    #[inline]
    pub fn tot_normals(&self) -> usize {
        self.normals.len()
    }

    /// Slot of `name`, appending it when first seen.
    pub fn material_slot(&mut self, name: &str) -> usize {
        match self.material_names.iter().position(|m| m == name) {
            Some(slot) => slot,
            None => {
                self.material_names.push(name.to_string());
                self.material_names.len() - 1
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.faces.is_empty()
    }
}
