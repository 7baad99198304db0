//! Wavefront OBJ import: text → raw objects → polygon meshes → scene.

pub mod dump;
pub mod importer;
pub mod mesh;
pub mod obj;
pub mod raw;

pub use importer::{ImportReport, ObjImportParams, importer_main, make_objects};
pub use raw::{FaceCorner, RawFace, RawObject};
