//! Core scene types: math re-exports, Transform, datablock registry,
//! meshes, grease pencil, rigid-body settings and dependency evaluation.

pub use glam::{EulerRot, Mat4, Quat, Vec2, Vec3, vec2, vec3};

mod flags;

pub mod depsgraph;
pub mod gpencil;
pub mod id;
pub mod mesh;
pub mod modifier;
pub mod rigidbody;
pub mod scene;
pub mod transform;
