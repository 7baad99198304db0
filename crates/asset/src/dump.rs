//! Human-readable listing of parsed OBJ data, for debugging imports.

use std::io::{self, Write};

use crate::raw::RawObject;

/// Write vertices, texture vertices, face corner indices and material
/// names of every object.
pub fn write_obj_data<W: Write>(out: &mut W, objects: &[RawObject]) -> io::Result<()> {
    for ob in objects {
        writeln!(out, "object: {}", ob.name)?;
        for v in &ob.vertices {
            writeln!(out, "vert: {:.3} {:.3} {:.3}", v.x, v.y, v.z)?;
        }
        writeln!(out)?;
        for vt in &ob.texture_vertices {
            writeln!(out, "tex vert: {:.3} {:.3}", vt.x, vt.y)?;
        }
        writeln!(out)?;
        for face in &ob.faces {
            let indices: Vec<String> = face
                .corners
                .iter()
                .map(|c| c.vert_index.to_string())
                .collect();
            writeln!(out, "{}", indices.join(" "))?;
        }
        writeln!(out)?;
        for name in &ob.material_names {
            writeln!(out, "{}", name)?;
        }
    }
    Ok(())
}
