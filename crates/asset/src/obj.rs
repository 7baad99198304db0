//! OBJ parser producing one [`RawObject`] per `o` statement.
//!
//! Recognised statements: `o`, `v`, `vt`, `vn`, `f`, `usemtl`, `s`.
//! Comments, blank lines and other statements are skipped. Face indices
//! are global and 1-based in the file; they are stored 0-based and local
//! to the object that owns the face.

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use corelib::{Vec2, Vec3};

use crate::raw::{FaceCorner, RawFace, RawObject};

/// Name given to data that appears before the first `o`.
pub const DEFAULT_OBJECT_NAME: &str = "Default";
/// Name given to `o` statements without a name.
pub const UNNAMED_OBJECT_NAME: &str = "Object";

/// Parse an OBJ file from a path.
pub fn load_raw_from_path(path: impl AsRef<Path>) -> Result<Vec<RawObject>> {
    let file = File::open(&path)
        .with_context(|| format!("Failed to open OBJ file: {}", path.as_ref().display()))?;
    parse_and_store(BufReader::new(file))
        .with_context(|| format!("Failed to parse OBJ file: {}", path.as_ref().display()))
}

/// Parse OBJ data from a [`BufRead`] implementation.
pub fn load_raw_from_reader<R: BufRead>(reader: R) -> Result<Vec<RawObject>> {
    parse_and_store(reader)
}

/// Convenience helper to parse an OBJ string literal.
pub fn load_raw_from_str(contents: &str) -> Result<Vec<RawObject>> {
    parse_and_store(io::Cursor::new(contents))
}

/// Element counts of all objects before the current one.
#[derive(Clone, Copy, Debug, Default)]
struct IndexOffsets {
    vertex: usize,
    uv: usize,
    normal: usize,
}

#[derive(Default)]
struct ParseState {
    objects: Vec<RawObject>,
    offsets: IndexOffsets,
    active_material: Option<String>,
    smooth: bool,
}

impl ParseState {
    fn begin_object(&mut self, name: &str) {
        if let Some(prev) = self.objects.last() {
            self.offsets.vertex += prev.vertices.len();
            self.offsets.uv += prev.texture_vertices.len();
            self.offsets.normal += prev.normals.len();
        }
        let name = if name.is_empty() { UNNAMED_OBJECT_NAME } else { name };
        self.objects.push(RawObject::new(name));
    }

    /// The object receiving data, created implicitly if the file has not
    /// named one yet.
    fn current(&mut self) -> &mut RawObject {
        if self.objects.is_empty() {
            log::debug!("Data before first 'o', using object '{}'", DEFAULT_OBJECT_NAME);
            self.begin_object(DEFAULT_OBJECT_NAME);
        }
        let last = self.objects.len() - 1;
        &mut self.objects[last]
    }
}

/// Scan OBJ text line by line into raw objects.
pub fn parse_and_store<R: BufRead>(reader: R) -> Result<Vec<RawObject>> {
    let mut state = ParseState::default();
    let mut pending = String::new();
    let mut first_line_no = 0;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;

        // Join `\` continuations; errors report the first physical line.
        if pending.is_empty() {
            first_line_no = line_no;
        }
        if let Some(head) = line.trim_end().strip_suffix('\\') {
            pending.push_str(head);
            pending.push(' ');
            continue;
        }
        pending.push_str(&line);
        let logical = std::mem::take(&mut pending);
        parse_line(&mut state, &logical, first_line_no)?;
    }
    if !pending.is_empty() {
        parse_line(&mut state, &pending, first_line_no)?;
    }

    for ob in &state.objects {
        log::info!(
            "Parsed OBJ object '{}': {} verts, {} uvs, {} normals, {} faces, {} materials",
            ob.name,
            ob.vertices.len(),
            ob.texture_vertices.len(),
            ob.tot_normals(),
            ob.faces.len(),
            ob.material_names.len()
        );
    }
    Ok(state.objects)
}

fn parse_line(state: &mut ParseState, line: &str, line_no: usize) -> Result<()> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(());
    }

    let (tag, rest) = trimmed
        .split_once(char::is_whitespace)
        .map(|(tag, rest)| (tag, rest.trim()))
        .unwrap_or((trimmed, ""));
    let mut parts = rest.split_whitespace();

    match tag {
        "o" => state.begin_object(rest),
        "v" => {
            let x = parse_f32(parts.next(), line_no, "x coordinate")?;
            let y = parse_f32(parts.next(), line_no, "y coordinate")?;
            let z = parse_f32(parts.next(), line_no, "z coordinate")?;
            state.current().vertices.push(Vec3::new(x, y, z));
        }
        "vt" => {
            let u = parse_f32(parts.next(), line_no, "u coordinate")?;
            let v = match parts.next() {
                Some(token) => parse_f32(Some(token), line_no, "v coordinate")?,
                None => 0.0,
            };
            state.current().texture_vertices.push(Vec2::new(u, v));
        }
        "vn" => {
            let nx = parse_f32(parts.next(), line_no, "nx coordinate")?;
            let ny = parse_f32(parts.next(), line_no, "ny coordinate")?;
            let nz = parse_f32(parts.next(), line_no, "nz coordinate")?;
            state.current().normals.push(Vec3::new(nx, ny, nz));
        }
        "f" => parse_face(state, parts, line_no)?,
        "usemtl" => {
            if rest.is_empty() {
                log::warn!("Ignoring 'usemtl' without a name on line {}", line_no + 1);
            } else {
                state.current().material_slot(rest);
                state.active_material = Some(rest.to_string());
            }
        }
        "s" => {
            state.smooth = !matches!(rest, "" | "off" | "0");
        }
        _ => {
            log::debug!("Skipping OBJ statement '{}' on line {}", tag, line_no + 1);
        }
    }
    Ok(())
}

fn parse_face<'a>(
    state: &mut ParseState,
    parts: impl Iterator<Item = &'a str>,
    line_no: usize,
) -> Result<()> {
    let offsets = state.offsets;
    let smooth = state.smooth;
    let active_material = state.active_material.clone();
    let ob = state.current();

    let counts = ElementCounts {
        vertex: (offsets.vertex, ob.vertices.len()),
        uv: (offsets.uv, ob.texture_vertices.len()),
        normal: (offsets.normal, ob.normals.len()),
    };

    let mut corners = Vec::new();
    for part in parts {
        corners.push(parse_face_corner(part, &counts, line_no)?);
    }

    if corners.len() < 3 {
        log::warn!(
            "Dropping face with {} corner(s) on line {}",
            corners.len(),
            line_no + 1
        );
        return Ok(());
    }

    let material_index = active_material.map(|name| ob.material_slot(&name));
    ob.faces.push(RawFace {
        corners,
        material_index,
        smooth,
    });
    Ok(())
}

/// `(offset, local count)` per element kind.
struct ElementCounts {
    vertex: (usize, usize),
    uv: (usize, usize),
    normal: (usize, usize),
}

fn parse_f32(value: Option<&str>, line_no: usize, what: &str) -> Result<f32> {
    let token = value.ok_or_else(|| anyhow!("Missing {} on line {}", what, line_no + 1))?;
    token
        .parse::<f32>()
        .with_context(|| format!("Failed to parse {} on line {}", what, line_no + 1))
}

fn parse_face_corner(token: &str, counts: &ElementCounts, line_no: usize) -> Result<FaceCorner> {
    let mut split = token.split('/');
    let pos = split
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("Malformed face element '{}' on line {}", token, line_no + 1))?;
    let vert_index = resolve_index(pos, counts.vertex, "vertex", line_no)?;

    let uv_index = match split.next() {
        Some(value) if !value.is_empty() => {
            Some(resolve_index(value, counts.uv, "texture vertex", line_no)?)
        }
        _ => None,
    };

    let normal_index = match split.next() {
        Some(value) if !value.is_empty() => {
            Some(resolve_index(value, counts.normal, "normal", line_no)?)
        }
        _ => None,
    };

    Ok(FaceCorner {
        vert_index,
        uv_index,
        normal_index,
    })
}

/// Map a 1-based (or negative, relative) file index to an index local to
/// the current object.
fn resolve_index(
    token: &str,
    (offset, local_len): (usize, usize),
    what: &str,
    line_no: usize,
) -> Result<usize> {
    let raw = token
        .parse::<i64>()
        .with_context(|| format!("Invalid {} index '{}' on line {}", what, token, line_no + 1))?;
    if raw == 0 {
        anyhow::bail!("OBJ indices are 1-based; found 0 on line {}", line_no + 1);
    }

    let total = (offset + local_len) as i64;
    let global = if raw > 0 { raw - 1 } else { total + raw };

    if global < 0 || global >= total {
        anyhow::bail!(
            "OBJ {} index {} resolved out of bounds (len={}) on line {}",
            what,
            raw,
            total,
            line_no + 1
        );
    }
    if global < offset as i64 {
        anyhow::bail!(
            "OBJ {} index {} on line {} refers to an earlier object",
            what,
            raw,
            line_no + 1
        );
    }

    Ok(global as usize - offset)
}
