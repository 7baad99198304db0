//! Datablock identifiers, recalc tags and unique naming.

use serde::{Deserialize, Serialize};

use crate::flags::flag_set;

/// Dense index of an object inside [`crate::scene::Main`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

/// Dense index of a collection inside [`crate::scene::Main`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionId(pub u32);

/// Any taggable datablock.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdRef {
    Object(ObjectId),
    Collection(CollectionId),
}

impl From<ObjectId> for IdRef {
    fn from(id: ObjectId) -> Self {
        IdRef::Object(id)
    }
}

impl From<CollectionId> for IdRef {
    fn from(id: CollectionId) -> Self {
        IdRef::Collection(id)
    }
}

flag_set! {
    /// What needs re-evaluation on a datablock.
    pub struct RecalcFlags {
        const TRANSFORM = 1 << 0;
        const GEOMETRY = 1 << 1;
        /// Evaluated copies must be refreshed from the original.
        const COPY_ON_WRITE = 1 << 2;
    }
}

impl RecalcFlags {
    /// Everything an evaluation pass can refresh.
    pub const ALL: Self = Self::all();
}

/// Longest name a datablock may carry (bytes), suffix included.
pub const MAX_NAME_LEN: usize = 63;

/// Split `"Cube.004"` into `("Cube", Some(4))`.
pub fn split_name_number(name: &str) -> (&str, Option<u32>) {
    if let Some((base, digits)) = name.rsplit_once('.') {
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = digits.parse::<u32>() {
                return (base, Some(n));
            }
        }
    }
    (name, None)
}

/// Return `name` if free, otherwise the first free `base.NNN`.
pub fn unique_name(name: &str, is_taken: impl Fn(&str) -> bool) -> String {
    let name = truncate_name(name, MAX_NAME_LEN);
    if !is_taken(name) {
        return name.to_string();
    }

    let (base, number) = split_name_number(name);
    let mut n = number.unwrap_or(0) + 1;
    loop {
        let suffix = format!(".{:03}", n);
        let candidate = format!("{}{}", truncate_name(base, MAX_NAME_LEN - suffix.len()), suffix);
        if !is_taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn truncate_name(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
