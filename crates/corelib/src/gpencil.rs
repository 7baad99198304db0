//! Grease pencil drawing data: layers of strokes made of points.

use serde::{Deserialize, Serialize};

use crate::Vec3;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub co: Vec3,
    pub pressure: f32,
    pub strength: f32,
}

impl StrokePoint {
    pub fn new(co: Vec3) -> Self {
        Self {
            co,
            pressure: 1.0,
            strength: 1.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub points: Vec<StrokePoint>,
}

impl Stroke {
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        Self {
            points: points.into_iter().map(StrokePoint::new).collect(),
        }
    }

    /// Polyline length in stroke units.
    pub fn length(&self) -> f32 {
        self.points
            .windows(2)
            .map(|w| w[0].co.distance(w[1].co))
            .sum()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GpencilLayer {
    pub name: String,
    pub strokes: Vec<Stroke>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GpencilData {
    pub layers: Vec<GpencilLayer>,
}

impl GpencilData {
    pub fn strokes(&self) -> impl Iterator<Item = &Stroke> {
        self.layers.iter().flat_map(|l| l.strokes.iter())
    }

    pub fn strokes_mut(&mut self) -> impl Iterator<Item = &mut Stroke> {
        self.layers.iter_mut().flat_map(|l| l.strokes.iter_mut())
    }

    pub fn point_count(&self) -> usize {
        self.strokes().map(|s| s.points.len()).sum()
    }
}
