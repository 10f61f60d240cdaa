use super::buffer::HistogramBuffer;
use crate::color::LayerColors;
use crate::types::{EnabledLayers, HistogramLayer};
use rayon::prelude::*;

/// Unit bar made of two triangles, in bar-local coordinates.
///
/// The WGSL vertex stage receives the same six corners through the `Vertices` binding.
pub const BAR_CORNERS: [[f32; 2]; VERTICES_PER_BAR] = [
    [0.0, 0.0],
    [0.0, 1.0],
    [1.0, 1.0],
    [0.0, 0.0],
    [1.0, 0.0],
    [1.0, 1.0],
];

pub const VERTICES_PER_BAR: usize = 6;

/// One corner of a histogram bar in overlay space.
///
/// `position` is in [0, 1] × [0, 1] with the origin at the bottom-left corner of the overlay.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BarVertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
    pub layer: u32,
    pub bin: u32,
}

impl BarVertex {
    pub fn layer(&self) -> Option<HistogramLayer> {
        HistogramLayer::from_index(self.layer as usize)
    }
}

/// Output of the geometry stage, ordered by layer (Red, Green, Blue, Luminance) then by bin.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BarGeometry {
    vertices: Vec<BarVertex>,
}

impl BarGeometry {
    pub fn vertices(&self) -> &[BarVertex] {
        &self.vertices
    }

    pub fn into_vertices(self) -> Vec<BarVertex> {
        self.vertices
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Vertices grouped six at a time, one group per bar.
    pub fn bars(&self) -> impl Iterator<Item = &[BarVertex]> {
        self.vertices.chunks_exact(VERTICES_PER_BAR)
    }

    pub fn for_layer(&self, layer: HistogramLayer) -> impl Iterator<Item = &BarVertex> {
        self.vertices
            .iter()
            .filter(move |vertex| vertex.layer == layer as u32)
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}

/// Bar height for `count` scaled against `max`. A zero maximum is treated as 1.
pub fn bar_height(count: u32, max: u32) -> f32 {
    (count as f32 / max.max(1) as f32).clamp(0.0, 1.0)
}

/// Geometry stage: six vertices per bin for every enabled layer.
///
/// Heights come from the per-layer maxima already stored in `histogram` by the
/// normalization stage. Disabled layers produce no vertices at all.
pub fn generate_bars(histogram: &HistogramBuffer, colors: &LayerColors, layers: EnabledLayers) -> BarGeometry {
    let bins = histogram.bins_count();
    let maxima = histogram.max_bin_values();
    let n = bins.get() as f32;

    let mut vertices = Vec::with_capacity(layers.len() * bins.as_usize() * VERTICES_PER_BAR);
    for layer in layers.iter() {
        let color = colors.get(layer).to_f32();
        let max = maxima.get(layer);

        let bars: Vec<[BarVertex; VERTICES_PER_BAR]> = (0..bins.as_usize())
            .into_par_iter()
            .map(|bin| {
                let height = bar_height(histogram.count(layer, bin), max);
                // bin i spans [i/N, (i+1)/N]
                BAR_CORNERS.map(|[x, y]| BarVertex {
                    position: [(bin as f32 + x) / n, y * height],
                    color,
                    layer: layer as u32,
                    bin: bin as u32,
                })
            })
            .collect();

        vertices.extend(bars.into_iter().flatten());
    }

    BarGeometry { vertices }
}
