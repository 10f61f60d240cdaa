//! Binning stage: reduces texture samples into per-layer bin counts.
//!
//! The numeric policy here is mirrored line for line by `shaders/histogram.wgsl`:
//! samples are optionally sRGB-decoded, luminance is the Rec. 709 weighted sum of the
//! (decoded) RGB values, and a value `v` lands in bin `floor(v * (bins - 1) + 0.5)`,
//! clamped to the valid range. Fully transparent pixels are not counted.

use crate::errors::{HistogramError, Result};
use crate::texture::HistogramTexture;
use crate::types::{BinsCount, LAYER_COUNT};
use lazy_static::lazy_static;
use palette::{LinSrgb, Srgb};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

/// Rec. 709 luminance coefficients for R, G and B.
pub const LUMINANCE_WEIGHTS: [f32; 3] = [0.2126, 0.7152, 0.0722];

lazy_static! {
    static ref SRGB_TO_LINEAR: [f32; 256] = {
        let mut table = [0.0f32; 256];
        for (code, value) in table.iter_mut().enumerate() {
            *value = srgb_to_linear(code as f32 / 255.0);
        }
        table
    };
}

/// sRGB electro-optical transfer function. Monotonic, maps [0, 1] onto [0, 1].
pub fn srgb_to_linear(value: f32) -> f32 {
    let value = value.clamp(0.0, 1.0);
    let linear: LinSrgb<f32> = Srgb::new(value, value, value).into_linear();
    linear.red
}

pub fn luminance(rgb: [f32; 3]) -> f32 {
    let l = LUMINANCE_WEIGHTS[0] * rgb[0] + LUMINANCE_WEIGHTS[1] * rgb[1] + LUMINANCE_WEIGHTS[2] * rgb[2];
    l.clamp(0.0, 1.0)
}

/// Bin of a normalized sample value. NaN and negative values go to bin 0, values at or
/// above 1.0 go to the last bin.
pub fn bin_index(value: f32, bins: BinsCount) -> usize {
    let last = bins.get() - 1;
    if !(value > 0.0) {
        return 0;
    }
    let scaled = (value * last as f32 + 0.5).floor().min(last as f32);
    scaled as usize
}

/// Converts RGBA8 pixels into the four per-layer sample values.
#[derive(Debug, Clone, Copy)]
pub struct SampleDecoder {
    is_linear: bool,
}

impl SampleDecoder {
    pub fn new(is_linear: bool) -> Self {
        Self { is_linear }
    }

    fn channel(&self, code: u8) -> f32 {
        if self.is_linear {
            SRGB_TO_LINEAR[code as usize]
        } else {
            code as f32 / 255.0
        }
    }

    /// Red, Green, Blue and Luminance sample values of one pixel.
    pub fn sample(&self, rgba: [u8; 4]) -> [f32; LAYER_COUNT] {
        let rgb = [self.channel(rgba[0]), self.channel(rgba[1]), self.channel(rgba[2])];
        [rgb[0], rgb[1], rgb[2], luminance(rgb)]
    }

    /// Counter cells one pixel increments, or `None` for a transparent pixel.
    pub fn cells(&self, rgba: [u8; 4], bins: BinsCount) -> Option<[usize; LAYER_COUNT]> {
        if rgba[3] == 0 {
            return None;
        }
        let samples = self.sample(rgba);
        let mut cells = [0usize; LAYER_COUNT];
        for (layer, (cell, value)) in cells.iter_mut().zip(samples).enumerate() {
            *cell = bin_index(value, bins) * LAYER_COUNT + layer;
        }
        Some(cells)
    }
}

/// Adaptive tile count based on image size
pub fn optimal_tile_count(width: u32, height: u32) -> usize {
    let total_pixels = width as u64 * height as u64;
    let min_tiles = 2;
    let max_tiles = num_cpus::get().max(min_tiles);

    if total_pixels < 250_000 {
        min_tiles
    } else if total_pixels < 4_000_000 {
        (max_tiles / 2).max(min_tiles)
    } else {
        max_tiles * 2
    }
}

/// Adds the samples of `texture` to `counters`.
///
/// Row tiles are reduced in parallel into private histograms which are then merged with
/// atomic adds, so concurrent tiles never lose an increment. `counters` must hold
/// `bins.cell_count()` cells and is not cleared here.
pub fn accumulate(
    texture: &HistogramTexture,
    bins: BinsCount,
    is_linear: bool,
    counters: &[AtomicU32],
) -> Result<()> {
    texture.validate()?;
    if counters.len() != bins.cell_count() {
        return Err(HistogramError::BufferSizeMismatch {
            expected: bins.cell_count(),
            actual: counters.len(),
        });
    }

    let decoder = SampleDecoder::new(is_linear);
    let row_bytes = texture.width() as usize * 4;
    let tiles = optimal_tile_count(texture.width(), texture.height());
    let rows_per_tile = (texture.height() as usize).div_ceil(tiles).max(1);

    texture
        .as_bytes()
        .par_chunks(row_bytes * rows_per_tile)
        .for_each(|tile| {
            let mut local = vec![0u32; counters.len()];
            for pixel in tile.chunks_exact(4) {
                if let Some(cells) = decoder.cells([pixel[0], pixel[1], pixel[2], pixel[3]], bins) {
                    for cell in cells {
                        local[cell] += 1;
                    }
                }
            }

            for (counter, &count) in counters.iter().zip(&local) {
                if count != 0 {
                    counter.fetch_add(count, Ordering::Relaxed);
                }
            }
        });

    Ok(())
}
