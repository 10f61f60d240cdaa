//! Software rasterizer for bar geometry.
//!
//! Produces the same image as the GPU bar pipeline: overlay y = 0 is the bottom row, a
//! pixel is covered when its center lies inside a bar, and bars are blended source-over
//! in geometry order.

use crate::color::RgbaColor;
use crate::histogram::BarGeometry;
use image::RgbaImage;

/// Output size and clear color of an overlay render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
    pub background: RgbaColor,
}

impl RenderTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            background: RgbaColor::TRANSPARENT,
        }
    }

    pub fn with_background(mut self, background: RgbaColor) -> Self {
        self.background = background;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Half-open pixel range whose centers fall in `[lo, hi)` of a unit axis of `size` pixels.
fn covered(lo: f32, hi: f32, size: u32) -> std::ops::Range<u32> {
    let first = (lo * size as f32 - 0.5).ceil().max(0.0) as u32;
    let end = (hi * size as f32 - 0.5).ceil().clamp(0.0, size as f32) as u32;
    first.min(end)..end
}

pub fn rasterize(geometry: &BarGeometry, target: RenderTarget) -> RgbaImage {
    let mut image = RgbaImage::from_pixel(target.width, target.height, target.background.to_pixel());
    if target.is_empty() {
        return image;
    }

    for bar in geometry.bars() {
        let (mut x0, mut x1, mut y1) = (f32::MAX, f32::MIN, 0.0f32);
        for vertex in bar {
            x0 = x0.min(vertex.position[0]);
            x1 = x1.max(vertex.position[0]);
            y1 = y1.max(vertex.position[1]);
        }
        if y1 <= 0.0 {
            continue;
        }

        let color = RgbaColor::from_f32(bar[0].color);
        let columns = covered(x0, x1, target.width);
        // rows counted from the bottom edge
        let rows = covered(0.0, y1, target.height);

        for row in rows {
            let y = target.height - 1 - row;
            for x in columns.clone() {
                let pixel = image.get_pixel_mut(x, y);
                *pixel = color.blend_over(RgbaColor::from_pixel(*pixel)).to_pixel();
            }
        }
    }

    image
}
