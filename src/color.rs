use crate::types::{HistogramLayer, LAYER_COUNT};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 8-bit RGBA color used to tint histogram layers and clear the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RgbaColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl RgbaColor {
    pub const RED: RgbaColor = RgbaColor::new(255, 0, 0, 255);
    pub const GREEN: RgbaColor = RgbaColor::new(0, 255, 0, 255);
    pub const BLUE: RgbaColor = RgbaColor::new(0, 0, 255, 255);
    pub const WHITE: RgbaColor = RgbaColor::new(255, 255, 255, 255);
    pub const BLACK: RgbaColor = RgbaColor::new(0, 0, 0, 255);
    pub const TRANSPARENT: RgbaColor = RgbaColor::new(0, 0, 0, 0);

    pub const fn new(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Same color with its alpha replaced by `opacity` in [0, 1].
    pub fn opacity(self, opacity: f32) -> Self {
        let alpha = (255.0 * opacity.clamp(0.0, 1.0)).round() as u8;
        Self { alpha, ..self }
    }

    /// Source-over blend of `self` onto `dst`.
    ///
    /// Matches the overlay render target blend state: every component, alpha included, is
    /// `src * src.a + dst * (1 - src.a)`.
    pub fn blend_over(self, dst: RgbaColor) -> RgbaColor {
        let sbf = self.alpha as f32 / 255.0;
        let dbf = 1.0 - sbf;
        let mix = |s: u8, d: u8| (s as f32 * sbf + d as f32 * dbf).round().clamp(0.0, 255.0) as u8;

        RgbaColor::new(
            mix(self.red, dst.red),
            mix(self.green, dst.green),
            mix(self.blue, dst.blue),
            mix(self.alpha, dst.alpha),
        )
    }

    /// Normalized float components, the layout of one entry of the `Colors` vertex binding.
    pub fn to_f32(self) -> [f32; 4] {
        [
            self.red as f32 / 255.0,
            self.green as f32 / 255.0,
            self.blue as f32 / 255.0,
            self.alpha as f32 / 255.0,
        ]
    }

    pub fn from_f32(rgba: [f32; 4]) -> Self {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        RgbaColor::new(q(rgba[0]), q(rgba[1]), q(rgba[2]), q(rgba[3]))
    }

    pub fn to_wgpu(self) -> wgpu::Color {
        let [r, g, b, a] = self.to_f32();
        wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: a as f64,
        }
    }

    pub fn to_pixel(self) -> image::Rgba<u8> {
        image::Rgba([self.red, self.green, self.blue, self.alpha])
    }

    pub fn from_pixel(pixel: image::Rgba<u8>) -> Self {
        let [r, g, b, a] = pixel.0;
        RgbaColor::new(r, g, b, a)
    }
}

impl fmt::Display for RgbaColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.red, self.green, self.blue, self.alpha)
    }
}

/// Tint per histogram layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerColors {
    pub red: RgbaColor,
    pub green: RgbaColor,
    pub blue: RgbaColor,
    pub luminance: RgbaColor,
}

impl LayerColors {
    pub fn new(red: RgbaColor, green: RgbaColor, blue: RgbaColor, luminance: RgbaColor) -> Self {
        Self {
            red,
            green,
            blue,
            luminance,
        }
    }

    pub fn get(&self, layer: HistogramLayer) -> RgbaColor {
        match layer {
            HistogramLayer::Red => self.red,
            HistogramLayer::Green => self.green,
            HistogramLayer::Blue => self.blue,
            HistogramLayer::Luminance => self.luminance,
        }
    }

    pub fn set(&mut self, layer: HistogramLayer, color: RgbaColor) {
        match layer {
            HistogramLayer::Red => self.red = color,
            HistogramLayer::Green => self.green = color,
            HistogramLayer::Blue => self.blue = color,
            HistogramLayer::Luminance => self.luminance = color,
        }
    }

    /// Applies the same opacity to every layer.
    pub fn with_opacity(self, opacity: f32) -> Self {
        Self {
            red: self.red.opacity(opacity),
            green: self.green.opacity(opacity),
            blue: self.blue.opacity(opacity),
            luminance: self.luminance.opacity(opacity),
        }
    }

    pub fn to_uniform(&self) -> [[f32; 4]; LAYER_COUNT] {
        HistogramLayer::ALL.map(|layer| self.get(layer).to_f32())
    }
}

impl Default for LayerColors {
    fn default() -> Self {
        Self::new(RgbaColor::RED, RgbaColor::GREEN, RgbaColor::BLUE, RgbaColor::WHITE)
    }
}
