use crate::errors::{HistogramError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

/// Number of histogram layers (Red, Green, Blue, Luminance).
pub const LAYER_COUNT: usize = 4;

/// Largest accepted bins count. 65536 bins × 4 layers × 4 bytes stays at 1 MiB of storage.
pub const MAX_BINS_COUNT: u32 = 1 << 16;

/// Default number of bins, one per 8-bit code value.
pub const DEFAULT_BINS_COUNT: u32 = 256;

/// Counts for one bin across all four layers, indexed by [`HistogramLayer::index`].
pub type RgblBin = [u32; LAYER_COUNT];

/// Histogram layer identifiers. The discriminants are shared with the WGSL kernels and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u32)]
pub enum HistogramLayer {
    Red = 0,
    Green = 1,
    Blue = 2,
    Luminance = 3,
}

impl HistogramLayer {
    pub const ALL: [HistogramLayer; LAYER_COUNT] = [
        HistogramLayer::Red,
        HistogramLayer::Green,
        HistogramLayer::Blue,
        HistogramLayer::Luminance,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            HistogramLayer::Red => "Red",
            HistogramLayer::Green => "Green",
            HistogramLayer::Blue => "Blue",
            HistogramLayer::Luminance => "Luminance",
        }
    }

    fn mask_bit(self) -> u8 {
        1 << self.index()
    }
}

impl fmt::Display for HistogramLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of layers selected for display. Binning always covers every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EnabledLayers(u8);

impl EnabledLayers {
    pub const NONE: EnabledLayers = EnabledLayers(0);
    pub const ALL: EnabledLayers = EnabledLayers(0b1111);

    pub fn only(layer: HistogramLayer) -> Self {
        EnabledLayers(layer.mask_bit())
    }

    pub fn from_flags(red: bool, green: bool, blue: bool, luminance: bool) -> Self {
        let mut layers = Self::NONE;
        for (layer, on) in HistogramLayer::ALL.into_iter().zip([red, green, blue, luminance]) {
            if on {
                layers.insert(layer);
            }
        }
        layers
    }

    pub fn contains(self, layer: HistogramLayer) -> bool {
        self.0 & layer.mask_bit() != 0
    }

    pub fn insert(&mut self, layer: HistogramLayer) {
        self.0 |= layer.mask_bit();
    }

    pub fn remove(&mut self, layer: HistogramLayer) {
        self.0 &= !layer.mask_bit();
    }

    pub fn with(mut self, layer: HistogramLayer) -> Self {
        self.insert(layer);
        self
    }

    pub fn without(mut self, layer: HistogramLayer) -> Self {
        self.remove(layer);
        self
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Enabled layers in draw order.
    pub fn iter(self) -> impl Iterator<Item = HistogramLayer> {
        HistogramLayer::ALL.into_iter().filter(move |layer| self.contains(*layer))
    }

    /// Per-layer 0/1 flags in the layout of the `EnabledLayers` vertex binding.
    pub fn to_mask(self) -> [u32; LAYER_COUNT] {
        HistogramLayer::ALL.map(|layer| self.contains(layer) as u32)
    }
}

impl Default for EnabledLayers {
    fn default() -> Self {
        Self::ALL
    }
}

/// Parses layer letters such as `"rgbl"`, `"rg"` or `"l"`; `"none"` yields the empty set.
impl FromStr for EnabledLayers {
    type Err = HistogramError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("none") {
            return Ok(Self::NONE);
        }
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::ALL);
        }

        let mut layers = Self::NONE;
        for c in s.chars() {
            let layer = match c.to_ascii_lowercase() {
                'r' => HistogramLayer::Red,
                'g' => HistogramLayer::Green,
                'b' => HistogramLayer::Blue,
                'l' => HistogramLayer::Luminance,
                other => {
                    return Err(HistogramError::Settings {
                        message: format!("unknown histogram layer '{}' in \"{}\"", other, s),
                    })
                }
            };
            layers.insert(layer);
        }
        Ok(layers)
    }
}

impl fmt::Display for EnabledLayers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        for layer in self.iter() {
            let letter = match layer {
                HistogramLayer::Red => 'r',
                HistogramLayer::Green => 'g',
                HistogramLayer::Blue => 'b',
                HistogramLayer::Luminance => 'l',
            };
            write!(f, "{}", letter)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for EnabledLayers {
    type Error = HistogramError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<EnabledLayers> for String {
    fn from(layers: EnabledLayers) -> Self {
        layers.to_string()
    }
}

/// Validated number of bins per layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BinsCount(NonZeroU32);

impl BinsCount {
    pub fn new(count: u32) -> Result<Self> {
        match NonZeroU32::new(count) {
            Some(count) if count.get() <= MAX_BINS_COUNT => Ok(BinsCount(count)),
            _ => Err(HistogramError::InvalidBinsCount {
                count: count as u64,
                max: MAX_BINS_COUNT,
            }),
        }
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    pub fn as_usize(self) -> usize {
        self.0.get() as usize
    }

    /// Number of counter cells a histogram buffer of this size holds.
    pub fn cell_count(self) -> usize {
        self.as_usize() * LAYER_COUNT
    }
}

impl Default for BinsCount {
    fn default() -> Self {
        BinsCount(NonZeroU32::MIN.saturating_add(DEFAULT_BINS_COUNT - 1))
    }
}

impl TryFrom<u32> for BinsCount {
    type Error = HistogramError;

    fn try_from(value: u32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<BinsCount> for u32 {
    fn from(bins: BinsCount) -> Self {
        bins.get()
    }
}

impl fmt::Display for BinsCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_indices_are_stable() {
        assert_eq!(HistogramLayer::Red.index(), 0);
        assert_eq!(HistogramLayer::Green.index(), 1);
        assert_eq!(HistogramLayer::Blue.index(), 2);
        assert_eq!(HistogramLayer::Luminance.index(), 3);
        assert_eq!(HistogramLayer::from_index(3), Some(HistogramLayer::Luminance));
        assert_eq!(HistogramLayer::from_index(4), None);
    }

    #[test]
    fn test_enabled_layers_parse_and_display() {
        let layers: EnabledLayers = "RB".parse().unwrap();
        assert!(layers.contains(HistogramLayer::Red));
        assert!(!layers.contains(HistogramLayer::Green));
        assert!(layers.contains(HistogramLayer::Blue));
        assert_eq!(layers.len(), 2);
        assert_eq!(layers.to_string(), "rb");
        assert_eq!(layers.to_mask(), [1, 0, 1, 0]);

        assert_eq!("none".parse::<EnabledLayers>().unwrap(), EnabledLayers::NONE);
        assert_eq!(EnabledLayers::ALL.to_string(), "rgbl");
        assert!("rgx".parse::<EnabledLayers>().is_err());
    }

    #[test]
    fn test_enabled_layers_iterate_in_draw_order() {
        let layers = EnabledLayers::NONE
            .with(HistogramLayer::Luminance)
            .with(HistogramLayer::Green);
        let order: Vec<_> = layers.iter().collect();
        assert_eq!(order, vec![HistogramLayer::Green, HistogramLayer::Luminance]);
        assert_eq!(layers.without(HistogramLayer::Green), EnabledLayers::only(HistogramLayer::Luminance));
    }

    #[test]
    fn test_bins_count_bounds() {
        assert!(BinsCount::new(0).is_err());
        assert!(BinsCount::new(MAX_BINS_COUNT + 1).is_err());
        assert_eq!(BinsCount::new(1).unwrap().cell_count(), 4);
        assert_eq!(BinsCount::default().get(), 256);
        assert_eq!(BinsCount::new(MAX_BINS_COUNT).unwrap().as_usize(), 65536);
    }
}
