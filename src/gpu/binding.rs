//! Binding-index contract shared by the host and the WGSL stages.
//!
//! The slot numbers below are the only place the numbering exists. Shader sources refer
//! to slots through `{{NAME}}` placeholders that [`expand_shader`] replaces at pipeline
//! creation. New revisions append slots; existing slots never move.

use crate::errors::{HistogramError, Result};

/// Revision of the binding contract implemented by this crate.
///
/// * v1: binning slots 0-3
/// * v2: binning `MaxBinValue` slot 4, vertex slots 0-4
/// * v3: vertex `EnabledLayers` slot 5
pub const BINDING_CONTRACT_VERSION: u32 = 3;

/// A named slot in one stage's bind group.
pub trait BindingSlot: Copy + Sized + 'static {
    const ALL: &'static [Self];

    fn index(self) -> u32;

    /// Placeholder token used in WGSL, without braces.
    fn placeholder(self) -> &'static str;

    /// Contract version that introduced the slot.
    fn since_version(self) -> u32;
}

/// Slots of the binning and normalization compute stages (group 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BinningBinding {
    Texture = 0,
    BinsCount = 1,
    IsLinear = 2,
    HistogramBuffer = 3,
    MaxBinValue = 4,
}

impl BindingSlot for BinningBinding {
    const ALL: &'static [Self] = &[
        BinningBinding::Texture,
        BinningBinding::BinsCount,
        BinningBinding::IsLinear,
        BinningBinding::HistogramBuffer,
        BinningBinding::MaxBinValue,
    ];

    fn index(self) -> u32 {
        self as u32
    }

    fn placeholder(self) -> &'static str {
        match self {
            BinningBinding::Texture => "TEXTURE",
            BinningBinding::BinsCount => "BINS_COUNT",
            BinningBinding::IsLinear => "IS_LINEAR",
            BinningBinding::HistogramBuffer => "HISTOGRAM_BUFFER",
            BinningBinding::MaxBinValue => "MAX_BIN_VALUE",
        }
    }

    fn since_version(self) -> u32 {
        match self {
            BinningBinding::MaxBinValue => 2,
            _ => 1,
        }
    }
}

/// Slots of the bar vertex stage (group 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum VertexBinding {
    Vertices = 0,
    HistogramBuffer = 1,
    BinsCount = 2,
    MaxBinValue = 3,
    Colors = 4,
    EnabledLayers = 5,
}

impl BindingSlot for VertexBinding {
    const ALL: &'static [Self] = &[
        VertexBinding::Vertices,
        VertexBinding::HistogramBuffer,
        VertexBinding::BinsCount,
        VertexBinding::MaxBinValue,
        VertexBinding::Colors,
        VertexBinding::EnabledLayers,
    ];

    fn index(self) -> u32 {
        self as u32
    }

    fn placeholder(self) -> &'static str {
        match self {
            VertexBinding::Vertices => "VERTICES",
            VertexBinding::HistogramBuffer => "HISTOGRAM_BUFFER",
            VertexBinding::BinsCount => "BINS_COUNT",
            VertexBinding::MaxBinValue => "MAX_BIN_VALUE",
            VertexBinding::Colors => "COLORS",
            VertexBinding::EnabledLayers => "ENABLED_LAYERS",
        }
    }

    fn since_version(self) -> u32 {
        match self {
            VertexBinding::EnabledLayers => 3,
            _ => 2,
        }
    }
}

/// Replaces every `{{NAME}}` placeholder of stage `S` with its slot number.
///
/// Fails if a placeholder is left over, which means the shader names a slot the stage
/// does not define.
pub fn expand_shader<S: BindingSlot>(source: &str) -> Result<String> {
    let mut expanded = source.to_string();
    for &slot in S::ALL {
        let token = format!("{{{{{}}}}}", slot.placeholder());
        expanded = expanded.replace(&token, &slot.index().to_string());
    }

    if let Some(start) = expanded.find("{{") {
        let rest = &expanded[start..];
        let end = rest.find("}}").map_or(rest.len(), |end| end + 2);
        return Err(HistogramError::gpu(format!(
            "unresolved binding placeholder {} in shader source",
            &rest[..end]
        )));
    }
    Ok(expanded)
}
