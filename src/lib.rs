//! Per-channel RGBL histograms of images, computed on the GPU (wgpu) or the CPU (rayon),
//! and rendered as bar-chart overlays.
//!
//! ```no_run
//! use histoview::{CpuBackend, EnabledLayers, HistogramPipeline, HistogramTexture, LayerColors};
//!
//! let texture = HistogramTexture::load("frame.png")?;
//! let mut pipeline = HistogramPipeline::new(CpuBackend::new());
//! pipeline.configure(256, false, LayerColors::default())?;
//! let bars = pipeline.process(&texture, EnabledLayers::ALL)?;
//! println!("{} vertices", bars.len());
//! # Ok::<(), histoview::HistogramError>(())
//! ```

pub mod backend;
pub mod color;
pub mod errors;
pub mod gpu;
pub mod histogram;
pub mod logging;
pub mod pipeline;
pub mod profiler;
pub mod raster;
pub mod settings;
pub mod texture;
pub mod types;

#[cfg(test)]
mod tests;

pub use backend::{BackendKind, CpuBackend, FrameConfig, HistogramBackend};
pub use color::{LayerColors, RgbaColor};
pub use errors::{HistogramError, Result};
pub use gpu::{GpuBackend, GpuContext};
pub use histogram::{
    BarGeometry, BarVertex, HistogramBuffer, HistogramBufferPool, HistogramSnapshot, MaxBinValues, Pooled, ResourcePool,
    DEFAULT_BUFFER_POOL_SIZE,
};
pub use pipeline::{HistogramFrame, HistogramPipeline, PipelineConfig};
pub use raster::RenderTarget;
pub use settings::Settings;
pub use texture::HistogramTexture;
pub use types::{BinsCount, EnabledLayers, HistogramLayer, RgblBin, DEFAULT_BINS_COUNT, LAYER_COUNT, MAX_BINS_COUNT};
