//! Host-side histogram stages: binning, normalization and bar geometry, plus the
//! buffer pool frames are binned into.

pub mod binning;
pub mod buffer;
pub mod geometry;
pub mod normalize;
pub mod pool;

pub use binning::{bin_index, luminance, srgb_to_linear, SampleDecoder, LUMINANCE_WEIGHTS};
pub use buffer::{HistogramBuffer, HistogramSnapshot, MaxBinValues};
pub use geometry::{generate_bars, BarGeometry, BarVertex, BAR_CORNERS, VERTICES_PER_BAR};
pub use normalize::{max_bin_values, normalize};
pub use pool::{HistogramBufferPool, Pooled, ResourcePool, DEFAULT_BUFFER_POOL_SIZE};
