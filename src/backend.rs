use crate::color::LayerColors;
use crate::errors::Result;
use crate::gpu::GpuBackend;
use crate::histogram::{binning, generate_bars, normalize, HistogramBuffer, MaxBinValues};
use crate::raster::{rasterize, RenderTarget};
use crate::texture::HistogramTexture;
use crate::types::{BinsCount, EnabledLayers};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

/// Per-frame parameters of the binning stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    pub bins: BinsCount,
    pub is_linear: bool,
}

/// Execution engine for the binning, normalization and overlay stages.
pub trait HistogramBackend {
    fn name(&self) -> &str;

    /// Bins `texture` into the already cleared `histogram` and runs normalization.
    ///
    /// On return the counts and maxima of `histogram` describe exactly this frame.
    fn compute(
        &mut self,
        texture: &HistogramTexture,
        config: FrameConfig,
        histogram: &mut HistogramBuffer,
    ) -> Result<MaxBinValues>;

    /// Draws the bars of `histogram` for the enabled layers.
    fn render(
        &mut self,
        histogram: &HistogramBuffer,
        colors: &LayerColors,
        layers: EnabledLayers,
        target: RenderTarget,
    ) -> Result<RgbaImage> {
        let geometry = generate_bars(histogram, colors, layers);
        Ok(rasterize(&geometry, target))
    }
}

/// Which backend a pipeline should be built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// GPU when an adapter is available, CPU otherwise
    #[default]
    Auto,
    Gpu,
    Cpu,
}

impl BackendKind {
    /// Builds the backend. `Auto` falls back to the CPU when no GPU can be initialized.
    pub fn create(self) -> Result<Box<dyn HistogramBackend>> {
        match self {
            BackendKind::Cpu => Ok(Box::new(CpuBackend::new())),
            BackendKind::Gpu => Ok(Box::new(GpuBackend::new()?)),
            BackendKind::Auto => match GpuBackend::new() {
                Ok(backend) => Ok(Box::new(backend)),
                Err(e) => {
                    tracing::warn!(error = %e, "GPU backend unavailable, using CPU");
                    Ok(Box::new(CpuBackend::new()))
                }
            },
        }
    }
}

/// Reference backend: rayon row tiles with atomic counter merging.
#[derive(Debug, Default)]
pub struct CpuBackend {
    counters: Vec<AtomicU32>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset_counters(&mut self, bins: BinsCount) {
        if self.counters.len() != bins.cell_count() {
            self.counters = (0..bins.cell_count()).map(|_| AtomicU32::new(0)).collect();
        } else {
            for counter in &self.counters {
                counter.store(0, Ordering::Relaxed);
            }
        }
    }
}

impl HistogramBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn compute(
        &mut self,
        texture: &HistogramTexture,
        config: FrameConfig,
        histogram: &mut HistogramBuffer,
    ) -> Result<MaxBinValues> {
        self.reset_counters(config.bins);
        binning::accumulate(texture, config.bins, config.is_linear, &self.counters)?;

        // rayon has joined every tile; the counts are final
        let cells: Vec<u32> = self
            .counters
            .iter()
            .map(|counter| counter.load(Ordering::Relaxed))
            .collect();
        histogram.copy_from_cells(&cells)?;

        Ok(normalize(histogram))
    }
}

impl<B: HistogramBackend + ?Sized> HistogramBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn compute(
        &mut self,
        texture: &HistogramTexture,
        config: FrameConfig,
        histogram: &mut HistogramBuffer,
    ) -> Result<MaxBinValues> {
        (**self).compute(texture, config, histogram)
    }

    fn render(
        &mut self,
        histogram: &HistogramBuffer,
        colors: &LayerColors,
        layers: EnabledLayers,
        target: RenderTarget,
    ) -> Result<RgbaImage> {
        (**self).render(histogram, colors, layers, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HistogramLayer;

    #[test]
    fn test_cpu_backend_counts_every_pixel() {
        let texture = HistogramTexture::from_rgba8(2, 1, vec![0, 0, 0, 255, 255, 255, 255, 255]).unwrap();
        let config = FrameConfig {
            bins: BinsCount::new(2).unwrap(),
            is_linear: false,
        };
        let mut histogram = HistogramBuffer::new(config.bins);
        let mut backend = CpuBackend::new();

        let maxima = backend.compute(&texture, config, &mut histogram).unwrap();

        assert_eq!(histogram.cells(), &[1, 1, 1, 1, 1, 1, 1, 1]);
        assert_eq!(maxima, MaxBinValues([1, 1, 1, 1]));
        assert_eq!(histogram.max_bin_values(), maxima);
    }

    #[test]
    fn test_counters_are_reset_between_frames() {
        let texture = HistogramTexture::from_rgba8(1, 1, vec![255, 0, 0, 255]).unwrap();
        let config = FrameConfig {
            bins: BinsCount::new(4).unwrap(),
            is_linear: true,
        };
        let mut histogram = HistogramBuffer::new(config.bins);
        let mut backend = CpuBackend::new();

        backend.compute(&texture, config, &mut histogram).unwrap();
        histogram.clear();
        backend.compute(&texture, config, &mut histogram).unwrap();

        assert_eq!(histogram.total(HistogramLayer::Red), 1);
        assert_eq!(histogram.count(HistogramLayer::Red, 3), 1);
    }

    #[test]
    fn test_boxed_backend_delegates() {
        let mut backend: Box<dyn HistogramBackend> = Box::new(CpuBackend::new());
        assert_eq!(backend.name(), "cpu");

        let config = FrameConfig {
            bins: BinsCount::new(8).unwrap(),
            is_linear: false,
        };
        let mut histogram = HistogramBuffer::new(config.bins);
        let err = backend
            .compute(&HistogramTexture::new(0, 0), config, &mut histogram)
            .unwrap_err();
        assert_eq!(err.error_code(), "EMPTY_TEXTURE");
    }

    #[test]
    fn test_cpu_kind_creates_cpu_backend() {
        let backend = BackendKind::Cpu.create().unwrap();
        assert_eq!(backend.name(), "cpu");
    }
}
