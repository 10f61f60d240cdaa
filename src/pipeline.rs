use crate::backend::{BackendKind, FrameConfig, HistogramBackend};
use crate::color::{LayerColors, RgbaColor};
use crate::errors::{HistogramError, Result};
use crate::histogram::{
    generate_bars, BarGeometry, HistogramBuffer, HistogramBufferPool, MaxBinValues, Pooled, DEFAULT_BUFFER_POOL_SIZE,
};
use crate::profiler::{Profiler, ProfilerStats, STAGE_COMPUTE, STAGE_GEOMETRY, STAGE_RENDER};
use crate::raster::RenderTarget;
use crate::texture::HistogramTexture;
use crate::types::{BinsCount, EnabledLayers};
use image::RgbaImage;
use std::num::NonZeroUsize;

/// Settings fixed between two `configure` calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub bins: BinsCount,
    pub is_linear: bool,
    pub colors: LayerColors,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bins: BinsCount::default(),
            is_linear: false,
            colors: LayerColors::default(),
        }
    }
}

/// One processed frame checked out of the pipeline's buffer pool.
///
/// The histogram stays valid while the frame is held; dropping the frame returns its
/// buffer to the pool.
#[derive(Debug)]
pub struct HistogramFrame {
    pub histogram: Pooled<HistogramBuffer>,
    pub geometry: BarGeometry,
}

impl HistogramFrame {
    pub fn max_bin_values(&self) -> MaxBinValues {
        self.histogram.max_bin_values()
    }
}

/// Runs binning, normalization and bar geometry generation for one frame at a time.
///
/// Frames are binned into buffers drawn from a bounded pool. Every frame clears its
/// buffer first, so no data survives from one frame to the next. `process` keeps the
/// latest histogram for `render`; `process_frame` hands the buffer to the caller, and
/// waits for a release once every pooled buffer is checked out. Taking `&mut self`
/// serializes frames on one instance; independent instances can run concurrently.
pub struct HistogramPipeline<B: HistogramBackend = Box<dyn HistogramBackend>> {
    backend: B,
    config: PipelineConfig,
    pool_size: NonZeroUsize,
    pool: HistogramBufferPool,
    current: Pooled<HistogramBuffer>,
    has_frame: bool,
    profiler: Profiler,
}

impl HistogramPipeline {
    /// Pipeline on the backend selected by `kind`.
    pub fn with_backend_kind(kind: BackendKind) -> Result<Self> {
        Ok(Self::new(kind.create()?))
    }
}

impl<B: HistogramBackend> HistogramPipeline<B> {
    pub fn new(backend: B) -> Self {
        let config = PipelineConfig::default();
        let pool = HistogramBufferPool::with_buffers(DEFAULT_BUFFER_POOL_SIZE, config.bins);
        Self {
            backend,
            current: pool.acquire(),
            pool,
            pool_size: DEFAULT_BUFFER_POOL_SIZE,
            config,
            has_frame: false,
            profiler: Profiler::new(),
        }
    }

    /// Replaces the buffer pool with `size` buffers of the current bins count.
    pub fn with_pool_size(mut self, size: usize) -> Result<Self> {
        let size = NonZeroUsize::new(size).ok_or(HistogramError::InvalidPoolSize { size })?;
        self.pool_size = size;
        self.reallocate();
        Ok(self)
    }

    /// Sets the bins count, the linear flag and the layer colors.
    ///
    /// A different bins count reallocates the buffer pool; the same count keeps the
    /// existing buffers and their identity. Invalid counts leave the pipeline unchanged.
    pub fn configure(&mut self, bins_count: u32, is_linear: bool, colors: LayerColors) -> Result<()> {
        let bins = BinsCount::new(bins_count)?;
        self.apply(PipelineConfig {
            bins,
            is_linear,
            colors,
        });
        Ok(())
    }

    pub fn apply(&mut self, config: PipelineConfig) {
        let reallocate = config.bins != self.config.bins;
        if reallocate {
            tracing::info!(
                from = self.config.bins.get(),
                to = config.bins.get(),
                "reallocating histogram buffers"
            );
        }
        self.config = config;
        if reallocate {
            self.reallocate();
        }
    }

    fn reallocate(&mut self) {
        // Buffers still held by callers return to the old pool and are freed with it
        self.pool = HistogramBufferPool::with_buffers(self.pool_size, self.config.bins);
        self.current = self.pool.acquire();
        self.has_frame = false;
    }

    /// Bins `texture`, computes the per-layer maxima and returns the bar geometry of
    /// the enabled layers.
    ///
    /// Input errors are reported before anything is dispatched. The frame goes into a
    /// free pooled buffer when one is available, otherwise into the current one; in the
    /// latter case a failed frame leaves nothing to render until the next success.
    pub fn process(&mut self, texture: &HistogramTexture, layers: EnabledLayers) -> Result<BarGeometry> {
        texture.validate()?;

        let geometry = match self.pool.try_acquire() {
            Some(mut next) => {
                let geometry = Self::bin_frame(
                    &mut self.backend,
                    &self.config,
                    &mut self.profiler,
                    &mut next,
                    texture,
                    layers,
                )?;
                self.current = next;
                geometry
            }
            None => {
                self.has_frame = false;
                Self::bin_frame(
                    &mut self.backend,
                    &self.config,
                    &mut self.profiler,
                    &mut self.current,
                    texture,
                    layers,
                )?
            }
        };
        self.has_frame = true;

        Ok(geometry)
    }

    /// Like [`HistogramPipeline::process`], but the caller keeps the histogram buffer
    /// until the returned frame is dropped.
    ///
    /// Blocks while every pooled buffer is checked out.
    pub fn process_frame(&mut self, texture: &HistogramTexture, layers: EnabledLayers) -> Result<HistogramFrame> {
        texture.validate()?;

        let mut histogram = self.pool.acquire();
        let geometry = Self::bin_frame(
            &mut self.backend,
            &self.config,
            &mut self.profiler,
            &mut histogram,
            texture,
            layers,
        )?;
        Ok(HistogramFrame { histogram, geometry })
    }

    fn bin_frame(
        backend: &mut B,
        config: &PipelineConfig,
        profiler: &mut Profiler,
        histogram: &mut HistogramBuffer,
        texture: &HistogramTexture,
        layers: EnabledLayers,
    ) -> Result<BarGeometry> {
        let span = tracing::debug_span!(
            "process",
            backend = backend.name(),
            bins = config.bins.get(),
            is_linear = config.is_linear,
            width = texture.width(),
            height = texture.height()
        );
        let _enter = span.enter();

        histogram.clear();

        let frame = FrameConfig {
            bins: config.bins,
            is_linear: config.is_linear,
        };
        let maxima = profiler
            .time(STAGE_COMPUTE, || backend.compute(texture, frame, histogram))
            .inspect_err(|e| e.log())?;
        tracing::debug!(max_bin_values = ?maxima.0, buffer = %histogram.id(), "frame binned");

        let histogram = &*histogram;
        let geometry = profiler.time(STAGE_GEOMETRY, || generate_bars(histogram, &config.colors, layers));
        profiler.increment_counter("frames");

        Ok(geometry)
    }

    /// Draws the most recently processed frame as an overlay image.
    pub fn render(
        &mut self,
        layers: EnabledLayers,
        width: u32,
        height: u32,
        background: RgbaColor,
    ) -> Result<RgbaImage> {
        if !self.has_frame {
            return Err(HistogramError::InvalidOperation {
                message: "render called before a frame was processed".to_string(),
            });
        }

        Self::render_histogram(
            &mut self.backend,
            &self.config,
            &mut self.profiler,
            &self.current,
            RenderTarget::new(width, height).with_background(background),
            layers,
        )
    }

    /// Draws a frame returned by [`HistogramPipeline::process_frame`].
    pub fn render_frame(
        &mut self,
        frame: &HistogramFrame,
        layers: EnabledLayers,
        width: u32,
        height: u32,
        background: RgbaColor,
    ) -> Result<RgbaImage> {
        Self::render_histogram(
            &mut self.backend,
            &self.config,
            &mut self.profiler,
            &frame.histogram,
            RenderTarget::new(width, height).with_background(background),
            layers,
        )
    }

    fn render_histogram(
        backend: &mut B,
        config: &PipelineConfig,
        profiler: &mut Profiler,
        histogram: &HistogramBuffer,
        target: RenderTarget,
        layers: EnabledLayers,
    ) -> Result<RgbaImage> {
        profiler
            .time(STAGE_RENDER, || backend.render(histogram, &config.colors, layers, target))
            .inspect_err(|e| e.log())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn bins_count(&self) -> BinsCount {
        self.config.bins
    }

    pub fn is_linear(&self) -> bool {
        self.config.is_linear
    }

    pub fn colors(&self) -> &LayerColors {
        &self.config.colors
    }

    /// Histogram of the last processed frame.
    pub fn histogram(&self) -> &HistogramBuffer {
        &self.current
    }

    pub fn max_bin_values(&self) -> MaxBinValues {
        self.current.max_bin_values()
    }

    pub fn pool(&self) -> &HistogramBufferPool {
        &self.pool
    }

    pub fn has_frame(&self) -> bool {
        self.has_frame
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    pub fn profiler_stats(&self) -> ProfilerStats {
        self.profiler.get_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use crate::profiler::RECENT_WINDOW;
    use crate::types::HistogramLayer;

    fn pixel(rgba: [u8; 4]) -> HistogramTexture {
        HistogramTexture::from_rgba8(1, 1, rgba.to_vec()).unwrap()
    }

    fn pipeline() -> HistogramPipeline<CpuBackend> {
        HistogramPipeline::new(CpuBackend::new())
    }

    #[test]
    fn test_defaults() {
        let pipeline = pipeline();
        assert_eq!(pipeline.bins_count().get(), 256);
        assert!(!pipeline.is_linear());
        assert!(!pipeline.has_frame());
        assert_eq!(pipeline.backend_name(), "cpu");
    }

    #[test]
    fn test_invalid_configure_keeps_previous_state() {
        let mut pipeline = pipeline();
        pipeline.configure(64, true, LayerColors::default()).unwrap();
        let id = pipeline.histogram().id();

        let err = pipeline.configure(0, false, LayerColors::default()).unwrap_err();
        assert!(err.is_configuration_error());
        assert_eq!(pipeline.bins_count().get(), 64);
        assert!(pipeline.is_linear());
        assert_eq!(pipeline.histogram().id(), id);
    }

    #[test]
    fn test_render_requires_a_frame() {
        let mut pipeline = pipeline();
        let err = pipeline
            .render(EnabledLayers::ALL, 8, 8, RgbaColor::TRANSPARENT)
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_OPERATION");
    }

    #[test]
    fn test_empty_texture_is_rejected_before_dispatch() {
        let mut pipeline = pipeline();
        let err = pipeline
            .process(&HistogramTexture::new(4, 0), EnabledLayers::ALL)
            .unwrap_err();
        assert_eq!(err.error_code(), "EMPTY_TEXTURE");
        assert_eq!(pipeline.histogram().generation(), 0);
    }

    #[test]
    fn test_stages_are_profiled() {
        let mut pipeline = pipeline();
        let texture = HistogramTexture::from_rgba8(1, 1, vec![10, 20, 30, 255]).unwrap();
        pipeline
            .process(&texture, EnabledLayers::only(HistogramLayer::Luminance))
            .unwrap();
        pipeline.render(EnabledLayers::ALL, 4, 4, RgbaColor::BLACK).unwrap();

        let stats = pipeline.profiler_stats();
        for stage in [STAGE_COMPUTE, STAGE_GEOMETRY, STAGE_RENDER] {
            assert_eq!(stats.measurements[stage].count, 1);
        }
        assert_eq!(stats.counters["frames"], 1);
    }

    #[test]
    fn test_profiler_memory_stays_bounded_over_many_frames() {
        let mut pipeline = pipeline();
        pipeline.configure(4, false, LayerColors::default()).unwrap();
        let texture = pixel([10, 20, 30, 255]);

        for _ in 0..10_000 {
            pipeline.process(&texture, EnabledLayers::NONE).unwrap();
        }

        for stage in [STAGE_COMPUTE, STAGE_GEOMETRY] {
            assert_eq!(pipeline.profiler().retained_samples(stage), RECENT_WINDOW);
            assert_eq!(pipeline.profiler_stats().measurements[stage].count, 10_000);
        }
        assert_eq!(pipeline.profiler_stats().counters["frames"], 10_000);
    }

    #[test]
    fn test_frames_rotate_through_the_pool() {
        let mut pipeline = pipeline().with_pool_size(3).unwrap();
        let texture = pixel([255, 255, 255, 255]);

        let mut ids = Vec::new();
        for _ in 0..4 {
            pipeline.process(&texture, EnabledLayers::NONE).unwrap();
            ids.push(pipeline.histogram().id());
        }

        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
        assert_ne!(ids[0], ids[2]);
        // the first frame's buffer comes back once two others have been used
        assert_eq!(ids[3], ids[0]);
        assert_eq!(pipeline.histogram().generation(), 2);
        assert_eq!(pipeline.pool().capacity(), 3);
    }

    #[test]
    fn test_held_frame_survives_later_frames() {
        let mut pipeline = pipeline().with_pool_size(2).unwrap();
        pipeline.configure(2, false, LayerColors::default()).unwrap();

        let white = pipeline.process_frame(&pixel([255, 255, 255, 255]), EnabledLayers::ALL).unwrap();
        assert_eq!(pipeline.pool().available(), 0);

        // with every spare buffer checked out, the current buffer is reused in place
        let current = pipeline.histogram().id();
        for _ in 0..3 {
            pipeline.process(&pixel([0, 0, 0, 255]), EnabledLayers::ALL).unwrap();
        }
        assert_eq!(pipeline.histogram().id(), current);
        assert_eq!(pipeline.histogram().bin(0), Some([1, 1, 1, 1]));

        assert_eq!(white.histogram.bin(1), Some([1, 1, 1, 1]));
        assert_eq!(white.max_bin_values().0, [1, 1, 1, 1]);
        assert_eq!(white.geometry.len(), 4 * 2 * crate::histogram::VERTICES_PER_BAR);
        let overlay = pipeline
            .render_frame(&white, EnabledLayers::ALL, 4, 2, RgbaColor::TRANSPARENT)
            .unwrap();
        assert_eq!(overlay.dimensions(), (4, 2));

        drop(white);
        assert_eq!(pipeline.pool().available(), 1);
    }

    #[test]
    fn test_zero_pool_size_is_rejected() {
        let err = pipeline().with_pool_size(0).err().unwrap();
        assert_eq!(err.error_code(), "INVALID_POOL_SIZE");
    }

    #[test]
    fn test_reconfiguring_bins_replaces_the_pool() {
        let mut pipeline = pipeline().with_pool_size(2).unwrap();
        let frame = pipeline.process_frame(&pixel([0, 0, 0, 255]), EnabledLayers::NONE).unwrap();

        pipeline.configure(16, false, LayerColors::default()).unwrap();
        assert_eq!(pipeline.pool().available(), 1);
        assert_eq!(pipeline.histogram().cells().len(), 16 * 4);
        assert!(!pipeline.has_frame());

        // frames from before the change keep their own bins count
        assert_eq!(frame.histogram.bins_count().get(), 256);
    }
}
