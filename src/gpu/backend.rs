use super::binding::{BinningBinding, BindingSlot, VertexBinding};
use super::context::GpuContext;
use super::pipelines::{
    create_bar_pipeline, create_histogram_pipelines, BarPipeline, HistogramPipelines, BINNING_WORKGROUP_SIZE,
    NORMALIZATION_WORKGROUP_SIZE, OVERLAY_FORMAT,
};
use crate::backend::{FrameConfig, HistogramBackend};
use crate::color::LayerColors;
use crate::errors::{HistogramError, Result};
use crate::histogram::{generate_bars, HistogramBuffer, MaxBinValues, BAR_CORNERS};
use crate::raster::{rasterize, RenderTarget};
use crate::texture::HistogramTexture;
use crate::types::{BinsCount, EnabledLayers, LAYER_COUNT};
use image::RgbaImage;
use uuid::Uuid;
use wgpu::util::DeviceExt;

const MAX_BIN_VALUES_SIZE: u64 = (LAYER_COUNT * std::mem::size_of::<u32>()) as u64;

/// Device buffers sized for one bins count.
#[derive(Debug)]
struct DeviceHistogram {
    bins: BinsCount,
    histogram: wgpu::Buffer,
    max_bin_values: wgpu::Buffer,
    bins_count: wgpu::Buffer,
    is_linear: wgpu::Buffer,
    staging: wgpu::Buffer,
    /// Host buffer (id, generation) whose contents the device buffers currently hold.
    resident: Option<(Uuid, u64)>,
}

impl DeviceHistogram {
    fn new(device: &wgpu::Device, bins: BinsCount) -> Self {
        let histogram_size = (bins.cell_count() * std::mem::size_of::<u32>()) as u64;
        let storage = |label: &str, size: u64| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let uniform = |label: &str, value: u32| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&[value, 0, 0, 0]),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
        };

        Self {
            bins,
            histogram: storage("histogram_buffer", histogram_size),
            max_bin_values: storage("max_bin_values_buffer", MAX_BIN_VALUES_SIZE),
            bins_count: uniform("bins_count_uniform", bins.get()),
            is_linear: uniform("is_linear_uniform", 0),
            staging: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("histogram_staging"),
                size: histogram_size + MAX_BIN_VALUES_SIZE,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            }),
            resident: None,
        }
    }

    fn histogram_size(&self) -> u64 {
        self.histogram.size()
    }
}

/// Source texture kept alive across frames of the same size.
#[derive(Debug)]
struct InputTexture {
    width: u32,
    height: u32,
    texture: wgpu::Texture,
}

/// wgpu implementation of the histogram stages.
///
/// Binning, normalization and readback are encoded into a single submission; the
/// overlay is drawn by the bar vertex stage into an offscreen target.
#[derive(Debug)]
pub struct GpuBackend {
    context: GpuContext,
    histogram_pipelines: HistogramPipelines,
    bar_pipeline: Option<BarPipeline>,
    corners: wgpu::Buffer,
    resources: Option<DeviceHistogram>,
    input: Option<InputTexture>,
}

impl GpuBackend {
    pub fn new() -> Result<Self> {
        Self::with_context(GpuContext::blocking()?)
    }

    pub fn with_context(context: GpuContext) -> Result<Self> {
        let histogram_pipelines = create_histogram_pipelines(&context.device)?;
        let bar_pipeline = if context.supports_vertex_storage() {
            Some(create_bar_pipeline(&context.device)?)
        } else {
            log::info!("Vertex storage buffers unsupported; overlay rendering uses the CPU rasterizer");
            None
        };
        let corners = context.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bar_corners"),
            contents: bytemuck::cast_slice(&BAR_CORNERS),
            usage: wgpu::BufferUsages::STORAGE,
        });

        Ok(Self {
            context,
            histogram_pipelines,
            bar_pipeline,
            corners,
            resources: None,
            input: None,
        })
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    fn check_dimensions(&self, width: u32, height: u32) -> Result<()> {
        let max = self.context.max_texture_dimension();
        if width > max || height > max {
            return Err(HistogramError::gpu(format!(
                "{}x{} exceeds the device texture limit of {}",
                width, height, max
            )));
        }
        Ok(())
    }

    /// Reallocates the device buffers when the bins count changed.
    fn ensure_resources(&mut self, bins: BinsCount) {
        let stale = self.resources.as_ref().map_or(true, |r| r.bins != bins);
        if stale {
            tracing::debug!(bins = bins.get(), "allocating device histogram buffers");
            self.resources = Some(DeviceHistogram::new(&self.context.device, bins));
        }
    }

    fn upload_texture(&mut self, texture: &HistogramTexture) {
        let (width, height) = (texture.width(), texture.height());
        let reuse = self
            .input
            .as_ref()
            .is_some_and(|input| input.width == width && input.height == height);
        if !reuse {
            let gpu_texture = self.context.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("histogram_input"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            self.input = Some(InputTexture {
                width,
                height,
                texture: gpu_texture,
            });
        }

        if let Some(input) = &self.input {
            self.context.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &input.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                texture.as_bytes(),
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * width),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }
    }

    /// Makes the device buffers hold the contents of `histogram`.
    fn make_resident(&mut self, histogram: &HistogramBuffer) {
        self.ensure_resources(histogram.bins_count());
        let key = (histogram.id(), histogram.generation());
        let queue = &self.context.queue;

        if let Some(resources) = self.resources.as_mut() {
            if resources.resident != Some(key) {
                tracing::trace!(id = %histogram.id(), "uploading histogram for overlay render");
                queue.write_buffer(&resources.histogram, 0, histogram.as_bytes());
                queue.write_buffer(
                    &resources.max_bin_values,
                    0,
                    bytemuck::cast_slice(&histogram.max_bin_values().0),
                );
                resources.resident = Some(key);
            }
        }
    }
}

impl HistogramBackend for GpuBackend {
    fn name(&self) -> &str {
        "gpu"
    }

    fn compute(
        &mut self,
        texture: &HistogramTexture,
        config: FrameConfig,
        histogram: &mut HistogramBuffer,
    ) -> Result<MaxBinValues> {
        texture.validate()?;
        self.check_dimensions(texture.width(), texture.height())?;
        if histogram.bins_count() != config.bins {
            return Err(HistogramError::BufferSizeMismatch {
                expected: config.bins.cell_count(),
                actual: histogram.cells().len(),
            });
        }

        self.upload_texture(texture);
        self.ensure_resources(config.bins);

        let (Some(resources), Some(input)) = (self.resources.as_mut(), self.input.as_ref()) else {
            return Err(HistogramError::gpu("device resources were not allocated"));
        };
        let device = &self.context.device;
        let queue = &self.context.queue;

        queue.write_buffer(&resources.is_linear, 0, bytemuck::cast_slice(&[config.is_linear as u32, 0, 0, 0]));

        let input_view = input.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let entries: Vec<wgpu::BindGroupEntry> = BinningBinding::ALL
            .iter()
            .map(|&slot| wgpu::BindGroupEntry {
                binding: slot.index(),
                resource: match slot {
                    BinningBinding::Texture => wgpu::BindingResource::TextureView(&input_view),
                    BinningBinding::BinsCount => resources.bins_count.as_entire_binding(),
                    BinningBinding::IsLinear => resources.is_linear.as_entire_binding(),
                    BinningBinding::HistogramBuffer => resources.histogram.as_entire_binding(),
                    BinningBinding::MaxBinValue => resources.max_bin_values.as_entire_binding(),
                },
            })
            .collect();
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("histogram_bind_group"),
            layout: &self.histogram_pipelines.bind_group_layout,
            entries: &entries,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("histogram_encoder"),
        });
        encoder.clear_buffer(&resources.histogram, 0, None);
        encoder.clear_buffer(&resources.max_bin_values, 0, None);

        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("histogram_binning_pass"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.histogram_pipelines.binning);
            cpass.set_bind_group(0, &bind_group, &[]);
            cpass.dispatch_workgroups(
                texture.width().div_ceil(BINNING_WORKGROUP_SIZE),
                texture.height().div_ceil(BINNING_WORKGROUP_SIZE),
                1,
            );
        }

        // Separate pass so normalization observes every binning write
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("histogram_normalization_pass"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.histogram_pipelines.normalization);
            cpass.set_bind_group(0, &bind_group, &[]);
            cpass.dispatch_workgroups(config.bins.get().div_ceil(NORMALIZATION_WORKGROUP_SIZE), 1, 1);
        }

        let histogram_size = resources.histogram_size();
        encoder.copy_buffer_to_buffer(&resources.histogram, 0, &resources.staging, 0, histogram_size);
        encoder.copy_buffer_to_buffer(
            &resources.max_bin_values,
            0,
            &resources.staging,
            histogram_size,
            MAX_BIN_VALUES_SIZE,
        );
        queue.submit(Some(encoder.finish()));

        let words: Vec<u32> = self
            .context
            .read_buffer(&resources.staging, |data| bytemuck::cast_slice(data).to_vec())?;
        let (cells, maxima) = words.split_at(config.bins.cell_count());
        histogram.copy_from_cells(cells)?;

        let mut values = [0u32; LAYER_COUNT];
        values.copy_from_slice(&maxima[..LAYER_COUNT]);
        let values = MaxBinValues(values);
        histogram.set_max_bin_values(values);
        resources.resident = Some((histogram.id(), histogram.generation()));

        Ok(values)
    }

    fn render(
        &mut self,
        histogram: &HistogramBuffer,
        colors: &LayerColors,
        layers: EnabledLayers,
        target: RenderTarget,
    ) -> Result<RgbaImage> {
        if self.bar_pipeline.is_none() || target.is_empty() {
            let geometry = generate_bars(histogram, colors, layers);
            return Ok(rasterize(&geometry, target));
        }
        self.check_dimensions(target.width, target.height)?;
        self.make_resident(histogram);

        let (Some(bars), Some(resources)) = (self.bar_pipeline.as_ref(), self.resources.as_ref()) else {
            return Err(HistogramError::gpu("device resources were not allocated"));
        };
        let device = &self.context.device;
        let bins = histogram.bins_count().get();

        let colors_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("layer_colors_uniform"),
            contents: bytemuck::cast_slice(&colors.to_uniform()),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let enabled_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("enabled_layers_uniform"),
            contents: bytemuck::cast_slice(&layers.to_mask()),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let entries: Vec<wgpu::BindGroupEntry> = VertexBinding::ALL
            .iter()
            .map(|&slot| wgpu::BindGroupEntry {
                binding: slot.index(),
                resource: match slot {
                    VertexBinding::Vertices => self.corners.as_entire_binding(),
                    VertexBinding::HistogramBuffer => resources.histogram.as_entire_binding(),
                    VertexBinding::BinsCount => resources.bins_count.as_entire_binding(),
                    VertexBinding::MaxBinValue => resources.max_bin_values.as_entire_binding(),
                    VertexBinding::Colors => colors_buffer.as_entire_binding(),
                    VertexBinding::EnabledLayers => enabled_buffer.as_entire_binding(),
                },
            })
            .collect();
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bars_bind_group"),
            layout: &bars.bind_group_layout,
            entries: &entries,
        });

        let size = wgpu::Extent3d {
            width: target.width,
            height: target.height,
            depth_or_array_layers: 1,
        };
        let output = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("histogram_overlay"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OVERLAY_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let output_view = output.create_view(&wgpu::TextureViewDescriptor::default());

        let unpadded_bytes_per_row = 4 * target.width;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("histogram_overlay_readback"),
            size: padded_bytes_per_row as u64 * target.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("histogram_overlay_encoder"),
        });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("histogram_overlay_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &output_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(target.background.to_wgpu()),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rpass.set_pipeline(&bars.pipeline);
            rpass.set_bind_group(0, &bind_group, &[]);
            // one draw per enabled layer keeps disabled layers out of the vertex stage
            for layer in layers.iter() {
                let first = layer as u32 * bins;
                rpass.draw(0..BAR_CORNERS.len() as u32, first..first + bins);
            }
        }

        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &output,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(target.height),
                },
            },
            size,
        );
        self.context.queue.submit(Some(encoder.finish()));

        let pixels = self.context.read_buffer(&readback, |data| {
            let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * target.height) as usize);
            for row in data.chunks(padded_bytes_per_row as usize).take(target.height as usize) {
                pixels.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
            }
            pixels
        })?;

        RgbaImage::from_raw(target.width, target.height, pixels)
            .ok_or_else(|| HistogramError::gpu("overlay readback has the wrong size"))
    }
}
