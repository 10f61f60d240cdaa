use super::binding::{expand_shader, BinningBinding, BindingSlot, VertexBinding};
use crate::errors::Result;

pub(crate) const HISTOGRAM_SHADER: &str = include_str!("../shaders/histogram.wgsl");
pub(crate) const BARS_SHADER: &str = include_str!("../shaders/bars.wgsl");

/// Format of the offscreen overlay target. Blending happens on encoded values.
pub const OVERLAY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Workgroup edge of the binning kernel, in pixels.
pub const BINNING_WORKGROUP_SIZE: u32 = 16;

/// Workgroup width of the normalization kernel, in bins.
pub const NORMALIZATION_WORKGROUP_SIZE: u32 = 64;

/// Compute pipelines for binning and normalization, sharing one bind group layout.
#[derive(Debug)]
pub struct HistogramPipelines {
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub binning: wgpu::ComputePipeline,
    pub normalization: wgpu::ComputePipeline,
}

/// Render pipeline drawing histogram bars.
#[derive(Debug)]
pub struct BarPipeline {
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub pipeline: wgpu::RenderPipeline,
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, visibility: wgpu::ShaderStages, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub fn create_histogram_pipelines(device: &wgpu::Device) -> Result<HistogramPipelines> {
    let source = expand_shader::<BinningBinding>(HISTOGRAM_SHADER)?;
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("histogram_shader"),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let compute = wgpu::ShaderStages::COMPUTE;
    let entries: Vec<wgpu::BindGroupLayoutEntry> = BinningBinding::ALL
        .iter()
        .map(|&slot| match slot {
            BinningBinding::Texture => wgpu::BindGroupLayoutEntry {
                binding: slot.index(),
                visibility: compute,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            BinningBinding::BinsCount | BinningBinding::IsLinear => uniform_entry(slot.index(), compute),
            BinningBinding::HistogramBuffer | BinningBinding::MaxBinValue => {
                storage_entry(slot.index(), compute, false)
            }
        })
        .collect();

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("histogram_bind_group_layout"),
        entries: &entries,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("histogram_pipeline_layout"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let compute_pipeline = |label: &str, entry_point: &str| {
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some(entry_point),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        })
    };

    Ok(HistogramPipelines {
        binning: compute_pipeline("histogram_binning_pipeline", "generate_histogram"),
        normalization: compute_pipeline("histogram_normalization_pipeline", "reduce_max_bin_values"),
        bind_group_layout,
    })
}

pub fn create_bar_pipeline(device: &wgpu::Device) -> Result<BarPipeline> {
    let source = expand_shader::<VertexBinding>(BARS_SHADER)?;
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("bars_shader"),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let vertex = wgpu::ShaderStages::VERTEX;
    let entries: Vec<wgpu::BindGroupLayoutEntry> = VertexBinding::ALL
        .iter()
        .map(|&slot| match slot {
            VertexBinding::Vertices | VertexBinding::HistogramBuffer | VertexBinding::MaxBinValue => {
                storage_entry(slot.index(), vertex, true)
            }
            VertexBinding::BinsCount | VertexBinding::Colors | VertexBinding::EnabledLayers => {
                uniform_entry(slot.index(), vertex)
            }
        })
        .collect();

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("bars_bind_group_layout"),
        entries: &entries,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("bars_pipeline_layout"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    // Source-over on both color and alpha
    let blend_component = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    };

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("bars_pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: OVERLAY_FORMAT,
                blend: Some(wgpu::BlendState {
                    color: blend_component,
                    alpha: blend_component,
                }),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });

    Ok(BarPipeline {
        bind_group_layout,
        pipeline,
    })
}
