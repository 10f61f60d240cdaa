use crate::errors::{HistogramError, Result};
use tokio::sync::oneshot;

/// Device, queue and adapter capabilities shared by the GPU stages.
#[derive(Debug)]
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
    pub downlevel: wgpu::DownlevelCapabilities,
}

impl GpuContext {
    pub async fn new() -> Result<Self> {
        Self::request(false).await
    }

    /// Context on the software fallback adapter, when the platform provides one.
    pub async fn fallback() -> Result<Self> {
        Self::request(true).await
    }

    async fn request(force_fallback_adapter: bool) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter,
            })
            .await
            .ok_or(HistogramError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        let adapter_limits = adapter.limits();
        let downlevel = adapter.get_downlevel_capabilities();

        // Only atomics on storage buffers and plain uniforms are needed; keep the
        // downlevel baseline but allow the adapter's full texture size.
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("histoview_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_texture_dimension_2d: adapter_limits.max_texture_dimension_2d,
                        max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
                        ..wgpu::Limits::downlevel_defaults()
                    },
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        log::info!(
            "GPU initialized: {} ({}, {:?})",
            adapter_info.name,
            adapter_info.backend.to_str(),
            adapter_info.device_type
        );

        Ok(Self {
            device,
            queue,
            adapter_info,
            downlevel,
        })
    }

    /// Blocking variant of [`GpuContext::new`].
    pub fn blocking() -> Result<Self> {
        pollster::block_on(Self::new())
    }

    /// Blocking variant of [`GpuContext::fallback`].
    pub fn blocking_fallback() -> Result<Self> {
        pollster::block_on(Self::fallback())
    }

    /// Largest texture edge the device accepts.
    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Whether storage buffers may be bound to the vertex stage.
    pub fn supports_vertex_storage(&self) -> bool {
        self.downlevel
            .flags
            .contains(wgpu::DownlevelFlags::VERTEX_STORAGE)
    }

    /// Maps `buffer` for reading, waits for the device and hands the bytes to `read`.
    pub(crate) fn read_buffer<T>(&self, buffer: &wgpu::Buffer, read: impl FnOnce(&[u8]) -> T) -> Result<T> {
        let buffer_slice = buffer.slice(..);
        let (tx, rx) = oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });

        let _ = self.device.poll(wgpu::Maintain::Wait);
        pollster::block_on(rx).map_err(|_| HistogramError::gpu("buffer mapping callback was dropped"))??;

        // Drop the view before unmapping
        let result = {
            let data = buffer_slice.get_mapped_range();
            read(&data)
        };
        buffer.unmap();

        Ok(result)
    }
}
