use super::context::GpuContext;
use serde::Serialize;

/// GPU capability summary printed by `histoview info`.
#[derive(Debug, Clone, Serialize)]
pub struct GpuInfo {
    pub adapter_name: String,
    pub backend: String,
    pub device_type: String,
    pub driver: String,
    pub max_texture_dimension: u32,
    pub supports_vertex_storage: bool,
}

impl GpuContext {
    pub fn info(&self) -> GpuInfo {
        GpuInfo {
            adapter_name: self.adapter_info.name.clone(),
            backend: self.adapter_info.backend.to_str().to_string(),
            device_type: match self.adapter_info.device_type {
                wgpu::DeviceType::DiscreteGpu => "Discrete GPU".to_string(),
                wgpu::DeviceType::IntegratedGpu => "Integrated GPU".to_string(),
                wgpu::DeviceType::VirtualGpu => "Virtual GPU".to_string(),
                wgpu::DeviceType::Cpu => "CPU".to_string(),
                _ => "Unknown".to_string(),
            },
            driver: format!("{} {}", self.adapter_info.driver, self.adapter_info.driver_info)
                .trim()
                .to_string(),
            max_texture_dimension: self.max_texture_dimension(),
            supports_vertex_storage: self.supports_vertex_storage(),
        }
    }
}

impl std::fmt::Display for GpuInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Adapter:        {}", self.adapter_name)?;
        writeln!(f, "Backend:        {}", self.backend)?;
        writeln!(f, "Device type:    {}", self.device_type)?;
        if !self.driver.is_empty() {
            writeln!(f, "Driver:         {}", self.driver)?;
        }
        writeln!(f, "Max texture:    {}", self.max_texture_dimension)?;
        write!(
            f,
            "Overlay render: {}",
            if self.supports_vertex_storage { "GPU" } else { "CPU fallback" }
        )
    }
}
