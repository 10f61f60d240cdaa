pub mod backend;
pub mod binding;
pub mod context;
pub mod info;
pub mod pipelines;

// Re-export main types for convenience
pub use backend::GpuBackend;
pub use binding::{BindingSlot, BinningBinding, VertexBinding, BINDING_CONTRACT_VERSION};
pub use context::GpuContext;
pub use info::GpuInfo;
