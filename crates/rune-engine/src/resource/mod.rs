//! Device-owned resources.
//!
//! Every resource is a cheap handle around shared state. Dropping the last
//! handle releases it; `destroy` releases buffers and textures early.

mod binding;
mod buffer;
mod sampler;
mod shader;
mod texture;

pub use binding::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, BindingType, BufferBinding, PipelineLayout,
    PipelineLayoutDescriptor,
};
pub use buffer::{Buffer, BufferDescriptor, BufferMapState, BufferSlice, MapMode};
pub use sampler::{Sampler, SamplerDescriptor};
pub use shader::{
    CompilationHint, EntryPointInfo, ScalarKind, ShaderBinding, ShaderModule,
    ShaderModuleDescriptor, StageIo,
};
pub use texture::{Texture, TextureDescriptor, TextureView, TextureViewDescriptor};
