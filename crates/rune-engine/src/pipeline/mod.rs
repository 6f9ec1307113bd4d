//! Render pipelines.
//!
//! A pipeline is validated once at creation against its shader modules and
//! either comes back `Ready` or not at all.

mod descriptor;
mod render;

pub use descriptor::{
    DepthStencilState, FragmentState, PipelineLayoutChoice, PrimitiveState,
    RenderPipelineDescriptor, VertexBufferLayout, VertexState,
};
pub use render::{PipelineState, RenderPipeline};
pub(crate) use render::{VertexBufferInfo, is_color_renderable};
