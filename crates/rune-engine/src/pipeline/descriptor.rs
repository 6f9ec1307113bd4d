use crate::resource::{PipelineLayout, ShaderModule};

/// How a pipeline obtains its bind group layouts.
#[derive(Debug, Copy, Clone, Default)]
pub enum PipelineLayoutChoice<'a> {
    /// Derive one layout per group from the bindings the entry points use.
    #[default]
    Auto,
    Explicit(&'a PipelineLayout),
}

/// One vertex buffer slot.
#[derive(Debug, Copy, Clone)]
pub struct VertexBufferLayout<'a> {
    /// Bytes between consecutive elements.
    pub array_stride: u64,
    pub step_mode: wgpu::VertexStepMode,
    pub attributes: &'a [wgpu::VertexAttribute],
}

#[derive(Debug, Copy, Clone)]
pub struct VertexState<'a> {
    pub module: &'a ShaderModule,
    /// `None` picks the module's single vertex entry point.
    pub entry_point: Option<&'a str>,
    pub buffers: &'a [VertexBufferLayout<'a>],
}

#[derive(Debug, Copy, Clone)]
pub struct FragmentState<'a> {
    pub module: &'a ShaderModule,
    /// `None` picks the module's single fragment entry point.
    pub entry_point: Option<&'a str>,
    /// Color target `i` receives fragment output `@location(i)`.
    pub targets: &'a [Option<wgpu::ColorTargetState>],
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PrimitiveState {
    pub topology: wgpu::PrimitiveTopology,
    /// Enables primitive restart; only valid with strip topologies.
    pub strip_index_format: Option<wgpu::IndexFormat>,
    pub front_face: wgpu::FrontFace,
    pub cull_mode: Option<wgpu::Face>,
    pub unclipped_depth: bool,
}

impl Default for PrimitiveState {
    fn default() -> Self {
        Self {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            unclipped_depth: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepthStencilState {
    pub format: wgpu::TextureFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: wgpu::CompareFunction,
    pub stencil: wgpu::StencilState,
    pub bias: wgpu::DepthBiasState,
}

impl DepthStencilState {
    /// Depth test and write with `compare`, no stencil, no bias.
    pub fn depth(format: wgpu::TextureFormat, compare: wgpu::CompareFunction) -> Self {
        Self {
            format,
            depth_write_enabled: true,
            depth_compare: compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }
    }
}

/// Parameters for [`Device::create_render_pipeline`](crate::device::Device::create_render_pipeline).
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor<'a> {
    pub label: Option<&'a str>,
    pub layout: PipelineLayoutChoice<'a>,
    pub vertex: VertexState<'a>,
    pub primitive: PrimitiveState,
    pub depth_stencil: Option<DepthStencilState>,
    pub multisample: wgpu::MultisampleState,
    pub fragment: Option<FragmentState<'a>>,
}
