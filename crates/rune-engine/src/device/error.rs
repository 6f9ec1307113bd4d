use thiserror::Error;

/// Result alias used across the GPU layer.
pub type GpuResult<T> = Result<T, GpuError>;

/// Every failure surfaced by the GPU layer.
///
/// Errors are reported synchronously at the call that caused them. Nothing is
/// retried internally.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GpuError {
    /// Malformed descriptor or illegal use of a resource.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Shader source failed to parse or type-check.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Encoder or render pass used out of order.
    #[error("invalid encoder state: {0}")]
    InvalidEncoderState(#[from] EncoderStateError),

    /// An explicit pipeline layout disagrees with the shader's bindings.
    #[error("pipeline layout mismatch: {0}")]
    LayoutMismatch(#[from] LayoutMismatch),

    /// The device context was lost while work was outstanding.
    #[error("device lost ({reason:?}): {message}")]
    DeviceLost {
        reason: DeviceLostReason,
        message: String,
    },

    /// The device (or the device owning this object) is lost or destroyed.
    #[error("device is lost; derived objects can no longer be used")]
    UseAfterDeviceLost,

    /// `request_device` was already called on this adapter.
    #[error("adapter has already spawned a device")]
    AdapterConsumed,

    /// Requested limits are not supported by the adapter.
    #[error("requested limits exceed what the adapter supports")]
    LimitsExceeded,

    /// A pending buffer map request was cancelled by `unmap` or `destroy`.
    #[error("buffer map request was aborted")]
    MapAborted,

    /// The queue worker thread could not be started.
    #[error("failed to start queue worker: {0}")]
    QueueStart(String),
}

/// Why a device stopped working.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DeviceLostReason {
    /// Context loss not requested by the application.
    Unknown,
    /// `Device::destroy` was called.
    Destroyed,
}

/// Location inside shader source, 1-based line and column.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
    /// Byte offset of the span start.
    pub offset: u32,
    /// Byte length of the span.
    pub length: u32,
}

/// Shader compilation failure.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", render_compile_error(.label.as_deref(), .message, .location))]
pub struct CompileError {
    pub label: Option<String>,
    pub message: String,
    pub location: Option<SourceLocation>,
}

fn render_compile_error(
    label: Option<&str>,
    message: &str,
    location: &Option<SourceLocation>,
) -> String {
    let name = label.unwrap_or("<unnamed>");
    match location {
        Some(loc) => format!("shader {name}:{}:{}: {message}", loc.line, loc.column),
        None => format!("shader {name}: {message}"),
    }
}

/// Out-of-order encoder or pass usage.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum EncoderStateError {
    #[error("a render pass is already open on this encoder")]
    PassAlreadyOpen,
    #[error("a render pass is still open; end it before finishing")]
    PassStillOpen,
    #[error("encoder was already finished")]
    RecordAfterFinish,
    #[error("debug group stack is unbalanced")]
    UnbalancedDebugGroup,
}

/// Explicit layout vs. shader reflection conflicts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutMismatch {
    #[error("shader uses group {group} but the layout has {count} groups")]
    MissingGroup { group: u32, count: usize },
    #[error("shader uses @group({group}) @binding({binding}) which the layout does not declare")]
    MissingBinding { group: u32, binding: u32 },
    #[error("@group({group}) @binding({binding}): layout declares {layout}, shader expects {shader}")]
    BindingType {
        group: u32,
        binding: u32,
        layout: String,
        shader: String,
    },
    #[error("@group({group}) @binding({binding}) is not visible to the {stage:?} stage")]
    Visibility {
        group: u32,
        binding: u32,
        stage: wgpu::ShaderStages,
    },
}

/// Descriptor and usage validation failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    // ── buffers ──────────────────────────────────────────────────────────
    #[error("mapped-at-creation contents are {actual} bytes but the buffer size is {expected}")]
    InitialContentsSize { expected: u64, actual: u64 },
    #[error("initial contents supplied without mapped_at_creation")]
    ContentsWithoutMapping,
    #[error("buffer size {size} must be a multiple of 4 when mapped at creation")]
    UnalignedMappedSize { size: u64 },
    #[error("buffer size {size} exceeds the device limit {limit}")]
    BufferTooLarge { size: u64, limit: u64 },
    #[error("usage flags must not be empty")]
    EmptyUsage,
    #[error("invalid buffer usage combination {0:?}")]
    InvalidBufferUsage(wgpu::BufferUsages),
    #[error("buffer '{label}' is missing usage {missing:?}")]
    MissingBufferUsage {
        label: String,
        missing: wgpu::BufferUsages,
    },
    #[error("range {offset}..{end} is outside buffer '{label}' of size {size}")]
    BufferRangeOutOfBounds {
        label: String,
        offset: u64,
        end: u64,
        size: u64,
    },
    #[error("{what} value {value} must be aligned to {alignment}")]
    Unaligned {
        what: &'static str,
        value: u64,
        alignment: u64,
    },
    #[error("buffer '{label}' is not mapped")]
    BufferNotMapped { label: String },
    #[error("buffer '{label}' is mapped or has a pending map request")]
    BufferMapped { label: String },
    #[error("buffer '{label}' is not mapped for writing")]
    BufferNotWritable { label: String },
    #[error("copy source and destination are the same buffer '{label}'")]
    CopyOverlap { label: String },

    // ── textures ─────────────────────────────────────────────────────────
    #[error("texture extent {width}x{height}x{depth} is invalid for {dimension:?}")]
    InvalidTextureExtent {
        width: u32,
        height: u32,
        depth: u32,
        dimension: wgpu::TextureDimension,
    },
    #[error("mip level count {requested} exceeds the full chain of {max}")]
    InvalidMipLevelCount { requested: u32, max: u32 },
    #[error("sample count {0} is not supported (expected 1 or 4)")]
    InvalidSampleCount(u32),
    #[error("multisampled textures must be 2D, single-mip render attachments without storage usage")]
    InvalidMultisampleTexture,
    #[error("format {format:?} cannot be used with {dimension:?} textures")]
    FormatDimension {
        format: wgpu::TextureFormat,
        dimension: wgpu::TextureDimension,
    },
    #[error("format {format:?} does not support usage {usage:?}")]
    FormatUsage {
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    },
    #[error("view format {view:?} is not compatible with texture format {texture:?}")]
    IncompatibleViewFormat {
        texture: wgpu::TextureFormat,
        view: wgpu::TextureFormat,
    },
    #[error("view dimension {view:?} is not compatible with a {texture:?} texture")]
    IncompatibleViewDimension {
        texture: wgpu::TextureDimension,
        view: wgpu::TextureViewDimension,
    },
    #[error("view subresource range is outside the texture")]
    ViewRangeOutOfBounds,
    #[error("texture '{label}' is missing usage {missing:?}")]
    MissingTextureUsage {
        label: String,
        missing: wgpu::TextureUsages,
    },

    // ── samplers ─────────────────────────────────────────────────────────
    #[error("lod clamp range {min}..{max} is invalid")]
    InvalidLodClamp { min: f32, max: f32 },
    #[error("anisotropy clamp {0} requires linear filtering and must be within 1..=16")]
    InvalidAnisotropy(u16),

    // ── shaders and pipelines ────────────────────────────────────────────
    #[error("entry point {name:?} for stage {stage:?} not found")]
    EntryPointNotFound {
        name: Option<String>,
        stage: wgpu::ShaderStages,
    },
    #[error("entry point for stage {stage:?} is ambiguous; name one explicitly")]
    AmbiguousEntryPoint { stage: wgpu::ShaderStages },
    #[error("@group({group}) @binding({binding}) uses a resource kind this device cannot bind")]
    UnsupportedBinding { group: u32, binding: u32 },
    #[error("@group({group}) @binding({binding}) is declared with different types across stages")]
    ConflictingBinding { group: u32, binding: u32 },
    #[error("too many vertex buffers: {count} > {limit}")]
    TooManyVertexBuffers { count: usize, limit: u32 },
    #[error("too many vertex attributes: {count} > {limit}")]
    TooManyVertexAttributes { count: usize, limit: u32 },
    #[error("vertex buffer {slot}: stride {stride} exceeds the limit {limit}")]
    StrideTooLarge { slot: usize, stride: u64, limit: u32 },
    #[error("vertex buffer {slot}: attribute at location {location} ends at {end}, past stride {stride}")]
    AttributeOutOfStride {
        slot: usize,
        location: u32,
        end: u64,
        stride: u64,
    },
    #[error("shader location {0} is assigned more than once")]
    DuplicateShaderLocation(u32),
    #[error("vertex shader input at location {0} has no matching vertex attribute")]
    MissingVertexAttribute(u32),
    #[error("vertex attribute format {format:?} at location {location} does not match the shader input type")]
    VertexFormatMismatch {
        location: u32,
        format: wgpu::VertexFormat,
    },
    #[error("fragment shader writes no output for color target {0}")]
    MissingFragmentOutput(usize),
    #[error("too many color targets: {count} > {limit}")]
    TooManyColorTargets { count: usize, limit: u32 },
    #[error("format {0:?} is not renderable as a color target")]
    InvalidColorFormat(wgpu::TextureFormat),
    #[error("format {0:?} is not a depth/stencil format")]
    InvalidDepthFormat(wgpu::TextureFormat),
    #[error("strip index format requires a strip topology, got {0:?}")]
    StripIndexFormatWithoutStrip(wgpu::PrimitiveTopology),
    #[error("group index {index} is out of range; pipeline has {count} bind group layouts")]
    BindGroupIndexOutOfRange { index: u32, count: usize },
    #[error("pipeline is not ready ({0})")]
    PipelineNotReady(&'static str),
    #[error("pipeline layout declares {count} groups, more than the limit {limit}")]
    TooManyBindGroups { count: usize, limit: u32 },

    // ── bind groups ──────────────────────────────────────────────────────
    #[error("binding {0} is declared more than once")]
    DuplicateBinding(u32),
    #[error("too many bindings: {count} > {limit}")]
    TooManyBindings { count: usize, limit: u32 },
    #[error("bind group has {actual} entries but its layout declares {expected}")]
    BindGroupEntryCount { expected: usize, actual: usize },
    #[error("bind group entry {0} is not declared by the layout")]
    UnknownBinding(u32),
    #[error("binding {binding}: resource does not match slot type {expected}")]
    BindingResourceType { binding: u32, expected: String },
    #[error("binding {binding}: bound size {size} is below the minimum {min}")]
    BindingTooSmall { binding: u32, size: u64, min: u64 },

    // ── passes and draws ─────────────────────────────────────────────────
    #[error("render pass needs at least one attachment")]
    EmptyRenderPass,
    #[error("attachment sizes differ")]
    AttachmentSizeMismatch,
    #[error("attachment sample counts differ")]
    AttachmentSampleCountMismatch,
    #[error("attachment view must select exactly one mip level")]
    AttachmentMipCount,
    #[error("color targets of the pipeline do not match the pass attachments")]
    ColorTargetMismatch,
    #[error("pipeline depth format {pipeline:?} does not match pass depth attachment {attachment:?}")]
    DepthFormatMismatch {
        pipeline: Option<wgpu::TextureFormat>,
        attachment: Option<wgpu::TextureFormat>,
    },
    #[error("pipeline sample count {pipeline} does not match pass sample count {pass}")]
    SampleCountMismatch { pipeline: u32, pass: u32 },
    #[error("no pipeline set")]
    NoPipeline,
    #[error("bind group index {index} exceeds the limit {limit}")]
    BindGroupIndexTooLarge { index: u32, limit: u32 },
    #[error("vertex buffer slot {slot} exceeds the limit {limit}")]
    VertexSlotTooLarge { slot: u32, limit: u32 },
    #[error("bind group {0} required by the pipeline is not set")]
    MissingBindGroup(u32),
    #[error("bind group {0} is incompatible with the pipeline layout")]
    IncompatibleBindGroup(u32),
    #[error("vertex buffer slot {0} required by the pipeline is not set")]
    MissingVertexBuffer(u32),
    #[error("vertex buffer slot {slot} holds {available} bytes, draw needs {required}")]
    VertexBufferTooSmall {
        slot: u32,
        required: u64,
        available: u64,
    },
    #[error("draw range {start}..{end} is reversed")]
    InvalidDrawRange { start: u32, end: u32 },
    #[error("no index buffer set")]
    MissingIndexBuffer,
    #[error("index range ends at {end} but the index buffer holds {count} indices")]
    IndexRangeOutOfBounds { end: u64, count: u64 },
    #[error("index format {bound:?} does not match the pipeline strip index format {pipeline:?}")]
    IndexFormatMismatch {
        bound: wgpu::IndexFormat,
        pipeline: wgpu::IndexFormat,
    },
    #[error("viewport is invalid")]
    InvalidViewport,
    #[error("scissor rect exceeds the attachment bounds")]
    InvalidScissorRect,

    // ── submission ───────────────────────────────────────────────────────
    #[error("{kind} '{label}' was destroyed")]
    DestroyedResource { kind: &'static str, label: String },
    #[error("object belongs to a different device")]
    DeviceMismatch,
}
