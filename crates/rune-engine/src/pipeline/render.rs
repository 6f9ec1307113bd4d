use std::collections::BTreeMap;
use std::sync::Arc;

use crate::device::{
    DeviceShared, GpuError, GpuResult, LayoutMismatch, ResourceKind, Tracked, ValidationError,
};
use crate::resource::{
    BindGroupLayout, BindGroupLayoutEntry, BindingType, EntryPointInfo, PipelineLayout,
    ScalarKind, ShaderModule,
};

use super::descriptor::{
    DepthStencilState, FragmentState, PipelineLayoutChoice, PrimitiveState,
    RenderPipelineDescriptor, VertexBufferLayout,
};

const VERTEX_STRIDE_ALIGNMENT: u64 = 4;

/// Lifecycle of a pipeline under construction.
///
/// `Uncompiled -> Validating -> Ready | Failed`. Both outcomes are terminal;
/// creation hands out only `Ready` pipelines.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PipelineState {
    Uncompiled,
    Validating,
    Ready,
    Failed,
}

impl PipelineState {
    fn can_advance_to(self, next: PipelineState) -> bool {
        matches!(
            (self, next),
            (PipelineState::Uncompiled, PipelineState::Validating)
                | (PipelineState::Validating, PipelineState::Ready)
                | (PipelineState::Validating, PipelineState::Failed)
        )
    }
}

struct Compilation<'a> {
    name: &'a str,
    state: PipelineState,
}

impl<'a> Compilation<'a> {
    fn new(name: &'a str) -> Self {
        Self {
            name,
            state: PipelineState::Uncompiled,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal pipeline transition {:?} -> {next:?}",
            self.state
        );
        log::trace!("pipeline '{}': {:?} -> {next:?}", self.name, self.state);
        self.state = next;
    }
}

/// Per-slot vertex fetch requirements.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct VertexBufferInfo {
    pub(crate) stride: u64,
    pub(crate) step_mode: wgpu::VertexStepMode,
    /// Bytes read from the last element: the furthest attribute end.
    pub(crate) footprint: u64,
}

impl VertexBufferInfo {
    /// Bytes needed to fetch elements `first..first + count`.
    pub(crate) fn required_size(&self, first: u32, count: u32) -> u64 {
        if count == 0 {
            return 0;
        }
        let last = u64::from(first) + u64::from(count) - 1;
        last * self.stride + self.footprint
    }
}

struct Resolved {
    groups: Vec<BindGroupLayout>,
    auto_layout: bool,
    vertex_buffers: Vec<VertexBufferInfo>,
    color_formats: Vec<Option<wgpu::TextureFormat>>,
    vertex_entry: String,
    fragment_entry: Option<String>,
}

struct RenderPipelineInner {
    tracked: Tracked,
    state: PipelineState,
    groups: Vec<BindGroupLayout>,
    auto_layout: bool,
    vertex_buffers: Vec<VertexBufferInfo>,
    primitive: PrimitiveState,
    color_formats: Vec<Option<wgpu::TextureFormat>>,
    depth_stencil: Option<DepthStencilState>,
    sample_count: u32,
    vertex_entry: String,
    fragment_entry: Option<String>,
}

/// Immutable, validated rendering state.
#[derive(Clone)]
pub struct RenderPipeline {
    inner: Arc<RenderPipelineInner>,
}

impl std::fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("RenderPipeline")
            .field("label", &self.inner.tracked.label())
            .field("state", &self.inner.state)
            .field("groups", &self.inner.groups.len())
            .finish()
    }
}

impl RenderPipeline {
    pub(crate) fn create(
        device: &Arc<DeviceShared>,
        desc: &RenderPipelineDescriptor<'_>,
    ) -> GpuResult<Self> {
        device.check_alive()?;

        let name = desc.label.unwrap_or("<unnamed>");
        let mut compilation = Compilation::new(name);
        compilation.advance(PipelineState::Validating);

        let resolved = match resolve(device, name, desc) {
            Ok(resolved) => resolved,
            Err(err) => {
                compilation.advance(PipelineState::Failed);
                log::warn!("pipeline '{name}' failed: {err}");
                return Err(err);
            }
        };
        compilation.advance(PipelineState::Ready);

        let tracked = Tracked::new(device, ResourceKind::RenderPipeline, desc.label);
        log::debug!(
            "render pipeline '{}' ready: {} groups ({}), {} vertex buffers",
            tracked.name(),
            resolved.groups.len(),
            if resolved.auto_layout { "auto" } else { "explicit" },
            resolved.vertex_buffers.len()
        );

        Ok(Self {
            inner: Arc::new(RenderPipelineInner {
                tracked,
                state: compilation.state,
                groups: resolved.groups,
                auto_layout: resolved.auto_layout,
                vertex_buffers: resolved.vertex_buffers,
                primitive: desc.primitive,
                color_formats: resolved.color_formats,
                depth_stencil: desc.depth_stencil.clone(),
                sample_count: desc.multisample.count,
                vertex_entry: resolved.vertex_entry,
                fragment_entry: resolved.fragment_entry,
            }),
        })
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.tracked.label()
    }

    pub fn state(&self) -> PipelineState {
        self.inner.state
    }

    /// Layout of group `index`, derived or explicit.
    pub fn get_bind_group_layout(&self, index: u32) -> GpuResult<BindGroupLayout> {
        self.device().check_alive()?;
        self.inner
            .groups
            .get(index as usize)
            .cloned()
            .ok_or_else(|| {
                ValidationError::BindGroupIndexOutOfRange {
                    index,
                    count: self.inner.groups.len(),
                }
                .into()
            })
    }

    pub fn bind_group_count(&self) -> usize {
        self.inner.groups.len()
    }

    pub fn has_auto_layout(&self) -> bool {
        self.inner.auto_layout
    }

    pub fn primitive(&self) -> &PrimitiveState {
        &self.inner.primitive
    }

    pub fn color_formats(&self) -> &[Option<wgpu::TextureFormat>] {
        &self.inner.color_formats
    }

    pub fn depth_stencil(&self) -> Option<&DepthStencilState> {
        self.inner.depth_stencil.as_ref()
    }

    pub fn depth_format(&self) -> Option<wgpu::TextureFormat> {
        self.inner.depth_stencil.as_ref().map(|ds| ds.format)
    }

    pub fn sample_count(&self) -> u32 {
        self.inner.sample_count
    }

    pub fn vertex_entry_point(&self) -> &str {
        &self.inner.vertex_entry
    }

    pub fn fragment_entry_point(&self) -> Option<&str> {
        self.inner.fragment_entry.as_deref()
    }

    pub(crate) fn device(&self) -> &Arc<DeviceShared> {
        self.inner.tracked.device()
    }

    pub(crate) fn group_layouts(&self) -> &[BindGroupLayout] {
        &self.inner.groups
    }

    pub(crate) fn vertex_buffers(&self) -> &[VertexBufferInfo] {
        &self.inner.vertex_buffers
    }
}

fn resolve(
    device: &Arc<DeviceShared>,
    name: &str,
    desc: &RenderPipelineDescriptor<'_>,
) -> GpuResult<Resolved> {
    let limits = device.limits();

    device.check_same(desc.vertex.module.device())?;
    if let Some(fragment) = &desc.fragment {
        device.check_same(fragment.module.device())?;
    }
    if let PipelineLayoutChoice::Explicit(layout) = desc.layout {
        device.check_same(layout.device())?;
    }

    let vs = desc
        .vertex
        .module
        .entry_point(wgpu::ShaderStages::VERTEX, desc.vertex.entry_point)?;
    let fs = match &desc.fragment {
        Some(fragment) => Some(
            fragment
                .module
                .entry_point(wgpu::ShaderStages::FRAGMENT, fragment.entry_point)?,
        ),
        None => None,
    };

    let vertex_buffers = validate_vertex_buffers(limits, desc.vertex.buffers, vs)?;
    validate_primitive(&desc.primitive)?;

    match desc.multisample.count {
        1 | 4 => {}
        other => return Err(ValidationError::InvalidSampleCount(other).into()),
    }

    if let Some(ds) = &desc.depth_stencil {
        if !ds.format.is_depth_stencil_format() {
            return Err(ValidationError::InvalidDepthFormat(ds.format).into());
        }
    }

    let color_formats = match (&desc.fragment, fs) {
        (Some(fragment), Some(fs)) => validate_color_targets(limits, fragment, fs)?,
        _ => Vec::new(),
    };

    let mut used = vec![(wgpu::ShaderStages::VERTEX, desc.vertex.module, vs)];
    if let (Some(fragment), Some(fs)) = (&desc.fragment, fs) {
        used.push((wgpu::ShaderStages::FRAGMENT, fragment.module, fs));
    }
    let bindings = collect_bindings(&used)?;

    let (groups, auto_layout) = match desc.layout {
        PipelineLayoutChoice::Auto => (derive_layouts(device, name, &bindings)?, true),
        PipelineLayoutChoice::Explicit(layout) => {
            check_explicit_layout(layout, &bindings)?;
            (layout.bind_group_layouts().to_vec(), false)
        }
    };

    Ok(Resolved {
        groups,
        auto_layout,
        vertex_buffers,
        color_formats,
        vertex_entry: vs.name.clone(),
        fragment_entry: fs.map(|fs| fs.name.clone()),
    })
}

fn validate_vertex_buffers(
    limits: &wgpu::Limits,
    buffers: &[VertexBufferLayout<'_>],
    vs: &EntryPointInfo,
) -> GpuResult<Vec<VertexBufferInfo>> {
    if buffers.len() > limits.max_vertex_buffers as usize {
        return Err(ValidationError::TooManyVertexBuffers {
            count: buffers.len(),
            limit: limits.max_vertex_buffers,
        }
        .into());
    }
    let attribute_count: usize = buffers.iter().map(|b| b.attributes.len()).sum();
    if attribute_count > limits.max_vertex_attributes as usize {
        return Err(ValidationError::TooManyVertexAttributes {
            count: attribute_count,
            limit: limits.max_vertex_attributes,
        }
        .into());
    }

    let mut locations = BTreeMap::new();
    let mut infos = Vec::with_capacity(buffers.len());

    for (slot, layout) in buffers.iter().enumerate() {
        let stride = layout.array_stride;
        if stride > u64::from(limits.max_vertex_buffer_array_stride) {
            return Err(ValidationError::StrideTooLarge {
                slot,
                stride,
                limit: limits.max_vertex_buffer_array_stride,
            }
            .into());
        }
        crate::queue::check_aligned("vertex buffer stride", stride, VERTEX_STRIDE_ALIGNMENT)?;

        let mut footprint = 0;
        for attribute in layout.attributes {
            let size = attribute.format.size();
            crate::queue::check_aligned("vertex attribute offset", attribute.offset, size.min(4))?;

            let bound = if stride > 0 {
                stride
            } else {
                u64::from(limits.max_vertex_buffer_array_stride)
            };
            let end = match attribute.offset.checked_add(size) {
                Some(end) if end <= bound => end,
                end => {
                    return Err(ValidationError::AttributeOutOfStride {
                        slot,
                        location: attribute.shader_location,
                        end: end.unwrap_or(u64::MAX),
                        stride,
                    }
                    .into());
                }
            };
            if locations
                .insert(attribute.shader_location, attribute.format)
                .is_some()
            {
                return Err(ValidationError::DuplicateShaderLocation(attribute.shader_location).into());
            }
            footprint = footprint.max(end);
        }

        infos.push(VertexBufferInfo {
            stride,
            step_mode: layout.step_mode,
            footprint,
        });
    }

    for input in &vs.inputs {
        let format = locations
            .get(&input.location)
            .copied()
            .ok_or(ValidationError::MissingVertexAttribute(input.location))?;
        if vertex_format_kind(format) != input.kind {
            return Err(ValidationError::VertexFormatMismatch {
                location: input.location,
                format,
            }
            .into());
        }
    }

    Ok(infos)
}

/// Scalar class a vertex format is fetched as.
fn vertex_format_kind(format: wgpu::VertexFormat) -> ScalarKind {
    use wgpu::VertexFormat as F;

    match format {
        F::Uint8
        | F::Uint8x2
        | F::Uint8x4
        | F::Uint16
        | F::Uint16x2
        | F::Uint16x4
        | F::Uint32
        | F::Uint32x2
        | F::Uint32x3
        | F::Uint32x4 => ScalarKind::Uint,
        F::Sint8
        | F::Sint8x2
        | F::Sint8x4
        | F::Sint16
        | F::Sint16x2
        | F::Sint16x4
        | F::Sint32
        | F::Sint32x2
        | F::Sint32x3
        | F::Sint32x4 => ScalarKind::Sint,
        _ => ScalarKind::Float,
    }
}

fn validate_primitive(primitive: &PrimitiveState) -> GpuResult<()> {
    let strip = matches!(
        primitive.topology,
        wgpu::PrimitiveTopology::LineStrip | wgpu::PrimitiveTopology::TriangleStrip
    );
    if primitive.strip_index_format.is_some() && !strip {
        return Err(ValidationError::StripIndexFormatWithoutStrip(primitive.topology).into());
    }
    Ok(())
}

fn validate_color_targets(
    limits: &wgpu::Limits,
    fragment: &FragmentState<'_>,
    fs: &EntryPointInfo,
) -> GpuResult<Vec<Option<wgpu::TextureFormat>>> {
    if fragment.targets.len() > limits.max_color_attachments as usize {
        return Err(ValidationError::TooManyColorTargets {
            count: fragment.targets.len(),
            limit: limits.max_color_attachments,
        }
        .into());
    }

    let mut formats = Vec::with_capacity(fragment.targets.len());
    for (index, target) in fragment.targets.iter().enumerate() {
        let Some(target) = target else {
            formats.push(None);
            continue;
        };
        if !is_color_renderable(target.format) {
            return Err(ValidationError::InvalidColorFormat(target.format).into());
        }
        if !fs.outputs.iter().any(|out| out.location as usize == index) {
            return Err(ValidationError::MissingFragmentOutput(index).into());
        }
        formats.push(Some(target.format));
    }

    Ok(formats)
}

pub(crate) fn is_color_renderable(format: wgpu::TextureFormat) -> bool {
    !format.is_depth_stencil_format()
        && !format.is_compressed()
        && format
            .guaranteed_format_features(wgpu::Features::empty())
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
}

/// A shader resource used by the pipeline, with the stages using it.
struct UsedBinding {
    group: u32,
    binding: u32,
    stages: wgpu::ShaderStages,
    ty: BindingType,
}

fn collect_bindings(
    used: &[(wgpu::ShaderStages, &ShaderModule, &EntryPointInfo)],
) -> GpuResult<Vec<UsedBinding>> {
    let mut merged: BTreeMap<(u32, u32), UsedBinding> = BTreeMap::new();

    for (stage, module, entry) in used {
        for &(group, binding) in &entry.resources {
            let ty = module
                .binding(group, binding)
                .and_then(|b| b.ty)
                .ok_or(ValidationError::UnsupportedBinding { group, binding })?;

            match merged.get_mut(&(group, binding)) {
                None => {
                    merged.insert(
                        (group, binding),
                        UsedBinding {
                            group,
                            binding,
                            stages: *stage,
                            ty,
                        },
                    );
                }
                Some(existing) => {
                    existing.ty = merge_types(existing.ty, ty)
                        .ok_or(ValidationError::ConflictingBinding { group, binding })?;
                    existing.stages |= *stage;
                }
            }
        }
    }

    Ok(merged.into_values().collect())
}

/// Two stages may declare the same buffer with different struct sizes; the larger wins.
fn merge_types(a: BindingType, b: BindingType) -> Option<BindingType> {
    match (a, b) {
        _ if a == b => Some(a),
        (
            BindingType::Buffer {
                ty: ty_a,
                min_binding_size: min_a,
            },
            BindingType::Buffer {
                ty: ty_b,
                min_binding_size: min_b,
            },
        ) if ty_a == ty_b => Some(BindingType::Buffer {
            ty: ty_a,
            min_binding_size: min_a.max(min_b),
        }),
        _ => None,
    }
}

fn derive_layouts(
    device: &Arc<DeviceShared>,
    name: &str,
    bindings: &[UsedBinding],
) -> GpuResult<Vec<BindGroupLayout>> {
    let count = bindings.iter().map(|b| b.group + 1).max().unwrap_or(0);
    let limit = device.limits().max_bind_groups;
    if count > limit {
        return Err(ValidationError::TooManyBindGroups {
            count: count as usize,
            limit,
        }
        .into());
    }

    Ok((0..count)
        .map(|group| {
            let entries = bindings
                .iter()
                .filter(|b| b.group == group)
                .map(|b| BindGroupLayoutEntry {
                    binding: b.binding,
                    visibility: b.stages,
                    ty: b.ty,
                })
                .collect();
            let label = format!("{name} group {group}");
            BindGroupLayout::from_entries(device, Some(&label), entries)
        })
        .collect())
}

fn check_explicit_layout(layout: &PipelineLayout, bindings: &[UsedBinding]) -> GpuResult<()> {
    let groups = layout.bind_group_layouts();

    for used in bindings {
        let group_layout =
            groups
                .get(used.group as usize)
                .ok_or(LayoutMismatch::MissingGroup {
                    group: used.group,
                    count: groups.len(),
                })?;
        let entry = group_layout
            .entry(used.binding)
            .ok_or(LayoutMismatch::MissingBinding {
                group: used.group,
                binding: used.binding,
            })?;

        if !entry.ty.accepts(&used.ty) {
            return Err(LayoutMismatch::BindingType {
                group: used.group,
                binding: used.binding,
                layout: entry.ty.to_string(),
                shader: used.ty.to_string(),
            }
            .into());
        }

        let missing = used.stages - entry.visibility;
        if !missing.is_empty() {
            return Err(GpuError::from(LayoutMismatch::Visibility {
                group: used.group,
                binding: used.binding,
                stage: missing,
            }));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU64;

    use super::*;
    use crate::device::{Device, GpuError};
    use crate::pipeline::{FragmentState, VertexState};
    use crate::resource::{BindGroupLayoutDescriptor, PipelineLayoutDescriptor, ShaderModuleDescriptor};
    use crate::test_support::{CUBE_ATTRIBUTES, CUBE_STRIDE, CUBE_WGSL, device};

    fn module(device: &Device, code: &str) -> ShaderModule {
        device
            .create_shader_module(&ShaderModuleDescriptor {
                label: Some("cube"),
                code,
                hints: &[],
            })
            .unwrap()
    }

    fn cube_desc<'a>(
        module: &'a ShaderModule,
        buffers: &'a [VertexBufferLayout<'a>],
        targets: &'a [Option<wgpu::ColorTargetState>],
    ) -> RenderPipelineDescriptor<'a> {
        RenderPipelineDescriptor {
            label: Some("cube"),
            layout: PipelineLayoutChoice::Auto,
            vertex: VertexState {
                module,
                entry_point: Some("vs_main"),
                buffers,
            },
            primitive: PrimitiveState {
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(DepthStencilState::depth(
                wgpu::TextureFormat::Depth24Plus,
                wgpu::CompareFunction::Less,
            )),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(FragmentState {
                module,
                entry_point: Some("fs_main"),
                targets,
            }),
        }
    }

    const TARGETS: &[Option<wgpu::ColorTargetState>] = &[Some(wgpu::ColorTargetState {
        format: wgpu::TextureFormat::Bgra8UnormSrgb,
        blend: None,
        write_mask: wgpu::ColorWrites::ALL,
    })];

    fn cube_buffers() -> [VertexBufferLayout<'static>; 1] {
        [VertexBufferLayout {
            array_stride: CUBE_STRIDE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &CUBE_ATTRIBUTES,
        }]
    }

    // ── auto layout ───────────────────────────────────────────────────────

    #[test]
    fn auto_layout_matches_shader_group_zero() {
        let (device, _queue) = device();
        let shader = module(&device, CUBE_WGSL);
        let buffers = cube_buffers();
        let pipeline = device
            .create_render_pipeline(&cube_desc(&shader, &buffers, TARGETS))
            .unwrap();

        assert_eq!(pipeline.state(), PipelineState::Ready);
        assert!(pipeline.has_auto_layout());

        let layout = pipeline.get_bind_group_layout(0).unwrap();
        assert_eq!(
            layout.entries(),
            &[BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    min_binding_size: NonZeroU64::new(64),
                },
            }]
        );

        let declared: Vec<u32> = shader
            .bindings()
            .iter()
            .filter(|b| b.group == 0)
            .map(|b| b.binding)
            .collect();
        let derived: Vec<u32> = layout.entries().iter().map(|e| e.binding).collect();
        assert_eq!(declared, derived);
    }

    #[test]
    fn layout_index_out_of_range_fails() {
        let (device, _queue) = device();
        let shader = module(&device, CUBE_WGSL);
        let buffers = cube_buffers();
        let pipeline = device
            .create_render_pipeline(&cube_desc(&shader, &buffers, TARGETS))
            .unwrap();

        assert_eq!(
            pipeline.get_bind_group_layout(1).unwrap_err(),
            GpuError::from(ValidationError::BindGroupIndexOutOfRange { index: 1, count: 1 })
        );
    }

    #[test]
    fn unused_groups_below_the_highest_are_empty() {
        let (device, _queue) = device();
        let shader = module(
            &device,
            r#"
@group(1) @binding(3) var<uniform> tint: vec4<f32>;
@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }
@fragment fn fs_main() -> @location(0) vec4<f32> { return tint; }
"#,
        );
        let pipeline = device
            .create_render_pipeline(&RenderPipelineDescriptor {
                depth_stencil: None,
                ..cube_desc(&shader, &[], TARGETS)
            })
            .unwrap();

        assert_eq!(pipeline.bind_group_count(), 2);
        assert!(pipeline.get_bind_group_layout(0).unwrap().entries().is_empty());
        let group1 = pipeline.get_bind_group_layout(1).unwrap();
        assert_eq!(group1.entries()[0].binding, 3);
        assert_eq!(group1.entries()[0].visibility, wgpu::ShaderStages::FRAGMENT);
    }

    #[test]
    fn bindings_unused_by_entry_points_are_skipped() {
        let (device, _queue) = device();
        let shader = module(
            &device,
            r#"
@group(0) @binding(0) var<uniform> unused: vec4<f32>;
@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }
@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0); }
"#,
        );
        let pipeline = device
            .create_render_pipeline(&RenderPipelineDescriptor {
                depth_stencil: None,
                ..cube_desc(&shader, &[], TARGETS)
            })
            .unwrap();
        assert_eq!(pipeline.bind_group_count(), 0);
    }

    // ── vertex state ──────────────────────────────────────────────────────

    #[test]
    fn attribute_past_stride_fails() {
        let (device, _queue) = device();
        let shader = module(&device, CUBE_WGSL);
        let buffers = [VertexBufferLayout {
            array_stride: 36,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &CUBE_ATTRIBUTES,
        }];
        let err = device
            .create_render_pipeline(&cube_desc(&shader, &buffers, TARGETS))
            .unwrap_err();
        assert_eq!(
            err,
            GpuError::from(ValidationError::AttributeOutOfStride {
                slot: 0,
                location: 1,
                end: 40,
                stride: 36
            })
        );
    }

    #[test]
    fn overflowing_attribute_offset_fails() {
        let (device, _queue) = device();
        let shader = module(&device, CUBE_WGSL);
        let attributes = [
            CUBE_ATTRIBUTES[0],
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x2,
                offset: u64::MAX - 3,
                shader_location: 1,
            },
        ];
        let buffers = [VertexBufferLayout {
            array_stride: 0,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];
        let err = device
            .create_render_pipeline(&cube_desc(&shader, &buffers, TARGETS))
            .unwrap_err();
        assert_eq!(
            err,
            GpuError::from(ValidationError::AttributeOutOfStride {
                slot: 0,
                location: 1,
                end: u64::MAX,
                stride: 0
            })
        );
    }

    #[test]
    fn duplicate_locations_fail() {
        let (device, _queue) = device();
        let shader = module(&device, CUBE_WGSL);
        let attributes = wgpu::vertex_attr_array![0 => Float32x4, 0 => Float32x2];
        let buffers = [VertexBufferLayout {
            array_stride: 24,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];
        let err = device
            .create_render_pipeline(&cube_desc(&shader, &buffers, TARGETS))
            .unwrap_err();
        assert_eq!(err, GpuError::from(ValidationError::DuplicateShaderLocation(0)));
    }

    #[test]
    fn shader_inputs_need_attributes() {
        let (device, _queue) = device();
        let shader = module(&device, CUBE_WGSL);
        let attributes = wgpu::vertex_attr_array![0 => Float32x4];
        let buffers = [VertexBufferLayout {
            array_stride: 16,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];
        let err = device
            .create_render_pipeline(&cube_desc(&shader, &buffers, TARGETS))
            .unwrap_err();
        assert_eq!(err, GpuError::from(ValidationError::MissingVertexAttribute(1)));
    }

    #[test]
    fn attribute_kind_must_match_input() {
        let (device, _queue) = device();
        let shader = module(&device, CUBE_WGSL);
        let attributes = wgpu::vertex_attr_array![0 => Uint32x4, 1 => Float32x2];
        let buffers = [VertexBufferLayout {
            array_stride: 24,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];
        let err = device
            .create_render_pipeline(&cube_desc(&shader, &buffers, TARGETS))
            .unwrap_err();
        assert!(matches!(
            err,
            GpuError::Validation(ValidationError::VertexFormatMismatch { location: 0, .. })
        ));
    }

    #[test]
    fn required_size_covers_last_element() {
        let info = VertexBufferInfo {
            stride: 40,
            step_mode: wgpu::VertexStepMode::Vertex,
            footprint: 40,
        };
        assert_eq!(info.required_size(0, 36), 1440);
        assert_eq!(info.required_size(0, 0), 0);
    }

    // ── fixed-function state ──────────────────────────────────────────────

    #[test]
    fn strip_index_format_needs_strip() {
        let (device, _queue) = device();
        let shader = module(&device, CUBE_WGSL);
        let buffers = cube_buffers();
        let err = device
            .create_render_pipeline(&RenderPipelineDescriptor {
                primitive: PrimitiveState {
                    strip_index_format: Some(wgpu::IndexFormat::Uint16),
                    ..Default::default()
                },
                ..cube_desc(&shader, &buffers, TARGETS)
            })
            .unwrap_err();
        assert_eq!(
            err,
            GpuError::from(ValidationError::StripIndexFormatWithoutStrip(
                wgpu::PrimitiveTopology::TriangleList
            ))
        );
    }

    #[test]
    fn depth_state_needs_depth_format() {
        let (device, _queue) = device();
        let shader = module(&device, CUBE_WGSL);
        let buffers = cube_buffers();
        let err = device
            .create_render_pipeline(&RenderPipelineDescriptor {
                depth_stencil: Some(DepthStencilState::depth(
                    wgpu::TextureFormat::Rgba8Unorm,
                    wgpu::CompareFunction::Less,
                )),
                ..cube_desc(&shader, &buffers, TARGETS)
            })
            .unwrap_err();
        assert_eq!(
            err,
            GpuError::from(ValidationError::InvalidDepthFormat(wgpu::TextureFormat::Rgba8Unorm))
        );
    }

    #[test]
    fn every_target_needs_an_output() {
        let (device, _queue) = device();
        let shader = module(&device, CUBE_WGSL);
        let buffers = cube_buffers();
        let targets = [
            Some(wgpu::TextureFormat::Bgra8UnormSrgb.into()),
            Some(wgpu::TextureFormat::Rgba8Unorm.into()),
        ];
        let err = device
            .create_render_pipeline(&cube_desc(&shader, &buffers, &targets))
            .unwrap_err();
        assert_eq!(err, GpuError::from(ValidationError::MissingFragmentOutput(1)));
    }

    // ── explicit layouts ──────────────────────────────────────────────────

    fn explicit(device: &Device, entries: &[BindGroupLayoutEntry]) -> PipelineLayout {
        let group = device
            .create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: Some("explicit"),
                entries,
            })
            .unwrap();
        device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: None,
                bind_group_layouts: &[&group],
            })
            .unwrap()
    }

    fn uniform(visibility: wgpu::ShaderStages) -> BindGroupLayoutEntry {
        BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                min_binding_size: None,
            },
        }
    }

    #[test]
    fn matching_explicit_layout_is_used() {
        let (device, _queue) = device();
        let shader = module(&device, CUBE_WGSL);
        let buffers = cube_buffers();
        let layout = explicit(&device, &[uniform(wgpu::ShaderStages::VERTEX_FRAGMENT)]);

        let pipeline = device
            .create_render_pipeline(&RenderPipelineDescriptor {
                layout: PipelineLayoutChoice::Explicit(&layout),
                ..cube_desc(&shader, &buffers, TARGETS)
            })
            .unwrap();
        assert!(!pipeline.has_auto_layout());
        assert!(
            pipeline
                .get_bind_group_layout(0)
                .unwrap()
                .is_compatible(&layout.bind_group_layouts()[0])
        );
    }

    #[test]
    fn explicit_layout_mismatches() {
        let (device, _queue) = device();
        let shader = module(&device, CUBE_WGSL);
        let buffers = cube_buffers();

        let empty = explicit(&device, &[]);
        let err = device
            .create_render_pipeline(&RenderPipelineDescriptor {
                layout: PipelineLayoutChoice::Explicit(&empty),
                ..cube_desc(&shader, &buffers, TARGETS)
            })
            .unwrap_err();
        assert_eq!(
            err,
            GpuError::from(LayoutMismatch::MissingBinding { group: 0, binding: 0 })
        );

        let wrong_stage = explicit(&device, &[uniform(wgpu::ShaderStages::FRAGMENT)]);
        let err = device
            .create_render_pipeline(&RenderPipelineDescriptor {
                layout: PipelineLayoutChoice::Explicit(&wrong_stage),
                ..cube_desc(&shader, &buffers, TARGETS)
            })
            .unwrap_err();
        assert_eq!(
            err,
            GpuError::from(LayoutMismatch::Visibility {
                group: 0,
                binding: 0,
                stage: wgpu::ShaderStages::VERTEX
            })
        );

        let wrong_type = explicit(
            &device,
            &[BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            }],
        );
        let err = device
            .create_render_pipeline(&RenderPipelineDescriptor {
                layout: PipelineLayoutChoice::Explicit(&wrong_type),
                ..cube_desc(&shader, &buffers, TARGETS)
            })
            .unwrap_err();
        assert!(matches!(
            err,
            GpuError::LayoutMismatch(LayoutMismatch::BindingType { .. })
        ));
    }

    // ── state machine ─────────────────────────────────────────────────────

    #[test]
    fn only_forward_transitions_are_legal() {
        use PipelineState as S;
        assert!(S::Uncompiled.can_advance_to(S::Validating));
        assert!(S::Validating.can_advance_to(S::Ready));
        assert!(S::Validating.can_advance_to(S::Failed));
        assert!(!S::Ready.can_advance_to(S::Validating));
        assert!(!S::Failed.can_advance_to(S::Ready));
        assert!(!S::Uncompiled.can_advance_to(S::Ready));
    }
}
