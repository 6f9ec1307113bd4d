use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;

use crate::device::{DeviceShared, GpuResult, ResourceKind, Tracked, ValidationError};

use super::buffer::Buffer;
use super::sampler::Sampler;
use super::texture::TextureView;

/// Kind of resource a bind group slot accepts.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BindingType {
    Buffer {
        ty: wgpu::BufferBindingType,
        /// Smallest binding size accepted; `None` skips the check.
        min_binding_size: Option<NonZeroU64>,
    },
    Sampler(wgpu::SamplerBindingType),
    Texture {
        sample_type: wgpu::TextureSampleType,
        view_dimension: wgpu::TextureViewDimension,
        multisampled: bool,
    },
}

impl fmt::Display for BindingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingType::Buffer { ty, .. } => match ty {
                wgpu::BufferBindingType::Uniform => f.write_str("uniform buffer"),
                wgpu::BufferBindingType::Storage { read_only: true } => {
                    f.write_str("read-only storage buffer")
                }
                wgpu::BufferBindingType::Storage { read_only: false } => {
                    f.write_str("storage buffer")
                }
            },
            BindingType::Sampler(kind) => match kind {
                wgpu::SamplerBindingType::Filtering => f.write_str("filtering sampler"),
                wgpu::SamplerBindingType::NonFiltering => f.write_str("non-filtering sampler"),
                wgpu::SamplerBindingType::Comparison => f.write_str("comparison sampler"),
            },
            BindingType::Texture {
                sample_type,
                view_dimension,
                multisampled,
            } => {
                let ms = if *multisampled { "multisampled " } else { "" };
                write!(f, "{ms}{view_dimension:?} texture of {sample_type:?}")
            }
        }
    }
}

impl BindingType {
    /// Whether a slot of this type can serve a shader binding of type `shader`.
    pub(crate) fn accepts(&self, shader: &BindingType) -> bool {
        use wgpu::TextureSampleType as S;

        match (self, shader) {
            (
                BindingType::Buffer {
                    ty: layout_ty,
                    min_binding_size: layout_min,
                },
                BindingType::Buffer {
                    ty: shader_ty,
                    min_binding_size: shader_min,
                },
            ) => {
                let size_ok = match (layout_min, shader_min) {
                    (Some(layout), Some(shader)) => layout >= shader,
                    _ => true,
                };
                layout_ty == shader_ty && size_ok
            }
            (BindingType::Sampler(layout), BindingType::Sampler(shader)) => {
                let layout_cmp = *layout == wgpu::SamplerBindingType::Comparison;
                let shader_cmp = *shader == wgpu::SamplerBindingType::Comparison;
                layout_cmp == shader_cmp
            }
            (
                BindingType::Texture {
                    sample_type: layout_sample,
                    view_dimension: layout_dim,
                    multisampled: layout_ms,
                },
                BindingType::Texture {
                    sample_type: shader_sample,
                    view_dimension: shader_dim,
                    multisampled: shader_ms,
                },
            ) => {
                let sample_ok = match (layout_sample, shader_sample) {
                    (S::Float { .. }, S::Float { .. }) => true,
                    (a, b) => a == b,
                };
                layout_dim == shader_dim && layout_ms == shader_ms && sample_ok
            }
            _ => false,
        }
    }
}

/// One slot of a bind group layout.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub visibility: wgpu::ShaderStages,
    pub ty: BindingType,
}

#[derive(Debug, Clone, Default)]
pub struct BindGroupLayoutDescriptor<'a> {
    pub label: Option<&'a str>,
    pub entries: &'a [BindGroupLayoutEntry],
}

struct BindGroupLayoutInner {
    tracked: Tracked,
    entries: Vec<BindGroupLayoutEntry>,
}

/// Ordered slot list for one group index.
#[derive(Clone)]
pub struct BindGroupLayout {
    inner: Arc<BindGroupLayoutInner>,
}

impl fmt::Debug for BindGroupLayout {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BindGroupLayout")
            .field("label", &self.inner.tracked.label())
            .field("entries", &self.inner.entries)
            .finish()
    }
}

impl BindGroupLayout {
    pub(crate) fn create(
        device: &Arc<DeviceShared>,
        desc: &BindGroupLayoutDescriptor<'_>,
    ) -> GpuResult<Self> {
        device.check_alive()?;

        let limit = device.limits().max_bindings_per_bind_group;
        if desc.entries.len() > limit as usize {
            return Err(ValidationError::TooManyBindings {
                count: desc.entries.len(),
                limit,
            }
            .into());
        }

        let mut seen = HashSet::new();
        for entry in desc.entries {
            if !seen.insert(entry.binding) {
                return Err(ValidationError::DuplicateBinding(entry.binding).into());
            }
        }

        Ok(Self::from_entries(device, desc.label, desc.entries.to_vec()))
    }

    /// Builds a layout from already validated entries.
    pub(crate) fn from_entries(
        device: &Arc<DeviceShared>,
        label: Option<&str>,
        mut entries: Vec<BindGroupLayoutEntry>,
    ) -> Self {
        entries.sort_by_key(|entry| entry.binding);
        let tracked = Tracked::new(device, ResourceKind::BindGroupLayout, label);
        log::debug!(
            "bind group layout '{}' created with {} entries",
            tracked.name(),
            entries.len()
        );
        Self {
            inner: Arc::new(BindGroupLayoutInner { tracked, entries }),
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.tracked.label()
    }

    /// Slots in ascending binding order.
    pub fn entries(&self) -> &[BindGroupLayoutEntry] {
        &self.inner.entries
    }

    pub fn entry(&self, binding: u32) -> Option<&BindGroupLayoutEntry> {
        self.inner
            .entries
            .binary_search_by_key(&binding, |entry| entry.binding)
            .ok()
            .map(|index| &self.inner.entries[index])
    }

    /// Layouts are compatible when they are the same object or declare the same slots.
    pub fn is_compatible(&self, other: &BindGroupLayout) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner.entries == other.inner.entries
    }

    pub(crate) fn device(&self) -> &Arc<DeviceShared> {
        self.inner.tracked.device()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineLayoutDescriptor<'a> {
    pub label: Option<&'a str>,
    /// Layout for group `i` at index `i`.
    pub bind_group_layouts: &'a [&'a BindGroupLayout],
}

struct PipelineLayoutInner {
    tracked: Tracked,
    groups: Vec<BindGroupLayout>,
}

/// Ordered bind group layouts of a pipeline.
#[derive(Clone)]
pub struct PipelineLayout {
    inner: Arc<PipelineLayoutInner>,
}

impl fmt::Debug for PipelineLayout {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PipelineLayout")
            .field("label", &self.inner.tracked.label())
            .field("groups", &self.inner.groups.len())
            .finish()
    }
}

impl PipelineLayout {
    pub(crate) fn create(
        device: &Arc<DeviceShared>,
        desc: &PipelineLayoutDescriptor<'_>,
    ) -> GpuResult<Self> {
        device.check_alive()?;

        let limit = device.limits().max_bind_groups;
        if desc.bind_group_layouts.len() > limit as usize {
            return Err(ValidationError::TooManyBindGroups {
                count: desc.bind_group_layouts.len(),
                limit,
            }
            .into());
        }
        for layout in desc.bind_group_layouts {
            device.check_same(layout.device())?;
        }

        let tracked = Tracked::new(device, ResourceKind::PipelineLayout, desc.label);
        log::debug!(
            "pipeline layout '{}' created with {} groups",
            tracked.name(),
            desc.bind_group_layouts.len()
        );

        Ok(Self {
            inner: Arc::new(PipelineLayoutInner {
                tracked,
                groups: desc
                    .bind_group_layouts
                    .iter()
                    .map(|layout| (*layout).clone())
                    .collect(),
            }),
        })
    }

    pub fn bind_group_layouts(&self) -> &[BindGroupLayout] {
        &self.inner.groups
    }

    pub(crate) fn device(&self) -> &Arc<DeviceShared> {
        self.inner.tracked.device()
    }
}

/// Buffer range bound to a slot.
#[derive(Debug, Copy, Clone)]
pub struct BufferBinding<'a> {
    pub buffer: &'a Buffer,
    pub offset: u64,
    /// `None` binds to the end of the buffer.
    pub size: Option<NonZeroU64>,
}

#[derive(Debug, Copy, Clone)]
pub enum BindingResource<'a> {
    Buffer(BufferBinding<'a>),
    Sampler(&'a Sampler),
    TextureView(&'a TextureView),
}

#[derive(Debug, Copy, Clone)]
pub struct BindGroupEntry<'a> {
    pub binding: u32,
    pub resource: BindingResource<'a>,
}

#[derive(Debug, Clone)]
pub struct BindGroupDescriptor<'a> {
    pub label: Option<&'a str>,
    pub layout: &'a BindGroupLayout,
    pub entries: &'a [BindGroupEntry<'a>],
}

pub(crate) enum BoundResource {
    Buffer {
        buffer: Buffer,
        offset: u64,
        size: u64,
    },
    Sampler(Sampler),
    TextureView(TextureView),
}

struct BindGroupInner {
    tracked: Tracked,
    layout: BindGroupLayout,
    resources: Vec<(u32, BoundResource)>,
}

/// Concrete resources for every slot of a layout.
#[derive(Clone)]
pub struct BindGroup {
    inner: Arc<BindGroupInner>,
}

impl fmt::Debug for BindGroup {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BindGroup")
            .field("label", &self.inner.tracked.label())
            .field("layout", &self.inner.layout.label())
            .field("entries", &self.inner.resources.len())
            .finish()
    }
}

impl BindGroup {
    pub(crate) fn create(device: &Arc<DeviceShared>, desc: &BindGroupDescriptor<'_>) -> GpuResult<Self> {
        device.check_alive()?;
        device.check_same(desc.layout.device())?;

        let slots = desc.layout.entries();
        if desc.entries.len() != slots.len() {
            return Err(ValidationError::BindGroupEntryCount {
                expected: slots.len(),
                actual: desc.entries.len(),
            }
            .into());
        }

        let mut seen = HashSet::new();
        let mut resources = Vec::with_capacity(desc.entries.len());
        for entry in desc.entries {
            if !seen.insert(entry.binding) {
                return Err(ValidationError::DuplicateBinding(entry.binding).into());
            }
            let slot = desc
                .layout
                .entry(entry.binding)
                .ok_or(ValidationError::UnknownBinding(entry.binding))?;
            let bound = bind_resource(device, slot, &entry.resource)?;
            resources.push((entry.binding, bound));
        }
        resources.sort_by_key(|(binding, _)| *binding);

        let tracked = Tracked::new(device, ResourceKind::BindGroup, desc.label);
        log::debug!("bind group '{}' created", tracked.name());

        Ok(Self {
            inner: Arc::new(BindGroupInner {
                tracked,
                layout: desc.layout.clone(),
                resources,
            }),
        })
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.tracked.label()
    }

    pub fn layout(&self) -> &BindGroupLayout {
        &self.inner.layout
    }

    pub(crate) fn device(&self) -> &Arc<DeviceShared> {
        self.inner.tracked.device()
    }

    pub(crate) fn buffers(&self) -> impl Iterator<Item = &Buffer> {
        self.inner.resources.iter().filter_map(|(_, resource)| match resource {
            BoundResource::Buffer { buffer, .. } => Some(buffer),
            _ => None,
        })
    }

    pub(crate) fn texture_views(&self) -> impl Iterator<Item = &TextureView> {
        self.inner.resources.iter().filter_map(|(_, resource)| match resource {
            BoundResource::TextureView(view) => Some(view),
            _ => None,
        })
    }

    #[cfg(test)]
    pub(crate) fn bound_buffer_range(&self, binding: u32) -> Option<(u64, u64)> {
        self.inner
            .resources
            .iter()
            .find_map(|(b, resource)| match resource {
                BoundResource::Buffer { offset, size, .. } if *b == binding => Some((*offset, *size)),
                _ => None,
            })
    }

    /// Fails if a bound resource cannot be used by queue work.
    pub(crate) fn check_submittable(&self) -> GpuResult<()> {
        for buffer in self.buffers() {
            buffer.check_submittable()?;
        }
        for view in self.texture_views() {
            view.texture().check_not_destroyed()?;
        }
        Ok(())
    }
}

fn bind_resource(
    device: &Arc<DeviceShared>,
    slot: &BindGroupLayoutEntry,
    resource: &BindingResource<'_>,
) -> GpuResult<BoundResource> {
    let mismatch = || ValidationError::BindingResourceType {
        binding: slot.binding,
        expected: slot.ty.to_string(),
    };

    match (&slot.ty, resource) {
        (
            BindingType::Buffer {
                ty,
                min_binding_size,
            },
            BindingResource::Buffer(binding),
        ) => {
            let buffer = binding.buffer;
            device.check_same(buffer.device())?;

            let limits = device.limits();
            let (usage, alignment) = match ty {
                wgpu::BufferBindingType::Uniform => (
                    wgpu::BufferUsages::UNIFORM,
                    limits.min_uniform_buffer_offset_alignment,
                ),
                wgpu::BufferBindingType::Storage { .. } => (
                    wgpu::BufferUsages::STORAGE,
                    limits.min_storage_buffer_offset_alignment,
                ),
            };
            buffer.check_usage(usage)?;
            crate::queue::check_aligned("binding offset", binding.offset, u64::from(alignment))?;

            let size = match binding.size {
                Some(size) => size.get(),
                None => buffer.size().saturating_sub(binding.offset),
            };
            buffer.check_range(binding.offset, size)?;

            let min = min_binding_size.map_or(1, NonZeroU64::get);
            if size < min {
                return Err(ValidationError::BindingTooSmall {
                    binding: slot.binding,
                    size,
                    min,
                }
                .into());
            }

            Ok(BoundResource::Buffer {
                buffer: buffer.clone(),
                offset: binding.offset,
                size,
            })
        }
        (BindingType::Sampler(kind), BindingResource::Sampler(sampler)) => {
            device.check_same(sampler.device())?;
            let fits = match kind {
                wgpu::SamplerBindingType::Comparison => sampler.is_comparison(),
                wgpu::SamplerBindingType::Filtering => !sampler.is_comparison(),
                wgpu::SamplerBindingType::NonFiltering => {
                    !sampler.is_comparison() && !sampler.is_filtering()
                }
            };
            if !fits {
                return Err(mismatch().into());
            }
            Ok(BoundResource::Sampler((*sampler).clone()))
        }
        (
            BindingType::Texture {
                sample_type,
                view_dimension,
                multisampled,
            },
            BindingResource::TextureView(view),
        ) => {
            device.check_same(view.device())?;
            view.texture().check_not_destroyed()?;
            view.texture()
                .check_usage(wgpu::TextureUsages::TEXTURE_BINDING)?;

            let format_sample = view.format().sample_type(None, None);
            let fits = view.dimension() == *view_dimension
                && (view.sample_count() > 1) == *multisampled
                && format_sample.is_some_and(|format| sample_type_fits(*sample_type, format));
            if !fits {
                return Err(mismatch().into());
            }
            Ok(BoundResource::TextureView((*view).clone()))
        }
        _ => Err(mismatch().into()),
    }
}

fn sample_type_fits(slot: wgpu::TextureSampleType, format: wgpu::TextureSampleType) -> bool {
    use wgpu::TextureSampleType as S;

    match (slot, format) {
        (S::Float { filterable: true }, S::Float { filterable }) => filterable,
        (S::Float { filterable: false }, S::Float { .. } | S::Depth) => true,
        (S::Depth, S::Depth) => true,
        (S::Sint, S::Sint) | (S::Uint, S::Uint) => true,
        _ => false,
    }
}
