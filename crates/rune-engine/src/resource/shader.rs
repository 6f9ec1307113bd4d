use std::error::Error as _;
use std::num::NonZeroU64;
use std::sync::Arc;

use crate::device::{
    CompileError, DeviceShared, GpuResult, ResourceKind, SourceLocation, Tracked, ValidationError,
};

use super::binding::BindingType;

/// Entry point the module is expected to be used with.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CompilationHint<'a> {
    pub entry_point: &'a str,
}

/// Parameters for [`Device::create_shader_module`](crate::device::Device::create_shader_module).
#[derive(Debug, Clone, Default)]
pub struct ShaderModuleDescriptor<'a> {
    pub label: Option<&'a str>,
    /// WGSL source.
    pub code: &'a str,
    /// Advisory; hints naming missing entry points only produce a warning.
    pub hints: &'a [CompilationHint<'a>],
}

/// Scalar class of a stage input or output.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ScalarKind {
    Float,
    Sint,
    Uint,
    Bool,
}

/// A user-defined `@location` on a stage interface.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct StageIo {
    pub location: u32,
    pub kind: ScalarKind,
}

/// Reflection of one entry point.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPointInfo {
    pub name: String,
    pub stage: wgpu::ShaderStages,
    pub inputs: Vec<StageIo>,
    pub outputs: Vec<StageIo>,
    /// `(group, binding)` pairs statically used by the entry point.
    pub resources: Vec<(u32, u32)>,
}

/// A resource binding declared at module scope.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ShaderBinding {
    pub group: u32,
    pub binding: u32,
    /// `None` for resource kinds this device cannot bind (storage textures, binding arrays).
    pub ty: Option<BindingType>,
}

struct ShaderModuleInner {
    tracked: Tracked,
    entry_points: Vec<EntryPointInfo>,
    bindings: Vec<ShaderBinding>,
    hints: Vec<String>,
}

/// Compiled and reflected WGSL.
#[derive(Clone)]
pub struct ShaderModule {
    inner: Arc<ShaderModuleInner>,
}

impl std::fmt::Debug for ShaderModule {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ShaderModule")
            .field("label", &self.inner.tracked.label())
            .field("entry_points", &self.inner.entry_points.len())
            .finish()
    }
}

impl ShaderModule {
    pub(crate) fn create(
        device: &Arc<DeviceShared>,
        desc: &ShaderModuleDescriptor<'_>,
    ) -> GpuResult<Self> {
        device.check_alive()?;

        let module = naga::front::wgsl::parse_str(desc.code).map_err(|err| {
            compile_error(desc.label, err.message().to_owned(), err.location(desc.code))
        })?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        let info = validator.validate(&module).map_err(|err| {
            let mut message = err.as_inner().to_string();
            let mut source = err.as_inner().source();
            while let Some(cause) = source {
                message.push_str(": ");
                message.push_str(&cause.to_string());
                source = cause.source();
            }
            compile_error(desc.label, message, err.location(desc.code))
        })?;

        let bindings = reflect_bindings(&module);
        let entry_points = reflect_entry_points(&module, &info);

        for hint in desc.hints {
            if !entry_points.iter().any(|ep| ep.name == hint.entry_point) {
                log::warn!(
                    "shader '{}': hint names unknown entry point '{}'",
                    desc.label.unwrap_or("<unnamed>"),
                    hint.entry_point
                );
            }
        }

        let tracked = Tracked::new(device, ResourceKind::ShaderModule, desc.label);
        log::debug!(
            "shader module '{}' compiled: {} entry points, {} bindings",
            tracked.name(),
            entry_points.len(),
            bindings.len()
        );

        Ok(Self {
            inner: Arc::new(ShaderModuleInner {
                tracked,
                entry_points,
                bindings,
                hints: desc.hints.iter().map(|h| h.entry_point.to_owned()).collect(),
            }),
        })
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.tracked.label()
    }

    pub fn entry_points(&self) -> &[EntryPointInfo] {
        &self.inner.entry_points
    }

    pub fn bindings(&self) -> &[ShaderBinding] {
        &self.inner.bindings
    }

    pub fn hints(&self) -> &[String] {
        &self.inner.hints
    }

    pub fn binding(&self, group: u32, binding: u32) -> Option<&ShaderBinding> {
        self.inner
            .bindings
            .iter()
            .find(|b| b.group == group && b.binding == binding)
    }

    /// Resolves the entry point for `stage`.
    ///
    /// Without a name the module must contain exactly one entry point of that stage.
    pub fn entry_point(
        &self,
        stage: wgpu::ShaderStages,
        name: Option<&str>,
    ) -> GpuResult<&EntryPointInfo> {
        let mut candidates = self
            .inner
            .entry_points
            .iter()
            .filter(|ep| ep.stage == stage && name.is_none_or(|name| ep.name == name));

        let found = candidates.next().ok_or_else(|| ValidationError::EntryPointNotFound {
            name: name.map(str::to_owned),
            stage,
        })?;
        if name.is_none() && candidates.next().is_some() {
            return Err(ValidationError::AmbiguousEntryPoint { stage }.into());
        }
        Ok(found)
    }

    pub(crate) fn device(&self) -> &Arc<DeviceShared> {
        self.inner.tracked.device()
    }
}

fn compile_error(
    label: Option<&str>,
    message: String,
    location: Option<naga::SourceLocation>,
) -> CompileError {
    let location = location.map(|loc| SourceLocation {
        line: loc.line_number,
        column: loc.line_position,
        offset: loc.offset,
        length: loc.length,
    });
    let err = CompileError {
        label: label.map(str::to_owned),
        message,
        location,
    };
    log::warn!("{err}");
    err
}

fn reflect_bindings(module: &naga::Module) -> Vec<ShaderBinding> {
    let mut bindings: Vec<ShaderBinding> = module
        .global_variables
        .iter()
        .filter_map(|(_, var)| {
            let slot = var.binding.as_ref()?;
            Some(ShaderBinding {
                group: slot.group,
                binding: slot.binding,
                ty: binding_type(module, var),
            })
        })
        .collect();
    bindings.sort_by_key(|b| (b.group, b.binding));
    bindings
}

fn binding_type(module: &naga::Module, var: &naga::GlobalVariable) -> Option<BindingType> {
    let inner = &module.types[var.ty].inner;
    match var.space {
        naga::AddressSpace::Uniform => Some(BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            min_binding_size: NonZeroU64::new(u64::from(inner.size(module.to_ctx()))),
        }),
        naga::AddressSpace::Storage { access } => Some(BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage {
                read_only: !access.contains(naga::StorageAccess::STORE),
            },
            min_binding_size: NonZeroU64::new(u64::from(inner.size(module.to_ctx()))),
        }),
        naga::AddressSpace::Handle => match *inner {
            naga::TypeInner::Sampler { comparison } => Some(BindingType::Sampler(if comparison {
                wgpu::SamplerBindingType::Comparison
            } else {
                wgpu::SamplerBindingType::Filtering
            })),
            naga::TypeInner::Image {
                dim,
                arrayed,
                ref class,
            } => {
                let (sample_type, multisampled) = match *class {
                    naga::ImageClass::Sampled { kind, multi } => {
                        let sample_type = match kind {
                            naga::ScalarKind::Float => {
                                wgpu::TextureSampleType::Float { filterable: !multi }
                            }
                            naga::ScalarKind::Sint => wgpu::TextureSampleType::Sint,
                            naga::ScalarKind::Uint => wgpu::TextureSampleType::Uint,
                            _ => return None,
                        };
                        (sample_type, multi)
                    }
                    naga::ImageClass::Depth { multi } => (wgpu::TextureSampleType::Depth, multi),
                    _ => return None,
                };
                let view_dimension = match (dim, arrayed) {
                    (naga::ImageDimension::D1, false) => wgpu::TextureViewDimension::D1,
                    (naga::ImageDimension::D2, false) => wgpu::TextureViewDimension::D2,
                    (naga::ImageDimension::D2, true) => wgpu::TextureViewDimension::D2Array,
                    (naga::ImageDimension::D3, false) => wgpu::TextureViewDimension::D3,
                    (naga::ImageDimension::Cube, false) => wgpu::TextureViewDimension::Cube,
                    (naga::ImageDimension::Cube, true) => wgpu::TextureViewDimension::CubeArray,
                    _ => return None,
                };
                Some(BindingType::Texture {
                    sample_type,
                    view_dimension,
                    multisampled,
                })
            }
            _ => None,
        },
        _ => None,
    }
}

fn reflect_entry_points(module: &naga::Module, info: &naga::valid::ModuleInfo) -> Vec<EntryPointInfo> {
    module
        .entry_points
        .iter()
        .enumerate()
        .filter_map(|(index, ep)| {
            let stage = match ep.stage {
                naga::ShaderStage::Vertex => wgpu::ShaderStages::VERTEX,
                naga::ShaderStage::Fragment => wgpu::ShaderStages::FRAGMENT,
                naga::ShaderStage::Compute => wgpu::ShaderStages::COMPUTE,
                _ => return None,
            };

            let mut inputs = Vec::new();
            for argument in &ep.function.arguments {
                collect_io(module, argument.ty, argument.binding.as_ref(), &mut inputs);
            }
            let mut outputs = Vec::new();
            if let Some(result) = &ep.function.result {
                collect_io(module, result.ty, result.binding.as_ref(), &mut outputs);
            }

            let usage = info.get_entry_point(index);
            let resources = module
                .global_variables
                .iter()
                .filter(|(handle, _)| !usage[*handle].is_empty())
                .filter_map(|(_, var)| var.binding.as_ref().map(|b| (b.group, b.binding)))
                .collect();

            Some(EntryPointInfo {
                name: ep.name.clone(),
                stage,
                inputs,
                outputs,
                resources,
            })
        })
        .collect()
}

/// Collects `@location` bindings, descending into struct members.
fn collect_io(
    module: &naga::Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&naga::Binding>,
    out: &mut Vec<StageIo>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => {
            if let Some(kind) = scalar_kind(&module.types[ty].inner) {
                out.push(StageIo {
                    location: *location,
                    kind,
                });
            }
        }
        Some(_) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_io(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

fn scalar_kind(inner: &naga::TypeInner) -> Option<ScalarKind> {
    let scalar = match *inner {
        naga::TypeInner::Scalar(scalar) => scalar,
        naga::TypeInner::Vector { scalar, .. } => scalar,
        _ => return None,
    };
    match scalar.kind {
        naga::ScalarKind::Float | naga::ScalarKind::AbstractFloat => Some(ScalarKind::Float),
        naga::ScalarKind::Sint | naga::ScalarKind::AbstractInt => Some(ScalarKind::Sint),
        naga::ScalarKind::Uint => Some(ScalarKind::Uint),
        naga::ScalarKind::Bool => Some(ScalarKind::Bool),
    }
}
