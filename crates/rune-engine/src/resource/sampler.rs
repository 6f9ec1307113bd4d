use std::sync::Arc;

use crate::device::{DeviceShared, GpuResult, ResourceKind, Tracked, ValidationError};

/// Parameters for [`Device::create_sampler`](crate::device::Device::create_sampler).
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDescriptor<'a> {
    pub label: Option<&'a str>,
    pub address_mode_u: wgpu::AddressMode,
    pub address_mode_v: wgpu::AddressMode,
    pub address_mode_w: wgpu::AddressMode,
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mipmap_filter: wgpu::FilterMode,
    pub lod_min_clamp: f32,
    pub lod_max_clamp: f32,
    /// Turns the sampler into a comparison sampler.
    pub compare: Option<wgpu::CompareFunction>,
    pub anisotropy_clamp: u16,
}

impl Default for SamplerDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            compare: None,
            anisotropy_clamp: 1,
        }
    }
}

struct SamplerInner {
    tracked: Tracked,
    filtering: bool,
    compare: Option<wgpu::CompareFunction>,
}

/// Filtering and addressing state.
#[derive(Clone)]
pub struct Sampler {
    inner: Arc<SamplerInner>,
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("label", &self.inner.tracked.label())
            .field("filtering", &self.inner.filtering)
            .field("compare", &self.inner.compare)
            .finish()
    }
}

impl Sampler {
    pub(crate) fn create(device: &Arc<DeviceShared>, desc: &SamplerDescriptor<'_>) -> GpuResult<Self> {
        device.check_alive()?;

        let (min, max) = (desc.lod_min_clamp, desc.lod_max_clamp);
        if !(min >= 0.0 && max >= min) {
            return Err(ValidationError::InvalidLodClamp { min, max }.into());
        }

        let filtering = [desc.mag_filter, desc.min_filter, desc.mipmap_filter]
            .contains(&wgpu::FilterMode::Linear);
        if desc.anisotropy_clamp == 0 || desc.anisotropy_clamp > 16 {
            return Err(ValidationError::InvalidAnisotropy(desc.anisotropy_clamp).into());
        }
        if desc.anisotropy_clamp > 1
            && [desc.mag_filter, desc.min_filter, desc.mipmap_filter]
                .contains(&wgpu::FilterMode::Nearest)
        {
            return Err(ValidationError::InvalidAnisotropy(desc.anisotropy_clamp).into());
        }

        let tracked = Tracked::new(device, ResourceKind::Sampler, desc.label);
        log::debug!("sampler '{}' created", tracked.name());

        Ok(Self {
            inner: Arc::new(SamplerInner {
                tracked,
                filtering,
                compare: desc.compare,
            }),
        })
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.tracked.label()
    }

    /// Whether any filter is linear.
    pub fn is_filtering(&self) -> bool {
        self.inner.filtering
    }

    pub fn is_comparison(&self) -> bool {
        self.inner.compare.is_some()
    }

    pub(crate) fn device(&self) -> &Arc<DeviceShared> {
        self.inner.tracked.device()
    }
}
