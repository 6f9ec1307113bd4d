use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::queue::Queue;

use super::context::Device;
use super::error::{GpuError, GpuResult};
use super::init::{DeviceDescriptor, RequestAdapterOptions};

/// Description of the physical adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub id: u64,
    pub name: String,
    pub device_type: wgpu::DeviceType,
    pub backend: &'static str,
}

/// Entry point for adapter acquisition.
#[derive(Debug, Default)]
pub struct Instance {
    next_adapter: AtomicU64,
}

impl Instance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects an adapter.
    ///
    /// Asynchronous for parity with hardware backends; hosts drive it with
    /// `pollster::block_on`.
    pub async fn request_adapter(&self, options: &RequestAdapterOptions) -> GpuResult<Adapter> {
        let id = self.next_adapter.fetch_add(1, Ordering::Relaxed) + 1;
        let device_type = if options.force_fallback_adapter {
            wgpu::DeviceType::Cpu
        } else {
            wgpu::DeviceType::VirtualGpu
        };

        let info = AdapterInfo {
            id,
            name: format!("rune headless adapter {id}"),
            device_type,
            backend: "headless",
        };
        log::debug!("adapter selected: {} ({:?})", info.name, options.power_preference);

        Ok(Adapter {
            inner: Arc::new(AdapterInner {
                info,
                limits: wgpu::Limits::default(),
                consumed: AtomicBool::new(false),
            }),
        })
    }
}

struct AdapterInner {
    info: AdapterInfo,
    limits: wgpu::Limits,
    consumed: AtomicBool,
}

/// Handle to a physical GPU. Spawns exactly one [`Device`].
#[derive(Clone)]
pub struct Adapter {
    inner: Arc<AdapterInner>,
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Adapter").field("info", &self.inner.info).finish()
    }
}

impl Adapter {
    pub fn info(&self) -> &AdapterInfo {
        &self.inner.info
    }

    pub fn limits(&self) -> &wgpu::Limits {
        &self.inner.limits
    }

    /// Creates the logical device and its queue.
    ///
    /// A second call fails with `AdapterConsumed`.
    pub async fn request_device(&self, desc: &DeviceDescriptor<'_>) -> GpuResult<(Device, Queue)> {
        if !desc.required_limits.check_limits(&self.inner.limits) {
            return Err(GpuError::LimitsExceeded);
        }

        if self.inner.consumed.swap(true, Ordering::AcqRel) {
            return Err(GpuError::AdapterConsumed);
        }

        Device::spawn(desc.label, desc.required_limits.clone())
    }
}
