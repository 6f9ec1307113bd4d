/// Initialization parameters for the GPU layer.
///
/// Keep this structure stable and minimal. Add configuration flags only when a
/// concrete host requirement exists.
#[derive(Debug, Clone)]
pub struct GpuInit {
    /// Prefer an sRGB surface format when available.
    ///
    /// sRGB is typically required for correct color output.
    pub prefer_srgb: bool,

    /// Adapter selection preference forwarded to [`RequestAdapterOptions`].
    pub power_preference: wgpu::PowerPreference,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,

    /// Debug label for the device.
    pub device_label: Option<String>,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            prefer_srgb: true,
            power_preference: wgpu::PowerPreference::HighPerformance,
            required_limits: wgpu::Limits::default(),
            device_label: Some("rune device".to_owned()),
        }
    }
}

/// Options for [`Instance::request_adapter`](super::Instance::request_adapter).
#[derive(Debug, Clone, Default)]
pub struct RequestAdapterOptions {
    pub power_preference: wgpu::PowerPreference,
    pub force_fallback_adapter: bool,
}

/// Options for [`Adapter::request_device`](super::Adapter::request_device).
#[derive(Debug, Clone, Default)]
pub struct DeviceDescriptor<'a> {
    pub label: Option<&'a str>,
    /// Must not exceed the adapter's limits.
    pub required_limits: wgpu::Limits,
}
