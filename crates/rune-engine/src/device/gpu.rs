use anyhow::{Context, Result};

use crate::queue::Queue;

use super::context::Device;
use super::init::{DeviceDescriptor, GpuInit, RequestAdapterOptions};
use super::instance::{AdapterInfo, Instance};
use super::surface::{
    Surface, SurfaceConfiguration, SurfaceError, SurfaceTexture, choose_surface_format,
};

/// Owns the device stack and the surface configuration.
///
/// This type is the host-side rendering context:
/// - creates and stores Instance/Adapter/Device/Queue
/// - creates and configures the Surface (swapchain)
/// - acquires frames and maps surface errors to loop decisions
pub struct Gpu {
    /// Instance used to create the adapter.
    instance: Instance,

    adapter_info: AdapterInfo,

    device: Device,

    queue: Queue,

    surface: Surface,

    /// Active surface configuration.
    config: SurfaceConfiguration,

    /// Current drawable size in physical pixels.
    size: (u32, u32),
}

impl std::fmt::Debug for Gpu {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Gpu")
            .field("instance", &self.instance)
            .field("adapter", &self.adapter_info.name)
            .field("size", &self.size)
            .field("format", &self.config.format)
            .finish()
    }
}

/// High-level response after a surface error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; rendering may resume next frame.
    Reconfigured,
    /// Transient error; skip the current frame.
    SkipFrame,
    /// Fatal error (commonly OOM or a lost device); terminate gracefully.
    Fatal,
}

impl Gpu {
    /// Creates a GPU context for a drawable of `size` physical pixels.
    ///
    /// Adapter/device acquisition is asynchronous; hosts drive it with `pollster`.
    pub async fn new(size: (u32, u32), init: GpuInit) -> Result<Self> {
        anyhow::ensure!(size.0 > 0 && size.1 > 0, "drawable has zero size");

        let instance = Instance::new();
        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: init.power_preference,
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&DeviceDescriptor {
                label: init.device_label.as_deref(),
                required_limits: init.required_limits.clone(),
            })
            .await
            .context("failed to create device/queue")?;

        let surface = Surface::new();
        let caps = surface.get_capabilities(&adapter);
        let format = choose_surface_format(&caps, init.prefer_srgb)
            .context("no supported surface formats")?;

        let config = SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.0,
            height: size.1,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };

        surface
            .configure(&device, &config)
            .context("failed to configure surface")?;

        log::info!(
            "gpu ready: {} ({:?}), surface {}x{} {:?}",
            adapter.info().name,
            adapter.info().device_type,
            size.0,
            size.1,
            format
        );

        Ok(Gpu {
            instance,
            adapter_info: adapter.info().clone(),
            device,
            queue,
            surface,
            config,
            size,
        })
    }

    /// Returns the active surface format.
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Returns the current drawable size (physical pixels).
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn adapter_info(&self) -> &AdapterInfo {
        &self.adapter_info
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Reconfigures the surface after a resize.
    ///
    /// A surface cannot be configured with a 0x0 size; in that case only the
    /// stored size changes and configuration is deferred.
    pub fn resize(&mut self, new_size: (u32, u32)) {
        self.size = new_size;
        if new_size.0 == 0 || new_size.1 == 0 {
            return;
        }

        self.config.width = new_size.0;
        self.config.height = new_size.1;
        if let Err(err) = self.surface.configure(&self.device, &self.config) {
            log::warn!("surface reconfigure failed: {err}");
        }
    }

    /// Acquires the texture for the next frame.
    pub fn current_texture(&self) -> std::result::Result<SurfaceTexture, SurfaceError> {
        self.surface.get_current_texture()
    }

    /// Converts a `SurfaceError` into a higher-level action.
    pub fn handle_surface_error(&mut self, err: SurfaceError) -> SurfaceErrorAction {
        match err {
            SurfaceError::Lost if self.device.is_lost() => SurfaceErrorAction::Fatal,
            SurfaceError::Lost | SurfaceError::Outdated | SurfaceError::NotConfigured => {
                if self.size.0 == 0 || self.size.1 == 0 {
                    return SurfaceErrorAction::SkipFrame;
                }
                match self.surface.configure(&self.device, &self.config) {
                    Ok(()) => SurfaceErrorAction::Reconfigured,
                    Err(err) => {
                        log::error!("surface reconfigure failed: {err}");
                        SurfaceErrorAction::Fatal
                    }
                }
            }
            SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
            SurfaceError::Timeout => SurfaceErrorAction::SkipFrame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu(size: (u32, u32)) -> Gpu {
        pollster::block_on(Gpu::new(size, GpuInit::default())).unwrap()
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(pollster::block_on(Gpu::new((0, 720), GpuInit::default())).is_err());
    }

    #[test]
    fn frames_match_drawable_size() {
        let mut gpu = gpu((320, 200));
        assert_eq!(gpu.surface_format(), wgpu::TextureFormat::Bgra8UnormSrgb);

        let frame = gpu.current_texture().unwrap();
        assert_eq!((frame.texture.width(), frame.texture.height()), (320, 200));
        frame.present();

        gpu.resize((640, 400));
        let frame = gpu.current_texture().unwrap();
        assert_eq!(frame.texture.width(), 640);
    }

    #[test]
    fn outdated_surface_is_reconfigured() {
        let mut gpu = gpu((64, 64));
        gpu.surface().mark_outdated();

        let err = gpu.current_texture().unwrap_err();
        assert_eq!(gpu.handle_surface_error(err), SurfaceErrorAction::Reconfigured);
        assert!(gpu.current_texture().is_ok());
    }

    #[test]
    fn lost_device_is_fatal() {
        let mut gpu = gpu((64, 64));
        gpu.device().destroy();

        let err = gpu.current_texture().unwrap_err();
        assert_eq!(gpu.handle_surface_error(err), SurfaceErrorAction::Fatal);
    }
}
