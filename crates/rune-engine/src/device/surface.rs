use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::resource::{Texture, TextureDescriptor, TextureView, TextureViewDescriptor};

use super::context::{Device, DeviceShared};
use super::error::{GpuError, GpuResult, ValidationError};
use super::instance::Adapter;

/// Formats a headless surface can present, in preference order.
const SURFACE_FORMATS: [wgpu::TextureFormat; 4] = [
    wgpu::TextureFormat::Bgra8UnormSrgb,
    wgpu::TextureFormat::Bgra8Unorm,
    wgpu::TextureFormat::Rgba8UnormSrgb,
    wgpu::TextureFormat::Rgba8Unorm,
];

/// What a surface supports on a given adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    pub formats: Vec<wgpu::TextureFormat>,
    pub present_modes: Vec<wgpu::PresentMode>,
    pub alpha_modes: Vec<wgpu::CompositeAlphaMode>,
    pub usages: wgpu::TextureUsages,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceConfiguration {
    pub usage: wgpu::TextureUsages,
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
    pub present_mode: wgpu::PresentMode,
    pub alpha_mode: wgpu::CompositeAlphaMode,
    pub view_formats: Vec<wgpu::TextureFormat>,
}

/// Failure to acquire the next frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SurfaceError {
    #[error("surface has not been configured")]
    NotConfigured,
    #[error("surface is outdated and must be reconfigured")]
    Outdated,
    #[error("surface was lost")]
    Lost,
    #[error("previous frame has not been presented or dropped")]
    Timeout,
    #[error("out of memory while acquiring the frame")]
    OutOfMemory,
}

struct SurfaceState {
    device: Option<Arc<DeviceShared>>,
    config: Option<SurfaceConfiguration>,
    outdated: bool,
    acquired: bool,
    presented: u64,
    discarded: u64,
}

/// Host-provided swap surface.
///
/// Hands out one [`SurfaceTexture`] at a time. The frame is presented with
/// [`SurfaceTexture::present`] or discarded when dropped.
#[derive(Clone)]
pub struct Surface {
    state: Arc<Mutex<SurfaceState>>,
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Surface")
            .field("config", &state.config)
            .field("presented", &state.presented)
            .finish()
    }
}

impl Default for Surface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SurfaceState {
                device: None,
                config: None,
                outdated: false,
                acquired: false,
                presented: 0,
                discarded: 0,
            })),
        }
    }

    pub fn get_capabilities(&self, _adapter: &Adapter) -> SurfaceCapabilities {
        SurfaceCapabilities {
            formats: SURFACE_FORMATS.to_vec(),
            present_modes: vec![
                wgpu::PresentMode::Fifo,
                wgpu::PresentMode::Mailbox,
                wgpu::PresentMode::Immediate,
            ],
            alpha_modes: vec![wgpu::CompositeAlphaMode::Opaque],
            usages: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
        }
    }

    /// Binds the surface to `device` with `config`. Clears an outdated state.
    pub fn configure(&self, device: &Device, config: &SurfaceConfiguration) -> GpuResult<()> {
        device.shared().check_alive()?;

        if config.width == 0 || config.height == 0 {
            return Err(ValidationError::InvalidTextureExtent {
                width: config.width,
                height: config.height,
                depth: 1,
                dimension: wgpu::TextureDimension::D2,
            }
            .into());
        }
        if !SURFACE_FORMATS.contains(&config.format) {
            return Err(ValidationError::FormatUsage {
                format: config.format,
                usage: config.usage,
            }
            .into());
        }
        if !config.usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT) {
            return Err(ValidationError::MissingTextureUsage {
                label: "surface".to_owned(),
                missing: wgpu::TextureUsages::RENDER_ATTACHMENT,
            }
            .into());
        }

        let mut state = self.state.lock();
        state.device = Some(Arc::clone(device.shared()));
        state.config = Some(config.clone());
        state.outdated = false;
        log::debug!(
            "surface configured: {}x{} {:?} {:?}",
            config.width,
            config.height,
            config.format,
            config.present_mode
        );
        Ok(())
    }

    /// Marks the surface outdated, as the host does after a resize.
    pub fn mark_outdated(&self) {
        self.state.lock().outdated = true;
    }

    pub fn config(&self) -> Option<SurfaceConfiguration> {
        self.state.lock().config.clone()
    }

    /// Acquires the texture for the next frame.
    pub fn get_current_texture(&self) -> Result<SurfaceTexture, SurfaceError> {
        let mut state = self.state.lock();
        let (Some(device), Some(config)) = (state.device.clone(), state.config.clone()) else {
            return Err(SurfaceError::NotConfigured);
        };
        if device.check_alive().is_err() {
            return Err(SurfaceError::Lost);
        }
        if state.outdated {
            return Err(SurfaceError::Outdated);
        }
        if state.acquired {
            return Err(SurfaceError::Timeout);
        }

        let frame = state.presented + state.discarded;
        let label = format!("surface frame {frame}");
        let texture = Texture::create(
            &device,
            &TextureDescriptor {
                label: Some(&label),
                size: wgpu::Extent3d {
                    width: config.width,
                    height: config.height,
                    depth_or_array_layers: 1,
                },
                format: config.format,
                usage: config.usage,
                view_formats: &config.view_formats,
                ..Default::default()
            },
        )
        .map_err(|err| match err {
            GpuError::UseAfterDeviceLost | GpuError::DeviceLost { .. } => SurfaceError::Lost,
            _ => SurfaceError::OutOfMemory,
        })?;

        state.acquired = true;
        Ok(SurfaceTexture {
            texture,
            surface: Arc::clone(&self.state),
            finished: false,
        })
    }

    /// Frames presented so far.
    pub fn presented_frames(&self) -> u64 {
        self.state.lock().presented
    }

    /// Frames acquired and then dropped without presenting.
    pub fn discarded_frames(&self) -> u64 {
        self.state.lock().discarded
    }
}

/// The current frame's texture.
pub struct SurfaceTexture {
    pub texture: Texture,
    surface: Arc<Mutex<SurfaceState>>,
    finished: bool,
}

impl std::fmt::Debug for SurfaceTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SurfaceTexture")
            .field("texture", &self.texture.label())
            .finish()
    }
}

impl SurfaceTexture {
    /// Default view of the frame texture.
    pub fn create_view(&self) -> GpuResult<TextureView> {
        self.texture.create_view(&TextureViewDescriptor::default())
    }

    /// Schedules the frame for presentation.
    pub fn present(mut self) {
        self.release(true);
    }

    fn release(&mut self, presented: bool) {
        if self.finished {
            return;
        }
        self.finished = true;

        let mut state = self.surface.lock();
        state.acquired = false;
        if presented {
            state.presented += 1;
        } else {
            state.discarded += 1;
            log::trace!("surface frame discarded without presenting");
        }
    }
}

impl Drop for SurfaceTexture {
    fn drop(&mut self) {
        self.release(false);
    }
}

/// Picks the surface format, preferring sRGB when asked.
pub(crate) fn choose_surface_format(
    caps: &SurfaceCapabilities,
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    if caps.formats.is_empty() {
        return None;
    }

    if prefer_srgb {
        let preferred = [
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ];
        for f in preferred {
            if caps.formats.contains(&f) {
                return Some(f);
            }
        }
    }

    Some(caps.formats[0])
}
