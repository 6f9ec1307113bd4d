use crate::device::{Device, GpuResult, SurfaceTexture};
use crate::logging::GUEST_TARGET;
use crate::queue::Queue;
use crate::resource::{Texture, TextureView};

/// Context passed to `Game::init`.
pub struct InitCtx<'a> {
    pub(crate) device: &'a Device,
    pub(crate) queue: &'a Queue,
    pub(crate) surface_format: wgpu::TextureFormat,
    pub(crate) window_dimensions: (u32, u32),
}

impl<'a> InitCtx<'a> {
    pub fn device(&self) -> &'a Device {
        self.device
    }

    pub fn queue(&self) -> &'a Queue {
        self.queue
    }

    /// Format of the textures `FrameCtx::current_texture` returns.
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    /// Drawable size as `(width, height)` in physical pixels.
    pub fn window_dimensions(&self) -> (u32, u32) {
        self.window_dimensions
    }

    /// Forwards a guest message to the host log.
    pub fn log(&self, message: &str) {
        log::info!(target: GUEST_TARGET, "{message}");
    }
}

/// Per-frame context passed to `Game::render`.
///
/// The surface texture is presented once `render` returns successfully and
/// discarded otherwise.
pub struct FrameCtx<'a> {
    pub(crate) device: &'a Device,
    pub(crate) queue: &'a Queue,
    pub(crate) frame: &'a SurfaceTexture,
    pub(crate) window_dimensions: (u32, u32),
    pub(crate) exit_requested: bool,
}

impl<'a> FrameCtx<'a> {
    pub fn device(&self) -> &'a Device {
        self.device
    }

    pub fn queue(&self) -> &'a Queue {
        self.queue
    }

    /// This frame's surface texture.
    pub fn current_texture(&self) -> &'a Texture {
        &self.frame.texture
    }

    /// Default view of this frame's surface texture.
    pub fn current_view(&self) -> GpuResult<TextureView> {
        self.frame.create_view()
    }

    /// Drawable size as `(width, height)` in physical pixels.
    pub fn window_dimensions(&self) -> (u32, u32) {
        self.window_dimensions
    }

    /// Forwards a guest message to the host log.
    pub fn log(&self, message: &str) {
        log::info!(target: GUEST_TARGET, "{message}");
    }

    /// Asks the host to stop after this frame.
    pub fn exit(&mut self) {
        self.exit_requested = true;
    }
}
