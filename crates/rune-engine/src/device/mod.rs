//! Adapter, device and surface management.
//!
//! This module is responsible for:
//! - adapter selection and one-shot device creation
//! - the device as resource factory, its lost state and live-object accounting
//! - the host-provided surface and the `Gpu` bundle used by the runtime

mod context;
mod error;
mod gpu;
mod init;
mod instance;
mod surface;

pub use context::{Device, DeviceLostCallback, Maintain, PollStatus, ResourceKind};
pub(crate) use context::{DeviceCore, DeviceShared, Tracked};
pub use error::{
    CompileError, DeviceLostReason, EncoderStateError, GpuError, GpuResult, LayoutMismatch,
    SourceLocation, ValidationError,
};
pub use gpu::{Gpu, SurfaceErrorAction};
pub use init::{DeviceDescriptor, GpuInit, RequestAdapterOptions};
pub use instance::{Adapter, AdapterInfo, Instance};
pub use surface::{
    Surface, SurfaceCapabilities, SurfaceConfiguration, SurfaceError, SurfaceTexture,
};
