use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::command::{CommandEncoder, CommandEncoderDescriptor};
use crate::pipeline::{RenderPipeline, RenderPipelineDescriptor};
use crate::queue::{ExecutionStats, Queue, QueueMessage, worker};
use crate::resource::{
    BindGroup, BindGroupDescriptor, BindGroupLayout, BindGroupLayoutDescriptor, Buffer,
    BufferDescriptor, PipelineLayout, PipelineLayoutDescriptor, Sampler, SamplerDescriptor,
    ShaderModule, ShaderModuleDescriptor, Texture, TextureDescriptor,
};

use super::error::{DeviceLostReason, GpuError, GpuResult};

/// Callback invoked once when the device is lost or destroyed.
pub type DeviceLostCallback = Box<dyn FnOnce(DeviceLostReason, String) + Send + 'static>;

/// Kinds of objects a device hands out. Used for live-object accounting.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    TextureView,
    Sampler,
    ShaderModule,
    BindGroupLayout,
    PipelineLayout,
    BindGroup,
    RenderPipeline,
    CommandEncoder,
}

/// Blocking behaviour of [`Device::poll`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Maintain {
    /// Report progress without waiting.
    Poll,
    /// Block until everything submitted so far has executed.
    Wait,
}

/// Result of [`Device::poll`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PollStatus {
    QueueEmpty,
    WorkPending,
}

/// State shared between a device and its queue worker.
///
/// Kept separate from [`DeviceShared`] so the worker does not keep the
/// submission channel alive.
pub(crate) struct DeviceCore {
    lost: RwLock<Option<(DeviceLostReason, String)>>,
    lost_callback: Mutex<Option<DeviceLostCallback>>,
    completed: AtomicU64,
    stats: Mutex<ExecutionStats>,
}

impl DeviceCore {
    fn new() -> Self {
        Self {
            lost: RwLock::new(None),
            lost_callback: Mutex::new(None),
            completed: AtomicU64::new(0),
            stats: Mutex::new(ExecutionStats::default()),
        }
    }

    /// Marks the device lost. Only the first call has an effect.
    pub(crate) fn lose(&self, reason: DeviceLostReason, message: String) {
        {
            let mut lost = self.lost.write();
            if lost.is_some() {
                return;
            }
            *lost = Some((reason, message.clone()));
        }

        match reason {
            DeviceLostReason::Destroyed => log::debug!("device destroyed"),
            DeviceLostReason::Unknown => log::error!("device lost: {message}"),
        }

        let callback = self.lost_callback.lock().take();
        if let Some(callback) = callback {
            callback(reason, message);
        }
    }

    pub(crate) fn lost(&self) -> Option<(DeviceLostReason, String)> {
        self.lost.read().clone()
    }

    pub(crate) fn is_lost(&self) -> bool {
        self.lost.read().is_some()
    }

    pub(crate) fn mark_completed(&self, index: u64) {
        self.completed.fetch_max(index, Ordering::AcqRel);
    }

    pub(crate) fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    pub(crate) fn stats(&self) -> &Mutex<ExecutionStats> {
        &self.stats
    }
}

/// Device internals referenced by every derived object.
pub(crate) struct DeviceShared {
    id: u64,
    label: Option<String>,
    limits: wgpu::Limits,
    core: Arc<DeviceCore>,
    sender: flume::Sender<QueueMessage>,
    submitted: AtomicU64,
    next_resource: AtomicU64,
    live: Mutex<HashMap<ResourceKind, usize>>,
}

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

impl DeviceShared {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }

    pub(crate) fn core(&self) -> &Arc<DeviceCore> {
        &self.core
    }

    /// Fails with `UseAfterDeviceLost` once the device is lost or destroyed.
    pub(crate) fn check_alive(&self) -> GpuResult<()> {
        if self.core.is_lost() {
            return Err(GpuError::UseAfterDeviceLost);
        }
        Ok(())
    }

    /// Fails unless `other` is this device.
    pub(crate) fn check_same(&self, other: &DeviceShared) -> GpuResult<()> {
        if self.id != other.id {
            return Err(crate::device::ValidationError::DeviceMismatch.into());
        }
        Ok(())
    }

    pub(crate) fn send(&self, message: QueueMessage) -> GpuResult<()> {
        self.sender
            .send(message)
            .map_err(|_| GpuError::UseAfterDeviceLost)
    }

    pub(crate) fn next_submission(&self) -> u64 {
        self.submitted.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Acquire)
    }

    fn acquire(&self, kind: ResourceKind) -> u64 {
        *self.live.lock().entry(kind).or_default() += 1;
        self.next_resource.fetch_add(1, Ordering::Relaxed)
    }

    fn release(&self, kind: ResourceKind) {
        let mut live = self.live.lock();
        if let Some(count) = live.get_mut(&kind) {
            *count = count.saturating_sub(1);
        }
    }
}

/// Registration of one device object.
///
/// Every resource embeds one of these; dropping it releases the registry slot
/// on every exit path, including error paths.
pub(crate) struct Tracked {
    device: Arc<DeviceShared>,
    kind: ResourceKind,
    id: u64,
    label: Option<String>,
}

impl Tracked {
    pub(crate) fn new(device: &Arc<DeviceShared>, kind: ResourceKind, label: Option<&str>) -> Self {
        let id = device.acquire(kind);
        Self {
            device: Arc::clone(device),
            kind,
            id,
            label: label.map(str::to_owned),
        }
    }

    pub(crate) fn device(&self) -> &Arc<DeviceShared> {
        &self.device
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Label for diagnostics; falls back to the kind and id.
    pub(crate) fn name(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("{:?}#{}", self.kind, self.id),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.device.release(self.kind);
    }
}

/// Logical GPU context and resource factory.
///
/// Cloning is cheap; clones refer to the same device.
#[derive(Clone)]
pub struct Device {
    shared: Arc<DeviceShared>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.shared.id)
            .field("label", &self.shared.label)
            .finish()
    }
}

impl Device {
    /// Creates the device, its queue and the queue worker thread.
    pub(crate) fn spawn(label: Option<&str>, limits: wgpu::Limits) -> GpuResult<(Device, Queue)> {
        let core = Arc::new(DeviceCore::new());
        let (sender, receiver) = flume::unbounded();
        let id = NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed);

        worker::spawn(id, Arc::clone(&core), receiver)?;

        let shared = Arc::new(DeviceShared {
            id,
            label: label.map(str::to_owned),
            limits,
            core,
            sender,
            submitted: AtomicU64::new(0),
            next_resource: AtomicU64::new(1),
            live: Mutex::new(HashMap::new()),
        });

        log::debug!("device {id} created ({:?})", shared.label);

        let queue = Queue::new(Arc::clone(&shared));
        Ok((Device { shared }, queue))
    }

    pub(crate) fn shared(&self) -> &Arc<DeviceShared> {
        &self.shared
    }

    pub fn label(&self) -> Option<&str> {
        self.shared.label.as_deref()
    }

    pub fn limits(&self) -> &wgpu::Limits {
        &self.shared.limits
    }

    pub fn create_buffer(&self, desc: &BufferDescriptor<'_>) -> GpuResult<Buffer> {
        Buffer::create(&self.shared, desc)
    }

    pub fn create_texture(&self, desc: &TextureDescriptor<'_>) -> GpuResult<Texture> {
        Texture::create(&self.shared, desc)
    }

    pub fn create_sampler(&self, desc: &SamplerDescriptor<'_>) -> GpuResult<Sampler> {
        Sampler::create(&self.shared, desc)
    }

    /// Compiles WGSL synchronously.
    pub fn create_shader_module(&self, desc: &ShaderModuleDescriptor<'_>) -> GpuResult<ShaderModule> {
        ShaderModule::create(&self.shared, desc)
    }

    pub fn create_bind_group_layout(
        &self,
        desc: &BindGroupLayoutDescriptor<'_>,
    ) -> GpuResult<BindGroupLayout> {
        BindGroupLayout::create(&self.shared, desc)
    }

    pub fn create_pipeline_layout(
        &self,
        desc: &PipelineLayoutDescriptor<'_>,
    ) -> GpuResult<PipelineLayout> {
        PipelineLayout::create(&self.shared, desc)
    }

    pub fn create_bind_group(&self, desc: &BindGroupDescriptor<'_>) -> GpuResult<BindGroup> {
        BindGroup::create(&self.shared, desc)
    }

    pub fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDescriptor<'_>,
    ) -> GpuResult<RenderPipeline> {
        RenderPipeline::create(&self.shared, desc)
    }

    pub fn create_command_encoder(
        &self,
        desc: &CommandEncoderDescriptor<'_>,
    ) -> GpuResult<CommandEncoder> {
        CommandEncoder::create(&self.shared, desc)
    }

    /// Destroys the device. Every derived object becomes unusable.
    ///
    /// Work already submitted still runs to completion.
    pub fn destroy(&self) {
        self.shared
            .core
            .lose(DeviceLostReason::Destroyed, "device destroyed".to_owned());
    }

    /// Registers the callback run when the device is lost.
    ///
    /// If the device is already lost the callback runs immediately.
    pub fn set_device_lost_callback<F>(&self, callback: F)
    where
        F: FnOnce(DeviceLostReason, String) + Send + 'static,
    {
        let mut slot = self.shared.core.lost_callback.lock();
        match self.shared.core.lost() {
            Some((reason, message)) => {
                drop(slot);
                callback(reason, message);
            }
            None => *slot = Some(Box::new(callback)),
        }
    }

    pub fn is_lost(&self) -> bool {
        self.shared.core.is_lost()
    }

    pub fn lost_reason(&self) -> Option<DeviceLostReason> {
        self.shared.core.lost().map(|(reason, _)| reason)
    }

    /// Reports queue progress, optionally blocking until it drains.
    ///
    /// Fails with `DeviceLost` when the device was lost.
    pub fn poll(&self, maintain: Maintain) -> GpuResult<PollStatus> {
        if maintain == Maintain::Wait && !self.shared.core.is_lost() {
            let (tx, rx) = flume::bounded(1);
            if self.shared.send(QueueMessage::Fence(tx)).is_ok() {
                // A disconnected worker means it is gone; the lost check below reports it.
                let _ = rx.recv();
            }
        }

        if let Some((reason, message)) = self.shared.core.lost() {
            return Err(GpuError::DeviceLost { reason, message });
        }

        if self.shared.core.completed() >= self.shared.submitted() {
            Ok(PollStatus::QueueEmpty)
        } else {
            Ok(PollStatus::WorkPending)
        }
    }

    /// Snapshot of the work executed so far.
    pub fn stats(&self) -> ExecutionStats {
        *self.shared.core.stats.lock()
    }

    /// Number of live objects of `kind` created by this device.
    pub fn live_resources(&self, kind: ResourceKind) -> usize {
        self.shared.live.lock().get(&kind).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use super::*;
    use crate::test_support::device;

    #[test]
    fn destroy_invalidates_creation() {
        let (device, _queue) = device();
        device.destroy();

        assert!(device.is_lost());
        assert_eq!(device.lost_reason(), Some(DeviceLostReason::Destroyed));

        let err = device
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 16,
                usage: wgpu::BufferUsages::VERTEX,
                mapped_at_creation: false,
                contents: None,
            })
            .unwrap_err();
        assert_eq!(err, GpuError::UseAfterDeviceLost);
    }

    #[test]
    fn lost_callback_fires_once() {
        let (device, _queue) = device();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        device.set_device_lost_callback(move |reason, _| {
            assert_eq!(reason, DeviceLostReason::Destroyed);
            assert!(!flag.swap(true, Ordering::SeqCst));
        });

        device.destroy();
        device.destroy();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn poll_after_destroy_reports_device_lost() {
        let (device, _queue) = device();
        device.destroy();
        let err = device.poll(Maintain::Wait).unwrap_err();
        assert!(matches!(
            err,
            GpuError::DeviceLost {
                reason: DeviceLostReason::Destroyed,
                ..
            }
        ));
    }

    #[test]
    fn live_resources_drop_with_handles() {
        let (device, _queue) = device();
        let desc = BufferDescriptor {
            label: Some("scratch"),
            size: 64,
            usage: wgpu::BufferUsages::UNIFORM,
            mapped_at_creation: false,
            contents: None,
        };

        let a = device.create_buffer(&desc).unwrap();
        let b = device.create_buffer(&desc).unwrap();
        assert_eq!(device.live_resources(ResourceKind::Buffer), 2);

        drop(a);
        assert_eq!(device.live_resources(ResourceKind::Buffer), 1);
        drop(b);
        assert_eq!(device.live_resources(ResourceKind::Buffer), 0);
    }

    #[test]
    fn idle_device_polls_empty() {
        let (device, _queue) = device();
        assert_eq!(device.poll(Maintain::Poll).unwrap(), PollStatus::QueueEmpty);
    }
}
