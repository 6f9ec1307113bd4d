use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::{
    DeviceShared, EncoderStateError, GpuResult, ResourceKind, Tracked, ValidationError,
};
use crate::queue::check_aligned;
use crate::resource::Buffer;

use super::Command;
use super::pass::{RenderPass, RenderPassDescriptor};

#[derive(Debug, Clone, Default)]
pub struct CommandEncoderDescriptor<'a> {
    pub label: Option<&'a str>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum EncoderState {
    Recording,
    InPass,
    Finished,
}

/// Recording state shared between an encoder and its open pass.
pub(crate) struct EncoderShared {
    pub(crate) state: EncoderState,
    pub(crate) commands: Vec<Command>,
    debug_depth: u32,
    /// A pass ended with debug groups still open.
    pub(crate) unbalanced: bool,
}

impl EncoderShared {
    pub(crate) fn check_recording(&self) -> GpuResult<()> {
        match self.state {
            EncoderState::Recording => Ok(()),
            EncoderState::InPass => Err(EncoderStateError::PassAlreadyOpen.into()),
            EncoderState::Finished => Err(EncoderStateError::RecordAfterFinish.into()),
        }
    }
}

/// Records commands for later submission.
///
/// At most one render pass may be open at a time. While it is open, only the
/// pass records; encoder-level calls fail with
/// [`EncoderStateError::PassAlreadyOpen`].
pub struct CommandEncoder {
    tracked: Tracked,
    shared: Arc<Mutex<EncoderShared>>,
}

impl std::fmt::Debug for CommandEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let shared = self.shared.lock();
        f.debug_struct("CommandEncoder")
            .field("label", &self.tracked.label())
            .field("state", &shared.state)
            .field("commands", &shared.commands.len())
            .finish()
    }
}

impl CommandEncoder {
    pub(crate) fn create(
        device: &Arc<DeviceShared>,
        desc: &CommandEncoderDescriptor<'_>,
    ) -> GpuResult<Self> {
        device.check_alive()?;
        Ok(Self {
            tracked: Tracked::new(device, ResourceKind::CommandEncoder, desc.label),
            shared: Arc::new(Mutex::new(EncoderShared {
                state: EncoderState::Recording,
                commands: Vec::new(),
                debug_depth: 0,
                unbalanced: false,
            })),
        })
    }

    pub fn label(&self) -> Option<&str> {
        self.tracked.label()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.lock().state == EncoderState::Finished
    }

    /// Opens a render pass. The encoder stays blocked until the pass ends.
    pub fn begin_render_pass(&mut self, desc: &RenderPassDescriptor<'_>) -> GpuResult<RenderPass> {
        self.device().check_alive()?;

        let mut shared = self.shared.lock();
        shared.check_recording()?;
        let pass = RenderPass::begin(self.device(), Arc::clone(&self.shared), desc)?;
        shared.state = EncoderState::InPass;
        Ok(pass)
    }

    /// Records a copy of `size` bytes between two distinct buffers.
    pub fn copy_buffer_to_buffer(
        &mut self,
        source: &Buffer,
        source_offset: u64,
        destination: &Buffer,
        destination_offset: u64,
        size: u64,
    ) -> GpuResult<()> {
        let device = self.device();
        device.check_alive()?;
        device.check_same(source.device())?;
        device.check_same(destination.device())?;

        let mut shared = self.shared.lock();
        shared.check_recording()?;

        source.check_usage(wgpu::BufferUsages::COPY_SRC)?;
        destination.check_usage(wgpu::BufferUsages::COPY_DST)?;
        check_aligned("copy size", size, wgpu::COPY_BUFFER_ALIGNMENT)?;
        check_aligned("copy source offset", source_offset, wgpu::COPY_BUFFER_ALIGNMENT)?;
        check_aligned(
            "copy destination offset",
            destination_offset,
            wgpu::COPY_BUFFER_ALIGNMENT,
        )?;
        source.check_range(source_offset, size)?;
        destination.check_range(destination_offset, size)?;

        if source.ptr_eq(destination)
            && source_offset < destination_offset + size
            && destination_offset < source_offset + size
        {
            return Err(ValidationError::CopyOverlap {
                label: source.name(),
            }
            .into());
        }

        shared.commands.push(Command::CopyBufferToBuffer {
            source: source.clone(),
            source_offset,
            destination: destination.clone(),
            destination_offset,
            size,
        });
        Ok(())
    }

    /// Records zeroing `offset..offset + size`, or to the end when `size` is `None`.
    pub fn clear_buffer(&mut self, buffer: &Buffer, offset: u64, size: Option<u64>) -> GpuResult<()> {
        let device = self.device();
        device.check_alive()?;
        device.check_same(buffer.device())?;

        let mut shared = self.shared.lock();
        shared.check_recording()?;

        buffer.check_usage(wgpu::BufferUsages::COPY_DST)?;
        check_aligned("clear offset", offset, wgpu::COPY_BUFFER_ALIGNMENT)?;
        buffer.check_range(offset, 0)?;
        let size = size.unwrap_or(buffer.size() - offset);
        check_aligned("clear size", size, wgpu::COPY_BUFFER_ALIGNMENT)?;
        buffer.check_range(offset, size)?;

        shared.commands.push(Command::ClearBuffer {
            buffer: buffer.clone(),
            offset,
            size,
        });
        Ok(())
    }

    pub fn push_debug_group(&mut self, label: &str) -> GpuResult<()> {
        let mut shared = self.shared.lock();
        shared.check_recording()?;
        shared.debug_depth += 1;
        shared.commands.push(Command::PushDebugGroup(label.to_owned()));
        Ok(())
    }

    pub fn pop_debug_group(&mut self) -> GpuResult<()> {
        let mut shared = self.shared.lock();
        shared.check_recording()?;
        if shared.debug_depth == 0 {
            return Err(EncoderStateError::UnbalancedDebugGroup.into());
        }
        shared.debug_depth -= 1;
        shared.commands.push(Command::PopDebugGroup);
        Ok(())
    }

    pub fn insert_debug_marker(&mut self, label: &str) -> GpuResult<()> {
        let mut shared = self.shared.lock();
        shared.check_recording()?;
        shared.commands.push(Command::InsertDebugMarker(label.to_owned()));
        Ok(())
    }

    /// Seals the recorded commands into a [`CommandBuffer`].
    ///
    /// Succeeds once. Later calls, and any recording after it, fail with
    /// [`EncoderStateError::RecordAfterFinish`].
    pub fn finish(&mut self) -> GpuResult<CommandBuffer> {
        self.device().check_alive()?;

        let mut shared = self.shared.lock();
        match shared.state {
            EncoderState::Recording => {}
            EncoderState::InPass => return Err(EncoderStateError::PassStillOpen.into()),
            EncoderState::Finished => return Err(EncoderStateError::RecordAfterFinish.into()),
        }
        if shared.debug_depth != 0 || shared.unbalanced {
            return Err(EncoderStateError::UnbalancedDebugGroup.into());
        }

        shared.state = EncoderState::Finished;
        let commands = std::mem::take(&mut shared.commands);
        log::trace!(
            "encoder '{}' finished with {} commands",
            self.tracked.name(),
            commands.len()
        );

        Ok(CommandBuffer {
            device: Arc::clone(self.device()),
            label: self.tracked.label().map(str::to_owned),
            commands,
        })
    }

    fn device(&self) -> &Arc<DeviceShared> {
        self.tracked.device()
    }
}

/// Sealed, immutable command list. Consumed by [`Queue::submit`](crate::queue::Queue::submit).
pub struct CommandBuffer {
    device: Arc<DeviceShared>,
    label: Option<String>,
    commands: Vec<Command>,
}

impl std::fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("label", &self.label)
            .field("commands", &self.commands.len())
            .finish()
    }
}

impl CommandBuffer {
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub(crate) fn device(&self) -> &DeviceShared {
        &self.device
    }

    pub(crate) fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Fails if a referenced resource was destroyed or is mapped.
    pub(crate) fn validate_submit(&self) -> GpuResult<()> {
        for command in &self.commands {
            match command {
                Command::CopyBufferToBuffer {
                    source,
                    destination,
                    ..
                } => {
                    source.check_submittable()?;
                    destination.check_submittable()?;
                }
                Command::ClearBuffer { buffer, .. } => buffer.check_submittable()?,
                Command::RenderPass(pass) => pass.validate_submit()?,
                Command::PushDebugGroup(_)
                | Command::PopDebugGroup
                | Command::InsertDebugMarker(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, GpuError, Maintain};
    use crate::resource::BufferDescriptor;
    use crate::test_support::device;

    fn buffer(device: &Device, contents: &[u8], usage: wgpu::BufferUsages) -> Buffer {
        device
            .create_buffer(&BufferDescriptor {
                label: Some("data"),
                size: contents.len() as u64,
                usage,
                mapped_at_creation: true,
                contents: Some(contents),
            })
            .unwrap()
    }

    // ── state machine ─────────────────────────────────────────────────────

    #[test]
    fn second_finish_fails() {
        let (device, _queue) = device();
        let mut encoder = device.create_command_encoder(&Default::default()).unwrap();

        encoder.finish().unwrap();
        assert!(encoder.is_finished());
        assert_eq!(
            encoder.finish().unwrap_err(),
            GpuError::from(EncoderStateError::RecordAfterFinish)
        );
    }

    #[test]
    fn recording_after_finish_fails() {
        let (device, _queue) = device();
        let mut encoder = device.create_command_encoder(&Default::default()).unwrap();
        encoder.finish().unwrap();

        assert_eq!(
            encoder.insert_debug_marker("late").unwrap_err(),
            GpuError::from(EncoderStateError::RecordAfterFinish)
        );
    }

    #[test]
    fn debug_groups_must_balance() {
        let (device, _queue) = device();
        let mut encoder = device.create_command_encoder(&Default::default()).unwrap();

        assert_eq!(
            encoder.pop_debug_group().unwrap_err(),
            GpuError::from(EncoderStateError::UnbalancedDebugGroup)
        );

        encoder.push_debug_group("frame").unwrap();
        assert_eq!(
            encoder.finish().unwrap_err(),
            GpuError::from(EncoderStateError::UnbalancedDebugGroup)
        );

        encoder.pop_debug_group().unwrap();
        assert!(!encoder.finish().unwrap().is_empty());
    }

    #[test]
    fn encoder_on_lost_device_fails() {
        let (device, _queue) = device();
        device.destroy();
        assert_eq!(
            device.create_command_encoder(&Default::default()).unwrap_err(),
            GpuError::UseAfterDeviceLost
        );
    }

    // ── copies ────────────────────────────────────────────────────────────

    #[test]
    fn copy_runs_on_submit() {
        let (device, queue) = device();
        let source = buffer(&device, &[1, 2, 3, 4, 5, 6, 7, 8], wgpu::BufferUsages::COPY_SRC);
        let destination = buffer(&device, &[0; 8], wgpu::BufferUsages::COPY_DST);
        source.unmap().unwrap();
        destination.unmap().unwrap();

        let mut encoder = device.create_command_encoder(&Default::default()).unwrap();
        encoder
            .copy_buffer_to_buffer(&source, 4, &destination, 0, 4)
            .unwrap();
        queue.submit([encoder.finish().unwrap()]).unwrap();
        device.poll(Maintain::Wait).unwrap();

        assert_eq!(destination.contents_snapshot(), vec![5, 6, 7, 8, 0, 0, 0, 0]);
        assert_eq!(device.stats().bytes_copied, 4);
    }

    #[test]
    fn copy_validates_usage_and_overlap() {
        let (device, _queue) = device();
        let both = buffer(
            &device,
            &[0; 16],
            wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
        );
        let source_only = buffer(&device, &[0; 16], wgpu::BufferUsages::COPY_SRC);

        let mut encoder = device.create_command_encoder(&Default::default()).unwrap();
        assert!(matches!(
            encoder.copy_buffer_to_buffer(&both, 0, &source_only, 0, 4),
            Err(GpuError::Validation(ValidationError::MissingBufferUsage { .. }))
        ));
        assert!(matches!(
            encoder.copy_buffer_to_buffer(&both, 0, &both, 4, 8),
            Err(GpuError::Validation(ValidationError::CopyOverlap { .. }))
        ));
        encoder.copy_buffer_to_buffer(&both, 0, &both, 8, 8).unwrap();
    }

    #[test]
    fn mapped_buffers_cannot_be_submitted() {
        let (device, queue) = device();
        let source = buffer(&device, &[1; 4], wgpu::BufferUsages::COPY_SRC);
        let destination = buffer(&device, &[0; 4], wgpu::BufferUsages::COPY_DST);
        destination.unmap().unwrap();

        let mut encoder = device.create_command_encoder(&Default::default()).unwrap();
        encoder
            .copy_buffer_to_buffer(&source, 0, &destination, 0, 4)
            .unwrap();
        let err = queue.submit([encoder.finish().unwrap()]).unwrap_err();
        assert!(matches!(
            err,
            GpuError::Validation(ValidationError::BufferMapped { .. })
        ));
    }

    #[test]
    fn clear_zeroes_to_the_end() {
        let (device, queue) = device();
        let target = buffer(&device, &[7; 12], wgpu::BufferUsages::COPY_DST);
        target.unmap().unwrap();

        let mut encoder = device.create_command_encoder(&Default::default()).unwrap();
        encoder.clear_buffer(&target, 4, None).unwrap();
        queue.submit([encoder.finish().unwrap()]).unwrap();
        device.poll(Maintain::Wait).unwrap();

        assert_eq!(target.contents_snapshot(), vec![7, 7, 7, 7, 0, 0, 0, 0, 0, 0, 0, 0]);
    }
}
