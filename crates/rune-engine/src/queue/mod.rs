//! Ordered submission of recorded work.
//!
//! `submit` and `write_buffer` validate on the calling thread, then hand the
//! work to a per-device worker thread and return immediately. The worker
//! executes messages strictly in the order they were enqueued.

mod stats;
pub(crate) mod worker;

use std::sync::Arc;

use crate::command::CommandBuffer;
use crate::device::{DeviceShared, GpuResult, ValidationError};
use crate::resource::Buffer;

pub use stats::ExecutionStats;
pub(crate) use worker::QueueMessage;

/// Monotonic index of a `submit` call on one queue.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubmissionIndex(pub u64);

/// FIFO channel for submitting command buffers.
#[derive(Clone)]
pub struct Queue {
    device: Arc<DeviceShared>,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("device", &self.device.id())
            .finish()
    }
}

impl Queue {
    pub(crate) fn new(device: Arc<DeviceShared>) -> Self {
        Self { device }
    }

    /// Enqueues command buffers for execution in iteration order.
    ///
    /// Returns before the work executes. Either every buffer is enqueued or,
    /// on a validation failure, none is. Resources referenced by the buffers
    /// must stay alive and unmodified until the work completes; this is the
    /// caller's obligation.
    pub fn submit<I>(&self, command_buffers: I) -> GpuResult<SubmissionIndex>
    where
        I: IntoIterator<Item = CommandBuffer>,
    {
        self.device.check_alive()?;

        let command_buffers: Vec<CommandBuffer> = command_buffers.into_iter().collect();
        for command_buffer in &command_buffers {
            self.device.check_same(command_buffer.device())?;
            command_buffer.validate_submit()?;
        }

        let index = self.device.next_submission();
        log::trace!(
            "queue {}: submission {index} with {} command buffers",
            self.device.id(),
            command_buffers.len()
        );
        self.device.send(QueueMessage::Submit {
            index,
            command_buffers,
        })?;

        Ok(SubmissionIndex(index))
    }

    /// Schedules a write of `data` into `buffer` at `offset`.
    ///
    /// Ordered with respect to submissions made on this queue.
    pub fn write_buffer(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> GpuResult<()> {
        self.device.check_alive()?;
        self.device.check_same(buffer.device())?;

        let size = data.len() as u64;
        buffer.check_usage(wgpu::BufferUsages::COPY_DST)?;
        buffer.check_unmapped()?;
        check_aligned("write offset", offset, wgpu::COPY_BUFFER_ALIGNMENT)?;
        check_aligned("write size", size, wgpu::COPY_BUFFER_ALIGNMENT)?;
        buffer.check_range(offset, size)?;

        self.device.send(QueueMessage::WriteBuffer {
            buffer: buffer.clone(),
            offset,
            data: data.to_vec(),
        })
    }

    /// Typed form of [`write_buffer`](Self::write_buffer) for plain-old-data slices.
    pub fn write_slice<T: bytemuck::Pod>(
        &self,
        buffer: &Buffer,
        offset: u64,
        data: &[T],
    ) -> GpuResult<()> {
        self.write_buffer(buffer, offset, bytemuck::cast_slice(data))
    }

    /// Returns a receiver signalled once everything enqueued so far has run.
    pub fn on_submitted_work_done(&self) -> GpuResult<flume::Receiver<()>> {
        self.device.check_alive()?;
        let (tx, rx) = flume::bounded(1);
        self.device.send(QueueMessage::Fence(tx))?;
        Ok(rx)
    }

    /// Index of the last submission whose execution finished.
    pub fn last_completed(&self) -> Option<SubmissionIndex> {
        match self.device.core().completed() {
            0 => None,
            index => Some(SubmissionIndex(index)),
        }
    }
}

pub(crate) fn check_aligned(what: &'static str, value: u64, alignment: u64) -> GpuResult<()> {
    if value % alignment != 0 {
        return Err(ValidationError::Unaligned {
            what,
            value,
            alignment,
        }
        .into());
    }
    Ok(())
}
