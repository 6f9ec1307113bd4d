use std::num::NonZeroU64;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::{DeviceShared, GpuError, GpuResult, ResourceKind, Tracked, ValidationError};
use crate::queue::QueueMessage;

use super::binding::{BindingResource, BufferBinding};

/// Parameters for [`Device::create_buffer`](crate::device::Device::create_buffer).
#[derive(Debug, Clone)]
pub struct BufferDescriptor<'a> {
    pub label: Option<&'a str>,
    /// Byte length.
    pub size: u64,
    pub usage: wgpu::BufferUsages,
    /// Leaves the buffer mapped (readable and writable) until [`Buffer::unmap`].
    pub mapped_at_creation: bool,
    /// Initial bytes; requires `mapped_at_creation` and must be exactly `size` long.
    pub contents: Option<&'a [u8]>,
}

impl Default for BufferDescriptor<'_> {
    fn default() -> Self {
        Self {
            label: None,
            size: 0,
            usage: wgpu::BufferUsages::empty(),
            mapped_at_creation: false,
            contents: None,
        }
    }
}

/// Access requested by [`Buffer::map_async`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MapMode {
    Read,
    Write,
}

/// Host visibility of a buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BufferMapState {
    Unmapped,
    Pending,
    Mapped,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Mapping {
    Unmapped,
    Pending { ticket: u64, mode: MapMode },
    Mapped { writable: bool },
}

struct BufferState {
    data: Vec<u8>,
    mapping: Mapping,
    destroyed: bool,
    next_ticket: u64,
}

struct BufferInner {
    tracked: Tracked,
    size: u64,
    usage: wgpu::BufferUsages,
    state: Mutex<BufferState>,
}

/// GPU-visible memory.
///
/// Cloning yields another handle to the same buffer. Storage is released when
/// the last handle (including handles held by recorded commands) drops.
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<BufferInner>,
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("label", &self.inner.tracked.label())
            .field("size", &self.inner.size)
            .field("usage", &self.inner.usage)
            .finish()
    }
}

/// A byte range of a buffer, as passed to vertex and index bindings.
#[derive(Debug, Copy, Clone)]
pub struct BufferSlice<'a> {
    pub(crate) buffer: &'a Buffer,
    pub(crate) offset: u64,
    pub(crate) size: Option<u64>,
}

impl BufferSlice<'_> {
    pub fn buffer(&self) -> &Buffer {
        self.buffer
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Resolved byte length; `None` when the slice runs past the buffer.
    pub fn len(&self) -> Option<u64> {
        match self.size {
            Some(size) => Some(size),
            None => self.buffer.size().checked_sub(self.offset),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

impl Buffer {
    pub(crate) fn create(device: &Arc<DeviceShared>, desc: &BufferDescriptor<'_>) -> GpuResult<Self> {
        device.check_alive()?;
        validate_descriptor(device.limits(), desc)?;

        let data = match desc.contents {
            Some(contents) => contents.to_vec(),
            None => vec![0; desc.size as usize],
        };
        let mapping = if desc.mapped_at_creation {
            Mapping::Mapped { writable: true }
        } else {
            Mapping::Unmapped
        };

        let tracked = Tracked::new(device, ResourceKind::Buffer, desc.label);
        log::debug!(
            "buffer '{}' created: {} bytes, {:?}",
            tracked.name(),
            desc.size,
            desc.usage
        );

        Ok(Self {
            inner: Arc::new(BufferInner {
                tracked,
                size: desc.size,
                usage: desc.usage,
                state: Mutex::new(BufferState {
                    data,
                    mapping,
                    destroyed: false,
                    next_ticket: 1,
                }),
            }),
        })
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.tracked.label()
    }

    pub fn size(&self) -> u64 {
        self.inner.size
    }

    pub fn usage(&self) -> wgpu::BufferUsages {
        self.inner.usage
    }

    pub fn map_state(&self) -> BufferMapState {
        match self.inner.state.lock().mapping {
            Mapping::Unmapped => BufferMapState::Unmapped,
            Mapping::Pending { .. } => BufferMapState::Pending,
            Mapping::Mapped { .. } => BufferMapState::Mapped,
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.lock().destroyed
    }

    /// Range of the buffer for vertex/index binding.
    ///
    /// Fails on reversed ranges. Ranges past the end are checked on use.
    pub fn slice<S: RangeBounds<u64>>(&self, bounds: S) -> GpuResult<BufferSlice<'_>> {
        let (offset, size) = self.resolve_bounds(&bounds)?;
        Ok(BufferSlice {
            buffer: self,
            offset,
            size,
        })
    }

    /// Binds the whole buffer in a bind group entry.
    pub fn as_entire_binding(&self) -> BindingResource<'_> {
        BindingResource::Buffer(BufferBinding {
            buffer: self,
            offset: 0,
            size: None,
        })
    }

    /// Binds `offset..offset + size` in a bind group entry.
    pub fn as_binding(&self, offset: u64, size: Option<NonZeroU64>) -> BindingResource<'_> {
        BindingResource::Buffer(BufferBinding {
            buffer: self,
            offset,
            size,
        })
    }

    /// Copies bytes out of the mapped range.
    pub fn get_mapped_range<S: RangeBounds<u64>>(&self, bounds: S) -> GpuResult<Vec<u8>> {
        self.device().check_alive()?;
        let (offset, size) = self.resolve_bounds(&bounds)?;
        let size = size.unwrap_or_else(|| self.inner.size.saturating_sub(offset));
        self.check_range(offset, size)?;

        let state = self.inner.state.lock();
        self.check_not_destroyed(&state)?;
        match state.mapping {
            Mapping::Mapped { .. } => {}
            _ => {
                return Err(ValidationError::BufferNotMapped { label: self.name() }.into());
            }
        }

        Ok(state.data[offset as usize..(offset + size) as usize].to_vec())
    }

    /// Writes bytes into a range mapped for writing.
    pub fn write_mapped_range(&self, offset: u64, data: &[u8]) -> GpuResult<()> {
        self.device().check_alive()?;
        crate::queue::check_aligned("mapped write offset", offset, wgpu::MAP_ALIGNMENT)?;
        self.check_range(offset, data.len() as u64)?;

        let mut state = self.inner.state.lock();
        self.check_not_destroyed(&state)?;
        match state.mapping {
            Mapping::Mapped { writable: true } => {}
            Mapping::Mapped { writable: false } => {
                return Err(ValidationError::BufferNotWritable { label: self.name() }.into());
            }
            _ => {
                return Err(ValidationError::BufferNotMapped { label: self.name() }.into());
            }
        }

        let start = offset as usize;
        state.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Requests host access once all previously enqueued work has run.
    ///
    /// The receiver yields `Ok(())` once the buffer is mapped, or
    /// `MapAborted` if [`unmap`](Self::unmap) or [`destroy`](Self::destroy)
    /// intervened.
    pub fn map_async(&self, mode: MapMode) -> GpuResult<flume::Receiver<GpuResult<()>>> {
        let device = self.device();
        device.check_alive()?;
        self.check_usage(match mode {
            MapMode::Read => wgpu::BufferUsages::MAP_READ,
            MapMode::Write => wgpu::BufferUsages::MAP_WRITE,
        })?;

        let ticket = {
            let mut state = self.inner.state.lock();
            self.check_not_destroyed(&state)?;
            if state.mapping != Mapping::Unmapped {
                return Err(ValidationError::BufferMapped { label: self.name() }.into());
            }
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            state.mapping = Mapping::Pending { ticket, mode };
            ticket
        };

        let (reply, receiver) = flume::bounded(1);
        device.send(QueueMessage::Map {
            buffer: self.clone(),
            ticket,
            reply,
        })?;
        Ok(receiver)
    }

    /// Returns the buffer to the GPU. Cancels a pending map request.
    pub fn unmap(&self) -> GpuResult<()> {
        self.device().check_alive()?;
        let mut state = self.inner.state.lock();
        if state.mapping == Mapping::Unmapped {
            return Err(ValidationError::BufferNotMapped { label: self.name() }.into());
        }
        state.mapping = Mapping::Unmapped;
        Ok(())
    }

    /// Releases the storage now. Later use of the buffer is a validation error.
    pub fn destroy(&self) {
        let mut state = self.inner.state.lock();
        if state.destroyed {
            return;
        }
        state.destroyed = true;
        state.mapping = Mapping::Unmapped;
        state.data = Vec::new();
        log::debug!("buffer '{}' destroyed", self.name());
    }

    pub(crate) fn device(&self) -> &Arc<DeviceShared> {
        self.inner.tracked.device()
    }

    pub(crate) fn name(&self) -> String {
        self.inner.tracked.name()
    }

    pub(crate) fn ptr_eq(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn check_usage(&self, required: wgpu::BufferUsages) -> GpuResult<()> {
        if !self.inner.usage.contains(required) {
            return Err(ValidationError::MissingBufferUsage {
                label: self.name(),
                missing: required - self.inner.usage,
            }
            .into());
        }
        Ok(())
    }

    pub(crate) fn check_range(&self, offset: u64, size: u64) -> GpuResult<()> {
        match offset.checked_add(size) {
            Some(end) if end <= self.inner.size => Ok(()),
            end => Err(ValidationError::BufferRangeOutOfBounds {
                label: self.name(),
                offset,
                end: end.unwrap_or(u64::MAX),
                size: self.inner.size,
            }
            .into()),
        }
    }

    pub(crate) fn check_unmapped(&self) -> GpuResult<()> {
        if self.inner.state.lock().mapping != Mapping::Unmapped {
            return Err(ValidationError::BufferMapped { label: self.name() }.into());
        }
        Ok(())
    }

    /// Fails if the buffer cannot be touched by queue work right now.
    pub(crate) fn check_submittable(&self) -> GpuResult<()> {
        let state = self.inner.state.lock();
        self.check_not_destroyed(&state)?;
        if state.mapping != Mapping::Unmapped {
            return Err(ValidationError::BufferMapped { label: self.name() }.into());
        }
        Ok(())
    }

    fn check_not_destroyed(&self, state: &BufferState) -> GpuResult<()> {
        if state.destroyed {
            return Err(ValidationError::DestroyedResource {
                kind: "buffer",
                label: self.name(),
            }
            .into());
        }
        Ok(())
    }

    /// Copies `size` bytes out. `None` if the storage is gone.
    pub(crate) fn read_bytes(&self, offset: u64, size: u64) -> Option<Vec<u8>> {
        let state = self.inner.state.lock();
        if state.destroyed {
            return None;
        }
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(usize::try_from(size).ok()?)?;
        state.data.get(start..end).map(<[u8]>::to_vec)
    }

    /// Overwrites bytes at `offset`. `false` if the storage is gone.
    pub(crate) fn write_bytes(&self, offset: u64, bytes: &[u8]) -> bool {
        let mut state = self.inner.state.lock();
        if state.destroyed {
            return false;
        }
        let Ok(start) = usize::try_from(offset) else {
            return false;
        };
        match state.data.get_mut(start..start + bytes.len()) {
            Some(target) => {
                target.copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }

    /// Completes the map request identified by `ticket`.
    pub(crate) fn resolve_map(&self, ticket: u64) -> GpuResult<()> {
        let mut state = self.inner.state.lock();
        if state.destroyed {
            return Err(GpuError::MapAborted);
        }
        match state.mapping {
            Mapping::Pending { ticket: pending, mode } if pending == ticket => {
                state.mapping = Mapping::Mapped {
                    writable: mode == MapMode::Write,
                };
                Ok(())
            }
            _ => Err(GpuError::MapAborted),
        }
    }

    /// Turns `bounds` into an offset and an optional length.
    ///
    /// Reversed or overflowing ranges fail; ranges past the end of the
    /// buffer are caught where the slice is used.
    fn resolve_bounds<S: RangeBounds<u64>>(&self, bounds: &S) -> GpuResult<(u64, Option<u64>)> {
        let out_of_bounds = |offset: u64, end: u64| ValidationError::BufferRangeOutOfBounds {
            label: self.name(),
            offset,
            end,
            size: self.inner.size,
        };

        let offset = match bounds.start_bound() {
            Bound::Included(&start) => start,
            Bound::Excluded(&start) => start
                .checked_add(1)
                .ok_or_else(|| out_of_bounds(start, u64::MAX))?,
            Bound::Unbounded => 0,
        };
        let end = match bounds.end_bound() {
            Bound::Included(&end) => Some(
                end.checked_add(1)
                    .ok_or_else(|| out_of_bounds(offset, u64::MAX))?,
            ),
            Bound::Excluded(&end) => Some(end),
            Bound::Unbounded => None,
        };

        match end {
            Some(end) if end < offset => Err(out_of_bounds(offset, end).into()),
            Some(end) => Ok((offset, Some(end - offset))),
            None => Ok((offset, None)),
        }
    }

    #[cfg(test)]
    pub(crate) fn contents_snapshot(&self) -> Vec<u8> {
        self.inner.state.lock().data.clone()
    }
}

fn validate_descriptor(limits: &wgpu::Limits, desc: &BufferDescriptor<'_>) -> GpuResult<()> {
    use wgpu::BufferUsages as U;

    if desc.usage.is_empty() {
        return Err(ValidationError::EmptyUsage.into());
    }
    if desc.usage.contains(U::MAP_READ) && !(U::MAP_READ | U::COPY_DST).contains(desc.usage) {
        return Err(ValidationError::InvalidBufferUsage(desc.usage).into());
    }
    if desc.usage.contains(U::MAP_WRITE) && !(U::MAP_WRITE | U::COPY_SRC).contains(desc.usage) {
        return Err(ValidationError::InvalidBufferUsage(desc.usage).into());
    }
    if desc.size > limits.max_buffer_size {
        return Err(ValidationError::BufferTooLarge {
            size: desc.size,
            limit: limits.max_buffer_size,
        }
        .into());
    }

    if let Some(contents) = desc.contents {
        if !desc.mapped_at_creation {
            return Err(ValidationError::ContentsWithoutMapping.into());
        }
        if contents.len() as u64 != desc.size {
            return Err(ValidationError::InitialContentsSize {
                expected: desc.size,
                actual: contents.len() as u64,
            }
            .into());
        }
    }

    if desc.mapped_at_creation && desc.size % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
        return Err(ValidationError::UnalignedMappedSize { size: desc.size }.into());
    }

    Ok(())
}
