use std::sync::Arc;

use crate::command::{Command, CommandBuffer, RecordedPass, RenderCommand};
use crate::device::{DeviceCore, DeviceLostReason, GpuError, GpuResult};
use crate::resource::{BindGroup, Buffer};

use super::stats::{ExecutionStats, primitive_count, strip_primitive_count};

/// Work items consumed by the queue worker, in enqueue order.
pub(crate) enum QueueMessage {
    Submit {
        index: u64,
        command_buffers: Vec<CommandBuffer>,
    },
    WriteBuffer {
        buffer: Buffer,
        offset: u64,
        data: Vec<u8>,
    },
    Map {
        buffer: Buffer,
        ticket: u64,
        reply: flume::Sender<GpuResult<()>>,
    },
    Fence(flume::Sender<()>),
}

/// Starts the worker thread for one device.
///
/// The thread exits once every sender (the device and in-flight handles) is gone.
pub(crate) fn spawn(
    device_id: u64,
    core: Arc<DeviceCore>,
    receiver: flume::Receiver<QueueMessage>,
) -> GpuResult<()> {
    std::thread::Builder::new()
        .name(format!("rune-queue-{device_id}"))
        .spawn(move || run(device_id, &core, &receiver))
        .map(drop)
        .map_err(|err| GpuError::QueueStart(err.to_string()))
}

fn run(device_id: u64, core: &DeviceCore, receiver: &flume::Receiver<QueueMessage>) {
    log::trace!("queue worker {device_id} started");

    for message in receiver.iter() {
        match message {
            QueueMessage::Submit {
                index,
                command_buffers,
            } => {
                let mut stats = ExecutionStats {
                    submissions: 1,
                    ..Default::default()
                };
                for command_buffer in &command_buffers {
                    if let Err(fault) = execute(command_buffer, &mut stats) {
                        core.lose(
                            DeviceLostReason::Unknown,
                            format!("submission {index}: {fault}"),
                        );
                        break;
                    }
                }
                core.stats().lock().merge(&stats);
                core.mark_completed(index);
            }
            QueueMessage::WriteBuffer {
                buffer,
                offset,
                data,
            } => {
                if buffer.write_bytes(offset, &data) {
                    core.stats().lock().bytes_written += data.len() as u64;
                } else {
                    log::warn!("write to destroyed buffer '{}' dropped", buffer.name());
                }
            }
            QueueMessage::Map {
                buffer,
                ticket,
                reply,
            } => {
                // The requester may have stopped listening.
                let _ = reply.send(buffer.resolve_map(ticket));
            }
            QueueMessage::Fence(reply) => {
                let _ = reply.send(());
            }
        }
    }

    log::trace!("queue worker {device_id} stopped");
}

fn execute(command_buffer: &CommandBuffer, stats: &mut ExecutionStats) -> Result<(), String> {
    stats.command_buffers += 1;

    for command in command_buffer.commands() {
        match command {
            Command::CopyBufferToBuffer {
                source,
                source_offset,
                destination,
                destination_offset,
                size,
            } => {
                let bytes = source
                    .read_bytes(*source_offset, *size)
                    .ok_or_else(|| destroyed(source))?;
                if !destination.write_bytes(*destination_offset, &bytes) {
                    return Err(destroyed(destination));
                }
                stats.bytes_copied += size;
            }
            Command::ClearBuffer {
                buffer,
                offset,
                size,
            } => {
                let zeros = vec![0; *size as usize];
                if !buffer.write_bytes(*offset, &zeros) {
                    return Err(destroyed(buffer));
                }
                stats.bytes_copied += size;
            }
            Command::RenderPass(pass) => execute_pass(pass, stats)?,
            Command::PushDebugGroup(label) => log::trace!("debug group: {label}"),
            Command::PopDebugGroup => {}
            Command::InsertDebugMarker(label) => log::trace!("debug marker: {label}"),
        }
    }

    Ok(())
}

struct IndexBinding<'a> {
    buffer: &'a Buffer,
    format: wgpu::IndexFormat,
    offset: u64,
}

fn execute_pass(pass: &RecordedPass, stats: &mut ExecutionStats) -> Result<(), String> {
    stats.render_passes += 1;
    stats.attachment_clears += pass.clear_count() as u64;
    log::trace!(
        "render pass '{}': {} commands",
        pass.label.as_deref().unwrap_or("<unnamed>"),
        pass.commands.len()
    );

    for view in pass.attachments() {
        if view.texture_destroyed() {
            return Err(format!("attachment of texture '{}' was destroyed", view.texture_name()));
        }
    }

    let mut topology = wgpu::PrimitiveTopology::TriangleList;
    let mut strip_index_format = None;
    let mut index: Option<IndexBinding<'_>> = None;

    for command in &pass.commands {
        match command {
            RenderCommand::SetPipeline(pipeline) => {
                topology = pipeline.primitive().topology;
                strip_index_format = pipeline.primitive().strip_index_format;
            }
            RenderCommand::SetBindGroup { group, .. } => check_bind_group(group)?,
            RenderCommand::SetVertexBuffer { buffer, .. } => {
                if buffer.is_destroyed() {
                    return Err(destroyed(buffer));
                }
            }
            RenderCommand::SetIndexBuffer {
                buffer,
                format,
                offset,
                ..
            } => {
                if buffer.is_destroyed() {
                    return Err(destroyed(buffer));
                }
                index = Some(IndexBinding {
                    buffer,
                    format: *format,
                    offset: *offset,
                });
            }
            RenderCommand::Draw {
                vertices,
                instances,
            } => {
                let count = u64::from(vertices.end - vertices.start);
                let instance_count = u64::from(instances.end - instances.start);
                stats.draw_calls += 1;
                stats.vertices += count * instance_count;
                stats.instances += instance_count;
                stats.primitives += primitive_count(topology, count) * instance_count;
            }
            RenderCommand::DrawIndexed {
                indices,
                instances,
                ..
            } => {
                let count = u64::from(indices.end - indices.start);
                let instance_count = u64::from(instances.end - instances.start);
                let per_instance = match (strip_index_format, index.as_ref()) {
                    (Some(_), Some(binding)) => {
                        indexed_strip_primitives(binding, topology, indices.start, count)?
                    }
                    _ => primitive_count(topology, count),
                };
                stats.draw_calls += 1;
                stats.vertices += count * instance_count;
                stats.instances += instance_count;
                stats.primitives += per_instance * instance_count;
            }
            RenderCommand::SetViewport { .. }
            | RenderCommand::SetScissorRect { .. }
            | RenderCommand::SetBlendConstant(_)
            | RenderCommand::SetStencilReference(_)
            | RenderCommand::PushDebugGroup(_)
            | RenderCommand::PopDebugGroup
            | RenderCommand::InsertDebugMarker(_) => {}
        }
    }

    Ok(())
}

fn indexed_strip_primitives(
    binding: &IndexBinding<'_>,
    topology: wgpu::PrimitiveTopology,
    first: u32,
    count: u64,
) -> Result<u64, String> {
    let width = index_size(binding.format);
    let start = binding.offset + u64::from(first) * width;
    let bytes = binding
        .buffer
        .read_bytes(start, count * width)
        .ok_or_else(|| destroyed(binding.buffer))?;

    let primitives = match binding.format {
        wgpu::IndexFormat::Uint16 => strip_primitive_count(
            topology,
            bytes
                .chunks_exact(2)
                .map(|c| u32::from(u16::from_le_bytes([c[0], c[1]]))),
            u32::from(u16::MAX),
        ),
        wgpu::IndexFormat::Uint32 => strip_primitive_count(
            topology,
            bytes
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            u32::MAX,
        ),
    };
    Ok(primitives)
}

fn check_bind_group(group: &BindGroup) -> Result<(), String> {
    for buffer in group.buffers() {
        if buffer.is_destroyed() {
            return Err(destroyed(buffer));
        }
    }
    for view in group.texture_views() {
        if view.texture_destroyed() {
            return Err(format!("texture '{}' was destroyed while in use", view.texture_name()));
        }
    }
    Ok(())
}

pub(crate) fn index_size(format: wgpu::IndexFormat) -> u64 {
    match format {
        wgpu::IndexFormat::Uint16 => 2,
        wgpu::IndexFormat::Uint32 => 4,
    }
}

fn destroyed(buffer: &Buffer) -> String {
    format!("buffer '{}' was destroyed while in use", buffer.name())
}
