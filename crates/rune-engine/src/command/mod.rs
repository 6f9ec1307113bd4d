//! Command recording.
//!
//! An encoder records commands into a list and `finish` seals that list into
//! a [`CommandBuffer`]. Nothing touches resource contents until the buffer is
//! submitted and the queue worker runs it.

mod encoder;
mod pass;

use std::ops::Range;

use crate::pipeline::RenderPipeline;
use crate::resource::{BindGroup, Buffer, TextureView};

pub use encoder::{CommandBuffer, CommandEncoder, CommandEncoderDescriptor};
pub use pass::{
    LoadOp, Operations, RenderPass, RenderPassColorAttachment, RenderPassDepthStencilAttachment,
    RenderPassDescriptor, StoreOp,
};

/// Encoder-level command.
pub(crate) enum Command {
    CopyBufferToBuffer {
        source: Buffer,
        source_offset: u64,
        destination: Buffer,
        destination_offset: u64,
        size: u64,
    },
    ClearBuffer {
        buffer: Buffer,
        offset: u64,
        size: u64,
    },
    RenderPass(RecordedPass),
    PushDebugGroup(String),
    PopDebugGroup,
    InsertDebugMarker(String),
}

/// Command recorded inside a render pass.
pub(crate) enum RenderCommand {
    SetPipeline(RenderPipeline),
    SetBindGroup {
        index: u32,
        group: BindGroup,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: Buffer,
        offset: u64,
        size: u64,
    },
    SetIndexBuffer {
        buffer: Buffer,
        format: wgpu::IndexFormat,
        offset: u64,
        size: u64,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
    SetViewport {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    },
    SetScissorRect {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    SetBlendConstant(wgpu::Color),
    SetStencilReference(u32),
    PushDebugGroup(String),
    PopDebugGroup,
    InsertDebugMarker(String),
}

pub(crate) struct RecordedColorAttachment {
    pub(crate) view: TextureView,
    pub(crate) resolve_target: Option<TextureView>,
    pub(crate) ops: Operations<wgpu::Color>,
}

pub(crate) struct RecordedDepthAttachment {
    pub(crate) view: TextureView,
    pub(crate) depth_ops: Option<Operations<f32>>,
    pub(crate) stencil_ops: Option<Operations<u32>>,
}

/// A closed render pass: its attachments and the commands recorded against them.
pub(crate) struct RecordedPass {
    pub(crate) label: Option<String>,
    pub(crate) color_attachments: Vec<Option<RecordedColorAttachment>>,
    pub(crate) depth_stencil_attachment: Option<RecordedDepthAttachment>,
    pub(crate) commands: Vec<RenderCommand>,
}

impl RecordedPass {
    /// Every texture view the pass renders into, resolve targets included.
    pub(crate) fn attachments(&self) -> impl Iterator<Item = &TextureView> {
        let color = self.color_attachments.iter().flatten().flat_map(|attachment| {
            std::iter::once(&attachment.view).chain(attachment.resolve_target.as_ref())
        });
        color.chain(self.depth_stencil_attachment.iter().map(|depth| &depth.view))
    }

    /// Attachments cleared when the pass starts.
    pub(crate) fn clear_count(&self) -> usize {
        let color = self
            .color_attachments
            .iter()
            .flatten()
            .filter(|attachment| attachment.ops.load.is_clear())
            .count();
        let depth = self.depth_stencil_attachment.iter().map(|attachment| {
            usize::from(attachment.depth_ops.is_some_and(|ops| ops.load.is_clear()))
                + usize::from(attachment.stencil_ops.is_some_and(|ops| ops.load.is_clear()))
        });
        color + depth.sum::<usize>()
    }

    /// Resources the pass reads, checked again at submission.
    pub(crate) fn validate_submit(&self) -> crate::device::GpuResult<()> {
        for view in self.attachments() {
            view.texture().check_not_destroyed()?;
        }
        for command in &self.commands {
            match command {
                RenderCommand::SetBindGroup { group, .. } => group.check_submittable()?,
                RenderCommand::SetVertexBuffer { buffer, .. }
                | RenderCommand::SetIndexBuffer { buffer, .. } => buffer.check_submittable()?,
                _ => {}
            }
        }
        Ok(())
    }
}
