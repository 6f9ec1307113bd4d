use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::{DeviceShared, EncoderStateError, GpuResult, ValidationError};
use crate::pipeline::{RenderPipeline, is_color_renderable};
use crate::queue::check_aligned;
use crate::queue::worker::index_size;
use crate::resource::{BindGroup, BufferSlice, TextureView};

use super::encoder::{EncoderShared, EncoderState};
use super::{
    Command, RecordedColorAttachment, RecordedDepthAttachment, RecordedPass, RenderCommand,
};

/// What happens to an attachment when the pass starts.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum LoadOp<V> {
    Clear(V),
    Load,
}

impl<V> LoadOp<V> {
    pub fn is_clear(&self) -> bool {
        matches!(self, LoadOp::Clear(_))
    }
}

/// What happens to an attachment when the pass ends.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum StoreOp {
    #[default]
    Store,
    Discard,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Operations<V> {
    pub load: LoadOp<V>,
    pub store: StoreOp,
}

impl<V: Default> Default for Operations<V> {
    fn default() -> Self {
        Self {
            load: LoadOp::Clear(V::default()),
            store: StoreOp::Store,
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct RenderPassColorAttachment<'a> {
    pub view: &'a TextureView,
    /// Single-sampled target receiving the resolved contents of a multisampled `view`.
    pub resolve_target: Option<&'a TextureView>,
    pub ops: Operations<wgpu::Color>,
}

#[derive(Debug, Copy, Clone)]
pub struct RenderPassDepthStencilAttachment<'a> {
    pub view: &'a TextureView,
    pub depth_ops: Option<Operations<f32>>,
    pub stencil_ops: Option<Operations<u32>>,
}

#[derive(Debug, Clone, Default)]
pub struct RenderPassDescriptor<'a> {
    pub label: Option<&'a str>,
    pub color_attachments: &'a [Option<RenderPassColorAttachment<'a>>],
    pub depth_stencil_attachment: Option<RenderPassDepthStencilAttachment<'a>>,
}

/// Formats, sample count and size every pipeline and draw in the pass must agree with.
#[derive(Debug, Clone, PartialEq)]
struct PassTarget {
    color_formats: Vec<Option<wgpu::TextureFormat>>,
    depth_format: Option<wgpu::TextureFormat>,
    sample_count: u32,
    extent: (u32, u32),
}

/// Collects the shared size and sample count of all attachments.
#[derive(Default)]
struct AttachmentCheck {
    extent: Option<(u32, u32)>,
    sample_count: Option<u32>,
}

impl AttachmentCheck {
    fn visit(&mut self, device: &DeviceShared, view: &TextureView) -> GpuResult<()> {
        device.check_same(view.device())?;
        let texture = view.texture();
        texture.check_not_destroyed()?;
        texture.check_usage(wgpu::TextureUsages::RENDER_ATTACHMENT)?;
        if view.mip_level_count() != 1 {
            return Err(ValidationError::AttachmentMipCount.into());
        }

        match self.extent {
            None => self.extent = Some(view.extent()),
            Some(extent) if extent != view.extent() => {
                return Err(ValidationError::AttachmentSizeMismatch.into());
            }
            Some(_) => {}
        }
        match self.sample_count {
            None => self.sample_count = Some(view.sample_count()),
            Some(count) if count != view.sample_count() => {
                return Err(ValidationError::AttachmentSampleCountMismatch.into());
            }
            Some(_) => {}
        }
        Ok(())
    }
}

fn check_resolve_target(
    device: &DeviceShared,
    view: &TextureView,
    resolve: &TextureView,
) -> GpuResult<()> {
    device.check_same(resolve.device())?;
    resolve.texture().check_not_destroyed()?;
    resolve
        .texture()
        .check_usage(wgpu::TextureUsages::RENDER_ATTACHMENT)?;
    if view.sample_count() == 1 || resolve.sample_count() != 1 {
        return Err(ValidationError::AttachmentSampleCountMismatch.into());
    }
    if resolve.extent() != view.extent() {
        return Err(ValidationError::AttachmentSizeMismatch.into());
    }
    if resolve.format() != view.format() {
        return Err(ValidationError::ColorTargetMismatch.into());
    }
    Ok(())
}

/// Bindings current at the next draw.
struct DrawState {
    pipeline: Option<RenderPipeline>,
    bind_groups: Vec<Option<BindGroup>>,
    /// Bound byte length per vertex buffer slot.
    vertex_buffers: Vec<Option<u64>>,
    index: Option<(wgpu::IndexFormat, u64)>,
}

/// An open render pass.
///
/// Holds the encoder until [`end`](Self::end) is called or the pass is dropped.
/// Commands that fail validation are not recorded and leave the pass usable.
pub struct RenderPass {
    device: Arc<DeviceShared>,
    encoder: Arc<Mutex<EncoderShared>>,
    label: Option<String>,
    target: PassTarget,
    color_attachments: Vec<Option<RecordedColorAttachment>>,
    depth_stencil_attachment: Option<RecordedDepthAttachment>,
    commands: Vec<RenderCommand>,
    state: DrawState,
    debug_depth: u32,
}

impl std::fmt::Debug for RenderPass {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("RenderPass")
            .field("label", &self.label)
            .field("target", &self.target)
            .field("commands", &self.commands.len())
            .finish()
    }
}

impl RenderPass {
    pub(crate) fn begin(
        device: &Arc<DeviceShared>,
        encoder: Arc<Mutex<EncoderShared>>,
        desc: &RenderPassDescriptor<'_>,
    ) -> GpuResult<Self> {
        let limits = device.limits();
        if desc.color_attachments.len() > limits.max_color_attachments as usize {
            return Err(ValidationError::TooManyColorTargets {
                count: desc.color_attachments.len(),
                limit: limits.max_color_attachments,
            }
            .into());
        }

        let mut check = AttachmentCheck::default();
        let mut color_formats = Vec::with_capacity(desc.color_attachments.len());
        let mut color_attachments = Vec::with_capacity(desc.color_attachments.len());

        for attachment in desc.color_attachments {
            let Some(attachment) = attachment else {
                color_formats.push(None);
                color_attachments.push(None);
                continue;
            };
            check.visit(device, attachment.view)?;
            if !is_color_renderable(attachment.view.format()) {
                return Err(ValidationError::InvalidColorFormat(attachment.view.format()).into());
            }
            if let Some(resolve) = attachment.resolve_target {
                check_resolve_target(device, attachment.view, resolve)?;
            }

            color_formats.push(Some(attachment.view.format()));
            color_attachments.push(Some(RecordedColorAttachment {
                view: attachment.view.clone(),
                resolve_target: attachment.resolve_target.cloned(),
                ops: attachment.ops,
            }));
        }

        let depth_stencil_attachment = match &desc.depth_stencil_attachment {
            Some(attachment) => {
                check.visit(device, attachment.view)?;
                let format = attachment.view.format();
                if !format.is_depth_stencil_format() {
                    return Err(ValidationError::InvalidDepthFormat(format).into());
                }
                Some(RecordedDepthAttachment {
                    view: attachment.view.clone(),
                    depth_ops: attachment.depth_ops,
                    stencil_ops: attachment.stencil_ops,
                })
            }
            None => None,
        };

        let (Some(extent), Some(sample_count)) = (check.extent, check.sample_count) else {
            return Err(ValidationError::EmptyRenderPass.into());
        };

        let target = PassTarget {
            color_formats,
            depth_format: depth_stencil_attachment
                .as_ref()
                .map(|attachment| attachment.view.format()),
            sample_count,
            extent,
        };
        log::trace!(
            "render pass '{}' begun: {}x{} with {:?}",
            desc.label.unwrap_or("<unnamed>"),
            extent.0,
            extent.1,
            target.color_formats
        );

        Ok(Self {
            device: Arc::clone(device),
            encoder,
            label: desc.label.map(str::to_owned),
            target,
            color_attachments,
            depth_stencil_attachment,
            commands: Vec::new(),
            state: DrawState {
                pipeline: None,
                bind_groups: vec![None; limits.max_bind_groups as usize],
                vertex_buffers: vec![None; limits.max_vertex_buffers as usize],
                index: None,
            },
            debug_depth: 0,
        })
    }

    /// Binds `pipeline`. Its targets must match the pass attachments exactly.
    pub fn set_pipeline(&mut self, pipeline: &RenderPipeline) -> GpuResult<()> {
        self.device.check_alive()?;
        self.device.check_same(pipeline.device())?;

        if trim_unused(pipeline.color_formats()) != trim_unused(&self.target.color_formats) {
            return Err(ValidationError::ColorTargetMismatch.into());
        }
        if pipeline.depth_format() != self.target.depth_format {
            return Err(ValidationError::DepthFormatMismatch {
                pipeline: pipeline.depth_format(),
                attachment: self.target.depth_format,
            }
            .into());
        }
        if pipeline.sample_count() != self.target.sample_count {
            return Err(ValidationError::SampleCountMismatch {
                pipeline: pipeline.sample_count(),
                pass: self.target.sample_count,
            }
            .into());
        }

        self.state.pipeline = Some(pipeline.clone());
        self.commands
            .push(RenderCommand::SetPipeline(pipeline.clone()));
        Ok(())
    }

    pub fn set_bind_group(&mut self, index: u32, group: &BindGroup) -> GpuResult<()> {
        self.device.check_alive()?;
        let slot = self
            .state
            .bind_groups
            .get_mut(index as usize)
            .ok_or(ValidationError::BindGroupIndexTooLarge {
                index,
                limit: self.device.limits().max_bind_groups,
            })?;
        self.device.check_same(group.device())?;

        *slot = Some(group.clone());
        self.commands.push(RenderCommand::SetBindGroup {
            index,
            group: group.clone(),
        });
        Ok(())
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, slice: BufferSlice<'_>) -> GpuResult<()> {
        self.device.check_alive()?;
        let limit = self.device.limits().max_vertex_buffers;
        if slot >= limit {
            return Err(ValidationError::VertexSlotTooLarge { slot, limit }.into());
        }

        let buffer = slice.buffer();
        self.device.check_same(buffer.device())?;
        buffer.check_usage(wgpu::BufferUsages::VERTEX)?;
        check_aligned("vertex buffer offset", slice.offset(), 4)?;
        let size = resolve_slice(&slice)?;

        self.state.vertex_buffers[slot as usize] = Some(size);
        self.commands.push(RenderCommand::SetVertexBuffer {
            slot,
            buffer: buffer.clone(),
            offset: slice.offset(),
            size,
        });
        Ok(())
    }

    pub fn set_index_buffer(
        &mut self,
        slice: BufferSlice<'_>,
        format: wgpu::IndexFormat,
    ) -> GpuResult<()> {
        self.device.check_alive()?;

        let buffer = slice.buffer();
        self.device.check_same(buffer.device())?;
        buffer.check_usage(wgpu::BufferUsages::INDEX)?;
        check_aligned("index buffer offset", slice.offset(), index_size(format))?;
        let size = resolve_slice(&slice)?;

        self.state.index = Some((format, size));
        self.commands.push(RenderCommand::SetIndexBuffer {
            buffer: buffer.clone(),
            format,
            offset: slice.offset(),
            size,
        });
        Ok(())
    }

    /// Draws `vertices` for each of `instances` with the current bindings.
    pub fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) -> GpuResult<()> {
        self.device.check_alive()?;
        check_range(&vertices)?;
        check_range(&instances)?;
        self.validate_draw(Some(&vertices), &instances)?;

        self.commands.push(RenderCommand::Draw {
            vertices,
            instances,
        });
        Ok(())
    }

    /// Draws `indices` from the bound index buffer, offset by `base_vertex`.
    pub fn draw_indexed(
        &mut self,
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    ) -> GpuResult<()> {
        self.device.check_alive()?;
        check_range(&indices)?;
        check_range(&instances)?;
        self.validate_draw(None, &instances)?;

        let (format, size) = self.state.index.ok_or(ValidationError::MissingIndexBuffer)?;
        let strip_format = self
            .state
            .pipeline
            .as_ref()
            .and_then(|pipeline| pipeline.primitive().strip_index_format);
        if let Some(pipeline) = strip_format.filter(|strip| *strip != format) {
            return Err(ValidationError::IndexFormatMismatch {
                bound: format,
                pipeline,
            }
            .into());
        }
        let count = size / index_size(format);
        if u64::from(indices.end) > count {
            return Err(ValidationError::IndexRangeOutOfBounds {
                end: u64::from(indices.end),
                count,
            }
            .into());
        }

        self.commands.push(RenderCommand::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
        Ok(())
    }

    pub fn set_viewport(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        min_depth: f32,
        max_depth: f32,
    ) -> GpuResult<()> {
        self.device.check_alive()?;
        let depth_ok = (0.0..=1.0).contains(&min_depth)
            && (0.0..=1.0).contains(&max_depth)
            && min_depth <= max_depth;
        if !(width > 0.0 && height > 0.0 && depth_ok) {
            return Err(ValidationError::InvalidViewport.into());
        }

        self.commands.push(RenderCommand::SetViewport {
            x,
            y,
            width,
            height,
            min_depth,
            max_depth,
        });
        Ok(())
    }

    pub fn set_scissor_rect(&mut self, x: u32, y: u32, width: u32, height: u32) -> GpuResult<()> {
        self.device.check_alive()?;
        let (target_width, target_height) = self.target.extent;
        let fits = u64::from(x) + u64::from(width) <= u64::from(target_width)
            && u64::from(y) + u64::from(height) <= u64::from(target_height);
        if !fits {
            return Err(ValidationError::InvalidScissorRect.into());
        }

        self.commands.push(RenderCommand::SetScissorRect {
            x,
            y,
            width,
            height,
        });
        Ok(())
    }

    pub fn set_blend_constant(&mut self, color: wgpu::Color) -> GpuResult<()> {
        self.device.check_alive()?;
        self.commands.push(RenderCommand::SetBlendConstant(color));
        Ok(())
    }

    pub fn set_stencil_reference(&mut self, reference: u32) -> GpuResult<()> {
        self.device.check_alive()?;
        self.commands
            .push(RenderCommand::SetStencilReference(reference));
        Ok(())
    }

    pub fn push_debug_group(&mut self, label: &str) -> GpuResult<()> {
        self.device.check_alive()?;
        self.debug_depth += 1;
        self.commands
            .push(RenderCommand::PushDebugGroup(label.to_owned()));
        Ok(())
    }

    pub fn pop_debug_group(&mut self) -> GpuResult<()> {
        self.device.check_alive()?;
        if self.debug_depth == 0 {
            return Err(EncoderStateError::UnbalancedDebugGroup.into());
        }
        self.debug_depth -= 1;
        self.commands.push(RenderCommand::PopDebugGroup);
        Ok(())
    }

    pub fn insert_debug_marker(&mut self, label: &str) -> GpuResult<()> {
        self.device.check_alive()?;
        self.commands
            .push(RenderCommand::InsertDebugMarker(label.to_owned()));
        Ok(())
    }

    /// Closes the pass and hands the encoder back.
    pub fn end(self) {}

    fn validate_draw(&self, vertices: Option<&Range<u32>>, instances: &Range<u32>) -> GpuResult<()> {
        let pipeline = self
            .state
            .pipeline
            .as_ref()
            .ok_or(ValidationError::NoPipeline)?;

        for (index, layout) in pipeline.group_layouts().iter().enumerate() {
            let index = index as u32;
            let group = self
                .state
                .bind_groups
                .get(index as usize)
                .and_then(Option::as_ref)
                .ok_or(ValidationError::MissingBindGroup(index))?;
            if !group.layout().is_compatible(layout) {
                return Err(ValidationError::IncompatibleBindGroup(index).into());
            }
        }

        for (slot, info) in pipeline.vertex_buffers().iter().enumerate() {
            let slot = slot as u32;
            let available = self
                .state
                .vertex_buffers
                .get(slot as usize)
                .copied()
                .flatten()
                .ok_or(ValidationError::MissingVertexBuffer(slot))?;
            let required = match info.step_mode {
                wgpu::VertexStepMode::Instance => {
                    info.required_size(instances.start, instances.end - instances.start)
                }
                _ => match vertices {
                    Some(range) => info.required_size(range.start, range.end - range.start),
                    None => 0,
                },
            };
            if required > available {
                return Err(ValidationError::VertexBufferTooSmall {
                    slot,
                    required,
                    available,
                }
                .into());
            }
        }

        Ok(())
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        let recorded = RecordedPass {
            label: self.label.take(),
            color_attachments: std::mem::take(&mut self.color_attachments),
            depth_stencil_attachment: self.depth_stencil_attachment.take(),
            commands: std::mem::take(&mut self.commands),
        };
        log::trace!(
            "render pass '{}' ended with {} commands",
            recorded.label.as_deref().unwrap_or("<unnamed>"),
            recorded.commands.len()
        );

        let mut encoder = self.encoder.lock();
        if self.debug_depth != 0 {
            encoder.unbalanced = true;
        }
        encoder.commands.push(Command::RenderPass(recorded));
        encoder.state = EncoderState::Recording;
    }
}

fn check_range(range: &Range<u32>) -> GpuResult<()> {
    if range.start > range.end {
        return Err(ValidationError::InvalidDrawRange {
            start: range.start,
            end: range.end,
        }
        .into());
    }
    Ok(())
}

/// Byte length of `slice`, checked against its buffer.
fn resolve_slice(slice: &BufferSlice<'_>) -> GpuResult<u64> {
    let buffer = slice.buffer();
    buffer.check_range(slice.offset(), 0)?;
    let size = slice
        .len()
        .unwrap_or(buffer.size() - slice.offset());
    buffer.check_range(slice.offset(), size)?;
    Ok(size)
}

fn trim_unused(formats: &[Option<wgpu::TextureFormat>]) -> &[Option<wgpu::TextureFormat>] {
    let end = formats
        .iter()
        .rposition(Option::is_some)
        .map_or(0, |last| last + 1);
    &formats[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandEncoder;
    use crate::device::{Device, GpuError, Maintain};
    use crate::resource::{
        BindGroupDescriptor, BindGroupEntry, Buffer, BufferDescriptor, MapMode,
        TextureDescriptor,
    };
    use crate::test_support::{CubeScene, device};

    fn encoder(device: &Device) -> CommandEncoder {
        device.create_command_encoder(&Default::default()).unwrap()
    }

    fn vertex_buffer(device: &Device, size: u64) -> Buffer {
        device
            .create_buffer(&BufferDescriptor {
                label: Some("vertices"),
                size,
                usage: wgpu::BufferUsages::VERTEX,
                ..Default::default()
            })
            .unwrap()
    }

    fn view(device: &Device, format: wgpu::TextureFormat, size: u32) -> TextureView {
        device
            .create_texture(&TextureDescriptor {
                label: Some("attachment"),
                size: wgpu::Extent3d {
                    width: size,
                    height: size,
                    depth_or_array_layers: 1,
                },
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                ..Default::default()
            })
            .unwrap()
            .create_view(&Default::default())
            .unwrap()
    }

    // ── pass lifecycle ────────────────────────────────────────────────────

    #[test]
    fn nested_pass_fails() {
        let (device, _queue) = device();
        let scene = CubeScene::new(&device);
        let mut encoder = encoder(&device);

        let pass = scene.begin(&mut encoder).unwrap();
        assert_eq!(
            scene.begin(&mut encoder).unwrap_err(),
            GpuError::from(EncoderStateError::PassAlreadyOpen)
        );
        assert_eq!(
            encoder.finish().unwrap_err(),
            GpuError::from(EncoderStateError::PassStillOpen)
        );

        pass.end();
        scene.begin(&mut encoder).unwrap().end();
        encoder.finish().unwrap();
    }

    #[test]
    fn pass_needs_an_attachment() {
        let (device, _queue) = device();
        let mut encoder = encoder(&device);
        assert_eq!(
            encoder
                .begin_render_pass(&RenderPassDescriptor::default())
                .unwrap_err(),
            GpuError::from(ValidationError::EmptyRenderPass)
        );
    }

    #[test]
    fn attachment_sizes_must_agree() {
        let (device, _queue) = device();
        let color = view(&device, wgpu::TextureFormat::Rgba8Unorm, 64);
        let depth = view(&device, wgpu::TextureFormat::Depth24Plus, 32);
        let mut encoder = encoder(&device);

        let err = encoder
            .begin_render_pass(&RenderPassDescriptor {
                label: None,
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &color,
                    resolve_target: None,
                    ops: Operations::default(),
                })],
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: &depth,
                    depth_ops: Some(Operations::default()),
                    stencil_ops: None,
                }),
            })
            .unwrap_err();
        assert_eq!(err, GpuError::from(ValidationError::AttachmentSizeMismatch));
    }

    #[test]
    fn debug_groups_left_open_fail_finish() {
        let (device, _queue) = device();
        let scene = CubeScene::new(&device);
        let mut encoder = encoder(&device);

        let mut pass = scene.begin(&mut encoder).unwrap();
        pass.push_debug_group("cube").unwrap();
        pass.end();
        assert_eq!(
            encoder.finish().unwrap_err(),
            GpuError::from(EncoderStateError::UnbalancedDebugGroup)
        );
    }

    // ── pipeline compatibility ────────────────────────────────────────────

    #[test]
    fn depth_attachment_must_match_pipeline() {
        let (device, _queue) = device();
        let scene = CubeScene::new(&device);
        let other_depth = view(&device, wgpu::TextureFormat::Depth32Float, CubeScene::SIZE);
        let mut encoder = encoder(&device);

        let mut pass = encoder
            .begin_render_pass(&RenderPassDescriptor {
                label: None,
                color_attachments: &[Some(scene.color_attachment())],
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: &other_depth,
                    depth_ops: Some(Operations::default()),
                    stencil_ops: None,
                }),
            })
            .unwrap();
        assert_eq!(
            pass.set_pipeline(&scene.pipeline).unwrap_err(),
            GpuError::from(ValidationError::DepthFormatMismatch {
                pipeline: Some(wgpu::TextureFormat::Depth24Plus),
                attachment: Some(wgpu::TextureFormat::Depth32Float),
            })
        );
        pass.end();

        let mut pass = encoder
            .begin_render_pass(&RenderPassDescriptor {
                label: None,
                color_attachments: &[Some(scene.color_attachment())],
                depth_stencil_attachment: None,
            })
            .unwrap();
        assert_eq!(
            pass.set_pipeline(&scene.pipeline).unwrap_err(),
            GpuError::from(ValidationError::DepthFormatMismatch {
                pipeline: Some(wgpu::TextureFormat::Depth24Plus),
                attachment: None,
            })
        );
        pass.end();

        let mut pass = scene.begin(&mut encoder).unwrap();
        pass.set_pipeline(&scene.pipeline).unwrap();
    }

    #[test]
    fn color_formats_must_match_pipeline() {
        let (device, _queue) = device();
        let scene = CubeScene::new(&device);
        let color = view(&device, wgpu::TextureFormat::Rgba8Unorm, CubeScene::SIZE);
        let mut encoder = encoder(&device);

        let mut pass = encoder
            .begin_render_pass(&RenderPassDescriptor {
                label: None,
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &color,
                    resolve_target: None,
                    ops: Operations::default(),
                })],
                depth_stencil_attachment: Some(scene.depth_attachment()),
            })
            .unwrap();
        assert_eq!(
            pass.set_pipeline(&scene.pipeline).unwrap_err(),
            GpuError::from(ValidationError::ColorTargetMismatch)
        );
    }

    // ── draw validation ───────────────────────────────────────────────────

    #[test]
    fn draw_requires_pipeline_and_bindings() {
        let (device, _queue) = device();
        let scene = CubeScene::new(&device);
        let mut encoder = encoder(&device);
        let mut pass = scene.begin(&mut encoder).unwrap();

        assert_eq!(
            pass.draw(0..36, 0..1).unwrap_err(),
            GpuError::from(ValidationError::NoPipeline)
        );

        pass.set_pipeline(&scene.pipeline).unwrap();
        assert_eq!(
            pass.draw(0..36, 0..1).unwrap_err(),
            GpuError::from(ValidationError::MissingBindGroup(0))
        );

        pass.set_bind_group(0, &scene.bind_group).unwrap();
        assert_eq!(
            pass.draw(0..36, 0..1).unwrap_err(),
            GpuError::from(ValidationError::MissingVertexBuffer(0))
        );

        pass.set_vertex_buffer(0, scene.vertices.slice(..).unwrap()).unwrap();
        pass.draw(0..36, 0..1).unwrap();
    }

    #[test]
    fn vertex_buffer_must_cover_the_draw() {
        let (device, _queue) = device();
        let scene = CubeScene::new(&device);
        let short = vertex_buffer(&device, 1400);
        let mut encoder = encoder(&device);
        let mut pass = scene.begin(&mut encoder).unwrap();
        pass.set_pipeline(&scene.pipeline).unwrap();
        pass.set_bind_group(0, &scene.bind_group).unwrap();

        pass.set_vertex_buffer(0, short.slice(..).unwrap()).unwrap();
        assert_eq!(
            pass.draw(0..36, 0..1).unwrap_err(),
            GpuError::from(ValidationError::VertexBufferTooSmall {
                slot: 0,
                required: 1440,
                available: 1400
            })
        );

        pass.set_vertex_buffer(0, scene.vertices.slice(40..).unwrap()).unwrap();
        pass.draw(0..35, 0..1).unwrap();
        assert!(pass.draw(0..36, 0..1).is_err());
    }

    #[test]
    fn incompatible_bind_group_fails() {
        let (device, _queue) = device();
        let scene = CubeScene::new(&device);
        let layout = device
            .create_bind_group_layout(&crate::resource::BindGroupLayoutDescriptor {
                label: Some("unrelated"),
                entries: &[],
            })
            .unwrap();
        let empty = device
            .create_bind_group(&BindGroupDescriptor {
                label: None,
                layout: &layout,
                entries: &[],
            })
            .unwrap();

        let mut encoder = encoder(&device);
        let mut pass = scene.begin(&mut encoder).unwrap();
        pass.set_pipeline(&scene.pipeline).unwrap();
        pass.set_bind_group(0, &empty).unwrap();
        pass.set_vertex_buffer(0, scene.vertices.slice(..).unwrap()).unwrap();
        assert_eq!(
            pass.draw(0..36, 0..1).unwrap_err(),
            GpuError::from(ValidationError::IncompatibleBindGroup(0))
        );
    }

    #[test]
    fn indexed_draw_stays_inside_index_buffer() {
        let (device, _queue) = device();
        let scene = CubeScene::new(&device);
        let indices = device
            .create_buffer(&BufferDescriptor {
                label: Some("indices"),
                size: 12,
                usage: wgpu::BufferUsages::INDEX,
                ..Default::default()
            })
            .unwrap();

        let mut encoder = encoder(&device);
        let mut pass = scene.begin(&mut encoder).unwrap();
        scene.bind(&mut pass);

        assert_eq!(
            pass.draw_indexed(0..3, 0, 0..1).unwrap_err(),
            GpuError::from(ValidationError::MissingIndexBuffer)
        );
        pass.set_index_buffer(indices.slice(..).unwrap(), wgpu::IndexFormat::Uint16)
            .unwrap();
        pass.draw_indexed(0..6, 0, 0..1).unwrap();
        assert_eq!(
            pass.draw_indexed(0..7, 0, 0..1).unwrap_err(),
            GpuError::from(ValidationError::IndexRangeOutOfBounds { end: 7, count: 6 })
        );
    }

    #[test]
    fn reversed_ranges_and_bad_rects_fail() {
        let (device, _queue) = device();
        let scene = CubeScene::new(&device);
        let mut encoder = encoder(&device);
        let mut pass = scene.begin(&mut encoder).unwrap();
        scene.bind(&mut pass);

        #[allow(clippy::reversed_empty_ranges)]
        let reversed = 6..3;
        assert_eq!(
            pass.draw(reversed, 0..1).unwrap_err(),
            GpuError::from(ValidationError::InvalidDrawRange { start: 6, end: 3 })
        );
        assert_eq!(
            pass.set_scissor_rect(0, 0, CubeScene::SIZE + 1, 1)
                .unwrap_err(),
            GpuError::from(ValidationError::InvalidScissorRect)
        );
        assert_eq!(
            pass.set_viewport(0.0, 0.0, 0.0, 1.0, 0.0, 1.0).unwrap_err(),
            GpuError::from(ValidationError::InvalidViewport)
        );
        pass.set_scissor_rect(0, 0, CubeScene::SIZE, CubeScene::SIZE)
            .unwrap();
    }

    // ── device loss ───────────────────────────────────────────────────────

    #[test]
    fn open_pass_state_setters_fail_after_destroy() {
        let (device, _queue) = device();
        let scene = CubeScene::new(&device);
        let mut encoder = encoder(&device);
        let mut pass = scene.begin(&mut encoder).unwrap();
        pass.push_debug_group("outer").unwrap();

        device.destroy();
        let lost = GpuError::UseAfterDeviceLost;
        assert_eq!(
            pass.set_viewport(0.0, 0.0, 1.0, 1.0, 0.0, 1.0).unwrap_err(),
            lost
        );
        assert_eq!(pass.set_scissor_rect(0, 0, 1, 1).unwrap_err(), lost);
        assert_eq!(
            pass.set_blend_constant(wgpu::Color::WHITE).unwrap_err(),
            lost
        );
        assert_eq!(pass.set_stencil_reference(1).unwrap_err(), lost);
        assert_eq!(pass.push_debug_group("inner").unwrap_err(), lost);
        assert_eq!(pass.pop_debug_group().unwrap_err(), lost);
        assert_eq!(pass.insert_debug_marker("here").unwrap_err(), lost);
    }

    #[test]
    fn objects_created_before_destroy_fail_after_it() {
        let (device, _queue) = device();
        let scene = CubeScene::new(&device);
        let readback = device
            .create_buffer(&BufferDescriptor {
                label: Some("readback"),
                size: 16,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                ..Default::default()
            })
            .unwrap();
        let mut recording = encoder(&device);
        let mut idle = encoder(&device);
        let mut pass = scene.begin(&mut recording).unwrap();

        device.destroy();
        let lost = Some(GpuError::UseAfterDeviceLost);
        assert_eq!(scene.pipeline.get_bind_group_layout(0).err(), lost);
        assert_eq!(readback.map_async(MapMode::Read).err(), lost);
        assert_eq!(scene.begin(&mut idle).err(), lost);
        assert_eq!(pass.set_pipeline(&scene.pipeline).err(), lost);
        assert_eq!(pass.draw(0..36, 0..1).err(), lost);

        pass.end();
        assert_eq!(recording.finish().err(), lost);
        assert_eq!(idle.finish().err(), lost);
    }

    // ── execution ─────────────────────────────────────────────────────────

    #[test]
    fn cube_draw_assembles_twelve_triangles() {
        let (device, queue) = device();
        let scene = CubeScene::new(&device);
        let mut encoder = encoder(&device);
        {
            let mut pass = scene.begin(&mut encoder).unwrap();
            scene.bind(&mut pass);
            pass.draw(0..36, 0..1).unwrap();
        }
        queue.submit([encoder.finish().unwrap()]).unwrap();
        device.poll(Maintain::Wait).unwrap();

        let stats = device.stats();
        assert_eq!(stats.render_passes, 1);
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(stats.vertices, 36);
        assert_eq!(stats.primitives, 12);
        assert_eq!(stats.attachment_clears, 2);
    }

    #[test]
    fn destroyed_attachment_rejects_submit() {
        let (device, queue) = device();
        let scene = CubeScene::new(&device);
        let mut encoder = encoder(&device);
        scene.begin(&mut encoder).unwrap().end();
        let command_buffer = encoder.finish().unwrap();

        scene.depth.texture().destroy();
        let err = queue.submit([command_buffer]).unwrap_err();
        assert!(matches!(
            err,
            GpuError::Validation(ValidationError::DestroyedResource { kind: "texture", .. })
        ));
    }

    #[test]
    fn unused_trailing_targets_are_ignored() {
        let formats = [Some(wgpu::TextureFormat::Rgba8Unorm), None, None];
        assert_eq!(trim_unused(&formats), &formats[..1]);
        assert!(trim_unused(&[None]).is_empty());
    }

    #[test]
    fn bind_group_on_derived_layout_is_compatible() {
        let (device, _queue) = device();
        let scene = CubeScene::new(&device);
        let regrouped = device
            .create_bind_group(&BindGroupDescriptor {
                label: Some("again"),
                layout: &scene.pipeline.get_bind_group_layout(0).unwrap(),
                entries: &[BindGroupEntry {
                    binding: 0,
                    resource: scene.uniforms.as_entire_binding(),
                }],
            })
            .unwrap();

        let mut encoder = encoder(&device);
        let mut pass = scene.begin(&mut encoder).unwrap();
        scene.bind(&mut pass);
        pass.set_bind_group(0, &regrouped).unwrap();
        pass.draw(0..36, 0..1).unwrap();
    }
}
