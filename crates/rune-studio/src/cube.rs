use std::f32::consts::FRAC_PI_4;

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use rune_engine::command::{
    LoadOp, Operations, RenderPassColorAttachment, RenderPassDepthStencilAttachment,
    RenderPassDescriptor, StoreOp,
};
use rune_engine::core::{FrameCtx, Game, InitCtx};
use rune_engine::pipeline::{
    DepthStencilState, FragmentState, PipelineLayoutChoice, PrimitiveState, RenderPipeline,
    RenderPipelineDescriptor, VertexBufferLayout, VertexState,
};
use rune_engine::resource::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, Buffer, BufferDescriptor,
    ShaderModuleDescriptor, TextureDescriptor, TextureView,
};
use rune_engine::time::FrameTime;

const SHADER: &str = r#"
struct Uniforms {
    model_view_projection: mat4x4<f32>,
};

@group(0) @binding(0) var<uniform> uniforms: Uniforms;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) uv: vec2<f32>,
};

@vertex
fn vs_main(
    @location(0) position: vec4<f32>,
    @location(1) color: vec4<f32>,
    @location(2) uv: vec2<f32>,
) -> VertexOutput {
    var out: VertexOutput;
    out.position = uniforms.model_view_projection * position;
    out.color = color;
    out.uv = uv;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let edge = min(min(in.uv.x, 1.0 - in.uv.x), min(in.uv.y, 1.0 - in.uv.y));
    return select(in.color, vec4<f32>(0.05, 0.05, 0.05, 1.0), edge < 0.03);
}
"#;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

/// Radians per second around the diagonal axis.
const SPIN_RATE: f32 = 1.0;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct Vertex {
    position: [f32; 4],
    color: [f32; 4],
    uv: [f32; 2],
}

const ATTRIBUTES: [wgpu::VertexAttribute; 3] = [
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x4,
        offset: 0,
        shader_location: 0,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x4,
        offset: 16,
        shader_location: 1,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x2,
        offset: 32,
        shader_location: 2,
    },
];

/// Two triangles per face, counter-clockwise seen from outside.
fn cube_vertices() -> Vec<Vertex> {
    const FACES: [[[f32; 3]; 4]; 6] = [
        [[1., -1., 1.], [-1., -1., 1.], [-1., -1., -1.], [1., -1., -1.]],
        [[1., 1., 1.], [1., -1., 1.], [1., -1., -1.], [1., 1., -1.]],
        [[-1., 1., 1.], [1., 1., 1.], [1., 1., -1.], [-1., 1., -1.]],
        [[-1., -1., 1.], [-1., 1., 1.], [-1., 1., -1.], [-1., -1., -1.]],
        [[1., 1., 1.], [-1., 1., 1.], [-1., -1., 1.], [1., -1., 1.]],
        [[1., -1., -1.], [-1., -1., -1.], [-1., 1., -1.], [1., 1., -1.]],
    ];
    const UVS: [[f32; 2]; 4] = [[0., 1.], [1., 1.], [1., 0.], [0., 0.]];

    FACES
        .iter()
        .flat_map(|face| {
            [0, 1, 2, 0, 2, 3].map(|corner| {
                let [x, y, z] = face[corner];
                Vertex {
                    position: [x, y, z, 1.0],
                    color: [(x + 1.) / 2., (y + 1.) / 2., (z + 1.) / 2., 1.0],
                    uv: UVS[corner],
                }
            })
        })
        .collect()
}

/// Spinning, depth-tested cube.
#[derive(Debug, Default)]
pub struct CubeGame;

pub struct CubeState {
    pipeline: RenderPipeline,
    bind_group: BindGroup,
    vertices: Buffer,
    vertex_count: u32,
    uniforms: Buffer,
    depth: TextureView,
    projection: Mat4,
    angle: f32,
}

impl CubeState {
    fn model_view_projection(&self) -> Mat4 {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let model = Mat4::from_axis_angle(Vec3::ONE.normalize(), self.angle);
        self.projection * view * model
    }
}

impl Game for CubeGame {
    type State = CubeState;

    fn init(&mut self, ctx: &mut InitCtx<'_>) -> Result<CubeState> {
        let device = ctx.device();
        let (width, height) = ctx.window_dimensions();

        let shader = device
            .create_shader_module(&ShaderModuleDescriptor {
                label: Some("cube"),
                code: SHADER,
                hints: &[],
            })
            .context("cube shader failed to compile")?;

        let pipeline = device
            .create_render_pipeline(&RenderPipelineDescriptor {
                label: Some("cube"),
                layout: PipelineLayoutChoice::Auto,
                vertex: VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[VertexBufferLayout {
                        array_stride: size_of::<Vertex>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &ATTRIBUTES,
                    }],
                },
                primitive: PrimitiveState {
                    cull_mode: Some(wgpu::Face::Back),
                    ..Default::default()
                },
                depth_stencil: Some(DepthStencilState::depth(
                    DEPTH_FORMAT,
                    wgpu::CompareFunction::Less,
                )),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: ctx.surface_format(),
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
            })
            .context("cube pipeline failed")?;

        let vertex_data = cube_vertices();
        let bytes: &[u8] = bytemuck::cast_slice(&vertex_data);
        let vertices = device.create_buffer(&BufferDescriptor {
            label: Some("cube vertices"),
            size: bytes.len() as u64,
            usage: wgpu::BufferUsages::VERTEX,
            mapped_at_creation: true,
            contents: Some(bytes),
        })?;
        vertices.unmap()?;

        let uniforms = device.create_buffer(&BufferDescriptor {
            label: Some("cube uniforms"),
            size: size_of::<Mat4>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            ..Default::default()
        })?;

        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("cube uniforms"),
            layout: &pipeline.get_bind_group_layout(0)?,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            }],
        })?;

        let depth = device
            .create_texture(&TextureDescriptor {
                label: Some("cube depth"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                ..Default::default()
            })?
            .create_view(&Default::default())?;

        ctx.log(&format!(
            "cube ready: {} vertices, {width}x{height}",
            vertex_data.len()
        ));

        Ok(CubeState {
            pipeline,
            bind_group,
            vertices,
            vertex_count: vertex_data.len() as u32,
            uniforms,
            depth,
            projection: Mat4::perspective_rh(
                FRAC_PI_4,
                width as f32 / height as f32,
                1.0,
                100.0,
            ),
            angle: 0.0,
        })
    }

    fn update(&mut self, state: &mut CubeState, time: FrameTime) -> Result<()> {
        state.angle = (state.angle + SPIN_RATE * time.dt) % std::f32::consts::TAU;
        Ok(())
    }

    fn render(&self, state: &CubeState, ctx: &mut FrameCtx<'_>, time: FrameTime) -> Result<()> {
        let mvp = state.model_view_projection();
        ctx.queue()
            .write_slice(&state.uniforms, 0, &mvp.to_cols_array())?;

        let view = ctx.current_view()?;
        let mut encoder = ctx.device().create_command_encoder(&Default::default())?;
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("cube"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(wgpu::Color {
                            r: 0.1,
                            g: 0.1,
                            b: 0.12,
                            a: 1.0,
                        }),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                    view: &state.depth,
                    depth_ops: Some(Operations {
                        load: LoadOp::Clear(1.0),
                        store: StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
            })?;
            pass.set_pipeline(&state.pipeline)?;
            pass.set_bind_group(0, &state.bind_group)?;
            pass.set_vertex_buffer(0, state.vertices.slice(..)?)?;
            pass.draw(0..state.vertex_count, 0..1)?;
        }
        ctx.queue().submit([encoder.finish()?])?;

        if time.frame_index % 60 == 0 {
            ctx.log(&format!(
                "frame {} at {:.2}s, angle {:.2} rad",
                time.frame_index, time.time, state.angle
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_twelve_triangles_of_forty_byte_vertices() {
        let vertices = cube_vertices();
        assert_eq!(vertices.len(), 36);
        assert_eq!(size_of::<Vertex>(), 40);
        assert_eq!(bytemuck::cast_slice::<Vertex, u8>(&vertices).len(), 1440);
    }

    #[test]
    fn faces_wind_outward() {
        let vertices = cube_vertices();
        for triangle in vertices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| Vec3::from_slice(&triangle[i].position[..3]));
            let normal = (b - a).cross(c - a);
            let center = (a + b + c) / 3.0;
            assert!(normal.dot(center) > 0.0, "inward face at {center:?}");
        }
    }
}
