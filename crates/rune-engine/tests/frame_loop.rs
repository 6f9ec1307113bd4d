//! Guest lifecycle driven by the headless runtime.

use std::time::Duration;

use anyhow::Result;
use rune_engine::command::{LoadOp, Operations, RenderPassColorAttachment, RenderPassDescriptor, StoreOp};
use rune_engine::core::{FrameCtx, Game, InitCtx};
use rune_engine::resource::{Buffer, BufferDescriptor};
use rune_engine::runtime::{FramePolicy, Runtime, RuntimeConfig};
use rune_engine::time::FrameTime;

/// Clears the frame to a color that changes every update.
struct Pulse {
    init_calls: u32,
}

struct PulseState {
    phase: f32,
    log: Vec<String>,
    tint: Buffer,
}

impl Game for Pulse {
    type State = PulseState;

    fn init(&mut self, ctx: &mut InitCtx<'_>) -> Result<PulseState> {
        self.init_calls += 1;
        ctx.log("pulse starting");

        let tint = ctx.device().create_buffer(&BufferDescriptor {
            label: Some("tint"),
            size: 16,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            ..Default::default()
        })?;
        Ok(PulseState {
            phase: 0.0,
            log: vec!["init".to_owned()],
            tint,
        })
    }

    fn update(&mut self, state: &mut PulseState, time: FrameTime) -> Result<()> {
        state.phase += time.dt;
        state.log.push(format!("update {}", time.frame_index));
        Ok(())
    }

    fn render(&self, state: &PulseState, ctx: &mut FrameCtx<'_>, time: FrameTime) -> Result<()> {
        assert_eq!(
            state.log.last().map(String::as_str),
            Some(format!("update {}", time.frame_index).as_str())
        );

        ctx.queue()
            .write_buffer(&state.tint, 0, bytemuck::cast_slice(&[state.phase; 4]))?;

        let view = ctx.current_view()?;
        let mut encoder = ctx.device().create_command_encoder(&Default::default())?;
        encoder
            .begin_render_pass(&RenderPassDescriptor {
                label: Some("pulse"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(wgpu::Color {
                            r: f64::from(state.phase.sin().abs()),
                            g: 0.2,
                            b: 0.4,
                            a: 1.0,
                        }),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
            })?
            .end();
        ctx.queue().submit([encoder.finish()?])?;
        Ok(())
    }
}

#[test]
fn runs_fixed_number_of_frames() {
    let config = RuntimeConfig {
        title: "pulse".to_owned(),
        size: (200, 100),
        frame_policy: FramePolicy::Stop,
        max_frames: Some(5),
        fixed_timestep: Some(Duration::from_millis(20)),
        ..Default::default()
    };

    let mut runtime = Runtime::new(config, Pulse { init_calls: 0 }).unwrap();
    let summary = runtime.run_loop().unwrap();

    assert_eq!(runtime.game().init_calls, 1);
    assert_eq!(
        runtime.state().log,
        ["init", "update 0", "update 1", "update 2", "update 3", "update 4"]
    );
    assert!((runtime.state().phase - 0.08).abs() < 1e-4);

    assert_eq!(summary.frames, 5);
    assert_eq!(summary.presented, 5);
    assert_eq!(summary.skipped, 0);

    runtime
        .gpu()
        .device()
        .poll(rune_engine::device::Maintain::Wait)
        .unwrap();
    let stats = runtime.gpu().device().stats();
    assert_eq!(stats.submissions, 5);
    assert_eq!(stats.render_passes, 5);
    assert_eq!(stats.attachment_clears, 5);
    assert_eq!(stats.bytes_written, 80);
}
