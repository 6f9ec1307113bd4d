mod cube;

use std::time::Duration;

use anyhow::Result;
use rune_engine::logging::{LoggingConfig, init_logging};
use rune_engine::runtime::{FramePolicy, Runtime, RuntimeConfig};

use cube::CubeGame;

/// Frames rendered before the studio exits.
const FRAMES: u64 = 240;

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let summary = Runtime::run(
        RuntimeConfig {
            title: "rune studio".to_string(),
            size: (800, 600),
            frame_policy: FramePolicy::Stop,
            max_frames: Some(FRAMES),
            fixed_timestep: Some(Duration::from_micros(16_667)),
            ..Default::default()
        },
        CubeGame,
    )?;

    let stats = summary.stats;
    log::info!(
        "{} frames presented: {} draws, {} vertices, {} triangles, {} bytes uploaded",
        summary.presented,
        stats.draw_calls,
        stats.vertices,
        stats.primitives,
        stats.bytes_written
    );
    Ok(())
}
