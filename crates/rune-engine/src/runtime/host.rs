use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::core::{FrameCtx, Game, InitCtx};
use crate::device::{Gpu, GpuInit, Maintain, SurfaceErrorAction};
use crate::queue::ExecutionStats;
use crate::time::{FrameClock, FrameTime};

/// What the host does when `update` or `render` fails.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum FramePolicy {
    /// Log the error, drop the frame and keep running.
    SkipFrame,
    /// Stop the loop and return the error.
    #[default]
    Stop,
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Name used in host log lines.
    pub title: String,
    /// Drawable size in physical pixels.
    pub size: (u32, u32),
    pub gpu: GpuInit,
    pub frame_policy: FramePolicy,
    /// Stops [`Runtime::run`] after this many frames. `None` runs until the
    /// guest calls `FrameCtx::exit`.
    pub max_frames: Option<u64>,
    /// Advances frame time by a fixed step instead of the wall clock.
    pub fixed_timestep: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "rune".to_string(),
            size: (1280, 720),
            gpu: GpuInit::default(),
            frame_policy: FramePolicy::default(),
            max_frames: None,
            fixed_timestep: None,
        }
    }
}

/// Result of driving one frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameOutcome {
    /// `update` and `render` ran and the frame was presented.
    Presented,
    /// The frame was dropped; the loop may continue.
    Skipped,
    /// The frame was presented and the guest asked to stop.
    ExitRequested,
}

/// Totals reported when [`Runtime::run`] returns.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct RunSummary {
    pub frames: u64,
    pub presented: u64,
    pub skipped: u64,
    /// Whether the guest ended the loop through `FrameCtx::exit`.
    pub exit_requested: bool,
    /// Device work executed over the whole run.
    pub stats: ExecutionStats,
}

/// Headless host driving one guest.
///
/// `Game::init` runs once in [`Runtime::new`]; each [`Runtime::frame`] then
/// calls `update` strictly before `render` and presents on success.
pub struct Runtime<G: Game> {
    config: RuntimeConfig,
    gpu: Gpu,
    game: G,
    state: G::State,
    clock: FrameClock,
    summary: RunSummary,
}

impl<G: Game> std::fmt::Debug for Runtime<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("title", &self.config.title)
            .field("gpu", &self.gpu)
            .field("summary", &self.summary)
            .finish()
    }
}

impl<G: Game> Runtime<G> {
    /// Creates the GPU stack and runs `Game::init`.
    pub fn new(config: RuntimeConfig, mut game: G) -> Result<Self> {
        let gpu = pollster::block_on(Gpu::new(config.size, config.gpu.clone()))
            .with_context(|| format!("{}: GPU initialization failed", config.title))?;

        let state = {
            let mut ctx = InitCtx {
                device: gpu.device(),
                queue: gpu.queue(),
                surface_format: gpu.surface_format(),
                window_dimensions: gpu.size(),
            };
            game.init(&mut ctx)
                .with_context(|| format!("{}: guest init failed", config.title))?
        };

        log::info!("{}: guest initialized", config.title);

        Ok(Self {
            config,
            gpu,
            game,
            state,
            clock: FrameClock::new(),
            summary: RunSummary::default(),
        })
    }

    /// Initializes the guest and drives frames until it exits or
    /// `max_frames` is reached.
    pub fn run(config: RuntimeConfig, game: G) -> Result<RunSummary> {
        let mut runtime = Self::new(config, game)?;
        runtime.run_loop()
    }

    /// Drives frames on this runtime until it exits or `max_frames` is reached.
    pub fn run_loop(&mut self) -> Result<RunSummary> {
        let start = Instant::now();
        loop {
            if let Some(max) = self.config.max_frames
                && self.summary.frames >= max
            {
                break;
            }

            let outcome = match self.config.fixed_timestep {
                Some(step) => {
                    let frames = u32::try_from(self.summary.frames).unwrap_or(u32::MAX);
                    self.frame_at(start + step.saturating_mul(frames))?
                }
                None => self.frame()?,
            };
            if outcome == FrameOutcome::ExitRequested {
                break;
            }
        }

        if let Err(err) = self.gpu.device().poll(Maintain::Wait) {
            log::warn!("{}: queue did not drain: {err}", self.config.title);
        }
        self.summary.stats = self.gpu.device().stats();
        log::info!(
            "{}: stopped after {} frames ({} presented, {} skipped)",
            self.config.title,
            self.summary.frames,
            self.summary.presented,
            self.summary.skipped
        );
        Ok(self.summary)
    }

    /// Drives one frame timed by the wall clock.
    pub fn frame(&mut self) -> Result<FrameOutcome> {
        let time = self.clock.tick();
        self.drive(time)
    }

    /// Drives one frame as if it started at `now`.
    pub fn frame_at(&mut self, now: Instant) -> Result<FrameOutcome> {
        let time = self.clock.tick_at(now);
        self.drive(time)
    }

    fn drive(&mut self, time: FrameTime) -> Result<FrameOutcome> {
        self.summary.frames += 1;

        let frame = match self.gpu.current_texture() {
            Ok(frame) => frame,
            Err(err) => {
                return match self.gpu.handle_surface_error(err.clone()) {
                    SurfaceErrorAction::Fatal => Err(anyhow::Error::new(err)
                        .context(format!("{}: surface unusable", self.config.title))),
                    action => {
                        log::warn!(
                            "{}: frame {} skipped: {err} ({action:?})",
                            self.config.title,
                            time.frame_index
                        );
                        self.summary.skipped += 1;
                        Ok(FrameOutcome::Skipped)
                    }
                };
            }
        };

        if let Err(err) = self.game.update(&mut self.state, time) {
            return self.frame_failed(err, "update", time);
        }

        let mut ctx = FrameCtx {
            device: self.gpu.device(),
            queue: self.gpu.queue(),
            frame: &frame,
            window_dimensions: self.gpu.size(),
            exit_requested: false,
        };
        let rendered = self.game.render(&self.state, &mut ctx, time);
        let exit_requested = ctx.exit_requested;

        if let Err(err) = rendered {
            drop(frame);
            return self.frame_failed(err, "render", time);
        }

        frame.present();
        self.summary.presented += 1;

        if let Some(reason) = self.gpu.device().lost_reason() {
            anyhow::bail!("{}: device lost during frame ({reason:?})", self.config.title);
        }

        if exit_requested {
            log::info!("{}: guest requested exit", self.config.title);
            self.summary.exit_requested = true;
            return Ok(FrameOutcome::ExitRequested);
        }
        Ok(FrameOutcome::Presented)
    }

    fn frame_failed(
        &mut self,
        err: anyhow::Error,
        stage: &str,
        time: FrameTime,
    ) -> Result<FrameOutcome> {
        match self.config.frame_policy {
            FramePolicy::SkipFrame => {
                log::warn!(
                    "{}: {stage} failed on frame {}: {err:#}",
                    self.config.title,
                    time.frame_index
                );
                self.summary.skipped += 1;
                Ok(FrameOutcome::Skipped)
            }
            FramePolicy::Stop => Err(err.context(format!(
                "{}: {stage} failed on frame {}",
                self.config.title, time.frame_index
            ))),
        }
    }

    pub fn gpu(&self) -> &Gpu {
        &self.gpu
    }

    pub fn gpu_mut(&mut self) -> &mut Gpu {
        &mut self.gpu
    }

    pub fn game(&self) -> &G {
        &self.game
    }

    pub fn state(&self) -> &G::State {
        &self.state
    }

    /// Counters so far. `stats` is refreshed when the loop stops.
    pub fn summary(&self) -> RunSummary {
        self.summary
    }
}
