use anyhow::Result;

use crate::time::FrameTime;

use super::ctx::{FrameCtx, InitCtx};

/// Contract implemented by guest modules.
///
/// The host calls [`init`](Game::init) exactly once, then for every frame
/// [`update`](Game::update) followed by [`render`](Game::render). Guest state
/// lives in the value `init` returns: `update` may change it, `render` only
/// reads it.
pub trait Game {
    type State;

    /// Creates resources and the initial state. An error aborts startup.
    fn init(&mut self, ctx: &mut InitCtx<'_>) -> Result<Self::State>;

    /// Advances the simulation by `time.dt`.
    fn update(&mut self, state: &mut Self::State, time: FrameTime) -> Result<()>;

    /// Records and submits the frame's GPU work.
    fn render(&self, state: &Self::State, ctx: &mut FrameCtx<'_>, time: FrameTime) -> Result<()>;
}
