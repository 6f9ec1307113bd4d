//! Core guest-facing contracts.
//!
//! This module defines the stable interface between the host runtime and
//! guest modules: the `Game` lifecycle and the contexts each callback receives.

mod ctx;
mod game;

pub use ctx::{FrameCtx, InitCtx};
pub use game::Game;
