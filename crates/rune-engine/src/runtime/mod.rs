//! Headless host loop.
//!
//! Owns the GPU stack and drives a `Game` through init, update and render.

mod host;

pub use host::{FrameOutcome, FramePolicy, RunSummary, Runtime, RuntimeConfig};
