//! Rune engine crate.
//!
//! A retained-mode GPU object model for sandboxed guest modules, backed by a
//! headless validating device, plus the host loop that drives guests through
//! `init`, `update` and `render`.

pub mod command;
pub mod core;
pub mod device;
pub mod logging;
pub mod pipeline;
pub mod queue;
pub mod resource;
pub mod runtime;
pub mod time;
