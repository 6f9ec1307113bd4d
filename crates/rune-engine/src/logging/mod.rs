//! Logging utilities.
//!
//! This module centralizes logger initialization. Everything else in the
//! crate logs through the `log` facade; guest messages use [`GUEST_TARGET`].

mod init;

pub use init::{GUEST_TARGET, LoggingConfig, init_logging};
