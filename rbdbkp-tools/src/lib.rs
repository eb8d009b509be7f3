//! Small utilities shared by the rbd-backup driver and orchestration crates.
//!
//! Kept deliberately narrow: process-invocation helpers and human-readable
//! byte formatting, the ambient bits every driver needs regardless of what
//! it talks to.

pub mod format;

mod command;
pub use command::{command_output, command_output_as_string, run_command};
