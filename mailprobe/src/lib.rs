//! Configuration loading and output for the `mailprobe` command.

pub mod config;
pub mod report;
