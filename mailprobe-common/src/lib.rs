//! Shared plumbing for the mailprobe crates.
//!
//! Holds the logging setup and re-exports [`tracing`] so the protocol
//! macros ([`outgoing!`], [`incoming!`]) resolve from any crate in the
//! workspace.

pub mod logging;

pub use tracing;
