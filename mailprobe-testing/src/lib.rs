//! Test support for the mailprobe crates.
//!
//! Only ever used as a dev-dependency.

pub mod mock_server;

pub use mock_server::{MockSmtpServer, MockSmtpServerBuilder, QuitBehaviour, SmtpCommand, TlsMode};
