//! Probe error types

use mailprobe_transport::TransportError;
use thiserror::Error;

/// Why a mail probe reported DOWN.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The transport could not be obtained or the connection could not be
    /// established.
    #[error("Failed to connect")]
    Connect(#[source] TransportError),

    /// The connection was established but not terminated cleanly.
    #[error("Failed to close connection")]
    Close(#[source] TransportError),
}
