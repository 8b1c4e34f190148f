//! Error types for mail transports.

use std::{io, time::Duration};

use thiserror::Error;

/// Errors that can occur while opening or closing a mail transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// IO error occurred during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// An operation did not complete in time.
    #[error("{operation} timed out after {}s", timeout.as_secs())]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// TLS/SSL error occurred.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Failed to parse an SMTP reply from the server.
    #[error("Failed to parse SMTP reply: {0}")]
    Parse(String),

    /// The server answered with a reply code other than the one expected.
    #[error("Server rejected {command}: {code} {message}")]
    Rejected {
        command: &'static str,
        code: u16,
        message: String,
    },

    /// No transport is registered for the requested protocol.
    #[error("No transport registered for protocol '{0}'")]
    UnsupportedProtocol(String),

    /// Credentials were supplied but could not be used.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// STARTTLS was required but the server does not offer it.
    #[error("Server does not advertise STARTTLS")]
    StartTlsUnavailable,

    /// Connection was closed unexpectedly.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Specialized `Result` type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
