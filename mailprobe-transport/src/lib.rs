//! Mail transports that can be opened and closed for health probing.
//!
//! The [`MailTransport`] trait is the two-call contract (`connect`, `close`)
//! a probe needs. [`SmtpTransport`] implements it against a real server;
//! [`TransportRegistry`] maps protocol identifiers (`smtp`, `smtps`, or
//! anything registered by the caller) to fresh transports.
//!
//! ```no_run
//! use mailprobe_transport::{MailTransport, SmtpSettings, TransportProvider, TransportRegistry};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = TransportRegistry::smtp(SmtpSettings::default());
//! let mut transport = registry.transport("smtp")?;
//!
//! transport.connect("smtp.example.com", 25, None).await?;
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;
mod error;
mod reply;
mod smtp;
mod transport;

pub use config::{
    Credentials, SMTP, SMTPS, SmtpSettings, StartTls, TransportConfig, TransportTimeouts,
};
pub use error::{Result, TransportError};
pub use reply::Reply;
pub use smtp::SmtpTransport;
pub use transport::{MailTransport, TransportProvider, TransportRegistry};
