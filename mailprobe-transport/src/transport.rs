//! The connect/close capability and its protocol registry.

use std::{fmt, sync::Arc};

use ahash::AHashMap;
use async_trait::async_trait;

use crate::{
    config::{Credentials, SMTP, SMTPS, SmtpSettings},
    error::{Result, TransportError},
    smtp::SmtpTransport,
};

/// A connection to a mail server that can be opened and closed.
///
/// This is the only contract a probe relies on. Implementations decide what
/// "connected" means (for SMTP: greeted, EHLO accepted, optionally
/// authenticated).
#[async_trait]
pub trait MailTransport: Send {
    /// Establishes the connection, authenticating when `credentials` are
    /// present.
    ///
    /// # Errors
    ///
    /// Returns an error if the server is unreachable or rejects the session.
    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        credentials: Option<&Credentials>,
    ) -> Result<()>;

    /// Terminates the connection. Calling this on a transport that is not
    /// connected does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not acknowledge the shutdown or
    /// the stream cannot be closed cleanly.
    async fn close(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;
}

/// Hands out a fresh transport for a protocol identifier.
pub trait TransportProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns [`TransportError::UnsupportedProtocol`] if `protocol` is
    /// unknown.
    fn transport(&self, protocol: &str) -> Result<Box<dyn MailTransport>>;
}

type Factory = Arc<dyn Fn() -> Box<dyn MailTransport> + Send + Sync>;

/// A [`TransportProvider`] backed by a table of named factories.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    factories: AHashMap<String, Factory>,
}

impl TransportRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the `smtp` and `smtps` transports.
    #[must_use]
    pub fn smtp(settings: SmtpSettings) -> Self {
        let implicit = settings.clone();
        Self::new()
            .with(SMTP, move || Box::new(SmtpTransport::new(settings.clone())))
            .with(SMTPS, move || {
                Box::new(SmtpTransport::implicit_tls(implicit.clone()))
            })
    }

    /// Registers (or replaces) the factory for `protocol`.
    #[must_use]
    pub fn with<F>(mut self, protocol: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn MailTransport> + Send + Sync + 'static,
    {
        self.factories
            .insert(protocol.into().to_ascii_lowercase(), Arc::new(factory));
        self
    }

    #[must_use]
    pub fn supports(&self, protocol: &str) -> bool {
        self.factories.contains_key(&protocol.to_ascii_lowercase())
    }
}

impl TransportProvider for TransportRegistry {
    fn transport(&self, protocol: &str) -> Result<Box<dyn MailTransport>> {
        self.factories
            .get(&protocol.to_ascii_lowercase())
            .map(|factory| factory())
            .ok_or_else(|| TransportError::UnsupportedProtocol(protocol.to_string()))
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut protocols = self.factories.keys().collect::<Vec<_>>();
        protocols.sort();
        f.debug_struct("TransportRegistry")
            .field("protocols", &protocols)
            .finish()
    }
}
