//! Mail server reachability probe

use std::sync::Arc;

use async_trait::async_trait;
use mailprobe_transport::{TransportConfig, TransportProvider, TransportRegistry};

use crate::{
    Health, HealthIndicator, ProbeError,
    health::{ERROR, LOCATION},
};

/// Reports whether a mail server accepts connections.
///
/// Each call to [`HealthIndicator::health`] opens a fresh transport for the
/// configured protocol, connects, and immediately closes again. A failure
/// in either step is DOWN; the `location` detail is always present.
pub struct MailHealthIndicator {
    config: TransportConfig,
    provider: Arc<dyn TransportProvider>,
}

impl MailHealthIndicator {
    #[must_use]
    pub fn new(config: TransportConfig, provider: Arc<dyn TransportProvider>) -> Self {
        Self { config, provider }
    }

    /// An indicator using the built-in `smtp`/`smtps` transports with the
    /// settings carried by `config`.
    #[must_use]
    pub fn smtp(config: TransportConfig) -> Self {
        let provider = Arc::new(TransportRegistry::smtp(config.settings.clone()));
        Self::new(config, provider)
    }

    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Runs the connect/close pair without building a [`Health`].
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::Connect`] if no transport exists for the
    /// protocol or the connection fails, and [`ProbeError::Close`] if the
    /// connection cannot be terminated.
    pub async fn probe(&self) -> Result<(), ProbeError> {
        let config = &self.config;

        let mut transport = self
            .provider
            .transport(&config.protocol)
            .map_err(ProbeError::Connect)?;

        transport
            .connect(&config.host, config.port, config.credentials.as_ref())
            .await
            .map_err(ProbeError::Connect)?;

        tracing::debug!(location = %config.location(), "Connected, closing");

        transport.close().await.map_err(ProbeError::Close)
    }
}

#[async_trait]
impl HealthIndicator for MailHealthIndicator {
    fn name(&self) -> &str {
        "mail"
    }

    async fn health(&self) -> Health {
        let location = self.config.location();

        match self.probe().await {
            Ok(()) => {
                tracing::info!(%location, protocol = %self.config.protocol, "Mail server is up");
                Health::up().with_detail(LOCATION, location)
            }
            Err(err) => {
                let health = Health::down().with_detail(LOCATION, location).with_error(&err);
                tracing::warn!(
                    location = health.detail(LOCATION),
                    protocol = %self.config.protocol,
                    error = health.detail(ERROR),
                    "Mail server is down"
                );
                health
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use mailprobe_transport::{
        Credentials, MailTransport, Result, TransportError, TransportRegistry,
    };
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::Status;

    #[derive(Default)]
    struct SuccessTransport {
        connected: bool,
    }

    #[async_trait]
    impl MailTransport for SuccessTransport {
        async fn connect(&mut self, _: &str, _: u16, _: Option<&Credentials>) -> Result<()> {
            self.connected = true;
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.connected = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    struct ConnectFailingTransport;

    #[async_trait]
    impl MailTransport for ConnectFailingTransport {
        async fn connect(&mut self, _: &str, _: u16, _: Option<&Credentials>) -> Result<()> {
            Err(TransportError::Io(std::io::Error::other("fail on connect")))
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct CloseFailingTransport(SuccessTransport);

    #[async_trait]
    impl MailTransport for CloseFailingTransport {
        async fn connect(
            &mut self,
            host: &str,
            port: u16,
            credentials: Option<&Credentials>,
        ) -> Result<()> {
            self.0.connect(host, port, credentials).await
        }

        async fn close(&mut self) -> Result<()> {
            Err(TransportError::Io(std::io::Error::other("fail on close")))
        }

        fn is_connected(&self) -> bool {
            self.0.is_connected()
        }
    }

    /// Records what the probe passed to `connect`.
    struct Recording(Arc<std::sync::Mutex<Vec<(String, u16, Option<String>)>>>);

    #[async_trait]
    impl MailTransport for Recording {
        async fn connect(
            &mut self,
            host: &str,
            port: u16,
            credentials: Option<&Credentials>,
        ) -> Result<()> {
            self.0.lock().unwrap().push((
                host.to_string(),
                port,
                credentials.map(|c| c.username.clone()),
            ));
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            false
        }
    }

    fn registry() -> Arc<TransportRegistry> {
        Arc::new(
            TransportRegistry::new()
                .with("success", || Box::<SuccessTransport>::default())
                .with("fail", || Box::new(ConnectFailingTransport))
                .with("failOnClose", || Box::<CloseFailingTransport>::default()),
        )
    }

    fn indicator(protocol: &str) -> MailHealthIndicator {
        MailHealthIndicator::new(
            TransportConfig::new("smtp.acme.org", 25).with_protocol(protocol),
            registry(),
        )
    }

    #[tokio::test]
    async fn smtp_is_up() {
        let health = indicator("success").health().await;

        assert_eq!(health.status(), Status::Up);
        assert_eq!(health.detail(LOCATION), Some("smtp.acme.org:25"));
        assert_eq!(health.detail(ERROR), None);
    }

    #[tokio::test]
    async fn smtp_is_down() {
        let health = indicator("fail").health().await;

        assert_eq!(health.status(), Status::Down);
        assert_eq!(health.detail(LOCATION), Some("smtp.acme.org:25"));
        assert_eq!(
            health.detail(ERROR),
            Some("Failed to connect: IO error: fail on connect")
        );
    }

    #[tokio::test]
    async fn unexpected_error_on_close() {
        let health = indicator("failOnClose").health().await;

        assert_eq!(health.status(), Status::Down);
        assert_eq!(health.detail(LOCATION), Some("smtp.acme.org:25"));
        assert_eq!(
            health.detail(ERROR),
            Some("Failed to close connection: IO error: fail on close")
        );
    }

    #[tokio::test]
    async fn unknown_protocol_is_down() {
        let health = indicator("carrier-pigeon").health().await;

        assert_eq!(health.status(), Status::Down);
        assert_eq!(health.detail(LOCATION), Some("smtp.acme.org:25"));
        assert!(matches!(
            indicator("carrier-pigeon").probe().await,
            Err(ProbeError::Connect(TransportError::UnsupportedProtocol(_)))
        ));
    }

    #[tokio::test]
    async fn repeated_checks_agree() {
        for protocol in ["success", "fail", "failOnClose"] {
            let indicator = indicator(protocol);
            let first = indicator.health().await;
            for _ in 0..3 {
                assert_eq!(indicator.health().await, first);
            }
        }
    }

    #[tokio::test]
    async fn each_check_uses_a_fresh_transport() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let registry = TransportRegistry::new().with("success", move || {
            counter.fetch_add(1, Ordering::Relaxed);
            Box::<SuccessTransport>::default()
        });
        let indicator = MailHealthIndicator::new(
            TransportConfig::new("smtp.acme.org", 25).with_protocol("success"),
            Arc::new(registry),
        );

        indicator.health().await;
        indicator.health().await;

        assert_eq!(created.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn connect_receives_configured_endpoint_and_credentials() {
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let registry = TransportRegistry::new()
            .with("rec", move || Box::new(Recording(Arc::clone(&sink))));
        let indicator = MailHealthIndicator::new(
            TransportConfig::new("mail.example.com", 587)
                .with_protocol("rec")
                .with_credentials(Credentials::new("probe", "secret")),
            Arc::new(registry),
        );

        assert_eq!(indicator.health().await.status(), Status::Up);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![(
                "mail.example.com".to_string(),
                587,
                Some("probe".to_string())
            )]
        );
    }

    #[test]
    fn name_is_mail() {
        assert_eq!(indicator("success").name(), "mail");
    }
}
