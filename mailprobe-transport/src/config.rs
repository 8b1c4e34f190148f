//! Transport configuration.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// Protocol identifier for plain SMTP (optionally upgraded with STARTTLS).
pub const SMTP: &str = "smtp";

/// Protocol identifier for SMTP over implicit TLS.
pub const SMTPS: &str = "smtps";

/// Where and how to reach a mail server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Mail server host name or address.
    pub host: String,

    /// Mail server port.
    ///
    /// Default: 25
    #[serde(default = "defaults::port")]
    pub port: u16,

    /// Protocol identifier used to pick a transport, e.g. `smtp` or `smtps`.
    ///
    /// Default: `smtp`
    #[serde(default = "defaults::protocol")]
    pub protocol: String,

    /// Optional credentials. When present the transport authenticates as
    /// part of `connect`.
    #[serde(default)]
    pub credentials: Option<Credentials>,

    #[serde(default)]
    pub settings: SmtpSettings,
}

impl TransportConfig {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            protocol: defaults::protocol(),
            credentials: None,
            settings: SmtpSettings::default(),
        }
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: SmtpSettings) -> Self {
        self.settings = settings;
        self
    }

    /// `<host>:<port>`, as reported in health details.
    #[must_use]
    pub fn location(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A username and password pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// STARTTLS behaviour for the `smtp` protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartTls {
    /// Never upgrade.
    Disabled,
    /// Upgrade when the server advertises STARTTLS.
    #[default]
    Opportunistic,
    /// Fail unless the upgrade succeeds.
    Required,
}

/// Protocol-level knobs for the SMTP transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpSettings {
    /// Name sent with EHLO/HELO.
    ///
    /// Default: `localhost`
    #[serde(default = "defaults::helo_domain")]
    pub helo_domain: String,

    #[serde(default)]
    pub starttls: StartTls,

    /// Skip certificate verification. Only for test servers with
    /// self-signed certificates.
    ///
    /// Default: false
    #[serde(default)]
    pub accept_invalid_certs: bool,

    #[serde(default)]
    pub timeouts: TransportTimeouts,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            helo_domain: defaults::helo_domain(),
            starttls: StartTls::default(),
            accept_invalid_certs: false,
            timeouts: TransportTimeouts::default(),
        }
    }
}

/// Timeouts for a probe connection.
///
/// These are shorter than delivery timeouts: a health check that hangs is
/// as bad as one that fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportTimeouts {
    /// Timeout for establishing the TCP (and implicit TLS) connection.
    ///
    /// Default: 10 seconds
    #[serde(default = "defaults::connect_secs")]
    pub connect_secs: u64,

    /// Timeout for each command reply, including the greeting.
    ///
    /// Default: 10 seconds
    #[serde(default = "defaults::command_secs")]
    pub command_secs: u64,

    /// Timeout for the QUIT reply.
    ///
    /// Default: 5 seconds
    #[serde(default = "defaults::quit_secs")]
    pub quit_secs: u64,
}

impl TransportTimeouts {
    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    #[must_use]
    pub const fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    #[must_use]
    pub const fn quit(&self) -> Duration {
        Duration::from_secs(self.quit_secs)
    }
}

impl Default for TransportTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: defaults::connect_secs(),
            command_secs: defaults::command_secs(),
            quit_secs: defaults::quit_secs(),
        }
    }
}

mod defaults {
    pub const fn port() -> u16 {
        25
    }

    pub fn protocol() -> String {
        super::SMTP.to_string()
    }

    pub fn helo_domain() -> String {
        "localhost".to_string()
    }

    pub const fn connect_secs() -> u64 {
        10
    }

    pub const fn command_secs() -> u64 {
        10
    }

    pub const fn quit_secs() -> u64 {
        5
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: TransportConfig = ron::from_str(r#"(host: "smtp.acme.org")"#).unwrap();

        assert_eq!(config, TransportConfig::new("smtp.acme.org", 25));
        assert_eq!(config.location(), "smtp.acme.org:25");
        assert_eq!(config.settings.starttls, StartTls::Opportunistic);
        assert_eq!(config.settings.timeouts.quit(), Duration::from_secs(5));
    }

    #[test]
    fn full_config() {
        let config: TransportConfig = ron::from_str(
            r#"(
                host: "mail.example.com",
                port: 465,
                protocol: "smtps",
                credentials: Some((username: "probe", password: "hunter2")),
                settings: (
                    helo_domain: "probe.example.com",
                    starttls: required,
                    timeouts: (connect_secs: 3),
                ),
            )"#,
        )
        .unwrap();

        assert_eq!(config.location(), "mail.example.com:465");
        assert_eq!(config.protocol, SMTPS);
        assert_eq!(
            config.credentials,
            Some(Credentials::new("probe", "hunter2"))
        );
        assert_eq!(config.settings.starttls, StartTls::Required);
        assert_eq!(config.settings.timeouts.connect_secs, 3);
        assert_eq!(config.settings.timeouts.command_secs, 10);
    }

    #[test]
    fn credentials_debug_hides_password() {
        let rendered = format!("{:?}", Credentials::new("probe", "hunter2"));
        assert!(rendered.contains("probe"));
        assert!(!rendered.contains("hunter2"));
    }
}
