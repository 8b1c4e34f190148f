//! SMTP implementation of [`MailTransport`].
//!
//! `connect` walks the session up to the point where a message could be
//! sent: greeting, EHLO (HELO fallback), STARTTLS, AUTH. `close` sends QUIT
//! and tears the stream down. Nothing is ever delivered.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};

use crate::{
    config::{Credentials, SmtpSettings, StartTls},
    connection::Connection,
    error::{Result, TransportError},
    reply::Reply,
    transport::MailTransport,
};

/// How TLS is applied to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Security {
    /// Plain TCP, STARTTLS according to [`SmtpSettings::starttls`].
    Negotiated,
    /// TLS from the first byte (`smtps`).
    Implicit,
}

/// An SMTP session that stops short of sending mail.
pub struct SmtpTransport {
    settings: SmtpSettings,
    security: Security,
    connection: Option<Connection>,
}

impl SmtpTransport {
    /// Plain SMTP, upgraded with STARTTLS per the settings.
    #[must_use]
    pub const fn new(settings: SmtpSettings) -> Self {
        Self {
            settings,
            security: Security::Negotiated,
            connection: None,
        }
    }

    /// SMTP over implicit TLS.
    #[must_use]
    pub const fn implicit_tls(settings: SmtpSettings) -> Self {
        Self {
            settings,
            security: Security::Implicit,
            connection: None,
        }
    }

    /// Whether the current session runs over TLS.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.connection.as_ref().is_some_and(Connection::is_tls)
    }

    async fn open(
        &self,
        host: &str,
        port: u16,
        credentials: Option<&Credentials>,
    ) -> Result<Connection> {
        let timeouts = self.settings.timeouts;

        let mut connection = Connection::open(host, port, timeouts.connect()).await?;
        if self.security == Security::Implicit {
            connection = tokio::time::timeout(
                timeouts.connect(),
                connection.upgrade(host, self.settings.accept_invalid_certs),
            )
            .await
            .map_err(|_| TransportError::Timeout {
                operation: "TLS handshake",
                timeout: timeouts.connect(),
            })??;
        }

        let greeting = connection.read_reply("greeting", timeouts.command()).await?;
        expect("greeting", &greeting, 220)?;

        let mut capabilities = self.hello(&mut connection).await?;

        if self.security == Security::Negotiated {
            let offered = capabilities.advertises("STARTTLS");
            match self.settings.starttls {
                StartTls::Disabled => {}
                StartTls::Required if !offered => {
                    return Err(TransportError::StartTlsUnavailable);
                }
                StartTls::Opportunistic if !offered => {
                    tracing::debug!(host, "STARTTLS not offered, continuing in plaintext");
                }
                StartTls::Required | StartTls::Opportunistic => {
                    connection.send_line("STARTTLS").await?;
                    let reply = connection.read_reply("STARTTLS", timeouts.command()).await?;
                    expect("STARTTLS", &reply, 220)?;

                    connection = connection
                        .upgrade(host, self.settings.accept_invalid_certs)
                        .await?;
                    capabilities = self.hello(&mut connection).await?;
                }
            }
        }

        if let Some(credentials) = credentials {
            self.authenticate(&mut connection, &capabilities, credentials)
                .await?;
        }

        Ok(connection)
    }

    /// Sends EHLO, falling back to HELO for servers that reject it.
    async fn hello(&self, connection: &mut Connection) -> Result<Reply> {
        let limit = self.settings.timeouts.command();
        let domain = &self.settings.helo_domain;

        connection.send_line(&format!("EHLO {domain}")).await?;
        let reply = connection.read_reply("EHLO", limit).await?;
        if reply.is_permanent_failure() {
            tracing::debug!(code = reply.code, "EHLO rejected, falling back to HELO");
            connection.send_line(&format!("HELO {domain}")).await?;
            let reply = connection.read_reply("HELO", limit).await?;
            expect("HELO", &reply, 250)?;
            return Ok(reply);
        }

        expect("EHLO", &reply, 250)?;
        Ok(reply)
    }

    async fn authenticate(
        &self,
        connection: &mut Connection,
        capabilities: &Reply,
        credentials: &Credentials,
    ) -> Result<()> {
        let limit = self.settings.timeouts.command();
        let mechanisms = capabilities.auth_mechanisms();

        if mechanisms.iter().any(|m| m == "PLAIN") {
            let token = STANDARD.encode(format!(
                "\0{}\0{}",
                credentials.username, credentials.password
            ));
            connection.send_secret(&format!("AUTH PLAIN {token}")).await?;
        } else if mechanisms.iter().any(|m| m == "LOGIN") {
            connection.send_line("AUTH LOGIN").await?;
            let reply = connection.read_reply("AUTH", limit).await?;
            expect("AUTH", &reply, 334)?;

            connection
                .send_secret(&STANDARD.encode(&credentials.username))
                .await?;
            let reply = connection.read_reply("AUTH", limit).await?;
            expect("AUTH", &reply, 334)?;

            connection
                .send_secret(&STANDARD.encode(&credentials.password))
                .await?;
        } else {
            return Err(TransportError::Authentication(if mechanisms.is_empty() {
                "server does not advertise AUTH".to_string()
            } else {
                format!("no supported mechanism in {}", mechanisms.join(" "))
            }));
        }

        let reply = connection.read_reply("AUTH", limit).await?;
        if reply.code != 235 {
            return Err(TransportError::Authentication(format!(
                "{} {}",
                reply.code,
                reply.message()
            )));
        }

        tracing::debug!(username = %credentials.username, "Authenticated");
        Ok(())
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    #[tracing::instrument(skip(self, credentials))]
    async fn connect(
        &mut self,
        host: &str,
        port: u16,
        credentials: Option<&Credentials>,
    ) -> Result<()> {
        if self.connection.is_some() {
            tracing::debug!("Already connected, reconnecting");
            self.close().await?;
        }

        self.connection = Some(self.open(host, port, credentials).await?);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // Taking the connection guarantees it is dropped whatever QUIT does.
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };

        connection.send_line("QUIT").await?;
        let reply = connection
            .read_reply("QUIT", self.settings.timeouts.quit())
            .await?;
        expect("QUIT", &reply, 221)?;

        connection.shutdown().await
    }

    fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

fn expect(command: &'static str, reply: &Reply, code: u16) -> Result<()> {
    if reply.code == code {
        Ok(())
    } else {
        Err(TransportError::Rejected {
            command,
            code: reply.code,
            message: reply.message(),
        })
    }
}
