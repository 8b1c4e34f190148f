//! Scripted SMTP server for transport tests
//!
//! Speaks just enough SMTP to exercise a connect/close cycle:
//! - Configurable greeting, EHLO/HELO, STARTTLS, AUTH and QUIT replies
//! - STARTTLS upgrades and implicit TLS with a throwaway self-signed cert
//! - QUIT can be answered, ignored (hang) or answered by dropping the socket
//! - Records every command line it receives
//!
//! ```rust,no_run
//! use mailprobe_testing::MockSmtpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let server = MockSmtpServer::builder()
//!     .with_greeting(220, "mx.test ready")
//!     .with_quit_response(451, "not now")
//!     .build()
//!     .await?;
//!
//! // point a transport at server.addr()
//! # Ok(())
//! # }
//! ```

use std::{
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpListener,
    sync::RwLock,
    task::JoinHandle,
    time::timeout,
};
use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        ServerConfig,
        pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer},
    },
};

type Error = Box<dyn std::error::Error + Send + Sync>;

trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

/// SMTP command received by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    Helo(String),
    StartTls,
    /// `AUTH` with its arguments, e.g. `PLAIN <token>`
    Auth(String),
    /// A continuation line sent during `AUTH LOGIN`
    AuthData(String),
    Quit,
    Other(String),
}

/// What the server does when it sees QUIT
#[derive(Debug, Clone)]
pub enum QuitBehaviour {
    Reply(u16, String),
    /// Never answer
    Hang,
    /// Close the socket without answering
    Drop,
}

/// How the server offers TLS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Plaintext only; STARTTLS is answered with the configured reply
    None,
    /// Advertise STARTTLS and upgrade when asked
    StartTls,
    /// TLS from the first byte
    Implicit,
}

#[derive(Debug, Clone)]
struct Config {
    greeting: (u16, String),
    /// Continuation bytes sent ahead of the greeting, never terminated
    greeting_flood: Option<usize>,
    /// `None` rejects EHLO so the client must fall back to HELO
    ehlo: Option<(u16, Vec<String>)>,
    helo: (u16, String),
    starttls: (u16, String),
    auth: (u16, String),
    quit: QuitBehaviour,
    greeting_delay: Option<Duration>,
    tls: TlsMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            greeting: (220, "mock.test ESMTP".to_string()),
            greeting_flood: None,
            ehlo: Some((250, vec!["mock.test".to_string(), "SIZE 10240000".to_string()])),
            helo: (250, "mock.test".to_string()),
            starttls: (454, "TLS not available".to_string()),
            auth: (235, "Authentication successful".to_string()),
            quit: QuitBehaviour::Reply(221, "Bye".to_string()),
            greeting_delay: None,
            tls: TlsMode::None,
        }
    }
}

fn line(code: u16, text: &str) -> String {
    format!("{code} {text}\r\n")
}

/// A TLS acceptor with a fresh self-signed certificate for `localhost`
/// and `127.0.0.1`.
fn self_signed_acceptor() -> Result<TlsAcceptor, Error> {
    let certified = rcgen::generate_simple_self_signed(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])?;
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        certified.key_pair.serialize_der(),
    ));

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![certified.cert.der().clone()], key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Mock SMTP server bound to an ephemeral localhost port
pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<RwLock<Vec<SmtpCommand>>>,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            config: Config::default(),
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every command received so far, across all connections
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands.read().await.clone()
    }

    /// Number of accepted connections
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    #[allow(clippy::too_many_lines)]
    async fn handle_client(
        stream: Box<dyn Io>,
        config: Arc<Config>,
        acceptor: Option<TlsAcceptor>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> Result<(), Error> {
        if let Some(delay) = config.greeting_delay {
            tokio::time::sleep(delay).await;
        }

        let mut secure = false;
        let mut stream = stream;
        if let (Some(acceptor), TlsMode::Implicit) = (&acceptor, config.tls) {
            let tls: Box<dyn Io> = Box::new(acceptor.accept(stream).await?);
            stream = tls;
            secure = true;
        }

        let mut conn = BufReader::new(stream);
        let mut buf = String::new();
        let mut in_auth_login = 0usize;

        if let Some(flood) = config.greeting_flood {
            let chunk = format!("220-{}\r\n", "x".repeat(1018));
            conn.write_all(chunk.repeat(flood / chunk.len() + 1).as_bytes())
                .await?;
            conn.flush().await?;
            // Hold the line open without ever finishing the reply.
            tokio::time::sleep(Duration::from_secs(3600)).await;
            return Ok(());
        }

        conn.write_all(line(config.greeting.0, &config.greeting.1).as_bytes())
            .await?;
        conn.flush().await?;

        loop {
            buf.clear();
            let read = timeout(Duration::from_secs(10), conn.read_line(&mut buf)).await;
            let Ok(read) = read else {
                return Ok(());
            };
            if read? == 0 {
                return Ok(());
            }

            let received = buf.trim_end().to_string();

            if in_auth_login > 0 {
                commands
                    .write()
                    .await
                    .push(SmtpCommand::AuthData(received));
                in_auth_login -= 1;
                let reply = if in_auth_login == 0 {
                    line(config.auth.0, &config.auth.1)
                } else {
                    line(334, "UGFzc3dvcmQ6")
                };
                conn.write_all(reply.as_bytes()).await?;
                conn.flush().await?;
                continue;
            }

            let (verb, rest) = received
                .split_once(' ')
                .map_or((received.as_str(), ""), |(verb, rest)| (verb, rest));

            let (command, reply) = match verb.to_ascii_uppercase().as_str() {
                "EHLO" => {
                    let reply = config.ehlo.as_ref().map_or_else(
                        || line(500, "Command unrecognized"),
                        |(code, capabilities)| {
                            let mut capabilities = capabilities.clone();
                            if config.tls == TlsMode::StartTls && !secure {
                                capabilities.push("STARTTLS".to_string());
                            }

                            let mut reply = String::new();
                            for (i, capability) in capabilities.iter().enumerate() {
                                let separator = if i + 1 == capabilities.len() { ' ' } else { '-' };
                                let _ = write!(reply, "{code}{separator}{capability}\r\n");
                            }
                            reply
                        },
                    );
                    (SmtpCommand::Ehlo(rest.to_string()), reply)
                }
                "HELO" => (
                    SmtpCommand::Helo(rest.to_string()),
                    line(config.helo.0, &config.helo.1),
                ),
                "STARTTLS" if config.tls == TlsMode::StartTls && !secure => {
                    commands.write().await.push(SmtpCommand::StartTls);
                    conn.write_all(line(220, "Ready to start TLS").as_bytes())
                        .await?;
                    conn.flush().await?;

                    let Some(acceptor) = &acceptor else {
                        return Ok(());
                    };
                    // Anything buffered before the handshake is discarded.
                    let tls: Box<dyn Io> = Box::new(acceptor.accept(conn.into_inner()).await?);
                    conn = BufReader::new(tls);
                    secure = true;
                    continue;
                }
                "STARTTLS" => (
                    SmtpCommand::StartTls,
                    line(config.starttls.0, &config.starttls.1),
                ),
                "AUTH" if rest.eq_ignore_ascii_case("LOGIN") => {
                    in_auth_login = 2;
                    (SmtpCommand::Auth(rest.to_string()), line(334, "VXNlcm5hbWU6"))
                }
                "AUTH" => (
                    SmtpCommand::Auth(rest.to_string()),
                    line(config.auth.0, &config.auth.1),
                ),
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    match &config.quit {
                        QuitBehaviour::Reply(code, text) => {
                            conn.write_all(line(*code, text).as_bytes()).await?;
                            conn.flush().await?;
                            conn.shutdown().await?;
                        }
                        QuitBehaviour::Hang => {
                            tokio::time::sleep(Duration::from_secs(3600)).await;
                        }
                        QuitBehaviour::Drop => {}
                    }
                    return Ok(());
                }
                _ => (
                    SmtpCommand::Other(received.clone()),
                    line(502, "Command not implemented"),
                ),
            };

            commands.write().await.push(command);
            conn.write_all(reply.as_bytes()).await?;
            conn.flush().await?;
        }
    }
}

impl Drop for MockSmtpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Builder for [`MockSmtpServer`]
pub struct MockSmtpServerBuilder {
    config: Config,
}

impl MockSmtpServerBuilder {
    #[must_use]
    pub fn with_greeting(mut self, code: u16, text: impl Into<String>) -> Self {
        self.config.greeting = (code, text.into());
        self
    }

    /// Sends at least `bytes` of `220-` continuation lines and never ends
    /// the reply
    #[must_use]
    pub const fn with_endless_greeting(mut self, bytes: usize) -> Self {
        self.config.greeting_flood = Some(bytes);
        self
    }

    /// EHLO reply lines; the first is the server name
    #[must_use]
    pub fn with_ehlo(mut self, code: u16, lines: &[&str]) -> Self {
        self.config.ehlo = Some((code, lines.iter().map(ToString::to_string).collect()));
        self
    }

    #[must_use]
    pub fn rejecting_ehlo(mut self) -> Self {
        self.config.ehlo = None;
        self
    }

    #[must_use]
    pub fn with_helo(mut self, code: u16, text: impl Into<String>) -> Self {
        self.config.helo = (code, text.into());
        self
    }

    /// Reply to STARTTLS when the server is not in [`TlsMode::StartTls`]
    #[must_use]
    pub fn with_starttls(mut self, code: u16, text: impl Into<String>) -> Self {
        self.config.starttls = (code, text.into());
        self
    }

    #[must_use]
    pub const fn with_tls(mut self, mode: TlsMode) -> Self {
        self.config.tls = mode;
        self
    }

    /// Final reply to AUTH (after any LOGIN exchange)
    #[must_use]
    pub fn with_auth(mut self, code: u16, text: impl Into<String>) -> Self {
        self.config.auth = (code, text.into());
        self
    }

    #[must_use]
    pub fn with_quit_response(mut self, code: u16, text: impl Into<String>) -> Self {
        self.config.quit = QuitBehaviour::Reply(code, text.into());
        self
    }

    #[must_use]
    pub fn hanging_on_quit(mut self) -> Self {
        self.config.quit = QuitBehaviour::Hang;
        self
    }

    #[must_use]
    pub fn dropping_on_quit(mut self) -> Self {
        self.config.quit = QuitBehaviour::Drop;
        self
    }

    #[must_use]
    pub const fn with_greeting_delay(mut self, delay: Duration) -> Self {
        self.config.greeting_delay = Some(delay);
        self
    }

    /// Binds to `127.0.0.1:0` and starts serving
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or the TLS
    /// certificate cannot be generated
    pub async fn build(self) -> Result<MockSmtpServer, Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let acceptor = match self.config.tls {
            TlsMode::None => None,
            TlsMode::StartTls | TlsMode::Implicit => Some(self_signed_acceptor()?),
        };

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let task = {
            let commands = Arc::clone(&commands);
            let connections = Arc::clone(&connections);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::Relaxed);
                    let config = Arc::clone(&config);
                    let acceptor = acceptor.clone();
                    let commands = Arc::clone(&commands);
                    tokio::spawn(async move {
                        let _ = MockSmtpServer::handle_client(
                            Box::new(stream),
                            config,
                            acceptor,
                            commands,
                        )
                        .await;
                    });
                }
            })
        };

        Ok(MockSmtpServer {
            addr,
            commands,
            connections,
            task,
        })
    }
}
