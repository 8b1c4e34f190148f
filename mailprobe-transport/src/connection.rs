//! A line-oriented SMTP connection over plain TCP or TLS.

use std::{sync::Arc, time::Duration};

use mailprobe_common::{incoming, outgoing};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    rustls::{
        self, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        pki_types::{CertificateDer, ServerName, UnixTime},
    },
};

use crate::{
    error::{Result, TransportError},
    reply::{MAX_REPLY_SIZE, Reply},
};

/// Initial size of the read buffer.
const BUFFER_SIZE: usize = 4096;

enum Stream {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

pub(crate) struct Connection {
    stream: Stream,
    buffer: Vec<u8>,
    filled: usize,
}

impl Connection {
    /// Opens a TCP connection within `limit`.
    pub(crate) async fn open(host: &str, port: u16, limit: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(limit, TcpStream::connect((host, port)))
            .await
            .map_err(|_| TransportError::Timeout {
                operation: "connect",
                timeout: limit,
            })??;

        Ok(Self {
            stream: Stream::Plain(stream),
            buffer: vec![0; BUFFER_SIZE],
            filled: 0,
        })
    }

    pub(crate) const fn is_tls(&self) -> bool {
        matches!(self.stream, Stream::Tls(_))
    }

    /// Wraps the plain stream in TLS. Any buffered plaintext is discarded,
    /// as required after STARTTLS.
    pub(crate) async fn upgrade(self, domain: &str, accept_invalid_certs: bool) -> Result<Self> {
        let Stream::Plain(stream) = self.stream else {
            return Err(TransportError::Tls("connection is already TLS".to_string()));
        };

        let connector = TlsConnector::from(Arc::new(tls_config(accept_invalid_certs)?));
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|e| TransportError::Tls(format!("invalid server name '{domain}': {e}")))?;

        let stream = connector
            .connect(server_name, stream)
            .await
            .map_err(|e| TransportError::Tls(e.to_string()))?;

        tracing::debug!(domain, "TLS established");

        Ok(Self {
            stream: Stream::Tls(Box::new(stream)),
            buffer: self.buffer,
            filled: 0,
        })
    }

    /// Sends `line` followed by CRLF.
    pub(crate) async fn send_line(&mut self, line: &str) -> Result<()> {
        outgoing!("{line}");
        self.write(format!("{line}\r\n").as_bytes()).await
    }

    /// Like [`Self::send_line`], but keeps the content out of the logs.
    pub(crate) async fn send_secret(&mut self, line: &str) -> Result<()> {
        outgoing!("<credentials>");
        self.write(format!("{line}\r\n").as_bytes()).await
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.stream {
            Stream::Plain(stream) => stream.write_all(data).await?,
            Stream::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    /// Reads the next complete reply, waiting at most `limit`.
    pub(crate) async fn read_reply(
        &mut self,
        operation: &'static str,
        limit: Duration,
    ) -> Result<Reply> {
        tokio::time::timeout(limit, self.read_reply_inner())
            .await
            .map_err(|_| TransportError::Timeout {
                operation,
                timeout: limit,
            })?
    }

    async fn read_reply_inner(&mut self) -> Result<Reply> {
        loop {
            if let Some((reply, consumed)) = Reply::parse(&self.buffer[..self.filled])? {
                self.buffer.copy_within(consumed..self.filled, 0);
                self.filled -= consumed;

                incoming!("{} {}", reply.code, reply.message());
                return Ok(reply);
            }

            if self.filled == self.buffer.len() {
                let grown = self.buffer.len() * 2;
                if grown > MAX_REPLY_SIZE {
                    return Err(TransportError::Parse(format!(
                        "reply exceeds {MAX_REPLY_SIZE} bytes"
                    )));
                }
                self.buffer.resize(grown, 0);
            }

            let read = match &mut self.stream {
                Stream::Plain(stream) => stream.read(&mut self.buffer[self.filled..]).await?,
                Stream::Tls(stream) => stream.read(&mut self.buffer[self.filled..]).await?,
            };
            if read == 0 {
                return Err(TransportError::ConnectionClosed);
            }
            self.filled += read;
        }
    }

    /// Flushes and shuts down the write half.
    pub(crate) async fn shutdown(&mut self) -> Result<()> {
        match &mut self.stream {
            Stream::Plain(stream) => stream.shutdown().await?,
            Stream::Tls(stream) => stream.shutdown().await?,
        }
        Ok(())
    }
}

fn tls_config(accept_invalid_certs: bool) -> Result<ClientConfig> {
    let mut roots = RootCertStore::empty();

    let native = rustls_native_certs::load_native_certs();
    for cert in native.certs {
        roots
            .add(cert)
            .map_err(|e| TransportError::Tls(format!("failed to add certificate: {e}")))?;
    }
    if !native.errors.is_empty() {
        tracing::warn!(?native.errors, "Some native certificates could not be loaded");
    }

    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    if accept_invalid_certs {
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(AcceptAnyCertificate));
    }

    Ok(config)
}

/// Certificate verifier that trusts everything. Test servers only.
#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}
