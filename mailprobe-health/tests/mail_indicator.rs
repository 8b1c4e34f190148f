//! End-to-end checks of the mail indicator over real sockets.

use mailprobe_health::{ERROR, HealthIndicator, LOCATION, MailHealthIndicator, Status};
use mailprobe_testing::{MockSmtpServer, SmtpCommand, TlsMode};
use mailprobe_transport::{SMTPS, SmtpSettings, TransportConfig, TransportTimeouts};
use pretty_assertions::assert_eq;

fn config(port: u16) -> TransportConfig {
    TransportConfig::new("127.0.0.1", port).with_settings(SmtpSettings {
        timeouts: TransportTimeouts {
            connect_secs: 2,
            command_secs: 2,
            quit_secs: 1,
        },
        ..SmtpSettings::default()
    })
}

#[tokio::test]
async fn test_reachable_server_is_up() {
    let server = MockSmtpServer::builder().build().await.unwrap();
    let indicator = MailHealthIndicator::smtp(config(server.port()));

    let health = indicator.health().await;

    assert_eq!(health.status(), Status::Up);
    assert_eq!(
        health.detail(LOCATION),
        Some(format!("127.0.0.1:{}", server.port()).as_str())
    );
    assert_eq!(
        server.commands().await,
        vec![SmtpCommand::Ehlo("localhost".to_string()), SmtpCommand::Quit]
    );
}

#[tokio::test]
async fn test_unreachable_server_is_down() {
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let indicator = MailHealthIndicator::smtp(config(port));

    let health = indicator.health().await;

    assert_eq!(health.status(), Status::Down);
    assert_eq!(
        health.detail(LOCATION),
        Some(format!("127.0.0.1:{port}").as_str())
    );
    assert!(health.detail(ERROR).unwrap().starts_with("Failed to connect"));
}

#[tokio::test]
async fn test_failed_quit_is_down() {
    let server = MockSmtpServer::builder()
        .with_quit_response(421, "Service shutting down")
        .build()
        .await
        .unwrap();
    let indicator = MailHealthIndicator::smtp(config(server.port()));

    let health = indicator.health().await;

    assert_eq!(health.status(), Status::Down);
    assert!(
        health
            .detail(ERROR)
            .unwrap()
            .starts_with("Failed to close connection")
    );
}

#[tokio::test]
async fn test_repeated_checks_open_new_connections() {
    let server = MockSmtpServer::builder().build().await.unwrap();
    let indicator = MailHealthIndicator::smtp(config(server.port()));

    for _ in 0..3 {
        assert_eq!(indicator.health().await.status(), Status::Up);
    }
    assert_eq!(server.connections(), 3);
}

#[tokio::test]
async fn test_smtps_server_is_up() {
    let server = MockSmtpServer::builder()
        .with_tls(TlsMode::Implicit)
        .build()
        .await
        .unwrap();
    let mut config = config(server.port()).with_protocol(SMTPS);
    config.settings.accept_invalid_certs = true;
    let indicator = MailHealthIndicator::smtp(config);

    let health = indicator.health().await;

    assert_eq!(health.status(), Status::Up);
    assert_eq!(
        health.detail(LOCATION),
        Some(format!("127.0.0.1:{}", server.port()).as_str())
    );
    assert_eq!(server.commands().await.last(), Some(&SmtpCommand::Quit));
}
