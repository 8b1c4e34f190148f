//! Checks that an SMTP server is reachable.
//!
//! Connects, immediately disconnects, prints the result and exits with 0
//! when the server is UP or 1 when it is DOWN.

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use mailprobe::{
    config::{self, MailProbe, Overrides},
    report::{self, Output},
};
use mailprobe_health::{HealthIndicator, MailHealthIndicator};

/// Check that an SMTP server accepts connections
#[derive(Parser, Debug)]
#[command(name = "mailprobe")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Mail server host, overriding the config file
    #[arg(long)]
    host: Option<String>,

    /// Mail server port, overriding the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Transport protocol (`smtp` or `smtps`)
    #[arg(long)]
    protocol: Option<String>,

    /// Username to authenticate with
    #[arg(short, long)]
    username: Option<String>,

    /// Password to authenticate with
    #[arg(long, env = "MAILPROBE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    format: Output,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let env = std::env::var(config::CONFIG_ENV).ok();
    let file = config::locate(cli.config.as_deref(), env.as_deref())?
        .map(|path| MailProbe::load(&path))
        .transpose()?;

    let probe = MailProbe::resolve(
        file,
        Overrides {
            host: cli.host,
            port: cli.port,
            protocol: cli.protocol,
            username: cli.username,
            password: cli.password,
        },
    )?;

    mailprobe_common::logging::init(probe.logging.format.into());

    let indicator = MailHealthIndicator::smtp(probe.mail);
    let health = indicator.health().await;

    println!("{}", report::render(&health, cli.format)?);

    Ok(if health.status().is_up() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
