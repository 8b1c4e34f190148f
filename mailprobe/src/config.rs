//! Probe configuration file handling.

use std::path::{Path, PathBuf};

use anyhow::Context;
use mailprobe_common::logging::Format;
use mailprobe_transport::{Credentials, TransportConfig};
use serde::Deserialize;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "MAILPROBE_CONFIG";

/// Locations searched when neither a flag nor [`CONFIG_ENV`] is given.
pub const DEFAULT_PATHS: [&str; 2] = [
    "./mailprobe.config.ron",
    "/etc/mailprobe/mailprobe.config.ron",
];

/// Top-level contents of `mailprobe.config.ron`.
///
/// ```ron
/// (
///     mail: (
///         host: "smtp.example.com",
///         port: 587,
///         credentials: Some((username: "probe", password: "secret")),
///     ),
///     logging: (format: json),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MailProbe {
    pub mail: TransportConfig,

    #[serde(default)]
    pub logging: Logging,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Logging {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl From<LogFormat> for Format {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Compact => Self::Compact,
            LogFormat::Json => Self::Json,
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl MailProbe {
    /// Reads and parses a RON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        ron::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Combines an optional file configuration with command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error when there is no file and no `--host`.
    pub fn resolve(file: Option<Self>, overrides: Overrides) -> anyhow::Result<Self> {
        let mut probe = match (file, &overrides.host) {
            (Some(probe), _) => probe,
            (None, Some(host)) => Self {
                mail: TransportConfig::new(host.clone(), 25),
                logging: Logging::default(),
            },
            (None, None) => anyhow::bail!(
                "No configuration file found and no --host given. Tried:\n  - {CONFIG_ENV} environment variable\n{}",
                DEFAULT_PATHS
                    .iter()
                    .map(|p| format!("  - {p}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
        };

        let mail = &mut probe.mail;
        if let Some(host) = overrides.host {
            mail.host = host;
        }
        if let Some(port) = overrides.port {
            mail.port = port;
        }
        if let Some(protocol) = overrides.protocol {
            mail.protocol = protocol;
        }
        // A password on its own only fills in credentials that already exist.
        if let Some(credentials) = &mut mail.credentials {
            if let Some(username) = overrides.username {
                credentials.username = username;
            }
            if let Some(password) = overrides.password {
                credentials.password = password;
            }
        } else if let Some(username) = overrides.username {
            let password = overrides.password.unwrap_or_default();
            mail.credentials = Some(Credentials::new(username, password));
        }

        Ok(probe)
    }
}

/// Finds the configuration file using the following precedence:
/// 1. `explicit` (the `--config` flag)
/// 2. the path in `env` ([`CONFIG_ENV`])
/// 3. the first of [`DEFAULT_PATHS`] that exists
///
/// An explicitly named file that does not exist is an error; finding
/// nothing in the default locations is not.
///
/// # Errors
///
/// Returns an error if `explicit` or `env` point to a missing file.
pub fn locate(explicit: Option<&Path>, env: Option<&str>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        anyhow::ensure!(path.exists(), "Config file does not exist: {}", path.display());
        return Ok(Some(path.to_path_buf()));
    }

    if let Some(env_path) = env {
        let path = PathBuf::from(env_path);
        anyhow::ensure!(
            path.exists(),
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
        return Ok(Some(path));
    }

    Ok(DEFAULT_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists()))
}
