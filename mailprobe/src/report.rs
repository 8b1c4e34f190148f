//! Rendering a probe result for the terminal.

use mailprobe_health::{ERROR, Health, LOCATION};

/// How the result is printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Output {
    /// `UP smtp.example.com:25`
    #[default]
    Text,
    /// The serialized [`Health`].
    Json,
}

/// Renders `health` in the requested format.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render(health: &Health, output: Output) -> serde_json::Result<String> {
    match output {
        Output::Json => serde_json::to_string_pretty(health),
        Output::Text => {
            let mut line = health.status().to_string();
            if let Some(location) = health.detail(LOCATION) {
                line.push(' ');
                line.push_str(location);
            }
            if let Some(error) = health.detail(ERROR) {
                line.push_str(" (");
                line.push_str(error);
                line.push(')');
            }
            Ok(line)
        }
    }
}
