use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

/// Logs a line written to the remote peer.
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

/// Logs a line read from the remote peer.
#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::incoming!(level = TRACE, $($msg),*)
    };
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Compact,
    Json,
}

/// Resolves the level filter from an optional `LOG_LEVEL` value.
///
/// Unparseable values fall back to the build default (TRACE in debug
/// builds, INFO otherwise).
pub fn level_from(value: Option<&str>) -> LevelFilter {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    value.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

pub fn init(format: Format) {
    let level = level_from(std::env::var("LOG_LEVEL").ok().as_deref());
    let only_ours = FilterFn::new(|metadata| metadata.target().starts_with("mailprobe"));

    let registry = tracing_subscriber::Registry::default();

    match format {
        Format::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_file(false)
                    .with_line_number(false)
                    .compact()
                    .with_ansi(true)
                    .with_writer(std::io::stderr)
                    .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                    .with_filter(level)
                    .with_filter(only_ours),
            )
            .init(),
        Format::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                    .with_filter(level)
                    .with_filter(only_ours),
            )
            .init(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tracing::metadata::LevelFilter;

    use super::level_from;

    #[test]
    fn explicit_level_is_honoured() {
        assert_eq!(level_from(Some("warn")), LevelFilter::WARN);
        assert_eq!(level_from(Some("ERROR")), LevelFilter::ERROR);
        assert_eq!(level_from(Some("off")), LevelFilter::OFF);
    }

    #[test]
    fn garbage_falls_back_to_build_default() {
        assert_eq!(level_from(Some("loud")), level_from(None));
    }
}
