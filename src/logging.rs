use error_stack::{Result, ResultExt};
use once_cell::sync::OnceCell;
use std::io::IsTerminal;
use thiserror::Error;
use tracing::{level_filters::LevelFilter, warn, Subscriber};
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::{writer::TestWriter, MakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer};

use crate::config::{Logging, LoggingStyle};

const TARGETS_VAR: &str = "TIDINGS_LOGGING_TARGETS";

#[derive(Debug, Error)]
#[error("Failed to initialize logging")]
pub struct LoggingInitError;

/// Installs the global subscriber writing to stderr.
pub fn init(config: &Logging) -> Result<(), LoggingInitError> {
    let targets = if config.targets.is_empty() {
        std::env::var("RUST_LOG").unwrap_or_default()
    } else {
        config.targets.clone()
    };

    let ansi = std::io::stderr().is_terminal() && config.style != LoggingStyle::Json;
    let registry = tracing_subscriber::Registry::default()
        .with(output_layer(std::io::stderr, ansi, config.style, &targets))
        .with(ErrorLayer::default());

    tracing::subscriber::set_global_default(registry)
        .change_context(LoggingInitError)
        .attach_printable("already initialized logging")?;

    if std::env::var("RUST_LOG").is_ok() && std::env::var(TARGETS_VAR).is_ok() {
        warn!("Both `RUST_LOG` and `{TARGETS_VAR}` are set, `{TARGETS_VAR}` takes precedence");
    }

    Ok(())
}

/// Routes logs through the test harness so they only show up for
/// failing tests. Safe to call from every test.
pub fn init_for_tests() {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_init(|| {
        let targets = std::env::var("RUST_LOG").unwrap_or_default();
        let registry = tracing_subscriber::Registry::default()
            .with(output_layer(TestWriter::default(), false, LoggingStyle::Full, &targets))
            .with(ErrorLayer::default());

        // another harness may have installed its own subscriber
        tracing::subscriber::set_global_default(registry).ok();
    });
}

fn output_layer<S>(
    maker: impl for<'w> MakeWriter<'w> + Send + Sync + 'static,
    ansi: bool,
    style: LoggingStyle,
    targets: &str,
) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_ansi(ansi)
        .with_writer(maker);

    let filter = make_env_filter(targets);
    match style {
        LoggingStyle::Compact => layer.compact().with_filter(filter).boxed(),
        LoggingStyle::Full => layer.with_filter(filter).boxed(),
        LoggingStyle::Pretty => layer.pretty().with_filter(filter).boxed(),
        LoggingStyle::Json => layer
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

fn make_env_filter(targets: &str) -> EnvFilter {
    let default_level = if cfg!(debug_assertions) {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .parse_lossy(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_for_tests_is_idempotent() {
        init_for_tests();
        init_for_tests();
        tracing::info!("still alive");
    }

    #[test]
    fn filter_accepts_targets() {
        let filter = make_env_filter("tidings=trace,sqlx=warn");
        assert!(filter.to_string().contains("tidings=trace"));
    }
}
