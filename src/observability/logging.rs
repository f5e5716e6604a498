//! Structured log initialization.

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::schema::{LogFormat, LogOutput, LoggingConfig, TracingConfig};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level so an operator can raise
/// verbosity without touching the config file.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let writer = match config.output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
    };

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .boxed(),
        LogFormat::Console => tracing_subscriber::fmt::layer().with_writer(writer).boxed(),
    };

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Surface the configured trace export target. Span emission itself rides
/// the subscriber; shipping spans to the endpoint is an exporter concern.
pub fn announce_tracing(config: &TracingConfig) {
    if config.enabled {
        tracing::info!(
            endpoint = %config.endpoint,
            protocol = ?config.protocol,
            sampling_rate = config.sampling_rate,
            "Trace export configured"
        );
    }
}
