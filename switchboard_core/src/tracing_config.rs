use std::io::Error as IoError;

use tracing::level_filters::LevelFilter;
use tracing::Subscriber;
use tracing_subscriber::{filter::Targets, prelude::*, registry::LookupSpan, Layer};

use crate::config::LoggingConfig;

fn build_targets<S>(
    conf: &LoggingConfig,
) -> Result<Vec<Box<dyn Layer<S> + Send + Sync + 'static>>, IoError>
where
    S: Subscriber + Send + Sync,
    for<'span> S: LookupSpan<'span>,
{
    let mut layers: Vec<Box<dyn Layer<S> + Send + Sync + 'static>> = vec![
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .boxed(),
    ];

    if let (Some(dir), Some(file)) = (&conf.dir, &conf.file) {
        std::fs::create_dir_all(dir)?;
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(tracing_appender::rolling::daily(dir, file))
                .with_ansi(false)
                .boxed(),
        );
    }

    Ok(layers)
}

/// Build the subscriber for the logging config: stdout always, plus a
/// daily-rolling file when one is configured. The `chat` target stays at
/// info regardless of the default level, since its volume is governed by
/// the LOG command rather than the log level.
pub fn build_subscriber(conf: LoggingConfig) -> Result<impl Subscriber, IoError> {
    let filter = Targets::new()
        .with_default(conf.level)
        .with_target("chat", LevelFilter::INFO);

    let layers = build_targets(&conf)?;

    Ok(tracing_subscriber::registry().with(filter).with(layers))
}
