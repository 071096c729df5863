use anyhow::{anyhow, Result};
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::MakeWriter,
    layer::SubscriberExt,
    registry::LookupSpan,
    Layer,
};

use crate::config::ServerConfig;

pub fn get_env_filter() -> tracing_subscriber::EnvFilter {
    // RUST_LOG used to control logging level.
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::default()
            .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
    })
}

pub fn get_log_layer<S, W>(
    config: &ServerConfig,
    writer: W,
    ansi: bool,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: for<'a> LookupSpan<'a>,
    S: tracing::Subscriber,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    if config.structured_logging() {
        return Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_span_list(false)
                .flatten_event(true)
                .with_current_span(true)
                .with_writer(writer),
        );
    }

    Box::new(
        tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(ansi)
            .with_writer(writer),
    )
}

/// Installs the global subscriber.
///
/// The returned guard flushes the log file writer and must be held until
/// the process exits.
pub fn setup_tracing(config: &ServerConfig) -> Result<Option<WorkerGuard>> {
    let stdout_layer = get_log_layer(config, std::io::stdout, true).with_filter(get_env_filter());

    let (file_layer, guard) = match &config.log_file {
        Some(log_file) => {
            let path = std::path::Path::new(log_file);
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow!("invalid log file path: {}", log_file))?;
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = get_log_layer(config, writer, false).with_filter(get_env_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::Registry::default()
        .with(stdout_layer)
        .with(file_layer);
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        error!("logger was already initiated, continuing: {:?}", e);
    }
    Ok(guard)
}
