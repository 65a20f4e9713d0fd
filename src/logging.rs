use crate::config::Config;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::Layer as FmtLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Guards returned by `init` must be kept alive for the process lifetime, or the
/// non-blocking file writers they own are dropped and logging silently stops.
pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Initializes console logging plus one rotating file layer per `[Logger_*]` config
/// section, mirroring the original daemon's per-module `RotatingFileHandler` setup
/// (see `logger_config.py`). Rotation here is daily, not byte-size-capped: the
/// `tracing-appender` rolling file appender has no size-based policy.
pub fn init(config: &Config, log_dir: impl AsRef<std::path::Path>) -> Result<LoggingGuards, String> {
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = FmtLayer::new().with_target(true).with_filter(console_filter);

    let mut guards = Vec::new();
    let mut layers: Vec<BoxedLayer> = vec![console_layer.boxed()];

    for section in &config.logging_sections {
        let level: LevelFilter = section.level.parse().unwrap_or(LevelFilter::INFO);
        let appender = tracing_appender::rolling::daily(log_dir.as_ref(), &section.file);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);

        let target_prefix = section.target.clone();
        let file_layer = FmtLayer::new()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_filter(tracing_subscriber::filter::filter_fn(move |metadata| {
                target_prefix.is_empty() || metadata.target().starts_with(target_prefix.as_str())
            }))
            .with_filter(level);

        layers.push(file_layer.boxed());
    }

    let subscriber = Registry::default().with(layers);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("failed to install tracing subscriber: {e}"))?;

    Ok(LoggingGuards { _guards: guards })
}
