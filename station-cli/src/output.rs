//! Logging initialization (§0 ambient stack): `tracing-subscriber`, level
//! controlled by `--log-level`.

use clap::ValueEnum;

#[derive(Copy, Clone, Debug, ValueEnum)]
#[clap(rename_all = "UPPER")]
pub enum LogLevel {
    Notset,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    fn filter(self) -> tracing::level_filters::LevelFilter {
        use tracing::level_filters::LevelFilter;
        match self {
            LogLevel::Notset => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Error | LogLevel::Critical => LevelFilter::ERROR,
        }
    }
}

/// Installs the global `tracing` subscriber. Call once, at process start.
pub fn init_logging(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_max_level(level.filter())
        .with_target(true)
        .init();
}
