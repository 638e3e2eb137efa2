//! Tracing setup.
//!
//! The subscriber is installed before the config file is read so that
//! config-loading events (unknown keys, missing file) are not lost. The
//! filter starts from `RUST_LOG` or `info` and is swapped for the
//! configured level once the config is known, unless `RUST_LOG` was set.

use thiserror::Error;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log level: {0}")]
    InvalidLevel(#[from] tracing_subscriber::filter::ParseError),

    #[error("Failed to update log filter: {0}")]
    Reload(#[from] reload::Error),
}

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Single-line human readable output
    #[default]
    Text,
    /// Multi-line output for local development
    Pretty,
    /// One JSON object per event, for log shippers
    Json,
}

pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Keeps the filter reloadable after the global subscriber is installed.
pub struct Logging {
    handle: FilterHandle,
    /// `RUST_LOG` was set and takes precedence over the config
    from_env: bool,
}

impl Logging {
    /// Install the global subscriber writing to stdout.
    pub fn init(format: LogFormat) -> Self {
        let (filter, from_env) = match EnvFilter::try_from_default_env() {
            Ok(filter) => (filter, true),
            Err(_) => (EnvFilter::new(DEFAULT_LEVEL), false),
        };
        let (subscriber, handle) = build_subscriber(format, filter, std::io::stdout);
        subscriber.init();
        Self { handle, from_env }
    }

    /// Switch to the configured level. A no-op when `RUST_LOG` is set.
    pub fn apply_level(&self, level: &str) -> Result<(), LoggingError> {
        if self.from_env {
            return Ok(());
        }
        let filter = EnvFilter::try_new(level)?;
        self.handle.reload(filter)?;
        Ok(())
    }
}

/// Registry with a reloadable filter and one fmt layer in the chosen format.
pub fn build_subscriber<W>(
    format: LogFormat,
    filter: EnvFilter,
    writer: W,
) -> (impl tracing::Subscriber + Send + Sync + 'static, FilterHandle)
where
    W: for<'a> MakeWriter<'a> + Clone + Send + Sync + 'static,
{
    let (filter, handle) = reload::Layer::new(filter);
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with((format == LogFormat::Json).then(|| fmt::layer().json().with_writer(writer.clone())))
        .with(
            (format == LogFormat::Pretty)
                .then(|| fmt::layer().pretty().with_writer(writer.clone())),
        )
        .with((format == LogFormat::Text).then(|| fmt::layer().with_ansi(false).with_writer(writer)));
    (subscriber, handle)
}
