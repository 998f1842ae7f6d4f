//! Tracing setup for the host process.
//!
//! Records go to standard error through one formatting layer on a registry,
//! behind the configured filter directive. Script threads are named
//! `script-<channel>`, so every record carries the thread that emitted it.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use objhost_config::{Config, LogFormat};

static INSTALLED: OnceCell<LogFormat> = OnceCell::new();

/// Proof that the global subscriber is in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Format chosen by the call that installed the subscriber.
    #[must_use]
    pub const fn format(self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter directive does not parse.
    #[error("invalid log filter `{directive}`: {message}")]
    Filter {
        /// Directive as configured.
        directive: String,
        /// Parser complaint.
        message: String,
    },
    /// Another global subscriber is already installed.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Installs the global subscriber on first use.
///
/// Later calls leave the global state alone and return a handle reporting
/// the format that was installed, whatever configuration they pass.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an invalid directive and
/// [`TelemetryError::Subscriber`] when a foreign subscriber is already set.
///
/// # Examples
///
/// ```rust
/// use objhost::telemetry;
/// use objhost_config::Config;
///
/// # fn main() -> Result<(), objhost::telemetry::TelemetryError> {
/// let config = Config::default();
/// let first = telemetry::initialise(&config)?;
/// let second = telemetry::initialise(&config)?;
/// assert_eq!(first, second);
/// # Ok(())
/// # }
/// ```
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| Settings::from_config(config)?.install())
        .map(|format| TelemetryHandle { format: *format })
}

struct Settings {
    filter: EnvFilter,
    format: LogFormat,
    ansi: bool,
}

impl Settings {
    fn from_config(config: &Config) -> Result<Self, TelemetryError> {
        let directive = config.log_filter();
        let filter = EnvFilter::try_new(directive).map_err(|error| TelemetryError::Filter {
            directive: directive.to_owned(),
            message: error.to_string(),
        })?;
        Ok(Self {
            filter,
            format: config.log_format(),
            ansi: io::stderr().is_terminal(),
        })
    }

    fn subscriber(self) -> impl Subscriber + Send + Sync {
        tracing_subscriber::registry()
            .with(self.filter)
            .with(format_layer(self.format, self.ansi))
    }

    fn install(self) -> Result<LogFormat, TelemetryError> {
        let format = self.format;
        tracing::subscriber::set_global_default(self.subscriber())?;
        Ok(format)
    }
}

fn format_layer<S>(format: LogFormat, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .with_ansi(ansi)
        .with_timer(fmt::time::UtcTime::rfc_3339());
    match format {
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}
