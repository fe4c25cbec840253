//! Optional structured logging setup for embedding applications.
//!
//! The crate emits `tracing` events under three targets:
//!
//! - `kiota_rpc::transport` for process lifecycle and oversized or undecodable
//!   output,
//! - `kiota_rpc::client` for request traffic and protocol anomalies,
//! - `kiota_rpc::stderr` for lines the generator writes to standard error,
//!   always at `debug` level and only with [`StderrPolicy::Log`].
//!
//! [`initialise`] installs a subscriber whose filter is derived from a
//! [`TelemetryConfig`] per target. Applications that already install a
//! subscriber need nothing from this module.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::client::CLIENT_TARGET;
use crate::config::{ProcessConfig, StderrPolicy};
use crate::transport::{STDERR_TARGET, TRANSPORT_TARGET};

/// Filter directives of the installed subscriber.
static INSTALLED: OnceCell<String> = OnceCell::new();

/// Supported logging output formats.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Human-readable single line output.
    #[default]
    Compact,
}

/// Minimum level of events that are written.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Verbosity {
    /// Nothing is written.
    Off,
    /// Failures only.
    Error,
    /// Failures and protocol anomalies.
    Warn,
    /// Process lifecycle events.
    #[default]
    Info,
    /// Every request and response.
    Debug,
    /// Everything.
    Trace,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Level for transport and client events.
    pub level: Verbosity,
    /// Level for events from every other crate.
    pub others: Verbosity,
    /// Whether the generator's standard error lines are written.
    pub generator_stderr: bool,
    /// Extra `EnvFilter` directives, applied after the derived ones.
    pub extra_directives: Option<String>,
    /// Output format.
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: Verbosity::Info,
            others: Verbosity::Warn,
            generator_stderr: false,
            extra_directives: None,
            log_format: LogFormat::default(),
        }
    }
}

impl TelemetryConfig {
    /// Settings that surface the generator's standard error whenever the
    /// process configuration logs it.
    #[must_use]
    pub fn for_process(config: &ProcessConfig) -> Self {
        Self {
            generator_stderr: config.stderr == StderrPolicy::Log,
            ..Self::default()
        }
    }

    /// Sets the level for transport and client events.
    #[must_use]
    pub const fn with_level(mut self, level: Verbosity) -> Self {
        self.level = level;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub const fn with_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Appends raw `EnvFilter` directives.
    #[must_use]
    pub fn with_extra_directives(mut self, directives: impl Into<String>) -> Self {
        self.extra_directives = Some(directives.into());
        self
    }

    /// Renders the filter this configuration installs.
    ///
    /// ```
    /// use kiota_rpc::telemetry::{TelemetryConfig, Verbosity};
    ///
    /// let config = TelemetryConfig::default().with_level(Verbosity::Debug);
    /// assert_eq!(
    ///     config.directives(),
    ///     "warn,kiota_rpc::transport=debug,kiota_rpc::client=debug,kiota_rpc::stderr=off"
    /// );
    /// ```
    #[must_use]
    pub fn directives(&self) -> String {
        let stderr = if self.generator_stderr {
            Verbosity::Debug
        } else {
            Verbosity::Off
        };
        let mut directives = format!(
            "{others},{TRANSPORT_TARGET}={level},{CLIENT_TARGET}={level},{STDERR_TARGET}={stderr}",
            others = self.others,
            level = self.level,
        );
        if let Some(extra) = self
            .extra_directives
            .as_deref()
            .map(str::trim)
            .filter(|extra| !extra.is_empty())
        {
            directives.push(',');
            directives.push_str(extra);
        }
        directives
    }
}

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryHandle {
    directives: &'static str,
}

impl TelemetryHandle {
    /// Filter directives of the subscriber that is actually installed,
    /// which come from the first successful [`initialise`] call.
    #[must_use]
    pub const fn directives(&self) -> &'static str {
        self.directives
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The derived or extra directives do not parse.
    #[error("invalid log filter '{directives}': {message}")]
    Filter {
        /// The rejected directives.
        directives: String,
        /// Parser message.
        message: String,
    },
    /// Another global subscriber is already installed.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(#[source] SetGlobalDefaultError),
}

/// Installs a global subscriber writing to standard error.
///
/// Only the first successful call installs anything; later calls return the
/// handle of the installed subscriber and ignore `config`.
///
/// # Errors
///
/// Fails when the directives do not parse or another subscriber is already
/// installed.
///
/// # Examples
///
/// ```rust
/// use kiota_rpc::ProcessConfig;
/// use kiota_rpc::telemetry::{self, TelemetryConfig};
///
/// # fn main() -> Result<(), kiota_rpc::telemetry::TelemetryError> {
/// let config = TelemetryConfig::for_process(&ProcessConfig::kiota_default());
/// let handle = telemetry::initialise(&config)?;
/// assert!(handle.directives().contains("kiota_rpc::stderr=debug"));
/// # Ok(())
/// # }
/// ```
pub fn initialise(config: &TelemetryConfig) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| install(config))
        .map(|directives| TelemetryHandle {
            directives: directives.as_str(),
        })
}

fn filter(config: &TelemetryConfig) -> Result<(EnvFilter, String), TelemetryError> {
    let directives = config.directives();
    EnvFilter::try_new(&directives)
        .map(|filter| (filter, directives.clone()))
        .map_err(|error| TelemetryError::Filter {
            directives,
            message: error.to_string(),
        })
}

fn install(config: &TelemetryConfig) -> Result<String, TelemetryError> {
    let (filter, directives) = filter(config)?;

    // Callbacks run on the reader and watchdog threads, so name them.
    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(true)
        .with_thread_names(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.log_format {
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    };

    let subscriber = Registry::default().with(layer).with(filter);
    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;
    Ok(directives)
}
