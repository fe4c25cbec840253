//! Configuration for spawning and talking to the generator process.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Default executable for the Kiota generator.
pub const DEFAULT_EXECUTABLE: &str = "kiota";

/// Subcommand that switches the generator into JSON-RPC mode.
pub const DEFAULT_RPC_SUBCOMMAND: &str = "rpc";

/// Default wait between the graceful stop signal and a forced kill.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

/// Default upper bound on a single line read from the process.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024 * 1024;

/// What happens to the child's standard error stream.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StderrPolicy {
    /// Drain on a background thread and emit each line as a debug event.
    #[default]
    Log,
    /// Redirect to the null device.
    Discard,
    /// Share the embedding application's standard error.
    Inherit,
}

/// Whether an exited process may be replaced without an explicit restart.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RestartPolicy {
    /// Closure is surfaced; callers must restart explicitly.
    #[default]
    Manual,
    /// A call dispatched after closure restarts the process once first.
    OnDemand,
}

/// Process and client settings, injected at construction.
///
/// Durations are expressed in milliseconds when (de)serialised.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// The executable path or command name.
    pub executable: PathBuf,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Working directory for the spawned process.
    pub working_dir: Option<PathBuf>,
    /// Deadline applied to every request, if any.
    #[serde(with = "optional_millis", rename = "request_timeout_ms")]
    pub request_timeout: Option<Duration>,
    /// Wait between the graceful stop signal and a forced kill.
    #[serde(with = "millis", rename = "shutdown_grace_ms")]
    pub shutdown_grace: Duration,
    /// Handling of the child's standard error.
    pub stderr: StderrPolicy,
    /// Restart behaviour after the process exits.
    pub restart: RestartPolicy,
    /// Longest accepted output line; longer lines are dropped as malformed.
    pub max_line_bytes: usize,
}

impl ProcessConfig {
    /// Creates a configuration for `executable` with `args` and default
    /// settings otherwise.
    #[must_use]
    pub fn new<I, S>(executable: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            executable: executable.into(),
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Configuration for `kiota rpc` resolved through `PATH`.
    #[must_use]
    pub fn kiota_default() -> Self {
        Self::default()
    }

    /// Replaces the argument list.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets a custom working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Applies a per-request deadline.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the grace period granted before the process is killed.
    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Sets the standard error policy.
    #[must_use]
    pub const fn with_stderr(mut self, policy: StderrPolicy) -> Self {
        self.stderr = policy;
        self
    }

    /// Sets the restart policy.
    #[must_use]
    pub const fn with_restart(mut self, policy: RestartPolicy) -> Self {
        self.restart = policy;
        self
    }

    /// Sets the longest accepted output line.
    #[must_use]
    pub const fn with_max_line_bytes(mut self, limit: usize) -> Self {
        self.max_line_bytes = limit;
        self
    }

    /// Renders the command line for diagnostics.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.executable.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            args: vec![DEFAULT_RPC_SUBCOMMAND.to_owned()],
            working_dir: None,
            request_timeout: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            stderr: StderrPolicy::default(),
            restart: RestartPolicy::default(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod optional_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer
                .serialize_some(&u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|millis| millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn default_runs_kiota_rpc() {
        let config = ProcessConfig::kiota_default();

        assert_eq!(config.executable, PathBuf::from("kiota"));
        assert_eq!(config.args, vec!["rpc"]);
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.shutdown_grace, DEFAULT_SHUTDOWN_GRACE);
        assert_eq!(config.restart, RestartPolicy::Manual);
    }

    #[rstest]
    fn builder_methods_work() {
        let config = ProcessConfig::new("/opt/kiota/kiota", ["rpc", "--verbose"])
            .with_working_dir("/workspace")
            .with_request_timeout(Duration::from_secs(5))
            .with_stderr(StderrPolicy::Discard)
            .with_restart(RestartPolicy::OnDemand);

        assert_eq!(config.working_dir, Some(PathBuf::from("/workspace")));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.stderr, StderrPolicy::Discard);
        assert_eq!(config.restart, RestartPolicy::OnDemand);
        assert_eq!(config.command_line(), "/opt/kiota/kiota rpc --verbose");
    }

    #[rstest]
    fn deserialises_with_defaults_and_millis() {
        let config: ProcessConfig = serde_json::from_str(
            r#"{"executable":"kiota-dev","request_timeout_ms":1500,"stderr":"inherit"}"#,
        )
        .expect("config should parse");

        assert_eq!(config.executable, PathBuf::from("kiota-dev"));
        assert_eq!(config.args, vec!["rpc"]);
        assert_eq!(config.request_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.stderr, StderrPolicy::Inherit);
        assert_eq!(config.max_line_bytes, DEFAULT_MAX_LINE_BYTES);
    }

    #[rstest]
    fn serialises_durations_as_millis() {
        let config = ProcessConfig::default().with_shutdown_grace(Duration::from_millis(750));
        let json = serde_json::to_value(&config).expect("serialise");

        assert_eq!(json["shutdown_grace_ms"], 750);
        assert!(json["request_timeout_ms"].is_null());
    }

    #[rstest]
    #[case("log", StderrPolicy::Log)]
    #[case("DISCARD", StderrPolicy::Discard)]
    #[case("Inherit", StderrPolicy::Inherit)]
    fn parses_stderr_policy(#[case] input: &str, #[case] expected: StderrPolicy) {
        assert_eq!(input.parse::<StderrPolicy>().expect("parse"), expected);
    }

    #[rstest]
    fn parses_restart_policy() {
        assert_eq!(
            "on_demand".parse::<RestartPolicy>().expect("parse"),
            RestartPolicy::OnDemand
        );
        assert_eq!(RestartPolicy::Manual.to_string(), "manual");
    }
}
