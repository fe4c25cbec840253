//! Transport backed by a spawned generator process.

use std::io::{self, BufWriter, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::lifecycle::terminate_child;
use super::reader::{ReaderContext, spawn_stderr_drain, spawn_stdout_reader};
use super::{LineSink, TRANSPORT_TARGET, Transport};
use crate::config::{ProcessConfig, StderrPolicy};
use crate::error::TransportError;
use crate::sync::lock;

/// Lifecycle of the process owned by a [`ProcessTransport`].
pub(super) enum ProcessState {
    /// No process has been spawned yet.
    NotStarted,
    /// A process is running (or has exited but not been reaped).
    Running {
        /// The child process handle.
        child: Child,
        /// Incarnation counter used to silence stale readers.
        generation: u64,
        /// Thread reading the child's stdout.
        reader: JoinHandle<()>,
        /// Thread draining the child's stderr, when logging it.
        stderr: Option<JoinHandle<()>>,
    },
    /// The process was stopped through [`Transport::close`].
    Stopped,
}

/// Owns one generator process and its standard streams.
///
/// The process is started by [`Transport::start`], which spawns a dedicated
/// reader thread for stdout. Writes are serialised by an internal lock so
/// concurrent callers never interleave partial lines. Once the process exits
/// the transport reports closure and stays closed: [`Transport::start`]
/// fails with [`TransportError::Closed`] and only [`Transport::restart`]
/// spawns a replacement.
///
/// # Example
///
/// ```ignore
/// use kiota_rpc::{ProcessConfig, ProcessTransport, Transport};
///
/// let transport = ProcessTransport::new(ProcessConfig::kiota_default());
/// transport.start(sink)?;
/// transport.send(r#"{"jsonrpc":"2.0","id":1,"method":"GetVersion","params":{}}"#)?;
/// ```
pub struct ProcessTransport {
    config: ProcessConfig,
    state: Arc<Mutex<ProcessState>>,
    writer: Mutex<Option<BufWriter<ChildStdin>>>,
    exit_status: Arc<Mutex<Option<ExitStatus>>>,
    generation: Arc<AtomicU64>,
    lifecycle: Mutex<()>,
}

impl ProcessTransport {
    /// Creates a transport for the configured command without starting it.
    #[must_use]
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(ProcessState::NotStarted)),
            writer: Mutex::new(None),
            exit_status: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            lifecycle: Mutex::new(()),
        }
    }

    /// Returns the configuration this transport spawns with.
    #[must_use]
    pub const fn config(&self) -> &ProcessConfig {
        &self.config
    }

    /// Returns the exit status of the most recent process, once observed.
    #[must_use]
    pub fn exit_status(&self) -> Option<ExitStatus> {
        *lock(&self.exit_status)
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.config.executable);
        command
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(match self.config.stderr {
                StderrPolicy::Log => Stdio::piped(),
                StderrPolicy::Discard => Stdio::null(),
                StderrPolicy::Inherit => Stdio::inherit(),
            });
        if let Some(dir) = &self.config.working_dir {
            command.current_dir(dir);
        }
        command
    }

    /// Spawns the process and its reader threads into `state`.
    fn spawn_into(
        &self,
        state: &mut ProcessState,
        sink: Arc<dyn LineSink>,
    ) -> Result<(), TransportError> {
        let command_line = self.config.command_line();
        debug!(
            target: TRANSPORT_TARGET,
            command = %self.config.executable.display(),
            args = ?self.config.args,
            "spawning generator process"
        );

        let mut child = self.command().spawn().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                TransportError::ExecutableNotFound {
                    command: command_line.clone(),
                    source: Arc::new(e),
                }
            } else {
                launch_error(&command_line, "failed to start process", e)
            }
        })?;

        let pid = child.id();
        let streams = child.stdin.take().zip(child.stdout.take());
        let Some((stdin, stdout)) = streams else {
            abandon(&mut child);
            return Err(launch_error(
                &command_line,
                "failed to capture stdio",
                io::Error::other("missing stdin or stdout pipe"),
            ));
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&self.exit_status) = None;
        let context = ReaderContext {
            generation,
            current_generation: Arc::clone(&self.generation),
            state: Arc::clone(&self.state),
            exit_status: Arc::clone(&self.exit_status),
            sink,
            max_line_bytes: self.config.max_line_bytes,
        };
        let reader = match spawn_stdout_reader(stdout, context) {
            Ok(handle) => handle,
            Err(e) => {
                abandon(&mut child);
                return Err(launch_error(&command_line, "failed to start reader thread", e));
            }
        };

        let stderr = child
            .stderr
            .take()
            .and_then(|pipe| match spawn_stderr_drain(pipe, pid) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(target: TRANSPORT_TARGET, pid, error = %e, "stderr will not be drained");
                    None
                }
            });

        *lock(&self.writer) = Some(BufWriter::new(stdin));
        *state = ProcessState::Running {
            child,
            generation,
            reader,
            stderr,
        };

        debug!(target: TRANSPORT_TARGET, pid, generation, "generator process spawned");
        Ok(())
    }

    /// Stops the current process, if any, leaving `next` in its place.
    fn shutdown(&self, next: ProcessState) {
        // Dropping stdin is the first, polite request to exit.
        drop(lock(&self.writer).take());

        let previous = std::mem::replace(&mut *lock(&self.state), next);
        let ProcessState::Running {
            mut child,
            generation,
            reader,
            stderr,
        } = previous
        else {
            return;
        };

        let pid = child.id();
        debug!(target: TRANSPORT_TARGET, pid, generation, "stopping generator process");
        if let Some(status) = terminate_child(&mut child, self.config.shutdown_grace) {
            *lock(&self.exit_status) = Some(status);
        }

        let grace = self.config.shutdown_grace;
        join_within(reader, grace, "stdout reader");
        if let Some(handle) = stderr {
            join_within(handle, grace, "stderr drain");
        }
    }
}

impl Transport for ProcessTransport {
    fn start(&self, sink: Arc<dyn LineSink>) -> Result<(), TransportError> {
        let _lifecycle = lock(&self.lifecycle);
        let mut state = lock(&self.state);
        if matches!(*state, ProcessState::NotStarted) {
            return self.spawn_into(&mut state, sink);
        }
        match &mut *state {
            ProcessState::Running { child, .. } => match child.try_wait() {
                Ok(None) => Ok(()),
                Ok(Some(status)) => Err(TransportError::closed(format!(
                    "generator exited ({status}); restart required"
                ))),
                Err(e) => Err(TransportError::closed(format!(
                    "generator status unavailable: {e}"
                ))),
            },
            ProcessState::Stopped => Err(TransportError::closed(
                "transport was closed; restart required",
            )),
            ProcessState::NotStarted => Ok(()),
        }
    }

    fn restart(&self, sink: Arc<dyn LineSink>) -> Result<(), TransportError> {
        // Concurrent restarts run one after the other, each replacing the
        // process the previous one spawned.
        let _lifecycle = lock(&self.lifecycle);
        self.shutdown(ProcessState::NotStarted);
        let mut state = lock(&self.state);
        self.spawn_into(&mut state, sink)
    }

    fn send(&self, line: &str) -> Result<(), TransportError> {
        let mut writer = lock(&self.writer);
        let Some(stream) = writer.as_mut() else {
            if self.generation.load(Ordering::SeqCst) == 0 {
                return Err(TransportError::NotStarted);
            }
            return Err(TransportError::write(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "generator input is closed",
            )));
        };
        stream
            .write_all(line.as_bytes())
            .and_then(|()| stream.write_all(b"\n"))
            .and_then(|()| stream.flush())
            .map_err(TransportError::write)
    }

    fn close(&self) {
        let _lifecycle = lock(&self.lifecycle);
        self.shutdown(ProcessState::Stopped);
    }

    fn is_running(&self) -> bool {
        match &mut *lock(&self.state) {
            ProcessState::Running { child, .. } => matches!(child.try_wait(), Ok(None)),
            ProcessState::NotStarted | ProcessState::Stopped => false,
        }
    }

    fn pid(&self) -> Option<u32> {
        match &*lock(&self.state) {
            ProcessState::Running { child, .. } => Some(child.id()),
            ProcessState::NotStarted | ProcessState::Stopped => None,
        }
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        self.shutdown(ProcessState::Stopped);
    }
}

impl std::fmt::Debug for ProcessTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*lock(&self.state) {
            ProcessState::NotStarted => String::from("not_started"),
            ProcessState::Running { child, .. } => format!("running (pid: {})", child.id()),
            ProcessState::Stopped => String::from("stopped"),
        };
        f.debug_struct("ProcessTransport")
            .field("command", &self.config.command_line())
            .field("state", &state)
            .finish()
    }
}

fn launch_error(command: &str, message: &str, source: io::Error) -> TransportError {
    TransportError::ProcessLaunch {
        command: command.to_owned(),
        message: message.to_owned(),
        source: Arc::new(source),
    }
}

/// Kills a half-initialised child that will never be used.
fn abandon(child: &mut Child) {
    drop(child.kill());
    drop(child.wait());
}

/// Joins a helper thread, detaching it if it outlives `grace`.
fn join_within(handle: JoinHandle<()>, grace: Duration, name: &str) {
    // A sink callback may close the transport from the reader itself.
    if handle.thread().id() == thread::current().id() {
        debug!(target: TRANSPORT_TARGET, thread = name, "shutdown requested from helper thread");
        return;
    }
    let deadline = Instant::now() + grace;
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    if !handle.is_finished() {
        warn!(
            target: TRANSPORT_TARGET,
            thread = name,
            "helper thread still running after shutdown, detaching"
        );
        return;
    }
    if handle.join().is_err() {
        warn!(target: TRANSPORT_TARGET, thread = name, "helper thread panicked");
    }
}
