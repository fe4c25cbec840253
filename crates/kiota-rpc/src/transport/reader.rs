//! Background readers for the child's output streams.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{ChildStderr, ChildStdout, ExitStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::process::ProcessState;
use super::{LineSink, STDERR_TARGET, TRANSPORT_TARGET};
use crate::sync::lock;

/// How long the reader waits for the process to exit after its output ends.
const EXIT_OBSERVATION_WINDOW: Duration = Duration::from_millis(100);

/// Outcome of reading one line.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum LineRead {
    /// A complete line is in the buffer.
    Line,
    /// A line longer than the limit was consumed and dropped.
    TooLong(usize),
    /// The stream ended.
    Eof,
}

/// Reads one `\n`-terminated line into `buffer`, keeping at most `limit`
/// bytes of content. An unterminated final line is returned as a line.
pub(super) fn read_bounded_line<R: BufRead>(
    reader: &mut R,
    buffer: &mut Vec<u8>,
    limit: usize,
) -> io::Result<LineRead> {
    buffer.clear();
    let mut total = 0_usize;
    let mut overflowed = false;
    loop {
        let (used, terminated) = {
            let available = match reader.fill_buf() {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                return Ok(match (total, overflowed) {
                    (0, _) => LineRead::Eof,
                    (_, true) => LineRead::TooLong(total),
                    (_, false) => LineRead::Line,
                });
            }
            let (chunk, terminated) = match available.iter().position(|byte| *byte == b'\n') {
                Some(index) => (available.split_at(index + 1).0, true),
                None => (available, false),
            };
            if !overflowed {
                let content = chunk.strip_suffix(b"\n").unwrap_or(chunk);
                if buffer.len() + content.len() > limit {
                    overflowed = true;
                    buffer.clear();
                } else {
                    buffer.extend_from_slice(content);
                }
            }
            (chunk.len(), terminated)
        };
        reader.consume(used);
        total += used;
        if terminated {
            return Ok(if overflowed {
                LineRead::TooLong(total)
            } else {
                LineRead::Line
            });
        }
    }
}

/// Everything the stdout reader needs besides the stream itself.
pub(super) struct ReaderContext {
    pub(super) generation: u64,
    pub(super) current_generation: Arc<AtomicU64>,
    pub(super) state: Arc<Mutex<ProcessState>>,
    pub(super) exit_status: Arc<Mutex<Option<ExitStatus>>>,
    pub(super) sink: Arc<dyn LineSink>,
    pub(super) max_line_bytes: usize,
}

impl ReaderContext {
    /// A reader left over from a replaced process must stay silent.
    fn is_current(&self) -> bool {
        self.current_generation.load(Ordering::SeqCst) == self.generation
    }

    /// Gives the process a short window to exit and records its status.
    fn observe_exit(&self) -> Option<ExitStatus> {
        let deadline = Instant::now() + EXIT_OBSERVATION_WINDOW;
        loop {
            {
                let mut state = lock(&self.state);
                match &mut *state {
                    ProcessState::Running {
                        child, generation, ..
                    } if *generation == self.generation => {
                        if let Ok(Some(status)) = child.try_wait() {
                            *lock(&self.exit_status) = Some(status);
                            return Some(status);
                        }
                    }
                    _ => return *lock(&self.exit_status),
                }
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

/// Spawns the thread that owns the child's stdout.
pub(super) fn spawn_stdout_reader(
    stdout: ChildStdout,
    context: ReaderContext,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(String::from("kiota-rpc-stdout"))
        .spawn(move || run_stdout_reader(stdout, &context))
}

fn run_stdout_reader(stdout: impl Read, context: &ReaderContext) {
    let mut reader = BufReader::new(stdout);
    let mut buffer = Vec::new();
    let reason = loop {
        match read_bounded_line(&mut reader, &mut buffer, context.max_line_bytes) {
            Ok(LineRead::Line) => {
                if !context.is_current() {
                    continue;
                }
                match std::str::from_utf8(&buffer) {
                    Ok(text) => {
                        let line = text.trim_end_matches('\r');
                        if !line.trim().is_empty() {
                            context.sink.on_line(line);
                        }
                    }
                    Err(e) => {
                        warn!(
                            target: TRANSPORT_TARGET,
                            length = buffer.len(),
                            error = %e,
                            "discarding generator line that is not valid UTF-8"
                        );
                        context.sink.on_discarded_line(buffer.len());
                    }
                }
            }
            Ok(LineRead::TooLong(length)) => {
                warn!(
                    target: TRANSPORT_TARGET,
                    length,
                    limit = context.max_line_bytes,
                    "discarding oversized line from generator"
                );
                if context.is_current() {
                    context.sink.on_discarded_line(length);
                }
            }
            Ok(LineRead::Eof) => break String::from("generator output stream ended"),
            Err(e) => break format!("failed to read generator output: {e}"),
        }
    };

    let reason = match context.observe_exit() {
        Some(status) => format!("{reason} ({status})"),
        None => reason,
    };
    debug!(
        target: TRANSPORT_TARGET,
        generation = context.generation,
        reason = %reason,
        "stdout reader finished"
    );
    if context.is_current() {
        context.sink.on_closed(&reason);
    }
}

/// Spawns the thread that drains the child's stderr into debug events.
///
/// Draining keeps the child from blocking on a full pipe buffer.
pub(super) fn spawn_stderr_drain(stderr: ChildStderr, pid: u32) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(String::from("kiota-rpc-stderr"))
        .spawn(move || drain_stderr(stderr, pid))
}

fn drain_stderr(stderr: impl Read, pid: u32) {
    for line in BufReader::new(stderr).lines() {
        match line {
            Ok(text) if text.trim().is_empty() => {}
            Ok(text) => debug!(target: STDERR_TARGET, pid, line = %text.trim_end(), "generator stderr"),
            Err(e) => {
                debug!(target: STDERR_TARGET, pid, error = %e, "stopped draining stderr");
                break;
            }
        }
    }
}
