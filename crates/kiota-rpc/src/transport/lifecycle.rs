//! Child process termination with a bounded grace period.

use std::process::{Child, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::TRANSPORT_TARGET;

/// Interval between exit checks while waiting on a child.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Stops `child`, escalating to a forced kill once `grace` has elapsed.
///
/// The caller closes the child's stdin beforehand, which most stdio servers
/// already treat as a request to exit. This function then:
/// 1. returns immediately if the process has already exited
/// 2. sends a termination signal (on Unix) and waits up to `grace`
/// 3. kills the process and reaps it
pub(super) fn terminate_child(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    let pid = child.id();
    match child.try_wait() {
        Ok(Some(status)) => {
            debug!(target: TRANSPORT_TARGET, pid, ?status, "generator already exited");
            return Some(status);
        }
        Ok(None) => {}
        Err(e) => {
            warn!(
                target: TRANSPORT_TARGET,
                pid,
                error = %e,
                "failed to check process status, proceeding with shutdown"
            );
        }
    }

    request_stop(child);
    if let Some(status) = wait_with_deadline(child, grace) {
        debug!(
            target: TRANSPORT_TARGET,
            pid,
            ?status,
            "generator exited during grace period"
        );
        return Some(status);
    }

    warn!(
        target: TRANSPORT_TARGET,
        pid,
        grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
        "generator did not exit gracefully, killing"
    );
    if let Err(e) = child.kill() {
        warn!(target: TRANSPORT_TARGET, pid, error = %e, "failed to kill generator");
    }
    child.wait().ok()
}

/// Polls the child until it exits or `grace` elapses.
pub(super) fn wait_with_deadline(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL_INTERVAL),
            Ok(None) | Err(_) => return None,
        }
    }
}

#[cfg(unix)]
fn request_stop(child: &Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(child.id()) else {
        return;
    };
    if let Err(errno) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        debug!(
            target: TRANSPORT_TARGET,
            pid = raw,
            %errno,
            "failed to signal generator"
        );
    }
}

#[cfg(not(unix))]
fn request_stop(_child: &Child) {}
