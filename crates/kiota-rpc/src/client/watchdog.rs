//! Background enforcement of request deadlines.

use std::io;
use std::sync::Weak;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::CLIENT_TARGET;
use super::core::ClientCore;

/// Longest pause between two deadline sweeps.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_millis(25);

/// Shortest pause between two deadline sweeps.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Sweep often enough to honour `timeout` without spinning on tiny ones.
fn sweep_interval(timeout: Duration) -> Duration {
    timeout.clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL)
}

/// Times out overdue calls even when nobody is waiting on them.
pub(crate) struct Watchdog {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub(crate) fn spawn(core: Weak<ClientCore>, timeout: Duration) -> io::Result<Self> {
        let interval = sweep_interval(timeout);
        let (stop, stopped) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name(String::from("kiota-rpc-watchdog"))
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let Some(core) = core.upgrade() else {
                        break;
                    };
                    let expired = core.expire_overdue(Instant::now());
                    if expired > 0 {
                        debug!(target: CLIENT_TARGET, expired, "deadline sweep expired requests");
                    }
                }
            })?;
        Ok(Self {
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    /// Signals the sweep loop to end and waits for it.
    ///
    /// A completion callback may drop the last client from the watchdog
    /// thread itself; the loop then ends on its own once the callback
    /// returns, so it is not joined.
    pub(crate) fn stop(&mut self) {
        drop(self.stop.take());
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            debug!(target: CLIENT_TARGET, "watchdog stopped from its own thread");
            return;
        }
        if thread.join().is_err() {
            warn!(target: CLIENT_TARGET, "deadline watchdog panicked");
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}
