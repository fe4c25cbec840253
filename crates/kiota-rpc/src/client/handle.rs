//! Blocking handles for dispatched calls.

use std::marker::PhantomData;
use std::sync::Weak;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::core::ClientCore;
use crate::error::{RpcError, TransportError};

/// The eventual result of one call.
///
/// Dispatching never blocks; only [`ResponseHandle::wait`] and
/// [`ResponseHandle::wait_timeout`] do. A handle yields its outcome once.
/// Dropping a handle before it has yielded cancels the call, so a late
/// response for its id is treated as unmatched.
pub struct ResponseHandle<R> {
    id: i64,
    receiver: Receiver<Result<Value, RpcError>>,
    core: Weak<ClientCore>,
    deadline: Option<Instant>,
    finished: bool,
    returns: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned> ResponseHandle<R> {
    pub(crate) fn new(
        id: i64,
        receiver: Receiver<Result<Value, RpcError>>,
        core: Weak<ClientCore>,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            id,
            receiver,
            core,
            deadline,
            finished: false,
            returns: PhantomData,
        }
    }

    /// Correlation id of the call.
    #[must_use]
    pub const fn id(&self) -> i64 {
        self.id
    }

    /// Blocks until the call completes and decodes its result.
    ///
    /// # Errors
    ///
    /// Returns the remote error, timeout or transport failure the call
    /// completed with, or [`RpcError::Codec`] when the result does not
    /// decode into `R`.
    pub fn wait(mut self) -> Result<R, RpcError> {
        self.ensure_pending()?;
        let outcome = match self.deadline {
            Some(deadline) => self.receive_until(deadline),
            None => self.receiver.recv().unwrap_or_else(|_| Err(client_gone())),
        };
        self.finish(outcome)
    }

    /// Waits up to `timeout` for the call to complete.
    ///
    /// Returns `Ok(None)` when the wait elapses first; the call stays
    /// pending and the handle may be waited on again.
    ///
    /// # Errors
    ///
    /// As for [`ResponseHandle::wait`], plus
    /// [`RpcError::InvalidRequestState`] once the outcome was already taken.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Result<Option<R>, RpcError> {
        self.ensure_pending()?;
        let limit = Instant::now() + timeout;
        let outcome = match self.deadline {
            Some(deadline) if deadline <= limit => self.receive_until(deadline),
            _ => match self.receiver.recv_timeout(timeout) {
                Ok(outcome) => outcome,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => Err(client_gone()),
            },
        };
        self.finish(outcome).map(Some)
    }

    /// Returns the outcome if the call has already completed.
    ///
    /// # Errors
    ///
    /// As for [`ResponseHandle::wait_timeout`].
    pub fn try_result(&mut self) -> Result<Option<R>, RpcError> {
        self.ensure_pending()?;
        let outcome = match self.receiver.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return Ok(None),
            Err(TryRecvError::Disconnected) => Err(client_gone()),
        };
        self.finish(outcome).map(Some)
    }

    /// Abandons the call and removes it from the pending set.
    ///
    /// Returns `true` if the call was still pending.
    pub fn cancel(mut self) -> bool {
        self.finished = true;
        withdraw(&self.core, self.id)
    }

    fn ensure_pending(&self) -> Result<(), RpcError> {
        if self.finished {
            return Err(RpcError::invalid_state(format!(
                "result of request {} was already taken",
                self.id
            )));
        }
        Ok(())
    }

    /// Waits until `deadline`, then withdraws the call as timed out.
    fn receive_until(&self, deadline: Instant) -> Result<Value, RpcError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.receiver.recv_timeout(remaining) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Disconnected) => Err(client_gone()),
            Err(RecvTimeoutError::Timeout) => {
                let entry = self.core.upgrade().and_then(|core| core.withdraw(self.id));
                match entry {
                    Some(entry) => {
                        entry.expire();
                        self.receiver.recv().unwrap_or_else(|_| Err(client_gone()))
                    }
                    // Completed concurrently; the outcome is already queued.
                    None => self.receiver.recv().unwrap_or_else(|_| Err(client_gone())),
                }
            }
        }
    }

    fn finish(&mut self, outcome: Result<Value, RpcError>) -> Result<R, RpcError> {
        self.finished = true;
        let value = outcome?;
        serde_json::from_value(value).map_err(RpcError::from)
    }
}

impl<R> Drop for ResponseHandle<R> {
    fn drop(&mut self) {
        if !self.finished {
            withdraw(&self.core, self.id);
        }
    }
}

impl<R> std::fmt::Debug for ResponseHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseHandle")
            .field("id", &self.id)
            .field("deadline", &self.deadline)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

fn withdraw(core: &Weak<ClientCore>, id: i64) -> bool {
    let Some(entry) = core.upgrade().and_then(|core| core.withdraw(id)) else {
        return false;
    };
    entry.complete(Err(RpcError::Cancelled { id }));
    true
}

fn client_gone() -> RpcError {
    TransportError::closed("client dropped before the call completed").into()
}
