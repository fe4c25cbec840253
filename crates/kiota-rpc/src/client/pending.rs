//! Bookkeeping for in-flight calls.
//!
//! The pending set and the id counter live behind one mutex. Entries are
//! always removed under the lock and completed after it is released, so a
//! completion callback may dispatch further calls.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::error::{RpcError, TransportError};
use crate::sync::lock;

/// Receives the outcome of one call. Invoked at most once.
pub(crate) type Completion = Box<dyn FnOnce(Result<Value, RpcError>) + Send>;

/// A call awaiting its response.
pub(crate) struct PendingRequest {
    pub(crate) id: i64,
    pub(crate) method: String,
    pub(crate) created_at: Instant,
    pub(crate) timeout: Option<Duration>,
    completion: Completion,
}

impl PendingRequest {
    /// Instant after which the call times out.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.timeout.map(|timeout| self.created_at + timeout)
    }

    /// Delivers the outcome, consuming the entry.
    pub(crate) fn complete(self, outcome: Result<Value, RpcError>) {
        (self.completion)(outcome);
    }

    /// Completes the call with a timeout error.
    pub(crate) fn expire(self) {
        let id = self.id;
        let timeout_ms = self
            .timeout
            .map_or(0, |timeout| u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self.complete(Err(RpcError::RequestTimeout { id, timeout_ms }));
    }
}

struct PendingState {
    next_id: i64,
    entries: HashMap<i64, PendingRequest>,
    closed: Option<String>,
}

/// The pending set and the id counter.
pub(crate) struct PendingTable {
    state: Mutex<PendingState>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(PendingState {
                next_id: 1,
                entries: HashMap::new(),
                closed: None,
            }),
        }
    }

    /// Allocates the next id and records the call under it.
    ///
    /// Fails with a closed-transport error once [`PendingTable::close`] has
    /// run; the completion is then dropped without being invoked.
    pub(crate) fn register(
        &self,
        method: &str,
        timeout: Option<Duration>,
        completion: Completion,
    ) -> Result<i64, RpcError> {
        let mut state = lock(&self.state);
        if let Some(reason) = &state.closed {
            return Err(TransportError::closed(reason.clone()).into());
        }
        let id = state.next_id;
        state.next_id += 1;
        state.entries.insert(
            id,
            PendingRequest {
                id,
                method: method.to_owned(),
                created_at: Instant::now(),
                timeout,
                completion,
            },
        );
        Ok(id)
    }

    /// Removes the entry for `id`, if it is still pending.
    pub(crate) fn take(&self, id: i64) -> Option<PendingRequest> {
        lock(&self.state).entries.remove(&id)
    }

    /// Removes every entry whose deadline is at or before `now`.
    pub(crate) fn take_expired(&self, now: Instant) -> Vec<PendingRequest> {
        let mut state = lock(&self.state);
        let expired: Vec<i64> = state
            .entries
            .values()
            .filter(|entry| entry.deadline().is_some_and(|deadline| deadline <= now))
            .map(|entry| entry.id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| state.entries.remove(&id))
            .collect()
    }

    /// Marks the table closed and drains every pending entry.
    ///
    /// The first reason recorded is kept until [`PendingTable::reopen`].
    pub(crate) fn close(&self, reason: &str) -> Vec<PendingRequest> {
        let mut state = lock(&self.state);
        if state.closed.is_none() {
            state.closed = Some(reason.to_owned());
        }
        state.entries.drain().map(|(_, entry)| entry).collect()
    }

    /// Accepts new calls again after a restart.
    pub(crate) fn reopen(&self) {
        lock(&self.state).closed = None;
    }

    /// Returns the closure reason, if the table is closed.
    pub(crate) fn closed_reason(&self) -> Option<String> {
        lock(&self.state).closed.clone()
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }
}
