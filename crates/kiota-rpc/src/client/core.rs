//! Response demultiplexing shared by the client, its handles and the
//! watchdog.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use super::CLIENT_TARGET;
use super::pending::{PendingRequest, PendingTable};
use crate::error::{RpcError, TransportError};
use crate::jsonrpc::{JsonRpcMessage, JsonRpcResponse, ResponsePayload};
use crate::transport::LineSink;

/// Snapshot of protocol anomalies observed by a client.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AnomalyCounts {
    /// Lines that were not valid JSON-RPC, including oversized lines.
    pub malformed: u64,
    /// Responses whose id matched no pending call.
    pub unmatched: u64,
    /// Notifications and requests initiated by the generator.
    pub unexpected: u64,
}

impl AnomalyCounts {
    /// Total number of anomalies.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.malformed + self.unmatched + self.unexpected
    }
}

#[derive(Default)]
struct AnomalyCounters {
    malformed: AtomicU64,
    unmatched: AtomicU64,
    unexpected: AtomicU64,
}

/// State reachable from the reader thread.
pub(crate) struct ClientCore {
    pub(crate) pending: PendingTable,
    anomalies: AnomalyCounters,
}

impl ClientCore {
    pub(crate) fn new() -> Self {
        Self {
            pending: PendingTable::new(),
            anomalies: AnomalyCounters::default(),
        }
    }

    pub(crate) fn anomalies(&self) -> AnomalyCounts {
        AnomalyCounts {
            malformed: self.anomalies.malformed.load(Ordering::Relaxed),
            unmatched: self.anomalies.unmatched.load(Ordering::Relaxed),
            unexpected: self.anomalies.unexpected.load(Ordering::Relaxed),
        }
    }

    /// Routes one line of generator output.
    pub(crate) fn handle_line(&self, line: &str) {
        match JsonRpcMessage::parse(line) {
            Ok(JsonRpcMessage::Response(response)) => self.route_response(response),
            Ok(JsonRpcMessage::ServerRequest(request)) => {
                self.anomalies.unexpected.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: CLIENT_TARGET,
                    method = %request.method,
                    id = %request.id,
                    "ignoring generator-initiated request"
                );
            }
            Ok(JsonRpcMessage::Notification(notification)) => {
                self.anomalies.unexpected.fetch_add(1, Ordering::Relaxed);
                debug!(
                    target: CLIENT_TARGET,
                    method = %notification.method,
                    "ignoring generator notification"
                );
            }
            Err(error) => {
                self.anomalies.malformed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: CLIENT_TARGET,
                    error = %error,
                    line_bytes = line.len(),
                    "discarding malformed line from generator"
                );
            }
        }
    }

    fn route_response(&self, response: JsonRpcResponse) {
        let entry = response.id.and_then(|id| self.pending.take(id));
        let Some(entry) = entry else {
            self.anomalies.unmatched.fetch_add(1, Ordering::Relaxed);
            warn!(
                target: CLIENT_TARGET,
                received = ?response.id,
                "discarding response with no pending request"
            );
            return;
        };

        let elapsed_ms = u64::try_from(entry.created_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(
            target: CLIENT_TARGET,
            id = entry.id,
            method = %entry.method,
            elapsed_ms,
            "received response"
        );
        let outcome: Result<Value, RpcError> = match response.payload {
            ResponsePayload::Result(value) => Ok(value),
            ResponsePayload::Error(error) => Err(RpcError::from_jsonrpc(error)),
        };
        entry.complete(outcome);
    }

    /// Fails every pending call with a closed-transport error and refuses
    /// new ones until reopened.
    pub(crate) fn close(&self, reason: &str) {
        let drained = self.pending.close(reason);
        if !drained.is_empty() {
            debug!(
                target: CLIENT_TARGET,
                pending = drained.len(),
                reason,
                "failing pending requests after transport closure"
            );
        }
        for entry in drained {
            entry.complete(Err(TransportError::closed(reason).into()));
        }
    }

    /// Times out every call whose deadline has passed.
    pub(crate) fn expire_overdue(&self, now: Instant) -> usize {
        let expired = self.pending.take_expired(now);
        let count = expired.len();
        for entry in expired {
            warn!(
                target: CLIENT_TARGET,
                id = entry.id,
                method = %entry.method,
                "request timed out"
            );
            entry.expire();
        }
        count
    }

    /// Removes `id` from the pending set, returning the entry if present.
    pub(crate) fn withdraw(&self, id: i64) -> Option<PendingRequest> {
        self.pending.take(id)
    }
}

impl LineSink for ClientCore {
    fn on_line(&self, line: &str) {
        self.handle_line(line);
    }

    fn on_discarded_line(&self, _length: usize) {
        self.anomalies.malformed.fetch_add(1, Ordering::Relaxed);
    }

    fn on_closed(&self, reason: &str) {
        self.close(reason);
    }
}
