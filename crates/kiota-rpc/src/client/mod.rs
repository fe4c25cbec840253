//! JSON-RPC request/response correlation over a [`Transport`].
//!
//! [`RpcClient`] assigns every call a correlation id that is unique for the
//! client's lifetime, records it in the pending set, writes the request
//! through the transport and completes the call when the response with the
//! same id arrives. Responses may arrive in any order. Unknown ids and
//! malformed lines are logged and counted, never delivered.
//!
//! Every call completes exactly once: with its result, a remote error, a
//! timeout, a cancellation, or a closed-transport error.
//!
//! # Call styles
//!
//! [`RpcClient::dispatch_with`] completes through a callback and is the core
//! both styles share. [`RpcClient::dispatch`] and the
//! [`RequestBuilder`](crate::RequestBuilder) return a [`ResponseHandle`]
//! instead, on which callers block. Dispatch itself never waits for the
//! generator.

mod core;
mod handle;
mod pending;
mod watchdog;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use self::core::ClientCore;
use self::watchdog::Watchdog;
use crate::config::{ProcessConfig, RestartPolicy};
use crate::error::{RpcError, TransportError};
use crate::jsonrpc::JsonRpcRequest;
use crate::request::RequestBuilder;
use crate::sync::lock;
use crate::transport::{LineSink, ProcessTransport, Transport};

pub use self::core::AnomalyCounts;
pub use self::handle::ResponseHandle;

/// Log target for client operations.
pub(crate) const CLIENT_TARGET: &str = "kiota_rpc::client";

/// Client behaviour independent of the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientOptions {
    /// Deadline applied to every request, if any.
    pub request_timeout: Option<Duration>,
    /// Whether a closed transport is restarted when a call is dispatched.
    pub restart: RestartPolicy,
}

impl From<&ProcessConfig> for ClientOptions {
    fn from(config: &ProcessConfig) -> Self {
        Self {
            request_timeout: config.request_timeout,
            restart: config.restart,
        }
    }
}

/// A JSON-RPC client bound to one transport.
///
/// The client starts its transport on construction and closes it on
/// [`RpcClient::close`] or drop. It is `Send + Sync`; calls may be
/// dispatched from any thread.
///
/// # Example
///
/// ```no_run
/// use kiota_rpc::{ProcessConfig, RpcClient};
///
/// let client = RpcClient::new(ProcessConfig::kiota_default())?;
/// let version: String = client
///     .create_request()
///     .method("GetVersion")
///     .return_as::<String>()
///     .call()?;
/// client.close();
/// # Ok::<(), kiota_rpc::RpcError>(())
/// ```
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    core: Arc<ClientCore>,
    options: ClientOptions,
    watchdog: Mutex<Option<Watchdog>>,
    closed: AtomicBool,
    restarting: Mutex<()>,
}

/// Reason reported to calls made after [`RpcClient::close`].
const CLIENT_CLOSED: &str = "client closed";

impl RpcClient {
    /// Spawns the configured process and connects a client to it.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ExecutableNotFound`] or
    /// [`TransportError::ProcessLaunch`] when the process cannot start.
    pub fn new(config: ProcessConfig) -> Result<Self, RpcError> {
        let options = ClientOptions::from(&config);
        Self::with_transport(Arc::new(ProcessTransport::new(config)), options)
    }

    /// Connects a client to an arbitrary transport, starting it.
    ///
    /// # Errors
    ///
    /// Returns the transport's start error.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        options: ClientOptions,
    ) -> Result<Self, RpcError> {
        let core = Arc::new(ClientCore::new());
        transport.start(sink(&core))?;

        let watchdog = options.request_timeout.and_then(|timeout| {
            Watchdog::spawn(Arc::downgrade(&core), timeout)
                .inspect_err(|e| {
                    warn!(
                        target: CLIENT_TARGET,
                        error = %e,
                        "deadline watchdog unavailable; timeouts apply only while waiting"
                    );
                })
                .ok()
        });

        info!(
            target: CLIENT_TARGET,
            pid = ?transport.pid(),
            timeout_ms = ?options.request_timeout.map(|t| t.as_millis()),
            "rpc client connected"
        );
        Ok(Self {
            transport,
            core,
            options,
            watchdog: Mutex::new(watchdog),
            closed: AtomicBool::new(false),
            restarting: Mutex::new(()),
        })
    }

    /// Returns a fresh single-use request builder bound to this client.
    #[must_use]
    pub fn create_request(&self) -> RequestBuilder<'_, Value> {
        RequestBuilder::new(self)
    }

    /// Sends `method` with `params` and returns a handle for its result.
    ///
    /// # Errors
    ///
    /// Fails without registering a call when the transport is closed or the
    /// request cannot be written.
    pub fn dispatch<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<ResponseHandle<R>, RpcError> {
        let (sender, receiver) = mpsc::sync_channel(1);
        let deadline = self.options.request_timeout.map(|t| Instant::now() + t);
        let id = self.dispatch_with(method, params, move |outcome| {
            // The receiver is gone when the handle was dropped.
            drop(sender.send(outcome));
        })?;
        Ok(ResponseHandle::new(
            id,
            receiver,
            Arc::downgrade(&self.core),
            deadline,
        ))
    }

    /// Sends `method` with `params` and completes `callback` with the raw
    /// result.
    ///
    /// The callback runs on the transport's reader thread, the watchdog
    /// thread, or the thread that closes or cancels the call. When this
    /// returns `Ok(id)` the callback is invoked exactly once; when it
    /// returns `Err` the callback is never invoked.
    ///
    /// # Errors
    ///
    /// As for [`RpcClient::dispatch`].
    pub fn dispatch_with<F>(&self, method: &str, params: Value, callback: F) -> Result<i64, RpcError>
    where
        F: FnOnce(Result<Value, RpcError>) + Send + 'static,
    {
        self.ensure_open()?;
        let id = self
            .core
            .pending
            .register(method, self.options.request_timeout, Box::new(callback))?;

        let line = match JsonRpcRequest::new(id, method, params).to_line() {
            Ok(line) => line,
            Err(e) => {
                drop(self.core.withdraw(id));
                return Err(e.into());
            }
        };

        debug!(target: CLIENT_TARGET, id, method, "sending request");
        if let Err(e) = self.transport.send(&line) {
            warn!(target: CLIENT_TARGET, id, method, error = %e, "failed to send request");
            // Only report the failure if nothing else completed the call.
            if self.core.withdraw(id).is_some() {
                return Err(e.into());
            }
        }
        Ok(id)
    }

    /// Cancels a pending call, completing it with [`RpcError::Cancelled`].
    ///
    /// Returns `true` if the call was still pending.
    pub fn cancel(&self, id: i64) -> bool {
        let Some(entry) = self.core.withdraw(id) else {
            return false;
        };
        debug!(target: CLIENT_TARGET, id, method = %entry.method, "cancelling request");
        entry.complete(Err(RpcError::Cancelled { id }));
        true
    }

    /// Stops the current process and starts a fresh one.
    ///
    /// Calls pending on the old process complete with a closed-transport
    /// error. Correlation ids keep increasing across restarts.
    ///
    /// # Errors
    ///
    /// Returns the launch error if the new process cannot start, or a
    /// closed-transport error once the client was closed.
    pub fn restart(&self) -> Result<(), RpcError> {
        let _guard = lock(&self.restarting);
        self.restart_locked()
    }

    /// Closes the transport and fails every pending call. Idempotent; also
    /// runs on drop.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut watchdog) = lock(&self.watchdog).take() {
            watchdog.stop();
        }
        self.core.close(CLIENT_CLOSED);
        self.transport.close();
    }

    /// Number of calls awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.core.pending.len()
    }

    /// Protocol anomalies observed so far.
    #[must_use]
    pub fn anomalies(&self) -> AnomalyCounts {
        self.core.anomalies()
    }

    /// Returns `true` while the transport's peer is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.transport.is_running()
    }

    /// Process id of the generator, when it has one.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.transport.pid()
    }

    /// The options this client was built with.
    #[must_use]
    pub const fn options(&self) -> ClientOptions {
        self.options
    }

    /// Applies the restart policy before a call is registered.
    fn ensure_open(&self) -> Result<(), RpcError> {
        let Some(reason) = self.core.pending.closed_reason() else {
            return Ok(());
        };
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::closed(reason).into());
        }
        match self.options.restart {
            RestartPolicy::Manual => Err(TransportError::closed(reason).into()),
            RestartPolicy::OnDemand => {
                let _guard = lock(&self.restarting);
                // A concurrent caller may have restarted already.
                if self.core.pending.closed_reason().is_none() {
                    return Ok(());
                }
                debug!(target: CLIENT_TARGET, reason = %reason, "restarting closed transport on demand");
                self.restart_locked()
            }
        }
    }

    fn restart_locked(&self) -> Result<(), RpcError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::closed(CLIENT_CLOSED).into());
        }
        info!(target: CLIENT_TARGET, "restarting generator");
        self.core.close("generator restarting");
        self.transport.restart(sink(&self.core))?;
        self.core.pending.reopen();
        Ok(())
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("options", &self.options)
            .field("pending", &self.pending_count())
            .field("anomalies", &self.anomalies())
            .finish_non_exhaustive()
    }
}

fn sink(core: &Arc<ClientCore>) -> Arc<dyn LineSink> {
    Arc::clone(core) as Arc<dyn LineSink>
}

#[cfg(test)]
mod tests;
