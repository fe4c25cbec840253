//! Line-oriented duplex transports.
//!
//! A [`Transport`] moves newline-delimited messages between the RPC client
//! and the generator. Outgoing lines go through [`Transport::send`]; incoming
//! lines are pushed to a [`LineSink`] from a single background reader, which
//! also reports end-of-stream exactly once per process.
//!
//! [`ProcessTransport`] is the production implementation: it owns the child
//! process and both of its stdio pipes.

mod lifecycle;
mod process;
mod reader;

use std::sync::Arc;

use crate::error::TransportError;

pub use process::ProcessTransport;

/// Log target for transport operations.
pub(crate) const TRANSPORT_TARGET: &str = "kiota_rpc::transport";

/// Log target for lines the generator writes to standard error.
pub(crate) const STDERR_TARGET: &str = "kiota_rpc::stderr";

/// Receives the traffic read by a transport.
///
/// All calls for one process come from the same reader thread, in the order
/// the lines were read.
pub trait LineSink: Send + Sync {
    /// Handles one line of output, without its terminator.
    fn on_line(&self, line: &str);

    /// Handles a line the transport dropped: longer than the length limit
    /// or not valid UTF-8.
    fn on_discarded_line(&self, _length: usize) {}

    /// Handles the end of the output stream. Called once per process.
    fn on_closed(&self, reason: &str);
}

/// A duplex, line-delimited channel to a peer.
pub trait Transport: Send + Sync {
    /// Starts the peer and begins delivering lines to `sink`.
    ///
    /// Calling `start` while the peer is running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a launch error when the peer cannot be started, or
    /// [`TransportError::Closed`] when it already exited; use
    /// [`Transport::restart`] to replace an exited peer.
    fn start(&self, sink: Arc<dyn LineSink>) -> Result<(), TransportError>;

    /// Stops any running peer and starts a fresh one.
    ///
    /// Implementations serialise concurrent restarts: each call replaces
    /// the peer the previous call started, and no call leaves a peer
    /// running without an owner.
    ///
    /// # Errors
    ///
    /// Returns a launch error when the new peer cannot be started.
    fn restart(&self, sink: Arc<dyn LineSink>) -> Result<(), TransportError>;

    /// Writes one line and its terminator.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Write`] when the input stream is closed or
    /// broken, and [`TransportError::NotStarted`] before the first start.
    fn send(&self, line: &str) -> Result<(), TransportError>;

    /// Stops the peer and releases both streams. Idempotent.
    fn close(&self);

    /// Returns `true` while the peer is alive.
    fn is_running(&self) -> bool;

    /// Operating system identifier of the peer, when it has one.
    fn pid(&self) -> Option<u32> {
        None
    }
}
