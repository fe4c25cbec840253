//! JSON-RPC client for a long-lived code generator process.
//!
//! The `kiota-rpc` crate drives an external generator (by default
//! `kiota rpc`) over its standard streams. Requests and responses are
//! newline-delimited JSON-RPC 2.0 messages; standard error is kept off the
//! RPC channel and drained separately.
//!
//! # Architecture
//!
//! Three layers share the work:
//!
//! - [`ProcessTransport`] owns the child process. It serialises writes to
//!   stdin under a single lock and runs one reader thread that is the only
//!   consumer of stdout.
//! - [`RpcClient`] assigns correlation ids, tracks pending calls and routes
//!   each response to the call with the same id, whatever order responses
//!   arrive in. Malformed lines and unknown ids are logged and counted as
//!   [`AnomalyCounts`], never raised to unrelated callers.
//! - [`RequestBuilder`] collects one call's method, parameters and result
//!   type and hands them to the client exactly once.
//!
//! Every dispatched call completes exactly once, with its result, a
//! [`RpcError::Remote`] error, a timeout, a cancellation or a closed-transport
//! error. Dispatch never blocks on the generator; [`ResponseHandle::wait`]
//! does.
//!
//! Exited processes are not replaced behind the caller's back unless
//! [`RestartPolicy::OnDemand`] is configured; otherwise closure is reported
//! to every later call until [`RpcClient::restart`] runs.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use kiota_rpc::{ProcessConfig, RpcClient};
//!
//! let config = ProcessConfig::kiota_default().with_request_timeout(Duration::from_secs(30));
//! let client = RpcClient::new(config)?;
//!
//! let pong: String = client
//!     .create_request()
//!     .method("ping")
//!     .return_as::<String>()
//!     .call()?;
//! assert_eq!(pong, "pong");
//!
//! client.close();
//! # Ok::<(), kiota_rpc::RpcError>(())
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod generator;
pub mod jsonrpc;
pub mod request;
pub mod telemetry;
pub mod transport;

mod sync;

#[cfg(test)]
mod tests;

pub use self::client::{AnomalyCounts, ClientOptions, ResponseHandle, RpcClient};
pub use self::config::{ProcessConfig, RestartPolicy, StderrPolicy};
pub use self::error::{RpcError, TransportError};
pub use self::generator::GeneratorClient;
pub use self::request::RequestBuilder;
pub use self::transport::{LineSink, ProcessTransport, Transport};
