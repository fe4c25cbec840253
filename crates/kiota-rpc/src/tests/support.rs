//! In-memory transport double for exercising the client without a process.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use crate::client::{ClientOptions, RpcClient};
use crate::error::TransportError;
use crate::sync::lock;
use crate::transport::{LineSink, Transport};

/// Records every line the client sends and lets tests play the generator.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    sink: Mutex<Option<Arc<dyn LineSink>>>,
    sent: Mutex<Vec<String>>,
    running: AtomicBool,
    starts: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Builds a client over `transport` with `options`.
    pub(crate) fn client(transport: &Arc<Self>, options: ClientOptions) -> RpcClient {
        RpcClient::with_transport(Arc::clone(transport) as Arc<dyn Transport>, options)
            .expect("scripted transport starts")
    }

    /// Pushes one raw line to the client as if the generator wrote it.
    pub(crate) fn deliver(&self, line: &str) {
        let sink = lock(&self.sink).clone().expect("transport started");
        sink.on_line(line);
    }

    /// Answers `id` with a successful result.
    pub(crate) fn respond(&self, id: i64, result: Value) {
        self.deliver(&json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string());
    }

    /// Answers `id` with a JSON-RPC error object.
    pub(crate) fn respond_error(&self, id: i64, code: i64, message: &str) {
        self.deliver(
            &json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": code, "message": message}
            })
            .to_string(),
        );
    }

    /// Simulates the generator exiting.
    pub(crate) fn end_stream(&self, reason: &str) {
        self.running.store(false, Ordering::SeqCst);
        let sink = lock(&self.sink).clone().expect("transport started");
        sink.on_closed(reason);
    }

    /// Every line sent so far, parsed.
    pub(crate) fn sent(&self) -> Vec<Value> {
        lock(&self.sent)
            .iter()
            .map(|line| serde_json::from_str(line).expect("client sends valid JSON"))
            .collect()
    }

    /// Every line sent so far, verbatim.
    pub(crate) fn sent_lines(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    /// Correlation ids of the requests sent so far, in send order.
    pub(crate) fn sent_ids(&self) -> Vec<i64> {
        self.sent()
            .iter()
            .map(|request| request["id"].as_i64().expect("integer id"))
            .collect()
    }

    /// How many times the transport was started or restarted.
    pub(crate) fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    fn start(&self, sink: Arc<dyn LineSink>) -> Result<(), TransportError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.starts() > 0 {
            return Err(TransportError::closed("scripted generator exited"));
        }
        self.restart(sink)
    }

    fn restart(&self, sink: Arc<dyn LineSink>) -> Result<(), TransportError> {
        *lock(&self.sink) = Some(sink);
        self.running.store(true, Ordering::SeqCst);
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn send(&self, line: &str) -> Result<(), TransportError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(TransportError::write(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted generator is not running",
            )));
        }
        lock(&self.sent).push(line.to_owned());
        Ok(())
    }

    fn close(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
