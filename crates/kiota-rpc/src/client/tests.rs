//! Unit tests for request correlation.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use mockall::mock;
use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::{ClientOptions, RpcClient};
use crate::config::{ProcessConfig, RestartPolicy};
use crate::error::{RpcError, TransportError};
use crate::tests::support::ScriptedTransport;
use crate::transport::{LineSink, Transport};

const WAIT: Duration = Duration::from_secs(2);

mock! {
    Wire {}
    impl Transport for Wire {
        fn start(&self, sink: Arc<dyn LineSink>) -> Result<(), TransportError>;
        fn restart(&self, sink: Arc<dyn LineSink>) -> Result<(), TransportError>;
        fn send(&self, line: &str) -> Result<(), TransportError>;
        fn close(&self);
        fn is_running(&self) -> bool;
        fn pid(&self) -> Option<u32>;
    }
}

#[fixture]
fn transport() -> Arc<ScriptedTransport> {
    ScriptedTransport::new()
}

fn client_over(transport: &Arc<ScriptedTransport>) -> RpcClient {
    ScriptedTransport::client(transport, ClientOptions::default())
}

#[rstest]
fn options_follow_process_config() {
    let config = ProcessConfig::kiota_default()
        .with_request_timeout(Duration::from_millis(750))
        .with_restart(RestartPolicy::OnDemand);
    let options = ClientOptions::from(&config);
    assert_eq!(options.request_timeout, Some(Duration::from_millis(750)));
    assert_eq!(options.restart, RestartPolicy::OnDemand);
}

#[rstest]
fn ping_round_trip(transport: Arc<ScriptedTransport>) {
    let client = client_over(&transport);
    let handle = client
        .dispatch::<String>("ping", json!({}))
        .expect("dispatch ping");

    assert_eq!(
        transport.sent_lines(),
        vec![String::from(r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#)]
    );
    transport.respond(handle.id(), json!("pong"));

    assert_eq!(handle.wait().expect("pong"), "pong");
    assert_eq!(client.pending_count(), 0);
    assert_eq!(client.anomalies().total(), 0);
}

#[rstest]
fn reversed_responses_reach_their_own_callers(transport: Arc<ScriptedTransport>) {
    let client = client_over(&transport);
    let first = client
        .dispatch::<String>("first", json!({"n": 1}))
        .expect("dispatch first");
    let second = client
        .dispatch::<String>("second", json!({"n": 2}))
        .expect("dispatch second");

    transport.respond(second.id(), json!("for second"));
    transport.respond(first.id(), json!("for first"));

    assert_eq!(first.wait().expect("first result"), "for first");
    assert_eq!(second.wait().expect("second result"), "for second");
}

#[rstest]
fn concurrent_dispatches_get_unique_ids_and_matching_results(transport: Arc<ScriptedTransport>) {
    const THREADS: usize = 8;
    const CALLS: usize = 25;

    let client = client_over(&transport);
    let handles: Vec<_> = thread::scope(|scope| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    (0..CALLS)
                        .map(|_| {
                            client
                                .dispatch::<i64>("echo", json!({}))
                                .expect("dispatch echo")
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|worker| worker.join().expect("worker thread"))
            .collect()
    });

    let ids: HashSet<i64> = handles.iter().map(super::ResponseHandle::id).collect();
    assert_eq!(ids.len(), THREADS * CALLS);
    assert_eq!(client.pending_count(), THREADS * CALLS);

    for id in transport.sent_ids().into_iter().rev() {
        transport.respond(id, json!(id * 10));
    }
    for handle in handles {
        let id = handle.id();
        assert_eq!(handle.wait().expect("echo result"), id * 10);
    }
    assert_eq!(client.pending_count(), 0);
}

#[rstest]
fn closure_fails_every_pending_call(transport: Arc<ScriptedTransport>) {
    let client = client_over(&transport);
    let handles: Vec<_> = (0..3)
        .map(|_| client.dispatch::<Value>("slow", json!({})).expect("dispatch"))
        .collect();

    transport.end_stream("generator exited (exit status: 1)");

    assert_eq!(client.pending_count(), 0);
    for handle in handles {
        let err = handle.wait().expect_err("closure fails the call");
        assert!(err.is_transport_closed(), "unexpected error: {err}");
    }
}

#[rstest]
fn calls_after_closure_fail_without_restart(transport: Arc<ScriptedTransport>) {
    let client = client_over(&transport);
    transport.end_stream("generator exited");

    let err = client
        .dispatch::<Value>("late", json!({}))
        .expect_err("closed client refuses calls");
    assert!(err.is_transport_closed());
    assert!(transport.sent().is_empty());
    assert_eq!(transport.starts(), 1);
}

#[rstest]
fn explicit_restart_reopens_with_fresh_ids(transport: Arc<ScriptedTransport>) {
    let client = client_over(&transport);
    let before = client.dispatch::<Value>("one", json!({})).expect("dispatch");
    transport.end_stream("generator exited");
    drop(before);

    client.restart().expect("restart");
    let after = client.dispatch::<Value>("two", json!({})).expect("dispatch");

    assert_eq!(transport.starts(), 2);
    assert_eq!(after.id(), 2);
}

#[rstest]
fn on_demand_policy_restarts_before_dispatch(transport: Arc<ScriptedTransport>) {
    let options = ClientOptions {
        restart: RestartPolicy::OnDemand,
        ..ClientOptions::default()
    };
    let client = ScriptedTransport::client(&transport, options);
    transport.end_stream("generator exited");

    let handle = client
        .dispatch::<String>("ping", json!({}))
        .expect("restarted on demand");
    transport.respond(handle.id(), json!("pong"));

    assert_eq!(transport.starts(), 2);
    assert_eq!(handle.wait().expect("pong"), "pong");
}

#[rstest]
fn unknown_ids_are_counted_and_ignored(transport: Arc<ScriptedTransport>) {
    let client = client_over(&transport);
    let handle = client.dispatch::<String>("ping", json!({})).expect("dispatch");

    transport.respond(999, json!("stray"));
    transport.deliver(r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#);

    assert_eq!(client.pending_count(), 1);
    assert_eq!(client.anomalies().unmatched, 2);

    transport.respond(handle.id(), json!("pong"));
    assert_eq!(handle.wait().expect("pong"), "pong");
}

#[rstest]
#[case::not_json("this is not json")]
#[case::array("[1,2,3]")]
#[case::empty_object("{}")]
#[case::wrong_version(r#"{"jsonrpc":"1.0","id":1,"result":"pong"}"#)]
#[case::missing_payload(r#"{"jsonrpc":"2.0","id":1}"#)]
#[case::both_payloads(r#"{"jsonrpc":"2.0","id":1,"result":1,"error":{"code":1,"message":"x"}}"#)]
#[case::string_id(r#"{"jsonrpc":"2.0","id":"1","result":"pong"}"#)]
fn malformed_lines_never_complete_calls(transport: Arc<ScriptedTransport>, #[case] line: &str) {
    let client = client_over(&transport);
    let mut handle = client.dispatch::<String>("ping", json!({})).expect("dispatch");

    transport.deliver(line);

    assert_eq!(client.anomalies().malformed, 1);
    assert_eq!(client.pending_count(), 1);
    assert!(handle.try_result().expect("still pending").is_none());

    transport.respond(handle.id(), json!("pong"));
    assert_eq!(handle.wait().expect("pong"), "pong");
}

#[rstest]
fn generator_initiated_messages_are_unexpected(transport: Arc<ScriptedTransport>) {
    let client = client_over(&transport);
    transport.deliver(r#"{"jsonrpc":"2.0","method":"progress","params":{"done":1}}"#);
    transport.deliver(r#"{"jsonrpc":"2.0","id":"srv-1","method":"workspace/configuration"}"#);

    assert_eq!(client.anomalies().unexpected, 2);
    assert_eq!(client.anomalies().malformed, 0);
}

#[rstest]
fn remote_errors_carry_code_and_message(transport: Arc<ScriptedTransport>) {
    let client = client_over(&transport);
    let handle = client.dispatch::<Value>("Nope", json!({})).expect("dispatch");

    transport.respond_error(handle.id(), -32601, "Method not found");

    let err = handle.wait().expect_err("remote error");
    assert_eq!(err.remote_code(), Some(-32601));
    assert!(
        matches!(&err, RpcError::Remote { message, .. } if message == "Method not found"),
        "unexpected error: {err}"
    );
}

#[rstest]
fn undecodable_results_are_codec_errors(transport: Arc<ScriptedTransport>) {
    let client = client_over(&transport);
    let handle = client.dispatch::<i64>("count", json!({})).expect("dispatch");
    transport.respond(handle.id(), json!("not a number"));

    assert!(matches!(handle.wait(), Err(RpcError::Codec { .. })));
}

#[rstest]
fn timeout_completes_the_call_and_late_responses_are_unmatched(
    transport: Arc<ScriptedTransport>,
) {
    let options = ClientOptions {
        request_timeout: Some(Duration::from_millis(50)),
        ..ClientOptions::default()
    };
    let client = ScriptedTransport::client(&transport, options);
    let handle = client.dispatch::<String>("slow", json!({})).expect("dispatch");
    let id = handle.id();

    let err = handle.wait().expect_err("call times out");
    assert!(matches!(err, RpcError::RequestTimeout { id: timed_out, .. } if timed_out == id));
    assert_eq!(client.pending_count(), 0);

    transport.respond(id, json!("too late"));
    assert_eq!(client.anomalies().unmatched, 1);
}

#[rstest]
fn watchdog_expires_calls_nobody_waits_on(transport: Arc<ScriptedTransport>) {
    let options = ClientOptions {
        request_timeout: Some(Duration::from_millis(30)),
        ..ClientOptions::default()
    };
    let client = ScriptedTransport::client(&transport, options);
    let (sender, receiver) = mpsc::channel();
    client
        .dispatch_with("slow", json!({}), move |outcome| {
            drop(sender.send(outcome));
        })
        .expect("dispatch");

    let outcome = receiver.recv_timeout(WAIT).expect("callback invoked");
    assert!(matches!(outcome, Err(RpcError::RequestTimeout { .. })));
    assert_eq!(client.pending_count(), 0);
}

#[rstest]
fn wait_timeout_leaves_the_call_pending(transport: Arc<ScriptedTransport>) {
    let client = client_over(&transport);
    let mut handle = client.dispatch::<String>("ping", json!({})).expect("dispatch");

    let early = handle
        .wait_timeout(Duration::from_millis(10))
        .expect("no failure");
    assert!(early.is_none());
    assert_eq!(client.pending_count(), 1);

    transport.respond(handle.id(), json!("pong"));
    let late = handle.wait_timeout(WAIT).expect("no failure");
    assert_eq!(late.as_deref(), Some("pong"));

    let again = handle.try_result().expect_err("outcome already taken");
    assert!(matches!(again, RpcError::InvalidRequestState { .. }));
}

#[rstest]
fn cancelled_handles_leave_late_responses_unmatched(transport: Arc<ScriptedTransport>) {
    let client = client_over(&transport);
    let cancelled = client.dispatch::<Value>("a", json!({})).expect("dispatch");
    let dropped = client.dispatch::<Value>("b", json!({})).expect("dispatch");
    let (cancelled_id, dropped_id) = (cancelled.id(), dropped.id());

    assert!(cancelled.cancel());
    drop(dropped);
    assert_eq!(client.pending_count(), 0);

    transport.respond(cancelled_id, json!(1));
    transport.respond(dropped_id, json!(2));
    assert_eq!(client.anomalies().unmatched, 2);
}

#[rstest]
fn cancel_by_id_completes_the_callback(transport: Arc<ScriptedTransport>) {
    let client = client_over(&transport);
    let (sender, receiver) = mpsc::channel();
    let id = client
        .dispatch_with("slow", json!({}), move |outcome| {
            drop(sender.send(outcome));
        })
        .expect("dispatch");

    assert!(client.cancel(id));
    assert!(!client.cancel(id));
    let outcome = receiver.recv_timeout(WAIT).expect("callback invoked");
    assert!(matches!(outcome, Err(RpcError::Cancelled { id: cancelled }) if cancelled == id));
}

#[rstest]
fn close_fails_pending_calls_and_is_idempotent(transport: Arc<ScriptedTransport>) {
    let options = ClientOptions {
        restart: RestartPolicy::OnDemand,
        ..ClientOptions::default()
    };
    let client = ScriptedTransport::client(&transport, options);
    let handle = client.dispatch::<Value>("slow", json!({})).expect("dispatch");

    client.close();
    client.close();

    assert!(handle.wait().expect_err("closed").is_transport_closed());
    assert!(!client.is_running());
    let err = client
        .dispatch::<Value>("after", json!({}))
        .expect_err("closed clients are not restarted");
    assert!(err.is_transport_closed());
    assert!(client.restart().is_err());
    assert_eq!(transport.starts(), 1);
}

#[rstest]
fn send_failures_are_reported_and_never_complete_the_callback() {
    let mut wire = MockWire::new();
    wire.expect_start().once().returning(|_| Ok(()));
    wire.expect_pid().returning(|| None);
    wire.expect_send().once().returning(|_| {
        Err(TransportError::write(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "stdin closed",
        )))
    });
    wire.expect_close().returning(|| ());

    let client = RpcClient::with_transport(Arc::new(wire), ClientOptions::default())
        .expect("mock starts");
    let (sender, receiver) = mpsc::channel::<Result<Value, RpcError>>();
    let err = client
        .dispatch_with("ping", json!({}), move |outcome| {
            drop(sender.send(outcome));
        })
        .expect_err("write fails");

    assert!(matches!(err, RpcError::Transport(TransportError::Write { .. })));
    assert_eq!(client.pending_count(), 0);
    assert!(receiver.try_recv().is_err());
}

#[rstest]
fn launch_failures_surface_from_construction() {
    let mut wire = MockWire::new();
    wire.expect_start().once().returning(|_| {
        Err(TransportError::ExecutableNotFound {
            command: String::from("kiota rpc"),
            source: Arc::new(std::io::Error::from(std::io::ErrorKind::NotFound)),
        })
    });

    let err = RpcClient::with_transport(Arc::new(wire), ClientOptions::default())
        .expect_err("start fails");
    assert!(matches!(
        err,
        RpcError::Transport(TransportError::ExecutableNotFound { .. })
    ));
}

#[rstest]
fn callbacks_may_drop_the_last_client_from_the_watchdog(transport: Arc<ScriptedTransport>) {
    let options = ClientOptions {
        request_timeout: Some(Duration::from_millis(30)),
        ..ClientOptions::default()
    };
    let client = Arc::new(ScriptedTransport::client(&transport, options));
    let (sender, receiver) = mpsc::channel();
    let owner = Arc::clone(&client);
    client
        .dispatch_with("slow", json!({}), move |outcome| {
            drop(sender.send((outcome, thread::current().name().map(str::to_owned))));
            drop(owner);
        })
        .expect("dispatch");
    drop(client);

    let (outcome, thread_name) = receiver.recv_timeout(WAIT).expect("callback invoked");
    assert!(matches!(outcome, Err(RpcError::RequestTimeout { .. })));
    assert_eq!(thread_name.as_deref(), Some("kiota-rpc-watchdog"));

    let deadline = std::time::Instant::now() + WAIT;
    while transport.is_running() && std::time::Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!transport.is_running(), "last drop must close the transport");
}
