//! Integration tests for the host serve loop over in-process pipes.

use serde_json::json;

use agent_bridge::demo::demo_app;
use agent_bridge::host::ServeOutcome;

use super::test_helpers::HostHarness;

// ── Startup ─────────────────────────────────────────────────────────────────

/// The readiness signal is the first line, before any request.
#[tokio::test]
async fn readiness_signal_comes_first() {
    let mut host = HostHarness::start(demo_app().unwrap());

    let ready = host.recv().await;

    assert_eq!(
        ready,
        json!({
            "id": "__ready__",
            "success": true,
            "result": {"name": "DemoApp", "protocol": "ndjson", "version": "1.0"}
        })
    );
}

#[tokio::test]
async fn ping_echoes_request_id() {
    let mut host = HostHarness::start_ready(demo_app().unwrap()).await;

    host.send(r#"{"id":"abc","method":"ping"}"#).await;
    let response = host.recv().await;

    assert_eq!(response["id"], "abc");
    assert_eq!(response["success"], true);
    assert_eq!(response["result"]["pong"], true);
}

// ── Concurrency ─────────────────────────────────────────────────────────────

/// A slow tool does not hold up later requests.
#[tokio::test]
async fn slow_request_does_not_block_later_ones() {
    let mut host = HostHarness::start_ready(demo_app().unwrap()).await;

    host.send(r#"{"id":"slow","method":"invokeTool","body":{"toolkit":"AsyncToolkit","tool":"delay","args":{"ms":300}}}"#)
        .await;
    host.send(r#"{"id":"fast","method":"ping"}"#).await;

    let first = host.recv().await;
    let second = host.recv().await;

    assert_eq!(first["id"], "fast", "ping must overtake the delayed call");
    assert_eq!(second["id"], "slow");
    assert_eq!(second["result"], json!({"delayed": 300}));
}

/// Every request gets exactly one response with its own id.
#[tokio::test]
async fn concurrent_requests_each_get_their_response() {
    let mut host = HostHarness::start_ready(demo_app().unwrap()).await;

    host.send(r#"{"id":"1","method":"invokeTool","body":{"toolkit":"UtilityToolkit","tool":"add","args":{"a":2,"b":3}}}"#).await;
    host.send(r#"{"id":"2","method":"invokeTool","body":{"toolkit":"UtilityToolkit","tool":"add","args":{"a":10,"b":20}}}"#).await;
    host.send(r#"{"id":"3","method":"invokeTool","body":{"toolkit":"AsyncToolkit","tool":"delay","args":{"ms":50}}}"#).await;

    let mut results = std::collections::BTreeMap::new();
    for _ in 0..3 {
        let response = host.recv().await;
        let id = response["id"].as_str().unwrap().to_owned();
        assert!(results.insert(id, response["result"].clone()).is_none(), "duplicate response");
    }

    assert_eq!(results["1"]["result"], 5);
    assert_eq!(results["2"]["result"], 30);
    assert_eq!(results["3"], json!({"delayed": 50}));
}

// ── Malformed input ─────────────────────────────────────────────────────────

/// Bad lines are answered and the loop keeps going.
#[tokio::test]
async fn malformed_lines_do_not_stop_the_loop() {
    let mut host = HostHarness::start_ready(demo_app().unwrap()).await;

    host.send("this is not json").await;
    host.send("").await;
    host.send(r#"{"method":"ping"}"#).await;
    host.send(r#"{"id":"u","method":"nope"}"#).await;
    host.send(r#"{"id":"ok","method":"ping"}"#).await;

    let parse = host.recv().await;
    assert_eq!(parse["id"], "__parse_error__");
    assert_eq!(parse["errorObj"]["code"], "PARSE_ERROR");

    let invalid = host.recv().await;
    assert_eq!(invalid["id"], "__invalid__");
    assert_eq!(invalid["errorObj"]["code"], "INVALID_REQUEST");

    let unknown = host.recv().await;
    assert_eq!(unknown["id"], "u");
    assert_eq!(unknown["errorObj"]["code"], "UNKNOWN_METHOD");

    let ok = host.recv().await;
    assert_eq!(ok["id"], "ok");
    assert_eq!(ok["success"], true);
}

/// A line beyond the 1 MiB limit is a parse error; the next line is served.
#[tokio::test]
async fn oversized_line_is_rejected_and_skipped() {
    let mut host = HostHarness::start_ready(demo_app().unwrap()).await;

    let huge = format!(
        r#"{{"id":"big","method":"invokeTool","body":{{"toolkit":"UtilityToolkit","tool":"echo","args":{{"message":"{}"}}}}}}"#,
        "x".repeat(1_100_000)
    );
    host.send(&huge).await;
    host.send(r#"{"id":"after","method":"ping"}"#).await;

    let rejected = host.recv().await;
    assert_eq!(rejected["id"], "__parse_error__");
    assert_eq!(rejected["errorObj"]["code"], "PARSE_ERROR");

    let after = host.recv().await;
    assert_eq!(after["id"], "after");
}

/// A line that is not UTF-8 is a parse error; a request buffered right
/// behind it is still served.
#[tokio::test]
async fn invalid_utf8_line_is_rejected_and_skipped() {
    let mut host = HostHarness::start_ready(demo_app().unwrap()).await;

    host.send_bytes(b"{\"id\":\"x\",\"method\":\"\xff\xfe\"}\n{\"id\":\"after\",\"method\":\"ping\"}\n")
        .await;

    let rejected = host.recv().await;
    assert_eq!(rejected["id"], "__parse_error__");
    assert_eq!(rejected["errorObj"]["code"], "PARSE_ERROR");

    let after = host.recv().await;
    assert_eq!(after["id"], "after", "the loop must keep serving");
    assert_eq!(after["result"]["pong"], true);

    host.close_input();
    assert_eq!(host.outcome().await, ServeOutcome::InputClosed);
}

// ── Termination ─────────────────────────────────────────────────────────────

/// `shutdown` is acknowledged, in-flight work is dropped, the loop stops.
#[tokio::test]
async fn shutdown_acknowledges_and_stops() {
    let mut host = HostHarness::start_ready(demo_app().unwrap()).await;

    host.send(r#"{"id":"long","method":"invokeTool","body":{"toolkit":"AsyncToolkit","tool":"delay","args":{"ms":30000}}}"#)
        .await;
    host.send(r#"{"id":"bye","method":"shutdown"}"#).await;

    let ack = host.recv().await;
    assert_eq!(ack["id"], "bye");
    assert_eq!(ack["result"], json!({"shutting_down": true}));

    assert_eq!(host.recv_or_eof().await, None, "no response may follow the ack");
    assert_eq!(host.outcome().await, ServeOutcome::ShutdownRequested);
}

/// Lines after `shutdown` are not processed.
#[tokio::test]
async fn requests_after_shutdown_are_ignored() {
    let mut host = HostHarness::start_ready(demo_app().unwrap()).await;

    host.send("{\"id\":\"bye\",\"method\":\"shutdown\"}\n{\"id\":\"late\",\"method\":\"ping\"}")
        .await;

    assert_eq!(host.recv().await["id"], "bye");
    assert_eq!(host.recv_or_eof().await, None);
}

/// Input EOF lets in-flight requests finish and be answered.
#[tokio::test]
async fn input_eof_drains_in_flight_requests() {
    let mut host = HostHarness::start_ready(demo_app().unwrap()).await;

    host.send(r#"{"id":"d","method":"invokeTool","body":{"toolkit":"AsyncToolkit","tool":"delay","args":{"ms":100}}}"#)
        .await;
    host.close_input();

    let response = host.recv().await;
    assert_eq!(response["id"], "d");
    assert_eq!(response["result"], json!({"delayed": 100}));
    assert_eq!(host.recv_or_eof().await, None);
    assert_eq!(host.outcome().await, ServeOutcome::InputClosed);
}

#[tokio::test]
async fn cancellation_stops_the_loop() {
    let host = HostHarness::start_ready(demo_app().unwrap()).await;

    host.cancel.cancel();

    assert_eq!(host.outcome().await, ServeOutcome::Cancelled);
}
