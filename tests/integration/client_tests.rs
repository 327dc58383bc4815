//! End-to-end tests: the supervisor client driving the demo host binary.

use std::time::Duration;

use serde_json::json;
use serial_test::serial;

use agent_bridge::client::{Client, ClientState};
use agent_bridge::protocol::{ErrorCode, InvokeAgentParams, Method};
use agent_bridge::AppError;

use super::test_helpers::{demo_client, demo_host_config, demo_host_spawn, eventually, PROMPT};

fn remote_code(err: &AppError) -> ErrorCode {
    match err {
        AppError::Remote(obj) => obj.code.clone(),
        other => panic!("expected a remote error, got {other:?}"),
    }
}

// ── Lifecycle ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn spawn_observes_readiness() {
    let mut client = Client::new(demo_host_config());
    assert_eq!(client.state(), ClientState::Unspawned);

    let ready = client.spawn().await.expect("spawn");

    assert_eq!(ready.name, "DemoApp");
    assert_eq!(ready.protocol, "ndjson");
    assert_eq!(ready.version, "1.0");
    assert_eq!(client.state(), ClientState::Ready);
    assert!(client.process_id().is_some());
    assert_eq!(client.ready_info().map(|r| r.name.as_str()), Some("DemoApp"));

    client.close().await;
}

#[tokio::test]
async fn calls_before_spawn_fail_closed() {
    let client = Client::new(demo_host_config());

    let err = client.ping().await.expect_err("unspawned client must refuse");

    assert!(matches!(err, AppError::Closed(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn second_spawn_is_rejected() {
    let mut client = demo_client().await;

    let err = client.spawn().await.expect_err("second spawn must fail");

    assert!(matches!(err, AppError::Closed(_)));
    client.close().await;
}

/// After `close`, the client is closed for good and calls fail fast.
#[tokio::test]
async fn close_is_idempotent_and_final() {
    let mut client = demo_client().await;

    client.close().await;
    client.close().await;

    assert_eq!(client.state(), ClientState::Closed);
    assert!(client.process_id().is_none());
    let err = tokio::time::timeout(Duration::from_millis(500), client.ping())
        .await
        .expect("closed client must fail fast")
        .expect_err("closed client must refuse calls");
    assert!(matches!(err, AppError::Closed(_)));
}

/// `shutdown` is acknowledged, the host exits, and the client notices.
#[tokio::test]
async fn shutdown_ack_then_host_exit_closes_client() {
    let client = demo_client().await;

    let ack = client.shutdown().await.expect("shutdown ack");
    assert!(ack.shutting_down);

    tokio::time::timeout(PROMPT, client.closed())
        .await
        .expect("client must observe host exit");
    assert_eq!(client.state(), ClientState::Closed);

    let err = client.ping().await.expect_err("exited host must refuse calls");
    assert!(matches!(err, AppError::Closed(_)), "unexpected error: {err}");
}

// ── Introspection ───────────────────────────────────────────────────────────

#[tokio::test]
async fn ping_reports_protocol_version() {
    let mut client = demo_client().await;

    let pong = client.ping().await.expect("ping");

    assert!(pong.pong);
    assert_eq!(pong.protocol_version, "1.0");
    assert!(pong.timestamp > 0);
    client.close().await;
}

#[tokio::test]
async fn app_info_and_listings() {
    let mut client = demo_client().await;

    let info = client.app_info().await.expect("app info");
    assert_eq!((info.agent_count, info.toolkit_count), (1, 2));

    let agents = client.list_agents().await.expect("agents");
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].name, "TestAgent");
    assert_eq!(
        agents[0].system_prompt,
        "You are a helpful test agent for integration testing."
    );

    let toolkits = client.list_toolkits().await.expect("toolkits");
    assert_eq!(toolkits.len(), 2);
    assert_eq!(toolkits[0].tools.len(), 3);

    let tools = client.list_tools().await.expect("tools");
    assert_eq!(tools.len(), 6);
    assert!(tools
        .iter()
        .any(|t| t.name == "fail_async" && t.toolkit_name == "AsyncToolkit"));

    let prompts = client.list_prompts().await.expect("prompts");
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].agent_name, "TestAgent");

    let models = client.list_models().await.expect("models");
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].identifier, "test-model");

    client.close().await;
}

// ── Tools ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn invoke_tool_round_trip() {
    let mut client = demo_client().await;

    let result = client
        .invoke_tool("UtilityToolkit", "add", json!({"a": 10, "b": 25}))
        .await
        .expect("add");

    assert_eq!(result, json!({"result": 35, "operation": "add"}));
    client.close().await;
}

/// Concurrent calls on one client each resolve with their own result.
#[tokio::test]
async fn concurrent_calls_are_correlated() {
    let mut client = demo_client().await;

    let (a, b, c) = tokio::join!(
        client.invoke_tool("UtilityToolkit", "add", json!({"a": 2, "b": 3})),
        client.invoke_tool("UtilityToolkit", "add", json!({"a": 10, "b": 20})),
        client.invoke_tool("AsyncToolkit", "delay", json!({"ms": 50})),
    );

    assert_eq!(a.expect("a")["result"], 5);
    assert_eq!(b.expect("b")["result"], 30);
    assert_eq!(c.expect("c"), json!({"delayed": 50}));
    assert_eq!(client.pending_calls().await, 0);
    client.close().await;
}

#[tokio::test]
async fn echo_returns_message_and_timestamp() {
    let mut client = demo_client().await;

    let result = client
        .invoke_tool("UtilityToolkit", "echo", json!({"message": "héllo\nworld"}))
        .await
        .expect("echo");

    assert_eq!(result["echoed"], "héllo\nworld");
    assert!(result["timestamp"].is_string());
    client.close().await;
}

#[tokio::test]
async fn missing_tool_is_not_found() {
    let mut client = demo_client().await;

    let err = client
        .invoke_tool("UtilityToolkit", "nope", json!(null))
        .await
        .expect_err("unknown tool must fail");

    assert_eq!(remote_code(&err), ErrorCode::NotFound);
    assert_eq!(err.message(), "Tool not found: nope");
    client.close().await;
}

#[tokio::test]
async fn tool_failures_keep_their_message() {
    let mut client = demo_client().await;

    let sync_err = client
        .invoke_tool("AsyncToolkit", "fail", json!({"message": "sync boom"}))
        .await
        .expect_err("fail must fail");
    assert_eq!(remote_code(&sync_err), ErrorCode::ToolError);
    assert_eq!(sync_err.message(), "sync boom");

    let async_err = client
        .invoke_tool("AsyncToolkit", "fail_async", json!({"message": "async boom"}))
        .await
        .expect_err("fail_async must fail");
    assert_eq!(remote_code(&async_err), ErrorCode::ToolError);
    assert_eq!(async_err.message(), "async boom");

    client.ping().await.expect("host must survive tool failures");
    client.close().await;
}

#[tokio::test]
async fn non_object_args_are_refused_locally() {
    let mut client = demo_client().await;

    let err = client
        .invoke_tool("UtilityToolkit", "add", json!([1, 2]))
        .await
        .expect_err("array args must be refused");

    assert!(matches!(err, AppError::Protocol(_)));
    client.close().await;
}

// ── Agents ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn invoke_agent_continues_thread() {
    let mut client = demo_client().await;
    let mut params = InvokeAgentParams::new("TestAgent", "hello");
    params.thread_id = Some("thread-42".into());

    let result = client.invoke_agent(params).await.expect("invoke agent");

    assert_eq!(result.thread_id, "thread-42");
    assert_eq!(result.status, "invoked");
    client.close().await;
}

#[tokio::test]
async fn unknown_agent_is_not_found() {
    let mut client = demo_client().await;

    let err = client
        .invoke_agent(InvokeAgentParams::new("Ghost", "boo"))
        .await
        .expect_err("unknown agent must fail");

    assert_eq!(remote_code(&err), ErrorCode::NotFound);
    client.close().await;
}

// ── Timeouts ────────────────────────────────────────────────────────────────

/// A timed-out call fails alone; its late response is counted and the
/// client stays usable.
#[tokio::test]
async fn timeout_fails_only_that_call() {
    let mut client = demo_client().await;

    let err = client
        .request(
            Method::InvokeTool,
            Some(json!({"toolkit": "AsyncToolkit", "tool": "delay", "args": {"ms": 400}})),
            Some(Duration::from_millis(50)),
        )
        .await
        .expect_err("call must time out");
    assert!(matches!(err, AppError::Timeout(_)), "unexpected error: {err}");
    assert_eq!(client.pending_calls().await, 0, "timed-out call must be removed");

    let observed = &client;
    assert!(
        eventually(|| async move { observed.orphaned_responses() == 1 }).await,
        "late response must be counted as orphaned"
    );
    client.ping().await.expect("client must remain usable");
    client.close().await;
}

/// A caller that stops waiting (here an outer timeout drops the future)
/// leaves no pending entry behind, and the eventual response is orphaned.
#[tokio::test]
async fn dropped_request_releases_pending_entry() {
    let mut client = demo_client().await;

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        client.invoke_tool("AsyncToolkit", "delay", json!({"ms": 300})),
    )
    .await;
    assert!(abandoned.is_err(), "outer timeout must fire first");

    let observed = &client;
    assert!(
        eventually(|| async move { observed.pending_calls().await == 0 }).await,
        "abandoned call must be removed"
    );
    assert!(
        eventually(|| async move { observed.orphaned_responses() == 1 }).await,
        "late response must be counted as orphaned"
    );
    client.ping().await.expect("client must remain usable");
    client.close().await;
}

// ── Environment ─────────────────────────────────────────────────────────────

const SAMPLE_VAR: &str = "AGENT_BRIDGE_TEST_SAMPLE";

async fn host_env_value(client: &Client) -> serde_json::Value {
    client
        .invoke_tool("UtilityToolkit", "env", json!({"name": SAMPLE_VAR}))
        .await
        .expect("env tool")
}

#[tokio::test]
#[serial]
async fn inherited_environment_is_visible() {
    std::env::set_var(SAMPLE_VAR, "inherited");
    let mut client = demo_client().await;

    assert_eq!(host_env_value(&client).await, "inherited");

    client.close().await;
    std::env::remove_var(SAMPLE_VAR);
}

#[tokio::test]
#[serial]
async fn cleared_environment_hides_parent_variables() {
    std::env::set_var(SAMPLE_VAR, "secret");
    let config = agent_bridge::client::ClientConfig::new(demo_host_spawn().inherit_env(false));
    let mut client = Client::connect(config).await.expect("spawn");

    assert_eq!(host_env_value(&client).await, serde_json::Value::Null);

    client.close().await;
    std::env::remove_var(SAMPLE_VAR);
}

#[tokio::test]
#[serial]
async fn explicit_variables_survive_cleared_environment() {
    let spawn = demo_host_spawn()
        .inherit_env(false)
        .with_env(SAMPLE_VAR, "explicit");
    let mut client = Client::connect(agent_bridge::client::ClientConfig::new(spawn))
        .await
        .expect("spawn");

    assert_eq!(host_env_value(&client).await, "explicit");
    client.close().await;
}

// ── Diagnostics ─────────────────────────────────────────────────────────────

/// Host logs land on stderr, not on the protocol stream.
#[tokio::test]
async fn host_stderr_is_captured() {
    let spawn = demo_host_spawn().with_env("RUST_LOG", "info");
    let mut client = Client::connect(agent_bridge::client::ClientConfig::new(spawn))
        .await
        .expect("spawn");

    let observed = &client;
    let captured = eventually(|| async move {
        observed
            .stderr_tail()
            .await
            .iter()
            .any(|line| line.contains("host ready"))
    })
    .await;

    assert!(captured, "stderr tail: {:?}", client.stderr_tail().await);
    assert_eq!(client.orphaned_responses(), 0, "logs must not reach stdout");
    client.close().await;
}
