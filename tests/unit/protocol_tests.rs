//! Unit tests for wire envelopes, method names, and payload shapes.

use serde_json::{json, Value};

use agent_bridge::protocol::{
    is_reserved_id, AgentInfo, ArgSpec, ErrorCode, ErrorObject, InvokeAgentParams,
    InvokeToolParams, Method, ModelDescriptor, PingResult, ReadyInfo, Request, Response, Secret,
    ShutdownResult, INVALID_ID, MISSING_ERROR_CODE, PARSE_ERROR_ID, READY_ID,
};
use agent_bridge::AppError;

// ── Methods ─────────────────────────────────────────────────────────────────

#[test]
fn method_wire_names_round_trip() {
    let names: Vec<&str> = Method::ALL.iter().map(|m| m.as_str()).collect();
    assert_eq!(
        names,
        [
            "ping",
            "getAppInfo",
            "listAgents",
            "listToolkits",
            "listTools",
            "listPrompts",
            "listModels",
            "invokeTool",
            "invokeAgent",
            "shutdown"
        ]
    );
    for method in Method::ALL {
        assert_eq!(Method::from_name(method.as_str()), Some(method));
    }
}

/// Method names are case-sensitive.
#[test]
fn method_lookup_is_case_sensitive() {
    assert_eq!(Method::from_name("Ping"), None);
    assert_eq!(Method::from_name("invoketool"), None);
    assert_eq!(Method::from_name(""), None);
}

#[test]
fn reserved_ids_are_recognised() {
    assert!(is_reserved_id(READY_ID));
    assert!(is_reserved_id(PARSE_ERROR_ID));
    assert!(is_reserved_id(INVALID_ID));
    assert!(!is_reserved_id("1"));
}

// ── Envelopes ───────────────────────────────────────────────────────────────

/// Success responses carry `result` and omit `errorObj`.
#[test]
fn ok_response_shape() {
    let line = Response::ok("3", json!({"pong": true})).to_line().unwrap();
    let value: Value = serde_json::from_str(&line).unwrap();

    assert_eq!(value, json!({"id": "3", "success": true, "result": {"pong": true}}));
}

/// Error responses carry `errorObj` with the wire code spelling.
#[test]
fn error_response_shape() {
    let line = Response::error("4", ErrorCode::UnknownMethod, "Unknown method: foo")
        .to_line()
        .unwrap();
    let value: Value = serde_json::from_str(&line).unwrap();

    assert_eq!(
        value,
        json!({
            "id": "4",
            "success": false,
            "errorObj": {"code": "UNKNOWN_METHOD", "message": "Unknown method: foo"}
        })
    );
}

/// Serialized lines never contain a raw newline, even when strings do.
#[test]
fn response_line_has_no_raw_newline() {
    let line = Response::ok("1", json!({"text": "a\nb"})).to_line().unwrap();
    assert!(!line.contains('\n'), "line must stay on one line: {line}");
}

#[test]
fn request_omits_absent_body() {
    let request = Request {
        id: "1".into(),
        method: "ping".into(),
        body: None,
    };
    assert_eq!(
        serde_json::to_value(&request).unwrap(),
        json!({"id": "1", "method": "ping"})
    );
}

#[test]
fn into_result_yields_value_on_success() {
    let value = Response::ok("1", json!(42)).into_result().unwrap();
    assert_eq!(value, json!(42));
}

#[test]
fn into_result_yields_remote_error_on_failure() {
    let err = Response::error("1", ErrorCode::ToolError, "boom")
        .into_result()
        .unwrap_err();
    match err {
        AppError::Remote(obj) => {
            assert_eq!(obj.code, ErrorCode::ToolError);
            assert_eq!(obj.message, "boom");
        }
        other => panic!("expected Remote, got {other:?}"),
    }
}

/// A failure without `errorObj` still becomes a remote error.
#[test]
fn into_result_tolerates_missing_error_object() {
    let response: Response = serde_json::from_str(r#"{"id":"1","success":false}"#).unwrap();
    let err = response.into_result().unwrap_err();
    assert!(matches!(
        err,
        AppError::Remote(ref obj) if obj.code == ErrorCode::Other(MISSING_ERROR_CODE.into())
    ));
}

/// Codes unknown to this crate decode as `Other` and keep their spelling.
#[test]
fn unknown_error_code_keeps_raw_spelling() {
    let obj: ErrorObject =
        serde_json::from_str(r#"{"code":"RATE_LIMITED","message":"slow down"}"#).unwrap();
    assert_eq!(obj.code, ErrorCode::Other("RATE_LIMITED".into()));
    assert_eq!(obj.code.to_string(), "RATE_LIMITED");

    let back = serde_json::to_value(&obj).unwrap();
    assert_eq!(back["code"], "RATE_LIMITED");

    let err = AppError::Remote(obj);
    assert_eq!(err.to_string(), "remote: RATE_LIMITED: slow down");
}

#[test]
fn known_error_codes_use_wire_spelling() {
    assert_eq!(
        serde_json::to_value(ErrorCode::InternalError).unwrap(),
        json!("INTERNAL_ERROR")
    );
    let code: ErrorCode = serde_json::from_value(json!("TOOL_ERROR")).unwrap();
    assert_eq!(code, ErrorCode::ToolError);
}

#[test]
fn error_details_are_optional() {
    let obj: ErrorObject =
        serde_json::from_str(r#"{"code":"NOT_FOUND","message":"x","details":"more"}"#).unwrap();
    assert_eq!(obj.details.as_deref(), Some("more"));
}

// ── Payloads ────────────────────────────────────────────────────────────────

#[test]
fn ready_info_shape() {
    let info = ReadyInfo {
        name: "DemoApp".into(),
        protocol: "ndjson".into(),
        version: "1.0".into(),
    };
    assert_eq!(
        serde_json::to_value(info).unwrap(),
        json!({"name": "DemoApp", "protocol": "ndjson", "version": "1.0"})
    );
}

/// `ping` and `shutdown` results keep their snake_case field names.
#[test]
fn snake_case_results_keep_wire_names() {
    let ping = PingResult {
        pong: true,
        protocol_version: "1.0".into(),
        timestamp: 1,
    };
    let value = serde_json::to_value(ping).unwrap();
    assert_eq!(value["protocol_version"], json!("1.0"));

    let shutdown = serde_json::to_value(ShutdownResult { shutting_down: true }).unwrap();
    assert_eq!(shutdown, json!({"shutting_down": true}));
}

#[test]
fn agent_info_uses_camel_case() {
    let info = AgentInfo {
        name: "TestAgent".into(),
        system_prompt: "be helpful".into(),
        model: ModelDescriptor::new("test-model").with_key(Secret::from_env("OPENAI_API_KEY")),
        toolkits: vec!["UtilityToolkit".into()],
    };
    assert_eq!(
        serde_json::to_value(info).unwrap(),
        json!({
            "name": "TestAgent",
            "systemPrompt": "be helpful",
            "model": {
                "identifier": "test-model",
                "key": {"source": "env", "name": "OPENAI_API_KEY"}
            },
            "toolkits": ["UtilityToolkit"]
        })
    );
}

#[test]
fn arg_spec_uses_type_and_enum_keys() {
    let spec = ArgSpec::new("string", "colour")
        .required()
        .with_default(json!("red"))
        .with_enum(vec![json!("red"), json!("blue")]);
    assert_eq!(
        serde_json::to_value(spec).unwrap(),
        json!({
            "type": "string",
            "description": "colour",
            "required": true,
            "default": "red",
            "enum": ["red", "blue"]
        })
    );
}

#[test]
fn invoke_tool_params_omit_absent_args() {
    let params = InvokeToolParams {
        toolkit: "UtilityToolkit".into(),
        tool: "echo".into(),
        args: None,
    };
    assert_eq!(
        serde_json::to_value(params).unwrap(),
        json!({"toolkit": "UtilityToolkit", "tool": "echo"})
    );
}

#[test]
fn invoke_agent_params_use_camel_case() {
    let mut params = InvokeAgentParams::new("TestAgent", "hi");
    params.thread_id = Some("t-1".into());
    assert_eq!(
        serde_json::to_value(params).unwrap(),
        json!({"agent": "TestAgent", "prompt": "hi", "threadId": "t-1"})
    );
}
