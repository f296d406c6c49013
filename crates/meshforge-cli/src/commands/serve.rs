//! Stdio tool server
//!
//! Speaks newline-delimited JSON-RPC 2.0 on stdin/stdout, covering the MCP
//! subset an assistant needs to discover and call tools. Logs go to stderr so
//! stdout carries only protocol frames.

use super::tools::{call_tool, list_tools};
use anyhow::{Context, Result};
use meshforge_gen::AssetProvider;
use serde_json::{json, Value};
use std::io::{BufRead, Write};

pub const SERVER_NAME: &str = "meshforge";
const PROTOCOL_VERSION: &str = "2024-11-05";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

pub fn run(provider: &dyn AssetProvider) -> Result<()> {
    tracing::info!(provider = provider.name(), "Tool server listening on stdio");
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve(provider, stdin.lock(), stdout.lock())
}

/// Answer requests from `input` until it closes
pub fn serve<R: BufRead, W: Write>(
    provider: &dyn AssetProvider,
    input: R,
    mut output: W,
) -> Result<()> {
    for line in input.lines() {
        let line = line.context("Failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = handle_line(provider, &line) {
            writeln!(output, "{}", response).context("Failed to write response")?;
            output.flush()?;
        }
    }
    tracing::info!("Input closed, shutting down");
    Ok(())
}

/// Handle one frame. Notifications produce no response.
pub fn handle_line(provider: &dyn AssetProvider, line: &str) -> Option<Value> {
    let request: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return Some(error_response(Value::Null, PARSE_ERROR, &e.to_string())),
    };

    let Some(method) = request.get("method").and_then(Value::as_str) else {
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        return Some(error_response(id, INVALID_REQUEST, "Missing method"));
    };

    // Requests without an id are notifications
    let id = request.get("id").cloned()?;
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    let outcome = match method {
        "initialize" => Ok(initialize(&params)),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": list_tools() })),
        "tools/call" => tools_call(provider, params),
        other => Err((METHOD_NOT_FOUND, format!("Method not found: {}", other))),
    };

    Some(match outcome {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err((code, message)) => error_response(id, code, &message),
    })
}

fn initialize(params: &Value) -> Value {
    let version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or(PROTOCOL_VERSION);
    json!({
        "protocolVersion": version,
        "capabilities": { "tools": {} },
        "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") }
    })
}

fn tools_call(provider: &dyn AssetProvider, params: Value) -> Result<Value, (i64, String)> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or((INVALID_PARAMS, "tools/call requires a tool name".to_string()))?;
    let args = params.get("arguments").cloned().unwrap_or(json!({}));

    let result = call_tool(provider, name, args);
    serde_json::to_value(result).map_err(|e| (INVALID_PARAMS, e.to_string()))
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshforge_gen::providers::mock::MockProvider;

    fn request(provider: &MockProvider, frame: Value) -> Value {
        handle_line(provider, &frame.to_string()).expect("expected a response")
    }

    #[test]
    fn test_initialize_reports_server_info() {
        let provider = MockProvider::new();
        let resp = request(
            &provider,
            json!({"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26"}}),
        );
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"]["serverInfo"]["name"], SERVER_NAME);
        assert_eq!(resp["result"]["protocolVersion"], "2025-03-26");
        assert!(resp["result"]["capabilities"]["tools"].is_object());
    }

    #[test]
    fn test_notifications_get_no_reply() {
        let provider = MockProvider::new();
        let frame = json!({"jsonrpc":"2.0","method":"notifications/initialized"});
        assert!(handle_line(&provider, &frame.to_string()).is_none());
    }

    #[test]
    fn test_tools_list_and_call() {
        let provider = MockProvider::new();
        let resp = request(&provider, json!({"jsonrpc":"2.0","id":"a","method":"tools/list"}));
        assert_eq!(resp["result"]["tools"].as_array().unwrap().len(), 9);
        assert!(resp["result"]["tools"][0]["inputSchema"].is_object());

        let resp = request(
            &provider,
            json!({"jsonrpc":"2.0","id":2,"method":"tools/call",
                "params":{"name":"meshy_get_job","arguments":{"job_id":"j1","type":"remesh"}}}),
        );
        assert!(resp["result"].get("isError").is_none());
        let text = resp["result"]["content"][0]["text"].as_str().unwrap();
        let job: Value = serde_json::from_str(text).unwrap();
        assert_eq!(job["id"], "j1");
    }

    #[test]
    fn test_tool_failure_is_a_result_not_a_protocol_error() {
        let provider = MockProvider::new();
        let resp = request(
            &provider,
            json!({"jsonrpc":"2.0","id":3,"method":"tools/call",
                "params":{"name":"meshy_get_job","arguments":{"job_id":"j1"}}}),
        );
        assert!(resp.get("error").is_none());
        assert_eq!(resp["result"]["isError"], true);
    }

    #[test]
    fn test_protocol_errors() {
        let provider = MockProvider::new();
        let resp = request(&provider, json!({"jsonrpc":"2.0","id":4,"method":"resources/list"}));
        assert_eq!(resp["error"]["code"], METHOD_NOT_FOUND);

        let resp = handle_line(&provider, "{not json").unwrap();
        assert_eq!(resp["error"]["code"], PARSE_ERROR);
        assert!(resp["id"].is_null());

        let resp = request(&provider, json!({"jsonrpc":"2.0","id":5,"method":"tools/call","params":{}}));
        assert_eq!(resp["error"]["code"], INVALID_PARAMS);
    }

    #[test]
    fn test_serve_loop_writes_one_line_per_request() {
        let provider = MockProvider::new();
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n"
        );
        let mut output = Vec::new();
        serve(&provider, input.as_bytes(), &mut output).unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["id"], 2);
    }
}
