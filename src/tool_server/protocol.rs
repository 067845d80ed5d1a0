//! Wire types for the MCP stdio transport: JSON-RPC 2.0 messages, one JSON
//! object per line.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
const JSONRPC: &str = "2.0";

#[derive(Debug, Clone, PartialEq, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Response {
        id: u64,
        outcome: Result<Value, RpcError>,
    },
    /// Server-initiated request; `id` is echoed back verbatim.
    Request { id: Value, method: String },
    Notification { method: String },
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

pub fn encode_request(id: u64, method: &str, params: Option<Value>) -> String {
    let mut msg = json!({ "jsonrpc": JSONRPC, "id": id, "method": method });
    if let Some(params) = params {
        msg["params"] = params;
    }
    frame(msg)
}

pub fn encode_notification(method: &str) -> String {
    frame(json!({ "jsonrpc": JSONRPC, "method": method }))
}

pub fn encode_result(id: &Value, result: Value) -> String {
    frame(json!({ "jsonrpc": JSONRPC, "id": id, "result": result }))
}

pub fn encode_method_not_found(id: &Value, method: &str) -> String {
    frame(json!({
        "jsonrpc": JSONRPC,
        "id": id,
        "error": { "code": -32601, "message": format!("Method not found: {}", method) }
    }))
}

fn frame(msg: Value) -> String {
    let mut line = msg.to_string();
    line.push('\n');
    line
}

pub fn parse_incoming(line: &str) -> Result<Incoming, String> {
    let raw: RawMessage = serde_json::from_str(line).map_err(|e| e.to_string())?;

    match (raw.method, raw.id) {
        (Some(method), Some(id)) => Ok(Incoming::Request { id, method }),
        (Some(method), None) => Ok(Incoming::Notification { method }),
        (None, Some(id)) => {
            let id = response_id(&id).ok_or_else(|| format!("unexpected response id {}", id))?;
            let outcome = match raw.error {
                Some(err) => Err(err),
                None => Ok(raw.result.unwrap_or(Value::Null)),
            };
            Ok(Incoming::Response { id, outcome })
        }
        (None, None) => Err("message has neither method nor id".to_string()),
    }
}

// Ids are always sent as numbers, but some servers echo them back as strings.
fn response_id(id: &Value) -> Option<u64> {
    id.as_u64()
        .or_else(|| id.as_str().and_then(|s| s.parse().ok()))
}

pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: String,
    #[serde(default)]
    pub server_info: ServerInfo,
}

/// One callable tool as advertised by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![json!({ "type": "text", "text": text.into() })],
            is_error: false,
        }
    }

    /// Joined text blocks, or the raw content when the server sent none.
    pub fn to_text(&self) -> String {
        let texts: Vec<&str> = self
            .content
            .iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect();
        if !texts.is_empty() {
            return texts.join("\n");
        }
        serde_json::to_string(&self.content).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_request_is_one_line() {
        let line = encode_request(7, "tools/list", Some(json!({"cursor": "abc"})));
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        let value: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "tools/list");
        assert_eq!(value["params"]["cursor"], "abc");
        assert_eq!(value["jsonrpc"], "2.0");
    }

    #[test]
    fn test_request_without_params_omits_field() {
        let line = encode_request(1, "tools/list", None);
        let value: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert!(value.get("params").is_none());
    }

    #[test]
    fn test_parse_response_variants() {
        let ok = parse_incoming(r#"{"jsonrpc":"2.0","id":3,"result":{"tools":[]}}"#).unwrap();
        assert_eq!(
            ok,
            Incoming::Response { id: 3, outcome: Ok(json!({"tools": []})) }
        );

        let err = parse_incoming(
            r#"{"jsonrpc":"2.0","id":"4","error":{"code":-32602,"message":"bad params"}}"#,
        )
        .unwrap();
        match err {
            Incoming::Response { id, outcome: Err(e) } => {
                assert_eq!(id, 4);
                assert_eq!(e.code, -32602);
                assert_eq!(e.to_string(), "bad params (code -32602)");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_server_messages() {
        assert_eq!(
            parse_incoming(r#"{"jsonrpc":"2.0","id":"p1","method":"ping"}"#).unwrap(),
            Incoming::Request { id: json!("p1"), method: "ping".into() }
        );
        assert_eq!(
            parse_incoming(r#"{"jsonrpc":"2.0","method":"notifications/message","params":{}}"#)
                .unwrap(),
            Incoming::Notification { method: "notifications/message".into() }
        );
        assert!(parse_incoming("GitHub MCP Server running on stdio").is_err());
        assert!(parse_incoming(r#"{"jsonrpc":"2.0"}"#).is_err());
    }

    #[test]
    fn test_tool_descriptor_defaults() {
        let tool: ToolDescriptor = serde_json::from_value(json!({"name": "get_me"})).unwrap();
        assert_eq!(tool.description, None);
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn test_tool_output_text() {
        let output: ToolOutput = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "image", "data": "..."},
                {"type": "text", "text": "second"}
            ],
            "isError": true
        }))
        .unwrap();
        assert!(output.is_error);
        assert_eq!(output.to_text(), "first\nsecond");

        let no_text = ToolOutput {
            content: vec![json!({"type": "image", "data": "x"})],
            is_error: false,
        };
        assert_eq!(no_text.to_text(), r#"[{"data":"x","type":"image"}]"#);
    }
}
