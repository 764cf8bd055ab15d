//! Wire types for the newline-delimited JSON-RPC 2.0 tool protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol revision sent in the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Id of an outgoing request. Servers echo it back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// A message written to a server: a request when it has an id, otherwise a
/// notification.
#[derive(Debug, Serialize)]
pub struct Outgoing<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<RequestId>,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl<'a> Outgoing<'a> {
    pub fn request(id: RequestId, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        }
    }

    pub fn notification(method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: None,
            method,
            params,
        }
    }
}

/// Any message read from a server.
///
/// Responses carry an `id` and no `method`. Notifications and requests from
/// the server carry a `method` and are never answers.
#[derive(Debug, Clone, Deserialize)]
pub struct Incoming {
    #[serde(default)]
    pub id: Option<RequestId>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl Incoming {
    /// Whether this message answers the request with the given id.
    pub fn answers(&self, id: &RequestId) -> bool {
        self.method.is_none() && self.id.as_ref() == Some(id)
    }

    /// The result payload; a missing `result` reads as `null`.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Error object of a failed response.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Malformed message, invalid request or unknown method: the exchange
    /// itself failed, as opposed to the server rejecting a well-formed call.
    pub fn is_protocol_level(&self) -> bool {
        matches!(self.code, -32700 | -32600 | -32601)
    }
}

/// Name and version of either end of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Params of `initialize`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: &'static str,
    pub capabilities: Value,
    pub client_info: Implementation,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            capabilities: Value::Object(Default::default()),
            client_info: Implementation {
                name: "skiff".into(),
                version: Some(env!("CARGO_PKG_VERSION").into()),
            },
        }
    }
}

/// Result of `initialize`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    #[serde(default)]
    pub server_info: Implementation,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerCapabilities {
    /// Present when the server offers tools; `listChanged` is not used.
    #[serde(default)]
    pub tools: Option<Value>,
}

/// A tool as advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema", deserialize_with = "schema_or_default")]
    pub input_schema: Value,
}

/// Parameter schema for tools that declare none.
pub fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

fn schema_or_default<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => empty_object_schema(),
        Some(Value::Object(map)) if map.is_empty() => empty_object_schema(),
        Some(schema) => schema,
    })
}

/// One page of `tools/list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<Tool>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallToolParams<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// Result of `tools/call`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ToolContent>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// All fragments joined into one string. Text is kept as-is, structured
    /// fragments are rendered as JSON and unknown kinds are dropped.
    pub fn text(&self) -> String {
        self.content.iter().map(ToolContent::render).collect()
    }
}

/// One fragment of a tool result.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: Value,
    },
    #[serde(other)]
    Unknown,
}

impl ToolContent {
    fn render(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Unknown => String::new(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }
}
