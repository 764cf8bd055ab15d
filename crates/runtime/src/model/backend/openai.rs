//! OpenAI-compatible chat completions backend.

use crate::model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, Reply, Role, ToolCall, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    /// JSON-encoded argument object.
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiReply,
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Builder for creating an OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiBackendBuilder {
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiBackendBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: model.into(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }

    /// Server root; `/v1/chat/completions` is appended.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the maximum tokens for responses.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn build(self) -> OpenAiBackend {
        OpenAiBackend {
            client: reqwest::Client::new(),
            url: format!("{}/v1/chat/completions", self.base_url),
            api_key: self.api_key,
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// Backend for any server speaking the OpenAI chat completions API.
pub struct OpenAiBackend {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiBackend {
    pub fn builder(model: impl Into<String>) -> OpenAiBackendBuilder {
        OpenAiBackendBuilder::new(model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn role_to_api_str(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    fn to_api_message(message: &Message) -> ApiMessage<'_> {
        let tool_calls = message
            .tool_calls
            .iter()
            .map(|call| ApiToolCall {
                id: call.id.clone(),
                call_type: function_type(),
                function: ApiFunction {
                    name: call.name.clone(),
                    arguments: Value::Object(call.arguments.clone()).to_string(),
                },
            })
            .collect::<Vec<_>>();

        // Assistant messages that only carry tool calls send `null` content.
        let content = match message.content.as_deref() {
            Some("") if !tool_calls.is_empty() => None,
            other => other,
        };

        ApiMessage {
            role: Self::role_to_api_str(message.role),
            content,
            tool_calls,
            tool_call_id: message.tool_call_id.as_deref(),
        }
    }

    /// Decode one call. Undecodable arguments are recorded on the call so it
    /// is answered with a tool error while its siblings still run.
    fn parse_tool_call(call: ApiToolCall) -> ToolCall {
        let ApiToolCall { id, function, .. } = call;
        if function.arguments.trim().is_empty() {
            return ToolCall::new(id, function.name, Map::new());
        }
        match serde_json::from_str::<Map<String, Value>>(&function.arguments) {
            Ok(arguments) => ToolCall::new(id, function.name, arguments),
            Err(e) => {
                warn!(tool = %function.name, call_id = %id, error = %e, "undecodable tool arguments");
                ToolCall::malformed(id, function.name, format!("arguments are not a JSON object: {e}"))
            }
        }
    }
}

impl std::fmt::Display for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "openai({}, {})", self.model, self.url)
    }
}

impl Backend for OpenAiBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let tools: Vec<Value> = request.tools.iter().map(|t| t.to_function()).collect();
        let api_request = ApiRequest {
            model: &self.model,
            messages: request.messages.iter().map(Self::to_api_message).collect(),
            tool_choice: (!tools.is_empty()).then_some("auto"),
            tools,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut req = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .header("accept", "application/json");
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api { status, body });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let usage = api_response
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();
        debug!(
            model = %self.model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "model call complete"
        );

        let message = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("no choices in response".into()))?
            .message;

        let reply = if message.tool_calls.is_empty() {
            Reply::Answer(message.content.unwrap_or_default())
        } else {
            let calls = message
                .tool_calls
                .into_iter()
                .map(Self::parse_tool_call)
                .collect();
            Reply::ToolCalls {
                content: message.content.filter(|c| !c.is_empty()),
                calls,
            }
        };

        Ok(ModelResponse { reply, usage })
    }
}
