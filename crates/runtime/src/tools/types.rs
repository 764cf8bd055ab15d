//! Tool-related types.

use super::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;

/// A tool definition exposed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// The function-calling shape expected by OpenAI-compatible APIs.
    pub fn to_function(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// What a tool call produced, as handed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolEnvelope {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(error: &ToolError) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.to_string()),
        }
    }

    /// Serialize to the string placed in the transcript.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"success":false,"error":"unserializable tool result: {e}"}}"#)
        })
    }
}

impl From<Result<Value, ToolError>> for ToolEnvelope {
    fn from(result: Result<Value, ToolError>) -> Self {
        match result {
            Ok(value) => Self::ok(value),
            Err(e) => Self::err(&e),
        }
    }
}

/// The outcome of one tool call, linked to the call by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub envelope: ToolEnvelope,
}

/// Where a catalogued tool name is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Local(String),
    Remote { server: String, tool: String },
}

/// The merged tool list offered to the model for one turn, with the route
/// for every name in it.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    specs: Vec<ToolSpec>,
    routes: HashMap<String, Route>,
}

impl Catalog {
    /// Add a tool. A later entry with the same name replaces the earlier one
    /// in place.
    pub fn insert(&mut self, spec: ToolSpec, route: Route) {
        match self.specs.iter().position(|s| s.name == spec.name) {
            Some(index) => self.specs[index] = spec.clone(),
            None => self.specs.push(spec.clone()),
        }
        self.routes.insert(spec.name, route);
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serialization() {
        let ok = ToolEnvelope::ok(json!("pong"));
        assert_eq!(ok.to_text(), r#"{"success":true,"result":"pong"}"#);

        let err = ToolEnvelope::err(&ToolError::NotFound("beta_doit".into()));
        assert_eq!(
            err.to_text(),
            r#"{"success":false,"error":"tool not found: beta_doit"}"#
        );
    }

    #[test]
    fn function_shape() {
        let spec = ToolSpec::new("alpha_ping", "Reply with pong", json!({"type": "object"}));
        assert_eq!(
            spec.to_function(),
            json!({
                "type": "function",
                "function": {
                    "name": "alpha_ping",
                    "description": "Reply with pong",
                    "parameters": {"type": "object"}
                }
            })
        );
    }

    #[test]
    fn catalog_last_insert_wins() {
        let mut catalog = Catalog::default();
        catalog.insert(
            ToolSpec::new("a_x", "first", json!({})),
            Route::Remote {
                server: "a".into(),
                tool: "x".into(),
            },
        );
        catalog.insert(ToolSpec::new("other", "", json!({})), Route::Local("other".into()));
        catalog.insert(ToolSpec::new("a_x", "second", json!({})), Route::Local("a_x".into()));

        assert_eq!(catalog.names(), ["a_x", "other"]);
        assert_eq!(catalog.specs()[0].description, "second");
        assert_eq!(catalog.route("a_x"), Some(&Route::Local("a_x".into())));
    }
}
