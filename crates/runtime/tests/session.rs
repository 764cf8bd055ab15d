mod common;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use runtime::{
    Backend, CONTINUATION_PROMPT, ModelError, ModelRequest, ModelResponse, Reply, Role, Session,
    ToolCall, Usage,
};
use serde_json::{Map, json};

/// Replays canned replies and records the tool names offered on each call.
struct Scripted {
    replies: Mutex<VecDeque<Reply>>,
    offered: Arc<Mutex<Vec<Vec<String>>>>,
}

impl Scripted {
    fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            offered: Arc::default(),
        }
    }

    fn offered(&self) -> Arc<Mutex<Vec<Vec<String>>>> {
        Arc::clone(&self.offered)
    }
}

impl Backend for Scripted {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let names = request.tools.iter().map(|t| t.name.clone()).collect();
        self.offered.lock().unwrap().push(names);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::InvalidResponse("script exhausted".into()))?;
        Ok(ModelResponse {
            reply,
            usage: Usage::default(),
        })
    }
}

fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
    let arguments = match arguments {
        serde_json::Value::Object(map) => map,
        _ => Map::new(),
    };
    ToolCall::new(id, name, arguments)
}

#[tokio::test]
async fn tool_round_trip_through_a_server() {
    let dir = tempfile::tempdir().unwrap();
    let host = common::stub_host(dir.path(), &["alpha"], Duration::from_secs(5)).await;
    let backend = Scripted::new(vec![
        Reply::ToolCalls {
            content: Some("Let me check.".into()),
            calls: vec![
                tool_call("c1", "alpha_ping", json!({})),
                tool_call("c2", "alpha_echo", json!({"text": "hello"})),
            ],
        },
        Reply::Answer("The server said pong.".into()),
    ]);
    let mut session = Session::new(backend, host.clone());

    let reply = session.chat("is alpha alive?").await;
    assert_eq!(reply, "The server said pong.");

    let history = session.history();
    let roles: Vec<_> = history.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        [
            Role::User,
            Role::Assistant,
            Role::Tool,
            Role::Tool,
            Role::User,
            Role::Assistant
        ]
    );
    assert_eq!(history[1].text(), "Let me check.");
    assert_eq!(history[1].tool_calls.len(), 2);
    assert_eq!(history[2].tool_call_id.as_deref(), Some("c1"));
    assert_eq!(history[2].text(), r#"{"success":true,"result":"pong"}"#);
    assert_eq!(history[3].tool_call_id.as_deref(), Some("c2"));
    assert_eq!(history[3].text(), r#"{"success":true,"result":"echo: hello"}"#);
    assert_eq!(history[4].text(), CONTINUATION_PROMPT);

    assert_eq!(
        session.available_tools(),
        ["alpha_ping", "alpha_echo", "alpha_bare"]
    );

    host.shutdown().await;
}

#[tokio::test]
async fn every_round_sees_the_current_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let host = common::stub_host(dir.path(), &["alpha"], Duration::from_secs(5)).await;
    let backend = Scripted::new(vec![
        Reply::ToolCalls {
            content: None,
            calls: vec![tool_call("c1", "alpha_ping", json!({}))],
        },
        Reply::Answer("done".into()),
        Reply::Answer("no tools now".into()),
    ]);
    let offered = backend.offered();
    let mut session = Session::new(backend, host.clone());

    assert_eq!(session.chat("first").await, "done");
    host.supervisor().set_enabled("alpha", false).await.unwrap();
    assert_eq!(session.chat("second").await, "no tools now");

    let offered = offered.lock().unwrap().clone();
    assert_eq!(offered.len(), 3);
    assert_eq!(offered[0], ["alpha_ping", "alpha_echo", "alpha_bare"]);
    assert_eq!(offered[1], offered[0]);
    assert!(offered[2].is_empty());
    assert!(session.available_tools().is_empty());

    host.shutdown().await;
}

#[tokio::test]
async fn tool_results_follow_call_order_not_completion_order() {
    let dir = tempfile::tempdir().unwrap();
    let host = common::stub_host(dir.path(), &["alpha", "beta"], Duration::from_secs(5)).await;
    let backend = Scripted::new(vec![
        Reply::ToolCalls {
            content: None,
            calls: vec![
                tool_call("c1", "alpha_slow", json!({})),
                tool_call("c2", "beta_ping", json!({})),
            ],
        },
        Reply::Answer("both back".into()),
    ]);
    let mut session = Session::new(backend, host.clone());

    assert_eq!(session.chat("run both").await, "both back");

    let history = session.history();
    let tool_messages: Vec<_> = history
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| (m.tool_call_id.as_deref(), m.text()))
        .collect();
    assert_eq!(
        tool_messages,
        [
            (Some("c1"), r#"{"success":true,"result":"finally"}"#),
            (Some("c2"), r#"{"success":true,"result":"pong"}"#),
        ]
    );

    host.shutdown().await;
}
