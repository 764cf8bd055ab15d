//! Session management: one conversation and its tool-use loop.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::model::{Backend, Message, ModelRequest, Reply};
use crate::tools::{Catalog, ToolHost};
use crate::transcript::Transcript;

/// Sent as a user message after tool results so the model answers from them.
pub const CONTINUATION_PROMPT: &str = "Please provide a response based on the tool results.";

/// Used when the model answers with nothing.
pub const EMPTY_REPLY: &str = "Sorry, I could not generate a response.";

const MODEL_ERROR_PREFIX: &str = "Sorry, there was an error processing your request: ";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant with access to tools. \
Use a tool when it helps answer the user, and answer directly otherwise.";

/// Tunables for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub system_prompt: String,
    /// Rounds of tool calls allowed in one turn.
    pub max_tool_rounds: usize,
    /// Whether tools are offered to the model at all.
    pub tools_enabled: bool,
    /// Bound on a whole turn run through [`Session::chat_blocking`].
    pub turn_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tool_rounds: 8,
            tools_enabled: true,
            turn_timeout: Duration::from_secs(300),
        }
    }
}

/// A conversation session.
pub struct Session<B> {
    pub id: Uuid,
    backend: Arc<B>,
    host: Arc<ToolHost>,
    transcript: Transcript,
    config: SessionConfig,
    last_tools: Option<Vec<String>>,
}

impl<B: Backend + 'static> Session<B> {
    /// Create a new session with the given backend and tool host.
    pub fn new(backend: B, host: Arc<ToolHost>) -> Self {
        Self::with_config(backend, host, SessionConfig::default())
    }

    pub fn with_config(backend: B, host: Arc<ToolHost>, config: SessionConfig) -> Self {
        let id = Uuid::new_v4();
        debug!(session = %id, "session started");
        Self {
            id,
            backend: Arc::new(backend),
            host,
            transcript: Transcript::new(config.system_prompt.clone()),
            config,
            last_tools: None,
        }
    }

    /// Send a user message and get the assistant's response.
    ///
    /// Never fails: model errors come back as an assistant message that is
    /// also recorded in the transcript.
    pub async fn chat(&mut self, user_input: &str) -> String {
        let turn = run_turn(
            self.backend.as_ref(),
            &self.host,
            &mut self.transcript,
            &self.config,
            user_input,
        )
        .await;
        self.finish(turn)
    }

    /// [`chat`](Self::chat) for callers without a runtime.
    ///
    /// The turn runs on the tool host's bridge. If it exceeds the turn
    /// timeout the transcript is left as it was before the turn, plus the
    /// user message and an error reply.
    pub fn chat_blocking(&mut self, user_input: &str) -> String {
        let backend = Arc::clone(&self.backend);
        let host = Arc::clone(&self.host);
        let config = self.config.clone();
        let input = user_input.to_string();
        let mut transcript = self.transcript.clone();

        let outcome = self.host.bridge().execute_blocking_with_timeout(
            async move {
                let turn = run_turn(backend.as_ref(), &host, &mut transcript, &config, &input).await;
                (turn, transcript)
            },
            self.config.turn_timeout,
        );

        match outcome {
            Ok((turn, transcript)) => {
                self.transcript = transcript;
                self.finish(turn)
            }
            Err(e) => {
                warn!(session = %self.id, error = %e, "turn did not complete");
                let reply = format!("{MODEL_ERROR_PREFIX}{e}");
                self.transcript.push(Message::user(user_input));
                self.transcript.push(Message::assistant(reply.clone()));
                reply
            }
        }
    }

    fn finish(&mut self, turn: Turn) -> String {
        self.last_tools = Some(turn.tools);
        turn.reply
    }

    /// Messages after the system prompt.
    pub fn history(&self) -> &[Message] {
        self.transcript.history()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Forget the conversation, keeping the system prompt.
    pub fn clear(&mut self) {
        self.transcript.clear();
        info!(session = %self.id, "history cleared");
    }

    /// Tool names offered on the last turn, or the local tools before the
    /// first turn.
    pub fn available_tools(&self) -> Vec<String> {
        self.last_tools
            .clone()
            .unwrap_or_else(|| self.host.local_names())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn set_tools_enabled(&mut self, enabled: bool) {
        self.config.tools_enabled = enabled;
    }
}

struct Turn {
    reply: String,
    tools: Vec<String>,
}

/// Drive one user turn to a final assistant message.
async fn run_turn<B: Backend>(
    backend: &B,
    host: &ToolHost,
    transcript: &mut Transcript,
    config: &SessionConfig,
    user_input: &str,
) -> Turn {
    transcript.push(Message::user(user_input));

    let mut rounds = 0;
    loop {
        let catalog = if config.tools_enabled {
            host.snapshot().await
        } else {
            Catalog::default()
        };
        let offered = catalog.names();

        let request = ModelRequest {
            messages: transcript.messages(),
            tools: catalog.specs(),
        };
        let reply = match backend.call(request).await {
            Ok(response) => response.reply,
            Err(e) => {
                warn!(error = %e, round = rounds, "model call failed");
                return conclude(transcript, format!("{MODEL_ERROR_PREFIX}{e}"), offered);
            }
        };

        match reply {
            Reply::Answer(text) => {
                let text = if text.trim().is_empty() {
                    EMPTY_REPLY.to_string()
                } else {
                    text
                };
                return conclude(transcript, text, offered);
            }
            Reply::ToolCalls { content, calls } => {
                rounds += 1;
                if rounds > config.max_tool_rounds {
                    warn!(limit = config.max_tool_rounds, "tool round limit reached");
                    let text = format!(
                        "{MODEL_ERROR_PREFIX}the model kept requesting tools after {} rounds",
                        config.max_tool_rounds
                    );
                    return conclude(transcript, text, offered);
                }

                debug!(round = rounds, calls = calls.len(), "executing tool calls");
                transcript.push(Message::tool_request(content, calls.clone()));

                let results = join_all(calls.iter().map(|call| host.execute(call, Some(&catalog)))).await;
                for result in results {
                    transcript.push(Message::tool(result.call_id, result.envelope.to_text()));
                }
                transcript.push(Message::user(CONTINUATION_PROMPT));
            }
        }
    }
}

fn conclude(transcript: &mut Transcript, reply: String, tools: Vec<String>) -> Turn {
    transcript.push(Message::assistant(reply.clone()));
    Turn { reply, tools }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Bridge;
    use crate::model::{ModelError, ModelResponse, Role, ToolCall, Usage};
    use mcp::Supervisor;
    use serde_json::Map;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies in order.
    struct Scripted {
        replies: Mutex<VecDeque<Result<Reply, String>>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Reply, String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
            }
        }
    }

    impl Backend for Scripted {
        async fn call(&self, _request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
            let next = self.replies.lock().unwrap().pop_front();
            match next {
                Some(Ok(reply)) => Ok(ModelResponse {
                    reply,
                    usage: Usage::default(),
                }),
                Some(Err(message)) => Err(ModelError::Network(message)),
                None => Err(ModelError::InvalidResponse("script exhausted".into())),
            }
        }
    }

    fn host() -> Arc<ToolHost> {
        Arc::new(ToolHost::new(Supervisor::new(), Bridge::new().unwrap()))
    }

    fn calls(names: &[(&str, &str)]) -> Reply {
        Reply::ToolCalls {
            content: None,
            calls: names
                .iter()
                .map(|(id, name)| ToolCall::new(*id, *name, Map::new()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn direct_answer() {
        let backend = Scripted::new(vec![Ok(Reply::Answer("Hello!".into()))]);
        let mut session = Session::new(backend, host());

        assert_eq!(session.chat("hi").await, "Hello!");
        let roles: Vec<_> = session.history().iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn empty_answer_gets_fallback() {
        let backend = Scripted::new(vec![Ok(Reply::Answer("  ".into()))]);
        let mut session = Session::new(backend, host());
        assert_eq!(session.chat("hi").await, EMPTY_REPLY);
    }

    #[tokio::test]
    async fn model_failure_becomes_assistant_message() {
        let backend = Scripted::new(vec![Err("connection reset".into())]);
        let mut session = Session::new(backend, host());

        let reply = session.chat("hi").await;
        assert_eq!(
            reply,
            "Sorry, there was an error processing your request: network: connection reset"
        );
        let last = session.transcript().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.text(), reply);
    }

    #[tokio::test]
    async fn unknown_tool_still_completes_turn() {
        let backend = Scripted::new(vec![
            Ok(calls(&[("c1", "beta_doit")])),
            Ok(Reply::Answer("I could not do that.".into())),
        ]);
        let mut session = Session::new(backend, host());

        assert_eq!(session.chat("do it").await, "I could not do that.");

        let history = session.history();
        let roles: Vec<_> = history.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            [Role::User, Role::Assistant, Role::Tool, Role::User, Role::Assistant]
        );
        assert_eq!(history[1].tool_calls[0].id, "c1");
        assert_eq!(history[2].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(
            history[2].text(),
            r#"{"success":false,"error":"tool not found: beta_doit"}"#
        );
        assert_eq!(history[3].text(), CONTINUATION_PROMPT);
    }

    #[tokio::test]
    async fn round_limit_ends_turn() {
        let config = SessionConfig {
            max_tool_rounds: 2,
            ..SessionConfig::default()
        };
        let backend = Scripted::new(vec![
            Ok(calls(&[("c1", "loop_again")])),
            Ok(calls(&[("c2", "loop_again")])),
            Ok(calls(&[("c3", "loop_again")])),
        ]);
        let mut session = Session::with_config(backend, host(), config);

        let reply = session.chat("go").await;
        assert!(reply.contains("after 2 rounds"), "{reply}");

        let tool_messages = session
            .history()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .count();
        assert_eq!(tool_messages, 2);
        assert_eq!(session.transcript().last().unwrap().role, Role::Assistant);
    }

    #[test]
    fn blocking_chat_matches_async_chat() {
        let backend = Scripted::new(vec![
            Ok(calls(&[("c1", "beta_doit")])),
            Ok(Reply::Answer("done".into())),
        ]);
        let mut session = Session::new(backend, host());

        assert_eq!(session.chat_blocking("go"), "done");
        assert_eq!(session.history().len(), 5);
    }

    #[test]
    fn blocking_turn_timeout_keeps_transcript_well_formed() {
        struct Stalled;
        impl Backend for Stalled {
            async fn call(&self, _request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(ModelError::Network("unreachable".into()))
            }
        }

        let config = SessionConfig {
            turn_timeout: Duration::from_millis(50),
            ..SessionConfig::default()
        };
        let mut session = Session::with_config(Stalled, host(), config);

        let reply = session.chat_blocking("hello?");
        assert!(reply.contains("timed out"), "{reply}");
        let roles: Vec<_> = session.history().iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn clear_resets_to_system_prompt() {
        let backend = Scripted::new(vec![Ok(Reply::Answer("hi".into()))]);
        let mut session = Session::new(backend, host());
        session.chat("hello").await;
        session.clear();
        assert!(session.history().is_empty());
        assert_eq!(session.transcript().messages()[0].role, Role::System);
    }

    #[tokio::test]
    async fn disabled_tools_offer_nothing() {
        let backend = Scripted::new(vec![Ok(Reply::Answer("ok".into()))]);
        let mut session = Session::new(backend, host());
        session.set_tools_enabled(false);
        session.chat("hello").await;
        assert!(session.available_tools().is_empty());
    }
}
