//! Skiff runtime: model backends, the tool host and the chat session loop.
//!
//! # Overview
//!
//! - **Bridge**: a dedicated runtime that every tool call and catalog
//!   refresh runs on, usable from async and blocking code alike.
//! - **ToolHost**: local tools plus the tools of every enabled MCP server,
//!   exposed to the model as one catalog with `{server}_{tool}` names.
//! - **Backend**: a trait over chat-completion providers.
//! - **Session**: one conversation; drives the model/tool loop for each turn.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mcp::{ServerConfig, Supervisor};
//! use runtime::{Bridge, OpenAiBackend, Session, ToolHost};
//!
//! # async fn example() -> runtime::Result<()> {
//! let supervisor = Supervisor::new();
//! supervisor
//!     .register(ServerConfig::new("files", "python3").script("servers/files.py"))
//!     .await?;
//!
//! let host = Arc::new(ToolHost::new(supervisor, Bridge::new()?));
//! let backend = OpenAiBackend::builder("gpt-4o-mini").api_key("sk-...").build();
//!
//! let mut session = Session::new(backend, host);
//! let reply = session.chat("What files are in the project?").await;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

pub mod bridge;
mod error;
pub mod model;
mod session;
pub mod tools;
mod transcript;

pub use bridge::{Bridge, BridgeError, DEFAULT_TIMEOUT};
pub use error::{Error, Result};
pub use model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, OpenAiBackend, OpenAiBackendBuilder,
    Reply, Role, ToolCall, Usage,
};
pub use session::{
    CONTINUATION_PROMPT, DEFAULT_SYSTEM_PROMPT, EMPTY_REPLY, Session, SessionConfig,
};
pub use tools::{
    Catalog, DISCOVERY_TIMEOUT, FnTool, LocalTool, LocalTools, Route, ToolEnvelope, ToolError,
    ToolHost, ToolResult, ToolSpec,
};
pub use transcript::Transcript;
