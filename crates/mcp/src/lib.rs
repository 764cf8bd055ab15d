//! MCP (Model Context Protocol) client library.
//!
//! This crate spawns MCP servers as child processes and talks to them over
//! stdio. [`Server`] is a session with one process; [`Supervisor`] owns the
//! configured servers and connects them on demand.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{ServerConfig, Supervisor};
//!
//! # async fn example() -> mcp::Result<()> {
//! let supervisor = Supervisor::new();
//! supervisor
//!     .register(
//!         ServerConfig::new("files", "python3")
//!             .script("servers/files.py")
//!             .env("ROOT", "./workspace"),
//!     )
//!     .await?;
//!
//! for tool in supervisor.list_server_tools("files").await {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let text = supervisor
//!     .call_tool("files", "read_file", Some(serde_json::json!({"path": "./README.md"})))
//!     .await?;
//! println!("{text}");
//!
//! supervisor.disconnect_all().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod protocol;
mod server;
mod supervisor;

pub use config::{NAMESPACE_SEPARATOR, ServerConfig};
pub use error::{Error, Result};
pub use protocol::{
    CallToolResult, Implementation, InitializeResult, PROTOCOL_VERSION, RequestId, RpcError,
    ServerCapabilities, Tool, ToolContent, empty_object_schema,
};
pub use server::{DEFAULT_TIMEOUT, MAX_OUTPUT_SIZE, Server};
pub use supervisor::{ConnectionState, ServerStatus, Supervisor};
