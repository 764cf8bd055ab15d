//! Tools: local tools, the merged catalog, and call routing.

pub mod errors;
mod host;
mod local;
mod types;

pub use errors::ToolError;
pub use host::{DISCOVERY_TIMEOUT, ToolHost};
pub use local::{FnTool, LocalTool, LocalTools};
pub use types::{Catalog, Route, ToolEnvelope, ToolResult, ToolSpec};
